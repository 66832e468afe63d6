/// CLI tests exercising the binary on paths that fail or finish before
/// connecting to PostgreSQL.
pub mod error_handling;
pub mod help;
