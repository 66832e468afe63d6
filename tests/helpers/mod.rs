pub mod cli;
pub mod pool;
