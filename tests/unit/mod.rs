pub mod config;
pub mod synchronize;
