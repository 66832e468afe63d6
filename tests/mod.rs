// Integration tests for rolesync

pub mod cli;
pub mod helpers;
pub mod unit;
