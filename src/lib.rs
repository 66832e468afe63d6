//! Synchronize PostgreSQL roles and privileges from directory entries

pub mod catalog;
pub mod commands;
pub mod config;
pub mod constants;
pub mod db;
pub mod diff;
pub mod directory;
pub mod error;
pub mod format;
pub mod render;
pub mod rules;
