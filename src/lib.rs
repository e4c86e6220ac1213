// ABOUTME: Library module for pg-dev-tools
// ABOUTME: Exports all core functionality for use in binary and tests

pub mod commands;
pub mod config;
pub mod error;
pub mod process;
pub mod reset;
pub mod schema;
pub mod utils;
