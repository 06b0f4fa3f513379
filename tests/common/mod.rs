//! Common test utilities and helpers
//!
//! This module provides shared utilities for all tests including:
//! - Scripted executors and a facade harness
//! - Temporary SQLite databases
//! - Custom assertion macros

pub mod database;
pub mod fixtures;

// Re-export commonly used utilities
pub use database::*;
pub use fixtures::*;
