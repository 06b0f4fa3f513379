//! Integration tests

pub mod persistence_test;
pub mod rest_executor_test;
pub mod sync_scenarios;
