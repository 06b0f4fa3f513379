//! Property-based tests

pub mod quality_proptest;
pub mod queue_proptest;
