//! Test module organization.
//!
//! This module organizes all integration tests for the memory hierarchy
//! simulator.


/// Address types, access kinds and error formatting tests.
mod common_tests;






/// Request scheduler scenarios and latency properties.
mod scheduler_tests;
