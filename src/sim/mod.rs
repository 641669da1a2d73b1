/// Request trace parsing.
pub mod loader;
