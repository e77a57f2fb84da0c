//! Helpers for integration tests.

mod prepare_env;

pub use prepare_env::{init_logging, new_test_database};
