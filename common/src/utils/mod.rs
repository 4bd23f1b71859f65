//! Utility functions and helpers.

pub mod db_wait;

// Re-export commonly used types
pub use db_wait::{check_connection, wait_for_database, WaitOutcome, WaitPolicy};
