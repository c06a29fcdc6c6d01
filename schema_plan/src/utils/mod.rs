//! Utilities for schema_plan
//!
//! This module provides utility functions used across the library.

pub mod logging;
pub mod naming;
pub mod output;

// Re-export key utility functions
pub use naming::{constraint_name, lower_snake, quote_identifier, quote_literal};
pub use output::OutputTarget;
