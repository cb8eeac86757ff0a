//! Utility modules for common functionality.
//!
//! This module contains helpers used throughout the crate, including logging
//! configuration and output handling.

pub mod logger;
pub mod text;
