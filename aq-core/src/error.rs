//! Error types for aq-core
//!
//! Re-exported from the shared aq-error crate.

pub use aq_error::*;
