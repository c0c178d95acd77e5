//! Core domain types for helix-diag.
//!
//! This crate contains pure domain types with no IO, no async, and minimal dependencies:
//! the diagnostic model published to editors, document identity, and the
//! sanitizer applied to raw analyzer output.

mod diagnostic;
mod document;
mod sanitize;

pub use diagnostic::{Diagnostic, Position, Range, Severity};
pub use document::DocumentSnapshot;
pub use sanitize::strip_ansi;
