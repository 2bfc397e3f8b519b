//! Internal errors with source locations.
//!
//! Pipeline stages never unwind across a component boundary: they return a
//! partial artifact plus a diagnostic list. [`SpannedError`] is the carrier
//! for the residue — internal faults and I/O failures that get converted to
//! sentinel diagnostics at the pipeline boundary.

use crate::span::Span;
use std::fmt;

/// An error message annotated with the source region it refers to.
#[derive(Debug, Clone)]
pub struct SpannedError {
    pub message: String,
    pub span: Span,
}

impl SpannedError {
    pub fn new(message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            span,
        }
    }
}

impl fmt::Display for SpannedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} at {}..{}",
            self.message, self.span.start, self.span.end
        )
    }
}

impl std::error::Error for SpannedError {}

pub type Result<T> = std::result::Result<T, SpannedError>;
