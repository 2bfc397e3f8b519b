//! # gscls-base
//!
//! Shared vocabulary for the gscls analysis pipeline.
//!
//! Everything here is deliberately small and dependency-free: byte-offset
//! [`Span`]s, a string [`Interner`] for token lexemes, and [`SpannedError`]
//! for internal faults that must survive a stage boundary without unwinding.

pub mod error;
pub mod intern;
pub mod span;

pub use error::{Result, SpannedError};
pub use intern::{Interner, Symbol};
pub use span::Span;
