//! # gscls-language
//!
//! The analysis core for GSC/CSC scripts: a multi-stage pipeline that turns
//! raw script text into per-file analysis results.
//!
//! ```text
//! bytes ─▶ lexer ─▶ preprocessor ─▶ parser ─▶ signature ─▶ CFG ─▶ data-flow
//!                                                 │                   │
//!                                           definitions          diagnostics,
//!                                             table              senses
//! ```
//!
//! Stages run synchronously, in strict order, each consuming the previous
//! stage's output as an immutable artifact. No stage unwinds across its
//! boundary: every stage returns a (partial) artifact plus a diagnostic
//! list.
//!
//! - [`lexer`] — byte span → token vector with source ranges
//! - [`preproc`] — macro expansion, `#insert` splicing, `#if` branches
//! - [`parser`] — expanded tokens → [`ast::Ast`]
//! - [`signature`] — AST → definitions table, exports, declaration senses
//! - [`cfg`] — function/class bodies → control-flow graphs
//! - [`dataflow`] — worklist analysis over CFGs → semantic diagnostics
//! - [`folding`] — comment and region scan → folding ranges
//! - [`api`] — built-in function library from the language-data JSON feed

pub mod api;
pub mod ast;
pub mod cfg;
pub mod dataflow;
pub mod diag;
pub mod docs;
pub mod folding;
pub mod lexer;
pub mod parser;
pub mod preproc;
pub mod scr;
pub mod sense;
pub mod signature;
pub mod token;

/// The two dialects. They share the parser; they differ in which built-in
/// API they see and in the VM refresh rate used by wait checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LanguageId {
    /// Server-side scripts (`*.gsc`).
    Gsc,
    /// Client-side scripts (`*.csc`).
    Csc,
}

impl LanguageId {
    pub fn from_id(id: &str) -> Option<LanguageId> {
        match id.to_ascii_lowercase().as_str() {
            "gsc" => Some(LanguageId::Gsc),
            "csc" => Some(LanguageId::Csc),
            _ => None,
        }
    }

    pub fn from_extension(ext: &str) -> Option<LanguageId> {
        Self::from_id(ext)
    }

    pub fn extension(self) -> &'static str {
        match self {
            LanguageId::Gsc => "gsc",
            LanguageId::Csc => "csc",
        }
    }

    pub fn as_str(self) -> &'static str {
        self.extension()
    }

    /// VM refresh rate; waits shorter than one period round up to it.
    pub fn vm_refresh_hz(self) -> f64 {
        match self {
            // The server VM ticks at 20 Hz, the client VM at 30 Hz.
            LanguageId::Gsc => 20.0,
            LanguageId::Csc => 30.0,
        }
    }

    /// The shortest representable wait, in seconds.
    pub fn vm_refresh_period(self) -> f64 {
        1.0 / self.vm_refresh_hz()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn language_id_round_trips_through_extension() {
        assert_eq!(LanguageId::from_extension("gsc"), Some(LanguageId::Gsc));
        assert_eq!(LanguageId::from_extension("CSC"), Some(LanguageId::Csc));
        assert_eq!(LanguageId::from_extension("txt"), None);
        assert_eq!(LanguageId::Gsc.extension(), "gsc");
    }

    #[test]
    fn refresh_periods_differ_per_vm() {
        assert!(LanguageId::Gsc.vm_refresh_period() > LanguageId::Csc.vm_refresh_period());
    }
}
