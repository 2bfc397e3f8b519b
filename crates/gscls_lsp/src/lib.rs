//! # gscls-lsp
//!
//! Language Server Protocol front end for the GSC/CSC analysis core.
//!
//! The server wires `tower-lsp` requests to the [`manager::ScriptManager`],
//! which owns the per-workspace cache: every open document and every
//! `#using` dependency lives there as a [`script::Script`], parsed and
//! analysed under per-URI locks.
//!
//! ```text
//! LSP client ──▶ server ──▶ ScriptManager ──▶ Script pipeline
//!                               │                (gscls-language)
//!                               └─▶ feature modules (hover, tokens, …)
//! ```
//!
//! - [`server`] — `LanguageServer` implementation and capabilities
//! - [`manager`] — cache, dependency fan-out, locks, workspace indexing
//! - [`script`] — per-file pipeline state
//! - [`line_index`] — byte offset ↔ UTF-16 position conversion
//! - feature modules: [`diagnostics`], [`semantic_tokens`], [`hover`],
//!   [`completion`], [`signature_help`], [`definition`], [`references`],
//!   [`document_symbols`], [`folding`]

pub mod completion;
pub mod definition;
pub mod diagnostics;
pub mod document_symbols;
pub mod folding;
pub mod hover;
pub mod line_index;
pub mod manager;
pub mod references;
pub mod script;
pub mod semantic_tokens;
pub mod server;
pub mod signature_help;
