//! Sense definitions: editor decorations derived from analysis.
//!
//! A "sense" is what a token means to the editor — its semantic-token kind,
//! an optional hover, an optional definition location. Senses live in a side
//! table keyed by the token's span rather than on the token itself, and
//! attachment is one-shot: the first stage to claim a span wins, later
//! attaches are ignored. The signature pass claims declarations; the
//! data-flow pass claims uses once its fixpoint is reached.

use std::collections::HashMap;

use gscls_base::Span;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenseKind {
    Function,
    Method,
    Class,
    Parameter,
    Variable,
    Namespace,
    Macro,
    Property,
    Constant,
}

#[derive(Debug, Clone)]
pub struct SenseToken {
    pub span: Span,
    pub kind: SenseKind,
    /// Declaration site, as opposed to a use.
    pub declaration: bool,
    /// Hover markdown, when the sense carries documentation.
    pub hover: Option<String>,
    /// Where the symbol is defined: `(uri, span)`.
    pub definition: Option<(String, Span)>,
}

impl SenseToken {
    pub fn new(span: Span, kind: SenseKind) -> Self {
        SenseToken {
            span,
            kind,
            declaration: false,
            hover: None,
            definition: None,
        }
    }

    pub fn declaration(mut self) -> Self {
        self.declaration = true;
        self
    }

    pub fn with_hover(mut self, markdown: impl Into<String>) -> Self {
        self.hover = Some(markdown.into());
        self
    }

    pub fn with_definition(mut self, uri: impl Into<String>, span: Span) -> Self {
        self.definition = Some((uri.into(), span));
        self
    }
}

/// Span-keyed sense table with one-shot attach semantics.
#[derive(Debug, Clone, Default)]
pub struct SenseMap {
    by_start: HashMap<usize, SenseToken>,
}

impl SenseMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches a sense to its span. The first attach wins; re-attaching to
    /// the same span is a no-op, which makes the operation idempotent.
    pub fn attach(&mut self, sense: SenseToken) {
        self.by_start.entry(sense.span.start).or_insert(sense);
    }

    pub fn at(&self, offset: usize) -> Option<&SenseToken> {
        // Spans are keyed by start; a hit requires the offset to be inside.
        self.by_start
            .values()
            .find(|s| s.span.contains(offset) || s.span.start == offset)
    }

    pub fn get(&self, span: Span) -> Option<&SenseToken> {
        self.by_start
            .get(&span.start)
            .filter(|s| s.span == span)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SenseToken> {
        self.by_start.values()
    }

    /// Senses ordered by span start, the order semantic-token encoding needs.
    pub fn sorted(&self) -> Vec<&SenseToken> {
        let mut senses: Vec<&SenseToken> = self.by_start.values().collect();
        senses.sort_by_key(|s| (s.span.start, s.span.end));
        senses
    }

    pub fn len(&self) -> usize {
        self.by_start.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_start.is_empty()
    }
}
