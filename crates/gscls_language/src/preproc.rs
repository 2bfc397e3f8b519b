//! Preprocessor: rewrites the lexed token stream.
//!
//! Consumes the raw token vector and produces an expanded one, resolving
//! `#define` macros, splicing `#insert` files and selecting `#if` branches.
//! `#using`, `#namespace`, `#precache` and the animtree directives pass
//! through untouched; the parser turns them into AST nodes.
//!
//! Every token synthesized here is marked with a [`TokenOrigin`] other than
//! `Source`, carrying the real pre-expansion range so diagnostics keep
//! pointing at the file the text actually lives in.
//!
//! `#if` conditions are deliberately not evaluated: the game toolchain
//! accepts constructs this system cannot, so a single advisory hint flags
//! the limitation per file and the first branch is taken conservatively,
//! with inactive branches dimmed.

use std::collections::{HashMap, HashSet};
use std::io;
use std::path::{Component, Path, PathBuf};

use gscls_base::{Interner, Span};

use crate::diag::{DiagCode, Diagnostic};
use crate::lexer::Lexer;
use crate::token::{Token, TokenKind, TokenOrigin};

/// Reads script and insert files on behalf of the preprocessor, so tests can
/// supply in-memory sources and the server can route reads through its cache.
pub trait SourceProvider: Sync {
    fn read(&self, path: &Path) -> io::Result<String>;
}

/// The default provider: plain filesystem reads.
pub struct FsProvider;

impl SourceProvider for FsProvider {
    fn read(&self, path: &Path) -> io::Result<String> {
        std::fs::read_to_string(path)
    }
}

/// A registered `#define`.
#[derive(Debug, Clone)]
pub struct MacroDef {
    pub name: String,
    /// Span of the macro name at the definition site.
    pub span: Span,
    /// `None` for object-like macros, `Some` (possibly empty) for
    /// function-like ones.
    pub params: Option<Vec<String>>,
    pub body: Vec<Token>,
}

/// Outline entry for a macro definition, surfaced in the document symbols.
#[derive(Debug, Clone)]
pub struct MacroOutline {
    pub name: String,
    pub span: Span,
}

/// A region of the document whose tokens were spliced from another file.
#[derive(Debug, Clone)]
pub struct InsertRegion {
    /// The `#insert` directive's span in the including file.
    pub span: Span,
    /// The path as written in source.
    pub path: String,
    /// The file the tokens actually came from, when resolution succeeded.
    pub resolved: Option<PathBuf>,
}

pub struct PreprocessOutput {
    pub tokens: Vec<Token>,
    pub macros: HashMap<String, MacroDef>,
    pub macro_outlines: Vec<MacroOutline>,
    pub insert_regions: Vec<InsertRegion>,
    pub diagnostics: Vec<Diagnostic>,
}

struct BranchFrame {
    if_span: Span,
    /// Whether the branch currently streaming is the active one.
    active: bool,
    /// Start of the inactive region being accumulated, if any.
    inactive_from: Option<usize>,
}

pub struct Preprocessor<'a> {
    interner: &'a mut Interner,
    provider: &'a dyn SourceProvider,
    /// Workspace root; insert paths may not escape it.
    root: &'a Path,
    macros: HashMap<String, MacroDef>,
    macro_outlines: Vec<MacroOutline>,
    insert_regions: Vec<InsertRegion>,
    diagnostics: Vec<Diagnostic>,
    include_stack: Vec<PathBuf>,
    branch_stack: Vec<BranchFrame>,
    if_hint_emitted: bool,
}

impl<'a> Preprocessor<'a> {
    pub fn new(interner: &'a mut Interner, provider: &'a dyn SourceProvider, root: &'a Path) -> Self {
        Preprocessor {
            interner,
            provider,
            root,
            macros: HashMap::new(),
            macro_outlines: Vec::new(),
            insert_regions: Vec::new(),
            diagnostics: Vec::new(),
            include_stack: Vec::new(),
            branch_stack: Vec::new(),
            if_hint_emitted: false,
        }
    }

    pub fn run(mut self, tokens: &[Token]) -> PreprocessOutput {
        let mut out = Vec::with_capacity(tokens.len());
        self.process(tokens, &mut out, &mut HashSet::new());

        while let Some(frame) = self.branch_stack.pop() {
            self.diagnostics.push(Diagnostic::new(
                DiagCode::UnterminatedPreprocessorDirective,
                frame.if_span,
                &[],
            ));
        }

        PreprocessOutput {
            tokens: out,
            macros: self.macros,
            macro_outlines: self.macro_outlines,
            insert_regions: self.insert_regions,
            diagnostics: self.diagnostics,
        }
    }

    fn process(&mut self, tokens: &[Token], out: &mut Vec<Token>, active: &mut HashSet<String>) {
        let mut i = 0;
        while i < tokens.len() {
            let tok = tokens[i];
            match tok.kind {
                TokenKind::DefineDirective if self.in_active_branch() => {
                    i = self.handle_define(tokens, i)
                }
                TokenKind::InsertDirective if self.in_active_branch() => {
                    i = self.handle_insert(tokens, i, out, active)
                }
                // Directives in inactive branches are skipped, not executed.
                TokenKind::DefineDirective | TokenKind::InsertDirective => {
                    i = skip_to_line_end(tokens, i)
                }
                TokenKind::IfDirective => {
                    if !self.if_hint_emitted {
                        self.if_hint_emitted = true;
                        self.diagnostics.push(Diagnostic::new(
                            DiagCode::PreprocessorIfAnalysisUnsupported,
                            tok.span,
                            &[],
                        ));
                    }
                    self.branch_stack.push(BranchFrame {
                        if_span: tok.span,
                        active: true,
                        inactive_from: None,
                    });
                    i = skip_to_line_end(tokens, i);
                }
                TokenKind::ElifDirective | TokenKind::ElseDirective => {
                    match self.branch_stack.last_mut() {
                        Some(frame) => {
                            let from = frame.inactive_from.take();
                            if let Some(from) = from {
                                self.flag_inactive(Span::new(from, tok.span.start));
                            }
                            // The first branch was taken; everything after is
                            // inactive.
                            if let Some(frame) = self.branch_stack.last_mut() {
                                frame.active = false;
                                frame.inactive_from = Some(tok.span.start);
                            }
                        }
                        None => {
                            let name = self.interner.resolve(tok.lexeme).to_string();
                            self.diagnostics.push(Diagnostic::new(
                                DiagCode::MisplacedPreprocessorDirective,
                                tok.span,
                                &[&name],
                            ));
                        }
                    }
                    i = skip_to_line_end(tokens, i);
                }
                TokenKind::EndifDirective => {
                    match self.branch_stack.pop() {
                        Some(frame) => {
                            if let Some(from) = frame.inactive_from {
                                self.flag_inactive(Span::new(from, tok.span.start));
                            }
                        }
                        None => {
                            let name = self.interner.resolve(tok.lexeme).to_string();
                            self.diagnostics.push(Diagnostic::new(
                                DiagCode::MisplacedPreprocessorDirective,
                                tok.span,
                                &[&name],
                            ));
                        }
                    }
                    i += 1;
                }
                TokenKind::Identifier if self.in_active_branch() => {
                    i = self.maybe_expand(tokens, i, out, active);
                }
                _ => {
                    if self.in_active_branch() {
                        out.push(tok);
                    }
                    i += 1;
                }
            }
        }
    }

    fn in_active_branch(&self) -> bool {
        self.branch_stack.iter().all(|f| f.active)
    }

    fn flag_inactive(&mut self, span: Span) {
        if !span.is_empty() {
            self.diagnostics
                .push(Diagnostic::new(DiagCode::InactivePreprocessorBranch, span, &[]));
        }
    }

    // ------------------------------------------------------------------
    // #define
    // ------------------------------------------------------------------

    fn handle_define(&mut self, tokens: &[Token], directive: usize) -> usize {
        let mut i = directive + 1;
        i = skip_inline_trivia(tokens, i);

        let name_tok = match tokens.get(i) {
            Some(t) if t.kind == TokenKind::Identifier => *t,
            _ => {
                self.diagnostics.push(Diagnostic::new(
                    DiagCode::ExpectedMacroIdentifier,
                    tokens[directive].span,
                    &[],
                ));
                return skip_to_line_end(tokens, i);
            }
        };
        let name = self.interner.resolve(name_tok.lexeme).to_string();
        i += 1;

        // A parameter list only counts when the paren hugs the name.
        let params = if tokens.get(i).map(|t| t.kind) == Some(TokenKind::OpenParen) {
            i += 1;
            let mut params: Vec<String> = Vec::new();
            loop {
                i = skip_inline_trivia(tokens, i);
                match tokens.get(i) {
                    Some(t) if t.kind == TokenKind::Identifier => {
                        let param = self.interner.resolve(t.lexeme).to_ascii_lowercase();
                        if params.contains(&param) {
                            let shown = self.interner.resolve(t.lexeme).to_string();
                            self.diagnostics.push(Diagnostic::new(
                                DiagCode::DuplicateMacroParameter,
                                t.span,
                                &[&shown],
                            ));
                        } else {
                            params.push(param);
                        }
                        i += 1;
                        i = skip_inline_trivia(tokens, i);
                        match tokens.get(i).map(|t| t.kind) {
                            Some(TokenKind::Comma) => i += 1,
                            Some(TokenKind::CloseParen) => {
                                i += 1;
                                break;
                            }
                            _ => break,
                        }
                    }
                    Some(t) if t.kind == TokenKind::CloseParen => {
                        i += 1;
                        break;
                    }
                    _ => break,
                }
            }
            Some(params)
        } else {
            None
        };

        // Body: remainder of the line, honoring `\`-continuations.
        let mut body = Vec::new();
        i = skip_inline_trivia(tokens, i);
        while let Some(t) = tokens.get(i) {
            match t.kind {
                TokenKind::LineBreak | TokenKind::EndOfFile => break,
                TokenKind::Backslash
                    if tokens.get(i + 1).map(|n| n.kind) == Some(TokenKind::LineBreak) =>
                {
                    i += 2;
                }
                _ => {
                    body.push(*t);
                    i += 1;
                }
            }
        }
        // Trailing trivia adds nothing to an expansion.
        while body.last().map(|t| t.kind.is_trivia()) == Some(true) {
            body.pop();
        }

        let key = name.to_ascii_lowercase();
        if self.macros.contains_key(&key) {
            self.diagnostics.push(Diagnostic::new(
                DiagCode::DuplicateMacroDefinition,
                name_tok.span,
                &[&name],
            ));
        } else {
            self.macro_outlines.push(MacroOutline {
                name: name.clone(),
                span: name_tok.span,
            });
            self.macros.insert(
                key,
                MacroDef {
                    name,
                    span: name_tok.span,
                    params,
                    body,
                },
            );
        }
        i
    }

    // ------------------------------------------------------------------
    // #insert
    // ------------------------------------------------------------------

    fn handle_insert(
        &mut self,
        tokens: &[Token],
        directive: usize,
        out: &mut Vec<Token>,
        active: &mut HashSet<String>,
    ) -> usize {
        let mut i = directive + 1;
        i = skip_inline_trivia(tokens, i);

        let mut path = String::new();
        while let Some(t) = tokens.get(i) {
            match t.kind {
                TokenKind::Semicolon | TokenKind::LineBreak | TokenKind::EndOfFile => break,
                TokenKind::Whitespace => i += 1,
                _ => {
                    path.push_str(self.interner.resolve(t.lexeme));
                    i += 1;
                }
            }
        }
        let directive_end = tokens
            .get(i)
            .filter(|t| t.kind == TokenKind::Semicolon)
            .map(|t| t.span.end)
            .or_else(|| tokens.get(i.saturating_sub(1)).map(|t| t.span.end))
            .unwrap_or(tokens[directive].span.end);
        if tokens.get(i).map(|t| t.kind) == Some(TokenKind::Semicolon) {
            i += 1;
        }
        let span = Span::new(tokens[directive].span.start, directive_end);

        if path.is_empty() {
            self.diagnostics
                .push(Diagnostic::new(DiagCode::MissingInsertFile, span, &[&path]));
            return i;
        }

        if path.split(['\\', '/']).any(|part| part == "..") {
            self.diagnostics
                .push(Diagnostic::new(DiagCode::InvalidInsertPath, span, &[&path]));
            self.insert_regions.push(InsertRegion {
                span,
                path,
                resolved: None,
            });
            return i;
        }

        let resolved = resolve_script_path(self.root, &path);

        if self.include_stack.contains(&resolved) {
            self.diagnostics
                .push(Diagnostic::new(DiagCode::CircularDependency, span, &[&path]));
            self.insert_regions.push(InsertRegion {
                span,
                path,
                resolved: Some(resolved),
            });
            return i;
        }

        match self.provider.read(&resolved) {
            Ok(contents) => {
                let inserted = Lexer::for_insert(&contents, self.interner, span).tokenize();
                // Lexical problems inside the insert surface at the directive.
                self.diagnostics.extend(inserted.diagnostics);
                self.include_stack.push(resolved.clone());
                self.process(&inserted.tokens, out, active);
                self.include_stack.pop();
                self.insert_regions.push(InsertRegion {
                    span,
                    path,
                    resolved: Some(resolved),
                });
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                self.diagnostics
                    .push(Diagnostic::new(DiagCode::MissingInsertFile, span, &[&path]));
                self.insert_regions.push(InsertRegion {
                    span,
                    path,
                    resolved: None,
                });
            }
            Err(err) => {
                let cause = err.to_string();
                self.diagnostics.push(Diagnostic::new(
                    DiagCode::FailedToReadInsertFile,
                    span,
                    &[&path, &cause],
                ));
                self.insert_regions.push(InsertRegion {
                    span,
                    path,
                    resolved: Some(resolved),
                });
            }
        }
        i
    }

    // ------------------------------------------------------------------
    // Macro expansion
    // ------------------------------------------------------------------

    fn maybe_expand(
        &mut self,
        tokens: &[Token],
        at: usize,
        out: &mut Vec<Token>,
        active: &mut HashSet<String>,
    ) -> usize {
        let tok = tokens[at];
        let key = self.interner.resolve(tok.lexeme).to_ascii_lowercase();

        let def = match self.macros.get(&key) {
            // A macro currently being expanded does not recurse into itself.
            Some(def) if !active.contains(&key) => def.clone(),
            _ => {
                out.push(tok);
                return at + 1;
            }
        };

        match &def.params {
            None => {
                let expansion = stamp(def.body.clone(), tok.span);
                active.insert(key.clone());
                self.process(&expansion, out, active);
                active.remove(&key);
                at + 1
            }
            Some(params) => {
                let after = skip_inline_trivia(tokens, at + 1);
                if tokens.get(after).map(|t| t.kind) != Some(TokenKind::OpenParen) {
                    self.diagnostics.push(Diagnostic::new(
                        DiagCode::MissingMacroParameterList,
                        tok.span,
                        &[&def.name],
                    ));
                    out.push(tok);
                    return at + 1;
                }

                let (args, end) = collect_arguments(tokens, after);
                let call_span = Span::new(
                    tok.span.start,
                    tokens
                        .get(end.saturating_sub(1))
                        .map(|t| t.span.end)
                        .unwrap_or(tok.span.end),
                );

                let arity = params.len();
                let supplied = args.len();
                if supplied > arity {
                    let expected = arity.to_string();
                    self.diagnostics.push(Diagnostic::new(
                        DiagCode::TooManyMacroArguments,
                        call_span,
                        &[&def.name, &expected],
                    ));
                } else if supplied < arity {
                    let expected = arity.to_string();
                    self.diagnostics.push(Diagnostic::new(
                        DiagCode::TooFewMacroArguments,
                        call_span,
                        &[&def.name, &expected],
                    ));
                }

                let mut expansion = Vec::with_capacity(def.body.len());
                for body_tok in &def.body {
                    let param_idx = if body_tok.kind == TokenKind::Identifier {
                        let text = self.interner.resolve(body_tok.lexeme).to_ascii_lowercase();
                        params.iter().position(|p| *p == text)
                    } else {
                        None
                    };
                    match param_idx {
                        Some(idx) => {
                            if let Some(arg) = args.get(idx) {
                                expansion.extend(arg.iter().copied());
                            }
                        }
                        None => expansion.push(stamp_one(*body_tok, call_span)),
                    }
                }

                active.insert(key.clone());
                self.process(&expansion, out, active);
                active.remove(&key);
                end
            }
        }
    }
}

/// Re-stamps cloned macro-body tokens: visible span becomes the invocation
/// site, the definition span moves into the origin.
fn stamp(body: Vec<Token>, call_span: Span) -> Vec<Token> {
    body.into_iter().map(|t| stamp_one(t, call_span)).collect()
}

fn stamp_one(mut tok: Token, call_span: Span) -> Token {
    tok.origin = TokenOrigin::Macro {
        definition: tok.source_span(),
    };
    tok.span = call_span;
    tok
}

/// Collects comma-separated argument token lists starting at an `(`,
/// honoring nested parentheses, brackets and braces. Returns the argument
/// lists and the index just past the closing `)`.
fn collect_arguments(tokens: &[Token], open: usize) -> (Vec<Vec<Token>>, usize) {
    let mut args: Vec<Vec<Token>> = Vec::new();
    let mut current: Vec<Token> = Vec::new();
    let mut depth = 1usize;
    let mut i = open + 1;
    let mut any_content = false;

    while let Some(t) = tokens.get(i) {
        match t.kind {
            TokenKind::OpenParen | TokenKind::OpenBracket | TokenKind::OpenBrace => {
                depth += 1;
                current.push(*t);
                any_content = true;
            }
            TokenKind::CloseParen | TokenKind::CloseBracket | TokenKind::CloseBrace => {
                depth -= 1;
                if depth == 0 {
                    i += 1;
                    break;
                }
                current.push(*t);
                any_content = true;
            }
            TokenKind::Comma if depth == 1 => {
                args.push(std::mem::take(&mut current));
                any_content = true;
            }
            TokenKind::EndOfFile => break,
            _ => {
                if !t.kind.is_trivia() {
                    any_content = true;
                }
                current.push(*t);
            }
        }
        i += 1;
    }

    if any_content || !args.is_empty() {
        args.push(current);
    }
    // Strip trivia-only padding from each argument.
    for arg in &mut args {
        while arg.first().map(|t| t.kind.is_trivia()) == Some(true) {
            arg.remove(0);
        }
        while arg.last().map(|t| t.kind.is_trivia()) == Some(true) {
            arg.pop();
        }
    }
    (args, i)
}

fn skip_inline_trivia(tokens: &[Token], mut i: usize) -> usize {
    while tokens
        .get(i)
        .map(|t| t.kind == TokenKind::Whitespace || t.kind.is_comment())
        == Some(true)
    {
        i += 1;
    }
    i
}

fn skip_to_line_end(tokens: &[Token], mut i: usize) -> usize {
    while let Some(t) = tokens.get(i) {
        if matches!(t.kind, TokenKind::LineBreak | TokenKind::EndOfFile) {
            break;
        }
        i += 1;
    }
    i
}

/// Turns a script-relative path written with backslashes into a real path
/// under `root`, appending the header extension when none is given.
pub fn resolve_script_path(root: &Path, written: &str) -> PathBuf {
    let mut path = root.to_path_buf();
    for part in written.split(['\\', '/']) {
        if part.is_empty() {
            continue;
        }
        path.push(part);
    }
    if path.extension().is_none() {
        path.set_extension("gsh");
    }
    // Normalize `.` components so cycle detection compares like with like.
    path.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as Map;

    struct MapProvider {
        files: Map<PathBuf, String>,
    }

    impl MapProvider {
        fn new(entries: &[(&str, &str)]) -> Self {
            let files = entries
                .iter()
                .map(|(p, c)| (PathBuf::from(p), c.to_string()))
                .collect();
            MapProvider { files }
        }
    }

    impl SourceProvider for MapProvider {
        fn read(&self, path: &Path) -> io::Result<String> {
            self.files
                .get(path)
                .cloned()
                .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no such file"))
        }
    }

    fn preprocess(source: &str, provider: &dyn SourceProvider) -> (PreprocessOutput, Interner) {
        let mut interner = Interner::new();
        let lexed = Lexer::new(source, &mut interner).tokenize();
        let out = Preprocessor::new(&mut interner, provider, Path::new("/ws")).run(&lexed.tokens);
        (out, interner)
    }

    fn significant(out: &PreprocessOutput, interner: &Interner) -> Vec<String> {
        out.tokens
            .iter()
            .filter(|t| {
                !t.kind.is_trivia()
                    && !matches!(t.kind, TokenKind::StartOfFile | TokenKind::EndOfFile)
            })
            .map(|t| interner.resolve(t.lexeme).to_string())
            .collect()
    }

    #[test]
    fn object_macro_expands_at_use_site() {
        let (out, interner) = preprocess("#define LIMIT 32\nx = LIMIT;\n", &FsProvider);
        assert!(out.diagnostics.is_empty(), "{:?}", out.diagnostics);
        assert_eq!(significant(&out, &interner), vec!["x", "=", "32", ";"]);
    }

    #[test]
    fn expanded_tokens_carry_definition_and_invocation_ranges() {
        let source = "#define LIMIT 32\nx = LIMIT;\n";
        let (out, interner) = preprocess(source, &FsProvider);
        let expanded: Vec<_> = out
            .tokens
            .iter()
            .filter(|t| t.from_preprocessor())
            .collect();
        assert_eq!(expanded.len(), 1);
        let tok = expanded[0];
        assert_eq!(interner.resolve(tok.lexeme), "32");
        // Visible range inside the invocation, source range inside the definition.
        let invocation = source.find("LIMIT;").unwrap();
        assert!(tok.span.start >= invocation);
        let definition = source.find("32").unwrap();
        assert_eq!(tok.source_span(), Span::new(definition, definition + 2));
    }

    #[test]
    fn parametric_macro_substitutes_arguments() {
        let (out, interner) = preprocess(
            "#define SQUARE(x) ((x) * (x))\ny = SQUARE(3 + 1);\n",
            &FsProvider,
        );
        assert!(out.diagnostics.is_empty(), "{:?}", out.diagnostics);
        let text = significant(&out, &interner).join(" ");
        assert_eq!(text, "y = ( ( 3 + 1 ) * ( 3 + 1 ) ) ;");
    }

    #[test]
    fn macro_names_match_case_insensitively() {
        let (out, interner) = preprocess("#define limit 8\nx = LIMIT;\n", &FsProvider);
        assert_eq!(significant(&out, &interner), vec!["x", "=", "8", ";"]);
    }

    #[test]
    fn duplicate_macro_definition_is_reported() {
        let (out, _) = preprocess("#define A 1\n#define A 2\n", &FsProvider);
        assert_eq!(out.diagnostics.len(), 1);
        assert_eq!(out.diagnostics[0].code, DiagCode::DuplicateMacroDefinition);
    }

    #[test]
    fn duplicate_macro_parameter_is_reported() {
        let (out, _) = preprocess("#define F(a, a) a\n", &FsProvider);
        assert!(out
            .diagnostics
            .iter()
            .any(|d| d.code == DiagCode::DuplicateMacroParameter));
    }

    #[test]
    fn define_without_identifier_is_reported() {
        let (out, _) = preprocess("#define 5\n", &FsProvider);
        assert!(out
            .diagnostics
            .iter()
            .any(|d| d.code == DiagCode::ExpectedMacroIdentifier));
    }

    #[test]
    fn wrong_arity_is_reported_per_direction() {
        let (too_many, _) = preprocess("#define F(a) a\nF(1, 2);\n", &FsProvider);
        assert!(too_many
            .diagnostics
            .iter()
            .any(|d| d.code == DiagCode::TooManyMacroArguments));

        let (too_few, _) = preprocess("#define G(a, b) a\nG(1);\n", &FsProvider);
        assert!(too_few
            .diagnostics
            .iter()
            .any(|d| d.code == DiagCode::TooFewMacroArguments));
    }

    #[test]
    fn parametric_macro_without_argument_list_stays_unexpanded() {
        let (out, interner) = preprocess("#define F(a) a\nx = F;\n", &FsProvider);
        assert!(out
            .diagnostics
            .iter()
            .any(|d| d.code == DiagCode::MissingMacroParameterList));
        assert_eq!(significant(&out, &interner), vec!["x", "=", "F", ";"]);
    }

    #[test]
    fn insert_splices_tokens_with_forced_range() {
        let provider = MapProvider::new(&[("/ws/scripts/consts.gsh", "CONST_A = 1;")]);
        let source = "#insert scripts\\consts.gsh;\nfoo();\n";
        let (out, interner) = preprocess(source, &provider);
        assert!(out.diagnostics.is_empty(), "{:?}", out.diagnostics);
        let text = significant(&out, &interner);
        assert_eq!(text[..4], ["CONST_A", "=", "1", ";"]);
        assert_eq!(out.insert_regions.len(), 1);
        assert_eq!(out.insert_regions[0].path, "scripts\\consts.gsh");
        // Every spliced token points at the directive.
        let directive_span = out.insert_regions[0].span;
        let spliced: Vec<_> = out
            .tokens
            .iter()
            .filter(|t| matches!(t.origin, TokenOrigin::Insert { .. }))
            .collect();
        assert!(!spliced.is_empty());
        for t in spliced {
            assert_eq!(t.span, directive_span);
        }
    }

    #[test]
    fn macros_defined_in_inserted_file_expand_in_including_file() {
        let provider = MapProvider::new(&[("/ws/scripts/consts.gsh", "#define LIMIT 4\n")]);
        let (out, interner) =
            preprocess("#insert scripts\\consts.gsh;\nx = LIMIT;\n", &provider);
        assert_eq!(significant(&out, &interner), vec!["x", "=", "4", ";"]);
    }

    #[test]
    fn missing_insert_file_reports_literal_path() {
        let (out, _) = preprocess("#insert scripts\\missing.gsh;\n", &FsProvider);
        assert_eq!(out.diagnostics.len(), 1);
        assert_eq!(out.diagnostics[0].code, DiagCode::MissingInsertFile);
        assert!(out.diagnostics[0].message.contains("scripts\\missing.gsh"));
    }

    #[test]
    fn unreadable_insert_file_reports_cause() {
        struct DenyProvider;
        impl SourceProvider for DenyProvider {
            fn read(&self, _: &Path) -> io::Result<String> {
                Err(io::Error::new(io::ErrorKind::PermissionDenied, "access denied"))
            }
        }
        let (out, _) = preprocess("#insert scripts\\locked.gsh;\n", &DenyProvider);
        let diag = out
            .diagnostics
            .iter()
            .find(|d| d.code == DiagCode::FailedToReadInsertFile)
            .expect("read failure diagnostic");
        assert!(diag.message.contains("access denied"));
    }

    #[test]
    fn insert_path_escaping_root_is_rejected() {
        let (out, _) = preprocess("#insert ..\\outside.gsh;\n", &FsProvider);
        assert!(out
            .diagnostics
            .iter()
            .any(|d| d.code == DiagCode::InvalidInsertPath));
    }

    #[test]
    fn circular_insert_is_detected() {
        let provider = MapProvider::new(&[
            ("/ws/a.gsh", "#insert b.gsh;"),
            ("/ws/b.gsh", "#insert a.gsh;"),
        ]);
        let (out, _) = preprocess("#insert a.gsh;\n", &provider);
        assert!(out
            .diagnostics
            .iter()
            .any(|d| d.code == DiagCode::CircularDependency));
    }

    #[test]
    fn if_emits_single_hint_and_keeps_first_branch() {
        let source = "#if DEBUG\nx = 1;\n#else\nx = 2;\n#endif\n#if OTHER\ny = 3;\n#endif\n";
        let (out, interner) = preprocess(source, &FsProvider);
        let hints = out
            .diagnostics
            .iter()
            .filter(|d| d.code == DiagCode::PreprocessorIfAnalysisUnsupported)
            .count();
        assert_eq!(hints, 1, "hint must be emitted once per file");
        let text = significant(&out, &interner);
        assert!(text.contains(&"1".to_string()));
        assert!(!text.contains(&"2".to_string()), "else branch is inactive");
        assert!(text.contains(&"3".to_string()));
        assert!(out
            .diagnostics
            .iter()
            .any(|d| d.code == DiagCode::InactivePreprocessorBranch));
    }

    #[test]
    fn unterminated_if_is_reported() {
        let (out, _) = preprocess("#if DEBUG\nx = 1;\n", &FsProvider);
        assert!(out
            .diagnostics
            .iter()
            .any(|d| d.code == DiagCode::UnterminatedPreprocessorDirective));
    }

    #[test]
    fn stray_endif_is_reported() {
        let (out, _) = preprocess("#endif\n", &FsProvider);
        assert!(out
            .diagnostics
            .iter()
            .any(|d| d.code == DiagCode::MisplacedPreprocessorDirective));
    }

    #[test]
    fn using_and_namespace_pass_through() {
        let (out, interner) = preprocess("#using scripts\\shared;\n#namespace util;\n", &FsProvider);
        assert!(out.diagnostics.is_empty(), "{:?}", out.diagnostics);
        let text = significant(&out, &interner);
        assert!(text.contains(&"#using".to_string()));
        assert!(text.contains(&"#namespace".to_string()));
    }

    #[test]
    fn macro_outline_recorded_per_definition() {
        let (out, _) = preprocess("#define A 1\n#define B(x) x\n", &FsProvider);
        let names: Vec<_> = out.macro_outlines.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["A", "B"]);
    }

    #[test]
    fn self_referential_macro_does_not_loop() {
        let (out, interner) = preprocess("#define X X + 1\ny = X;\n", &FsProvider);
        let text = significant(&out, &interner);
        assert_eq!(text, vec!["y", "=", "X", "+", "1", ";"]);
    }
}
