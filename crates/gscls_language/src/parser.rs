//! Recursive-descent parser over the expanded token stream.
//!
//! Statements are parsed by dedicated `parse_*` functions; expressions by a
//! precedence-climbing loop over the operator table implied by the token
//! kinds. Trivia is skipped everywhere except doc comments (`/@ … @/`),
//! which are remembered and attached to the next function or class
//! definition for doc extraction.
//!
//! ## Error recovery
//!
//! On an unexpected token the parser records a diagnostic and skips to the
//! nearest statement terminator (`;`) or closing brace, so subsequent
//! statements still parse. Malformed definitions return placeholder nodes
//! with `None` names; downstream stages skip them.

use gscls_base::{Interner, Span};

use crate::ast::*;
use crate::diag::{DiagCode, Diagnostic};
use crate::token::{Token, TokenKind};

pub struct ParseOutput {
    pub ast: Ast,
    pub diagnostics: Vec<Diagnostic>,
}

pub struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    interner: &'a Interner,
    diagnostics: Vec<Diagnostic>,
    /// Text of the most recent `/@ … @/` block, waiting for a definition.
    pending_doc: Option<String>,
    eof: Token,
}

impl<'a> Parser<'a> {
    pub fn new(tokens: &'a [Token], interner: &'a Interner) -> Self {
        let end = tokens.last().map(|t| t.span.end).unwrap_or(0);
        Parser {
            tokens,
            pos: 0,
            interner,
            diagnostics: Vec::new(),
            pending_doc: None,
            eof: Token::new(TokenKind::EndOfFile, Span::point(end), gscls_base::Symbol::EMPTY),
        }
    }

    pub fn parse(mut self) -> ParseOutput {
        let ast = self.parse_script();
        ParseOutput {
            ast,
            diagnostics: self.diagnostics,
        }
    }

    // ------------------------------------------------------------------
    // Cursor
    // ------------------------------------------------------------------

    fn skip_trivia(&mut self) {
        while let Some(t) = self.tokens.get(self.pos) {
            if t.kind.is_trivia() || t.kind == TokenKind::StartOfFile {
                self.pos += 1;
            } else if t.kind == TokenKind::DocComment {
                self.pending_doc = Some(self.interner.resolve(t.lexeme).to_string());
                self.pos += 1;
            } else {
                break;
            }
        }
    }

    fn peek(&mut self) -> Token {
        self.skip_trivia();
        self.tokens.get(self.pos).copied().unwrap_or(self.eof)
    }

    /// The significant token after the next one, for two-token lookahead.
    fn peek_second(&mut self) -> Token {
        self.skip_trivia();
        let mut i = self.pos + 1;
        while let Some(t) = self.tokens.get(i) {
            if t.kind.is_trivia() || t.kind == TokenKind::DocComment {
                i += 1;
            } else {
                return *t;
            }
        }
        self.eof
    }

    fn advance(&mut self) -> Token {
        let t = self.peek();
        if t.kind != TokenKind::EndOfFile {
            self.pos += 1;
        }
        t
    }

    fn check(&mut self, kind: TokenKind) -> bool {
        self.peek().kind == kind
    }

    fn eat(&mut self, kind: TokenKind) -> Option<Token> {
        if self.check(kind) {
            Some(self.advance())
        } else {
            None
        }
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> Option<Token> {
        if let Some(t) = self.eat(kind) {
            return Some(t);
        }
        let found = self.peek();
        let shown = self.describe(found);
        self.diagnostics.push(Diagnostic::new(
            DiagCode::ExpectedToken,
            found.span,
            &[what, &shown],
        ));
        None
    }

    fn describe(&self, token: Token) -> String {
        if token.kind == TokenKind::EndOfFile {
            "end of file".to_string()
        } else {
            self.interner.resolve(token.lexeme).to_string()
        }
    }

    fn text(&self, token: Token) -> String {
        self.interner.resolve(token.lexeme).to_string()
    }

    fn error(&mut self, code: DiagCode, span: Span, args: &[&str]) {
        self.diagnostics.push(Diagnostic::new(code, span, args));
    }

    /// Skips to the nearest `;` (consumed) or `}` (left in place).
    fn recover(&mut self) {
        loop {
            match self.peek().kind {
                TokenKind::Semicolon => {
                    self.advance();
                    return;
                }
                TokenKind::CloseBrace | TokenKind::EndOfFile => return,
                _ => {
                    self.advance();
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Script root
    // ------------------------------------------------------------------

    fn parse_script(&mut self) -> Ast {
        let start = self.peek().span;
        let mut dependencies = Vec::new();
        let mut items = Vec::new();
        let mut seen_definition = false;

        loop {
            let tok = self.peek();
            match tok.kind {
                TokenKind::EndOfFile => break,
                TokenKind::UsingDirective => {
                    let dep = self.parse_using();
                    if seen_definition {
                        self.error(DiagCode::UnexpectedUsing, dep.span, &[]);
                    }
                    dependencies.push(dep);
                }
                TokenKind::NamespaceDirective => {
                    seen_definition = true;
                    self.advance();
                    let name = self.expect(TokenKind::Identifier, "namespace name").map(|t| Ident {
                        name: self.text(t),
                        span: t.span,
                    });
                    let end = self
                        .eat(TokenKind::Semicolon)
                        .map(|t| t.span)
                        .unwrap_or(tok.span);
                    if let Some(name) = name {
                        items.push(ScriptItem::Namespace {
                            name,
                            span: tok.span.merge(end),
                        });
                    }
                }
                TokenKind::PrecacheDirective => {
                    seen_definition = true;
                    self.advance();
                    self.recover();
                    items.push(ScriptItem::Precache { span: tok.span });
                }
                TokenKind::UsingAnimtreeDirective => {
                    seen_definition = true;
                    self.advance();
                    let mut name = None;
                    if self.eat(TokenKind::OpenParen).is_some() {
                        if let Some(s) = self.eat(TokenKind::String) {
                            name = Some(self.text(s).trim_matches('"').to_string());
                        }
                        self.eat(TokenKind::CloseParen);
                    }
                    self.eat(TokenKind::Semicolon);
                    items.push(ScriptItem::UsingAnimtree {
                        name,
                        span: tok.span,
                    });
                }
                TokenKind::Private | TokenKind::Autoexec | TokenKind::Function => {
                    seen_definition = true;
                    items.push(ScriptItem::Function(self.parse_function()));
                }
                TokenKind::Class => {
                    seen_definition = true;
                    items.push(ScriptItem::Class(self.parse_class()));
                }
                TokenKind::OpenDevBlock => {
                    seen_definition = true;
                    items.push(self.parse_script_dev_block());
                }
                _ => {
                    let shown = self.describe(tok);
                    self.error(DiagCode::UnexpectedToken, tok.span, &[&shown]);
                    self.advance();
                }
            }
        }

        let end = self.peek().span;
        Ast {
            dependencies,
            items,
            span: start.merge(end),
        }
    }

    fn parse_using(&mut self) -> DependencyNode {
        let directive = self.advance();
        let mut path = String::new();
        let mut end = directive.span;
        loop {
            let tok = self.peek();
            match tok.kind {
                TokenKind::Semicolon => {
                    end = self.advance().span;
                    break;
                }
                TokenKind::LineBreak | TokenKind::EndOfFile => break,
                TokenKind::Identifier | TokenKind::Backslash | TokenKind::Dot | TokenKind::Slash => {
                    path.push_str(self.interner.resolve(tok.lexeme));
                    end = tok.span;
                    self.advance();
                }
                _ => break,
            }
        }
        DependencyNode {
            path,
            span: directive.span.merge(end),
        }
    }

    fn parse_script_dev_block(&mut self) -> ScriptItem {
        let open = self.advance();
        let mut items = Vec::new();
        loop {
            let tok = self.peek();
            match tok.kind {
                TokenKind::CloseDevBlock => {
                    let close = self.advance();
                    return ScriptItem::DevBlock {
                        items,
                        span: open.span.merge(close.span),
                    };
                }
                TokenKind::EndOfFile => {
                    self.error(DiagCode::UnterminatedDevBlock, open.span, &[]);
                    return ScriptItem::DevBlock {
                        items,
                        span: open.span.merge(tok.span),
                    };
                }
                TokenKind::Private | TokenKind::Autoexec | TokenKind::Function => {
                    items.push(ScriptItem::Function(self.parse_function()));
                }
                TokenKind::Class => items.push(ScriptItem::Class(self.parse_class())),
                _ => {
                    let shown = self.describe(tok);
                    self.error(DiagCode::UnexpectedToken, tok.span, &[&shown]);
                    self.advance();
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Definitions
    // ------------------------------------------------------------------

    fn parse_function(&mut self) -> FunctionDef {
        let doc = self.pending_doc.take();
        let start = self.peek().span;
        let mut private = false;
        let mut autoexec = false;

        loop {
            match self.peek().kind {
                TokenKind::Private => {
                    private = true;
                    self.advance();
                }
                TokenKind::Autoexec => {
                    autoexec = true;
                    self.advance();
                }
                _ => break,
            }
        }

        self.expect(TokenKind::Function, "function");

        // Modifiers on the wrong side of the keyword.
        loop {
            let tok = self.peek();
            match tok.kind {
                TokenKind::Private | TokenKind::Autoexec => {
                    let shown = self.describe(tok);
                    self.error(DiagCode::UnexpectedFunctionModifier, tok.span, &[&shown]);
                    match tok.kind {
                        TokenKind::Private => private = true,
                        _ => autoexec = true,
                    }
                    self.advance();
                }
                _ => break,
            }
        }

        let name = self.eat(TokenKind::Identifier).map(|t| Ident {
            name: self.text(t),
            span: t.span,
        });
        if name.is_none() {
            let found = self.peek();
            let shown = self.describe(found);
            self.error(DiagCode::ExpectedToken, found.span, &["function name", &shown]);
        }

        let params = if self.check(TokenKind::OpenParen) {
            self.parse_parameter_list()
        } else {
            Vec::new()
        };

        let body = if self.check(TokenKind::OpenBrace) {
            self.parse_brace_body()
        } else {
            self.recover();
            Vec::new()
        };

        let end = self
            .tokens
            .get(self.pos.saturating_sub(1))
            .map(|t| t.span)
            .unwrap_or(start);
        FunctionDef {
            doc,
            private,
            autoexec,
            name,
            params,
            body,
            span: start.merge(end),
        }
    }

    fn parse_parameter_list(&mut self) -> Vec<Param> {
        self.expect(TokenKind::OpenParen, "(");
        let mut params: Vec<Param> = Vec::new();
        if self.eat(TokenKind::CloseParen).is_some() {
            return params;
        }
        loop {
            let start = self.peek().span;
            let by_ref = self.eat(TokenKind::Amp).is_some();
            if let Some(dots) = self.eat(TokenKind::VarargDots) {
                params.push(Param {
                    name: Ident {
                        name: "...".to_string(),
                        span: dots.span,
                    },
                    by_ref: false,
                    default: None,
                    vararg: true,
                    span: dots.span,
                });
            } else if let Some(name_tok) = self.eat(TokenKind::Identifier) {
                let default = if self.eat(TokenKind::Assign).is_some() {
                    Some(self.parse_expr())
                } else {
                    None
                };
                let end = default.as_ref().map(|e| e.span()).unwrap_or(name_tok.span);
                params.push(Param {
                    name: Ident {
                        name: self.text(name_tok),
                        span: name_tok.span,
                    },
                    by_ref,
                    default,
                    vararg: false,
                    span: start.merge(end),
                });
            } else {
                let found = self.peek();
                let shown = self.describe(found);
                self.error(DiagCode::ExpectedToken, found.span, &["parameter name", &shown]);
                break;
            }
            if self.eat(TokenKind::Comma).is_none() {
                break;
            }
        }
        self.expect(TokenKind::CloseParen, ")");

        // Vararg anywhere but last is an error on that parameter.
        let last = params.len().saturating_sub(1);
        for (i, p) in params.iter().enumerate() {
            if p.vararg && i != last {
                self.diagnostics.push(Diagnostic::new(
                    DiagCode::VarargNotLastParameter,
                    p.span,
                    &[],
                ));
            }
        }
        params
    }

    fn parse_class(&mut self) -> ClassDef {
        let doc = self.pending_doc.take();
        let start = self.advance().span; // `class`
        let name = self.eat(TokenKind::Identifier).map(|t| Ident {
            name: self.text(t),
            span: t.span,
        });
        if name.is_none() {
            let found = self.peek();
            let shown = self.describe(found);
            self.error(DiagCode::ExpectedToken, found.span, &["class name", &shown]);
        }

        let parent = if self.eat(TokenKind::Colon).is_some() {
            self.expect(TokenKind::Identifier, "parent class name")
                .map(|t| Ident {
                    name: self.text(t),
                    span: t.span,
                })
        } else {
            None
        };

        let mut members = Vec::new();
        if self.expect(TokenKind::OpenBrace, "{").is_some() {
            loop {
                let tok = self.peek();
                match tok.kind {
                    TokenKind::CloseBrace => {
                        self.advance();
                        break;
                    }
                    TokenKind::EndOfFile => break,
                    TokenKind::Var => {
                        self.advance();
                        let field = self.expect(TokenKind::Identifier, "member name");
                        let init = if self.eat(TokenKind::Assign).is_some() {
                            Some(self.parse_expr())
                        } else {
                            None
                        };
                        self.expect(TokenKind::Semicolon, ";");
                        if let Some(f) = field {
                            members.push(ClassMember::Field {
                                name: Ident {
                                    name: self.text(f),
                                    span: f.span,
                                },
                                init,
                                span: f.span,
                            });
                        }
                    }
                    TokenKind::Constructor | TokenKind::Destructor => {
                        let is_ctor = tok.kind == TokenKind::Constructor;
                        let kw = self.advance();
                        let params = if self.check(TokenKind::OpenParen) {
                            self.parse_parameter_list()
                        } else {
                            Vec::new()
                        };
                        if is_ctor && !params.is_empty() {
                            let span = params
                                .iter()
                                .map(|p| p.span)
                                .reduce(Span::merge)
                                .unwrap_or(kw.span);
                            self.error(DiagCode::UnexpectedConstructorParameter, span, &[]);
                        }
                        let body = if self.check(TokenKind::OpenBrace) {
                            self.parse_brace_body()
                        } else {
                            self.recover();
                            Vec::new()
                        };
                        let def = FunctionDef {
                            doc: None,
                            private: false,
                            autoexec: false,
                            name: Some(Ident {
                                name: self.text(kw),
                                span: kw.span,
                            }),
                            params,
                            body,
                            span: kw.span,
                        };
                        members.push(if is_ctor {
                            ClassMember::Constructor(def)
                        } else {
                            ClassMember::Destructor(def)
                        });
                    }
                    TokenKind::Function | TokenKind::Private | TokenKind::Autoexec => {
                        members.push(ClassMember::Method(self.parse_function()));
                    }
                    _ => {
                        let shown = self.describe(tok);
                        self.error(DiagCode::UnexpectedToken, tok.span, &[&shown]);
                        self.advance();
                    }
                }
            }
        }

        let end = self
            .tokens
            .get(self.pos.saturating_sub(1))
            .map(|t| t.span)
            .unwrap_or(start);
        ClassDef {
            doc,
            name,
            parent,
            members,
            span: start.merge(end),
        }
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn parse_brace_body(&mut self) -> Vec<Stmt> {
        self.expect(TokenKind::OpenBrace, "{");
        let mut body = Vec::new();
        loop {
            match self.peek().kind {
                TokenKind::CloseBrace => {
                    self.advance();
                    break;
                }
                TokenKind::EndOfFile => {
                    let at = self.peek();
                    let shown = self.describe(at);
                    self.error(DiagCode::ExpectedToken, at.span, &["}", &shown]);
                    break;
                }
                _ => body.push(self.parse_stmt()),
            }
        }
        body
    }

    fn parse_stmt(&mut self) -> Stmt {
        let tok = self.peek();
        match tok.kind {
            TokenKind::OpenBrace => {
                let start = tok.span;
                let body = self.parse_brace_body();
                let end = self
                    .tokens
                    .get(self.pos.saturating_sub(1))
                    .map(|t| t.span)
                    .unwrap_or(start);
                Stmt::Block {
                    body,
                    span: start.merge(end),
                }
            }
            TokenKind::If => self.parse_if(),
            TokenKind::While => self.parse_while(),
            TokenKind::Do => self.parse_do_while(),
            TokenKind::For => self.parse_for(),
            TokenKind::Foreach => self.parse_foreach(),
            TokenKind::Switch => self.parse_switch(),
            TokenKind::Break => {
                self.advance();
                self.expect(TokenKind::Semicolon, ";");
                Stmt::Break { span: tok.span }
            }
            TokenKind::Continue => {
                self.advance();
                self.expect(TokenKind::Semicolon, ";");
                Stmt::Continue { span: tok.span }
            }
            TokenKind::Return => {
                self.advance();
                let value = if self.check(TokenKind::Semicolon) {
                    None
                } else {
                    Some(self.parse_expr())
                };
                let end = self
                    .expect(TokenKind::Semicolon, ";")
                    .map(|t| t.span)
                    .unwrap_or(tok.span);
                Stmt::Return {
                    value,
                    span: tok.span.merge(end),
                }
            }
            TokenKind::Wait => {
                self.advance();
                let duration = self.parse_expr();
                self.expect(TokenKind::Semicolon, ";");
                let span = tok.span.merge(duration.span());
                Stmt::Wait { duration, span }
            }
            TokenKind::Waitrealtime => {
                self.advance();
                let duration = self.parse_expr();
                self.expect(TokenKind::Semicolon, ";");
                let span = tok.span.merge(duration.span());
                Stmt::WaitRealtime { duration, span }
            }
            TokenKind::Waittillframeend => {
                self.advance();
                self.expect(TokenKind::Semicolon, ";");
                Stmt::WaittillFrameEnd { span: tok.span }
            }
            TokenKind::Const => {
                self.advance();
                let name = self.expect(TokenKind::Identifier, "constant name");
                self.expect(TokenKind::Assign, "=");
                let value = self.parse_expr();
                self.expect(TokenKind::Semicolon, ";");
                match name {
                    Some(n) => Stmt::Const {
                        name: Ident {
                            name: self.text(n),
                            span: n.span,
                        },
                        span: tok.span.merge(value.span()),
                        value,
                    },
                    None => {
                        self.recover();
                        Stmt::Empty { span: tok.span }
                    }
                }
            }
            TokenKind::OpenDevBlock => {
                let open = self.advance();
                let mut body = Vec::new();
                loop {
                    match self.peek().kind {
                        TokenKind::CloseDevBlock => {
                            let close = self.advance();
                            return Stmt::DevBlock {
                                body,
                                span: open.span.merge(close.span),
                            };
                        }
                        TokenKind::EndOfFile => {
                            self.error(DiagCode::UnterminatedDevBlock, open.span, &[]);
                            return Stmt::DevBlock {
                                body,
                                span: open.span,
                            };
                        }
                        _ => body.push(self.parse_stmt()),
                    }
                }
            }
            TokenKind::Semicolon => {
                self.advance();
                Stmt::Empty { span: tok.span }
            }
            _ => {
                let expr = self.parse_expr();
                if expr.span().is_empty() {
                    // parse_expr already failed and reported; resynchronize.
                    self.recover();
                    return Stmt::Empty { span: tok.span };
                }
                self.expect(TokenKind::Semicolon, ";");
                let span = expr.span();
                Stmt::Expr { expr, span }
            }
        }
    }

    fn parse_if(&mut self) -> Stmt {
        let start = self.advance().span;
        self.expect(TokenKind::OpenParen, "(");
        let cond = self.parse_expr();
        self.expect(TokenKind::CloseParen, ")");
        let then = Box::new(self.parse_stmt());
        let els = if self.eat(TokenKind::Else).is_some() {
            Some(Box::new(self.parse_stmt()))
        } else {
            None
        };
        let end = els
            .as_deref()
            .map(|s| s.span())
            .unwrap_or_else(|| then.span());
        Stmt::If {
            cond,
            then,
            els,
            span: start.merge(end),
        }
    }

    fn parse_while(&mut self) -> Stmt {
        let start = self.advance().span;
        self.expect(TokenKind::OpenParen, "(");
        let cond = self.parse_expr();
        self.expect(TokenKind::CloseParen, ")");
        let body = Box::new(self.parse_stmt());
        let span = start.merge(body.span());
        Stmt::While { cond, body, span }
    }

    fn parse_do_while(&mut self) -> Stmt {
        let start = self.advance().span;
        let body = Box::new(self.parse_stmt());
        self.expect(TokenKind::While, "while");
        self.expect(TokenKind::OpenParen, "(");
        let cond = self.parse_expr();
        self.expect(TokenKind::CloseParen, ")");
        let end = self
            .expect(TokenKind::Semicolon, ";")
            .map(|t| t.span)
            .unwrap_or_else(|| cond.span());
        Stmt::DoWhile {
            body,
            cond,
            span: start.merge(end),
        }
    }

    fn parse_for(&mut self) -> Stmt {
        let start = self.advance().span;
        self.expect(TokenKind::OpenParen, "(");
        let init = if self.check(TokenKind::Semicolon) {
            None
        } else {
            let expr = self.parse_expr();
            let span = expr.span();
            Some(Box::new(Stmt::Expr { expr, span }))
        };
        self.expect(TokenKind::Semicolon, ";");
        let cond = if self.check(TokenKind::Semicolon) {
            None
        } else {
            Some(self.parse_expr())
        };
        self.expect(TokenKind::Semicolon, ";");
        let incr = if self.check(TokenKind::CloseParen) {
            None
        } else {
            let expr = self.parse_expr();
            let span = expr.span();
            Some(Box::new(Stmt::Expr { expr, span }))
        };
        self.expect(TokenKind::CloseParen, ")");
        let body = Box::new(self.parse_stmt());
        let span = start.merge(body.span());
        Stmt::For {
            init,
            cond,
            incr,
            body,
            span,
        }
    }

    fn parse_foreach(&mut self) -> Stmt {
        let start = self.advance().span;
        self.expect(TokenKind::OpenParen, "(");
        let first = self.expect(TokenKind::Identifier, "iteration variable");
        let mut key = None;
        let mut value = first.map(|t| Ident {
            name: self.text(t),
            span: t.span,
        });
        if self.eat(TokenKind::Comma).is_some() {
            let second = self.expect(TokenKind::Identifier, "iteration variable");
            key = value.take();
            value = second.map(|t| Ident {
                name: self.text(t),
                span: t.span,
            });
        }
        self.expect(TokenKind::In, "in");
        let iterable = self.parse_expr();
        self.expect(TokenKind::CloseParen, ")");
        let body = Box::new(self.parse_stmt());
        let span = start.merge(body.span());
        match value {
            Some(value) => Stmt::Foreach {
                key,
                value,
                iterable,
                body,
                span,
            },
            None => Stmt::Empty { span: start },
        }
    }

    fn parse_switch(&mut self) -> Stmt {
        let start = self.advance().span;
        self.expect(TokenKind::OpenParen, "(");
        let subject = self.parse_expr();
        self.expect(TokenKind::CloseParen, ")");
        self.expect(TokenKind::OpenBrace, "{");

        let mut cases: Vec<SwitchCase> = Vec::new();
        loop {
            let tok = self.peek();
            match tok.kind {
                TokenKind::CloseBrace => {
                    self.advance();
                    break;
                }
                TokenKind::EndOfFile => {
                    let shown = self.describe(tok);
                    self.error(DiagCode::ExpectedToken, tok.span, &["}", &shown]);
                    break;
                }
                TokenKind::Case | TokenKind::Default => {
                    let mut labels = Vec::new();
                    // Stacked labels share a body.
                    loop {
                        let label_tok = self.peek();
                        match label_tok.kind {
                            TokenKind::Case => {
                                self.advance();
                                let expr = self.parse_expr();
                                let end = self
                                    .expect(TokenKind::Colon, ":")
                                    .map(|t| t.span)
                                    .unwrap_or_else(|| expr.span());
                                labels.push(CaseLabel::Expr {
                                    span: label_tok.span.merge(end),
                                    expr,
                                });
                            }
                            TokenKind::Default => {
                                self.advance();
                                let end = self
                                    .expect(TokenKind::Colon, ":")
                                    .map(|t| t.span)
                                    .unwrap_or(label_tok.span);
                                labels.push(CaseLabel::Default {
                                    span: label_tok.span.merge(end),
                                });
                            }
                            _ => break,
                        }
                    }
                    let mut body = Vec::new();
                    loop {
                        match self.peek().kind {
                            TokenKind::Case
                            | TokenKind::Default
                            | TokenKind::CloseBrace
                            | TokenKind::EndOfFile => break,
                            _ => body.push(self.parse_stmt()),
                        }
                    }
                    let span = labels
                        .first()
                        .map(|l| l.span())
                        .unwrap_or(tok.span)
                        .merge(body.last().map(|s| s.span()).unwrap_or(tok.span));
                    cases.push(SwitchCase { labels, body, span });
                }
                _ => {
                    let shown = self.describe(tok);
                    self.error(DiagCode::UnexpectedToken, tok.span, &[&shown]);
                    self.recover();
                }
            }
        }

        let end = self
            .tokens
            .get(self.pos.saturating_sub(1))
            .map(|t| t.span)
            .unwrap_or(start);
        Stmt::Switch {
            subject,
            cases,
            span: start.merge(end),
        }
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    pub fn parse_expr(&mut self) -> Expr {
        self.parse_assignment()
    }

    fn parse_assignment(&mut self) -> Expr {
        let lhs = self.parse_binary(0);
        let op = match self.peek().kind {
            TokenKind::Assign => None,
            TokenKind::PlusAssign => Some(BinOp::Add),
            TokenKind::MinusAssign => Some(BinOp::Sub),
            TokenKind::StarAssign => Some(BinOp::Mul),
            TokenKind::SlashAssign => Some(BinOp::Div),
            TokenKind::PercentAssign => Some(BinOp::Mod),
            TokenKind::AmpAssign => Some(BinOp::BitAnd),
            TokenKind::PipeAssign => Some(BinOp::BitOr),
            TokenKind::CaretAssign => Some(BinOp::BitXor),
            TokenKind::ShiftLeftAssign => Some(BinOp::ShiftLeft),
            TokenKind::ShiftRightAssign => Some(BinOp::ShiftRight),
            _ => return lhs,
        };
        self.advance();
        let value = self.parse_assignment();
        let span = lhs.span().merge(value.span());
        Expr::Assign {
            target: Box::new(lhs),
            op,
            value: Box::new(value),
            span,
        }
    }

    fn binary_binding(kind: TokenKind) -> Option<(BinOp, u8)> {
        let binding = match kind {
            TokenKind::PipePipe => (BinOp::Or, 1),
            TokenKind::AmpAmp => (BinOp::And, 2),
            TokenKind::Pipe => (BinOp::BitOr, 3),
            TokenKind::Caret => (BinOp::BitXor, 4),
            TokenKind::Amp => (BinOp::BitAnd, 5),
            TokenKind::Equals => (BinOp::Eq, 6),
            TokenKind::NotEquals => (BinOp::Ne, 6),
            TokenKind::Identity => (BinOp::Identity, 6),
            TokenKind::NotIdentity => (BinOp::NotIdentity, 6),
            TokenKind::LessThan => (BinOp::Lt, 7),
            TokenKind::GreaterThan => (BinOp::Gt, 7),
            TokenKind::LessEquals => (BinOp::Le, 7),
            TokenKind::GreaterEquals => (BinOp::Ge, 7),
            TokenKind::ShiftLeft => (BinOp::ShiftLeft, 8),
            TokenKind::ShiftRight => (BinOp::ShiftRight, 8),
            TokenKind::Plus => (BinOp::Add, 9),
            TokenKind::Minus => (BinOp::Sub, 9),
            TokenKind::Star => (BinOp::Mul, 10),
            TokenKind::Slash => (BinOp::Div, 10),
            TokenKind::Percent => (BinOp::Mod, 10),
            _ => return None,
        };
        Some(binding)
    }

    fn parse_binary(&mut self, min_prec: u8) -> Expr {
        let mut lhs = self.parse_unary();
        while let Some((op, prec)) = Self::binary_binding(self.peek().kind) {
            if prec < min_prec {
                break;
            }
            self.advance();
            let rhs = self.parse_binary(prec + 1);
            let span = lhs.span().merge(rhs.span());
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                span,
            };
        }
        lhs
    }

    fn parse_unary(&mut self) -> Expr {
        let tok = self.peek();
        match tok.kind {
            TokenKind::Minus | TokenKind::Bang | TokenKind::Tilde => {
                self.advance();
                let op = match tok.kind {
                    TokenKind::Minus => UnOp::Neg,
                    TokenKind::Bang => UnOp::Not,
                    _ => UnOp::BitNot,
                };
                let operand = self.parse_unary();
                let span = tok.span.merge(operand.span());
                Expr::Unary {
                    op,
                    operand: Box::new(operand),
                    span,
                }
            }
            TokenKind::Increment | TokenKind::Decrement => {
                self.advance();
                let target = self.parse_unary();
                let span = tok.span.merge(target.span());
                Expr::Increment {
                    target: Box::new(target),
                    decrement: tok.kind == TokenKind::Decrement,
                    span,
                }
            }
            TokenKind::Amp if self.peek_second().kind == TokenKind::Identifier => {
                self.advance();
                self.parse_function_pointer(tok.span)
            }
            TokenKind::Thread => {
                self.advance();
                let operand = self.parse_unary();
                let span = tok.span.merge(operand.span());
                match operand {
                    Expr::Call(mut call) => {
                        call.thread = true;
                        call.span = span;
                        Expr::Call(call)
                    }
                    other => Expr::Thread {
                        operand: Box::new(other),
                        span,
                    },
                }
            }
            TokenKind::New => {
                self.advance();
                let class = self.eat(TokenKind::Identifier).map(|t| Ident {
                    name: self.text(t),
                    span: t.span,
                });
                let mut args = Vec::new();
                let mut end = class.as_ref().map(|c| c.span).unwrap_or(tok.span);
                if self.eat(TokenKind::OpenParen).is_some() {
                    if !self.check(TokenKind::CloseParen) {
                        args = self.parse_argument_list();
                    }
                    if let Some(close) = self.expect(TokenKind::CloseParen, ")") {
                        end = close.span;
                    }
                }
                let span = tok.span.merge(end);
                if !args.is_empty() {
                    let class_name = class.as_ref().map(|c| c.name.as_str()).unwrap_or("?");
                    self.error(DiagCode::UnexpectedConstructorArguments, span, &[class_name]);
                }
                Expr::New { class, args, span }
            }
            _ => self.parse_postfix(),
        }
    }

    fn parse_function_pointer(&mut self, amp_span: Span) -> Expr {
        let first = self.advance();
        if self.eat(TokenKind::ScopeResolution).is_some() {
            let name_tok = self.expect(TokenKind::Identifier, "function name");
            let (name, end) = match name_tok {
                Some(t) => (
                    Ident {
                        name: self.text(t),
                        span: t.span,
                    },
                    t.span,
                ),
                None => (
                    Ident {
                        name: String::new(),
                        span: first.span,
                    },
                    first.span,
                ),
            };
            Expr::FunctionPtr {
                namespace: Some(Ident {
                    name: self.text(first),
                    span: first.span,
                }),
                name,
                span: amp_span.merge(end),
            }
        } else {
            Expr::FunctionPtr {
                namespace: None,
                name: Ident {
                    name: self.text(first),
                    span: first.span,
                },
                span: amp_span.merge(first.span),
            }
        }
    }

    /// Kinds that can act as a callee name. The wait-family keywords are
    /// pseudo-functions; the data-flow analyzer owns their semantics.
    fn is_callee_name(kind: TokenKind) -> bool {
        matches!(
            kind,
            TokenKind::Identifier | TokenKind::Waittill | TokenKind::Waittillmatch
        )
    }

    fn parse_postfix(&mut self) -> Expr {
        let mut expr = self.parse_primary();
        loop {
            let tok = self.peek();
            match tok.kind {
                TokenKind::OpenParen => {
                    self.advance();
                    let args = if self.check(TokenKind::CloseParen) {
                        Vec::new()
                    } else {
                        self.parse_argument_list()
                    };
                    let end = self
                        .expect(TokenKind::CloseParen, ")")
                        .map(|t| t.span)
                        .unwrap_or(tok.span);
                    let span = expr.span().merge(end);
                    expr = Expr::Call(Box::new(CallExpr {
                        callee: expr,
                        called_on: None,
                        thread: false,
                        args,
                        span,
                    }));
                }
                TokenKind::OpenBracket => {
                    self.advance();
                    if self.check(TokenKind::OpenBracket) {
                        // `[[ptr]](args)` — call through a function pointer.
                        self.advance();
                        let pointer = self.parse_expr();
                        self.expect(TokenKind::CloseBracket, "]");
                        self.expect(TokenKind::CloseBracket, "]");
                        self.expect(TokenKind::OpenParen, "(");
                        let args = if self.check(TokenKind::CloseParen) {
                            Vec::new()
                        } else {
                            self.parse_argument_list()
                        };
                        let end = self
                            .expect(TokenKind::CloseParen, ")")
                            .map(|t| t.span)
                            .unwrap_or(tok.span);
                        let span = expr.span().merge(end);
                        expr = Expr::Call(Box::new(CallExpr {
                            callee: pointer,
                            called_on: Some(expr),
                            thread: false,
                            args,
                            span,
                        }));
                    } else {
                        let index = self.parse_expr();
                        let end = self
                            .expect(TokenKind::CloseBracket, "]")
                            .map(|t| t.span)
                            .unwrap_or_else(|| index.span());
                        let span = expr.span().merge(end);
                        expr = Expr::Index {
                            object: Box::new(expr),
                            index: Box::new(index),
                            span,
                        };
                    }
                }
                TokenKind::Dot => {
                    self.advance();
                    let prop = self.expect(TokenKind::Identifier, "member name");
                    match prop {
                        Some(p) => {
                            let span = expr.span().merge(p.span);
                            expr = Expr::Member {
                                object: Box::new(expr),
                                property: Ident {
                                    name: self.text(p),
                                    span: p.span,
                                },
                                span,
                            };
                        }
                        None => break,
                    }
                }
                TokenKind::Increment | TokenKind::Decrement => {
                    self.advance();
                    let span = expr.span().merge(tok.span);
                    expr = Expr::Increment {
                        target: Box::new(expr),
                        decrement: tok.kind == TokenKind::Decrement,
                        span,
                    };
                }
                // Called-on form: `obj f(args)`, `obj thread f(args)`,
                // `obj ns::f(args)`.
                kind if Self::is_callee_name(kind) || kind == TokenKind::Thread => {
                    let follows_call = match tok.kind {
                        TokenKind::Thread => true,
                        _ => matches!(
                            self.peek_second().kind,
                            TokenKind::OpenParen | TokenKind::ScopeResolution
                        ),
                    };
                    if !follows_call {
                        break;
                    }
                    let thread = self.eat(TokenKind::Thread).is_some();
                    let callee = self.parse_callee_name();
                    self.expect(TokenKind::OpenParen, "(");
                    let args = if self.check(TokenKind::CloseParen) {
                        Vec::new()
                    } else {
                        self.parse_argument_list()
                    };
                    let end = self
                        .expect(TokenKind::CloseParen, ")")
                        .map(|t| t.span)
                        .unwrap_or_else(|| callee.span());
                    let span = expr.span().merge(end);
                    expr = Expr::Call(Box::new(CallExpr {
                        callee,
                        called_on: Some(expr),
                        thread,
                        args,
                        span,
                    }));
                }
                _ => break,
            }
        }
        expr
    }

    fn parse_callee_name(&mut self) -> Expr {
        let first = self.peek();
        if Self::is_callee_name(first.kind) {
            self.advance();
            if self.check(TokenKind::ScopeResolution) {
                self.advance();
                let name_tok = self.expect(TokenKind::Identifier, "function name");
                if let Some(t) = name_tok {
                    return Expr::NamespacedRef {
                        namespace: Ident {
                            name: self.text(first),
                            span: first.span,
                        },
                        name: Ident {
                            name: self.text(t),
                            span: t.span,
                        },
                        span: first.span.merge(t.span),
                    };
                }
            }
            return Expr::Identifier {
                name: self.text(first),
                span: first.span,
            };
        }
        let shown = self.describe(first);
        self.error(DiagCode::ExpectedToken, first.span, &["function name", &shown]);
        Expr::Identifier {
            name: String::new(),
            span: Span::point(first.span.start),
        }
    }

    fn parse_argument_list(&mut self) -> Vec<Expr> {
        let mut args = vec![self.parse_expr()];
        while self.eat(TokenKind::Comma).is_some() {
            args.push(self.parse_expr());
        }
        args
    }

    fn parse_primary(&mut self) -> Expr {
        let tok = self.peek();
        match tok.kind {
            TokenKind::Integer => {
                self.advance();
                let text = self.text(tok);
                let value = text.parse::<i64>().unwrap_or(i64::MAX);
                Expr::Literal {
                    kind: LitKind::Int(value),
                    text,
                    span: tok.span,
                }
            }
            TokenKind::HexInteger => {
                self.advance();
                let text = self.text(tok);
                let digits = text.trim_start_matches("0x").trim_start_matches("0X");
                let value = i64::from_str_radix(digits, 16).unwrap_or(i64::MAX);
                Expr::Literal {
                    kind: LitKind::Int(value),
                    text,
                    span: tok.span,
                }
            }
            TokenKind::Float => {
                self.advance();
                let text = self.text(tok);
                let value = text.parse::<f64>().unwrap_or(0.0);
                Expr::Literal {
                    kind: LitKind::Float(value),
                    text,
                    span: tok.span,
                }
            }
            TokenKind::String | TokenKind::ErrorString => {
                self.advance();
                Expr::Literal {
                    kind: LitKind::String,
                    text: self.text(tok),
                    span: tok.span,
                }
            }
            TokenKind::IString => {
                self.advance();
                Expr::Literal {
                    kind: LitKind::IString,
                    text: self.text(tok),
                    span: tok.span,
                }
            }
            TokenKind::HashString => {
                self.advance();
                Expr::Literal {
                    kind: LitKind::HashString,
                    text: self.text(tok),
                    span: tok.span,
                }
            }
            TokenKind::True | TokenKind::False => {
                self.advance();
                Expr::Literal {
                    kind: LitKind::Bool(tok.kind == TokenKind::True),
                    text: self.text(tok),
                    span: tok.span,
                }
            }
            TokenKind::Undefined => {
                self.advance();
                Expr::Literal {
                    kind: LitKind::Undefined,
                    text: self.text(tok),
                    span: tok.span,
                }
            }
            TokenKind::AnimRef | TokenKind::AnimtreeDirective => {
                self.advance();
                Expr::AnimRef {
                    name: self.text(tok),
                    span: tok.span,
                }
            }
            kind if Self::is_callee_name(kind) => {
                self.advance();
                if self.check(TokenKind::ScopeResolution) {
                    self.advance();
                    let name_tok = self.expect(TokenKind::Identifier, "name");
                    if let Some(t) = name_tok {
                        return Expr::NamespacedRef {
                            namespace: Ident {
                                name: self.text(tok),
                                span: tok.span,
                            },
                            name: Ident {
                                name: self.text(t),
                                span: t.span,
                            },
                            span: tok.span.merge(t.span),
                        };
                    }
                }
                Expr::Identifier {
                    name: self.text(tok),
                    span: tok.span,
                }
            }
            TokenKind::OpenParen => {
                self.advance();
                let first = self.parse_expr();
                if self.check(TokenKind::Comma) {
                    // Vector literal `(x, y, z)`.
                    let mut components = vec![first];
                    while self.eat(TokenKind::Comma).is_some() {
                        components.push(self.parse_expr());
                    }
                    let end = self
                        .expect(TokenKind::CloseParen, ")")
                        .map(|t| t.span)
                        .unwrap_or(tok.span);
                    if components.len() != 3 {
                        let shown = components.len().to_string();
                        self.error(DiagCode::UnexpectedToken, tok.span.merge(end), &[&shown]);
                    }
                    Expr::Vector {
                        components,
                        span: tok.span.merge(end),
                    }
                } else {
                    self.expect(TokenKind::CloseParen, ")");
                    first
                }
            }
            TokenKind::OpenBracket => {
                self.advance();
                if let Some(close) = self.eat(TokenKind::CloseBracket) {
                    return Expr::EmptyArray {
                        span: tok.span.merge(close.span),
                    };
                }
                // `[a, b]` initialisers are rejected by the compiler.
                let mut end = tok.span;
                loop {
                    let inner = self.parse_expr();
                    end = inner.span();
                    if self.eat(TokenKind::Comma).is_none() {
                        break;
                    }
                }
                if let Some(close) = self.eat(TokenKind::CloseBracket) {
                    end = close.span;
                }
                self.error(
                    DiagCode::SquareBracketInitialisationNotSupported,
                    tok.span.merge(end),
                    &[],
                );
                Expr::EmptyArray {
                    span: tok.span.merge(end),
                }
            }
            _ => {
                let shown = self.describe(tok);
                self.error(DiagCode::ExpectedExpression, tok.span, &[&shown]);
                // Zero-width placeholder; the caller resynchronizes.
                Expr::Identifier {
                    name: String::new(),
                    span: Span::point(tok.span.start),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;
    use gscls_base::Interner;

    fn parse(source: &str) -> (Ast, Vec<Diagnostic>) {
        let mut interner = Interner::new();
        let lexed = Lexer::new(source, &mut interner).tokenize();
        let out = Parser::new(&lexed.tokens, &interner).parse();
        (out.ast, out.diagnostics)
    }

    fn only_function(ast: &Ast) -> &FunctionDef {
        match ast.items.first() {
            Some(ScriptItem::Function(f)) => f,
            other => panic!("expected a function item, got {other:?}"),
        }
    }

    #[test]
    fn simple_function_with_two_parameters() {
        let (ast, diags) = parse("function foo(a, b) { return a + b; }");
        assert!(diags.is_empty(), "{diags:?}");
        let f = only_function(&ast);
        assert_eq!(f.name.as_ref().unwrap().name, "foo");
        assert_eq!(f.params.len(), 2);
        assert_eq!(f.body.len(), 1);
        assert!(matches!(f.body[0], Stmt::Return { .. }));
    }

    #[test]
    fn using_directives_collected_before_definitions() {
        let (ast, diags) = parse("#using scripts\\shared\\util;\n#using scripts\\lib;\nfunction f() {}\n");
        assert!(diags.is_empty(), "{diags:?}");
        assert_eq!(ast.dependencies.len(), 2);
        assert_eq!(ast.dependencies[0].path, "scripts\\shared\\util");
        assert_eq!(ast.dependencies[1].path, "scripts\\lib");
    }

    #[test]
    fn using_after_definition_is_flagged() {
        let (_, diags) = parse("function f() {}\n#using scripts\\late;\n");
        assert!(diags.iter().any(|d| d.code == DiagCode::UnexpectedUsing));
    }

    #[test]
    fn namespace_directive_becomes_item() {
        let (ast, diags) = parse("#namespace util;\nfunction f() {}\n");
        assert!(diags.is_empty(), "{diags:?}");
        assert!(matches!(
            &ast.items[0],
            ScriptItem::Namespace { name, .. } if name.name == "util"
        ));
    }

    #[test]
    fn modifiers_before_function_keyword() {
        let (ast, diags) = parse("private autoexec function init() {}");
        assert!(diags.is_empty(), "{diags:?}");
        let f = only_function(&ast);
        assert!(f.private);
        assert!(f.autoexec);
    }

    #[test]
    fn modifier_after_function_keyword_is_flagged() {
        let (ast, diags) = parse("function private f() {}");
        assert!(diags
            .iter()
            .any(|d| d.code == DiagCode::UnexpectedFunctionModifier));
        // Still recorded so analysis sees the intended visibility.
        assert!(only_function(&ast).private);
    }

    #[test]
    fn parameter_defaults_and_by_ref() {
        let (ast, diags) = parse("function f(a, &b, c = 5) {}");
        assert!(diags.is_empty(), "{diags:?}");
        let f = only_function(&ast);
        assert!(!f.params[0].by_ref);
        assert!(f.params[1].by_ref);
        assert!(f.params[2].default.is_some());
    }

    #[test]
    fn vararg_must_be_last() {
        let (_, diags) = parse("function f(... , a) {}");
        assert!(diags
            .iter()
            .any(|d| d.code == DiagCode::VarargNotLastParameter));

        let (ast, diags) = parse("function g(a, ...) {}");
        assert!(diags.is_empty(), "{diags:?}");
        assert!(only_function(&ast).params[1].vararg);
    }

    #[test]
    fn class_with_members_and_inheritance() {
        let source = "class Dog : Animal {\n    var name;\n    constructor() {}\n    destructor() {}\n    function bark() {}\n}\n";
        let (ast, diags) = parse(source);
        assert!(diags.is_empty(), "{diags:?}");
        match &ast.items[0] {
            ScriptItem::Class(c) => {
                assert_eq!(c.name.as_ref().unwrap().name, "Dog");
                assert_eq!(c.parent.as_ref().unwrap().name, "Animal");
                assert_eq!(c.members.len(), 4);
            }
            other => panic!("expected class, got {other:?}"),
        }
    }

    #[test]
    fn constructor_parameters_are_rejected() {
        let (_, diags) = parse("class C { constructor(a) {} }");
        assert!(diags
            .iter()
            .any(|d| d.code == DiagCode::UnexpectedConstructorParameter));
    }

    #[test]
    fn switch_with_fallthrough_default() {
        let source = "function f(x) { switch(x){ case 1: a(); break; case 2: default: b(); break; } }";
        let (ast, diags) = parse(source);
        assert!(diags.is_empty(), "{diags:?}");
        let f = only_function(&ast);
        match &f.body[0] {
            Stmt::Switch { cases, .. } => {
                assert_eq!(cases.len(), 2);
                assert_eq!(cases[0].labels.len(), 1);
                // `case 2:` and `default:` stack on the second body.
                assert_eq!(cases[1].labels.len(), 2);
                assert!(matches!(cases[1].labels[1], CaseLabel::Default { .. }));
            }
            other => panic!("expected switch, got {other:?}"),
        }
    }

    #[test]
    fn doc_comment_attaches_to_next_function() {
        let source = "/@ Name: foo\nSummary: does things @/\nfunction foo() {}";
        let (ast, _) = parse(source);
        let f = only_function(&ast);
        assert!(f.doc.as_ref().unwrap().contains("Summary"));
    }

    #[test]
    fn vector_literal_in_expression_position() {
        let (ast, diags) = parse("function f() { v = (0, 1, 0); }");
        assert!(diags.is_empty(), "{diags:?}");
        let f = only_function(&ast);
        match &f.body[0] {
            Stmt::Expr { expr: Expr::Assign { value, .. }, .. } => {
                assert!(matches!(**value, Expr::Vector { .. }));
            }
            other => panic!("expected assignment, got {other:?}"),
        }
    }

    #[test]
    fn array_initialiser_with_members_is_rejected() {
        let (_, diags) = parse("function f() { a = [1, 2]; }");
        assert!(diags
            .iter()
            .any(|d| d.code == DiagCode::SquareBracketInitialisationNotSupported));

        let (_, empty_ok) = parse("function f() { a = []; }");
        assert!(empty_ok.is_empty(), "{empty_ok:?}");
    }

    #[test]
    fn called_on_and_thread_calls() {
        let (ast, diags) = parse("function f() { self thread watch(); level notify(\"done\"); }");
        assert!(diags.is_empty(), "{diags:?}");
        let f = only_function(&ast);
        match &f.body[0] {
            Stmt::Expr { expr: Expr::Call(call), .. } => {
                assert!(call.thread);
                assert!(call.called_on.is_some());
            }
            other => panic!("expected call, got {other:?}"),
        }
    }

    #[test]
    fn namespaced_call_and_function_pointer() {
        let (ast, diags) = parse("function f() { util::helper(); ptr = &util::helper; }");
        assert!(diags.is_empty(), "{diags:?}");
        let f = only_function(&ast);
        match &f.body[0] {
            Stmt::Expr { expr: Expr::Call(call), .. } => {
                assert!(matches!(call.callee, Expr::NamespacedRef { .. }));
            }
            other => panic!("expected namespaced call, got {other:?}"),
        }
        match &f.body[1] {
            Stmt::Expr { expr: Expr::Assign { value, .. }, .. } => {
                assert!(matches!(**value, Expr::FunctionPtr { .. }));
            }
            other => panic!("expected pointer assignment, got {other:?}"),
        }
    }

    #[test]
    fn function_pointer_call_through_brackets() {
        let (ast, diags) = parse("function f(cb) { self [[cb]](1); }");
        assert!(diags.is_empty(), "{diags:?}");
        let f = only_function(&ast);
        match &f.body[0] {
            Stmt::Expr { expr: Expr::Call(call), .. } => {
                assert!(call.called_on.is_some());
                assert_eq!(call.args.len(), 1);
            }
            other => panic!("expected pointer call, got {other:?}"),
        }
    }

    #[test]
    fn wait_variants_parse() {
        let (ast, diags) =
            parse("function f() { wait 0.05; waitrealtime 1; waittillframeend; }");
        assert!(diags.is_empty(), "{diags:?}");
        let f = only_function(&ast);
        assert!(matches!(f.body[0], Stmt::Wait { .. }));
        assert!(matches!(f.body[1], Stmt::WaitRealtime { .. }));
        assert!(matches!(f.body[2], Stmt::WaittillFrameEnd { .. }));
    }

    #[test]
    fn foreach_with_key_value() {
        let (ast, diags) = parse("function f(arr) { foreach (k, v in arr) { } }");
        assert!(diags.is_empty(), "{diags:?}");
        let f = only_function(&ast);
        match &f.body[0] {
            Stmt::Foreach { key, value, .. } => {
                assert_eq!(key.as_ref().unwrap().name, "k");
                assert_eq!(value.name, "v");
            }
            other => panic!("expected foreach, got {other:?}"),
        }
    }

    #[test]
    fn error_recovery_continues_after_bad_statement() {
        let (ast, diags) = parse("function f() { = ; x = 1; }");
        assert!(!diags.is_empty());
        let f = only_function(&ast);
        assert!(
            f.body
                .iter()
                .any(|s| matches!(s, Stmt::Expr { expr: Expr::Assign { .. }, .. })),
            "good statement after the bad one should still parse: {:?}",
            f.body
        );
    }

    #[test]
    fn malformed_function_yields_placeholder_name() {
        let (ast, diags) = parse("function () {}");
        assert!(!diags.is_empty());
        assert!(only_function(&ast).name.is_none());
    }

    #[test]
    fn new_with_arguments_is_reported_but_parsed() {
        let (ast, diags) = parse("function f() { d = new Dog(1); }");
        assert!(diags
            .iter()
            .any(|d| d.code == DiagCode::UnexpectedConstructorArguments));
        let f = only_function(&ast);
        match &f.body[0] {
            Stmt::Expr { expr: Expr::Assign { value, .. }, .. } => match &**value {
                Expr::New { class, args, .. } => {
                    assert_eq!(class.as_ref().unwrap().name, "Dog");
                    assert_eq!(args.len(), 1);
                }
                other => panic!("expected new, got {other:?}"),
            },
            other => panic!("expected assignment, got {other:?}"),
        }
    }

    #[test]
    fn dev_block_statements_parse_normally() {
        let (ast, diags) = parse("function f() { /# println(\"dbg\"); #/ }");
        assert!(diags.is_empty(), "{diags:?}");
        let f = only_function(&ast);
        match &f.body[0] {
            Stmt::DevBlock { body, .. } => assert_eq!(body.len(), 1),
            other => panic!("expected dev block, got {other:?}"),
        }
    }

    #[test]
    fn precedence_or_binds_loosest() {
        let (ast, diags) = parse("function f(a, b, c) { x = a || b && c == 1 + 2 * 3; }");
        assert!(diags.is_empty(), "{diags:?}");
        let f = only_function(&ast);
        match &f.body[0] {
            Stmt::Expr { expr: Expr::Assign { value, .. }, .. } => match &**value {
                Expr::Binary { op, .. } => assert_eq!(*op, BinOp::Or),
                other => panic!("expected binary, got {other:?}"),
            },
            other => panic!("expected assignment, got {other:?}"),
        }
    }

    #[test]
    fn const_statement_parses() {
        let (ast, diags) = parse("function f() { const max = 10; }");
        assert!(diags.is_empty(), "{diags:?}");
        let f = only_function(&ast);
        assert!(matches!(&f.body[0], Stmt::Const { name, .. } if name.name == "max"));
    }
}
