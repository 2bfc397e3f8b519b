//! Single-pass byte lexer for GSC/CSC source.
//!
//! Produces a token vector bracketed by synthetic `StartOfFile`/`EndOfFile`
//! sentinels. Longest-match applies across overlapping prefixes (`<<=` over
//! `<<` over `<`), keywords are matched case-insensitively and only at word
//! boundaries, and comments and whitespace are kept in the stream so the
//! concatenation of all lexemes reproduces the input byte-for-byte.
//!
//! ## Insert re-lexing
//!
//! When the preprocessor splices a file referenced by `#insert`, it re-lexes
//! the file's contents with a *forced range*: every produced token is stamped
//! with the directive's visible span while its real position in the inserted
//! file is retained in [`TokenOrigin::Insert`], so diagnostics can point at
//! the original file.

use gscls_base::{Interner, Span};

use crate::diag::{DiagCode, Diagnostic};
use crate::token::{Token, TokenKind, TokenOrigin};

pub struct LexOutput {
    pub tokens: Vec<Token>,
    pub diagnostics: Vec<Diagnostic>,
}

pub struct Lexer<'a> {
    source: &'a str,
    bytes: &'a [u8],
    pos: usize,
    interner: &'a mut Interner,
    /// When set, every token's visible span becomes this range and its real
    /// range moves into `TokenOrigin::Insert`.
    forced: Option<Span>,
    tokens: Vec<Token>,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str, interner: &'a mut Interner) -> Self {
        Self::with_forced(source, interner, None)
    }

    /// Lexer variant for `#insert` content; see the module docs.
    pub fn for_insert(source: &'a str, interner: &'a mut Interner, visible: Span) -> Self {
        Self::with_forced(source, interner, Some(visible))
    }

    fn with_forced(source: &'a str, interner: &'a mut Interner, forced: Option<Span>) -> Self {
        Lexer {
            source,
            bytes: source.as_bytes(),
            pos: 0,
            interner,
            forced,
            tokens: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    pub fn tokenize(mut self) -> LexOutput {
        self.push_sentinel(TokenKind::StartOfFile, 0);
        while self.pos < self.bytes.len() {
            self.next_token();
        }
        self.push_sentinel(TokenKind::EndOfFile, self.bytes.len());
        LexOutput {
            tokens: self.tokens,
            diagnostics: self.diagnostics,
        }
    }

    fn push_sentinel(&mut self, kind: TokenKind, offset: usize) {
        // Sentinels carry no lexeme and are skipped when splicing inserts.
        if self.forced.is_some() {
            return;
        }
        self.tokens.push(Token::new(
            kind,
            Span::point(offset),
            gscls_base::Symbol::EMPTY,
        ));
    }

    fn emit(&mut self, kind: TokenKind, start: usize) {
        let real = Span::new(start, self.pos);
        let lexeme = self.interner.intern(&self.source[start..self.pos]);
        let (span, origin) = match self.forced {
            Some(visible) => (visible, TokenOrigin::Insert { source: real }),
            None => (real, TokenOrigin::Source),
        };
        self.tokens.push(Token {
            kind,
            span,
            lexeme,
            origin,
        });
    }

    fn diag(&mut self, code: DiagCode, real: Span, args: &[&str]) {
        let span = self.forced.unwrap_or(real);
        self.diagnostics.push(Diagnostic::new(code, span, args));
    }

    fn peek(&self) -> u8 {
        self.bytes.get(self.pos).copied().unwrap_or(0)
    }

    fn peek_at(&self, offset: usize) -> u8 {
        self.bytes.get(self.pos + offset).copied().unwrap_or(0)
    }

    fn next_token(&mut self) {
        let start = self.pos;
        let b = self.bytes[self.pos];
        match b {
            b' ' | b'\t' => {
                while matches!(self.peek(), b' ' | b'\t') {
                    self.pos += 1;
                }
                self.emit(TokenKind::Whitespace, start);
            }
            b'\r' => {
                self.pos += 1;
                if self.peek() == b'\n' {
                    self.pos += 1; // CR+LF is one line break
                }
                self.emit(TokenKind::LineBreak, start);
            }
            b'\n' => {
                self.pos += 1;
                self.emit(TokenKind::LineBreak, start);
            }
            b'/' => self.lex_slash(start),
            b'#' => self.lex_hash(start),
            b'&' => self.lex_ampersand(start),
            b'"' => self.lex_string(start, TokenKind::String),
            b'%' => {
                self.pos += 1;
                if is_word_start(self.peek()) {
                    while is_word_continue(self.peek()) {
                        self.pos += 1;
                    }
                    self.emit(TokenKind::AnimRef, start);
                } else if self.peek() == b'=' {
                    self.pos += 1;
                    self.emit(TokenKind::PercentAssign, start);
                } else {
                    self.emit(TokenKind::Percent, start);
                }
            }
            b'0'..=b'9' => self.lex_number(start),
            b'.' => {
                if self.peek_at(1) == b'.' && self.peek_at(2) == b'.' {
                    self.pos += 3;
                    self.emit(TokenKind::VarargDots, start);
                } else if self.peek_at(1).is_ascii_digit() {
                    // Leading-dot float: `.5`
                    self.pos += 1;
                    while self.peek().is_ascii_digit() {
                        self.pos += 1;
                    }
                    self.emit(TokenKind::Float, start);
                } else {
                    self.pos += 1;
                    self.emit(TokenKind::Dot, start);
                }
            }
            _ if is_word_start(b) => {
                while is_word_continue(self.peek()) {
                    self.pos += 1;
                }
                let kind = keyword_kind(&self.source[start..self.pos])
                    .unwrap_or(TokenKind::Identifier);
                self.emit(kind, start);
            }
            _ => self.lex_operator_or_unknown(start),
        }
    }

    fn lex_slash(&mut self, start: usize) {
        match self.peek_at(1) {
            b'/' => {
                self.pos += 2;
                while self.pos < self.bytes.len() && !matches!(self.peek(), b'\n' | b'\r') {
                    self.pos += 1;
                }
                self.emit(TokenKind::LineComment, start);
            }
            b'*' => {
                self.pos += 2;
                self.consume_until_pair(b'*', b'/');
                self.emit(TokenKind::BlockComment, start);
            }
            b'@' => {
                self.pos += 2;
                self.consume_until_pair(b'@', b'/');
                self.emit(TokenKind::DocComment, start);
            }
            b'#' => {
                self.pos += 2;
                self.emit(TokenKind::OpenDevBlock, start);
            }
            b'=' => {
                self.pos += 2;
                self.emit(TokenKind::SlashAssign, start);
            }
            _ => {
                self.pos += 1;
                self.emit(TokenKind::Slash, start);
            }
        }
    }

    /// Consumes bytes up to and including the two-byte terminator, or to EOF.
    fn consume_until_pair(&mut self, first: u8, second: u8) {
        while self.pos < self.bytes.len() {
            if self.peek() == first && self.peek_at(1) == second {
                self.pos += 2;
                return;
            }
            self.pos += 1;
        }
    }

    fn lex_hash(&mut self, start: usize) {
        match self.peek_at(1) {
            b'"' => {
                self.pos += 1;
                self.lex_string(start, TokenKind::HashString);
            }
            b'/' => {
                self.pos += 2;
                self.emit(TokenKind::CloseDevBlock, start);
            }
            _ => {
                self.pos += 1;
                while is_word_continue(self.peek()) {
                    self.pos += 1;
                }
                let word = &self.source[start..self.pos];
                match directive_kind(word) {
                    Some(kind) => self.emit(kind, start),
                    None => {
                        let owned = word.to_string();
                        self.emit(TokenKind::Unknown, start);
                        self.diag(
                            DiagCode::UnexpectedCharacter,
                            Span::new(start, self.pos),
                            &[&owned],
                        );
                    }
                }
            }
        }
    }

    fn lex_ampersand(&mut self, start: usize) {
        match self.peek_at(1) {
            b'"' => {
                self.pos += 1;
                self.lex_string(start, TokenKind::IString);
            }
            b'&' => {
                self.pos += 2;
                self.emit(TokenKind::AmpAmp, start);
            }
            b'=' => {
                self.pos += 2;
                self.emit(TokenKind::AmpAssign, start);
            }
            _ => {
                self.pos += 1;
                self.emit(TokenKind::Amp, start);
            }
        }
    }

    /// Lexes a `"…"` body starting at the opening quote. `start` may precede
    /// the quote for `&"…"` and `#"…"` flavors. A line break before the
    /// closing quote fails the literal with kind `ErrorString`.
    fn lex_string(&mut self, start: usize, kind: TokenKind) {
        debug_assert_eq!(self.peek(), b'"');
        self.pos += 1;
        loop {
            match self.peek() {
                0 if self.pos >= self.bytes.len() => {
                    self.emit(TokenKind::ErrorString, start);
                    self.diag(DiagCode::UnterminatedString, Span::new(start, self.pos), &[]);
                    return;
                }
                b'\n' | b'\r' => {
                    self.emit(TokenKind::ErrorString, start);
                    self.diag(DiagCode::UnterminatedString, Span::new(start, self.pos), &[]);
                    return;
                }
                b'\\' => {
                    // Escape: skip the next byte whatever it is, except a
                    // line break which still fails the literal.
                    if matches!(self.peek_at(1), b'\n' | b'\r') {
                        self.pos += 1;
                    } else {
                        self.pos += 2;
                    }
                }
                b'"' => {
                    self.pos += 1;
                    self.emit(kind, start);
                    return;
                }
                _ => self.pos += 1,
            }
        }
    }

    fn lex_number(&mut self, start: usize) {
        if self.peek() == b'0' && matches!(self.peek_at(1), b'x' | b'X') {
            self.pos += 2;
            while self.peek().is_ascii_hexdigit() {
                self.pos += 1;
            }
            self.emit(TokenKind::HexInteger, start);
            return;
        }
        while self.peek().is_ascii_digit() {
            self.pos += 1;
        }
        // A dot continues the literal as a float unless it begins `...`.
        if self.peek() == b'.' && self.peek_at(1) != b'.' {
            self.pos += 1;
            while self.peek().is_ascii_digit() {
                self.pos += 1;
            }
            self.emit(TokenKind::Float, start);
        } else {
            self.emit(TokenKind::Integer, start);
        }
    }

    fn lex_operator_or_unknown(&mut self, start: usize) {
        let b = self.bytes[self.pos];
        let two = (b, self.peek_at(1));
        let three = (b, self.peek_at(1), self.peek_at(2));

        let (kind, len) = match three {
            (b'=', b'=', b'=') => (TokenKind::Identity, 3),
            (b'!', b'=', b'=') => (TokenKind::NotIdentity, 3),
            (b'<', b'<', b'=') => (TokenKind::ShiftLeftAssign, 3),
            (b'>', b'>', b'=') => (TokenKind::ShiftRightAssign, 3),
            _ => match two {
                (b'=', b'=') => (TokenKind::Equals, 2),
                (b'!', b'=') => (TokenKind::NotEquals, 2),
                (b'<', b'=') => (TokenKind::LessEquals, 2),
                (b'>', b'=') => (TokenKind::GreaterEquals, 2),
                (b'<', b'<') => (TokenKind::ShiftLeft, 2),
                (b'>', b'>') => (TokenKind::ShiftRight, 2),
                (b'+', b'+') => (TokenKind::Increment, 2),
                (b'-', b'-') => (TokenKind::Decrement, 2),
                (b'+', b'=') => (TokenKind::PlusAssign, 2),
                (b'-', b'=') => (TokenKind::MinusAssign, 2),
                (b'*', b'=') => (TokenKind::StarAssign, 2),
                (b'|', b'=') => (TokenKind::PipeAssign, 2),
                (b'^', b'=') => (TokenKind::CaretAssign, 2),
                (b'|', b'|') => (TokenKind::PipePipe, 2),
                (b':', b':') => (TokenKind::ScopeResolution, 2),
                _ => match b {
                    b'(' => (TokenKind::OpenParen, 1),
                    b')' => (TokenKind::CloseParen, 1),
                    b'{' => (TokenKind::OpenBrace, 1),
                    b'}' => (TokenKind::CloseBrace, 1),
                    b'[' => (TokenKind::OpenBracket, 1),
                    b']' => (TokenKind::CloseBracket, 1),
                    b';' => (TokenKind::Semicolon, 1),
                    b',' => (TokenKind::Comma, 1),
                    b':' => (TokenKind::Colon, 1),
                    b'=' => (TokenKind::Assign, 1),
                    b'+' => (TokenKind::Plus, 1),
                    b'-' => (TokenKind::Minus, 1),
                    b'*' => (TokenKind::Star, 1),
                    b'|' => (TokenKind::Pipe, 1),
                    b'^' => (TokenKind::Caret, 1),
                    b'~' => (TokenKind::Tilde, 1),
                    b'!' => (TokenKind::Bang, 1),
                    b'<' => (TokenKind::LessThan, 1),
                    b'>' => (TokenKind::GreaterThan, 1),
                    b'\\' => (TokenKind::Backslash, 1),
                    _ => {
                        // Step over a whole UTF-8 scalar, not one byte.
                        let ch_len = self.source[start..]
                            .chars()
                            .next()
                            .map_or(1, |c| c.len_utf8());
                        self.pos += ch_len;
                        let owned = self.source[start..self.pos].to_string();
                        self.emit(TokenKind::Unknown, start);
                        self.diag(
                            DiagCode::UnexpectedCharacter,
                            Span::new(start, self.pos),
                            &[&owned],
                        );
                        return;
                    }
                },
            },
        };
        self.pos += len;
        self.emit(kind, start);
    }
}

fn is_word_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_'
}

fn is_word_continue(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Keyword lookup, case-insensitive as the language itself is.
fn keyword_kind(word: &str) -> Option<TokenKind> {
    let lower = word.to_ascii_lowercase();
    let kind = match lower.as_str() {
        "function" => TokenKind::Function,
        "class" => TokenKind::Class,
        "if" => TokenKind::If,
        "while" => TokenKind::While,
        "do" => TokenKind::Do,
        "for" => TokenKind::For,
        "foreach" => TokenKind::Foreach,
        "in" => TokenKind::In,
        "switch" => TokenKind::Switch,
        "case" => TokenKind::Case,
        "default" => TokenKind::Default,
        "break" => TokenKind::Break,
        "continue" => TokenKind::Continue,
        "return" => TokenKind::Return,
        "thread" => TokenKind::Thread,
        "new" => TokenKind::New,
        "const" => TokenKind::Const,
        "private" => TokenKind::Private,
        "autoexec" => TokenKind::Autoexec,
        "constructor" => TokenKind::Constructor,
        "destructor" => TokenKind::Destructor,
        "var" => TokenKind::Var,
        "else" => TokenKind::Else,
        "true" => TokenKind::True,
        "false" => TokenKind::False,
        "undefined" => TokenKind::Undefined,
        "waittill" => TokenKind::Waittill,
        "waittillmatch" => TokenKind::Waittillmatch,
        "waittillframeend" => TokenKind::Waittillframeend,
        "waitrealtime" => TokenKind::Waitrealtime,
        "wait" => TokenKind::Wait,
        _ => return None,
    };
    Some(kind)
}

fn directive_kind(word: &str) -> Option<TokenKind> {
    let kind = match word.to_ascii_lowercase().as_str() {
        "#using" => TokenKind::UsingDirective,
        "#insert" => TokenKind::InsertDirective,
        "#define" => TokenKind::DefineDirective,
        "#namespace" => TokenKind::NamespaceDirective,
        "#precache" => TokenKind::PrecacheDirective,
        "#using_animtree" => TokenKind::UsingAnimtreeDirective,
        "#animtree" => TokenKind::AnimtreeDirective,
        "#if" => TokenKind::IfDirective,
        "#elif" => TokenKind::ElifDirective,
        "#else" => TokenKind::ElseDirective,
        "#endif" => TokenKind::EndifDirective,
        _ => return None,
    };
    Some(kind)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(source: &str) -> (Vec<Token>, Vec<Diagnostic>, Interner) {
        let mut interner = Interner::new();
        let out = Lexer::new(source, &mut interner).tokenize();
        (out.tokens, out.diagnostics, interner)
    }

    fn kinds(tokens: &[Token]) -> Vec<TokenKind> {
        tokens
            .iter()
            .map(|t| t.kind)
            .filter(|k| !matches!(k, TokenKind::StartOfFile | TokenKind::EndOfFile))
            .collect()
    }

    #[test]
    fn stream_is_bracketed_by_sentinels() {
        let (tokens, _, _) = lex("x");
        assert_eq!(tokens.first().unwrap().kind, TokenKind::StartOfFile);
        assert_eq!(tokens.last().unwrap().kind, TokenKind::EndOfFile);
    }

    #[test]
    fn lexeme_concatenation_reproduces_input() {
        let source = "function foo(a, b) {\r\n    // add\r\n    return a + b;\r\n}\r\n";
        let (tokens, diags, interner) = lex(source);
        assert!(diags.is_empty(), "unexpected diagnostics: {diags:?}");
        let rebuilt: String = tokens
            .iter()
            .map(|t| interner.resolve(t.lexeme))
            .collect();
        assert_eq!(rebuilt, source);
    }

    #[test]
    fn token_starts_are_monotonic() {
        let source = "a = b + 0x1F; wait .5;";
        let (tokens, _, _) = lex(source);
        let starts: Vec<usize> = tokens.iter().map(|t| t.span.start).collect();
        let mut sorted = starts.clone();
        sorted.sort_unstable();
        assert_eq!(starts, sorted);
        for t in &tokens {
            assert!(t.span.end >= t.span.start);
        }
    }

    #[test]
    fn keywords_require_word_boundary() {
        let (tokens, _, interner) = lex("iffy if");
        let ks = kinds(&tokens);
        assert_eq!(
            ks,
            vec![TokenKind::Identifier, TokenKind::Whitespace, TokenKind::If]
        );
        assert_eq!(interner.resolve(tokens[1].lexeme), "iffy");
    }

    #[test]
    fn keywords_match_case_insensitively() {
        let (tokens, _, _) = lex("Function FOREACH");
        assert_eq!(
            kinds(&tokens),
            vec![
                TokenKind::Function,
                TokenKind::Whitespace,
                TokenKind::Foreach
            ]
        );
    }

    #[test]
    fn leading_dot_is_float_and_triple_dot_is_vararg() {
        let (tokens, _, _) = lex(".5 ... .");
        assert_eq!(
            kinds(&tokens),
            vec![
                TokenKind::Float,
                TokenKind::Whitespace,
                TokenKind::VarargDots,
                TokenKind::Whitespace,
                TokenKind::Dot
            ]
        );
    }

    #[test]
    fn hex_integer_and_float_literals() {
        let (tokens, _, _) = lex("0x1F 12.5 7");
        assert_eq!(
            kinds(&tokens),
            vec![
                TokenKind::HexInteger,
                TokenKind::Whitespace,
                TokenKind::Float,
                TokenKind::Whitespace,
                TokenKind::Integer
            ]
        );
    }

    #[test]
    fn equality_flavors_longest_match() {
        let (tokens, _, _) = lex("a === b == c");
        let ks = kinds(&tokens);
        assert!(ks.contains(&TokenKind::Identity));
        assert!(ks.contains(&TokenKind::Equals));
    }

    #[test]
    fn compound_shift_assign_is_one_token() {
        let (tokens, _, _) = lex("a <<= 2;");
        assert!(kinds(&tokens).contains(&TokenKind::ShiftLeftAssign));
    }

    #[test]
    fn crlf_pair_is_a_single_line_break() {
        let (tokens, _, _) = lex("a\r\nb");
        let breaks: Vec<_> = tokens
            .iter()
            .filter(|t| t.kind == TokenKind::LineBreak)
            .collect();
        assert_eq!(breaks.len(), 1);
        assert_eq!(breaks[0].span, Span::new(1, 3));
    }

    #[test]
    fn string_flavors_are_distinct_kinds() {
        let (tokens, _, _) = lex(r#""plain" &"istring" #"hashed""#);
        let ks = kinds(&tokens);
        assert!(ks.contains(&TokenKind::String));
        assert!(ks.contains(&TokenKind::IString));
        assert!(ks.contains(&TokenKind::HashString));
    }

    #[test]
    fn string_with_embedded_newline_fails() {
        let (tokens, diags, _) = lex("\"abc\ndef\"");
        assert!(kinds(&tokens).contains(&TokenKind::ErrorString));
        assert_eq!(diags.len(), 2, "open and dangling-quote halves both fail");
        assert_eq!(diags[0].code, DiagCode::UnterminatedString);
    }

    #[test]
    fn string_escapes_cover_quotes() {
        let (tokens, diags, interner) = lex(r#""say \"hi\"""#);
        assert!(diags.is_empty());
        let strings: Vec<_> = tokens
            .iter()
            .filter(|t| t.kind == TokenKind::String)
            .collect();
        assert_eq!(strings.len(), 1);
        assert_eq!(interner.resolve(strings[0].lexeme), r#""say \"hi\"""#);
    }

    #[test]
    fn anim_identifier() {
        let (tokens, _, interner) = lex("%root_anim");
        assert_eq!(kinds(&tokens), vec![TokenKind::AnimRef]);
        assert_eq!(interner.resolve(tokens[1].lexeme), "%root_anim");
    }

    #[test]
    fn comment_kinds_are_preserved() {
        let (tokens, _, _) = lex("// line\n/* block */ /@ doc @/");
        let ks = kinds(&tokens);
        assert!(ks.contains(&TokenKind::LineComment));
        assert!(ks.contains(&TokenKind::BlockComment));
        assert!(ks.contains(&TokenKind::DocComment));
    }

    #[test]
    fn dev_block_delimiters() {
        let (tokens, _, _) = lex("/# x = 1; #/");
        let ks = kinds(&tokens);
        assert_eq!(ks.first(), Some(&TokenKind::OpenDevBlock));
        assert_eq!(ks.last(), Some(&TokenKind::CloseDevBlock));
    }

    #[test]
    fn preprocessor_words_lex_as_directives() {
        let (tokens, _, _) = lex("#using scripts\\shared;\n#define X 1\n#if DEBUG\n#endif");
        let ks = kinds(&tokens);
        assert!(ks.contains(&TokenKind::UsingDirective));
        assert!(ks.contains(&TokenKind::DefineDirective));
        assert!(ks.contains(&TokenKind::IfDirective));
        assert!(ks.contains(&TokenKind::EndifDirective));
    }

    #[test]
    fn unknown_character_yields_diagnostic() {
        let (tokens, diags, _) = lex("a $ b");
        assert!(kinds(&tokens).contains(&TokenKind::Unknown));
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].code, DiagCode::UnexpectedCharacter);
        assert!(diags[0].message.contains('$'));
    }

    #[test]
    fn relexing_lexemes_is_stable() {
        let source = "function f() { wait 0.05; }";
        let (tokens, _, interner) = lex(source);
        let rebuilt: String = tokens.iter().map(|t| interner.resolve(t.lexeme)).collect();
        let (again, _, interner2) = lex(&rebuilt);
        let a: Vec<_> = tokens
            .iter()
            .filter(|t| !t.kind.is_trivia())
            .map(|t| (t.kind, interner.resolve(t.lexeme).to_string()))
            .collect();
        let b: Vec<_> = again
            .iter()
            .filter(|t| !t.kind.is_trivia())
            .map(|t| (t.kind, interner2.resolve(t.lexeme).to_string()))
            .collect();
        assert_eq!(a, b);
    }

    #[test]
    fn forced_range_stamps_visible_span_and_keeps_source() {
        let mut interner = Interner::new();
        let visible = Span::new(100, 120);
        let out = Lexer::for_insert("x = 1;", &mut interner, visible).tokenize();
        assert!(!out.tokens.is_empty());
        for tok in &out.tokens {
            assert_eq!(tok.span, visible);
            match tok.origin {
                TokenOrigin::Insert { source } => {
                    assert!(source.end <= 6, "source span must index the inserted text");
                }
                other => panic!("expected insert origin, got {other:?}"),
            }
        }
    }
}
