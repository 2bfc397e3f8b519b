//! Token types for the GSC/CSC lexer and parser.
//!
//! Tokens are the atomic syntactic units produced by the lexer and rewritten
//! by the preprocessor. Comments and whitespace are preserved in the stream:
//! the parser skips them, but folding, doc extraction and the exact-round-trip
//! invariant (concatenating all lexemes reproduces the input) depend on them
//! being there.
//!
//! ## Token Categories
//!
//! | Category | Examples |
//! |----------|----------|
//! | Punctuation | `(` `)` `{` `}` `[` `]` `;` `,` `::` |
//! | Operators | `+` `<<=` `===` `&&` `++` |
//! | Keywords | `function` `foreach` `waittillmatch` |
//! | Preprocessor | `#using` `#define` `#if` |
//! | Literals | `42` `0x1F` `.5` `"text"` `&"WEAPON_HINT"` `#"hash"` `%root_anim` |
//! | Trivia | whitespace, line breaks, `//`, `/* */`, `/@ @/` |

use gscls_base::{Span, Symbol};

/// Where a token came from, for diagnostic fidelity after preprocessing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TokenOrigin {
    /// Lexed directly from the script file.
    #[default]
    Source,
    /// Produced by macro expansion. `definition` is the span of the token
    /// inside the `#define` body; the token's own span is the invocation site.
    Macro { definition: Span },
    /// Spliced in by `#insert`. `source` is the token's real span inside the
    /// inserted file; the token's own span is the directive site.
    Insert { source: Span },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    // Sentinels bracketing every stream
    StartOfFile,
    EndOfFile,

    // Punctuation
    OpenParen,
    CloseParen,
    OpenBrace,
    CloseBrace,
    OpenBracket,
    CloseBracket,
    OpenDevBlock,  // `/#`
    CloseDevBlock, // `#/`
    Semicolon,
    Comma,
    Colon,
    ScopeResolution, // `::`
    Dot,
    VarargDots, // `...`
    Backslash,  // path separator in `#using`/`#insert`, line continuation in `#define`

    // Operators
    Assign,
    PlusAssign,
    MinusAssign,
    StarAssign,
    SlashAssign,
    PercentAssign,
    AmpAssign,
    PipeAssign,
    CaretAssign,
    ShiftLeftAssign,
    ShiftRightAssign,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Amp,
    Pipe,
    Caret,
    Tilde,
    Bang,
    ShiftLeft,
    ShiftRight,
    AmpAmp,
    PipePipe,
    Equals,       // `==`
    NotEquals,    // `!=`
    Identity,     // `===`
    NotIdentity,  // `!==`
    LessThan,
    GreaterThan,
    LessEquals,
    GreaterEquals,
    Increment, // `++`
    Decrement, // `--`

    // Keywords
    Function,
    Class,
    If,
    While,
    Do,
    For,
    Foreach,
    In,
    Switch,
    Case,
    Default,
    Break,
    Continue,
    Return,
    Thread,
    New,
    Const,
    Private,
    Autoexec,
    Constructor,
    Destructor,
    Var,
    Else,
    True,
    False,
    Undefined,
    Waittill,
    Waittillmatch,
    Waittillframeend,
    Waitrealtime,
    Wait,

    // Preprocessor directives
    UsingDirective,        // `#using`
    InsertDirective,       // `#insert`
    DefineDirective,       // `#define`
    NamespaceDirective,    // `#namespace`
    PrecacheDirective,     // `#precache`
    UsingAnimtreeDirective, // `#using_animtree`
    AnimtreeDirective,     // `#animtree`
    IfDirective,           // `#if`
    ElifDirective,         // `#elif`
    ElseDirective,         // `#else`
    EndifDirective,        // `#endif`

    // Literals
    Integer,
    HexInteger,
    Float,
    String,
    IString,     // `&"…"` internationalized string
    HashString,  // `#"…"` compiler-hash string
    ErrorString, // string literal with an embedded line break
    AnimRef,     // `%name`

    Identifier,

    // Comments, preserved in the stream
    LineComment,
    BlockComment,
    DocComment, // `/@ … @/`

    // Trivia
    Whitespace,
    LineBreak,

    /// A byte no rule recognizes; carries an `UnexpectedCharacter` diagnostic.
    Unknown,
}

impl TokenKind {
    /// Tokens the parser skips unconditionally.
    pub fn is_trivia(self) -> bool {
        matches!(
            self,
            TokenKind::Whitespace
                | TokenKind::LineBreak
                | TokenKind::LineComment
                | TokenKind::BlockComment
        )
    }

    /// Comment kinds, including doc comments.
    pub fn is_comment(self) -> bool {
        matches!(
            self,
            TokenKind::LineComment | TokenKind::BlockComment | TokenKind::DocComment
        )
    }

    pub fn is_keyword(self) -> bool {
        matches!(
            self,
            TokenKind::Function
                | TokenKind::Class
                | TokenKind::If
                | TokenKind::While
                | TokenKind::Do
                | TokenKind::For
                | TokenKind::Foreach
                | TokenKind::In
                | TokenKind::Switch
                | TokenKind::Case
                | TokenKind::Default
                | TokenKind::Break
                | TokenKind::Continue
                | TokenKind::Return
                | TokenKind::Thread
                | TokenKind::New
                | TokenKind::Const
                | TokenKind::Private
                | TokenKind::Autoexec
                | TokenKind::Constructor
                | TokenKind::Destructor
                | TokenKind::Var
                | TokenKind::Else
                | TokenKind::True
                | TokenKind::False
                | TokenKind::Undefined
                | TokenKind::Waittill
                | TokenKind::Waittillmatch
                | TokenKind::Waittillframeend
                | TokenKind::Waitrealtime
                | TokenKind::Wait
        )
    }

    pub fn is_preprocessor_directive(self) -> bool {
        matches!(
            self,
            TokenKind::UsingDirective
                | TokenKind::InsertDirective
                | TokenKind::DefineDirective
                | TokenKind::NamespaceDirective
                | TokenKind::PrecacheDirective
                | TokenKind::UsingAnimtreeDirective
                | TokenKind::AnimtreeDirective
                | TokenKind::IfDirective
                | TokenKind::ElifDirective
                | TokenKind::ElseDirective
                | TokenKind::EndifDirective
        )
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Token {
    pub kind: TokenKind,
    /// The visible range: where the editor should point. For tokens produced
    /// by the preprocessor this is the directive or invocation site.
    pub span: Span,
    pub lexeme: Symbol,
    pub origin: TokenOrigin,
}

impl Token {
    pub fn new(kind: TokenKind, span: Span, lexeme: Symbol) -> Self {
        Token {
            kind,
            span,
            lexeme,
            origin: TokenOrigin::Source,
        }
    }

    /// Whether this token was synthesized by the preprocessor rather than
    /// lexed from the visible file.
    pub fn from_preprocessor(&self) -> bool {
        !matches!(self.origin, TokenOrigin::Source)
    }

    /// The range inside the file the token was actually lexed from. Equal to
    /// `span` for ordinary tokens; the original definition/insert range for
    /// preprocessor-produced ones.
    pub fn source_span(&self) -> Span {
        match self.origin {
            TokenOrigin::Source => self.span,
            TokenOrigin::Macro { definition } => definition,
            TokenOrigin::Insert { source } => source,
        }
    }
}
