//! Diagnostic codes, severities and message formatting.
//!
//! Codes are integers partitioned by pipeline stage:
//!
//! | Range | Source |
//! |-------|--------|
//! | 1xxx  | preprocessor |
//! | 2xxx  | lexer + parser |
//! | 3xxx  | semantic (signature, CFG, data-flow) |
//! | 8xxx  | IDE conventions |
//! | 9xxx  | internal-failure sentinels |
//!
//! Every code has a fixed format string with positional `{0}`/`{1}`
//! placeholders, a fixed severity, and optionally the `unnecessary` tag used
//! by editors to render dead regions dimmed.

use gscls_base::Span;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
    Information,
    Hint,
}

/// The pipeline stage a diagnostic was issued from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagSource {
    Lexer,
    Preprocessor,
    Parser,
    Signature,
    DataFlow,
    Ide,
    Internal,
}

macro_rules! diag_codes {
    ($( $name:ident = $code:literal, $severity:ident, $source:ident, $unnecessary:literal, $template:literal; )*) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum DiagCode {
            $( $name, )*
        }

        impl DiagCode {
            pub fn code(self) -> u32 {
                match self {
                    $( DiagCode::$name => $code, )*
                }
            }

            pub fn severity(self) -> Severity {
                match self {
                    $( DiagCode::$name => Severity::$severity, )*
                }
            }

            pub fn source(self) -> DiagSource {
                match self {
                    $( DiagCode::$name => DiagSource::$source, )*
                }
            }

            /// Whether editors should render the spanned region dimmed.
            pub fn unnecessary(self) -> bool {
                match self {
                    $( DiagCode::$name => $unnecessary, )*
                }
            }

            pub fn template(self) -> &'static str {
                match self {
                    $( DiagCode::$name => $template, )*
                }
            }
        }
    };
}

diag_codes! {
    // 1xxx — preprocessor
    MissingInsertFile = 1000, Error, Preprocessor, false, "Cannot find insert file '{0}'";
    FailedToReadInsertFile = 1001, Error, Preprocessor, false, "Failed to read insert file '{0}': {1}";
    InvalidInsertPath = 1002, Error, Preprocessor, false, "Insert path '{0}' escapes the workspace root";
    CircularDependency = 1003, Error, Preprocessor, false, "Circular insert dependency through '{0}'";
    DuplicateMacroDefinition = 1004, Error, Preprocessor, false, "Macro '{0}' is already defined";
    DuplicateMacroParameter = 1005, Error, Preprocessor, false, "Duplicate macro parameter '{0}'";
    ExpectedMacroIdentifier = 1006, Error, Preprocessor, false, "Expected an identifier after '#define'";
    TooManyMacroArguments = 1007, Error, Preprocessor, false, "Too many arguments in invocation of macro '{0}': expected {1}";
    TooFewMacroArguments = 1008, Error, Preprocessor, false, "Too few arguments in invocation of macro '{0}': expected {1}";
    MissingMacroParameterList = 1009, Hint, Preprocessor, false, "Macro '{0}' expects an argument list; reference left unexpanded";
    PreprocessorIfAnalysisUnsupported = 1010, Hint, Preprocessor, false, "'#if' conditions are not evaluated; branches are analysed conservatively";
    InactivePreprocessorBranch = 1011, Hint, Preprocessor, true, "Inactive preprocessor branch";
    UnterminatedPreprocessorDirective = 1012, Error, Preprocessor, false, "'#if' without a matching '#endif'";
    MisplacedPreprocessorDirective = 1013, Error, Preprocessor, false, "'{0}' without a preceding '#if'";

    // 2xxx — lexer + parser
    UnexpectedCharacter = 2000, Error, Lexer, false, "Unexpected character '{0}'";
    UnterminatedString = 2001, Error, Lexer, false, "String literal is not terminated before the end of the line";
    UnexpectedToken = 2002, Error, Parser, false, "Unexpected token '{0}'";
    ExpectedToken = 2003, Error, Parser, false, "Expected '{0}' but found '{1}'";
    ExpectedExpression = 2004, Error, Parser, false, "Expected an expression";
    UnexpectedUsing = 2005, Error, Parser, false, "'#using' directives must precede all definitions";
    UnexpectedFunctionModifier = 2006, Error, Parser, false, "Modifier '{0}' must appear before 'function'";
    VarargNotLastParameter = 2007, Error, Parser, false, "Vararg '...' must be the last parameter";
    UnexpectedConstructorParameter = 2008, Error, Parser, false, "Constructors take no parameters";
    SquareBracketInitialisationNotSupported = 2009, Error, Parser, false, "Array initialiser with members is not supported; assign elements individually";
    UnexpectedConstructorArguments = 2010, Error, Parser, false, "'new {0}()' does not take constructor arguments";
    UnterminatedDevBlock = 2011, Error, Parser, false, "'/#' without a matching '#/'";

    // 3xxx — semantic
    NotDefined = 3000, Error, DataFlow, false, "'{0}' is not defined";
    UnknownNamespace = 3001, Error, DataFlow, false, "Unknown namespace '{0}'";
    CannotAssignToConstant = 3002, Error, DataFlow, false, "Cannot assign to constant '{0}'";
    InvalidAssignmentTarget = 3003, Error, DataFlow, false, "Invalid assignment target";
    RedefinitionOfSymbol = 3004, Error, DataFlow, false, "'{0}' is already defined";
    TooManyArguments = 3005, Error, DataFlow, false, "'{0}' takes at most {1} argument(s)";
    TooFewArguments = 3006, Error, DataFlow, false, "'{0}' takes at least {1} argument(s)";
    TooManyArgumentsUnverified = 3007, Warning, DataFlow, false, "'{0}' likely takes at most {1} argument(s)";
    TooFewArgumentsUnverified = 3008, Warning, DataFlow, false, "'{0}' likely takes at least {1} argument(s)";
    DoesNotContainMember = 3009, Error, DataFlow, false, "'{0}' does not contain a member '{1}'";
    InvalidThreadCall = 3010, Error, DataFlow, false, "'thread' must be followed by a function call";
    AssignOnThreadedFunction = 3011, Warning, DataFlow, false, "Assigning the result of a threaded function; the value is undefined until the thread waits";
    OperatorNotSupportedOn = 3012, Error, DataFlow, false, "Operator '{0}' is not supported on '{1}'";
    OperatorNotSupportedOnTypes = 3013, Error, DataFlow, false, "Operator '{0}' is not supported between '{1}' and '{2}'";
    DivisionByZero = 3014, Error, DataFlow, false, "Division by zero";
    IntegerTooLarge = 3015, Error, DataFlow, false, "Integer literal exceeds the 32-bit signed maximum";
    IntegerTooSmall = 3016, Error, DataFlow, false, "Integer literal is below the 32-bit signed minimum";
    CannotWaitNegativeDuration = 3017, Error, DataFlow, false, "Cannot wait a non-positive duration";
    BelowVmRefreshRate = 3018, Warning, DataFlow, false, "Wait duration is below the VM refresh period; it rounds up to {0}";
    MultipleDefaultLabels = 3019, Error, DataFlow, false, "'switch' already has a 'default' label";
    DuplicateCaseLabel = 3020, Error, DataFlow, false, "Duplicate 'case' label '{0}'";
    MissingUsingFile = 3021, Error, Signature, false, "Cannot find using file '{0}'";
    FallthroughCase = 3022, Warning, DataFlow, false, "'case' falls through to the next label";
    UnreachableCodeDetected = 3023, Warning, DataFlow, true, "Unreachable code";

    // 8xxx — IDE conventions
    MissingNamespaceDirective = 8000, Information, Ide, false, "File declares no '#namespace'; symbols default to the file name";

    // 9xxx — internal-failure sentinels
    LexerFailure = 9000, Error, Internal, false, "Internal error while lexing: {0}";
    PreprocessorFailure = 9001, Error, Internal, false, "Internal error while preprocessing: {0}";
    ParserFailure = 9002, Error, Internal, false, "Internal error while parsing: {0}";
    SignatureFailure = 9003, Error, Internal, false, "Internal error while collecting signatures: {0}";
    CfgFailure = 9004, Error, Internal, false, "Internal error while building control flow: {0}";
    DataFlowFailure = 9005, Error, Internal, false, "Internal error during data-flow analysis: {0}";
    FoldingFailure = 9006, Error, Internal, false, "Internal error while computing regions: {0}";
    InternalFailure = 9007, Error, Internal, false, "Internal error: {0}";
}

/// A single diagnostic, spanning the visible range in the current document.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub code: DiagCode,
    pub span: Span,
    pub message: String,
}

impl Diagnostic {
    /// Formats the code's template with positional arguments.
    pub fn new(code: DiagCode, span: Span, args: &[&str]) -> Self {
        Diagnostic {
            code,
            span,
            message: format_template(code.template(), args),
        }
    }

    pub fn severity(&self) -> Severity {
        self.code.severity()
    }

    pub fn source(&self) -> DiagSource {
        self.code.source()
    }

    pub fn unnecessary(&self) -> bool {
        self.code.unnecessary()
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code.code(), self.message)
    }
}

/// Substitutes `{0}`..`{9}` placeholders. Placeholders with no matching
/// argument are left in place so a malformed call site is visible rather
/// than silent.
fn format_template(template: &str, args: &[&str]) -> String {
    let mut out = template.to_string();
    for (i, arg) in args.iter().enumerate() {
        out = out.replace(&format!("{{{i}}}"), arg);
    }
    out
}
