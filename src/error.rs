use failure::{Backtrace, Context, Fail};
use std::fmt;

#[derive(Debug)]
pub struct Error {
    inner: Context<ErrorKind>,
}

#[derive(Clone, Debug, PartialEq, Fail)]
pub enum ErrorKind {
    #[fail(display = "unexpected {} when expecting {}", _0, _1)]
    UnexpectedToken(String, String),
    #[fail(display = "unexpected end of input when expecting {}", _0)]
    UnexpectedEof(String),
    #[fail(
        display = "invalid number of operands for operator {}: expected {}, found {}",
        name, expected, found
    )]
    OperandCount {
        name: String,
        expected: usize,
        found: usize,
    },
    #[fail(display = "invalid precedence {}: must be an integer in 1..100", _0)]
    InvalidPrecedence(f64),
    #[fail(display = "unknown binary operator '{}'", _0)]
    UnknownBinaryOperator(char),
    #[fail(display = "expression nested deeper than {} levels", _0)]
    NestingTooDeep(usize),

    #[fail(display = "unbound variable '{}'", _0)]
    UnboundVariable(String),
    #[fail(display = "unknown {} operator '{}'", _0, _1)]
    UnknownOperator(&'static str, char),
    #[fail(display = "unknown function '{}'", _0)]
    UnknownFunction(String),
    #[fail(
        display = "argument count mismatch calling {}: expected {}, found {}",
        name, expected, found
    )]
    ArgumentCount {
        name: String,
        expected: usize,
        found: usize,
    },
    #[fail(display = "invalid assignment target {}", _0)]
    InvalidAssignment(String),
    #[fail(display = "redefinition of function '{}'", _0)]
    Redefinition(String),
    #[fail(display = "conflicting declaration of '{}'", _0)]
    ConflictingDeclaration(String),
    #[fail(display = "{} is only allowed at top level", _0)]
    NotTopLevel(String),
    #[fail(display = "backend: {}", _0)]
    Backend(String),

    #[fail(display = "evaluation failed: {}", _0)]
    Eval(String),
}

impl ErrorKind {
    fn is_parse(&self) -> bool {
        match self {
            ErrorKind::UnexpectedToken(..)
            | ErrorKind::UnexpectedEof(_)
            | ErrorKind::OperandCount { .. }
            | ErrorKind::InvalidPrecedence(_)
            | ErrorKind::UnknownBinaryOperator(_)
            | ErrorKind::NestingTooDeep(_) => true,
            _ => false,
        }
    }
}

impl Error {
    pub fn kind(&self) -> &ErrorKind {
        self.inner.get_context()
    }

    /// Whether the error came out of the parser (as opposed to lowering or
    /// evaluation).
    pub fn is_parse(&self) -> bool {
        self.kind().is_parse()
    }
}

impl Fail for Error {
    fn cause(&self) -> Option<&dyn Fail> {
        self.inner.cause()
    }

    fn backtrace(&self) -> Option<&Backtrace> {
        self.inner.backtrace()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(&self.inner, f)
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Error {
        Error {
            inner: Context::new(kind),
        }
    }
}

impl From<Context<ErrorKind>> for Error {
    fn from(inner: Context<ErrorKind>) -> Error {
        Error { inner }
    }
}
