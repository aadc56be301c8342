use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    Def,
    Extern,
    If,
    Then,
    Else,
    For,
    In,
    Binary,
    Unary,
    Var,
}

impl Keyword {
    pub fn from_ident(s: &str) -> Option<Keyword> {
        match s {
            "def" => Some(Keyword::Def),
            "extern" => Some(Keyword::Extern),
            "if" => Some(Keyword::If),
            "then" => Some(Keyword::Then),
            "else" => Some(Keyword::Else),
            "for" => Some(Keyword::For),
            "in" => Some(Keyword::In),
            "binary" => Some(Keyword::Binary),
            "unary" => Some(Keyword::Unary),
            "var" => Some(Keyword::Var),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Keyword::Def => "def",
            Keyword::Extern => "extern",
            Keyword::If => "if",
            Keyword::Then => "then",
            Keyword::Else => "else",
            Keyword::For => "for",
            Keyword::In => "in",
            Keyword::Binary => "binary",
            Keyword::Unary => "unary",
            Keyword::Var => "var",
        }
    }
}

/// Built-in operator characters. Anything else printable lexes as `Other`.
pub const OPERATORS: &[char] = &['+', '-', '*', '/', '%', '=', '<', '>'];

/// Punctuation marks.
pub const MARKS: &[char] = &['(', ')', '[', ']', '{', '}', ',', ';'];

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Kwd(Keyword),
    Operator(char),
    Mark(char),
    Ident(String),
    Number(f64),
    Comment(String),
    Other(char),
}

impl Token {
    /// The symbol carried by a token usable as an operator name.
    pub fn operator_symbol(&self) -> Option<char> {
        match self {
            Token::Operator(c) | Token::Other(c) => Some(*c),
            _ => None,
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Token::Kwd(kw) => write!(f, "keyword '{}'", kw.as_str()),
            Token::Operator(c) => write!(f, "operator '{}'", c),
            Token::Mark(c) => write!(f, "'{}'", c),
            Token::Ident(id) => write!(f, "identifier '{}'", id),
            Token::Number(n) => write!(f, "number {}", n),
            Token::Comment(_) => write!(f, "comment"),
            Token::Other(c) => write!(f, "'{}'", c),
        }
    }
}
