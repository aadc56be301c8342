use std::fmt;

/// Precedence given to operator prototypes that do not spell one out.
pub const DEFAULT_PRECEDENCE: i32 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrototypeKind {
    Function,
    Unary,
    Binary,
}

impl PrototypeKind {
    /// Number of operands an operator prototype must take.
    pub fn operands(self) -> Option<usize> {
        match self {
            PrototypeKind::Function => None,
            PrototypeKind::Unary => Some(1),
            PrototypeKind::Binary => Some(2),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Prototype {
    pub name: String,
    pub params: Vec<String>,
    pub kind: PrototypeKind,
    pub precedence: i32,
}

impl Prototype {
    pub fn new(name: &str, params: Vec<String>) -> Prototype {
        Prototype {
            name: name.to_owned(),
            params,
            kind: PrototypeKind::Function,
            precedence: DEFAULT_PRECEDENCE,
        }
    }

    pub fn unary(symbol: char, param: &str) -> Prototype {
        Prototype {
            name: format!("unary{}", symbol),
            params: vec![param.to_owned()],
            kind: PrototypeKind::Unary,
            precedence: DEFAULT_PRECEDENCE,
        }
    }

    pub fn binary(symbol: char, precedence: i32, lhs: &str, rhs: &str) -> Prototype {
        Prototype {
            name: format!("binary{}", symbol),
            params: vec![lhs.to_owned(), rhs.to_owned()],
            kind: PrototypeKind::Binary,
            precedence,
        }
    }

    /// Prototype wrapping a bare top-level expression.
    pub fn anonymous() -> Prototype {
        Prototype::new("", vec![])
    }

    pub fn is_anonymous(&self) -> bool {
        self.name.is_empty()
    }

    /// The operator character for unary/binary prototypes.
    pub fn operator_symbol(&self) -> Option<char> {
        match self.kind {
            PrototypeKind::Function => None,
            PrototypeKind::Unary | PrototypeKind::Binary => self.name.chars().last(),
        }
    }
}

impl fmt::Display for Prototype {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.kind {
            PrototypeKind::Binary => {
                write!(f, "{} {} ({})", self.name, self.precedence, self.params.join(" "))
            }
            _ => write!(f, "{}({})", self.name, self.params.join(" ")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Variable(String),
    Binary(char, Box<Expr>, Box<Expr>),
    Unary(char, Box<Expr>),
    If(Box<Expr>, Box<Expr>, Box<Expr>),
    /// name, start, end, step, body
    For(String, Box<Expr>, Box<Expr>, Option<Box<Expr>>, Box<Expr>),
    Call(String, Vec<Expr>),
    Prototype(Prototype),
    Function(Prototype, Box<Expr>),
    /// bindings in declaration order, body
    Let(Vec<(String, Expr)>, Box<Expr>),
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Expr::Number(n) => write!(f, "{}", n),
            Expr::Variable(name) => write!(f, "{}", name),
            Expr::Binary(op, lhs, rhs) => write!(f, "({} {} {})", lhs, op, rhs),
            Expr::Unary(op, operand) => write!(f, "{}{}", op, operand),
            Expr::If(cond, then, otherwise) => {
                write!(f, "(if {} then {} else {})", cond, then, otherwise)
            }
            Expr::For(name, start, end, step, body) => {
                write!(f, "(for {} = {}, {}", name, start, end)?;
                if let Some(step) = step {
                    write!(f, ", {}", step)?;
                }
                write!(f, " in {})", body)
            }
            Expr::Call(name, args) => {
                write!(f, "{}(", name)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
            Expr::Prototype(proto) => write!(f, "extern {}", proto),
            Expr::Function(proto, body) => write!(f, "def {} {}", proto, body),
            Expr::Let(bindings, body) => {
                write!(f, "(var ")?;
                for (i, (name, init)) in bindings.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{} = {}", name, init)?;
                }
                write!(f, " in {})", body)
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_operator_symbol() {
        assert_eq!(Prototype::unary('!', "v").operator_symbol(), Some('!'));
        assert_eq!(
            Prototype::binary('|', 5, "a", "b").operator_symbol(),
            Some('|')
        );
        assert_eq!(Prototype::new("foo", vec![]).operator_symbol(), None);
    }

    #[test]
    fn test_display() {
        let e = Expr::Binary(
            '<',
            Box::new(Expr::Variable("a".to_owned())),
            Box::new(Expr::Call(
                "f".to_owned(),
                vec![Expr::Number(1.0), Expr::Unary('!', Box::new(Expr::Number(2.5)))],
            )),
        );
        assert_eq!(e.to_string(), "(a < f(1, !2.5))");
        assert_eq!(
            Expr::Prototype(Prototype::binary(':', 1, "x", "y")).to_string(),
            "extern binary: 1 (x y)"
        );
    }
}
