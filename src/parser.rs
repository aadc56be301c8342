use super::ast::{Expr, Prototype, PrototypeKind, DEFAULT_PRECEDENCE};
use super::error::{Error, ErrorKind};
use super::lexer::Lexer;
use super::precedence::PrecedenceTable;
use super::token::{Keyword, Token};
use combine::easy;
use combine::error::{Commit, ParseError, Tracked};
use combine::stream::{Positioned, Stream};
use combine::Parser as Combinator;
use combine::{
    any, between, choice, look_ahead, many, optional, parser, satisfy_map, sep_by, sep_by1,
    token, EasyParser, StdParseResult,
};
use std::cell::{Cell, Ref, RefCell};
use tracing::{debug, trace};

type ParseResult<T> = Result<T, Error>;

/// How deep expressions may nest before parsing gives up. Each parenthesised
/// or operand expression and each prefix operator takes one level.
pub const MAX_NESTING: usize = 128;

/// State the grammar rules share while parsing one unit.
struct Shared {
    precedence: RefCell<PrecedenceTable>,
    depth: Cell<usize>,
    failure: RefCell<Option<ErrorKind>>,
}

impl Shared {
    fn new(precedence: PrecedenceTable) -> Shared {
        Shared {
            precedence: RefCell::new(precedence),
            depth: Cell::new(0),
            failure: RefCell::new(None),
        }
    }

    fn precedence_of(&self, op: char) -> Option<i32> {
        self.precedence.borrow().get(op)
    }

    fn nest(&self) -> Option<Nesting> {
        let depth = self.depth.get();
        if depth >= MAX_NESTING {
            return None;
        }
        self.depth.set(depth + 1);
        Some(Nesting(&self.depth))
    }

    /// Stops the parse with an error the token stream alone cannot describe.
    fn fail<Input, O>(&self, input: &mut Input, kind: ErrorKind) -> StdParseResult<O, Input>
    where
        Input: Stream<Token = Token>,
        Input::Error: ParseError<Input::Token, Input::Range, Input::Position>,
    {
        trace!("rule failed: {}", kind);
        *self.failure.borrow_mut() = Some(kind);
        let error = <Input::Error as ParseError<Input::Token, Input::Range, Input::Position>>::empty(
            input.position(),
        );
        Err(Commit::Commit(Tracked::from(error)))
    }
}

struct Nesting<'s>(&'s Cell<usize>);

impl<'s> Drop for Nesting<'s> {
    fn drop(&mut self) {
        self.0.set(self.0.get() - 1);
    }
}

/// Folds one step into a rule that may already have consumed input. Once
/// anything is consumed, a failure is committed.
fn chain<O, E>(
    result: Result<(O, Commit<()>), Commit<Tracked<E>>>,
    committed: &mut Commit<()>,
) -> Result<O, Commit<Tracked<E>>> {
    match result {
        Ok((output, step)) => {
            *committed = committed.merge(step);
            Ok(output)
        }
        Err(e) if committed.is_peek() => Err(e),
        Err(e) => Err(e.into_commit()),
    }
}

fn keyword<Input>(kw: Keyword) -> impl Combinator<Input, Output = Token>
where
    Input: Stream<Token = Token>,
    Input::Error: ParseError<Input::Token, Input::Range, Input::Position>,
{
    token(Token::Kwd(kw))
}

fn mark<Input>(c: char) -> impl Combinator<Input, Output = Token>
where
    Input: Stream<Token = Token>,
    Input::Error: ParseError<Input::Token, Input::Range, Input::Position>,
{
    token(Token::Mark(c))
}

fn ident<Input>() -> impl Combinator<Input, Output = String>
where
    Input: Stream<Token = Token>,
    Input::Error: ParseError<Input::Token, Input::Range, Input::Position>,
{
    satisfy_map(|t: Token| match t {
        Token::Ident(id) => Some(id),
        _ => None,
    })
    .expected("identifier")
}

fn number<Input>() -> impl Combinator<Input, Output = f64>
where
    Input: Stream<Token = Token>,
    Input::Error: ParseError<Input::Token, Input::Range, Input::Position>,
{
    satisfy_map(|t: Token| match t {
        Token::Number(n) => Some(n),
        _ => None,
    })
}

fn operator<Input>() -> impl Combinator<Input, Output = char>
where
    Input: Stream<Token = Token>,
    Input::Error: ParseError<Input::Token, Input::Range, Input::Position>,
{
    satisfy_map(|t: Token| t.operator_symbol()).expected("an operator symbol")
}

/// The operator symbol under the cursor, left unconsumed.
fn next_operator<Input>() -> impl Combinator<Input, Output = Option<char>>
where
    Input: Stream<Token = Token>,
    Input::Error: ParseError<Input::Token, Input::Range, Input::Position>,
{
    optional(look_ahead(operator()))
}

/// A prototype as written, before its operand count and precedence are
/// checked.
#[derive(Debug, PartialEq)]
struct RawPrototype {
    name: String,
    kind: PrototypeKind,
    precedence: Option<f64>,
    params: Vec<String>,
}

impl RawPrototype {
    fn check(self) -> ParseResult<Prototype> {
        let precedence = match self.precedence {
            Some(n) if n.fract() != 0.0 || n < 1.0 || n > 100.0 => {
                return Err(ErrorKind::InvalidPrecedence(n).into())
            }
            Some(n) => n as i32,
            None => DEFAULT_PRECEDENCE,
        };
        if let Some(expected) = self.kind.operands() {
            if self.params.len() != expected {
                return Err(ErrorKind::OperandCount {
                    name: self.name,
                    expected,
                    found: self.params.len(),
                }
                .into());
            }
        }
        Ok(Prototype {
            name: self.name,
            params: self.params,
            kind: self.kind,
            precedence,
        })
    }
}

/// prototype
///   ::= id '(' id* ')'
///   ::= 'unary' symbol '(' id* ')'
///   ::= 'binary' symbol number? '(' id* ')'
fn prototype<Input>() -> impl Combinator<Input, Output = RawPrototype>
where
    Input: Stream<Token = Token>,
    Input::Error: ParseError<Input::Token, Input::Range, Input::Position>,
{
    let function = ident().map(|name| (name, PrototypeKind::Function, None::<f64>));
    let unary = (keyword(Keyword::Unary), operator())
        .map(|(_, op)| (format!("unary{}", op), PrototypeKind::Unary, None));
    let binary = (keyword(Keyword::Binary), operator(), optional(number()))
        .map(|(_, op, prec)| (format!("binary{}", op), PrototypeKind::Binary, prec));

    (
        choice((function, unary, binary)).expected("function name in prototype"),
        between(mark('('), mark(')'), many(ident())),
    )
        .map(|((name, kind, precedence), params)| RawPrototype {
            name,
            kind,
            precedence,
            params,
        })
}

/// expression ::= unary binoprhs
fn expression<'s, Input>(shared: &'s Shared) -> impl Combinator<Input, Output = Expr> + 's
where
    Input: Stream<Token = Token> + 's,
    Input::Error: ParseError<Input::Token, Input::Range, Input::Position>,
{
    parser(move |input: &mut Input| parse_expression(shared, input))
}

fn parse_expression<Input>(shared: &Shared, input: &mut Input) -> StdParseResult<Expr, Input>
where
    Input: Stream<Token = Token>,
    Input::Error: ParseError<Input::Token, Input::Range, Input::Position>,
{
    let _nesting = match shared.nest() {
        Some(nesting) => nesting,
        None => return shared.fail(input, ErrorKind::NestingTooDeep(MAX_NESTING)),
    };
    let (lhs, committed) = parse_unary(shared, input)?;
    bin_op_rhs(shared, input, 0, lhs, committed)
}

/// binoprhs ::= (binop unary)*
///
/// Operators are looked up in the table as it stands when they are reached.
/// One without a precedence is an error rather than the end of the
/// expression.
fn bin_op_rhs<Input>(
    shared: &Shared,
    input: &mut Input,
    min_prec: i32,
    mut lhs: Expr,
    mut committed: Commit<()>,
) -> StdParseResult<Expr, Input>
where
    Input: Stream<Token = Token>,
    Input::Error: ParseError<Input::Token, Input::Range, Input::Position>,
{
    loop {
        let op = match chain(next_operator().parse_stream(input).into_result(), &mut committed)? {
            Some(op) => op,
            None => return Ok((lhs, committed)),
        };
        let prec = match shared.precedence_of(op) {
            Some(prec) => prec,
            None => return shared.fail(input, ErrorKind::UnknownBinaryOperator(op)),
        };
        if prec < min_prec {
            return Ok((lhs, committed));
        }
        chain(any().parse_stream(input).into_result(), &mut committed)?; // eat binop

        let mut rhs = chain(parse_unary(shared, input), &mut committed)?;

        // If op binds less tightly with rhs than the operator after rhs,
        // let the pending operator take rhs as its lhs.
        if let Some(next) = chain(next_operator().parse_stream(input).into_result(), &mut committed)? {
            match shared.precedence_of(next) {
                Some(next_prec) if prec < next_prec => {
                    let (folded, step) = bin_op_rhs(shared, input, prec + 1, rhs, committed)?;
                    rhs = folded;
                    committed = step;
                }
                Some(_) => {}
                None => return shared.fail(input, ErrorKind::UnknownBinaryOperator(next)),
            }
        }

        lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
    }
}

/// unary
///   ::= primary
///   ::= other-char unary
fn parse_unary<Input>(shared: &Shared, input: &mut Input) -> StdParseResult<Expr, Input>
where
    Input: Stream<Token = Token>,
    Input::Error: ParseError<Input::Token, Input::Range, Input::Position>,
{
    let _nesting = match shared.nest() {
        Some(nesting) => nesting,
        None => return shared.fail(input, ErrorKind::NestingTooDeep(MAX_NESTING)),
    };
    let mut committed = Commit::Peek(());
    let prefix = satisfy_map(|t: Token| match t {
        Token::Other(c) => Some(c),
        _ => None,
    });
    let expr = match chain(optional(prefix).parse_stream(input).into_result(), &mut committed)? {
        Some(op) => {
            let operand = chain(parse_unary(shared, input), &mut committed)?;
            Expr::Unary(op, Box::new(operand))
        }
        None => chain(primary(shared).parse_stream(input).into_result(), &mut committed)?,
    };
    Ok((expr, committed))
}

/// primary
///   ::= numberexpr
///   ::= identifierexpr
///   ::= parenexpr
///   ::= ifexpr
///   ::= forexpr
///   ::= varexpr
fn primary<'s, Input>(shared: &'s Shared) -> impl Combinator<Input, Output = Expr> + 's
where
    Input: Stream<Token = Token> + 's,
    Input::Error: ParseError<Input::Token, Input::Range, Input::Position>,
{
    let paren = between(mark('('), mark(')'), expression(shared));

    choice((
        number().map(Expr::Number),
        paren,
        identifier_expr(shared),
        if_expr(shared),
        for_expr(shared),
        let_expr(shared),
    ))
    .expected("an expression")
}

fn args<'s, Input>(shared: &'s Shared) -> impl Combinator<Input, Output = Vec<Expr>> + 's
where
    Input: Stream<Token = Token> + 's,
    Input::Error: ParseError<Input::Token, Input::Range, Input::Position>,
{
    sep_by(expression(shared), mark(','))
}

/// identifierexpr
///   ::= identifier
///   ::= identifier '(' (expression (',' expression)*)? ')'
fn identifier_expr<'s, Input>(shared: &'s Shared) -> impl Combinator<Input, Output = Expr> + 's
where
    Input: Stream<Token = Token> + 's,
    Input::Error: ParseError<Input::Token, Input::Range, Input::Position>,
{
    (
        ident(),
        optional(between(mark('('), mark(')'), args(shared))),
    )
        .map(|(name, args)| match args {
            Some(args) => Expr::Call(name, args),
            None => Expr::Variable(name),
        })
}

/// ifexpr ::= 'if' expression 'then' expression 'else' expression
fn if_expr<'s, Input>(shared: &'s Shared) -> impl Combinator<Input, Output = Expr> + 's
where
    Input: Stream<Token = Token> + 's,
    Input::Error: ParseError<Input::Token, Input::Range, Input::Position>,
{
    (
        keyword(Keyword::If),
        expression(shared),
        keyword(Keyword::Then),
        expression(shared),
        keyword(Keyword::Else),
        expression(shared),
    )
        .map(|(_, cond, _, then, _, otherwise)| {
            Expr::If(Box::new(cond), Box::new(then), Box::new(otherwise))
        })
}

/// forexpr ::= 'for' identifier '=' expression ',' expression (',' expression)? 'in' expression
fn for_expr<'s, Input>(shared: &'s Shared) -> impl Combinator<Input, Output = Expr> + 's
where
    Input: Stream<Token = Token> + 's,
    Input::Error: ParseError<Input::Token, Input::Range, Input::Position>,
{
    (
        keyword(Keyword::For),
        ident(),
        token(Token::Operator('=')),
        expression(shared),
        mark(','),
        expression(shared),
        optional((mark(','), expression(shared)).map(|(_, step)| step)),
        keyword(Keyword::In),
        expression(shared),
    )
        .map(|(_, name, _, start, _, end, step, _, body)| {
            Expr::For(
                name,
                Box::new(start),
                Box::new(end),
                step.map(Box::new),
                Box::new(body),
            )
        })
}

/// varexpr ::= 'var' identifier '=' expression (',' identifier '=' expression)* 'in' expression
fn let_expr<'s, Input>(shared: &'s Shared) -> impl Combinator<Input, Output = Expr> + 's
where
    Input: Stream<Token = Token> + 's,
    Input::Error: ParseError<Input::Token, Input::Range, Input::Position>,
{
    let binding = (ident(), token(Token::Operator('=')), expression(shared))
        .map(|(name, _, init)| (name, init));

    (
        keyword(Keyword::Var),
        sep_by1(binding, mark(',')),
        keyword(Keyword::In),
        expression(shared),
    )
        .map(
            |(_, bindings, _, body): (Token, Vec<(String, Expr)>, Token, Expr)| {
                Expr::Let(bindings, Box::new(body))
            },
        )
}

fn describe(info: &easy::Info<Token, &[Token]>) -> String {
    match info {
        easy::Info::Token(t) => t.to_string(),
        easy::Info::Range(r) => r
            .iter()
            .map(|t| t.to_string())
            .collect::<Vec<_>>()
            .join(" "),
        easy::Info::Owned(s) => s.clone(),
        easy::Info::Static(s) => (*s).to_owned(),
    }
}

/// The offending token and everything that would have been accepted there.
fn syntax_error(errors: &easy::ParseError<&[Token]>) -> ErrorKind {
    let mut found = None;
    let mut expected = Vec::new();
    for error in &errors.errors {
        match error {
            easy::Error::Unexpected(info) if found.is_none() => found = Some(info),
            easy::Error::Expected(info) => expected.push(describe(info)),
            _ => {}
        }
    }
    let expected = if expected.is_empty() {
        "a top-level form".to_owned()
    } else {
        expected.join(" or ")
    };
    match found {
        Some(easy::Info::Static(s)) if *s == "end of input" => ErrorKind::UnexpectedEof(expected),
        Some(info) => ErrorKind::UnexpectedToken(describe(info), expected),
        None => ErrorKind::UnexpectedEof(expected),
    }
}

/// Applies `rule` to the front of `tokens`, returning its output and the
/// number of tokens it consumed.
fn run<'t, O, P>(shared: &Shared, tokens: &'t [Token], mut rule: P) -> ParseResult<(O, usize)>
where
    P: Combinator<easy::Stream<&'t [Token]>, Output = O>,
{
    shared.failure.replace(None);
    let result = rule.easy_parse(tokens);
    if let Some(kind) = shared.failure.replace(None) {
        return Err(kind.into());
    }
    match result {
        Ok((output, rest)) => Ok((output, tokens.len() - rest.len())),
        Err(errors) => Err(syntax_error(&errors).into()),
    }
}

fn is_form_boundary(t: &Token) -> bool {
    match t {
        Token::Mark(';') | Token::Kwd(Keyword::Def) | Token::Kwd(Keyword::Extern) => true,
        _ => false,
    }
}

/// Parser producing one top-level form per `next()`.
///
/// The precedence table is owned by the parser and grows while parsing, so a
/// binary operator is usable from the point its prototype has been read,
/// including inside its own body.
pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    shared: Shared,
}

impl Parser {
    pub fn new(input: &str) -> Parser {
        Parser::with_precedence(input, PrecedenceTable::default())
    }

    pub fn with_precedence(input: &str, precedence: PrecedenceTable) -> Parser {
        let tokens: Vec<Token> = Lexer::new(input)
            .filter(|t| match t {
                Token::Comment(_) => false,
                _ => true,
            })
            .collect();
        trace!("{} tokens", tokens.len());
        Parser {
            tokens,
            pos: 0,
            shared: Shared::new(precedence),
        }
    }

    pub fn precedence(&self) -> Ref<PrecedenceTable> {
        self.shared.precedence.borrow()
    }

    /// Lent to lowering between two top-level forms.
    pub fn precedence_mut(&mut self) -> &mut PrecedenceTable {
        self.shared.precedence.get_mut()
    }

    pub fn into_precedence(self) -> PrecedenceTable {
        self.shared.precedence.into_inner()
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn parse_prototype(&mut self, introducer: Keyword) -> ParseResult<Prototype> {
        let rule = (keyword(introducer), prototype()).map(|(_, proto)| proto);
        let (raw, used) = run(&self.shared, &self.tokens[self.pos..], rule)?;
        self.pos += used;
        raw.check()
    }

    fn parse_body(&mut self) -> ParseResult<Expr> {
        let rule = expression(&self.shared);
        let (body, used) = run(&self.shared, &self.tokens[self.pos..], rule)?;
        self.pos += used;
        Ok(body)
    }

    /// top ::= definition | external | expression
    fn parse_top_level(&mut self) -> Option<ParseResult<Expr>> {
        let first = self.peek()?.clone();
        Some(match first {
            Token::Kwd(Keyword::Def) => self.parse_definition(),
            Token::Kwd(Keyword::Extern) => self.parse_extern(),
            _ => self.parse_top_level_expr(),
        })
    }

    /// definition ::= 'def' prototype expression
    fn parse_definition(&mut self) -> ParseResult<Expr> {
        let proto = self.parse_prototype(Keyword::Def)?;
        let op = self.declare_operator(&proto);
        match self.parse_body() {
            Ok(body) => Ok(Expr::Function(proto, Box::new(body))),
            Err(e) => {
                if let Some(op) = op {
                    self.precedence_mut().retract(op);
                }
                Err(e)
            }
        }
    }

    /// external ::= 'extern' prototype
    fn parse_extern(&mut self) -> ParseResult<Expr> {
        let proto = self.parse_prototype(Keyword::Extern)?;
        self.declare_operator(&proto);
        Ok(Expr::Prototype(proto))
    }

    /// toplevelexpr ::= expression
    fn parse_top_level_expr(&mut self) -> ParseResult<Expr> {
        let body = self.parse_body()?;
        Ok(Expr::Function(Prototype::anonymous(), Box::new(body)))
    }

    /// Gives a binary operator its precedence for the rest of the unit. The
    /// declaration stays pending until lowering settles it.
    fn declare_operator(&mut self, proto: &Prototype) -> Option<char> {
        match (proto.kind, proto.operator_symbol()) {
            (PrototypeKind::Binary, Some(op)) => {
                self.precedence_mut().declare(op, proto.precedence);
                debug!("operator '{}' now has precedence {}", op, proto.precedence);
                Some(op)
            }
            _ => None,
        }
    }

    /// Discards the rest of a form that failed to parse, up to something
    /// that can begin a new one.
    fn synchronize(&mut self, start: usize) {
        let from = (start + 1).min(self.tokens.len());
        self.pos = match self.tokens[from..].iter().position(is_form_boundary) {
            Some(n) => from + n,
            None => self.tokens.len(),
        };
    }
}

impl Iterator for Parser {
    type Item = Result<Expr, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.peek() == Some(&Token::Mark(';')) {
            self.pos += 1;
        }
        let start = self.pos;
        let item = self.parse_top_level()?;
        match &item {
            Ok(Expr::Function(proto, _)) if proto.is_anonymous() => {
                debug!("parsed a top-level expression")
            }
            Ok(Expr::Function(proto, _)) => debug!("parsed definition of {}", proto.name),
            Ok(Expr::Prototype(proto)) => debug!("parsed extern {}", proto.name),
            Ok(_) => {}
            Err(e) => {
                debug!("parse error: {}", e);
                self.synchronize(start);
            }
        }
        Some(item)
    }
}
