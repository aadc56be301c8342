use super::token::{Keyword, Token, MARKS, OPERATORS};
use combine::error::ParseError;
use combine::stream::Stream;
use combine::{choice, eof, many, many1, satisfy, satisfy_map, skip_many, token, Parser};
use tracing::warn;

fn number<Input>() -> impl Parser<Input, Output = Token>
where
    Input: Stream<Token = char>,
    Input::Error: ParseError<Input::Token, Input::Range, Input::Position>,
{
    many1(satisfy(|c: char| c.is_ascii_digit() || c == '.')).map(|text: String| {
        match text.parse::<f64>() {
            Ok(n) => Token::Number(n),
            Err(_) => Token::Ident(text),
        }
    })
}

fn ident<Input>() -> impl Parser<Input, Output = Token>
where
    Input: Stream<Token = char>,
    Input::Error: ParseError<Input::Token, Input::Range, Input::Position>,
{
    (
        satisfy(|c: char| c.is_ascii_alphabetic() || c == '_'),
        many(satisfy(|c: char| c.is_ascii_alphanumeric() || c == '_')),
    )
        .map(|(head, tail): (char, String)| {
            let mut id = String::with_capacity(tail.len() + 1);
            id.push(head);
            id.push_str(&tail);
            match Keyword::from_ident(&id) {
                Some(kw) => Token::Kwd(kw),
                None => Token::Ident(id),
            }
        })
}

fn comment<Input>() -> impl Parser<Input, Output = Token>
where
    Input: Stream<Token = char>,
    Input::Error: ParseError<Input::Token, Input::Range, Input::Position>,
{
    (
        token('#'),
        many(satisfy(|c: char| c != '\n' && c != '\r')),
    )
        .map(|(_, text): (char, String)| Token::Comment(text))
}

// Marks, built-in operators, and the printable ASCII catch-all that lets
// user-defined operator symbols lex without being known in advance.
fn single<Input>() -> impl Parser<Input, Output = Token>
where
    Input: Stream<Token = char>,
    Input::Error: ParseError<Input::Token, Input::Range, Input::Position>,
{
    satisfy_map(|c: char| {
        if MARKS.contains(&c) {
            Some(Token::Mark(c))
        } else if OPERATORS.contains(&c) {
            Some(Token::Operator(c))
        } else if c.is_ascii_graphic() {
            Some(Token::Other(c))
        } else {
            None
        }
    })
}

/// Skips blanks (and anything outside printable ASCII), then reads one token.
/// Yields `None` at end of input.
pub(crate) fn lex<Input>() -> impl Parser<Input, Output = Option<Token>>
where
    Input: Stream<Token = char>,
    Input::Error: ParseError<Input::Token, Input::Range, Input::Position>,
{
    skip_many(satisfy(|c: char| !c.is_ascii_graphic())).with(choice((
        eof().map(|_| None),
        number().map(Some),
        ident().map(Some),
        comment().map(Some),
        single().map(Some),
    )))
}

/// Lazy token stream over a source string. Cloning restarts from the
/// clone's current position.
#[derive(Debug, Clone)]
pub struct Lexer<'a> {
    rest: &'a str,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Lexer<'a> {
        Lexer { rest: input }
    }
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        match lex().parse(self.rest) {
            Ok((token, rest)) => {
                self.rest = rest;
                token
            }
            Err(e) => {
                warn!("lexer stopped: {}", e);
                self.rest = "";
                None
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::super::token::Keyword;
    use super::super::token::Token::*;
    use super::*;
    use combine::EasyParser;

    fn tokens(s: &str) -> Vec<Token> {
        Lexer::new(s).collect()
    }

    #[test]
    fn test_number() {
        assert_eq!(number().easy_parse("1.0").map(|x| x.0), Ok(Number(1.0)));
        assert_eq!(number().easy_parse("40").map(|x| x.0), Ok(Number(40.0)));
    }

    #[test]
    fn test_number_fallback() {
        assert_eq!(
            number().easy_parse("1.2.3").map(|x| x.0),
            Ok(Ident("1.2.3".to_owned()))
        );
    }

    #[test]
    fn test_ident() {
        assert_eq!(
            ident().easy_parse("test").map(|x| x.0),
            Ok(Ident("test".to_owned()))
        );
        assert_eq!(
            ident().easy_parse("_x1").map(|x| x.0),
            Ok(Ident("_x1".to_owned()))
        );

        assert_eq!(ident().easy_parse("def").map(|x| x.0), Ok(Kwd(Keyword::Def)));
        assert_eq!(ident().easy_parse("var").map(|x| x.0), Ok(Kwd(Keyword::Var)));
    }

    #[test]
    fn test_comment() {
        assert_eq!(
            comment().easy_parse("#hoge").map(|x| x.0),
            Ok(Comment("hoge".to_owned()))
        );
    }

    #[test]
    fn test_lex() {
        assert_eq!(
            tokens(
                r#"#comment
1.0
"#
            ),
            vec![Comment("comment".to_owned()), Number(1.0)]
        );
    }

    #[test]
    fn test_fib() {
        let code = "def fib(x)
  if x < 3 then
    1
  else
    fib(x-1)+fib(x-2)

fib(40)";
        let ts = tokens(code);
        assert_eq!(ts.len(), 29);
        assert_eq!(ts[0], Kwd(Keyword::Def));
        assert_eq!(ts[7], Operator('<'));
        assert_eq!(ts[28], Mark(')'));
    }

    #[test]
    fn test_operator_definitions() {
        assert_eq!(tokens("def unary!(v)\n  1;").len(), 8);

        let ts = tokens("def binary| 5 (LHS RHS)\n  1;");
        assert_eq!(ts.len(), 10);
        assert_eq!(ts[1], Kwd(Keyword::Binary));
        assert_eq!(ts[2], Other('|'));
        assert_eq!(ts[3], Number(5.0));
    }

    #[test]
    fn test_other_and_marks() {
        assert_eq!(
            tokens("! & : [ { ; / %"),
            vec![
                Other('!'),
                Other('&'),
                Other(':'),
                Mark('['),
                Mark('{'),
                Mark(';'),
                Operator('/'),
                Operator('%'),
            ]
        );
    }

    #[test]
    fn test_non_ascii_dropped() {
        assert_eq!(
            tokens("x + é\ty\u{3000}"),
            vec![Ident("x".to_owned()), Operator('+'), Ident("y".to_owned())]
        );
    }

    #[test]
    fn test_restart() {
        let mut lexer = Lexer::new("a b c");
        assert_eq!(lexer.next(), Some(Ident("a".to_owned())));
        let restarted: Vec<_> = lexer.clone().collect();
        let rest: Vec<_> = lexer.collect();
        assert_eq!(restarted, rest);
        assert_eq!(rest.len(), 2);
    }
}
