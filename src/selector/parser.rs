//! Textual selector grammar
//!
//! ```text
//! selector    := <empty> | requirement ( "," requirement )*
//! requirement := "!" key
//!              | key [ ( "=" | "==" | "!=" | ">" | "<" ) value
//!                    | ( "in" | "notin" ) "(" [ value ( "," value )* ] ")" ]
//! ```

use super::{Operator, Requirement, SelectorError};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Identifier(String),
    In,
    NotIn,
    Bang,
    Equals,
    DoubleEquals,
    NotEquals,
    GreaterThan,
    LessThan,
    OpenParen,
    CloseParen,
    Comma,
    End,
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Identifier(s) => write!(f, "identifier {:?}", s),
            Token::In => write!(f, "'in'"),
            Token::NotIn => write!(f, "'notin'"),
            Token::Bang => write!(f, "'!'"),
            Token::Equals => write!(f, "'='"),
            Token::DoubleEquals => write!(f, "'=='"),
            Token::NotEquals => write!(f, "'!='"),
            Token::GreaterThan => write!(f, "'>'"),
            Token::LessThan => write!(f, "'<'"),
            Token::OpenParen => write!(f, "'('"),
            Token::CloseParen => write!(f, "')'"),
            Token::Comma => write!(f, "','"),
            Token::End => write!(f, "end of input"),
        }
    }
}

fn is_special(c: char) -> bool {
    matches!(c, '!' | '=' | '>' | '<' | '(' | ')' | ',')
}

/// Split the input into positioned tokens, always terminated by `End`
fn tokenize(input: &str) -> Vec<(usize, Token)> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(pos, c)) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }

        if is_special(c) {
            chars.next();
            let next_is_eq = matches!(chars.peek(), Some(&(_, '=')));
            let token = match c {
                '!' if next_is_eq => {
                    chars.next();
                    Token::NotEquals
                }
                '!' => Token::Bang,
                '=' if next_is_eq => {
                    chars.next();
                    Token::DoubleEquals
                }
                '=' => Token::Equals,
                '>' => Token::GreaterThan,
                '<' => Token::LessThan,
                '(' => Token::OpenParen,
                ')' => Token::CloseParen,
                _ => Token::Comma,
            };
            tokens.push((pos, token));
            continue;
        }

        let mut ident = String::new();
        while let Some(&(_, c)) = chars.peek() {
            if c.is_whitespace() || is_special(c) {
                break;
            }
            ident.push(c);
            chars.next();
        }
        let token = match ident.as_str() {
            "in" => Token::In,
            "notin" => Token::NotIn,
            _ => Token::Identifier(ident),
        };
        tokens.push((pos, token));
    }

    tokens.push((input.len(), Token::End));
    tokens
}

struct Parser {
    tokens: Vec<(usize, Token)>,
    cursor: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        &self.tokens[self.cursor].1
    }

    fn next(&mut self) -> (usize, Token) {
        let item = self.tokens[self.cursor].clone();
        if item.1 != Token::End {
            self.cursor += 1;
        }
        item
    }

    fn unexpected(position: usize, found: &Token, expected: &str) -> SelectorError {
        SelectorError::Syntax {
            position,
            found: found.to_string(),
            expected: expected.to_string(),
        }
    }

    fn parse(&mut self) -> Result<Vec<Requirement>, SelectorError> {
        let mut requirements = Vec::new();
        if *self.peek() == Token::End {
            return Ok(requirements);
        }

        loop {
            requirements.push(self.requirement()?);
            match self.next() {
                (_, Token::End) => return Ok(requirements),
                (_, Token::Comma) => {}
                (pos, other) => return Err(Self::unexpected(pos, &other, "',' or end of input")),
            }
        }
    }

    fn requirement(&mut self) -> Result<Requirement, SelectorError> {
        let negated = *self.peek() == Token::Bang;
        if negated {
            self.next();
        }

        let key = match self.next() {
            (_, Token::Identifier(key)) => key,
            (pos, other) => return Err(Self::unexpected(pos, &other, "label key")),
        };

        if negated {
            return Requirement::new(&key, Operator::DoesNotExist, Vec::<String>::new());
        }

        let operator = match self.peek() {
            Token::Comma | Token::End => {
                return Requirement::new(&key, Operator::Exists, Vec::<String>::new())
            }
            Token::Equals | Token::DoubleEquals => Operator::Equals,
            Token::NotEquals => Operator::NotEquals,
            Token::GreaterThan => Operator::GreaterThan,
            Token::LessThan => Operator::LessThan,
            Token::In => Operator::In,
            Token::NotIn => Operator::NotIn,
            other => {
                let pos = self.tokens[self.cursor].0;
                return Err(Self::unexpected(pos, &other.clone(), "operator"));
            }
        };
        self.next();

        let values = match operator {
            Operator::In | Operator::NotIn => self.value_list()?,
            _ => vec![self.single_value()?],
        };

        Requirement::new(&key, operator, values)
    }

    fn single_value(&mut self) -> Result<String, SelectorError> {
        match self.peek() {
            // `key=` selects the empty value
            Token::Comma | Token::End => Ok(String::new()),
            Token::Identifier(_) => match self.next() {
                (_, Token::Identifier(v)) => Ok(v),
                (pos, other) => Err(Self::unexpected(pos, &other, "value")),
            },
            other => {
                let pos = self.tokens[self.cursor].0;
                Err(Self::unexpected(pos, &other.clone(), "value"))
            }
        }
    }

    fn value_list(&mut self) -> Result<Vec<String>, SelectorError> {
        match self.next() {
            (_, Token::OpenParen) => {}
            (pos, other) => return Err(Self::unexpected(pos, &other, "'('")),
        }

        let mut values = Vec::new();
        if *self.peek() == Token::CloseParen {
            self.next();
            return Ok(values);
        }

        loop {
            let value = match self.peek() {
                Token::Comma | Token::CloseParen => String::new(),
                Token::Identifier(_) => match self.next() {
                    (_, Token::Identifier(v)) => v,
                    (pos, other) => return Err(Self::unexpected(pos, &other, "value")),
                },
                other => {
                    let pos = self.tokens[self.cursor].0;
                    return Err(Self::unexpected(pos, &other.clone(), "value"));
                }
            };
            values.push(value);

            match self.next() {
                (_, Token::Comma) => {}
                (_, Token::CloseParen) => return Ok(values),
                (pos, other) => return Err(Self::unexpected(pos, &other, "',' or ')'")),
            }
        }
    }
}

/// Parse a textual selector into unordered requirements
pub(super) fn parse(input: &str) -> Result<Vec<Requirement>, SelectorError> {
    Parser {
        tokens: tokenize(input),
        cursor: 0,
    }
    .parse()
}
