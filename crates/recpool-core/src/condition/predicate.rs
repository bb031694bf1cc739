//! Predicate text parsing
//!
//! Subpool predicates are conjunctions of `field <op> literal` terms, written
//! the way the pool tooling writes them: `d_s_language='en'`,
//! `d_s_level=2 and d_d_ctr > 0.5`, `d_s_cat2 contains 'cat21'`.
//! The parser is a small hand-written lexer plus recursive descent, producing
//! a structured `Predicate` that is validated against the schema separately.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use recpool_types::format_float;

use crate::error::{PoolError, Result};

/// Comparison operators accepted in a term
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Equal,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    /// List membership
    Contains,
}

impl Operator {
    /// Whether an ordering of `value` relative to the literal satisfies the operator
    pub fn accepts(self, ordering: Ordering) -> bool {
        match self {
            Operator::Equal | Operator::Contains => ordering == Ordering::Equal,
            Operator::LessThan => ordering == Ordering::Less,
            Operator::LessThanOrEqual => ordering != Ordering::Greater,
            Operator::GreaterThan => ordering == Ordering::Greater,
            Operator::GreaterThanOrEqual => ordering != Ordering::Less,
        }
    }

    pub fn is_ordering(self) -> bool {
        !matches!(self, Operator::Equal | Operator::Contains)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            Operator::Equal => "=",
            Operator::LessThan => "<",
            Operator::LessThanOrEqual => "<=",
            Operator::GreaterThan => ">",
            Operator::GreaterThanOrEqual => ">=",
            Operator::Contains => "contains",
        };
        f.write_str(symbol)
    }
}

/// Literal on the right-hand side of a term
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i64),
    Float(f64),
    Str(String),
}

impl Literal {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Literal::Int(i) => Some(*i as f64),
            Literal::Float(f) => Some(*f),
            Literal::Str(_) => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        !matches!(self, Literal::Str(_))
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Int(i) => write!(f, "{}", i),
            Literal::Float(v) => f.write_str(&format_float(*v)),
            Literal::Str(s) => write!(f, "'{}'", s.replace('\'', "''")),
        }
    }
}

/// One `field <op> literal` comparison
#[derive(Debug, Clone, PartialEq)]
pub struct Term {
    pub field: String,
    pub operator: Operator,
    pub literal: Literal,
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.field, self.operator, self.literal)
    }
}

/// A conjunction of terms, remembered with its source text
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    source: String,
    terms: Vec<Term>,
}

impl Predicate {
    /// Parse predicate text
    pub fn parse(source: &str) -> Result<Self> {
        let malformed = |message: String| PoolError::malformed(source, message);
        let mut parser = Parser::new(Lexer::new(source)).map_err(malformed)?;
        let terms = parser.parse_conjunction().map_err(malformed)?;
        Ok(Self { source: source.to_string(), terms })
    }

    /// Build a predicate from already structured terms
    pub fn from_terms(terms: Vec<Term>) -> Result<Self> {
        if terms.is_empty() {
            return Err(PoolError::malformed("", "predicate has no terms"));
        }
        let source = terms.iter().map(Term::to_string).collect::<Vec<_>>().join(" and ");
        Ok(Self { source, terms })
    }

    /// The text this predicate was parsed from
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn terms(&self) -> &[Term] {
        &self.terms
    }
}

impl FromStr for Predicate {
    type Err = PoolError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

type ParseResult<T> = std::result::Result<T, String>;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Identifier(String),
    Integer(i64),
    Float(f64),
    String(String),
    Equal,
    LessThan,
    LessThanEqual,
    GreaterThan,
    GreaterThanEqual,
    And,
    Contains,
    Eof,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Identifier(name) => write!(f, "'{}'", name),
            Token::Integer(n) => write!(f, "{}", n),
            Token::Float(n) => write!(f, "{}", n),
            Token::String(s) => write!(f, "string '{}'", s),
            Token::Equal => write!(f, "'='"),
            Token::LessThan => write!(f, "'<'"),
            Token::LessThanEqual => write!(f, "'<='"),
            Token::GreaterThan => write!(f, "'>'"),
            Token::GreaterThanEqual => write!(f, "'>='"),
            Token::And => write!(f, "'and'"),
            Token::Contains => write!(f, "'contains'"),
            Token::Eof => write!(f, "end of input"),
        }
    }
}

struct Lexer {
    input: Vec<char>,
    position: usize,
    current_char: Option<char>,
}

impl Lexer {
    fn new(input: &str) -> Self {
        let chars: Vec<char> = input.chars().collect();
        let current_char = chars.first().copied();
        Self { input: chars, position: 0, current_char }
    }

    fn advance(&mut self) {
        self.position += 1;
        self.current_char = self.input.get(self.position).copied();
    }

    fn peek(&self) -> Option<char> {
        self.input.get(self.position + 1).copied()
    }

    fn skip_whitespace(&mut self) {
        while self.current_char.is_some_and(char::is_whitespace) {
            self.advance();
        }
    }

    fn read_number(&mut self) -> ParseResult<Token> {
        let mut number = String::new();
        if let Some(sign @ ('-' | '+')) = self.current_char {
            number.push(sign);
            self.advance();
        }

        let mut is_float = false;
        let mut digits = 0;
        while let Some(ch) = self.current_char {
            if ch.is_ascii_digit() {
                digits += 1;
                number.push(ch);
                self.advance();
            } else if ch == '.' && !is_float {
                is_float = true;
                number.push(ch);
                self.advance();
            } else {
                break;
            }
        }

        if digits == 0 {
            return Err(format!("invalid number '{}'", number));
        }
        if matches!(self.current_char, Some('e' | 'E')) {
            is_float = true;
            number.push('e');
            self.advance();
            if let Some(sign @ ('-' | '+')) = self.current_char {
                number.push(sign);
                self.advance();
            }
            while let Some(ch) = self.current_char.filter(char::is_ascii_digit) {
                number.push(ch);
                self.advance();
            }
        }
        if is_float {
            number
                .parse::<f64>()
                .map(Token::Float)
                .map_err(|e| format!("invalid number '{}': {}", number, e))
        } else {
            number
                .parse::<i64>()
                .map(Token::Integer)
                .map_err(|e| format!("invalid integer '{}': {}", number, e))
        }
    }

    // A doubled quote inside a string stands for one quote character
    fn read_string(&mut self, quote: char) -> ParseResult<Token> {
        let mut string = String::new();
        self.advance();

        while let Some(ch) = self.current_char {
            if ch == quote {
                if self.peek() == Some(quote) {
                    string.push(quote);
                    self.advance();
                    self.advance();
                    continue;
                }
                self.advance();
                return Ok(Token::String(string));
            }
            string.push(ch);
            self.advance();
        }

        Err("unterminated string literal".to_string())
    }

    fn read_identifier(&mut self) -> Token {
        let mut identifier = String::new();
        while let Some(ch) = self.current_char {
            if ch.is_ascii_alphanumeric() || ch == '_' {
                identifier.push(ch);
                self.advance();
            } else {
                break;
            }
        }

        if identifier.eq_ignore_ascii_case("and") {
            Token::And
        } else if identifier.eq_ignore_ascii_case("contains") {
            Token::Contains
        } else {
            Token::Identifier(identifier)
        }
    }

    fn next_token(&mut self) -> ParseResult<Token> {
        self.skip_whitespace();

        let Some(ch) = self.current_char else {
            return Ok(Token::Eof);
        };

        match ch {
            '0'..='9' | '-' | '+' | '.' => self.read_number(),
            '\'' | '"' => self.read_string(ch),
            'a'..='z' | 'A'..='Z' | '_' => Ok(self.read_identifier()),
            '=' => {
                if self.peek() == Some('=') {
                    self.advance();
                }
                self.advance();
                Ok(Token::Equal)
            }
            '<' => {
                if self.peek() == Some('=') {
                    self.advance();
                    self.advance();
                    Ok(Token::LessThanEqual)
                } else {
                    self.advance();
                    Ok(Token::LessThan)
                }
            }
            '>' => {
                if self.peek() == Some('=') {
                    self.advance();
                    self.advance();
                    Ok(Token::GreaterThanEqual)
                } else {
                    self.advance();
                    Ok(Token::GreaterThan)
                }
            }
            _ => Err(format!("unexpected character '{}'", ch)),
        }
    }
}

struct Parser {
    lexer: Lexer,
    current_token: Token,
}

impl Parser {
    fn new(mut lexer: Lexer) -> ParseResult<Self> {
        let current_token = lexer.next_token()?;
        Ok(Self { lexer, current_token })
    }

    fn advance(&mut self) -> ParseResult<Token> {
        let next = self.lexer.next_token()?;
        Ok(std::mem::replace(&mut self.current_token, next))
    }

    fn parse_conjunction(&mut self) -> ParseResult<Vec<Term>> {
        if self.current_token == Token::Eof {
            return Err("empty predicate".to_string());
        }

        let mut terms = vec![self.parse_term()?];
        while self.current_token == Token::And {
            self.advance()?;
            terms.push(self.parse_term()?);
        }

        match &self.current_token {
            Token::Eof => Ok(terms),
            other => Err(format!("expected 'and' or end of input, found {}", other)),
        }
    }

    fn parse_term(&mut self) -> ParseResult<Term> {
        let field = match self.advance()? {
            Token::Identifier(name) => name,
            other => return Err(format!("expected field name, found {}", other)),
        };

        let operator = match self.advance()? {
            Token::Equal => Operator::Equal,
            Token::LessThan => Operator::LessThan,
            Token::LessThanEqual => Operator::LessThanOrEqual,
            Token::GreaterThan => Operator::GreaterThan,
            Token::GreaterThanEqual => Operator::GreaterThanOrEqual,
            Token::Contains => Operator::Contains,
            other => return Err(format!("expected operator after '{}', found {}", field, other)),
        };

        let literal = match self.advance()? {
            Token::Integer(n) => Literal::Int(n),
            Token::Float(n) => Literal::Float(n),
            Token::String(s) => Literal::Str(s),
            other => {
                return Err(format!(
                    "expected literal after '{} {}', found {}",
                    field, operator, other
                ));
            }
        };

        Ok(Term { field, operator, literal })
    }
}
