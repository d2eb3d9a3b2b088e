//! SQL subset over the `kv` table
//!
//! ```text
//! SELECT value | key, value | * FROM kv WHERE key = 'k'
//! SELECT value | key, value | * FROM kv WHERE key BETWEEN 'a' AND 'b'
//! INSERT INTO kv [(key, value)] VALUES ('k', 'v')
//! UPDATE kv SET value = 'v' WHERE key = 'k'
//! DELETE FROM kv WHERE key = 'k'
//! ```
//!
//! Keywords and identifiers are case-insensitive. String literals use
//! single quotes with `''` as the escape for a quote. Statements are
//! separated by `;`.

use thiserror::Error;

use crate::command::Command;

/// Name of the only table
pub const TABLE: &str = "kv";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("syntax error: {0}")]
pub struct SyntaxError(pub String);

/// Columns a SELECT returns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Projection {
    Value,
    KeyValue,
}

impl Projection {
    pub fn columns(self) -> &'static [&'static str] {
        match self {
            Projection::Value => &["value"],
            Projection::KeyValue => &["key", "value"],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    Select {
        projection: Projection,
        key: Vec<u8>,
    },
    SelectRange {
        projection: Projection,
        from: Vec<u8>,
        to: Vec<u8>,
    },
    Insert {
        key: Vec<u8>,
        value: Vec<u8>,
    },
    Update {
        key: Vec<u8>,
        value: Vec<u8>,
    },
    Delete {
        key: Vec<u8>,
    },
}

impl Statement {
    /// The engine command this statement runs
    pub fn to_command(&self) -> Command {
        match self {
            Statement::Select { key, .. } => Command::Get { key: key.clone() },
            Statement::SelectRange { from, to, .. } => Command::GetRange {
                from: from.clone(),
                to: to.clone(),
            },
            Statement::Insert { key, value } | Statement::Update { key, value } => Command::Set {
                key: key.clone(),
                value: value.clone(),
            },
            Statement::Delete { key } => Command::Del { key: key.clone() },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Word(String),
    Str(Vec<u8>),
    Symbol(u8),
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Word(w) => format!("\"{}\"", w),
            Token::Str(_) => "string literal".to_string(),
            Token::Symbol(c) => format!("\"{}\"", *c as char),
        }
    }
}

fn tokenize(input: &[u8]) -> Result<Vec<Token>, SyntaxError> {
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < input.len() {
        let c = input[i];
        match c {
            b' ' | b'\t' | b'\r' | b'\n' => i += 1,
            b'-' if input.get(i + 1) == Some(&b'-') => {
                // Line comment
                while i < input.len() && input[i] != b'\n' {
                    i += 1;
                }
            }
            b'\'' => {
                let mut lit = Vec::new();
                i += 1;
                loop {
                    match input.get(i) {
                        None => return Err(SyntaxError("unterminated string literal".into())),
                        Some(b'\'') if input.get(i + 1) == Some(&b'\'') => {
                            lit.push(b'\'');
                            i += 2;
                        }
                        Some(b'\'') => {
                            i += 1;
                            break;
                        }
                        Some(&b) => {
                            lit.push(b);
                            i += 1;
                        }
                    }
                }
                tokens.push(Token::Str(lit));
            }
            b'"' => {
                let end = input[i + 1..]
                    .iter()
                    .position(|&b| b == b'"')
                    .ok_or_else(|| SyntaxError("unterminated quoted identifier".into()))?;
                let ident = String::from_utf8_lossy(&input[i + 1..i + 1 + end]).into_owned();
                tokens.push(Token::Word(ident));
                i += end + 2;
            }
            b'=' | b',' | b'(' | b')' | b'*' | b';' => {
                tokens.push(Token::Symbol(c));
                i += 1;
            }
            c if c.is_ascii_alphabetic() || c == b'_' => {
                let start = i;
                while i < input.len() && (input[i].is_ascii_alphanumeric() || input[i] == b'_') {
                    i += 1;
                }
                let word = String::from_utf8_lossy(&input[start..i]).into_owned();
                tokens.push(Token::Word(word));
            }
            other => {
                return Err(SyntaxError(format!(
                    "unexpected character {:?}",
                    other as char
                )))
            }
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn unexpected(&self, expected: &str) -> SyntaxError {
        match self.peek() {
            Some(token) => SyntaxError(format!(
                "expected {} but found {}",
                expected,
                token.describe()
            )),
            None => SyntaxError(format!("expected {} at end of input", expected)),
        }
    }

    fn peek_keyword(&self, kw: &str) -> bool {
        matches!(self.peek(), Some(Token::Word(w)) if w.eq_ignore_ascii_case(kw))
    }

    fn peek_symbol(&self, sym: u8) -> bool {
        self.peek() == Some(&Token::Symbol(sym))
    }

    fn keyword(&mut self, kw: &str) -> Result<(), SyntaxError> {
        if self.peek_keyword(kw) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.unexpected(&kw.to_ascii_uppercase()))
        }
    }

    fn symbol(&mut self, sym: u8) -> Result<(), SyntaxError> {
        if self.peek_symbol(sym) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.unexpected(&format!("\"{}\"", sym as char)))
        }
    }

    fn string(&mut self) -> Result<Vec<u8>, SyntaxError> {
        match self.peek() {
            Some(Token::Str(s)) => {
                let s = s.clone();
                self.pos += 1;
                Ok(s)
            }
            _ => Err(self.unexpected("a string literal")),
        }
    }

    fn table(&mut self) -> Result<(), SyntaxError> {
        if self.peek_keyword(TABLE) {
            self.pos += 1;
            return Ok(());
        }
        match self.peek() {
            Some(Token::Word(w)) => Err(SyntaxError(format!("relation \"{}\" does not exist", w))),
            _ => Err(self.unexpected("table name")),
        }
    }

    fn statement(&mut self) -> Result<Statement, SyntaxError> {
        let statement = match self.advance() {
            Some(Token::Word(w)) if w.eq_ignore_ascii_case("select") => self.select()?,
            Some(Token::Word(w)) if w.eq_ignore_ascii_case("insert") => self.insert()?,
            Some(Token::Word(w)) if w.eq_ignore_ascii_case("update") => self.update()?,
            Some(Token::Word(w)) if w.eq_ignore_ascii_case("delete") => self.delete()?,
            Some(token) => {
                return Err(SyntaxError(format!(
                    "unsupported statement starting with {}",
                    token.describe()
                )))
            }
            None => return Err(SyntaxError("empty statement".into())),
        };

        if !self.at_end() {
            return Err(self.unexpected("end of statement"));
        }
        Ok(statement)
    }

    fn projection(&mut self) -> Result<Projection, SyntaxError> {
        if self.peek_symbol(b'*') {
            self.pos += 1;
            return Ok(Projection::KeyValue);
        }
        if self.peek_keyword("value") {
            self.pos += 1;
            return Ok(Projection::Value);
        }
        self.keyword("key")?;
        self.symbol(b',')?;
        self.keyword("value")?;
        Ok(Projection::KeyValue)
    }

    fn select(&mut self) -> Result<Statement, SyntaxError> {
        let projection = self.projection()?;
        self.keyword("from")?;
        self.table()?;
        self.keyword("where")?;
        self.keyword("key")?;

        if self.peek_keyword("between") {
            self.pos += 1;
            let from = self.string()?;
            self.keyword("and")?;
            let to = self.string()?;
            return Ok(Statement::SelectRange {
                projection,
                from,
                to,
            });
        }

        self.symbol(b'=')?;
        let key = self.string()?;
        Ok(Statement::Select { projection, key })
    }

    fn insert(&mut self) -> Result<Statement, SyntaxError> {
        self.keyword("into")?;
        self.table()?;

        if self.peek_symbol(b'(') {
            self.pos += 1;
            self.keyword("key")?;
            self.symbol(b',')?;
            self.keyword("value")?;
            self.symbol(b')')?;
        }

        self.keyword("values")?;
        self.symbol(b'(')?;
        let key = self.string()?;
        self.symbol(b',')?;
        let value = self.string()?;
        self.symbol(b')')?;
        Ok(Statement::Insert { key, value })
    }

    fn update(&mut self) -> Result<Statement, SyntaxError> {
        self.table()?;
        self.keyword("set")?;
        self.keyword("value")?;
        self.symbol(b'=')?;
        let value = self.string()?;
        let key = self.where_key()?;
        Ok(Statement::Update { key, value })
    }

    fn delete(&mut self) -> Result<Statement, SyntaxError> {
        self.keyword("from")?;
        self.table()?;
        let key = self.where_key()?;
        Ok(Statement::Delete { key })
    }

    /// `WHERE key = '<literal>'`
    fn where_key(&mut self) -> Result<Vec<u8>, SyntaxError> {
        self.keyword("where")?;
        self.keyword("key")?;
        self.symbol(b'=')?;
        self.string()
    }
}

/// Parse every `;`-separated statement in `input`
///
/// Empty statements are skipped, so an empty or whitespace-only query
/// yields an empty list. Nothing is returned unless all statements parse.
pub fn parse(input: &[u8]) -> Result<Vec<Statement>, SyntaxError> {
    let tokens = tokenize(input)?;

    tokens
        .split(|t| *t == Token::Symbol(b';'))
        .filter(|chunk| !chunk.is_empty())
        .map(|chunk| {
            Parser {
                tokens: chunk.to_vec(),
                pos: 0,
            }
            .statement()
        })
        .collect()
}
