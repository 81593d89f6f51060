//! Parser for textual column types read back from an existing table.
//!
//! Only the types the translator can emit are understood; anything else is
//! an unsupported-type error, which makes a manually altered table fail
//! schema verification instead of being silently misread.

use siphon_api::column::{ColumnType, TIMESTAMP_PRECISION};
use siphon_api::error::ReplicaError;

pub fn parse_column_type(input: &str) -> Result<ColumnType, ReplicaError> {
    let mut parser = Parser { input, pos: 0 };
    let ty = parser.parse_type()?;
    parser.skip_spaces();
    if parser.pos != parser.input.len() {
        return Err(ReplicaError::schema(format!(
            "trailing input in column type '{input}' at offset {}",
            parser.pos
        )));
    }
    Ok(ty)
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn skip_spaces(&mut self) {
        while self.rest().starts_with(' ') {
            self.pos += 1;
        }
    }

    fn eat(&mut self, c: char) -> Result<(), ReplicaError> {
        self.skip_spaces();
        if self.rest().starts_with(c) {
            self.pos += c.len_utf8();
            Ok(())
        } else {
            Err(ReplicaError::schema(format!(
                "expected '{c}' at offset {} in '{}'",
                self.pos, self.input
            )))
        }
    }

    fn peek(&mut self, c: char) -> bool {
        self.skip_spaces();
        self.rest().starts_with(c)
    }

    fn ident(&mut self) -> &'a str {
        self.skip_spaces();
        let start = self.pos;
        while self
            .rest()
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            self.pos += 1;
        }
        &self.input[start..self.pos]
    }

    fn integer(&mut self) -> Result<i64, ReplicaError> {
        self.skip_spaces();
        let start = self.pos;
        if self.rest().starts_with('-') {
            self.pos += 1;
        }
        while self.rest().chars().next().is_some_and(|c| c.is_ascii_digit()) {
            self.pos += 1;
        }
        self.input[start..self.pos]
            .parse()
            .map_err(|_| ReplicaError::schema(format!("expected integer at offset {start}")))
    }

    fn quoted(&mut self) -> Result<String, ReplicaError> {
        self.eat('\'')?;
        let mut out = String::new();
        let mut chars = self.rest().char_indices();
        while let Some((i, c)) = chars.next() {
            match c {
                '\\' => {
                    let Some((_, escaped)) = chars.next() else {
                        break;
                    };
                    out.push(escaped);
                }
                '\'' => {
                    self.pos += i + 1;
                    return Ok(out);
                }
                other => out.push(other),
            }
        }
        Err(ReplicaError::schema(format!("unterminated string in '{}'", self.input)))
    }

    fn parse_type(&mut self) -> Result<ColumnType, ReplicaError> {
        let name = self.ident();
        Ok(match name {
            "Int8" => ColumnType::Int8,
            "Int16" => ColumnType::Int16,
            "Int32" => ColumnType::Int32,
            "Int64" => ColumnType::Int64,
            "Float32" => ColumnType::Float32,
            "Float64" => ColumnType::Float64,
            "String" => ColumnType::String,
            "Date" => ColumnType::Date,
            "UInt8" | "Bool" => ColumnType::Bool,
            "Nullable" => {
                self.eat('(')?;
                let inner = self.parse_type()?;
                self.eat(')')?;
                ColumnType::Nullable(Box::new(inner))
            }
            "Array" => {
                self.eat('(')?;
                let inner = self.parse_type()?;
                self.eat(')')?;
                ColumnType::Array(Box::new(inner))
            }
            "Decimal" => {
                self.eat('(')?;
                let _precision = self.integer()?;
                self.eat(',')?;
                let scale = self.integer()?;
                self.eat(')')?;
                ColumnType::Decimal { scale: scale as u8 }
            }
            "DateTime64" => {
                self.eat('(')?;
                let precision = self.integer()?;
                self.eat(')')?;
                if precision != TIMESTAMP_PRECISION as i64 {
                    return Err(ReplicaError::unsupported(format!(
                        "DateTime64({precision}) — only precision {TIMESTAMP_PRECISION} is produced here"
                    )));
                }
                ColumnType::DateTime
            }
            "Enum16" | "Enum8" => {
                self.eat('(')?;
                let mut symbols = Vec::new();
                loop {
                    let symbol = self.quoted()?;
                    self.eat('=')?;
                    let ordinal = self.integer()?;
                    symbols.push((symbol, ordinal as i16));
                    if self.peek(')') {
                        break;
                    }
                    self.eat(',')?;
                }
                self.eat(')')?;
                ColumnType::Enum16(symbols)
            }
            other => {
                return Err(ReplicaError::unsupported(format!("column type '{other}'")));
            }
        })
    }
}
