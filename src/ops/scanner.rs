//! Tokenizer for the operation mini-language.
//!
//! The argument vector is joined into one space-separated string and
//! scanned into identifiers, numbers, and the `,` `-` `:` separators.
//! Whitespace is normally skipped; parameter parsing flips
//! `keep_whitespace` so that `perc:10: 4` cannot absorb `4` as a second
//! parameter.

use anyhow::{bail, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token {
    Identifier,
    Integer,
    Float,
    Comma,
    Dash,
    Colon,
    Whitespace,
    End,
}

pub struct Scanner {
    input: Vec<u8>,
    pos: usize,
    peeked: Option<Token>,
    /// Yield a Whitespace token instead of silently skipping blanks.
    pub keep_whitespace: bool,
    /// Text of the last token returned.
    pub text: String,
    pub val_int: u64,
    pub val_float: f64,
}

impl Scanner {
    pub fn from_args(args: &[String]) -> Self {
        Self {
            input: args.join(" ").into_bytes(),
            pos: 0,
            peeked: None,
            keep_whitespace: false,
            text: String::new(),
            val_int: 0,
            val_float: 0.0,
        }
    }

    pub fn peek(&mut self) -> Result<Token> {
        if let Some(tok) = self.peeked {
            return Ok(tok);
        }
        let tok = self.next_token()?;
        self.peeked = Some(tok);
        Ok(tok)
    }

    pub fn next_token(&mut self) -> Result<Token> {
        if let Some(tok) = self.peeked.take() {
            return Ok(tok);
        }

        if self.pos >= self.input.len() {
            return Ok(Token::End);
        }

        if self.input[self.pos].is_ascii_whitespace() {
            while self.pos < self.input.len() && self.input[self.pos].is_ascii_whitespace() {
                self.pos += 1;
            }
            if self.keep_whitespace {
                if self.pos >= self.input.len() {
                    return Ok(Token::End);
                }
                self.text = " ".to_string();
                return Ok(Token::Whitespace);
            }
            if self.pos >= self.input.len() {
                return Ok(Token::End);
            }
        }

        let b = self.input[self.pos];
        match b {
            b',' => {
                self.pos += 1;
                self.text = ",".to_string();
                Ok(Token::Comma)
            }
            b'-' => {
                self.pos += 1;
                self.text = "-".to_string();
                Ok(Token::Dash)
            }
            b':' => {
                self.pos += 1;
                self.text = ":".to_string();
                Ok(Token::Colon)
            }
            b'0'..=b'9' => self.scan_number(),
            b'a'..=b'z' | b'A'..=b'Z' | b'_' | b'\\' => self.scan_identifier(),
            _ => {
                let rest = String::from_utf8_lossy(&self.input[self.pos..]);
                bail!("invalid operand '{rest}'")
            }
        }
    }

    fn scan_number(&mut self) -> Result<Token> {
        let start = self.pos;
        while self.pos < self.input.len() && self.input[self.pos].is_ascii_digit() {
            self.pos += 1;
        }
        let mut is_float = false;
        if self.input.get(self.pos) == Some(&b'.')
            && self.input.get(self.pos + 1).is_some_and(u8::is_ascii_digit)
        {
            is_float = true;
            self.pos += 1;
            while self.pos < self.input.len() && self.input[self.pos].is_ascii_digit() {
                self.pos += 1;
            }
        }

        let text = String::from_utf8_lossy(&self.input[start..self.pos]).into_owned();
        if self
            .input
            .get(self.pos)
            .is_some_and(|&b| b.is_ascii_alphabetic() || b == b'_')
        {
            let rest = String::from_utf8_lossy(&self.input[start..]);
            bail!("invalid numeric value '{rest}'");
        }

        if is_float {
            self.val_float = text.parse().unwrap_or(0.0);
            self.text = text;
            Ok(Token::Float)
        } else {
            match text.parse::<u64>() {
                Ok(v) => {
                    self.val_int = v;
                    self.val_float = v as f64;
                    self.text = text;
                    Ok(Token::Integer)
                }
                Err(_) => bail!("invalid numeric value '{text}'"),
            }
        }
    }

    fn scan_identifier(&mut self) -> Result<Token> {
        let mut ident = String::new();
        while self.pos < self.input.len() {
            let b = self.input[self.pos];
            if b.is_ascii_alphanumeric() || b == b'_' {
                ident.push(b as char);
                self.pos += 1;
            } else if b == b'\\' {
                self.pos += 1;
                match self.input.get(self.pos) {
                    None => bail!("backslash at end of identifier"),
                    Some(&esc) => {
                        ident.push(esc as char);
                        self.pos += 1;
                    }
                }
            } else {
                break;
            }
        }
        self.text = ident;
        Ok(Token::Identifier)
    }
}
