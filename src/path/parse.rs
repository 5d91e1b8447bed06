//! Path expression parser.
//!
//! Grammar (whitespace is only allowed inside brackets):
//!   path     := ('$' | '@') segment*
//!   segment  := '.' name | '.*' | '..' name
//!             | '[' ( quoted | integer | '*' | '?(' filter ')' ) ']'
//!
//! `$` addresses the document root, `@` the caller-provided local root.

use crate::error::{ReactorError, Result};
use crate::path::filter::FilterExpr;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Root,
    Local,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    Key(String),
    /// Negative indexes count from the end of the sequence.
    Index(i64),
    Wildcard,
    Filter(FilterExpr),
    /// `..name`: every descendant map entry called `name`.
    Descendant(String),
}

impl Segment {
    /// Filter, wildcard and descendant segments select; they cannot name a
    /// key that does not exist yet.
    pub fn is_synthesizable(&self) -> bool {
        matches!(self, Segment::Key(_) | Segment::Index(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PathExpr {
    pub origin: Origin,
    pub segments: Vec<Segment>,
    source: String,
}

impl PathExpr {
    pub fn parse(src: &str) -> Result<Self> {
        let mut cur = Cursor::new(src);
        cur.skip_ws();
        let origin = match cur.bump() {
            Some('$') => Origin::Root,
            Some('@') => Origin::Local,
            _ => return Err(cur.error("path must start with '$' or '@'")),
        };

        let mut segments = Vec::new();
        loop {
            match cur.peek() {
                None => break,
                Some('.') => {
                    cur.bump();
                    if cur.eat('.') {
                        let name = cur.read_name()?;
                        segments.push(Segment::Descendant(name));
                    } else if cur.eat('*') {
                        segments.push(Segment::Wildcard);
                    } else {
                        segments.push(Segment::Key(cur.read_name()?));
                    }
                }
                Some('[') => {
                    cur.bump();
                    segments.push(cur.read_bracket()?);
                }
                Some(c) if c.is_whitespace() => {
                    cur.skip_ws();
                    if cur.peek().is_some() {
                        return Err(cur.error("unexpected whitespace"));
                    }
                }
                Some(c) => return Err(cur.error(format!("unexpected character '{}'", c))),
            }
        }

        Ok(PathExpr {
            origin,
            segments,
            source: src.trim().to_string(),
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// The same path minus its final segment.
    pub fn parent(&self) -> Option<PathExpr> {
        let (_, rest) = self.segments.split_last()?;
        Some(PathExpr {
            origin: self.origin,
            segments: rest.to_vec(),
            source: self.source.clone(),
        })
    }
}

impl FromStr for PathExpr {
    type Err = ReactorError;

    fn from_str(s: &str) -> Result<Self> {
        PathExpr::parse(s)
    }
}

impl fmt::Display for PathExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

struct Cursor<'a> {
    src: &'a str,
    chars: Vec<char>,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            chars: src.chars().collect(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    fn eat(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn error(&self, reason: impl Into<String>) -> ReactorError {
        ReactorError::malformed_path(
            self.src,
            format!("{} (at offset {})", reason.into(), self.pos),
        )
    }

    fn expect(&mut self, c: char) -> Result<()> {
        if self.eat(c) {
            Ok(())
        } else {
            Err(self.error(format!("expected '{}'", c)))
        }
    }

    fn read_name(&mut self) -> Result<String> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c == '.' || c == '[' || c.is_whitespace() {
                break;
            }
            self.pos += 1;
        }
        if self.pos == start {
            return Err(self.error("expected a key name"));
        }
        Ok(self.chars[start..self.pos].iter().collect())
    }

    fn read_bracket(&mut self) -> Result<Segment> {
        self.skip_ws();
        let seg = match self.peek() {
            Some('*') => {
                self.bump();
                Segment::Wildcard
            }
            Some(q @ ('\'' | '"')) => {
                self.bump();
                let (s, used) = read_quoted(&self.chars[self.pos..], q)
                    .ok_or_else(|| self.error("unterminated quoted key"))?;
                self.pos += used;
                Segment::Key(s)
            }
            Some('?') => {
                self.bump();
                self.skip_ws();
                self.expect('(')?;
                let body = self.read_balanced()?;
                Segment::Filter(FilterExpr::parse(&body).map_err(|e| match e {
                    ReactorError::MalformedPath { reason, .. } => self.error(reason),
                    other => other,
                })?)
            }
            Some(c) if c == '-' || c.is_ascii_digit() => {
                let start = self.pos;
                self.bump();
                while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                    self.bump();
                }
                let text: String = self.chars[start..self.pos].iter().collect();
                let idx = text
                    .parse::<i64>()
                    .map_err(|_| self.error(format!("bad index {}", text)))?;
                Segment::Index(idx)
            }
            _ => return Err(self.error("expected quoted key, index, '*' or filter")),
        };
        self.skip_ws();
        self.expect(']')?;
        Ok(seg)
    }

    /// Text up to the ')' closing an already consumed '('.
    fn read_balanced(&mut self) -> Result<String> {
        let start = self.pos;
        let mut depth = 1usize;
        while let Some(c) = self.peek() {
            match c {
                '\'' | '"' => {
                    self.bump();
                    let (_, used) = read_quoted(&self.chars[self.pos..], c)
                        .ok_or_else(|| self.error("unterminated string in filter"))?;
                    self.pos += used;
                    continue;
                }
                '(' => depth += 1,
                ')' => {
                    depth -= 1;
                    if depth == 0 {
                        let body = self.chars[start..self.pos].iter().collect();
                        self.bump();
                        return Ok(body);
                    }
                }
                _ => {}
            }
            self.bump();
        }
        Err(self.error("unbalanced parentheses in filter"))
    }
}

/// Reads a quoted string whose opening quote was already consumed.
/// Returns the unescaped text and the number of chars used, closing quote
/// included.
pub(crate) fn read_quoted(chars: &[char], quote: char) -> Option<(String, usize)> {
    let mut out = String::new();
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '\\' if i + 1 < chars.len() => {
                out.push(chars[i + 1]);
                i += 2;
            }
            c if c == quote => return Some((out, i + 1)),
            c => {
                out.push(c);
                i += 1;
            }
        }
    }
    None
}
