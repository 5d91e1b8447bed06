//! Filter predicates used inside `[?( ... )]` path segments.
//!
//! A filter is evaluated once per candidate child of the node being
//! filtered. `@` is the candidate, `@property` its key (or index), and
//! `@.a.b` / `@['a']` / `@[0]` look up inside it.

use crate::error::{ReactorError, Result};
use crate::path::addr::Step;
use crate::path::parse::read_quoted;
use serde_json::{Number, Value};
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    StartsWith,
    EndsWith,
    Includes,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RelStep {
    Key(String),
    Index(i64),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Current(Vec<RelStep>),
    Property,
    Literal(Value),
}

#[derive(Debug, Clone, PartialEq)]
pub enum FilterExpr {
    Or(Box<FilterExpr>, Box<FilterExpr>),
    And(Box<FilterExpr>, Box<FilterExpr>),
    Not(Box<FilterExpr>),
    Compare {
        op: CmpOp,
        lhs: Operand,
        rhs: Operand,
    },
    Call {
        method: Method,
        target: Operand,
        arg: Operand,
    },
    Truthy(Operand),
}

impl FilterExpr {
    pub fn parse(src: &str) -> Result<Self> {
        let tokens = lex(src)?;
        let mut p = Parser {
            src,
            tokens,
            pos: 0,
        };
        let expr = p.parse_or()?;
        if p.pos != p.tokens.len() {
            return Err(p.error("trailing tokens"));
        }
        Ok(expr)
    }

    pub fn matches(&self, candidate: &Value, key: &Step) -> bool {
        match self {
            FilterExpr::Or(a, b) => a.matches(candidate, key) || b.matches(candidate, key),
            FilterExpr::And(a, b) => a.matches(candidate, key) && b.matches(candidate, key),
            FilterExpr::Not(e) => !e.matches(candidate, key),
            FilterExpr::Compare { op, lhs, rhs } => {
                let l = lhs.resolve(candidate, key);
                let r = rhs.resolve(candidate, key);
                compare(*op, l.as_ref(), r.as_ref())
            }
            FilterExpr::Call {
                method,
                target,
                arg,
            } => {
                let (Some(t), Some(a)) = (target.resolve(candidate, key), arg.resolve(candidate, key))
                else {
                    return false;
                };
                match (method, &t, &a) {
                    (Method::StartsWith, Value::String(t), Value::String(a)) => t.starts_with(a),
                    (Method::EndsWith, Value::String(t), Value::String(a)) => t.ends_with(a),
                    (Method::Includes, Value::String(t), Value::String(a)) => t.contains(a.as_str()),
                    (Method::Includes, Value::Array(items), a) => {
                        items.iter().any(|item| loose_eq(item, a))
                    }
                    _ => false,
                }
            }
            FilterExpr::Truthy(op) => op.resolve(candidate, key).is_some_and(|v| truthy(&v)),
        }
    }
}

impl Operand {
    fn resolve(&self, candidate: &Value, key: &Step) -> Option<Value> {
        match self {
            Operand::Literal(v) => Some(v.clone()),
            Operand::Property => Some(match key {
                Step::Key(k) => Value::String(k.clone()),
                Step::Index(i) => Value::Number(Number::from(*i as u64)),
            }),
            Operand::Current(steps) => {
                let mut node = candidate;
                for step in steps {
                    node = match (step, node) {
                        (RelStep::Key(k), Value::Object(map)) => map.get(k)?,
                        (RelStep::Index(i), Value::Array(items)) => {
                            let idx = if *i < 0 {
                                items.len().checked_sub(i.unsigned_abs() as usize)?
                            } else {
                                *i as usize
                            };
                            items.get(idx)?
                        }
                        _ => return None,
                    };
                }
                Some(node.clone())
            }
        }
    }
}

/// Equality that treats `1` and `1.0` as the same number.
pub(crate) fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

fn truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn compare(op: CmpOp, l: Option<&Value>, r: Option<&Value>) -> bool {
    let eq = match (l, r) {
        (Some(a), Some(b)) => loose_eq(a, b),
        (None, None) => true,
        _ => false,
    };
    let ord = match (l, r) {
        (Some(Value::Number(a)), Some(Value::Number(b))) => {
            a.as_f64().and_then(|a| b.as_f64().and_then(|b| a.partial_cmp(&b)))
        }
        (Some(Value::String(a)), Some(Value::String(b))) => Some(a.cmp(b)),
        _ => None,
    };
    match op {
        CmpOp::Eq => eq,
        CmpOp::Ne => !eq,
        CmpOp::Lt => ord == Some(Ordering::Less),
        CmpOp::Le => matches!(ord, Some(Ordering::Less | Ordering::Equal)),
        CmpOp::Gt => ord == Some(Ordering::Greater),
        CmpOp::Ge => matches!(ord, Some(Ordering::Greater | Ordering::Equal)),
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Operand(Operand),
    Method(Method),
    LParen,
    RParen,
    Cmp(CmpOp),
    And,
    Or,
    Not,
}

fn is_ident(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

fn lex(src: &str) -> Result<Vec<Token>> {
    let err = |reason: String| ReactorError::malformed_path(src, reason);
    let chars: Vec<char> = src.chars().collect();
    let mut out = Vec::new();
    let mut i = 0;

    let ident_at = |start: usize| -> usize {
        let mut end = start;
        while end < chars.len() && is_ident(chars[end]) {
            end += 1;
        }
        end
    };

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '@' => {
                i += 1;
                let end = ident_at(i);
                if chars[i..end].iter().collect::<String>() == "property" {
                    out.push(Token::Operand(Operand::Property));
                    i = end;
                    continue;
                }
                let mut steps = Vec::new();
                loop {
                    match chars.get(i) {
                        Some('.') => {
                            let end = ident_at(i + 1);
                            if end == i + 1 || chars.get(end) == Some(&'(') {
                                break;
                            }
                            steps.push(RelStep::Key(chars[i + 1..end].iter().collect()));
                            i = end;
                        }
                        Some('[') => {
                            i += 1;
                            match chars.get(i) {
                                Some(&q) if q == '\'' || q == '"' => {
                                    let (s, used) = read_quoted(&chars[i + 1..], q)
                                        .ok_or_else(|| err("unterminated string".into()))?;
                                    steps.push(RelStep::Key(s));
                                    i += 1 + used;
                                }
                                _ => {
                                    let start = i;
                                    while chars.get(i).is_some_and(|c| *c == '-' || c.is_ascii_digit()) {
                                        i += 1;
                                    }
                                    let text: String = chars[start..i].iter().collect();
                                    let idx = text
                                        .parse::<i64>()
                                        .map_err(|_| err(format!("bad index '{}'", text)))?;
                                    steps.push(RelStep::Index(idx));
                                }
                            }
                            if chars.get(i) != Some(&']') {
                                return Err(err("expected ']'".into()));
                            }
                            i += 1;
                        }
                        _ => break,
                    }
                }
                out.push(Token::Operand(Operand::Current(steps)));
            }
            '.' => {
                let end = ident_at(i + 1);
                let name: String = chars[i + 1..end].iter().collect();
                if chars.get(end) != Some(&'(') {
                    return Err(err(format!("expected a method call after '.{}'", name)));
                }
                let method = match name.as_str() {
                    "startsWith" => Method::StartsWith,
                    "endsWith" => Method::EndsWith,
                    "includes" => Method::Includes,
                    other => return Err(err(format!("unknown filter method '{}'", other))),
                };
                out.push(Token::Method(method));
                i = end;
            }
            '\'' | '"' => {
                let (s, used) = read_quoted(&chars[i + 1..], c)
                    .ok_or_else(|| err("unterminated string".into()))?;
                out.push(Token::Operand(Operand::Literal(Value::String(s))));
                i += 1 + used;
            }
            c if c.is_ascii_digit()
                || (c == '-' && chars.get(i + 1).is_some_and(|d| d.is_ascii_digit())) =>
            {
                let start = i;
                i += 1;
                while chars
                    .get(i)
                    .is_some_and(|c| c.is_ascii_digit() || *c == '.' || *c == 'e' || *c == 'E')
                {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let number = if let Ok(n) = text.parse::<i64>() {
                    Number::from(n)
                } else {
                    text.parse::<f64>()
                        .ok()
                        .and_then(Number::from_f64)
                        .ok_or_else(|| err(format!("bad number '{}'", text)))?
                };
                out.push(Token::Operand(Operand::Literal(Value::Number(number))));
            }
            '(' => {
                out.push(Token::LParen);
                i += 1;
            }
            ')' => {
                out.push(Token::RParen);
                i += 1;
            }
            '=' | '!' | '<' | '>' | '&' | '|' => {
                let rest: String = chars[i..chars.len().min(i + 3)].iter().collect();
                let (tok, len) = if rest.starts_with("===") {
                    (Token::Cmp(CmpOp::Eq), 3)
                } else if rest.starts_with("!==") {
                    (Token::Cmp(CmpOp::Ne), 3)
                } else if rest.starts_with("==") {
                    (Token::Cmp(CmpOp::Eq), 2)
                } else if rest.starts_with("!=") {
                    (Token::Cmp(CmpOp::Ne), 2)
                } else if rest.starts_with("<=") {
                    (Token::Cmp(CmpOp::Le), 2)
                } else if rest.starts_with(">=") {
                    (Token::Cmp(CmpOp::Ge), 2)
                } else if rest.starts_with("&&") {
                    (Token::And, 2)
                } else if rest.starts_with("||") {
                    (Token::Or, 2)
                } else if rest.starts_with('<') {
                    (Token::Cmp(CmpOp::Lt), 1)
                } else if rest.starts_with('>') {
                    (Token::Cmp(CmpOp::Gt), 1)
                } else if rest.starts_with('!') {
                    (Token::Not, 1)
                } else {
                    return Err(err(format!("unexpected operator near '{}'", rest)));
                };
                out.push(tok);
                i += len;
            }
            c if is_ident(c) => {
                let end = ident_at(i);
                let word: String = chars[i..end].iter().collect();
                let lit = match word.as_str() {
                    "true" => Value::Bool(true),
                    "false" => Value::Bool(false),
                    "null" => Value::Null,
                    other => return Err(err(format!("unexpected identifier '{}'", other))),
                };
                out.push(Token::Operand(Operand::Literal(lit)));
                i = end;
            }
            other => return Err(err(format!("unexpected character '{}'", other))),
        }
    }
    Ok(out)
}

struct Parser<'a> {
    src: &'a str,
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser<'_> {
    fn error(&self, reason: &str) -> ReactorError {
        ReactorError::malformed_path(self.src, format!("{} (token {})", reason, self.pos))
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        t
    }

    fn parse_or(&mut self) -> Result<FilterExpr> {
        let mut lhs = self.parse_and()?;
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            let rhs = self.parse_and()?;
            lhs = FilterExpr::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<FilterExpr> {
        let mut lhs = self.parse_unary()?;
        while self.peek() == Some(&Token::And) {
            self.pos += 1;
            let rhs = self.parse_unary()?;
            lhs = FilterExpr::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<FilterExpr> {
        match self.peek() {
            Some(Token::Not) => {
                self.pos += 1;
                Ok(FilterExpr::Not(Box::new(self.parse_unary()?)))
            }
            Some(Token::LParen) => {
                self.pos += 1;
                let inner = self.parse_or()?;
                if self.next() != Some(Token::RParen) {
                    return Err(self.error("expected ')'"));
                }
                Ok(inner)
            }
            _ => self.parse_comparison(),
        }
    }

    fn parse_comparison(&mut self) -> Result<FilterExpr> {
        let lhs = self.parse_operand()?;
        match self.peek().cloned() {
            Some(Token::Method(method)) => {
                self.pos += 1;
                if self.next() != Some(Token::LParen) {
                    return Err(self.error("expected '(' after method"));
                }
                let arg = self.parse_operand()?;
                if self.next() != Some(Token::RParen) {
                    return Err(self.error("expected ')' after method argument"));
                }
                Ok(FilterExpr::Call {
                    method,
                    target: lhs,
                    arg,
                })
            }
            Some(Token::Cmp(op)) => {
                self.pos += 1;
                let rhs = self.parse_operand()?;
                Ok(FilterExpr::Compare { op, lhs, rhs })
            }
            _ => Ok(FilterExpr::Truthy(lhs)),
        }
    }

    fn parse_operand(&mut self) -> Result<Operand> {
        match self.next() {
            Some(Token::Operand(op)) => Ok(op),
            _ => Err(self.error("expected an operand")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn eval(expr: &str, candidate: Value) -> bool {
        FilterExpr::parse(expr)
            .unwrap()
            .matches(&candidate, &Step::key("Queue"))
    }

    #[test]
    fn equality_and_inequality() {
        let res = json!({"Type": "AWS::SQS::Queue", "Properties": {"Delay": 5}});
        assert!(eval("@.Type == 'AWS::SQS::Queue'", res.clone()));
        assert!(eval("@.Type != 'AWS::SNS::Topic'", res.clone()));
        assert!(eval("@.Properties.Delay == 5.0", res.clone()));
        assert!(eval("@.Properties.Delay >= 5 && @.Properties.Delay < 6", res.clone()));
        assert!(!eval("@.Missing == 'x'", res));
    }

    #[test]
    fn text_predicates() {
        let res = json!({"Type": "AWS::Serverless::Function", "Tags": ["a", "b"]});
        assert!(eval("@.Type.startsWith('AWS::Serverless')", res.clone()));
        assert!(eval("@.Type.endsWith('Function')", res.clone()));
        assert!(eval("@.Tags.includes('b')", res.clone()));
        assert!(eval("!@.Type.includes('Queue')", res));
    }

    #[test]
    fn property_and_truthiness() {
        assert!(eval("@property == 'Queue'", json!({})));
        assert!(eval("@.Enabled", json!({"Enabled": true})));
        assert!(!eval("@.Enabled", json!({"Enabled": false})));
        assert!(eval("(@.a == 1 || @.b == 2) && !@.c", json!({"b": 2})));
    }

    #[test]
    fn bracketed_relative_lookup() {
        assert!(eval("@['Fn::GetAtt'][1] == 'Arn'", json!({"Fn::GetAtt": ["Q", "Arn"]})));
        assert!(eval("@.items[-1] == 3", json!({"items": [1, 2, 3]})));
    }

    #[test]
    fn malformed_filters_fail_to_parse() {
        assert!(FilterExpr::parse("@.a ==").is_err());
        assert!(FilterExpr::parse("@.a.frobnicate('x')").is_err());
        assert!(FilterExpr::parse("@.a == bogus").is_err());
        assert!(FilterExpr::parse("(@.a == 1").is_err());
    }
}
