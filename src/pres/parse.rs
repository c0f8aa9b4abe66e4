//! Parsing of sets and maps from their textual form.
//!
//! The parser exists only at the facade's outermost boundary; everything
//! behind it composes handle to handle.

use std::collections::BTreeMap;

use super::map::{AffineClause, Map, MapData, OutputExpr};
use super::set::{Conjunct, EngineConstraint, Kind, Linear, Set, SetPart, Space};
use super::{Context, ModelingError};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Ident(String),
    Int(i64),
    Symbol(&'static str),
}

fn tokenize(text: &str) -> Result<Vec<Token>, ModelingError> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = text.chars().collect();
    let mut pos = 0;
    while pos < chars.len() {
        let c = chars[pos];
        match c {
            c if c.is_whitespace() => pos += 1,
            c if c.is_ascii_digit() => {
                let start = pos;
                while pos < chars.len() && chars[pos].is_ascii_digit() {
                    pos += 1;
                }
                let literal: String = chars[start..pos].iter().collect();
                let value = literal
                    .parse()
                    .map_err(|_| ModelingError::new("integer literal overflow"))?;
                tokens.push(Token::Int(value));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = pos;
                while pos < chars.len() && (chars[pos].is_alphanumeric() || chars[pos] == '_') {
                    pos += 1;
                }
                tokens.push(Token::Ident(chars[start..pos].iter().collect()));
            }
            '-' if chars.get(pos + 1) == Some(&'>') => {
                tokens.push(Token::Symbol("->"));
                pos += 2;
            }
            '<' if chars.get(pos + 1) == Some(&'=') => {
                tokens.push(Token::Symbol("<="));
                pos += 2;
            }
            '>' if chars.get(pos + 1) == Some(&'=') => {
                tokens.push(Token::Symbol(">="));
                pos += 2;
            }
            '{' | '}' | '[' | ']' | ':' | ',' | '+' | '-' | '*' | '(' | ')' | '<' | '>'
            | '=' => {
                let symbol = match c {
                    '{' => "{",
                    '}' => "}",
                    '[' => "[",
                    ']' => "]",
                    ':' => ":",
                    ',' => ",",
                    '+' => "+",
                    '-' => "-",
                    '*' => "*",
                    '(' => "(",
                    ')' => ")",
                    '<' => "<",
                    '>' => ">",
                    _ => "=",
                };
                tokens.push(Token::Symbol(symbol));
                pos += 1;
            }
            other => {
                return Err(ModelingError::new(format!(
                    "unexpected character `{other}`"
                )));
            }
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    /// dimension names in order, then parameter names
    dims: Vec<String>,
    params: Vec<String>,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Result<Token, ModelingError> {
        let token = self
            .tokens
            .get(self.pos)
            .cloned()
            .ok_or_else(|| ModelingError::new("unexpected end of input"))?;
        self.pos += 1;
        Ok(token)
    }

    fn expect(&mut self, symbol: &'static str) -> Result<(), ModelingError> {
        match self.next()? {
            Token::Symbol(s) if s == symbol => Ok(()),
            other => Err(ModelingError::new(format!(
                "expected `{symbol}`, found {other:?}"
            ))),
        }
    }

    fn eat(&mut self, symbol: &'static str) -> bool {
        if self.peek() == Some(&Token::Symbol(symbol)) {
            self.pos += 1;
            return true;
        }
        false
    }

    fn width(&self) -> usize {
        self.dims.len() + self.params.len() + 1
    }

    fn position_of(&self, name: &str) -> Result<usize, ModelingError> {
        if let Some(pos) = self.dims.iter().position(|d| d == name) {
            return Ok(pos);
        }
        if let Some(pos) = self.params.iter().position(|p| p == name) {
            return Ok(self.dims.len() + pos);
        }
        Err(ModelingError::new(format!("unknown variable `{name}`")))
    }

    /// Parses `[a, b, c]` and returns the names; the tuple name, if any, was
    /// consumed by the caller.
    fn name_list(&mut self) -> Result<Vec<String>, ModelingError> {
        self.expect("[")?;
        let mut names = Vec::new();
        if self.eat("]") {
            return Ok(names);
        }
        loop {
            match self.next()? {
                Token::Ident(name) => names.push(name),
                other => {
                    return Err(ModelingError::new(format!(
                        "expected a name, found {other:?}"
                    )));
                }
            }
            if self.eat("]") {
                return Ok(names);
            }
            self.expect(",")?;
        }
    }

    /// Parses a linear expression into coefficients over the current space.
    fn linear(&mut self) -> Result<Linear, ModelingError> {
        let mut coeffs = vec![0i64; self.width()];
        self.linear_into(&mut coeffs, 1)?;
        Ok(Linear { coeffs })
    }

    fn linear_into(&mut self, coeffs: &mut [i64], sign: i64) -> Result<(), ModelingError> {
        let mut sign = sign;
        loop {
            self.term_into(coeffs, sign)?;
            if self.eat("+") {
                sign = 1;
            } else if self.eat("-") {
                sign = -1;
            } else {
                return Ok(());
            }
        }
    }

    fn term_into(&mut self, coeffs: &mut [i64], sign: i64) -> Result<(), ModelingError> {
        if self.eat("(") {
            self.linear_into(coeffs, sign)?;
            self.expect(")")?;
            return Ok(());
        }
        if self.eat("-") {
            return self.term_into(coeffs, -sign);
        }
        match self.next()? {
            Token::Int(value) => {
                if self.eat("*") {
                    match self.next()? {
                        Token::Ident(name) => {
                            coeffs[self.position_of(&name)?] += sign * value;
                        }
                        other => {
                            return Err(ModelingError::new(format!(
                                "expected a variable after `*`, found {other:?}"
                            )));
                        }
                    }
                } else if let Some(Token::Ident(name)) = self.peek().cloned() {
                    self.pos += 1;
                    coeffs[self.position_of(&name)?] += sign * value;
                } else {
                    let last = coeffs.len() - 1;
                    coeffs[last] += sign * value;
                }
            }
            Token::Ident(name) => {
                coeffs[self.position_of(&name)?] += sign;
            }
            other => {
                return Err(ModelingError::new(format!(
                    "expected a term, found {other:?}"
                )));
            }
        }
        Ok(())
    }

    /// Parses a conjunction of constraints up to `}`, `or` or end.
    fn conjunct(&mut self) -> Result<Conjunct, ModelingError> {
        let mut constraints = Vec::new();
        loop {
            constraints.extend(self.constraint()?);
            if self.peek() == Some(&Token::Ident("and".into())) {
                self.pos += 1;
                continue;
            }
            return Ok(Conjunct { constraints });
        }
    }

    /// Parses one relation `lhs R rhs` (or a stride `lhs mod m = 0`).
    fn constraint(&mut self) -> Result<Vec<EngineConstraint>, ModelingError> {
        let lhs = self.linear()?;
        if self.peek() == Some(&Token::Ident("mod".into())) {
            self.pos += 1;
            let modulus = match self.next()? {
                Token::Int(m) if m > 0 => m,
                other => {
                    return Err(ModelingError::new(format!(
                        "expected a positive modulus, found {other:?}"
                    )));
                }
            };
            self.expect("=")?;
            match self.next()? {
                Token::Int(0) => {}
                other => {
                    return Err(ModelingError::new(format!(
                        "stride constraints compare against 0, found {other:?}"
                    )));
                }
            }
            return Ok(vec![EngineConstraint {
                linear: lhs,
                kind: Kind::Stride(modulus),
            }]);
        }
        let relation = match self.next()? {
            Token::Symbol(s @ ("<=" | ">=" | "<" | ">" | "=")) => s,
            other => {
                return Err(ModelingError::new(format!(
                    "expected a relation, found {other:?}"
                )));
            }
        };
        let rhs = self.linear()?;
        // move everything to one side: lhs − rhs R 0
        let diff: Vec<i64> = lhs
            .coeffs
            .iter()
            .zip(&rhs.coeffs)
            .map(|(&l, &r)| l - r)
            .collect();
        let negated: Vec<i64> = diff.iter().map(|&c| -c).collect();
        let constraint = match relation {
            // lhs ≤ rhs  ⇔  rhs − lhs ≥ 0
            "<=" => EngineConstraint {
                linear: Linear { coeffs: negated },
                kind: Kind::Ge,
            },
            ">=" => EngineConstraint {
                linear: Linear { coeffs: diff },
                kind: Kind::Ge,
            },
            "<" => {
                let mut coeffs = negated;
                let last = coeffs.len() - 1;
                coeffs[last] -= 1;
                EngineConstraint {
                    linear: Linear { coeffs },
                    kind: Kind::Ge,
                }
            }
            ">" => {
                let mut coeffs = diff;
                let last = coeffs.len() - 1;
                coeffs[last] -= 1;
                EngineConstraint {
                    linear: Linear { coeffs },
                    kind: Kind::Ge,
                }
            }
            _ => EngineConstraint {
                linear: Linear { coeffs: diff },
                kind: Kind::Eq,
            },
        };
        Ok(vec![constraint])
    }

    fn formula(&mut self) -> Result<Vec<Conjunct>, ModelingError> {
        let mut conjuncts = vec![self.conjunct()?];
        while self.peek() == Some(&Token::Ident("or".into())) {
            self.pos += 1;
            conjuncts.push(self.conjunct()?);
        }
        Ok(conjuncts)
    }
}

/// Parses a set such as `{ [i] : 10 <= i and i <= 99 }` or
/// `[n] -> { S[i, j] : 0 <= i and i < n }`.
pub(crate) fn parse_set(ctx: &Context, text: &str) -> Result<Set, ModelingError> {
    let mut parser = Parser {
        tokens: tokenize(text)?,
        pos: 0,
        dims: Vec::new(),
        params: Vec::new(),
    };

    // optional parameter prefix `[n] ->`
    if parser.peek() == Some(&Token::Symbol("[")) {
        parser.params = parser.name_list()?;
        parser.expect("->")?;
    }
    parser.expect("{")?;
    let tuple = match parser.peek().cloned() {
        Some(Token::Ident(name)) => {
            parser.pos += 1;
            Some(name)
        }
        _ => None,
    };
    parser.dims = parser.name_list()?;

    let conjuncts = if parser.eat(":") {
        parser.formula()?
    } else {
        vec![Conjunct::default()]
    };
    parser.expect("}")?;

    let mut space = Space::new(parser.dims.clone(), parser.params.clone());
    space.tuple = tuple;
    Ok(Set {
        ctx: ctx.clone(),
        parts: vec![SetPart { space, conjuncts }],
    })
}

/// Parses a map such as `{ S[i] -> [i, i + 1] : 0 <= i and i <= 9 }`.
pub(crate) fn parse_map(ctx: &Context, text: &str) -> Result<Map, ModelingError> {
    let mut parser = Parser {
        tokens: tokenize(text)?,
        pos: 0,
        dims: Vec::new(),
        params: Vec::new(),
    };

    if parser.peek() == Some(&Token::Symbol("[")) {
        parser.params = parser.name_list()?;
        parser.expect("->")?;
    }
    parser.expect("{")?;
    let in_tuple = match parser.peek().cloned() {
        Some(Token::Ident(name)) => {
            parser.pos += 1;
            Some(name)
        }
        _ => None,
    };
    parser.dims = parser.name_list()?;
    parser.expect("->")?;
    let out_tuple = match parser.peek().cloned() {
        Some(Token::Ident(name)) => {
            parser.pos += 1;
            Some(name)
        }
        _ => None,
    };

    // output expressions are linear in the input dimensions
    parser.expect("[")?;
    let mut outputs = Vec::new();
    if !parser.eat("]") {
        loop {
            let linear = parser.linear()?;
            outputs.push(OutputExpr { linear });
            if parser.eat("]") {
                break;
            }
            parser.expect(",")?;
        }
    }

    let conjuncts = if parser.eat(":") {
        parser.formula()?
    } else {
        vec![Conjunct::default()]
    };
    parser.expect("}")?;

    let mut in_space = Space::new(parser.dims.clone(), parser.params.clone());
    in_space.tuple = in_tuple;
    let clauses = conjuncts
        .into_iter()
        .map(|domain| AffineClause {
            in_space: in_space.clone(),
            out_tuple: out_tuple.clone(),
            outputs: outputs.clone(),
            domain,
        })
        .collect();
    Ok(Map {
        ctx: ctx.clone(),
        data: MapData::Affine(clauses),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pres::Pwqp;

    #[test]
    fn parses_ranges() {
        let ctx = Context::new();
        let set = parse_set(&ctx, "{ [i] : 10 <= i and i <= 99 }").expect("parse");
        assert_eq!(set.card(), Pwqp::Constant(90));
    }

    #[test]
    fn parses_strict_relations_and_products() {
        let ctx = Context::new();
        let set = parse_set(&ctx, "{ [i] : 0 < 2 * i and 2i < 10 }").expect("parse");
        let points: Vec<i64> = set
            .points()
            .expect("points")
            .into_iter()
            .map(|p| p.coords[0])
            .collect();
        assert_eq!(points, vec![1, 2, 3, 4]);
    }

    #[test]
    fn parses_tuple_names() {
        let ctx = Context::new();
        let set = parse_set(&ctx, "{ S0[i] : 0 <= i and i <= 3 }").expect("parse");
        assert_eq!(set.space().tuple.as_deref(), Some("S0"));
    }

    #[test]
    fn rejects_garbage() {
        let ctx = Context::new();
        assert!(parse_set(&ctx, "{ [i] : i ** 2 }").is_err());
        assert!(parse_set(&ctx, "[i] : 0 <= i").is_err());
    }
}
