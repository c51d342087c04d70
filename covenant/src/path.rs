//! Path expressions locating values inside a structured body.
//!
//! `$` is the root, `.name` or `['name']` a field, `[3]` an index, and `*` /
//! `[*]` wildcards. Expressions without a leading `$` (header names, CSV
//! `column:2` locators) are a single field below the root.

use crate::error::{Error, Result};
use std::{
    cmp::Ordering,
    fmt::{self, Display},
    hash::{Hash, Hasher},
    str::FromStr,
};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathToken {
    Root,
    Field(String),
    Index(usize),
    Star,
    StarIndex,
}

#[derive(Debug, Clone)]
pub struct DocPath {
    expression: String,
    tokens: Vec<PathToken>,
}

impl DocPath {
    pub fn root() -> Self {
        Self {
            expression: "$".into(),
            tokens: vec![PathToken::Root],
        }
    }

    pub fn parse(expression: &str) -> Result<Self> {
        let expression = expression.trim();
        if expression.is_empty() || expression == "$" {
            return Ok(Self::root());
        }

        if !expression.starts_with('$') {
            return Ok(Self {
                expression: expression.to_string(),
                tokens: vec![PathToken::Root, PathToken::Field(expression.to_string())],
            });
        }

        let invalid = |message: &str| Error::InvalidPath {
            expression: expression.to_string(),
            message: message.to_string(),
        };

        let chars: Vec<char> = expression.chars().collect();
        let mut tokens = vec![PathToken::Root];
        let mut position = 1;

        while position < chars.len() {
            match chars[position] {
                '.' => {
                    let start = position + 1;
                    let mut end = start;
                    while end < chars.len() && chars[end] != '.' && chars[end] != '[' {
                        end += 1;
                    }
                    let name: String = chars[start..end].iter().collect();
                    if name.is_empty() {
                        return Err(invalid("expected a field name after '.'"));
                    }
                    tokens.push(if name == "*" {
                        PathToken::Star
                    } else {
                        PathToken::Field(name)
                    });
                    position = end;
                }
                '[' => {
                    let close = chars[position..]
                        .iter()
                        .position(|c| *c == ']')
                        .map(|offset| position + offset)
                        .ok_or_else(|| invalid("unterminated '['"))?;
                    let inner: String = chars[position + 1..close].iter().collect();
                    let inner = inner.trim();
                    if inner == "*" {
                        tokens.push(PathToken::StarIndex);
                    } else if inner.starts_with('\'') && inner.ends_with('\'') && inner.len() >= 2 {
                        tokens.push(PathToken::Field(inner[1..inner.len() - 1].to_string()));
                    } else {
                        let index = inner
                            .parse::<usize>()
                            .map_err(|_| invalid("expected an index, '*' or a quoted field"))?;
                        tokens.push(PathToken::Index(index));
                    }
                    position = close + 1;
                }
                other => {
                    return Err(invalid(&format!("unexpected character '{}'", other)));
                }
            }
        }

        Ok(Self {
            expression: expression.to_string(),
            tokens,
        })
    }

    pub fn from_tokens(tokens: Vec<PathToken>) -> Self {
        let mut expression = String::new();
        for token in &tokens {
            match token {
                PathToken::Root => expression.push('$'),
                PathToken::Field(name) if is_identifier(name) => {
                    expression.push('.');
                    expression.push_str(name);
                }
                PathToken::Field(name) => {
                    expression.push_str("['");
                    expression.push_str(name);
                    expression.push_str("']");
                }
                PathToken::Index(index) => expression.push_str(&format!("[{}]", index)),
                PathToken::Star => expression.push_str(".*"),
                PathToken::StarIndex => expression.push_str("[*]"),
            }
        }
        Self { expression, tokens }
    }

    pub fn tokens(&self) -> &[PathToken] {
        &self.tokens
    }

    pub fn as_str(&self) -> &str {
        &self.expression
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_root(&self) -> bool {
        self.tokens.len() == 1
    }

    pub fn join<S: Into<String>>(&self, field: S) -> Self {
        let mut tokens = self.tokens.clone();
        tokens.push(PathToken::Field(field.into()));
        Self::from_tokens(tokens)
    }

    pub fn join_index(&self, index: usize) -> Self {
        let mut tokens = self.tokens.clone();
        tokens.push(PathToken::Index(index));
        Self::from_tokens(tokens)
    }

    pub fn join_token(&self, token: PathToken) -> Self {
        let mut tokens = self.tokens.clone();
        tokens.push(token);
        Self::from_tokens(tokens)
    }

    pub fn has_wildcards(&self) -> bool {
        self.tokens
            .iter()
            .any(|t| matches!(t, PathToken::Star | PathToken::StarIndex))
    }

    /// Weight of this (rule) path against a concrete path of equal length,
    /// zero when it does not apply. Exact tokens weigh 2, wildcards 1.
    pub fn weight_exact(&self, concrete: &[PathToken]) -> usize {
        if self.tokens.len() != concrete.len() {
            return 0;
        }
        self.weight_prefix(concrete)
    }

    /// Weight of this path as a prefix of a (possibly longer) concrete path.
    pub fn weight_prefix(&self, concrete: &[PathToken]) -> usize {
        if self.tokens.len() > concrete.len() {
            return 0;
        }

        self.tokens
            .iter()
            .zip(concrete.iter())
            .fold(1, |weight, (rule, actual)| weight * token_weight(rule, actual))
    }
}

fn token_weight(rule: &PathToken, actual: &PathToken) -> usize {
    match (rule, actual) {
        (PathToken::Root, PathToken::Root) => 2,
        (PathToken::Field(a), PathToken::Field(b)) if a == b => 2,
        (PathToken::Index(a), PathToken::Index(b)) if a == b => 2,
        (PathToken::Star, PathToken::Field(_)) | (PathToken::Star, PathToken::Index(_)) => 1,
        (PathToken::StarIndex, PathToken::Index(_)) => 1,
        (PathToken::Star, PathToken::Star) | (PathToken::StarIndex, PathToken::StarIndex) => 2,
        (PathToken::StarIndex, PathToken::Star) => 1,
        _ => 0,
    }
}

fn is_identifier(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '-' || c == ':' || c == '@')
}

impl PartialEq for DocPath {
    fn eq(&self, other: &Self) -> bool {
        self.expression == other.expression
    }
}

impl Eq for DocPath {}

impl Hash for DocPath {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.expression.hash(state)
    }
}

impl PartialOrd for DocPath {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DocPath {
    fn cmp(&self, other: &Self) -> Ordering {
        self.expression.cmp(&other.expression)
    }
}

impl Display for DocPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expression)
    }
}

impl FromStr for DocPath {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
