//! The matcher engine: compares actual values against expected examples and
//! the rules recorded with them.

pub mod datetime;
pub mod http;
pub mod json;
pub mod rules;

use crate::model::RuleCategory;
use serde::Serialize;
use serde_json::Value;
use std::fmt::{self, Display};

pub use http::{match_body, match_message, match_request, match_response, RequestMatch};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "kind", content = "rule")]
pub enum MismatchKind {
    /// A matching rule rejected the actual value.
    Rule(String),
    /// No rule applied and the values were not equal.
    Value,
    Missing,
    Unexpected,
    Length,
    Unparseable,
    Method,
    Path,
    Query,
    Header,
    Status,
    ContentType,
    Body,
    Metadata,
}

impl MismatchKind {
    pub fn rule_name(&self) -> Option<&str> {
        match self {
            MismatchKind::Rule(name) => Some(name),
            _ => None,
        }
    }
}

impl Display for MismatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MismatchKind::Rule(name) => write!(f, "rule '{}'", name),
            MismatchKind::Value => write!(f, "value"),
            MismatchKind::Missing => write!(f, "missing"),
            MismatchKind::Unexpected => write!(f, "unexpected"),
            MismatchKind::Length => write!(f, "length"),
            MismatchKind::Unparseable => write!(f, "unparseable"),
            MismatchKind::Method => write!(f, "method"),
            MismatchKind::Path => write!(f, "path"),
            MismatchKind::Query => write!(f, "query"),
            MismatchKind::Header => write!(f, "header"),
            MismatchKind::Status => write!(f, "status"),
            MismatchKind::ContentType => write!(f, "content type"),
            MismatchKind::Body => write!(f, "body"),
            MismatchKind::Metadata => write!(f, "metadata"),
        }
    }
}

/// One discrepancy between an expected and an actual value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Mismatch {
    pub path: String,
    #[serde(flatten)]
    pub kind: MismatchKind,
    pub expected: Value,
    pub actual: Value,
    pub description: String,
}

impl Mismatch {
    pub fn new<P: Into<String>, D: Into<String>>(
        path: P,
        kind: MismatchKind,
        expected: Value,
        actual: Value,
        description: D,
    ) -> Self {
        Self {
            path: path.into(),
            kind,
            expected,
            actual,
            description: description.into(),
        }
    }

    /// The path without the leading `$.` of body paths.
    pub fn short_path(&self) -> &str {
        self.path
            .strip_prefix("$.")
            .unwrap_or(self.path.as_str())
    }
}

impl Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]: {}", self.path, self.kind, self.description)
    }
}

/// Outcome of a comparison: success, or every mismatch found in order.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchResult {
    Matched,
    Mismatched(Vec<Mismatch>),
}

impl MatchResult {
    pub fn from_mismatches(mismatches: Vec<Mismatch>) -> Self {
        if mismatches.is_empty() {
            MatchResult::Matched
        } else {
            MatchResult::Mismatched(mismatches)
        }
    }

    pub fn is_match(&self) -> bool {
        matches!(self, MatchResult::Matched)
    }

    pub fn mismatches(&self) -> &[Mismatch] {
        match self {
            MatchResult::Matched => &[],
            MatchResult::Mismatched(mismatches) => mismatches,
        }
    }

    pub fn into_mismatches(self) -> Vec<Mismatch> {
        match self {
            MatchResult::Matched => vec![],
            MatchResult::Mismatched(mismatches) => mismatches,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchingConfig {
    /// Keys present in the actual value but not the expected one are
    /// accepted.
    pub allow_unexpected_keys: bool,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            allow_unexpected_keys: true,
        }
    }
}

impl MatchingConfig {
    pub fn strict() -> Self {
        Self {
            allow_unexpected_keys: false,
        }
    }
}

/// Compare an actual structured value to an expected one under a set of
/// body rules.
pub fn matches(expected: &Value, actual: &Value, rules: &RuleCategory) -> MatchResult {
    matches_with(expected, actual, rules, MatchingConfig::default())
}

pub fn matches_with(
    expected: &Value,
    actual: &Value,
    rules: &RuleCategory,
    config: MatchingConfig,
) -> MatchResult {
    MatchResult::from_mismatches(json::compare(expected, actual, rules, config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{model::MatchingRule, path::DocPath};
    use serde_json::json;

    #[test]
    fn reflexive_without_rules() {
        let value = json!({"a": [1, {"b": null}], "c": "text"});
        assert!(matches(&value, &value, &RuleCategory::default()).is_match());
    }

    #[test]
    fn number_rule_failure_names_path_and_rule() {
        let mut rules = RuleCategory::default();
        rules.add_rule(DocPath::parse("$.length").unwrap(), MatchingRule::Number);
        rules.add_rule(DocPath::parse("$.width").unwrap(), MatchingRule::Number);

        let expected = json!({"length": 3, "width": 4});
        assert!(matches(&expected, &json!({"length": 30, "width": 4.5}), &rules).is_match());

        let result = matches(&expected, &json!({"length": "x", "width": 4}), &rules);
        let mismatches = result.mismatches();
        assert_eq!(mismatches.len(), 1);
        assert_eq!(mismatches[0].short_path(), "length");
        assert_eq!(mismatches[0].kind.rule_name(), Some("number"));
    }

    #[test]
    fn mismatches_serialise_with_kind() {
        let mismatch = Mismatch::new(
            "$.a",
            MismatchKind::Rule("regex".into()),
            json!("x"),
            json!("y"),
            "no match",
        );
        let value = serde_json::to_value(&mismatch).unwrap();
        assert_eq!(value["kind"], json!("rule"));
        assert_eq!(value["rule"], json!("regex"));
        assert_eq!(value["path"], json!("$.a"));
    }
}
