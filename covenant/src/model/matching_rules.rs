//! Matching rules attached to paths of an interaction.

use crate::{
    error::{Error, Result},
    path::{DocPath, PathToken},
};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

pub const CATEGORY_PATH: &str = "path";
pub const CATEGORY_QUERY: &str = "query";
pub const CATEGORY_HEADER: &str = "header";
pub const CATEGORY_BODY: &str = "body";
pub const CATEGORY_STATUS: &str = "status";
pub const CATEGORY_METADATA: &str = "metadata";

/// Families of HTTP status accepted by the `statusCode` rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HttpStatus {
    Information,
    Success,
    Redirect,
    ClientError,
    ServerError,
    NonError,
    Error,
    StatusCodes(Vec<u16>),
}

impl HttpStatus {
    pub fn matches(&self, status: u16) -> bool {
        match self {
            HttpStatus::Information => (100..200).contains(&status),
            HttpStatus::Success => (200..300).contains(&status),
            HttpStatus::Redirect => (300..400).contains(&status),
            HttpStatus::ClientError => (400..500).contains(&status),
            HttpStatus::ServerError => (500..600).contains(&status),
            HttpStatus::NonError => status < 400,
            HttpStatus::Error => status >= 400,
            HttpStatus::StatusCodes(codes) => codes.contains(&status),
        }
    }

    fn to_json(&self) -> Value {
        match self {
            HttpStatus::Information => json!("info"),
            HttpStatus::Success => json!("success"),
            HttpStatus::Redirect => json!("redirect"),
            HttpStatus::ClientError => json!("clientError"),
            HttpStatus::ServerError => json!("serverError"),
            HttpStatus::NonError => json!("nonError"),
            HttpStatus::Error => json!("error"),
            HttpStatus::StatusCodes(codes) => json!(codes),
        }
    }

    fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::String(name) => match name.as_str() {
                "info" => Some(HttpStatus::Information),
                "success" => Some(HttpStatus::Success),
                "redirect" => Some(HttpStatus::Redirect),
                "clientError" => Some(HttpStatus::ClientError),
                "serverError" => Some(HttpStatus::ServerError),
                "nonError" => Some(HttpStatus::NonError),
                "error" => Some(HttpStatus::Error),
                _ => None,
            },
            Value::Array(codes) => codes
                .iter()
                .map(|c| c.as_u64().and_then(|c| u16::try_from(c).ok()))
                .collect::<Option<Vec<_>>>()
                .map(HttpStatus::StatusCodes),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MatchingRule {
    Equality,
    Regex(String),
    Type,
    MinType(usize),
    MaxType(usize),
    MinMaxType(usize, usize),
    Number,
    Integer,
    Decimal,
    Boolean,
    Null,
    Timestamp(String),
    Date(String),
    Time(String),
    Include(String),
    Semver,
    ContentType(String),
    NotEmpty,
    Values,
    EachKey(RuleList),
    EachValue(RuleList),
    StatusCode(HttpStatus),
}

impl MatchingRule {
    pub fn name(&self) -> &'static str {
        match self {
            MatchingRule::Equality => "equality",
            MatchingRule::Regex(_) => "regex",
            MatchingRule::Type => "type",
            MatchingRule::MinType(_) => "min",
            MatchingRule::MaxType(_) => "max",
            MatchingRule::MinMaxType(_, _) => "minmax",
            MatchingRule::Number => "number",
            MatchingRule::Integer => "integer",
            MatchingRule::Decimal => "decimal",
            MatchingRule::Boolean => "boolean",
            MatchingRule::Null => "null",
            MatchingRule::Timestamp(_) => "datetime",
            MatchingRule::Date(_) => "date",
            MatchingRule::Time(_) => "time",
            MatchingRule::Include(_) => "include",
            MatchingRule::Semver => "semver",
            MatchingRule::ContentType(_) => "contentType",
            MatchingRule::NotEmpty => "notEmpty",
            MatchingRule::Values => "values",
            MatchingRule::EachKey(_) => "eachKey",
            MatchingRule::EachValue(_) => "eachValue",
            MatchingRule::StatusCode(_) => "statusCode",
        }
    }

    /// Rules that compare by type, and so cascade to the children of the
    /// value they are attached to.
    pub fn is_type_family(&self) -> bool {
        matches!(
            self,
            MatchingRule::Type
                | MatchingRule::MinType(_)
                | MatchingRule::MaxType(_)
                | MatchingRule::MinMaxType(_, _)
        )
    }

    /// Rules that check a collection length.
    pub fn length_bounds(&self) -> Option<(Option<usize>, Option<usize>)> {
        match self {
            MatchingRule::MinType(min) => Some((Some(*min), None)),
            MatchingRule::MaxType(max) => Some((None, Some(*max))),
            MatchingRule::MinMaxType(min, max) => Some((Some(*min), Some(*max))),
            _ => None,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            MatchingRule::Regex(regex) => json!({"match": "regex", "regex": regex}),
            MatchingRule::MinType(min) => json!({"match": "type", "min": min}),
            MatchingRule::MaxType(max) => json!({"match": "type", "max": max}),
            MatchingRule::MinMaxType(min, max) => json!({"match": "type", "min": min, "max": max}),
            MatchingRule::Timestamp(format) => json!({"match": "datetime", "format": format}),
            MatchingRule::Date(format) => json!({"match": "date", "format": format}),
            MatchingRule::Time(format) => json!({"match": "time", "format": format}),
            MatchingRule::Include(value) => json!({"match": "include", "value": value}),
            MatchingRule::ContentType(value) => json!({"match": "contentType", "value": value}),
            MatchingRule::EachKey(rules) => json!({"match": "eachKey", "rules": rules.rules_json()}),
            MatchingRule::EachValue(rules) => {
                json!({"match": "eachValue", "rules": rules.rules_json()})
            }
            MatchingRule::StatusCode(status) => {
                json!({"match": "statusCode", "status": status.to_json()})
            }
            other => json!({ "match": other.name() }),
        }
    }

    /// Read a rule from any pact specification version.
    pub fn from_json(value: &Value) -> Result<Self> {
        let map = value.as_object().ok_or_else(|| Error::InvalidRule {
            path: String::new(),
            message: format!("expected a rule object, got {}", value),
        })?;
        let invalid = |message: String| Error::InvalidRule {
            path: String::new(),
            message,
        };
        let string = |key: &str| map.get(key).and_then(Value::as_str).map(str::to_string);
        let size = |key: &str| map.get(key).and_then(Value::as_u64).map(|v| v as usize);

        let kind = match map.get("match").and_then(Value::as_str) {
            Some(kind) => kind.to_string(),
            None if map.contains_key("regex") => "regex".to_string(),
            None if map.contains_key("min") || map.contains_key("max") => "type".to_string(),
            None if map.contains_key("timestamp") => "datetime".to_string(),
            None if map.contains_key("date") => "date".to_string(),
            None if map.contains_key("time") => "time".to_string(),
            None => return Err(invalid(format!("rule has no 'match' attribute: {}", value))),
        };

        let rule = match kind.as_str() {
            "equality" => MatchingRule::Equality,
            "regex" => MatchingRule::Regex(
                string("regex").ok_or_else(|| invalid("regex rule without 'regex'".into()))?,
            ),
            "type" | "min" | "max" | "minmax" => match (size("min"), size("max")) {
                (Some(min), Some(max)) => MatchingRule::MinMaxType(min, max),
                (Some(min), None) => MatchingRule::MinType(min),
                (None, Some(max)) => MatchingRule::MaxType(max),
                (None, None) => MatchingRule::Type,
            },
            "number" => MatchingRule::Number,
            "integer" => MatchingRule::Integer,
            "decimal" => MatchingRule::Decimal,
            "boolean" => MatchingRule::Boolean,
            "null" => MatchingRule::Null,
            "datetime" | "timestamp" => MatchingRule::Timestamp(
                string("format")
                    .or_else(|| string("timestamp"))
                    .or_else(|| string("datetime"))
                    .unwrap_or_else(|| "yyyy-MM-dd'T'HH:mm:ss".into()),
            ),
            "date" => MatchingRule::Date(
                string("format")
                    .or_else(|| string("date"))
                    .unwrap_or_else(|| "yyyy-MM-dd".into()),
            ),
            "time" => MatchingRule::Time(
                string("format")
                    .or_else(|| string("time"))
                    .unwrap_or_else(|| "HH:mm:ss".into()),
            ),
            "include" => MatchingRule::Include(
                string("value").ok_or_else(|| invalid("include rule without 'value'".into()))?,
            ),
            "semver" => MatchingRule::Semver,
            "contentType" | "content-type" => MatchingRule::ContentType(
                string("value")
                    .ok_or_else(|| invalid("contentType rule without 'value'".into()))?,
            ),
            "notEmpty" => MatchingRule::NotEmpty,
            "values" => MatchingRule::Values,
            "eachKey" => MatchingRule::EachKey(RuleList::from_rules_json(map.get("rules"))?),
            "eachValue" => MatchingRule::EachValue(RuleList::from_rules_json(map.get("rules"))?),
            "statusCode" => MatchingRule::StatusCode(
                map.get("status")
                    .and_then(HttpStatus::from_json)
                    .ok_or_else(|| invalid("statusCode rule with an invalid 'status'".into()))?,
            ),
            other => return Err(invalid(format!("unknown matching rule '{}'", other))),
        };

        Ok(rule)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RuleLogic {
    #[default]
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct RuleList {
    pub rules: Vec<MatchingRule>,
    pub logic: RuleLogic,
}

impl RuleList {
    pub fn new(rule: MatchingRule) -> Self {
        Self {
            rules: vec![rule],
            logic: RuleLogic::And,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn add(&mut self, rule: MatchingRule) {
        if !self.rules.contains(&rule) {
            self.rules.push(rule);
        }
    }

    pub fn type_family(&self) -> bool {
        self.rules.iter().any(MatchingRule::is_type_family)
    }

    pub fn to_json(&self) -> Value {
        json!({
            "combine": match self.logic {
                RuleLogic::And => "AND",
                RuleLogic::Or => "OR",
            },
            "matchers": self.rules_json(),
        })
    }

    fn rules_json(&self) -> Vec<Value> {
        self.rules.iter().map(MatchingRule::to_json).collect()
    }

    fn from_rules_json(value: Option<&Value>) -> Result<Self> {
        let rules = match value {
            Some(Value::Array(rules)) => rules
                .iter()
                .map(MatchingRule::from_json)
                .collect::<Result<Vec<_>>>()?,
            Some(object @ Value::Object(_)) => return Self::from_json(object),
            _ => vec![],
        };
        Ok(Self {
            rules,
            logic: RuleLogic::And,
        })
    }

    /// Read `{"combine": "AND", "matchers": [...]}`, or a bare V2 rule object.
    pub fn from_json(value: &Value) -> Result<Self> {
        match value.get("matchers") {
            Some(Value::Array(matchers)) => {
                let logic = match value.get("combine").and_then(Value::as_str) {
                    Some(combine) if combine.eq_ignore_ascii_case("or") => RuleLogic::Or,
                    _ => RuleLogic::And,
                };
                let rules = matchers
                    .iter()
                    .map(MatchingRule::from_json)
                    .collect::<Result<Vec<_>>>()?;
                Ok(Self { rules, logic })
            }
            _ => Ok(Self::new(MatchingRule::from_json(value)?)),
        }
    }
}

/// Rules of one category keyed by path.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RuleCategory {
    pub rules: BTreeMap<DocPath, RuleList>,
}

impl RuleCategory {
    pub fn is_empty(&self) -> bool {
        self.rules.values().all(RuleList::is_empty)
    }

    pub fn add_rule(&mut self, path: DocPath, rule: MatchingRule) {
        self.rules.entry(path).or_default().add(rule);
    }

    pub fn add_rules(&mut self, path: DocPath, list: RuleList) {
        let entry = self.rules.entry(path).or_default();
        entry.logic = list.logic;
        for rule in list.rules {
            entry.add(rule);
        }
    }

    pub fn get(&self, path: &str) -> Option<&RuleList> {
        DocPath::parse(path)
            .ok()
            .and_then(|path| self.rules.get(&path))
    }

    /// The most specific rule list declared for exactly this path:
    /// highest weight, then the longest expression.
    pub fn select_exact(&self, concrete: &[PathToken]) -> Option<&RuleList> {
        self.rules
            .iter()
            .map(|(path, list)| (path.weight_exact(concrete), path, list))
            .filter(|(weight, _, list)| *weight > 0 && !list.is_empty())
            .max_by(|(w1, p1, _), (w2, p2, _)| {
                w1.cmp(w2)
                    .then_with(|| p1.as_str().len().cmp(&p2.as_str().len()))
            })
            .map(|(_, _, list)| list)
    }

    /// The rule list in force at a path: an exact declaration, or a
    /// type-family rule cascading from an ancestor.
    pub fn select_best(&self, concrete: &[PathToken]) -> Option<RuleList> {
        if let Some(list) = self.select_exact(concrete) {
            return Some(list.clone());
        }

        self.rules
            .iter()
            .filter(|(path, list)| path.len() < concrete.len() && list.type_family())
            .map(|(path, list)| (path.weight_prefix(concrete), path, list))
            .filter(|(weight, _, _)| *weight > 0)
            .max_by(|(w1, p1, _), (w2, p2, _)| {
                p1.len().cmp(&p2.len()).then_with(|| w1.cmp(w2))
            })
            .map(|_| RuleList::new(MatchingRule::Type))
    }

    pub fn is_defined(&self, concrete: &[PathToken]) -> bool {
        self.select_best(concrete).is_some()
    }

    /// Any rule is declared below this path.
    pub fn has_descendants(&self, concrete: &[PathToken]) -> bool {
        self.rules
            .keys()
            .any(|path| path.len() > concrete.len() && {
                let prefix = DocPath::from_tokens(path.tokens()[..concrete.len()].to_vec());
                prefix.weight_exact(concrete) > 0
            })
    }

    pub fn to_json(&self) -> Value {
        Value::Object(
            self.rules
                .iter()
                .filter(|(_, list)| !list.is_empty())
                .map(|(path, list)| (path.to_string(), list.to_json()))
                .collect(),
        )
    }

    pub fn from_json(value: &Value) -> Result<Self> {
        let mut category = RuleCategory::default();
        if let Value::Object(map) = value {
            for (key, rules) in map {
                let list = RuleList::from_json(rules).map_err(|e| with_path(e, key))?;
                category.add_rules(DocPath::parse(key)?, list);
            }
        }
        Ok(category)
    }
}

fn with_path(error: Error, path: &str) -> Error {
    match error {
        Error::InvalidRule { message, .. } => Error::InvalidRule {
            path: path.to_string(),
            message,
        },
        other => other,
    }
}

/// All rule categories of a request, response or message.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MatchingRules {
    pub categories: BTreeMap<String, RuleCategory>,
}

impl MatchingRules {
    pub fn is_empty(&self) -> bool {
        self.categories.values().all(RuleCategory::is_empty)
    }

    pub fn category(&self, name: &str) -> Option<&RuleCategory> {
        self.categories.get(name).filter(|c| !c.is_empty())
    }

    pub fn add_category(&mut self, name: &str) -> &mut RuleCategory {
        self.categories.entry(name.to_string()).or_default()
    }

    pub fn add_rule(&mut self, category: &str, path: DocPath, rule: MatchingRule) {
        self.add_category(category).add_rule(path, rule);
    }

    /// Merge another set of rules into this one.
    pub fn extend(&mut self, other: MatchingRules) {
        for (name, category) in other.categories {
            let target = self.add_category(&name);
            for (path, list) in category.rules {
                target.add_rules(path, list);
            }
        }
    }

    pub fn to_v4_json(&self) -> Value {
        let mut map = Map::new();
        for (name, category) in &self.categories {
            if category.is_empty() {
                continue;
            }
            let value = if name == CATEGORY_PATH || name == CATEGORY_STATUS {
                category
                    .rules
                    .get(&DocPath::root())
                    .map(RuleList::to_json)
                    .unwrap_or_else(|| category.to_json())
            } else {
                category.to_json()
            };
            map.insert(name.clone(), value);
        }
        Value::Object(map)
    }

    /// Read V3/V4 categorised rules.
    pub fn from_v4_json(value: &Value) -> Result<Self> {
        let mut rules = MatchingRules::default();
        if let Value::Object(map) = value {
            for (name, value) in map {
                let category = if (name == CATEGORY_PATH || name == CATEGORY_STATUS)
                    && value.get("matchers").is_some()
                {
                    let mut category = RuleCategory::default();
                    category.add_rules(DocPath::root(), RuleList::from_json(value)?);
                    category
                } else if name == CATEGORY_PATH && value.get("match").is_some() {
                    let mut category = RuleCategory::default();
                    category.add_rules(DocPath::root(), RuleList::from_json(value)?);
                    category
                } else {
                    RuleCategory::from_json(value)?
                };
                rules.categories.insert(name.clone(), category);
            }
        }
        Ok(rules)
    }

    /// Read V2 flat rules keyed like `$.body.items[*].id` or `$.headers.Accept`.
    pub fn from_v2_json(value: &Value) -> Result<Self> {
        let mut rules = MatchingRules::default();
        if let Value::Object(map) = value {
            for (key, rule) in map {
                let list = RuleList::from_json(rule).map_err(|e| with_path(e, key))?;
                let (category, path) = split_v2_key(key)?;
                rules.add_category(category).add_rules(path, list);
            }
        }
        Ok(rules)
    }

    /// Read V3/V4 rules, falling back to V2 flat keys.
    pub fn from_json(value: &Value) -> Result<Self> {
        let is_flat = value
            .as_object()
            .map(|map| map.keys().any(|key| key.starts_with("$.")))
            .unwrap_or(false);
        if is_flat {
            Self::from_v2_json(value)
        } else {
            Self::from_v4_json(value)
        }
    }
}

fn split_v2_key(key: &str) -> Result<(&'static str, DocPath)> {
    let rest = key.strip_prefix("$.").unwrap_or(key);
    let (head, tail) = match rest.find(|c| c == '.' || c == '[') {
        Some(position) => (&rest[..position], &rest[position..]),
        None => (rest, ""),
    };

    let category = match head {
        "body" => CATEGORY_BODY,
        "headers" | "header" => CATEGORY_HEADER,
        "query" => CATEGORY_QUERY,
        "path" => CATEGORY_PATH,
        "status" => CATEGORY_STATUS,
        "metadata" | "metaData" => CATEGORY_METADATA,
        _ => {
            return Err(Error::InvalidRule {
                path: key.to_string(),
                message: "unknown rule category".into(),
            })
        }
    };

    let path = if category == CATEGORY_BODY {
        DocPath::parse(&format!("${}", tail))?
    } else {
        let name = tail.trim_start_matches('.');
        let name = name.trim_start_matches("['").trim_end_matches("']");
        if name.is_empty() {
            DocPath::root()
        } else {
            DocPath::parse(name)?
        }
    };

    Ok((category, path))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(expression: &str) -> DocPath {
        DocPath::parse(expression).unwrap()
    }

    #[test]
    fn reads_rules_of_every_version() {
        assert_eq!(
            MatchingRule::from_json(&json!({"match": "regex", "regex": "\\d+"})).unwrap(),
            MatchingRule::Regex("\\d+".into())
        );
        assert_eq!(
            MatchingRule::from_json(&json!({"min": 1})).unwrap(),
            MatchingRule::MinType(1)
        );
        assert_eq!(
            MatchingRule::from_json(&json!({"match": "timestamp", "timestamp": "yyyy"})).unwrap(),
            MatchingRule::Timestamp("yyyy".into())
        );
        assert!(MatchingRule::from_json(&json!({"match": "bogus"})).is_err());
    }

    #[test]
    fn nested_rule_lists_survive_serialisation() {
        let rule = MatchingRule::EachValue(RuleList::new(MatchingRule::Regex("[a-z]+".into())));
        assert_eq!(MatchingRule::from_json(&rule.to_json()).unwrap(), rule);
    }

    #[test]
    fn exact_rules_beat_wildcards() {
        let mut category = RuleCategory::default();
        category.add_rule(path("$.items[*].id"), MatchingRule::Integer);
        category.add_rule(path("$.items[0].id"), MatchingRule::Equality);

        let concrete = path("$.items[0].id");
        let selected = category.select_best(concrete.tokens()).unwrap();
        assert_eq!(selected.rules, vec![MatchingRule::Equality]);

        let concrete = path("$.items[1].id");
        let selected = category.select_best(concrete.tokens()).unwrap();
        assert_eq!(selected.rules, vec![MatchingRule::Integer]);
    }

    #[test]
    fn type_rules_cascade_to_children() {
        let mut category = RuleCategory::default();
        category.add_rule(path("$.shape"), MatchingRule::Type);
        category.add_rule(path("$.name"), MatchingRule::Regex("x".into()));

        let child = path("$.shape.length");
        assert_eq!(
            category.select_best(child.tokens()).unwrap().rules,
            vec![MatchingRule::Type]
        );
        assert!(category.select_best(path("$.name.first").tokens()).is_none());
    }

    #[test]
    fn v4_categories_round_trip() {
        let mut rules = MatchingRules::default();
        rules.add_rule(CATEGORY_BODY, path("$.length"), MatchingRule::Number);
        rules.add_rule(CATEGORY_HEADER, path("Content-Type"), MatchingRule::Regex("json".into()));
        rules.add_rule(CATEGORY_PATH, DocPath::root(), MatchingRule::Regex("/reports/.*".into()));

        let json = rules.to_v4_json();
        assert_eq!(json["path"]["matchers"][0]["regex"], json!("/reports/.*"));
        assert_eq!(json["header"]["Content-Type"]["combine"], json!("AND"));
        assert_eq!(MatchingRules::from_json(&json).unwrap(), rules);
    }

    #[test]
    fn v2_flat_keys_are_categorised() {
        let rules = MatchingRules::from_json(&json!({
            "$.body.items[*].id": {"match": "type"},
            "$.headers.Accept": {"regex": "json"},
            "$.path": {"regex": "/items/\\d+"}
        }))
        .unwrap();

        assert!(rules.category(CATEGORY_BODY).unwrap().get("$.items[*].id").is_some());
        assert!(rules.category(CATEGORY_HEADER).unwrap().get("Accept").is_some());
        assert!(rules.category(CATEGORY_PATH).unwrap().rules.contains_key(&DocPath::root()));
    }

    #[test]
    fn status_families() {
        assert!(HttpStatus::Success.matches(204));
        assert!(!HttpStatus::Success.matches(404));
        assert!(HttpStatus::StatusCodes(vec![200, 201]).matches(201));
        assert!(HttpStatus::Error.matches(503));
    }
}
