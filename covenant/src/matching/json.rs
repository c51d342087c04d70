//! Recursive comparison of JSON documents.

use crate::{
    matching::{rules, MatchingConfig, Mismatch, MismatchKind},
    model::{MatchingRule, RuleCategory, RuleList},
    path::DocPath,
};
use serde_json::{Map, Value};

pub fn compare(
    expected: &Value,
    actual: &Value,
    rules: &RuleCategory,
    config: MatchingConfig,
) -> Vec<Mismatch> {
    let mut mismatches = vec![];
    Walker {
        rules,
        config,
        mismatches: &mut mismatches,
    }
    .walk(&DocPath::root(), expected, actual, None);
    mismatches
}

struct Walker<'a> {
    rules: &'a RuleCategory,
    config: MatchingConfig,
    mismatches: &'a mut Vec<Mismatch>,
}

impl<'a> Walker<'a> {
    /// `inherited` is the rule list cascading from an enclosing `values` or
    /// `eachValue` rule; an explicit rule at the path takes precedence.
    fn walk(&mut self, path: &DocPath, expected: &Value, actual: &Value, inherited: Option<&RuleList>) {
        match self.rules.select_best(path.tokens()) {
            Some(list) => self.walk_with_rules(path, &list, expected, actual, inherited),
            None => match inherited {
                Some(list) => self.walk_with_rules(path, list, expected, actual, inherited),
                None => self.walk_structural(path, expected, actual),
            },
        }
    }

    fn walk_with_rules(
        &mut self,
        path: &DocPath,
        list: &RuleList,
        expected: &Value,
        actual: &Value,
        inherited: Option<&RuleList>,
    ) {
        let found = rules::match_rules(path.as_str(), list, expected, actual);
        let failed = !found.is_empty();
        self.mismatches.extend(found);

        let has = |predicate: fn(&MatchingRule) -> bool| list.rules.iter().any(predicate);
        if failed || has(|r| matches!(r, MatchingRule::Equality)) {
            return;
        }

        let each_value = list.rules.iter().find_map(|rule| match rule {
            MatchingRule::EachValue(sub_rules) => Some(sub_rules),
            _ => None,
        });
        if each_value.is_some() || has(|r| matches!(r, MatchingRule::Values)) {
            let cascade = match each_value {
                Some(sub_rules) if !sub_rules.type_family() => None,
                _ => Some(RuleList::new(MatchingRule::Type)),
            };
            self.walk_values(path, expected, actual, cascade.as_ref());
            return;
        }

        match (expected, actual) {
            (Value::Array(expected_items), Value::Array(actual_items)) => {
                if expected_items.is_empty() {
                    return;
                }
                for (index, item) in actual_items.iter().enumerate() {
                    let template = expected_items.get(index).unwrap_or(&expected_items[0]);
                    self.walk(&path.join_index(index), template, item, inherited);
                }
            }
            (Value::Object(expected_map), Value::Object(actual_map)) => {
                if has(|r| matches!(r, MatchingRule::EachKey(_))) {
                    for (key, value) in actual_map {
                        if let Some(expected_value) = expected_map.get(key) {
                            self.walk(&path.join(key.clone()), expected_value, value, inherited);
                        }
                    }
                } else {
                    self.walk_object(path, expected_map, actual_map, inherited);
                }
            }
            _ => {}
        }
    }

    /// Every actual value is walked against the first expected value,
    /// ignoring keys and positions.
    fn walk_values(&mut self, path: &DocPath, expected: &Value, actual: &Value, cascade: Option<&RuleList>) {
        match (expected, actual) {
            (Value::Array(expected_items), Value::Array(actual_items)) => {
                if let Some(template) = expected_items.first() {
                    for (index, item) in actual_items.iter().enumerate() {
                        self.walk(&path.join_index(index), template, item, cascade);
                    }
                }
            }
            (Value::Object(expected_map), Value::Object(actual_map)) => {
                if let Some(template) = expected_map.values().next() {
                    for (key, value) in actual_map {
                        self.walk(&path.join(key.clone()), template, value, cascade);
                    }
                }
            }
            _ => {}
        }
    }

    fn walk_structural(&mut self, path: &DocPath, expected: &Value, actual: &Value) {
        match (expected, actual) {
            (Value::Object(expected_map), Value::Object(actual_map)) => {
                self.walk_object(path, expected_map, actual_map, None)
            }
            (Value::Array(expected_items), Value::Array(actual_items)) => {
                if expected_items.len() != actual_items.len() {
                    self.mismatches.push(Mismatch::new(
                        path.as_str(),
                        MismatchKind::Length,
                        expected.clone(),
                        actual.clone(),
                        format!(
                            "Expected an array of length {}, but got {}",
                            expected_items.len(),
                            actual_items.len()
                        ),
                    ));
                }
                for (index, (expected_item, actual_item)) in
                    expected_items.iter().zip(actual_items.iter()).enumerate()
                {
                    self.walk(&path.join_index(index), expected_item, actual_item, None);
                }
            }
            _ => {
                if expected != actual {
                    self.mismatches.push(Mismatch::new(
                        path.as_str(),
                        MismatchKind::Value,
                        expected.clone(),
                        actual.clone(),
                        format!("Expected {} but received {}", expected, actual),
                    ));
                }
            }
        }
    }

    fn walk_object(
        &mut self,
        path: &DocPath,
        expected: &Map<String, Value>,
        actual: &Map<String, Value>,
        inherited: Option<&RuleList>,
    ) {
        for (key, expected_value) in expected {
            let child = path.join(key.clone());
            match actual.get(key) {
                Some(actual_value) => self.walk(&child, expected_value, actual_value, inherited),
                None => self.mismatches.push(Mismatch::new(
                    child.as_str(),
                    MismatchKind::Missing,
                    expected_value.clone(),
                    Value::Null,
                    format!("Expected key '{}' but it was missing", key),
                )),
            }
        }

        if !self.config.allow_unexpected_keys {
            for (key, actual_value) in actual {
                if !expected.contains_key(key) {
                    self.mismatches.push(Mismatch::new(
                        path.join(key.clone()).as_str(),
                        MismatchKind::Unexpected,
                        Value::Null,
                        actual_value.clone(),
                        format!("Did not expect key '{}'", key),
                    ));
                }
            }
        }
    }
}
