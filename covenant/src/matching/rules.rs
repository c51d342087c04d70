//! Evaluation of single matching rules against actual values.

use crate::{
    content_type::ContentType,
    matching::{datetime, Mismatch, MismatchKind},
    model::{MatchingRule, RuleList, RuleLogic},
};
use regex::Regex;
use serde_json::Value;

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn same_type(expected: &Value, actual: &Value) -> bool {
    std::mem::discriminant(expected) == std::mem::discriminant(actual)
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

/// Full-string regex match.
pub fn regex_matches(pattern: &str, actual: &str) -> Result<bool, String> {
    Regex::new(&format!("^(?:{})$", pattern))
        .map(|regex| regex.is_match(actual))
        .map_err(|e| format!("invalid regex '{}': {}", pattern, e))
}

fn failure(path: &str, rule: &MatchingRule, expected: &Value, actual: &Value, description: String) -> Mismatch {
    Mismatch::new(
        path,
        MismatchKind::Rule(rule.name().to_string()),
        expected.clone(),
        actual.clone(),
        description,
    )
}

fn check_length(rule: &MatchingRule, actual: &Value) -> Result<(), String> {
    let (min, max) = match rule.length_bounds() {
        Some(bounds) => bounds,
        None => return Ok(()),
    };
    let length = match actual {
        Value::Array(items) => items.len(),
        _ => return Ok(()),
    };
    if let Some(min) = min {
        if length < min {
            return Err(format!(
                "Expected an array with at least {} item(s), but got {}",
                min, length
            ));
        }
    }
    if let Some(max) = max {
        if length > max {
            return Err(format!(
                "Expected an array with at most {} item(s), but got {}",
                max, length
            ));
        }
    }
    Ok(())
}

/// Apply one rule to an actual JSON value.
pub fn match_rule(path: &str, rule: &MatchingRule, expected: &Value, actual: &Value) -> Option<Mismatch> {
    let outcome: Result<(), String> = match rule {
        MatchingRule::Equality => {
            if expected == actual {
                Ok(())
            } else {
                Err(format!(
                    "Expected '{}' to be equal to '{}'",
                    render(actual),
                    render(expected)
                ))
            }
        }
        MatchingRule::Regex(pattern) => match actual {
            Value::Array(_) | Value::Object(_) | Value::Null => Err(format!(
                "Expected a {} to match '{}', but regex applies to strings",
                type_name(actual),
                pattern
            )),
            other => match regex_matches(pattern, &render(other)) {
                Ok(true) => Ok(()),
                Ok(false) => Err(format!(
                    "Expected '{}' to match '{}'",
                    render(other),
                    pattern
                )),
                Err(message) => Err(message),
            },
        },
        MatchingRule::Type
        | MatchingRule::MinType(_)
        | MatchingRule::MaxType(_)
        | MatchingRule::MinMaxType(_, _) => {
            if same_type(expected, actual) {
                check_length(rule, actual)
            } else {
                Err(format!(
                    "Expected '{}' ({}) to be the same type as '{}' ({})",
                    render(actual),
                    type_name(actual),
                    render(expected),
                    type_name(expected)
                ))
            }
        }
        MatchingRule::Number => match actual {
            Value::Number(_) => Ok(()),
            other => Err(format!("Expected '{}' to be a number", render(other))),
        },
        MatchingRule::Integer => match actual {
            Value::Number(n) if n.is_i64() || n.is_u64() => Ok(()),
            other => Err(format!("Expected '{}' to be an integer", render(other))),
        },
        MatchingRule::Decimal => match actual {
            Value::Number(n) if n.is_f64() => Ok(()),
            other => Err(format!("Expected '{}' to be a decimal number", render(other))),
        },
        MatchingRule::Boolean => match actual {
            Value::Bool(_) => Ok(()),
            other => Err(format!("Expected '{}' to be a boolean", render(other))),
        },
        MatchingRule::Null => match actual {
            Value::Null => Ok(()),
            other => Err(format!("Expected '{}' to be null", render(other))),
        },
        MatchingRule::Timestamp(format) | MatchingRule::Date(format) | MatchingRule::Time(format) => {
            match actual {
                Value::String(value) => datetime::validate(value, format),
                other => Err(format!(
                    "Expected '{}' to be a {} string with format '{}'",
                    render(other),
                    rule.name(),
                    format
                )),
            }
        }
        MatchingRule::Include(fragment) => {
            if render(actual).contains(fragment.as_str()) {
                Ok(())
            } else {
                Err(format!("Expected '{}' to include '{}'", render(actual), fragment))
            }
        }
        MatchingRule::Semver => match actual {
            Value::String(value) => semver::Version::parse(value)
                .map(|_| ())
                .map_err(|e| format!("'{}' is not a valid semantic version: {}", value, e)),
            other => Err(format!("Expected '{}' to be a semantic version", render(other))),
        },
        MatchingRule::ContentType(content_type) => {
            let detected = ContentType::detect(render(actual).as_bytes());
            match ContentType::parse(content_type) {
                Ok(expected_type) if expected_type.is_equivalent_to(&detected) => Ok(()),
                Ok(_) => Err(format!(
                    "Expected content of type '{}', but detected '{}'",
                    content_type, detected
                )),
                Err(e) => Err(e.to_string()),
            }
        }
        MatchingRule::NotEmpty => {
            if is_empty(actual) {
                Err(format!("Expected '{}' to not be empty", render(actual)))
            } else {
                Ok(())
            }
        }
        MatchingRule::Values => match actual {
            Value::Object(_) | Value::Array(_) => Ok(()),
            other => Err(format!("Expected '{}' to be an object", render(other))),
        },
        MatchingRule::EachKey(list) => match actual {
            Value::Object(map) => {
                let mismatches: Vec<Mismatch> = map
                    .keys()
                    .flat_map(|key| {
                        let key = Value::String(key.clone());
                        match_rules(path, list, &key, &key)
                    })
                    .collect();
                join_descriptions(mismatches)
            }
            other => Err(format!("Expected '{}' to be an object", render(other))),
        },
        MatchingRule::EachValue(list) => {
            let template = match expected {
                Value::Object(map) => map.values().next().cloned(),
                Value::Array(items) => items.first().cloned(),
                _ => None,
            };
            let values: Vec<&Value> = match actual {
                Value::Object(map) => map.values().collect(),
                Value::Array(items) => items.iter().collect(),
                other => return Some(failure(
                    path,
                    rule,
                    expected,
                    actual,
                    format!("Expected '{}' to be an object or array", render(other)),
                )),
            };
            let mismatches: Vec<Mismatch> = values
                .into_iter()
                .flat_map(|value| {
                    let expected = template.as_ref().unwrap_or(value);
                    match_rules(path, list, expected, value)
                })
                .collect();
            join_descriptions(mismatches)
        }
        MatchingRule::StatusCode(status) => match actual.as_u64() {
            Some(code) if u16::try_from(code).map(|c| status.matches(c)).unwrap_or(false) => Ok(()),
            _ => Err(format!(
                "Expected status {} to be in the {:?} family",
                render(actual),
                status
            )),
        },
    };

    outcome
        .err()
        .map(|description| failure(path, rule, expected, actual, description))
}

fn join_descriptions(mismatches: Vec<Mismatch>) -> Result<(), String> {
    if mismatches.is_empty() {
        Ok(())
    } else {
        Err(mismatches
            .iter()
            .map(|m| m.description.clone())
            .collect::<Vec<_>>()
            .join("; "))
    }
}

/// Apply a rule list: every rule for AND, any rule for OR.
pub fn match_rules(path: &str, list: &RuleList, expected: &Value, actual: &Value) -> Vec<Mismatch> {
    combine(list, |rule| match_rule(path, rule, expected, actual))
}

fn combine<F: Fn(&MatchingRule) -> Option<Mismatch>>(list: &RuleList, apply: F) -> Vec<Mismatch> {
    let mismatches: Vec<Mismatch> = list.rules.iter().filter_map(apply).collect();
    match list.logic {
        RuleLogic::And => mismatches,
        RuleLogic::Or if mismatches.len() < list.rules.len() => vec![],
        RuleLogic::Or => mismatches,
    }
}

/// Apply a rule to text from a header, query parameter, path or CSV cell,
/// where numbers and booleans arrive as strings.
pub fn match_str(path: &str, rule: &MatchingRule, expected: &str, actual: &str) -> Option<Mismatch> {
    let expected_value = Value::String(expected.to_string());
    let actual_value = Value::String(actual.to_string());
    let text_failure = |description: String| Some(failure(path, rule, &expected_value, &actual_value, description));

    match rule {
        MatchingRule::Type
        | MatchingRule::MinType(_)
        | MatchingRule::MaxType(_)
        | MatchingRule::MinMaxType(_, _)
        | MatchingRule::Values => None,
        MatchingRule::Number => match actual.trim().parse::<f64>() {
            Ok(_) => None,
            Err(_) => text_failure(format!("Expected '{}' to be a number", actual)),
        },
        MatchingRule::Integer => match actual.trim().parse::<i64>() {
            Ok(_) => None,
            Err(_) => text_failure(format!("Expected '{}' to be an integer", actual)),
        },
        MatchingRule::Decimal => {
            let trimmed = actual.trim();
            if trimmed.contains('.') && trimmed.parse::<f64>().is_ok() {
                None
            } else {
                text_failure(format!("Expected '{}' to be a decimal number", actual))
            }
        }
        MatchingRule::Boolean => match actual.trim() {
            "true" | "false" => None,
            _ => text_failure(format!("Expected '{}' to be a boolean", actual)),
        },
        MatchingRule::Null => {
            if actual.is_empty() {
                None
            } else {
                text_failure(format!("Expected '{}' to be empty", actual))
            }
        }
        other => match_rule(path, other, &expected_value, &actual_value),
    }
}

pub fn match_str_rules(path: &str, list: &RuleList, expected: &str, actual: &str) -> Vec<Mismatch> {
    combine(list, |rule| match_str(path, rule, expected, actual))
}
