//! Matching of whole HTTP requests, responses and messages.

use crate::{
    content::HandlerRegistry,
    content_type::ContentType,
    error::Result,
    matching::{json, rules, MatchResult, MatchingConfig, Mismatch, MismatchKind},
    model::{
        interaction::find_header,
        matching_rules::{
            CATEGORY_BODY, CATEGORY_HEADER, CATEGORY_METADATA, CATEGORY_PATH, CATEGORY_QUERY,
            CATEGORY_STATUS,
        },
        Body, HttpRequest, HttpResponse, Message, MultiValueMap, RuleCategory, RuleList,
    },
    path::DocPath,
};
use serde_json::{json, Value};
use tracing::trace;

/// Result of comparing a request to one expected request.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestMatch {
    /// Method and path agree, so the request was aimed at this interaction.
    pub discriminated: bool,
    pub mismatches: Vec<Mismatch>,
}

impl RequestMatch {
    pub fn is_match(&self) -> bool {
        self.discriminated && self.mismatches.is_empty()
    }

    pub fn into_result(self) -> MatchResult {
        MatchResult::from_mismatches(self.mismatches)
    }
}

fn root_rules<'a>(category: Option<&'a RuleCategory>) -> Option<&'a RuleList> {
    category
        .and_then(|c| c.rules.get(&DocPath::root()))
        .filter(|list| !list.is_empty())
}

/// Rules declared for a named field, ignoring case for header names.
fn named_rules<'a>(category: Option<&'a RuleCategory>, name: &str, ignore_case: bool) -> Option<&'a RuleList> {
    category?
        .rules
        .iter()
        .find(|(path, _)| {
            let key = path.as_str();
            let key = key.strip_prefix("$.").unwrap_or(key);
            if ignore_case {
                key.eq_ignore_ascii_case(name)
            } else {
                key == name
            }
        })
        .map(|(_, list)| list)
        .filter(|list| !list.is_empty())
}

fn match_method(expected: &str, actual: &str) -> Option<Mismatch> {
    if expected.eq_ignore_ascii_case(actual) {
        None
    } else {
        Some(Mismatch::new(
            "method",
            MismatchKind::Method,
            json!(expected.to_uppercase()),
            json!(actual.to_uppercase()),
            format!("Expected method {}, but got {}", expected.to_uppercase(), actual.to_uppercase()),
        ))
    }
}

fn match_path(expected: &HttpRequest, actual: &str) -> Vec<Mismatch> {
    match root_rules(expected.matching_rules.category(CATEGORY_PATH)) {
        Some(list) => rules::match_str_rules("path", list, &expected.path, actual),
        None if expected.path == actual => vec![],
        None => vec![Mismatch::new(
            "path",
            MismatchKind::Path,
            json!(expected.path),
            json!(actual),
            format!("Expected path '{}', but got '{}'", expected.path, actual),
        )],
    }
}

fn match_query(expected: &HttpRequest, actual: &MultiValueMap) -> Vec<Mismatch> {
    let category = expected.matching_rules.category(CATEGORY_QUERY);
    let mut mismatches = vec![];

    for (name, expected_values) in &expected.query {
        let path = format!("query.{}", name);
        let actual_values = match actual.get(name) {
            Some(values) => values,
            None => {
                mismatches.push(Mismatch::new(
                    path,
                    MismatchKind::Query,
                    json!(expected_values),
                    Value::Null,
                    format!("Expected query parameter '{}', but it was missing", name),
                ));
                continue;
            }
        };

        match named_rules(category, name, false) {
            Some(list) => {
                if let Some(mismatch) = length_mismatch(&path, list, expected_values, actual_values) {
                    mismatches.push(mismatch);
                }
                for (index, value) in actual_values.iter().enumerate() {
                    let template = expected_values
                        .get(index)
                        .or_else(|| expected_values.first())
                        .map(String::as_str)
                        .unwrap_or_default();
                    mismatches.extend(rules::match_str_rules(&path, list, template, value));
                }
            }
            None if expected_values != actual_values => mismatches.push(Mismatch::new(
                path,
                MismatchKind::Query,
                json!(expected_values),
                json!(actual_values),
                format!(
                    "Expected query parameter '{}' to be {:?}, but got {:?}",
                    name, expected_values, actual_values
                ),
            )),
            None => {}
        }
    }

    for (name, values) in actual {
        if !expected.query.contains_key(name) {
            mismatches.push(Mismatch::new(
                format!("query.{}", name),
                MismatchKind::Query,
                Value::Null,
                json!(values),
                format!("Unexpected query parameter '{}'", name),
            ));
        }
    }
    mismatches
}

/// Type-family rules on repeated values also bound how many there are.
fn length_mismatch(path: &str, list: &RuleList, expected: &[String], actual: &[String]) -> Option<Mismatch> {
    list.rules.iter().find_map(|rule| {
        let (min, max) = rule.length_bounds()?;
        let too_short = min.map(|min| actual.len() < min).unwrap_or(false);
        let too_long = max.map(|max| actual.len() > max).unwrap_or(false);
        if too_short || too_long {
            Some(Mismatch::new(
                path,
                MismatchKind::Rule(rule.name().to_string()),
                json!(expected),
                json!(actual),
                format!("Expected between {:?} and {:?} values, but got {}", min, max, actual.len()),
            ))
        } else {
            None
        }
    })
}

/// Split comma separated header values so `a, b` and `[a, b]` compare equal.
fn normalise_header(values: &[String]) -> Vec<String> {
    values
        .iter()
        .flat_map(|value| value.split(','))
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .collect()
}

fn content_types_agree(expected: &str, actual: &str) -> bool {
    match (ContentType::parse(expected), ContentType::parse(actual)) {
        (Ok(expected), Ok(actual)) => {
            expected.is_equivalent_to(&actual)
                && expected.attribute("charset").map_or(true, |charset| {
                    actual
                        .attribute("charset")
                        .map_or(true, |actual| actual.eq_ignore_ascii_case(charset))
                })
        }
        _ => expected == actual,
    }
}

/// Expected headers must be present; names ignore case and extra actual
/// headers are accepted.
pub fn match_headers(
    expected: &MultiValueMap,
    actual: &MultiValueMap,
    category: Option<&RuleCategory>,
) -> Vec<Mismatch> {
    let mut mismatches = vec![];
    for (name, expected_values) in expected {
        let path = format!("header.{}", name);
        let actual_values = match find_header(actual, name) {
            Some(values) => values,
            None => {
                mismatches.push(Mismatch::new(
                    path,
                    MismatchKind::Header,
                    json!(expected_values.join(", ")),
                    Value::Null,
                    format!("Expected header '{}', but it was missing", name),
                ));
                continue;
            }
        };

        let expected_joined = expected_values.join(", ");
        let actual_joined = actual_values.join(", ");
        let found = match named_rules(category, name, true) {
            Some(list) => rules::match_str_rules(&path, list, &expected_joined, &actual_joined),
            None => {
                let agree = if name.eq_ignore_ascii_case("content-type") {
                    content_types_agree(&expected_joined, &actual_joined)
                } else {
                    normalise_header(expected_values) == normalise_header(actual_values)
                };
                if agree {
                    vec![]
                } else {
                    vec![Mismatch::new(
                        path,
                        MismatchKind::Header,
                        json!(expected_joined),
                        json!(actual_joined),
                        format!(
                            "Expected header '{}' to be '{}', but got '{}'",
                            name, expected_joined, actual_joined
                        ),
                    )]
                }
            }
        };
        mismatches.extend(found);
    }
    mismatches
}

/// Compare bodies. JSON goes through the matcher engine; anything else is
/// compared by the content handler registered for the expected type.
#[allow(clippy::too_many_arguments)]
pub fn match_body(
    expected: &Body,
    expected_type: Option<ContentType>,
    actual: &Body,
    actual_type: Option<ContentType>,
    rules: Option<&RuleCategory>,
    registry: &HandlerRegistry,
    config: MatchingConfig,
) -> Result<Vec<Mismatch>> {
    let expected_content = match expected {
        Body::Missing => return Ok(vec![]),
        Body::Empty => {
            return Ok(match actual.content() {
                Some(content) => vec![Mismatch::new(
                    "$",
                    MismatchKind::Body,
                    Value::Null,
                    json!(String::from_utf8_lossy(content)),
                    "Expected an empty body",
                )],
                None => vec![],
            })
        }
        Body::Present { content, .. } => content,
    };

    let actual_content = match actual.content() {
        Some(content) => content,
        None => {
            return Ok(vec![Mismatch::new(
                "$",
                MismatchKind::Body,
                json!(String::from_utf8_lossy(expected_content)),
                Value::Null,
                "Expected a body, but the actual body is empty",
            )])
        }
    };

    let expected_type = expected_type.unwrap_or_else(|| ContentType::detect(expected_content));
    let actual_type = actual_type.unwrap_or_else(|| ContentType::detect(actual_content));
    let same_family = expected_type.is_equivalent_to(&actual_type)
        || (expected_type.is_json() && actual_type.is_json());
    if !same_family {
        return Ok(vec![Mismatch::new(
            "$",
            MismatchKind::ContentType,
            json!(expected_type.base_type()),
            json!(actual_type.base_type()),
            format!(
                "Expected a body of type '{}', but got '{}'",
                expected_type.base_type(),
                actual_type.base_type()
            ),
        )]);
    }

    let empty = RuleCategory::default();
    let rules = rules.unwrap_or(&empty);

    if expected_type.is_json() {
        let expected_value: Value = serde_json::from_slice(expected_content)?;
        return Ok(match serde_json::from_slice::<Value>(actual_content) {
            Ok(actual_value) => json::compare(&expected_value, &actual_value, rules, config),
            Err(error) => vec![Mismatch::new(
                "$",
                MismatchKind::Unparseable,
                expected_value,
                json!(String::from_utf8_lossy(actual_content)),
                format!("Failed to parse the actual body as JSON: {}", error),
            )],
        });
    }

    let handler = registry.resolve(&expected_type)?;
    trace!(handler = handler.name(), content_type = %expected_type, "Comparing body with content handler");
    let expected_body = Body::with_content_type(expected_content.clone(), expected.content_type().cloned().unwrap_or(expected_type));
    let actual_body = Body::with_content_type(actual_content.clone(), actual_type);
    Ok(handler
        .compare_contents(&expected_body, &actual_body, rules, config)?
        .into_mismatches())
}

/// Compare a received request to an expected one. Body comparison is only
/// attempted once method and path agree.
pub fn match_request(
    expected: &HttpRequest,
    actual: &HttpRequest,
    registry: &HandlerRegistry,
    config: MatchingConfig,
) -> Result<RequestMatch> {
    let mut mismatches = vec![];
    mismatches.extend(match_method(&expected.method, &actual.method));
    mismatches.extend(match_path(expected, &actual.path));
    let discriminated = mismatches.is_empty();

    mismatches.extend(match_query(expected, &actual.query));
    mismatches.extend(match_headers(
        &expected.headers,
        &actual.headers,
        expected.matching_rules.category(CATEGORY_HEADER),
    ));
    if discriminated {
        mismatches.extend(match_body(
            &expected.body,
            expected.content_type(),
            &actual.body,
            actual.content_type(),
            expected.matching_rules.category(CATEGORY_BODY),
            registry,
            config,
        )?);
    }

    Ok(RequestMatch {
        discriminated,
        mismatches,
    })
}

fn match_status(expected: &HttpResponse, actual: u16) -> Vec<Mismatch> {
    match root_rules(expected.matching_rules.category(CATEGORY_STATUS)) {
        Some(list) => rules::match_rules("status", list, &json!(expected.status), &json!(actual)),
        None if expected.status == actual => vec![],
        None => vec![Mismatch::new(
            "status",
            MismatchKind::Status,
            json!(expected.status),
            json!(actual),
            format!("Expected status {}, but got {}", expected.status, actual),
        )],
    }
}

pub fn match_response(
    expected: &HttpResponse,
    actual: &HttpResponse,
    registry: &HandlerRegistry,
    config: MatchingConfig,
) -> Result<MatchResult> {
    let mut mismatches = match_status(expected, actual.status);
    mismatches.extend(match_headers(
        &expected.headers,
        &actual.headers,
        expected.matching_rules.category(CATEGORY_HEADER),
    ));
    mismatches.extend(match_body(
        &expected.body,
        expected.content_type(),
        &actual.body,
        actual.content_type(),
        expected.matching_rules.category(CATEGORY_BODY),
        registry,
        config,
    )?);
    Ok(MatchResult::from_mismatches(mismatches))
}

fn match_metadata(expected: &Message, actual: &Message) -> Vec<Mismatch> {
    let category = expected.matching_rules.category(CATEGORY_METADATA);
    let mut mismatches = vec![];
    for (key, expected_value) in &expected.metadata {
        let path = format!("metadata.{}", key);
        let actual_value = match actual.metadata.get(key) {
            Some(value) => value,
            None => {
                mismatches.push(Mismatch::new(
                    path,
                    MismatchKind::Metadata,
                    expected_value.clone(),
                    Value::Null,
                    format!("Expected message metadata '{}', but it was missing", key),
                ));
                continue;
            }
        };

        match named_rules(category, key, false) {
            Some(list) => mismatches.extend(rules::match_rules(&path, list, expected_value, actual_value)),
            None if key.eq_ignore_ascii_case("contentType") || key.eq_ignore_ascii_case("content-type") => {
                let agree = match (expected_value.as_str(), actual_value.as_str()) {
                    (Some(expected), Some(actual)) => content_types_agree(expected, actual),
                    _ => expected_value == actual_value,
                };
                if !agree {
                    mismatches.push(Mismatch::new(
                        path,
                        MismatchKind::Metadata,
                        expected_value.clone(),
                        actual_value.clone(),
                        format!("Expected content type {}, but got {}", expected_value, actual_value),
                    ));
                }
            }
            None if expected_value != actual_value => mismatches.push(Mismatch::new(
                path,
                MismatchKind::Metadata,
                expected_value.clone(),
                actual_value.clone(),
                format!(
                    "Expected message metadata '{}' to be {}, but got {}",
                    key, expected_value, actual_value
                ),
            )),
            None => {}
        }
    }
    mismatches
}

pub fn match_message(
    expected: &Message,
    actual: &Message,
    registry: &HandlerRegistry,
    config: MatchingConfig,
) -> Result<MatchResult> {
    let mut mismatches = match_metadata(expected, actual);
    mismatches.extend(match_body(
        &expected.contents,
        expected.content_type(),
        &actual.contents,
        actual.content_type(),
        expected.matching_rules.category(CATEGORY_BODY),
        registry,
        config,
    )?);
    Ok(MatchResult::from_mismatches(mismatches))
}
