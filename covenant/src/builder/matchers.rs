//! Template helpers for JSON bodies. Each returns a marker object that the
//! JSON content handler turns into an example value plus matching rules.
//!
//! ```
//! use covenant::builder::matchers::*;
//! use serde_json::json;
//!
//! let body = json!({
//!     "length": number(3),
//!     "name": term("[a-z]+", "square"),
//!     "tags": each_like(json!("red"), 1),
//! });
//! ```

use serde_json::{json, Map, Value};

const MATCHER: &str = "pact:matcher:type";
const GENERATOR: &str = "pact:generator:type";

fn marker(kind: &str, value: Value) -> Value {
    json!({ MATCHER: kind, "value": value })
}

fn with(mut marker: Value, key: &str, extra: Value) -> Value {
    if let Value::Object(map) = &mut marker {
        map.insert(key.to_string(), extra);
    }
    marker
}

/// Any value of the same type as the example.
pub fn like<V: Into<Value>>(example: V) -> Value {
    marker("type", example.into())
}

/// An array whose every element is like `template`, with at least `min`
/// elements. The example holds `min` copies of the template.
pub fn each_like(template: Value, min: usize) -> Value {
    let copies = vec![template; min.max(1)];
    with(marker("type", Value::Array(copies)), "min", json!(min))
}

pub fn each_like_max(template: Value, max: usize) -> Value {
    with(marker("type", json!([template])), "max", json!(max))
}

pub fn each_like_between(template: Value, min: usize, max: usize) -> Value {
    let copies = vec![template; min.max(1)];
    let marker = with(marker("type", Value::Array(copies)), "min", json!(min));
    with(marker, "max", json!(max))
}

/// A string matching `regex` in full.
pub fn term<S: Into<String>>(regex: &str, example: S) -> Value {
    with(marker("regex", json!(example.into())), "regex", json!(regex))
}

pub fn equal_to<V: Into<Value>>(example: V) -> Value {
    marker("equality", example.into())
}

pub fn integer(example: i64) -> Value {
    marker("integer", json!(example))
}

pub fn decimal(example: f64) -> Value {
    marker("decimal", json!(example))
}

pub fn number<V: Into<Value>>(example: V) -> Value {
    marker("number", example.into())
}

pub fn boolean(example: bool) -> Value {
    marker("boolean", json!(example))
}

pub fn null_value() -> Value {
    marker("null", Value::Null)
}

pub fn include(substring: &str) -> Value {
    marker("include", json!(substring))
}

pub fn semver(example: &str) -> Value {
    marker("semver", json!(example))
}

pub fn not_empty<V: Into<Value>>(example: V) -> Value {
    marker("notEmpty", example.into())
}

/// A date-time in a Java-style format such as `yyyy-MM-dd'T'HH:mm:ss`,
/// regenerated as the current time on replay.
pub fn datetime(format: &str, example: &str) -> Value {
    let marker = with(marker("datetime", json!(example)), "format", json!(format));
    with(marker, GENERATOR, json!("DateTime"))
}

pub fn date(format: &str, example: &str) -> Value {
    let marker = with(marker("date", json!(example)), "format", json!(format));
    with(marker, GENERATOR, json!("Date"))
}

pub fn time(format: &str, example: &str) -> Value {
    let marker = with(marker("time", json!(example)), "format", json!(format));
    with(marker, GENERATOR, json!("Time"))
}

/// A random UUID on replay, matched by format.
pub fn uuid(example: &str) -> Value {
    let marker = term(
        "[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}",
        example,
    );
    with(marker, GENERATOR, json!("Uuid"))
}

pub fn random_int(min: i64, max: i64) -> Value {
    json!({ MATCHER: "integer", "value": min, GENERATOR: "RandomInt", "min": min, "max": max })
}

pub fn random_string(example: &str, size: usize) -> Value {
    json!({ MATCHER: "type", "value": example, GENERATOR: "RandomString", "size": size })
}

/// A value taken from the provider state parameters on replay, e.g.
/// `from_provider_state("${id}", 42)`.
pub fn from_provider_state<V: Into<Value>>(expression: &str, example: V) -> Value {
    let marker = with(marker("type", example.into()), GENERATOR, json!("ProviderState"));
    with(marker, "expression", json!(expression))
}

/// An object whose values all match `rule`, whatever the keys.
pub fn each_value(example: Value, rule: Value) -> Value {
    with(marker("eachValue", example), "rules", json!([rule]))
}

/// An object whose keys all match `rule`.
pub fn each_key(example: Value, rule: Value) -> Value {
    with(marker("eachKey", example), "rules", json!([rule]))
}

/// A rule object for [`each_key`] and [`each_value`].
pub fn rule(kind: &str) -> Value {
    json!({ MATCHER: kind })
}

pub fn regex_rule(regex: &str) -> Value {
    json!({ MATCHER: "regex", "regex": regex })
}

/// An object matched on its values, ignoring the keys.
pub fn values(example: Map<String, Value>) -> Value {
    marker("values", Value::Object(example))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn markers_carry_their_arguments() {
        assert_eq!(
            term("\\d+", "12"),
            json!({"pact:matcher:type": "regex", "value": "12", "regex": "\\d+"})
        );
        assert_eq!(each_like(json!(1), 2)["value"], json!([1, 1]));
        assert_eq!(from_provider_state("${id}", 1)["expression"], json!("${id}"));
    }
}
