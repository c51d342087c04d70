use crate::{
    content::{content_of, expression, ConfiguredContents, ContentHandler},
    content_type::ContentType,
    error::{Error, Result},
    generators::{Generator, Generators, GENERATOR_BODY},
    matching::{rules::match_str_rules, MatchResult, MatchingConfig, Mismatch, MismatchKind},
    model::{matching_rules::CATEGORY_BODY, Body, MatchingRule, MatchingRules, RuleCategory},
    path::DocPath,
};
use bytes::Bytes;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Plain text bodies. Also stands in for any other `text/*` type that has
/// no handler of its own.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextHandler;

fn as_text(value: Value) -> String {
    match value {
        Value::String(text) => text,
        other => other.to_string(),
    }
}

impl ContentHandler for TextHandler {
    fn name(&self) -> &str {
        "text"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(1, 0, 0)
    }

    fn handles(&self, content_type: &ContentType) -> bool {
        content_type.main_type == "text" && content_type.sub_type == "plain"
    }

    fn is_fallback_for(&self, content_type: &ContentType) -> bool {
        content_type.main_type == "text"
    }

    fn parse(&self, content: &[u8], _content_type: &ContentType) -> Result<Value> {
        Ok(Value::String(String::from_utf8_lossy(content).into_owned()))
    }

    fn render(&self, value: &Value, _content_type: &ContentType) -> Result<Bytes> {
        match value {
            Value::String(text) => Ok(Bytes::from(text.clone())),
            other => Ok(Bytes::from(other.to_string())),
        }
    }

    /// Accepts an expression or literal string, or an object with a `value`
    /// and optional `regex`.
    fn configure_interaction(
        &self,
        content_type: &ContentType,
        config: &Value,
    ) -> Result<ConfiguredContents> {
        let definition = match config {
            Value::String(text) => expression::parse_value(text)?,
            Value::Object(map) => {
                let value = map
                    .get("value")
                    .and_then(Value::as_str)
                    .ok_or_else(|| Error::handler(self.name(), "expected a 'value' string"))?;
                let mut definition = expression::parse_value(value)?;
                if let Some(regex) = map.get("regex").and_then(Value::as_str) {
                    definition.rule = Some(MatchingRule::Regex(regex.to_string()));
                }
                definition
            }
            other => {
                return Err(Error::handler(
                    self.name(),
                    format!("expected a string configuration, got {}", other),
                ))
            }
        };

        let mut rules = MatchingRules::default();
        if let Some(rule) = definition.rule {
            rules.add_rule(CATEGORY_BODY, DocPath::root(), rule);
        }
        let mut generators = Generators::default();
        if let Some(generator) = definition.generator {
            generators.add(GENERATOR_BODY, DocPath::root(), generator);
        }

        Ok(ConfiguredContents {
            body: Body::with_content_type(definition.value, content_type.clone()),
            rules,
            generators,
        })
    }

    fn compare_contents(
        &self,
        expected: &Body,
        actual: &Body,
        rules: &RuleCategory,
        _config: MatchingConfig,
    ) -> Result<MatchResult> {
        let content_type = expected.content_type().cloned().unwrap_or_else(ContentType::text);
        let expected_text = as_text(self.parse(content_of(self.name(), expected)?, &content_type)?);
        let actual_text = as_text(self.parse(&actual.bytes(), &content_type)?);

        let mismatches = match rules.get("$").filter(|list| !list.is_empty()) {
            Some(list) => match_str_rules("$", list, &expected_text, &actual_text),
            None if expected_text != actual_text => vec![Mismatch::new(
                "$",
                MismatchKind::Body,
                Value::String(expected_text.clone()),
                Value::String(actual_text.clone()),
                format!("Expected body '{}', but got '{}'", expected_text, actual_text),
            )],
            None => vec![],
        };
        Ok(MatchResult::from_mismatches(mismatches))
    }

    fn generate_contents(
        &self,
        body: &Body,
        generators: &BTreeMap<DocPath, Generator>,
        context: &Map<String, Value>,
    ) -> Result<Body> {
        match generators.get(&DocPath::root()) {
            Some(generator) => {
                let content_type = body.content_type().cloned().unwrap_or_else(ContentType::text);
                let generated = Value::String(generator.generate_string(context)?);
                Ok(Body::with_content_type(self.render(&generated, &content_type)?, content_type))
            }
            None => Ok(body.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn compare(contents: &ConfiguredContents, actual: &str) -> MatchResult {
        let rules = contents
            .rules
            .category(CATEGORY_BODY)
            .cloned()
            .unwrap_or_default();
        TextHandler
            .compare_contents(
                &contents.body,
                &Body::text(actual),
                &rules,
                MatchingConfig::default(),
            )
            .unwrap()
    }

    #[test]
    fn literal_text_must_be_equal() {
        let contents = TextHandler
            .configure_interaction(&ContentType::text(), &json!("hello"))
            .unwrap();
        assert!(compare(&contents, "hello").is_match());
        assert_eq!(compare(&contents, "goodbye").mismatches()[0].kind, MismatchKind::Body);
    }

    #[test]
    fn regex_applies_to_the_whole_body() {
        let contents = TextHandler
            .configure_interaction(&ContentType::text(), &json!({"value": "ok 12", "regex": "ok \\d+"}))
            .unwrap();
        assert!(compare(&contents, "ok 345").is_match());
        assert!(!compare(&contents, "not ok 345").is_match());
    }

    #[test]
    fn rendering_parsed_text_gives_back_the_content() {
        let content = "line one\nline two";
        let value = TextHandler.parse(content.as_bytes(), &ContentType::text()).unwrap();
        assert_eq!(value, json!(content));
        assert_eq!(TextHandler.render(&value, &ContentType::text()).unwrap(), content.as_bytes());
    }

    #[test]
    fn generates_provider_state_text() {
        let contents = TextHandler
            .configure_interaction(&ContentType::text(), &json!("fromProviderState('id=${id}', 'id=1')"))
            .unwrap();
        let mut context = Map::new();
        context.insert("id".into(), json!(42));
        let generated = TextHandler
            .generate_contents(
                &contents.body,
                contents.generators.category(GENERATOR_BODY).unwrap(),
                &context,
            )
            .unwrap();
        assert_eq!(generated.as_str().unwrap(), "id=42");
    }
}
