use crate::{
    content::{content_of, expression, ConfiguredContents, ContentHandler},
    content_type::ContentType,
    error::{Error, Result},
    generators::{Generator, Generators, GENERATOR_BODY},
    matching::{json::compare, MatchResult, MatchingConfig, Mismatch, MismatchKind},
    model::{
        matching_rules::CATEGORY_BODY, Body, MatchingRule, MatchingRules, RuleCategory, RuleList,
        RuleLogic,
    },
    path::{DocPath, PathToken},
};
use bytes::Bytes;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

const MATCHER_KEY: &str = "pact:matcher:type";
const GENERATOR_KEY: &str = "pact:generator:type";

/// JSON bodies, configured with `pact:matcher:type` marker objects or
/// `matching(...)` expressions in string values.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonHandler;

fn content_type_of(body: &Body) -> ContentType {
    body.content_type().cloned().unwrap_or_else(ContentType::json)
}

impl JsonHandler {
    fn parse_body(&self, body: &Body) -> Result<Value> {
        let content = content_of(self.name(), body)?;
        self.parse(content, &content_type_of(body))
    }
}

impl ContentHandler for JsonHandler {
    fn name(&self) -> &str {
        "json"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(1, 0, 0)
    }

    fn handles(&self, content_type: &ContentType) -> bool {
        content_type.is_json()
    }

    fn parse(&self, content: &[u8], _content_type: &ContentType) -> Result<Value> {
        serde_json::from_slice(content).map_err(|e| Error::handler(self.name(), e))
    }

    fn render(&self, value: &Value, _content_type: &ContentType) -> Result<Bytes> {
        Ok(Bytes::from(serde_json::to_vec(value)?))
    }

    fn configure_interaction(
        &self,
        content_type: &ContentType,
        config: &Value,
    ) -> Result<ConfiguredContents> {
        let mut builder = TemplateBuilder::default();
        let example = builder.process(&DocPath::root(), config)?;

        let mut rules = MatchingRules::default();
        *rules.add_category(CATEGORY_BODY) = builder.rules;
        let mut generators = Generators::default();
        for (path, generator) in builder.generators {
            generators.add(GENERATOR_BODY, path, generator);
        }

        Ok(ConfiguredContents {
            body: Body::with_content_type(serde_json::to_vec(&example)?, content_type.clone()),
            rules,
            generators,
        })
    }

    fn compare_contents(
        &self,
        expected: &Body,
        actual: &Body,
        rules: &RuleCategory,
        config: MatchingConfig,
    ) -> Result<MatchResult> {
        let expected = self.parse_body(expected)?;
        let actual = match actual.content().map(|c| self.parse(c, &content_type_of(actual))) {
            Some(Ok(actual)) => actual,
            Some(Err(error)) => {
                return Ok(MatchResult::Mismatched(vec![Mismatch::new(
                    "$",
                    MismatchKind::Unparseable,
                    expected,
                    Value::String(actual.as_str().unwrap_or_default().into_owned()),
                    format!("Failed to parse the actual body as JSON: {}", error),
                )]))
            }
            None => {
                return Ok(MatchResult::Mismatched(vec![Mismatch::new(
                    "$",
                    MismatchKind::Body,
                    expected,
                    Value::Null,
                    "Expected a JSON body, but the actual body is empty",
                )]))
            }
        };

        Ok(MatchResult::from_mismatches(compare(
            &expected, &actual, rules, config,
        )))
    }

    fn generate_contents(
        &self,
        body: &Body,
        generators: &BTreeMap<DocPath, Generator>,
        context: &Map<String, Value>,
    ) -> Result<Body> {
        let mut document = self.parse_body(body)?;
        let mut all = Generators::default();
        for (path, generator) in generators {
            all.add(GENERATOR_BODY, path.clone(), generator.clone());
        }
        all.apply_json(GENERATOR_BODY, &mut document, context);

        let content_type = content_type_of(body);
        Ok(Body::with_content_type(self.render(&document, &content_type)?, content_type))
    }
}

#[derive(Default)]
struct TemplateBuilder {
    rules: RuleCategory,
    generators: BTreeMap<DocPath, Generator>,
}

impl TemplateBuilder {
    /// Strip matcher markers from a template, recording their rules and
    /// generators, and return the plain example value.
    fn process(&mut self, path: &DocPath, template: &Value) -> Result<Value> {
        match template {
            Value::Object(map) if map.contains_key(MATCHER_KEY) || map.contains_key(GENERATOR_KEY) => {
                self.process_marker(path, map)
            }
            Value::Object(map) => {
                let mut example = Map::new();
                for (key, value) in map {
                    example.insert(key.clone(), self.process(&path.join(key.clone()), value)?);
                }
                Ok(Value::Object(example))
            }
            Value::Array(items) => items
                .iter()
                .enumerate()
                .map(|(index, item)| self.process(&path.join_index(index), item))
                .collect::<Result<Vec<_>>>()
                .map(Value::Array),
            Value::String(text) if text.starts_with("matching(") || text.starts_with("fromProviderState(") => {
                let definition = expression::parse_value(text)?;
                if let Some(rule) = definition.rule {
                    self.rules.add_rule(path.clone(), rule);
                }
                if let Some(generator) = definition.generator {
                    self.generators.insert(path.clone(), generator);
                }
                Ok(typed_example(&definition.value))
            }
            other => Ok(other.clone()),
        }
    }

    fn process_marker(&mut self, path: &DocPath, map: &Map<String, Value>) -> Result<Value> {
        let value = map.get("value").cloned().unwrap_or(Value::Null);
        let mut rule = None;

        if let Some(kind) = map.get(MATCHER_KEY) {
            let kinds: Vec<&str> = match kind {
                Value::String(kind) => vec![kind.as_str()],
                Value::Array(kinds) => kinds.iter().filter_map(Value::as_str).collect(),
                other => {
                    return Err(Error::InvalidRule {
                        path: path.to_string(),
                        message: format!("invalid matcher type {}", other),
                    })
                }
            };

            let mut list = RuleList {
                rules: vec![],
                logic: match map.get("combine").and_then(Value::as_str) {
                    Some(combine) if combine.eq_ignore_ascii_case("or") => RuleLogic::Or,
                    _ => RuleLogic::And,
                },
            };
            for kind in kinds {
                list.add(self.marker_rule(path, kind, map)?);
            }
            rule = list.rules.first().cloned();
            self.rules.add_rules(path.clone(), list);
        }

        if let Some(kind) = map.get(GENERATOR_KEY).and_then(Value::as_str) {
            let mut definition = map.clone();
            definition.insert("type".into(), Value::String(kind.to_string()));
            self.generators
                .insert(path.clone(), Generator::from_json(&Value::Object(definition))?);
        }

        // array templates with a type rule describe every element
        match (&value, rule) {
            (Value::Array(items), Some(rule)) if rule.is_type_family() => items
                .iter()
                .map(|item| self.process(&path.join_token(PathToken::StarIndex), item))
                .collect::<Result<Vec<_>>>()
                .map(Value::Array),
            (Value::Object(_), Some(MatchingRule::Values)) | (Value::Object(_), Some(MatchingRule::EachValue(_))) => {
                self.process_wildcard_object(path, &value)
            }
            _ => self.process(path, &value),
        }
    }

    fn process_wildcard_object(&mut self, path: &DocPath, value: &Value) -> Result<Value> {
        let mut example = Map::new();
        if let Value::Object(map) = value {
            for (key, item) in map {
                example.insert(key.clone(), self.process(&path.join_token(PathToken::Star), item)?);
            }
        }
        Ok(Value::Object(example))
    }

    fn marker_rule(&self, path: &DocPath, kind: &str, map: &Map<String, Value>) -> Result<MatchingRule> {
        let kind = match kind {
            "each-key" => "eachKey",
            "each-value" => "eachValue",
            "equalTo" => "equality",
            "content-type" => "contentType",
            other => other,
        };

        let mut definition = Map::new();
        definition.insert("match".into(), Value::String(kind.to_string()));
        for (key, value) in map {
            if key == "rules" {
                let rules = value
                    .as_array()
                    .map(|rules| rules.iter().map(marker_to_rule_json).collect::<Vec<_>>())
                    .unwrap_or_default();
                definition.insert("rules".into(), Value::Array(rules));
            } else if key != MATCHER_KEY && key != GENERATOR_KEY && key != "value" {
                definition.insert(key.clone(), value.clone());
            }
        }

        MatchingRule::from_json(&Value::Object(definition)).map_err(|e| match e {
            Error::InvalidRule { message, .. } => Error::InvalidRule {
                path: path.to_string(),
                message,
            },
            other => other,
        })
    }
}

fn marker_to_rule_json(rule: &Value) -> Value {
    match rule {
        Value::Object(map) => {
            let mut map = map.clone();
            if let Some(kind) = map.remove(MATCHER_KEY) {
                map.insert("match".into(), kind);
            }
            Value::Object(map)
        }
        other => other.clone(),
    }
}

/// Expression examples are text; keep numbers and booleans typed in JSON.
fn typed_example(value: &str) -> Value {
    serde_json::from_str::<Value>(value)
        .ok()
        .filter(|v| v.is_number() || v.is_boolean())
        .unwrap_or_else(|| Value::String(value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn configure(config: Value) -> ConfiguredContents {
        JsonHandler
            .configure_interaction(&ContentType::json(), &config)
            .unwrap()
    }

    fn body_rules(contents: &ConfiguredContents) -> &RuleCategory {
        contents.rules.category(CATEGORY_BODY).unwrap()
    }

    #[test]
    fn markers_become_rules_and_examples() {
        let contents = configure(json!({
            "length": {"pact:matcher:type": "number", "value": 3},
            "name": "matching(regex, '[a-z]+', 'square')",
            "id": {"pact:matcher:type": "type", "value": "x", "pact:generator:type": "Uuid"}
        }));

        assert_eq!(
            contents.body.as_json().unwrap().unwrap(),
            json!({"length": 3, "name": "square", "id": "x"})
        );
        let rules = body_rules(&contents);
        assert_eq!(rules.get("$.length").unwrap().rules, vec![MatchingRule::Number]);
        assert_eq!(
            rules.get("$.name").unwrap().rules,
            vec![MatchingRule::Regex("[a-z]+".into())]
        );
        assert_eq!(
            contents.generators.category(GENERATOR_BODY).unwrap().get(&DocPath::parse("$.id").unwrap()),
            Some(&Generator::Uuid)
        );
    }

    #[test]
    fn array_templates_use_wildcards() {
        let contents = configure(json!({
            "items": {
                "pact:matcher:type": "type",
                "min": 1,
                "value": [{"id": {"pact:matcher:type": "integer", "value": 1}}]
            }
        }));
        let rules = body_rules(&contents);
        assert_eq!(rules.get("$.items").unwrap().rules, vec![MatchingRule::MinType(1)]);
        assert_eq!(rules.get("$.items[*].id").unwrap().rules, vec![MatchingRule::Integer]);
    }

    #[test]
    fn compare_reports_unparseable_actual() {
        let expected = Body::json(&json!({"a": 1}));
        let actual = Body::with_content_type("{not json", ContentType::json());
        let result = JsonHandler
            .compare_contents(&expected, &actual, &RuleCategory::default(), MatchingConfig::default())
            .unwrap();
        assert_eq!(result.mismatches()[0].kind, MismatchKind::Unparseable);
    }

    #[test]
    fn rendering_a_parsed_document_gives_back_the_content() {
        let content = br#"{"length":3,"shapes":[{"name":"square","side":1.5}],"tags":null}"#;
        let document = JsonHandler.parse(content, &ContentType::json()).unwrap();
        assert_eq!(document["shapes"][0]["side"], json!(1.5));
        assert_eq!(JsonHandler.render(&document, &ContentType::json()).unwrap(), &content[..]);
    }

    #[test]
    fn invalid_markers_fail_the_build() {
        let error = JsonHandler
            .configure_interaction(
                &ContentType::json(),
                &json!({"a": {"pact:matcher:type": "regex", "value": "x"}}),
            )
            .unwrap_err();
        assert!(matches!(error, Error::InvalidRule { ref path, .. } if path == "$.a"));
    }
}
