//! Generators produce fresh values when an interaction is replayed. They are
//! never consulted while matching.

use crate::{
    content::{generate_body, HandlerRegistry},
    error::{Error, Result},
    matching::datetime,
    model::{HttpRequest, HttpResponse},
    path::{DocPath, PathToken},
};
use rand::{distributions::Alphanumeric, Rng};
use regex::Regex;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use tracing::warn;

lazy_static::lazy_static! {
    static ref PLACEHOLDER: Regex = Regex::new(r"\$\{([^}]+)\}").expect("valid placeholder regex");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    String,
    Integer,
    Decimal,
    Boolean,
    Raw,
}

impl DataType {
    fn name(&self) -> &'static str {
        match self {
            DataType::String => "STRING",
            DataType::Integer => "INTEGER",
            DataType::Decimal => "DECIMAL",
            DataType::Boolean => "BOOLEAN",
            DataType::Raw => "RAW",
        }
    }

    fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "STRING" => Some(DataType::String),
            "INTEGER" => Some(DataType::Integer),
            "DECIMAL" | "FLOAT" => Some(DataType::Decimal),
            "BOOLEAN" => Some(DataType::Boolean),
            "RAW" => Some(DataType::Raw),
            _ => None,
        }
    }

    fn coerce(&self, value: Value) -> Value {
        match (self, &value) {
            (DataType::String, Value::String(_)) | (DataType::Raw, _) => value,
            (DataType::String, other) => Value::String(other.to_string()),
            (DataType::Integer, Value::String(s)) => s
                .trim()
                .parse::<i64>()
                .map(Value::from)
                .unwrap_or(value),
            (DataType::Decimal, Value::String(s)) => s
                .trim()
                .parse::<f64>()
                .map(Value::from)
                .unwrap_or(value),
            (DataType::Boolean, Value::String(s)) => s
                .trim()
                .parse::<bool>()
                .map(Value::from)
                .unwrap_or(value),
            _ => value,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Generator {
    RandomInt(i64, i64),
    RandomDecimal(usize),
    RandomHexadecimal(usize),
    RandomString(usize),
    RandomBoolean,
    Uuid,
    Date(Option<String>),
    Time(Option<String>),
    DateTime(Option<String>),
    /// Resolves a `${name}` expression against provider state parameters.
    ProviderState {
        expression: String,
        data_type: Option<DataType>,
    },
}

impl Generator {
    pub fn name(&self) -> &'static str {
        match self {
            Generator::RandomInt(_, _) => "RandomInt",
            Generator::RandomDecimal(_) => "RandomDecimal",
            Generator::RandomHexadecimal(_) => "RandomHexadecimal",
            Generator::RandomString(_) => "RandomString",
            Generator::RandomBoolean => "RandomBoolean",
            Generator::Uuid => "Uuid",
            Generator::Date(_) => "Date",
            Generator::Time(_) => "Time",
            Generator::DateTime(_) => "DateTime",
            Generator::ProviderState { .. } => "ProviderState",
        }
    }

    pub fn to_json(&self) -> Value {
        let mut map = Map::new();
        map.insert("type".into(), json!(self.name()));
        match self {
            Generator::RandomInt(min, max) => {
                map.insert("min".into(), json!(min));
                map.insert("max".into(), json!(max));
            }
            Generator::RandomDecimal(digits) | Generator::RandomHexadecimal(digits) => {
                map.insert("digits".into(), json!(digits));
            }
            Generator::RandomString(size) => {
                map.insert("size".into(), json!(size));
            }
            Generator::Date(Some(format))
            | Generator::Time(Some(format))
            | Generator::DateTime(Some(format)) => {
                map.insert("format".into(), json!(format));
            }
            Generator::ProviderState {
                expression,
                data_type,
            } => {
                map.insert("expression".into(), json!(expression));
                if let Some(data_type) = data_type {
                    map.insert("dataType".into(), json!(data_type.name()));
                }
            }
            _ => {}
        }
        Value::Object(map)
    }

    pub fn from_json(value: &Value) -> Result<Self> {
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::InvalidGenerator(format!("generator has no type: {}", value)))?;
        let int = |key: &str, default: i64| value.get(key).and_then(Value::as_i64).unwrap_or(default);
        let size = |key: &str, default: usize| {
            value
                .get(key)
                .and_then(Value::as_u64)
                .map(|v| v as usize)
                .unwrap_or(default)
        };
        let format = || value.get("format").and_then(Value::as_str).map(str::to_string);

        let generator = match kind {
            "RandomInt" => Generator::RandomInt(int("min", 0), int("max", 2_147_483_647)),
            "RandomDecimal" => Generator::RandomDecimal(size("digits", 10)),
            "RandomHexadecimal" => Generator::RandomHexadecimal(size("digits", 10)),
            "RandomString" => Generator::RandomString(size("size", 10)),
            "RandomBoolean" => Generator::RandomBoolean,
            "Uuid" => Generator::Uuid,
            "Date" => Generator::Date(format()),
            "Time" => Generator::Time(format()),
            "DateTime" => Generator::DateTime(format()),
            "ProviderState" => Generator::ProviderState {
                expression: value
                    .get("expression")
                    .and_then(Value::as_str)
                    .ok_or_else(|| {
                        Error::InvalidGenerator("ProviderState generator without expression".into())
                    })?
                    .to_string(),
                data_type: value
                    .get("dataType")
                    .and_then(Value::as_str)
                    .and_then(DataType::parse),
            },
            other => return Err(Error::InvalidGenerator(format!("unknown generator '{}'", other))),
        };
        Ok(generator)
    }

    /// Produce a value. `context` holds provider state parameters.
    pub fn generate(&self, context: &Map<String, Value>) -> Result<Value> {
        let mut rng = rand::thread_rng();
        let value = match self {
            Generator::RandomInt(min, max) => {
                let (low, high) = if min <= max { (*min, *max) } else { (*max, *min) };
                json!(rng.gen_range(low..=high))
            }
            Generator::RandomDecimal(digits) => {
                let digits = (*digits).max(1);
                let mut text: String = (0..digits)
                    .map(|i| {
                        let low = if i == 0 { 1 } else { 0 };
                        char::from(b'0' + rng.gen_range(low..10u8))
                    })
                    .collect();
                if digits > 1 {
                    let point = rng.gen_range(1..digits);
                    text.insert(point, '.');
                }
                text.parse::<f64>()
                    .map(Value::from)
                    .map_err(|e| Error::InvalidGenerator(e.to_string()))?
            }
            Generator::RandomHexadecimal(digits) => {
                let text: String = (0..*digits)
                    .map(|_| format!("{:x}", rng.gen_range(0..16u8)))
                    .collect();
                json!(text)
            }
            Generator::RandomString(size) => {
                let text: String = (&mut rng)
                    .sample_iter(&Alphanumeric)
                    .take(*size)
                    .map(char::from)
                    .collect();
                json!(text)
            }
            Generator::RandomBoolean => json!(rng.gen_bool(0.5)),
            Generator::Uuid => json!(uuid::Uuid::new_v4().to_string()),
            Generator::Date(format) => json!(datetime::format_now(
                format.as_deref().unwrap_or(datetime::DEFAULT_DATE)
            )?),
            Generator::Time(format) => json!(datetime::format_now(
                format.as_deref().unwrap_or(datetime::DEFAULT_TIME)
            )?),
            Generator::DateTime(format) => json!(datetime::format_now(
                format.as_deref().unwrap_or(datetime::DEFAULT_DATETIME)
            )?),
            Generator::ProviderState {
                expression,
                data_type,
            } => {
                let value = substitute(expression, context)?;
                match data_type {
                    Some(data_type) => data_type.coerce(value),
                    None => value,
                }
            }
        };
        Ok(value)
    }

    /// Produce a value as text, for headers, query values and paths.
    pub fn generate_string(&self, context: &Map<String, Value>) -> Result<String> {
        Ok(match self.generate(context)? {
            Value::String(s) => s,
            other => other.to_string(),
        })
    }
}

/// Replace `${name}` placeholders with provider state parameters. An
/// expression that is a single placeholder keeps the parameter's JSON type.
pub fn substitute(expression: &str, context: &Map<String, Value>) -> Result<Value> {
    let lookup = |name: &str| {
        context.get(name.trim()).cloned().ok_or_else(|| {
            Error::InvalidGenerator(format!(
                "no value for '{}' in the provider state parameters",
                name.trim()
            ))
        })
    };

    if let Some(captures) = PLACEHOLDER.captures(expression) {
        let whole = captures.get(0).map(|m| m.as_str().len()).unwrap_or_default();
        if whole == expression.len() {
            return lookup(&captures[1]);
        }
    }

    let mut result = String::new();
    let mut last = 0;
    for captures in PLACEHOLDER.captures_iter(expression) {
        let (whole, name) = match (captures.get(0), captures.get(1)) {
            (Some(whole), Some(name)) => (whole, name),
            _ => continue,
        };
        result.push_str(&expression[last..whole.start()]);
        match lookup(name.as_str())? {
            Value::String(s) => result.push_str(&s),
            other => result.push_str(&other.to_string()),
        }
        last = whole.end();
    }
    result.push_str(&expression[last..]);
    Ok(Value::String(result))
}

pub const GENERATOR_BODY: &str = "body";
pub const GENERATOR_HEADER: &str = "header";
pub const GENERATOR_QUERY: &str = "query";
pub const GENERATOR_PATH: &str = "path";
pub const GENERATOR_STATUS: &str = "status";
pub const GENERATOR_METADATA: &str = "metadata";

/// Generators of a request, response or message, by category and path.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Generators {
    pub categories: BTreeMap<String, BTreeMap<DocPath, Generator>>,
}

impl Generators {
    pub fn is_empty(&self) -> bool {
        self.categories.values().all(BTreeMap::is_empty)
    }

    pub fn add(&mut self, category: &str, path: DocPath, generator: Generator) {
        self.categories
            .entry(category.to_string())
            .or_default()
            .insert(path, generator);
    }

    pub fn category(&self, name: &str) -> Option<&BTreeMap<DocPath, Generator>> {
        self.categories.get(name).filter(|c| !c.is_empty())
    }

    pub fn extend(&mut self, other: Generators) {
        for (name, generators) in other.categories {
            self.categories.entry(name).or_default().extend(generators);
        }
    }

    pub fn to_json(&self) -> Value {
        let mut map = Map::new();
        for (name, generators) in &self.categories {
            if generators.is_empty() {
                continue;
            }
            let single = name == GENERATOR_PATH || name == GENERATOR_STATUS;
            let value = match generators.get(&DocPath::root()) {
                Some(generator) if single => generator.to_json(),
                _ => Value::Object(
                    generators
                        .iter()
                        .map(|(path, generator)| (path.to_string(), generator.to_json()))
                        .collect(),
                ),
            };
            map.insert(name.clone(), value);
        }
        Value::Object(map)
    }

    pub fn from_json(value: &Value) -> Result<Self> {
        let mut generators = Generators::default();
        if let Value::Object(map) = value {
            for (name, value) in map {
                if value.get("type").map(Value::is_string).unwrap_or(false) {
                    generators.add(name, DocPath::root(), Generator::from_json(value)?);
                } else if let Value::Object(paths) = value {
                    for (path, generator) in paths {
                        generators.add(name, DocPath::parse(path)?, Generator::from_json(generator)?);
                    }
                }
            }
        }
        Ok(generators)
    }

    /// Apply body generators to a JSON document.
    pub fn apply_json(&self, category: &str, document: &mut Value, context: &Map<String, Value>) {
        let generators = match self.category(category) {
            Some(generators) => generators,
            None => return,
        };

        for (path, generator) in generators {
            for_each_match(document, &path.tokens()[1..], &mut |value| {
                match generator.generate(context) {
                    Ok(generated) => *value = generated,
                    Err(error) => {
                        warn!(path = %path, %error, "Generator failed, keeping the example value")
                    }
                }
            });
        }
    }

    /// Apply generators to a multi-valued map such as headers or query.
    pub fn apply_map(
        &self,
        category: &str,
        map: &mut BTreeMap<String, Vec<String>>,
        context: &Map<String, Value>,
    ) {
        let generators = match self.category(category) {
            Some(generators) => generators,
            None => return,
        };

        for (path, generator) in generators {
            let key = map
                .keys()
                .find(|key| key.eq_ignore_ascii_case(path.as_str()))
                .cloned()
                .unwrap_or_else(|| path.as_str().to_string());
            match generator.generate_string(context) {
                Ok(generated) => {
                    map.insert(key, vec![generated]);
                }
                Err(error) => {
                    warn!(name = %path, %error, "Generator failed, keeping the example value")
                }
            }
        }
    }

    /// Apply the single generator of a category (path, status) to a string.
    pub fn apply_single(&self, category: &str, context: &Map<String, Value>) -> Option<String> {
        let generator = self.category(category)?.get(&DocPath::root())?;
        match generator.generate_string(context) {
            Ok(generated) => Some(generated),
            Err(error) => {
                warn!(category, %error, "Generator failed, keeping the example value");
                None
            }
        }
    }
}

fn for_each_match(value: &mut Value, tokens: &[PathToken], apply: &mut dyn FnMut(&mut Value)) {
    let (head, rest) = match tokens.split_first() {
        Some(split) => split,
        None => return apply(value),
    };

    match (head, value) {
        (PathToken::Field(name), Value::Object(map)) => {
            if let Some(child) = map.get_mut(name) {
                for_each_match(child, rest, apply);
            }
        }
        (PathToken::Index(index), Value::Array(items)) => {
            if let Some(child) = items.get_mut(*index) {
                for_each_match(child, rest, apply);
            }
        }
        (PathToken::Star, Value::Object(map)) => {
            for child in map.values_mut() {
                for_each_match(child, rest, apply);
            }
        }
        (PathToken::Star, Value::Array(items)) | (PathToken::StarIndex, Value::Array(items)) => {
            for child in items.iter_mut() {
                for_each_match(child, rest, apply);
            }
        }
        _ => {}
    }
}

/// The request an interaction sends when replayed, with generators applied.
pub fn generate_request(
    request: &HttpRequest,
    registry: &HandlerRegistry,
    context: &Map<String, Value>,
) -> Result<HttpRequest> {
    let mut generated = request.clone();
    if let Some(path) = request.generators.apply_single(GENERATOR_PATH, context) {
        generated.path = path;
    }
    request.generators.apply_map(GENERATOR_QUERY, &mut generated.query, context);
    request.generators.apply_map(GENERATOR_HEADER, &mut generated.headers, context);
    generated.body = generate_body(
        registry,
        &request.body,
        request.content_type(),
        &request.generators,
        GENERATOR_BODY,
        context,
    )?;
    Ok(generated)
}

/// The response a mock server answers with, with generators applied.
pub fn generate_response(
    response: &HttpResponse,
    registry: &HandlerRegistry,
    context: &Map<String, Value>,
) -> Result<HttpResponse> {
    let mut generated = response.clone();
    if let Some(status) = response.generators.apply_single(GENERATOR_STATUS, context) {
        generated.status = status
            .parse()
            .map_err(|_| Error::InvalidGenerator(format!("'{}' is not a status code", status)))?;
    }
    response.generators.apply_map(GENERATOR_HEADER, &mut generated.headers, context);
    generated.body = generate_body(
        registry,
        &response.body,
        response.content_type(),
        &response.generators,
        GENERATOR_BODY,
        context,
    )?;
    Ok(generated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Body;

    fn context() -> Map<String, Value> {
        let mut context = Map::new();
        context.insert("id".into(), json!(42));
        context.insert("name".into(), json!("report001"));
        context
    }

    #[test]
    fn whole_placeholders_keep_their_type() {
        assert_eq!(substitute("${id}", &context()).unwrap(), json!(42));
        assert_eq!(
            substitute("/reports/${name}.csv", &context()).unwrap(),
            json!("/reports/report001.csv")
        );
        assert!(substitute("${missing}", &context()).is_err());
    }

    #[test]
    fn provider_state_generator_coerces_data_type() {
        let generator = Generator::ProviderState {
            expression: "${id}".into(),
            data_type: Some(DataType::String),
        };
        assert_eq!(generator.generate(&context()).unwrap(), json!("42"));
    }

    #[test]
    fn random_values_respect_bounds() {
        for _ in 0..20 {
            let value = Generator::RandomInt(5, 7).generate(&Map::new()).unwrap();
            let value = value.as_i64().unwrap();
            assert!((5..=7).contains(&value));
        }
        let text = Generator::RandomHexadecimal(8).generate(&Map::new()).unwrap();
        assert_eq!(text.as_str().unwrap().len(), 8);
        let text = Generator::RandomString(12).generate(&Map::new()).unwrap();
        assert_eq!(text.as_str().unwrap().len(), 12);
    }

    #[test]
    fn applies_to_json_paths_with_wildcards() {
        let mut generators = Generators::default();
        generators.add(
            GENERATOR_BODY,
            DocPath::parse("$.items[*].id").unwrap(),
            Generator::ProviderState {
                expression: "${id}".into(),
                data_type: None,
            },
        );

        let mut document = json!({"items": [{"id": 1}, {"id": 2}], "other": 3});
        generators.apply_json(GENERATOR_BODY, &mut document, &context());
        assert_eq!(document, json!({"items": [{"id": 42}, {"id": 42}], "other": 3}));
    }

    #[test]
    fn failed_generation_keeps_the_example() {
        let mut generators = Generators::default();
        generators.add(
            GENERATOR_BODY,
            DocPath::parse("$.id").unwrap(),
            Generator::ProviderState {
                expression: "${unknown}".into(),
                data_type: None,
            },
        );
        let mut document = json!({"id": 1});
        generators.apply_json(GENERATOR_BODY, &mut document, &Map::new());
        assert_eq!(document, json!({"id": 1}));
    }

    #[test]
    fn path_generators_serialise_as_a_single_entry() {
        let mut generators = Generators::default();
        generators.add(
            GENERATOR_PATH,
            DocPath::root(),
            Generator::ProviderState {
                expression: "/reports/${name}.csv".into(),
                data_type: None,
            },
        );
        generators.add(GENERATOR_HEADER, DocPath::parse("X-Request-Id").unwrap(), Generator::Uuid);

        let document = generators.to_json();
        assert_eq!(document["path"]["type"], json!("ProviderState"));
        assert_eq!(document["header"]["X-Request-Id"]["type"], json!("Uuid"));
        assert_eq!(Generators::from_json(&document).unwrap(), generators);
        assert_eq!(
            generators.apply_single(GENERATOR_PATH, &context()),
            Some("/reports/report001.csv".to_string())
        );
    }

    #[test]
    fn responses_are_generated_from_provider_state() {
        let mut response = HttpResponse {
            body: Body::json(&json!({"id": 1, "name": "square"})),
            ..HttpResponse::default()
        };
        response.generators.add(
            GENERATOR_BODY,
            DocPath::parse("$.id").unwrap(),
            Generator::ProviderState {
                expression: "${id}".into(),
                data_type: None,
            },
        );
        response.generators.add(
            GENERATOR_STATUS,
            DocPath::root(),
            Generator::ProviderState {
                expression: "201".into(),
                data_type: None,
            },
        );

        let generated = generate_response(&response, &HandlerRegistry::with_defaults(), &context()).unwrap();
        assert_eq!(generated.status, 201);
        assert_eq!(
            generated.body.as_json().unwrap().unwrap(),
            json!({"id": 42, "name": "square"})
        );
    }
}
