use crate::{
    content_type::ContentType,
    error::{Error, Result},
    generators::Generators,
    model::{body::Body, matching_rules::MatchingRules, provider_state::ProviderState},
};
use serde_json::{json, Map, Value};
use std::{
    collections::BTreeMap,
    fmt::{self, Display},
};

pub const HTTP_TYPE: &str = "Synchronous/HTTP";
pub const MESSAGE_TYPE: &str = "Asynchronous/Messages";

pub type MultiValueMap = BTreeMap<String, Vec<String>>;

/// Case-insensitive lookup in a header map.
pub fn find_header<'a>(headers: &'a MultiValueMap, name: &str) -> Option<&'a Vec<String>> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, values)| values)
}

fn declared_content_type(headers: &MultiValueMap) -> Option<ContentType> {
    find_header(headers, "content-type")
        .and_then(|values| values.first())
        .and_then(|value| ContentType::parse(value).ok())
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: String,
    pub path: String,
    pub query: MultiValueMap,
    pub headers: MultiValueMap,
    pub body: Body,
    pub matching_rules: MatchingRules,
    pub generators: Generators,
}

impl Default for HttpRequest {
    fn default() -> Self {
        Self {
            method: "GET".into(),
            path: "/".into(),
            query: MultiValueMap::new(),
            headers: MultiValueMap::new(),
            body: Body::Missing,
            matching_rules: MatchingRules::default(),
            generators: Generators::default(),
        }
    }
}

impl HttpRequest {
    pub fn header(&self, name: &str) -> Option<&Vec<String>> {
        find_header(&self.headers, name)
    }

    pub fn content_type(&self) -> Option<ContentType> {
        declared_content_type(&self.headers).or_else(|| self.body.content_type().cloned())
    }

    /// The path with its query string, as sent over the wire.
    pub fn uri(&self) -> String {
        if self.query.is_empty() {
            return self.path.clone();
        }
        let mut serializer = url::form_urlencoded::Serializer::new(String::new());
        for (name, values) in &self.query {
            for value in values {
                serializer.append_pair(name, value);
            }
        }
        format!("{}?{}", self.path, serializer.finish())
    }

    fn to_json(&self) -> Value {
        let mut map = Map::new();
        map.insert("method".into(), json!(self.method.to_uppercase()));
        map.insert("path".into(), json!(self.path));
        if !self.query.is_empty() {
            map.insert("query".into(), json!(self.query));
        }
        if !self.headers.is_empty() {
            map.insert("headers".into(), json!(self.headers));
        }
        if self.body != Body::Missing {
            map.insert("body".into(), self.body.to_v4_json());
        }
        if !self.matching_rules.is_empty() {
            map.insert("matchingRules".into(), self.matching_rules.to_v4_json());
        }
        if !self.generators.is_empty() {
            map.insert("generators".into(), self.generators.to_json());
        }
        Value::Object(map)
    }

    fn from_json(index: usize, value: &Value) -> Result<Self> {
        let headers = multi_value_map(index, value.get("headers"), "headers")?;
        let body = Body::from_v4_json(
            value.get("body").unwrap_or(&Value::Null),
            declared_content_type(&headers).as_ref(),
        )
        .map_err(|e| at_index(index, e))?;

        Ok(Self {
            method: value
                .get("method")
                .and_then(Value::as_str)
                .unwrap_or("GET")
                .to_uppercase(),
            path: value
                .get("path")
                .and_then(Value::as_str)
                .unwrap_or("/")
                .to_string(),
            query: multi_value_map(index, value.get("query"), "query")?,
            headers,
            body,
            matching_rules: rules(index, value.get("matchingRules"))?,
            generators: generators(index, value.get("generators"))?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: MultiValueMap,
    pub body: Body,
    pub matching_rules: MatchingRules,
    pub generators: Generators,
}

impl Default for HttpResponse {
    fn default() -> Self {
        Self {
            status: 200,
            headers: MultiValueMap::new(),
            body: Body::Missing,
            matching_rules: MatchingRules::default(),
            generators: Generators::default(),
        }
    }
}

impl HttpResponse {
    pub fn header(&self, name: &str) -> Option<&Vec<String>> {
        find_header(&self.headers, name)
    }

    pub fn content_type(&self) -> Option<ContentType> {
        declared_content_type(&self.headers).or_else(|| self.body.content_type().cloned())
    }

    fn to_json(&self) -> Value {
        let mut map = Map::new();
        map.insert("status".into(), json!(self.status));
        if !self.headers.is_empty() {
            map.insert("headers".into(), json!(self.headers));
        }
        if self.body != Body::Missing {
            map.insert("body".into(), self.body.to_v4_json());
        }
        if !self.matching_rules.is_empty() {
            map.insert("matchingRules".into(), self.matching_rules.to_v4_json());
        }
        if !self.generators.is_empty() {
            map.insert("generators".into(), self.generators.to_json());
        }
        Value::Object(map)
    }

    fn from_json(index: usize, value: &Value) -> Result<Self> {
        let headers = multi_value_map(index, value.get("headers"), "headers")?;
        let body = Body::from_v4_json(
            value.get("body").unwrap_or(&Value::Null),
            declared_content_type(&headers).as_ref(),
        )
        .map_err(|e| at_index(index, e))?;
        let status = match value.get("status") {
            None => 200,
            Some(status) => status
                .as_u64()
                .and_then(|s| u16::try_from(s).ok())
                .ok_or_else(|| Error::persistence(Some(index), format!("invalid status {}", status)))?,
        };

        Ok(Self {
            status,
            headers,
            body,
            matching_rules: rules(index, value.get("matchingRules"))?,
            generators: generators(index, value.get("generators"))?,
        })
    }
}

/// An asynchronous message: contents plus metadata.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Message {
    pub contents: Body,
    pub metadata: BTreeMap<String, Value>,
    pub matching_rules: MatchingRules,
    pub generators: Generators,
}

impl Message {
    pub fn content_type(&self) -> Option<ContentType> {
        self.metadata
            .iter()
            .find(|(key, _)| {
                key.eq_ignore_ascii_case("contentType") || key.eq_ignore_ascii_case("content-type")
            })
            .and_then(|(_, value)| value.as_str())
            .and_then(|value| ContentType::parse(value).ok())
            .or_else(|| self.contents.content_type().cloned())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum InteractionContents {
    Http {
        request: HttpRequest,
        response: HttpResponse,
    },
    Message(Message),
}

/// One expected exchange between consumer and provider.
#[derive(Debug, Clone, PartialEq)]
pub struct Interaction {
    pub description: String,
    pub provider_states: Vec<ProviderState>,
    /// May be matched by at most one request.
    pub single_use: bool,
    pub comments: Vec<String>,
    pub contents: InteractionContents,
}

impl Interaction {
    pub fn http<S: Into<String>>(description: S, request: HttpRequest, response: HttpResponse) -> Self {
        Self {
            description: description.into(),
            provider_states: vec![],
            single_use: false,
            comments: vec![],
            contents: InteractionContents::Http { request, response },
        }
    }

    pub fn message<S: Into<String>>(description: S, message: Message) -> Self {
        Self {
            description: description.into(),
            provider_states: vec![],
            single_use: false,
            comments: vec![],
            contents: InteractionContents::Message(message),
        }
    }

    pub fn request(&self) -> Option<&HttpRequest> {
        match &self.contents {
            InteractionContents::Http { request, .. } => Some(request),
            InteractionContents::Message(_) => None,
        }
    }

    pub fn response(&self) -> Option<&HttpResponse> {
        match &self.contents {
            InteractionContents::Http { response, .. } => Some(response),
            InteractionContents::Message(_) => None,
        }
    }

    pub fn as_message(&self) -> Option<&Message> {
        match &self.contents {
            InteractionContents::Message(message) => Some(message),
            InteractionContents::Http { .. } => None,
        }
    }

    pub fn is_http(&self) -> bool {
        matches!(self.contents, InteractionContents::Http { .. })
    }

    /// Two interactions describe the same exchange when they share the
    /// description and provider states.
    pub fn same_identity(&self, other: &Interaction) -> bool {
        self.description == other.description && self.provider_states == other.provider_states
    }

    pub fn to_v4_json(&self) -> Value {
        let mut map = Map::new();
        match &self.contents {
            InteractionContents::Http { request, response } => {
                map.insert("type".into(), json!(HTTP_TYPE));
                map.insert("description".into(), json!(self.description));
                map.insert("request".into(), request.to_json());
                map.insert("response".into(), response.to_json());
            }
            InteractionContents::Message(message) => {
                map.insert("type".into(), json!(MESSAGE_TYPE));
                map.insert("description".into(), json!(self.description));
                map.insert("contents".into(), message.contents.to_v4_json());
                if !message.metadata.is_empty() {
                    map.insert("metadata".into(), json!(message.metadata));
                }
                if !message.matching_rules.is_empty() {
                    map.insert("matchingRules".into(), message.matching_rules.to_v4_json());
                }
                if !message.generators.is_empty() {
                    map.insert("generators".into(), message.generators.to_json());
                }
            }
        }
        if !self.provider_states.is_empty() {
            map.insert("providerStates".into(), json!(self.provider_states));
        }
        if self.single_use {
            map.insert("singleUse".into(), json!(true));
        }
        if !self.comments.is_empty() {
            map.insert("comments".into(), json!({ "text": self.comments }));
        }
        map.insert("pending".into(), json!(false));
        Value::Object(map)
    }

    /// Read a V4 interaction. `index` locates it in the document for errors.
    pub fn from_v4_json(index: usize, value: &Value) -> Result<Self> {
        if !value.is_object() {
            return Err(Error::persistence(Some(index), "interaction is not an object"));
        }

        let description = value
            .get("description")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::persistence(Some(index), "missing description"))?
            .to_string();

        let provider_states = match value.get("providerStates") {
            None | Some(Value::Null) => vec![],
            Some(states) => serde_json::from_value::<Vec<ProviderState>>(states.clone())
                .map_err(|e| Error::persistence(Some(index), format!("invalid providerStates: {}", e)))?,
        };

        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or(HTTP_TYPE);

        let contents = match kind {
            HTTP_TYPE => InteractionContents::Http {
                request: HttpRequest::from_json(index, value.get("request").unwrap_or(&json!({})))?,
                response: HttpResponse::from_json(
                    index,
                    value.get("response").unwrap_or(&json!({})),
                )?,
            },
            MESSAGE_TYPE => {
                let metadata: BTreeMap<String, Value> = match value.get("metadata") {
                    Some(Value::Object(map)) => map.clone().into_iter().collect(),
                    _ => BTreeMap::new(),
                };
                let mut message = Message {
                    contents: Body::Missing,
                    metadata,
                    matching_rules: rules(index, value.get("matchingRules"))?,
                    generators: generators(index, value.get("generators"))?,
                };
                let declared = message.content_type();
                message.contents = Body::from_v4_json(
                    value.get("contents").unwrap_or(&Value::Null),
                    declared.as_ref(),
                )
                .map_err(|e| at_index(index, e))?;
                InteractionContents::Message(message)
            }
            other => {
                return Err(Error::persistence(
                    Some(index),
                    format!("unsupported interaction type '{}'", other),
                ))
            }
        };

        let comments = value
            .get("comments")
            .and_then(|c| c.get("text"))
            .and_then(Value::as_array)
            .map(|text| {
                text.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            description,
            provider_states,
            single_use: value.get("singleUse").and_then(Value::as_bool).unwrap_or(false),
            comments,
            contents,
        })
    }
}

impl Display for Interaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}'", self.description)?;
        if !self.provider_states.is_empty() {
            let names: Vec<&str> = self.provider_states.iter().map(|s| s.name.as_str()).collect();
            write!(f, " given {}", names.join(", "))?;
        }
        Ok(())
    }
}

fn at_index(index: usize, error: Error) -> Error {
    match error {
        Error::Persistence { index: None, message } => Error::Persistence {
            index: Some(index),
            message,
        },
        other => Error::persistence(Some(index), other.to_string()),
    }
}

fn rules(index: usize, value: Option<&Value>) -> Result<MatchingRules> {
    match value {
        None | Some(Value::Null) => Ok(MatchingRules::default()),
        Some(value) => MatchingRules::from_json(value).map_err(|e| at_index(index, e)),
    }
}

fn generators(index: usize, value: Option<&Value>) -> Result<Generators> {
    match value {
        None | Some(Value::Null) => Ok(Generators::default()),
        Some(value) => Generators::from_json(value).map_err(|e| at_index(index, e)),
    }
}

/// Headers and query values are arrays in V4 and plain strings before.
fn multi_value_map(index: usize, value: Option<&Value>, field: &str) -> Result<MultiValueMap> {
    let map = match value {
        None | Some(Value::Null) => return Ok(MultiValueMap::new()),
        Some(Value::Object(map)) => map,
        Some(other) => {
            return Err(Error::persistence(
                Some(index),
                format!("{} must be an object, got {}", field, other),
            ))
        }
    };

    map.iter()
        .map(|(key, value)| {
            let values = match value {
                Value::String(s) => vec![s.clone()],
                Value::Array(items) => items
                    .iter()
                    .map(|item| match item {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .collect(),
                other => vec![other.to_string()],
            };
            Ok((key.clone(), values))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        model::matching_rules::{MatchingRule, CATEGORY_BODY},
        path::DocPath,
    };

    fn area_interaction() -> Interaction {
        let mut request = HttpRequest {
            method: "POST".into(),
            path: "/area".into(),
            body: Body::json(&json!({"length": 3, "width": 4})),
            ..HttpRequest::default()
        };
        request
            .headers
            .insert("Content-Type".into(), vec!["application/json".into()]);
        request.matching_rules.add_rule(
            CATEGORY_BODY,
            DocPath::parse("$.length").unwrap(),
            MatchingRule::Number,
        );
        let response = HttpResponse {
            body: Body::json(&json!({"value": 12})),
            ..HttpResponse::default()
        };

        let mut interaction = Interaction::http("a request for an area", request, response);
        interaction.provider_states = vec![ProviderState::new("a rectangle")];
        interaction
    }

    #[test]
    fn http_interactions_round_trip() {
        let interaction = area_interaction();
        let document = interaction.to_v4_json();
        assert_eq!(document["type"], json!(HTTP_TYPE));
        assert_eq!(document["request"]["body"]["content"], json!({"length": 3, "width": 4}));
        assert_eq!(Interaction::from_v4_json(0, &document).unwrap(), interaction);
    }

    #[test]
    fn messages_round_trip() {
        let mut message = Message {
            contents: Body::json(&json!({"id": 10})),
            ..Message::default()
        };
        message
            .metadata
            .insert("contentType".into(), json!("application/json"));
        let mut interaction = Interaction::message("a shape event", message);
        interaction.single_use = true;
        interaction.comments = vec!["emitted on every update".into()];

        let document = interaction.to_v4_json();
        assert_eq!(document["type"], json!(MESSAGE_TYPE));
        assert_eq!(Interaction::from_v4_json(0, &document).unwrap(), interaction);
    }

    #[test]
    fn errors_carry_the_interaction_index() {
        let error = Interaction::from_v4_json(4, &json!({"type": HTTP_TYPE})).unwrap_err();
        assert!(matches!(error, Error::Persistence { index: Some(4), .. }));

        let error = Interaction::from_v4_json(
            2,
            &json!({"description": "x", "response": {"status": "teapot"}}),
        )
        .unwrap_err();
        assert!(error.to_string().contains("interaction 2"));
    }

    #[test]
    fn header_lookup_ignores_case() {
        let interaction = area_interaction();
        let request = interaction.request().unwrap();
        assert!(request.header("content-type").is_some());
        assert_eq!(request.content_type(), Some(ContentType::json()));
    }

    #[test]
    fn uri_encodes_query_values() {
        let mut request = HttpRequest::default();
        request.path = "/reports".into();
        request
            .query
            .insert("name".into(), vec!["a b".into(), "c".into()]);
        assert_eq!(request.uri(), "/reports?name=a+b&name=c");
    }
}
