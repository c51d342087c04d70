use super::{BodyParts, BodySpec};
use crate::{
    content::HandlerRegistry,
    error::Result,
    generators::{Generator, GENERATOR_HEADER, GENERATOR_PATH, GENERATOR_QUERY, GENERATOR_STATUS},
    model::{
        matching_rules::{CATEGORY_HEADER, CATEGORY_PATH, CATEGORY_QUERY, CATEGORY_STATUS},
        HttpRequest, HttpResponse, HttpStatus, MatchingRule,
    },
    path::{DocPath, PathToken},
};
use bytes::Bytes;
use serde_json::Value;

/// Query and header rules are keyed by the bare name.
fn field_path(name: &str) -> DocPath {
    DocPath::parse(name).unwrap_or_else(|_| {
        DocPath::from_tokens(vec![PathToken::Root, PathToken::Field(name.to_string())])
    })
}

fn provider_state(expression: &str) -> Generator {
    Generator::ProviderState {
        expression: expression.to_string(),
        data_type: None,
    }
}

#[derive(Debug, Clone, Default)]
pub struct RequestBuilder {
    request: HttpRequest,
    body: BodyParts,
}

impl RequestBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn method<S: AsRef<str>>(mut self, method: S) -> Self {
        self.request.method = method.as_ref().to_uppercase();
        self
    }

    pub fn get(self) -> Self {
        self.method("GET")
    }

    pub fn post(self) -> Self {
        self.method("POST")
    }

    pub fn put(self) -> Self {
        self.method("PUT")
    }

    pub fn patch(self) -> Self {
        self.method("PATCH")
    }

    pub fn delete(self) -> Self {
        self.method("DELETE")
    }

    pub fn path<S: Into<String>>(mut self, path: S) -> Self {
        self.request.path = path.into();
        self
    }

    /// Any path matching `regex`; `example` is sent on replay.
    pub fn path_matching(mut self, regex: &str, example: &str) -> Self {
        self.request.path = example.to_string();
        self.request.matching_rules.add_rule(
            CATEGORY_PATH,
            DocPath::root(),
            MatchingRule::Regex(regex.to_string()),
        );
        self
    }

    /// A path built from provider state parameters on replay, e.g.
    /// `/reports/${id}`.
    pub fn path_from_provider_state(mut self, expression: &str, example: &str) -> Self {
        self.request.path = example.to_string();
        self.request
            .generators
            .add(GENERATOR_PATH, DocPath::root(), provider_state(expression));
        self
    }

    pub fn query_param<N: Into<String>, V: Into<String>>(mut self, name: N, value: V) -> Self {
        self.request
            .query
            .entry(name.into())
            .or_default()
            .push(value.into());
        self
    }

    pub fn query_matching(mut self, name: &str, regex: &str, example: &str) -> Self {
        self.request.matching_rules.add_rule(
            CATEGORY_QUERY,
            field_path(name),
            MatchingRule::Regex(regex.to_string()),
        );
        self.query_param(name, example)
    }

    pub fn query_from_provider_state(mut self, name: &str, expression: &str, example: &str) -> Self {
        self.request
            .generators
            .add(GENERATOR_QUERY, field_path(name), provider_state(expression));
        self.query_param(name, example)
    }

    pub fn header<N: Into<String>, V: Into<String>>(mut self, name: N, value: V) -> Self {
        self.request
            .headers
            .entry(name.into())
            .or_default()
            .push(value.into());
        self
    }

    pub fn header_matching(mut self, name: &str, regex: &str, example: &str) -> Self {
        self.request.matching_rules.add_rule(
            CATEGORY_HEADER,
            field_path(name),
            MatchingRule::Regex(regex.to_string()),
        );
        self.header(name, example)
    }

    pub fn header_from_provider_state(mut self, name: &str, expression: &str, example: &str) -> Self {
        self.request
            .generators
            .add(GENERATOR_HEADER, field_path(name), provider_state(expression));
        self.header(name, example)
    }

    pub fn content_type(self, content_type: &str) -> Self {
        self.header("Content-Type", content_type)
    }

    /// A JSON body template; see [`matchers`](super::matchers).
    pub fn json_body(mut self, template: Value) -> Self {
        self.body.spec = BodySpec::Json(template);
        self
    }

    /// A body configured by the content handler for `content_type`.
    pub fn contents(mut self, content_type: &str, config: Value) -> Self {
        self.body.spec = BodySpec::Contents {
            content_type: content_type.to_string(),
            config,
        };
        self
    }

    pub fn body<B: Into<Bytes>>(mut self, content: B, content_type: Option<&str>) -> Self {
        self.body.spec = BodySpec::Raw {
            content: content.into(),
            content_type: content_type.map(str::to_string),
        };
        self
    }

    pub fn empty_body(mut self) -> Self {
        self.body.spec = BodySpec::Empty;
        self
    }

    /// An extra rule for a path in the body example.
    pub fn body_rule(mut self, path: &str, rule: MatchingRule) -> Self {
        self.body.rules.push((path.to_string(), rule));
        self
    }

    pub(crate) fn build(self, registry: &HandlerRegistry) -> Result<HttpRequest> {
        let mut request = self.request;
        request.body = self.body.build(
            Some(&mut request.headers),
            &mut request.matching_rules,
            &mut request.generators,
            registry,
        )?;
        Ok(request)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ResponseBuilder {
    response: HttpResponse,
    body: BodyParts,
}

impl ResponseBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(mut self, status: u16) -> Self {
        self.response.status = status;
        self
    }

    /// Any status in a family such as [`HttpStatus::Success`].
    pub fn status_matching(mut self, family: HttpStatus, example: u16) -> Self {
        self.response.status = example;
        self.response.matching_rules.add_rule(
            CATEGORY_STATUS,
            DocPath::root(),
            MatchingRule::StatusCode(family),
        );
        self
    }

    pub fn status_from_provider_state(mut self, expression: &str, example: u16) -> Self {
        self.response.status = example;
        self.response
            .generators
            .add(GENERATOR_STATUS, DocPath::root(), provider_state(expression));
        self
    }

    pub fn header<N: Into<String>, V: Into<String>>(mut self, name: N, value: V) -> Self {
        self.response
            .headers
            .entry(name.into())
            .or_default()
            .push(value.into());
        self
    }

    pub fn header_matching(mut self, name: &str, regex: &str, example: &str) -> Self {
        self.response.matching_rules.add_rule(
            CATEGORY_HEADER,
            field_path(name),
            MatchingRule::Regex(regex.to_string()),
        );
        self.header(name, example)
    }

    pub fn header_from_provider_state(mut self, name: &str, expression: &str, example: &str) -> Self {
        self.response
            .generators
            .add(GENERATOR_HEADER, field_path(name), provider_state(expression));
        self.header(name, example)
    }

    pub fn content_type(self, content_type: &str) -> Self {
        self.header("Content-Type", content_type)
    }

    pub fn json_body(mut self, template: Value) -> Self {
        self.body.spec = BodySpec::Json(template);
        self
    }

    pub fn contents(mut self, content_type: &str, config: Value) -> Self {
        self.body.spec = BodySpec::Contents {
            content_type: content_type.to_string(),
            config,
        };
        self
    }

    pub fn body<B: Into<Bytes>>(mut self, content: B, content_type: Option<&str>) -> Self {
        self.body.spec = BodySpec::Raw {
            content: content.into(),
            content_type: content_type.map(str::to_string),
        };
        self
    }

    pub fn empty_body(mut self) -> Self {
        self.body.spec = BodySpec::Empty;
        self
    }

    pub fn body_rule(mut self, path: &str, rule: MatchingRule) -> Self {
        self.body.rules.push((path.to_string(), rule));
        self
    }

    pub(crate) fn build(self, registry: &HandlerRegistry) -> Result<HttpResponse> {
        let mut response = self.response;
        response.body = self.body.build(
            Some(&mut response.headers),
            &mut response.matching_rules,
            &mut response.generators,
            registry,
        )?;
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        builder::matchers::number,
        content_type::ContentType,
        error::Error,
        model::{interaction::find_header, matching_rules::CATEGORY_BODY},
    };
    use serde_json::json;

    #[test]
    fn json_request_gets_rules_and_content_type() {
        let request = RequestBuilder::new()
            .post()
            .path("/area")
            .json_body(json!({"length": number(3), "width": number(4)}))
            .build(&HandlerRegistry::with_defaults())
            .unwrap();

        assert_eq!(request.method, "POST");
        assert_eq!(
            find_header(&request.headers, "content-type"),
            Some(&vec!["application/json".to_string()])
        );
        let rules = request.matching_rules.category(CATEGORY_BODY).unwrap();
        assert_eq!(rules.get("$.length").unwrap().rules, vec![MatchingRule::Number]);
        assert_eq!(request.body.as_json().unwrap().unwrap(), json!({"length": 3, "width": 4}));
    }

    #[test]
    fn explicit_rules_are_validated_against_the_example() {
        let error = ResponseBuilder::new()
            .json_body(json!({"value": 12}))
            .body_rule("$.area", MatchingRule::Number)
            .build(&HandlerRegistry::with_defaults())
            .unwrap_err();
        assert!(matches!(error, Error::InvalidRule { ref path, .. } if path == "$.area"));
    }

    #[test]
    fn csv_contents_use_the_csv_handler() {
        let response = ResponseBuilder::new()
            .contents("text/csv", json!({"column:1": "matching(type,'Name')"}))
            .build(&HandlerRegistry::with_defaults())
            .unwrap();
        assert_eq!(response.body.as_str().unwrap(), "Name\n");
        let content_type = response.content_type().unwrap();
        assert!(content_type.is_equivalent_to(&ContentType::csv()));
    }

    #[test]
    fn unregistered_contents_fail() {
        let error = ResponseBuilder::new()
            .contents("application/x-unregistered", json!({}))
            .build(&HandlerRegistry::with_defaults())
            .unwrap_err();
        assert!(matches!(error, Error::HandlerResolution(_)));
    }

    #[test]
    fn header_and_path_rules() {
        let request = RequestBuilder::new()
            .path_matching("/reports/\\d+", "/reports/1")
            .header_matching("X-Trace", "[a-f0-9]+", "abc123")
            .build(&HandlerRegistry::with_defaults())
            .unwrap();
        assert_eq!(request.path, "/reports/1");
        assert!(request.matching_rules.category(CATEGORY_PATH).is_some());
        assert!(request
            .matching_rules
            .category(CATEGORY_HEADER)
            .unwrap()
            .get("X-Trace")
            .is_some());
    }
}
