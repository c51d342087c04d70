//! Builders for pacts and their interactions.
//!
//! ```no_run
//! use covenant::builder::{matchers::*, InteractionBuilder, PactBuilder, RequestBuilder, ResponseBuilder};
//! use serde_json::json;
//!
//! let pact = PactBuilder::new("shape-client", "shape-service")
//!     .interaction(
//!         InteractionBuilder::new("a request for the area of a rectangle")
//!             .request(RequestBuilder::new().post().path("/area").json_body(json!({
//!                 "length": number(3),
//!                 "width": number(4),
//!             })))
//!             .response(ResponseBuilder::new().json_body(json!({ "value": number(12) }))),
//!     )
//!     .build()
//!     .unwrap();
//! ```

mod http;
mod interaction;
pub mod matchers;
mod message;
mod pact;

pub use self::http::{RequestBuilder, ResponseBuilder};
pub use interaction::InteractionBuilder;
pub use message::MessageBuilder;
pub use pact::PactBuilder;

use crate::{
    content::HandlerRegistry,
    content_type::ContentType,
    error::{Error, Result},
    generators::Generators,
    model::{
        interaction::find_header, matching_rules::CATEGORY_BODY, Body, MatchingRule, MatchingRules,
        MultiValueMap,
    },
    path::{DocPath, PathToken},
};
use bytes::Bytes;
use serde_json::Value;

/// How a body is to be produced when the interaction is built.
#[derive(Debug, Clone, Default)]
enum BodySpec {
    #[default]
    Missing,
    Empty,
    /// A JSON template with matcher markers.
    Json(Value),
    /// Configuration for the content handler of a content type.
    Contents { content_type: String, config: Value },
    Raw {
        content: Bytes,
        content_type: Option<String>,
    },
}

/// Body specification plus rules declared for paths in it.
#[derive(Debug, Clone, Default)]
struct BodyParts {
    spec: BodySpec,
    rules: Vec<(String, MatchingRule)>,
}

impl BodyParts {
    /// Produce the body, adding its rules and generators, and a
    /// content-type header unless one is set.
    fn build(
        self,
        headers: Option<&mut MultiValueMap>,
        rules: &mut MatchingRules,
        generators: &mut Generators,
        registry: &HandlerRegistry,
    ) -> Result<Body> {
        let body = match self.spec {
            BodySpec::Missing => Body::Missing,
            BodySpec::Empty => Body::Empty,
            BodySpec::Json(template) => {
                let content_type = headers
                    .as_deref()
                    .and_then(declared_type)
                    .filter(ContentType::is_json)
                    .unwrap_or_else(ContentType::json);
                configure(&content_type, &template, rules, generators, registry)?
            }
            BodySpec::Contents {
                content_type,
                config,
            } => configure(&ContentType::parse(&content_type)?, &config, rules, generators, registry)?,
            BodySpec::Raw {
                content,
                content_type,
            } => {
                let content_type = content_type.map(|ct| ContentType::parse(&ct)).transpose()?;
                Body::from_bytes(content, content_type)
            }
        };

        for (path, rule) in self.rules {
            let path = DocPath::parse(&path)?;
            check_path_exists(&body, &path)?;
            rules.add_rule(CATEGORY_BODY, path, rule);
        }

        if let (Some(headers), Some(content_type)) = (headers, body.content_type()) {
            if find_header(headers, "content-type").is_none() {
                headers.insert("Content-Type".into(), vec![content_type.to_string()]);
            }
        }
        Ok(body)
    }
}

fn declared_type(headers: &MultiValueMap) -> Option<ContentType> {
    find_header(headers, "content-type")
        .and_then(|values| values.first())
        .and_then(|value| ContentType::parse(value).ok())
}

fn configure(
    content_type: &ContentType,
    config: &Value,
    rules: &mut MatchingRules,
    generators: &mut Generators,
    registry: &HandlerRegistry,
) -> Result<Body> {
    let handler = registry.resolve(content_type)?;
    let contents = handler.configure_interaction(content_type, config)?;
    rules.extend(contents.rules);
    generators.extend(contents.generators);
    Ok(contents.body)
}

/// A rule declared against a JSON example must point at something in it.
fn check_path_exists(body: &Body, path: &DocPath) -> Result<()> {
    if path.has_wildcards() || path.is_root() {
        return Ok(());
    }
    let document = match body.as_json() {
        Some(Ok(document)) if body.content_type().map(ContentType::is_json).unwrap_or(false) => document,
        _ => return Ok(()),
    };

    let mut current = &document;
    for token in path.tokens() {
        let next = match token {
            PathToken::Root => Some(current),
            PathToken::Field(name) => current.get(name.as_str()),
            PathToken::Index(index) => current.get(*index),
            PathToken::Star | PathToken::StarIndex => return Ok(()),
        };
        current = next.ok_or_else(|| Error::InvalidRule {
            path: path.to_string(),
            message: "the path does not exist in the example body".into(),
        })?;
    }
    Ok(())
}
