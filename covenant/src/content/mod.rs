//! Content handlers: content-type specific configuration, comparison and
//! generation of bodies. Built-in handlers cover JSON, CSV and plain text;
//! other content types are served by plugin processes.

mod csv;
mod expression;
mod json;
pub mod plugin;
mod registry;
mod text;

use crate::{
    content_type::ContentType,
    error::{Error, Result},
    generators::{Generator, Generators},
    matching::{MatchResult, MatchingConfig},
    model::{Body, MatchingRules, RuleCategory},
    path::DocPath,
};
use bytes::Bytes;
use serde_json::{Map, Value};
use std::{collections::BTreeMap, fmt::Debug};

pub use self::csv::CsvHandler;
pub use self::json::JsonHandler;
pub use self::text::TextHandler;
pub use expression::{parse_column, parse_value, Column, ValueDefinition};
pub use registry::{global, install, HandlerRegistry};

/// Body, rules and generators produced from a handler configuration.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConfiguredContents {
    pub body: Body,
    pub rules: MatchingRules,
    pub generators: Generators,
}

pub trait ContentHandler: Debug + Send + Sync {
    fn name(&self) -> &str;

    fn version(&self) -> semver::Version;

    fn handles(&self, content_type: &ContentType) -> bool;

    /// Whether this handler may stand in for an unregistered content type.
    fn is_fallback_for(&self, _content_type: &ContentType) -> bool {
        false
    }

    /// Parse raw bytes into a structured, matchable form.
    fn parse(&self, _content: &[u8], _content_type: &ContentType) -> Result<Value> {
        Err(Error::handler(self.name(), "parsing contents is not supported"))
    }

    /// Render a structured form back to bytes.
    fn render(&self, _value: &Value, _content_type: &ContentType) -> Result<Bytes> {
        Err(Error::handler(self.name(), "rendering contents is not supported"))
    }

    /// Build the example body, rules and generators from a configuration.
    fn configure_interaction(
        &self,
        content_type: &ContentType,
        config: &Value,
    ) -> Result<ConfiguredContents>;

    /// Compare actual contents to the expected example under body rules.
    fn compare_contents(
        &self,
        expected: &Body,
        actual: &Body,
        rules: &RuleCategory,
        config: MatchingConfig,
    ) -> Result<MatchResult>;

    /// Apply body generators to the example contents.
    fn generate_contents(
        &self,
        body: &Body,
        generators: &BTreeMap<DocPath, Generator>,
        context: &Map<String, Value>,
    ) -> Result<Body>;
}

fn content_of<'a>(name: &str, body: &'a Body) -> Result<&'a Bytes> {
    body.content()
        .ok_or_else(|| Error::handler(name, "expected contents, but the body is empty"))
}

/// Materialise a body through its generators, using the handler for its
/// content type. Bodies without generators are returned unchanged.
pub fn generate_body(
    registry: &HandlerRegistry,
    body: &Body,
    content_type: Option<ContentType>,
    generators: &Generators,
    category: &str,
    context: &Map<String, Value>,
) -> Result<Body> {
    let body_generators = match generators.category(category) {
        Some(generators) if !generators.is_empty() && body.is_present() => generators,
        _ => return Ok(body.clone()),
    };
    let content_type = match content_type.or_else(|| body.content_type().cloned()) {
        Some(content_type) => content_type,
        None => return Ok(body.clone()),
    };
    registry
        .resolve(&content_type)?
        .generate_contents(body, body_generators, context)
}
