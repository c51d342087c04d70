use crate::{
    content::{
        plugin::{self, PluginConfig},
        ContentHandler, CsvHandler, JsonHandler, TextHandler,
    },
    content_type::ContentType,
    error::{Error, Result},
};
use once_cell::sync::OnceCell;
use std::sync::Arc;
use tracing::{debug, info, warn};

static GLOBAL_REGISTRY: OnceCell<Arc<HandlerRegistry>> = OnceCell::new();

/// Content handlers keyed by the content types they serve. A registry is
/// assembled once and then only read, so lookups take no locks.
#[derive(Debug, Clone, Default)]
pub struct HandlerRegistry {
    handlers: Vec<Arc<dyn ContentHandler>>,
}

impl HandlerRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// The built-in JSON, CSV and plain text handlers.
    pub fn with_defaults() -> Self {
        Self::empty()
            .register(JsonHandler)
            .register(CsvHandler)
            .register(TextHandler)
    }

    /// Built-in handlers plus every plugin found in the plugin directory.
    pub fn with_plugins(config: &PluginConfig) -> Self {
        let mut registry = Self::with_defaults();
        match plugin::discover(config) {
            Ok(handlers) => {
                for handler in handlers {
                    info!(
                        plugin = handler.name(),
                        version = %handler.version(),
                        "Registered plugin content handler"
                    );
                    registry = registry.register_arc(Arc::new(handler));
                }
            }
            Err(error) => warn!(dir = %config.dir().display(), %error, "Could not load plugins"),
        }
        registry
    }

    pub fn register<H: ContentHandler + 'static>(self, handler: H) -> Self {
        self.register_arc(Arc::new(handler))
    }

    pub fn register_arc(mut self, handler: Arc<dyn ContentHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    pub fn handlers(&self) -> impl Iterator<Item = &Arc<dyn ContentHandler>> {
        self.handlers.iter()
    }

    /// The handler for a content type. Handlers registered later take
    /// precedence; a fallback handler is used only if nothing handles the
    /// type directly.
    pub fn resolve(&self, content_type: &ContentType) -> Result<Arc<dyn ContentHandler>> {
        let direct = self
            .handlers
            .iter()
            .rev()
            .find(|handler| handler.handles(content_type));
        let handler = direct.or_else(|| {
            self.handlers
                .iter()
                .rev()
                .find(|handler| handler.is_fallback_for(content_type))
        });

        match handler {
            Some(handler) => {
                debug!(content_type = %content_type, handler = handler.name(), "Resolved content handler");
                Ok(handler.clone())
            }
            None => Err(Error::HandlerResolution(content_type.base_type())),
        }
    }

    pub fn resolve_str(&self, content_type: &str) -> Result<Arc<dyn ContentHandler>> {
        self.resolve(&ContentType::parse(content_type)?)
    }

    /// The newest handler with this name, at least `min_version`.
    pub fn require(&self, name: &str, min_version: &str) -> Result<Arc<dyn ContentHandler>> {
        let required = semver::VersionReq::parse(&format!(">={}", min_version)).map_err(|e| {
            Error::InvalidConfig(format!("invalid version '{}': {}", min_version, e))
        })?;

        let newest = self
            .handlers
            .iter()
            .filter(|handler| handler.name() == name)
            .max_by_key(|handler| handler.version());

        match newest {
            Some(handler) if required.matches(&handler.version()) => Ok(handler.clone()),
            found => Err(Error::HandlerVersion {
                name: name.to_string(),
                required: min_version.to_string(),
                found: found.map(|handler| handler.version().to_string()),
            }),
        }
    }
}

/// Install the process-wide registry. Fails if one is already in use.
pub fn install(registry: HandlerRegistry) -> Result<()> {
    GLOBAL_REGISTRY
        .set(Arc::new(registry))
        .map_err(|_| Error::InvalidConfig("the content handler registry is already installed".into()))
}

/// The process-wide registry, built from the defaults and the plugin
/// directory on first use unless one was installed.
pub fn global() -> Arc<HandlerRegistry> {
    GLOBAL_REGISTRY
        .get_or_init(|| Arc::new(HandlerRegistry::with_plugins(&PluginConfig::from_env())))
        .clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_built_in_handlers() {
        let registry = HandlerRegistry::with_defaults();
        assert_eq!(registry.resolve_str("application/json").unwrap().name(), "json");
        assert_eq!(registry.resolve_str("application/hal+json").unwrap().name(), "json");
        assert_eq!(registry.resolve_str("text/csv; charset=UTF-8").unwrap().name(), "csv");
        assert_eq!(registry.resolve_str("text/plain").unwrap().name(), "text");
    }

    #[test]
    fn text_falls_back_only_for_text_types() {
        let registry = HandlerRegistry::with_defaults();
        assert_eq!(registry.resolve_str("text/markdown").unwrap().name(), "text");

        let error = registry.resolve_str("application/x-unregistered").unwrap_err();
        assert!(matches!(error, Error::HandlerResolution(_)));
        assert_eq!(
            error.to_string(),
            "no handler for content-type application/x-unregistered"
        );
    }

    #[test]
    fn require_names_the_missing_version() {
        let registry = HandlerRegistry::with_defaults();
        assert!(registry.require("csv", "0.1.0").is_ok());

        let error = registry.require("csv", "99.0.0").unwrap_err();
        assert!(matches!(error, Error::HandlerVersion { ref found, .. } if found.is_some()));

        let error = registry.require("protobuf", "0.3.0").unwrap_err();
        let message = error.to_string();
        assert!(message.contains("protobuf"));
        assert!(message.contains("0.3.0"));
    }
}
