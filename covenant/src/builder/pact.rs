use super::{InteractionBuilder, MessageBuilder};
use crate::{
    content::{self, HandlerRegistry},
    error::Result,
    model::{Pact, PactSpecVersion},
};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone)]
enum Pending {
    Http(InteractionBuilder),
    Message(MessageBuilder),
}

/// Collects interactions for one consumer and provider pair.
#[derive(Debug, Clone)]
pub struct PactBuilder {
    consumer: String,
    provider: String,
    spec_version: PactSpecVersion,
    registry: Option<Arc<HandlerRegistry>>,
    required: Vec<(String, String)>,
    pending: Vec<Pending>,
}

impl PactBuilder {
    pub fn new<C: Into<String>, P: Into<String>>(consumer: C, provider: P) -> Self {
        Self {
            consumer: consumer.into(),
            provider: provider.into(),
            spec_version: PactSpecVersion::V4,
            registry: None,
            required: vec![],
            pending: vec![],
        }
    }

    /// Content handlers to configure bodies with. Defaults to the global
    /// registry.
    pub fn registry(mut self, registry: Arc<HandlerRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn spec_version(mut self, version: PactSpecVersion) -> Self {
        self.spec_version = version;
        self
    }

    /// Fail the build unless a handler `name` of at least `min_version`
    /// is registered.
    pub fn require_handler<N: Into<String>, V: Into<String>>(mut self, name: N, min_version: V) -> Self {
        self.required.push((name.into(), min_version.into()));
        self
    }

    pub fn interaction(mut self, interaction: InteractionBuilder) -> Self {
        self.pending.push(Pending::Http(interaction));
        self
    }

    pub fn message(mut self, message: MessageBuilder) -> Self {
        self.pending.push(Pending::Message(message));
        self
    }

    pub fn build(self) -> Result<Pact> {
        let registry = self.registry.unwrap_or_else(content::global);
        for (name, min_version) in &self.required {
            registry.require(name, min_version)?;
        }

        let mut pact = Pact::new(self.consumer, self.provider);
        pact.spec_version = self.spec_version;
        for pending in self.pending {
            let interaction = match pending {
                Pending::Http(builder) => builder.build(&registry)?,
                Pending::Message(builder) => builder.build(&registry)?,
            };
            debug!(description = %interaction.description, "Built interaction");
            pact.add_interaction(interaction);
        }
        Ok(pact)
    }
}
