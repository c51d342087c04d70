use super::{RequestBuilder, ResponseBuilder};
use crate::{
    content::HandlerRegistry,
    error::{Error, Result},
    model::{Interaction, ProviderState},
};
use serde_json::Value;

/// Provider states shared by the HTTP and message builders.
pub(super) fn state_with_params(name: &str, params: Value) -> Result<ProviderState> {
    match params {
        Value::Object(params) => Ok(ProviderState::with_params(name, params)),
        Value::Null => Ok(ProviderState::new(name)),
        other => Err(Error::InvalidConfig(format!(
            "provider state '{}' parameters must be an object, got {}",
            name, other
        ))),
    }
}

#[derive(Debug, Clone)]
pub struct InteractionBuilder {
    description: String,
    states: Vec<(String, Value)>,
    single_use: bool,
    comments: Vec<String>,
    request: RequestBuilder,
    response: ResponseBuilder,
}

impl InteractionBuilder {
    pub fn new<S: Into<String>>(description: S) -> Self {
        Self {
            description: description.into(),
            states: vec![],
            single_use: false,
            comments: vec![],
            request: RequestBuilder::default(),
            response: ResponseBuilder::default(),
        }
    }

    pub fn given<S: Into<String>>(mut self, state: S) -> Self {
        self.states.push((state.into(), Value::Null));
        self
    }

    /// A provider state with parameters, available to `fromProviderState`
    /// values on replay.
    pub fn given_with_params<S: Into<String>>(mut self, state: S, params: Value) -> Self {
        self.states.push((state.into(), params));
        self
    }

    /// The interaction may be matched by one request only.
    pub fn single_use(mut self) -> Self {
        self.single_use = true;
        self
    }

    pub fn comment<S: Into<String>>(mut self, comment: S) -> Self {
        self.comments.push(comment.into());
        self
    }

    pub fn request(mut self, request: RequestBuilder) -> Self {
        self.request = request;
        self
    }

    pub fn response(mut self, response: ResponseBuilder) -> Self {
        self.response = response;
        self
    }

    pub fn build(self, registry: &HandlerRegistry) -> Result<Interaction> {
        let mut interaction = Interaction::http(
            self.description,
            self.request.build(registry)?,
            self.response.build(registry)?,
        );
        interaction.provider_states = self
            .states
            .into_iter()
            .map(|(name, params)| state_with_params(&name, params))
            .collect::<Result<_>>()?;
        interaction.single_use = self.single_use;
        interaction.comments = self.comments;
        Ok(interaction)
    }
}
