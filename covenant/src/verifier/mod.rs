//! Replaying a pact against a real provider.
//!
//! Every interaction is verified, and failures are collected into one
//! [`VerificationReport`] instead of stopping at the first.

mod client;
pub mod filters;

pub use client::{HyperProviderClient, ProviderClient};
pub use filters::{FiltersBuilder, RequestFilter, ResponseFilter};

use crate::{
    content::{self, HandlerRegistry},
    error::{Error, Result},
    generators::generate_request,
    matching::{match_message, match_response, MatchingConfig},
    model::{HttpRequest, HttpResponse, Interaction, InteractionContents, Message, Pact, ProviderState},
    report::{Failure, VerificationReport},
};
use regex::Regex;
use serde_json::{Map, Value};
use std::{
    env,
    fmt::{self, Debug},
    sync::Arc,
    time::Duration,
};
use tracing::{debug, info, info_span, warn, Instrument};

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// The provider under verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderInfo {
    name: String,
    base_url: String,
}

impl ProviderInfo {
    pub fn new<N: Into<String>, U: AsRef<str>>(name: N, base_url: U) -> Result<Self> {
        let base_url = base_url.as_ref();
        let parsed = url::Url::parse(base_url)
            .map_err(|e| Error::InvalidConfig(format!("invalid provider URL '{}': {}", base_url, e)))?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(Error::InvalidConfig(format!(
                "provider URL '{}' must use http or https",
                base_url
            )));
        }
        Ok(Self {
            name: name.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

/// Puts the provider into the state an interaction expects.
pub trait StateChange: Send + Sync {
    /// Returns values made available to `fromProviderState` expressions.
    fn set_up(&self, state: &ProviderState) -> Result<Map<String, Value>>;

    fn tear_down(&self, _state: &ProviderState) -> Result<()> {
        Ok(())
    }
}

impl<F> StateChange for F
where
    F: Fn(&ProviderState) -> Result<Map<String, Value>> + Send + Sync,
{
    fn set_up(&self, state: &ProviderState) -> Result<Map<String, Value>> {
        self(state)
    }
}

/// Produces the message a message interaction describes.
pub trait MessageProducer: Send + Sync {
    fn produce(&self, description: &str, states: &[ProviderState]) -> Result<Message>;
}

impl<F> MessageProducer for F
where
    F: Fn(&str, &[ProviderState]) -> Result<Message> + Send + Sync,
{
    fn produce(&self, description: &str, states: &[ProviderState]) -> Result<Message> {
        self(description, states)
    }
}

pub struct VerificationOptions {
    request_timeout: Duration,
    state_change: Option<Arc<dyn StateChange>>,
    message_producer: Option<Arc<dyn MessageProducer>>,
    http_client: Option<Arc<dyn ProviderClient>>,
    registry: Option<Arc<HandlerRegistry>>,
    matching: MatchingConfig,
    request_filters: Vec<RequestFilter>,
    response_filters: Vec<ResponseFilter>,
    description_filter: Option<Regex>,
    state_filter: Option<Regex>,
}

impl Default for VerificationOptions {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            state_change: None,
            message_producer: None,
            http_client: None,
            registry: None,
            matching: MatchingConfig::default(),
            request_filters: Vec::new(),
            response_filters: Vec::new(),
            description_filter: None,
            state_filter: None,
        }
    }
}

impl Debug for VerificationOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerificationOptions")
            .field("request_timeout", &self.request_timeout)
            .field("state_change", &self.state_change.is_some())
            .field("message_producer", &self.message_producer.is_some())
            .field("http_client", &self.http_client)
            .field("matching", &self.matching)
            .field("request_filters", &self.request_filters)
            .field("response_filters", &self.response_filters)
            .field("description_filter", &self.description_filter)
            .field("state_filter", &self.state_filter)
            .finish()
    }
}

impl VerificationOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults with interaction filters from `COVENANT_FILTER_DESCRIPTION`
    /// and `COVENANT_FILTER_STATE`.
    pub fn from_env() -> Result<Self> {
        let mut options = Self::default();
        if let Ok(pattern) = env::var("COVENANT_FILTER_DESCRIPTION") {
            options.set_description_filter(&pattern)?;
        }
        if let Ok(pattern) = env::var("COVENANT_FILTER_STATE") {
            options.set_state_filter(&pattern)?;
        }
        Ok(options)
    }

    pub fn set_request_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.request_timeout = timeout;
        self
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    pub fn set_state_change<S: StateChange + 'static>(&mut self, state_change: S) -> &mut Self {
        self.state_change = Some(Arc::new(state_change));
        self
    }

    pub fn set_message_producer<P: MessageProducer + 'static>(&mut self, producer: P) -> &mut Self {
        self.message_producer = Some(Arc::new(producer));
        self
    }

    pub fn set_http_client(&mut self, http_client: Arc<dyn ProviderClient>) -> &mut Self {
        self.http_client = Some(http_client);
        self
    }

    pub fn http_client(&self) -> Arc<dyn ProviderClient> {
        self.http_client
            .clone()
            .unwrap_or_else(|| Arc::new(HyperProviderClient::new()))
    }

    pub fn set_registry(&mut self, registry: Arc<HandlerRegistry>) -> &mut Self {
        self.registry = Some(registry);
        self
    }

    pub fn registry(&self) -> Arc<HandlerRegistry> {
        self.registry.clone().unwrap_or_else(content::global)
    }

    pub fn set_matching(&mut self, matching: MatchingConfig) -> &mut Self {
        self.matching = matching;
        self
    }

    /// Only verify interactions whose description matches `pattern`.
    pub fn set_description_filter(&mut self, pattern: &str) -> Result<&mut Self> {
        self.description_filter = Some(filter_regex(pattern)?);
        Ok(self)
    }

    /// Only verify interactions with a provider state matching `pattern`.
    pub fn set_state_filter(&mut self, pattern: &str) -> Result<&mut Self> {
        self.state_filter = Some(filter_regex(pattern)?);
        Ok(self)
    }

    pub fn add_request_filters<F: FnOnce(&mut FiltersBuilder) -> &mut FiltersBuilder>(&mut self, func: F) -> &mut Self {
        let mut filters = FiltersBuilder::new();
        let _ = func(&mut filters);
        self.request_filters.extend(filters.into_request_filters());
        self
    }

    pub fn add_response_filters<F: FnOnce(&mut FiltersBuilder) -> &mut FiltersBuilder>(&mut self, func: F) -> &mut Self {
        let mut filters = FiltersBuilder::new();
        let _ = func(&mut filters);
        self.response_filters.extend(filters.into_response_filters());
        self
    }

    fn selects(&self, interaction: &Interaction) -> bool {
        let description = self
            .description_filter
            .as_ref()
            .map_or(true, |filter| filter.is_match(&interaction.description));
        let state = self.state_filter.as_ref().map_or(true, |filter| {
            interaction
                .provider_states
                .iter()
                .any(|state| filter.is_match(&state.name))
        });
        description && state
    }
}

fn filter_regex(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| Error::InvalidConfig(format!("invalid filter '{}': {}", pattern, e)))
}

/// Verify every selected interaction of `pact` against `provider`.
pub async fn verify_provider(pact: &Pact, provider: &ProviderInfo, options: &VerificationOptions) -> VerificationReport {
    let registry = options.registry();
    let client = options.http_client();
    let mut report = VerificationReport {
        provider: provider.name().to_string(),
        ..VerificationReport::default()
    };

    for interaction in pact.interactions.iter().filter(|i| options.selects(i)) {
        let span = info_span!("verify_interaction", description = %interaction.description);
        let outcome = verify_interaction(interaction, provider, options, &registry, client.as_ref())
            .instrument(span)
            .await;
        match outcome {
            Ok(()) => {
                info!(description = %interaction.description, "Interaction verified");
                report.verified.push(interaction.description.clone());
            }
            Err(failure) => {
                warn!(%failure, "Interaction failed verification");
                report.failures.push(failure);
            }
        }
    }

    info!(
        provider = provider.name(),
        verified = report.verified.len(),
        failed = report.failures.len(),
        "Verification finished"
    );
    report
}

/// [`verify_provider`] on a runtime of its own.
pub fn verify_provider_blocking(
    pact: &Pact,
    provider: &ProviderInfo,
    options: &VerificationOptions,
) -> Result<VerificationReport> {
    let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
    Ok(runtime.block_on(verify_provider(pact, provider, options)))
}

async fn verify_interaction(
    interaction: &Interaction,
    provider: &ProviderInfo,
    options: &VerificationOptions,
    registry: &HandlerRegistry,
    client: &dyn ProviderClient,
) -> std::result::Result<(), Failure> {
    let errored = |message: String| Failure::InteractionError {
        description: interaction.description.clone(),
        message,
    };

    let context = set_up_states(interaction, options).map_err(|e| errored(e.to_string()))?;
    let result = match &interaction.contents {
        InteractionContents::Http { request, response } => {
            verify_http(request, response, &context, provider, options, registry, client).await
        }
        InteractionContents::Message(message) => verify_message(interaction, message, options, registry),
    };
    tear_down_states(interaction, options);

    let mismatches = result.map_err(|e| errored(e.to_string()))?;
    if mismatches.is_empty() {
        Ok(())
    } else {
        Err(Failure::InteractionMismatch {
            description: interaction.description.clone(),
            mismatches,
        })
    }
}

fn set_up_states(interaction: &Interaction, options: &VerificationOptions) -> Result<Map<String, Value>> {
    let mut context = Map::new();
    for state in &interaction.provider_states {
        context.extend(state.params.clone());
        if let Some(state_change) = &options.state_change {
            debug!(state = %state.name, "Setting up provider state");
            let values = state_change.set_up(state).map_err(|e| {
                Error::InvalidConfig(format!("provider state '{}' could not be set up: {}", state.name, e))
            })?;
            context.extend(values);
        }
    }
    Ok(context)
}

fn tear_down_states(interaction: &Interaction, options: &VerificationOptions) {
    if let Some(state_change) = &options.state_change {
        for state in interaction.provider_states.iter().rev() {
            if let Err(e) = state_change.tear_down(state) {
                warn!(state = %state.name, "Provider state tear down failed: {}", e);
            }
        }
    }
}

async fn verify_http(
    expected_request: &HttpRequest,
    expected_response: &HttpResponse,
    context: &Map<String, Value>,
    provider: &ProviderInfo,
    options: &VerificationOptions,
    registry: &HandlerRegistry,
    client: &dyn ProviderClient,
) -> Result<Vec<crate::matching::Mismatch>> {
    let mut request = generate_request(expected_request, registry, context)?;
    for filter in &options.request_filters {
        filter.apply(&mut request);
    }

    let mut response = tokio::time::timeout(options.request_timeout, client.send(provider.base_url(), &request))
        .await
        .map_err(|_| {
            Error::Transport(format!(
                "the provider did not answer within {}ms",
                options.request_timeout.as_millis()
            ))
        })??;
    for filter in &options.response_filters {
        filter.apply(&mut response);
    }
    debug!(status = response.status, "Provider responded");

    Ok(match_response(expected_response, &response, registry, options.matching)?.into_mismatches())
}

fn verify_message(
    interaction: &Interaction,
    expected: &Message,
    options: &VerificationOptions,
    registry: &HandlerRegistry,
) -> Result<Vec<crate::matching::Mismatch>> {
    let producer = options
        .message_producer
        .as_ref()
        .ok_or_else(|| Error::InvalidConfig("no message producer is configured".into()))?;
    let actual = producer.produce(&interaction.description, &interaction.provider_states)?;
    Ok(match_message(expected, &actual, registry, options.matching)?.into_mismatches())
}
