use super::MockServerConfig;
use crate::{
    content::HandlerRegistry,
    error::Result,
    generators::generate_response,
    matching::{match_request, Mismatch},
    model::{provider_state::merged_params, HttpRequest, HttpResponse, Interaction},
    report::Failure,
};
use tracing::{debug, warn};

#[derive(Debug)]
struct Registered {
    interaction: Interaction,
    matches: usize,
}

/// What a mock server answers a request with.
#[derive(Debug)]
pub(crate) enum Outcome {
    Respond {
        description: String,
        response: HttpResponse,
    },
    Unmatched(Failure),
    Error(String),
}

/// Interactions of one mock server and what happened to them.
#[derive(Debug)]
pub(crate) struct MockState {
    interactions: Vec<Registered>,
    failures: Vec<Failure>,
    observed: Vec<HttpRequest>,
}

impl MockState {
    pub(crate) fn new<I: IntoIterator<Item = Interaction>>(interactions: I) -> Self {
        Self {
            interactions: interactions
                .into_iter()
                .filter(Interaction::is_http)
                .map(|interaction| Registered {
                    interaction,
                    matches: 0,
                })
                .collect(),
            failures: vec![],
            observed: vec![],
        }
    }

    pub(crate) fn handle(
        &mut self,
        request: HttpRequest,
        config: &MockServerConfig,
        registry: &HandlerRegistry,
    ) -> Outcome {
        let selection = self.select(&request, config, registry);
        self.observed.push(request);

        let index = match selection {
            Ok(Ok(index)) => index,
            Ok(Err(failure)) => {
                warn!(%failure, "Request did not match any interaction");
                self.failures.push(failure.clone());
                return Outcome::Unmatched(failure);
            }
            Err(error) => return self.error(None, error.to_string()),
        };

        let entry = &mut self.interactions[index];
        entry.matches += 1;
        let description = entry.interaction.description.clone();
        let context = merged_params(&entry.interaction.provider_states);
        let response = match entry.interaction.response() {
            Some(response) => generate_response(response, registry, &context),
            None => return self.error(Some(description), "not an HTTP interaction".into()),
        };

        match response {
            Ok(response) => Outcome::Respond {
                description,
                response,
            },
            Err(error) => self.error(Some(description), error.to_string()),
        }
    }

    fn error(&mut self, description: Option<String>, message: String) -> Outcome {
        warn!(?description, %message, "Mock server could not answer the request");
        self.failures.push(Failure::InteractionError {
            description: description.unwrap_or_else(|| "request matching".into()),
            message: message.clone(),
        });
        Outcome::Error(message)
    }

    /// The index of the interaction that answers `request`, or the failure
    /// to report. Full matches rank by provider states (all active, then
    /// stateless, then inactive) and then by declaration order.
    fn select(
        &self,
        request: &HttpRequest,
        config: &MockServerConfig,
        registry: &HandlerRegistry,
    ) -> Result<std::result::Result<usize, Failure>> {
        let mut best: Option<(u8, usize)> = None;
        let mut closest: Option<(usize, Vec<Mismatch>)> = None;

        for (index, entry) in self.interactions.iter().enumerate() {
            if entry.interaction.single_use && entry.matches > 0 {
                continue;
            }
            let expected = match entry.interaction.request() {
                Some(expected) => expected,
                None => continue,
            };

            let result = match_request(expected, request, registry, config.matching())?;
            if result.is_match() {
                let rank = state_rank(&entry.interaction, config);
                debug!(description = %entry.interaction.description, rank, "Interaction matches");
                if best.map_or(true, |(best_rank, _)| rank < best_rank) {
                    best = Some((rank, index));
                }
            } else if result.discriminated
                && closest
                    .as_ref()
                    .map_or(true, |(_, mismatches)| result.mismatches.len() < mismatches.len())
            {
                closest = Some((index, result.mismatches));
            }
        }

        Ok(match best {
            Some((_, index)) => Ok(index),
            None => {
                let (closest, mismatches) = match closest {
                    Some((index, mismatches)) => (
                        Some(self.interactions[index].interaction.description.clone()),
                        mismatches,
                    ),
                    None => (None, vec![]),
                };
                Err(Failure::UnmatchedRequest {
                    method: request.method.clone(),
                    path: request.uri(),
                    closest,
                    mismatches,
                })
            }
        })
    }

    /// Failures so far, plus every interaction that was never matched.
    pub(crate) fn report(&self) -> Vec<Failure> {
        let mut failures = self.failures.clone();
        failures.extend(
            self.interactions
                .iter()
                .filter(|entry| entry.matches == 0)
                .map(|entry| Failure::UnfulfilledInteraction {
                    description: entry.interaction.description.clone(),
                }),
        );
        failures
    }

    pub(crate) fn observed(&self) -> &[HttpRequest] {
        &self.observed
    }

    pub(crate) fn match_count(&self, description: &str) -> usize {
        self.interactions
            .iter()
            .filter(|entry| entry.interaction.description == description)
            .map(|entry| entry.matches)
            .sum()
    }
}

fn state_rank(interaction: &Interaction, config: &MockServerConfig) -> u8 {
    if interaction.provider_states.is_empty() {
        1
    } else if interaction
        .provider_states
        .iter()
        .all(|state| config.is_state_active(&state.name))
    {
        0
    } else {
        2
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Body, ProviderState};
    use serde_json::json;

    fn interaction(description: &str, path: &str, states: &[&str]) -> Interaction {
        let request = HttpRequest {
            path: path.into(),
            ..HttpRequest::default()
        };
        let response = HttpResponse {
            body: Body::json(&json!({ "from": description })),
            ..HttpResponse::default()
        };
        let mut interaction = Interaction::http(description, request, response);
        interaction.provider_states = states.iter().map(|state| ProviderState::new(*state)).collect();
        interaction
    }

    fn get(path: &str) -> HttpRequest {
        HttpRequest {
            path: path.into(),
            ..HttpRequest::default()
        }
    }

    fn answered_by(outcome: Outcome) -> String {
        match outcome {
            Outcome::Respond { description, .. } => description,
            other => panic!("expected a response, got {:?}", other),
        }
    }

    #[test]
    fn earliest_declared_interaction_wins_a_tie() {
        let registry = HandlerRegistry::with_defaults();
        let config = MockServerConfig::new();
        let mut state = MockState::new(vec![
            interaction("first", "/reports", &[]),
            interaction("second", "/reports", &[]),
        ]);

        assert_eq!(answered_by(state.handle(get("/reports"), &config, &registry)), "first");
        assert_eq!(answered_by(state.handle(get("/reports"), &config, &registry)), "first");
        assert_eq!(state.report().len(), 1);
    }

    #[test]
    fn active_states_rank_before_stateless_and_inactive() {
        let registry = HandlerRegistry::with_defaults();
        let mut config = MockServerConfig::new();
        config.set_active_states(["a report exists"]);
        let mut state = MockState::new(vec![
            interaction("inactive", "/reports", &["no reports exist"]),
            interaction("stateless", "/reports", &[]),
            interaction("active", "/reports", &["a report exists"]),
        ]);
        assert_eq!(answered_by(state.handle(get("/reports"), &config, &registry)), "active");

        let mut state = MockState::new(vec![
            interaction("inactive", "/reports", &["no reports exist"]),
            interaction("stateless", "/reports", &[]),
        ]);
        assert_eq!(answered_by(state.handle(get("/reports"), &config, &registry)), "stateless");
    }

    #[test]
    fn single_use_interactions_are_exhausted() {
        let registry = HandlerRegistry::with_defaults();
        let config = MockServerConfig::new();
        let interactions = (0..3).map(|n| {
            let mut interaction = interaction(&format!("report {}", n), "/reports", &[]);
            interaction.single_use = true;
            interaction
        });
        let mut state = MockState::new(interactions);

        for n in 0..3 {
            let description = answered_by(state.handle(get("/reports"), &config, &registry));
            assert_eq!(description, format!("report {}", n));
        }
        assert!(state.report().is_empty());
        assert!(matches!(
            state.handle(get("/reports"), &config, &registry),
            Outcome::Unmatched(_)
        ));
    }

    #[test]
    fn unmatched_requests_name_the_closest_interaction() {
        let registry = HandlerRegistry::with_defaults();
        let config = MockServerConfig::new();
        let mut expected = interaction("a report", "/reports", &[]);
        if let crate::model::InteractionContents::Http { request, .. } = &mut expected.contents {
            request.query.insert("format".into(), vec!["csv".into()]);
        }
        let mut state = MockState::new(vec![expected]);

        let outcome = state.handle(get("/reports"), &config, &registry);
        match outcome {
            Outcome::Unmatched(Failure::UnmatchedRequest {
                closest, mismatches, ..
            }) => {
                assert_eq!(closest.as_deref(), Some("a report"));
                assert_eq!(mismatches.len(), 1);
            }
            other => panic!("expected an unmatched request, got {:?}", other),
        }

        let report = state.report();
        assert_eq!(report.len(), 2);
        assert_eq!(
            report
                .iter()
                .filter(|failure| matches!(failure, Failure::UnmatchedRequest { .. }))
                .count(),
            1
        );
        assert_eq!(state.observed().len(), 1);
    }

    #[test]
    fn responses_use_provider_state_parameters() {
        let registry = HandlerRegistry::with_defaults();
        let config = MockServerConfig::new();
        let mut expected = interaction("a shape", "/shapes/1", &[]);
        expected.provider_states = vec![ProviderState::new("a shape exists").with_param("id", json!(7))];
        if let crate::model::InteractionContents::Http { response, .. } = &mut expected.contents {
            response.body = Body::json(&json!({"id": 1}));
            response.generators.add(
                crate::generators::GENERATOR_BODY,
                crate::path::DocPath::parse("$.id").unwrap(),
                crate::generators::Generator::ProviderState {
                    expression: "${id}".into(),
                    data_type: None,
                },
            );
        }
        let mut state = MockState::new(vec![expected]);

        match state.handle(get("/shapes/1"), &config, &registry) {
            Outcome::Respond { response, .. } => {
                assert_eq!(response.body.as_json().unwrap().unwrap(), json!({"id": 7}))
            }
            other => panic!("expected a response, got {:?}", other),
        }
        assert_eq!(state.match_count("a shape"), 1);
    }
}
