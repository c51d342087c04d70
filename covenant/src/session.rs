use crate::{
    error::Result,
    generators::GENERATOR_BODY,
    content,
    mock::{MockServer, MockServerConfig},
    model::{provider_state::merged_params, Message, Pact},
    persistence,
    report::{self, Failure},
};
use std::{
    panic::{self, AssertUnwindSafe},
    path::PathBuf,
};
use tracing::{error, info, warn};

/// One consumer test: a mock server for a pact, the code under test, and the
/// pact file written when everything matched.
#[derive(Debug)]
pub struct ContractTest {
    pact: Pact,
    config: MockServerConfig,
}

impl ContractTest {
    pub fn new(pact: Pact, config: MockServerConfig) -> Self {
        Self { pact, config }
    }

    /// Run `test` against a mock server for the pact's HTTP interactions.
    ///
    /// A panic in `test` stops the server and is resumed without writing the
    /// pact. Otherwise every mismatch, unexpected request and unmatched
    /// interaction fails the run.
    pub fn run<F, R>(mut self, test: F) -> Result<R>
    where
        F: FnOnce(&MockServer) -> R,
    {
        let mock = MockServer::for_pact(&self.pact, self.config.clone())?;
        info!(
            consumer = %self.pact.consumer.name,
            provider = %self.pact.provider.name,
            url = %mock.url(),
            "Running contract test"
        );

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| test(&mock)));
        let verification = mock.stop();

        let value = match outcome {
            Ok(value) => value,
            Err(panic) => {
                if let Err(e) = verification {
                    warn!("Contract test panicked; the mock server also reported: {}", e);
                }
                panic::resume_unwind(panic);
            }
        };
        if let Err(e) = verification {
            if e.is_aggregated() {
                warn!(consumer = %self.pact.consumer.name, "Contract test failed: {}", e);
            } else {
                error!(consumer = %self.pact.consumer.name, "Mock server failed: {}", e);
            }
            return Err(e);
        }

        self.write()?;
        Ok(value)
    }

    /// Hand every message of the pact to `consumer`, writing the pact if it
    /// accepted them all.
    pub fn verify_messages<F>(mut self, mut consumer: F) -> Result<()>
    where
        F: FnMut(&Message) -> Result<()>,
    {
        let registry = self.config.registry();
        let mut failures = vec![];

        for interaction in &self.pact.interactions {
            let message = match interaction.as_message() {
                Some(message) => message,
                None => continue,
            };
            let context = merged_params(&interaction.provider_states);
            let delivered = content::generate_body(
                &registry,
                &message.contents,
                message.content_type(),
                &message.generators,
                GENERATOR_BODY,
                &context,
            )
            .map(|contents| Message {
                contents,
                ..message.clone()
            })
            .and_then(|generated| consumer(&generated));

            if let Err(e) = delivered {
                warn!(description = %interaction.description, "Message consumer failed: {}", e);
                failures.push(Failure::InteractionError {
                    description: interaction.description.clone(),
                    message: e.to_string(),
                });
            }
        }

        report::into_result(failures)?;
        self.write()?;
        Ok(())
    }

    fn write(&mut self) -> Result<PathBuf> {
        self.pact.spec_version = self.config.spec_version();
        let path = persistence::write_pact(&self.pact, self.config.output_dir(), self.config.write_mode())?;
        info!(path = %path.display(), "Contract test passed");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        builder::{matchers, InteractionBuilder, MessageBuilder, PactBuilder, RequestBuilder, ResponseBuilder},
        content::HandlerRegistry,
        error::Error,
    };
    use serde_json::json;
    use std::{io::Read, net::TcpStream, sync::Arc};

    fn config(dir: &std::path::Path) -> MockServerConfig {
        let mut config = MockServerConfig::new();
        config
            .set_registry(Arc::new(HandlerRegistry::with_defaults()))
            .set_output_dir(dir);
        config
    }

    fn report_pact() -> Pact {
        PactBuilder::new("ReportClient", "ReportService")
            .registry(Arc::new(HandlerRegistry::with_defaults()))
            .interaction(
                InteractionBuilder::new("a request for the status")
                    .request(RequestBuilder::new().path("/status"))
                    .response(ResponseBuilder::new().json_body(json!({"up": matchers::boolean(true)}))),
            )
            .build()
            .unwrap()
    }

    fn get(url: &str) -> String {
        let address = url.trim_start_matches("http://");
        let (host, path) = address.split_at(address.find('/').unwrap_or(address.len()));
        let mut stream = TcpStream::connect(host).unwrap();
        std::io::Write::write_all(
            &mut stream,
            format!("GET {} HTTP/1.1\r\nHost: {}\r\nConnection: close\r\n\r\n", path, host).as_bytes(),
        )
        .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).unwrap();
        response
    }

    #[test]
    fn passing_test_writes_the_pact() {
        let dir = tempfile::tempdir().unwrap();
        let answer = ContractTest::new(report_pact(), config(dir.path()))
            .run(|mock| get(&mock.path("/status")))
            .unwrap();

        assert!(answer.starts_with("HTTP/1.1 200"));
        assert!(dir.path().join("ReportClient-ReportService.json").is_file());
    }

    #[test]
    fn unfulfilled_interactions_fail_without_writing() {
        let dir = tempfile::tempdir().unwrap();
        let error = ContractTest::new(report_pact(), config(dir.path()))
            .run(|_| ())
            .unwrap_err();

        assert!(matches!(error, Error::Verification(ref failures) if failures.len() == 1));
        assert!(!dir.path().join("ReportClient-ReportService.json").exists());
    }

    #[test]
    fn panics_are_resumed() {
        let dir = tempfile::tempdir().unwrap();
        let result = panic::catch_unwind(|| {
            let _ = ContractTest::new(report_pact(), config(dir.path())).run(|_| panic!("client failed"));
        });

        assert!(result.is_err());
        assert!(!dir.path().join("ReportClient-ReportService.json").exists());
    }

    #[test]
    fn messages_reach_the_consumer() {
        let dir = tempfile::tempdir().unwrap();
        let pact = PactBuilder::new("ReportClient", "ReportEvents")
            .registry(Arc::new(HandlerRegistry::with_defaults()))
            .message(
                MessageBuilder::new("a report was created")
                    .given_with_params("a report exists", json!({"name": "report7"}))
                    .json_contents(json!({"name": matchers::from_provider_state("${name}", "report1")})),
            )
            .build()
            .unwrap();

        let mut received = vec![];
        ContractTest::new(pact, config(dir.path()))
            .verify_messages(|message| {
                received.push(message.contents.as_json().unwrap()?);
                Ok(())
            })
            .unwrap();

        assert_eq!(received, vec![json!({"name": "report7"})]);
        assert!(dir.path().join("ReportClient-ReportEvents.json").is_file());
    }
}
