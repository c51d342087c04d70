use crate::{matching::Mismatch, report::Failure};
use hyper::http;
use std::{io, net::SocketAddr, path::PathBuf, sync};
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{}", describe_mismatches(.0))]
    Mismatch(Vec<Mismatch>),
    #[error("no interaction matched request {method} {path}")]
    UnmatchedRequest { method: String, path: String },
    #[error("interaction '{0}' did not receive any matching request")]
    UnfulfilledInteraction(String),
    #[error("no handler for content-type {0}")]
    HandlerResolution(String),
    #[error("content handler '{name}' >= {required} is required, {}", found_version(.found))]
    HandlerVersion {
        name: String,
        required: String,
        found: Option<String>,
    },
    #[error("content handler '{name}' is unavailable: {reason}")]
    HandlerUnavailable { name: String, reason: String },
    #[error("content handler '{name}' failed: {message}")]
    Handler { name: String, message: String },
    #[error("failed to bind mock server to {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("{}", describe_persistence(.index, .message))]
    Persistence {
        index: Option<usize>,
        message: String,
    },
    #[error("pact file {0} would change, refusing to overwrite it")]
    PactChanged(PathBuf),
    #[error("{}", describe_failures(.0))]
    Verification(Vec<Failure>),
    #[error("invalid matching rule at '{path}': {message}")]
    InvalidRule { path: String, message: String },
    #[error("invalid generator: {0}")]
    InvalidGenerator(String),
    #[error("invalid path expression '{expression}': {message}")]
    InvalidPath { expression: String, message: String },
    #[error("invalid content type '{0}'")]
    InvalidContentType(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("IoError: {0}")]
    Io(#[from] io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("Hyper error: {0}")]
    Hyper(#[from] hyper::Error),
    #[error("Http Error: {0}")]
    Http(#[from] http::Error),
    #[error("Invalid header name")]
    InvalidHeaderName(#[from] hyper::header::InvalidHeaderName),
    #[error("Invalid header value")]
    InvalidHeaderValue(#[from] hyper::header::InvalidHeaderValue),
    #[error("Parse URI Error: {0}")]
    InvalidUri(#[from] http::uri::InvalidUri),
    #[error("The lock was poisoned")]
    PoisonedLock,
}

impl Error {
    pub(crate) fn persistence<S: Into<String>>(index: Option<usize>, message: S) -> Self {
        Error::Persistence {
            index,
            message: message.into(),
        }
    }

    pub(crate) fn handler<N: Into<String>, M: ToString>(name: N, message: M) -> Self {
        Error::Handler {
            name: name.into(),
            message: message.to_string(),
        }
    }

    /// Failures that are collected and reported at teardown rather than
    /// aborting the test immediately.
    pub fn is_aggregated(&self) -> bool {
        matches!(
            self,
            Error::Mismatch(_)
                | Error::UnmatchedRequest { .. }
                | Error::UnfulfilledInteraction(_)
                | Error::Verification(_)
        )
    }
}

impl<T> From<sync::PoisonError<T>> for Error {
    fn from(_: sync::PoisonError<T>) -> Self {
        Error::PoisonedLock
    }
}

fn found_version(found: &Option<String>) -> String {
    match found {
        Some(version) => format!("found version {}", version),
        None => "but it is not registered".into(),
    }
}

fn describe_persistence(index: &Option<usize>, message: &str) -> String {
    match index {
        Some(index) => format!("invalid pact document at interaction {}: {}", index, message),
        None => format!("invalid pact document: {}", message),
    }
}

fn describe_mismatches(mismatches: &[Mismatch]) -> String {
    let lines: Vec<String> = mismatches.iter().map(|m| format!("  {}", m)).collect();
    format!("{} mismatch(es):\n{}", mismatches.len(), lines.join("\n"))
}

fn describe_failures(failures: &[Failure]) -> String {
    let lines: Vec<String> = failures
        .iter()
        .enumerate()
        .map(|(number, failure)| format!("{}) {}", number + 1, failure))
        .collect();
    format!(
        "verification failed with {} failure(s):\n{}",
        failures.len(),
        lines.join("\n")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matching::MismatchKind;
    use serde_json::json;

    #[test]
    fn persistence_error_names_the_interaction_index() {
        let error = Error::persistence(Some(3), "missing description");
        assert_eq!(
            error.to_string(),
            "invalid pact document at interaction 3: missing description"
        );
    }

    #[test]
    fn handler_version_error_names_handler_and_minimum() {
        let error = Error::HandlerVersion {
            name: "csv".into(),
            required: "2.0.0".into(),
            found: Some("1.4.0".into()),
        };
        let message = error.to_string();
        assert!(message.contains("'csv'"));
        assert!(message.contains(">= 2.0.0"));
        assert!(message.contains("1.4.0"));
    }

    #[test]
    fn mismatch_errors_are_aggregated() {
        let error = Error::Mismatch(vec![Mismatch::new(
            "$.length",
            MismatchKind::Rule("number".into()),
            json!(3),
            json!("x"),
            "Expected 'x' to be a number",
        )]);
        assert!(error.is_aggregated());
        assert!(error.to_string().contains("$.length"));
        assert!(!Error::HandlerResolution("text/x".into()).is_aggregated());
    }
}
