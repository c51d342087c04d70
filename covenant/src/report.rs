//! Failures collected while a mock server runs or a provider is verified.
//!
//! Mismatches are gathered for the whole run and reported together at
//! teardown, so a single run surfaces every discrepancy.

use crate::{
    error::{Error, Result},
    matching::Mismatch,
};
use serde::Serialize;
use std::fmt::{self, Display};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Failure {
    /// A request arrived that no registered interaction accepted.
    #[serde(rename_all = "camelCase")]
    UnmatchedRequest {
        method: String,
        path: String,
        /// Mismatches against the closest candidate, if any shared the
        /// method and path.
        closest: Option<String>,
        mismatches: Vec<Mismatch>,
    },
    /// An interaction that never received a matching request.
    UnfulfilledInteraction { description: String },
    /// A provider response (or message) did not satisfy the interaction.
    InteractionMismatch {
        description: String,
        mismatches: Vec<Mismatch>,
    },
    /// Verifying the interaction could not complete.
    InteractionError { description: String, message: String },
}

impl Failure {
    pub fn description(&self) -> Option<&str> {
        match self {
            Failure::UnmatchedRequest { .. } => None,
            Failure::UnfulfilledInteraction { description }
            | Failure::InteractionMismatch { description, .. }
            | Failure::InteractionError { description, .. } => Some(description),
        }
    }

    pub fn mismatches(&self) -> &[Mismatch] {
        match self {
            Failure::UnmatchedRequest { mismatches, .. }
            | Failure::InteractionMismatch { mismatches, .. } => mismatches,
            _ => &[],
        }
    }

    /// The error a single failure corresponds to.
    pub fn to_error(&self) -> Error {
        match self {
            Failure::UnmatchedRequest { method, path, .. } => Error::UnmatchedRequest {
                method: method.clone(),
                path: path.clone(),
            },
            Failure::UnfulfilledInteraction { description } => {
                Error::UnfulfilledInteraction(description.clone())
            }
            Failure::InteractionMismatch { mismatches, .. } => Error::Mismatch(mismatches.clone()),
            Failure::InteractionError { message, .. } => Error::Transport(message.clone()),
        }
    }
}

impl Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Failure::UnmatchedRequest {
                method,
                path,
                closest,
                mismatches,
            } => {
                write!(f, "Unexpected request {} {}", method, path)?;
                if let Some(closest) = closest {
                    write!(f, " (closest interaction '{}')", closest)?;
                }
                for mismatch in mismatches {
                    write!(f, "\n    {}", mismatch)?;
                }
                Ok(())
            }
            Failure::UnfulfilledInteraction { description } => {
                write!(f, "Interaction '{}' was never matched", description)
            }
            Failure::InteractionMismatch {
                description,
                mismatches,
            } => {
                write!(f, "Interaction '{}' failed", description)?;
                for mismatch in mismatches {
                    write!(f, "\n    {}", mismatch)?;
                }
                Ok(())
            }
            Failure::InteractionError {
                description,
                message,
            } => write!(f, "Interaction '{}' errored: {}", description, message),
        }
    }
}

/// Outcome of verifying every interaction of a pact against a provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationReport {
    pub provider: String,
    /// Descriptions of the interactions that verified.
    pub verified: Vec<String>,
    pub failures: Vec<Failure>,
}

impl VerificationReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn into_result(self) -> Result<()> {
        into_result(self.failures)
    }
}

impl Display for VerificationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Verifying {}: {} passed, {} failed",
            self.provider,
            self.verified.len(),
            self.failures.len()
        )?;
        for failure in &self.failures {
            write!(f, "\n  {}", failure)?;
        }
        Ok(())
    }
}

/// Turn a list of collected failures into a result.
pub fn into_result(failures: Vec<Failure>) -> Result<()> {
    if failures.is_empty() {
        Ok(())
    } else {
        Err(Error::Verification(failures))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_failures_are_ok() {
        assert!(into_result(vec![]).is_ok());
    }

    #[test]
    fn failures_are_reported_together() {
        let result = into_result(vec![
            Failure::UnfulfilledInteraction {
                description: "a request for a report".into(),
            },
            Failure::UnmatchedRequest {
                method: "GET".into(),
                path: "/missing".into(),
                closest: None,
                mismatches: vec![],
            },
        ]);

        let message = result.unwrap_err().to_string();
        assert!(message.contains("2 failure(s)"));
        assert!(message.contains("a request for a report"));
        assert!(message.contains("GET /missing"));
    }

    #[test]
    fn failure_maps_to_taxonomy_error() {
        let failure = Failure::UnfulfilledInteraction {
            description: "x".into(),
        };
        assert!(matches!(
            failure.to_error(),
            Error::UnfulfilledInteraction(ref d) if d == "x"
        ));
    }
}
