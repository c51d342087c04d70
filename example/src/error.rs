use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("A rectangle of {0} by {1} has no area")]
    InvalidDimensions(f64, f64),
    #[error("Report '{0}' does not exist")]
    ReportNotFound(String),
    #[error("{0}")]
    ReqwestError(#[from] reqwest::Error),
    #[error("{0}")]
    CsvError(#[from] csv::Error),
}
