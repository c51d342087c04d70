mod data;
mod error;
mod shape_report_client;

pub use data::{Area, Rectangle, ReportRow};
pub use error::Error;
pub use shape_report_client::{ShapeReportClient, ShapeReportClientBuilder};
