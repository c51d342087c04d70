mod area;
mod report_row;

pub use area::{Area, Rectangle};
pub use report_row::ReportRow;
