use serde::Deserialize;

/// One line of a report: who, how many, and when.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct ReportRow {
    pub name: String,
    pub count: u32,
    pub date: String,
}
