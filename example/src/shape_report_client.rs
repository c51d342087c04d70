use crate::{
    data::{Area, Rectangle, ReportRow},
    error::Error,
};
use reqwest::StatusCode;
type ReqwestClient = reqwest::blocking::Client;

const DEFAULT_DOMAIN_NAME: &str = "http://localhost:8080";

/// Builder used to build a ShapeReportClient instance
#[derive(Debug, Clone, Default)]
pub struct ShapeReportClientBuilder {
    domain_name: Option<String>,
    http_client: Option<ReqwestClient>,
}

impl ShapeReportClientBuilder {
    pub fn new() -> Self {
        Self {
            domain_name: None,
            http_client: None,
        }
    }

    /// Use the given domain name, such as `http://localhost:8080`, when
    /// calling the service.
    pub fn with_domain_name<T: Into<String>>(mut self, domain_name: T) -> Self {
        self.domain_name = Some(domain_name.into());
        self
    }

    /// Use a pre-configured blocking reqwest client.
    pub fn with_http_client(mut self, client: ReqwestClient) -> Self {
        self.http_client = Some(client);
        self
    }

    pub fn build(mut self) -> ShapeReportClient {
        ShapeReportClient {
            http: self.http_client.take().unwrap_or_default(),
            domain_name: self
                .domain_name
                .take()
                .unwrap_or_else(|| String::from(DEFAULT_DOMAIN_NAME)),
        }
    }
}

/// Client of a service that measures shapes and keeps CSV reports.
#[derive(Default, Debug, Clone)]
pub struct ShapeReportClient {
    http: ReqwestClient,
    domain_name: String,
}

impl ShapeReportClient {
    pub fn new() -> Self {
        ShapeReportClientBuilder::new().build()
    }

    /// Asks the service for the area of a rectangle.
    pub fn get_area(&self, rectangle: Rectangle) -> Result<f64, Error> {
        if rectangle.length <= 0.0 || rectangle.width <= 0.0 {
            return Err(Error::InvalidDimensions(rectangle.length, rectangle.width));
        }

        let area: Area = self
            .http
            .post(format!("{}/area", self.domain_name))
            .json(&rectangle)
            .send()?
            .error_for_status()?
            .json()?;

        Ok(area.value)
    }

    /// Downloads a report. Reports are CSV without a header row.
    pub fn get_report<T: AsRef<str>>(&self, name: T) -> Result<Vec<ReportRow>, Error> {
        let url = format!("{}/reports/{}.csv", self.domain_name, name.as_ref());
        let response = self.http.get(&url).header("accept", "text/csv").send()?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(Error::ReportNotFound(name.as_ref().to_string()));
        }
        let text = response.error_for_status()?.text()?;

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .from_reader(text.as_bytes());
        let rows = reader.deserialize().collect::<Result<Vec<ReportRow>, _>>()?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use crate::{Error, Rectangle, ShapeReportClient, ShapeReportClientBuilder};
    use covenant::{
        contract_test, matchers, InteractionBuilder, MockServer, MockServerConfig, Pact, PactBuilder,
        RequestBuilder, ResponseBuilder,
    };
    use serde_json::json;

    fn client(mock: &MockServer) -> ShapeReportClient {
        ShapeReportClientBuilder::new().with_domain_name(mock.url()).build()
    }

    fn area_pact() -> Pact {
        PactBuilder::new("ShapeReportClient", "ShapeService")
            .interaction(
                InteractionBuilder::new("a request for the area of a rectangle")
                    .request(
                        RequestBuilder::new()
                            .post()
                            .path("/area")
                            .json_body(json!({"length": matchers::number(3), "width": matchers::number(4)})),
                    )
                    .response(ResponseBuilder::new().json_body(json!({"value": matchers::number(12)}))),
            )
            .build()
            .unwrap()
    }

    fn report_pact() -> Pact {
        PactBuilder::new("ShapeReportClient", "ShapeService")
            .require_handler("csv", "0.1.0")
            .interaction(
                InteractionBuilder::new("a request for a report")
                    .given("a report exists")
                    .request(RequestBuilder::new().path("/reports/report001.csv").header("accept", "text/csv"))
                    .response(ResponseBuilder::new().contents(
                        "text/csv",
                        json!({
                            "column:1": "matching(type,'Name')",
                            "column:2": "matching(number,100)",
                            "column:3": "matching(datetime, 'yyyy-MM-dd','2000-01-01')"
                        }),
                    )),
            )
            .build()
            .unwrap()
    }

    fn missing_report_pact() -> Pact {
        PactBuilder::new("ShapeReportClient", "ShapeService")
            .interaction(
                InteractionBuilder::new("a request for a report that does not exist")
                    .given("no reports exist")
                    .request(RequestBuilder::new().path("/reports/report404.csv").header("accept", "text/csv"))
                    .response(ResponseBuilder::new().status(404)),
            )
            .build()
            .unwrap()
    }

    fn configure(config: &mut MockServerConfig) {
        config.set_active_states(["no reports exist"]);
    }

    #[contract_test(area_pact)]
    fn area_of_a_rectangle(mock: &MockServer) {
        let area = client(mock)
            .get_area(Rectangle {
                length: 3.0,
                width: 4.0,
            })
            .unwrap();
        assert_eq!(area, 12.0);
    }

    #[contract_test(report_pact)]
    fn report_rows_are_parsed(mock: &MockServer) {
        let rows = client(mock).get_report("report001").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].name, "Name");
        assert_eq!(rows[0].count, 100);
    }

    #[contract_test(missing_report_pact, configure)]
    fn missing_report_is_an_error(mock: &MockServer) {
        match client(mock).get_report("report404") {
            Err(Error::ReportNotFound(name)) => assert_eq!(name, "report404"),
            other => panic!("The function call should return ReportNotFound, got {:?}", other),
        }
    }

    #[test]
    fn flat_rectangles_are_rejected_locally() {
        let result = ShapeReportClient::new().get_area(Rectangle {
            length: 0.0,
            width: 4.0,
        });
        assert!(matches!(result, Err(Error::InvalidDimensions(_, _))));
    }
}
