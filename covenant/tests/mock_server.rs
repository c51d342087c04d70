use covenant::{
    matchers, persistence, Error, Failure, HandlerRegistry, InteractionBuilder, MockServer, MockServerConfig,
    Pact, PactBuilder, RequestBuilder, ResponseBuilder, WriteMode,
};
use reqwest::blocking::Client;
use serde_json::{json, Value};
use std::{
    io::Write,
    net::TcpStream,
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

fn registry() -> Arc<HandlerRegistry> {
    Arc::new(HandlerRegistry::with_defaults())
}

fn config() -> MockServerConfig {
    let mut config = MockServerConfig::new();
    config.set_registry(registry());
    config
}

fn area_pact() -> Pact {
    PactBuilder::new("ShapeClient", "ShapeService")
        .registry(registry())
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

fn failures(result: covenant::Result<()>) -> Vec<Failure> {
    match result {
        Err(Error::Verification(failures)) => failures,
        other => panic!("expected a verification error, got {:?}", other),
    }
}

#[test]
fn matching_request_is_answered_from_the_example() {
    let mock = MockServer::for_pact(&area_pact(), config()).unwrap();

    let response = Client::new()
        .post(mock.path("/area"))
        .json(&json!({"length": 10, "width": 2.5}))
        .send()
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(response.json::<Value>().unwrap(), json!({"value": 12}));

    assert_eq!(mock.match_count("a request for the area of a rectangle"), 1);
    mock.stop().unwrap();
}

#[test]
fn body_mismatch_is_reported_at_the_field() {
    let mock = MockServer::for_pact(&area_pact(), config()).unwrap();

    let response = Client::new()
        .post(mock.path("/area"))
        .json(&json!({"length": "x", "width": 4}))
        .send()
        .unwrap();
    assert_eq!(response.status().as_u16(), 500);

    let failures = failures(mock.stop());
    let unmatched: Vec<_> = failures
        .iter()
        .filter(|failure| matches!(failure, Failure::UnmatchedRequest { .. }))
        .collect();
    assert_eq!(unmatched.len(), 1);
    let mismatch = &unmatched[0].mismatches()[0];
    assert_eq!(mismatch.short_path(), "length");
    assert_eq!(mismatch.kind.rule_name(), Some("number"));
}

#[test]
fn unexpected_request_fails_once() {
    let mock = MockServer::for_pact(&area_pact(), config()).unwrap();

    let response = Client::new().get(mock.path("/volume")).send().unwrap();
    assert_eq!(response.status().as_u16(), 500);
    let document: Value = response.json().unwrap();
    assert_eq!(document["failure"]["type"], json!("unmatchedRequest"));

    let failures = failures(mock.stop());
    assert_eq!(
        failures
            .iter()
            .filter(|failure| matches!(failure, Failure::UnmatchedRequest { .. }))
            .count(),
        1
    );
    assert!(failures
        .iter()
        .any(|failure| matches!(failure, Failure::UnfulfilledInteraction { .. })));
}

#[test]
fn single_use_interactions_are_each_fulfilled() {
    let mut builder = PactBuilder::new("ShapeClient", "ShapeService").registry(registry());
    for n in 0..3 {
        builder = builder.interaction(
            InteractionBuilder::new(format!("shape number {}", n))
                .single_use()
                .request(RequestBuilder::new().path("/shapes/next"))
                .response(ResponseBuilder::new().json_body(json!({ "number": n }))),
        );
    }
    let mock = MockServer::for_pact(&builder.build().unwrap(), config()).unwrap();

    let client = Client::new();
    let numbers: Vec<Value> = (0..3)
        .map(|_| client.get(mock.path("/shapes/next")).send().unwrap().json::<Value>().unwrap()["number"].clone())
        .collect();
    assert_eq!(numbers, vec![json!(0), json!(1), json!(2)]);
    mock.stop().unwrap();
}

#[test]
fn csv_reports_are_served_and_checked() {
    let pact = PactBuilder::new("ReportClient", "ReportService")
        .registry(registry())
        .interaction(
            InteractionBuilder::new("a request for a report")
                .request(RequestBuilder::new().path("/reports/report001.csv"))
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
        .unwrap();
    let mock = MockServer::for_pact(&pact, config()).unwrap();

    let response = Client::new().get(mock.path("/reports/report001.csv")).send().unwrap();
    let content_type = response.headers()["content-type"].to_str().unwrap().to_string();
    assert!(content_type.starts_with("text/csv"));
    let text = response.text().unwrap();
    let cells: Vec<&str> = text.trim_end().split(',').collect();
    assert_eq!(cells.len(), 3);
    assert_eq!(cells[1], "100");
    mock.stop().unwrap();
}

#[test]
fn unregistered_content_types_cannot_be_built() {
    let error = PactBuilder::new("ShapeClient", "ShapeService")
        .registry(registry())
        .interaction(
            InteractionBuilder::new("a request in an unknown format")
                .request(RequestBuilder::new().post().contents("application/x-unregistered", json!({}))),
        )
        .build()
        .unwrap_err();

    assert_eq!(error.to_string(), "no handler for content-type application/x-unregistered");
}

#[test]
fn cors_preflight_is_answered_when_enabled() {
    let mut config = config();
    config.set_cors_preflight(true);
    let mock = MockServer::for_pact(&area_pact(), config).unwrap();

    let response = Client::new()
        .request(reqwest::Method::OPTIONS, mock.path("/area"))
        .header("Origin", "http://localhost:3000")
        .header("Access-Control-Request-Method", "POST")
        .send()
        .unwrap();
    assert_eq!(response.status().as_u16(), 204);
    assert_eq!(response.headers()["access-control-allow-origin"], "*");

    // the pre-flight is not an interaction, so the area request is still owed
    assert_eq!(failures(mock.stop()).len(), 1);
}

#[test]
fn pact_read_back_from_disk_serves_the_same_interactions() {
    let dir = tempfile::tempdir().unwrap();
    let path = persistence::write_pact(&area_pact(), dir.path(), WriteMode::Overwrite).unwrap();
    let loaded = persistence::load(&path).unwrap();
    assert_eq!(loaded, area_pact());

    let mock = MockServer::for_pact(&loaded, config()).unwrap();
    let response = Client::new()
        .post(mock.path("/area"))
        .json(&json!({"length": 1.5, "width": 2}))
        .send()
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    mock.stop().unwrap();
}

#[test]
fn servers_bind_their_own_ports() {
    let first = MockServer::for_pact(&area_pact(), config()).unwrap();
    let second = MockServer::for_pact(&area_pact(), config()).unwrap();
    assert_ne!(first.port(), second.port());

    let mut taken = config();
    taken.set_port(first.port());
    assert!(matches!(
        MockServer::for_pact(&area_pact(), taken),
        Err(Error::Bind { .. })
    ));
}

#[test]
fn stop_is_bounded_by_the_shutdown_grace() {
    let mut config = config();
    config.set_shutdown_grace(Duration::from_millis(200));
    let mock = MockServer::for_pact(&area_pact(), config).unwrap();

    let mut stream = TcpStream::connect(mock.address()).unwrap();
    stream
        .write_all(b"POST /area HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/json\r\nContent-Length: 100\r\n\r\n{\"length\":")
        .unwrap();
    thread::sleep(Duration::from_millis(100));

    let started = Instant::now();
    let result = mock.stop();
    let elapsed = started.elapsed();

    assert!(elapsed < Duration::from_secs(2), "stop took {:?}", elapsed);
    assert_eq!(failures(result).len(), 1);
    drop(stream);
}
