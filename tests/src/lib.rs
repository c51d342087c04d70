#[cfg(test)]
mod tests {
    use covenant::{
        contract_test, InteractionBuilder, MockServer, MockServerConfig, Pact, PactBuilder, RequestBuilder,
        ResponseBuilder, WriteMode,
    };

    fn configure_covenant(config: &mut MockServerConfig) {
        config
            .set_output_dir(std::env::temp_dir().join("covenant-macro-tests"))
            .set_write_mode(WriteMode::Overwrite);
    }

    fn empty_pact() -> Pact {
        PactBuilder::new("MacroConsumer", "EmptyProvider").build().unwrap()
    }

    fn ping_pact() -> Pact {
        PactBuilder::new("MacroConsumer", "PingProvider")
            .interaction(
                InteractionBuilder::new("a ping")
                    .request(RequestBuilder::new().path("/ping"))
                    .response(ResponseBuilder::new().body("pong", Some("text/plain"))),
            )
            .build()
            .unwrap()
    }

    #[contract_test(empty_pact, configure_covenant)]
    fn simple_contract_test() {
        println!("this test does nothing...");
    }

    #[contract_test(ping_pact, configure_covenant)]
    fn mock_server_is_passed_in(mock: &MockServer) {
        let body = reqwest::blocking::get(mock.path("/ping")).unwrap().text().unwrap();
        assert_eq!(body, "pong");
    }

    #[contract_test(empty_pact, configure_covenant)]
    fn logging_is_installed_before_the_test_runs() {
        assert!(!covenant::logging::init(&covenant::logging::LogConfig::default()));
    }

    #[contract_test(ping_pact, configure_covenant)]
    #[should_panic(expected = "Covenant Error")]
    fn unmatched_interaction_fails_the_test() {}

    #[contract_test(ping_pact, configure_covenant)]
    #[should_panic(expected = "client gave up")]
    fn panics_in_the_test_are_kept(_mock: &MockServer) {
        panic!("client gave up");
    }
}
