use covenant::{
    matches,
    matching::match_request,
    model::{MultiValueMap, RuleCategory},
    persistence, Body, HandlerRegistry, HttpRequest, HttpResponse, Interaction, MatchingConfig, Pact,
};
use proptest::prelude::*;
use serde_json::{Map, Value};

fn json_leaf() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::from),
        "[a-zA-Z0-9 ]{0,12}".prop_map(Value::String),
    ]
}

fn json_value() -> impl Strategy<Value = Value> {
    json_leaf().prop_recursive(4, 32, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
            prop::collection::btree_map("[a-z]{1,8}", inner, 0..6)
                .prop_map(|entries| Value::Object(entries.into_iter().collect::<Map<_, _>>())),
        ]
    })
}

fn json_object() -> impl Strategy<Value = Value> {
    prop::collection::btree_map("[a-z]{1,8}", json_value(), 0..6)
        .prop_map(|entries| Value::Object(entries.into_iter().collect::<Map<_, _>>()))
}

fn request() -> impl Strategy<Value = HttpRequest> {
    (
        prop_oneof![Just("GET"), Just("POST"), Just("PUT"), Just("DELETE")],
        prop::collection::vec("[a-z0-9]{1,8}", 1..4),
        prop::collection::btree_map("[a-z]{1,6}", prop::collection::vec("[a-z0-9]{1,6}", 1..3), 0..3),
        prop::option::of(json_object()),
    )
        .prop_map(|(method, segments, query, body)| {
            let mut headers = MultiValueMap::new();
            let body = match body {
                Some(document) => {
                    headers.insert("Content-Type".into(), vec!["application/json".into()]);
                    Body::json(&document)
                }
                None => Body::Missing,
            };
            HttpRequest {
                method: method.to_string(),
                path: format!("/{}", segments.join("/")),
                query: query.into_iter().collect(),
                headers,
                body,
                ..HttpRequest::default()
            }
        })
}

fn pact() -> impl Strategy<Value = Pact> {
    prop::collection::vec((request(), 200u16..600, prop::option::of(json_object())), 0..5).prop_map(
        |interactions| {
            let mut pact = Pact::new("PropertyConsumer", "PropertyProvider");
            for (index, (request, status, body)) in interactions.into_iter().enumerate() {
                let response = HttpResponse {
                    status,
                    body: body.as_ref().map(Body::json).unwrap_or_default(),
                    ..HttpResponse::default()
                };
                pact.add_interaction(Interaction::http(format!("interaction {}", index), request, response));
            }
            pact
        },
    )
}

proptest! {
    #[test]
    fn every_value_matches_itself(value in json_value()) {
        prop_assert!(matches(&value, &value, &RuleCategory::default()).is_match());
    }

    #[test]
    fn pact_documents_read_back_unchanged(pact in pact()) {
        let loaded = persistence::from_json(&pact.to_json()).unwrap();
        prop_assert_eq!(&loaded, &pact);
    }

    #[test]
    fn persisted_requests_still_match_their_examples(pact in pact()) {
        let registry = HandlerRegistry::with_defaults();
        let loaded = persistence::from_json(&pact.to_json()).unwrap();
        for (original, reloaded) in pact.interactions.iter().zip(&loaded.interactions) {
            let (original, reloaded) = (original.request().unwrap(), reloaded.request().unwrap());
            let result = match_request(reloaded, original, &registry, MatchingConfig::default()).unwrap();
            prop_assert!(result.is_match(), "{:?}", result);
        }
    }
}
