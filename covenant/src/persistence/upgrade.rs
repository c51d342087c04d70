//! Normalisation of V1 to V3 pact documents into the V4 layout.

use crate::{
    content_type::ContentType,
    error::{Error, Result},
    generators::Generators,
    model::{
        interaction::{HTTP_TYPE, MESSAGE_TYPE},
        Body, MatchingRules, PactSpecVersion,
    },
};
use serde_json::{json, Map, Value};

/// The specification version a document declares, in any of the
/// metadata layouts used over time.
pub fn declared_version(document: &Value) -> Option<PactSpecVersion> {
    let metadata = document.get("metadata")?;
    let version = metadata
        .get("pactSpecification")
        .or_else(|| metadata.get("pact-specification"))
        .and_then(|spec| spec.get("version"))
        .or_else(|| metadata.get("pactSpecificationVersion"))
        .and_then(Value::as_str)?;
    version.parse().ok()
}

pub fn is_v4(document: &Value) -> bool {
    match declared_version(document) {
        Some(version) => version == PactSpecVersion::V4,
        None => document
            .get("interactions")
            .and_then(Value::as_array)
            .map(|items| items.iter().any(|item| item.get("type").is_some()))
            .unwrap_or(false),
    }
}

/// Rewrite a legacy document as V4 JSON.
pub fn upgrade(document: &Value) -> Result<Value> {
    let mut interactions = vec![];
    let http = document
        .get("interactions")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    let messages = document
        .get("messages")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    for (index, interaction) in http.iter().enumerate() {
        interactions.push(upgrade_http(index, interaction)?);
    }
    for (offset, message) in messages.iter().enumerate() {
        interactions.push(upgrade_message(http.len() + offset, message)?);
    }

    let mut metadata = document
        .get("metadata")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    metadata.remove("pact-specification");
    metadata.remove("pactSpecificationVersion");

    Ok(json!({
        "consumer": document.get("consumer").cloned().unwrap_or(Value::Null),
        "provider": document.get("provider").cloned().unwrap_or(Value::Null),
        "interactions": interactions,
        "metadata": metadata,
    }))
}

fn at(index: usize) -> impl Fn(Error) -> Error {
    move |error| match error {
        Error::Persistence { index: None, message } => Error::Persistence {
            index: Some(index),
            message,
        },
        Error::Persistence { .. } => error,
        other => Error::persistence(Some(index), other.to_string()),
    }
}

fn provider_states(interaction: &Value) -> Value {
    if let Some(states) = interaction.get("providerStates") {
        return states.clone();
    }
    match interaction
        .get("providerState")
        .or_else(|| interaction.get("provider_state"))
        .and_then(Value::as_str)
    {
        Some(name) if !name.is_empty() => json!([{ "name": name }]),
        _ => json!([]),
    }
}

fn header_type(headers: Option<&Value>) -> Option<ContentType> {
    headers?
        .as_object()?
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case("content-type"))
        .and_then(|(_, value)| match value {
            Value::String(value) => Some(value.as_str()),
            Value::Array(values) => values.first().and_then(Value::as_str),
            _ => None,
        })
        .and_then(|value| ContentType::parse(value).ok())
}

/// V2 query strings become a map of value lists.
fn query(value: Option<&Value>) -> Value {
    match value {
        Some(Value::String(query)) => {
            let mut map = Map::new();
            for (name, value) in url::form_urlencoded::parse(query.trim_start_matches('?').as_bytes()) {
                let entry = map
                    .entry(name.into_owned())
                    .or_insert_with(|| Value::Array(vec![]));
                if let Value::Array(values) = entry {
                    values.push(Value::String(value.into_owned()));
                }
            }
            Value::Object(map)
        }
        Some(other) => other.clone(),
        None => Value::Null,
    }
}

fn upgrade_part(index: usize, part: &Value, legacy_rules: Option<&Value>) -> Result<Map<String, Value>> {
    let mut upgraded = part.as_object().cloned().unwrap_or_default();
    let content_type = header_type(part.get("headers"));

    let body = Body::from_legacy_json(part.get("body"), content_type.as_ref());
    upgraded.remove("body");
    if body != Body::Missing {
        upgraded.insert("body".into(), body.to_v4_json());
    }

    match part.get("matchingRules").or(legacy_rules) {
        Some(rules) => {
            let rules = MatchingRules::from_json(rules).map_err(at(index))?;
            upgraded.insert("matchingRules".into(), rules.to_v4_json());
        }
        None => {
            upgraded.remove("matchingRules");
        }
    }
    if let Some(generators) = part.get("generators") {
        let generators = Generators::from_json(generators).map_err(at(index))?;
        upgraded.insert("generators".into(), generators.to_json());
    }
    Ok(upgraded)
}

fn upgrade_http(index: usize, interaction: &Value) -> Result<Value> {
    let description = interaction
        .get("description")
        .cloned()
        .ok_or_else(|| Error::persistence(Some(index), "missing description"))?;
    let request = interaction
        .get("request")
        .ok_or_else(|| Error::persistence(Some(index), "missing request"))?;
    let response = interaction
        .get("response")
        .ok_or_else(|| Error::persistence(Some(index), "missing response"))?;

    let mut request = upgrade_part(index, request, interaction.get("requestMatchingRules"))?;
    let query = query(request.get("query"));
    if query.is_null() {
        request.remove("query");
    } else {
        request.insert("query".into(), query);
    }
    let response = upgrade_part(index, response, interaction.get("responseMatchingRules"))?;

    Ok(json!({
        "type": HTTP_TYPE,
        "description": description,
        "providerStates": provider_states(interaction),
        "request": request,
        "response": response,
    }))
}

fn upgrade_message(index: usize, message: &Value) -> Result<Value> {
    let description = message
        .get("description")
        .cloned()
        .ok_or_else(|| Error::persistence(Some(index), "missing description"))?;
    let metadata = message
        .get("metadata")
        .or_else(|| message.get("metaData"))
        .cloned()
        .unwrap_or_else(|| json!({}));
    let content_type = metadata
        .as_object()
        .and_then(|m| m.iter().find(|(k, _)| k.eq_ignore_ascii_case("contentType") || k.eq_ignore_ascii_case("content-type")))
        .and_then(|(_, v)| v.as_str())
        .and_then(|v| ContentType::parse(v).ok());

    let contents = Body::from_legacy_json(message.get("contents"), content_type.as_ref());
    let rules = match message.get("matchingRules") {
        Some(rules) => MatchingRules::from_json(rules).map_err(at(index))?.to_v4_json(),
        None => json!({}),
    };
    let generators = match message.get("generators") {
        Some(generators) => Generators::from_json(generators).map_err(at(index))?.to_json(),
        None => json!({}),
    };

    Ok(json!({
        "type": MESSAGE_TYPE,
        "description": description,
        "providerStates": provider_states(message),
        "contents": contents.to_v4_json(),
        "metadata": metadata,
        "matchingRules": rules,
        "generators": generators,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{matching_rules::CATEGORY_BODY, MatchingRule, Pact};

    #[test]
    fn upgrades_v2_interactions() {
        let document = json!({
            "consumer": {"name": "ShapeClient"},
            "provider": {"name": "ShapeService"},
            "interactions": [{
                "description": "a request for the area",
                "providerState": "shapes are enabled",
                "request": {
                    "method": "post",
                    "path": "/area",
                    "query": "units=cm&units=mm",
                    "headers": {"Content-Type": "application/json"},
                    "body": {"length": 3, "width": 4},
                    "matchingRules": {"$.body.length": {"match": "type"}}
                },
                "response": {"status": 200, "body": {"value": 12}}
            }],
            "metadata": {"pactSpecification": {"version": "2.0.0"}}
        });
        assert!(!is_v4(&document));

        let pact = Pact::from_v4_json(&upgrade(&document).unwrap()).unwrap();
        let interaction = &pact.interactions[0];
        assert_eq!(interaction.provider_states[0].name, "shapes are enabled");

        let request = interaction.request().unwrap();
        assert_eq!(request.method, "POST");
        assert_eq!(request.query["units"], vec!["cm".to_string(), "mm".to_string()]);
        assert_eq!(request.body.as_json().unwrap().unwrap(), json!({"length": 3, "width": 4}));
        let rules = request.matching_rules.category(CATEGORY_BODY).unwrap();
        assert_eq!(rules.get("$.length").unwrap().rules, vec![MatchingRule::Type]);
    }

    #[test]
    fn upgrades_v3_messages() {
        let document = json!({
            "consumer": {"name": "ShapeConsumer"},
            "provider": {"name": "ShapeProducer"},
            "messages": [{
                "description": "a shape event",
                "providerStates": [{"name": "a shape exists", "params": {"id": 1}}],
                "contents": {"id": 1},
                "metaData": {"contentType": "application/json"}
            }],
            "metadata": {"pactSpecification": {"version": "3.0.0"}}
        });

        let pact = Pact::from_v4_json(&upgrade(&document).unwrap()).unwrap();
        let message = pact.interactions[0].as_message().unwrap();
        assert_eq!(message.contents.as_json().unwrap().unwrap(), json!({"id": 1}));
        assert_eq!(pact.interactions[0].provider_states[0].params["id"], json!(1));
    }

    #[test]
    fn errors_name_the_interaction() {
        let document = json!({
            "consumer": {"name": "A"},
            "provider": {"name": "B"},
            "interactions": [
                {"description": "ok", "request": {}, "response": {}},
                {"description": "broken", "request": {}}
            ]
        });
        let error = upgrade(&document).unwrap_err();
        assert!(matches!(error, Error::Persistence { index: Some(1), .. }));
        assert!(error.to_string().contains("interaction 1"));
    }
}
