use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A named precondition the provider sets up before an interaction is
/// replayed. Parameters feed `fromProviderState` placeholders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderState {
    pub name: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub params: Map<String, Value>,
}

impl ProviderState {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            params: Map::new(),
        }
    }

    pub fn with_params<S: Into<String>>(name: S, params: Map<String, Value>) -> Self {
        Self {
            name: name.into(),
            params,
        }
    }

    pub fn with_param<K: Into<String>>(mut self, key: K, value: Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }
}

/// Merge the parameters of several states; later states win.
pub fn merged_params(states: &[ProviderState]) -> Map<String, Value> {
    states.iter().fold(Map::new(), |mut params, state| {
        params.extend(state.params.clone());
        params
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn params_are_omitted_when_empty() {
        let state = ProviderState::new("a report exists");
        assert_eq!(
            serde_json::to_value(&state).unwrap(),
            json!({"name": "a report exists"})
        );
    }

    #[test]
    fn later_states_override_parameters() {
        let states = vec![
            ProviderState::new("one").with_param("id", json!(1)),
            ProviderState::new("two").with_param("id", json!(2)).with_param("x", json!("y")),
        ];
        let params = merged_params(&states);
        assert_eq!(params.get("id"), Some(&json!(2)));
        assert_eq!(params.get("x"), Some(&json!("y")));
    }
}
