use super::{interaction::state_with_params, BodyParts, BodySpec};
use crate::{
    content::HandlerRegistry,
    error::Result,
    model::{matching_rules::CATEGORY_METADATA, Interaction, MatchingRule, Message},
    path::DocPath,
};
use serde_json::Value;

/// An asynchronous message the provider is expected to publish.
#[derive(Debug, Clone)]
pub struct MessageBuilder {
    description: String,
    states: Vec<(String, Value)>,
    comments: Vec<String>,
    message: Message,
    contents: BodyParts,
}

impl MessageBuilder {
    pub fn new<S: Into<String>>(description: S) -> Self {
        Self {
            description: description.into(),
            states: vec![],
            comments: vec![],
            message: Message::default(),
            contents: BodyParts::default(),
        }
    }

    pub fn given<S: Into<String>>(mut self, state: S) -> Self {
        self.states.push((state.into(), Value::Null));
        self
    }

    pub fn given_with_params<S: Into<String>>(mut self, state: S, params: Value) -> Self {
        self.states.push((state.into(), params));
        self
    }

    pub fn comment<S: Into<String>>(mut self, comment: S) -> Self {
        self.comments.push(comment.into());
        self
    }

    pub fn json_contents(mut self, template: Value) -> Self {
        self.contents.spec = BodySpec::Json(template);
        self
    }

    pub fn contents(mut self, content_type: &str, config: Value) -> Self {
        self.contents.spec = BodySpec::Contents {
            content_type: content_type.to_string(),
            config,
        };
        self
    }

    pub fn metadata<K: Into<String>, V: Into<Value>>(mut self, key: K, value: V) -> Self {
        self.message.metadata.insert(key.into(), value.into());
        self
    }

    pub fn metadata_matching(mut self, key: &str, regex: &str, example: &str) -> Self {
        if let Ok(path) = DocPath::parse(key) {
            self.message.matching_rules.add_rule(
                CATEGORY_METADATA,
                path,
                MatchingRule::Regex(regex.to_string()),
            );
        }
        self.metadata(key, example)
    }

    pub fn body_rule(mut self, path: &str, rule: MatchingRule) -> Self {
        self.contents.rules.push((path.to_string(), rule));
        self
    }

    pub fn build(self, registry: &HandlerRegistry) -> Result<Interaction> {
        let mut message = self.message;
        message.contents = self.contents.build(
            None,
            &mut message.matching_rules,
            &mut message.generators,
            registry,
        )?;
        if let Some(content_type) = message.contents.content_type() {
            message
                .metadata
                .entry("contentType".to_string())
                .or_insert_with(|| Value::String(content_type.base_type()));
        }

        let mut interaction = Interaction::message(self.description, message);
        interaction.provider_states = self
            .states
            .into_iter()
            .map(|(name, params)| state_with_params(&name, params))
            .collect::<Result<_>>()?;
        interaction.comments = self.comments;
        Ok(interaction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::matchers::like;
    use serde_json::json;

    #[test]
    fn builds_message_with_metadata() {
        let interaction = MessageBuilder::new("a shape was created")
            .given("a shape exists")
            .json_contents(json!({"name": like("square")}))
            .metadata("topic", "shapes")
            .build(&HandlerRegistry::with_defaults())
            .unwrap();

        let message = interaction.as_message().unwrap();
        assert_eq!(message.metadata["topic"], json!("shapes"));
        assert_eq!(message.metadata["contentType"], json!("application/json"));
        assert_eq!(message.contents.as_json().unwrap().unwrap(), json!({"name": "square"}));
    }
}
