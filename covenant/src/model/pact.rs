use crate::{
    error::{Error, Result},
    model::interaction::Interaction,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::{
    fmt::{self, Display},
    str::FromStr,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum PactSpecVersion {
    V1,
    V1_1,
    V2,
    V3,
    #[default]
    V4,
}

impl PactSpecVersion {
    pub fn version_str(&self) -> &'static str {
        match self {
            PactSpecVersion::V1 => "1.0.0",
            PactSpecVersion::V1_1 => "1.1.0",
            PactSpecVersion::V2 => "2.0.0",
            PactSpecVersion::V3 => "3.0.0",
            PactSpecVersion::V4 => "4.0",
        }
    }
}

impl Display for PactSpecVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.version_str())
    }
}

impl FromStr for PactSpecVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim().trim_start_matches(['v', 'V']);
        let major = s.split('.').next().unwrap_or_default();
        let minor = s.split('.').nth(1).unwrap_or("0");
        match (major, minor) {
            ("1", "1") => Ok(PactSpecVersion::V1_1),
            ("1", _) => Ok(PactSpecVersion::V1),
            ("2", _) => Ok(PactSpecVersion::V2),
            ("3", _) => Ok(PactSpecVersion::V3),
            ("4", _) => Ok(PactSpecVersion::V4),
            _ => Err(Error::persistence(
                None,
                format!("unknown pact specification version '{}'", s),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub name: String,
}

impl Participant {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self { name: name.into() }
    }
}

/// A contract: the interactions a consumer expects of a provider.
#[derive(Debug, Clone, PartialEq)]
pub struct Pact {
    pub consumer: Participant,
    pub provider: Participant,
    pub interactions: Vec<Interaction>,
    /// Metadata other than the specification and library versions, which
    /// are written on save.
    pub metadata: Map<String, Value>,
    pub spec_version: PactSpecVersion,
}

impl Pact {
    pub fn new<C: Into<String>, P: Into<String>>(consumer: C, provider: P) -> Self {
        Self {
            consumer: Participant::new(consumer),
            provider: Participant::new(provider),
            interactions: vec![],
            metadata: Map::new(),
            spec_version: PactSpecVersion::V4,
        }
    }

    /// Add an interaction, replacing an earlier one with the same
    /// description and provider states.
    pub fn add_interaction(&mut self, interaction: Interaction) {
        match self
            .interactions
            .iter_mut()
            .find(|existing| existing.same_identity(&interaction))
        {
            Some(existing) => *existing = interaction,
            None => self.interactions.push(interaction),
        }
    }

    /// Merge the interactions of another pact for the same participants.
    pub fn merge(&mut self, other: &Pact) -> Result<()> {
        if self.consumer != other.consumer || self.provider != other.provider {
            return Err(Error::persistence(
                None,
                format!(
                    "cannot merge pact {} with {}",
                    self.file_name(),
                    other.file_name()
                ),
            ));
        }
        for interaction in &other.interactions {
            self.add_interaction(interaction.clone());
        }
        Ok(())
    }

    pub fn file_name(&self) -> String {
        format!("{}-{}.json", self.consumer.name, self.provider.name)
    }

    pub fn find(&self, description: &str) -> Option<&Interaction> {
        self.interactions
            .iter()
            .find(|interaction| interaction.description == description)
    }

    pub fn to_json(&self) -> Value {
        let mut metadata = self.metadata.clone();
        metadata.insert(
            "pactSpecification".into(),
            json!({ "version": self.spec_version.version_str() }),
        );
        metadata.insert(
            "covenant".into(),
            json!({ "version": env!("CARGO_PKG_VERSION") }),
        );

        json!({
            "consumer": self.consumer,
            "provider": self.provider,
            "interactions": self.interactions.iter().map(Interaction::to_v4_json).collect::<Vec<_>>(),
            "metadata": metadata,
        })
    }

    /// Read a V4 document. Older documents go through the upgrade in
    /// `persistence` first.
    pub fn from_v4_json(value: &Value) -> Result<Self> {
        let participant = |key: &str| -> Result<Participant> {
            value
                .get(key)
                .and_then(|p| p.get("name"))
                .and_then(Value::as_str)
                .map(Participant::new)
                .ok_or_else(|| Error::persistence(None, format!("missing {} name", key)))
        };

        let interactions = match value.get("interactions") {
            None | Some(Value::Null) => vec![],
            Some(Value::Array(items)) => items
                .iter()
                .enumerate()
                .map(|(index, item)| Interaction::from_v4_json(index, item))
                .collect::<Result<Vec<_>>>()?,
            Some(_) => return Err(Error::persistence(None, "interactions must be an array")),
        };

        let mut metadata = match value.get("metadata") {
            Some(Value::Object(map)) => map.clone(),
            _ => Map::new(),
        };
        metadata.remove("pactSpecification");
        metadata.remove("covenant");

        Ok(Self {
            consumer: participant("consumer")?,
            provider: participant("provider")?,
            interactions,
            metadata,
            spec_version: PactSpecVersion::V4,
        })
    }
}
