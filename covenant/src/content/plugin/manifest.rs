use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

pub const MANIFEST_FILE: &str = "plugin.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginManifest {
    pub name: String,
    /// Semantic version of the plugin.
    pub version: String,
    /// Executable to start, relative to the plugin directory or on the PATH.
    pub entry_point: String,
    pub content_types: Vec<String>,
    #[serde(default)]
    pub args: Vec<String>,
}

impl PluginManifest {
    pub fn load(path: &Path) -> Result<Self> {
        let manifest: PluginManifest = serde_json::from_slice(&fs::read(path)?)?;
        if manifest.content_types.is_empty() {
            return Err(Error::InvalidConfig(format!(
                "plugin '{}' does not declare any content types",
                manifest.name
            )));
        }
        Ok(manifest)
    }
}
