//! Out-of-process content handlers. Each plugin lives in its own
//! `<name>-<version>` directory under the plugin directory, described by a
//! `plugin.json` manifest, and talks newline-delimited JSON over stdio.

mod manifest;
mod process;

use crate::error::Result;
use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};
use tracing::{debug, warn};

pub use manifest::{PluginManifest, MANIFEST_FILE};
pub use process::ProcessHandler;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct PluginConfig {
    dir: PathBuf,
    timeout: Duration,
}

impl Default for PluginConfig {
    fn default() -> Self {
        let home = env::var_os("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));
        Self {
            dir: home.join(".covenant").join("plugins"),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl PluginConfig {
    /// Defaults overridden by `COVENANT_PLUGIN_DIR` and
    /// `COVENANT_PLUGIN_TIMEOUT_MS`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(dir) = env::var_os("COVENANT_PLUGIN_DIR") {
            config.set_dir(dir);
        }
        if let Ok(timeout) = env::var("COVENANT_PLUGIN_TIMEOUT_MS") {
            match timeout.parse::<u64>() {
                Ok(millis) => config.set_timeout(Duration::from_millis(millis)),
                Err(_) => warn!(value = %timeout, "Ignoring invalid COVENANT_PLUGIN_TIMEOUT_MS"),
            }
        }
        config
    }

    pub fn set_dir<P: Into<PathBuf>>(&mut self, dir: P) {
        self.dir = dir.into();
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

/// Load every plugin manifest below the plugin directory. A missing
/// directory means no plugins; an unreadable manifest is skipped.
pub fn discover(config: &PluginConfig) -> Result<Vec<ProcessHandler>> {
    if !config.dir().is_dir() {
        debug!(dir = %config.dir().display(), "No plugin directory");
        return Ok(vec![]);
    }

    let mut entries = fs::read_dir(config.dir())?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<Vec<_>>>()?;
    entries.sort();

    let mut handlers = vec![];
    for plugin_dir in entries {
        let manifest_path = plugin_dir.join(MANIFEST_FILE);
        if !manifest_path.is_file() {
            continue;
        }
        match PluginManifest::load(&manifest_path).and_then(|m| ProcessHandler::new(m, &plugin_dir, config.timeout())) {
            Ok(handler) => handlers.push(handler),
            Err(error) => warn!(manifest = %manifest_path.display(), %error, "Skipping plugin"),
        }
    }
    Ok(handlers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn missing_directory_has_no_plugins() {
        let mut config = PluginConfig::default();
        config.set_dir("/nonexistent/covenant/plugins");
        assert!(discover(&config).unwrap().is_empty());
    }

    #[test]
    fn discovers_manifests_and_skips_broken_ones() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("xml-0.1.0");
        fs::create_dir(&good).unwrap();
        fs::write(
            good.join(MANIFEST_FILE),
            r#"{"name":"xml","version":"0.1.0","entryPoint":"/bin/cat","contentTypes":["application/xml"]}"#,
        )
        .unwrap();
        let broken = dir.path().join("broken-1.0.0");
        fs::create_dir(&broken).unwrap();
        fs::write(broken.join(MANIFEST_FILE), "{").unwrap();

        let mut config = PluginConfig::default();
        config.set_dir(dir.path());
        let handlers = discover(&config).unwrap();
        assert_eq!(handlers.len(), 1);
        assert_eq!(handlers[0].manifest().name, "xml");
    }
}
