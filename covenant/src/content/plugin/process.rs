use super::manifest::PluginManifest;
use crate::{
    content::{ConfiguredContents, ContentHandler},
    content_type::ContentType,
    error::{Error, Result},
    generators::{Generator, Generators},
    matching::{MatchResult, MatchingConfig, Mismatch, MismatchKind},
    model::{Body, MatchingRules, RuleCategory},
    path::DocPath,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::{
    collections::BTreeMap,
    io::{BufRead, BufReader, Write},
    path::{Path, PathBuf},
    process::{Child, ChildStdin, Command, Stdio},
    sync::{
        atomic::{AtomicU64, Ordering},
        mpsc::{self, Receiver, RecvTimeoutError},
        Mutex,
    },
    thread,
    time::{Duration, Instant},
};
use tracing::{debug, info, warn};

#[derive(Debug, Serialize)]
struct PluginRequest<'a> {
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct PluginResponse {
    id: Option<u64>,
    result: Option<Value>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PluginMismatch {
    #[serde(default)]
    path: String,
    #[serde(default)]
    expected: Value,
    #[serde(default)]
    actual: Value,
    #[serde(default)]
    description: String,
    rule: Option<String>,
}

impl From<PluginMismatch> for Mismatch {
    fn from(mismatch: PluginMismatch) -> Self {
        let kind = match mismatch.rule {
            Some(rule) => MismatchKind::Rule(rule),
            None => MismatchKind::Body,
        };
        Mismatch::new(
            mismatch.path,
            kind,
            mismatch.expected,
            mismatch.actual,
            mismatch.description,
        )
    }
}

#[derive(Debug)]
struct PluginProcess {
    child: Child,
    stdin: ChildStdin,
    lines: Receiver<String>,
}

impl PluginProcess {
    fn send(&mut self, request: &PluginRequest<'_>) -> std::io::Result<()> {
        let mut line = serde_json::to_vec(request)?;
        line.push(b'\n');
        self.stdin.write_all(&line)?;
        self.stdin.flush()
    }

    fn shutdown(&mut self, id: u64) {
        let request = PluginRequest {
            id,
            method: "shutdown",
            params: Value::Null,
        };
        if let Err(error) = self.send(&request) {
            debug!(%error, "Plugin did not accept the shutdown request");
        }
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// A content handler served by a plugin process. The process is started on
/// first use and stopped when the handler is dropped.
#[derive(Debug)]
pub struct ProcessHandler {
    manifest: PluginManifest,
    dir: PathBuf,
    version: semver::Version,
    content_types: Vec<ContentType>,
    timeout: Duration,
    next_id: AtomicU64,
    process: Mutex<Option<PluginProcess>>,
}

impl ProcessHandler {
    pub fn new(manifest: PluginManifest, dir: &Path, timeout: Duration) -> Result<Self> {
        let version = semver::Version::parse(&manifest.version).map_err(|e| {
            Error::InvalidConfig(format!(
                "plugin '{}' has an invalid version '{}': {}",
                manifest.name, manifest.version, e
            ))
        })?;
        let content_types = manifest
            .content_types
            .iter()
            .map(|ct| ContentType::parse(ct))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            manifest,
            dir: dir.to_path_buf(),
            version,
            content_types,
            timeout,
            next_id: AtomicU64::new(1),
            process: Mutex::new(None),
        })
    }

    pub fn manifest(&self) -> &PluginManifest {
        &self.manifest
    }

    fn unavailable<S: Into<String>>(&self, reason: S) -> Error {
        Error::HandlerUnavailable {
            name: self.manifest.name.clone(),
            reason: reason.into(),
        }
    }

    fn spawn(&self) -> Result<PluginProcess> {
        let local = self.dir.join(&self.manifest.entry_point);
        let program = if local.is_file() {
            local
        } else {
            PathBuf::from(&self.manifest.entry_point)
        };

        let mut child = Command::new(&program)
            .args(&self.manifest.args)
            .current_dir(&self.dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| self.unavailable(format!("failed to start {}: {}", program.display(), e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| self.unavailable("could not open the plugin's standard input"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| self.unavailable("could not open the plugin's standard output"))?;

        let (sender, lines) = mpsc::channel();
        let name = self.manifest.name.clone();
        thread::spawn(move || {
            for line in BufReader::new(stdout).lines() {
                match line {
                    Ok(line) if line.trim().is_empty() => continue,
                    Ok(line) => {
                        if sender.send(line).is_err() {
                            break;
                        }
                    }
                    Err(error) => {
                        debug!(plugin = %name, %error, "Stopped reading plugin output");
                        break;
                    }
                }
            }
        });

        if let Some(stderr) = child.stderr.take() {
            let name = self.manifest.name.clone();
            thread::spawn(move || {
                for line in BufReader::new(stderr).lines().map_while(std::result::Result::ok) {
                    debug!(plugin = %name, "{}", line);
                }
            });
        }

        info!(
            plugin = %self.manifest.name,
            version = %self.version,
            pid = child.id(),
            "Started plugin process"
        );
        Ok(PluginProcess {
            child,
            stdin,
            lines,
        })
    }

    fn exchange(&self, process: &mut PluginProcess, method: &str, params: Value) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let request = PluginRequest { id, method, params };
        debug!(plugin = %self.manifest.name, id, method, "Sending plugin request");
        process
            .send(&request)
            .map_err(|e| self.unavailable(format!("failed to send '{}': {}", method, e)))?;

        let deadline = Instant::now() + self.timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let line = match process.lines.recv_timeout(remaining) {
                Ok(line) => line,
                Err(RecvTimeoutError::Timeout) => {
                    return Err(self.unavailable(format!(
                        "no response to '{}' within {}ms",
                        method,
                        self.timeout.as_millis()
                    )))
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(self.unavailable("the plugin process exited"))
                }
            };

            let response: PluginResponse = match serde_json::from_str(&line) {
                Ok(response) => response,
                Err(_) => {
                    debug!(plugin = %self.manifest.name, "{}", line);
                    continue;
                }
            };
            if response.id != Some(id) {
                warn!(plugin = %self.manifest.name, expected = id, got = ?response.id, "Ignoring stale plugin response");
                continue;
            }

            return match response.error {
                Some(message) => Err(Error::handler(&self.manifest.name, message)),
                None => Ok(response.result.unwrap_or(Value::Null)),
            };
        }
    }

    /// Send one request, starting the process if needed. A process that
    /// times out or dies is discarded and restarted by the next call.
    fn call(&self, method: &str, params: Value) -> Result<Value> {
        let mut guard = self.process.lock()?;
        if guard.is_none() {
            let mut process = self.spawn()?;
            let init = json!({
                "implementation": "covenant",
                "version": env!("CARGO_PKG_VERSION"),
            });
            if let Err(error) = self.exchange(&mut process, "init", init) {
                process.shutdown(0);
                return Err(error);
            }
            *guard = Some(process);
        }

        let process = match guard.as_mut() {
            Some(process) => process,
            None => return Err(self.unavailable("the plugin process is not running")),
        };
        let result = self.exchange(process, method, params);
        if let Err(Error::HandlerUnavailable { .. }) = &result {
            if let Some(mut process) = guard.take() {
                process.shutdown(0);
            }
        }
        result
    }
}

impl ContentHandler for ProcessHandler {
    fn name(&self) -> &str {
        &self.manifest.name
    }

    fn version(&self) -> semver::Version {
        self.version.clone()
    }

    fn handles(&self, content_type: &ContentType) -> bool {
        self.content_types
            .iter()
            .any(|ct| ct.is_equivalent_to(content_type))
    }

    fn configure_interaction(
        &self,
        content_type: &ContentType,
        config: &Value,
    ) -> Result<ConfiguredContents> {
        let result = self.call(
            "configureInteraction",
            json!({ "contentType": content_type.to_string(), "config": config }),
        )?;

        let body = Body::from_v4_json(result.get("body").unwrap_or(&Value::Null), Some(content_type))?;
        let rules = match result.get("rules") {
            Some(rules) => MatchingRules::from_v4_json(rules)?,
            None => MatchingRules::default(),
        };
        let generators = match result.get("generators") {
            Some(generators) => Generators::from_json(generators)?,
            None => Generators::default(),
        };
        Ok(ConfiguredContents {
            body,
            rules,
            generators,
        })
    }

    fn compare_contents(
        &self,
        expected: &Body,
        actual: &Body,
        rules: &RuleCategory,
        config: MatchingConfig,
    ) -> Result<MatchResult> {
        let result = self.call(
            "compareContents",
            json!({
                "expected": expected.to_v4_json(),
                "actual": actual.to_v4_json(),
                "rules": rules.to_json(),
                "allowUnexpectedKeys": config.allow_unexpected_keys,
            }),
        )?;

        let mismatches: Vec<PluginMismatch> = match result.get("mismatches") {
            Some(mismatches) => serde_json::from_value(mismatches.clone())?,
            None => vec![],
        };
        Ok(MatchResult::from_mismatches(
            mismatches.into_iter().map(Mismatch::from).collect(),
        ))
    }

    fn generate_contents(
        &self,
        body: &Body,
        generators: &BTreeMap<DocPath, Generator>,
        context: &Map<String, Value>,
    ) -> Result<Body> {
        let generators: Map<String, Value> = generators
            .iter()
            .map(|(path, generator)| (path.to_string(), generator.to_json()))
            .collect();
        let result = self.call(
            "generateContent",
            json!({ "body": body.to_v4_json(), "generators": generators, "context": context }),
        )?;

        match result.get("body") {
            Some(generated) => Body::from_v4_json(generated, body.content_type()),
            None => Ok(body.clone()),
        }
    }
}

impl Drop for ProcessHandler {
    fn drop(&mut self) {
        let process = match self.process.get_mut() {
            Ok(process) => process.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(mut process) = process {
            let id = self.next_id.fetch_add(1, Ordering::SeqCst);
            process.shutdown(id);
            debug!(plugin = %self.manifest.name, "Stopped plugin process");
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::fs;

    const ECHO_PLUGIN: &str = r#"
while IFS= read -r line; do
  id=$(printf '%s\n' "$line" | sed -n 's/^{"id":\([0-9][0-9]*\).*/\1/p')
  printf '{"id":%s,"result":{"body":{"content":"hi","contentType":"application/x-test"},"mismatches":[]}}\n' "$id"
done
"#;

    fn handler(script: &str, timeout: Duration) -> (tempfile::TempDir, ProcessHandler) {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("plugin.sh"), script).unwrap();
        let manifest = PluginManifest {
            name: "test-plugin".into(),
            version: "0.3.1".into(),
            entry_point: "/bin/sh".into(),
            content_types: vec!["application/x-test".into()],
            args: vec!["plugin.sh".into()],
        };
        let handler = ProcessHandler::new(manifest, dir.path(), timeout).unwrap();
        (dir, handler)
    }

    #[test]
    fn talks_to_a_plugin_process() {
        let (_dir, handler) = handler(ECHO_PLUGIN, Duration::from_secs(10));
        let content_type = ContentType::parse("application/x-test").unwrap();
        assert!(handler.handles(&content_type));
        assert_eq!(handler.version(), semver::Version::new(0, 3, 1));

        let contents = handler
            .configure_interaction(&content_type, &json!({"anything": true}))
            .unwrap();
        assert_eq!(contents.body.bytes(), bytes::Bytes::from_static(b"hi"));

        let result = handler
            .compare_contents(
                &contents.body,
                &contents.body,
                &RuleCategory::default(),
                MatchingConfig::default(),
            )
            .unwrap();
        assert!(result.is_match());
    }

    #[test]
    fn silent_plugin_times_out() {
        let (_dir, handler) = handler("cat > /dev/null\n", Duration::from_millis(200));
        let error = handler
            .configure_interaction(&ContentType::parse("application/x-test").unwrap(), &json!({}))
            .unwrap_err();
        assert!(matches!(error, Error::HandlerUnavailable { ref name, .. } if name == "test-plugin"));
    }

    #[test]
    fn exited_plugin_is_unavailable() {
        let (_dir, handler) = handler("exit 0\n", Duration::from_secs(10));
        let error = handler
            .configure_interaction(&ContentType::parse("application/x-test").unwrap(), &json!({}))
            .unwrap_err();
        assert!(matches!(error, Error::HandlerUnavailable { .. }));
    }
}
