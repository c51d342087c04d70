use crate::{
    content::{self, HandlerRegistry},
    error::{Error, Result},
    matching::MatchingConfig,
    model::PactSpecVersion,
    persistence::WriteMode,
};
use std::{
    collections::BTreeSet,
    env,
    net::{IpAddr, Ipv4Addr},
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

const DEFAULT_OUTPUT_DIR: &str = "target/pacts";
const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct MockServerConfig {
    host: IpAddr,
    port: u16,
    shutdown_grace: Duration,
    cors_preflight: bool,
    active_states: Option<BTreeSet<String>>,
    matching: MatchingConfig,
    registry: Option<Arc<HandlerRegistry>>,
    output_dir: PathBuf,
    write_mode: WriteMode,
    spec_version: PactSpecVersion,
}

impl Default for MockServerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 0,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
            cors_preflight: false,
            active_states: None,
            matching: MatchingConfig::default(),
            registry: None,
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            write_mode: WriteMode::default(),
            spec_version: PactSpecVersion::V4,
        }
    }
}

impl MockServerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overridden by `COVENANT_OUTPUT_DIR`, `COVENANT_HOST`,
    /// `COVENANT_WRITE_MODE` and `COVENANT_SHUTDOWN_GRACE_MS`.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(dir) = env::var("COVENANT_OUTPUT_DIR") {
            config.set_output_dir(dir);
        }
        if let Ok(host) = env::var("COVENANT_HOST") {
            let host = host
                .parse()
                .map_err(|_| Error::InvalidConfig(format!("COVENANT_HOST '{}' is not an IP address", host)))?;
            config.set_host(host);
        }
        if let Ok(mode) = env::var("COVENANT_WRITE_MODE") {
            config.set_write_mode(mode.parse()?);
        }
        if let Ok(grace) = env::var("COVENANT_SHUTDOWN_GRACE_MS") {
            let millis = grace.trim().parse::<u64>().map_err(|_| {
                Error::InvalidConfig(format!("COVENANT_SHUTDOWN_GRACE_MS '{}' is not a number", grace))
            })?;
            config.set_shutdown_grace(Duration::from_millis(millis));
        }

        Ok(config)
    }

    pub fn set_host(&mut self, host: IpAddr) -> &mut Self {
        self.host = host;
        self
    }

    pub fn host(&self) -> IpAddr {
        self.host
    }

    /// Zero asks the operating system for a free port.
    pub fn set_port(&mut self, port: u16) -> &mut Self {
        self.port = port;
        self
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn set_shutdown_grace(&mut self, grace: Duration) -> &mut Self {
        self.shutdown_grace = grace;
        self
    }

    pub fn shutdown_grace(&self) -> Duration {
        self.shutdown_grace
    }

    /// Answer CORS pre-flight requests instead of matching them.
    pub fn set_cors_preflight(&mut self, value: bool) -> &mut Self {
        self.cors_preflight = value;
        self
    }

    pub fn cors_preflight(&self) -> bool {
        self.cors_preflight
    }

    /// Restrict the provider states considered active. Without this every
    /// declared state is active.
    pub fn set_active_states<I, S>(&mut self, states: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.active_states = Some(states.into_iter().map(Into::into).collect());
        self
    }

    pub fn is_state_active(&self, name: &str) -> bool {
        self.active_states
            .as_ref()
            .map_or(true, |states| states.contains(name))
    }

    pub fn set_matching(&mut self, matching: MatchingConfig) -> &mut Self {
        self.matching = matching;
        self
    }

    pub fn matching(&self) -> MatchingConfig {
        self.matching
    }

    pub fn set_registry(&mut self, registry: Arc<HandlerRegistry>) -> &mut Self {
        self.registry = Some(registry);
        self
    }

    /// The configured registry, or the process-wide one.
    pub fn registry(&self) -> Arc<HandlerRegistry> {
        self.registry.clone().unwrap_or_else(content::global)
    }

    pub fn set_output_dir<P: Into<PathBuf>>(&mut self, dir: P) -> &mut Self {
        self.output_dir = dir.into();
        self
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn set_write_mode(&mut self, mode: WriteMode) -> &mut Self {
        self.write_mode = mode;
        self
    }

    pub fn write_mode(&self) -> WriteMode {
        self.write_mode
    }

    pub fn set_spec_version(&mut self, version: PactSpecVersion) -> &mut Self {
        self.spec_version = version;
        self
    }

    pub fn spec_version(&self) -> PactSpecVersion {
        self.spec_version
    }
}
