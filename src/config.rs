//! Process configuration: required secrets from the environment, tunables from
//! an optional TOML file.

use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{RelayError, Result};
use crate::payload::RevisionMode;
use crate::workspace::WorkspaceMode;

pub const SECRET_ENV: &str = "GITHUB_WEBHOOK_SECRET";
pub const TOPIC_ENV: &str = "EVENT_TOPIC";
pub const BIND_ADDRESS_ENV: &str = "BIND_ADDRESS";
pub const CONFIG_PATH_ENV: &str = "RELAY_CONFIG";

pub const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1:8888";
pub const DEFAULT_CONFIG_PATH: &str = "relay_config.toml";

/// Shared webhook secret. Never printed.
#[derive(Clone)]
pub struct WebhookSecret(String);

impl WebhookSecret {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for WebhookSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("WebhookSecret(***)")
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    pub base_dir: PathBuf,
    pub mode: WorkspaceMode,
    pub cleanup_on_finish: bool,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("/tmp"),
            mode: WorkspaceMode::PerJob,
            cleanup_on_finish: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GitConfig {
    /// Program used to clone and check out.
    pub binary: String,
    /// Tool path recorded in the SCM descriptor for the engine.
    pub tool_path: String,
    pub shallow_depth: Option<u32>,
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            binary: "git".to_string(),
            tool_path: "/usr/bin/git".to_string(),
            shallow_depth: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub binary: String,
    pub war_path: PathBuf,
    pub plugins_dir: PathBuf,
    pub pipeline_file: String,
    pub pass_scm_descriptor: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            binary: "jenkinsfile-runner".to_string(),
            war_path: PathBuf::from("/app/jenkins"),
            plugins_dir: PathBuf::from("/usr/share/jenkins/ref/plugins"),
            pipeline_file: "Jenkinsfile".to_string(),
            pass_scm_descriptor: true,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PayloadConfig {
    pub revision: RevisionMode,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub validate_before_publish: bool,
    /// Largest request body the webhook route accepts.
    pub max_body_bytes: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            validate_before_publish: false,
            // GitHub caps webhook payloads at 25 MB.
            max_body_bytes: 25 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    pub capacity: usize,
    pub max_deliveries: u32,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            capacity: 64,
            max_deliveries: 3,
        }
    }
}

/// Everything that may come from the TOML file. All sections are optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FileSettings {
    pub workspace: WorkspaceConfig,
    pub git: GitConfig,
    pub engine: EngineConfig,
    pub payload: PayloadConfig,
    pub gateway: GatewayConfig,
    pub bus: BusConfig,
}

impl FileSettings {
    /// Read and parse the settings file. A missing file yields defaults unless
    /// `required` is set.
    pub fn load(path: &Path, required: bool) -> Result<Self> {
        if !required && !path.exists() {
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path).map_err(|e| {
            RelayError::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::parse(&contents).map_err(|e| {
            RelayError::Config(format!(
                "Failed to parse config file '{}': {}",
                path.display(),
                e
            ))
        })
    }

    pub fn parse(contents: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }
}

/// Immutable process configuration, built once at start-up and shared by
/// reference with the gateway and the worker.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub secret: WebhookSecret,
    pub topic: String,
    pub bind_address: String,
    pub config_path: Option<PathBuf>,
    pub workspace: WorkspaceConfig,
    pub git: GitConfig,
    pub engine: EngineConfig,
    pub payload: PayloadConfig,
    pub gateway: GatewayConfig,
    pub bus: BusConfig,
}

impl RelayConfig {
    pub fn new(secret: WebhookSecret, topic: impl Into<String>, settings: FileSettings) -> Self {
        Self {
            secret,
            topic: topic.into(),
            bind_address: DEFAULT_BIND_ADDRESS.to_string(),
            config_path: None,
            workspace: settings.workspace,
            git: settings.git,
            engine: settings.engine,
            payload: settings.payload,
            gateway: settings.gateway,
            bus: settings.bus,
        }
    }

    /// Load from the process environment (after `.env`, if present).
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let secret = require(&lookup, SECRET_ENV)?;
        let topic = require(&lookup, TOPIC_ENV)?;

        let (config_path, required) = match lookup(CONFIG_PATH_ENV) {
            Some(path) => (PathBuf::from(path), true),
            None => (PathBuf::from(DEFAULT_CONFIG_PATH), false),
        };
        let settings = FileSettings::load(&config_path, required)?;

        let mut config = Self::new(WebhookSecret::new(secret), topic, settings);
        config.config_path = config_path.exists().then_some(config_path);
        if let Some(bind) = lookup(BIND_ADDRESS_ENV) {
            config.bind_address = bind;
        }
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.bus.capacity == 0 {
            return Err(RelayError::Config("bus.capacity must be at least 1".into()));
        }
        if self.bus.max_deliveries == 0 {
            return Err(RelayError::Config(
                "bus.max_deliveries must be at least 1".into(),
            ));
        }
        if self.engine.pipeline_file.trim().is_empty() {
            return Err(RelayError::Config("engine.pipeline_file is empty".into()));
        }
        Ok(())
    }
}

fn require<F>(lookup: &F, key: &str) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(RelayError::Config(format!(
            "environment variable {} is required",
            key
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> + use<> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn missing_secret_is_fatal() {
        let err = RelayConfig::from_lookup(lookup_from(&[(TOPIC_ENV, "events")])).unwrap_err();
        assert!(matches!(err, RelayError::Config(msg) if msg.contains(SECRET_ENV)));
    }

    #[test]
    fn empty_topic_is_fatal() {
        let err = RelayConfig::from_lookup(lookup_from(&[(SECRET_ENV, "s3cr3t"), (TOPIC_ENV, "")]))
            .unwrap_err();
        assert!(matches!(err, RelayError::Config(msg) if msg.contains(TOPIC_ENV)));
    }

    #[test]
    fn explicit_config_file_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        let err = RelayConfig::from_lookup(lookup_from(&[
            (SECRET_ENV, "s3cr3t"),
            (TOPIC_ENV, "events"),
            (CONFIG_PATH_ENV, missing.to_str().unwrap()),
        ]))
        .unwrap_err();
        assert!(matches!(err, RelayError::Config(_)));
    }

    #[test]
    fn file_settings_override_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relay.toml");
        fs::write(
            &path,
            r#"
            [workspace]
            base_dir = "/var/lib/relay"
            mode = "shared"

            [payload]
            revision = "commit"

            [bus]
            max_deliveries = 5
            "#,
        )
        .unwrap();

        let config = RelayConfig::from_lookup(lookup_from(&[
            (SECRET_ENV, "s3cr3t"),
            (TOPIC_ENV, "events"),
            (CONFIG_PATH_ENV, path.to_str().unwrap()),
            (BIND_ADDRESS_ENV, "0.0.0.0:9000"),
        ]))
        .unwrap();

        assert_eq!(config.workspace.base_dir, PathBuf::from("/var/lib/relay"));
        assert_eq!(config.workspace.mode, WorkspaceMode::Shared);
        assert!(config.workspace.cleanup_on_finish);
        assert_eq!(config.payload.revision, RevisionMode::Commit);
        assert_eq!(config.bus.max_deliveries, 5);
        assert_eq!(config.bus.capacity, 64);
        assert_eq!(config.engine.binary, "jenkinsfile-runner");
        assert_eq!(config.gateway.max_body_bytes, 25 * 1024 * 1024);
        assert_eq!(config.bind_address, "0.0.0.0:9000");
        assert_eq!(config.config_path.as_deref(), Some(path.as_path()));
    }

    #[test]
    fn zero_deliveries_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relay.toml");
        fs::write(&path, "[bus]\nmax_deliveries = 0\n").unwrap();
        let err = RelayConfig::from_lookup(lookup_from(&[
            (SECRET_ENV, "s3cr3t"),
            (TOPIC_ENV, "events"),
            (CONFIG_PATH_ENV, path.to_str().unwrap()),
        ]))
        .unwrap_err();
        assert!(matches!(err, RelayError::Config(_)));
    }

    #[test]
    fn secret_is_redacted_in_debug() {
        let secret = WebhookSecret::new("hunter2");
        assert_eq!(format!("{:?}", secret), "WebhookSecret(***)");
        assert_eq!(secret.expose(), "hunter2");
    }
}
