use std::net::SocketAddr;
use std::path::PathBuf;

use serde::Deserialize;
use tracing::{debug, trace};

use crate::alerts::channels::SmtpSettings;
use crate::health::{ModuleDefinition, default_modules};
use crate::probes::LlmProvider;
use crate::util::get_env;

/// Process configuration, read from a JSON file and then overridden from
/// the environment
#[derive(Debug, Clone, Deserialize)]
pub struct PulseConfig {
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub probes: ProbesConfig,

    /// Modules and their metric thresholds; built-in set when absent
    #[serde(default = "default_modules")]
    pub modules: Vec<ModuleDefinition>,

    #[serde(default)]
    pub channels: ChannelsConfig,

    #[serde(default)]
    pub api: ApiSettings,
}

impl Default for PulseConfig {
    fn default() -> Self {
        Self {
            scheduler: SchedulerConfig::default(),
            storage: StorageConfig::default(),
            probes: ProbesConfig::default(),
            modules: default_modules(),
            channels: ChannelsConfig::default(),
            api: ApiSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
        }
    }
}

fn default_interval_secs() -> u64 {
    5
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Durable time-series backend; in-memory only when unset
    pub redis_url: Option<String>,

    /// SQLite file holding alert configurations and events
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            redis_url: None,
            database_path: default_database_path(),
        }
    }
}

fn default_database_path() -> PathBuf {
    PathBuf::from("./pulse.db")
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProbesConfig {
    #[serde(default = "default_shallow_timeout_ms")]
    pub shallow_timeout_ms: u64,

    #[serde(default = "default_deep_timeout_ms")]
    pub deep_timeout_ms: u64,

    /// Redis lists inspected by the queue probe
    #[serde(default = "default_queues")]
    pub queues: Vec<String>,

    #[serde(default = "default_max_queue_depth")]
    pub max_queue_depth: u64,

    #[serde(default)]
    pub llm_providers: Vec<LlmProvider>,

    #[serde(default)]
    pub gateway: GatewayConfig,
}

impl Default for ProbesConfig {
    fn default() -> Self {
        Self {
            shallow_timeout_ms: default_shallow_timeout_ms(),
            deep_timeout_ms: default_deep_timeout_ms(),
            queues: default_queues(),
            max_queue_depth: default_max_queue_depth(),
            llm_providers: Vec::new(),
            gateway: GatewayConfig::default(),
        }
    }
}

fn default_shallow_timeout_ms() -> u64 {
    5_000
}

fn default_deep_timeout_ms() -> u64 {
    15_000
}

fn default_queues() -> Vec<String> {
    vec!["jobs".to_string()]
}

fn default_max_queue_depth() -> u64 {
    1_000
}

/// Messaging gateway, probed as `whatsapp` and used by the whatsapp channel
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GatewayConfig {
    pub base_url: Option<String>,
    pub token: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChannelsConfig {
    pub smtp: Option<SmtpSettings>,
    pub webhook: Option<WebhookConfig>,
    pub discord: Option<DiscordConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookConfig {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DiscordConfig {
    pub url: String,
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiSettings {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,

    /// Bearer token required on every request when set
    pub auth_token: Option<String>,

    #[serde(default = "default_enable_cors")]
    pub enable_cors: bool,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            auth_token: None,
            enable_cors: default_enable_cors(),
        }
    }
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

fn default_enable_cors() -> bool {
    true
}

/// `<PROVIDER>_API_KEY` for a provider name, e.g. `OPENAI_API_KEY`
pub fn provider_key_var(provider: &str) -> String {
    let normalized: String = provider
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("{normalized}_API_KEY")
}

impl PulseConfig {
    /// Apply overrides from process environment variables
    pub fn apply_env(self) -> Self {
        self.apply_overrides(get_env)
    }

    /// Apply overrides from an arbitrary lookup, environment style keys
    pub fn apply_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(secs) = lookup("PULSE_INTERVAL_SECS").and_then(|s| s.parse().ok()) {
            self.scheduler.interval_secs = secs;
        }
        if let Some(url) = lookup("PULSE_REDIS_URL") {
            self.storage.redis_url = Some(url);
        }
        if let Some(url) = lookup("PULSE_DATABASE_URL") {
            let path = url.strip_prefix("sqlite://").unwrap_or(&url);
            self.storage.database_path = PathBuf::from(path);
        }

        for provider in &mut self.probes.llm_providers {
            if let Some(key) = lookup(&provider_key_var(&provider.name)) {
                provider.api_key = Some(key);
            }
        }

        if let Some(url) = lookup("WHATSAPP_GATEWAY_URL") {
            self.probes.gateway.base_url = Some(url);
        }
        if let Some(token) = lookup("WHATSAPP_GATEWAY_TOKEN") {
            self.probes.gateway.token = Some(token);
        }

        if let Some(host) = lookup("SMTP_HOST") {
            let smtp = self.channels.smtp.get_or_insert_with(|| SmtpSettings {
                host: host.clone(),
                port: 587,
                username: None,
                password: None,
                from: "Pulse <pulse@localhost>".to_string(),
            });
            smtp.host = host;
        }
        if let Some(smtp) = &mut self.channels.smtp {
            if let Some(port) = lookup("SMTP_PORT").and_then(|p| p.parse().ok()) {
                smtp.port = port;
            }
            if let Some(username) = lookup("SMTP_USERNAME") {
                smtp.username = Some(username);
            }
            if let Some(password) = lookup("SMTP_PASSWORD") {
                smtp.password = Some(password);
            }
            if let Some(from) = lookup("SMTP_FROM") {
                smtp.from = from;
            }
        }

        if let Some(token) = lookup("PULSE_API_TOKEN") {
            self.api.auth_token = Some(token);
        }
        if let Some(addr) = lookup("PULSE_BIND_ADDR").and_then(|a| a.parse().ok()) {
            self.api.bind_addr = addr;
        }

        debug!("applied environment overrides");
        self
    }
}

pub fn read_config_file(path: &str) -> anyhow::Result<PulseConfig> {
    let file_content = std::fs::read_to_string(path)?;
    serde_json::from_str(&file_content)
        .map_err(|e| anyhow::anyhow!("Invalid configuration file provided: {e}"))
        .inspect(|config| trace!("loaded config: {config:?}"))
}

/// Read `path` when given, built-in defaults otherwise; environment applied last
pub fn load(path: Option<&str>) -> anyhow::Result<PulseConfig> {
    let config = match path {
        Some(path) => read_config_file(path)?,
        None => PulseConfig::default(),
    };
    Ok(config.apply_env())
}
