//! Server configuration loading from file and environment variables.

use chrono_tz::Tz;
use serde::Deserialize;
use skipper_agent::{CustomerEntry, LlmConfig, Phrases};
use skipper_tools::EmailConfig;
use skipper_voice::{TelephonyConfig, VoiceSettings};
use std::net::{IpAddr, Ipv4Addr};
use thiserror::Error;

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// Twilio account and business number.
    #[serde(default)]
    pub telephony: TelephonyConfig,

    /// Call flow tuning: hold music, timings, operator hand-off, voices.
    #[serde(default)]
    pub voice: VoiceConfig,

    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub messaging: MessagingConfig,

    #[serde(default)]
    pub turns: TurnsConfig,

    #[serde(default)]
    pub knowledge: KnowledgeConfig,

    #[serde(default)]
    pub crm: CrmConfig,

    #[serde(default)]
    pub business: BusinessConfig,

    /// Owner order e-mails over SMTP.
    #[serde(default)]
    pub email: EmailConfig,

    /// Fixed lines spoken on calls or sent as messages.
    #[serde(default)]
    pub phrases: Phrases,
}

/// Network configuration for the HTTP server.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Externally reachable base URL. Live-call redirects need an absolute
    /// address.
    #[serde(default = "default_public_url")]
    pub public_url: String,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "skipper_server=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VoiceConfig {
    #[serde(default = "default_hold_music_url")]
    pub hold_music_url: String,

    /// Repeat count of the hold music played while a turn is generated.
    #[serde(default = "default_hold_music_loops")]
    pub hold_music_loops: u32,

    /// Hold music is never cut off before this many milliseconds.
    #[serde(default = "default_min_hold_ms")]
    pub min_hold_ms: u64,

    #[serde(default = "default_poll_pause_secs")]
    pub poll_pause_secs: u32,

    /// Silent reprompts before the call is closed.
    #[serde(default = "default_max_silent_retries")]
    pub max_silent_retries: u32,

    #[serde(default)]
    pub operator_number: String,

    #[serde(default = "default_operator_ring_timeout_secs")]
    pub operator_ring_timeout_secs: u32,

    #[serde(default)]
    pub voices: VoiceSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessagingConfig {
    /// Receives forwarded media (payment receipts) and booking alerts.
    #[serde(default)]
    pub owner_phone: String,

    /// How long inbound message ids are remembered.
    #[serde(default = "default_dedup_window_secs")]
    pub dedup_window_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TurnsConfig {
    /// Age after which an undrained turn task is discarded.
    #[serde(default = "default_task_ttl_secs")]
    pub task_ttl_secs: u64,

    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct KnowledgeConfig {
    /// Directory of `.txt`/`.md` documents used for retrieval.
    #[serde(default = "default_documents_dir")]
    pub documents_dir: String,

    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CrmConfig {
    #[serde(default)]
    pub customers: Vec<CustomerEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BusinessConfig {
    /// IANA zone of the business, e.g. `Asia/Jerusalem`.
    #[serde(default = "default_timezone")]
    pub timezone: Tz,

    #[serde(default)]
    pub payment_link: String,

    /// File holding the next order number. Empty keeps the counter in
    /// memory.
    #[serde(default = "default_order_counter_path")]
    pub order_counter_path: String,
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
}

fn default_port() -> u16 {
    1337
}

fn default_public_url() -> String {
    "http://localhost:1337".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_hold_music_url() -> String {
    "https://mabotmusik-2585.twil.io/mb.mp3".to_string()
}

fn default_hold_music_loops() -> u32 {
    10
}

fn default_min_hold_ms() -> u64 {
    2000
}

fn default_poll_pause_secs() -> u32 {
    1
}

fn default_max_silent_retries() -> u32 {
    3
}

fn default_operator_ring_timeout_secs() -> u32 {
    20
}

fn default_dedup_window_secs() -> u64 {
    600
}

fn default_task_ttl_secs() -> u64 {
    900
}

fn default_sweep_interval_secs() -> u64 {
    60
}

fn default_documents_dir() -> String {
    "knowledge".to_string()
}

fn default_top_k() -> usize {
    3
}

fn default_timezone() -> Tz {
    Tz::Asia__Jerusalem
}

fn default_order_counter_path() -> String {
    "data/order_counter.json".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            public_url: default_public_url(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            hold_music_url: default_hold_music_url(),
            hold_music_loops: default_hold_music_loops(),
            min_hold_ms: default_min_hold_ms(),
            poll_pause_secs: default_poll_pause_secs(),
            max_silent_retries: default_max_silent_retries(),
            operator_number: String::new(),
            operator_ring_timeout_secs: default_operator_ring_timeout_secs(),
            voices: VoiceSettings::default(),
        }
    }
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self {
            owner_phone: String::new(),
            dedup_window_secs: default_dedup_window_secs(),
        }
    }
}

impl Default for TurnsConfig {
    fn default() -> Self {
        Self {
            task_ttl_secs: default_task_ttl_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            documents_dir: default_documents_dir(),
            top_k: default_top_k(),
        }
    }
}

impl Default for BusinessConfig {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            payment_link: String::new(),
            order_counter_path: default_order_counter_path(),
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Loads configuration from a TOML file, falling back to defaults.
///
/// Environment variable overrides:
/// - `SKIPPER_HOST`, `SKIPPER_PORT`, `SKIPPER_PUBLIC_URL` override `[server]`
/// - `SKIPPER_LOG_LEVEL` and `SKIPPER_LOG_JSON` override `[logging]`
/// - `TWILIO_ACCOUNT_SID`, `TWILIO_AUTH_TOKEN`, `TWILIO_NUMBER` override `[telephony]`
/// - `LLM_API_KEY`, `LLM_BASE_URL`, `LLM_MODEL` override `[llm]`
/// - `HOLD_MUSIC_URL` and `OPERATOR_NUMBER` override `[voice]`
/// - `SKIPPER_TIMEZONE` overrides `[business]`
/// - `EMAIL_USER`, `EMAIL_PASS`, `EMAIL_TO` override `[email]`
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    Ok(config)
}

/// Applies overrides from `lookup`, which maps a variable name to its value.
pub fn apply_env_overrides(config: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(host) = lookup("SKIPPER_HOST") {
        if let Ok(parsed) = host.parse() {
            config.server.host = parsed;
        }
    }
    if let Some(port) = lookup("SKIPPER_PORT") {
        if let Ok(parsed) = port.parse() {
            config.server.port = parsed;
        }
    }
    if let Some(url) = lookup("SKIPPER_PUBLIC_URL") {
        config.server.public_url = url;
    }
    if let Some(level) = lookup("SKIPPER_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(json) = lookup("SKIPPER_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }
    if let Some(sid) = lookup("TWILIO_ACCOUNT_SID") {
        config.telephony.account_sid = sid;
    }
    if let Some(token) = lookup("TWILIO_AUTH_TOKEN") {
        config.telephony.auth_token = token;
    }
    if let Some(number) = lookup("TWILIO_NUMBER") {
        config.telephony.phone_number = number;
    }
    if let Some(key) = lookup("LLM_API_KEY") {
        config.llm.api_key = key;
    }
    if let Some(base) = lookup("LLM_BASE_URL") {
        config.llm.base_url = base;
    }
    if let Some(model) = lookup("LLM_MODEL") {
        config.llm.model = model;
    }
    if let Some(url) = lookup("HOLD_MUSIC_URL") {
        config.voice.hold_music_url = url;
    }
    if let Some(number) = lookup("OPERATOR_NUMBER") {
        config.voice.operator_number = number;
    }
    if let Some(zone) = lookup("SKIPPER_TIMEZONE") {
        if let Ok(parsed) = zone.parse() {
            config.business.timezone = parsed;
        }
    }
    if let Some(user) = lookup("EMAIL_USER") {
        config.email.username = user;
    }
    if let Some(pass) = lookup("EMAIL_PASS") {
        config.email.password = pass;
    }
    if let Some(to) = lookup("EMAIL_TO") {
        config.email.to = to;
    }
}
