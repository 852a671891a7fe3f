//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `./wabot.json`) and environment.
//! Every field has a default, so a missing file or an empty `{}` is a valid config.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// HTTP surface settings.
    #[serde(default)]
    pub http: HttpConfig,

    /// Messaging client (bridge sidecar) settings.
    #[serde(default)]
    pub client: ClientConfig,

    /// Connect/retry behaviour of the lifecycle supervisor.
    #[serde(default)]
    pub supervisor: SupervisorConfig,

    /// Chat command handlers.
    #[serde(default)]
    pub commands: CommandsConfig,
}

/// HTTP bind, port, body limit and startup policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpConfig {
    /// Listen port (default 3000). Overridden by PORT env.
    #[serde(default = "default_http_port")]
    pub port: u16,

    /// Bind address (default "0.0.0.0").
    #[serde(default = "default_http_bind")]
    pub bind: String,

    /// Maximum accepted request body in bytes (default 50 MiB).
    #[serde(default = "default_json_limit")]
    pub json_limit_bytes: usize,

    /// When to start listening relative to client readiness.
    #[serde(default)]
    pub start: HttpStartPolicy,

    /// Bearer token required on POST routes. Overridden by WABOT_HTTP_TOKEN env.
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HttpStartPolicy {
    /// Listen at process start, before the client is connected.
    #[default]
    Immediate,

    /// Listen only once the client has reported readiness.
    AfterReady,
}

/// Bridge sidecar connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfig {
    /// Base URL of the bridge (default "http://127.0.0.1:8085"). Overridden by WABOT_BRIDGE_URL env.
    #[serde(default = "default_bridge_url")]
    pub bridge_url: String,

    /// Directory the bridge keeps its authenticated session in (default "session").
    #[serde(default = "default_session_dir")]
    pub session_dir: PathBuf,

    /// Run the bridge's browser headless (default true).
    #[serde(default = "default_true")]
    pub headless: bool,

    /// Upper bound for one initialize call in milliseconds (default 60000).
    #[serde(default = "default_init_timeout_ms")]
    pub init_timeout_ms: u64,
}

/// Retry policy and terminal behaviour of the supervisor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupervisorConfig {
    /// Initialize attempts per retry sequence (default 3, minimum 1).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Pause between attempts in milliseconds (default 5000).
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// What to do once every attempt of a sequence failed.
    #[serde(default)]
    pub on_exhausted: ExhaustedPolicy,

    /// Start a fresh retry sequence when the client reports a disconnect (default true).
    #[serde(default = "default_true")]
    pub reconnect_on_disconnect: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ExhaustedPolicy {
    /// Log and keep the HTTP surface up with an unconnected client.
    #[default]
    KeepRunning,

    /// Stop the process with a non-zero exit status.
    Exit,
}

/// Chat command settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandsConfig {
    /// Status log written by the logger and read by `!logs` (default "logs/status.log").
    #[serde(default = "default_status_log")]
    pub status_log: PathBuf,

    /// Number of lines `!logs` replies with (default 10).
    #[serde(default = "default_tail_lines")]
    pub tail_lines: usize,

    /// External script behind `!jadwaldeo`.
    #[serde(default)]
    pub schedule: ScheduleConfig,
}

/// Schedule script invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleConfig {
    /// Program to run (default "python3").
    #[serde(default = "default_schedule_program")]
    pub program: String,

    /// Arguments (default ["getSchedule.py"]).
    #[serde(default = "default_schedule_args")]
    pub args: Vec<String>,

    /// Kill the script after this many seconds (default 30).
    #[serde(default = "default_schedule_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_http_port() -> u16 {
    3000
}

fn default_http_bind() -> String {
    "0.0.0.0".to_string()
}

fn default_json_limit() -> usize {
    50 * 1024 * 1024
}

fn default_bridge_url() -> String {
    "http://127.0.0.1:8085".to_string()
}

fn default_session_dir() -> PathBuf {
    PathBuf::from("session")
}

fn default_true() -> bool {
    true
}

fn default_init_timeout_ms() -> u64 {
    60_000
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    5_000
}

fn default_status_log() -> PathBuf {
    PathBuf::from("logs").join("status.log")
}

fn default_tail_lines() -> usize {
    10
}

fn default_schedule_program() -> String {
    "python3".to_string()
}

fn default_schedule_args() -> Vec<String> {
    vec!["getSchedule.py".to_string()]
}

fn default_schedule_timeout_secs() -> u64 {
    30
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            port: default_http_port(),
            bind: default_http_bind(),
            json_limit_bytes: default_json_limit(),
            start: HttpStartPolicy::default(),
            token: None,
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            bridge_url: default_bridge_url(),
            session_dir: default_session_dir(),
            headless: true,
            init_timeout_ms: default_init_timeout_ms(),
        }
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
            on_exhausted: ExhaustedPolicy::default(),
            reconnect_on_disconnect: true,
        }
    }
}

impl SupervisorConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

impl Default for CommandsConfig {
    fn default() -> Self {
        Self {
            status_log: default_status_log(),
            tail_lines: default_tail_lines(),
            schedule: ScheduleConfig::default(),
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            program: default_schedule_program(),
            args: default_schedule_args(),
            timeout_secs: default_schedule_timeout_secs(),
        }
    }
}

/// Trimmed, non-empty env value.
fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().and_then(|s| non_empty(&s))
}

fn non_empty(s: &str) -> Option<String> {
    let t = s.trim();
    if t.is_empty() {
        None
    } else {
        Some(t.to_string())
    }
}

/// Parse a port value; anything that is not a valid u16 falls back.
fn parse_port(value: Option<&str>, fallback: u16) -> u16 {
    value
        .and_then(|v| v.trim().parse::<u16>().ok())
        .unwrap_or(fallback)
}

/// Resolve the HTTP port: env PORT overrides config.
pub fn resolve_port(config: &Config) -> u16 {
    parse_port(env_value("PORT").as_deref(), config.http.port)
}

/// Resolve the bridge base URL: env WABOT_BRIDGE_URL overrides config.
pub fn resolve_bridge_url(config: &Config) -> String {
    env_value("WABOT_BRIDGE_URL").unwrap_or_else(|| config.client.bridge_url.trim().to_string())
}

/// Resolve the HTTP bearer token: env WABOT_HTTP_TOKEN overrides config.
pub fn resolve_http_token(config: &Config) -> Option<String> {
    env_value("WABOT_HTTP_TOKEN").or_else(|| config.http.token.as_deref().and_then(non_empty))
}

/// Resolve config path from env or default (`wabot.json` in the working directory).
pub fn default_config_path() -> PathBuf {
    std::env::var("WABOT_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("wabot.json"))
}

/// Load config from the given path (or WABOT_CONFIG_PATH / default). Missing file => default config.
/// Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok((config, path))
}
