use clap::Parser;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Parley real-time chat server
#[derive(Parser, Serialize, Deserialize, Clone, Debug)]
#[command(name = "parley-server", version, about = "Parley real-time chat server")]
pub struct Config {
    /// Port to listen on
    #[arg(long, env = "PARLEY_PORT", default_value = "3000")]
    pub port: u16,

    /// Bind address
    #[arg(long, env = "PARLEY_BIND_ADDRESS", default_value = "0.0.0.0")]
    pub bind_address: String,

    /// Path to TOML config file
    #[arg(long, default_value = "./parley.toml")]
    pub config: String,

    /// Enable structured JSON logging (for Docker/production)
    #[arg(long, env = "PARLEY_JSON_LOGS")]
    pub json_logs: bool,

    /// Output a commented TOML config template and exit
    #[arg(long)]
    pub generate_config: bool,

    /// Data directory for the SQLite database
    #[arg(long, env = "PARLEY_DATA_DIR", default_value = "./data")]
    pub data_dir: String,

    /// Maximum number of messages returned by a history replay
    #[arg(long, env = "PARLEY_HISTORY_LIMIT", default_value = "50")]
    pub history_limit: usize,

    /// Upper bound on a single database call, in milliseconds
    #[arg(long, env = "PARLEY_GATEWAY_TIMEOUT_MS", default_value = "5000")]
    pub gateway_timeout_ms: u64,

    /// Seconds between server pings on each WebSocket
    #[arg(long, env = "PARLEY_PING_INTERVAL_SECS", default_value = "30")]
    pub ping_interval_secs: u64,

    /// Seconds to wait for a pong before closing the WebSocket
    #[arg(long, env = "PARLEY_PONG_TIMEOUT_SECS", default_value = "10")]
    pub pong_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3000,
            bind_address: "0.0.0.0".to_string(),
            config: "./parley.toml".to_string(),
            json_logs: false,
            generate_config: false,
            data_dir: "./data".to_string(),
            history_limit: 50,
            gateway_timeout_ms: 5000,
            ping_interval_secs: 30,
            pong_timeout_secs: 10,
        }
    }
}

impl Config {
    /// Load config with layered precedence:
    /// built-in defaults < TOML file < env vars (PARLEY_*) < CLI args
    pub fn load() -> Result<Self, figment::Error> {
        let cli = Config::parse();
        let config_path = cli.config.clone();

        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_path))
            .merge(Env::prefixed("PARLEY_"))
            .merge(Serialized::defaults(cli))
            .extract::<Config>()
            .and_then(|config| config.validate().map(|()| config))
    }

    /// Every limit, timeout and interval must be non-zero.
    pub fn validate(&self) -> Result<(), figment::Error> {
        let zeroed = [
            ("history_limit", self.history_limit as u64),
            ("gateway_timeout_ms", self.gateway_timeout_ms),
            ("ping_interval_secs", self.ping_interval_secs),
            ("pong_timeout_secs", self.pong_timeout_secs),
        ];
        match zeroed.iter().find(|(_, value)| *value == 0) {
            Some((field, _)) => Err(figment::Error::from(format!(
                "{} must be greater than zero",
                field
            ))),
            None => Ok(()),
        }
    }

    pub fn gateway_timeout(&self) -> Duration {
        Duration::from_millis(self.gateway_timeout_ms)
    }
}

/// Generate a commented TOML config template
pub fn generate_config_template() -> String {
    r#"# Parley Server Configuration
# Place this file at ./parley.toml or specify with --config <path>
# All settings can be overridden via environment variables (PARLEY_PORT, etc.)
# or CLI flags (--port, etc.)

# Server port (default: 3000)
# port = 3000

# Bind address (default: 0.0.0.0, all interfaces)
# bind_address = "0.0.0.0"

# Enable structured JSON logging for Docker/production
# json_logs = false

# Data directory for the SQLite database
# data_dir = "./data"

# Messages returned by a history request (default: 50)
# history_limit = 50

# A database call that takes longer than this is abandoned and logged
# gateway_timeout_ms = 5000

# WebSocket liveness: ping every N seconds, close if no pong within M seconds.
# Limits, timeouts and intervals must be greater than zero.
# ping_interval_secs = 30
# pong_timeout_secs = 10
"#
    .to_string()
}
