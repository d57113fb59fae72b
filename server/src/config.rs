use clap::Parser;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Pairline presence and video-matching server
#[derive(Parser, Serialize, Deserialize, Clone, Debug)]
#[command(
    name = "pairline-server",
    version,
    about = "Pairline presence and video-matching server"
)]
pub struct Config {
    /// Port to listen on
    #[arg(long, env = "PAIRLINE_PORT", default_value = "4700")]
    pub port: u16,

    /// Bind address
    #[arg(long, env = "PAIRLINE_BIND_ADDRESS", default_value = "0.0.0.0")]
    pub bind_address: String,

    /// Path to TOML config file
    #[arg(long, default_value = "./pairline.toml")]
    pub config: String,

    /// Enable structured JSON logging (for Docker/production)
    #[arg(long, env = "PAIRLINE_JSON_LOGS")]
    pub json_logs: bool,

    /// Output a commented TOML config template and exit
    #[arg(long)]
    pub generate_config: bool,

    /// Data directory for persistent state (DB, keys)
    #[arg(long, env = "PAIRLINE_DATA_DIR", default_value = "./data")]
    pub data_dir: String,

    /// Maximum chat message length in characters
    #[arg(long, env = "PAIRLINE_MAX_MESSAGE_LEN", default_value = "2000")]
    pub max_message_len: usize,

    /// Seconds between periodic matching rounds over the call queue
    #[arg(long, env = "PAIRLINE_MATCH_INTERVAL_SECS", default_value = "3")]
    pub match_interval_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 4700,
            bind_address: "0.0.0.0".to_string(),
            config: "./pairline.toml".to_string(),
            json_logs: false,
            generate_config: false,
            data_dir: "./data".to_string(),
            max_message_len: 2000,
            match_interval_secs: 3,
        }
    }
}

impl Config {
    /// Load config with layered precedence:
    /// built-in defaults < TOML file < env vars (PAIRLINE_*) < CLI args
    pub fn load() -> Result<Self, figment::Error> {
        let cli = Config::parse();
        let config_path = cli.config.clone();

        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_path))
            .merge(Env::prefixed("PAIRLINE_"))
            .merge(Serialized::defaults(cli))
            .extract()
    }
}

/// Generate a commented TOML config template
pub fn generate_config_template() -> String {
    r#"# Pairline Server Configuration
# Place this file at ./pairline.toml or specify with --config <path>
# All settings can be overridden via environment variables (PAIRLINE_PORT, etc.)
# or CLI flags (--port, etc.)

# Server port (default: 4700)
# port = 4700

# Bind address (default: 0.0.0.0 — all interfaces)
# bind_address = "0.0.0.0"

# Enable structured JSON logging for Docker/production
# json_logs = false

# Data directory for SQLite database and JWT signing key
# data_dir = "./data"

# Maximum chat message length in characters (default: 2000)
# max_message_len = 2000

# Seconds between periodic matching rounds over the call queue (default: 3)
# Rounds also run on demand whenever a user joins the queue.
# match_interval_secs = 3
"#
    .to_string()
}
