use clap::Parser;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Command-line flags. Only flags actually given override lower layers.
#[derive(Parser, Serialize, Clone, Debug, Default)]
#[command(name = "hivemind-relay", version, about = "HiveMind real-time message relay")]
pub struct Cli {
    /// Port to listen on
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Bind address
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bind_address: Option<String>,

    /// Enable structured JSON logging (for Docker/production)
    #[arg(long)]
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub json_logs: bool,

    /// Close a user's previous channel when a newer one authenticates
    #[arg(long)]
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub close_superseded: bool,

    /// Maximum inbound WebSocket message size in bytes
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_message_bytes: Option<usize>,

    /// Bearer token required on /api/relay routes
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_token: Option<String>,

    /// Path to TOML config file
    #[arg(long, env = "HIVEMIND_CONFIG", default_value = "./hivemind.toml")]
    #[serde(skip)]
    pub config: String,

    /// Output a commented TOML config template and exit
    #[arg(long)]
    #[serde(skip)]
    pub generate_config: bool,
}

/// Resolved server configuration.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct Config {
    pub port: u16,
    pub bind_address: String,
    pub json_logs: bool,
    pub close_superseded: bool,
    pub max_message_bytes: usize,
    pub api_token: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3001,
            bind_address: "0.0.0.0".to_string(),
            json_logs: false,
            close_superseded: false,
            max_message_bytes: 64 * 1024,
            api_token: None,
        }
    }
}

impl Config {
    /// Layered precedence:
    /// built-in defaults < TOML file < env vars (HIVEMIND_*) < CLI args
    pub fn figment(cli: &Cli) -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&cli.config))
            .merge(Env::prefixed("HIVEMIND_"))
            .merge(Serialized::defaults(cli))
    }

    pub fn load(cli: &Cli) -> Result<Self, figment::Error> {
        Self::figment(cli).extract()
    }

    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }
}

/// Generate a commented TOML config template
pub fn generate_config_template() -> String {
    r#"# HiveMind Relay Configuration
# Place this file at ./hivemind.toml or specify with --config <path>
# All settings can be overridden via environment variables (HIVEMIND_PORT, etc.)
# or CLI flags (--port, etc.)

# Server port (default: 3001)
# port = 3001

# Bind address (default: 0.0.0.0 — all interfaces)
# bind_address = "0.0.0.0"

# Enable structured JSON logging for Docker/production
# json_logs = false

# When a user authenticates a second channel, the first one stops receiving
# messages. Set to true to also send it a close frame (code 4000).
# close_superseded = false

# Maximum inbound WebSocket message size in bytes (default: 65536)
# max_message_bytes = 65536

# Bearer token required on /api/relay/* routes. Unset = no check.
# api_token = "change-me"
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    fn cli_with_config(path: &str) -> Cli {
        Cli {
            config: path.to_string(),
            ..Cli::default()
        }
    }

    #[test]
    fn test_defaults_without_file() {
        Jail::expect_with(|_jail| {
            let config = Config::load(&cli_with_config("missing.toml"))?;
            assert_eq!(config, Config::default());
            Ok(())
        });
    }

    #[test]
    fn test_toml_then_env_then_cli_precedence() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "hivemind.toml",
                r#"
                port = 4000
                bind_address = "127.0.0.1"
                close_superseded = true
                api_token = "from-file"
                "#,
            )?;
            jail.set_env("HIVEMIND_PORT", "5000");
            jail.set_env("HIVEMIND_API_TOKEN", "from-env");

            let mut cli = cli_with_config("hivemind.toml");
            let config = Config::load(&cli)?;
            assert_eq!(config.port, 5000);
            assert_eq!(config.bind_address, "127.0.0.1");
            assert!(config.close_superseded);
            assert_eq!(config.api_token.as_deref(), Some("from-env"));

            cli.port = Some(6000);
            let config = Config::load(&cli)?;
            assert_eq!(config.port, 6000);
            Ok(())
        });
    }

    #[test]
    fn test_unset_cli_flags_do_not_override_file() {
        Jail::expect_with(|jail| {
            jail.create_file("hivemind.toml", "json_logs = true\nmax_message_bytes = 1024")?;
            let config = Config::load(&cli_with_config("hivemind.toml"))?;
            assert!(config.json_logs);
            assert_eq!(config.max_message_bytes, 1024);
            Ok(())
        });
    }

    #[test]
    fn test_template_is_valid_toml() {
        Jail::expect_with(|jail| {
            jail.create_file("template.toml", &generate_config_template())?;
            let config = Config::load(&cli_with_config("template.toml"))?;
            assert_eq!(config, Config::default());
            Ok(())
        });
    }
}
