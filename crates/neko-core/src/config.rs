//! Configuration module
//!
//! All settings come from the environment (a `.env` file is honored). The
//! only hard requirements are the bot token and the primary channel id;
//! everything else has a sensible default.

use std::env;
use std::path::PathBuf;

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_DATABASE_PATH: &str = "./neko.db";
const DEFAULT_DISCORD_API_BASE: &str = "https://discord.com/api/v10";

#[derive(Clone, Debug)]
pub struct Config {
    pub server_port: u16,
    /// Shared secret for the whole API. `None` disables authentication.
    pub api_secret: Option<String>,
    pub bot_token: String,
    /// Write target for object chunks.
    pub channel_id: String,
    /// Snapshot target and URL-refresh fallback. Optional.
    pub backup_channel_id: Option<String>,
    pub database_path: PathBuf,
    /// Overridable so tests can point the adapter at a local mock.
    pub discord_api_base: String,
    pub cors_origins: Vec<String>,
    pub debug: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        let bot_token = env::var("DISCORD_BOT_TOKEN")
            .map_err(|_| anyhow::anyhow!("DISCORD_BOT_TOKEN must be set"))?;
        let channel_id = env::var("DISCORD_CHANNEL_ID")
            .map_err(|_| anyhow::anyhow!("DISCORD_CHANNEL_ID must be set"))?;

        let api_secret = env::var("API_SECRET").ok().filter(|s| !s.is_empty());
        let backup_channel_id = env::var("DISCORD_BACKUP_CHANNEL_ID")
            .ok()
            .filter(|s| !s.is_empty());

        let server_port = env::var("PORT")
            .unwrap_or_else(|_| DEFAULT_PORT.to_string())
            .parse()
            .map_err(|_| anyhow::anyhow!("PORT must be a valid number"))?;

        let database_path = PathBuf::from(
            env::var("DATABASE_PATH").unwrap_or_else(|_| DEFAULT_DATABASE_PATH.to_string()),
        );

        let discord_api_base = env::var("DISCORD_API_BASE")
            .unwrap_or_else(|_| DEFAULT_DISCORD_API_BASE.to_string())
            .trim_end_matches('/')
            .to_string();

        let cors_origins: Vec<String> = env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "*".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let debug = env::var("DEBUG")
            .map(|v| {
                let v = v.to_lowercase();
                v == "1" || v == "true" || v == "yes"
            })
            .unwrap_or(false);

        Ok(Self {
            server_port,
            api_secret,
            bot_token,
            channel_id,
            backup_channel_id,
            database_path,
            discord_api_base,
            cors_origins,
            debug,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_flag_parsing() {
        for (input, expected) in [("1", true), ("true", true), ("YES", true), ("0", false)] {
            let v = input.to_lowercase();
            let parsed = v == "1" || v == "true" || v == "yes";
            assert_eq!(parsed, expected, "input {input:?}");
        }
    }

    #[test]
    fn test_api_base_default_has_no_trailing_slash() {
        assert!(!DEFAULT_DISCORD_API_BASE.ends_with('/'));
    }
}
