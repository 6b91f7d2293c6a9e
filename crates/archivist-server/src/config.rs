use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use archivist_engine::DEFAULT_COMMAND_PREFIX;

const DEFAULT_DB_PATH: &str = "messages.db";
const DEFAULT_API_URL: &str = "https://discord.com/api/v10";
const DEFAULT_GATEWAY_URL: &str = "wss://gateway.discord.gg/?v=10&encoding=json";

/// Process configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub token: String,
    pub control_channel: u64,
    pub db_path: PathBuf,
    pub command_prefix: String,
    pub api_url: String,
    pub gateway_url: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let token = get("TOKEN")
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| anyhow!("TOKEN is not set"))?;

        let control_channel = get("CHANNEL")
            .ok_or_else(|| anyhow!("CHANNEL is not set"))?
            .trim()
            .parse::<u64>()
            .context("CHANNEL must be a numeric channel id")?;

        Ok(Self {
            token,
            control_channel,
            db_path: PathBuf::from(get("ARCHIVIST_DB_PATH").unwrap_or_else(|| DEFAULT_DB_PATH.into())),
            command_prefix: get("ARCHIVIST_COMMAND").unwrap_or_else(|| DEFAULT_COMMAND_PREFIX.into()),
            api_url: get("ARCHIVIST_API_URL").unwrap_or_else(|| DEFAULT_API_URL.into()),
            gateway_url: get("ARCHIVIST_GATEWAY_URL").unwrap_or_else(|| DEFAULT_GATEWAY_URL.into()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[("TOKEN", "abc"), ("CHANNEL", "123")])).unwrap();
        assert_eq!(config.control_channel, 123);
        assert_eq!(config.db_path, PathBuf::from("messages.db"));
        assert_eq!(config.command_prefix, "/init_db");
        assert_eq!(config.api_url, DEFAULT_API_URL);
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("TOKEN", "abc"),
            ("CHANNEL", " 9 "),
            ("ARCHIVIST_DB_PATH", "/var/lib/archivist.db"),
            ("ARCHIVIST_COMMAND", "!backfill"),
        ]))
        .unwrap();
        assert_eq!(config.control_channel, 9);
        assert_eq!(config.db_path, PathBuf::from("/var/lib/archivist.db"));
        assert_eq!(config.command_prefix, "!backfill");
    }

    #[test]
    fn test_missing_or_invalid_required_values() {
        assert!(Config::from_lookup(lookup(&[("CHANNEL", "1")])).is_err());
        assert!(Config::from_lookup(lookup(&[("TOKEN", " "), ("CHANNEL", "1")])).is_err());
        assert!(Config::from_lookup(lookup(&[("TOKEN", "abc")])).is_err());
        assert!(Config::from_lookup(lookup(&[("TOKEN", "abc"), ("CHANNEL", "general")])).is_err());
    }
}
