use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub discord_token: String,
    pub command_prefix: String,
    pub brain_path: PathBuf,
    pub tts_command: String,
    pub tts_timeout: Duration,
    pub typing_delay_secs: (u64, u64),
    pub owner_ids: Vec<u64>,
    pub immune_ids: Vec<u64>,
    pub log_level: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let tts_timeout_secs = match env::var("CHATTERBOX_TTS_TIMEOUT_SECS") {
            Ok(raw) => raw
                .trim()
                .parse::<u64>()
                .with_context(|| format!("CHATTERBOX_TTS_TIMEOUT_SECS is not a number: {}", raw))?,
            Err(_) => 30,
        };

        let typing_delay_secs = match env::var("CHATTERBOX_TYPING_DELAY_SECS") {
            Ok(raw) => parse_delay_range(&raw)?,
            Err(_) => (1, 3),
        };

        Ok(Config {
            discord_token: env::var("DISCORD_CHATTERBOX_TOKEN")
                .map_err(|_| anyhow::anyhow!("DISCORD_CHATTERBOX_TOKEN environment variable not set"))?,
            command_prefix: env::var("CHATTERBOX_PREFIX").unwrap_or_else(|_| "!".to_string()),
            brain_path: env::var("CHATTERBOX_BRAIN_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("data/ChatterBox/alice.brain")),
            tts_command: env::var("CHATTERBOX_TTS_COMMAND").unwrap_or_else(|_| "text2wave".to_string()),
            tts_timeout: Duration::from_secs(tts_timeout_secs),
            typing_delay_secs,
            owner_ids: parse_id_list(&env::var("CHATTERBOX_OWNER_IDS").unwrap_or_default())
                .context("CHATTERBOX_OWNER_IDS")?,
            immune_ids: parse_id_list(&env::var("CHATTERBOX_IMMUNE_IDS").unwrap_or_default())
                .context("CHATTERBOX_IMMUNE_IDS")?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

/// Parses a `min-max` range of whole seconds, or a single value used for both ends.
fn parse_delay_range(raw: &str) -> Result<(u64, u64)> {
    let raw = raw.trim();
    let (min, max) = match raw.split_once('-') {
        Some((min, max)) => (min.trim(), max.trim()),
        None => (raw, raw),
    };
    let min: u64 = min
        .parse()
        .with_context(|| format!("invalid typing delay range: {}", raw))?;
    let max: u64 = max
        .parse()
        .with_context(|| format!("invalid typing delay range: {}", raw))?;
    if min > max {
        anyhow::bail!("typing delay range is backwards: {}", raw);
    }
    Ok((min, max))
}

/// Parses a comma separated list of Discord snowflakes, ignoring blanks.
fn parse_id_list(raw: &str) -> Result<Vec<u64>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<u64>().with_context(|| format!("not a Discord id: {}", s)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    // Both env tests share process state, so they run as one test.
    #[test]
    fn test_config_from_env() {
        env::remove_var("DISCORD_CHATTERBOX_TOKEN");
        assert!(Config::from_env().is_err());

        env::set_var("DISCORD_CHATTERBOX_TOKEN", "test_discord_token");
        env::remove_var("CHATTERBOX_PREFIX");
        env::remove_var("CHATTERBOX_BRAIN_PATH");
        env::remove_var("CHATTERBOX_TTS_COMMAND");
        env::remove_var("CHATTERBOX_TTS_TIMEOUT_SECS");
        env::remove_var("CHATTERBOX_TYPING_DELAY_SECS");
        env::remove_var("CHATTERBOX_OWNER_IDS");
        env::remove_var("CHATTERBOX_IMMUNE_IDS");
        env::remove_var("LOG_LEVEL");

        let config = Config::from_env().unwrap();
        assert_eq!(config.discord_token, "test_discord_token");
        assert_eq!(config.command_prefix, "!");
        assert_eq!(config.brain_path, PathBuf::from("data/ChatterBox/alice.brain"));
        assert_eq!(config.tts_command, "text2wave");
        assert_eq!(config.tts_timeout, Duration::from_secs(30));
        assert_eq!(config.typing_delay_secs, (1, 3));
        assert!(config.owner_ids.is_empty());
        assert_eq!(config.log_level, "info");

        env::set_var("CHATTERBOX_OWNER_IDS", "12, 34,");
        let config = Config::from_env().unwrap();
        assert_eq!(config.owner_ids, vec![12, 34]);

        env::remove_var("CHATTERBOX_OWNER_IDS");
        env::remove_var("DISCORD_CHATTERBOX_TOKEN");
    }

    #[test]
    fn test_parse_delay_range() {
        assert_eq!(parse_delay_range("1-3").unwrap(), (1, 3));
        assert_eq!(parse_delay_range(" 2 ").unwrap(), (2, 2));
        assert!(parse_delay_range("3-1").is_err());
        assert!(parse_delay_range("soon").is_err());
    }

    #[test]
    fn test_parse_id_list_rejects_garbage() {
        assert!(parse_id_list("123,abc").is_err());
        assert!(parse_id_list("").unwrap().is_empty());
    }
}
