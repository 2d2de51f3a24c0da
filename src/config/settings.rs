//! Run configuration and Telegram credentials.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize};

/// Delay between CSV lines when none is configured anywhere.
pub const DEFAULT_DELAY_SECS: u64 = 5;

/// Telegram API configuration.
#[derive(Debug, Clone)]
pub struct TelegramConfig {
    /// Telegram API ID (obtain from <https://my.telegram.org>).
    pub api_id: i32,

    /// Telegram API hash (obtain from <https://my.telegram.org>).
    pub api_hash: String,

    /// Phone number of the account, with country code.
    pub phone: String,

    /// Path to the session file.
    pub session_path: PathBuf,
}

fn default_session_path() -> PathBuf {
    PathBuf::from("session.db")
}

impl TelegramConfig {
    /// Creates a new Telegram configuration.
    #[must_use]
    pub fn new(api_id: i32, api_hash: String, phone: String) -> Self {
        Self {
            api_id,
            api_hash,
            phone,
            session_path: default_session_path(),
        }
    }

    /// Overrides the session file location.
    #[must_use]
    pub fn with_session_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.session_path = path.into();
        self
    }
}

/// Operator entries persisted between runs.
///
/// Every field is optional on disk; a missing file yields the empty record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Telegram API ID, kept as entered (older files store it as a number).
    #[serde(
        default,
        deserialize_with = "string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub api_id: Option<String>,

    /// Telegram API hash.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_hash: Option<String>,

    /// Phone number with country code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,

    /// Seconds to wait between CSV lines.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay: Option<u64>,
}

fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(i64),
    }

    Ok(Option::<Raw>::deserialize(deserializer)?.map(|raw| match raw {
        Raw::Text(s) => s,
        Raw::Number(n) => n.to_string(),
    }))
}

impl RunConfig {
    /// Loads the record from a JSON file, returning the empty record if the file is absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Writes the record back as JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reads values from environment variables.
    ///
    /// Recognizes `TG_API_ID`, `TG_API_HASH`, `TG_PHONE` and `BROADCAST_DELAY`.
    ///
    /// # Errors
    ///
    /// Returns an error if `BROADCAST_DELAY` is set but is not a whole number of seconds.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            api_id: non_empty_env("TG_API_ID"),
            api_hash: non_empty_env("TG_API_HASH"),
            phone: non_empty_env("TG_PHONE"),
            delay: non_empty_env("BROADCAST_DELAY")
                .map(|raw| parse_delay(&raw))
                .transpose()?,
        })
    }

    /// Layers `other` on top of `self`: any value set in `other` wins.
    #[must_use]
    pub fn merged_with(self, other: Self) -> Self {
        Self {
            api_id: other.api_id.or(self.api_id),
            api_hash: other.api_hash.or(self.api_hash),
            phone: other.phone.or(self.phone),
            delay: other.delay.or(self.delay),
        }
    }

    /// Returns the configured delay or the default.
    #[must_use]
    pub fn delay_secs(&self) -> u64 {
        self.delay.unwrap_or(DEFAULT_DELAY_SECS)
    }

    /// Checks that every required field is present and builds the Telegram configuration.
    ///
    /// # Errors
    ///
    /// Returns the first missing or malformed field.
    pub fn telegram(&self) -> Result<TelegramConfig, ConfigError> {
        let api_id = required(self.api_id.as_deref(), "api_id")?
            .parse::<i32>()
            .ok()
            .filter(|id| *id > 0)
            .ok_or(ConfigError::InvalidApiId)?;
        let api_hash = required(self.api_hash.as_deref(), "api_hash")?;
        let phone = required(self.phone.as_deref(), "phone")?;

        Ok(TelegramConfig::new(
            api_id,
            api_hash.to_owned(),
            phone.to_owned(),
        ))
    }
}

fn required<'a>(value: Option<&'a str>, field: &'static str) -> Result<&'a str, ConfigError> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::MissingField(field))
}

fn parse_delay(raw: &str) -> Result<u64, ConfigError> {
    raw.trim()
        .parse()
        .map_err(|_| ConfigError::InvalidDelay(raw.to_owned()))
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Invalid API ID format (must be a positive integer)")]
    InvalidApiId,

    #[error("Invalid delay '{0}' (must be a non-negative whole number of seconds)")]
    InvalidDelay(String),

    #[error("Failed to access configuration file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse configuration file: {0}")]
    Parse(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete() -> RunConfig {
        RunConfig {
            api_id: Some("12345".to_owned()),
            api_hash: Some("abc123".to_owned()),
            phone: Some("+15550001111".to_owned()),
            delay: None,
        }
    }

    #[test]
    fn test_telegram_config_new() {
        let config = TelegramConfig::new(12345, "abc123".to_owned(), "+1".to_owned());
        assert_eq!(config.api_id, 12345);
        assert_eq!(config.api_hash, "abc123");
        assert_eq!(config.session_path, PathBuf::from("session.db"));
    }

    #[test]
    fn test_missing_file_gives_empty_record() {
        let dir = tempfile::tempdir().unwrap();
        let config = RunConfig::load(dir.path().join("config.json")).unwrap();
        assert_eq!(config, RunConfig::default());
        assert_eq!(config.delay_secs(), DEFAULT_DELAY_SECS);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let config = RunConfig {
            delay: Some(0),
            ..complete()
        };
        config.save(&path).unwrap();
        assert_eq!(RunConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_numeric_api_id_accepted() {
        let config: RunConfig =
            serde_json::from_str(r#"{"api_id": 777, "api_hash": "h", "phone": "+1", "delay": 3}"#)
                .unwrap();
        assert_eq!(config.api_id.as_deref(), Some("777"));
        assert_eq!(config.delay_secs(), 3);
    }

    #[test]
    fn test_invalid_json_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(RunConfig::load(&path), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_merge_prefers_later_layer() {
        let file = RunConfig {
            delay: Some(10),
            ..complete()
        };
        let cli = RunConfig {
            phone: Some("+449999".to_owned()),
            ..RunConfig::default()
        };
        let merged = file.merged_with(cli);
        assert_eq!(merged.phone.as_deref(), Some("+449999"));
        assert_eq!(merged.api_hash.as_deref(), Some("abc123"));
        assert_eq!(merged.delay, Some(10));
    }

    #[test]
    fn test_missing_fields_reported() {
        let config = RunConfig {
            api_hash: Some("   ".to_owned()),
            ..complete()
        };
        assert!(matches!(
            config.telegram(),
            Err(ConfigError::MissingField("api_hash"))
        ));
        assert!(matches!(
            RunConfig::default().telegram(),
            Err(ConfigError::MissingField("api_id"))
        ));
    }

    #[test]
    fn test_invalid_api_id() {
        let config = RunConfig {
            api_id: Some("abc".to_owned()),
            ..complete()
        };
        assert!(matches!(config.telegram(), Err(ConfigError::InvalidApiId)));
    }

    #[test]
    fn test_delay_parsing() {
        assert_eq!(parse_delay("0").unwrap(), 0);
        assert_eq!(parse_delay(" 12 ").unwrap(), 12);
        assert!(matches!(parse_delay("abc"), Err(ConfigError::InvalidDelay(v)) if v == "abc"));
        assert!(matches!(parse_delay("-3"), Err(ConfigError::InvalidDelay(_))));
        assert!(matches!(parse_delay("1.5"), Err(ConfigError::InvalidDelay(_))));
    }

    #[test]
    fn test_telegram_from_complete_record() {
        let tg = complete().telegram().unwrap();
        assert_eq!(tg.api_id, 12345);
        assert_eq!(tg.phone, "+15550001111");
    }
}
