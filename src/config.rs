//! Configuration loader and validator for the watchlist bot.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

pub const ENV_BOT_TOKEN: &str = "TELEGRAM_BOT_TOKEN";
pub const ENV_ADMIN_ID: &str = "TELEGRAM_ADMIN_CHAT_ID";
pub const ENV_ERROR_CHAT_ID: &str = "TELEGRAM_ERROR_CHAT_ID";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("TELEGRAM_ADMIN_CHAT_ID must be an integer, got {0:?}")]
    InvalidAdminId(String),
    #[error("TELEGRAM_ERROR_CHAT_ID must be an integer, got {0:?}")]
    InvalidErrorChatId(String),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    #[serde(default)]
    pub app: App,
    #[serde(default)]
    pub telegram: Telegram,
    #[serde(default)]
    pub stock: Stock,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub data_dir: String,
}

impl Default for App {
    fn default() -> Self {
        Self {
            data_dir: "./data".into(),
        }
    }
}

/// Telegram bot settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Telegram {
    #[serde(default)]
    pub bot_token: String,
    /// The single user allowed to manage the item catalog.
    #[serde(default)]
    pub admin_id: i64,
}

/// Stock feed polling. Disabled unless `enabled` is set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Stock {
    pub enabled: bool,
    pub url: String,
    pub interval_minutes: u32,
    pub offset_seconds: u32,
    pub categories: Vec<String>,
    /// Chat that receives feed errors.
    pub error_chat_id: Option<i64>,
    /// Add items the feed reports as seen and drop the ones it reports as
    /// gone, on every check.
    pub sync_catalog: bool,
}

impl Default for Stock {
    fn default() -> Self {
        Self {
            enabled: false,
            url: "https://growagarden.gg/api/stock".into(),
            interval_minutes: 5,
            offset_seconds: 60,
            categories: [
                "gearStock",
                "seedsStock",
                "cosmeticsStock",
                "eggStock",
                "merchantsStock",
                "easterStock",
                "nightStock",
                "eventStock",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            error_chat_id: None,
            sync_catalog: false,
        }
    }
}

impl Config {
    /// Ensure required directories exist (creates `app.data_dir` if missing).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        if self.app.data_dir.trim().is_empty() {
            return Ok(());
        }
        fs::create_dir_all(&self.app.data_dir)
    }

    pub fn default_database_url(&self) -> String {
        format!("sqlite://{}/watchlist.db", self.app.data_dir.trim_end_matches('/'))
    }
}

/// Load configuration from a YAML file, apply environment overrides and
/// validate the result.
/// - If `path` is None, uses `config.yaml` in the current working directory.
/// - A missing file is not an error; defaults plus environment are used.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let mut cfg = if path.exists() {
        let content = fs::read_to_string(path)?;
        serde_yaml::from_str(&content)?
    } else {
        Config::default()
    };
    apply_env(&mut cfg, |key| std::env::var(key).ok())?;
    validate(&cfg)?;
    Ok(cfg)
}

/// Override the bot token, admin id and error chat from the environment.
/// An empty error chat variable leaves the file value alone.
pub fn apply_env<F>(cfg: &mut Config, var: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(token) = var(ENV_BOT_TOKEN).filter(|t| !t.trim().is_empty()) {
        cfg.telegram.bot_token = token;
    }
    if let Some(raw) = var(ENV_ADMIN_ID) {
        cfg.telegram.admin_id = raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidAdminId(raw.clone()))?;
    }
    if let Some(raw) = var(ENV_ERROR_CHAT_ID).filter(|v| !v.trim().is_empty()) {
        let chat = raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidErrorChatId(raw.clone()))?;
        cfg.stock.error_chat_id = Some(chat);
    }
    Ok(())
}

/// Validate a configuration instance.
fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.data_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.data_dir must be non-empty"));
    }
    if cfg.telegram.bot_token.trim().is_empty() {
        return Err(ConfigError::Invalid("telegram.bot_token must be non-empty"));
    }
    if cfg.telegram.admin_id == 0 {
        return Err(ConfigError::Invalid("telegram.admin_id must be set"));
    }

    let stock = &cfg.stock;
    if !stock.enabled {
        return Ok(());
    }
    if stock.url.trim().is_empty() {
        return Err(ConfigError::Invalid("stock.url must be non-empty"));
    }
    if stock.interval_minutes == 0 {
        return Err(ConfigError::Invalid("stock.interval_minutes must be > 0"));
    }
    if stock.offset_seconds >= stock.interval_minutes * 60 {
        return Err(ConfigError::Invalid(
            "stock.offset_seconds must be shorter than the interval",
        ));
    }
    if stock.categories.is_empty() {
        return Err(ConfigError::Invalid("stock.categories must list at least one category"));
    }
    Ok(())
}

/// Example YAML configuration.
pub fn example() -> &'static str {
    r#"app:
  data_dir: "./data"

telegram:
  bot_token: "YOUR_TELEGRAM_BOT_TOKEN"
  admin_id: 123456789

stock:
  enabled: true
  url: "https://growagarden.gg/api/stock"
  interval_minutes: 5
  offset_seconds: 60
  error_chat_id: 123456789
  sync_catalog: false
  categories:
    - gearStock
    - seedsStock
    - eggStock
"#
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn parse_example_ok() {
        let cfg: Config = serde_yaml::from_str(example()).unwrap();
        validate(&cfg).unwrap();
        assert_eq!(cfg.telegram.admin_id, 123456789);
        assert_eq!(cfg.stock.categories.len(), 3);
    }

    #[test]
    fn stock_section_defaults_when_absent() {
        let cfg: Config =
            serde_yaml::from_str("telegram:\n  bot_token: t\n  admin_id: 5\n").unwrap();
        validate(&cfg).unwrap();
        assert!(!cfg.stock.enabled);
        assert_eq!(cfg.stock.interval_minutes, 5);
        assert_eq!(cfg.stock.categories.len(), 8);
        assert_eq!(cfg.app.data_dir, "./data");
    }

    #[test]
    fn env_overrides_file_values() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        apply_env(
            &mut cfg,
            env(&[(ENV_BOT_TOKEN, "from-env"), (ENV_ADMIN_ID, " 42 ")]),
        )
        .unwrap();
        assert_eq!(cfg.telegram.bot_token, "from-env");
        assert_eq!(cfg.telegram.admin_id, 42);
    }

    #[test]
    fn error_chat_from_env() {
        let mut cfg = Config::default();
        apply_env(&mut cfg, env(&[(ENV_ERROR_CHAT_ID, "-1001234")])).unwrap();
        assert_eq!(cfg.stock.error_chat_id, Some(-1001234));

        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        apply_env(&mut cfg, env(&[(ENV_ERROR_CHAT_ID, "  ")])).unwrap();
        assert_eq!(cfg.stock.error_chat_id, Some(123456789));

        let err = apply_env(&mut cfg, env(&[(ENV_ERROR_CHAT_ID, "ops")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidErrorChatId(raw) if raw == "ops"));
    }

    #[test]
    fn unparsable_admin_id_is_fatal() {
        let mut cfg = Config::default();
        let err = apply_env(&mut cfg, env(&[(ENV_ADMIN_ID, "admin")])).unwrap_err();
        match err {
            ConfigError::InvalidAdminId(raw) => assert_eq!(raw, "admin"),
            _ => panic!("wrong error"),
        }
    }

    #[test]
    fn missing_token_or_admin() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.telegram.bot_token = "  ".into();
        let err = validate(&cfg).unwrap_err();
        match err { ConfigError::Invalid(msg) => assert!(msg.contains("telegram.bot_token")), _ => panic!("wrong error") }

        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.telegram.admin_id = 0;
        let err = validate(&cfg).unwrap_err();
        match err { ConfigError::Invalid(msg) => assert!(msg.contains("admin_id")), _ => panic!("wrong error") }
    }

    #[test]
    fn invalid_stock_schedule() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.stock.interval_minutes = 0;
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));

        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.stock.offset_seconds = 300;
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));

        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.stock.categories.clear();
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));

        // Ignored while the worker is off.
        cfg.stock.enabled = false;
        validate(&cfg).unwrap();
    }

    #[test]
    fn ensure_dirs_creates_data_dir() {
        let td = tempdir().unwrap();
        let data_path = td.path().join("data");
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.app.data_dir = data_path.to_string_lossy().to_string();
        cfg.ensure_dirs().unwrap();
        assert!(data_path.exists());
        assert_eq!(
            cfg.default_database_url(),
            format!("sqlite://{}/watchlist.db", data_path.display())
        );
    }

    #[test]
    fn load_from_file_ok() {
        let td = tempdir().unwrap();
        let p = td.path().join("config.yaml");
        fs::write(&p, example()).unwrap();
        let cfg = load(Some(&p)).unwrap();
        assert!(cfg.stock.enabled);
    }
}
