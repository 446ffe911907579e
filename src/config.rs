use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Directory for rolling log files when journald is unavailable.
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    #[serde(default)]
    pub photos: PhotosConfig,

    #[serde(default)]
    pub oracle: OracleConfig,

    #[serde(default)]
    pub notify: NotifyConfig,

    #[serde(default)]
    pub report: ReportConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhotosConfig {
    /// Where the capture job writes images. `PHOTO_PATH` and `--photos` override it.
    #[serde(default)]
    pub directory: Option<PathBuf>,

    #[serde(default = "default_image_extensions")]
    pub image_extensions: Vec<String>,
}

fn default_image_extensions() -> Vec<String> {
    vec![
        "jpg".to_string(),
        "jpeg".to_string(),
        "png".to_string(),
        "heic".to_string(),
        "webp".to_string(),
    ]
}

impl Default for PhotosConfig {
    fn default() -> Self {
        Self {
            directory: None,
            image_extensions: default_image_extensions(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OracleProviderType {
    #[default]
    Gemini,
    OpenAI,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConfig {
    #[serde(default)]
    pub provider: OracleProviderType,

    /// Base URL; each provider has its own default.
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Model name; each provider has its own default.
    #[serde(default)]
    pub model: Option<String>,

    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_oracle_timeout")]
    pub timeout_secs: u64,

    /// Replaces the built-in instruction prompt.
    #[serde(default)]
    pub prompt: Option<String>,
}

fn default_oracle_timeout() -> u64 {
    120
}

impl OracleProviderType {
    pub fn default_model(&self) -> &'static str {
        match self {
            OracleProviderType::Gemini => "gemini-2.5-flash",
            OracleProviderType::OpenAI => "gpt-4o-mini",
        }
    }
}

impl OracleConfig {
    /// The configured model, or the provider's default.
    pub fn model_name(&self) -> &str {
        self.model
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| self.provider.default_model())
    }
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            provider: OracleProviderType::default(),
            endpoint: None,
            model: None,
            api_key: None,
            timeout_secs: default_oracle_timeout(),
            prompt: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    /// General channel: capture notices and errors.
    #[serde(default)]
    pub webhook_url: Option<String>,

    /// Channel for analyses and reports. Falls back to `webhook_url`.
    #[serde(default)]
    pub ai_webhook_url: Option<String>,

    #[serde(default = "default_notify_timeout")]
    pub timeout_secs: u64,
}

fn default_notify_timeout() -> u64 {
    10
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            ai_webhook_url: None,
            timeout_secs: default_notify_timeout(),
        }
    }
}

impl NotifyConfig {
    pub fn ai_webhook(&self) -> Option<&str> {
        self.ai_webhook_url
            .as_deref()
            .or(self.webhook_url.as_deref())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    #[serde(default = "default_chart_path")]
    pub chart_path: PathBuf,

    #[serde(default = "default_chart_width")]
    pub width: u32,

    #[serde(default = "default_chart_height")]
    pub height: u32,

    /// Rows shown by `history` when no window is given.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

fn default_chart_path() -> PathBuf {
    data_dir().join("plant_score_chart.png")
}

fn default_chart_width() -> u32 {
    1400
}

fn default_chart_height() -> u32 {
    700
}

fn default_history_limit() -> usize {
    30
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            chart_path: default_chart_path(),
            width: default_chart_width(),
            height: default_chart_height(),
            history_limit: default_history_limit(),
        }
    }
}

fn data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("plantwatch")
}

fn default_db_path() -> PathBuf {
    data_dir().join("timelapse.db")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            log_dir: None,
            photos: PhotosConfig::default(),
            oracle: OracleConfig::default(),
            notify: NotifyConfig::default(),
            report: ReportConfig::default(),
        }
    }
}

/// Where a loaded [`Config`] came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    File(PathBuf),
    /// No file at this path; built-in defaults were used.
    Defaults(PathBuf),
}

impl ConfigSource {
    pub fn log(&self) {
        match self {
            ConfigSource::File(path) => tracing::debug!("Loaded config from {:?}", path),
            ConfigSource::Defaults(path) => {
                tracing::warn!("Config file not found at {:?}, using defaults", path)
            }
        }
    }
}

impl Config {
    /// Load from `PLANTWATCH_CONFIG` or the default location, then apply
    /// environment overrides.
    pub fn load() -> Result<(Self, ConfigSource)> {
        Self::load_from(&Self::config_path())
    }

    /// Load from `path`, falling back to defaults when it does not exist, then
    /// apply environment overrides.
    /// The caller logs the returned [`ConfigSource`] once logging is set up.
    pub fn load_from(path: &Path) -> Result<(Self, ConfigSource)> {
        let (mut config, source) = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            let config = toml::from_str::<Config>(&content)
                .with_context(|| format!("Failed to parse config file {}", path.display()))?;
            (config, ConfigSource::File(path.to_path_buf()))
        } else {
            (Config::default(), ConfigSource::Defaults(path.to_path_buf()))
        };
        config.apply_env();
        Ok((config, source))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("PLANTWATCH_CONFIG") {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("plantwatch")
            .join("config.toml")
    }

    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    /// Environment values win over the config file. Empty values are ignored.
    pub fn apply_env_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(path) = get("PLANTWATCH_DB") {
            self.db_path = expand_home(&path);
        }
        if let Some(path) = get("PHOTO_PATH") {
            self.photos.directory = Some(expand_home(&path));
        }
        if let Some(key) = get("PLANTWATCH_API_KEY").or_else(|| get("GEMINI_API_KEY")) {
            self.oracle.api_key = Some(key);
        }
        if let Some(url) = get("DISCORD_WEBHOOK_URL") {
            self.notify.webhook_url = Some(url);
        }
        if let Some(url) = get("AI_WEBHOOK_URL") {
            self.notify.ai_webhook_url = Some(url);
        }
    }

    /// Photo directory: explicit argument, then `PHOTO_PATH`/config, then `./photos`.
    pub fn photos_dir(&self, cli_override: Option<&Path>) -> PathBuf {
        if let Some(dir) = cli_override {
            return expand_home(&dir.to_string_lossy());
        }
        self.photos
            .directory
            .clone()
            .unwrap_or_else(|| PathBuf::from("photos"))
    }
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
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
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.oracle.provider, OracleProviderType::Gemini);
        assert_eq!(config.oracle.timeout_secs, 120);
        assert_eq!(config.notify.timeout_secs, 10);
        assert!(config.photos.image_extensions.contains(&"heic".to_string()));
        assert_eq!(config.photos_dir(None), PathBuf::from("photos"));
    }

    #[test]
    fn test_photos_dir_precedence() {
        let mut config: Config = toml::from_str(
            r#"
            [photos]
            directory = "/from/file"
            "#,
        )
        .unwrap();
        assert_eq!(config.photos_dir(None), PathBuf::from("/from/file"));

        config.apply_env_from(env(&[("PHOTO_PATH", "/from/env")]));
        assert_eq!(config.photos_dir(None), PathBuf::from("/from/env"));

        let cli = PathBuf::from("/from/cli");
        assert_eq!(config.photos_dir(Some(&cli)), cli);
    }

    #[test]
    fn test_credentials_from_env() {
        let mut config = Config::default();
        config.apply_env_from(env(&[
            ("GEMINI_API_KEY", "g-key"),
            ("DISCORD_WEBHOOK_URL", "https://hooks.example/general"),
            ("AI_WEBHOOK_URL", ""),
        ]));
        assert_eq!(config.oracle.api_key.as_deref(), Some("g-key"));
        assert_eq!(
            config.notify.ai_webhook(),
            Some("https://hooks.example/general")
        );
        assert!(config.notify.ai_webhook_url.is_none());
    }

    #[test]
    fn test_unset_credentials_stay_absent() {
        let mut config = Config::default();
        config.apply_env_from(env(&[]));
        assert!(config.oracle.api_key.is_none());
        assert!(config.notify.webhook_url.is_none());
        assert!(config.notify.ai_webhook().is_none());
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        let (config, source) = Config::load_from(&path).unwrap();
        assert_eq!(config.report.history_limit, 30);
        assert_eq!(source, ConfigSource::Defaults(path));
    }

    #[test]
    fn test_load_existing_file_reports_source() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[report]\nhistory_limit = 12\n").unwrap();

        let (config, source) = Config::load_from(&path).unwrap();
        assert_eq!(config.report.history_limit, 12);
        assert_eq!(source, ConfigSource::File(path));
    }

    #[test]
    fn test_model_defaults_per_provider() {
        let gemini = OracleConfig::default();
        assert_eq!(gemini.model_name(), "gemini-2.5-flash");

        let openai: OracleConfig = toml::from_str(r#"provider = "openai""#).unwrap();
        assert_eq!(openai.model_name(), "gpt-4o-mini");

        let named = OracleConfig {
            provider: OracleProviderType::OpenAI,
            model: Some("llava".to_string()),
            ..Default::default()
        };
        assert_eq!(named.model_name(), "llava");
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("conf/config.toml");
        let mut config = Config::default();
        config.oracle.provider = OracleProviderType::OpenAI;
        config.oracle.model = Some("llava".to_string());
        config.save(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let loaded: Config = toml::from_str(&text).unwrap();
        assert_eq!(loaded.oracle.provider, OracleProviderType::OpenAI);
        assert_eq!(loaded.oracle.model_name(), "llava");
    }

    #[test]
    fn test_invalid_toml_is_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "db_path = [").unwrap();
        assert!(Config::load_from(&path).is_err());
    }
}
