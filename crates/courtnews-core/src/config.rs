use chrono::{FixedOffset, NaiveTime};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use url::Url;

use crate::news::SourceKind;

/// Environment variable pointing at an alternative config file
pub const ENV_CONFIG_PATH: &str = "COURTNEWS_CONFIG";

const NEWS_CATEGORY_URL: &str = "https://www.tjes.jus.br/category/s1-front-page/ultimasnoticias/";
const READER_PROXY: &str = "https://r.jina.ai/";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub news: NewsConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Data directory path
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Explicit database file; defaults to `<data_dir>/courtnews.db`
    #[serde(default)]
    pub database_path: Option<PathBuf>,
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Reported by the health endpoint
    #[serde(default = "default_environment")]
    pub environment: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            database_path: None,
            log_level: default_log_level(),
            environment: default_environment(),
        }
    }
}

/// One entry of the fetch chain, tried in the order listed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    pub label: String,
    pub url: String,
    pub kind: SourceKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsConfig {
    /// Ordered fallback chain
    #[serde(default = "default_sources")]
    pub sources: Vec<SourceConfig>,
    /// Origin that scraped article links must belong to
    #[serde(default = "default_site_origin")]
    pub site_origin: String,
    /// Category page used by the fallback items
    #[serde(default = "default_portal_url")]
    pub portal_url: String,
    /// Maximum items kept from a single fetch
    #[serde(default = "default_max_items")]
    pub max_items: usize,
    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_accept_language")]
    pub accept_language: String,
    /// Consecutive failed runs before backing off
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    /// Backoff duration in hours, counted from the last failure
    #[serde(default = "default_backoff_hours")]
    pub backoff_hours: u32,
}

impl Default for NewsConfig {
    fn default() -> Self {
        Self {
            sources: default_sources(),
            site_origin: default_site_origin(),
            portal_url: default_portal_url(),
            max_items: default_max_items(),
            request_timeout_secs: default_timeout(),
            user_agent: default_user_agent(),
            accept_language: default_accept_language(),
            failure_threshold: default_failure_threshold(),
            backoff_hours: default_backoff_hours(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Run the daily refresh at all
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Wall-clock time of the daily refresh, "HH:MM"
    #[serde(default = "default_daily_at")]
    pub daily_at: String,
    /// Fixed offset of the wall clock from UTC, in minutes
    #[serde(default = "default_utc_offset_minutes")]
    pub utc_offset_minutes: i32,
    /// Warm the store once when the process starts
    #[serde(default = "default_true")]
    pub run_on_startup: bool,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            daily_at: default_daily_at(),
            utc_offset_minutes: default_utc_offset_minutes(),
            run_on_startup: default_true(),
        }
    }
}

impl ScheduleConfig {
    pub fn daily_time(&self) -> crate::Result<NaiveTime> {
        NaiveTime::parse_from_str(&self.daily_at, "%H:%M").map_err(|e| {
            crate::Error::Config(format!("invalid schedule.daily_at '{}': {}", self.daily_at, e))
        })
    }

    pub fn offset(&self) -> crate::Result<FixedOffset> {
        FixedOffset::east_opt(self.utc_offset_minutes * 60).ok_or_else(|| {
            crate::Error::Config(format!(
                "invalid schedule.utc_offset_minutes: {}",
                self.utc_offset_minutes
            ))
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// CORS origins allowed to call the API
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
    #[serde(default = "default_limit")]
    pub default_limit: u32,
    #[serde(default = "default_max_limit")]
    pub max_limit: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            allowed_origins: default_allowed_origins(),
            default_limit: default_limit(),
            max_limit: default_max_limit(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("courtnews"))
        .unwrap_or_else(|| PathBuf::from("~/.local/share/courtnews"))
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_environment() -> String {
    "development".to_string()
}

fn default_true() -> bool {
    true
}

fn default_sources() -> Vec<SourceConfig> {
    let feed_url = format!("{}feed/", NEWS_CATEGORY_URL);
    vec![
        SourceConfig {
            label: "direct".to_string(),
            url: feed_url.clone(),
            kind: SourceKind::Feed,
        },
        SourceConfig {
            label: "proxy-rss".to_string(),
            url: format!("{}{}", READER_PROXY, feed_url),
            kind: SourceKind::Feed,
        },
        SourceConfig {
            label: "proxy-html".to_string(),
            url: format!("{}{}", READER_PROXY, NEWS_CATEGORY_URL),
            kind: SourceKind::Html,
        },
    ]
}

fn default_site_origin() -> String {
    "https://www.tjes.jus.br".to_string()
}

fn default_portal_url() -> String {
    NEWS_CATEGORY_URL.to_string()
}

fn default_max_items() -> usize {
    10
}

fn default_timeout() -> u64 {
    30
}

fn default_user_agent() -> String {
    format!(
        "Mozilla/5.0 (compatible; courtnews/{}; news fetcher for the 2a Vara Civel de Cariacica portal)",
        env!("CARGO_PKG_VERSION")
    )
}

fn default_accept_language() -> String {
    "pt-BR,pt;q=0.9".to_string()
}

fn default_failure_threshold() -> u32 {
    3
}

fn default_backoff_hours() -> u32 {
    6
}

fn default_daily_at() -> String {
    "09:00".to_string()
}

fn default_utc_offset_minutes() -> i32 {
    -180 // America/Sao_Paulo, no DST since 2019
}

fn default_bind_addr() -> String {
    "0.0.0.0:3001".to_string()
}

fn default_allowed_origins() -> Vec<String> {
    vec![
        "http://localhost:3000".to_string(),
        "http://localhost:5173".to_string(),
    ]
}

fn default_limit() -> u32 {
    10
}

fn default_max_limit() -> u32 {
    20
}

/// Expand tilde (~) in path to user's home directory
fn expand_tilde(path: &Path) -> PathBuf {
    if let Some(path_str) = path.to_str() {
        if let Some(stripped) = path_str.strip_prefix("~/") {
            if let Some(home) = dirs::home_dir() {
                return home.join(stripped);
            }
        } else if path_str == "~" {
            if let Some(home) = dirs::home_dir() {
                return home;
            }
        }
    }
    path.to_path_buf()
}

impl AppConfig {
    /// Load configuration from `$COURTNEWS_CONFIG` or the default path,
    /// falling back to defaults when no file exists. Environment overrides
    /// are applied last.
    pub fn load() -> crate::Result<Self> {
        let path = std::env::var(ENV_CONFIG_PATH)
            .map(PathBuf::from)
            .unwrap_or_else(|_| Self::config_path());
        Self::load_from(&path)
    }

    /// Load configuration from an explicit path
    pub fn load_from(path: &Path) -> crate::Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            Self::from_toml(&content)?
        } else {
            tracing::debug!("No config file at {}, using defaults", path.display());
            Self::default()
        };

        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> crate::Result<Self> {
        toml::from_str(content).map_err(|e| crate::Error::Config(e.to_string()))
    }

    /// Apply `PORT`, `ALLOWED_ORIGINS` and `DATABASE_PATH` overrides
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup("PORT").and_then(|p| p.trim().parse::<u16>().ok()) {
            let host = self
                .server
                .bind_addr
                .rsplit_once(':')
                .map(|(host, _)| host.to_string())
                .unwrap_or_else(|| "0.0.0.0".to_string());
            self.server.bind_addr = format!("{}:{}", host, port);
        }

        if let Some(origins) = lookup("ALLOWED_ORIGINS") {
            let parsed: Vec<String> = origins
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(str::to_string)
                .collect();
            if !parsed.is_empty() {
                self.server.allowed_origins = parsed;
            }
        }

        if let Some(db) = lookup("DATABASE_PATH").filter(|p| !p.trim().is_empty()) {
            self.general.database_path = Some(PathBuf::from(db));
        }
    }

    /// Reject configurations the pipeline cannot run with
    pub fn validate(&self) -> crate::Result<()> {
        if self.news.sources.is_empty() {
            return Err(crate::Error::Config(
                "news.sources must list at least one source".to_string(),
            ));
        }
        for source in &self.news.sources {
            Url::parse(&source.url).map_err(|e| {
                crate::Error::Config(format!("source '{}' has invalid url: {}", source.label, e))
            })?;
        }
        Url::parse(&self.news.site_origin)?;
        if self.news.max_items == 0 {
            return Err(crate::Error::Config("news.max_items must be positive".to_string()));
        }
        if self.server.max_limit == 0 {
            return Err(crate::Error::Config("server.max_limit must be positive".to_string()));
        }
        self.schedule.daily_time()?;
        self.schedule.offset()?;
        Ok(())
    }

    /// Get the configuration file path
    /// Always uses ~/.config/courtnews/config.toml on all platforms
    pub fn config_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config")
            .join("courtnews")
            .join("config.toml")
    }

    /// Get the database file path
    pub fn database_path(&self) -> PathBuf {
        match &self.general.database_path {
            Some(path) => expand_tilde(path),
            None => self.data_dir().join("courtnews.db"),
        }
    }

    /// Get the data directory (with tilde expansion)
    pub fn data_dir(&self) -> PathBuf {
        expand_tilde(&self.general.data_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_match_original_policy() {
        let config = AppConfig::default();
        assert_eq!(config.news.max_items, 10);
        assert_eq!(config.news.request_timeout_secs, 30);
        assert_eq!(config.news.failure_threshold, 3);
        assert_eq!(config.news.backoff_hours, 6);
        assert_eq!(config.server.max_limit, 20);

        let labels: Vec<&str> = config.news.sources.iter().map(|s| s.label.as_str()).collect();
        assert_eq!(labels, vec!["direct", "proxy-rss", "proxy-html"]);
        assert_eq!(config.news.sources[2].kind, SourceKind::Html);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = AppConfig::from_toml(
            r#"
            [schedule]
            daily_at = "07:30"

            [[news.sources]]
            label = "mirror"
            url = "https://mirror.example.com/feed/"
            kind = "feed"
            "#,
        )
        .unwrap();

        assert_eq!(config.schedule.daily_at, "07:30");
        assert_eq!(config.schedule.utc_offset_minutes, -180);
        assert_eq!(config.news.sources.len(), 1);
        assert_eq!(config.news.sources[0].label, "mirror");
        assert_eq!(config.news.max_items, 10);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("PORT", "8080"),
            ("ALLOWED_ORIGINS", "https://a.example, https://b.example,"),
            ("DATABASE_PATH", "/tmp/news.db"),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        config.apply_overrides(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.server.bind_addr, "0.0.0.0:8080");
        assert_eq!(
            config.server.allowed_origins,
            vec!["https://a.example".to_string(), "https://b.example".to_string()]
        );
        assert_eq!(config.database_path(), PathBuf::from("/tmp/news.db"));
    }

    #[test]
    fn test_validate_rejects_bad_schedule_and_sources() {
        let mut config = AppConfig::default();
        config.schedule.daily_at = "9h".to_string();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.news.sources.clear();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.news.sources[0].url = "not a url".to_string();
        assert!(config.validate().is_err());
    }
}
