use std::fs;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use crate::error::CatalogError;

pub const DEFAULT_CONFIG_FILE: &str = "hero-catalog.json";
pub const DEFAULT_API_URL: &str = "https://myheroacademia-api.onrender.com/characters";
pub const DEFAULT_WIKI_BASE_URL: &str = "https://myheroacademia.fandom.com/wiki";
pub const DEFAULT_PORTRAIT_CLASS: &str = "pi-image-thumbnail";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub api_url: Option<String>,
    #[serde(default)]
    pub wiki_base_url: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub store_path: Option<Utf8PathBuf>,
    #[serde(default)]
    pub image_dir: Option<Utf8PathBuf>,
    #[serde(default)]
    pub log_dir: Option<Utf8PathBuf>,
    #[serde(default)]
    pub request_delay_ms: Option<u64>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub portrait_class: Option<String>,
    #[serde(default)]
    pub optimize: Option<OptimizeEntry>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct OptimizeEntry {
    #[serde(default)]
    pub max_width: Option<u32>,
    #[serde(default)]
    pub max_height: Option<u32>,
    #[serde(default)]
    pub quality: Option<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptimizeSettings {
    pub max_width: u32,
    pub max_height: u32,
    pub quality: u8,
}

impl Default for OptimizeSettings {
    fn default() -> Self {
        Self {
            max_width: 300,
            max_height: 400,
            quality: 85,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub api_url: String,
    pub wiki_base_url: String,
    pub user_agent: String,
    pub store_path: Utf8PathBuf,
    pub image_dir: Utf8PathBuf,
    pub log_dir: Utf8PathBuf,
    pub request_delay: Duration,
    pub timeout: Duration,
    pub portrait_class: String,
    pub optimize: OptimizeSettings,
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, CatalogError> {
        let config_path = match path {
            Some(path) => Utf8PathBuf::from(path),
            None => Utf8PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.as_std_path().exists() {
            return Self::resolve_config(Config::default());
        }

        Self::load(&config_path)
    }

    pub fn load(config_path: &Utf8Path) -> Result<ResolvedConfig, CatalogError> {
        let content = fs::read_to_string(config_path.as_std_path())
            .map_err(|_| CatalogError::ConfigRead(config_path.to_path_buf()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| CatalogError::ConfigParse(err.to_string()))?;
        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, CatalogError> {
        let api_url = non_empty("api_url", config.api_url, DEFAULT_API_URL)?;
        let wiki_base_url =
            non_empty("wiki_base_url", config.wiki_base_url, DEFAULT_WIKI_BASE_URL)?;
        let user_agent = non_empty("user_agent", config.user_agent, &default_user_agent())?;
        let portrait_class =
            non_empty("portrait_class", config.portrait_class, DEFAULT_PORTRAIT_CLASS)?;

        let defaults = OptimizeSettings::default();
        let entry = config.optimize.unwrap_or_default();
        let optimize = OptimizeSettings {
            max_width: entry.max_width.unwrap_or(defaults.max_width),
            max_height: entry.max_height.unwrap_or(defaults.max_height),
            quality: entry.quality.unwrap_or(defaults.quality),
        };
        if optimize.max_width == 0 || optimize.max_height == 0 {
            return Err(CatalogError::ConfigInvalid(
                "optimize bounding box must be non-zero".to_string(),
            ));
        }
        if !(1..=100).contains(&optimize.quality) {
            return Err(CatalogError::ConfigInvalid(format!(
                "optimize quality must be within 1..=100, got {}",
                optimize.quality
            )));
        }

        let timeout_secs = config.timeout_secs.unwrap_or(30);
        if timeout_secs == 0 {
            return Err(CatalogError::ConfigInvalid(
                "timeout_secs must be non-zero".to_string(),
            ));
        }

        Ok(ResolvedConfig {
            api_url,
            wiki_base_url: wiki_base_url.trim_end_matches('/').to_string(),
            user_agent,
            store_path: config
                .store_path
                .unwrap_or_else(|| Utf8PathBuf::from("data/characters.csv")),
            image_dir: config
                .image_dir
                .unwrap_or_else(|| Utf8PathBuf::from("images/characters")),
            log_dir: config.log_dir.unwrap_or_else(|| Utf8PathBuf::from("logs")),
            request_delay: Duration::from_millis(config.request_delay_ms.unwrap_or(1000)),
            timeout: Duration::from_secs(timeout_secs),
            portrait_class,
            optimize,
        })
    }
}

pub fn default_user_agent() -> String {
    format!(
        "hero-catalog/{} (+https://github.com/hero-catalog)",
        env!("CARGO_PKG_VERSION")
    )
}

fn non_empty(field: &str, value: Option<String>, default: &str) -> Result<String, CatalogError> {
    match value {
        Some(value) if value.trim().is_empty() => Err(CatalogError::ConfigInvalid(format!(
            "{field} must not be empty"
        ))),
        Some(value) => Ok(value.trim().to_string()),
        None => Ok(default.to_string()),
    }
}
