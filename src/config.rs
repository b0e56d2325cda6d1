use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use directories::BaseDirs;
use serde::{Deserialize, Serialize};

use crate::bulk::DEFAULT_CONCURRENCY;
use crate::error::ShelfError;

pub const CONFIG_FILE_NAME: &str = "comic-shelf.json";
pub const DEFAULT_RECORDS_DIR: &str = "details";
pub const DEFAULT_DOWNLOADS_DIR: &str = "downloads";
pub const DEFAULT_REMOTE_BASE_URL: &str = "http://127.0.0.1:8080/api";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub records_dir: Option<String>,
    #[serde(default)]
    pub downloads_dir: Option<String>,
    #[serde(default)]
    pub list_path: Option<String>,
    #[serde(default)]
    pub concurrency: Option<usize>,
    #[serde(default)]
    pub remote: Option<RemoteSection>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct RemoteSection {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub records_dir: Utf8PathBuf,
    pub downloads_dir: Utf8PathBuf,
    /// `None` means a fresh per-session list is used.
    pub list_path: Option<Utf8PathBuf>,
    pub concurrency: usize,
    pub remote: RemoteConfig,
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// An explicit path must exist. Without one, `./comic-shelf.json` and then
    /// the user config directory are tried before falling back to defaults.
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, ShelfError> {
        if let Some(path) = path {
            let config_path = Utf8PathBuf::from(path);
            if !config_path.as_std_path().exists() {
                return Err(ShelfError::ConfigMissing(config_path));
            }
            return Self::load(&config_path);
        }

        for candidate in Self::candidates() {
            if candidate.as_std_path().is_file() {
                tracing::debug!(path = %candidate, "using config file");
                return Self::load(&candidate);
            }
        }
        Self::resolve_config(Config::default())
    }

    pub fn load(path: &Utf8Path) -> Result<ResolvedConfig, ShelfError> {
        let content = fs::read_to_string(path.as_std_path())
            .map_err(|_| ShelfError::ConfigRead(path.to_path_buf()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| ShelfError::ConfigParse(err.to_string()))?;
        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, ShelfError> {
        let schema_version = config.schema_version.unwrap_or(1);
        let concurrency = config.concurrency.unwrap_or(DEFAULT_CONCURRENCY);
        if concurrency == 0 {
            return Err(ShelfError::InvalidConcurrency(concurrency));
        }

        let remote = config.remote.unwrap_or_default();
        let base_url = remote
            .base_url
            .unwrap_or_else(|| DEFAULT_REMOTE_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        Ok(ResolvedConfig {
            schema_version,
            records_dir: Utf8PathBuf::from(
                config
                    .records_dir
                    .unwrap_or_else(|| DEFAULT_RECORDS_DIR.to_string()),
            ),
            downloads_dir: Utf8PathBuf::from(
                config
                    .downloads_dir
                    .unwrap_or_else(|| DEFAULT_DOWNLOADS_DIR.to_string()),
            ),
            list_path: config.list_path.map(Utf8PathBuf::from),
            concurrency,
            remote: RemoteConfig {
                base_url,
                timeout_secs: remote.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS),
            },
        })
    }

    fn candidates() -> Vec<Utf8PathBuf> {
        let mut candidates = vec![Utf8PathBuf::from(CONFIG_FILE_NAME)];
        if let Some(path) = BaseDirs::new().and_then(|dirs| {
            Utf8PathBuf::from_path_buf(dirs.config_dir().join("comic-shelf").join("config.json"))
                .ok()
        }) {
            candidates.push(path);
        }
        candidates
    }
}
