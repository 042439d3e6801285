use crate::engine::EngineConfig;
use crate::http::{HttpClient, DEFAULT_USER_AGENT};
use crate::search::cache::{CacheConfig, CrawlCache};
use crate::search::SearchContext;
use crate::sources::{builtin_sources, SourceDefinition};
use anyhow::{ensure, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    #[serde(default)]
    pub search: SearchSettings,

    #[serde(default)]
    pub pools: PoolConfig,

    #[serde(default)]
    pub cache: CacheSettings,

    #[serde(default)]
    pub filter: FilterConfig,

    #[serde(default)]
    pub sources: SourcesConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    pub timeout_ms: u64,
    pub crawl_timeout_ms: u64,
    pub magnet_timeout_ms: u64,
    pub user_agent: String,
    /// Applied to every source without its own override.
    pub max_pages: Option<u32>,
    pub num_crawls: Option<usize>,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            timeout_ms: 5_000,
            crawl_timeout_ms: 10_000,
            magnet_timeout_ms: 20_000,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            max_pages: None,
            num_crawls: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    #[serde(default = "default_cloud_threads")]
    pub cloud_threads: usize,
    #[serde(default = "default_torrent_threads")]
    pub torrent_threads: usize,
}

fn default_cloud_threads() -> usize {
    4
}
fn default_torrent_threads() -> usize {
    6
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            cloud_threads: default_cloud_threads(),
            torrent_threads: default_torrent_threads(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    #[serde(default = "default_cache_enabled")]
    pub enabled: bool,
    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,
    #[serde(default = "default_ttl_seconds")]
    pub ttl_seconds: u64,
    #[serde(default = "default_failed_ttl_seconds")]
    pub failed_ttl_seconds: u64,
}

fn default_cache_enabled() -> bool {
    true
}
fn default_cache_capacity() -> usize {
    512
}
fn default_ttl_seconds() -> u64 {
    60 * 60
}
fn default_failed_ttl_seconds() -> u64 {
    10 * 60
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: default_cache_enabled(),
            capacity: default_cache_capacity(),
            ttl_seconds: default_ttl_seconds(),
            failed_ttl_seconds: default_failed_ttl_seconds(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub min_torrent_seeds: i32,
    pub excluded_stream_extensions: Vec<String>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            min_torrent_seeds: 0,
            excluded_stream_extensions: vec!["flv".to_string()],
        }
    }
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    /// Source names, case-insensitive.
    pub disabled: Vec<String>,
    pub overrides: BTreeMap<String, SourceOverride>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceOverride {
    pub max_pages: Option<u32>,
    pub num_crawls: Option<usize>,
}

impl SourcesConfig {
    fn is_disabled(&self, name: &str) -> bool {
        self.disabled.iter().any(|d| d.eq_ignore_ascii_case(name))
    }

    fn override_for(&self, name: &str) -> Option<&SourceOverride> {
        self.overrides
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value)
    }
}

impl Config {
    /// Loads `explicit` when given, else the first config file found, else
    /// the defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let config_path = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => Self::find_config_path(),
        };
        match config_path {
            Some(path) => Self::from_path(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    fn find_config_path() -> Option<PathBuf> {
        if let Some(xdg_config) = dirs::config_dir() {
            let xdg_path = xdg_config.join("fedsearch/config.toml");
            if xdg_path.exists() {
                return Some(xdg_path);
            }
        }

        if let Some(home) = dirs::home_dir() {
            let home_path = home.join(".fedsearch.toml");
            if home_path.exists() {
                return Some(home_path);
            }
        }

        let current_path = Path::new(".fedsearch.toml");
        if current_path.exists() {
            return Some(current_path.to_path_buf());
        }

        None
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(self.search.timeout_ms > 0, "search.timeout_ms must be positive");
        ensure!(
            self.search.crawl_timeout_ms > 0,
            "search.crawl_timeout_ms must be positive"
        );
        ensure!(
            self.pools.cloud_threads > 0 && self.pools.torrent_threads > 0,
            "pools need at least one thread each"
        );
        ensure!(self.cache.capacity > 0, "cache.capacity must be positive");
        Ok(())
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            cloud_threads: self.pools.cloud_threads,
            torrent_threads: self.pools.torrent_threads,
            min_torrent_seeds: self.filter.min_torrent_seeds,
            excluded_stream_extensions: self.filter.excluded_stream_extensions.clone(),
        }
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            capacity: self.cache.capacity,
            ttl: Duration::from_secs(self.cache.ttl_seconds),
            failed_ttl: Duration::from_secs(self.cache.failed_ttl_seconds),
        }
    }

    pub fn search_context(&self, http: Arc<dyn HttpClient>) -> SearchContext {
        let cache = self
            .cache
            .enabled
            .then(|| Arc::new(CrawlCache::new(self.cache_config())));
        SearchContext::new(http)
            .with_cache(cache)
            .with_user_agent(self.search.user_agent.clone())
            .with_timeouts(
                Duration::from_millis(self.search.timeout_ms),
                Duration::from_millis(self.search.crawl_timeout_ms),
                Duration::from_millis(self.search.magnet_timeout_ms),
            )
    }

    /// The built-in sources with the disabled list and overrides applied.
    pub fn configured_sources(&self) -> Vec<SourceDefinition> {
        let mut sources = builtin_sources();
        for source in &mut sources {
            if self.sources.is_disabled(&source.name) {
                source.enabled = false;
            }
            let found = self.sources.override_for(&source.name);
            if let Some(pages) = found.and_then(|o| o.max_pages).or(self.search.max_pages) {
                source.config.max_pages = pages.max(1);
            }
            if let Some(crawls) = found.and_then(|o| o.num_crawls).or(self.search.num_crawls) {
                source.config.num_crawls = crawls;
            }
        }
        sources
    }
}
