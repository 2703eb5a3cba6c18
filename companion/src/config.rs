use anyhow::{Context, Result};
use notify::{Config as NotifyConfig, RecommendedWatcher, RecursiveMode, Watcher};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::event::CompanionEvent;

pub const DEFAULT_SITE: &str = "dpm.lol";
pub const DEFAULT_DISCOVERY_RETRY_SECS: u64 = 5;
pub const DEFAULT_RECONNECT_DELAY_SECS: u64 = 5;
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;
pub const DEFAULT_REDISCOVERY_COOLDOWN_SECS: u64 = 30;

/// Root configuration structure. Deserialized from config.toml in the app data dir.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Config {
    /// Host of the site pages are built for (e.g. "dpm.lol").
    #[serde(default = "default_site")]
    pub site: String,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub stream: StreamConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            site: DEFAULT_SITE.to_string(),
            discovery: DiscoveryConfig::default(),
            stream: StreamConfig::default(),
        }
    }
}

/// Lockfile search settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DiscoveryConfig {
    /// Delay between lockfile searches while the client is not running.
    #[serde(default = "default_discovery_retry")]
    pub retry_secs: u64,
    /// Install directories searched after the built-in ones.
    #[serde(default)]
    pub extra_lockfile_dirs: Vec<PathBuf>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            retry_secs: DEFAULT_DISCOVERY_RETRY_SECS,
            extra_lockfile_dirs: Vec::new(),
        }
    }
}

impl DiscoveryConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_secs)
    }
}

/// Event stream reconnection settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StreamConfig {
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_secs: u64,
    /// Consecutive closes tolerated before the lockfile is searched again.
    /// Zero is treated as one.
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
    #[serde(default = "default_rediscovery_cooldown")]
    pub rediscovery_cooldown_secs: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            reconnect_delay_secs: DEFAULT_RECONNECT_DELAY_SECS,
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            rediscovery_cooldown_secs: DEFAULT_REDISCOVERY_COOLDOWN_SECS,
        }
    }
}

impl StreamConfig {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }

    pub fn rediscovery_cooldown(&self) -> Duration {
        Duration::from_secs(self.rediscovery_cooldown_secs)
    }
}

/// Loads the config file at `path`, returning `Config::default()` if the file does not exist.
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_or_default(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Watches the parent directory of `path`. Whenever the config file is created
/// or modified, reloads it and sends a `ConfigReloaded` event.
pub async fn watch_config(path: PathBuf, tx: mpsc::Sender<CompanionEvent>) {
    let (watch_tx, mut watch_rx) = mpsc::channel::<notify::Event>(16);

    let mut watcher = match RecommendedWatcher::new(
        move |res: notify::Result<notify::Event>| {
            if let Ok(event) = res {
                let _ = watch_tx.blocking_send(event);
            }
        },
        NotifyConfig::default(),
    ) {
        Ok(w) => w,
        Err(e) => {
            error!(error = %e, "failed to create config watcher");
            return;
        }
    };

    // Watch the directory so editor-style atomic saves (write-new + rename) are seen.
    let watch_dir = match path.parent() {
        Some(d) => d.to_path_buf(),
        None => {
            error!(path = %path.display(), "config path has no parent directory");
            return;
        }
    };

    if let Err(e) = watcher.watch(&watch_dir, RecursiveMode::NonRecursive) {
        error!(error = %e, "failed to watch config directory");
        return;
    }

    while let Some(event) = watch_rx.recv().await {
        let affects_config = event.paths.iter().any(|p| p == path.as_path());
        let is_write = matches!(
            event.kind,
            notify::EventKind::Create(_) | notify::EventKind::Modify(_)
        );

        if affects_config && is_write {
            match load_or_default(&path) {
                Ok(config) => {
                    info!("config reloaded");
                    if tx.send(CompanionEvent::ConfigReloaded(config)).await.is_err() {
                        break;
                    }
                }
                Err(e) => warn!(error = %e, "failed to reload config"),
            }
        }
    }
}

fn default_site() -> String {
    DEFAULT_SITE.to_string()
}

fn default_discovery_retry() -> u64 {
    DEFAULT_DISCOVERY_RETRY_SECS
}

fn default_reconnect_delay() -> u64 {
    DEFAULT_RECONNECT_DELAY_SECS
}

fn default_max_reconnect_attempts() -> u32 {
    DEFAULT_MAX_RECONNECT_ATTEMPTS
}

fn default_rediscovery_cooldown() -> u64 {
    DEFAULT_REDISCOVERY_COOLDOWN_SECS
}
