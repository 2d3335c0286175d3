use std::collections::HashSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use directories::BaseDirs;
use serde::Deserialize;
use tracing::warn;

use crate::remote::people::DEFAULT_BASE_URL;
use crate::writer::{DEFAULT_BATCH_DELAY, DEFAULT_BATCH_SIZE, MAX_BATCH_SIZE};

const CONFIG_FILE_NAME: &str = "config.toml";
const APP_NAME: &str = "peoplesync";

pub const DEFAULT_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
pub const DEFAULT_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
pub const DEFAULT_REDIRECT_URI: &str = "http://localhost";
pub const DEFAULT_FAILED_OUTPUT: &str = "failed_contacts.json";

const CLIENT_ID_ENV: &str = "PEOPLESYNC_CLIENT_ID";
const CLIENT_SECRET_ENV: &str = "PEOPLESYNC_CLIENT_SECRET";

#[derive(Debug, Clone)]
pub struct Config {
    /// Path the configuration was read from (may not exist)
    pub config_path: PathBuf,
    pub token_dir: PathBuf,
    pub oauth: OAuthConfig,
    pub api: ApiConfig,
    pub sync: SyncConfig,
}

// =============================================================================
// OAuth Configuration
// =============================================================================

/// OAuth client registration used for every account
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub redirect_uri: String,
    pub auth_url: String,
    pub token_url: String,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            redirect_uri: DEFAULT_REDIRECT_URI.to_string(),
            auth_url: DEFAULT_AUTH_URL.to_string(),
            token_url: DEFAULT_TOKEN_URL.to_string(),
        }
    }
}

// =============================================================================
// API and Sync Configuration
// =============================================================================

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub base_url: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }
}

/// Batch write settings
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub batch_size: usize,
    pub batch_delay: Duration,
    /// Where failed records are written when `--failed-output` is not given
    pub failed_output: PathBuf,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            batch_delay: DEFAULT_BATCH_DELAY,
            failed_output: PathBuf::from(DEFAULT_FAILED_OUTPUT),
        }
    }
}

impl SyncConfig {
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 || self.batch_size > MAX_BATCH_SIZE {
            bail!(
                "sync.batch_size must be between 1 and {}, got {}",
                MAX_BATCH_SIZE,
                self.batch_size
            );
        }
        Ok(())
    }
}

/// Expand ~ to home directory in paths
fn expand_tilde(path: &Path) -> PathBuf {
    if let Ok(stripped) = path.strip_prefix("~") {
        if let Some(home) = home::home_dir() {
            return home.join(stripped);
        }
    }
    path.to_path_buf()
}

fn config_root() -> Result<PathBuf> {
    let base = BaseDirs::new().context("unable to determine base directories")?;
    Ok(base.config_dir().join(APP_NAME))
}

pub fn config_path() -> Result<PathBuf> {
    Ok(config_root()?.join(CONFIG_FILE_NAME))
}

fn default_token_dir() -> Result<PathBuf> {
    let base = BaseDirs::new().context("unable to determine base directories")?;
    Ok(base.data_dir().join(APP_NAME).join("tokens"))
}

/// Load configuration from `path`, or from the default location.
/// A missing file yields the defaults.
pub fn load(path: Option<&Path>) -> Result<Config> {
    let path = match path {
        Some(path) => expand_tilde(path),
        None => config_path()?,
    };

    let cfg_file = if path.exists() {
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("failed to read configuration file at {}", path.display()))?;
        parse(&raw).with_context(|| format!("invalid configuration in {}", path.display()))?
    } else {
        ConfigFile::default()
    };

    let mut config = cfg_file.into_config(path)?;
    apply_env_overrides(&mut config.oauth);
    config.sync.validate()?;
    Ok(config)
}

fn parse(raw: &str) -> Result<ConfigFile> {
    let value: toml::Value = toml::from_str(raw).context("failed to parse TOML")?;
    warn_unknown_keys(&value);
    value
        .try_into()
        .context("failed to deserialize configuration")
}

fn apply_env_overrides(oauth: &mut OAuthConfig) {
    if let Some(id) = non_empty_env(CLIENT_ID_ENV) {
        oauth.client_id = Some(id);
    }
    if let Some(secret) = non_empty_env(CLIENT_SECRET_ENV) {
        oauth.client_secret = Some(secret);
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

// =============================================================================
// Unknown key warnings
// =============================================================================

fn warn_unknown_keys(value: &toml::Value) {
    let Some(table) = value.as_table() else {
        return;
    };

    warn_unknown_in_section(value, "", &["token_dir", "oauth", "api", "sync"]);

    if let Some(oauth) = table.get("oauth") {
        warn_unknown_in_section(
            oauth,
            "oauth",
            &["client_id", "client_secret", "redirect_uri", "auth_url", "token_url"],
        );
    }
    if let Some(api) = table.get("api") {
        warn_unknown_in_section(api, "api", &["base_url"]);
    }
    if let Some(sync) = table.get("sync") {
        warn_unknown_in_section(sync, "sync", &["batch_size", "batch_delay_secs", "failed_output"]);
    }
}

fn warn_unknown_in_section(value: &toml::Value, section: &str, known: &[&str]) {
    let Some(table) = value.as_table() else {
        return;
    };
    let known: HashSet<&str> = known.iter().copied().collect();
    for key in table.keys() {
        if known.contains(key.as_str()) {
            continue;
        }
        if section.is_empty() {
            warn!("unknown configuration key `{}`", key);
        } else {
            warn!("unknown configuration key `{}.{}`", section, key);
        }
    }
}

// =============================================================================
// File representation
// =============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConfigFile {
    token_dir: Option<PathBuf>,
    oauth: OAuthFile,
    api: ApiFile,
    sync: SyncFile,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct OAuthFile {
    client_id: Option<String>,
    client_secret: Option<String>,
    redirect_uri: Option<String>,
    auth_url: Option<String>,
    token_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ApiFile {
    base_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SyncFile {
    batch_size: Option<usize>,
    batch_delay_secs: Option<u64>,
    failed_output: Option<PathBuf>,
}

impl ConfigFile {
    fn into_config(self, config_path: PathBuf) -> Result<Config> {
        let token_dir = match self.token_dir {
            Some(dir) => expand_tilde(&dir),
            None => default_token_dir()?,
        };

        let defaults = OAuthConfig::default();
        let oauth = OAuthConfig {
            client_id: trimmed(self.oauth.client_id),
            client_secret: trimmed(self.oauth.client_secret),
            redirect_uri: self.oauth.redirect_uri.unwrap_or(defaults.redirect_uri),
            auth_url: self.oauth.auth_url.unwrap_or(defaults.auth_url),
            token_url: self.oauth.token_url.unwrap_or(defaults.token_url),
        };

        let api = ApiConfig {
            base_url: self
                .api
                .base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        };

        let sync = SyncConfig {
            batch_size: self.sync.batch_size.unwrap_or(DEFAULT_BATCH_SIZE),
            batch_delay: self
                .sync
                .batch_delay_secs
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_BATCH_DELAY),
            failed_output: self
                .sync
                .failed_output
                .map(|path| expand_tilde(&path))
                .unwrap_or_else(|| PathBuf::from(DEFAULT_FAILED_OUTPUT)),
        };

        Ok(Config {
            config_path,
            token_dir,
            oauth,
            api,
            sync,
        })
    }
}

fn trimmed(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
