//! Run configuration and credential lookup.
//!
//! Values come from defaults, then environment-style keys, then CLI flags.
//! Lookups go through a closure so tests never touch the process environment.

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SyncError};
use crate::persistence::DatasetStore;
use crate::sync::{DEFAULT_ACTIVITY_TYPE, DEFAULT_PAGE_SIZE};

pub const ENV_OUTPUT: &str = "ROUTESYNC_OUTPUT";
pub const ENV_TOKEN_DIR: &str = "ROUTESYNC_TOKEN_DIR";
pub const ENV_PAGE_SIZE: &str = "ROUTESYNC_PAGE_SIZE";
pub const ENV_ACTIVITY_TYPE: &str = "ROUTESYNC_ACTIVITY_TYPE";
pub const ENV_API_BASE_URL: &str = "ROUTESYNC_API_BASE_URL";
pub const ENV_TIMEOUT_SECS: &str = "ROUTESYNC_TIMEOUT_SECS";
/// Raw bearer token, takes precedence over the token store
pub const ENV_TOKEN: &str = "GARMIN_TOKEN";

/// File inside the token directory holding the saved OAuth2 token.
pub const TOKEN_FILE_NAME: &str = "oauth2_token.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// GeoJSON dataset written by each run
    pub output_path: PathBuf,
    /// Directory of a previously saved session
    pub token_dir: PathBuf,
    pub page_size: usize,
    pub activity_type: String,
    pub api_base_url: String,
    pub request_timeout_secs: u64,
    /// Minimum spacing between request starts
    pub min_request_interval_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            output_path: PathBuf::from("routes.geojson"),
            token_dir: PathBuf::from(".garmin_tokens"),
            page_size: DEFAULT_PAGE_SIZE,
            activity_type: DEFAULT_ACTIVITY_TYPE.to_string(),
            api_base_url: "https://connectapi.garmin.com".to_string(),
            request_timeout_secs: 30,
            min_request_interval_ms: 100,
        }
    }
}

impl SyncConfig {
    /// Defaults overlaid with the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overlaid with whatever `lookup` returns for each known key.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(path) = lookup(ENV_OUTPUT) {
            config.output_path = PathBuf::from(path);
        }
        if let Some(dir) = lookup(ENV_TOKEN_DIR) {
            config.token_dir = PathBuf::from(dir);
        }
        if let Some(value) = lookup(ENV_PAGE_SIZE) {
            config.page_size = parse_number(ENV_PAGE_SIZE, &value)?;
        }
        if let Some(kind) = lookup(ENV_ACTIVITY_TYPE) {
            config.activity_type = kind;
        }
        if let Some(url) = lookup(ENV_API_BASE_URL) {
            config.api_base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(value) = lookup(ENV_TIMEOUT_SECS) {
            config.request_timeout_secs = parse_number(ENV_TIMEOUT_SECS, &value)?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            return Err(SyncError::config("page size must be at least 1"));
        }
        if self.activity_type.trim().is_empty() {
            return Err(SyncError::config("activity type must not be empty"));
        }
        if self.request_timeout_secs == 0 {
            return Err(SyncError::config("request timeout must be at least 1s"));
        }
        Ok(())
    }

    pub fn store(&self) -> DatasetStore {
        DatasetStore::new(&self.output_path)
    }

    pub fn token_path(&self) -> PathBuf {
        self.token_dir.join(TOKEN_FILE_NAME)
    }
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| SyncError::config(format!("{}='{}': {}", key, value, e)))
}

// ============================================================================
// Credentials
// ============================================================================

#[derive(Debug, Deserialize)]
struct StoredToken {
    access_token: String,
    #[serde(default)]
    token_type: Option<String>,
}

/// `Authorization` header value for the remote service.
///
/// Uses `GARMIN_TOKEN` if set, otherwise the saved token store. Does not log
/// in or refresh anything.
pub fn load_auth_header<F>(config: &SyncConfig, lookup: F) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(token) = lookup(ENV_TOKEN).filter(|t| !t.trim().is_empty()) {
        debug!("[load_auth_header] Using token from {}", ENV_TOKEN);
        return Ok(format!("Bearer {}", token.trim()));
    }

    let path = config.token_path();
    read_token_store(&path)
}

fn read_token_store(path: &Path) -> Result<String> {
    let contents = fs::read_to_string(path).map_err(|e| {
        SyncError::auth(format!(
            "no saved session at {} ({}); set {}",
            path.display(),
            e,
            ENV_TOKEN
        ))
    })?;
    let token: StoredToken = serde_json::from_str(&contents)
        .map_err(|e| SyncError::auth(format!("unreadable token store {}: {}", path.display(), e)))?;

    if token.access_token.trim().is_empty() {
        return Err(SyncError::auth(format!(
            "token store {} has no access token",
            path.display()
        )));
    }

    debug!("[load_auth_header] Resumed saved session from {}", path.display());
    let token_type = token.token_type.unwrap_or_else(|| "Bearer".to_string());
    Ok(format!("{} {}", token_type, token.access_token.trim()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_config_serde_fills_defaults() {
        let config: SyncConfig = serde_json::from_value(serde_json::json!({
            "output_path": "out/runs.geojson",
            "page_size": 50
        }))
        .unwrap();
        assert_eq!(config.output_path, PathBuf::from("out/runs.geojson"));
        assert_eq!(config.page_size, 50);
        assert_eq!(config.activity_type, DEFAULT_ACTIVITY_TYPE);

        let value = serde_json::to_value(&config).unwrap();
        assert_eq!(serde_json::from_value::<SyncConfig>(value).unwrap(), config);
    }

    #[test]
    fn test_defaults() {
        let config = SyncConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config, SyncConfig::default());
        assert_eq!(config.page_size, 100);
        assert_eq!(config.activity_type, "running");
        assert_eq!(config.output_path, PathBuf::from("routes.geojson"));
    }

    #[test]
    fn test_overrides() {
        let config = SyncConfig::from_lookup(lookup_from(&[
            (ENV_OUTPUT, "/tmp/out/routes.geojson"),
            (ENV_PAGE_SIZE, " 50 "),
            (ENV_ACTIVITY_TYPE, "trail_running"),
            (ENV_API_BASE_URL, "http://localhost:8080/"),
        ]))
        .unwrap();
        assert_eq!(config.output_path, PathBuf::from("/tmp/out/routes.geojson"));
        assert_eq!(config.page_size, 50);
        assert_eq!(config.activity_type, "trail_running");
        assert_eq!(config.api_base_url, "http://localhost:8080");
        assert_eq!(config.store().path(), Path::new("/tmp/out/routes.geojson"));
    }

    #[test]
    fn test_invalid_numbers() {
        let err = SyncConfig::from_lookup(lookup_from(&[(ENV_PAGE_SIZE, "lots")])).unwrap_err();
        assert!(matches!(err, SyncError::Config { .. }));

        let err = SyncConfig::from_lookup(lookup_from(&[(ENV_PAGE_SIZE, "0")])).unwrap_err();
        assert!(matches!(err, SyncError::Config { .. }));
    }

    #[test]
    fn test_auth_from_env_token() {
        let config = SyncConfig::default();
        let header = load_auth_header(&config, lookup_from(&[(ENV_TOKEN, "abc123\n")])).unwrap();
        assert_eq!(header, "Bearer abc123");
    }

    #[test]
    fn test_auth_from_token_store() {
        let tmp = TempDir::new().unwrap();
        let config = SyncConfig {
            token_dir: tmp.path().to_path_buf(),
            ..SyncConfig::default()
        };
        fs::write(
            config.token_path(),
            r#"{"access_token": "xyz", "token_type": "Bearer", "expires_at": 1700000000}"#,
        )
        .unwrap();

        let header = load_auth_header(&config, |_| None).unwrap();
        assert_eq!(header, "Bearer xyz");
    }

    #[test]
    fn test_auth_missing() {
        let tmp = TempDir::new().unwrap();
        let config = SyncConfig {
            token_dir: tmp.path().join("absent"),
            ..SyncConfig::default()
        };
        let err = load_auth_header(&config, |_| None).unwrap_err();
        assert!(err.is_auth());
    }
}
