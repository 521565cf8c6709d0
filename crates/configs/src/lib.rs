use std::path::PathBuf;

use anyhow::anyhow;
use anyhow::Result;
use serde::Deserialize;

/// Path value that disables persistence for a table.
pub const NO_PERSISTENCE: &str = "NONE";

#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub worker_threads: Option<usize>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: "0.0.0.0".into(), port: 3060, worker_threads: Some(4) }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_users_file")]
    pub users_file: String,
    #[serde(default = "default_roles_file")]
    pub roles_file: String,
    /// Advisory lock file shared by every process on the host.
    #[serde(default)]
    pub lock_file: Option<PathBuf>,
    #[serde(default = "default_lock_retries")]
    pub lock_retries: u32,
    #[serde(default = "default_lock_backoff_ms")]
    pub lock_backoff_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            users_file: default_users_file(),
            roles_file: default_roles_file(),
            lock_file: None,
            lock_retries: default_lock_retries(),
            lock_backoff_ms: default_lock_backoff_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "default_api_key")]
    pub api_key: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self { api_key: default_api_key() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// `compact` or `json`
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { format: default_log_format() }
    }
}

fn default_users_file() -> String { "users.csv".into() }
fn default_roles_file() -> String { "roles.csv".into() }
fn default_lock_retries() -> u32 { 3 }
fn default_lock_backoff_ms() -> u64 { 50 }
fn default_api_key() -> String { "secret".into() }
fn default_log_format() -> String { "compact".into() }

/// Load `CONFIG_PATH`, or `config.toml` when unset.
///
/// A missing file yields the built-in defaults; a file that exists but
/// cannot be read or parsed is an error.
pub fn load_default() -> Result<AppConfig> {
    let path = std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
    load_if_present(&path)
}

pub fn load_if_present(path: &str) -> Result<AppConfig> {
    match load_from_file(path) {
        Err(e) if e.downcast_ref::<std::io::Error>().is_some_and(|io| io.kind() == std::io::ErrorKind::NotFound) => {
            Ok(AppConfig::default())
        }
        other => other,
    }
}

pub fn load_from_file(path: &str) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path)?;
    let cfg: AppConfig = toml::from_str(&content)?;
    Ok(cfg)
}

impl AppConfig {
    pub fn normalize_and_validate(&mut self) -> Result<()> {
        self.server.normalize()?;
        self.storage.normalize();
        self.storage.validate()?;
        if self.auth.api_key.trim().is_empty() {
            return Err(anyhow!("auth.api_key must not be empty"));
        }
        Ok(())
    }
}

impl ServerConfig {
    fn normalize(&mut self) -> Result<()> {
        if self.host.trim().is_empty() {
            self.host = "0.0.0.0".to_string();
        }
        if self.port == 0 {
            return Err(anyhow!("server.port must be in 1..=65535"));
        }
        if let Some(w) = self.worker_threads {
            if w == 0 { self.worker_threads = Some(4); }
        } else {
            self.worker_threads = Some(4);
        }
        Ok(())
    }
}

impl StorageConfig {
    /// Fill the lock path from the system temp dir when not configured.
    pub fn normalize(&mut self) {
        if self.lock_file.as_ref().map_or(true, |p| p.as_os_str().is_empty()) {
            self.lock_file = Some(default_lock_file());
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.users_file.trim().is_empty() {
            return Err(anyhow!("storage.users_file is empty; use \"{NO_PERSISTENCE}\" to disable persistence"));
        }
        if self.roles_file.trim().is_empty() {
            return Err(anyhow!("storage.roles_file is empty; use \"{NO_PERSISTENCE}\" to disable persistence"));
        }
        if let Some(lock) = &self.lock_file {
            let data = PathBuf::from(&self.users_file);
            if *lock == data {
                return Err(anyhow!("storage.lock_file must differ from storage.users_file"));
            }
        }
        Ok(())
    }

    pub fn lock_path(&self) -> PathBuf {
        self.lock_file.clone().unwrap_or_else(default_lock_file)
    }
}

/// `<tmp>/userstore.lock`, shared by every process on the host.
pub fn default_lock_file() -> PathBuf {
    std::env::temp_dir().join("userstore.lock")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_cli_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.server.port, 3060);
        assert_eq!(cfg.storage.users_file, "users.csv");
        assert_eq!(cfg.storage.roles_file, "roles.csv");
        assert_eq!(cfg.auth.api_key, "secret");
    }

    #[test]
    fn parses_partial_toml_and_fills_lock_path() -> Result<()> {
        let mut cfg: AppConfig = toml::from_str(
            r#"
            [server]
            host = ""
            port = 8080

            [storage]
            users_file = "data/users.csv"
            roles_file = "NONE"
            "#,
        )?;
        cfg.normalize_and_validate()?;
        assert_eq!(cfg.server.host, "0.0.0.0");
        assert_eq!(cfg.server.worker_threads, Some(4));
        assert_eq!(cfg.storage.lock_path(), default_lock_file());
        assert_eq!(cfg.storage.lock_retries, 3);
        Ok(())
    }

    #[test]
    fn rejects_zero_port_and_empty_key() {
        let mut cfg = AppConfig::default();
        cfg.server.port = 0;
        assert!(cfg.normalize_and_validate().is_err());

        let mut cfg = AppConfig::default();
        cfg.auth.api_key = "  ".into();
        assert!(cfg.normalize_and_validate().is_err());
    }

    #[test]
    fn rejects_lock_file_equal_to_data_file() {
        let mut cfg = AppConfig::default();
        cfg.storage.lock_file = Some(PathBuf::from("users.csv"));
        assert!(cfg.normalize_and_validate().is_err());
    }

    #[test]
    fn missing_file_means_defaults() -> Result<()> {
        let path = std::env::temp_dir().join(format!("configs_absent_{}.toml", uuid::Uuid::new_v4()));
        let cfg = load_if_present(path.to_str().unwrap_or_default())?;
        assert_eq!(cfg.auth.api_key, "secret");
        Ok(())
    }

    #[test]
    fn malformed_file_is_an_error_not_defaults() -> Result<()> {
        let path = std::env::temp_dir().join(format!("configs_bad_{}.toml", uuid::Uuid::new_v4()));
        std::fs::write(&path, "[auth\napi_key = \"k1\"\n")?;
        assert!(load_if_present(path.to_str().unwrap_or_default()).is_err());
        let _ = std::fs::remove_file(&path);
        Ok(())
    }

    #[test]
    fn load_from_file_reads_toml() -> Result<()> {
        let path = std::env::temp_dir().join(format!("configs_{}.toml", uuid::Uuid::new_v4()));
        std::fs::write(&path, "[auth]\napi_key = \"k1\"\n")?;
        let cfg = load_from_file(path.to_str().unwrap_or_default())?;
        assert_eq!(cfg.auth.api_key, "k1");
        let _ = std::fs::remove_file(&path);
        Ok(())
    }
}
