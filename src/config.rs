use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub cache: CacheConfig,
    pub storage: StorageConfig,
    pub session: SessionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Number of (count kind, post id) entries kept in the fan-out count cache
    pub capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub root: PathBuf,
    pub public_base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub profile_retry_delay_ms: u64,
    pub token_ttl_secs: i64,
}

impl SessionConfig {
    pub fn profile_retry_delay(&self) -> Duration {
        Duration::from_millis(self.profile_retry_delay_ms)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            profile_retry_delay_ms: 500,
            token_ttl_secs: 3600,
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> anyhow::Result<T> {
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| anyhow::anyhow!("{} has an invalid value: {}", key, raw)),
        Err(_) => Ok(default),
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite:data/xcion.db".to_string(),
            },
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 3000,
            },
            cache: CacheConfig { capacity: 1000 },
            storage: StorageConfig {
                root: PathBuf::from("data/storage"),
                public_base_url: "http://localhost:3000".to_string(),
            },
            session: SessionConfig::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let port: u16 = env_parse("SERVER_PORT", 3000)?;
        let host = env_or("SERVER_HOST", "0.0.0.0");
        let default_public = format!("http://localhost:{}", port);
        let session_defaults = SessionConfig::default();

        Ok(Self {
            database: DatabaseConfig {
                url: env_or("DATABASE_URL", "sqlite:data/xcion.db"),
            },
            server: ServerConfig { host, port },
            cache: CacheConfig {
                capacity: env_parse("CACHE_CAPACITY", 1000)?,
            },
            storage: StorageConfig {
                root: PathBuf::from(env_or("STORAGE_ROOT", "data/storage")),
                public_base_url: env_or("STORAGE_PUBLIC_URL", &default_public),
            },
            session: SessionConfig {
                profile_retry_delay_ms: env_parse(
                    "PROFILE_RETRY_DELAY_MS",
                    session_defaults.profile_retry_delay_ms,
                )?,
                token_ttl_secs: env_parse("SESSION_TTL_SECS", session_defaults.token_ttl_secs)?,
            },
        })
    }

    /// Create the SQLite file's directory and the storage root if they are missing
    pub fn prepare_local_dirs(&self) -> anyhow::Result<()> {
        let db_path = self
            .database
            .url
            .trim_start_matches("sqlite://")
            .trim_start_matches("sqlite:");
        if !db_path.starts_with(':') {
            if let Some(parent) = Path::new(db_path).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
        }
        std::fs::create_dir_all(&self.storage.root)?;
        Ok(())
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_defaults_match_profile_retry_contract() {
        let session = SessionConfig::default();
        assert_eq!(session.profile_retry_delay(), Duration::from_millis(500));
    }

    #[test]
    fn unparsable_values_are_rejected() {
        std::env::set_var("XCION_TEST_BAD_PORT", "not-a-port");
        let parsed: anyhow::Result<u16> = env_parse("XCION_TEST_BAD_PORT", 3000);
        assert!(parsed.is_err());
        let fallback: anyhow::Result<u16> = env_parse("XCION_TEST_UNSET_KEY", 3000);
        assert_eq!(fallback.unwrap(), 3000);
    }
}
