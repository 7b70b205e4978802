use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use docdrop_store::StoreConfig;

/// Default cap on a single upload: 50 MiB.
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 50 * 1024 * 1024;

/// Allowance for multipart boundaries and part headers on top of the file.
const MULTIPART_SLACK_BYTES: u64 = 64 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// Base URL used to build `fileUrl` in upload responses. Derived from
    /// the listen port when unset.
    pub public_url: Option<String>,
    pub upload_dir: PathBuf,
    pub static_dir: PathBuf,
    pub max_upload_bytes: u64,
    pub ttl_secs: u64,
    pub sweep_interval_secs: u64,
    pub convert_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            public_url: None,
            upload_dir: PathBuf::from("uploads"),
            static_dir: PathBuf::from("public"),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            ttl_secs: 3600,
            sweep_interval_secs: 3600,
            convert_timeout_secs: 30,
        }
    }
}

impl ServerConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();

        match ext.to_lowercase().as_str() {
            "toml" => {
                let config: ServerConfig = toml::from_str(&contents)?;
                Ok(config)
            }
            "json" => {
                let config: ServerConfig = serde_json::from_str(&contents)?;
                Ok(config)
            }
            _ => anyhow::bail!("Unsupported config file extension: {}", ext),
        }
    }

    /// Loads `path` if it exists, otherwise falls back to defaults.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            Self::from_file(path)
        } else {
            tracing::warn!("Config file not found, using defaults: {}", path.display());
            Ok(Self::default())
        }
    }

    pub fn public_url(&self) -> String {
        match &self.public_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("http://localhost:{}", self.bind_addr.port()),
        }
    }

    /// Direct retrieval URL for a stored file name.
    pub fn file_url(&self, stored_name: &str) -> String {
        format!("{}/uploads/{}", self.public_url(), stored_name)
    }

    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            upload_dir: self.upload_dir.clone(),
            ttl_secs: self.ttl_secs,
            sweep_interval_secs: self.sweep_interval_secs,
        }
    }

    pub fn convert_timeout(&self) -> Duration {
        Duration::from_secs(self.convert_timeout_secs.max(1))
    }

    /// Request body limit for the upload route.
    pub fn body_limit(&self) -> usize {
        usize::try_from(self.max_upload_bytes.saturating_add(MULTIPART_SLACK_BYTES)).unwrap_or(usize::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_values() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr, SocketAddr::from(([0, 0, 0, 0], 3000)));
        assert_eq!(config.upload_dir, PathBuf::from("uploads"));
        assert_eq!(config.static_dir, PathBuf::from("public"));
        assert_eq!(config.max_upload_bytes, 50 * 1024 * 1024);
        assert_eq!(config.ttl_secs, 3600);
        assert_eq!(config.sweep_interval_secs, 3600);
        assert_eq!(config.convert_timeout_secs, 30);
        assert!(config.public_url.is_none());
    }

    #[test]
    fn test_public_url_follows_port() {
        let config = ServerConfig {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            ..ServerConfig::default()
        };
        assert_eq!(config.public_url(), "http://localhost:8080");
        assert_eq!(
            config.file_url("abc.docx"),
            "http://localhost:8080/uploads/abc.docx"
        );
    }

    #[test]
    fn test_public_url_override_trims_slash() {
        let config = ServerConfig {
            public_url: Some("https://docs.example.org/".to_string()),
            ..ServerConfig::default()
        };
        assert_eq!(config.file_url("x.txt"), "https://docs.example.org/uploads/x.txt");
    }

    #[test]
    fn test_store_config_subset() {
        let config = ServerConfig {
            upload_dir: PathBuf::from("/srv/drop"),
            ttl_secs: 60,
            sweep_interval_secs: 30,
            ..ServerConfig::default()
        };
        let store = config.store_config();
        assert_eq!(store.upload_dir, PathBuf::from("/srv/drop"));
        assert_eq!(store.ttl(), Duration::from_secs(60));
        assert_eq!(store.sweep_interval(), Duration::from_secs(30));
    }

    #[test]
    fn test_body_limit_exceeds_upload_limit() {
        let config = ServerConfig::default();
        assert!(config.body_limit() as u64 > config.max_upload_bytes);
    }

    #[test]
    fn test_from_file_json() {
        let mut file = NamedTempFile::with_suffix(".json").unwrap();
        writeln!(
            file,
            r#"{{
                "bind_addr": "127.0.0.1:9000",
                "upload_dir": "/tmp/drop",
                "ttl_secs": 120
            }}"#
        )
        .unwrap();

        let config = ServerConfig::from_file(file.path()).unwrap();
        assert_eq!(config.bind_addr, SocketAddr::from(([127, 0, 0, 1], 9000)));
        assert_eq!(config.upload_dir, PathBuf::from("/tmp/drop"));
        assert_eq!(config.ttl_secs, 120);
        assert_eq!(config.sweep_interval_secs, 3600);
    }

    #[test]
    fn test_from_file_toml() {
        let mut file = NamedTempFile::with_suffix(".toml").unwrap();
        writeln!(
            file,
            r#"
bind_addr = "10.0.0.1:8080"
public_url = "https://drop.example"
max_upload_bytes = 1048576
convert_timeout_secs = 5
            "#
        )
        .unwrap();

        let config = ServerConfig::from_file(file.path()).unwrap();
        assert_eq!(config.bind_addr, SocketAddr::from(([10, 0, 0, 1], 8080)));
        assert_eq!(config.public_url.as_deref(), Some("https://drop.example"));
        assert_eq!(config.max_upload_bytes, 1_048_576);
        assert_eq!(config.convert_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_from_file_unsupported_extension() {
        let file = NamedTempFile::with_suffix(".yaml").unwrap();
        assert!(ServerConfig::from_file(file.path()).is_err());
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = ServerConfig::load_or_default(Path::new("/nonexistent/docdrop.toml")).unwrap();
        assert_eq!(config.bind_addr.port(), 3000);
    }
}
