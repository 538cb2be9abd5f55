use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub data_dir: PathBuf,
    /// Upper bound on a request body. The per-file limit is the runtime
    /// `max_file_size` setting; this only caps what axum will accept.
    pub max_upload_bytes: usize,
    pub session_ttl_hours: i64,
    pub remember_me_days: i64,
    pub maintenance_interval_secs: u64,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> std::result::Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }

    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("lectern.db")
    }

    #[must_use]
    pub fn files_dir(&self) -> PathBuf {
        self.data_dir.join("files")
    }

    #[must_use]
    pub fn backups_dir(&self) -> PathBuf {
        self.data_dir.join("backups")
    }

    #[must_use]
    pub fn credentials_path(&self) -> PathBuf {
        self.data_dir.join(".admin_credentials")
    }

    /// Loads a TOML config file on top of the defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let file: FileConfig = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        Ok(Self::default().merge(file))
    }

    #[must_use]
    pub fn merge(mut self, file: FileConfig) -> Self {
        if let Some(host) = file.host {
            self.host = host;
        }
        if let Some(port) = file.port {
            self.port = port;
        }
        if let Some(data_dir) = file.data_dir {
            self.data_dir = data_dir;
        }
        if let Some(max_upload_bytes) = file.max_upload_bytes {
            self.max_upload_bytes = max_upload_bytes;
        }
        if let Some(hours) = file.session_ttl_hours {
            self.session_ttl_hours = hours;
        }
        if let Some(days) = file.remember_me_days {
            self.remember_me_days = days;
        }
        if let Some(secs) = file.maintenance_interval_secs {
            self.maintenance_interval_secs = secs;
        }
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            data_dir: PathBuf::from("./data"),
            max_upload_bytes: 5 * 1024 * 1024 * 1024,
            session_ttl_hours: 12,
            remember_me_days: 7,
            maintenance_interval_secs: 3600,
        }
    }
}

/// On-disk representation of `lectern.toml`. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub data_dir: Option<PathBuf>,
    pub max_upload_bytes: Option<usize>,
    pub session_ttl_hours: Option<i64>,
    pub remember_me_days: Option<i64>,
    pub maintenance_interval_secs: Option<u64>,
}
