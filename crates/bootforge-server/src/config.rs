//! Server configuration
//!
//! Loaded from a TOML file; every field has a default so a missing file
//! yields a runnable development configuration.

use crate::generator::{InstallUser, NetworkDefaults};
use anyhow::Context;
use serde::Deserialize;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// HTTP listen port (boot scripts, config fetch, management API)
    pub http_port: u16,

    /// TFTP bind address
    pub tftp_bind: Ipv4Addr,

    /// TFTP listen port
    pub tftp_port: u16,

    /// Base URL nodes reach this server at, as it appears inside scripts
    pub base_url: String,

    /// Path of the node store file
    pub store_path: PathBuf,

    /// Directory holding boot artifacts (iPXE binary, installer image)
    pub artifact_dir: PathBuf,

    /// Seconds a dormant node waits between boot retries
    pub retry_delay_secs: u32,

    /// Installer kernel, as a URL path under the base URL
    pub kernel_path: String,

    /// Installer initrd, as a URL path under the base URL
    pub initrd_path: String,

    /// Serial console passed to the installer kernel, if any
    pub console: Option<String>,

    /// Extra kernel parameters for every chainload
    pub kernel_params: Vec<String>,

    /// Users provisioned onto installed nodes
    pub users: Vec<InstallUser>,

    /// Network parameters shared by all nodes
    pub network: NetworkDefaults,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_port: 8080,
            tftp_bind: Ipv4Addr::UNSPECIFIED,
            tftp_port: 69,
            base_url: "http://127.0.0.1:8080".to_string(),
            store_path: PathBuf::from("/var/lib/bootforge/store.json"),
            artifact_dir: PathBuf::from("/var/lib/bootforge/artifacts"),
            retry_delay_secs: 60,
            kernel_path: "files/installer/linux".to_string(),
            initrd_path: "files/installer/initrd".to_string(),
            console: None,
            kernel_params: Vec::new(),
            users: Vec::new(),
            network: NetworkDefaults::default(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from a TOML file.
    ///
    /// A missing file yields the defaults; an unreadable or malformed file
    /// is an error.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(raw) => toml::from_str(&raw)
                .with_context(|| format!("malformed config file {}", path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "no config file, using defaults");
                Ok(Self::default())
            }
            Err(e) => {
                Err(e).with_context(|| format!("reading config file {}", path.display()))
            }
        }
    }
}
