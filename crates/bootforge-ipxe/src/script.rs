//! iPXE script construction
//!
//! Scripts are plain text built with `format!`; iPXE's own `${...}`
//! variables are left for the client firmware to expand.

use crate::error::{IpxeError, Result};
use bootforge_common::Node;

/// Default seconds a dormant node waits between retries
pub const DEFAULT_RETRY_DELAY_SECS: u32 = 60;

/// Configuration for iPXE script generation
#[derive(Debug, Clone)]
pub struct IpxeConfig {
    /// Base URL of the HTTP boot path (e.g. http://192.168.1.1:8080)
    pub base_url: String,

    /// Seconds a dormant node sleeps before re-requesting its boot script
    pub retry_delay_secs: u32,

    /// Installer kernel path relative to the base URL
    pub kernel_path: String,

    /// Installer initrd path relative to the base URL
    pub initrd_path: String,

    /// Console configuration (e.g. "ttyS0,115200")
    pub console: Option<String>,

    /// Extra kernel parameters appended to every chainload
    pub kernel_params: Vec<String>,
}

impl IpxeConfig {
    /// Create a new config with base URL
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            retry_delay_secs: DEFAULT_RETRY_DELAY_SECS,
            kernel_path: "files/installer/linux".to_string(),
            initrd_path: "files/installer/initrd".to_string(),
            console: None,
            kernel_params: Vec::new(),
        }
    }

    /// Set the dormant retry delay
    pub fn with_retry_delay(mut self, secs: u32) -> Self {
        self.retry_delay_secs = secs;
        self
    }

    /// Set the installer kernel path
    pub fn with_kernel_path(mut self, path: impl Into<String>) -> Self {
        self.kernel_path = path.into();
        self
    }

    /// Set the installer initrd path
    pub fn with_initrd_path(mut self, path: impl Into<String>) -> Self {
        self.initrd_path = path.into();
        self
    }

    /// Set console configuration
    pub fn with_console(mut self, console: impl Into<String>) -> Self {
        self.console = Some(console.into());
        self
    }

    /// Add a kernel parameter
    pub fn with_kernel_param(mut self, param: impl Into<String>) -> Self {
        self.kernel_params.push(param.into());
        self
    }
}

/// Script generator for the three boot artifact kinds
#[derive(Debug, Clone)]
pub struct IpxeScripts {
    config: IpxeConfig,
}

impl IpxeScripts {
    /// Create a new generator
    pub fn new(config: IpxeConfig) -> Self {
        Self { config }
    }

    /// First-stage script served over TFTP.
    ///
    /// Chains every machine into the HTTP boot path, reporting its client
    /// identifier and MAC so the server can register first contact.
    pub fn autoexec_script(&self) -> String {
        format!(
            r#"#!ipxe

echo Bootforge network boot
echo UUID: ${{uuid}}
echo MAC: ${{mac}}
echo

chain {base}/boot/${{uuid}}?mac=${{mac}}
"#,
            base = self.config.base_url
        )
    }

    /// Dormant-loop script for a node with no confirmed install target.
    ///
    /// The node sleeps and re-requests its boot script until an operator
    /// promotes it; a chain failure falls back into the same loop.
    pub fn dormant_script(&self) -> String {
        format!(
            r#"#!ipxe

echo Bootforge: no install target assigned to ${{uuid}}
echo Retrying every {delay} seconds

:park
sleep {delay}
chain --replace {base}/boot/${{uuid}}?mac=${{mac}} || goto park
"#,
            delay = self.config.retry_delay_secs,
            base = self.config.base_url
        )
    }

    /// Chainload script booting the installer for a promoted node.
    pub fn chainload_script(&self, node: &Node) -> Result<String> {
        if self.config.base_url.is_empty() {
            return Err(IpxeError::MissingConfig("base_url".to_string()));
        }

        Ok(format!(
            r#"#!ipxe

echo Bootforge: installing {name}
echo

echo Loading kernel...
kernel {base}/{kernel} {params}
echo Loading initrd...
initrd {base}/{initrd}
echo Booting installer...
boot
"#,
            name = node.name,
            base = self.config.base_url,
            kernel = self.config.kernel_path,
            initrd = self.config.initrd_path,
            params = self.kernel_params_string(node),
        ))
    }

    /// Build the kernel parameters string for a chainload
    fn kernel_params_string(&self, node: &Node) -> String {
        let mut params = self.config.kernel_params.clone();

        if let Some(ref console) = self.config.console {
            params.push(format!("console={}", console));
        }

        params.push(format!("hostname={}", node.name));
        if !node.is_unassigned() {
            params.push(format!("bootforge.addr={}", node.addr));
        }
        params.push(format!(
            "bootforge.config={}/config/{}/config.ign",
            self.config.base_url, node.id
        ));

        params.join(" ")
    }
}
