//! iPXE boot script generation.
//!
//! Every artifact handed to a booting node is an iPXE script. Three kinds
//! exist:
//!
//! - **autoexec**: the first-stage script served over TFTP that chains every
//!   machine into the HTTP boot path
//! - **dormant loop**: parks an unassigned node in a low-frequency retry loop
//! - **chainload**: boots the installer with per-node parameters
//!
//! # Example
//!
//! ```
//! use bootforge_ipxe::{IpxeConfig, IpxeScripts};
//!
//! let scripts = IpxeScripts::new(IpxeConfig::new("http://192.168.1.1:8080"));
//! let script = scripts.dormant_script();
//!
//! assert!(script.starts_with("#!ipxe"));
//! ```

pub mod error;
pub mod script;

pub use error::*;
pub use script::*;
