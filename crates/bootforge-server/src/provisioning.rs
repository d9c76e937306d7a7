//! Provisioning state machine
//!
//! Decides, for every boot contact and config fetch, what a node receives
//! next. The orchestrator only reacts to the node's recorded stage;
//! promotion to `chainload-ready` happens out-of-band through the
//! registry's replace path. The one transition it performs itself is the
//! advance to `provisioned` after a successful config generation.

use crate::generator::ConfigGenerator;
use crate::registry::NodeRegistry;
use crate::store::StoreError;
use bootforge_common::NodeStage;
use bootforge_ipxe::{IpxeError, IpxeScripts};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// Errors from provisioning decisions
#[derive(Debug, Error)]
pub enum ProvisioningError {
    #[error("store failure: {0}")]
    Store(#[from] StoreError),

    /// Config fetch for a node that never made boot contact
    #[error("unknown node: {0}")]
    UnknownNode(String),

    #[error("no config generator for family: {0}")]
    UnknownFamily(String),

    /// Opaque failure from the external config generator, passed through
    #[error("config generation failed: {0}")]
    Generator(#[source] anyhow::Error),

    #[error(transparent)]
    Script(#[from] IpxeError),
}

pub type Result<T> = std::result::Result<T, ProvisioningError>;

/// Artifact class returned for a boot contact
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootArtifact {
    /// Park the node in a low-frequency retry loop
    DormantLoop(String),
    /// Boot the installer, parameterized with the node's record
    Chainload(String),
}

impl BootArtifact {
    /// The iPXE script text, whatever the class
    pub fn script(&self) -> &str {
        match self {
            BootArtifact::DormantLoop(s) | BootArtifact::Chainload(s) => s,
        }
    }
}

/// The provisioning orchestrator
pub struct Provisioner {
    registry: NodeRegistry,
    scripts: IpxeScripts,
    generators: HashMap<&'static str, Arc<dyn ConfigGenerator>>,
}

impl Provisioner {
    /// Create an orchestrator over the given registry
    pub fn new(registry: NodeRegistry, scripts: IpxeScripts) -> Self {
        Self {
            registry,
            scripts,
            generators: HashMap::new(),
        }
    }

    /// Register a config generator under its family key
    pub fn with_generator(mut self, generator: Arc<dyn ConfigGenerator>) -> Self {
        self.generators.insert(generator.family(), generator);
        self
    }

    /// Access the node registry (the management adapter's path in)
    pub fn registry(&self) -> &NodeRegistry {
        &self.registry
    }

    /// Handle a boot contact: register first sight, then pick the artifact
    /// for the node's current stage.
    pub fn boot_contact(&self, id: &str, hwaddr: &str) -> Result<BootArtifact> {
        let (node, created) = self.registry.ensure_node(id, hwaddr)?;
        if created {
            info!(id = %id, hwaddr = %hwaddr, name = %node.name, "first contact, parking node");
        }

        match node.stage {
            NodeStage::Dormant => Ok(BootArtifact::DormantLoop(self.scripts.dormant_script())),
            NodeStage::ChainloadReady => {
                info!(id = %id, name = %node.name, "serving installer chainload");
                Ok(BootArtifact::Chainload(self.scripts.chainload_script(&node)?))
            }
            NodeStage::Provisioned => {
                // re-requesting a boot script is not destructive; serve the
                // chainload again rather than failing the boot
                debug!(id = %id, "provisioned node re-requested boot script");
                Ok(BootArtifact::Chainload(self.scripts.chainload_script(&node)?))
            }
        }
    }

    /// Handle a config fetch: render the node's install configuration and
    /// advance it to `provisioned`.
    ///
    /// A node that never made boot contact cannot fetch a configuration;
    /// that is an ordering violation by the caller and mutates nothing.
    pub fn config_fetch(&self, id: &str, family: &str) -> Result<Vec<u8>> {
        let node = self
            .registry
            .get(id)?
            .ok_or_else(|| ProvisioningError::UnknownNode(id.to_string()))?;

        let generator = self
            .generators
            .get(family)
            .ok_or_else(|| ProvisioningError::UnknownFamily(family.to_string()))?;

        let payload = generator
            .generate(&node)
            .map_err(ProvisioningError::Generator)?;

        if node.stage != NodeStage::Provisioned {
            let mut done = node;
            done.stage = NodeStage::Provisioned;
            self.registry.replace(id, done)?;
            info!(id = %id, family = %family, "config issued, node provisioned");
        }

        Ok(payload)
    }
}

impl std::fmt::Debug for Provisioner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Provisioner")
            .field("families", &self.generators.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}
