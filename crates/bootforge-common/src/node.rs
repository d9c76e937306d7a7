use serde::{Deserialize, Serialize};
use std::fmt;

use crate::names::placeholder_name;

/// Sentinel for a node that has not been assigned a network address yet.
pub const UNASSIGNED_ADDR: &str = "unassigned";

/// A node being provisioned, keyed by the client identifier the boot
/// protocol reports on every contact.
///
/// The record is deliberately flat: the management API serializes it
/// verbatim, and the store round-trips it through JSON unchanged.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Node {
    /// Client identifier, stable for the node's lifetime.
    pub id: String,
    /// Hardware address captured at first boot contact. First contact wins;
    /// later contacts reporting a different address do not overwrite it.
    pub hwaddr: String,
    /// Display name. Starts as a generated placeholder.
    pub name: String,
    /// Assigned network address, or [`UNASSIGNED_ADDR`] until an operator
    /// sets one.
    pub addr: String,
    /// Current position in the provisioning lifecycle.
    pub stage: NodeStage,
}

impl Node {
    /// Build the record created when a node is seen for the first time.
    pub fn first_contact(id: impl Into<String>, hwaddr: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: placeholder_name(&id),
            id,
            hwaddr: hwaddr.into(),
            addr: UNASSIGNED_ADDR.to_string(),
            stage: NodeStage::Dormant,
        }
    }

    /// Whether the node still has the address sentinel.
    pub fn is_unassigned(&self) -> bool {
        self.addr == UNASSIGNED_ADDR
    }
}

/// Node lifecycle stage
///
/// Progress through stages: Dormant → ChainloadReady → Provisioned
///
/// - `Dormant`: first contact made, no confirmed install target yet; the
///   node parks in a retry loop
/// - `ChainloadReady`: an operator promoted the node; next boot contact
///   receives the installer chainload
/// - `Provisioned`: terminal; the node has fetched its install configuration
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum NodeStage {
    Dormant,
    ChainloadReady,
    Provisioned,
}

impl NodeStage {
    /// Machine-readable stage string for APIs and scripts
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeStage::Dormant => "dormant",
            NodeStage::ChainloadReady => "chainload-ready",
            NodeStage::Provisioned => "provisioned",
        }
    }

    /// Whether no further automatic transitions occur from this stage.
    pub fn is_terminal(&self) -> bool {
        matches!(self, NodeStage::Provisioned)
    }
}

impl fmt::Display for NodeStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
