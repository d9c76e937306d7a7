//! Node registry
//!
//! A typed view over the store, keyed `node-<id>`. The registry owns node
//! records; callers only ever see copies.

use crate::store::{FileStore, Result};
use bootforge_common::Node;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Store key prefix for node records
pub const NODE_KEY_PREFIX: &str = "node-";

/// Typed node CRUD over the shared store
#[derive(Debug, Clone)]
pub struct NodeRegistry {
    store: Arc<FileStore>,
}

impl NodeRegistry {
    /// Create a registry over the given store
    pub fn new(store: Arc<FileStore>) -> Self {
        Self { store }
    }

    fn key(id: &str) -> String {
        format!("{}{}", NODE_KEY_PREFIX, id)
    }

    /// Look up a node, creating it on first sight.
    ///
    /// Returns the record and whether this call created it. Creation races
    /// resolve to exactly one winner; the losers observe the winner's
    /// record. The hardware address captured at first contact is
    /// authoritative: later calls reporting a different address leave the
    /// record untouched.
    pub fn ensure_node(&self, id: &str, hwaddr: &str) -> Result<(Node, bool)> {
        let key = Self::key(id);
        loop {
            if let Some(existing) = self.store.get::<Node>(&key)? {
                if !hwaddr.is_empty() && existing.hwaddr != hwaddr {
                    debug!(
                        id = %id,
                        recorded = %existing.hwaddr,
                        reported = %hwaddr,
                        "ignoring changed hardware address; first contact wins"
                    );
                }
                return Ok((existing, false));
            }

            let node = Node::first_contact(id, hwaddr);
            if self.store.insert_if_absent(&key, &node)? {
                return Ok((node, true));
            }
            // lost the creation race; loop to read the winner's record
        }
    }

    /// Get a node by identifier
    pub fn get(&self, id: &str) -> Result<Option<Node>> {
        self.store.get(&Self::key(id))
    }

    /// Replace a node record wholesale (the external-edit path).
    ///
    /// The identifier in the record is forced to `id`; one record per
    /// identifier, always.
    pub fn replace(&self, id: &str, mut node: Node) -> Result<Node> {
        node.id = id.to_string();
        self.store.set(&Self::key(id), &node)?;
        Ok(node)
    }

    /// Delete a node record
    pub fn delete(&self, id: &str) -> Result<()> {
        self.store.delete(&Self::key(id))
    }

    /// Enumerate all node records, keyed by identifier
    pub fn list(&self) -> Result<HashMap<String, Node>> {
        let scan: HashMap<String, Node> = self.store.scan_prefix(NODE_KEY_PREFIX)?;
        Ok(scan
            .into_iter()
            .map(|(key, node)| (key[NODE_KEY_PREFIX.len()..].to_string(), node))
            .collect())
    }
}
