//! Shared node model for bootforge.
//!
//! Everything a boundary adapter needs to talk about a node lives here:
//! the durable record, its lifecycle stage, and the placeholder-name
//! generation used when a node is first seen.

pub mod names;
pub mod node;

pub use names::placeholder_name;
pub use node::{Node, NodeStage, UNASSIGNED_ADDR};
