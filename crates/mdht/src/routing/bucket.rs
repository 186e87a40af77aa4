//! A single k-bucket: up to `k` nodes sharing a common id prefix.

use crate::domain::node::{Node, Quality};
use crate::domain::node_id::NodeId;
use crate::domain::timestamp::Timestamp;

/// Ordered list of up to `k` nodes. Order is insertion order, which the
/// table relies on to find the least-recently-seen bad node to displace.
#[derive(Debug, Default)]
pub struct Bucket {
    nodes: Vec<Node>,
}

impl Bucket {
    pub fn new() -> Self {
        Bucket { nodes: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn is_full(&self, k: usize) -> bool {
        self.nodes.len() >= k
    }

    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    pub fn find(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.iter().find(|n| &n.id == id)
    }

    pub fn find_mut(&mut self, id: &NodeId) -> Option<&mut Node> {
        self.nodes.iter_mut().find(|n| &n.id == id)
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.find(id).is_some()
    }

    /// Appends unconditionally. Callers must check `is_full` first.
    pub fn push(&mut self, node: Node) {
        self.nodes.push(node);
    }

    pub fn remove(&mut self, id: &NodeId) -> Option<Node> {
        let pos = self.nodes.iter().position(|n| &n.id == id)?;
        Some(self.nodes.remove(pos))
    }

    /// The first (least-recently-inserted) node currently classified as
    /// bad, if any. This is the only node a full bucket may evict.
    pub fn first_bad(&self, now: Timestamp) -> Option<&Node> {
        self.nodes.iter().find(|n| n.quality(now) == Quality::Bad)
    }

    pub fn replace_bad_with(&mut self, now: Timestamp, node: Node) -> bool {
        if let Some(pos) = self.nodes.iter().position(|n| n.quality(now) == Quality::Bad) {
            self.nodes[pos] = node;
            true
        } else {
            false
        }
    }
}
