//! Node table collaborator.
//!
//! The node and partition tables are external to the engine (§1): the
//! engine only ever asks them for a node count, per-node memory/CPU
//! figures, and power state. [`NodeTable`] is that seam; [`InMemoryNodeTable`]
//! is a standalone implementation useful for tests, benchmarks, and small
//! embeddings that don't have a real cluster database to plug in.

use std::sync::Arc;

/// Stable, dense index into the node table (§3 "Node index").
pub type NodeIndex = usize;

/// Opaque reference to a partition. Two `PartitionId`s are the same
/// partition iff they compare equal; the engine never interprets the
/// contents.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PartitionId(Arc<str>);

impl PartitionId {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PartitionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Power state of a node, used by `job_ready` (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerState {
    /// Node is up and schedulable.
    Up,
    /// Node is powered down to save energy.
    PowerSave,
    /// Node is in the process of powering up.
    PowerUp,
}

/// Static per-node facts the engine reads but never mutates.
#[derive(Debug, Clone)]
pub struct NodeInfo {
    /// Node name, for logging only.
    pub name: String,
    /// Real memory in MB.
    pub real_memory: u32,
    /// CPU count from the cluster's declared configuration.
    pub cpus_configured: u32,
    /// CPU count from hardware probing.
    pub cpus_detected: u32,
    pub power_state: PowerState,
}

/// The external node/partition table collaborator.
///
/// Implementors provide a dense `0..len()` view of the cluster. The engine
/// never stores a `NodeTable` across calls in a way that outlives the
/// lock -- see [`crate::Engine`].
pub trait NodeTable: Send + Sync {
    fn len(&self) -> usize;

    fn node(&self, i: NodeIndex) -> &NodeInfo;

    /// CPU count to use for feasibility math, per §4.D: configured under
    /// fast-schedule, detected otherwise.
    fn cpu_cnt(&self, i: NodeIndex, fast_schedule: bool) -> u32 {
        let n = self.node(i);
        if fast_schedule {
            n.cpus_configured
        } else {
            n.cpus_detected
        }
    }

    /// Available (unclaimed) CPUs on node `i`, used by the best-fit run
    /// table (§4.E step 3). This is the "cross-node CPU feasibility check"
    /// collaborator: a real embedding derives it from the node's current
    /// job layout; callers that don't track per-job CPU claims separately
    /// from the engine's own `State` may simply return `cpu_cnt`.
    fn avail_cpus(&self, i: NodeIndex, fast_schedule: bool) -> u32 {
        self.cpu_cnt(i, fast_schedule)
    }
}

/// A standalone, in-memory node table.
pub struct InMemoryNodeTable {
    nodes: Vec<NodeInfo>,
}

impl InMemoryNodeTable {
    pub fn new(nodes: Vec<NodeInfo>) -> Self {
        Self { nodes }
    }

    /// Build `n` uniform nodes, convenient for tests and benchmarks.
    pub fn uniform(n: usize, cpus: u32, real_memory: u32) -> Self {
        let nodes = (0..n)
            .map(|i| NodeInfo {
                name: format!("node-{i}"),
                real_memory,
                cpus_configured: cpus,
                cpus_detected: cpus,
                power_state: PowerState::Up,
            })
            .collect();
        Self::new(nodes)
    }
}

impl NodeTable for InMemoryNodeTable {
    fn len(&self) -> usize {
        self.nodes.len()
    }

    fn node(&self, i: NodeIndex) -> &NodeInfo {
        &self.nodes[i]
    }
}
