//! Topology-aware best-fit selector (§4.F): same goal as [`crate::linear`]
//! but over a switch tree instead of a flat node index line, so that a
//! placement favors nodes sharing the fewest switch hops.

use petgraph::graph::{DiGraph, NodeIndex as SwitchId};
use petgraph::Direction;

use crate::bitmap::NodeBitmap;
use crate::error::{Error, Result};
use crate::job::JobRequest;
use crate::linear::SelectResult;
use crate::node::{NodeIndex, NodeTable};

/// One switch in the tree: its name, its level (0 at the leaves, increasing
/// toward the root), and the set of cluster nodes in its subtree.
#[derive(Debug, Clone)]
struct SwitchRecord {
    name: String,
    level: u32,
    subtree: NodeBitmap,
}

/// Caller-supplied description of one switch, used to build a [`Topology`].
/// `children` indexes back into the slice passed to [`Topology::build`];
/// an empty `children` marks a leaf, whose directly attached nodes are
/// `leaf_nodes`.
pub struct SwitchSpec {
    pub name: String,
    pub children: Vec<usize>,
    pub leaf_nodes: Vec<NodeIndex>,
}

/// The switch tree, grounded on a [`petgraph::graph::DiGraph`] with edges
/// running parent -> child.
pub struct Topology {
    graph: DiGraph<SwitchRecord, ()>,
    root: SwitchId,
    leaf_of_node: Vec<Option<SwitchId>>,
}

impl Topology {
    pub fn build(n_nodes: usize, specs: &[SwitchSpec]) -> Result<Self> {
        let mut graph = DiGraph::new();
        let mut ids = Vec::with_capacity(specs.len());
        for s in specs {
            let mut subtree = NodeBitmap::with_capacity(n_nodes);
            for &ni in &s.leaf_nodes {
                subtree.set(ni, true);
            }
            ids.push(graph.add_node(SwitchRecord { name: s.name.clone(), level: 0, subtree }));
        }
        for (i, s) in specs.iter().enumerate() {
            for &c in &s.children {
                graph.add_edge(ids[i], ids[c], ());
            }
        }

        let order = petgraph::algo::toposort(&graph, None).map_err(|_| Error::Fatal("switch topology has a cycle".into()))?;

        for &idx in order.iter().rev() {
            let children: Vec<SwitchId> = graph.neighbors_directed(idx, Direction::Outgoing).collect();
            if children.is_empty() {
                continue;
            }
            let max_child_level = children.iter().map(|c| graph[*c].level).max().unwrap_or(0);
            graph[idx].level = max_child_level + 1;
            let mut subtree = NodeBitmap::with_capacity(n_nodes);
            for c in &children {
                subtree.union_with(&graph[*c].subtree);
            }
            graph[idx].subtree = subtree;
        }

        let root = order
            .iter()
            .copied()
            .find(|&idx| graph.neighbors_directed(idx, Direction::Incoming).next().is_none())
            .ok_or_else(|| Error::Fatal("switch topology has no root switch".into()))?;

        let mut leaf_of_node = vec![None; n_nodes];
        for idx in graph.node_indices() {
            if graph.neighbors_directed(idx, Direction::Outgoing).next().is_none() {
                for ni in graph[idx].subtree.iter_ones() {
                    leaf_of_node[ni] = Some(idx);
                }
            }
        }

        Ok(Self { graph, root, leaf_of_node })
    }

    pub fn root(&self) -> SwitchId {
        self.root
    }

    pub fn leaf_for_node(&self, node: NodeIndex) -> Option<SwitchId> {
        self.leaf_of_node.get(node).copied().flatten()
    }

    /// Path from `leaf` up to (and including) the root.
    pub fn ancestors(&self, leaf: SwitchId) -> Vec<SwitchId> {
        let mut out = vec![leaf];
        let mut cur = leaf;
        while let Some(parent) = self.graph.neighbors_directed(cur, Direction::Incoming).next() {
            out.push(parent);
            cur = parent;
        }
        out
    }

    fn is_leaf(&self, s: SwitchId) -> bool {
        self.graph.neighbors_directed(s, Direction::Outgoing).next().is_none()
    }

    pub fn subtree_leaves(&self, switch: SwitchId) -> &NodeBitmap {
        &self.graph[switch].subtree
    }

    pub fn level(&self, switch: SwitchId) -> u32 {
        self.graph[switch].level
    }

    /// The smallest-level switch whose subtree intersected with `input`
    /// holds at least `n_needed` nodes, breaking ties by smallest subtree
    /// (§4.J).
    pub fn best_subtree_for_count(&self, input: &NodeBitmap, n_needed: u32) -> Option<SwitchId> {
        let mut chosen: Option<SwitchId> = None;
        for s in self.graph.node_indices() {
            let count = self.graph[s].subtree.intersection(input).count() as u32;
            if count < n_needed {
                continue;
            }
            chosen = match chosen {
                None => Some(s),
                Some(c) if self.graph[s].level < self.graph[c].level => Some(s),
                Some(c) if self.graph[s].level == self.graph[c].level && self.graph[s].subtree.count() < self.graph[c].subtree.count() => Some(s),
                Some(c) => Some(c),
            };
        }
        chosen
    }

    pub fn leaves_under(&self, s: SwitchId) -> Vec<SwitchId> {
        if self.is_leaf(s) {
            return vec![s];
        }
        self.graph.neighbors_directed(s, Direction::Outgoing).flat_map(|c| self.leaves_under(c)).collect()
    }
}

struct LeafBucket {
    switch: SwitchId,
    nodes: Vec<NodeIndex>,
    node_count: u32,
    avail_cpus: u64,
    has_required: bool,
}

impl LeafBucket {
    fn sufficient(&self, target_nodes: i64, target_cpus: i64) -> bool {
        self.node_count as i64 >= target_nodes && self.avail_cpus as i64 >= target_cpus
    }

    fn is_better_than(&self, other: &LeafBucket, target_nodes: i64, target_cpus: i64) -> bool {
        if self.has_required != other.has_required {
            return self.has_required;
        }
        let (a_suff, b_suff) = (self.sufficient(target_nodes, target_cpus), other.sufficient(target_nodes, target_cpus));
        if a_suff != b_suff {
            return a_suff;
        }
        if a_suff {
            self.avail_cpus < other.avail_cpus
        } else {
            self.avail_cpus > other.avail_cpus
        }
    }
}

/// Select a best-fit set of nodes by walking down the switch tree to the
/// smallest subtree that can hold the job, then filling leaf-by-leaf
/// within it (§4.F).
pub fn select_topology(job: &JobRequest, topo: &Topology, nodes: &dyn NodeTable, fast_schedule: bool, input: &NodeBitmap) -> Result<SelectResult> {
    if input.count() < job.min_nodes as usize {
        return Err(Error::Invalid("fewer candidate nodes than min_nodes".into()));
    }
    let required = job.req_node_bitmap.clone();
    if let Some(req) = &required {
        if !req.is_subset_of(input) {
            return Err(Error::Invalid("required nodes not all present in candidates".into()));
        }
    }

    let target_nodes = job.req_nodes.max(job.min_nodes) as i64;
    let target_cpus = job.min_cpus as i64;

    // Candidate subtree roots: every switch whose subtree contains every
    // required node (the LCA and all of its ancestors), or every switch in
    // the tree when the job names no required nodes.
    let eligible: Vec<SwitchId> = match &required {
        Some(req) if !req.is_empty_bitmap() => {
            let first = req.iter_ones().next().unwrap();
            let leaf = topo.leaf_for_node(first).ok_or_else(|| Error::Invalid("required node has no switch".into()))?;
            topo.ancestors(leaf).into_iter().filter(|&s| req.is_subset_of(&topo.graph[s].subtree)).collect()
        }
        _ => topo.graph.node_indices().collect(),
    };
    if eligible.is_empty() {
        return Err(Error::NoFit);
    }

    // Smallest subtree (min level) that can hold the job on its own.
    let mut chosen: Option<SwitchId> = None;
    for &s in &eligible {
        let candidates = topo.graph[s].subtree.intersection(input);
        let count = candidates.count() as i64;
        let avail: u64 = candidates.iter_ones().map(|i| nodes.avail_cpus(i, fast_schedule) as u64).sum();
        if count < target_nodes || (avail as i64) < target_cpus {
            continue;
        }
        chosen = match chosen {
            None => Some(s),
            Some(c) if topo.graph[s].level < topo.graph[c].level => Some(s),
            Some(c) if topo.graph[s].level == topo.graph[c].level && topo.graph[s].subtree.count() < topo.graph[c].subtree.count() => Some(s),
            Some(c) => Some(c),
        };
    }
    let chosen = chosen.ok_or(Error::NoFit)?;

    // Bucket the chosen subtree's leaves and run the same lexicographic
    // fill as the linear selector, minus the contiguity dimension.
    let mut buckets: Vec<LeafBucket> = Vec::new();
    for leaf in topo.leaves_under(chosen) {
        let candidates = topo.graph[leaf].subtree.intersection(input);
        let mut leaf_nodes = Vec::new();
        let mut node_count = 0u32;
        let mut avail_cpus = 0u64;
        let mut has_required = false;
        for i in candidates.iter_ones() {
            leaf_nodes.push(i);
            if required.as_ref().map(|r| r.contains(i)).unwrap_or(false) {
                has_required = true;
            } else {
                node_count += 1;
                avail_cpus += nodes.avail_cpus(i, fast_schedule) as u64;
            }
        }
        if !leaf_nodes.is_empty() {
            buckets.push(LeafBucket { switch: leaf, nodes: leaf_nodes, node_count, avail_cpus, has_required });
        }
    }

    let mut output = NodeBitmap::with_capacity(input.len());
    let mut rem_nodes = target_nodes;
    let mut rem_cpus = target_cpus;
    let mut max_nodes_left = job.max_nodes as i64;
    let mut total_cpus = 0u32;

    // Required nodes are accepted unconditionally wherever they land.
    if let Some(req) = &required {
        for i in req.iter_ones() {
            output.set(i, true);
            rem_nodes -= 1;
            max_nodes_left -= 1;
            let avail = nodes.avail_cpus(i, fast_schedule);
            rem_cpus -= avail as i64;
            total_cpus += avail;
        }
    }

    while max_nodes_left > 0 && (rem_nodes > 0 || rem_cpus > 0) {
        let target_n = rem_nodes.max(0);
        let target_c = rem_cpus.max(0);
        let mut best: Option<usize> = None;
        for (idx, b) in buckets.iter().enumerate() {
            if b.node_count == 0 {
                continue;
            }
            best = match best {
                None => Some(idx),
                Some(cur) if b.is_better_than(&buckets[cur], target_n, target_c) => Some(idx),
                Some(cur) => Some(cur),
            };
        }
        let Some(idx) = best else { break };
        let bucket = &mut buckets[idx];
        for &j in &bucket.nodes {
            if output.contains(j) {
                continue;
            }
            if max_nodes_left <= 0 {
                break;
            }
            output.set(j, true);
            rem_nodes -= 1;
            max_nodes_left -= 1;
            let avail = nodes.avail_cpus(j, fast_schedule);
            rem_cpus -= avail as i64;
            total_cpus += avail;
            if max_nodes_left <= 0 || (rem_nodes <= 0 && rem_cpus <= 0) {
                break;
            }
        }
        bucket.node_count = 0;
        bucket.avail_cpus = 0;
        let _ = bucket.switch;
    }

    let popcount = output.count() as u32;
    let required_ok = required.as_ref().map(|r| r.is_subset_of(&output)).unwrap_or(true);
    if rem_cpus <= 0 && popcount >= job.min_nodes && popcount <= job.max_nodes && required_ok {
        Ok(SelectResult { bitmap: output, total_cpus })
    } else {
        Err(Error::NoFit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gres::GresRequest;
    use crate::job::MemoryRequest;
    use crate::node::{InMemoryNodeTable, PartitionId};
    use std::num::NonZeroU32;

    // Two leaf switches of 4 nodes each under one spine.
    fn spine_topology() -> Topology {
        let specs = vec![
            SwitchSpec { name: "leaf-0".into(), children: vec![], leaf_nodes: vec![0, 1, 2, 3] },
            SwitchSpec { name: "leaf-1".into(), children: vec![], leaf_nodes: vec![4, 5, 6, 7, 8] },
            SwitchSpec { name: "spine".into(), children: vec![0, 1], leaf_nodes: vec![] },
        ];
        Topology::build(9, &specs).unwrap()
    }

    fn job() -> JobRequest {
        JobRequest {
            job_id: NonZeroU32::new(1).unwrap(),
            partition: PartitionId::new("batch"),
            min_nodes: 4,
            max_nodes: 4,
            req_nodes: 4,
            min_cpus: 16,
            req_node_bitmap: None,
            exc_node_bitmap: None,
            contiguous: false,
            shared: 0,
            pn_min_memory: MemoryRequest::PerNode(0),
            gres: GresRequest::default(),
            preemptible: true,
        }
    }

    #[test]
    fn prefers_a_single_leaf_switch_over_the_spine() {
        let nodes = InMemoryNodeTable::uniform(9, 4, 8192);
        let topo = spine_topology();
        let input = NodeBitmap::from_bits(9, 0..9);
        let result = select_topology(&job(), &topo, &nodes, true, &input).unwrap();
        // all 4 picked nodes must land on a single leaf switch (0..=3).
        assert!(result.bitmap.iter_ones().all(|i| i < 4));
    }

    #[test]
    fn six_node_job_spans_both_leaf_switches() {
        let nodes = InMemoryNodeTable::uniform(9, 4, 8192);
        let topo = spine_topology();
        let mut j = job();
        j.min_nodes = 6;
        j.max_nodes = 6;
        j.req_nodes = 6;
        j.min_cpus = 24;
        let input = NodeBitmap::from_bits(9, 0..9);
        let result = select_topology(&j, &topo, &nodes, true, &input).unwrap();
        assert_eq!(result.bitmap.count(), 6);
        assert!(result.bitmap.iter_ones().any(|i| i < 4));
        assert!(result.bitmap.iter_ones().any(|i| (4..9).contains(&i)));
    }
}
