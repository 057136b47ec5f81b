//! In-memory resource accounting: job-ID residency sets (§4.A), the
//! per-node accounting record (§4.B), and the `State` snapshot that
//! aggregates them (§4.C).

use tracing::{debug, warn};

use crate::gres::GresView;
use crate::node::PartitionId;

/// Fixed growth increment for the sparse job-ID arrays (§3).
const GROWTH_BLOCK: usize = 16;

/// A flat, sparse array of job IDs with zero as the tombstone (§4.A).
/// Order is not significant; holes left by `remove` are reused by the
/// next `add`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobIdSet {
    slots: Vec<u32>,
}

impl JobIdSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fill a zero hole, or grow by `GROWTH_BLOCK` and append.
    pub fn add(&mut self, id: crate::job::JobId) {
        let id = id.get();
        if let Some(slot) = self.slots.iter_mut().find(|s| **s == 0) {
            *slot = id;
            return;
        }
        let start = self.slots.len();
        self.slots.resize(start + GROWTH_BLOCK, 0);
        self.slots[start] = id;
    }

    /// Zero every matching slot (duplicates tolerated); returns whether
    /// any slot matched.
    pub fn remove(&mut self, id: crate::job::JobId) -> bool {
        let id = id.get();
        let mut found = false;
        for slot in self.slots.iter_mut() {
            if *slot == id {
                *slot = 0;
                found = true;
            }
        }
        found
    }

    pub fn contains(&self, id: crate::job::JobId) -> bool {
        let id = id.get();
        self.slots.iter().any(|s| *s == id)
    }

    /// Non-tombstone entries, in storage order (order is not meaningful).
    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.slots.iter().copied().filter(|s| *s != 0)
    }
}

/// One partition's tenant counters on a single node (§3 `PartCR`).
#[derive(Debug, Clone)]
pub struct PartCR {
    pub part: PartitionId,
    pub run_job_cnt: u32,
    pub tot_job_cnt: u32,
}

impl PartCR {
    fn new(part: PartitionId) -> Self {
        Self { part, run_job_cnt: 0, tot_job_cnt: 0 }
    }

    /// Clamp `run_job_cnt` to `tot_job_cnt` and log if it drifted above
    /// it, and clamp `run_job_cnt` to zero whenever `tot_job_cnt` is zero
    /// (§3 invariant; resyncs log and clamp).
    fn resync(&mut self, node_name: &str) {
        if self.tot_job_cnt == 0 && self.run_job_cnt != 0 {
            warn!(
                node = node_name,
                partition = %self.part,
                run_job_cnt = self.run_job_cnt,
                "PartCR run_job_cnt nonzero with tot_job_cnt == 0, clamping"
            );
            self.run_job_cnt = 0;
        } else if self.run_job_cnt > self.tot_job_cnt {
            warn!(
                node = node_name,
                partition = %self.part,
                run_job_cnt = self.run_job_cnt,
                tot_job_cnt = self.tot_job_cnt,
                "PartCR run_job_cnt exceeds tot_job_cnt, clamping"
            );
            self.run_job_cnt = self.tot_job_cnt;
        }
    }
}

/// Per-node accounting record (§4.B). A small `Vec` rather than the
/// teacher C implementation's linked list, per §9's note that a vector is
/// preferable in a rewrite -- the number of partitions touching a node is
/// always tiny.
#[derive(Debug)]
pub struct NodeCR {
    pub alloc_memory: u32,
    pub exclusive_cnt: u32,
    pub parts: Vec<PartCR>,
    pub gres_list: Option<Box<dyn GresView>>,
}

impl Clone for NodeCR {
    fn clone(&self) -> Self {
        Self {
            alloc_memory: self.alloc_memory,
            exclusive_cnt: self.exclusive_cnt,
            parts: self.parts.clone(),
            gres_list: self.gres_list.as_ref().map(|g| g.dup()),
        }
    }
}

impl Default for NodeCR {
    fn default() -> Self {
        Self { alloc_memory: 0, exclusive_cnt: 0, parts: Vec::new(), gres_list: None }
    }
}

impl NodeCR {
    /// Find (or create) this node's tenant counters for `part`.
    pub fn part_entry(&mut self, part: &PartitionId) -> &mut PartCR {
        if let Some(idx) = self.parts.iter().position(|p| &p.part == part) {
            &mut self.parts[idx]
        } else {
            self.parts.push(PartCR::new(part.clone()));
            self.parts.last_mut().unwrap()
        }
    }

    pub fn find_part(&self, part: &PartitionId) -> Option<&PartCR> {
        self.parts.iter().find(|p| &p.part == part)
    }

    /// Total running/total job counts summed across every partition
    /// touching this node (§4.D step 5).
    pub fn part_totals(&self) -> (u32, u32) {
        self.parts.iter().fold((0, 0), |(run, tot), p| (run + p.run_job_cnt, tot + p.tot_job_cnt))
    }

    /// Release one unit of memory, clamping to zero and logging on
    /// underflow rather than panicking (§4.H, §7 `Invariant`).
    pub fn release_memory(&mut self, amount: u32, node_name: &str, fast_schedule: bool) {
        match self.alloc_memory.checked_sub(amount) {
            Some(v) => self.alloc_memory = v,
            None => {
                if fast_schedule {
                    warn!(node = node_name, amount, alloc_memory = self.alloc_memory, "alloc_memory underflow");
                } else {
                    debug!(node = node_name, amount, alloc_memory = self.alloc_memory, "alloc_memory underflow (fast-schedule off)");
                }
                self.alloc_memory = 0;
            }
        }
    }

    pub fn release_exclusive(&mut self, node_name: &str) {
        match self.exclusive_cnt.checked_sub(1) {
            Some(v) => self.exclusive_cnt = v,
            None => {
                warn!(node = node_name, "exclusive_cnt underflow");
                self.exclusive_cnt = 0;
            }
        }
    }
}

/// The aggregate in-memory snapshot (§4.C). Created lazily on first use,
/// rebuilt whenever the node table changes or a reconfigure is requested.
#[derive(Clone)]
pub struct State {
    pub nodes: Vec<NodeCR>,
    pub run_job_ids: JobIdSet,
    pub tot_job_ids: JobIdSet,
}

impl State {
    /// A freshly rebuilt state for `n` nodes with no jobs (§8 "byte-identical
    /// to a fresh rebuild_from(jobs=∅)").
    pub fn empty(n: usize) -> Self {
        Self {
            nodes: (0..n).map(|_| NodeCR::default()).collect(),
            run_job_ids: JobIdSet::new(),
            tot_job_ids: JobIdSet::new(),
        }
    }

    /// Resync every node's `PartCR` counters (§3 invariant repair),
    /// intended to run after any mutation that could have drifted them.
    pub fn resync_all(&mut self, node_name: impl Fn(usize) -> String) {
        for (i, node) in self.nodes.iter_mut().enumerate() {
            for part in node.parts.iter_mut() {
                part.resync(&node_name(i));
            }
        }
    }
}

fn job_id_sets_eq(a: &JobIdSet, b: &JobIdSet) -> bool {
    let mut a_ids: Vec<u32> = a.iter().collect();
    let mut b_ids: Vec<u32> = b.iter().collect();
    a_ids.sort_unstable();
    b_ids.sort_unstable();
    a_ids == b_ids
}

impl PartialEq for State {
    fn eq(&self, other: &Self) -> bool {
        if self.nodes.len() != other.nodes.len() {
            return false;
        }
        job_id_sets_eq(&self.run_job_ids, &other.run_job_ids)
            && job_id_sets_eq(&self.tot_job_ids, &other.tot_job_ids)
            && self
                .nodes
                .iter()
                .zip(other.nodes.iter())
                .all(|(a, b)| a.alloc_memory == b.alloc_memory && a.exclusive_cnt == b.exclusive_cnt && part_counts_eq(&a.parts, &b.parts))
    }
}

fn part_counts_eq(a: &[PartCR], b: &[PartCR]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().all(|pa| b.iter().any(|pb| pb.part == pa.part && pb.run_job_cnt == pa.run_job_cnt && pb.tot_job_cnt == pa.tot_job_cnt))
}
