//! Feasibility mask builder, `count_bitmap` (§4.D).

use crate::bitmap::NodeBitmap;
use crate::job::{JobRequest, SelectMode};
use crate::node::NodeTable;
use crate::state::State;

/// Filter `input` down to nodes that can feasibly host `job`, honoring
/// `mode` and the per-partition `(run_cap, tot_cap)` ceiling. Returns the
/// filtered bitmap and its popcount.
///
/// `run_cap`/`tot_cap` of `u32::MAX` models "no cap" (used by TEST_ONLY and
/// by the unbounded final pass of the RUN_NOW sweep, §4.G).
pub fn count_bitmap(
    state: &State,
    job: &JobRequest,
    nodes: &dyn NodeTable,
    fast_schedule: bool,
    overcommit_memory: bool,
    input: &NodeBitmap,
    run_cap: u32,
    tot_cap: u32,
    mode: SelectMode,
) -> (NodeBitmap, usize) {
    let mut out = NodeBitmap::with_capacity(input.len());

    for i in input.iter_ones() {
        let cpu_cnt = nodes.cpu_cnt(i, fast_schedule);

        // 1. GRES feasibility. Absence of a per-node view means "defer to
        // the node table's own copy" (§3); that copy is outside this
        // crate's model, so we treat absence as satisfied.
        let gres_ok = match &state.nodes[i].gres_list {
            Some(view) => view.can_satisfy(&job.gres, cpu_cnt, mode == SelectMode::TestOnly),
            None => true,
        };
        if !gres_ok {
            continue;
        }

        // 2. TEST_ONLY stops here.
        if mode == SelectMode::TestOnly {
            out.set(i, true);
            continue;
        }

        // 3. Memory.
        if !overcommit_memory {
            let claim = job.pn_min_memory.mem_on(cpu_cnt);
            let projected = state.nodes[i].alloc_memory.saturating_add(claim);
            if projected > nodes.node(i).real_memory {
                continue;
            }
        }

        // 4. Not exclusively held.
        if state.nodes[i].exclusive_cnt > 0 {
            continue;
        }

        // 5. Per-partition caps.
        let (run, tot) = state.nodes[i].part_totals();
        if run > run_cap || tot > tot_cap {
            continue;
        }

        out.set(i, true);
    }

    let count = out.count();
    (out, count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gres::GresRequest;
    use crate::job::MemoryRequest;
    use crate::node::{InMemoryNodeTable, PartitionId};
    use std::num::NonZeroU32;

    fn job(part: &str) -> JobRequest {
        JobRequest {
            job_id: NonZeroU32::new(1).unwrap(),
            partition: PartitionId::new(part),
            min_nodes: 1,
            max_nodes: 4,
            req_nodes: 1,
            min_cpus: 1,
            req_node_bitmap: None,
            exc_node_bitmap: None,
            contiguous: false,
            shared: 0,
            pn_min_memory: MemoryRequest::PerNode(1024),
            gres: GresRequest::default(),
            preemptible: true,
        }
    }

    #[test]
    fn excludes_memory_overcommitted_node() {
        let nodes = InMemoryNodeTable::uniform(2, 4, 2048);
        let mut state = State::empty(2);
        state.nodes[0].alloc_memory = 1536;
        let input = NodeBitmap::from_bits(2, [0, 1]);

        let (out, count) = count_bitmap(&state, &job("batch"), &nodes, true, false, &input, u32::MAX, u32::MAX, SelectMode::RunNow);
        assert_eq!(count, 1);
        assert!(!out.contains(0));
        assert!(out.contains(1));
    }

    #[test]
    fn test_only_ignores_memory() {
        let nodes = InMemoryNodeTable::uniform(1, 4, 2048);
        let mut state = State::empty(1);
        state.nodes[0].alloc_memory = 4096; // already over capacity
        let input = NodeBitmap::from_bits(1, [0]);

        let (_, count) = count_bitmap(&state, &job("batch"), &nodes, true, false, &input, u32::MAX, u32::MAX, SelectMode::TestOnly);
        assert_eq!(count, 1);
    }

    #[test]
    fn excludes_exclusively_held_node() {
        let nodes = InMemoryNodeTable::uniform(1, 4, 2048);
        let mut state = State::empty(1);
        state.nodes[0].exclusive_cnt = 1;
        let input = NodeBitmap::from_bits(1, [0]);

        let (_, count) = count_bitmap(&state, &job("batch"), &nodes, true, false, &input, u32::MAX, u32::MAX, SelectMode::RunNow);
        assert_eq!(count, 0);
    }

    #[test]
    fn excludes_node_over_partition_cap() {
        let nodes = InMemoryNodeTable::uniform(1, 4, 2048);
        let mut state = State::empty(1);
        let part = PartitionId::new("batch");
        state.nodes[0].part_entry(&part).tot_job_cnt = 5;
        let input = NodeBitmap::from_bits(1, [0]);

        let (_, count) = count_bitmap(&state, &job("batch"), &nodes, true, false, &input, u32::MAX, 2, SelectMode::RunNow);
        assert_eq!(count, 0);
    }
}
