//! The three-mode `job_test` dispatcher (§4.G): TEST_ONLY, RUN_NOW, and
//! WILL_RUN, layered on top of [`crate::linear`]/[`crate::topology`] and
//! [`crate::feasibility::count_bitmap`].

use tracing::debug;

use crate::bitmap::NodeBitmap;
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::feasibility::count_bitmap;
use crate::job::{JobId, JobRequest, JobResources, SelectMode};
use crate::linear::{select_linear, SelectResult};
use crate::node::NodeTable;
use crate::state::State;
use crate::topology::{select_topology, Topology};

/// Flags a partition's `max_share` as administratively forced to 1,
/// independent of any job's own `shared` request.
pub const SHARED_FORCE: u16 = 0x8000;

/// Outcome of a successful `job_test` in any mode (§6).
#[derive(Debug, Clone)]
pub struct ScheduleOutcome {
    pub bitmap: NodeBitmap,
    pub total_cpus: u32,
    /// When the job would start: `now` for an immediate RUN_NOW success,
    /// or the projected time for a WILL_RUN success.
    pub start_time: i64,
    /// Jobs that would need to be preempted to honor this placement.
    pub victims: Vec<JobId>,
}

fn max_share_for(job: &JobRequest, partition_max_share: u16) -> u16 {
    if job.shared == 0 {
        1
    } else {
        (partition_max_share & !SHARED_FORCE).max(1)
    }
}

fn attempt(
    state: &State,
    job: &JobRequest,
    nodes: &dyn NodeTable,
    topo: Option<&Topology>,
    fast_schedule: bool,
    overcommit_memory: bool,
    input: &NodeBitmap,
    run_cap: u32,
    tot_cap: u32,
    mode: SelectMode,
) -> Result<SelectResult> {
    let (feasible, _count) = count_bitmap(state, job, nodes, fast_schedule, overcommit_memory, input, run_cap, tot_cap, mode);
    match topo {
        Some(t) => select_topology(job, t, nodes, fast_schedule, &feasible),
        None => select_linear(job, nodes, fast_schedule, &feasible),
    }
}

/// TEST_ONLY: "could this job ever run", ignoring memory, GRES totals, and
/// per-partition job caps (§4.D step 2 short-circuit does the real work;
/// this entry point just always asks with unbounded caps).
pub fn test_only(job: &JobRequest, state: &State, nodes: &dyn NodeTable, topo: Option<&Topology>, config: &EngineConfig, input: &NodeBitmap) -> Result<ScheduleOutcome> {
    let result = attempt(state, job, nodes, topo, config.fast_schedule, true, input, u32::MAX, u32::MAX, SelectMode::TestOnly)?;
    Ok(ScheduleOutcome { bitmap: result.bitmap, total_cpus: result.total_cpus, start_time: 0, victims: Vec::new() })
}

/// RUN_NOW: place against live state now, widening the per-partition job
/// caps step by step, and finally trying a preemption-aware retry (§4.G).
pub fn run_now(
    job: &JobRequest,
    state: &State,
    nodes: &dyn NodeTable,
    topo: Option<&Topology>,
    config: &EngineConfig,
    input: &NodeBitmap,
    partition_max_share: u16,
    now: i64,
    other_jobs: &[JobResources],
) -> Result<ScheduleOutcome> {
    let max_share = max_share_for(job, partition_max_share);

    for run_cap in 0..=(max_share as u32) {
        // Once the sweep has widened past the first share slot, a fresh
        // best-fit search is wasted work if an already-running job of the
        // identical shape can simply be piggybacked on (§4.I).
        if run_cap > 0 {
            if let Some(result) = crate::mate::find_mate(job, other_jobs, input) {
                return Ok(ScheduleOutcome { bitmap: result.bitmap, total_cpus: result.total_cpus, start_time: now, victims: Vec::new() });
            }
        }

        for &sus in config.sus_jobs_ladder.iter().chain(std::iter::once(&u32::MAX)) {
            let tot_cap = run_cap.saturating_add(sus);
            if let Ok(result) = attempt(state, job, nodes, topo, config.fast_schedule, config.overcommit_memory, input, run_cap, tot_cap, SelectMode::RunNow) {
                return Ok(ScheduleOutcome { bitmap: result.bitmap, total_cpus: result.total_cpus, start_time: now, victims: Vec::new() });
            }
        }
    }

    let preemptible: Vec<&JobResources> = other_jobs.iter().filter(|j| j.preemptible && j.node_bitmap.intersects(input)).collect();
    if preemptible.is_empty() {
        return Err(Error::NoFit);
    }

    // Actually terminate the preemptible tenants against a scratch copy of
    // state -- widening the caps alone does not clear `exclusive_cnt`, and
    // retrying against the live state would just fail the same way again.
    let mut scratch = state.clone();
    for victim in &preemptible {
        crate::lifecycle::remove(&mut scratch, victim, true, config.fast_schedule);
    }

    debug!(job_id = job.job_id.get(), victim_count = preemptible.len(), "retrying job_test after preemption");
    let result = attempt(&scratch, job, nodes, topo, config.fast_schedule, config.overcommit_memory, input, u32::MAX, u32::MAX, SelectMode::RunNow)?;
    let victims: Vec<JobId> = preemptible.iter().map(|j| j.job_id).collect();
    Ok(ScheduleOutcome { bitmap: result.bitmap, total_cpus: result.total_cpus, start_time: now, victims })
}

/// WILL_RUN: try now, then simulate freeing other jobs' nodes in
/// preemptible-first, then soonest-ending-first order until a fit
/// appears (§4.G backfill).
pub fn will_run(
    job: &JobRequest,
    state: &State,
    nodes: &dyn NodeTable,
    topo: Option<&Topology>,
    config: &EngineConfig,
    input: &NodeBitmap,
    partition_max_share: u16,
    now: i64,
    other_jobs: &[JobResources],
) -> Result<ScheduleOutcome> {
    if let Ok(outcome) = run_now(job, state, nodes, topo, config, input, partition_max_share, now, &[]) {
        return Ok(outcome);
    }

    let mut candidates: Vec<&JobResources> = other_jobs.iter().filter(|j| j.node_bitmap.intersects(input)).collect();
    candidates.sort_by_key(|j| (!j.preemptible, j.end_time.unwrap_or(i64::MAX)));

    // Simulate forward in time by actually terminating candidates, one at a
    // time, against a scratch copy of state -- narrowing the input bitmap
    // alone would not un-exclude or un-cap the nodes those jobs still hold
    // in `state` itself.
    let mut scratch = state.clone();
    let mut victims = Vec::new();
    let mut start_time = now;

    for job_res in candidates {
        crate::lifecycle::remove(&mut scratch, job_res, true, config.fast_schedule);
        victims.push(job_res.job_id);
        start_time = start_time.max(job_res.end_time.unwrap_or(start_time));

        let (feasible, _) = count_bitmap(&scratch, job, nodes, config.fast_schedule, config.overcommit_memory, input, u32::MAX, u32::MAX, SelectMode::WillRun);
        let attempted = match topo {
            Some(t) => select_topology(job, t, nodes, config.fast_schedule, &feasible),
            None => select_linear(job, nodes, config.fast_schedule, &feasible),
        };
        if let Ok(result) = attempted {
            return Ok(ScheduleOutcome { bitmap: result.bitmap, total_cpus: result.total_cpus, start_time, victims });
        }
    }

    Err(Error::NoFit)
}

/// Entry point matching `job_test`'s mode dispatch (§6).
pub fn job_test(
    job: &JobRequest,
    state: &State,
    nodes: &dyn NodeTable,
    topo: Option<&Topology>,
    config: &EngineConfig,
    input: &NodeBitmap,
    mode: SelectMode,
    partition_max_share: u16,
    now: i64,
    other_jobs: &[JobResources],
) -> Result<ScheduleOutcome> {
    match mode {
        SelectMode::TestOnly => test_only(job, state, nodes, topo, config, input),
        SelectMode::RunNow => run_now(job, state, nodes, topo, config, input, partition_max_share, now, other_jobs),
        SelectMode::WillRun => will_run(job, state, nodes, topo, config, input, partition_max_share, now, other_jobs),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gres::GresRequest;
    use crate::job::MemoryRequest;
    use crate::node::{InMemoryNodeTable, PartitionId};
    use std::num::NonZeroU32;

    fn job(id: u32, preemptible: bool) -> JobRequest {
        JobRequest {
            job_id: NonZeroU32::new(id).unwrap(),
            partition: PartitionId::new("batch"),
            min_nodes: 2,
            max_nodes: 2,
            req_nodes: 2,
            min_cpus: 8,
            req_node_bitmap: None,
            exc_node_bitmap: None,
            contiguous: false,
            shared: 0,
            pn_min_memory: MemoryRequest::PerNode(0),
            gres: GresRequest::default(),
            preemptible,
        }
    }

    #[test]
    fn run_now_succeeds_without_preemption_when_nodes_are_free() {
        let nodes = InMemoryNodeTable::uniform(4, 4, 8192);
        let state = State::empty(4);
        let config = EngineConfig::default();
        let input = NodeBitmap::from_bits(4, 0..4);

        let outcome = run_now(&job(1, true), &state, &nodes, None, &config, &input, 1, 1000, &[]).unwrap();
        assert_eq!(outcome.bitmap.count(), 2);
        assert!(outcome.victims.is_empty());
        assert_eq!(outcome.start_time, 1000);
    }

    #[test]
    fn run_now_retries_with_preemption_when_exclusively_held() {
        let nodes = InMemoryNodeTable::uniform(2, 4, 8192);
        let mut state = State::empty(2);
        state.nodes[0].exclusive_cnt = 1;
        state.nodes[1].exclusive_cnt = 1;
        let config = EngineConfig::default();
        let input = NodeBitmap::from_bits(2, 0..2);

        let occupant = |preemptible: bool| JobResources {
            job_id: NonZeroU32::new(99).unwrap(),
            partition: PartitionId::new("batch"),
            node_bitmap: NodeBitmap::from_bits(2, 0..2),
            cpus_per_node: vec![4, 4],
            total_cpus: 8,
            contiguous: false,
            exclusive: true,
            mem_per_node: true,
            mem_claim: 0,
            gres: GresRequest::default(),
            preemptible,
            end_time: Some(2000),
            part_nodes_missing: false,
        };

        // exclusive_cnt > 0 makes count_bitmap reject both nodes no matter
        // the cap sweep; only a preemptible occupant can unblock it.
        let err = run_now(&job(1, true), &state, &nodes, None, &config, &input, 1, 1000, &[occupant(false)]).unwrap_err();
        assert!(matches!(err, Error::NoFit));

        let outcome = run_now(&job(1, true), &state, &nodes, None, &config, &input, 1, 1000, &[occupant(true)]).unwrap();
        assert_eq!(outcome.victims, vec![NonZeroU32::new(99).unwrap()]);
    }
}
