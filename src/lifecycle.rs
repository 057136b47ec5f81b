//! Job lifecycle mutators against [`State`] (§4.H): `add`, `remove`,
//! `remove_one_node`, and `expand`.

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::job::JobResources;
use crate::node::NodeIndex;
use crate::state::State;

/// Record a job's resource claim against every node it occupies.
/// `alloc_all` distinguishes a fresh placement (`job_begin`, true) from a
/// resume out of suspension (`job_resume`, false): a resumed job already
/// holds its memory, exclusivity, and `tot_job_cnt` entry from the
/// original `add` -- `remove(..., remove_all=false)` left those untouched
/// across the suspend -- so only the running-job bookkeeping needs
/// restoring.
pub fn add(state: &mut State, job: &JobResources, alloc_all: bool) {
    state.run_job_ids.add(job.job_id);

    if !alloc_all {
        for i in job.node_bitmap.iter_ones() {
            let Some(node) = state.nodes.get_mut(i) else {
                warn!(job_id = job.job_id.get(), node = i, "resume: node index out of range");
                continue;
            };
            match node.parts.iter_mut().find(|p| p.part == job.partition) {
                Some(entry) => entry.run_job_cnt += 1,
                None => warn!(job_id = job.job_id.get(), node = i, partition = %job.partition, "resume: no PartCR entry for this job's partition"),
            }
        }
        return;
    }

    state.tot_job_ids.add(job.job_id);

    for i in job.node_bitmap.iter_ones() {
        let Some(node) = state.nodes.get_mut(i) else {
            warn!(job_id = job.job_id.get(), node = i, "add: node index out of range");
            continue;
        };

        node.alloc_memory = node.alloc_memory.saturating_add(job.mem_claim);
        if job.exclusive {
            node.exclusive_cnt += 1;
        }

        if node.find_part(&job.partition).is_none() && !node.parts.is_empty() {
            debug!(job_id = job.job_id.get(), node = i, partition = %job.partition, "add: new partition entry on node with existing entries");
        }
        let entry = node.part_entry(&job.partition);
        entry.tot_job_cnt += 1;
        entry.run_job_cnt += 1;

        if let Some(gres) = node.gres_list.as_mut() {
            gres.allocate(&job.gres);
        }
    }
}

/// Release a job's claim against every node it occupies. `remove_all`
/// distinguishes termination (`job_fini`, true) from suspension
/// (`job_suspend`, false): a suspended job keeps its memory, exclusivity,
/// and `tot_job_cnt` entry -- it still holds those resources, it has just
/// stopped running -- so only its running-job bookkeeping is released,
/// leaving `add(..., alloc_all=false)` something to restore on resume.
pub fn remove(state: &mut State, job: &JobResources, remove_all: bool, fast_schedule: bool) {
    state.run_job_ids.remove(job.job_id);

    if !remove_all {
        for i in job.node_bitmap.iter_ones() {
            let Some(node) = state.nodes.get_mut(i) else {
                warn!(job_id = job.job_id.get(), node = i, "suspend: node index out of range");
                continue;
            };
            match node.parts.iter_mut().find(|p| p.part == job.partition) {
                Some(entry) => match entry.run_job_cnt.checked_sub(1) {
                    Some(v) => entry.run_job_cnt = v,
                    None => {
                        if fast_schedule {
                            warn!(node = i, partition = %job.partition, "run_job_cnt underflow");
                        } else {
                            debug!(node = i, partition = %job.partition, "run_job_cnt underflow (fast-schedule off)");
                        }
                        entry.run_job_cnt = 0;
                    }
                },
                None => warn!(job_id = job.job_id.get(), node = i, partition = %job.partition, "suspend: no PartCR entry for this job's partition"),
            }
        }
        return;
    }

    state.tot_job_ids.remove(job.job_id);

    for i in job.node_bitmap.iter_ones() {
        let Some(node) = state.nodes.get_mut(i) else {
            warn!(job_id = job.job_id.get(), node = i, "remove: node index out of range");
            continue;
        };

        node.release_memory(job.mem_claim, &format!("node-{i}"), fast_schedule);
        if job.exclusive {
            node.release_exclusive(&format!("node-{i}"));
        }

        match node.parts.iter().position(|p| p.part == job.partition) {
            Some(idx) => {
                let entry = &mut node.parts[idx];
                match entry.tot_job_cnt.checked_sub(1) {
                    Some(v) => entry.tot_job_cnt = v,
                    None => {
                        warn!(node = i, partition = %job.partition, "tot_job_cnt underflow");
                        entry.tot_job_cnt = 0;
                    }
                }
                match entry.run_job_cnt.checked_sub(1) {
                    Some(v) => entry.run_job_cnt = v,
                    None => {
                        if fast_schedule {
                            warn!(node = i, partition = %job.partition, "run_job_cnt underflow");
                        } else {
                            debug!(node = i, partition = %job.partition, "run_job_cnt underflow (fast-schedule off)");
                        }
                        entry.run_job_cnt = 0;
                    }
                }
            }
            None => {
                warn!(job_id = job.job_id.get(), node = i, partition = %job.partition, "remove: no PartCR entry for this job's partition");
            }
        }

        // Drop the entry entirely once both counters hit zero, so a fully
        // drained node matches a freshly rebuilt one (§8).
        node.parts.retain(|p| p.tot_job_cnt != 0 || p.run_job_cnt != 0);

        if let Some(gres) = node.gres_list.as_mut() {
            gres.release(&job.gres);
        }
    }

    state.resync_all(|i| format!("node-{i}"));
}

/// Release a job's claim against exactly one of its nodes, for a job
/// that is shrinking (partial preemption or a user-requested resize).
/// Uses `node`'s own position in `job.node_bitmap`/`cpus_per_node`
/// directly rather than a loop index, so a caller iterating the job's own
/// node set in a different order cannot desync accounting from the
/// node actually being dropped.
pub fn remove_one_node(state: &mut State, job: &mut JobResources, node: NodeIndex, fast_schedule: bool) -> Result<()> {
    if !job.node_bitmap.contains(node) {
        return Err(Error::Invalid(format!("job {} does not occupy node {node}", job.job_id)));
    }

    // `mem_claim` is already the per-node figure `add`/`remove` apply
    // uniformly across every node the job occupies (§4.B); dropping one
    // node releases that same figure back.
    if let Some(cr) = state.nodes.get_mut(node) {
        cr.release_memory(job.mem_claim, &format!("node-{node}"), fast_schedule);
        if job.exclusive {
            cr.release_exclusive(&format!("node-{node}"));
        }
        if let Some(idx) = cr.parts.iter().position(|p| p.part == job.partition) {
            let entry = &mut cr.parts[idx];
            entry.tot_job_cnt = entry.tot_job_cnt.saturating_sub(1);
            entry.run_job_cnt = entry.run_job_cnt.saturating_sub(1).min(entry.tot_job_cnt);
            cr.parts.retain(|p| p.tot_job_cnt != 0 || p.run_job_cnt != 0);
        }
        if let Some(gres) = cr.gres_list.as_mut() {
            gres.release(&job.gres);
        }
    }

    job.node_bitmap.set(node, false);
    if let Some(slot) = job.cpus_per_node.get_mut(node) {
        job.total_cpus = job.total_cpus.saturating_sub(*slot);
        *slot = 0;
    }

    Ok(())
}

/// Merge the resources of `from` into `to`, leaving `from` empty. GRES
/// merges are refused outright (§1 out-of-scope collaborator: the engine
/// has no way to reconcile two independently-built GRES views).
pub fn expand(to: &mut JobResources, from: JobResources, state: &mut State, fast_schedule: bool) -> Result<()> {
    if !to.gres.requests.is_empty() || !from.gres.requests.is_empty() {
        return Err(Error::Unsupported("job_expand with a GRES-bearing job is not supported".into()));
    }

    let overlap = to.node_bitmap.intersection(&from.node_bitmap);

    for i in from.node_bitmap.iter_ones() {
        to.node_bitmap.set(i, true);
        let claim = from.cpus_per_node.get(i).copied().unwrap_or(0);
        if i < to.cpus_per_node.len() {
            to.cpus_per_node[i] += claim;
        } else {
            to.cpus_per_node.resize(i + 1, 0);
            to.cpus_per_node[i] = claim;
        }
    }
    to.total_cpus += from.total_cpus;

    if overlap.count() > 0 && to.mem_per_node && from.mem_per_node {
        // Each shared node's alloc_memory currently carries both jobs' own
        // `add` contribution. The merged job occupies the node once, so
        // the donor's now-redundant share is debited back.
        for i in overlap.iter_ones() {
            if let Some(cr) = state.nodes.get_mut(i) {
                cr.release_memory(from.mem_claim, &format!("node-{i}"), fast_schedule);
            }
        }
        debug!(job_id = to.job_id.get(), overlap = overlap.count(), "expand: debited donor's redundant per-node memory on shared nodes");
    }
    to.mem_claim = to.mem_claim.saturating_add(from.mem_claim);

    Ok(())
}
