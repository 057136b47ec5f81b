//! Linear best-fit selector, `job_test` for a flat (non-topology) node
//! index line (§4.E).

use crate::bitmap::NodeBitmap;
use crate::error::{Error, Result};
use crate::job::JobRequest;
use crate::node::NodeTable;

/// Successful outcome of a linear (or topology, §4.F) selection.
#[derive(Debug, Clone)]
pub struct SelectResult {
    pub bitmap: NodeBitmap,
    pub total_cpus: u32,
}

/// One maximal run of consecutive candidate nodes (§4.E step 3). Required
/// nodes inside the run are accepted immediately and excluded from
/// `node_count`/`avail_cpus`; `first_required` records where, if anywhere,
/// a required node sits in the run.
struct Run {
    start: usize,
    end: usize,
    node_count: u32,
    avail_cpus: u64,
    first_required: Option<usize>,
}

impl Run {
    fn sufficient(&self, target_nodes: i64, target_cpus: i64) -> bool {
        self.node_count as i64 >= target_nodes && self.avail_cpus as i64 >= target_cpus
    }

    /// True iff `self` should be preferred over `other` for the next fill
    /// (§4.E step 4's lexicographic scoring).
    fn is_better_than(&self, other: &Run, target_nodes: i64, target_cpus: i64) -> bool {
        let (a_req, b_req) = (self.first_required.is_some(), other.first_required.is_some());
        if a_req != b_req {
            return a_req;
        }
        let (a_suff, b_suff) = (self.sufficient(target_nodes, target_cpus), other.sufficient(target_nodes, target_cpus));
        if a_suff != b_suff {
            return a_suff;
        }
        if a_suff {
            if self.avail_cpus != other.avail_cpus {
                self.avail_cpus < other.avail_cpus
            } else {
                self.start < other.start
            }
        } else if self.avail_cpus != other.avail_cpus {
            self.avail_cpus > other.avail_cpus
        } else {
            self.start < other.start
        }
    }
}

/// Running counters threaded through the sweep, fill, and termination
/// check.
struct Progress {
    rem_nodes: i64,
    rem_cpus: i64,
    max_nodes_left: i64,
    total_cpus: u32,
}

impl Progress {
    fn satisfied(&self) -> bool {
        self.rem_nodes <= 0 && self.rem_cpus <= 0
    }

    fn target_nodes(&self) -> i64 {
        self.rem_nodes.max(0)
    }

    fn target_cpus(&self) -> i64 {
        self.rem_cpus.max(0)
    }
}

/// Select a best-fit set of nodes along the node index line (§4.E).
pub fn select_linear(job: &JobRequest, nodes: &dyn NodeTable, fast_schedule: bool, input: &NodeBitmap) -> Result<SelectResult> {
    let n = input.len();

    if input.count() < job.min_nodes as usize {
        return Err(Error::Invalid("fewer candidate nodes than min_nodes".into()));
    }
    if let Some(req) = &job.req_node_bitmap {
        if !req.is_subset_of(input) {
            return Err(Error::Invalid("required nodes not all present in candidates".into()));
        }
    }

    let mut output = NodeBitmap::with_capacity(n);
    let mut progress = Progress {
        rem_nodes: job.req_nodes.max(job.min_nodes) as i64,
        rem_cpus: job.min_cpus as i64,
        max_nodes_left: job.max_nodes as i64,
        total_cpus: 0,
    };

    let mut runs: Vec<Run> = Vec::new();
    let mut current: Option<Run> = None;

    let is_required = |i: usize| job.req_node_bitmap.as_ref().map(|b| b.contains(i)).unwrap_or(false);

    for i in 0..n {
        let candidate = input.contains(i);
        if !candidate {
            if let Some(run) = current.take() {
                runs.push(run);
            }
            continue;
        }

        if is_required(i) {
            if !output.contains(i) {
                output.set(i, true);
                progress.rem_nodes -= 1;
                progress.max_nodes_left -= 1;
                let avail = nodes.avail_cpus(i, fast_schedule);
                progress.rem_cpus -= avail as i64;
                progress.total_cpus += avail;
            }
            match &mut current {
                Some(run) => {
                    run.end = i;
                    if run.first_required.is_none() {
                        run.first_required = Some(i);
                    }
                }
                None => {
                    current = Some(Run { start: i, end: i, node_count: 0, avail_cpus: 0, first_required: Some(i) });
                }
            }
        } else {
            let avail = nodes.avail_cpus(i, fast_schedule) as u64;
            match &mut current {
                Some(run) => {
                    run.end = i;
                    run.node_count += 1;
                    run.avail_cpus += avail;
                }
                None => {
                    current = Some(Run { start: i, end: i, node_count: 1, avail_cpus: avail, first_required: None });
                }
            }
        }
    }
    if let Some(run) = current.take() {
        runs.push(run);
    }

    let required_run_count = runs.iter().filter(|r| r.first_required.is_some()).count();
    if job.contiguous && job.req_node_bitmap.is_some() && required_run_count > 1 {
        return Err(Error::NoFit);
    }

    if job.contiguous {
        if !progress.satisfied() && progress.max_nodes_left > 0 {
            let target_nodes = progress.target_nodes();
            let target_cpus = progress.target_cpus();
            let best = best_run_index(&runs, target_nodes, target_cpus);
            let sufficient_alone = best.map(|idx| runs[idx].sufficient(target_nodes, target_cpus)).unwrap_or(false);
            match best {
                Some(idx) if sufficient_alone => fill_run(&mut runs[idx], &mut output, nodes, fast_schedule, &mut progress),
                _ => return Err(Error::NoFit),
            }
        }
    } else {
        while progress.max_nodes_left > 0 && !progress.satisfied() {
            let target_nodes = progress.target_nodes();
            let target_cpus = progress.target_cpus();
            match best_run_index(&runs, target_nodes, target_cpus) {
                Some(idx) => fill_run(&mut runs[idx], &mut output, nodes, fast_schedule, &mut progress),
                None => break,
            }
        }
    }

    let popcount = output.count() as u32;
    let required_ok = job.req_node_bitmap.as_ref().map(|r| r.is_subset_of(&output)).unwrap_or(true);

    if progress.rem_cpus <= 0 && popcount >= job.min_nodes && popcount <= job.max_nodes && required_ok {
        Ok(SelectResult { bitmap: output, total_cpus: progress.total_cpus })
    } else {
        Err(Error::NoFit)
    }
}

/// Pick the best run among those that still have nodes to offer (§4.E
/// step 4).
fn best_run_index(runs: &[Run], target_nodes: i64, target_cpus: i64) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (idx, run) in runs.iter().enumerate() {
        if run.node_count == 0 {
            continue;
        }
        best = match best {
            None => Some(idx),
            Some(b) if run.is_better_than(&runs[b], target_nodes, target_cpus) => Some(idx),
            Some(b) => Some(b),
        };
    }
    best
}

/// Fill from a chosen run: up-then-down from the first required index if
/// one exists, else left-to-right (§4.E step 5).
fn fill_run(run: &mut Run, output: &mut NodeBitmap, nodes: &dyn NodeTable, fast_schedule: bool, progress: &mut Progress) {
    let order: Vec<usize> = if let Some(req_idx) = run.first_required {
        let up = (req_idx + 1..=run.end).collect::<Vec<_>>();
        let down = (run.start..req_idx).rev().collect::<Vec<_>>();
        up.into_iter().chain(down).collect()
    } else {
        (run.start..=run.end).collect()
    };

    for j in order {
        if output.contains(j) {
            continue;
        }
        if progress.max_nodes_left <= 0 {
            break;
        }
        output.set(j, true);
        progress.rem_nodes -= 1;
        progress.max_nodes_left -= 1;
        let avail = nodes.avail_cpus(j, fast_schedule);
        progress.rem_cpus -= avail as i64;
        progress.total_cpus += avail;
        if progress.max_nodes_left <= 0 || (progress.rem_nodes <= 0 && progress.rem_cpus <= 0) {
            break;
        }
    }

    run.node_count = 0;
    run.avail_cpus = 0;
}
