//! Job-mate finder (§4.I): co-locate a job with an already-running job of
//! identical shape when sharing is allowed, skipping a fresh best-fit
//! search entirely.

use crate::job::{JobRequest, JobResources};
use crate::linear::SelectResult;

/// Find a running job this request can simply piggyback on. Returns the
/// first match, narrowed to `in`, inheriting the mate's `total_cpus`.
pub fn find_mate(job: &JobRequest, running: &[JobResources], input: &crate::bitmap::NodeBitmap) -> Option<SelectResult> {
    running.iter().find(|mate| is_mate(job, mate, input)).map(|mate| SelectResult { bitmap: input.intersection(&mate.node_bitmap), total_cpus: mate.total_cpus })
}

fn is_mate(job: &JobRequest, mate: &JobResources, input: &crate::bitmap::NodeBitmap) -> bool {
    if mate.exclusive {
        return false;
    }
    if !mate.node_bitmap.is_subset_of(input) {
        return false;
    }
    if mate.node_count() != job.req_nodes as usize {
        return false;
    }
    if mate.total_cpus < job.min_cpus {
        return false;
    }
    if mate.contiguous != job.contiguous {
        return false;
    }
    if let Some(req) = &job.req_node_bitmap {
        if !req.is_subset_of(&mate.node_bitmap) {
            return false;
        }
    }
    if let Some(exc) = &job.exc_node_bitmap {
        if exc.intersects(&mate.node_bitmap) {
            return false;
        }
    }
    true
}
