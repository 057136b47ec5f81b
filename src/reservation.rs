//! Reservation selector (§4.J): node-count-only topology best-fit,
//! `resv_test`.

use crate::bitmap::NodeBitmap;
use crate::topology::Topology;

struct LeafCount {
    nodes: Vec<usize>,
    count: u32,
}

impl LeafCount {
    fn is_better_than(&self, other: &LeafCount, rem: u32) -> bool {
        let (a_suff, b_suff) = (self.count >= rem, other.count >= rem);
        if a_suff != b_suff {
            return a_suff;
        }
        if a_suff {
            self.count < other.count
        } else {
            self.count > other.count
        }
    }
}

/// Pick `n_needed` nodes from `input` for an advance reservation. Returns
/// an empty bitmap on shortfall (§4.J "On shortfall, return empty").
pub fn resv_test(n_needed: u32, input: &NodeBitmap, topo: Option<&Topology>) -> NodeBitmap {
    match topo {
        None => pick_n_plain(n_needed, input),
        Some(t) => pick_n_topology(n_needed, input, t),
    }
}

fn pick_n_plain(n_needed: u32, input: &NodeBitmap) -> NodeBitmap {
    let mut out = NodeBitmap::with_capacity(input.len());
    let mut rem = n_needed;
    for i in input.iter_ones() {
        if rem == 0 {
            break;
        }
        out.set(i, true);
        rem -= 1;
    }
    if rem > 0 {
        out.clear_all();
    }
    out
}

fn pick_n_topology(n_needed: u32, input: &NodeBitmap, topo: &Topology) -> NodeBitmap {
    let Some(chosen) = topo.best_subtree_for_count(input, n_needed) else {
        return NodeBitmap::with_capacity(input.len());
    };

    let mut buckets: Vec<LeafCount> = topo
        .leaves_under(chosen)
        .into_iter()
        .filter_map(|leaf| {
            let candidates = topo.subtree_leaves(leaf).intersection(input);
            let nodes: Vec<usize> = candidates.iter_ones().collect();
            if nodes.is_empty() {
                None
            } else {
                let count = nodes.len() as u32;
                Some(LeafCount { nodes, count })
            }
        })
        .collect();

    let mut out = NodeBitmap::with_capacity(input.len());
    let mut rem = n_needed;

    while rem > 0 {
        let mut best: Option<usize> = None;
        for (idx, b) in buckets.iter().enumerate() {
            if b.count == 0 {
                continue;
            }
            best = match best {
                None => Some(idx),
                Some(cur) if b.is_better_than(&buckets[cur], rem) => Some(idx),
                Some(cur) => Some(cur),
            };
        }
        let Some(idx) = best else { break };
        let bucket = &mut buckets[idx];
        for &j in &bucket.nodes {
            if rem == 0 {
                break;
            }
            if out.contains(j) {
                continue;
            }
            out.set(j, true);
            rem -= 1;
        }
        bucket.count = 0;
    }

    if rem > 0 {
        out.clear_all();
    }
    out
}
