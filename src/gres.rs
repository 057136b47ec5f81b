//! GRES (generic resource) plugin collaborator.
//!
//! The GRES plugin is external (§1): the engine only needs to ask it
//! whether a per-node view can satisfy a request, allocate against it, and
//! duplicate it for a scratch [`crate::state::State`] clone (§4.C, §4.D
//! step 1).

use std::fmt::Debug;

/// A job's GRES request, opaque to the engine beyond a count per resource
/// name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GresRequest {
    pub requests: Vec<(String, u64)>,
}

/// Per-node GRES residency view.
///
/// `State`'s `gres_list` is `Option<Box<dyn GresView>>`: present means the
/// engine owns a private, mutable clone (diverged from the node table's
/// own copy via prior `allocate` calls); absent means defer to the node
/// table's copy, which this trait does not model (the node table is a
/// separate collaborator; an embedding with GRES will route "absent"
/// reads elsewhere).
pub trait GresView: Debug + Send + Sync {
    /// Can this view satisfy `req` with at least `cpu_cnt` CPUs covered?
    /// `total` ignores current allocations (TEST_ONLY semantics, §4.D).
    fn can_satisfy(&self, req: &GresRequest, cpu_cnt: u32, total: bool) -> bool;

    /// Record an allocation against this view.
    fn allocate(&mut self, req: &GresRequest);

    /// Release a prior allocation.
    fn release(&mut self, req: &GresRequest);

    /// Deep clone, for `State::clone` (§4.C). Trait objects can't derive
    /// `Clone` directly, hence this explicit dup hook.
    fn dup(&self) -> Box<dyn GresView>;
}

/// A GRES view that never constrains placement and never accounts
/// anything -- the default when no GRES plugin is configured.
#[derive(Debug, Clone, Default)]
pub struct NullGres;

impl GresView for NullGres {
    fn can_satisfy(&self, _req: &GresRequest, _cpu_cnt: u32, _total: bool) -> bool {
        true
    }

    fn allocate(&mut self, _req: &GresRequest) {}

    fn release(&mut self, _req: &GresRequest) {}

    fn dup(&self) -> Box<dyn GresView> {
        Box::new(Self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_gres_always_satisfies() {
        let g = NullGres;
        let req = GresRequest { requests: vec![("gpu".into(), 4)] };
        assert!(g.can_satisfy(&req, 8, false));
    }
}
