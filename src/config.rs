//! Engine-wide configuration.
//!
//! The process-wide knobs named in §9: consumable-resource type,
//! fast-schedule, topology awareness, and the `sus_jobs` ladder the RUN_NOW
//! sweep walks (§4.G).

use serde::{Deserialize, Serialize};

/// Which resource the engine treats as the consumable unit for
/// over-subscription accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConsumableResource {
    /// CPUs are the unit of accounting.
    Cpu,
    /// Memory is the unit of accounting.
    Memory,
}

impl Default for ConsumableResource {
    fn default() -> Self {
        ConsumableResource::Cpu
    }
}

/// Engine-wide configuration, read once at initialization (§6
/// "Environment") and otherwise immutable for the process lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// `CR_CPU` vs `CR_MEMORY`.
    pub consumable_resource: ConsumableResource,
    /// Take CPU/memory from declared configuration rather than probed
    /// values.
    pub fast_schedule: bool,
    /// Whether a switch topology is configured; when false, §4.E is used
    /// directly instead of delegating to §4.F.
    pub topology_aware: bool,
    /// Allow `alloc_memory` to exceed `real_memory` without failing
    /// feasibility (§3 `NodeCR` invariant escape hatch).
    pub overcommit_memory: bool,
    /// The suspended-job cap ladder RUN_NOW walks for each `run_cap`:
    /// `tot_cap = run_cap + sus` for each `sus` in this ladder (§4.G). The
    /// engine always appends an unbounded final pass after this ladder.
    pub sus_jobs_ladder: Vec<u32>,
    /// Poll interval for the optional health-check daemon (§9).
    pub health_check_interval_secs: u64,
    /// Path probed by the health-check daemon on each node (§9).
    pub health_check_clone_path: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            consumable_resource: ConsumableResource::Cpu,
            fast_schedule: false,
            topology_aware: false,
            overcommit_memory: false,
            sus_jobs_ladder: vec![0, 4],
            health_check_interval_secs: 60,
            health_check_clone_path: "/var/spool/node-select-engine".to_string(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file, falling back to defaults for
    /// any field the file omits.
    pub fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path))
            .build()
            .map_err(|e| crate::Error::Fatal(format!("config load failed: {e}")))?;

        settings
            .try_deserialize()
            .map_err(|e| crate::Error::Fatal(format!("config parse failed: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_sus_jobs_ladder_is_0_then_4() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.sus_jobs_ladder, vec![0, 4]);
    }

    #[test]
    fn default_resource_is_cpu() {
        assert_eq!(EngineConfig::default().consumable_resource, ConsumableResource::Cpu);
    }
}
