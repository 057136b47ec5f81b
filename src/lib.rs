//! A from-scratch linear and topology-aware node-selection engine for a
//! batch workload manager (§1). [`Engine`] is the crate's single entry
//! point: it owns the process-wide mutable state named in §9 (the
//! `State` snapshot, the node table, the switch table, and the engine
//! configuration) behind one mutex, and exposes the stable §6 entry
//! points as methods.
//!
//! The engine itself never owns a per-job table: callers pass
//! [`job::JobResources`] by reference (or by value, for `job_expand`'s
//! donor), matching §6's "Persisted state: None."

pub mod bitmap;
pub mod config;
pub mod error;
pub mod feasibility;
pub mod gres;
pub mod healthcheck;
pub mod job;
pub mod lifecycle;
pub mod linear;
pub mod mate;
pub mod node;
pub mod reservation;
pub mod scheduling;
pub mod state;
pub mod telemetry;
pub mod topology;
pub mod wire;

pub use error::{Error, Result};

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::bitmap::NodeBitmap;
use crate::config::EngineConfig;
use crate::job::{JobRequest, JobResources, SelectMode};
use crate::node::{NodeIndex, NodeTable, PowerState};
use crate::scheduling::ScheduleOutcome;
use crate::state::State;
use crate::topology::Topology;
use crate::wire::NodeInfoFrame;

/// Keys `nodeinfo_get` accepts (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeInfoKey {
    SubgrpSize,
    SubCnt,
    Ptr,
}

/// Result of a `nodeinfo_get` call, shaped by which key was asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeInfoValue {
    Count(u16),
    Frame(NodeInfoFrame),
}

struct EngineInner {
    state: Option<State>,
    nodes: Option<Arc<dyn NodeTable>>,
    topo: Option<Topology>,
    config: EngineConfig,
    nodeinfo: Vec<NodeInfoFrame>,
}

/// The engine: one mutex guarding everything §5 says must be serialized.
/// Constructed once per process (or per embedding) and shared behind an
/// `Arc` by callers that invoke it from multiple worker threads.
pub struct Engine {
    inner: Mutex<EngineInner>,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        Self { inner: Mutex::new(EngineInner { state: None, nodes: None, topo: None, config, nodeinfo: Vec::new() }) }
    }

    /// Record the node table (and optional switch topology), and drop
    /// any existing `State` (§6 `node_init`).
    pub fn node_init(&self, nodes: Arc<dyn NodeTable>, topo: Option<Topology>) {
        let mut inner = self.inner.lock();
        info!(node_count = nodes.len(), "node_init");
        inner.nodeinfo = vec![NodeInfoFrame::pack(0); nodes.len()];
        inner.nodes = Some(nodes);
        inner.topo = topo;
        inner.state = None;
    }

    /// Lazily build `State` from the recorded node count the first time
    /// any call needs it (§6 `job_test` "Lazily initializes State if
    /// absent").
    fn ensure_state(inner: &mut EngineInner) -> Result<()> {
        if inner.state.is_none() {
            let n = inner.nodes.as_ref().ok_or_else(|| Error::Fatal("node_init has not been called".into()))?.len();
            debug!(n, "lazily initializing state");
            inner.state = Some(State::empty(n));
        }
        Ok(())
    }

    /// §4.G / §6 `job_test`: decide placement in `mode` against `input`.
    pub fn job_test(&self, job: &JobRequest, input: &NodeBitmap, mode: SelectMode, partition_max_share: u16, now: i64, other_jobs: &[JobResources]) -> Result<ScheduleOutcome> {
        let mut guard = self.inner.lock();
        Self::ensure_state(&mut guard)?;
        let EngineInner { state, nodes, topo, config, .. } = &*guard;
        let nodes = nodes.as_ref().ok_or_else(|| Error::Fatal("node_init has not been called".into()))?;
        let state = state.as_ref().expect("ensure_state just populated this");
        scheduling::job_test(job, state, nodes.as_ref(), topo.as_ref(), config, input, mode, partition_max_share, now, other_jobs)
    }

    /// §6 `job_begin`: add with `alloc_all=true`.
    pub fn job_begin(&self, job: &JobResources) -> Result<()> {
        let mut guard = self.inner.lock();
        Self::ensure_state(&mut guard)?;
        lifecycle::add(guard.state.as_mut().expect("ensure_state just populated this"), job, true);
        info!(job_id = job.job_id.get(), "job_begin");
        Ok(())
    }

    /// §6 `job_ready`: 0 (false) if any node the job occupies is in
    /// power-save or power-up.
    pub fn job_ready(&self, job: &JobResources) -> Result<bool> {
        let guard = self.inner.lock();
        let nodes = guard.nodes.as_ref().ok_or_else(|| Error::Fatal("node_init has not been called".into()))?;
        for i in job.node_bitmap.iter_ones() {
            if !matches!(nodes.node(i).power_state, PowerState::Up) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// §6 `job_fini`: remove with `remove_all=true`.
    pub fn job_fini(&self, job: &JobResources) -> Result<()> {
        let mut guard = self.inner.lock();
        Self::ensure_state(&mut guard)?;
        let fast_schedule = guard.config.fast_schedule;
        lifecycle::remove(guard.state.as_mut().expect("ensure_state just populated this"), job, true, fast_schedule);
        info!(job_id = job.job_id.get(), "job_fini");
        Ok(())
    }

    /// §6 `job_suspend`: remove with `remove_all=false`.
    pub fn job_suspend(&self, job: &JobResources) -> Result<()> {
        let mut guard = self.inner.lock();
        Self::ensure_state(&mut guard)?;
        let fast_schedule = guard.config.fast_schedule;
        lifecycle::remove(guard.state.as_mut().expect("ensure_state just populated this"), job, false, fast_schedule);
        info!(job_id = job.job_id.get(), "job_suspend");
        Ok(())
    }

    /// §6 `job_resume`: add with `alloc_all=false`.
    pub fn job_resume(&self, job: &JobResources) -> Result<()> {
        let mut guard = self.inner.lock();
        Self::ensure_state(&mut guard)?;
        lifecycle::add(guard.state.as_mut().expect("ensure_state just populated this"), job, false);
        info!(job_id = job.job_id.get(), "job_resume");
        Ok(())
    }

    /// §6 `job_expand` / §4.H.
    pub fn job_expand(&self, to: &mut JobResources, from: JobResources) -> Result<()> {
        let mut guard = self.inner.lock();
        Self::ensure_state(&mut guard)?;
        let to_id = to.job_id.get();
        let fast_schedule = guard.config.fast_schedule;
        lifecycle::expand(to, from, guard.state.as_mut().expect("ensure_state just populated this"), fast_schedule)?;
        info!(job_id = to_id, "job_expand");
        Ok(())
    }

    /// §6 `job_resized`: `remove_one_node`, a clean early-return rather
    /// than the buggy for-skip path the §9 open question flags.
    pub fn job_resized(&self, job: &mut JobResources, node: NodeIndex) -> Result<()> {
        let mut guard = self.inner.lock();
        Self::ensure_state(&mut guard)?;
        let fast_schedule = guard.config.fast_schedule;
        lifecycle::remove_one_node(guard.state.as_mut().expect("ensure_state just populated this"), job, node, fast_schedule)?;
        info!(job_id = job.job_id.get(), node, "job_resized");
        Ok(())
    }

    /// §6 `reconfigure`: drop `State`, rebuild immediately.
    pub fn reconfigure(&self) -> Result<()> {
        let mut guard = self.inner.lock();
        let n = guard.nodes.as_ref().ok_or_else(|| Error::Fatal("node_init has not been called".into()))?.len();
        guard.state = Some(State::empty(n));
        info!(n, "reconfigure");
        Ok(())
    }

    /// §6 `resv_test` / §4.J.
    pub fn resv_test(&self, n_needed: u32, input: &NodeBitmap) -> NodeBitmap {
        let guard = self.inner.lock();
        reservation::resv_test(n_needed, input, guard.topo.as_ref())
    }

    /// §6 `nodeinfo_set_all`: publish the per-node `alloc_cpus` snapshot.
    /// A node counts as allocated when it is held exclusively or carries
    /// at least one running job in any partition.
    pub fn nodeinfo_set_all(&self, _last_query: i64) -> Result<()> {
        let mut guard = self.inner.lock();
        Self::ensure_state(&mut guard)?;
        let fast_schedule = guard.config.fast_schedule;
        let EngineInner { state, nodes, nodeinfo, .. } = &mut *guard;
        let nodes = nodes.as_ref().ok_or_else(|| Error::Fatal("node_init has not been called".into()))?;
        let state = state.as_ref().expect("ensure_state just populated this");

        nodeinfo.clear();
        for i in 0..nodes.len() {
            let (run, _tot) = state.nodes[i].part_totals();
            let allocated = state.nodes[i].exclusive_cnt > 0 || run > 0;
            let cpus = if allocated { nodes.cpu_cnt(i, fast_schedule) as u16 } else { 0 };
            nodeinfo.push(NodeInfoFrame::pack(cpus));
        }
        debug!(n = nodeinfo.len(), "nodeinfo_set_all");
        Ok(())
    }

    /// §6 `nodeinfo_get`.
    pub fn nodeinfo_get(&self, i: NodeIndex, key: NodeInfoKey, allocated: bool) -> Result<NodeInfoValue> {
        let guard = self.inner.lock();
        let frame = *guard.nodeinfo.get(i).ok_or_else(|| Error::Invalid(format!("nodeinfo_get: node {i} out of range")))?;
        Ok(match key {
            NodeInfoKey::SubgrpSize => NodeInfoValue::Count(0),
            NodeInfoKey::SubCnt => NodeInfoValue::Count(if allocated { frame.alloc_cpus } else { 0 }),
            NodeInfoKey::Ptr => NodeInfoValue::Frame(frame),
        })
    }

    /// §6 "Persisted state: None" -- no-ops kept as real entry points so
    /// a caller wired against the stable interface compiles unchanged.
    pub fn state_save(&self) -> Result<()> {
        Ok(())
    }

    pub fn state_restore(&self) -> Result<()> {
        Ok(())
    }
}
