//! Optional external health-check daemon (§9 "out-of-scope optional
//! external agent"): a detached task, on its own interval timer and its
//! own mutex, that probes each node's clone path and hands unhealthy
//! nodes to a [`DrainNodes`] collaborator. It never touches
//! [`crate::state::State`].

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;

/// Node-draining collaborator, external to this crate (§1 "node-drain
/// utility").
pub trait DrainNodes: Send + Sync {
    fn drain(&self, node_name: &str, reason: &str);
}

/// A `DrainNodes` that only logs, useful for embeddings with no real
/// drain mechanism wired up yet.
#[derive(Debug, Default)]
pub struct LoggingDrain;

impl DrainNodes for LoggingDrain {
    fn drain(&self, node_name: &str, reason: &str) {
        warn!(node = node_name, reason, "would drain node (no DrainNodes configured)");
    }
}

struct Inner {
    running: bool,
}

/// The health-check daemon itself. Holds its own node name list and its
/// own mutex -- deliberately not `State`'s -- so a slow clone-path probe
/// never contends with the scheduling hot path.
pub struct HealthCheckDaemon<D: DrainNodes> {
    config: EngineConfig,
    drain: D,
    node_names: Vec<String>,
    inner: Arc<Mutex<Inner>>,
}

impl<D: DrainNodes> HealthCheckDaemon<D> {
    pub fn new(config: EngineConfig, drain: D, node_names: Vec<String>) -> Self {
        Self { config, drain, node_names, inner: Arc::new(Mutex::new(Inner { running: false })) }
    }

    /// Probe every configured node's clone path once, draining any that
    /// fail the stat.
    pub fn check_once(&self) {
        for name in &self.node_names {
            if !self.clone_path_healthy(name) {
                self.drain.drain(name, "clone path stat failed");
            } else {
                debug!(node = name.as_str(), "clone path healthy");
            }
        }
    }

    fn clone_path_healthy(&self, node_name: &str) -> bool {
        std::path::Path::new(&self.config.health_check_clone_path).join(node_name).exists()
    }

    /// Run the interval loop until [`Self::stop`] is called from another
    /// handle sharing the same daemon.
    pub async fn run(&self) {
        {
            let mut inner = self.inner.lock();
            if inner.running {
                return;
            }
            inner.running = true;
        }
        info!(interval_secs = self.config.health_check_interval_secs, "starting health-check daemon");

        let mut ticker = interval(Duration::from_secs(self.config.health_check_interval_secs.max(1)));
        loop {
            ticker.tick().await;
            if !self.inner.lock().running {
                break;
            }
            self.check_once();
        }
    }

    pub fn stop(&self) {
        self.inner.lock().running = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingDrain(AtomicUsize);

    impl DrainNodes for CountingDrain {
        fn drain(&self, _node_name: &str, _reason: &str) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn drains_a_node_whose_clone_path_is_missing() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = EngineConfig::default();
        config.health_check_clone_path = dir.path().to_string_lossy().to_string();
        std::fs::create_dir(dir.path().join("node-0")).unwrap();

        let daemon = HealthCheckDaemon::new(config, CountingDrain(AtomicUsize::new(0)), vec!["node-0".into(), "node-1".into()]);
        daemon.check_once();
        assert_eq!(daemon.drain.0.load(Ordering::SeqCst), 1);
    }
}
