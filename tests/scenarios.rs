//! Integration-level coverage of §8's worked scenarios, exercised through
//! the crate's public `Engine` surface rather than the individual selector
//! functions.

use std::num::NonZeroU32;
use std::sync::Arc;

use node_select_engine::bitmap::NodeBitmap;
use node_select_engine::config::EngineConfig;
use node_select_engine::gres::GresRequest;
use node_select_engine::job::{JobRequest, JobResources, MemoryRequest, SelectMode};
use node_select_engine::node::{InMemoryNodeTable, PartitionId};
use node_select_engine::topology::{SwitchSpec, Topology};
use node_select_engine::Engine;

fn job(id: u32, min: u32, max: u32, min_cpus: u32, contiguous: bool) -> JobRequest {
    JobRequest {
        job_id: NonZeroU32::new(id).unwrap(),
        partition: PartitionId::new("batch"),
        min_nodes: min,
        max_nodes: max,
        req_nodes: max,
        min_cpus,
        req_node_bitmap: None,
        exc_node_bitmap: None,
        contiguous,
        shared: 0,
        pn_min_memory: MemoryRequest::PerNode(0),
        gres: GresRequest::default(),
        preemptible: true,
    }
}

fn resources(id: u32, bits: impl IntoIterator<Item = usize>, n: usize, exclusive: bool, end_time: Option<i64>) -> JobResources {
    JobResources {
        job_id: NonZeroU32::new(id).unwrap(),
        partition: PartitionId::new("batch"),
        node_bitmap: NodeBitmap::from_bits(n, bits),
        cpus_per_node: vec![4; n],
        total_cpus: 4 * n as u32,
        contiguous: false,
        exclusive,
        mem_per_node: true,
        mem_claim: 0,
        gres: GresRequest::default(),
        preemptible: true,
        end_time,
        part_nodes_missing: false,
    }
}

#[test]
fn scenario_1_tight_linear_fit() {
    let engine = Engine::new(EngineConfig::default());
    engine.node_init(Arc::new(InMemoryNodeTable::uniform(8, 4, 8192)), None);

    let input = NodeBitmap::from_bits(8, 0..8);
    let outcome = engine.job_test(&job(1, 3, 3, 12, true), &input, SelectMode::RunNow, 1, 0, &[]).unwrap();
    assert_eq!(outcome.bitmap.iter_ones().collect::<Vec<_>>(), vec![0, 1, 2]);
}

#[test]
fn scenario_2_fragmentation_avoidance_prefers_tightest_sufficient_run() {
    let engine = Engine::new(EngineConfig::default());
    engine.node_init(Arc::new(InMemoryNodeTable::uniform(8, 4, 8192)), None);

    // Nodes 2 and 5 are already held exclusively, so they never enter the
    // candidate bitmap handed to job_test.
    let input = NodeBitmap::from_bits(8, [0, 1, 3, 4, 6, 7]);
    let outcome = engine.job_test(&job(1, 3, 3, 12, false), &input, SelectMode::RunNow, 1, 0, &[]).unwrap();
    assert_eq!(outcome.bitmap.iter_ones().collect::<Vec<_>>(), vec![0, 1, 3]);
}

#[test]
fn scenario_3_required_plus_contiguity_fills_upward_from_the_required_node() {
    let engine = Engine::new(EngineConfig::default());
    engine.node_init(Arc::new(InMemoryNodeTable::uniform(10, 4, 8192)), None);

    let mut req = job(1, 5, 5, 20, true);
    req.req_node_bitmap = Some(NodeBitmap::from_bits(10, [4]));
    let input = NodeBitmap::from_bits(10, 0..10);

    let outcome = engine.job_test(&req, &input, SelectMode::RunNow, 1, 0, &[]).unwrap();
    assert_eq!(outcome.bitmap.iter_ones().collect::<Vec<_>>(), vec![4, 5, 6, 7, 8]);
}

#[test]
fn scenario_4_required_across_two_runs_with_contiguity_fails() {
    let engine = Engine::new(EngineConfig::default());
    engine.node_init(Arc::new(InMemoryNodeTable::uniform(10, 4, 8192)), None);

    let mut req = job(1, 5, 5, 20, true);
    req.req_node_bitmap = Some(NodeBitmap::from_bits(10, [2, 7]));
    let input = NodeBitmap::from_bits(10, 0..10);

    let err = engine.job_test(&req, &input, SelectMode::RunNow, 1, 0, &[]).unwrap_err();
    assert!(matches!(err, node_select_engine::Error::NoFit));
}

#[test]
fn scenario_5_topology_best_fit_prefers_tighter_leaf() {
    let specs = vec![
        SwitchSpec { name: "leaf-0".into(), children: vec![], leaf_nodes: vec![0, 1, 2, 3] },
        SwitchSpec { name: "leaf-1".into(), children: vec![], leaf_nodes: vec![4, 5, 6, 7] },
        SwitchSpec { name: "spine".into(), children: vec![0, 1], leaf_nodes: vec![] },
    ];
    let topo = Topology::build(8, &specs).unwrap();

    let engine = Engine::new(EngineConfig::default());
    engine.node_init(Arc::new(InMemoryNodeTable::uniform(8, 4, 8192)), Some(topo));

    let input = NodeBitmap::from_bits(8, 0..8);
    let outcome = engine.job_test(&job(1, 4, 4, 16, false), &input, SelectMode::RunNow, 1, 0, &[]).unwrap();
    assert!(outcome.bitmap.iter_ones().all(|i| i < 4));
}

#[test]
fn scenario_6_preemption_retry_reports_victim() {
    let engine = Engine::new(EngineConfig::default());
    engine.node_init(Arc::new(InMemoryNodeTable::uniform(4, 4, 8192)), None);

    let low_priority = resources(1, 0..4, 4, true, Some(2000));
    engine.job_begin(&low_priority).unwrap();

    let input = NodeBitmap::from_bits(4, 0..4);
    let outcome = engine.job_test(&job(2, 2, 2, 8, false), &input, SelectMode::RunNow, 1, 1000, std::slice::from_ref(&low_priority)).unwrap();

    assert_eq!(outcome.victims, vec![NonZeroU32::new(1).unwrap()]);
    assert!(outcome.bitmap.iter_ones().all(|i| i < 4));
}

#[test]
fn scenario_7_will_run_orders_by_soonest_ending_job() {
    let engine = Engine::new(EngineConfig::default());
    engine.node_init(Arc::new(InMemoryNodeTable::uniform(4, 4, 8192)), None);

    // X and Y together hold every node, exclusively, so RUN_NOW has
    // nothing to place against.
    let x = resources(10, [0, 1], 4, true, Some(1010));
    let y = resources(20, [2, 3], 4, true, Some(1005));
    engine.job_begin(&x).unwrap();
    engine.job_begin(&y).unwrap();

    let input = NodeBitmap::from_bits(4, 0..4);
    let pending = job(3, 2, 2, 8, false);

    assert!(engine.job_test(&pending, &input, SelectMode::RunNow, 1, 1000, &[]).is_err());

    let outcome = engine.job_test(&pending, &input, SelectMode::WillRun, 1, 1000, &[x.clone(), y.clone()]).unwrap();
    assert_eq!(outcome.start_time, 1005);
    assert_eq!(outcome.victims, vec![NonZeroU32::new(20).unwrap()]);
    assert!(outcome.bitmap.iter_ones().all(|i| (2..4).contains(&i)));
}

#[test]
fn scenario_begin_fini_is_the_identity_on_state() {
    let engine = Engine::new(EngineConfig::default());
    engine.node_init(Arc::new(InMemoryNodeTable::uniform(4, 4, 8192)), None);

    let placed = resources(1, [0, 1], 4, true, None);
    engine.job_begin(&placed).unwrap();
    engine.job_fini(&placed).unwrap();

    // A second job of the same shape must see a fully drained cluster.
    let input = NodeBitmap::from_bits(4, 0..4);
    let outcome = engine.job_test(&job(2, 2, 2, 8, false), &input, SelectMode::RunNow, 1, 0, &[]).unwrap();
    assert_eq!(outcome.bitmap.count(), 2);
}
