//! Linear and topology best-fit selector benchmarks.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use node_select_engine::bitmap::NodeBitmap;
use node_select_engine::gres::GresRequest;
use node_select_engine::job::{JobRequest, MemoryRequest};
use node_select_engine::linear::select_linear;
use node_select_engine::node::{InMemoryNodeTable, PartitionId};
use node_select_engine::topology::{select_topology, SwitchSpec, Topology};
use std::num::NonZeroU32;

fn job(n: u32) -> JobRequest {
    JobRequest {
        job_id: NonZeroU32::new(1).unwrap(),
        partition: PartitionId::new("batch"),
        min_nodes: n,
        max_nodes: n,
        req_nodes: n,
        min_cpus: n * 4,
        req_node_bitmap: None,
        exc_node_bitmap: None,
        contiguous: false,
        shared: 0,
        pn_min_memory: MemoryRequest::PerNode(0),
        gres: GresRequest::default(),
        preemptible: true,
    }
}

fn bench_linear(c: &mut Criterion) {
    let mut group = c.benchmark_group("linear");

    for &cluster_size in &[64usize, 512, 4096] {
        group.throughput(Throughput::Elements(cluster_size as u64));
        let nodes = InMemoryNodeTable::uniform(cluster_size, 4, 8192);
        let input = NodeBitmap::from_bits(cluster_size, 0..cluster_size);
        let req = job((cluster_size / 4) as u32);

        group.bench_with_input(BenchmarkId::new("select_linear", cluster_size), &cluster_size, |b, _| {
            b.iter(|| select_linear(&req, &nodes, true, &input));
        });
    }

    group.finish();
}

fn spine_topology(leaf_count: usize, nodes_per_leaf: usize) -> (Topology, usize) {
    let mut specs = Vec::new();
    let mut next_node = 0usize;
    let mut leaf_indices = Vec::new();
    for i in 0..leaf_count {
        let leaf_nodes: Vec<usize> = (next_node..next_node + nodes_per_leaf).collect();
        next_node += nodes_per_leaf;
        specs.push(SwitchSpec { name: format!("leaf-{i}"), children: vec![], leaf_nodes });
        leaf_indices.push(i);
    }
    specs.push(SwitchSpec { name: "spine".into(), children: leaf_indices, leaf_nodes: vec![] });
    (Topology::build(next_node, &specs).unwrap(), next_node)
}

fn bench_topology(c: &mut Criterion) {
    let mut group = c.benchmark_group("topology");

    for &leaf_count in &[4usize, 16, 64] {
        let (topo, n) = spine_topology(leaf_count, 16);
        group.throughput(Throughput::Elements(n as u64));
        let nodes = InMemoryNodeTable::uniform(n, 4, 8192);
        let input = NodeBitmap::from_bits(n, 0..n);
        let req = job(16);

        group.bench_with_input(BenchmarkId::new("select_topology", leaf_count), &leaf_count, |b, _| {
            b.iter(|| select_topology(&req, &topo, &nodes, true, &input));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_linear, bench_topology);
criterion_main!(benches);
