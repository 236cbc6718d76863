// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

use criterion::{BatchSize, Criterion, criterion_group, criterion_main};

use junction_engine::context::SimulationContext;
use junction_engine::flow_control::{FlowControlAlgorithm, FlowControlGranularity};
use junction_engine::message::Message;
use junction_engine::network::{Network, NetworkConfig};
use junction_engine::routing::RoutingAlgorithm;

const MESH_SIDE: usize = 4;
const MESSAGES_PER_PROCESSOR: usize = 4;

fn setup_loaded_mesh(
    flow_control_granularity: FlowControlGranularity,
) -> (Network, SimulationContext) {
    let num_processors = MESH_SIDE * MESH_SIDE;
    let mut network = Network::new(NetworkConfig {
        num_processors,
        num_virtual_channels: 2,
        router_buffer_capacity: 4,
        injection_buffer_capacity: 32,
        routing_algorithm: RoutingAlgorithm::MeshXy,
        flow_control_algorithm: FlowControlAlgorithm::CutThrough,
        flow_control_granularity,
        seed: 42,
    })
    .unwrap();

    let num_messages = num_processors * MESSAGES_PER_PROCESSOR;
    let mut ctx = SimulationContext::new(num_messages);
    for i in 0..num_messages {
        let source = i % num_processors;
        let dest = (source + 1 + i / num_processors) % num_processors;
        let message = Message::new(i as u32, source, dest, 8, 4, 2);
        ctx.register(&message);
        let expected = (message.message_id, u64::from(message.num_flits()));
        network.processors[dest].assign_traffic(Vec::new(), [expected]);
        network.processors[source].assign_traffic([message], Vec::new());
    }
    (network, ctx)
}

fn run_to_completion(args: (Network, SimulationContext)) {
    let (mut network, mut ctx) = args;
    while !ctx.all_delivered() {
        network.step(&mut ctx);
        ctx.clock += 1;
        assert!(ctx.clock < 10_000);
    }
}

fn bench_mesh(c: &mut Criterion) {
    let mut group = c.benchmark_group("mesh");

    group.bench_function("4x4_packet_granularity", |b| {
        b.iter_batched(
            || setup_loaded_mesh(FlowControlGranularity::Packet),
            run_to_completion,
            BatchSize::SmallInput,
        );
    });

    group.bench_function("4x4_flit_granularity", |b| {
        b.iter_batched(
            || setup_loaded_mesh(FlowControlGranularity::Flit),
            run_to_completion,
            BatchSize::SmallInput,
        );
    });

    group.finish();
}

criterion_group! {
    name = benches;
    config = Criterion::default();
    targets = bench_mesh
}
criterion_main!(benches);
