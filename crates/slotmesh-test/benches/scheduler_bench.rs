//! Benchmarks for the slot scheduler and node tick

use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use slotmesh_core::{DataRate, LocalTime, NodeId, PhaseAnchor, RoleAssignment, ScheduleLayout, SlotLayout};
use slotmesh_runtime::{CounterSensor, Node, NodeConfig, SlotScheduler};

fn relay_layout() -> SlotLayout {
    SlotLayout {
        device_id: NodeId::new(33),
        sendto: Some(NodeId::new(1)),
        period: Duration::from_millis(1000),
        slot_size: Duration::from_millis(10),
        listen: Some(0),
        listen_ack: Some(1),
        send: Some(2),
        send_ack: Some(3),
    }
}

fn bench_scheduler_tick(c: &mut Criterion) {
    let mut scheduler = SlotScheduler::new(relay_layout().to_schedule().unwrap());
    let anchor = Some(PhaseAnchor::at(LocalTime::ZERO));
    let mut now = LocalTime::ZERO;

    c.bench_function("scheduler_tick", |b| {
        b.iter(|| {
            now = now + Duration::from_micros(250);
            black_box(scheduler.tick(now, anchor))
        })
    });
}

fn bench_node_tick(c: &mut Criterion) {
    let config = NodeConfig::builder(NodeId::new(33))
        .layout(&relay_layout())
        .data_rate(DataRate::new(10).unwrap())
        .roles(RoleAssignment::new().with_relays([NodeId::new(33)]))
        .build()
        .unwrap();
    let mut node = Node::new(config, CounterSensor::default()).unwrap();
    let mut now = LocalTime::ZERO;

    c.bench_function("node_tick", |b| {
        b.iter(|| {
            now = now + Duration::from_micros(250);
            node.tick(now);
            while let Some(frame) = node.pop_outgoing() {
                black_box(frame);
            }
        })
    });
}

criterion_group!(benches, bench_scheduler_tick, bench_node_tick);
criterion_main!(benches);
