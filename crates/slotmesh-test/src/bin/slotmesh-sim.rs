//! slotmesh-sim - run a simulated collection tree and report per-node counters

use std::collections::BTreeMap;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use slotmesh_core::{DataRate, NodeId, PlanNode};
use slotmesh_runtime::{logging, SamplingMode};
use slotmesh_test::{chain_tree, LinkConfig, Scenario, Simulator};
use slotmesh_time::SyncVariant;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum LinkPreset {
    Perfect,
    Noisy,
    Hostile,
}

#[derive(Parser, Debug)]
#[command(name = "slotmesh-sim", version, about = "Simulate a TDMA sensor network")]
struct Args {
    /// Relays under the sink
    #[arg(long, default_value_t = 2)]
    relays: u16,

    /// Leaves under each relay
    #[arg(long, default_value_t = 3)]
    leaves: u16,

    /// Node ids from the sink down to the deepest leaf; overrides the tree
    #[arg(long, value_delimiter = ',')]
    chain: Vec<u16>,

    #[arg(long, default_value_t = 1000)]
    period_ms: u64,

    #[arg(long, default_value_t = 10)]
    slot_ms: u64,

    /// Packets per second (default: SLOTMESH_DATARATE)
    #[arg(long)]
    rate: Option<u16>,

    /// Pack readings into bulk records
    #[arg(long)]
    bulk: bool,

    /// Use bare sync markers instead of tagged beacons
    #[arg(long)]
    bare_sync: bool,

    #[arg(long, value_enum, default_value_t = LinkPreset::Perfect)]
    link: LinkPreset,

    /// Largest clock rate error, in ppm
    #[arg(long, default_value_t = 0.0)]
    drift_ppm: f64,

    /// Simulated seconds
    #[arg(long, default_value_t = 30)]
    seconds: u64,

    #[arg(long, default_value_t = 1)]
    seed: u64,

    /// Log filter, overridden by RUST_LOG
    #[arg(long, default_value = "info")]
    log: String,
}

/// Sink 1, relays 2.., leaves numbered after the relays
fn relay_tree(args: &Args) -> PlanNode {
    let mut next_leaf = args.relays + 2;
    let relays = (0..args.relays)
        .map(|r| {
            let leaves = (0..args.leaves)
                .map(|_| {
                    let leaf = PlanNode::leaf(next_leaf);
                    next_leaf += 1;
                    leaf
                })
                .collect();
            PlanNode::with_children(r + 2, leaves)
        })
        .collect();
    PlanNode::with_children(1, relays)
}

fn report(sim: &Simulator) {
    println!();
    println!(
        "{:>5} {:>8} {:>6} {:>9} {:>7} {:>6} {:>6} {:>9} {:>8} {:>10}",
        "node", "role", "sync", "phase_us", "samples", "sent", "recv", "delivered", "rx_off", "conditions"
    );
    for sim_node in sim.nodes() {
        let node = &sim_node.node;
        let stats = node.stats();
        let phase = sim
            .phase_error(node.id())
            .map_or_else(|| "-".to_string(), |e| e.to_string());
        println!(
            "{:>5} {:>8} {:>6} {:>9} {:>7} {:>6} {:>6} {:>9} {:>8} {:>10}",
            node.id(),
            format!("{:?}", node.role()),
            node.is_synchronized(),
            phase,
            stats.samples,
            stats.frames_sent,
            stats.frames_received,
            stats.delivered,
            stats.radio_off_drops,
            stats.conditions(),
        );
    }

    let mut per_source: BTreeMap<NodeId, usize> = BTreeMap::new();
    for record in sim.delivered(sim.root()) {
        *per_source.entry(record.source).or_default() += 1;
    }
    println!();
    println!("records at sink {} by source:", sim.root());
    for (source, count) in per_source {
        println!("  {source}: {count}");
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    logging::init(&args.log);

    let tree = match args.chain.as_slice() {
        [] => relay_tree(&args),
        ids => chain_tree(ids),
    };

    let link = match args.link {
        LinkPreset::Perfect => LinkConfig::perfect(),
        LinkPreset::Noisy => LinkConfig::noisy(),
        LinkPreset::Hostile => LinkConfig::hostile(),
    };
    let sampling = if args.bulk {
        SamplingMode::Bulk
    } else {
        SamplingMode::Scalar
    };

    let variant = if args.bare_sync {
        SyncVariant::Bare
    } else {
        SyncVariant::Tagged
    };

    let mut scenario = Scenario::new(tree)
        .with_timing(
            Duration::from_millis(args.period_ms),
            Duration::from_millis(args.slot_ms),
        )
        .with_sampling(sampling)
        .with_sync_variant(variant)
        .with_link(link)
        .with_seed(args.seed)
        .with_random_drift(args.drift_ppm);
    if let Some(rate) = args.rate {
        scenario = scenario.with_data_rate(DataRate::new(rate)?);
    }

    for line in scenario.plan()?.render() {
        println!("{line}");
    }

    let mut sim = scenario.build()?;
    sim.run_for(Duration::from_secs(args.seconds));
    report(&sim);
    Ok(())
}
