//! Multi-node radio simulator
//!
//! Global simulated time advances in fixed steps. Every step:
//! 1. each node is ticked at its own (drifting) local time
//! 2. frames it puts on the air go to every neighbor over a [`ChaosLink`]
//! 3. frames whose arrival time has come are handed to their receivers
//!
//! Receivers are ticked before delivery, so a frame arriving exactly at a
//! window boundary sees the window already open.

use std::cmp::{Ordering, Reverse};
use std::collections::{BTreeMap, BTreeSet, BinaryHeap, HashMap};
use std::time::Duration;

use bytes::Bytes;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use slotmesh_core::{
    ConfigError, DataRate, DataRecord, LocalTime, NodeId, PlanNode, SlotPlan,
};
use slotmesh_runtime::{CounterSensor, Node, NodeConfig, SamplingMode, SensorSource};
use slotmesh_time::{SyncConfig, SyncVariant};
use tracing::{debug, trace, warn};

use crate::chaos::{ChaosLink, LinkConfig, LinkStats};

/// Local clock of a simulated node: constant offset plus rate error
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DriftingClock {
    /// Local time at global zero
    pub offset: Duration,
    /// Rate error in parts per million (positive runs fast)
    pub ppm: f64,
}

impl Default for DriftingClock {
    fn default() -> Self {
        Self::perfect()
    }
}

impl DriftingClock {
    pub fn new(offset: Duration, ppm: f64) -> Self {
        DriftingClock { offset, ppm }
    }

    pub fn perfect() -> Self {
        Self::new(Duration::ZERO, 0.0)
    }

    /// Typical crystal running fast
    pub fn fast() -> Self {
        Self::new(Duration::ZERO, 40.0)
    }

    /// Typical crystal running slow
    pub fn slow() -> Self {
        Self::new(Duration::ZERO, -40.0)
    }

    /// Local reading at global time `global`
    pub fn local(&self, global: Duration) -> LocalTime {
        let g = global.as_micros() as i64;
        let drift = (g as f64 * self.ppm / 1e6).round() as i64;
        let local = self.offset.as_micros() as i64 + g + drift;
        LocalTime::from_micros(local.max(0) as u64)
    }

    /// Global length of a span measured on this clock
    pub fn global_span(&self, local: Duration) -> Duration {
        let us = local.as_micros() as f64 / (1.0 + self.ppm / 1e6);
        Duration::from_micros(us.round() as u64)
    }
}

/// Frame on its way to one receiver
#[derive(Debug)]
struct InFlight {
    at: Duration,
    seq: u64,
    from: NodeId,
    to: NodeId,
    bytes: Bytes,
}

impl PartialEq for InFlight {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at && self.seq == other.seq
    }
}

impl Eq for InFlight {}

impl PartialOrd for InFlight {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for InFlight {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.at, self.seq).cmp(&(other.at, other.seq))
    }
}

/// Node under simulation
pub struct SimNode {
    pub node: Node,
    pub clock: DriftingClock,
    neighbors: BTreeSet<NodeId>,
    delivered: Vec<DataRecord>,
}

impl SimNode {
    /// Records delivered to this node so far
    pub fn delivered(&self) -> &[DataRecord] {
        &self.delivered
    }

    pub fn neighbors(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.neighbors.iter().copied()
    }
}

/// Simulator-wide counters
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SimStats {
    pub steps: u64,
    pub transmissions: u64,
    pub arrivals: u64,
    pub decode_errors: u64,
}

/// Radio medium plus the nodes on it
pub struct Simulator {
    now: Duration,
    step: Duration,
    root: NodeId,
    nodes: BTreeMap<NodeId, SimNode>,
    links: HashMap<(NodeId, NodeId), ChaosLink>,
    link_config: LinkConfig,
    in_flight: BinaryHeap<Reverse<InFlight>>,
    next_seq: u64,
    seed: u64,
    stats: SimStats,
}

impl Simulator {
    pub fn new(root: NodeId, step: Duration, link_config: LinkConfig, seed: u64) -> Self {
        Simulator {
            now: Duration::ZERO,
            step,
            root,
            nodes: BTreeMap::new(),
            links: HashMap::new(),
            link_config,
            in_flight: BinaryHeap::new(),
            next_seq: 0,
            seed,
            stats: SimStats::default(),
        }
    }

    pub fn add_node(&mut self, node: Node, clock: DriftingClock) {
        self.nodes.insert(
            node.id(),
            SimNode {
                node,
                clock,
                neighbors: BTreeSet::new(),
                delivered: Vec::new(),
            },
        );
    }

    /// Put `a` and `b` in radio range of each other
    pub fn connect(&mut self, a: NodeId, b: NodeId) {
        for (from, to) in [(a, b), (b, a)] {
            if let Some(sim) = self.nodes.get_mut(&from) {
                sim.neighbors.insert(to);
            }
            let seed = self.seed ^ ((from.0 as u64) << 16 | to.0 as u64);
            self.links
                .entry((from, to))
                .or_insert_with(|| ChaosLink::new(self.link_config.clone(), seed));
        }
    }

    /// Replace the impairments of the directed link `from -> to`
    pub fn set_link(&mut self, from: NodeId, to: NodeId, config: LinkConfig) {
        let seed = self.seed ^ ((from.0 as u64) << 16 | to.0 as u64);
        self.links.insert((from, to), ChaosLink::new(config, seed));
    }

    /// Advance one step
    pub fn step(&mut self) {
        let now = self.now;
        let mut on_air = Vec::new();

        for (id, sim) in self.nodes.iter_mut() {
            let local = sim.clock.local(now);
            sim.node.tick(local);
            while let Some(frame) = sim.node.pop_outgoing() {
                match frame.serialize() {
                    Ok(bytes) => on_air.push((*id, bytes)),
                    Err(e) => warn!(node = %id, error = %e, "frame not serializable"),
                }
            }
        }

        for (from, bytes) in on_air {
            self.broadcast(from, bytes);
        }
        self.deliver_due();

        self.stats.steps += 1;
        self.now += self.step;
    }

    /// Step until `duration` of simulated time has passed
    pub fn run_for(&mut self, duration: Duration) {
        let end = self.now + duration;
        while self.now < end {
            self.step();
        }
    }

    fn broadcast(&mut self, from: NodeId, bytes: Bytes) {
        let neighbors: Vec<NodeId> = match self.nodes.get(&from) {
            Some(sim) => sim.neighbors().collect(),
            None => return,
        };
        self.stats.transmissions += 1;

        for to in neighbors {
            let Some(link) = self.links.get_mut(&(from, to)) else {
                continue;
            };
            let arrivals = link.transmit();
            if arrivals.is_empty() {
                debug!(%from, %to, "frame lost");
            }
            for delay in arrivals {
                self.in_flight.push(Reverse(InFlight {
                    at: self.now + delay,
                    seq: self.next_seq,
                    from,
                    to,
                    bytes: bytes.clone(),
                }));
                self.next_seq += 1;
            }
        }
    }

    fn deliver_due(&mut self) {
        while self
            .in_flight
            .peek()
            .is_some_and(|Reverse(f)| f.at <= self.now)
        {
            let Some(Reverse(frame)) = self.in_flight.pop() else {
                break;
            };
            let Some(sim) = self.nodes.get_mut(&frame.to) else {
                continue;
            };
            self.stats.arrivals += 1;
            let local = sim.clock.local(frame.at);
            sim.node.tick(local);
            match sim.node.receive(&frame.bytes, local) {
                Ok(()) => trace!(from = %frame.from, to = %frame.to, "frame received"),
                Err(e) => {
                    self.stats.decode_errors += 1;
                    debug!(to = %frame.to, error = %e, "undecodable frame");
                }
            }
            sim.delivered.extend(sim.node.take_delivered());
        }
    }

    /// Current global time
    pub fn now(&self) -> Duration {
        self.now
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id).map(|sim| &sim.node)
    }

    pub fn sim_node(&self, id: NodeId) -> Option<&SimNode> {
        self.nodes.get(&id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &SimNode> + '_ {
        self.nodes.values()
    }

    /// Records delivered to `id` so far
    pub fn delivered(&self, id: NodeId) -> &[DataRecord] {
        self.nodes
            .get(&id)
            .map(|sim| sim.delivered.as_slice())
            .unwrap_or_default()
    }

    pub fn link_stats(&self, from: NodeId, to: NodeId) -> Option<&LinkStats> {
        self.links.get(&(from, to)).map(|l| l.stats())
    }

    pub fn stats(&self) -> &SimStats {
        &self.stats
    }

    /// Global time of the next period start of `id`
    fn next_period_start(&self, id: NodeId) -> Option<(Duration, Duration)> {
        let sim = self.nodes.get(&id)?;
        let anchor = sim.node.anchor()?;
        let period = sim.node.scheduler().schedule().period();
        let remaining = anchor.remaining(sim.clock.local(self.now), period);
        Some((self.now + sim.clock.global_span(remaining), period))
    }

    /// Signed phase error of `id` against the timing root, in microseconds.
    /// Positive means `id` starts its periods later.
    pub fn phase_error(&self, id: NodeId) -> Option<i64> {
        let (node_start, period) = self.next_period_start(id)?;
        let (root_start, _) = self.next_period_start(self.root)?;
        let period_us = period.as_micros() as i64;
        let mut error =
            (node_start.as_micros() as i64 - root_start.as_micros() as i64).rem_euclid(period_us);
        if error > period_us / 2 {
            error -= period_us;
        }
        Some(error)
    }
}

/// Linear tree: sink first, then each node the child of the one before it.
/// An empty list gives a lone sink with id 0.
pub fn chain_tree(ids: &[u16]) -> PlanNode {
    ids.iter()
        .rev()
        .fold(None, |child: Option<PlanNode>, &id| {
            Some(PlanNode::with_children(id, child.into_iter().collect()))
        })
        .unwrap_or_else(|| PlanNode::leaf(0))
}

/// Builds a simulator from a collection tree
pub struct Scenario {
    tree: PlanNode,
    period: Duration,
    slot_size: Duration,
    step: Duration,
    data_rate: Option<DataRate>,
    sampling: SamplingMode,
    sync_variant: SyncVariant,
    link: LinkConfig,
    seed: u64,
    max_drift_ppm: f64,
    clocks: HashMap<NodeId, DriftingClock>,
    sensors: HashMap<NodeId, Box<dyn SensorSource + Send>>,
}

impl Scenario {
    pub fn new(tree: PlanNode) -> Self {
        Scenario {
            tree,
            period: Duration::from_millis(1000),
            slot_size: Duration::from_millis(10),
            step: Duration::from_millis(1),
            data_rate: None,
            sampling: SamplingMode::Scalar,
            sync_variant: SyncVariant::Tagged,
            link: LinkConfig::perfect(),
            seed: 0,
            max_drift_ppm: 0.0,
            clocks: HashMap::new(),
            sensors: HashMap::new(),
        }
    }

    /// See [`chain_tree`]
    pub fn chain(ids: &[u16]) -> Self {
        Self::new(chain_tree(ids))
    }

    pub fn with_timing(mut self, period: Duration, slot_size: Duration) -> Self {
        self.period = period;
        self.slot_size = slot_size;
        self
    }

    pub fn with_step(mut self, step: Duration) -> Self {
        self.step = step;
        self
    }

    pub fn with_data_rate(mut self, rate: DataRate) -> Self {
        self.data_rate = Some(rate);
        self
    }

    pub fn with_sampling(mut self, sampling: SamplingMode) -> Self {
        self.sampling = sampling;
        self
    }

    /// Sync message variant used by every node; the sink stays the timing root
    pub fn with_sync_variant(mut self, variant: SyncVariant) -> Self {
        self.sync_variant = variant;
        self
    }

    pub fn with_link(mut self, link: LinkConfig) -> Self {
        self.link = link;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Give every node without an explicit clock a random offset and a rate
    /// error within `±max_ppm`
    pub fn with_random_drift(mut self, max_ppm: f64) -> Self {
        self.max_drift_ppm = max_ppm;
        self
    }

    pub fn with_clock(mut self, id: u16, clock: DriftingClock) -> Self {
        self.clocks.insert(NodeId::new(id), clock);
        self
    }

    /// Sensor of one node; the rest count upward
    pub fn with_sensor(mut self, id: u16, sensor: impl SensorSource + Send + 'static) -> Self {
        self.sensors.insert(NodeId::new(id), Box::new(sensor));
        self
    }

    pub fn plan(&self) -> Result<SlotPlan, ConfigError> {
        SlotPlan::compute(&self.tree)
    }

    pub fn build(mut self) -> Result<Simulator, ConfigError> {
        let plan = SlotPlan::compute(&self.tree)?;
        let schedules = plan.schedules(self.period, self.slot_size)?;
        let roles = plan.roles();
        let data_rate = match self.data_rate {
            Some(rate) => rate,
            None => DataRate::from_env()?,
        };
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut sim = Simulator::new(plan.root(), self.step, self.link.clone(), self.seed);
        let mut edges = Vec::new();

        for (id, schedule) in schedules {
            let parent = schedule.parent();
            let config = NodeConfig::builder(id)
                .schedule(schedule)
                .data_rate(data_rate)
                .roles(roles.clone())
                .sampling(self.sampling)
                .sync(SyncConfig {
                    variant: self.sync_variant,
                    timing_root: id == plan.root(),
                    ..Default::default()
                })
                .build()?;
            let node = match self.sensors.remove(&id) {
                Some(sensor) => Node::with_sensor(config, sensor)?,
                None => Node::new(config, CounterSensor::starting_at(id.0.wrapping_mul(100)))?,
            };
            let clock = match self.clocks.get(&id) {
                Some(clock) => *clock,
                None if self.max_drift_ppm > 0.0 => DriftingClock::new(
                    Duration::from_micros(rng.gen_range(0..1_000_000)),
                    rng.gen_range(-self.max_drift_ppm..=self.max_drift_ppm),
                ),
                None => DriftingClock::perfect(),
            };
            sim.add_node(node, clock);
            edges.extend(parent.map(|parent| (id, parent)));
        }
        for (child, parent) in edges {
            sim.connect(child, parent);
        }

        Ok(sim)
    }
}
