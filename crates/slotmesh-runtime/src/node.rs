//! SlotMesh Node - ties scheduler, synchronizer and relay policy together
//!
//! Every entry point runs to completion:
//! - `tick(now)`: advance sync and sampling, move the scheduler, perform the
//!   side effects of any transition
//! - `receive(bytes, now)`: decode and dispatch one radio frame
//! - `pop_outgoing()`: next frame to put on the air in the current window

use std::collections::VecDeque;
use std::time::Duration;

use slotmesh_core::{
    Condition, ConfigError, DataRate, DataRecord, LocalTime, NodeId, NodeRole, PhaseAnchor,
    RoleAssignment, ScheduleConfig, ScheduleLayout, SlotKind, SlotmeshResult,
    SyncRecord,
};
use slotmesh_relay::{RelayConfig, RelayDecision, RelayPolicy};
use slotmesh_time::{SyncConfig, SyncEvent, TimeSynchronizer};
use slotmesh_wire::{Frame, FrameBody};
use tracing::debug;

use crate::{NodeStats, Phase, Sampler, SamplingMode, SensorSource, SlotScheduler, SlotState, Transition};

/// Validated node configuration
#[derive(Clone, Debug)]
pub struct NodeConfig {
    pub device_id: NodeId,
    pub schedule: ScheduleConfig,
    pub data_rate: DataRate,
    pub role: NodeRole,
    pub sync: SyncConfig,
    pub relay: RelayConfig,
    pub sampling: SamplingMode,
    /// Receiver wakes this long before each receive window
    pub rx_guard: Duration,
}

/// Default receiver wake-up guard
pub const DEFAULT_RX_GUARD: Duration = Duration::from_millis(1);

impl NodeConfig {
    pub fn builder(device_id: NodeId) -> NodeConfigBuilder {
        NodeConfigBuilder::new(device_id)
    }
}

/// Collects node settings; [`build`](Self::build) validates them all
#[derive(Clone, Debug)]
pub struct NodeConfigBuilder {
    device_id: NodeId,
    schedule: Option<Result<ScheduleConfig, ConfigError>>,
    data_rate: Option<DataRate>,
    roles: RoleAssignment,
    sync: Option<SyncConfig>,
    relay: RelayConfig,
    sampling: SamplingMode,
    rx_guard: Duration,
}

impl NodeConfigBuilder {
    pub fn new(device_id: NodeId) -> Self {
        NodeConfigBuilder {
            device_id,
            schedule: None,
            data_rate: None,
            roles: RoleAssignment::default(),
            sync: None,
            relay: RelayConfig::default(),
            sampling: SamplingMode::default(),
            rx_guard: DEFAULT_RX_GUARD,
        }
    }

    pub fn schedule(mut self, schedule: ScheduleConfig) -> Self {
        self.schedule = Some(Ok(schedule));
        self
    }

    /// Schedule from any deployment layout; layout errors surface in `build`
    pub fn layout(mut self, layout: &impl ScheduleLayout) -> Self {
        self.schedule = Some(layout.to_schedule());
        self
    }

    pub fn data_rate(mut self, rate: DataRate) -> Self {
        self.data_rate = Some(rate);
        self
    }

    pub fn roles(mut self, roles: RoleAssignment) -> Self {
        self.roles = roles;
        self
    }

    /// Defaults to [`SyncConfig::root`] for sinks, [`SyncConfig::default`]
    /// otherwise
    pub fn sync(mut self, sync: SyncConfig) -> Self {
        self.sync = Some(sync);
        self
    }

    pub fn relay(mut self, relay: RelayConfig) -> Self {
        self.relay = relay;
        self
    }

    pub fn cache_capacity(mut self, capacity: usize) -> Self {
        self.relay.cache_capacity = capacity;
        self
    }

    pub fn sampling(mut self, sampling: SamplingMode) -> Self {
        self.sampling = sampling;
        self
    }

    pub fn rx_guard(mut self, guard: Duration) -> Self {
        self.rx_guard = guard;
        self
    }

    pub fn build(self) -> Result<NodeConfig, ConfigError> {
        let schedule = self
            .schedule
            .unwrap_or(Err(ConfigError::NoWindows(self.device_id)))?;
        if schedule.device_id() != self.device_id {
            return Err(ConfigError::DeviceMismatch {
                node: self.device_id,
                schedule: schedule.device_id(),
            });
        }
        let data_rate = self.data_rate.ok_or(ConfigError::MissingDataRate)?;
        let role = self.roles.role_of(self.device_id)?;
        self.relay.validate()?;

        let sync = self.sync.unwrap_or_else(|| match role {
            NodeRole::Sink => SyncConfig::root(),
            _ => SyncConfig::default(),
        });

        Ok(NodeConfig {
            device_id: self.device_id,
            schedule,
            data_rate,
            role,
            sync,
            relay: self.relay,
            sampling: self.sampling,
            rx_guard: self.rx_guard,
        })
    }
}

/// Frame waiting for its window
#[derive(Debug)]
struct Outgoing {
    phase: Phase,
    frame: Frame,
}

/// One sensor network node
pub struct Node {
    id: NodeId,
    role: NodeRole,
    period: Duration,
    /// Where data frames go
    dest: NodeId,
    /// Offset at which a bare marker from the parent arrives
    marker_offset: Duration,
    rx_guard: Duration,
    scheduler: SlotScheduler,
    sync: TimeSynchronizer,
    relay: RelayPolicy,
    sampler: Sampler,
    sensor: Box<dyn SensorSource + Send>,
    outgoing: VecDeque<Outgoing>,
    delivered: Vec<DataRecord>,
    conditions: Vec<Condition>,
    stats: NodeStats,
}

impl Node {
    pub fn new(config: NodeConfig, sensor: impl SensorSource + Send + 'static) -> Result<Self, ConfigError> {
        Self::with_sensor(config, Box::new(sensor))
    }

    pub fn with_sensor(config: NodeConfig, sensor: Box<dyn SensorSource + Send>) -> Result<Self, ConfigError> {
        let period = config.schedule.period();
        let relay = RelayPolicy::new(config.device_id, config.role, &config.relay)?;
        Ok(Node {
            id: config.device_id,
            role: config.role,
            period,
            dest: config.schedule.parent().unwrap_or(NodeId::BROADCAST),
            marker_offset: config
                .schedule
                .window(SlotKind::SendAck)
                .map(|w| w.start)
                .unwrap_or_default(),
            rx_guard: config.rx_guard,
            sampler: Sampler::new(config.device_id, config.sampling, config.data_rate.interval()),
            sync: TimeSynchronizer::new(config.sync, period),
            scheduler: SlotScheduler::new(config.schedule),
            relay,
            sensor,
            outgoing: VecDeque::new(),
            delivered: Vec::new(),
            conditions: Vec::new(),
            stats: NodeStats::default(),
        })
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn role(&self) -> NodeRole {
        self.role
    }

    pub fn state(&self) -> SlotState {
        self.scheduler.state()
    }

    pub fn radio_on(&self) -> bool {
        self.scheduler.radio_on()
    }

    pub fn anchor(&self) -> Option<PhaseAnchor> {
        self.sync.anchor()
    }

    pub fn is_synchronized(&self) -> bool {
        self.sync.is_synchronized()
    }

    /// Advance the node to `now`
    pub fn tick(&mut self, now: LocalTime) -> Option<Transition> {
        self.stats.ticks += 1;
        self.sync.tick(now);

        if self.role.originates() {
            let mut records = Vec::new();
            self.stats.samples += self.sampler.poll(now, self.sensor.as_mut(), &mut records);
            for record in records {
                self.relay.enqueue(record, &mut self.conditions);
            }
        }

        let transition = self.scheduler.tick(now, self.sync.anchor());
        if let Some(t) = transition {
            self.apply(t, now);
        }
        self.drain_conditions();
        transition
    }

    fn apply(&mut self, t: Transition, now: LocalTime) {
        if t.skipped > 0 {
            self.conditions
                .push(Condition::SchedulingSkew { skipped: t.skipped });
        }
        if t.from.is_open() {
            self.abandon(t.from.phase);
        }

        if t.opens(Phase::Send) {
            if let Some(partial) = self.sampler.flush_partial() {
                self.relay.enqueue(partial, &mut self.conditions);
            }
            for batch in self.relay.flush() {
                self.outgoing.push_back(Outgoing {
                    phase: Phase::Send,
                    frame: Frame::data(self.id, self.dest, batch),
                });
            }
            if self.outgoing.is_empty() {
                self.scheduler.mark_done();
            }
        } else if t.opens(Phase::ListenAck) {
            match self.sync.tick_for_broadcast(now) {
                Some(record) => self.outgoing.push_back(Outgoing {
                    phase: Phase::ListenAck,
                    frame: Frame::sync(self.id, record),
                }),
                None => self.scheduler.mark_done(),
            }
        }
    }

    fn abandon(&mut self, phase: Phase) {
        let before = self.outgoing.len();
        self.outgoing.retain(|o| o.phase != phase);
        let dropped = before - self.outgoing.len();
        if dropped > 0 {
            self.stats.frames_abandoned += dropped as u64;
            debug!(node = %self.id, ?phase, dropped, "window closed with frames unsent");
        }
    }

    /// Next frame to transmit in the current window
    pub fn pop_outgoing(&mut self) -> Option<Frame> {
        let state = self.scheduler.state();
        if !state.is_open() {
            return None;
        }
        let frame = match self.outgoing.front() {
            Some(o) if o.phase == state.phase => self.outgoing.pop_front().map(|o| o.frame),
            _ => None,
        }?;
        self.stats.frames_sent += 1;
        if self.outgoing.is_empty() {
            self.scheduler.mark_done();
        }
        Some(frame)
    }

    /// Decode and handle raw frame bytes
    pub fn receive(&mut self, bytes: &[u8], now: LocalTime) -> SlotmeshResult<()> {
        let frame = Frame::parse(bytes).map_err(|e| {
            self.stats.decode_errors += 1;
            e
        })?;
        self.receive_frame(frame, now);
        Ok(())
    }

    /// Is the receiver powered at `now`, counting the wake-up guard?
    fn listening(&self, now: LocalTime) -> bool {
        if self.scheduler.radio_on() {
            return true;
        }
        match self.sync.anchor() {
            Some(anchor) if !self.rx_guard.is_zero() => {
                self.scheduler.receiving_at(now + self.rx_guard, anchor)
            }
            _ => false,
        }
    }

    /// Handle a decoded frame. Frames arriving while the receiver is off are
    /// dropped.
    pub fn receive_frame(&mut self, frame: Frame, now: LocalTime) {
        if frame.header.sender == self.id {
            return;
        }
        if !self.listening(now) {
            self.stats.radio_off_drops += 1;
            return;
        }
        self.stats.frames_received += 1;

        match frame.body {
            FrameBody::Sync(record) => {
                let record = match record.tag {
                    Some(_) => record,
                    None => SyncRecord::marker(self.period.saturating_sub(self.marker_offset)),
                };
                if self.sync.on_sync_received(&record, now) == SyncEvent::Stale {
                    self.conditions
                        .push(Condition::StaleSync { tag: record.tag });
                }
            }
            FrameBody::Data(records) => {
                for record in records {
                    let decision = self
                        .relay
                        .handle(record, frame.header.dest, &mut self.conditions);
                    if let RelayDecision::Deliver(record) = decision {
                        self.stats.delivered += 1;
                        self.delivered.push(record);
                    }
                }
            }
        }
        self.drain_conditions();
    }

    /// Records delivered to the application since the last call
    pub fn take_delivered(&mut self) -> Vec<DataRecord> {
        std::mem::take(&mut self.delivered)
    }

    /// Earliest instant anything is due: a boundary, a sample, or the
    /// fallback anchor
    pub fn next_wake(&self, now: LocalTime) -> LocalTime {
        let boundary = match self.sync.anchor() {
            Some(anchor) => self.scheduler.next_boundary(now, anchor),
            None => now + self.sync.config().init_timeout,
        };
        match self.sampler.next_at() {
            Some(sample) if self.role.originates() => boundary.min(sample.max(now)),
            _ => boundary,
        }
    }

    fn drain_conditions(&mut self) {
        for condition in self.conditions.drain(..) {
            self.stats.record(&condition);
        }
    }

    pub fn stats(&self) -> &NodeStats {
        &self.stats
    }

    pub fn scheduler(&self) -> &SlotScheduler {
        &self.scheduler
    }

    pub fn synchronizer(&self) -> &TimeSynchronizer {
        &self.sync
    }

    pub fn relay(&self) -> &RelayPolicy {
        &self.relay
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("role", &self.role)
            .field("state", &self.scheduler.state())
            .field("anchor", &self.sync.anchor())
            .finish()
    }
}
