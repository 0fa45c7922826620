//! Slot scheduler - the per-node phase state machine
//!
//! The schedule's window edges form a cyclic list of boundaries. Each
//! boundary has a global index `period * n + i` relative to the anchor, and
//! the scheduler only ever moves that index forward:
//! - one boundary crossed: a normal transition
//! - several crossed: snap to the state at `now`, report the skipped count
//! - index behind the last one seen (anchor moved forward): hold
//!
//! The scheduler performs no side effects; the node derives them from the
//! (from, to) pair of each [`Transition`].

use std::fmt;
use std::time::Duration;

use slotmesh_core::{Edge, LocalTime, PhaseAnchor, ScheduleConfig, SlotKind};
use tracing::{debug, warn};

/// Scheduler phase
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Waiting for the first anchor
    Init,
    Listen,
    ListenAck,
    Send,
    SendAck,
}

impl From<SlotKind> for Phase {
    fn from(kind: SlotKind) -> Self {
        match kind {
            SlotKind::Listen => Phase::Listen,
            SlotKind::ListenAck => Phase::ListenAck,
            SlotKind::Send => Phase::Send,
            SlotKind::SendAck => Phase::SendAck,
        }
    }
}

/// Progress within a phase
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PhaseStatus {
    /// Window open
    On,
    /// Window open and its work completed
    Done,
    /// Window closed, waiting for the next boundary
    Off,
}

/// Phase plus status
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotState {
    pub phase: Phase,
    pub status: PhaseStatus,
}

impl SlotState {
    pub const INIT: SlotState = SlotState {
        phase: Phase::Init,
        status: PhaseStatus::On,
    };

    pub fn new(phase: Phase, status: PhaseStatus) -> Self {
        SlotState { phase, status }
    }

    /// Window open (ON or DONE)
    pub fn is_open(self) -> bool {
        self.phase != Phase::Init && self.status != PhaseStatus::Off
    }
}

impl fmt::Debug for SlotState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}/{:?}", self.phase, self.status)
    }
}

/// One state change
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Transition {
    pub from: SlotState,
    pub to: SlotState,
    /// Period index (relative to the anchor) of the new state
    pub period: i64,
    /// Boundaries crossed without their own transition
    pub skipped: u32,
}

impl Transition {
    /// Did this transition open `phase`'s window?
    pub fn opens(&self, phase: Phase) -> bool {
        self.to.phase == phase && self.to.status == PhaseStatus::On
    }

    /// Was `phase`'s window open before this transition?
    pub fn closes(&self, phase: Phase) -> bool {
        self.from.phase == phase && self.from.is_open()
    }
}

/// Counters for the scheduler
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub transitions: u64,
    pub skew_events: u64,
    pub skipped_boundaries: u64,
    pub held_ticks: u64,
}

/// Per-node slot state machine
pub struct SlotScheduler {
    schedule: ScheduleConfig,
    /// (offset, state entered at that offset), strictly increasing offsets
    boundaries: Vec<(Duration, SlotState)>,
    state: SlotState,
    /// Global index of the last boundary acted on; `None` while in INIT
    position: Option<i64>,
    stats: SchedulerStats,
}

impl SlotScheduler {
    pub fn new(schedule: ScheduleConfig) -> Self {
        let mut boundaries: Vec<(Duration, SlotState)> = Vec::new();
        for b in schedule.boundaries() {
            let status = match b.edge {
                Edge::Open => PhaseStatus::On,
                Edge::Close => PhaseStatus::Off,
            };
            let state = SlotState::new(b.kind.into(), status);
            // Touching windows share an offset; the later edge wins
            match boundaries.last_mut() {
                Some(last) if last.0 == b.offset => last.1 = state,
                _ => boundaries.push((b.offset, state)),
            }
        }

        SlotScheduler {
            schedule,
            boundaries,
            state: SlotState::INIT,
            position: None,
            stats: SchedulerStats::default(),
        }
    }

    pub fn schedule(&self) -> &ScheduleConfig {
        &self.schedule
    }

    pub fn state(&self) -> SlotState {
        self.state
    }

    pub fn phase(&self) -> Phase {
        self.state.phase
    }

    pub fn stats(&self) -> &SchedulerStats {
        &self.stats
    }

    /// Receiver should be powered: INIT, LISTEN and SEND_ACK windows
    pub fn radio_on(&self) -> bool {
        match self.state.phase {
            Phase::Init => true,
            Phase::Listen | Phase::SendAck => self.state.is_open(),
            Phase::ListenAck | Phase::Send => false,
        }
    }

    /// Record that the current window's work is complete
    pub fn mark_done(&mut self) {
        if self.state.status == PhaseStatus::On && self.state.phase != Phase::Init {
            self.state.status = PhaseStatus::Done;
        }
    }

    /// Global boundary index and period index for `now`
    fn locate(&self, now: LocalTime, anchor: PhaseAnchor) -> i64 {
        let pos = anchor.position(now, self.schedule.period());
        let crossed = self
            .boundaries
            .partition_point(|(offset, _)| *offset <= pos.offset) as i64;
        pos.period * self.boundaries.len() as i64 + crossed - 1
    }

    fn state_at(&self, index: i64) -> SlotState {
        let n = self.boundaries.len() as i64;
        self.boundaries[index.rem_euclid(n) as usize].1
    }

    /// Advance to `now`. Calling again with the same `now` and anchor is a
    /// no-op; so is calling with an anchor that moved the phase backwards.
    pub fn tick(&mut self, now: LocalTime, anchor: Option<PhaseAnchor>) -> Option<Transition> {
        let anchor = anchor?;
        let index = self.locate(now, anchor);
        // Before the first boundary the state still belongs to the previous period
        let period = index.div_euclid(self.boundaries.len() as i64);
        let from = self.state;

        let skipped = match self.position {
            // Leaving INIT lands wherever the schedule says; not skew
            None => 0,
            Some(last) if index <= last => {
                if index < last {
                    self.stats.held_ticks += 1;
                }
                return None;
            }
            Some(last) => (index - last - 1).min(u32::MAX as i64) as u32,
        };

        self.position = Some(index);
        self.state = self.state_at(index);
        self.stats.transitions += 1;

        if skipped > 0 {
            self.stats.skew_events += 1;
            self.stats.skipped_boundaries += skipped as u64;
            warn!(?from, to = ?self.state, skipped, "scheduling skew, snapped to schedule");
        } else {
            debug!(?from, to = ?self.state, period, "slot transition");
        }

        Some(Transition {
            from,
            to: self.state,
            period,
            skipped,
        })
    }

    /// Does the schedule place an open receive window at `t`?
    pub fn receiving_at(&self, t: LocalTime, anchor: PhaseAnchor) -> bool {
        let pos = anchor.position(t, self.schedule.period());
        matches!(
            self.schedule.active_at(pos.offset),
            Some(SlotKind::Listen | SlotKind::SendAck)
        )
    }

    /// Local time of the next boundary after `now`
    pub fn next_boundary(&self, now: LocalTime, anchor: PhaseAnchor) -> LocalTime {
        let period = self.schedule.period();
        let pos = anchor.position(now, period);
        let wait = match self.boundaries.iter().find(|(offset, _)| *offset > pos.offset) {
            Some((offset, _)) => *offset - pos.offset,
            None => {
                let first = self.boundaries.first().map(|b| b.0).unwrap_or_default();
                period - pos.offset + first
            }
        };
        now + wait
    }
}
