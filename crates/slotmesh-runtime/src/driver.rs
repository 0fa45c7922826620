//! Async driver: runs a [`Node`] against a tokio clock and a radio channel
//!
//! The radio is a pair of mpsc channels carrying encoded frames. Whatever
//! sits on the other side (a simulator medium, a serial bridge) decides who
//! hears what.

use std::time::Duration;

use bytes::Bytes;
use slotmesh_core::{LocalTime, SlotmeshError, SlotmeshResult};
use slotmesh_time::Clock;
use tokio::sync::mpsc;
use tokio::time::{interval, sleep_until, Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::Node;

/// Frames heard by the node
pub type FrameReceiver = mpsc::Receiver<Bytes>;

/// Frames put on the air by the node
pub type FrameSender = mpsc::Sender<Bytes>;

/// Default tick granularity
pub const DEFAULT_TICK: Duration = Duration::from_millis(1);

/// Node-local time from the tokio clock; follows paused time in tests
#[derive(Clone, Copy, Debug)]
pub struct TokioClock {
    start: Instant,
}

impl TokioClock {
    pub fn new() -> Self {
        TokioClock {
            start: Instant::now(),
        }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TokioClock {
    fn now(&self) -> LocalTime {
        LocalTime::from_micros(self.start.elapsed().as_micros() as u64)
    }
}

/// Runs one node until a deadline or until its radio goes away
pub struct NodeDriver {
    node: Node,
    clock: TokioClock,
    inbox: FrameReceiver,
    outbox: FrameSender,
    tick: Duration,
}

impl NodeDriver {
    pub fn new(node: Node, inbox: FrameReceiver, outbox: FrameSender) -> Self {
        NodeDriver {
            node,
            clock: TokioClock::new(),
            inbox,
            outbox,
            tick: DEFAULT_TICK,
        }
    }

    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    pub fn node(&self) -> &Node {
        &self.node
    }

    /// Run for `duration`, then hand the node back
    pub async fn run_for(mut self, duration: Duration) -> SlotmeshResult<Node> {
        let deadline = Instant::now() + duration;
        let mut ticker = interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(node = %self.node.id(), role = ?self.node.role(), "driver started");

        loop {
            tokio::select! {
                _ = sleep_until(deadline) => break,

                _ = ticker.tick() => {
                    let now = self.clock.now();
                    self.node.tick(now);
                    self.transmit().await?;
                }

                frame = self.inbox.recv() => {
                    let Some(bytes) = frame else {
                        return Err(SlotmeshError::RadioClosed);
                    };
                    let now = self.clock.now();
                    self.node.tick(now);
                    if let Err(e) = self.node.receive(&bytes, now) {
                        debug!(node = %self.node.id(), error = %e, "undecodable frame");
                    }
                    self.transmit().await?;
                }
            }
        }

        info!(node = %self.node.id(), stats = ?self.node.stats(), "driver stopped");
        Ok(self.node)
    }

    async fn transmit(&mut self) -> SlotmeshResult<()> {
        while let Some(frame) = self.node.pop_outgoing() {
            let bytes = frame.serialize()?;
            self.outbox
                .send(bytes)
                .await
                .map_err(|_| SlotmeshError::RadioClosed)?;
        }
        Ok(())
    }
}
