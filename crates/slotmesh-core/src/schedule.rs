//! Slot schedules
//!
//! A schedule is one period split into up to four windows, always in this
//! order when present:
//!
//! ```text
//! 0                                                      period
//! |--- listen ---|-- listen-ack --|--- send ---|-- send-ack --|
//! ```
//!
//! Windows are optional: a leaf node only sends, a sink only listens.
//! Three deployment layouts map onto the same boundary model:
//! - [`PercentLayout`]: boundaries as percentages of the period
//! - [`SlotLayout`]: period + slot size, windows as slot indices
//! - [`ExplicitLayout`]: all eight boundary offsets spelled out

use std::time::Duration;

use crate::{ConfigError, NodeId};

/// Purpose of a slot window
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SlotKind {
    Listen,
    ListenAck,
    Send,
    SendAck,
}

impl SlotKind {
    /// All kinds in schedule order
    pub const ALL: [SlotKind; 4] = [
        SlotKind::Listen,
        SlotKind::ListenAck,
        SlotKind::Send,
        SlotKind::SendAck,
    ];

    pub fn name(self) -> &'static str {
        match self {
            SlotKind::Listen => "listen",
            SlotKind::ListenAck => "listen-ack",
            SlotKind::Send => "send",
            SlotKind::SendAck => "send-ack",
        }
    }

    #[inline]
    fn index(self) -> usize {
        self as usize
    }
}

/// Half-open window `[start, stop)` within a period
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SlotWindow {
    pub start: Duration,
    pub stop: Duration,
}

impl SlotWindow {
    pub fn new(start: Duration, stop: Duration) -> Self {
        SlotWindow { start, stop }
    }

    pub fn contains(&self, offset: Duration) -> bool {
        offset >= self.start && offset < self.stop
    }

    pub fn len(&self) -> Duration {
        self.stop.saturating_sub(self.start)
    }
}

/// Which edge of a window a boundary marks
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Edge {
    Open,
    Close,
}

/// One boundary of the schedule
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Boundary {
    pub offset: Duration,
    pub kind: SlotKind,
    pub edge: Edge,
}

/// The set of windows of one schedule
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SlotWindows {
    windows: [Option<SlotWindow>; 4],
}

impl SlotWindows {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, kind: SlotKind, window: SlotWindow) -> Self {
        self.windows[kind.index()] = Some(window);
        self
    }

    pub fn with_opt(mut self, kind: SlotKind, window: Option<SlotWindow>) -> Self {
        self.windows[kind.index()] = window;
        self
    }

    pub fn get(&self, kind: SlotKind) -> Option<SlotWindow> {
        self.windows[kind.index()]
    }

    /// Present windows in schedule order
    pub fn iter(&self) -> impl Iterator<Item = (SlotKind, SlotWindow)> + '_ {
        SlotKind::ALL
            .into_iter()
            .filter_map(move |kind| self.get(kind).map(|w| (kind, w)))
    }
}

/// Validated per-device timing plan. Immutable once built.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScheduleConfig {
    device_id: NodeId,
    parent: Option<NodeId>,
    period: Duration,
    windows: SlotWindows,
}

impl ScheduleConfig {
    /// Validate and build a schedule
    pub fn new(
        device_id: NodeId,
        period: Duration,
        windows: SlotWindows,
    ) -> Result<Self, ConfigError> {
        if period.is_zero() {
            return Err(ConfigError::InvalidPeriod);
        }

        let mut previous: Option<(SlotKind, SlotWindow)> = None;
        for (kind, window) in windows.iter() {
            if window.start >= window.stop {
                return Err(ConfigError::EmptyWindow(kind.name()));
            }
            if window.stop >= period {
                return Err(ConfigError::BoundaryOutOfRange {
                    slot: kind.name(),
                    offset: window.stop,
                    period,
                });
            }
            if let Some((prev_kind, prev)) = previous {
                if prev.stop > window.start {
                    return Err(ConfigError::OverlappingWindows {
                        first: prev_kind.name(),
                        second: kind.name(),
                    });
                }
            }
            previous = Some((kind, window));
        }

        if previous.is_none() {
            return Err(ConfigError::NoWindows(device_id));
        }

        Ok(ScheduleConfig {
            device_id,
            parent: None,
            period,
            windows,
        })
    }

    /// Set the next hop data is addressed to
    pub fn with_parent(mut self, parent: Option<NodeId>) -> Self {
        self.parent = parent;
        self
    }

    pub fn device_id(&self) -> NodeId {
        self.device_id
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn window(&self, kind: SlotKind) -> Option<SlotWindow> {
        self.windows.get(kind)
    }

    pub fn windows(&self) -> &SlotWindows {
        &self.windows
    }

    /// All boundaries in non-decreasing offset order
    pub fn boundaries(&self) -> Vec<Boundary> {
        self.windows
            .iter()
            .flat_map(|(kind, w)| {
                [
                    Boundary {
                        offset: w.start,
                        kind,
                        edge: Edge::Open,
                    },
                    Boundary {
                        offset: w.stop,
                        kind,
                        edge: Edge::Close,
                    },
                ]
            })
            .collect()
    }

    /// Window active at `offset`, if any
    pub fn active_at(&self, offset: Duration) -> Option<SlotKind> {
        self.windows
            .iter()
            .find(|(_, w)| w.contains(offset))
            .map(|(kind, _)| kind)
    }
}

/// Converts a deployment layout into a validated schedule
pub trait ScheduleLayout {
    fn device_id(&self) -> NodeId;

    fn to_schedule(&self) -> Result<ScheduleConfig, ConfigError>;
}

/// Windows as percentages of the period.
///
/// `listen` runs until `listen_ack`; `send` runs until `send_done` (one
/// percent if absent); acknowledgment windows are one percent wide.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PercentLayout {
    pub device_id: NodeId,
    pub sendto: Option<NodeId>,
    pub period: Duration,
    pub listen: Option<u8>,
    pub listen_ack: Option<u8>,
    pub send: Option<u8>,
    pub send_done: Option<u8>,
    pub send_ack: Option<u8>,
}

impl PercentLayout {
    fn at(&self, percent: u8) -> Duration {
        self.period * percent as u32 / 100
    }

    fn unit(&self, percent: u8) -> SlotWindow {
        SlotWindow::new(self.at(percent), self.at(percent.saturating_add(1)))
    }
}

impl ScheduleLayout for PercentLayout {
    fn device_id(&self) -> NodeId {
        self.device_id
    }

    fn to_schedule(&self) -> Result<ScheduleConfig, ConfigError> {
        let listen = match (self.listen, self.listen_ack) {
            (Some(start), Some(ack)) => Some(SlotWindow::new(self.at(start), self.at(ack))),
            (Some(_), None) => return Err(ConfigError::EmptyWindow(SlotKind::Listen.name())),
            (None, _) => None,
        };
        let send = self.send.map(|start| match self.send_done {
            Some(done) => SlotWindow::new(self.at(start), self.at(done)),
            None => self.unit(start),
        });

        let windows = SlotWindows::new()
            .with_opt(SlotKind::Listen, listen)
            .with_opt(SlotKind::ListenAck, self.listen_ack.map(|p| self.unit(p)))
            .with_opt(SlotKind::Send, send)
            .with_opt(SlotKind::SendAck, self.send_ack.map(|p| self.unit(p)));

        Ok(ScheduleConfig::new(self.device_id, self.period, windows)?.with_parent(self.sendto))
    }
}

/// Period divided into fixed-size slots; windows given as slot indices.
///
/// `listen` spans slots `listen..listen_ack`; every other window is one slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SlotLayout {
    pub device_id: NodeId,
    pub sendto: Option<NodeId>,
    pub period: Duration,
    pub slot_size: Duration,
    pub listen: Option<u16>,
    pub listen_ack: Option<u16>,
    pub send: Option<u16>,
    pub send_ack: Option<u16>,
}

impl SlotLayout {
    fn at(&self, slot: u16) -> Duration {
        self.slot_size * slot as u32
    }

    fn unit(&self, slot: u16) -> SlotWindow {
        SlotWindow::new(self.at(slot), self.at(slot.saturating_add(1)))
    }
}

impl ScheduleLayout for SlotLayout {
    fn device_id(&self) -> NodeId {
        self.device_id
    }

    fn to_schedule(&self) -> Result<ScheduleConfig, ConfigError> {
        if self.slot_size.is_zero() {
            return Err(ConfigError::InvalidPeriod);
        }
        let listen = match (self.listen, self.listen_ack) {
            (Some(start), Some(ack)) => Some(SlotWindow::new(self.at(start), self.at(ack))),
            (Some(start), None) => Some(self.unit(start)),
            (None, _) => None,
        };

        let windows = SlotWindows::new()
            .with_opt(SlotKind::Listen, listen)
            .with_opt(SlotKind::ListenAck, self.listen_ack.map(|s| self.unit(s)))
            .with_opt(SlotKind::Send, self.send.map(|s| self.unit(s)))
            .with_opt(SlotKind::SendAck, self.send_ack.map(|s| self.unit(s)));

        Ok(ScheduleConfig::new(self.device_id, self.period, windows)?.with_parent(self.sendto))
    }
}

/// Every boundary given explicitly as an offset into the period
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExplicitLayout {
    pub device_id: NodeId,
    pub sendto: Option<NodeId>,
    pub period: Duration,
    pub listen_start: Option<Duration>,
    pub listen_stop: Option<Duration>,
    pub listen_ack_start: Option<Duration>,
    pub listen_ack_stop: Option<Duration>,
    pub send_start: Option<Duration>,
    pub send_stop: Option<Duration>,
    pub send_ack_start: Option<Duration>,
    pub send_ack_stop: Option<Duration>,
}

fn pair(
    kind: SlotKind,
    start: Option<Duration>,
    stop: Option<Duration>,
) -> Result<Option<SlotWindow>, ConfigError> {
    match (start, stop) {
        (Some(start), Some(stop)) => Ok(Some(SlotWindow::new(start, stop))),
        (None, None) => Ok(None),
        _ => Err(ConfigError::EmptyWindow(kind.name())),
    }
}

impl ScheduleLayout for ExplicitLayout {
    fn device_id(&self) -> NodeId {
        self.device_id
    }

    fn to_schedule(&self) -> Result<ScheduleConfig, ConfigError> {
        let windows = SlotWindows::new()
            .with_opt(
                SlotKind::Listen,
                pair(SlotKind::Listen, self.listen_start, self.listen_stop)?,
            )
            .with_opt(
                SlotKind::ListenAck,
                pair(SlotKind::ListenAck, self.listen_ack_start, self.listen_ack_stop)?,
            )
            .with_opt(
                SlotKind::Send,
                pair(SlotKind::Send, self.send_start, self.send_stop)?,
            )
            .with_opt(
                SlotKind::SendAck,
                pair(SlotKind::SendAck, self.send_ack_start, self.send_ack_stop)?,
            );

        Ok(ScheduleConfig::new(self.device_id, self.period, windows)?.with_parent(self.sendto))
    }
}

macro_rules! impl_try_from_layout {
    ($($layout:ty),*) => {
        $(
            impl TryFrom<$layout> for ScheduleConfig {
                type Error = ConfigError;

                fn try_from(layout: $layout) -> Result<Self, Self::Error> {
                    layout.to_schedule()
                }
            }
        )*
    };
}

impl_try_from_layout!(PercentLayout, SlotLayout, ExplicitLayout);

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn test_valid_schedule_boundaries_ordered() {
        let windows = SlotWindows::new()
            .with(SlotKind::Listen, SlotWindow::new(ms(0), ms(40)))
            .with(SlotKind::ListenAck, SlotWindow::new(ms(40), ms(50)))
            .with(SlotKind::Send, SlotWindow::new(ms(60), ms(70)))
            .with(SlotKind::SendAck, SlotWindow::new(ms(80), ms(90)));
        let schedule = ScheduleConfig::new(NodeId::new(28), ms(1000), windows).unwrap();

        let offsets: Vec<_> = schedule.boundaries().iter().map(|b| b.offset).collect();
        let mut sorted = offsets.clone();
        sorted.sort();
        assert_eq!(offsets, sorted);
        assert_eq!(offsets.len(), 8);
        assert_eq!(schedule.active_at(ms(45)), Some(SlotKind::ListenAck));
        assert_eq!(schedule.active_at(ms(55)), None);
    }

    #[test]
    fn test_overlap_rejected() {
        let windows = SlotWindows::new()
            .with(SlotKind::Listen, SlotWindow::new(ms(0), ms(40)))
            .with(SlotKind::Send, SlotWindow::new(ms(30), ms(50)));
        assert_eq!(
            ScheduleConfig::new(NodeId::new(1), ms(1000), windows),
            Err(ConfigError::OverlappingWindows {
                first: "listen",
                second: "send"
            })
        );
    }

    #[test]
    fn test_out_of_range_rejected() {
        let windows =
            SlotWindows::new().with(SlotKind::Send, SlotWindow::new(ms(990), ms(1000)));
        assert!(matches!(
            ScheduleConfig::new(NodeId::new(1), ms(1000), windows),
            Err(ConfigError::BoundaryOutOfRange { slot: "send", .. })
        ));
    }

    #[test]
    fn test_empty_schedule_rejected() {
        assert_eq!(
            ScheduleConfig::new(NodeId::new(9), ms(1000), SlotWindows::new()),
            Err(ConfigError::NoWindows(NodeId::new(9)))
        );
        let inverted = SlotWindows::new().with(SlotKind::Listen, SlotWindow::new(ms(5), ms(5)));
        assert_eq!(
            ScheduleConfig::new(NodeId::new(9), ms(1000), inverted),
            Err(ConfigError::EmptyWindow("listen"))
        );
    }

    #[test]
    fn test_slot_layout_relay() {
        // Relay with four children sending in slots 0..4
        let layout = SlotLayout {
            device_id: NodeId::new(28),
            sendto: Some(NodeId::new(33)),
            period: ms(1000),
            slot_size: ms(10),
            listen: Some(0),
            listen_ack: Some(4),
            send: Some(5),
            send_ack: Some(9),
        };
        let schedule = ScheduleConfig::try_from(layout).unwrap();
        assert_eq!(
            schedule.window(SlotKind::Listen),
            Some(SlotWindow::new(ms(0), ms(40)))
        );
        assert_eq!(
            schedule.window(SlotKind::ListenAck),
            Some(SlotWindow::new(ms(40), ms(50)))
        );
        assert_eq!(
            schedule.window(SlotKind::SendAck),
            Some(SlotWindow::new(ms(90), ms(100)))
        );
        assert_eq!(schedule.parent(), Some(NodeId::new(33)));
    }

    #[test]
    fn test_slot_layout_leaf_has_no_listen() {
        let layout = SlotLayout {
            device_id: NodeId::new(6),
            sendto: Some(NodeId::new(28)),
            period: ms(1000),
            slot_size: ms(10),
            listen: None,
            listen_ack: None,
            send: Some(0),
            send_ack: Some(4),
        };
        let schedule = layout.to_schedule().unwrap();
        assert!(schedule.window(SlotKind::Listen).is_none());
        assert!(schedule.window(SlotKind::ListenAck).is_none());
        assert_eq!(schedule.boundaries().len(), 4);
    }

    #[test]
    fn test_percent_layout() {
        let layout = PercentLayout {
            device_id: NodeId::new(15),
            sendto: Some(NodeId::new(1)),
            period: ms(2000),
            listen: Some(10),
            listen_ack: Some(20),
            send: Some(30),
            send_done: Some(35),
            send_ack: Some(40),
        };
        let schedule = layout.to_schedule().unwrap();
        assert_eq!(
            schedule.window(SlotKind::Listen),
            Some(SlotWindow::new(ms(200), ms(400)))
        );
        assert_eq!(
            schedule.window(SlotKind::ListenAck),
            Some(SlotWindow::new(ms(400), ms(420)))
        );
        assert_eq!(
            schedule.window(SlotKind::Send),
            Some(SlotWindow::new(ms(600), ms(700)))
        );
        assert_eq!(
            schedule.window(SlotKind::SendAck),
            Some(SlotWindow::new(ms(800), ms(820)))
        );
    }

    #[test]
    fn test_percent_layout_listen_without_ack() {
        let layout = PercentLayout {
            device_id: NodeId::new(15),
            sendto: None,
            period: ms(1000),
            listen: Some(10),
            listen_ack: None,
            send: None,
            send_done: None,
            send_ack: None,
        };
        assert_eq!(layout.to_schedule(), Err(ConfigError::EmptyWindow("listen")));
    }

    #[test]
    fn test_explicit_layout_partial_pair() {
        let layout = ExplicitLayout {
            device_id: NodeId::new(2),
            period: ms(1000),
            send_start: Some(ms(10)),
            ..Default::default()
        };
        assert_eq!(layout.to_schedule(), Err(ConfigError::EmptyWindow("send")));

        let layout = ExplicitLayout {
            send_stop: Some(ms(20)),
            ..layout
        };
        let schedule = ScheduleConfig::try_from(layout).unwrap();
        assert_eq!(
            schedule.window(SlotKind::Send),
            Some(SlotWindow::new(ms(10), ms(20)))
        );
    }
}
