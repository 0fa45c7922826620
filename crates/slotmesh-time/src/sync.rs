//! Time synchronizer - keeps the local period phase aligned with the network
//!
//! A sync record says "the current period ends `remaining` from now". The
//! synchronizer turns that into a target [`PhaseAnchor`] and slews the local
//! anchor toward it:
//! - the first fix sets the anchor directly
//! - later fixes move the anchor by at most `max_slew_step` per advancing tick
//! - the period itself never changes, only the phase
//!
//! Tags order rounds. An older tag is stale; a newer tag opens a fresh
//! reconcile window; inside that window the same tag with a smaller
//! `remaining` replaces the current target (it travelled a shorter path).

use std::time::Duration;

use slotmesh_core::{LocalTime, PhaseAnchor, SyncRecord, SyncTag};
use tracing::{debug, info, trace};

/// Sync message variant in use on the network
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum SyncVariant {
    /// Tag, remaining time and echo budget
    #[default]
    Tagged,
    /// No payload; the reception instant is the signal
    Bare,
}

/// Synchronizer configuration
#[derive(Clone, Debug)]
pub struct SyncConfig {
    pub variant: SyncVariant,
    /// This node originates timing and ignores everyone else's
    pub timing_root: bool,
    /// Without a fix after this long, the node anchors on its own clock
    pub init_timeout: Duration,
    /// How often a root originates a fresh tag
    pub broadcast_interval: Duration,
    /// Records of one tag arriving within this window are reconciled
    pub reconcile_window: Duration,
    /// Largest anchor move per advancing tick
    pub max_slew_step: Duration,
    /// Echo budget given to originated records
    pub ttl: u8,
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            variant: SyncVariant::Tagged,
            timing_root: false,
            init_timeout: Duration::from_secs(5),
            broadcast_interval: Duration::from_secs(1),
            reconcile_window: Duration::from_millis(100),
            max_slew_step: Duration::from_micros(500),
            ttl: 4,
        }
    }
}

impl SyncConfig {
    /// Configuration for the timing root (usually the sink)
    pub fn root() -> Self {
        SyncConfig {
            timing_root: true,
            ..Default::default()
        }
    }

    /// Bare marker variant: no tags, every fix is passed on once
    pub fn bare() -> Self {
        SyncConfig {
            variant: SyncVariant::Bare,
            ..Default::default()
        }
    }
}

/// What a sync input did to the anchor
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncEvent {
    /// First fix: anchor set directly
    FirstFix,
    /// No fix before the init timeout (or this is the root): anchored locally
    SelfAnchored,
    /// A new slew target was accepted
    Retargeted,
    /// Nothing changed (duplicate, larger remaining, open marker window, root)
    Ignored,
    /// Older tag, or the same tag after its window closed
    Stale,
}

/// Counters for sync handling
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SyncStats {
    pub fixes: u64,
    pub retargets: u64,
    pub ignored: u64,
    pub stale: u64,
    pub originated: u64,
    pub echoed: u64,
}

/// Last accepted round
#[derive(Clone, Copy, Debug)]
struct Accepted {
    tag: Option<SyncTag>,
    remaining: Duration,
    ttl: u8,
    window_start: LocalTime,
}

/// Time synchronizer for one node
pub struct TimeSynchronizer {
    config: SyncConfig,
    period: Duration,
    /// First instant the synchronizer saw, for the init timeout
    started: Option<LocalTime>,
    anchor: Option<PhaseAnchor>,
    /// Where the anchor is slewing to
    target: Option<PhaseAnchor>,
    accepted: Option<Accepted>,
    echo_pending: bool,
    next_origin: Option<LocalTime>,
    next_tag: SyncTag,
    last_tick: Option<LocalTime>,
    stats: SyncStats,
}

impl TimeSynchronizer {
    pub fn new(config: SyncConfig, period: Duration) -> Self {
        TimeSynchronizer {
            config,
            period,
            started: None,
            anchor: None,
            target: None,
            accepted: None,
            echo_pending: false,
            next_origin: None,
            next_tag: SyncTag::new(1),
            last_tick: None,
            stats: SyncStats::default(),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Current anchor, `None` until the first fix or self-anchor
    pub fn anchor(&self) -> Option<PhaseAnchor> {
        self.anchor
    }

    /// Anchor being slewed toward, if a correction is in progress
    pub fn target(&self) -> Option<PhaseAnchor> {
        self.target
    }

    pub fn is_synchronized(&self) -> bool {
        self.anchor.is_some()
    }

    pub fn stats(&self) -> &SyncStats {
        &self.stats
    }

    /// Reconcile a received sync record
    pub fn on_sync_received(&mut self, record: &SyncRecord, now: LocalTime) -> SyncEvent {
        self.started.get_or_insert(now);

        if self.config.timing_root {
            self.stats.ignored += 1;
            return SyncEvent::Ignored;
        }

        let window = self.config.reconcile_window;
        let window_open = |acc: &Accepted| now < acc.window_start + window;

        let event = match (record.tag, self.accepted) {
            (_, None) => self.accept(record, now, now),
            (Some(tag), Some(acc)) => match acc.tag {
                Some(cur) if tag == cur => {
                    if !window_open(&acc) {
                        SyncEvent::Stale
                    } else if record.remaining < acc.remaining {
                        self.accept(record, now, acc.window_start)
                    } else {
                        SyncEvent::Ignored
                    }
                }
                Some(cur) if !tag.is_newer_than(cur) => SyncEvent::Stale,
                _ => self.accept(record, now, now),
            },
            (None, Some(acc)) => {
                if window_open(&acc) {
                    SyncEvent::Ignored
                } else {
                    self.accept(record, now, now)
                }
            }
        };

        match event {
            SyncEvent::Stale => {
                self.stats.stale += 1;
                trace!(tag = ?record.tag, "stale sync discarded");
            }
            SyncEvent::Ignored => self.stats.ignored += 1,
            _ => {}
        }
        event
    }

    fn accept(&mut self, record: &SyncRecord, now: LocalTime, window_start: LocalTime) -> SyncEvent {
        let fix = PhaseAnchor::after(now, record.remaining);
        self.accepted = Some(Accepted {
            tag: record.tag,
            remaining: record.remaining,
            ttl: record.ttl,
            window_start,
        });
        // Markers carry no budget: each accepted one is passed on once
        self.echo_pending = record.tag.is_none() || record.ttl > 0;

        match self.anchor {
            None => {
                self.anchor = Some(fix);
                self.target = None;
                self.stats.fixes += 1;
                info!(anchor = ?fix, tag = ?record.tag, "first sync fix");
                SyncEvent::FirstFix
            }
            Some(anchor) => {
                // Nearest equivalent anchor: never slew more than half a period
                let target = anchor.shifted(anchor.phase_error_to(fix, self.period));
                self.target = (target != anchor).then_some(target);
                self.stats.retargets += 1;
                debug!(error_us = target.as_micros() - anchor.as_micros(), "sync target updated");
                SyncEvent::Retargeted
            }
        }
    }

    /// Advance time: handle the init timeout and slew toward the target
    ///
    /// Slewing happens only when `now` moved forward since the last tick, so
    /// repeated ticks at the same instant change nothing.
    pub fn tick(&mut self, now: LocalTime) -> Option<SyncEvent> {
        let started = *self.started.get_or_insert(now);
        let advancing = self.last_tick.map_or(true, |last| now > last);
        if advancing {
            self.last_tick = Some(now);
        }

        let Some(anchor) = self.anchor else {
            if self.config.timing_root || now.since(started) >= self.config.init_timeout {
                let anchor = PhaseAnchor::at(now);
                self.anchor = Some(anchor);
                info!(anchor = ?anchor, root = self.config.timing_root, "anchored on local clock");
                return Some(SyncEvent::SelfAnchored);
            }
            return None;
        };

        if !advancing {
            return None;
        }
        if let Some(target) = self.target {
            let error = anchor.phase_error_to(target, self.period);
            let max_step = self.config.max_slew_step.as_micros() as i64;
            let step = error.clamp(-max_step, max_step);
            self.anchor = Some(anchor.shifted(step));
            if step == error {
                self.target = None;
            }
        }
        None
    }

    /// Sync record to transmit now, if any
    ///
    /// Roots originate a fresh tag once per `broadcast_interval`; other
    /// synchronized nodes echo the last accepted tag once with one less ttl,
    /// or the last accepted marker once as a fresh marker.
    pub fn tick_for_broadcast(&mut self, now: LocalTime) -> Option<SyncRecord> {
        let anchor = self.anchor?;
        let remaining = anchor.remaining(now, self.period);

        if self.config.timing_root {
            if self.next_origin.is_some_and(|at| now < at) {
                return None;
            }
            self.next_origin = Some(now + self.config.broadcast_interval);
            self.stats.originated += 1;
            return Some(match self.config.variant {
                SyncVariant::Tagged => {
                    let tag = self.next_tag;
                    self.next_tag = tag.next();
                    SyncRecord::tagged(tag, remaining, self.config.ttl)
                }
                SyncVariant::Bare => SyncRecord::marker(remaining),
            });
        }

        if !self.echo_pending {
            return None;
        }
        self.echo_pending = false;
        let acc = self.accepted?;
        self.stats.echoed += 1;
        Some(match acc.tag {
            Some(tag) => SyncRecord::tagged(tag, remaining, acc.ttl.saturating_sub(1)),
            None => SyncRecord::marker(remaining),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const PERIOD: Duration = Duration::from_millis(1000);

    fn ms(v: u64) -> LocalTime {
        LocalTime::from_millis(v)
    }

    fn tagged(tag: u16, remaining_ms: u64) -> SyncRecord {
        SyncRecord::tagged(SyncTag::new(tag), Duration::from_millis(remaining_ms), 3)
    }

    #[test]
    fn test_first_fix_sets_anchor() {
        let mut sync = TimeSynchronizer::new(SyncConfig::default(), PERIOD);
        assert!(!sync.is_synchronized());

        let event = sync.on_sync_received(&tagged(1, 300), ms(100));
        assert_eq!(event, SyncEvent::FirstFix);
        assert_eq!(sync.anchor(), Some(PhaseAnchor::at(ms(400))));
    }

    #[test]
    fn test_smallest_remaining_wins() {
        let mut sync = TimeSynchronizer::new(SyncConfig::default(), PERIOD);
        sync.on_sync_received(&tagged(7, 50), ms(1000));
        let event = sync.on_sync_received(&tagged(7, 10), ms(1000));
        assert_eq!(event, SyncEvent::Retargeted);
        assert_eq!(sync.target(), Some(PhaseAnchor::at(ms(1010))));

        // Larger remaining for the same round changes nothing
        assert_eq!(sync.on_sync_received(&tagged(7, 30), ms(1000)), SyncEvent::Ignored);
        assert_eq!(sync.target(), Some(PhaseAnchor::at(ms(1010))));
    }

    #[test]
    fn test_repeated_record_is_idempotent() {
        let mut sync = TimeSynchronizer::new(SyncConfig::default(), PERIOD);
        let record = tagged(2, 200);
        sync.on_sync_received(&record, ms(500));
        let anchor = sync.anchor();

        for _ in 0..5 {
            sync.on_sync_received(&record, ms(500));
            sync.tick(ms(500));
        }
        assert_eq!(sync.anchor(), anchor);
        assert_eq!(sync.target(), None);
    }

    #[test]
    fn test_stale_tags() {
        let mut sync = TimeSynchronizer::new(SyncConfig::default(), PERIOD);
        sync.on_sync_received(&tagged(10, 200), ms(0));
        assert_eq!(sync.on_sync_received(&tagged(9, 100), ms(10)), SyncEvent::Stale);

        // Same tag after its window closed
        assert_eq!(sync.on_sync_received(&tagged(10, 100), ms(500)), SyncEvent::Stale);
        assert_eq!(sync.stats().stale, 2);

        // Wrapped tag is newer
        let mut sync = TimeSynchronizer::new(SyncConfig::default(), PERIOD);
        sync.on_sync_received(&tagged(65535, 200), ms(0));
        assert_eq!(sync.on_sync_received(&tagged(0, 200), ms(10)), SyncEvent::Retargeted);
    }

    #[test]
    fn test_slew_is_limited_and_needs_time_to_advance() {
        let config = SyncConfig {
            max_slew_step: Duration::from_millis(1),
            ..Default::default()
        };
        let mut sync = TimeSynchronizer::new(config, PERIOD);
        sync.on_sync_received(&tagged(1, 1000), ms(0));
        assert_eq!(sync.anchor(), Some(PhaseAnchor::at(ms(1000))));

        // Network says the boundary is 5ms later than we think
        sync.on_sync_received(&tagged(2, 1005), ms(0));
        sync.tick(ms(1));
        assert_eq!(sync.anchor(), Some(PhaseAnchor::at(ms(1001))));
        sync.tick(ms(1));
        assert_eq!(sync.anchor(), Some(PhaseAnchor::at(ms(1001))));

        for t in 2..10 {
            sync.tick(ms(t));
        }
        assert_eq!(sync.anchor(), Some(PhaseAnchor::at(ms(1005))));
        assert_eq!(sync.target(), None);
    }

    #[test]
    fn test_correction_wraps_to_nearest_anchor() {
        let mut sync = TimeSynchronizer::new(SyncConfig::default(), PERIOD);
        sync.on_sync_received(&tagged(1, 10), ms(0));
        // 995ms remaining puts the boundary 15ms earlier, not 985ms later
        sync.on_sync_received(&tagged(2, 995), ms(0));
        assert_eq!(sync.target(), Some(PhaseAnchor::from_micros(-5_000)));
    }

    #[test]
    fn test_init_timeout_self_anchors() {
        let mut sync = TimeSynchronizer::new(SyncConfig::default(), PERIOD);
        assert_eq!(sync.tick(ms(0)), None);
        assert_eq!(sync.tick(ms(4999)), None);
        assert_eq!(sync.tick(ms(5000)), Some(SyncEvent::SelfAnchored));
        assert_eq!(sync.anchor(), Some(PhaseAnchor::at(ms(5000))));

        // A later fix is a correction, not a first fix
        assert_eq!(sync.on_sync_received(&tagged(1, 10), ms(5100)), SyncEvent::Retargeted);
    }

    #[test]
    fn test_root_originates_and_ignores() {
        let mut root = TimeSynchronizer::new(SyncConfig::root(), PERIOD);
        assert_eq!(root.tick(ms(0)), Some(SyncEvent::SelfAnchored));
        assert_eq!(root.on_sync_received(&tagged(99, 10), ms(1)), SyncEvent::Ignored);

        let first = root.tick_for_broadcast(ms(250)).unwrap();
        assert_eq!(first.tag, Some(SyncTag::new(1)));
        assert_eq!(first.remaining, Duration::from_millis(750));
        assert_eq!(first.ttl, 4);

        assert!(root.tick_for_broadcast(ms(600)).is_none());
        let second = root.tick_for_broadcast(ms(1250)).unwrap();
        assert_eq!(second.tag, Some(SyncTag::new(2)));
    }

    #[test]
    fn test_echo_once_with_reduced_ttl() {
        let mut sync = TimeSynchronizer::new(SyncConfig::default(), PERIOD);
        assert!(sync.tick_for_broadcast(ms(0)).is_none());

        sync.on_sync_received(&tagged(5, 600), ms(100));
        let echo = sync.tick_for_broadcast(ms(200)).unwrap();
        assert_eq!(echo.tag, Some(SyncTag::new(5)));
        assert_eq!(echo.ttl, 2);
        assert_eq!(echo.remaining, Duration::from_millis(500));
        assert!(sync.tick_for_broadcast(ms(300)).is_none());

        // Exhausted budget is not echoed
        sync.on_sync_received(&SyncRecord::tagged(SyncTag::new(6), Duration::from_millis(300), 0), ms(400));
        assert!(sync.tick_for_broadcast(ms(450)).is_none());
    }

    #[test]
    fn test_bare_markers_use_window() {
        let mut sync = TimeSynchronizer::new(SyncConfig::bare(), PERIOD);
        let marker = SyncRecord::marker(Duration::from_millis(900));
        assert_eq!(sync.on_sync_received(&marker, ms(100)), SyncEvent::FirstFix);
        assert_eq!(sync.on_sync_received(&marker, ms(150)), SyncEvent::Ignored);
        assert_eq!(sync.on_sync_received(&marker, ms(1100)), SyncEvent::Retargeted);
    }

    #[test]
    fn test_bare_marker_passed_on_once_per_fix() {
        let mut relay = TimeSynchronizer::new(SyncConfig::bare(), PERIOD);
        assert!(relay.tick_for_broadcast(ms(0)).is_none());

        relay.on_sync_received(&SyncRecord::marker(Duration::from_millis(970)), ms(30));
        let echo = relay.tick_for_broadcast(ms(1010)).unwrap();
        assert_eq!(echo.tag, None);
        assert_eq!(echo.remaining, Duration::from_millis(990));
        assert!(relay.tick_for_broadcast(ms(2010)).is_none());

        // Next period's marker earns exactly one more
        relay.on_sync_received(&SyncRecord::marker(Duration::from_millis(970)), ms(1030));
        assert!(relay.tick_for_broadcast(ms(2010)).is_some());
        assert!(relay.tick_for_broadcast(ms(3010)).is_none());
        assert_eq!(relay.stats().echoed, 2);

        // Markers inside the window are ignored and earn nothing
        relay.on_sync_received(&SyncRecord::marker(Duration::from_millis(970)), ms(1050));
        assert!(relay.tick_for_broadcast(ms(3010)).is_none());
    }

    proptest! {
        #[test]
        fn prop_repeated_record_keeps_anchor(
            tag in any::<u16>(),
            remaining_ms in 1u64..1000,
            at_ms in 0u64..10_000,
            repeats in 1usize..20,
        ) {
            let mut sync = TimeSynchronizer::new(SyncConfig::default(), PERIOD);
            let record = tagged(tag, remaining_ms);
            sync.on_sync_received(&record, ms(at_ms));
            let anchor = sync.anchor();

            for _ in 0..repeats {
                sync.on_sync_received(&record, ms(at_ms));
                sync.tick(ms(at_ms));
            }
            prop_assert_eq!(sync.anchor(), anchor);
            prop_assert_eq!(sync.target(), None);
        }

        #[test]
        fn prop_slew_bounded_per_tick(
            first_ms in 1u64..1000,
            second_ms in 1u64..1000,
            step_us in 1u64..5_000,
            ticks in 1u64..200,
        ) {
            let config = SyncConfig {
                max_slew_step: Duration::from_micros(step_us),
                ..Default::default()
            };
            let mut sync = TimeSynchronizer::new(config, PERIOD);
            sync.on_sync_received(&tagged(1, first_ms), ms(0));
            sync.on_sync_received(&tagged(2, second_ms), ms(0));
            let target = sync.target();

            for t in 1..=ticks {
                let before = sync.anchor().unwrap();
                sync.tick(ms(t));
                let after = sync.anchor().unwrap();
                prop_assert!((after.as_micros() - before.as_micros()).abs() <= step_us as i64);
                if let Some(target) = target {
                    let gap_before = before.phase_error_to(target, PERIOD).abs();
                    let gap_after = after.phase_error_to(target, PERIOD).abs();
                    prop_assert!(gap_after <= gap_before);
                }
            }
        }
    }
}
