//! Sensor sampling at the configured data rate

use std::collections::VecDeque;
use std::time::Duration;

use slotmesh_core::{DataRecord, LocalTime, NodeId, Payload, Readings, SeqNo};

/// Source of sensor readings
///
/// `None` means nothing to report this time; the sample slot is skipped.
pub trait SensorSource {
    fn sample(&mut self, now: LocalTime) -> Option<u16>;
}

impl<F> SensorSource for F
where
    F: FnMut(LocalTime) -> Option<u16>,
{
    fn sample(&mut self, now: LocalTime) -> Option<u16> {
        self(now)
    }
}

/// Monotonically increasing readings, wrapping at u16
#[derive(Clone, Debug, Default)]
pub struct CounterSensor {
    next: u16,
}

impl CounterSensor {
    pub fn starting_at(value: u16) -> Self {
        CounterSensor { next: value }
    }
}

impl SensorSource for CounterSensor {
    fn sample(&mut self, _now: LocalTime) -> Option<u16> {
        let value = self.next;
        self.next = self.next.wrapping_add(1);
        Some(value)
    }
}

/// Fixed list of readings, then silence
#[derive(Clone, Debug, Default)]
pub struct ScriptedSensor {
    values: VecDeque<u16>,
}

impl ScriptedSensor {
    pub fn new(values: impl IntoIterator<Item = u16>) -> Self {
        ScriptedSensor {
            values: values.into_iter().collect(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.values.len()
    }
}

impl SensorSource for ScriptedSensor {
    fn sample(&mut self, _now: LocalTime) -> Option<u16> {
        self.values.pop_front()
    }
}

/// How readings are packed into records
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SamplingMode {
    /// One reading per record
    #[default]
    Scalar,
    /// Up to `BULK_SIZE` readings per record
    Bulk,
}

/// Turns sensor readings into sequenced data records
#[derive(Debug)]
pub(crate) struct Sampler {
    source: NodeId,
    mode: SamplingMode,
    interval: Duration,
    next_at: Option<LocalTime>,
    next_seq: SeqNo,
    bulk: Readings,
}

impl Sampler {
    pub(crate) fn new(source: NodeId, mode: SamplingMode, interval: Duration) -> Self {
        Sampler {
            source,
            mode,
            interval,
            next_at: None,
            next_seq: SeqNo::new(1),
            bulk: Readings::new(),
        }
    }

    /// Take every sample due at `now`; completed records go to `out`
    pub(crate) fn poll(
        &mut self,
        now: LocalTime,
        sensor: &mut dyn SensorSource,
        out: &mut Vec<DataRecord>,
    ) -> u64 {
        let mut taken = 0;
        let mut due = *self.next_at.get_or_insert(now);
        while due <= now {
            if let Some(value) = sensor.sample(due) {
                taken += 1;
                match self.mode {
                    SamplingMode::Scalar => out.push(self.record(Payload::Scalar(value))),
                    SamplingMode::Bulk => {
                        self.bulk.push(value);
                        if self.bulk.is_full() {
                            let full = std::mem::take(&mut self.bulk);
                            out.push(self.record(Payload::Bulk(full)));
                        }
                    }
                }
            }
            due = due + self.interval;
        }
        self.next_at = Some(due);
        taken
    }

    /// Partially filled bulk record, if any
    pub(crate) fn flush_partial(&mut self) -> Option<DataRecord> {
        if self.bulk.is_empty() {
            return None;
        }
        let partial = std::mem::take(&mut self.bulk);
        Some(self.record(Payload::Bulk(partial)))
    }

    pub(crate) fn next_at(&self) -> Option<LocalTime> {
        self.next_at
    }

    fn record(&mut self, payload: Payload) -> DataRecord {
        let seq = self.next_seq;
        self.next_seq = seq.next();
        DataRecord::new(self.source, seq, payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmesh_core::BULK_SIZE;

    fn ms(v: u64) -> LocalTime {
        LocalTime::from_millis(v)
    }

    #[test]
    fn test_scalar_sampling_at_rate() {
        let mut sampler = Sampler::new(NodeId::new(3), SamplingMode::Scalar, Duration::from_millis(100));
        let mut sensor = CounterSensor::starting_at(40);
        let mut out = Vec::new();

        assert_eq!(sampler.poll(ms(0), &mut sensor, &mut out), 1);
        assert_eq!(sampler.poll(ms(50), &mut sensor, &mut out), 0);
        // Late poll catches up on every missed sample
        assert_eq!(sampler.poll(ms(320), &mut sensor, &mut out), 3);

        let seqs: Vec<u8> = out.iter().map(|r| r.seq.0).collect();
        assert_eq!(seqs, vec![1, 2, 3, 4]);
        assert_eq!(out[3].payload, Payload::Scalar(43));
        assert_eq!(sampler.next_at(), Some(ms(400)));
    }

    #[test]
    fn test_bulk_sampling_fills_then_flushes_partial() {
        let mut sampler = Sampler::new(NodeId::new(6), SamplingMode::Bulk, Duration::from_millis(10));
        let mut sensor = CounterSensor::default();
        let mut out = Vec::new();

        // BULK_SIZE + 3 samples at t = 0, 10, ..., 140
        sampler.poll(ms(10 * (BULK_SIZE as u64 + 2)), &mut sensor, &mut out);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].payload.len(), BULK_SIZE);

        let partial = sampler.flush_partial().unwrap();
        assert_eq!(partial.payload.values().collect::<Vec<_>>(), vec![12, 13, 14]);
        assert_eq!(partial.seq, SeqNo::new(2));
        assert!(sampler.flush_partial().is_none());
    }

    #[test]
    fn test_scripted_sensor_runs_dry() {
        let mut sampler = Sampler::new(NodeId::new(3), SamplingMode::Scalar, Duration::from_millis(100));
        let mut sensor = ScriptedSensor::new([7, 8]);
        let mut out = Vec::new();
        sampler.poll(ms(1000), &mut sensor, &mut out);
        assert_eq!(out.len(), 2);
        assert_eq!(sensor.remaining(), 0);
    }

    #[test]
    fn test_closure_source() {
        let mut calls: u16 = 0;
        let mut source = |_now: LocalTime| {
            calls += 1;
            Some(calls)
        };
        assert_eq!(source.sample(ms(0)), Some(1));
    }
}
