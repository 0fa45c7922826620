//! Chaos links for the radio simulator
//!
//! Each directed link can:
//! - Lose frames (independently or in bursts)
//! - Add jitter on top of the airtime
//! - Duplicate frames

use std::time::Duration;

use rand::distributions::{Distribution, Uniform};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Extra delay on top of the airtime
#[derive(Clone, Debug, PartialEq)]
pub enum JitterDistribution {
    None,
    /// Uniform in `[min_us, max_us]`
    Uniform { min_us: u32, max_us: u32 },
    /// Normal, clamped at zero
    Normal { mean_us: f64, stddev_us: f64 },
}

impl JitterDistribution {
    pub fn sample(&self, rng: &mut StdRng) -> Duration {
        match self {
            JitterDistribution::None => Duration::ZERO,
            JitterDistribution::Uniform { min_us, max_us } => {
                let dist = Uniform::new_inclusive(*min_us, (*max_us).max(*min_us));
                Duration::from_micros(dist.sample(rng) as u64)
            }
            JitterDistribution::Normal { mean_us, stddev_us } => {
                // Box-Muller
                let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
                let u2: f64 = rng.gen();
                let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
                Duration::from_micros((mean_us + stddev_us * z).max(0.0) as u64)
            }
        }
    }
}

/// Impairments of one radio link
#[derive(Clone, Debug, PartialEq)]
pub struct LinkConfig {
    /// Time on air for every frame
    pub airtime: Duration,
    pub jitter: JitterDistribution,
    /// Independent loss probability (0.0 - 1.0)
    pub loss_rate: f64,
    /// Probability that a frame starts a loss burst
    pub burst_loss_prob: f64,
    /// Burst length range, in frames
    pub burst_length: (u32, u32),
    /// Probability of a second copy
    pub duplicate_prob: f64,
    /// Delay of the second copy after the first
    pub duplicate_gap: Duration,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self::perfect()
    }
}

impl LinkConfig {
    /// Fixed airtime, nothing else
    pub fn perfect() -> Self {
        LinkConfig {
            airtime: Duration::from_millis(2),
            jitter: JitterDistribution::None,
            loss_rate: 0.0,
            burst_loss_prob: 0.0,
            burst_length: (1, 1),
            duplicate_prob: 0.0,
            duplicate_gap: Duration::from_millis(1),
        }
    }

    /// Occasional loss and a little jitter
    pub fn noisy() -> Self {
        LinkConfig {
            jitter: JitterDistribution::Uniform {
                min_us: 0,
                max_us: 500,
            },
            loss_rate: 0.05,
            burst_loss_prob: 0.01,
            burst_length: (2, 4),
            duplicate_prob: 0.02,
            ..Self::perfect()
        }
    }

    /// Heavy interference
    pub fn hostile() -> Self {
        LinkConfig {
            jitter: JitterDistribution::Normal {
                mean_us: 500.0,
                stddev_us: 300.0,
            },
            loss_rate: 0.2,
            burst_loss_prob: 0.05,
            burst_length: (3, 8),
            duplicate_prob: 0.1,
            ..Self::perfect()
        }
    }

    pub fn with_loss(mut self, loss_rate: f64) -> Self {
        self.loss_rate = loss_rate;
        self
    }

    pub fn with_duplicates(mut self, duplicate_prob: f64) -> Self {
        self.duplicate_prob = duplicate_prob;
        self
    }
}

/// Link statistics
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LinkStats {
    pub frames_sent: u64,
    pub frames_lost: u64,
    pub frames_duplicated: u64,
}

impl LinkStats {
    pub fn loss_rate(&self) -> f64 {
        if self.frames_sent == 0 {
            0.0
        } else {
            self.frames_lost as f64 / self.frames_sent as f64
        }
    }
}

/// One directed radio link
#[derive(Debug)]
pub struct ChaosLink {
    config: LinkConfig,
    rng: StdRng,
    burst_remaining: u32,
    stats: LinkStats,
}

impl ChaosLink {
    pub fn new(config: LinkConfig, seed: u64) -> Self {
        ChaosLink {
            config,
            rng: StdRng::seed_from_u64(seed),
            burst_remaining: 0,
            stats: LinkStats::default(),
        }
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    /// Put one frame on the link; returns the arrival delay of every copy
    /// that makes it across
    pub fn transmit(&mut self) -> Vec<Duration> {
        self.stats.frames_sent += 1;
        if self.should_drop() {
            self.stats.frames_lost += 1;
            return Vec::new();
        }

        let first = self.config.airtime + self.config.jitter.sample(&mut self.rng);
        let mut arrivals = vec![first];
        if self.config.duplicate_prob > 0.0 && self.rng.gen::<f64>() < self.config.duplicate_prob {
            let gap = self.config.duplicate_gap + self.config.jitter.sample(&mut self.rng);
            arrivals.push(first + gap);
            self.stats.frames_duplicated += 1;
        }
        arrivals
    }

    fn should_drop(&mut self) -> bool {
        if self.burst_remaining > 0 {
            self.burst_remaining -= 1;
            return true;
        }

        if self.config.burst_loss_prob > 0.0 && self.rng.gen::<f64>() < self.config.burst_loss_prob {
            let (min, max) = self.config.burst_length;
            self.burst_remaining = self.rng.gen_range(min..=max.max(min)).saturating_sub(1);
            return true;
        }

        self.config.loss_rate > 0.0 && self.rng.gen::<f64>() < self.config.loss_rate
    }

    pub fn stats(&self) -> &LinkStats {
        &self.stats
    }
}
