//! Sampling data rate
//!
//! The data rate is required configuration with no default. A node without
//! one refuses to start.

use std::time::Duration;

use crate::ConfigError;

/// Environment variable consulted by [`DataRate::from_env`]
pub const DATARATE_ENV: &str = "SLOTMESH_DATARATE";

/// Packets originated per second
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DataRate(u16);

impl DataRate {
    pub fn new(per_second: u16) -> Result<Self, ConfigError> {
        if per_second == 0 {
            return Err(ConfigError::ZeroDataRate);
        }
        Ok(DataRate(per_second))
    }

    /// Read the rate from `SLOTMESH_DATARATE`
    pub fn from_env() -> Result<Self, ConfigError> {
        match std::env::var(DATARATE_ENV) {
            Ok(raw) => Self::parse(&raw),
            Err(_) => Err(ConfigError::MissingDataRate),
        }
    }

    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let value: u16 = raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidDataRateEnv(raw.to_string()))?;
        Self::new(value)
    }

    #[inline]
    pub fn per_second(self) -> u16 {
        self.0
    }

    /// Time between two samples
    #[inline]
    pub fn interval(self) -> Duration {
        Duration::from_micros(1_000_000 / self.0 as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval() {
        assert_eq!(DataRate::new(10).unwrap().interval(), Duration::from_millis(100));
        assert_eq!(DataRate::new(1).unwrap().interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_zero_rejected() {
        assert_eq!(DataRate::new(0), Err(ConfigError::ZeroDataRate));
    }

    #[test]
    fn test_parse() {
        assert_eq!(DataRate::parse(" 25 ").unwrap().per_second(), 25);
        assert!(matches!(
            DataRate::parse("fast"),
            Err(ConfigError::InvalidDataRateEnv(_))
        ));
    }
}
