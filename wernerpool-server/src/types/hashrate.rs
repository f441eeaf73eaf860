//! Hashrate estimation from accepted shares.

use std::fmt;
use std::time::Duration;

/// Hashrate in hashes per second.
#[derive(Debug, Clone, Copy, Default, PartialEq, PartialOrd)]
pub struct HashRate(f64);

impl HashRate {
    pub const ZERO: Self = Self(0.0);

    pub fn from_hashes_per_second(value: f64) -> Self {
        Self(value.max(0.0))
    }

    pub fn as_hashes_per_second(self) -> f64 {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0.0
    }
}

impl fmt::Display for HashRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (scaled, unit) = if self.0 >= 1e15 {
            (self.0 / 1e15, "PH/s")
        } else if self.0 >= 1e12 {
            (self.0 / 1e12, "TH/s")
        } else if self.0 >= 1e9 {
            (self.0 / 1e9, "GH/s")
        } else if self.0 >= 1e6 {
            (self.0 / 1e6, "MH/s")
        } else if self.0 >= 1e3 {
            (self.0 / 1e3, "kH/s")
        } else {
            (self.0, "H/s")
        };
        write!(f, "{:.2} {}", scaled, unit)
    }
}

/// Exponentially smoothed hashrate, fed by accepted shares.
///
/// Each accepted share of difficulty `d` found after `dt` seconds represents
/// an instantaneous rate of `d * 2^32 / dt` hashes per second (a difficulty-d
/// share takes `d * 2^32` hashes on average). Observations outside
/// `(0, 600)` seconds are discarded: a share gap that long says more about
/// the miner reconnecting than about its hashrate.
#[derive(Debug, Clone, Copy, Default)]
pub struct HashrateEma {
    rate: HashRate,
}

/// Weight of a new observation in the moving average.
const SMOOTHING: f64 = 0.2;

/// Observations with a share gap at or above this are ignored.
const MAX_SHARE_GAP: Duration = Duration::from_secs(600);

/// Floor on the share gap, so a burst of near-simultaneous shares cannot
/// produce an absurd instantaneous rate.
const MIN_GAP_SECONDS: f64 = 1e-3;

impl HashrateEma {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one accepted share into the estimate.
    ///
    /// `dt` is the time since the previous accepted share (or since the
    /// connection was established, for the first share).
    pub fn observe(&mut self, share_difficulty: f64, dt: Duration) {
        let seconds = dt.as_secs_f64();
        if seconds <= 0.0 || dt >= MAX_SHARE_GAP {
            return;
        }

        let instant = share_difficulty * 2f64.powi(32) / seconds.max(MIN_GAP_SECONDS);
        let current = self.rate.as_hashes_per_second();
        self.rate = HashRate::from_hashes_per_second(
            (1.0 - SMOOTHING) * current + SMOOTHING * instant,
        );
    }

    pub fn rate(&self) -> HashRate {
        self.rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_observation_is_weighted_in() {
        let mut ema = HashrateEma::new();
        ema.observe(64.0, Duration::from_secs(10));

        let instant = 64.0 * 2f64.powi(32) / 10.0;
        let expected = SMOOTHING * instant;
        assert!((ema.rate().as_hashes_per_second() - expected).abs() < 1.0);
    }

    #[test]
    fn repeated_observations_converge_to_instant_rate() {
        let mut ema = HashrateEma::new();
        let instant = 64.0 * 2f64.powi(32) / 10.0;
        for _ in 0..100 {
            ema.observe(64.0, Duration::from_secs(10));
        }
        let rate = ema.rate().as_hashes_per_second();
        assert!((rate - instant).abs() / instant < 0.001);
    }

    #[test]
    fn out_of_window_gaps_are_ignored() {
        let mut ema = HashrateEma::new();
        ema.observe(64.0, Duration::from_secs(10));
        let before = ema.rate();

        ema.observe(64.0, Duration::ZERO);
        ema.observe(64.0, Duration::from_secs(600));
        ema.observe(64.0, Duration::from_secs(3600));
        assert_eq!(ema.rate(), before);
    }

    #[test]
    fn tiny_gaps_are_clamped() {
        let mut ema = HashrateEma::new();
        ema.observe(1.0, Duration::from_nanos(1));

        let capped = SMOOTHING * 2f64.powi(32) / MIN_GAP_SECONDS;
        assert!(ema.rate().as_hashes_per_second() <= capped + 1.0);
    }

    #[test]
    fn display_scales_units() {
        assert_eq!(
            HashRate::from_hashes_per_second(1.0).to_string(),
            "1.00 H/s"
        );
        assert_eq!(
            HashRate::from_hashes_per_second(500e9).to_string(),
            "500.00 GH/s"
        );
        assert_eq!(
            HashRate::from_hashes_per_second(1.2e12).to_string(),
            "1.20 TH/s"
        );
    }
}
