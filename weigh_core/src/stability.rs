//! Sliding-window settle detection.

use std::collections::VecDeque;

/// Readings kept in the window.
pub const STABILITY_WINDOW: usize = 10;
/// Most recent readings that must agree.
pub const STABILITY_READINGS_COUNT: usize = 5;
/// Max spread of those readings in grams. Zero means bit-for-bit equal.
pub const STABILITY_THRESHOLD: f64 = 0.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StabilityCfg {
    pub window: usize,
    pub readings: usize,
    pub threshold: f64,
}

impl Default for StabilityCfg {
    fn default() -> Self {
        Self {
            window: STABILITY_WINDOW,
            readings: STABILITY_READINGS_COUNT,
            threshold: STABILITY_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StabilityDetector {
    cfg: StabilityCfg,
    window: VecDeque<f64>,
    stable: bool,
}

impl Default for StabilityDetector {
    fn default() -> Self {
        Self::new(StabilityCfg::default())
    }
}

impl StabilityDetector {
    /// `readings` is clamped to at least 1 and `window` to at least `readings`.
    pub fn new(cfg: StabilityCfg) -> Self {
        let readings = cfg.readings.max(1);
        let cfg = StabilityCfg {
            window: cfg.window.max(readings),
            readings,
            threshold: cfg.threshold,
        };
        Self {
            cfg,
            window: VecDeque::with_capacity(cfg.window),
            stable: false,
        }
    }

    /// Append a reading (evicting the oldest beyond capacity) and recompute
    /// the verdict.
    pub fn update(&mut self, reading: f64) -> bool {
        while self.window.len() >= self.cfg.window {
            self.window.pop_front();
        }
        self.window.push_back(reading);
        self.stable = self.evaluate();
        self.stable
    }

    pub fn reset(&mut self) {
        self.window.clear();
        self.stable = false;
    }

    pub fn is_stable(&self) -> bool {
        self.stable
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    pub fn last(&self) -> Option<f64> {
        self.window.back().copied()
    }

    /// Window contents, oldest first.
    pub fn readings(&self) -> impl Iterator<Item = f64> + '_ {
        self.window.iter().copied()
    }

    pub fn cfg(&self) -> StabilityCfg {
        self.cfg
    }

    fn evaluate(&self) -> bool {
        let n = self.cfg.readings;
        if self.window.len() < n {
            return false;
        }
        let (lo, hi) = self
            .window
            .iter()
            .skip(self.window.len() - n)
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &x| {
                (lo.min(x), hi.max(x))
            });
        hi - lo <= self.cfg.threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn needs_five_readings() {
        let mut d = StabilityDetector::default();
        for _ in 0..4 {
            assert!(!d.update(10.0));
        }
        assert!(d.update(10.0));
    }

    #[test]
    fn one_gram_off_is_not_stable() {
        let mut d = StabilityDetector::default();
        let verdicts: Vec<bool> = [10.0, 10.0, 10.0, 10.0, 11.0]
            .into_iter()
            .map(|r| d.update(r))
            .collect();
        assert_eq!(verdicts.last(), Some(&false));
    }

    #[test]
    fn eleventh_reading_evicts_first() {
        let mut d = StabilityDetector::default();
        for i in 0..11 {
            d.update(f64::from(i));
        }
        assert_eq!(d.len(), STABILITY_WINDOW);
        assert_eq!(d.readings().next(), Some(1.0));
        assert_eq!(d.last(), Some(10.0));
    }

    #[test]
    fn only_the_tail_counts() {
        let mut d = StabilityDetector::default();
        for r in [1.0, 99.0, 5.0, 5.0, 5.0, 5.0, 5.0] {
            d.update(r);
        }
        assert!(d.is_stable());
    }

    #[test]
    fn reset_clears_verdict() {
        let mut d = StabilityDetector::default();
        for _ in 0..5 {
            d.update(3.0);
        }
        assert!(d.is_stable());
        d.reset();
        assert!(!d.is_stable());
        assert!(d.is_empty());
    }

    #[test]
    fn threshold_allows_jitter() {
        let mut d = StabilityDetector::new(StabilityCfg {
            threshold: 0.5,
            ..StabilityCfg::default()
        });
        for r in [10.0, 10.2, 10.4, 10.1, 10.3] {
            d.update(r);
        }
        assert!(d.is_stable());
    }

    #[test]
    fn degenerate_cfg_is_clamped() {
        let d = StabilityDetector::new(StabilityCfg {
            window: 0,
            readings: 0,
            threshold: 0.0,
        });
        assert_eq!(d.cfg().readings, 1);
        assert_eq!(d.cfg().window, 1);
    }
}
