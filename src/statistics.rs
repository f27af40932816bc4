// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Running mean/variance/min/max accumulator (spec.md §4.3).
//!
//! Uses Welford's algorithm for single-sample updates and Chan's parallel
//! formula to merge two independently accumulated summaries, so that a
//! summary pyramid can be built bottom-up without re-reading raw samples.

/// A finalized statistics tuple as stored in a SUMMARY chunk entry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatsEntry {
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    pub std: f64,
}

/// Running accumulator over a window of real-valued samples.
#[derive(Debug, Clone, Copy)]
pub struct Statistics {
    n: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl Default for Statistics {
    fn default() -> Self {
        Self::new()
    }
}

impl Statistics {
    pub fn new() -> Self {
        Statistics {
            n: 0,
            mean: 0.0,
            m2: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }

    pub fn reset(&mut self) {
        *self = Statistics::new();
    }

    pub fn count(&self) -> u64 {
        self.n
    }

    /// Fold in a single sample.
    pub fn add_sample(&mut self, v: f64) {
        self.n += 1;
        let delta = v - self.mean;
        self.mean += delta / self.n as f64;
        let delta2 = v - self.mean;
        self.m2 += delta * delta2;
        if v < self.min {
            self.min = v;
        }
        if v > self.max {
            self.max = v;
        }
    }

    /// Fold in `k` copies of the same value `v`.
    pub fn add_samples(&mut self, v: f64, k: u64) {
        for _ in 0..k {
            self.add_sample(v);
        }
    }

    /// Fold in a slice of samples.
    pub fn add_slice(&mut self, values: &[f64]) {
        for &v in values {
            self.add_sample(v);
        }
    }

    /// Parallel-combine `other` into `self` using Chan's formula.
    pub fn merge(&mut self, other: &Statistics) {
        if other.n == 0 {
            return;
        }
        if self.n == 0 {
            *self = *other;
            return;
        }
        let n = self.n;
        let n_o = other.n;
        let n_total = n + n_o;
        let delta = other.mean - self.mean;
        let mean = self.mean + delta * (n_o as f64) / (n_total as f64);
        let m2 = self.m2 + other.m2 + delta * delta * (n as f64) * (n_o as f64) / (n_total as f64);
        self.n = n_total;
        self.mean = mean;
        self.m2 = m2;
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }

    /// Build a finalized accumulator directly from a precomputed summary
    /// tuple (used to re-fold a SUMMARY chunk entry into a parent merge
    /// without re-reading raw samples).
    pub fn from_entry(entry: &StatsEntry, count: u64) -> Statistics {
        Statistics {
            n: count,
            mean: entry.mean,
            m2: entry.std * entry.std * count as f64,
            min: entry.min,
            max: entry.max,
        }
    }

    /// Emit the finalized `(mean, min, max, stddev)` tuple.
    pub fn finalize(&self) -> StatsEntry {
        if self.n == 0 {
            return StatsEntry {
                mean: f64::NAN,
                min: f64::NAN,
                max: f64::NAN,
                std: f64::NAN,
            };
        }
        let variance = self.m2 / self.n as f64;
        StatsEntry {
            mean: self.mean,
            min: self.min,
            max: self.max,
            std: variance.sqrt(),
        }
    }

    /// Compute statistics directly over a slice (used by tests as the O(N)
    /// reference, and by the writer to summarize one sub-block).
    pub fn compute(samples: &[f64]) -> Statistics {
        let mut s = Statistics::new();
        s.add_slice(samples);
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_sample() {
        let mut s = Statistics::new();
        s.add_sample(5.0);
        let e = s.finalize();
        assert_eq!(e.mean, 5.0);
        assert_eq!(e.min, 5.0);
        assert_eq!(e.max, 5.0);
        assert_eq!(e.std, 0.0);
    }

    #[test]
    fn matches_direct_computation() {
        let data: Vec<f64> = (0..1000).map(|i| (i as f64 * 0.01).sin()).collect();
        let direct = Statistics::compute(&data);

        let mut incremental = Statistics::new();
        for &v in &data {
            incremental.add_sample(v);
        }

        let a = direct.finalize();
        let b = incremental.finalize();
        assert!((a.mean - b.mean).abs() < 1e-9);
        assert!((a.std - b.std).abs() < 1e-9);
    }

    #[test]
    fn merge_equals_direct() {
        let data: Vec<f64> = (0..937).map(|i| (i as f64 % 17.0) - 8.0).collect();
        let direct = Statistics::compute(&data);

        let (left, right) = data.split_at(400);
        let mut merged = Statistics::compute(left);
        let right_stats = Statistics::compute(right);
        merged.merge(&right_stats);

        let a = direct.finalize();
        let b = merged.finalize();
        assert!((a.mean - b.mean).abs() < 1e-9);
        assert!((a.min - b.min).abs() < 1e-12);
        assert!((a.max - b.max).abs() < 1e-12);
        assert!((a.std - b.std).abs() < 1e-7);
    }

    #[test]
    fn u1_domain_statistics() {
        // 0x6f = 0b01101111 -> six ones, two zeros per byte.
        let bits: Vec<f64> = (0..8)
            .map(|i| (((0x6fu8 >> i) & 1) as f64))
            .collect();
        let s = Statistics::compute(&bits);
        let e = s.finalize();
        assert!((e.mean - 0.75).abs() < 1e-9);
        assert_eq!(e.min, 0.0);
        assert_eq!(e.max, 1.0);
    }
}
