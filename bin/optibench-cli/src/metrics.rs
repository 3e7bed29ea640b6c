// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Inference latency metrics.
//!
//! [`LatencyTracker`] collects one wall-clock duration per timed call;
//! [`LatencyReport`] aggregates them into the figures the `run` command
//! prints and serializes.

use std::time::Duration;

/// Raw per-call latencies of one scenario.
#[derive(Debug, Clone, Default)]
pub struct LatencyTracker {
    samples: Vec<Duration>,
}

impl LatencyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, latency: Duration) {
        self.samples.push(latency);
    }

    /// Aggregates the samples. `units_per_call` is what one call processes
    /// (samples for `forward`, tokens for `generate`).
    pub fn report(&self, units_per_call: usize) -> LatencyReport {
        let count = self.samples.len();
        if count == 0 {
            return LatencyReport::default();
        }

        let mut ms: Vec<f64> = self.samples.iter().map(|d| d.as_secs_f64() * 1000.0).collect();
        ms.sort_by(f64::total_cmp);

        let total_ms: f64 = ms.iter().sum();
        let mean_ms = total_ms / count as f64;
        let variance = ms.iter().map(|v| (v - mean_ms).powi(2)).sum::<f64>() / count as f64;
        let throughput = if total_ms > 0.0 {
            (count * units_per_call) as f64 / (total_ms / 1000.0)
        } else {
            0.0
        };

        LatencyReport {
            count,
            mean_ms,
            stdev_ms: variance.sqrt(),
            p50_ms: percentile(&ms, 50.0),
            p90_ms: percentile(&ms, 90.0),
            p99_ms: percentile(&ms, 99.0),
            throughput,
        }
    }
}

/// Aggregate latency of a timed loop.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct LatencyReport {
    pub count: usize,
    pub mean_ms: f64,
    pub stdev_ms: f64,
    pub p50_ms: f64,
    pub p90_ms: f64,
    pub p99_ms: f64,
    /// Units (samples or tokens) per second.
    pub throughput: f64,
}

impl LatencyReport {
    /// Returns a human-readable summary suitable for CLI output.
    pub fn summary(&self, unit: &str) -> String {
        format!(
            "{} calls: mean {:.3}ms ± {:.3}ms, p50 {:.3}ms, p90 {:.3}ms, p99 {:.3}ms, {:.1} {unit}/s",
            self.count,
            self.mean_ms,
            self.stdev_ms,
            self.p50_ms,
            self.p90_ms,
            self.p99_ms,
            self.throughput,
        )
    }
}

/// Nearest-rank percentile over sorted values.
fn percentile(sorted: &[f64], pct: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = (pct / 100.0 * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_report() {
        let r = LatencyTracker::new().report(1);
        assert_eq!(r.count, 0);
        assert_eq!(r.throughput, 0.0);
    }

    #[test]
    fn test_percentiles_and_mean() {
        let mut t = LatencyTracker::new();
        for ms in 1..=100 {
            t.record(Duration::from_millis(ms));
        }
        let r = t.report(1);
        assert_eq!(r.count, 100);
        assert!((r.mean_ms - 50.5).abs() < 1e-6);
        assert!((r.p50_ms - 50.0).abs() < 1e-6);
        assert!((r.p90_ms - 90.0).abs() < 1e-6);
        assert!((r.p99_ms - 99.0).abs() < 1e-6);
    }

    #[test]
    fn test_throughput_counts_units() {
        let mut t = LatencyTracker::new();
        t.record(Duration::from_millis(500));
        t.record(Duration::from_millis(500));
        let r = t.report(4);
        assert!((r.throughput - 8.0).abs() < 1e-6);
        assert_eq!(r.stdev_ms, 0.0);
    }

    #[test]
    fn test_summary_format() {
        let mut t = LatencyTracker::new();
        t.record(Duration::from_millis(2));
        let s = t.report(1).summary("samples");
        assert!(s.starts_with("1 calls"));
        assert!(s.contains("samples/s"));
    }
}
