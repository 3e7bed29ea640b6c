// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Activation statistics and range estimation.

use crate::compute::Kernels;
use crate::SimError;
use backends::onnxruntime::{CalibrationMethod, CalibrationRanges};
use backends::{Dataset, InputValue, ModelInputs};
use std::collections::BTreeMap;

pub const HIDDEN_STATES: &str = "hidden_states";

/// Activation values per tensor name, one entry per evaluated row.
pub type Observations = BTreeMap<String, Vec<Vec<f32>>>;

/// Runs at most `limit` rows of `dataset` and records the hidden states and
/// every output.
pub fn observe(kernels: &Kernels, dataset: &Dataset, limit: usize) -> Result<Observations, SimError> {
    if dataset.rows.is_empty() {
        return Err(SimError::EmptyDataset(dataset.name.clone()));
    }
    let mut observed = Observations::new();
    for row in dataset.rows.iter().take(limit.max(1)) {
        let inputs: ModelInputs = row
            .iter()
            .map(|(name, t)| (name.clone(), InputValue::Tensor(t.clone())))
            .collect();
        let activations = kernels.activations(&inputs)?;
        observed
            .entry(HIDDEN_STATES.to_string())
            .or_default()
            .push(activations.hidden.to_f32_vec());
        for (name, tensor) in activations.outputs.iter() {
            observed.entry(name.to_string()).or_default().push(tensor.to_f32_vec());
        }
    }
    Ok(observed)
}

/// Estimates one `(min, max)` range per observed tensor.
pub fn estimate(method: &CalibrationMethod, observed: &Observations) -> CalibrationRanges {
    observed
        .iter()
        .map(|(name, rows)| {
            let range = match *method {
                CalibrationMethod::MinMax {
                    moving_average,
                    averaging_constant,
                } => min_max(rows, moving_average.then_some(averaging_constant as f32)),
                CalibrationMethod::Percentile { percentile, .. } => {
                    symmetric(percentile_abs(rows, percentile as f32))
                }
                CalibrationMethod::Entropy {
                    num_bins,
                    num_quantized_bins,
                } => symmetric(entropy_threshold(rows, num_bins, num_quantized_bins)),
            };
            (name.clone(), range)
        })
        .collect()
}

fn symmetric(threshold: f32) -> (f32, f32) {
    (-threshold, threshold)
}

fn row_range(row: &[f32]) -> (f32, f32) {
    row.iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)))
}

/// Global extremes, or an exponential moving average of per-row extremes.
fn min_max(rows: &[Vec<f32>], averaging_constant: Option<f32>) -> (f32, f32) {
    let mut ranges = rows.iter().filter(|r| !r.is_empty()).map(|r| row_range(r));
    let Some(first) = ranges.next() else {
        return (0.0, 0.0);
    };
    ranges.fold(first, |(lo, hi), (rlo, rhi)| match averaging_constant {
        Some(c) => (lo + c * (rlo - lo), hi + c * (rhi - hi)),
        None => (lo.min(rlo), hi.max(rhi)),
    })
}

fn magnitudes(rows: &[Vec<f32>]) -> Vec<f32> {
    let mut values: Vec<f32> = rows.iter().flatten().map(|v| v.abs()).collect();
    values.sort_by(f32::total_cmp);
    values
}

/// The `percentile`-th percentile of `|x|`.
fn percentile_abs(rows: &[Vec<f32>], percentile: f32) -> f32 {
    let values = magnitudes(rows);
    if values.is_empty() {
        return 0.0;
    }
    let rank = (percentile.clamp(0.0, 100.0) / 100.0 * (values.len() - 1) as f32).round() as usize;
    values[rank.min(values.len() - 1)]
}

/// Clipping threshold minimizing the KL divergence between the `|x|`
/// histogram and its `num_quantized_bins`-level quantization.
fn entropy_threshold(rows: &[Vec<f32>], num_bins: usize, num_quantized_bins: usize) -> f32 {
    let values = magnitudes(rows);
    let max = values.last().copied().unwrap_or(0.0);
    if max == 0.0 || num_bins == 0 {
        return max;
    }
    let num_quantized_bins = num_quantized_bins.clamp(1, num_bins);
    let width = max / num_bins as f32;
    let mut histogram = vec![0.0f64; num_bins];
    for v in &values {
        let bin = ((v / width) as usize).min(num_bins - 1);
        histogram[bin] += 1.0;
    }

    let mut best = (f64::INFINITY, num_bins);
    for i in num_quantized_bins..=num_bins {
        let mut reference = histogram[..i].to_vec();
        let outliers: f64 = histogram[i..].iter().sum();
        reference[i - 1] += outliers;

        // Merge into `num_quantized_bins` buckets, then spread each bucket
        // uniformly over its non-empty source bins.
        let mut candidate = vec![0.0f64; i];
        let step = i as f64 / num_quantized_bins as f64;
        for q in 0..num_quantized_bins {
            let start = (q as f64 * step).floor() as usize;
            let end = (((q + 1) as f64 * step).floor() as usize).clamp(start + 1, i);
            let mass: f64 = histogram[start..end].iter().sum();
            let nonzero = histogram[start..end].iter().filter(|&&c| c > 0.0).count();
            if nonzero > 0 {
                for b in start..end {
                    if histogram[b] > 0.0 {
                        candidate[b] = mass / nonzero as f64;
                    }
                }
            }
        }

        let divergence = kl_divergence(&reference, &candidate);
        if divergence < best.0 {
            best = (divergence, i);
        }
    }
    best.1 as f32 * width
}

fn kl_divergence(p: &[f64], q: &[f64]) -> f64 {
    let (p_sum, q_sum): (f64, f64) = (p.iter().sum(), q.iter().sum());
    if p_sum == 0.0 || q_sum == 0.0 {
        return f64::INFINITY;
    }
    p.iter()
        .zip(q)
        .filter(|(pi, _)| **pi > 0.0)
        .map(|(&pi, &qi)| {
            let (pi, qi) = (pi / p_sum, (qi / q_sum).max(1e-12));
            pi * (pi / qi).ln()
        })
        .sum()
}
