// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Gaussian Error Linear Unit (GELU) activation.

use crate::{Tensor, TensorError};

/// Coefficient `sqrt(2/π)`.
const SQRT_2_OVER_PI: f32 = 0.797_884_6;

/// Cubic coefficient in the tanh approximation.
const GELU_COEFF: f32 = 0.044_715;

/// Which GELU formulation to evaluate.
///
/// Graph optimizers may swap the exact form for the tanh form; the two
/// differ by less than `1e-3` over the typical activation range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GeluApproximation {
    /// `0.5 * x * (1 + erf(x / sqrt(2)))`.
    #[default]
    None,
    /// `0.5 * x * (1 + tanh(sqrt(2/π) * (x + 0.044715 * x³)))`.
    Tanh,
}

/// Applies GELU element-wise.
///
/// `input` and `output` must have the same shape and be `F32`.
pub fn gelu(
    input: &Tensor,
    output: &mut Tensor,
    approximation: GeluApproximation,
) -> Result<(), TensorError> {
    if input.shape() != output.shape() {
        return Err(TensorError::ShapeMismatch {
            op: "gelu",
            lhs: input.shape().clone(),
            rhs: output.shape().clone(),
        });
    }

    let src = input.as_f32()?;
    let dst = output.as_f32_mut()?;
    let f: fn(f32) -> f32 = match approximation {
        GeluApproximation::None => gelu_exact,
        GeluApproximation::Tanh => gelu_tanh,
    };
    for (d, &x) in dst.iter_mut().zip(src) {
        *d = f(x);
    }
    Ok(())
}

#[inline(always)]
fn gelu_tanh(x: f32) -> f32 {
    let inner = SQRT_2_OVER_PI * (x + GELU_COEFF * x * x * x);
    0.5 * x * (1.0 + inner.tanh())
}

#[inline(always)]
fn gelu_exact(x: f32) -> f32 {
    0.5 * x * (1.0 + erf(x * std::f32::consts::FRAC_1_SQRT_2))
}

/// Abramowitz–Stegun 7.1.26, absolute error below 1.5e-7.
fn erf(x: f32) -> f32 {
    let sign = x.signum();
    let x = x.abs();
    let t = 1.0 / (1.0 + 0.327_591_1 * x);
    let poly = t
        * (0.254_829_6
            + t * (-0.284_496_74 + t * (1.421_413_7 + t * (-1.453_152_1 + t * 1.061_405_4))));
    sign * (1.0 - poly * (-x * x).exp())
}
