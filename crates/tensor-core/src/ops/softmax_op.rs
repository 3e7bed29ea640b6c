// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Softmax activation operation.

use crate::{Tensor, TensorError};

/// Computes softmax along the last dimension, subtracting the row maximum
/// before exponentiation.
///
/// `input` and `output` must have the same shape and be `F32`.
pub fn softmax(input: &Tensor, output: &mut Tensor) -> Result<(), TensorError> {
    if input.shape() != output.shape() {
        return Err(TensorError::ShapeMismatch {
            op: "softmax",
            lhs: input.shape().clone(),
            rhs: output.shape().clone(),
        });
    }

    let src = input.as_f32()?;
    let dst = output.as_f32_mut()?;

    let last_dim = input.shape().last_dim().unwrap_or(1);
    if last_dim == 0 {
        return Ok(());
    }

    for (row_src, row_dst) in src.chunks(last_dim).zip(dst.chunks_mut(last_dim)) {
        let max_val = row_src.iter().copied().fold(f32::NEG_INFINITY, f32::max);

        let mut sum = 0.0f32;
        for (d, &s) in row_dst.iter_mut().zip(row_src) {
            let e = (s - max_val).exp();
            *d = e;
            sum += e;
        }

        if sum > 0.0 {
            let inv_sum = 1.0 / sum;
            row_dst.iter_mut().for_each(|d| *d *= inv_sum);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DType, Shape};

    fn approx_eq(a: &[f32], b: &[f32], tol: f32) -> bool {
        a.len() == b.len() && a.iter().zip(b).all(|(x, y)| (x - y).abs() < tol)
    }

    #[test]
    fn test_softmax_uniform() {
        let input = Tensor::from_f32(Shape::vector(4), vec![1.0; 4]).unwrap();
        let mut output = Tensor::zeros(Shape::vector(4), DType::F32);

        softmax(&input, &mut output).unwrap();

        assert!(approx_eq(output.as_f32().unwrap(), &[0.25; 4], 1e-5));
    }

    #[test]
    fn test_softmax_rows_are_independent() {
        let input =
            Tensor::from_f32(Shape::matrix(2, 3), vec![1.0, 2.0, 3.0, 1.0, 1.0, 1.0]).unwrap();
        let mut output = Tensor::zeros(Shape::matrix(2, 3), DType::F32);

        softmax(&input, &mut output).unwrap();

        let r = output.as_f32().unwrap();
        let sum0: f32 = r[0..3].iter().sum();
        assert!((sum0 - 1.0).abs() < 1e-5);
        assert!(r[0] < r[1] && r[1] < r[2]);
        assert!(approx_eq(&r[3..6], &[1.0 / 3.0; 3], 1e-5));
    }

    #[test]
    fn test_softmax_numerical_stability() {
        let input = Tensor::from_f32(Shape::vector(3), vec![1000.0, 1001.0, 1002.0]).unwrap();
        let mut output = Tensor::zeros(Shape::vector(3), DType::F32);

        softmax(&input, &mut output).unwrap();

        let r = output.as_f32().unwrap();
        assert!((r.iter().sum::<f32>() - 1.0).abs() < 1e-5);
        assert!(r.iter().all(|x| x.is_finite()));
    }

    #[test]
    fn test_softmax_shape_mismatch() {
        let input = Tensor::zeros(Shape::vector(3), DType::F32);
        let mut output = Tensor::zeros(Shape::vector(4), DType::F32);
        assert!(softmax(&input, &mut output).is_err());
    }
}
