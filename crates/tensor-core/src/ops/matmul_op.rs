// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Matrix multiplication operation.

use crate::{DType, Shape, Tensor, TensorError};

/// Performs matrix multiplication: `output = lhs @ rhs`.
///
/// `lhs` is `[M, K]`, `rhs` is `[K, N]`, and `output` must be `[M, N]`.
/// All three must be `F32`.
///
/// # Errors
/// Returns [`TensorError::ShapeMismatch`] if dimensions are incompatible.
/// Returns [`TensorError::UnsupportedDType`] if a dtype is not `F32`.
pub fn matmul(lhs: &Tensor, rhs: &Tensor, output: &mut Tensor) -> Result<(), TensorError> {
    for t in [lhs, rhs] {
        if t.dtype() != DType::F32 {
            return Err(TensorError::UnsupportedDType {
                op: "matmul",
                dtype: t.dtype(),
            });
        }
    }

    if !lhs.shape().is_matmul_compatible(rhs.shape()) {
        return Err(TensorError::ShapeMismatch {
            op: "matmul",
            lhs: lhs.shape().clone(),
            rhs: rhs.shape().clone(),
        });
    }

    let (m, k) = (lhs.shape().dims()[0], lhs.shape().dims()[1]);
    let n = rhs.shape().dims()[1];

    let expected_shape = Shape::matrix(m, n);
    if output.shape() != &expected_shape {
        return Err(TensorError::ShapeMismatch {
            op: "matmul (output)",
            lhs: expected_shape,
            rhs: output.shape().clone(),
        });
    }

    let a = lhs.as_f32()?;
    let b = rhs.as_f32()?;
    let c = output.as_f32_mut()?;
    c.iter_mut().for_each(|x| *x = 0.0);

    // ikj order keeps the inner loop a saxpy over a contiguous row of C.
    for i in 0..m {
        let c_row = &mut c[i * n..(i + 1) * n];
        for p in 0..k {
            let a_ip = a[i * k + p];
            let b_row = &b[p * n..(p + 1) * n];
            for (cj, bj) in c_row.iter_mut().zip(b_row) {
                *cj += a_ip * bj;
            }
        }
    }

    Ok(())
}
