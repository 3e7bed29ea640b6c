// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for tensor operations.

use crate::{DType, Shape};

/// Errors that can occur during tensor construction and operations.
#[derive(Debug, thiserror::Error)]
pub enum TensorError {
    /// The number of values does not match the element count of the shape.
    #[error("element count mismatch: shape {shape} needs {expected} values, got {actual}")]
    ElementCountMismatch {
        shape: Shape,
        expected: usize,
        actual: usize,
    },

    /// Two tensors have incompatible shapes for the requested operation.
    #[error("incompatible shapes for {op}: {lhs} vs {rhs}")]
    ShapeMismatch {
        op: &'static str,
        lhs: Shape,
        rhs: Shape,
    },

    /// The requested data type is not supported for this operation.
    #[error("unsupported dtype {dtype} for operation {op}")]
    UnsupportedDType { op: &'static str, dtype: DType },

    /// A device string could not be parsed.
    #[error("invalid device '{0}': expected cpu, cuda[:N] or gpu[:N]")]
    InvalidDevice(String),
}
