// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Tensor arithmetic operations.
//!
//! Each operation writes into a caller-provided output tensor so that the
//! simulated runtime can reuse activation buffers across iterations.

mod gelu_op;
mod matmul_op;
mod softmax_op;

pub use gelu_op::{gelu, GeluApproximation};
pub use matmul_op::matmul;
pub use softmax_op::softmax;
