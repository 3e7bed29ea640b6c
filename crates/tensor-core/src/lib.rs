// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # tensor-core
//!
//! Host-side tensor types shared by the model-preparation pipeline and the
//! simulated inference runtime.
//!
//! This crate provides:
//! - [`Tensor`] — an n-dimensional tensor with typed storage and a device tag.
//! - [`Shape`] — runtime shape descriptors.
//! - [`DType`] — supported element data types (f32, f16, i64, i8).
//! - [`Device`] — the execution target a tensor is bound to (`cpu`, `cuda:N`, `gpu:N`).
//! - Core operations: matrix multiplication, softmax, GELU (exact and tanh).
//!
//! Tensors never touch real accelerator memory: moving a tensor to a device
//! re-tags it so that backends can check placement before dispatch.

mod device;
mod dtype;
mod error;
mod ops;
mod shape;
mod tensor;

pub use device::Device;
pub use dtype::DType;
pub use error::TensorError;
pub use ops::{gelu, matmul, softmax, GeluApproximation};
pub use shape::Shape;
pub use tensor::{Tensor, TensorData};
