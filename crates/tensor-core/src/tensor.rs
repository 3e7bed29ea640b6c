// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Core tensor type.

use crate::{DType, Device, Shape, TensorError};
use half::f16;

/// Typed element storage of a [`Tensor`], row-major.
#[derive(Debug, Clone, PartialEq)]
pub enum TensorData {
    F32(Vec<f32>),
    F16(Vec<f16>),
    I64(Vec<i64>),
    I8(Vec<i8>),
}

impl TensorData {
    fn len(&self) -> usize {
        match self {
            TensorData::F32(v) => v.len(),
            TensorData::F16(v) => v.len(),
            TensorData::I64(v) => v.len(),
            TensorData::I8(v) => v.len(),
        }
    }

    fn dtype(&self) -> DType {
        match self {
            TensorData::F32(_) => DType::F32,
            TensorData::F16(_) => DType::F16,
            TensorData::I64(_) => DType::I64,
            TensorData::I8(_) => DType::I8,
        }
    }
}

/// An owned, n-dimensional tensor bound to a [`Device`].
///
/// `Tensor` is the data carrier between input generators, the inference
/// facade and loaded models. Moving a tensor between devices is a re-tag:
/// the storage always lives on the host.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    shape: Shape,
    device: Device,
    data: TensorData,
}

impl Tensor {
    /// Creates a tensor from typed storage, checking the element count.
    pub fn new(shape: Shape, data: TensorData) -> Result<Self, TensorError> {
        let expected = shape.num_elements();
        if data.len() != expected {
            return Err(TensorError::ElementCountMismatch {
                shape,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            shape,
            device: Device::Cpu,
            data,
        })
    }

    /// Creates a new tensor filled with zeros.
    ///
    /// # Examples
    /// ```
    /// use tensor_core::{Tensor, Shape, DType};
    /// let t = Tensor::zeros(Shape::matrix(2, 3), DType::I64);
    /// assert_eq!(t.size_bytes(), 48);
    /// ```
    pub fn zeros(shape: Shape, dtype: DType) -> Self {
        let n = shape.num_elements();
        let data = match dtype {
            DType::F32 => TensorData::F32(vec![0.0; n]),
            DType::F16 => TensorData::F16(vec![f16::ZERO; n]),
            DType::I64 => TensorData::I64(vec![0; n]),
            DType::I8 => TensorData::I8(vec![0; n]),
        };
        Self {
            shape,
            device: Device::Cpu,
            data,
        }
    }

    /// Creates an `I64` tensor where every element is `value`.
    pub fn full_i64(shape: Shape, value: i64) -> Self {
        let n = shape.num_elements();
        Self {
            shape,
            device: Device::Cpu,
            data: TensorData::I64(vec![value; n]),
        }
    }

    /// Creates an `F32` tensor.
    ///
    /// # Examples
    /// ```
    /// use tensor_core::{Tensor, Shape};
    /// let t = Tensor::from_f32(Shape::vector(3), vec![1.0, 2.0, 3.0]).unwrap();
    /// assert_eq!(t.as_f32().unwrap(), &[1.0, 2.0, 3.0]);
    /// ```
    pub fn from_f32(shape: Shape, values: Vec<f32>) -> Result<Self, TensorError> {
        Self::new(shape, TensorData::F32(values))
    }

    /// Creates an `I64` tensor.
    pub fn from_i64(shape: Shape, values: Vec<i64>) -> Result<Self, TensorError> {
        Self::new(shape, TensorData::I64(values))
    }

    /// Creates an `I8` tensor.
    pub fn from_i8(shape: Shape, values: Vec<i8>) -> Result<Self, TensorError> {
        Self::new(shape, TensorData::I8(values))
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn dtype(&self) -> DType {
        self.data.dtype()
    }

    pub fn device(&self) -> Device {
        self.device
    }

    pub fn data(&self) -> &TensorData {
        &self.data
    }

    /// Returns the memory footprint of this tensor in bytes.
    pub fn size_bytes(&self) -> usize {
        self.shape.size_bytes(self.dtype())
    }

    /// Returns a copy of this tensor bound to `device`.
    pub fn to_device(&self, device: Device) -> Tensor {
        let mut moved = self.clone();
        moved.device = device;
        moved
    }

    /// Re-tags this tensor in place-by-value.
    pub fn with_device(mut self, device: Device) -> Tensor {
        self.device = device;
        self
    }

    /// Returns the same storage under a new shape with the same element count.
    pub fn reshape(self, shape: Shape) -> Result<Tensor, TensorError> {
        if shape.num_elements() != self.shape.num_elements() {
            return Err(TensorError::ShapeMismatch {
                op: "reshape",
                lhs: self.shape,
                rhs: shape,
            });
        }
        Ok(Tensor { shape, ..self })
    }

    /// Borrows the elements of an `F32` tensor.
    pub fn as_f32(&self) -> Result<&[f32], TensorError> {
        match &self.data {
            TensorData::F32(v) => Ok(v),
            other => Err(TensorError::UnsupportedDType {
                op: "as_f32",
                dtype: other.dtype(),
            }),
        }
    }

    /// Borrows the elements of an `I64` tensor.
    pub fn as_i64(&self) -> Result<&[i64], TensorError> {
        match &self.data {
            TensorData::I64(v) => Ok(v),
            other => Err(TensorError::UnsupportedDType {
                op: "as_i64",
                dtype: other.dtype(),
            }),
        }
    }

    /// Mutably borrows the elements of an `F32` tensor.
    pub fn as_f32_mut(&mut self) -> Result<&mut [f32], TensorError> {
        match &mut self.data {
            TensorData::F32(v) => Ok(v),
            other => Err(TensorError::UnsupportedDType {
                op: "as_f32_mut",
                dtype: other.dtype(),
            }),
        }
    }

    /// Returns the elements widened to `f32`, whatever the storage type.
    pub fn to_f32_vec(&self) -> Vec<f32> {
        match &self.data {
            TensorData::F32(v) => v.clone(),
            TensorData::F16(v) => v.iter().map(|x| x.to_f32()).collect(),
            TensorData::I64(v) => v.iter().map(|&x| x as f32).collect(),
            TensorData::I8(v) => v.iter().map(|&x| f32::from(x)).collect(),
        }
    }

    /// Converts a float tensor to `F16` storage.
    pub fn to_f16(&self) -> Result<Tensor, TensorError> {
        let data = match &self.data {
            TensorData::F32(v) => TensorData::F16(v.iter().map(|&x| f16::from_f32(x)).collect()),
            TensorData::F16(v) => TensorData::F16(v.clone()),
            other => {
                return Err(TensorError::UnsupportedDType {
                    op: "to_f16",
                    dtype: other.dtype(),
                })
            }
        };
        Ok(Tensor {
            shape: self.shape.clone(),
            device: self.device,
            data,
        })
    }

    /// Serialises the elements as little-endian bytes.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        match &self.data {
            TensorData::F32(v) => v.iter().flat_map(|x| x.to_le_bytes()).collect(),
            TensorData::F16(v) => v.iter().flat_map(|x| x.to_le_bytes()).collect(),
            TensorData::I64(v) => v.iter().flat_map(|x| x.to_le_bytes()).collect(),
            TensorData::I8(v) => v.iter().map(|&x| x as u8).collect(),
        }
    }
}
