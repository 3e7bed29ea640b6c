// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! SafeTensors payloads.
//!
//! [`WeightFile`] memory-maps a `.safetensors` file once and decodes tensors
//! on demand; [`save_tensors`] writes one, with optional string metadata
//! (framework checkpoints carry `{"format": "pt"}`).

use crate::ModelError;
use safetensors::tensor::{Dtype, TensorView};
use safetensors::SafeTensors;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tensor_core::{DType, Shape, Tensor, TensorData};

/// Metadata for a single tensor extracted from the SafeTensors header.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightMeta {
    pub name: String,
    pub shape: Shape,
    pub dtype: DType,
}

impl WeightMeta {
    pub fn size_bytes(&self) -> usize {
        self.shape.size_bytes(self.dtype)
    }
}

/// A memory-mapped SafeTensors file.
pub struct WeightFile {
    path: PathBuf,
    mmap: memmap2::Mmap,
}

impl WeightFile {
    /// Opens and maps `path`.
    pub fn open(path: &Path) -> Result<Self, ModelError> {
        let file = std::fs::File::open(path).map_err(|e| {
            ModelError::SafeTensors(format!("cannot open '{}': {e}", path.display()))
        })?;
        // SAFETY: the mapping is read-only and artifact files are not
        // rewritten while a pipeline holds them open.
        let mmap = unsafe { memmap2::Mmap::map(&file) }
            .map_err(|e| ModelError::SafeTensors(format!("mmap failed: {e}")))?;
        tracing::debug!(
            "weights: mapped {} ({:.2} KB)",
            path.display(),
            mmap.len() as f64 / 1024.0,
        );
        Ok(Self {
            path: path.to_path_buf(),
            mmap,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn parse(&self) -> Result<SafeTensors<'_>, ModelError> {
        SafeTensors::deserialize(&self.mmap)
            .map_err(|e| ModelError::SafeTensors(format!("SafeTensors parse error: {e}")))
    }

    /// Returns the header entries sorted by tensor name.
    pub fn metadata(&self) -> Result<Vec<WeightMeta>, ModelError> {
        let st = self.parse()?;
        let mut metas = Vec::new();
        for (name, view) in st.tensors() {
            metas.push(WeightMeta {
                name,
                shape: Shape::new(view.shape().to_vec()),
                dtype: convert_dtype(view.dtype())?,
            });
        }
        metas.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(metas)
    }

    /// Returns the free-form string metadata stored in the header.
    pub fn user_metadata(&self) -> Result<BTreeMap<String, String>, ModelError> {
        let (_, meta) = SafeTensors::read_metadata(&self.mmap)
            .map_err(|e| ModelError::SafeTensors(format!("header parse error: {e}")))?;
        Ok(meta
            .metadata()
            .as_ref()
            .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default())
    }

    /// Decodes one tensor.
    pub fn load(&self, name: &str) -> Result<Tensor, ModelError> {
        let st = self.parse()?;
        let view = st.tensor(name).map_err(|_| ModelError::WeightNotFound {
            name: name.to_string(),
        })?;
        let shape = Shape::new(view.shape().to_vec());
        let bytes = view.data();
        let data = match view.dtype() {
            Dtype::F32 => TensorData::F32(
                bytes
                    .chunks_exact(4)
                    .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                    .collect(),
            ),
            Dtype::F16 => TensorData::F16(
                bytes
                    .chunks_exact(2)
                    .map(|c| half::f16::from_le_bytes([c[0], c[1]]))
                    .collect(),
            ),
            Dtype::I64 => TensorData::I64(
                bytes
                    .chunks_exact(8)
                    .map(|c| i64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]))
                    .collect(),
            ),
            Dtype::I8 => TensorData::I8(bytes.iter().map(|&b| b as i8).collect()),
            other => {
                return Err(ModelError::SafeTensors(format!(
                    "tensor '{name}' has unsupported dtype {other:?}"
                )))
            }
        };
        Ok(Tensor::new(shape, data)?)
    }
}

impl std::fmt::Debug for WeightFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeightFile")
            .field("path", &self.path)
            .field("bytes", &self.mmap.len())
            .finish()
    }
}

/// Writes `tensors` to `path` in SafeTensors format.
pub fn save_tensors(
    path: &Path,
    tensors: &[(String, Tensor)],
    metadata: Option<BTreeMap<String, String>>,
) -> Result<(), ModelError> {
    let encoded: Vec<(&str, Dtype, Vec<usize>, Vec<u8>)> = tensors
        .iter()
        .map(|(name, t)| {
            (
                name.as_str(),
                safetensor_dtype(t.dtype()),
                t.shape().dims().to_vec(),
                t.to_le_bytes(),
            )
        })
        .collect();

    let mut views = BTreeMap::new();
    for (name, dtype, shape, bytes) in &encoded {
        let view = TensorView::new(*dtype, shape.clone(), bytes)
            .map_err(|e| ModelError::SafeTensors(format!("tensor '{name}': {e}")))?;
        views.insert(*name, view);
    }

    let info: Option<HashMap<String, String>> = metadata.map(|m| m.into_iter().collect());
    let data = safetensors::serialize(views.iter().map(|(k, v)| (*k, v)), info)
        .map_err(|e| ModelError::SafeTensors(format!("serialize failed: {e}")))?;
    std::fs::write(path, data)?;
    Ok(())
}

fn safetensor_dtype(dtype: DType) -> Dtype {
    match dtype {
        DType::F32 => Dtype::F32,
        DType::F16 => Dtype::F16,
        DType::I64 => Dtype::I64,
        DType::I8 => Dtype::I8,
    }
}

fn convert_dtype(dtype: Dtype) -> Result<DType, ModelError> {
    match dtype {
        Dtype::F32 => Ok(DType::F32),
        Dtype::F16 => Ok(DType::F16),
        Dtype::I64 => Ok(DType::I64),
        Dtype::I8 => Ok(DType::I8),
        other => Err(ModelError::SafeTensors(format!("unsupported dtype {other:?}"))),
    }
}
