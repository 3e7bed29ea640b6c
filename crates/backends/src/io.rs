// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Inference inputs and outputs.

use crate::{BackendError, Device};
use std::collections::BTreeMap;
use tensor_core::Tensor;

/// A single named model input.
#[derive(Debug, Clone, PartialEq)]
pub enum InputValue {
    Tensor(Tensor),
    /// Raw text, e.g. diffusion prompts.
    Text(Vec<String>),
}

impl InputValue {
    /// Moves tensor inputs to `device`; text is device-independent.
    pub fn to_device(self, device: Device) -> Self {
        match self {
            InputValue::Tensor(t) => InputValue::Tensor(t.with_device(device)),
            text @ InputValue::Text(_) => text,
        }
    }

    pub fn as_tensor(&self) -> Option<&Tensor> {
        match self {
            InputValue::Tensor(t) => Some(t),
            InputValue::Text(_) => None,
        }
    }

    pub fn device(&self) -> Option<Device> {
        self.as_tensor().map(|t| t.device())
    }
}

impl From<Tensor> for InputValue {
    fn from(t: Tensor) -> Self {
        InputValue::Tensor(t)
    }
}

/// Named inputs of one inference call.
pub type ModelInputs = BTreeMap<String, InputValue>;

/// Extra keyword arguments forwarded verbatim to the model
/// (`max_new_tokens`, `num_inference_steps`, ...).
pub type Kwargs = BTreeMap<String, serde_json::Value>;

/// Fetches a required tensor input.
pub fn require_tensor<'a>(inputs: &'a ModelInputs, name: &str) -> Result<&'a Tensor, BackendError> {
    inputs
        .get(name)
        .and_then(InputValue::as_tensor)
        .ok_or_else(|| BackendError::MissingInput(name.to_string()))
}

/// Named outputs of one inference call, in the order the model produced
/// them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelOutputs {
    entries: Vec<(String, Tensor)>,
}

impl ModelOutputs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an output, replacing any previous output of the same name.
    pub fn insert(&mut self, name: impl Into<String>, tensor: Tensor) {
        let name = name.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = tensor,
            None => self.entries.push((name, tensor)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Tensor> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, t)| t)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Tensor)> {
        self.entries.iter().map(|(n, t)| (n.as_str(), t))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tensor_core::{DType, Shape};

    #[test]
    fn test_to_device_moves_tensors_only() {
        let t = InputValue::from(Tensor::full_i64(Shape::matrix(1, 4), 1));
        assert_eq!(t.to_device(Device::Cuda(0)).device(), Some(Device::Cuda(0)));

        let text = InputValue::Text(vec!["a photo".into()]);
        assert_eq!(text.clone().to_device(Device::Cuda(0)), text);
    }

    #[test]
    fn test_outputs_keep_order_and_replace() {
        let mut out = ModelOutputs::new();
        out.insert("logits", Tensor::zeros(Shape::matrix(1, 2), DType::F32));
        out.insert("hidden", Tensor::zeros(Shape::matrix(1, 4), DType::F32));
        out.insert("logits", Tensor::zeros(Shape::matrix(1, 3), DType::F32));
        assert_eq!(out.names().collect::<Vec<_>>(), vec!["logits", "hidden"]);
        assert_eq!(out.get("logits").unwrap().shape().dims(), &[1, 3]);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn test_require_tensor() {
        let mut inputs = ModelInputs::new();
        inputs.insert("prompt".into(), InputValue::Text(vec!["x".into()]));
        assert!(matches!(
            require_tensor(&inputs, "prompt"),
            Err(BackendError::MissingInput(_))
        ));
        assert!(require_tensor(&inputs, "input_ids").is_err());
    }
}
