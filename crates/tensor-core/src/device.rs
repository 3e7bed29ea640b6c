// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Execution targets.
//!
//! A [`Device`] is parsed from the strings used in benchmark configuration
//! files (`"cpu"`, `"cuda"`, `"cuda:1"`, `"gpu"`, `"GPU.0"`). `cuda` is the
//! NVIDIA target used by the ONNX Runtime backend; `gpu` is the Intel target
//! used by the OpenVINO backend.

use crate::TensorError;
use std::fmt;
use std::str::FromStr;

/// The device a tensor or a loaded model is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Device {
    /// Host CPU.
    #[default]
    Cpu,
    /// NVIDIA GPU with the given ordinal.
    Cuda(u32),
    /// Intel integrated or discrete GPU with the given ordinal.
    Gpu(u32),
}

impl Device {
    /// Returns the device family name without ordinal (`cpu`, `cuda`, `gpu`).
    pub fn kind(self) -> &'static str {
        match self {
            Device::Cpu => "cpu",
            Device::Cuda(_) => "cuda",
            Device::Gpu(_) => "gpu",
        }
    }

    /// Returns the device ordinal, `None` for the CPU.
    pub fn index(self) -> Option<u32> {
        match self {
            Device::Cpu => None,
            Device::Cuda(i) | Device::Gpu(i) => Some(i),
        }
    }

    pub fn is_cuda(self) -> bool {
        matches!(self, Device::Cuda(_))
    }

    /// Returns the device name in OpenVINO notation (`CPU`, `GPU.0`).
    pub fn openvino_name(self) -> String {
        match self {
            Device::Cpu => "CPU".to_string(),
            Device::Cuda(i) | Device::Gpu(i) => format!("GPU.{i}"),
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => f.write_str("cpu"),
            Device::Cuda(i) => write!(f, "cuda:{i}"),
            Device::Gpu(i) => write!(f, "gpu:{i}"),
        }
    }
}

impl FromStr for Device {
    type Err = TensorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        let (kind, index) = match lower.split_once([':', '.']) {
            Some((kind, idx)) => {
                let idx = idx
                    .parse::<u32>()
                    .map_err(|_| TensorError::InvalidDevice(s.to_string()))?;
                (kind, idx)
            }
            None => (lower.as_str(), 0),
        };
        match kind {
            "cpu" if index == 0 => Ok(Device::Cpu),
            "cuda" => Ok(Device::Cuda(index)),
            "gpu" => Ok(Device::Gpu(index)),
            _ => Err(TensorError::InvalidDevice(s.to_string())),
        }
    }
}

impl serde::Serialize for Device {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> serde::Deserialize<'de> for Device {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_devices() {
        assert_eq!("cpu".parse::<Device>().unwrap(), Device::Cpu);
        assert_eq!("CUDA".parse::<Device>().unwrap(), Device::Cuda(0));
        assert_eq!("cuda:1".parse::<Device>().unwrap(), Device::Cuda(1));
        assert_eq!("GPU.0".parse::<Device>().unwrap(), Device::Gpu(0));
        assert!("tpu".parse::<Device>().is_err());
        assert!("cuda:x".parse::<Device>().is_err());
        assert!("cpu:1".parse::<Device>().is_err());
    }

    #[test]
    fn test_names() {
        assert_eq!(Device::Cuda(2).to_string(), "cuda:2");
        assert_eq!(Device::Gpu(0).openvino_name(), "GPU.0");
        assert_eq!(Device::Cpu.openvino_name(), "CPU");
        assert_eq!(Device::Cuda(3).kind(), "cuda");
        assert_eq!(Device::Cpu.index(), None);
    }

    #[test]
    fn test_serde_string_form() {
        let d: Device = serde_json::from_str("\"cuda:0\"").unwrap();
        assert!(d.is_cuda());
        assert_eq!(serde_json::to_string(&d).unwrap(), "\"cuda:0\"");
    }
}
