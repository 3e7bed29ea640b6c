// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Execution providers, session options and load options.

use crate::options::{as_bool, as_choice, as_i64, as_string, as_usize, unknown_key};
use crate::{BackendError, Device, HubOptions, OptionMap, OptionTable};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// A runtime execution provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecutionProvider {
    Cpu,
    Cuda,
    TensorRt,
    Rocm,
    OpenVino,
    Dnnl,
}

impl ExecutionProvider {
    pub const ALL: [ExecutionProvider; 6] = [
        ExecutionProvider::Cpu,
        ExecutionProvider::Cuda,
        ExecutionProvider::TensorRt,
        ExecutionProvider::Rocm,
        ExecutionProvider::OpenVino,
        ExecutionProvider::Dnnl,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ExecutionProvider::Cpu => "CPUExecutionProvider",
            ExecutionProvider::Cuda => "CUDAExecutionProvider",
            ExecutionProvider::TensorRt => "TensorrtExecutionProvider",
            ExecutionProvider::Rocm => "ROCMExecutionProvider",
            ExecutionProvider::OpenVino => "OpenVINOExecutionProvider",
            ExecutionProvider::Dnnl => "DnnlExecutionProvider",
        }
    }

    /// The provider implied by a device when none is configured.
    pub fn for_device(device: Device) -> Self {
        if device.is_cuda() {
            ExecutionProvider::Cuda
        } else {
            ExecutionProvider::Cpu
        }
    }

    /// Providers that run on a CUDA device.
    pub fn uses_cuda(self) -> bool {
        matches!(self, ExecutionProvider::Cuda | ExecutionProvider::TensorRt)
    }
}

impl fmt::Display for ExecutionProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionProvider {
    type Err = BackendError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ExecutionProvider::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| BackendError::Config(format!("unknown execution provider '{s}'")))
    }
}

/// Sequential or parallel operator scheduling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    Sequential,
    Parallel,
}

/// Graph optimizations the session applies at load time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphOptimizationLevel {
    DisableAll,
    Basic,
    Extended,
    All,
}

/// Runtime session options.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionOptions {
    pub enable_cpu_mem_arena: bool,
    pub enable_mem_pattern: bool,
    pub enable_mem_reuse: bool,
    pub enable_profiling: bool,
    pub profile_file_prefix: Option<String>,
    pub execution_mode: ExecutionMode,
    pub graph_optimization_level: GraphOptimizationLevel,
    pub inter_op_num_threads: Option<usize>,
    pub intra_op_num_threads: Option<usize>,
    pub log_severity_level: i64,
    pub log_verbosity_level: i64,
    pub logid: Option<String>,
    pub optimized_model_filepath: Option<String>,
    pub use_deterministic_compute: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            enable_cpu_mem_arena: true,
            enable_mem_pattern: true,
            enable_mem_reuse: true,
            enable_profiling: false,
            profile_file_prefix: None,
            execution_mode: ExecutionMode::Sequential,
            graph_optimization_level: GraphOptimizationLevel::All,
            inter_op_num_threads: None,
            intra_op_num_threads: None,
            log_severity_level: 2,
            log_verbosity_level: 0,
            logid: None,
            optimized_model_filepath: None,
            use_deterministic_compute: false,
        }
    }
}

impl OptionTable for SessionOptions {
    const SCOPE: &'static str = "session";
    const KEYS: &'static [&'static str] = &[
        "enable_cpu_mem_arena",
        "enable_mem_pattern",
        "enable_mem_reuse",
        "enable_profiling",
        "profile_file_prefix",
        "execution_mode",
        "graph_optimization_level",
        "inter_op_num_threads",
        "intra_op_num_threads",
        "log_severity_level",
        "log_verbosity_level",
        "logid",
        "optimized_model_filepath",
        "use_deterministic_compute",
    ];

    fn set(&mut self, key: &str, value: &Value) -> Result<(), BackendError> {
        let s = Self::SCOPE;
        match key {
            "enable_cpu_mem_arena" => self.enable_cpu_mem_arena = as_bool(s, key, value)?,
            "enable_mem_pattern" => self.enable_mem_pattern = as_bool(s, key, value)?,
            "enable_mem_reuse" => self.enable_mem_reuse = as_bool(s, key, value)?,
            "enable_profiling" => self.enable_profiling = as_bool(s, key, value)?,
            "profile_file_prefix" => self.profile_file_prefix = Some(as_string(s, key, value)?),
            "execution_mode" => {
                self.execution_mode = as_choice(
                    s,
                    key,
                    value,
                    &[
                        ("sequential", ExecutionMode::Sequential),
                        ("parallel", ExecutionMode::Parallel),
                    ],
                )?
            }
            "graph_optimization_level" => {
                self.graph_optimization_level = as_choice(
                    s,
                    key,
                    value,
                    &[
                        ("disable_all", GraphOptimizationLevel::DisableAll),
                        ("basic", GraphOptimizationLevel::Basic),
                        ("extended", GraphOptimizationLevel::Extended),
                        ("all", GraphOptimizationLevel::All),
                    ],
                )?
            }
            "inter_op_num_threads" => self.inter_op_num_threads = Some(as_usize(s, key, value)?),
            "intra_op_num_threads" => self.intra_op_num_threads = Some(as_usize(s, key, value)?),
            "log_severity_level" => self.log_severity_level = as_i64(s, key, value)?,
            "log_verbosity_level" => self.log_verbosity_level = as_i64(s, key, value)?,
            "logid" => self.logid = Some(as_string(s, key, value)?),
            "optimized_model_filepath" => {
                self.optimized_model_filepath = Some(as_string(s, key, value)?)
            }
            "use_deterministic_compute" => {
                self.use_deterministic_compute = as_bool(s, key, value)?
            }
            _ => return Err(unknown_key(s, Self::KEYS, key)),
        }
        Ok(())
    }
}

impl SessionOptions {
    /// Builds session options from a map, then applies explicit thread
    /// counts on top.
    pub fn build(
        map: &OptionMap,
        intra_op_num_threads: Option<usize>,
        inter_op_num_threads: Option<usize>,
    ) -> Result<Self, BackendError> {
        let mut options = SessionOptions::default();
        options.apply(map)?;
        if intra_op_num_threads.is_some() {
            options.intra_op_num_threads = intra_op_num_threads;
        }
        if inter_op_num_threads.is_some() {
            options.inter_op_num_threads = inter_op_num_threads;
        }
        Ok(options)
    }
}

/// Everything the runtime library needs to load a model, besides its
/// location.
#[derive(Debug, Clone, PartialEq)]
pub struct OrtLoadOptions {
    pub provider: ExecutionProvider,
    pub provider_options: OptionMap,
    pub session_options: SessionOptions,
    pub use_io_binding: bool,
    /// Only set for text-generation tasks.
    pub use_cache: Option<bool>,
    /// Only set for text-generation tasks.
    pub use_merged: Option<bool>,
    pub hub: HubOptions,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_provider_names() {
        assert_eq!(ExecutionProvider::for_device(Device::Cuda(0)).as_str(), "CUDAExecutionProvider");
        assert_eq!(ExecutionProvider::for_device(Device::Cpu), ExecutionProvider::Cpu);
        assert_eq!(
            "tensorrtexecutionprovider".parse::<ExecutionProvider>().unwrap(),
            ExecutionProvider::TensorRt
        );
        assert!("TPUExecutionProvider".parse::<ExecutionProvider>().is_err());
    }

    #[test]
    fn test_session_options_table() {
        let mut map = OptionMap::new();
        map.insert("enable_profiling".into(), json!(true));
        map.insert("graph_optimization_level".into(), json!("basic"));
        map.insert("intra_op_num_threads".into(), json!(8));
        let opts = SessionOptions::build(&map, Some(2), Some(1)).unwrap();
        assert!(opts.enable_profiling);
        assert_eq!(opts.graph_optimization_level, GraphOptimizationLevel::Basic);
        assert_eq!(opts.intra_op_num_threads, Some(2));
        assert_eq!(opts.inter_op_num_threads, Some(1));
    }

    #[test]
    fn test_session_options_reject_unknown() {
        let mut map = OptionMap::new();
        map.insert("enable_turbo".into(), json!(true));
        assert!(matches!(
            SessionOptions::build(&map, None, None),
            Err(BackendError::InvalidOption { scope: "session", .. })
        ));
    }
}
