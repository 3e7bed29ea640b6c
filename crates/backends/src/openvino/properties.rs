// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Runtime properties and load options.

use crate::options::{as_bool, as_choice, as_string, as_usize, unknown_key};
use crate::{BackendError, HubOptions, OptionMap, OptionTable};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PerformanceHint {
    Latency,
    Throughput,
    CumulativeThroughput,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrecisionHint {
    F32,
    F16,
    Bf16,
}

/// Stream count: explicit, or chosen by the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumStreams {
    Auto,
    Count(usize),
}

/// Properties passed to model compilation.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct OvProperties {
    pub inference_num_threads: Option<usize>,
    pub num_streams: Option<NumStreams>,
    pub performance_hint: Option<PerformanceHint>,
    pub inference_precision_hint: Option<PrecisionHint>,
    pub cache_dir: Option<String>,
    pub perf_count: Option<bool>,
    pub enable_mmap: Option<bool>,
}

impl OptionTable for OvProperties {
    const SCOPE: &'static str = "openvino";
    const KEYS: &'static [&'static str] = &[
        "INFERENCE_NUM_THREADS",
        "NUM_STREAMS",
        "PERFORMANCE_HINT",
        "INFERENCE_PRECISION_HINT",
        "CACHE_DIR",
        "PERF_COUNT",
        "ENABLE_MMAP",
    ];

    fn set(&mut self, key: &str, value: &Value) -> Result<(), BackendError> {
        let s = Self::SCOPE;
        match key {
            "INFERENCE_NUM_THREADS" => self.inference_num_threads = Some(as_usize(s, key, value)?),
            "NUM_STREAMS" => {
                let streams = match value {
                    Value::String(v) if v.eq_ignore_ascii_case("auto") => NumStreams::Auto,
                    other => NumStreams::Count(as_usize(s, key, other)?),
                };
                self.num_streams = Some(streams);
            }
            "PERFORMANCE_HINT" => {
                self.performance_hint = Some(as_choice(
                    s,
                    key,
                    value,
                    &[
                        ("LATENCY", PerformanceHint::Latency),
                        ("THROUGHPUT", PerformanceHint::Throughput),
                        ("CUMULATIVE_THROUGHPUT", PerformanceHint::CumulativeThroughput),
                    ],
                )?)
            }
            "INFERENCE_PRECISION_HINT" => {
                self.inference_precision_hint = Some(as_choice(
                    s,
                    key,
                    value,
                    &[
                        ("f32", PrecisionHint::F32),
                        ("f16", PrecisionHint::F16),
                        ("bf16", PrecisionHint::Bf16),
                    ],
                )?)
            }
            "CACHE_DIR" => self.cache_dir = Some(as_string(s, key, value)?),
            "PERF_COUNT" => self.perf_count = Some(as_bool(s, key, value)?),
            "ENABLE_MMAP" => self.enable_mmap = Some(as_bool(s, key, value)?),
            _ => return Err(unknown_key(s, Self::KEYS, key)),
        }
        Ok(())
    }
}

impl OvProperties {
    /// Builds properties from a map; an explicit thread count wins over
    /// `INFERENCE_NUM_THREADS`.
    pub fn build(map: &OptionMap, inter_op_num_threads: Option<usize>) -> Result<Self, BackendError> {
        let mut properties = OvProperties::default();
        properties.apply(map)?;
        if inter_op_num_threads.is_some() {
            properties.inference_num_threads = inter_op_num_threads;
        }
        Ok(properties)
    }
}

/// Everything the vendor library needs to load a model, besides its
/// location.
#[derive(Debug, Clone, PartialEq)]
pub struct OvLoadOptions {
    /// Target device in the runtime's naming (`CPU`, `GPU.0`).
    pub device: String,
    pub properties: OvProperties,
    /// Compile on load. Off when the model is reshaped or converted first.
    pub compile: bool,
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
    fn test_properties_table() {
        let mut map = OptionMap::new();
        map.insert("PERFORMANCE_HINT".into(), json!("THROUGHPUT"));
        map.insert("NUM_STREAMS".into(), json!("AUTO"));
        map.insert("INFERENCE_NUM_THREADS".into(), json!(8));
        let p = OvProperties::build(&map, Some(4)).unwrap();
        assert_eq!(p.performance_hint, Some(PerformanceHint::Throughput));
        assert_eq!(p.num_streams, Some(NumStreams::Auto));
        assert_eq!(p.inference_num_threads, Some(4));
    }

    #[test]
    fn test_unknown_property() {
        let mut map = OptionMap::new();
        map.insert("performance_hint".into(), json!("LATENCY"));
        assert!(matches!(
            OvProperties::build(&map, None),
            Err(BackendError::InvalidOption { scope: "openvino", .. })
        ));
    }
}
