// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Calibration settings for static quantization.

use crate::options::{as_bool, as_choice, as_f64, as_usize, unknown_key};
use crate::{BackendError, Dataset, OptionMap, OptionTable};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Per-tensor activation ranges collected while calibrating.
pub type CalibrationRanges = BTreeMap<String, (f32, f32)>;

/// Name given to datasets built from manual calibration options.
pub const MANUAL_DATASET_NAME: &str = "calibration_dataset";

/// How activation ranges are estimated.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CalibrationMethod {
    MinMax {
        moving_average: bool,
        averaging_constant: f64,
    },
    Entropy {
        num_bins: usize,
        num_quantized_bins: usize,
    },
    Percentile {
        num_bins: usize,
        percentile: f64,
    },
}

impl CalibrationMethod {
    pub fn name(&self) -> &'static str {
        match self {
            CalibrationMethod::MinMax { .. } => "minmax",
            CalibrationMethod::Entropy { .. } => "entropy",
            CalibrationMethod::Percentile { .. } => "percentile",
        }
    }
}

/// Named calibration method with default parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AutoCalibration {
    MinMax,
    Entropy,
    Percentiles,
}

impl AutoCalibration {
    pub const ALL: [AutoCalibration; 3] = [
        AutoCalibration::MinMax,
        AutoCalibration::Entropy,
        AutoCalibration::Percentiles,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AutoCalibration::MinMax => "minmax",
            AutoCalibration::Entropy => "entropy",
            AutoCalibration::Percentiles => "percentiles",
        }
    }

    fn defaults(self) -> CalibrationMethod {
        match self {
            AutoCalibration::MinMax => CalibrationMethod::MinMax {
                moving_average: false,
                averaging_constant: 0.01,
            },
            AutoCalibration::Entropy => CalibrationMethod::Entropy {
                num_bins: 128,
                num_quantized_bins: 128,
            },
            AutoCalibration::Percentiles => CalibrationMethod::Percentile {
                num_bins: 2048,
                percentile: 99.999,
            },
        }
    }
}

impl fmt::Display for AutoCalibration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AutoCalibration {
    type Err = BackendError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AutoCalibration::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| {
                BackendError::Config(format!(
                    "unknown calibration method '{s}'; expected one of minmax, entropy, percentiles"
                ))
            })
    }
}

/// A method and its parameters, editable through an option map.
#[derive(Debug, Clone, Copy, PartialEq)]
struct MethodTable {
    method: CalibrationMethod,
    /// Manual tables may switch the method itself.
    allow_method_key: bool,
}

impl MethodTable {
    fn keys_for(&self) -> &'static [&'static str] {
        match self.method {
            CalibrationMethod::MinMax { .. } => &["moving_average", "averaging_constant"],
            CalibrationMethod::Entropy { .. } => &["num_bins", "num_quantized_bins"],
            CalibrationMethod::Percentile { .. } => &["num_bins", "percentile"],
        }
    }
}

impl OptionTable for MethodTable {
    const SCOPE: &'static str = "calibration";
    const KEYS: &'static [&'static str] = &[
        "method",
        "moving_average",
        "averaging_constant",
        "num_bins",
        "num_quantized_bins",
        "percentile",
    ];

    fn set(&mut self, key: &str, value: &Value) -> Result<(), BackendError> {
        let s = Self::SCOPE;
        let keys = self.keys_for();
        if key == "method" {
            if !self.allow_method_key {
                return Err(unknown_key(s, keys, key));
            }
            let auto = as_choice(
                s,
                key,
                value,
                &[
                    ("minmax", AutoCalibration::MinMax),
                    ("entropy", AutoCalibration::Entropy),
                    ("percentile", AutoCalibration::Percentiles),
                    ("percentiles", AutoCalibration::Percentiles),
                ],
            )?;
            self.method = auto.defaults();
            return Ok(());
        }
        if !keys.contains(&key) {
            return Err(BackendError::InvalidOption {
                scope: s,
                key: key.to_string(),
                detail: format!(
                    "not a parameter of the {} method; expected one of {:?}",
                    self.method.name(),
                    keys
                ),
            });
        }
        match (&mut self.method, key) {
            (CalibrationMethod::MinMax { moving_average, .. }, "moving_average") => {
                *moving_average = as_bool(s, key, value)?
            }
            (CalibrationMethod::MinMax { averaging_constant, .. }, "averaging_constant") => {
                *averaging_constant = as_f64(s, key, value)?
            }
            (CalibrationMethod::Entropy { num_bins, .. }, "num_bins")
            | (CalibrationMethod::Percentile { num_bins, .. }, "num_bins") => {
                *num_bins = as_usize(s, key, value)?
            }
            (CalibrationMethod::Entropy { num_quantized_bins, .. }, "num_quantized_bins") => {
                *num_quantized_bins = as_usize(s, key, value)?
            }
            (CalibrationMethod::Percentile { percentile, .. }, "percentile") => {
                let p = as_f64(s, key, value)?;
                if !(0.0..=100.0).contains(&p) {
                    return Err(BackendError::InvalidOption {
                        scope: s,
                        key: key.to_string(),
                        detail: format!("percentile must be within [0, 100], got {p}"),
                    });
                }
                *percentile = p;
            }
            _ => return Err(unknown_key(s, keys, key)),
        }
        Ok(())
    }
}

/// Settings for one calibration run.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationConfig {
    pub dataset_name: String,
    pub dataset_config_name: String,
    pub dataset_split: String,
    pub dataset_num_samples: usize,
    pub method: CalibrationMethod,
}

impl CalibrationConfig {
    /// Calibration with a named method's defaults plus `overrides`.
    pub fn from_auto(
        auto: AutoCalibration,
        overrides: &OptionMap,
        dataset: &Dataset,
    ) -> Result<Self, BackendError> {
        let mut table = MethodTable {
            method: auto.defaults(),
            allow_method_key: false,
        };
        table.apply(overrides)?;
        Ok(Self::for_dataset(dataset, dataset.name.clone(), table.method))
    }

    /// Calibration from explicit options (`method` plus its parameters,
    /// min-max when absent).
    pub fn manual(options: &OptionMap, dataset: &Dataset) -> Result<Self, BackendError> {
        let mut table = MethodTable {
            method: AutoCalibration::MinMax.defaults(),
            allow_method_key: true,
        };
        if let Some(method) = options.get("method") {
            table.set("method", method)?;
        }
        let params: OptionMap = options
            .iter()
            .filter(|(k, _)| k.as_str() != "method")
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        table.apply(&params)?;
        Ok(Self::for_dataset(dataset, MANUAL_DATASET_NAME.to_string(), table.method))
    }

    fn for_dataset(dataset: &Dataset, name: String, method: CalibrationMethod) -> Self {
        Self {
            dataset_name: name,
            dataset_config_name: dataset.config_name.clone(),
            dataset_split: dataset.split.clone(),
            dataset_num_samples: dataset.num_rows(),
            method,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn dataset() -> Dataset {
        Dataset {
            name: "synthetic".into(),
            config_name: "default".into(),
            split: "train".into(),
            rows: vec![Default::default()],
        }
    }

    #[test]
    fn test_auto_defaults() {
        let c = CalibrationConfig::from_auto(AutoCalibration::Percentiles, &OptionMap::new(), &dataset())
            .unwrap();
        assert_eq!(
            c.method,
            CalibrationMethod::Percentile {
                num_bins: 2048,
                percentile: 99.999
            }
        );
        assert_eq!(c.dataset_name, "synthetic");
        assert_eq!(c.dataset_num_samples, 1);
    }

    #[test]
    fn test_auto_overrides_are_method_specific() {
        let mut overrides = OptionMap::new();
        overrides.insert("num_bins".into(), json!(64));
        let c = CalibrationConfig::from_auto(AutoCalibration::Entropy, &overrides, &dataset()).unwrap();
        assert_eq!(
            c.method,
            CalibrationMethod::Entropy {
                num_bins: 64,
                num_quantized_bins: 128
            }
        );
        assert!(CalibrationConfig::from_auto(AutoCalibration::MinMax, &overrides, &dataset()).is_err());
    }

    #[test]
    fn test_manual() {
        let mut options = OptionMap::new();
        options.insert("method".into(), json!("entropy"));
        options.insert("num_quantized_bins".into(), json!(64));
        let c = CalibrationConfig::manual(&options, &dataset()).unwrap();
        assert_eq!(c.dataset_name, MANUAL_DATASET_NAME);
        assert_eq!(c.dataset_split, "train");
        assert_eq!(c.method.name(), "entropy");
    }

    #[test]
    fn test_percentile_range() {
        let mut options = OptionMap::new();
        options.insert("method".into(), json!("percentile"));
        options.insert("percentile".into(), json!(101.0));
        assert!(CalibrationConfig::manual(&options, &dataset()).is_err());
    }

    #[test]
    fn test_method_names() {
        assert_eq!("minmax".parse::<AutoCalibration>().unwrap(), AutoCalibration::MinMax);
        assert!("kl".parse::<AutoCalibration>().is_err());
    }
}
