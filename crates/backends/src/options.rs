// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Typed option tables.
//!
//! User-facing option maps (session options, preset overrides, OpenVINO
//! properties, ...) arrive as loosely-typed key/value maps. Each consumer
//! declares the keys it accepts through [`OptionTable`]; applying a map
//! rejects unknown keys and ill-typed values up front instead of letting
//! them fail deep inside a library call.

use crate::BackendError;
use serde_json::Value;
use std::collections::BTreeMap;

/// A loosely-typed option map as written in configuration files.
pub type OptionMap = BTreeMap<String, Value>;

/// A typed view over an [`OptionMap`].
pub trait OptionTable {
    /// Name used in error messages.
    const SCOPE: &'static str;
    /// Every key [`set`](OptionTable::set) understands.
    const KEYS: &'static [&'static str];

    /// Applies a single key. Only called with keys listed in `KEYS`.
    fn set(&mut self, key: &str, value: &Value) -> Result<(), BackendError>;

    /// Applies every entry of `map`, failing on the first unknown key or
    /// ill-typed value.
    fn apply(&mut self, map: &OptionMap) -> Result<(), BackendError> {
        for (key, value) in map {
            if !Self::KEYS.contains(&key.as_str()) {
                return Err(unknown_key(Self::SCOPE, Self::KEYS, key));
            }
            self.set(key, value)?;
        }
        Ok(())
    }
}

pub(crate) fn unknown_key(scope: &'static str, known: &[&str], key: &str) -> BackendError {
    BackendError::InvalidOption {
        scope,
        key: key.to_string(),
        detail: format!("unknown key; expected one of {known:?}"),
    }
}

fn invalid(scope: &'static str, key: &str, expected: &str, value: &Value) -> BackendError {
    BackendError::InvalidOption {
        scope,
        key: key.to_string(),
        detail: format!("expected {expected}, got {value}"),
    }
}

pub(crate) fn as_bool(scope: &'static str, key: &str, value: &Value) -> Result<bool, BackendError> {
    value
        .as_bool()
        .ok_or_else(|| invalid(scope, key, "a boolean", value))
}

pub(crate) fn as_usize(scope: &'static str, key: &str, value: &Value) -> Result<usize, BackendError> {
    value
        .as_u64()
        .map(|v| v as usize)
        .ok_or_else(|| invalid(scope, key, "a non-negative integer", value))
}

pub(crate) fn as_i64(scope: &'static str, key: &str, value: &Value) -> Result<i64, BackendError> {
    value
        .as_i64()
        .ok_or_else(|| invalid(scope, key, "an integer", value))
}

pub(crate) fn as_f64(scope: &'static str, key: &str, value: &Value) -> Result<f64, BackendError> {
    value
        .as_f64()
        .ok_or_else(|| invalid(scope, key, "a number", value))
}

pub(crate) fn as_string(scope: &'static str, key: &str, value: &Value) -> Result<String, BackendError> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| invalid(scope, key, "a string", value))
}

pub(crate) fn as_string_list(
    scope: &'static str,
    key: &str,
    value: &Value,
) -> Result<Vec<String>, BackendError> {
    let items = value
        .as_array()
        .ok_or_else(|| invalid(scope, key, "a list of strings", value))?;
    items
        .iter()
        .map(|item| {
            item.as_str()
                .map(str::to_string)
                .ok_or_else(|| invalid(scope, key, "a list of strings", value))
        })
        .collect()
}

/// Parses a string option against a closed set of names.
pub(crate) fn as_choice<T: Copy>(
    scope: &'static str,
    key: &str,
    value: &Value,
    choices: &[(&str, T)],
) -> Result<T, BackendError> {
    let name = as_string(scope, key, value)?;
    choices
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(&name))
        .map(|(_, v)| *v)
        .ok_or_else(|| {
            let names: Vec<&str> = choices.iter().map(|(n, _)| *n).collect();
            BackendError::InvalidOption {
                scope,
                key: key.to_string(),
                detail: format!("'{name}' is not one of {names:?}"),
            }
        })
}
