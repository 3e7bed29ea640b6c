// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Canonical artifact file names and directory listing.

use crate::ModelError;
use std::path::Path;

/// Architecture description.
pub const CONFIG_NAME: &str = "config.json";

/// Framework weight payload.
pub const WEIGHTS_NAME: &str = "model.safetensors";

/// Image / audio feature-extractor description.
pub const PREPROCESSOR_NAME: &str = "preprocessor_config.json";

/// Tokenizer description.
pub const TOKENIZER_CONFIG_NAME: &str = "tokenizer_config.json";

/// Lists the names of regular files in `dir` ending in `.{extension}`,
/// sorted so that callers see a stable component order.
///
/// # Errors
/// [`ModelError::NotADirectory`] if `dir` is not a directory.
pub fn list_files_with_extension(dir: &Path, extension: &str) -> Result<Vec<String>, ModelError> {
    if !dir.is_dir() {
        return Err(ModelError::NotADirectory(dir.to_path_buf()));
    }
    let mut names = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == extension) {
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                names.push(name.to_string());
            }
        }
    }
    names.sort();
    Ok(names)
}
