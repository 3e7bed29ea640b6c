// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Calibration datasets.

use crate::{BackendError, Shapes, Stage, Task};
use std::collections::{BTreeMap, BTreeSet};
use tensor_core::Tensor;

/// A named, row-oriented dataset of model inputs.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    pub name: String,
    pub config_name: String,
    pub split: String,
    pub rows: Vec<BTreeMap<String, Tensor>>,
}

impl Dataset {
    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    /// Union of the column names across all rows.
    pub fn column_names(&self) -> Vec<String> {
        let names: BTreeSet<&String> = self.rows.iter().flat_map(|r| r.keys()).collect();
        names.into_iter().cloned().collect()
    }

    pub fn remove_columns(&mut self, columns: &[String]) {
        for row in &mut self.rows {
            row.retain(|name, _| !columns.contains(name));
        }
    }

    /// Drops every column not listed in `keep`.
    pub fn retain_columns(&mut self, keep: &[String]) {
        let drop: Vec<String> = self
            .column_names()
            .into_iter()
            .filter(|c| !keep.contains(c))
            .collect();
        if !drop.is_empty() {
            tracing::debug!("dropping dataset columns {drop:?}");
            self.remove_columns(&drop);
        }
    }
}

/// Produces synthetic datasets sized from model and dataset dimensions.
pub trait DatasetGenerator: Send + Sync {
    fn generate(
        &self,
        task: Task,
        dataset_shapes: &Shapes,
        model_shapes: &Shapes,
    ) -> anyhow::Result<Dataset>;
}

/// Generates the one-row, one-token dataset used to calibrate static
/// quantization.
pub fn calibration_dataset(
    generator: &dyn DatasetGenerator,
    task: Task,
    model_shapes: &Shapes,
) -> Result<Dataset, BackendError> {
    let mut dataset_shapes = model_shapes.clone();
    dataset_shapes.insert("dataset_size".into(), 1);
    dataset_shapes.insert("sequence_length".into(), 1);
    generator
        .generate(task, &dataset_shapes, model_shapes)
        .map_err(BackendError::at(Stage::DatasetGeneration))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tensor_core::Shape;

    fn row(cols: &[&str]) -> BTreeMap<String, Tensor> {
        cols.iter()
            .map(|c| (c.to_string(), Tensor::full_i64(Shape::matrix(1, 1), 0)))
            .collect()
    }

    #[test]
    fn test_retain_columns() {
        let mut ds = Dataset {
            name: "synthetic".into(),
            config_name: "default".into(),
            split: "train".into(),
            rows: vec![row(&["input_ids", "attention_mask", "label"])],
        };
        ds.retain_columns(&["input_ids".to_string(), "attention_mask".to_string()]);
        assert_eq!(ds.column_names(), vec!["attention_mask", "input_ids"]);
        assert_eq!(ds.num_rows(), 1);
    }

    struct Recorder(Mutex<Option<Shapes>>);

    impl DatasetGenerator for Recorder {
        fn generate(&self, _: Task, dataset_shapes: &Shapes, _: &Shapes) -> anyhow::Result<Dataset> {
            *self.0.lock().unwrap() = Some(dataset_shapes.clone());
            anyhow::bail!("no data")
        }
    }

    #[test]
    fn test_calibration_shapes_and_error_stage() {
        let gen = Recorder(Mutex::new(None));
        let mut model_shapes = Shapes::new();
        model_shapes.insert("vocab_size".into(), 30522);
        model_shapes.insert("sequence_length".into(), 128);

        let err = calibration_dataset(&gen, Task::TextClassification, &model_shapes).unwrap_err();
        assert!(matches!(
            err,
            BackendError::Library {
                stage: Stage::DatasetGeneration,
                ..
            }
        ));

        let seen = gen.0.lock().unwrap().clone().unwrap();
        assert_eq!(seen["dataset_size"], 1);
        assert_eq!(seen["sequence_length"], 1);
        assert_eq!(seen["vocab_size"], 30522);
    }
}
