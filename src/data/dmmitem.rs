use burn::data::dataset::{Dataset, InMemDataset};
use serde::{Deserialize, Serialize};

use crate::error::BatchError;

/// Time steps of one example, each holding `input_dim` values.
pub type Sequence = Vec<Vec<f32>>;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DmmItem {
    pub observations: Sequence,
    pub seq_length: Option<usize>,
    pub static_features: Vec<f32>,
    pub feature_mask: Option<Sequence>,
    pub y: Option<f32>,
    pub y_mask: Option<f32>,
}

pub fn load_from_file(filename: &str) -> Result<InMemDataset<DmmItem>, std::io::Error> {
    InMemDataset::from_json_rows(filename)
}

/// Column-oriented view of a DMM dataset: parallel per-example arrays addressed by index.
///
/// `seq_lengths[i]` is the declared length of example `i`; the stored sequence may hold more
/// time steps than that but never fewer for an example that ends up in a batch.
#[derive(Debug, Clone)]
pub struct DmmDataset {
    pub(crate) input_dim: usize,
    pub(crate) static_dim: usize,
    pub(crate) sequences: Vec<Sequence>,
    pub(crate) seq_lengths: Vec<usize>,
    pub(crate) statics: Vec<Vec<f32>>,
    pub(crate) feature_mask: Option<Vec<Sequence>>,
    pub(crate) y: Option<Vec<f32>>,
    pub(crate) y_mask: Option<Vec<f32>>,
}

impl DmmDataset {
    pub fn new(
        input_dim: usize,
        static_dim: usize,
        sequences: Vec<Sequence>,
        seq_lengths: Vec<usize>,
        statics: Vec<Vec<f32>>,
    ) -> Self {
        Self {
            input_dim,
            static_dim,
            sequences,
            seq_lengths,
            statics,
            feature_mask: None,
            y: None,
            y_mask: None,
        }
    }

    pub fn with_feature_mask(mut self, feature_mask: Vec<Sequence>) -> Self {
        self.feature_mask = Some(feature_mask);
        self
    }

    pub fn with_y(mut self, y: Vec<f32>) -> Self {
        self.y = Some(y);
        self
    }

    pub fn with_y_mask(mut self, y_mask: Vec<f32>) -> Self {
        self.y_mask = Some(y_mask);
        self
    }

    /// Collects rows into columns. An optional column is kept only when every row carries it.
    pub fn from_dataset<D: Dataset<DmmItem>>(dataset: &D) -> Result<Self, BatchError> {
        let items: Vec<DmmItem> = (0..dataset.len()).filter_map(|i| dataset.get(i)).collect();

        let input_dim = items
            .iter()
            .find_map(|item| item.observations.first())
            .map(|step| step.len())
            .unwrap_or(0);
        let static_dim = items
            .first()
            .map(|item| item.static_features.len())
            .unwrap_or(0);

        let feature_mask = optional_column("feature_mask", &items, |item| item.feature_mask.clone())?;
        let y = optional_column("y", &items, |item| item.y)?;
        let y_mask = optional_column("y_mask", &items, |item| item.y_mask)?;

        let seq_lengths = items
            .iter()
            .map(|item| item.seq_length.unwrap_or(item.observations.len()))
            .collect();
        let statics = items.iter().map(|item| item.static_features.clone()).collect();
        let sequences = items.into_iter().map(|item| item.observations).collect();

        Ok(Self {
            input_dim,
            static_dim,
            sequences,
            seq_lengths,
            statics,
            feature_mask,
            y,
            y_mask,
        })
    }

    /// Checks that every parallel column covers the same examples with consistent widths.
    pub fn validate(&self) -> Result<(), BatchError> {
        self.check_columns()?;

        for row in &self.statics {
            check_count("static width", self.static_dim, row.len())?;
        }
        for (i, sequence) in self.sequences.iter().enumerate() {
            for step in sequence {
                check_count("observation width", self.input_dim, step.len())?;
            }

            if let Some(feature_mask) = &self.feature_mask {
                check_count("feature_mask time steps", sequence.len(), feature_mask[i].len())?;
                for step in &feature_mask[i] {
                    check_count("feature_mask width", self.input_dim, step.len())?;
                }
            }
        }

        Ok(())
    }

    /// Only compares the number of examples in each column.
    pub fn check_columns(&self) -> Result<(), BatchError> {
        let n = self.sequences.len();

        check_count("seq_lengths", n, self.seq_lengths.len())?;
        check_count("static", n, self.statics.len())?;
        if let Some(feature_mask) = &self.feature_mask {
            check_count("feature_mask", n, feature_mask.len())?;
        }
        if let Some(y) = &self.y {
            check_count("y", n, y.len())?;
        }
        if let Some(y_mask) = &self.y_mask {
            check_count("y_mask", n, y_mask.len())?;
        }

        Ok(())
    }

    pub fn len(&self) -> usize {
        self.sequences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequences.is_empty()
    }

    pub fn input_dim(&self) -> usize {
        self.input_dim
    }

    pub fn static_dim(&self) -> usize {
        self.static_dim
    }

    pub fn seq_lengths(&self) -> &[usize] {
        &self.seq_lengths
    }

    pub fn has_feature_mask(&self) -> bool {
        self.feature_mask.is_some()
    }
}

impl Dataset<DmmItem> for DmmDataset {
    fn get(&self, index: usize) -> Option<DmmItem> {
        let observations = self.sequences.get(index)?.clone();

        Some(DmmItem {
            observations,
            seq_length: self.seq_lengths.get(index).copied(),
            static_features: self.statics.get(index)?.clone(),
            feature_mask: self
                .feature_mask
                .as_ref()
                .and_then(|mask| mask.get(index).cloned()),
            y: self.y.as_ref().and_then(|y| y.get(index).copied()),
            y_mask: self.y_mask.as_ref().and_then(|m| m.get(index).copied()),
        })
    }

    fn len(&self) -> usize {
        self.sequences.len()
    }
}

fn check_count(field: &'static str, expected: usize, found: usize) -> Result<(), BatchError> {
    if expected == found {
        Ok(())
    } else {
        Err(BatchError::ShapeMismatch {
            field,
            expected,
            found,
        })
    }
}

fn optional_column<T>(
    field: &'static str,
    items: &[DmmItem],
    get: impl Fn(&DmmItem) -> Option<T>,
) -> Result<Option<Vec<T>>, BatchError> {
    let values: Vec<T> = items.iter().filter_map(get).collect();

    if values.is_empty() {
        Ok(None)
    } else if values.len() == items.len() {
        Ok(Some(values))
    } else {
        Err(BatchError::ShapeMismatch {
            field,
            expected: items.len(),
            found: values.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn item(len: usize, y: Option<f32>) -> DmmItem {
        DmmItem {
            observations: (0..len).map(|t| vec![t as f32, 1.0]).collect(),
            seq_length: None,
            static_features: vec![len as f32],
            feature_mask: None,
            y,
            y_mask: None,
        }
    }

    #[test]
    fn from_dataset_builds_columns() {
        let rows = InMemDataset::new(vec![item(3, Some(1.0)), item(2, Some(0.0))]);

        let dataset = DmmDataset::from_dataset(&rows).unwrap();

        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.input_dim(), 2);
        assert_eq!(dataset.static_dim(), 1);
        assert_eq!(dataset.seq_lengths(), &[3, 2]);
        assert_eq!(dataset.y, Some(vec![1.0, 0.0]));
        assert!(dataset.y_mask.is_none());
        assert!(!dataset.has_feature_mask());
        assert!(dataset.validate().is_ok());
    }

    #[test]
    fn from_dataset_rejects_partial_optional_column() {
        let rows = InMemDataset::new(vec![item(3, Some(1.0)), item(2, None)]);

        let err = DmmDataset::from_dataset(&rows).unwrap_err();

        assert_eq!(
            err,
            BatchError::ShapeMismatch {
                field: "y",
                expected: 2,
                found: 1
            }
        );
    }

    #[test]
    fn validate_detects_parallel_length_mismatch() {
        let dataset = DmmDataset::new(
            1,
            1,
            vec![vec![vec![1.0]], vec![vec![2.0]]],
            vec![1, 1],
            vec![vec![0.0], vec![0.0]],
        )
        .with_y(vec![1.0]);

        let err = dataset.validate().unwrap_err();

        assert!(matches!(err, BatchError::ShapeMismatch { field: "y", .. }));
    }

    #[test]
    fn validate_detects_feature_mask_shape() {
        let dataset = DmmDataset::new(
            2,
            0,
            vec![vec![vec![1.0, 2.0], vec![3.0, 4.0]]],
            vec![2],
            vec![vec![]],
        )
        .with_feature_mask(vec![vec![vec![1.0, 1.0]]]);

        let err = dataset.validate().unwrap_err();

        assert!(matches!(
            err,
            BatchError::ShapeMismatch {
                field: "feature_mask time steps",
                ..
            }
        ));
    }

    #[test]
    fn dataset_rows_round_trip() {
        let dataset = DmmDataset::from_dataset(&InMemDataset::new(vec![item(2, None)])).unwrap();

        let row = dataset.get(0).unwrap();

        assert_eq!(row.observations, item(2, None).observations);
        assert_eq!(row.seq_length, Some(2));
        assert!(dataset.get(1).is_none());
    }

    #[test]
    fn load_json_rows() {
        let path = std::env::temp_dir().join("muonts_dmm_rows.jsonl");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"{{"observations":[[1.0],[2.0]],"seq_length":2,"static_features":[0.5],"feature_mask":null,"y":1.0,"y_mask":1.0}}"#
        )
        .unwrap();
        drop(file);

        let rows = load_from_file(path.to_str().unwrap()).unwrap();

        assert_eq!(rows.len(), 1);
        let row = rows.get(0).unwrap();
        assert_eq!(row.observations, vec![vec![1.0], vec![2.0]]);
        assert_eq!(row.y, Some(1.0));

        std::fs::remove_file(path).unwrap();
    }
}
