use super::{project_values, ClassKind, ClassValue, ProjectionDataProvider};
use crate::anchors::AnchorSet;
use crate::error::{FreeVizError, Result};
use anyhow::{anyhow, bail};
use ndarray::{Array2, Axis};
use std::collections::HashMap;

/// In-memory provider over already scaled values, `NaN` marking a missing value.
#[derive(Debug, Clone)]
pub struct ScaledData {
    labels: Vec<String>,
    index: HashMap<String, usize>,
    values: Array2<f64>,
    class_kind: Option<ClassKind>,
    classes: Vec<Option<ClassValue>>,
}

impl ScaledData {
    /// `values` is `[attribute][example]`. `classes` must have one entry per example when
    /// a class kind is given and is ignored otherwise.
    pub fn new(
        labels: Vec<String>,
        values: Array2<f64>,
        class_kind: Option<ClassKind>,
        classes: Vec<Option<ClassValue>>,
    ) -> Result<Self> {
        if labels.len() != values.nrows() {
            return Err(FreeVizError::DimensionMismatch {
                expected: values.nrows(),
                actual: labels.len(),
            });
        }
        let classes = match class_kind {
            Some(_) if classes.len() != values.ncols() => {
                return Err(FreeVizError::DimensionMismatch {
                    expected: values.ncols(),
                    actual: classes.len(),
                })
            }
            Some(_) => classes,
            None => vec![None; values.ncols()],
        };

        let mut index = HashMap::with_capacity(labels.len());
        for (i, label) in labels.iter().enumerate() {
            if index.insert(label.clone(), i).is_some() {
                return Err(FreeVizError::DuplicateLabel(label.clone()));
            }
        }

        Ok(ScaledData {
            labels,
            index,
            values,
            class_kind,
            classes,
        })
    }

    pub fn with_discrete_class(
        labels: Vec<String>,
        values: Array2<f64>,
        class_names: Vec<String>,
        classes: &[usize],
    ) -> Result<Self> {
        if let Some(&bad) = classes.iter().find(|&&c| c >= class_names.len()) {
            return Err(FreeVizError::DimensionMismatch {
                expected: class_names.len(),
                actual: bad + 1,
            });
        }
        Self::new(
            labels,
            values,
            Some(ClassKind::Discrete {
                values: class_names,
            }),
            classes.iter().map(|&c| Some(ClassValue::Discrete(c))).collect(),
        )
    }

    pub fn with_continuous_class(
        labels: Vec<String>,
        values: Array2<f64>,
        classes: &[f64],
    ) -> Result<Self> {
        Self::new(
            labels,
            values,
            Some(ClassKind::Continuous),
            classes
                .iter()
                .map(|&c| (!c.is_nan()).then_some(ClassValue::Continuous(c)))
                .collect(),
        )
    }

    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    fn check_indices(&self, attributes: &[usize]) -> anyhow::Result<()> {
        if let Some(&bad) = attributes.iter().find(|&&a| a >= self.values.nrows()) {
            bail!(
                "Attribute index {} out of range ({} attributes)",
                bad,
                self.values.nrows()
            );
        }
        Ok(())
    }
}

impl ProjectionDataProvider for ScaledData {
    fn example_count(&self) -> usize {
        self.values.ncols()
    }

    fn attribute_labels(&self) -> Vec<String> {
        self.labels.clone()
    }

    fn attribute_index(&self, label: &str) -> Option<usize> {
        self.index.get(label).copied()
    }

    fn scaled_columns(&self, attributes: &[usize]) -> anyhow::Result<Array2<f64>> {
        self.check_indices(attributes)?;
        Ok(self.values.select(Axis(0), attributes))
    }

    fn validity_mask(&self, attributes: &[usize]) -> anyhow::Result<Vec<bool>> {
        self.check_indices(attributes)?;
        Ok(self
            .values
            .columns()
            .into_iter()
            .map(|column| attributes.iter().all(|&a| !column[a].is_nan()))
            .collect())
    }

    fn class_kind(&self) -> Option<ClassKind> {
        self.class_kind.clone()
    }

    fn class_label_of(&self, example: usize) -> Option<ClassValue> {
        self.classes.get(example).copied().flatten()
    }

    fn project_example(
        &self,
        anchors: &AnchorSet,
        example: usize,
        normalize: bool,
    ) -> anyhow::Result<Option<(f64, f64)>> {
        if example >= self.example_count() {
            bail!(
                "Example index {} out of range ({} examples)",
                example,
                self.example_count()
            );
        }
        let column = self.values.column(example);
        let mut values = Vec::with_capacity(anchors.len());
        for anchor in anchors {
            let index = self
                .attribute_index(&anchor.label)
                .ok_or_else(|| anyhow!("unknown attribute `{}`", anchor.label))?;
            let value = column[index];
            if value.is_nan() {
                return Ok(None);
            }
            values.push(value);
        }
        Ok(Some(project_values(
            ndarray::ArrayView1::from(&values[..]),
            &anchors.xs(),
            &anchors.ys(),
            normalize,
        )))
    }
}
