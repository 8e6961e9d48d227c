//! # Projection
//!
//! The seam between the optimizer and whoever owns the data. A [`ProjectionDataProvider`]
//! hands out scaled attribute columns, validity masks and class labels; [`ProjectionInput`]
//! gathers what one optimization call needs, and [`project`] applies an [`AnchorSet`] as a
//! linear (optionally radial-normalized) projection.

use crate::anchors::AnchorSet;
use crate::error::{FreeVizError, Result};
use anyhow::anyhow;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};

mod scaled;

pub use scaled::ScaledData;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClassValue {
    Discrete(usize),
    Continuous(f64),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClassKind {
    Discrete { values: Vec<String> },
    Continuous,
}

impl ClassKind {
    pub fn is_discrete(&self) -> bool {
        matches!(self, ClassKind::Discrete { .. })
    }
}

/// Source of scaled example data.
///
/// Columns are laid out `[attribute][example]`. An example is valid for a set of
/// attributes only when none of them is missing.
pub trait ProjectionDataProvider {
    fn example_count(&self) -> usize;

    fn attribute_labels(&self) -> Vec<String>;

    fn attribute_index(&self, label: &str) -> Option<usize>;

    fn scaled_columns(&self, attributes: &[usize]) -> anyhow::Result<Array2<f64>>;

    fn validity_mask(&self, attributes: &[usize]) -> anyhow::Result<Vec<bool>>;

    /// `None` when the data has no class variable.
    fn class_kind(&self) -> Option<ClassKind>;

    /// `None` when the example's class is missing.
    fn class_label_of(&self, example: usize) -> Option<ClassValue>;

    /// Projected position of a single example, `None` if it has missing values.
    fn project_example(
        &self,
        anchors: &AnchorSet,
        example: usize,
        normalize: bool,
    ) -> anyhow::Result<Option<(f64, f64)>> {
        let indices = anchors
            .iter()
            .map(|a| {
                self.attribute_index(&a.label)
                    .ok_or_else(|| anyhow!("unknown attribute `{}`", a.label))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        let mask = self.validity_mask(&indices)?;
        if !mask.get(example).copied().unwrap_or(false) {
            return Ok(None);
        }
        let columns = self.scaled_columns(&indices)?;
        let values = columns.column(example);
        Ok(Some(project_values(
            values,
            &anchors.xs(),
            &anchors.ys(),
            normalize,
        )))
    }
}

/// Class labels of the valid examples in a [`ProjectionInput`].
#[derive(Debug, Clone, PartialEq)]
pub enum ClassColumn {
    Discrete { values: Vec<usize>, class_count: usize },
    Continuous { values: Vec<f64> },
}

impl ClassColumn {
    pub fn len(&self) -> usize {
        match self {
            ClassColumn::Discrete { values, .. } => values.len(),
            ClassColumn::Continuous { values } => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn value(&self, example: usize) -> ClassValue {
        match self {
            ClassColumn::Discrete { values, .. } => ClassValue::Discrete(values[example]),
            ClassColumn::Continuous { values } => ClassValue::Continuous(values[example]),
        }
    }

    /// Number of distinct class values that actually occur.
    pub fn present_classes(&self) -> usize {
        match self {
            ClassColumn::Discrete {
                values,
                class_count,
            } => {
                let mut seen = vec![false; *class_count];
                values.iter().for_each(|&c| seen[c] = true);
                seen.into_iter().filter(|&s| s).count()
            }
            ClassColumn::Continuous { values } => {
                let mut sorted = values.clone();
                sorted.sort_by(f64::total_cmp);
                sorted.dedup();
                sorted.len()
            }
        }
    }

    pub fn discrete(&self) -> Result<(&[usize], usize)> {
        match self {
            ClassColumn::Discrete {
                values,
                class_count,
            } => Ok((values, *class_count)),
            ClassColumn::Continuous { .. } => Err(FreeVizError::DiscreteClassRequired),
        }
    }
}

/// Data for the shown attributes restricted to valid examples.
#[derive(Debug, Clone)]
pub struct ProjectionInput {
    labels: Vec<String>,
    data: Array2<f64>,
    classes: ClassColumn,
}

impl ProjectionInput {
    pub fn new(labels: Vec<String>, data: Array2<f64>, classes: ClassColumn) -> Result<Self> {
        if data.nrows() != labels.len() {
            return Err(FreeVizError::DimensionMismatch {
                expected: labels.len(),
                actual: data.nrows(),
            });
        }
        if data.ncols() != classes.len() {
            return Err(FreeVizError::DimensionMismatch {
                expected: data.ncols(),
                actual: classes.len(),
            });
        }
        if let ClassColumn::Discrete {
            values,
            class_count,
        } = &classes
        {
            if let Some(&bad) = values.iter().find(|&&c| c >= *class_count) {
                return Err(FreeVizError::DimensionMismatch {
                    expected: *class_count,
                    actual: bad + 1,
                });
            }
        }
        Ok(ProjectionInput {
            labels,
            data,
            classes,
        })
    }

    /// Collects the columns for `labels` and drops examples with a missing attribute value
    /// or a missing class.
    pub fn gather<P, S>(provider: &P, labels: &[S]) -> Result<Self>
    where
        P: ProjectionDataProvider + ?Sized,
        S: AsRef<str>,
    {
        let n_examples = provider.example_count();
        if n_examples == 0 {
            return Err(FreeVizError::NoData);
        }
        if labels.is_empty() {
            return Err(FreeVizError::NoAttributes);
        }
        let class_kind = provider
            .class_kind()
            .ok_or(FreeVizError::DiscreteClassRequired)?;

        let indices = labels
            .iter()
            .map(|label| {
                provider
                    .attribute_index(label.as_ref())
                    .ok_or_else(|| FreeVizError::UnknownAttribute(label.as_ref().to_string()))
            })
            .collect::<Result<Vec<_>>>()?;

        let columns = provider.scaled_columns(&indices)?;
        if columns.dim() != (indices.len(), n_examples) {
            return Err(FreeVizError::DimensionMismatch {
                expected: indices.len() * n_examples,
                actual: columns.len(),
            });
        }
        let mask = provider.validity_mask(&indices)?;
        if mask.len() != n_examples {
            return Err(FreeVizError::DimensionMismatch {
                expected: n_examples,
                actual: mask.len(),
            });
        }

        let mut valid = Vec::with_capacity(n_examples);
        let mut class_values = Vec::with_capacity(n_examples);
        for (example, &ok) in mask.iter().enumerate() {
            if !ok {
                continue;
            }
            if let Some(value) = provider.class_label_of(example) {
                valid.push(example);
                class_values.push(value);
            }
        }
        if valid.is_empty() {
            return Err(FreeVizError::NoValidExamples);
        }

        let classes = match class_kind {
            ClassKind::Discrete { values } => ClassColumn::Discrete {
                values: class_values
                    .iter()
                    .map(|v| match v {
                        ClassValue::Discrete(c) => Ok(*c),
                        ClassValue::Continuous(_) => Err(FreeVizError::DiscreteClassRequired),
                    })
                    .collect::<Result<Vec<_>>>()?,
                class_count: values.len(),
            },
            ClassKind::Continuous => ClassColumn::Continuous {
                values: class_values
                    .iter()
                    .map(|v| match *v {
                        ClassValue::Discrete(c) => c as f64,
                        ClassValue::Continuous(c) => c,
                    })
                    .collect(),
            },
        };

        let data = columns.select(Axis(1), &valid);
        Self::new(
            labels.iter().map(|l| l.as_ref().to_string()).collect(),
            data,
            classes,
        )
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn data(&self) -> ArrayView2<'_, f64> {
        self.data.view()
    }

    pub fn classes(&self) -> &ClassColumn {
        &self.classes
    }

    pub fn n_attributes(&self) -> usize {
        self.data.nrows()
    }

    pub fn n_examples(&self) -> usize {
        self.data.ncols()
    }

    pub(crate) fn check_anchors(&self, anchors: &AnchorSet) -> Result<()> {
        if anchors.len() != self.n_attributes() {
            return Err(FreeVizError::DimensionMismatch {
                expected: self.n_attributes(),
                actual: anchors.len(),
            });
        }
        for (anchor, label) in anchors.iter().zip(&self.labels) {
            if &anchor.label != label {
                return Err(FreeVizError::UnknownAttribute(anchor.label.clone()));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectedPoint {
    pub x: f64,
    pub y: f64,
    pub class: ClassValue,
}

/// Projected coordinates plus the per-example factor that was applied to them.
///
/// `scale[i]` is 1 for the raw projection and 1/Σ|v| under radial normalization; the
/// gradient needs it to attribute a point's force back to the anchors.
#[derive(Debug, Clone)]
pub(crate) struct Positions {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub scale: Vec<f64>,
}

pub(crate) fn project_positions(
    data: ArrayView2<f64>,
    anchor_x: &[f64],
    anchor_y: &[f64],
    normalize: bool,
) -> Positions {
    let ax = ArrayView1::from(anchor_x);
    let ay = ArrayView1::from(anchor_y);
    let raw_x: Array1<f64> = data.t().dot(&ax);
    let raw_y: Array1<f64> = data.t().dot(&ay);

    let scale: Vec<f64> = if normalize {
        data.mapv(f64::abs)
            .sum_axis(Axis(0))
            .iter()
            .map(|&s| if s > 0.0 { 1.0 / s } else { 1.0 })
            .collect()
    } else {
        vec![1.0; data.ncols()]
    };

    Positions {
        x: raw_x.iter().zip(&scale).map(|(v, s)| v * s).collect(),
        y: raw_y.iter().zip(&scale).map(|(v, s)| v * s).collect(),
        scale,
    }
}

fn project_values(values: ArrayView1<f64>, ax: &[f64], ay: &[f64], normalize: bool) -> (f64, f64) {
    let (mut x, mut y, mut total) = (0.0, 0.0, 0.0);
    for ((&v, &a), &b) in values.iter().zip(ax).zip(ay) {
        x += v * a;
        y += v * b;
        total += v.abs();
    }
    if normalize && total > 0.0 {
        (x / total, y / total)
    } else {
        (x, y)
    }
}

/// Projects every valid example of `input` through `anchors`.
pub fn project(
    input: &ProjectionInput,
    anchors: &AnchorSet,
    normalize: bool,
) -> Result<Vec<ProjectedPoint>> {
    input.check_anchors(anchors)?;
    let positions = project_positions(input.data(), &anchors.xs(), &anchors.ys(), normalize);
    Ok(positions
        .x
        .iter()
        .zip(&positions.y)
        .enumerate()
        .map(|(i, (&x, &y))| ProjectedPoint {
            x,
            y,
            class: input.classes().value(i),
        })
        .collect())
}
