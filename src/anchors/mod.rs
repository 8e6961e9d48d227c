//! # Anchors
//!
//! An anchor is a 2D point standing for one attribute in a linear projection. The
//! [`AnchorSet`] keeps its anchors in display order and guarantees unique labels.

use crate::error::{FreeVizError, Result};
use rand::Rng;
use std::collections::HashSet;
use std::f64::consts::PI;

mod symmetry;

#[derive(Debug, Clone, PartialEq)]
pub struct Anchor {
    pub x: f64,
    pub y: f64,
    pub label: String,
}

impl Anchor {
    pub fn new(x: f64, y: f64, label: impl Into<String>) -> Self {
        Anchor {
            x,
            y,
            label: label.into(),
        }
    }

    pub fn radius(&self) -> f64 {
        self.x.hypot(self.y)
    }

    pub fn angle(&self) -> f64 {
        self.y.atan2(self.x)
    }
}

/// How anchors are allowed to move, used both by the random layout and the optimizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RestraintMode {
    /// Anchors move anywhere inside the unit circle.
    #[default]
    Free,
    /// Anchors stay on the unit circle, only their angle changes.
    Radial,
    /// Anchors keep their angular order (angle 2πi/n), only their radius changes.
    OrderedRadial,
}

/// Ordered collection of anchors with unique labels.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AnchorSet {
    anchors: Vec<Anchor>,
}

impl AnchorSet {
    pub fn new(anchors: Vec<Anchor>) -> Result<Self> {
        let mut seen = HashSet::with_capacity(anchors.len());
        for anchor in &anchors {
            if !seen.insert(anchor.label.as_str()) {
                return Err(FreeVizError::DuplicateLabel(anchor.label.clone()));
            }
        }
        Ok(AnchorSet { anchors })
    }

    pub fn from_coordinates<S: AsRef<str>>(xs: &[f64], ys: &[f64], labels: &[S]) -> Result<Self> {
        if xs.len() != labels.len() || ys.len() != labels.len() {
            return Err(FreeVizError::DimensionMismatch {
                expected: labels.len(),
                actual: xs.len().min(ys.len()),
            });
        }
        Self::new(
            xs.iter()
                .zip(ys)
                .zip(labels)
                .map(|((&x, &y), label)| Anchor::new(x, y, label.as_ref()))
                .collect(),
        )
    }

    /// All anchors at the origin; a placeholder until a layout is chosen.
    pub fn at_origin<S: AsRef<str>>(labels: &[S]) -> Result<Self> {
        Self::new(
            labels
                .iter()
                .map(|label| Anchor::new(0.0, 0.0, label.as_ref()))
                .collect(),
        )
    }

    /// Labels evenly spaced on the unit circle, anchor `i` at angle 2πi/n.
    pub fn radial<S: AsRef<str>>(labels: &[S]) -> Result<Self> {
        let phi = 2.0 * PI / labels.len().max(1) as f64;
        Self::new(
            labels
                .iter()
                .enumerate()
                .map(|(i, label)| {
                    let angle = i as f64 * phi;
                    Anchor::new(angle.cos(), angle.sin(), label.as_ref())
                })
                .collect(),
        )
    }

    /// Random placement according to `mode`.
    ///
    /// - `Free`: radius in [0.3, 1.0), random angle, then rescaled so the farthest anchor
    ///   lies on the unit circle.
    /// - `Radial`: random angle on the unit circle.
    /// - `OrderedRadial`: radius in [0.3, 1.0), angle 2πi/n with n the number of labels,
    ///   then rescaled like `Free`.
    pub fn random<S: AsRef<str>, R: Rng>(
        labels: &[S],
        mode: RestraintMode,
        rng: &mut R,
    ) -> Result<Self> {
        let n = labels.len();
        let mut anchors = Vec::with_capacity(n);
        for (i, label) in labels.iter().enumerate() {
            let (r, phi) = match mode {
                RestraintMode::Free => {
                    (rng.random_range(0.3..1.0), rng.random_range(0.0..2.0 * PI))
                }
                RestraintMode::Radial => (1.0, rng.random_range(0.0..2.0 * PI)),
                RestraintMode::OrderedRadial => {
                    (rng.random_range(0.3..1.0), 2.0 * PI * i as f64 / n as f64)
                }
            };
            anchors.push(Anchor::new(r * phi.cos(), r * phi.sin(), label.as_ref()));
        }

        let mut set = Self::new(anchors)?;
        if mode != RestraintMode::Radial && !set.is_empty() {
            set.renormalize_to_unit_circle()?;
        }
        Ok(set)
    }

    pub fn len(&self) -> usize {
        self.anchors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Anchor> {
        self.anchors.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Anchor> {
        self.anchors.iter()
    }

    pub fn labels(&self) -> Vec<String> {
        self.anchors.iter().map(|a| a.label.clone()).collect()
    }

    pub fn xs(&self) -> Vec<f64> {
        self.anchors.iter().map(|a| a.x).collect()
    }

    pub fn ys(&self) -> Vec<f64> {
        self.anchors.iter().map(|a| a.y).collect()
    }

    pub fn position(&self, label: &str) -> Option<usize> {
        self.anchors.iter().position(|a| a.label == label)
    }

    pub fn max_radius(&self) -> f64 {
        self.anchors
            .iter()
            .map(|a| a.x * a.x + a.y * a.y)
            .fold(0.0, f64::max)
            .sqrt()
    }

    /// Scales every anchor by 1/max radius so the farthest one lies on the unit circle.
    pub fn renormalize_to_unit_circle(&mut self) -> Result<()> {
        let m = self.max_radius();
        if m == 0.0 || !m.is_finite() {
            return Err(FreeVizError::DegenerateAnchors);
        }
        for anchor in &mut self.anchors {
            anchor.x /= m;
            anchor.y /= m;
        }
        Ok(())
    }

    pub fn renormalized(&self) -> Result<Self> {
        let mut set = self.clone();
        set.renormalize_to_unit_circle()?;
        Ok(set)
    }

    /// Same labels, new coordinates.
    pub(crate) fn with_coordinates(&self, xs: &[f64], ys: &[f64]) -> Self {
        AnchorSet {
            anchors: self
                .anchors
                .iter()
                .zip(xs.iter().zip(ys))
                .map(|(a, (&x, &y))| Anchor::new(x, y, a.label.clone()))
                .collect(),
        }
    }

    /// Largest squared distance an anchor moved between `self` and `other`.
    pub fn max_squared_displacement(&self, other: &AnchorSet) -> f64 {
        self.anchors
            .iter()
            .zip(&other.anchors)
            .map(|(a, b)| (a.x - b.x).powi(2) + (a.y - b.y).powi(2))
            .fold(0.0, f64::max)
    }

    /// Rotates the set so the first non-origin anchor lies on the positive x axis and
    /// mirrors it so the next non-origin anchor has non-negative y.
    pub fn canonicalize_mirror(&mut self) {
        let mut xs = self.xs();
        let mut ys = self.ys();
        symmetry::canonicalize_mirror(&mut xs, &mut ys);
        *self = self.with_coordinates(&xs, &ys);
    }
}

impl<'a> IntoIterator for &'a AnchorSet {
    type Item = &'a Anchor;
    type IntoIter = std::slice::Iter<'a, Anchor>;

    fn into_iter(self) -> Self::IntoIter {
        self.anchors.iter()
    }
}

pub(crate) use symmetry::canonicalize_mirror;
