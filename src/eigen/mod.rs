//! # Eigen projector
//!
//! A one-shot analytic layout. The anchors are the two leading eigenvectors of the
//! class-discrimination form Xᵀ·L·X, optionally whitened by the inverse scatter matrix
//! (XᵀX)⁻¹; without supervision the form is XᵀX itself, i.e. plain PCA.
//!
//! Numeric failures do not surface as errors. They produce a radial layout marked with
//! [`ProjectionSource::RadialFallback`].

use crate::anchors::AnchorSet;
use crate::error::{ErrorKind, FreeVizError, Result};
use crate::projection::{ProjectionDataProvider, ProjectionInput};
use log::{info, warn};
use nalgebra::{DMatrix, DVector, SymmetricEigen};
use ndarray::{ArrayView2, Axis};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

pub struct EigenProjectorBuilder {
    supervised: bool,
    whitening: bool,
    sample_fraction: f64,
    seed: u64,
}

impl Default for EigenProjectorBuilder {
    fn default() -> Self {
        EigenProjectorBuilder {
            supervised: true,
            whitening: true,
            sample_fraction: 1.0,
            seed: 42,
        }
    }
}

impl EigenProjectorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use the class Laplacian. Off means unsupervised PCA.
    pub fn supervised(mut self, supervised: bool) -> Self {
        self.supervised = supervised;
        self
    }

    /// Solve the generalized problem against the scatter matrix XᵀX.
    pub fn whitening(mut self, whitening: bool) -> Self {
        self.whitening = whitening;
        self
    }

    /// Fraction of examples used, clamped to (0, 1]. Values below 1 draw a random subset.
    pub fn sample_fraction(mut self, fraction: f64) -> Self {
        self.sample_fraction = if fraction.is_nan() {
            1.0
        } else {
            fraction.clamp(f64::EPSILON, 1.0)
        };
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn build(self) -> EigenProjector {
        EigenProjector {
            supervised: self.supervised,
            whitening: self.whitening,
            sample_fraction: self.sample_fraction,
            seed: self.seed,
        }
    }
}

#[derive(Debug)]
pub enum ProjectionSource {
    Analytic,
    /// The analytic method failed numerically and a radial layout was used instead.
    RadialFallback(FreeVizError),
}

impl ProjectionSource {
    pub fn is_fallback(&self) -> bool {
        matches!(self, ProjectionSource::RadialFallback(_))
    }
}

#[derive(Debug)]
pub struct EigenProjection {
    pub anchors: AnchorSet,
    pub source: ProjectionSource,
    /// The two selected eigenvalues, `None` for the fallback.
    pub eigenvalues: Option<(f64, f64)>,
}

#[derive(Debug, Clone)]
pub struct EigenProjector {
    supervised: bool,
    whitening: bool,
    sample_fraction: f64,
    seed: u64,
}

impl Default for EigenProjector {
    fn default() -> Self {
        EigenProjectorBuilder::default().build()
    }
}

impl EigenProjector {
    /// Computes anchors for `labels` from `data` laid out `[attribute][example]` with one
    /// class index per example.
    pub fn compute_projection<S: AsRef<str>>(
        &self,
        labels: &[S],
        data: ArrayView2<f64>,
        classes: &[usize],
    ) -> Result<EigenProjection> {
        if labels.is_empty() {
            return Err(FreeVizError::NoAttributes);
        }
        if data.ncols() == 0 {
            return Err(FreeVizError::NoData);
        }
        if data.nrows() != labels.len() {
            return Err(FreeVizError::DimensionMismatch {
                expected: labels.len(),
                actual: data.nrows(),
            });
        }
        if classes.len() != data.ncols() {
            return Err(FreeVizError::DimensionMismatch {
                expected: data.ncols(),
                actual: classes.len(),
            });
        }

        let examples = self.sample_examples(data.ncols());
        let example_classes: Vec<usize> = examples.iter().map(|&i| classes[i]).collect();
        if self.supervised {
            let mut present = example_classes.clone();
            present.sort_unstable();
            present.dedup();
            if present.len() < 2 {
                return Err(FreeVizError::SingleClass(present.len()));
            }
        }
        let x = centered_matrix(data, &examples)?;

        match self.loadings(&x, &example_classes) {
            Ok((xs, ys, eigenvalues)) => {
                info!(
                    "Eigen projection over {} examples and {} attributes, \
                     eigenvalues ({:.4e}, {:.4e})",
                    examples.len(),
                    labels.len(),
                    eigenvalues.0,
                    eigenvalues.1
                );
                Ok(EigenProjection {
                    anchors: AnchorSet::from_coordinates(&xs, &ys, labels)?,
                    source: ProjectionSource::Analytic,
                    eigenvalues: Some(eigenvalues),
                })
            }
            Err(err) if err.kind() == ErrorKind::Numeric => {
                warn!("Eigen projection failed ({}), using a radial layout", err);
                Ok(EigenProjection {
                    anchors: AnchorSet::radial(labels)?,
                    source: ProjectionSource::RadialFallback(err),
                    eigenvalues: None,
                })
            }
            Err(err) => Err(err),
        }
    }

    /// Gathers the valid examples for `labels` from `provider` and projects them.
    ///
    /// The supervised form needs a discrete class; the unsupervised one ignores the class.
    pub fn project_from<P, S>(&self, provider: &P, labels: &[S]) -> Result<EigenProjection>
    where
        P: ProjectionDataProvider + ?Sized,
        S: AsRef<str>,
    {
        let input = ProjectionInput::gather(provider, labels)?;
        if self.supervised {
            let (classes, _) = input.classes().discrete()?;
            self.compute_projection(input.labels(), input.data(), classes)
        } else {
            let classes = vec![0; input.n_examples()];
            self.compute_projection(input.labels(), input.data(), &classes)
        }
    }

    fn sample_examples(&self, n: usize) -> Vec<usize> {
        if self.sample_fraction >= 1.0 {
            return (0..n).collect();
        }
        let amount = ((n as f64 * self.sample_fraction).ceil() as usize).clamp(1, n);
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let mut picked = rand::seq::index::sample(&mut rng, n, amount).into_vec();
        picked.sort_unstable();
        picked
    }

    fn loadings(
        &self,
        x: &DMatrix<f64>,
        classes: &[usize],
    ) -> Result<(Vec<f64>, Vec<f64>, (f64, f64))> {
        if x.ncols() < 2 {
            return Err(FreeVizError::SingularMatrix(
                "at least two attributes are needed".to_string(),
            ));
        }
        let scatter = x.tr_mul(x);
        let target = if self.supervised {
            laplacian_form(x, classes)
        } else {
            scatter.clone()
        };

        let (values, vectors) = if self.whitening {
            whitened_eigen(target, scatter)?
        } else {
            let eigen = symmetric_eigen(target)?;
            (eigen.eigenvalues, eigen.eigenvectors)
        };

        let mut order: Vec<usize> = (0..values.len()).collect();
        order.sort_by(|&a, &b| values[b].total_cmp(&values[a]));
        let (first, second) = (order[0], order[1]);
        if !values[first].is_finite() || !values[second].is_finite() {
            return Err(FreeVizError::SingularMatrix(
                "non-finite eigenvalues".to_string(),
            ));
        }

        let vx = unit_column(&vectors, first)?;
        let vy = unit_column(&vectors, second)?;
        let longest = vx
            .iter()
            .zip(vy.iter())
            .map(|(a, b)| a.hypot(*b))
            .fold(0.0, f64::max);
        if longest == 0.0 || !longest.is_finite() {
            return Err(FreeVizError::DegenerateAnchors);
        }

        Ok((
            vx.iter().map(|v| v / longest).collect(),
            vy.iter().map(|v| v / longest).collect(),
            (values[first], values[second]),
        ))
    }
}

/// `[example][attribute]` matrix of the selected examples with every attribute centered.
fn centered_matrix(data: ArrayView2<f64>, examples: &[usize]) -> Result<DMatrix<f64>> {
    let selected = data.select(Axis(1), examples);
    let means = selected.mean_axis(Axis(1)).ok_or(FreeVizError::NoData)?;
    let centered = &selected - &means.insert_axis(Axis(1));
    Ok(DMatrix::from_fn(examples.len(), data.nrows(), |i, k| centered[[k, i]]))
}

/// Xᵀ·L·X for the class Laplacian L (L[i][j] = −1 for different classes, L[i][i] the number
/// of examples in other classes), accumulated without forming L:
/// Σ_i (n − n_c(i))·x_i·x_iᵀ + Σ_c S_c·S_cᵀ − S·Sᵀ, with S_c the class sums and S their total.
pub(crate) fn laplacian_form(x: &DMatrix<f64>, classes: &[usize]) -> DMatrix<f64> {
    let (n, d) = x.shape();
    let class_count = classes.iter().max().map_or(0, |&c| c + 1);
    let mut sizes = vec![0usize; class_count];
    let mut sums = vec![DVector::<f64>::zeros(d); class_count];
    for (i, &c) in classes.iter().enumerate() {
        sizes[c] += 1;
        sums[c] += x.row(i).transpose();
    }

    let weighted = DMatrix::from_fn(n, d, |i, k| x[(i, k)] * (n - sizes[classes[i]]) as f64);
    let mut form = x.tr_mul(&weighted);
    let mut total = DVector::<f64>::zeros(d);
    for s in &sums {
        form += s * s.transpose();
        total += s;
    }
    form -= &total * total.transpose();
    form
}

fn symmetric_eigen(m: DMatrix<f64>) -> Result<SymmetricEigen<f64, nalgebra::Dyn>> {
    SymmetricEigen::try_new(m, f64::EPSILON, 0).ok_or_else(|| {
        FreeVizError::SingularMatrix("eigen decomposition did not converge".to_string())
    })
}

/// Solves A·v = λ·T·v through the Cholesky factor T = C·Cᵀ: the symmetric matrix
/// C⁻¹·A·C⁻ᵀ has the same eigenvalues, with eigenvectors y giving v = C⁻ᵀ·y.
fn whitened_eigen(
    target: DMatrix<f64>,
    scatter: DMatrix<f64>,
) -> Result<(DVector<f64>, DMatrix<f64>)> {
    let singular =
        || FreeVizError::SingularMatrix("scatter matrix is not positive definite".to_string());
    let c = scatter.cholesky().ok_or_else(singular)?.l();
    let left = c.solve_lower_triangular(&target).ok_or_else(singular)?;
    let both = c.solve_lower_triangular(&left.transpose()).ok_or_else(singular)?;
    let symmetric = (&both + both.transpose()) * 0.5;

    let eigen = symmetric_eigen(symmetric)?;
    let vectors = c
        .tr_solve_lower_triangular(&eigen.eigenvectors)
        .ok_or_else(singular)?;
    Ok((eigen.eigenvalues, vectors))
}

fn unit_column(vectors: &DMatrix<f64>, index: usize) -> Result<DVector<f64>> {
    let v = vectors.column(index).into_owned();
    let norm = v.norm();
    if norm == 0.0 || !norm.is_finite() {
        return Err(FreeVizError::SingularMatrix(format!(
            "eigenvector {} has zero length",
            index
        )));
    }
    Ok(v / norm)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projection::ScaledData;
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Array2};
    use rand::rngs::StdRng;
    use rand::Rng;
    use rand_distr::{Distribution, Normal};

    fn labels(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("a{}", i)).collect()
    }

    #[test]
    fn test_laplacian_form_matches_explicit_product() {
        let mut rng = StdRng::seed_from_u64(3);
        let (n, d) = (12, 3);
        let x = DMatrix::from_fn(n, d, |_, _| rng.random_range(-1.0..1.0));
        let classes: Vec<usize> = (0..n).map(|i| i % 3).collect();

        let mut l = DMatrix::<f64>::zeros(n, n);
        for i in 0..n {
            for j in 0..n {
                if i != j && classes[i] != classes[j] {
                    l[(i, j)] = -1.0;
                    l[(i, i)] += 1.0;
                }
            }
        }
        let explicit = x.transpose() * l * &x;
        let closed = laplacian_form(&x, &classes);
        for (a, b) in explicit.iter().zip(closed.iter()) {
            assert_abs_diff_eq!(a, b, epsilon = 1e-10);
        }
    }

    #[test]
    fn test_centered_matrix_uses_selected_examples() {
        let data = array![[1.0, 2.0, 3.0, 10.0], [0.0, 4.0, 8.0, 0.0]];
        let x = centered_matrix(data.view(), &[0, 1, 2]).unwrap();
        assert_eq!(x.shape(), (3, 2));
        for k in 0..2 {
            assert_abs_diff_eq!(x.column(k).sum(), 0.0, epsilon = 1e-12);
        }
        assert_abs_diff_eq!(x[(0, 0)], -1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(x[(2, 1)], 4.0, epsilon = 1e-12);

        assert!(matches!(
            centered_matrix(data.view(), &[]),
            Err(FreeVizError::NoData)
        ));
    }

    #[test]
    fn test_supervised_whitened_direction_is_fisher_discriminant() {
        let mut rng = StdRng::seed_from_u64(11);
        let wide = Normal::new(0.0, 1.0).unwrap();
        let narrow = Normal::new(0.0, 0.5).unwrap();
        let per_class = 200;
        let n = 2 * per_class;
        let mut data = Array2::zeros((2, n));
        let mut classes = Vec::with_capacity(n);
        for i in 0..n {
            let class = i % 2;
            let offset = 2.0 * class as f64;
            data[[0, i]] = offset + wide.sample(&mut rng);
            data[[1, i]] = offset + narrow.sample(&mut rng);
            classes.push(class);
        }

        let projection = EigenProjector::default()
            .compute_projection(&labels(2), data.view(), &classes)
            .unwrap();
        assert!(matches!(projection.source, ProjectionSource::Analytic));

        // Sw⁻¹·Δ from the sample
        let mut means = [[0.0; 2]; 2];
        for i in 0..n {
            for k in 0..2 {
                means[classes[i]][k] += data[[k, i]] / per_class as f64;
            }
        }
        let mut within = DMatrix::<f64>::zeros(2, 2);
        for i in 0..n {
            let c = classes[i];
            let v = DVector::from_vec(vec![data[[0, i]] - means[c][0], data[[1, i]] - means[c][1]]);
            within += &v * v.transpose();
        }
        let delta = DVector::from_vec(vec![means[1][0] - means[0][0], means[1][1] - means[0][1]]);
        let fisher = within.try_inverse().unwrap() * delta;

        let loading = DVector::from_vec(projection.anchors.xs());
        let cos = loading.dot(&fisher) / (loading.norm() * fisher.norm());
        assert!(cos.abs() > 0.9, "cosine with Fisher direction was {}", cos);
        assert_abs_diff_eq!(projection.anchors.max_radius(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_unsupervised_plain_projection_follows_variance() {
        let mut rng = StdRng::seed_from_u64(5);
        let noise = Normal::new(0.0, 0.05).unwrap();
        let n = 100;
        let data = Array2::from_shape_fn((3, n), |(k, i)| {
            let t = i as f64 / n as f64;
            match k {
                0 => 4.0 * t,
                1 => noise.sample(&mut rng),
                _ => 0.5 * noise.sample(&mut rng),
            }
        });
        let projection = EigenProjectorBuilder::new()
            .supervised(false)
            .whitening(false)
            .build()
            .compute_projection(&labels(3), data.view(), &vec![0; n])
            .unwrap();
        let xs = projection.anchors.xs();
        assert!(xs[0].abs() > 0.99);
        let (first, second) = projection.eigenvalues.unwrap();
        assert!(first >= second);
    }

    #[test]
    fn test_singular_scatter_falls_back_to_radial() {
        // a constant attribute centers to an all-zero column
        let data = Array2::from_shape_fn((3, 6), |(k, i)| match k {
            0 => i as f64 / 5.0,
            1 => 0.5,
            _ => ((i * 7) % 6) as f64 / 5.0,
        });
        let names = labels(3);
        let projection = EigenProjector::default()
            .compute_projection(&names, data.view(), &[0, 1, 0, 1, 0, 1])
            .unwrap();
        assert!(projection.source.is_fallback());
        assert!(matches!(
            projection.source,
            ProjectionSource::RadialFallback(FreeVizError::SingularMatrix(_))
        ));
        assert_eq!(projection.anchors, AnchorSet::radial(&names).unwrap());
        assert!(projection.eigenvalues.is_none());
    }

    #[test]
    fn test_single_attribute_falls_back_to_radial() {
        let data = Array2::from_shape_fn((1, 4), |(_, i)| i as f64);
        let projection = EigenProjector::default()
            .compute_projection(&labels(1), data.view(), &[0, 0, 1, 1])
            .unwrap();
        assert!(projection.source.is_fallback());
        assert_eq!(projection.anchors.len(), 1);
    }

    #[test]
    fn test_data_errors_are_returned() {
        let projector = EigenProjector::default();
        let empty = Array2::<f64>::zeros((2, 0));
        assert!(matches!(
            projector.compute_projection(&labels(2), empty.view(), &[]),
            Err(FreeVizError::NoData)
        ));
        let data = Array2::<f64>::zeros((0, 3));
        assert!(matches!(
            projector.compute_projection::<String>(&[], data.view(), &[0, 1, 0]),
            Err(FreeVizError::NoAttributes)
        ));
        let data = Array2::from_shape_fn((2, 3), |(k, i)| (k + i) as f64);
        assert!(matches!(
            projector.compute_projection(&labels(2), data.view(), &[1, 1, 1]),
            Err(FreeVizError::SingleClass(1))
        ));
    }

    #[test]
    fn test_sampling_is_reproducible() {
        let projector = EigenProjectorBuilder::new().sample_fraction(0.5).seed(9).build();
        let first = projector.sample_examples(40);
        assert_eq!(first.len(), 20);
        assert_eq!(first, projector.sample_examples(40));
        assert!(first.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_project_from_provider() {
        let mut rng = StdRng::seed_from_u64(21);
        let n = 60;
        let classes: Vec<usize> = (0..n).map(|i| i % 2).collect();
        let values = Array2::from_shape_fn((3, n), |(k, i)| {
            let shift = if k == 0 { classes[i] as f64 } else { 0.0 };
            shift + rng.random::<f64>()
        });
        let provider = ScaledData::with_discrete_class(
            labels(3),
            values,
            vec!["no".into(), "yes".into()],
            &classes,
        )
        .unwrap();
        let projection = EigenProjector::default()
            .project_from(&provider, &labels(3))
            .unwrap();
        assert!(matches!(projection.source, ProjectionSource::Analytic));
        assert_eq!(projection.anchors.labels(), labels(3));
        // the class signal lives on the first attribute
        let xs = projection.anchors.xs();
        assert!(xs[0].abs() > xs[1].abs() && xs[0].abs() > xs[2].abs());
    }
}
