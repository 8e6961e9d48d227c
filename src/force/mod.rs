//! # Force optimizer
//!
//! The iterative core of FreeViz. Every sweep projects the examples through the current
//! anchors, lets the projected points attract (same class) and repel (different class)
//! each other, pushes the per-point forces back onto the anchors through the linear
//! projection and takes a bounded step, after which the anchor set is rescaled onto the
//! unit circle.
//!
//! Three implementations are available:
//! - [`Implementation::Fast`]: all ordered pairs under any [`ForceLaw`], with optional
//!   force balancing, radial normalization and continuous classes
//! - [`Implementation::Slow`]: the same pairwise model with the `Linear` law, visiting
//!   pairs by rotating the point arrays
//! - [`Implementation::Lda`]: points pulled towards repelling class centroids

use crate::anchors::{AnchorSet, RestraintMode};
use crate::cancel::CancelToken;
use crate::error::{FreeVizError, Result};
use crate::projection::{project_positions, ProjectionInput};
use log::{debug, warn};

mod centroid;
mod gradient;
mod laws;
mod pairwise;

pub use laws::ForceLaw;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Implementation {
    #[default]
    Fast,
    Slow,
    Lda,
}

/// Parameters of one optimization run. Read-only while the optimizer works.
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizerConfig {
    pub attract_g: f64,
    pub repel_g: f64,
    pub law: ForceLaw,
    /// Width of the `Gaussian` law, used as σ² in e^(−r²/σ).
    pub sigma: f64,
    /// Rescale repulsion so its total magnitude equals the attraction's.
    pub force_balancing: bool,
    pub restraint: RestraintMode,
    pub mirror_symmetry: bool,
    pub implementation: Implementation,
    /// Radial (star-coordinate) normalization of each example; ignored by `Slow`.
    pub normalize_examples: bool,
    pub steps_per_call: usize,
    /// Neighbour count for the `Knn` law, defaults to round(√n).
    pub knn_neighbours: Option<usize>,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            attract_g: 1.0,
            repel_g: 1.0,
            law: ForceLaw::Linear,
            sigma: 1.0,
            force_balancing: false,
            restraint: RestraintMode::Free,
            mirror_symmetry: true,
            implementation: Implementation::Fast,
            normalize_examples: false,
            steps_per_call: 10,
            knn_neighbours: None,
        }
    }
}

/// Outcome of one [`ForceOptimizer::step`] call.
#[derive(Debug, Clone, PartialEq)]
pub struct StepResult {
    pub anchors: AnchorSet,
    /// Largest squared distance any anchor moved during the call.
    pub displacement: f64,
    pub sweeps: usize,
    /// Cancellation was observed; `anchors` are the last completed sweep's.
    pub cancelled: bool,
}

pub struct ForceOptimizer {
    config: OptimizerConfig,
}

impl ForceOptimizer {
    pub fn new(config: OptimizerConfig) -> Self {
        ForceOptimizer { config }
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// Runs `steps_per_call` sweeps starting from `anchors`.
    ///
    /// `anchors` is never modified. Data and numeric problems found before the first
    /// sweep completes are returned as errors; a zero gradient after some progress ends
    /// the call early with what was reached so far.
    pub fn step(
        &self,
        input: &ProjectionInput,
        anchors: &AnchorSet,
        cancel: &CancelToken,
    ) -> Result<StepResult> {
        input.check_anchors(anchors)?;
        self.check_classes(input)?;

        let mut xs = anchors.xs();
        let mut ys = anchors.ys();
        let mut sweeps = 0;
        let mut cancelled = false;

        for _ in 0..self.config.steps_per_call.max(1) {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }
            match self.sweep(input, &xs, &ys) {
                Ok((nx, ny)) => {
                    xs = nx;
                    ys = ny;
                    sweeps += 1;
                }
                Err(err) if sweeps == 0 => return Err(err),
                Err(err) => {
                    warn!("Stopping after {} sweeps: {}", sweeps, err);
                    break;
                }
            }
        }

        let new_anchors = anchors.with_coordinates(&xs, &ys);
        let displacement = anchors.max_squared_displacement(&new_anchors);
        debug!(
            "{:?} step: {} sweeps over {} examples, displacement {:.3e}",
            self.config.implementation,
            sweeps,
            input.n_examples(),
            displacement
        );

        Ok(StepResult {
            anchors: new_anchors,
            displacement,
            sweeps,
            cancelled,
        })
    }

    fn check_classes(&self, input: &ProjectionInput) -> Result<()> {
        if self.config.implementation != Implementation::Fast {
            input.classes().discrete()?;
        }
        let present = input.classes().present_classes();
        if present < 2 {
            return Err(FreeVizError::SingleClass(present));
        }
        Ok(())
    }

    fn sweep(
        &self,
        input: &ProjectionInput,
        xs: &[f64],
        ys: &[f64],
    ) -> Result<(Vec<f64>, Vec<f64>)> {
        let normalize =
            self.config.normalize_examples && self.config.implementation != Implementation::Slow;
        let positions = project_positions(input.data(), xs, ys, normalize);

        let field = match self.config.implementation {
            Implementation::Fast => pairwise::all_pairs_forces(
                &positions.x,
                &positions.y,
                input.classes(),
                &self.config,
            ),
            Implementation::Slow => {
                let (classes, _) = input.classes().discrete()?;
                pairwise::rotation_forces(
                    &positions.x,
                    &positions.y,
                    classes,
                    self.config.attract_g,
                    self.config.repel_g,
                )
            }
            Implementation::Lda => {
                let (classes, class_count) = input.classes().discrete()?;
                centroid::centroid_forces(&positions.x, &positions.y, classes, class_count)
            }
        };

        let (gx, gy) = gradient::backpropagate(input.data(), &field, &positions.scale);
        gradient::apply_gradient(
            xs,
            ys,
            &gx,
            &gy,
            self.config.restraint,
            self.config.mirror_symmetry,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projection::{project, ClassColumn, ClassValue};
    use approx::assert_relative_eq;
    use ndarray::Array2;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    /// Two classes along separate attributes plus one noise attribute.
    fn separable_input(n_per_class: usize, seed: u64) -> ProjectionInput {
        let mut rng = StdRng::seed_from_u64(seed);
        let n = 2 * n_per_class;
        let mut data = Array2::zeros((3, n));
        let mut classes = Vec::with_capacity(n);
        for i in 0..n {
            let class = i % 2;
            data[[class, i]] = 0.7 + 0.3 * rng.random::<f64>();
            data[[1 - class, i]] = 0.3 * rng.random::<f64>();
            data[[2, i]] = rng.random::<f64>();
            classes.push(class);
        }
        ProjectionInput::new(
            vec!["a".into(), "b".into(), "noise".into()],
            data,
            ClassColumn::Discrete {
                values: classes,
                class_count: 2,
            },
        )
        .unwrap()
    }

    fn centroid_distance(input: &ProjectionInput, anchors: &AnchorSet) -> f64 {
        let points = project(input, anchors, false).unwrap();
        let mut sums = [(0.0, 0.0, 0.0); 2];
        for p in &points {
            if let ClassValue::Discrete(c) = p.class {
                sums[c].0 += p.x;
                sums[c].1 += p.y;
                sums[c].2 += 1.0;
            }
        }
        let (a, b) = (sums[0], sums[1]);
        (a.0 / a.2 - b.0 / b.2).hypot(a.1 / a.2 - b.1 / b.2)
    }

    fn anchors_for(input: &ProjectionInput) -> AnchorSet {
        AnchorSet::from_coordinates(&[0.9, 0.7, 0.6], &[0.1, 0.5, 0.8], input.labels()).unwrap()
    }

    #[test]
    fn test_step_separates_classes() {
        let input = separable_input(30, 1);
        let anchors = anchors_for(&input);
        let before = centroid_distance(&input, &anchors);

        for implementation in [Implementation::Fast, Implementation::Slow, Implementation::Lda] {
            let optimizer = ForceOptimizer::new(OptimizerConfig {
                implementation,
                attract_g: 0.1,
                steps_per_call: 5,
                ..OptimizerConfig::default()
            });
            let result = optimizer.step(&input, &anchors, &CancelToken::new()).unwrap();
            assert_eq!(result.sweeps, 5);
            assert!(!result.cancelled);
            assert_relative_eq!(result.anchors.max_radius(), 1.0, epsilon = 1e-12);
            assert!(
                centroid_distance(&input, &result.anchors) > before,
                "{:?} should pull the class centroids apart",
                implementation
            );
            assert_eq!(result.anchors.labels(), anchors.labels());
        }
    }

    #[test]
    fn test_slow_matches_fast_for_linear_law() {
        let input = separable_input(15, 2);
        let anchors = anchors_for(&input);
        let config = OptimizerConfig {
            steps_per_call: 1,
            mirror_symmetry: false,
            ..OptimizerConfig::default()
        };
        let cancel = CancelToken::new();
        let fast = ForceOptimizer::new(config.clone())
            .step(&input, &anchors, &cancel)
            .unwrap();
        let slow = ForceOptimizer::new(OptimizerConfig {
            implementation: Implementation::Slow,
            ..config
        })
        .step(&input, &anchors, &cancel)
        .unwrap();

        assert!(fast.anchors.max_squared_displacement(&slow.anchors) < 1e-16);
    }

    #[test]
    fn test_cancel_before_first_sweep_returns_input() {
        let input = separable_input(10, 3);
        let anchors = anchors_for(&input);
        let cancel = CancelToken::new();
        cancel.cancel();

        let result = ForceOptimizer::new(OptimizerConfig::default())
            .step(&input, &anchors, &cancel)
            .unwrap();
        assert!(result.cancelled);
        assert_eq!(result.sweeps, 0);
        assert_eq!(result.anchors, anchors);
        assert_eq!(result.displacement, 0.0);
    }

    #[test]
    fn test_anchors_at_origin_are_a_no_op() {
        let input = separable_input(10, 4);
        let anchors = AnchorSet::at_origin(input.labels()).unwrap();
        let res = ForceOptimizer::new(OptimizerConfig::default()).step(
            &input,
            &anchors,
            &CancelToken::new(),
        );
        assert!(matches!(res, Err(FreeVizError::ZeroGradient)));
    }

    #[test]
    fn test_single_class_is_rejected() {
        let data = Array2::from_elem((2, 5), 0.5);
        let input = ProjectionInput::new(
            vec!["a".into(), "b".into()],
            data,
            ClassColumn::Discrete {
                values: vec![1; 5],
                class_count: 3,
            },
        )
        .unwrap();
        let anchors = AnchorSet::radial(input.labels()).unwrap();
        let res = ForceOptimizer::new(OptimizerConfig::default()).step(
            &input,
            &anchors,
            &CancelToken::new(),
        );
        assert!(matches!(res, Err(FreeVizError::SingleClass(1))));
    }

    #[test]
    fn test_lda_requires_discrete_class() {
        let input = ProjectionInput::new(
            vec!["a".into(), "b".into()],
            Array2::from_shape_fn((2, 4), |(i, j)| (i + j) as f64 / 5.0),
            ClassColumn::Continuous {
                values: vec![0.0, 0.5, 1.0, 1.5],
            },
        )
        .unwrap();
        let anchors = AnchorSet::radial(input.labels()).unwrap();
        let lda = ForceOptimizer::new(OptimizerConfig {
            implementation: Implementation::Lda,
            ..OptimizerConfig::default()
        });
        assert!(matches!(
            lda.step(&input, &anchors, &CancelToken::new()),
            Err(FreeVizError::DiscreteClassRequired)
        ));

        // the pairwise model handles a continuous class
        let fast = ForceOptimizer::new(OptimizerConfig::default());
        assert!(fast.step(&input, &anchors, &CancelToken::new()).is_ok());
    }

    #[test]
    fn test_mismatched_anchors_are_rejected() {
        let input = separable_input(5, 5);
        let anchors = AnchorSet::radial(&["a", "b"]).unwrap();
        let res = ForceOptimizer::new(OptimizerConfig::default()).step(
            &input,
            &anchors,
            &CancelToken::new(),
        );
        assert!(matches!(res, Err(FreeVizError::DimensionMismatch { .. })));
    }

    #[test]
    fn test_every_law_and_restraint_keeps_anchors_bounded() {
        let input = separable_input(20, 6);
        let anchors = anchors_for(&input);
        let laws = [
            ForceLaw::Linear,
            ForceLaw::Square,
            ForceLaw::Gaussian,
            ForceLaw::Knn,
            ForceLaw::LinearPlus,
        ];
        let restraints = [
            RestraintMode::Free,
            RestraintMode::Radial,
            RestraintMode::OrderedRadial,
        ];
        for law in laws {
            for restraint in restraints {
                let optimizer = ForceOptimizer::new(OptimizerConfig {
                    law,
                    restraint,
                    force_balancing: true,
                    normalize_examples: true,
                    steps_per_call: 5,
                    ..OptimizerConfig::default()
                });
                let result = optimizer.step(&input, &anchors, &CancelToken::new()).unwrap();
                assert_relative_eq!(result.anchors.max_radius(), 1.0, epsilon = 1e-9);
                if restraint == RestraintMode::Radial {
                    for anchor in &result.anchors {
                        assert_relative_eq!(anchor.radius(), 1.0, epsilon = 1e-9);
                    }
                }
            }
        }
    }
}
