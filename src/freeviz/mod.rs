//! # FreeViz
//!
//! The orchestration layer. [`FreeViz`] owns the data provider, the current anchor set and
//! all configuration, and drives the [`ForceOptimizer`] until the anchors settle. It also
//! exposes the non-iterative layouts (radial, random, eigen projection, class-balanced
//! signal-to-noise placement).
//!
//! Anchor updates are computed into a new set and swapped in only on success, so a
//! failed call never leaves a partially updated layout behind.

use crate::anchors::{AnchorSet, RestraintMode};
use crate::cancel::CancelToken;
use crate::eigen::{EigenProjection, EigenProjector};
use crate::error::{FreeVizError, Result};
use crate::force::{ForceLaw, ForceOptimizer, Implementation, OptimizerConfig};
use crate::heuristics::{AttributeRankingCache, ClassBalancedLayout};
use crate::projection::{project, ProjectedPoint, ProjectionDataProvider, ProjectionInput};
use log::{debug, info, warn};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

mod convergence;

pub use convergence::PlateauDetector;

/// Rounds of `steps_per_call` sweeps run by the `Slow` and `Lda` implementations.
const FIXED_ROUNDS: usize = 50;

/// Sweeps the `Fast` implementation may run when no `max_calls` is set.
pub const DEFAULT_SWEEP_BUDGET: usize = 2000;

pub struct FreeVizBuilder {
    config: OptimizerConfig,
    window: usize,
    tolerance: f64,
    max_calls: Option<usize>,
    seed: u64,
    layout: ClassBalancedLayout,
    eigen: EigenProjector,
}

impl Default for FreeVizBuilder {
    fn default() -> Self {
        FreeVizBuilder {
            config: OptimizerConfig::default(),
            window: 50,
            tolerance: 1e-3,
            max_calls: None,
            seed: 42,
            layout: ClassBalancedLayout::default(),
            eigen: EigenProjector::default(),
        }
    }
}

impl FreeVizBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: OptimizerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn attract_g(mut self, attract_g: f64) -> Self {
        self.config.attract_g = attract_g;
        self
    }

    pub fn repel_g(mut self, repel_g: f64) -> Self {
        self.config.repel_g = repel_g;
        self
    }

    pub fn law(mut self, law: ForceLaw) -> Self {
        self.config.law = law;
        self
    }

    pub fn sigma(mut self, sigma: f64) -> Self {
        self.config.sigma = sigma;
        self
    }

    pub fn force_balancing(mut self, force_balancing: bool) -> Self {
        self.config.force_balancing = force_balancing;
        self
    }

    pub fn restraint(mut self, restraint: RestraintMode) -> Self {
        self.config.restraint = restraint;
        self
    }

    pub fn mirror_symmetry(mut self, mirror_symmetry: bool) -> Self {
        self.config.mirror_symmetry = mirror_symmetry;
        self
    }

    pub fn implementation(mut self, implementation: Implementation) -> Self {
        self.config.implementation = implementation;
        self
    }

    pub fn normalize_examples(mut self, normalize_examples: bool) -> Self {
        self.config.normalize_examples = normalize_examples;
        self
    }

    pub fn knn_neighbours(mut self, k: usize) -> Self {
        self.config.knn_neighbours = Some(k);
        self
    }

    /// Number of snapshots the plateau detector compares, the starting layout included.
    pub fn window(mut self, window: usize) -> Self {
        self.window = window;
        self
    }

    pub fn tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Upper bound on optimizer calls for the `Fast` implementation. Defaults to enough
    /// calls for [`DEFAULT_SWEEP_BUDGET`] sweeps.
    pub fn max_calls(mut self, max_calls: usize) -> Self {
        self.max_calls = Some(max_calls);
        self
    }

    /// Seed for the random anchor layouts.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn place_attributes(mut self, place_attributes: usize) -> Self {
        self.layout.place_attributes = place_attributes;
        self
    }

    pub fn spread(mut self, spread: f64) -> Self {
        self.layout.spread = spread;
        self
    }

    pub fn class_permutation(mut self, permutation: Vec<usize>) -> Self {
        self.layout.class_permutation = Some(permutation);
        self
    }

    pub fn eigen_projector(mut self, eigen: EigenProjector) -> Self {
        self.eigen = eigen;
        self
    }

    pub fn build<P: ProjectionDataProvider>(self) -> FreeViz<P> {
        FreeViz {
            data: None,
            anchors: AnchorSet::default(),
            config: self.config,
            window: self.window,
            tolerance: self.tolerance,
            max_calls: self.max_calls,
            rng: ChaCha8Rng::seed_from_u64(self.seed),
            layout: self.layout,
            eigen: self.eigen,
            ranking: AttributeRankingCache::new(),
        }
    }
}

#[derive(Debug)]
pub enum OptimizeStatus {
    /// The plateau detector fired.
    Converged,
    /// A fixed number of rounds, or the single requested step, completed.
    Finished,
    /// `max_calls` optimizer calls ran without convergence.
    StepLimit,
    Cancelled,
    /// Nothing was changed; the inputs did not allow an optimization.
    NoOp(FreeVizError),
    /// A numeric problem after some progress; the anchors hold the last good layout.
    Stalled(FreeVizError),
}

#[derive(Debug)]
pub struct OptimizeReport {
    pub converged: bool,
    pub sweeps: usize,
    pub calls: usize,
    pub status: OptimizeStatus,
}

impl OptimizeReport {
    fn new(status: OptimizeStatus, sweeps: usize, calls: usize) -> Self {
        OptimizeReport {
            converged: matches!(status, OptimizeStatus::Converged),
            sweeps,
            calls,
            status,
        }
    }

    pub fn is_no_op(&self) -> bool {
        matches!(self.status, OptimizeStatus::NoOp(_))
    }
}

/// Reported after every optimizer call.
#[derive(Debug, Clone, Copy)]
pub struct Progress<'a> {
    pub calls: usize,
    pub sweeps: usize,
    pub displacement: f64,
    /// Plateau metric, `None` until the detector window is full.
    pub plateau: Option<f64>,
    pub anchors: &'a AnchorSet,
}

pub struct FreeViz<P: ProjectionDataProvider> {
    data: Option<P>,
    anchors: AnchorSet,
    config: OptimizerConfig,
    window: usize,
    tolerance: f64,
    max_calls: Option<usize>,
    rng: ChaCha8Rng,
    layout: ClassBalancedLayout,
    eigen: EigenProjector,
    ranking: AttributeRankingCache,
}

impl<P: ProjectionDataProvider> FreeViz<P> {
    /// Replaces the data, drops cached rankings and the class permutation, and shows every
    /// attribute in a radial layout.
    pub fn set_data(&mut self, data: P) {
        self.data = Some(data);
        self.ranking.invalidate();
        self.layout.class_permutation = None;
        self.show_all_attributes();
    }

    pub fn data(&self) -> Option<&P> {
        self.data.as_ref()
    }

    pub fn anchors(&self) -> &AnchorSet {
        &self.anchors
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut OptimizerConfig {
        &mut self.config
    }

    pub fn layout_mut(&mut self) -> &mut ClassBalancedLayout {
        &mut self.layout
    }

    pub fn ranking_cache(&self) -> &AttributeRankingCache {
        &self.ranking
    }

    pub fn shown_attributes(&self) -> Vec<String> {
        self.anchors.labels()
    }

    /// Shows every attribute of the data in a radial layout. No-op without data.
    pub fn show_all_attributes(&mut self) {
        let Some(data) = &self.data else { return };
        let labels = data.attribute_labels();
        match AnchorSet::radial(&labels) {
            Ok(anchors) => self.anchors = anchors,
            Err(err) => warn!("Cannot show all attributes: {}", err),
        }
    }

    /// Replaces the shown attributes with `labels` in a radial layout.
    pub fn set_shown_attributes<S: AsRef<str>>(&mut self, labels: &[S]) -> Result<()> {
        let data = self.data.as_ref().ok_or(FreeVizError::NoData)?;
        if let Some(unknown) = labels
            .iter()
            .find(|l| data.attribute_index(l.as_ref()).is_none())
        {
            return Err(FreeVizError::UnknownAttribute(unknown.as_ref().to_string()));
        }
        self.anchors = AnchorSet::radial(labels)?;
        Ok(())
    }

    /// Installs an externally built anchor set. Every label must be known to the data.
    pub fn set_anchors(&mut self, anchors: AnchorSet) -> Result<()> {
        if let Some(data) = &self.data {
            if let Some(unknown) = anchors
                .iter()
                .find(|a| data.attribute_index(&a.label).is_none())
            {
                return Err(FreeVizError::UnknownAttribute(unknown.label.clone()));
            }
        }
        self.anchors = anchors;
        Ok(())
    }

    /// Evenly spaced anchors on the unit circle for the shown attributes.
    pub fn radial_anchors(&mut self) {
        if self.anchors.is_empty() {
            return;
        }
        if let Ok(anchors) = AnchorSet::radial(&self.anchors.labels()) {
            self.anchors = anchors;
        }
    }

    /// Random anchors for the shown attributes according to the restraint mode.
    pub fn random_anchors(&mut self) -> Result<()> {
        if self.data.is_none() {
            return Err(FreeVizError::NoData);
        }
        let mut anchors =
            AnchorSet::random(&self.anchors.labels(), self.config.restraint, &mut self.rng)?;
        if self.config.mirror_symmetry && self.config.restraint != RestraintMode::OrderedRadial {
            anchors.canonicalize_mirror();
        }
        self.anchors = anchors;
        Ok(())
    }

    pub fn optimize(
        &mut self,
        steps_per_call: usize,
        single_step: bool,
        cancel: &CancelToken,
    ) -> OptimizeReport {
        self.optimize_with_progress(steps_per_call, single_step, cancel, |_| {})
    }

    /// Optimizes the shown anchors in place.
    ///
    /// # Parameters
    /// - `steps_per_call`: sweeps per optimizer call
    /// - `single_step`: stop after one call (`Fast`) or one sweep (`Slow`, `Lda`)
    /// - `cancel`: polled between sweeps
    /// - `progress`: invoked after every optimizer call
    ///
    /// # Returns
    /// An [`OptimizeReport`]. Data and numeric problems before the first sweep yield
    /// [`OptimizeStatus::NoOp`] with the anchors untouched.
    pub fn optimize_with_progress<F>(
        &mut self,
        steps_per_call: usize,
        single_step: bool,
        cancel: &CancelToken,
        mut progress: F,
    ) -> OptimizeReport
    where
        F: FnMut(&Progress<'_>),
    {
        let input = match self.gather() {
            Ok(input) => input,
            Err(err) => {
                debug!("Nothing to optimize: {}", err);
                return OptimizeReport::new(OptimizeStatus::NoOp(err), 0, 0);
            }
        };

        let fast = self.config.implementation == Implementation::Fast;
        let steps = if single_step && !fast {
            1
        } else {
            steps_per_call.max(1)
        };
        let optimizer = ForceOptimizer::new(OptimizerConfig {
            steps_per_call: steps,
            ..self.config.clone()
        });
        let rounds = if single_step {
            1
        } else if fast {
            self.max_calls.unwrap_or_else(|| DEFAULT_SWEEP_BUDGET.div_ceil(steps))
        } else {
            FIXED_ROUNDS
        };

        let mut detector = PlateauDetector::new(self.window, self.tolerance);
        detector.push(&self.anchors);
        let mut sweeps = 0;
        let mut calls = 0;

        let status = loop {
            if cancel.is_cancelled() {
                break OptimizeStatus::Cancelled;
            }
            if calls >= rounds {
                break if single_step || !fast {
                    OptimizeStatus::Finished
                } else {
                    OptimizeStatus::StepLimit
                };
            }

            let result = match optimizer.step(&input, &self.anchors, cancel) {
                Ok(result) => result,
                Err(err) if calls == 0 => break OptimizeStatus::NoOp(err),
                Err(err) => {
                    warn!("Optimization stalled after {} sweeps: {}", sweeps, err);
                    break OptimizeStatus::Stalled(err);
                }
            };
            calls += 1;
            sweeps += result.sweeps;
            self.anchors = result.anchors;

            let plateau = if fast { detector.push(&self.anchors) } else { None };
            progress(&Progress {
                calls,
                sweeps,
                displacement: result.displacement,
                plateau,
                anchors: &self.anchors,
            });

            if result.cancelled {
                break OptimizeStatus::Cancelled;
            }
            if fast && detector.converged() {
                break OptimizeStatus::Converged;
            }
        };

        match &status {
            OptimizeStatus::Converged => info!(
                "Converged after {} sweeps ({} calls), plateau {:.3e}",
                sweeps,
                calls,
                detector.metric().unwrap_or_default()
            ),
            OptimizeStatus::NoOp(err) => debug!("Optimization skipped: {}", err),
            other => debug!("Optimization ended after {} sweeps: {:?}", sweeps, other),
        }
        OptimizeReport::new(status, sweeps, calls)
    }

    /// Installs the eigen projection of the shown attributes and returns it.
    pub fn find_projection(&mut self) -> Result<EigenProjection> {
        let data = self.data.as_ref().ok_or(FreeVizError::NoData)?;
        let projection = self.eigen.project_from(data, &self.anchors.labels())?;
        self.anchors = projection.anchors.clone();
        Ok(projection)
    }

    /// Replaces the anchors by the class-balanced signal-to-noise layout. The attribute
    /// ranking is computed once per data set.
    pub fn s2n_mix_anchors(&mut self) -> Result<()> {
        let data = self.data.as_ref().ok_or(FreeVizError::NoData)?;
        let ranked = self.ranking.get_or_compute(data)?;
        self.anchors = self.layout.place(ranked)?;
        Ok(())
    }

    /// Projects the valid examples through the current anchors.
    pub fn project(&self) -> Result<Vec<ProjectedPoint>> {
        let input = self.gather()?;
        project(&input, &self.anchors, self.config.normalize_examples)
    }

    fn gather(&self) -> Result<ProjectionInput> {
        let data = self.data.as_ref().ok_or(FreeVizError::NoData)?;
        ProjectionInput::gather(data, &self.anchors.labels())
    }
}
