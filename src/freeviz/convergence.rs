use crate::anchors::AnchorSet;
use std::collections::VecDeque;

/// Sliding window over anchor snapshots.
///
/// Once `window` snapshots are held, the metric is the largest squared distance any
/// anchor travelled between the oldest and newest snapshot. The optimization has reached
/// a plateau when that metric drops below `tolerance`.
#[derive(Debug, Clone)]
pub struct PlateauDetector {
    window: usize,
    tolerance: f64,
    snapshots: VecDeque<Vec<(f64, f64)>>,
    last_metric: Option<f64>,
}

impl PlateauDetector {
    pub fn new(window: usize, tolerance: f64) -> Self {
        let window = window.max(2);
        PlateauDetector {
            window,
            tolerance,
            snapshots: VecDeque::with_capacity(window),
            last_metric: None,
        }
    }

    /// Records a snapshot and returns the metric when the window is full.
    pub fn push(&mut self, anchors: &AnchorSet) -> Option<f64> {
        let snapshot: Vec<(f64, f64)> = anchors.iter().map(|a| (a.x, a.y)).collect();
        if self.snapshots.len() == self.window {
            self.snapshots.pop_front();
        }
        self.snapshots.push_back(snapshot);

        self.last_metric = match (self.snapshots.front(), self.snapshots.back()) {
            (Some(oldest), Some(newest)) if self.snapshots.len() == self.window => Some(
                oldest
                    .iter()
                    .zip(newest)
                    .map(|(a, b)| (a.0 - b.0).powi(2) + (a.1 - b.1).powi(2))
                    .fold(0.0, f64::max),
            ),
            _ => None,
        };
        self.last_metric
    }

    pub fn metric(&self) -> Option<f64> {
        self.last_metric
    }

    pub fn converged(&self) -> bool {
        self.last_metric.is_some_and(|m| m < self.tolerance)
    }

    pub fn reset(&mut self) {
        self.snapshots.clear();
        self.last_metric = None;
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn set(x: f64) -> AnchorSet {
        AnchorSet::from_coordinates(&[x, 0.0], &[0.0, 1.0], &["a", "b"]).unwrap()
    }

    #[test]
    fn test_metric_needs_full_window() {
        let mut detector = PlateauDetector::new(3, 1e-3);
        assert_eq!(detector.push(&set(1.0)), None);
        assert_eq!(detector.push(&set(0.9)), None);
        assert!(!detector.converged());

        let m = detector.push(&set(0.5)).unwrap();
        assert_abs_diff_eq!(m, 0.25, epsilon = 1e-12);
        assert!(!detector.converged());
        assert_eq!(detector.len(), 3);
    }

    #[test]
    fn test_plateau_is_detected() {
        let mut detector = PlateauDetector::new(4, 1e-3);
        for x in [1.0, 0.5, 0.5, 0.5, 0.5, 0.51] {
            detector.push(&set(x));
        }
        // oldest 0.5, newest 0.51
        assert_abs_diff_eq!(detector.metric().unwrap(), 1e-4, epsilon = 1e-12);
        assert!(detector.converged());

        detector.reset();
        assert!(detector.is_empty());
        assert!(!detector.converged());
    }
}
