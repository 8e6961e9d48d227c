//! # Anchor layout heuristics
//!
//! Signal-to-noise attribute ranking and a class-balanced placement that gives every
//! class its own sector of the unit circle, filled with the attributes that separate that
//! class best.

use crate::anchors::{Anchor, AnchorSet};
use crate::error::{FreeVizError, Result};
use crate::projection::{ClassKind, ClassValue, ProjectionDataProvider};
use log::debug;
use ndarray::Array1;
use std::f64::consts::PI;

/// An attribute with the class it separates best and its signal-to-noise ratio there.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeScore {
    pub label: String,
    pub class: usize,
    pub s2n: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RankedAttributes {
    /// Round-robin over the per-class lists: entry i·C + c comes from class c.
    pub overall: Vec<String>,
    /// One list per class value, best first.
    pub by_class: Vec<Vec<AttributeScore>>,
}

impl RankedAttributes {
    pub fn class_count(&self) -> usize {
        self.by_class.len()
    }
}

/// s2n = (μ_c − μ_rest) / (σ_c + σ_rest) for one attribute and class.
///
/// `None` when either side has no values. A zero denominator gives 0 for equal means and
/// ±∞ otherwise.
fn signal_to_noise(values: &[(f64, usize)], class: usize) -> Option<f64> {
    let (inside, outside): (Vec<_>, Vec<_>) = values.iter().partition(|&&(_, c)| c == class);
    let (mean_in, sd_in) = mean_and_sd(&inside)?;
    let (mean_out, sd_out) = mean_and_sd(&outside)?;
    let diff = mean_in - mean_out;
    let noise = sd_in + sd_out;
    Some(if noise > 0.0 {
        diff / noise
    } else if diff == 0.0 {
        0.0
    } else {
        diff.signum() * f64::INFINITY
    })
}

/// Mean and population standard deviation.
fn mean_and_sd(values: &[&(f64, usize)]) -> Option<(f64, f64)> {
    let column: Array1<f64> = values.iter().map(|&&(v, _)| v).collect();
    let mean = column.mean()?;
    Some((mean, column.std(0.0)))
}

/// Ranks every attribute of `provider` by its best per-class signal-to-noise ratio.
///
/// Examples with a missing class are ignored; for each attribute only the examples where
/// it is present count. Requires a discrete class.
pub fn rank_by_signal_to_noise<P>(provider: &P) -> Result<RankedAttributes>
where
    P: ProjectionDataProvider + ?Sized,
{
    let n = provider.example_count();
    if n == 0 {
        return Err(FreeVizError::NoData);
    }
    let class_count = match provider.class_kind() {
        Some(ClassKind::Discrete { values }) => values.len(),
        _ => return Err(FreeVizError::DiscreteClassRequired),
    };
    let labels = provider.attribute_labels();
    if labels.is_empty() {
        return Err(FreeVizError::NoAttributes);
    }

    let classes: Vec<Option<usize>> = (0..n)
        .map(|i| match provider.class_label_of(i) {
            Some(ClassValue::Discrete(c)) => Some(c),
            _ => None,
        })
        .collect();

    let mut by_class: Vec<Vec<AttributeScore>> = vec![Vec::new(); class_count];
    for label in &labels {
        let index = provider
            .attribute_index(label)
            .ok_or_else(|| FreeVizError::UnknownAttribute(label.clone()))?;
        let column = provider.scaled_columns(&[index])?;
        let valid = provider.validity_mask(&[index])?;
        let values: Vec<(f64, usize)> = column
            .row(0)
            .iter()
            .zip(&valid)
            .zip(&classes)
            .filter_map(|((&v, &ok), &c)| match (ok, c) {
                (true, Some(c)) => Some((v, c)),
                _ => None,
            })
            .collect();

        let best = (0..class_count)
            .filter_map(|c| signal_to_noise(&values, c).map(|s| (c, s)))
            .fold(None, |best: Option<(usize, f64)>, (c, s)| match best {
                Some((_, b)) if b >= s => best,
                _ => Some((c, s)),
            });
        if let Some((class, s2n)) = best {
            by_class[class].push(AttributeScore {
                label: label.clone(),
                class,
                s2n,
            });
        }
    }

    for list in &mut by_class {
        list.sort_by(|a, b| b.s2n.total_cmp(&a.s2n));
    }
    let depth = by_class.iter().map(Vec::len).min().unwrap_or(0);
    let overall = (0..depth)
        .flat_map(|i| by_class.iter().map(move |list| list[i].label.clone()))
        .collect();
    debug!(
        "Ranked {} attributes over {} classes, {} interleaved",
        labels.len(),
        class_count,
        depth * class_count
    );

    Ok(RankedAttributes { overall, by_class })
}

/// Memo for [`rank_by_signal_to_noise`]; must be invalidated whenever the data changes.
#[derive(Debug, Clone, Default)]
pub struct AttributeRankingCache {
    ranked: Option<RankedAttributes>,
}

impl AttributeRankingCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_compute<P>(&mut self, provider: &P) -> Result<&RankedAttributes>
    where
        P: ProjectionDataProvider + ?Sized,
    {
        if self.ranked.is_none() {
            self.ranked = Some(rank_by_signal_to_noise(provider)?);
        }
        self.ranked
            .as_ref()
            .ok_or(FreeVizError::NoAttributes)
    }

    pub fn invalidate(&mut self) {
        self.ranked = None;
    }

    pub fn is_cached(&self) -> bool {
        self.ranked.is_some()
    }
}

/// Places ranked attributes in one angular sector per class.
///
/// The first ⌊place_attributes/C⌋·C attributes of the overall ranking are used. Within a
/// class sector the best attribute sits at the sector start 2πc/C and the following ones
/// alternate around it at offsets 1, −1, 2, −2, … of φ = 2π·spread/(10·count).
#[derive(Debug, Clone, PartialEq)]
pub struct ClassBalancedLayout {
    pub place_attributes: usize,
    pub spread: f64,
    /// Sector c shows the attributes of class `class_permutation[c]`.
    pub class_permutation: Option<Vec<usize>>,
}

impl Default for ClassBalancedLayout {
    fn default() -> Self {
        ClassBalancedLayout {
            place_attributes: 50,
            spread: 5.0,
            class_permutation: None,
        }
    }
}

impl ClassBalancedLayout {
    pub fn place(&self, ranked: &RankedAttributes) -> Result<AnchorSet> {
        let class_count = ranked.class_count();
        if class_count == 0 {
            return Err(FreeVizError::NoAttributes);
        }
        if let Some(perm) = &self.class_permutation {
            if perm.len() != class_count {
                return Err(FreeVizError::DimensionMismatch {
                    expected: class_count,
                    actual: perm.len(),
                });
            }
            if let Some(&bad) = perm.iter().find(|&&c| c >= class_count) {
                return Err(FreeVizError::DimensionMismatch {
                    expected: class_count,
                    actual: bad + 1,
                });
            }
        }

        let count = ((self.place_attributes / class_count) * class_count).min(ranked.overall.len());
        let attrs = &ranked.overall[..count];
        if attrs.is_empty() {
            return Err(FreeVizError::NoAttributes);
        }

        let len = attrs.len();
        let mut offsets: Vec<i64> = vec![0];
        for i in 1..(len / 2) as i64 {
            offsets.push(i);
            offsets.push(-i);
        }
        offsets.truncate(len / class_count + 1);
        let phi = 2.0 * PI * self.spread / (len as f64 * 10.0);

        let mut anchors = Vec::with_capacity(len);
        for sector in 0..class_count {
            let start = 2.0 * PI * sector as f64 / class_count as f64;
            let class = self
                .class_permutation
                .as_ref()
                .map_or(sector, |perm| perm[sector]);
            let mut placed: Vec<(i64, &String)> = offsets
                .iter()
                .copied()
                .zip(attrs.iter().skip(class).step_by(class_count))
                .collect();
            placed.sort_by_key(|&(offset, _)| offset);
            anchors.extend(placed.into_iter().map(|(offset, label)| {
                let angle = start + offset as f64 * phi;
                Anchor::new(angle.cos(), angle.sin(), label.as_str())
            }));
        }

        let shift = (len / (2 * class_count)).min(anchors.len());
        anchors.rotate_left(shift);
        AnchorSet::new(anchors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projection::ScaledData;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn provider() -> ScaledData {
        ScaledData::with_discrete_class(
            vec!["mix".into(), "hi0".into(), "hi1".into()],
            array![
                [0.6, 0.4, 0.4, 0.2, 0.6, 0.4, 0.4, 0.2],
                [0.9, 0.1, 0.8, 0.2, 0.9, 0.1, 0.8, 0.2],
                [0.1, 0.9, 0.2, 0.8, 0.1, 0.9, 0.2, 0.8],
            ],
            vec!["neg".into(), "pos".into()],
            &[0, 1, 0, 1, 0, 1, 0, 1],
        )
        .unwrap()
    }

    #[test]
    fn test_signal_to_noise_ranking() {
        let ranked = rank_by_signal_to_noise(&provider()).unwrap();
        let names = |c: usize| -> Vec<&str> {
            ranked.by_class[c].iter().map(|s| s.label.as_str()).collect()
        };
        assert_eq!(names(0), vec!["hi0", "mix"]);
        assert_eq!(names(1), vec!["hi1"]);
        // hi0: means 0.85 vs 0.15, both standard deviations 0.05
        assert_abs_diff_eq!(ranked.by_class[0][0].s2n, 7.0, epsilon = 1e-9);
        assert_abs_diff_eq!(ranked.by_class[0][1].s2n, 1.0, epsilon = 1e-9);
        // interleaving stops with the shorter class list
        assert_eq!(ranked.overall, vec!["hi0", "hi1"]);
    }

    #[test]
    fn test_signal_to_noise_uses_population_deviation() {
        let values = [(1.0, 0), (3.0, 0), (0.0, 1), (0.0, 1)];
        // means 2 vs 0, deviations 1 and 0
        assert_abs_diff_eq!(signal_to_noise(&values, 0).unwrap(), 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(signal_to_noise(&values, 1).unwrap(), -2.0, epsilon = 1e-12);
        assert_eq!(signal_to_noise(&values, 2), None);
    }

    #[test]
    fn test_missing_values_are_skipped() {
        let data = ScaledData::with_discrete_class(
            vec!["a".into(), "b".into()],
            array![
                [1.0, 0.0, f64::NAN, 0.0],
                [0.0, 1.0, 0.0, 1.0],
            ],
            vec!["x".into(), "y".into()],
            &[0, 1, 0, 1],
        )
        .unwrap();
        let ranked = rank_by_signal_to_noise(&data).unwrap();
        // `a` keeps one value for class 0 and separates it perfectly
        assert_eq!(ranked.by_class[0][0].label, "a");
        assert_eq!(ranked.by_class[0][0].s2n, f64::INFINITY);
        assert_eq!(ranked.overall, vec!["a", "b"]);
    }

    #[test]
    fn test_ranking_requires_discrete_class() {
        let data =
            ScaledData::with_continuous_class(vec!["a".into()], array![[0.1, 0.2]], &[0.0, 1.0])
                .unwrap();
        assert!(matches!(
            rank_by_signal_to_noise(&data),
            Err(FreeVizError::DiscreteClassRequired)
        ));
    }

    #[test]
    fn test_cache_computes_once_until_invalidated() {
        let data = provider();
        let mut cache = AttributeRankingCache::new();
        assert!(!cache.is_cached());
        let first = cache.get_or_compute(&data).unwrap().clone();
        assert!(cache.is_cached());
        assert_eq!(cache.get_or_compute(&data).unwrap(), &first);
        cache.invalidate();
        assert!(!cache.is_cached());
    }

    fn six_ranked() -> RankedAttributes {
        let score = |label: &str, class| AttributeScore {
            label: label.into(),
            class,
            s2n: 1.0,
        };
        RankedAttributes {
            overall: ["a0", "b0", "a1", "b1", "a2", "b2"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            by_class: vec![
                vec![score("a0", 0), score("a1", 0), score("a2", 0)],
                vec![score("b0", 1), score("b1", 1), score("b2", 1)],
            ],
        }
    }

    #[test]
    fn test_class_balanced_placement() {
        let anchors = ClassBalancedLayout::default().place(&six_ranked()).unwrap();
        assert_eq!(anchors.labels(), vec!["a0", "a1", "b2", "b0", "b1", "a2"]);

        // φ = 2π·5 / 60
        let phi = PI / 6.0;
        let angle = |label: &str| {
            let anchor = anchors.get(anchors.position(label).unwrap()).unwrap();
            assert_abs_diff_eq!(anchor.radius(), 1.0, epsilon = 1e-12);
            anchor.angle()
        };
        assert_abs_diff_eq!(angle("a0"), 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(angle("a1"), phi, epsilon = 1e-12);
        assert_abs_diff_eq!(angle("a2"), -phi, epsilon = 1e-12);
        assert_abs_diff_eq!(angle("b0").abs(), PI, epsilon = 1e-12);
        assert_abs_diff_eq!(angle("b2"), PI - phi, epsilon = 1e-12);
    }

    #[test]
    fn test_class_permutation_swaps_sectors() {
        let layout = ClassBalancedLayout {
            class_permutation: Some(vec![1, 0]),
            ..ClassBalancedLayout::default()
        };
        let anchors = layout.place(&six_ranked()).unwrap();
        let b0 = anchors.get(anchors.position("b0").unwrap()).unwrap();
        assert_abs_diff_eq!(b0.angle(), 0.0, epsilon = 1e-12);

        let bad = ClassBalancedLayout {
            class_permutation: Some(vec![0, 2]),
            ..ClassBalancedLayout::default()
        };
        assert!(bad.place(&six_ranked()).is_err());
    }

    #[test]
    fn test_too_few_attributes_to_place() {
        let layout = ClassBalancedLayout {
            place_attributes: 1,
            ..ClassBalancedLayout::default()
        };
        assert!(matches!(
            layout.place(&six_ranked()),
            Err(FreeVizError::NoAttributes)
        ));

        let limited = ClassBalancedLayout {
            place_attributes: 5,
            ..ClassBalancedLayout::default()
        };
        assert_eq!(limited.place(&six_ranked()).unwrap().len(), 4);
    }
}
