//! Hazard-weighted selection.
//!
//! Two modes:
//!
//! - **Independent**: each candidate is selected iff `draw < probability`.
//! - **Calibrated**: every probability is multiplied by a single scale
//!   factor `k` chosen so that `Σ min(1, k·p)` equals the target count.
//!   Selection is then `draw < min(1, k·p)`. If the realised count falls
//!   outside `[lower, upper]`, it is moved to the nearest band edge by
//!   ranking on `draw / min(1, k·p)`: the least surprising selections
//!   (ratio closest to 1) are dropped first and the nearest misses are added
//!   first. Individual risk ordering survives; this is never a fixed quota.
//!
//! Sums run sequentially so the calibrated factor is identical on every
//! machine regardless of thread count.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

/// One entity considered by a selection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    /// Hazard probability (or relative weight) in `[0, 1]`.
    pub probability: f64,
    /// Deterministic draw in `[0, 1)`.
    pub draw: f64,
}

/// Desired count and accepted band for a calibrated selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionTarget {
    /// Expected number of selections.
    pub target: u32,
    /// Fewest selections accepted.
    pub lower: u32,
    /// Most selections accepted.
    pub upper: u32,
}

impl SelectionTarget {
    /// Target `round(rate × count)` with band
    /// `[ceil((rate - tolerance) × count), floor((rate + tolerance) × count)]`,
    /// so any count inside the band has a realised rate within `tolerance`.
    ///
    /// When the population is too small for the band to contain an integer,
    /// the band collapses onto the target.
    pub fn for_rate(rate: Decimal, tolerance: Decimal, count: u32) -> Option<Self> {
        let n = Decimal::from(count);
        let target = rate
            .checked_mul(n)?
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
            .to_u32()?;
        let low_rate = rate.checked_sub(tolerance)?.max(Decimal::ZERO);
        let lower = low_rate.checked_mul(n)?.ceil().to_u32()?;
        let upper = rate
            .checked_add(tolerance)?
            .checked_mul(n)?
            .floor()
            .to_u32()?
            .min(count);
        if lower > upper {
            return Some(Self {
                target,
                lower: target,
                upper: target,
            });
        }
        Some(Self {
            target: target.clamp(lower, upper),
            lower,
            upper,
        })
    }

    /// Band containing exactly `target`.
    pub const fn exact(target: u32) -> Self {
        Self {
            target,
            lower: target,
            upper: target,
        }
    }
}

/// Indices (ascending) of candidates with `draw < probability`.
pub fn select_independent(candidates: &[Candidate]) -> Vec<usize> {
    candidates
        .iter()
        .enumerate()
        .filter(|(_, c)| c.draw < c.probability)
        .map(|(index, _)| index)
        .collect()
}

fn expected_count(probabilities: &[f64], scale: f64) -> f64 {
    probabilities.iter().map(|p| (scale * p).min(1.0)).sum()
}

/// Scale factor `k` with `Σ min(1, k·p) = target`, found by bisection.
///
/// When the target reaches the number of candidates with positive
/// probability, the returned factor lifts all of them to 1.
pub fn calibrate(probabilities: &[f64], target: u32) -> f64 {
    if target == 0 {
        return 0.0;
    }
    let positive: Vec<f64> = probabilities.iter().copied().filter(|p| *p > 0.0).collect();
    let reachable = u32::try_from(positive.len()).unwrap_or(u32::MAX);
    if target >= reachable {
        return positive
            .iter()
            .copied()
            .reduce(f64::min)
            .map_or(0.0, |smallest| 1.0 / smallest);
    }

    let goal = f64::from(target);
    let mut low = 0.0_f64;
    let mut high = 1.0_f64;
    for _ in 0..1100 {
        if expected_count(&positive, high) >= goal {
            break;
        }
        high *= 2.0;
    }
    for _ in 0..200 {
        let mid = (low + high) / 2.0;
        if expected_count(&positive, mid) < goal {
            low = mid;
        } else {
            high = mid;
        }
    }
    high
}

/// Calibrated, tolerance-bounded selection. Returns ascending indices.
pub fn select_calibrated(candidates: &[Candidate], target: SelectionTarget) -> Vec<usize> {
    let probabilities: Vec<f64> = candidates.iter().map(|c| c.probability).collect();
    let scale = calibrate(&probabilities, target.target);

    let scored: Vec<(usize, f64, bool)> = candidates
        .iter()
        .enumerate()
        .map(|(index, c)| {
            let calibrated = (scale * c.probability).min(1.0);
            let score = if calibrated > 0.0 {
                c.draw / calibrated
            } else {
                f64::INFINITY
            };
            (index, score, c.draw < calibrated)
        })
        .collect();

    let mut selected: Vec<(usize, f64)> = scored
        .iter()
        .filter(|(_, _, hit)| *hit)
        .map(|(index, score, _)| (*index, *score))
        .collect();
    let count = u32::try_from(selected.len()).unwrap_or(u32::MAX);
    let SelectionTarget { lower, upper, .. } = target;

    if count > upper {
        // Keep the most surprising selections (lowest ratio).
        selected.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
        selected.truncate(usize::try_from(upper).unwrap_or(usize::MAX));
    } else if count < lower {
        let mut misses: Vec<(usize, f64)> = scored
            .iter()
            .filter(|(_, score, hit)| !*hit && score.is_finite())
            .map(|(index, score, _)| (*index, *score))
            .collect();
        misses.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
        let shortfall = usize::try_from(lower.saturating_sub(count)).unwrap_or(usize::MAX);
        selected.extend(misses.into_iter().take(shortfall));
    }

    let mut indices: Vec<usize> = selected.into_iter().map(|(index, _)| index).collect();
    indices.sort_unstable();
    indices
}
