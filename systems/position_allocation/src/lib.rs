#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Pure system that picks a free, well-scored candidate point for an agent.
//!
//! Selection walks a descending ladder of score thresholds. At each rung it
//! considers the free points scoring at least the threshold and blends each
//! point's tactical score with its closeness to the agent's current
//! position, so agents prefer good spots near where they already stand.

use std::cmp::Ordering;

use skirmish_core::{AllocationConfig, CandidateView, OccupancyView, PointIndex, Vec3};

/// Point chosen by the allocator.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Selection {
    /// Index to reserve.
    pub point: PointIndex,
    /// Position of the chosen point.
    pub position: Vec3,
    /// Blended rank that won the selection.
    pub rank: f32,
    /// Threshold rung at which the point was found.
    pub threshold: f32,
}

/// Position allocation system.
#[derive(Clone, Copy, Debug, Default)]
pub struct PositionAllocation {
    config: AllocationConfig,
}

impl PositionAllocation {
    /// Creates an allocation system using the provided tunables.
    #[must_use]
    pub const fn new(config: AllocationConfig) -> Self {
        Self { config }
    }

    /// Threshold ladder, highest first. Bounded by an integer rung count so
    /// floating-point drift near the floor cannot extend it.
    pub fn thresholds(&self) -> impl Iterator<Item = f32> {
        let AllocationConfig {
            start_threshold: start,
            threshold_step: step,
            threshold_floor: floor,
            ..
        } = self.config;

        let rungs = if start.partial_cmp(&floor) != Some(Ordering::Greater) {
            0
        } else if step.is_finite() && step > 0.0 {
            ((start - floor) / step).ceil().min(u16::MAX as f32) as usize
        } else {
            1
        };

        (0..rungs)
            .map(move |rung| start - rung as f32 * step.max(0.0))
            .filter(move |threshold| *threshold > floor)
    }

    /// Selects the best free point for an agent currently at `current`.
    ///
    /// `ranking` must be ordered by descending score. Returns `None` when no
    /// rung of the ladder yields a free point.
    #[must_use]
    pub fn select(
        &self,
        ranking: CandidateView<'_>,
        occupancy: OccupancyView<'_>,
        current: Vec3,
    ) -> Option<Selection> {
        let weight = self.config.score_weight;
        let mut pool = Vec::new();

        for threshold in self.thresholds() {
            pool.clear();
            pool.extend(
                ranking
                    .iter()
                    .take_while(|point| point.score >= threshold)
                    .filter(|point| !occupancy.is_occupied(point.index))
                    .map(|point| (point, point.position.distance(current))),
            );
            if pool.is_empty() {
                continue;
            }

            let (nearest, farthest) = pool.iter().fold(
                (f32::INFINITY, f32::NEG_INFINITY),
                |(low, high), (_, distance)| (low.min(*distance), high.max(*distance)),
            );
            let spread = farthest - nearest;

            let mut best: Option<Selection> = None;
            for (point, distance) in &pool {
                let closeness = if spread > f32::EPSILON {
                    1.0 - (distance - nearest) / spread
                } else {
                    1.0
                };
                let rank = point.score * weight + closeness * (1.0 - weight);
                if best.map_or(true, |leader| rank > leader.rank) {
                    best = Some(Selection {
                        point: point.index,
                        position: point.position,
                        rank,
                        threshold,
                    });
                }
            }
            return best;
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_ladder_has_five_rungs() {
        let allocation = PositionAllocation::default();
        let ladder: Vec<f32> = allocation.thresholds().collect();
        assert_eq!(ladder.len(), 5);
        let expected = [0.8, 0.6, 0.4, 0.2, 0.0];
        for (rung, want) in ladder.iter().zip(expected) {
            assert!((rung - want).abs() < 1e-5, "{rung} != {want}");
        }
    }

    #[test]
    fn degenerate_ladders_terminate() {
        let flat = PositionAllocation::new(AllocationConfig {
            threshold_step: 0.0,
            ..AllocationConfig::default()
        });
        assert_eq!(flat.thresholds().count(), 1);

        let inverted = PositionAllocation::new(AllocationConfig {
            start_threshold: -0.5,
            ..AllocationConfig::default()
        });
        assert_eq!(inverted.thresholds().count(), 0);

        let nan = PositionAllocation::new(AllocationConfig {
            threshold_step: f32::NAN,
            ..AllocationConfig::default()
        });
        assert_eq!(nan.thresholds().count(), 1);
    }
}
