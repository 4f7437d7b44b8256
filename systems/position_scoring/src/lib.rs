#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Pure system that rates candidate points against the current target.
//!
//! Scoring always runs as a pair of passes. The visibility pass is a hard
//! gate: a point either has a clear sight line to the target (1.0) or it
//! does not (0.0). The distance pass then grades only the visible points by
//! how close they sit to the preferred standoff distance. The result is a
//! full ranking, best first, that the world adopts through
//! `Command::ApplyScores`.

use skirmish_core::{
    ActorRef, ArenaBounds, CandidatePoint, CandidateView, RayCast, ScoringConfig, Vec3,
};
use tracing::debug;

const VISIBLE: f32 = 1.0;
const HIDDEN: f32 = 0.0;

/// Position scoring system.
#[derive(Clone, Copy, Debug, Default)]
pub struct PositionScoring {
    config: ScoringConfig,
}

impl PositionScoring {
    /// Creates a scoring system using the provided tunables.
    #[must_use]
    pub const fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    /// Scores every candidate and writes the resulting ranking into `out`.
    ///
    /// The output buffer is cleared before it is populated.
    pub fn handle(
        &self,
        candidates: CandidateView<'_>,
        target: Vec3,
        arena: ArenaBounds,
        sight: &impl RayCast,
        out: &mut Vec<CandidatePoint>,
    ) {
        out.clear();
        out.extend(candidates.iter().copied());
        if out.is_empty() {
            return;
        }

        self.score_visibility(out, target, sight);
        let visible = self.score_distance(out, target, arena);
        debug!(total = out.len(), visible, "candidate points scored");
    }

    /// Sets every score to exactly 1.0 or 0.0 depending on whether the point
    /// sees the target, then sorts visible points first.
    pub fn score_visibility(
        &self,
        points: &mut [CandidatePoint],
        target: Vec3,
        sight: &impl RayCast,
    ) {
        let eye = Vec3::Z * self.config.eye_height;
        for point in points.iter_mut() {
            let blocked = sight.cast_ray(point.position + eye, target, &[ActorRef::Target]);
            point.score = if blocked { HIDDEN } else { VISIBLE };
        }
        sort_descending(points);
    }

    /// Grades the visible prefix by distance to the target and re-sorts.
    /// Returns the length of the graded prefix.
    ///
    /// Points closer than the preferred distance are normalised over
    /// `preferred * close_range_factor`; farther points over the largest
    /// distance the arena allows from the target.
    pub fn score_distance(
        &self,
        points: &mut [CandidatePoint],
        target: Vec3,
        arena: ArenaBounds,
    ) -> usize {
        let preferred = self.config.preferred_distance;
        let far_range = (2.0 * (target.distance(arena.origin) + arena.half_size) - preferred)
            .max(f32::EPSILON);
        let close_range = (preferred * self.config.close_range_factor).max(f32::EPSILON);

        let visible = points
            .iter()
            .take_while(|point| point.score >= VISIBLE)
            .count();

        for point in &mut points[..visible] {
            let distance = point.position.distance(target);
            let score = if distance >= preferred {
                1.0 - (distance - preferred) / far_range
            } else {
                1.0 - (preferred - distance) / close_range
            };
            point.score = score.clamp(0.0, 1.0);
        }

        sort_descending(points);
        visible
    }
}

/// Stable descending sort; ties keep their existing order.
fn sort_descending(points: &mut [CandidatePoint]) {
    points.sort_by(|left, right| right.score.total_cmp(&left.score));
}
