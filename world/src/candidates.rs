//! Candidate point storage and the occupancy set layered on top of it.

use std::collections::BTreeMap;

use skirmish_core::{
    AgentId, CandidatePoint, PendingQuery, PointIndex, PositionError, ReservationError, Vec3,
};

/// Candidate points in ranking order plus the agents holding them.
///
/// `holders` and `holdings` are mirrors of each other: a point has at most
/// one holder and an agent holds at most one point.
#[derive(Debug, Default)]
pub(crate) struct CandidateStore {
    query: Option<PendingQuery>,
    positions: Vec<Vec3>,
    ranking: Vec<CandidatePoint>,
    holders: BTreeMap<PointIndex, AgentId>,
    holdings: BTreeMap<AgentId, PointIndex>,
}

impl CandidateStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn attach(&mut self, query: PendingQuery) {
        self.query = Some(query);
    }

    /// Populates the store from the attached query once its result arrived.
    /// Returns the number of points the first time the store becomes ready.
    pub(crate) fn poll(&mut self) -> Option<usize> {
        if self.is_ready() {
            return None;
        }
        let points = self.query.as_ref()?.points()?.to_vec();
        self.query = None;
        self.populate(points)
    }

    /// Fills the store. Population happens at most once; an empty result
    /// leaves the store not ready.
    pub(crate) fn populate(&mut self, points: Vec<Vec3>) -> Option<usize> {
        if self.is_ready() || points.is_empty() {
            return None;
        }
        self.ranking = points
            .iter()
            .enumerate()
            .map(|(index, position)| CandidatePoint::new(point_index(index), *position))
            .collect();
        self.positions = points;
        Some(self.positions.len())
    }

    pub(crate) fn is_ready(&self) -> bool {
        !self.positions.is_empty()
    }

    pub(crate) fn position(&self, point: PointIndex) -> Result<Vec3, PositionError> {
        if !self.is_ready() {
            return Err(PositionError::NotReady);
        }
        self.positions
            .get(point.as_usize())
            .copied()
            .ok_or(PositionError::NotFound(point))
    }

    /// Replaces scores and ordering. The ranking must name every stored
    /// point exactly once; positions always come from the store.
    pub(crate) fn apply_scores(&mut self, ranking: &[CandidatePoint]) -> bool {
        if ranking.len() != self.positions.len() {
            return false;
        }
        let mut seen = vec![false; self.positions.len()];
        for point in ranking {
            match seen.get_mut(point.index.as_usize()) {
                Some(slot) if !*slot => *slot = true,
                _ => return false,
            }
        }

        self.ranking = ranking
            .iter()
            .map(|point| CandidatePoint {
                index: point.index,
                position: self.positions[point.index.as_usize()],
                score: point.score,
            })
            .collect();
        true
    }

    /// Reserves `point` for `agent` and frees whatever the agent held before.
    /// Both happen together or not at all.
    pub(crate) fn reserve(
        &mut self,
        agent: AgentId,
        point: PointIndex,
    ) -> Result<Option<PointIndex>, ReservationError> {
        if !self.is_ready() {
            return Err(ReservationError::NotReady);
        }
        if point.as_usize() >= self.positions.len() {
            return Err(ReservationError::UnknownPoint);
        }
        match self.holders.get(&point) {
            Some(holder) if *holder == agent => return Ok(None),
            Some(_) => return Err(ReservationError::Occupied),
            None => {}
        }

        let released = self.release_agent(agent);
        let _ = self.holders.insert(point, agent);
        let _ = self.holdings.insert(agent, point);
        Ok(released)
    }

    /// Frees a point regardless of its holder. Returns the former holder.
    pub(crate) fn release(&mut self, point: PointIndex) -> Option<AgentId> {
        let holder = self.holders.remove(&point)?;
        let _ = self.holdings.remove(&holder);
        Some(holder)
    }

    /// Frees the point held by `agent`, if any.
    pub(crate) fn release_agent(&mut self, agent: AgentId) -> Option<PointIndex> {
        let point = self.holdings.remove(&agent)?;
        let _ = self.holders.remove(&point);
        Some(point)
    }

    pub(crate) fn holding(&self, agent: AgentId) -> Option<PointIndex> {
        self.holdings.get(&agent).copied()
    }

    pub(crate) fn ranking(&self) -> &[CandidatePoint] {
        &self.ranking
    }

    pub(crate) fn holders(&self) -> &BTreeMap<PointIndex, AgentId> {
        &self.holders
    }

    pub(crate) fn clear(&mut self) {
        *self = Self::default();
    }
}

fn point_index(index: usize) -> PointIndex {
    PointIndex::new(u32::try_from(index).unwrap_or(u32::MAX))
}
