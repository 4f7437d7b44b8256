#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Core contracts shared across the Skirmish encounter engine.
//!
//! This crate defines the message surface that connects the director, the
//! authoritative world, and pure systems. Callers submit [`Command`] values
//! describing desired mutations, the world executes those commands via its
//! `apply` entry point, and then broadcasts [`Event`] values for systems to
//! react to deterministically. Systems consume event streams, query immutable
//! views, and respond exclusively with new command batches.

use std::{
    collections::BTreeMap,
    sync::{Arc, OnceLock},
    time::Duration,
};

pub use glam::Vec3;
use thiserror::Error;

mod config;

pub use config::{AllocationConfig, EncounterConfig, ScoringConfig, SpawnerConfig, WaveConfig};

/// Commands that express all permissible encounter mutations.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    /// Starts the encounter: the player entered the trigger volume.
    Engage,
    /// Hands the world the result cell of an in-flight spatial query.
    AttachQuery {
        /// Shared cell that the query service fills once it completes.
        query: PendingQuery,
    },
    /// Populates the candidate store directly from a completed query.
    PopulateCandidates {
        /// Candidate positions in query order; the order defines point indices.
        points: Vec<Vec3>,
    },
    /// Advances the encounter clock by the provided delta time.
    Tick {
        /// Duration of simulated time that elapsed since the previous tick.
        dt: Duration,
    },
    /// Replaces candidate scores and ordering with a freshly computed ranking.
    ApplyScores {
        /// Every candidate point, ordered by descending score.
        ranking: Vec<CandidatePoint>,
    },
    /// Reserves a candidate point for an agent, releasing its previous point.
    ReservePoint {
        /// Agent that will hold the point.
        agent: AgentId,
        /// Point the agent wants to hold.
        point: PointIndex,
    },
    /// Removes a point from the occupancy set regardless of its holder.
    ReleasePoint {
        /// Point to free.
        point: PointIndex,
    },
    /// Attempts to take one token from the token gate.
    AcquireToken {
        /// Agent asking for the token. Used for reporting only.
        agent: AgentId,
    },
    /// Returns one token to the gate after the configured delay.
    ReleaseToken {
        /// Agent returning the token. Used for reporting only.
        agent: AgentId,
    },
    /// Records that an agent now belongs to a wave.
    RegisterAgent {
        /// Wave that owns the agent.
        wave: WaveId,
        /// Spawner that produced the agent, or `None` for pre-placed agents.
        spawner: Option<SpawnerId>,
        /// Agent being registered.
        agent: AgentId,
    },
    /// Removes a dead agent from its wave.
    RemoveAgent {
        /// Wave that owned the agent.
        wave: WaveId,
        /// Agent that died.
        agent: AgentId,
    },
    /// Requests that the wave following `wave` be spawned.
    AdvanceWave {
        /// Wave whose advance threshold was reached.
        wave: WaveId,
    },
    /// Schedules a delayed respawn for a fodder spawner.
    ScheduleRespawn {
        /// Fodder wave owning the spawner.
        wave: WaveId,
        /// Spawner that lost an agent.
        spawner: SpawnerId,
    },
    /// Arms the delayed teardown of the whole encounter.
    ArmTeardown,
}

/// Events broadcast by the world after processing commands.
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    /// Indicates that the encounter clock advanced.
    TimeAdvanced {
        /// Duration of simulated time that elapsed in the tick.
        dt: Duration,
    },
    /// Announces that the encounter left the dormant phase.
    Engaged,
    /// Reports a change of the player's combat state.
    CombatStateChanged {
        /// State that became active.
        state: CombatState,
    },
    /// Confirms that the candidate store was populated.
    CandidatesReady {
        /// Number of candidate points now available.
        count: usize,
    },
    /// Confirms that an agent now holds a candidate point.
    PointReserved {
        /// Agent holding the point.
        agent: AgentId,
        /// Point the agent held before, if any.
        released: Option<PointIndex>,
        /// Point the agent holds now.
        point: PointIndex,
    },
    /// Reports that a reservation request was rejected.
    PointReservationRejected {
        /// Agent that asked for the point.
        agent: AgentId,
        /// Point that was requested.
        point: PointIndex,
        /// Specific reason the reservation failed.
        reason: ReservationError,
    },
    /// Confirms that a point left the occupancy set.
    PointReleased {
        /// Point that became free.
        point: PointIndex,
    },
    /// Confirms that a token was handed out.
    TokenGranted {
        /// Agent that received the token.
        agent: AgentId,
    },
    /// Reports that no token was available.
    TokenDenied {
        /// Agent that asked for the token.
        agent: AgentId,
    },
    /// Confirms that a token return was scheduled.
    TokenReleaseScheduled {
        /// Agent that returned the token.
        agent: AgentId,
        /// Delay before the token becomes available again.
        delay: Duration,
    },
    /// Reports that a previously returned token became available.
    TokenRestored {
        /// Tokens available after the restore.
        available: u32,
    },
    /// Asks the spawn collaborator to produce a batch of agents.
    WaveSpawnRequested {
        /// Wave that will own the spawned agents.
        wave: WaveId,
        /// Spawner that should produce the agents.
        spawner: SpawnerId,
        /// Spawn positions, one agent per entry.
        positions: Vec<Vec3>,
    },
    /// Confirms that an agent joined a wave.
    AgentRegistered {
        /// Wave that owns the agent.
        wave: WaveId,
        /// Agent that joined.
        agent: AgentId,
    },
    /// Confirms that an agent left its wave.
    AgentRemoved {
        /// Wave that owned the agent.
        wave: WaveId,
        /// Kind of the owning wave.
        kind: WaveKind,
        /// Agent that left.
        agent: AgentId,
        /// Spawner that produced the agent, if any.
        spawner: Option<SpawnerId>,
        /// Agents still alive in the wave.
        remaining: usize,
    },
    /// Announces that a main wave lost its last agent.
    WaveCleared {
        /// Wave that was cleared.
        wave: WaveId,
    },
    /// Announces that a wave dropped to its advance threshold. Fires once per wave.
    WaveThresholdReached {
        /// Wave whose threshold was reached.
        wave: WaveId,
    },
    /// Announces that every main wave has been cleared.
    AllWavesCleared,
    /// Confirms that the delayed teardown was armed.
    TeardownArmed {
        /// Delay before teardown runs.
        delay: Duration,
    },
    /// Asks the spawn collaborator to replace a fallen fodder agent.
    FodderRespawnRequested {
        /// Fodder wave that will own the agent.
        wave: WaveId,
        /// Spawner that should produce the agent.
        spawner: SpawnerId,
        /// Spawn position chosen among the spawner's positions.
        position: Vec3,
    },
    /// Instructs an agent to die without notifying anyone.
    AgentDismissed {
        /// Agent being dismissed.
        agent: AgentId,
    },
    /// Instructs the spawn collaborator to destroy a spawner.
    SpawnerDestroyed {
        /// Spawner being destroyed.
        spawner: SpawnerId,
    },
    /// Announces that the encounter released all state and is gone.
    EncounterDestroyed,
}

/// Unique identifier assigned to a managed combatant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AgentId(u32);

impl AgentId {
    /// Creates a new agent identifier with the provided numeric value.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Retrieves the numeric representation of the identifier.
    #[must_use]
    pub const fn get(&self) -> u32 {
        self.0
    }
}

/// Identifier of a wave. Main waves are numbered from zero in configuration order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WaveId(u32);

impl WaveId {
    /// Creates a new wave identifier with the provided numeric value.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Retrieves the numeric representation of the identifier.
    #[must_use]
    pub const fn get(&self) -> u32 {
        self.0
    }
}

/// Identifier of a spawner, unique across all waves of an encounter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SpawnerId(u32);

impl SpawnerId {
    /// Creates a new spawner identifier with the provided numeric value.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Retrieves the numeric representation of the identifier.
    #[must_use]
    pub const fn get(&self) -> u32 {
        self.0
    }
}

/// Stable index of a candidate point, assigned when the store is populated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PointIndex(u32);

impl PointIndex {
    /// Creates a new point index with the provided numeric value.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Retrieves the numeric representation of the index.
    #[must_use]
    pub const fn get(&self) -> u32 {
        self.0
    }

    /// Index usable for slice access.
    #[must_use]
    pub const fn as_usize(&self) -> usize {
        self.0 as usize
    }
}

/// Pre-computed tactical position produced by the spatial query.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CandidatePoint {
    /// Stable index used for occupancy tracking.
    pub index: PointIndex,
    /// World-space location of the point.
    pub position: Vec3,
    /// Tactical score in `[0, 1]`; rewritten by every scoring pass.
    pub score: f32,
}

impl CandidatePoint {
    /// Creates an unscored candidate point.
    #[must_use]
    pub const fn new(index: PointIndex, position: Vec3) -> Self {
        Self {
            index,
            position,
            score: 0.0,
        }
    }
}

/// Read-only view of the candidate points in ranking order.
#[derive(Clone, Copy, Debug)]
pub struct CandidateView<'a> {
    points: &'a [CandidatePoint],
}

impl<'a> CandidateView<'a> {
    /// Captures a new candidate view backed by the provided ranking.
    #[must_use]
    pub const fn new(points: &'a [CandidatePoint]) -> Self {
        Self { points }
    }

    /// Iterator over the candidates, best score first once scored.
    pub fn iter(&self) -> impl Iterator<Item = &'a CandidatePoint> + 'a {
        self.points.iter()
    }

    /// Underlying ranking slice.
    #[must_use]
    pub const fn as_slice(&self) -> &'a [CandidatePoint] {
        self.points
    }

    /// Number of candidate points.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.points.len()
    }

    /// Reports whether the store is still waiting for its query.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Read-only view of the occupancy set and the agent holding each point.
#[derive(Clone, Copy, Debug)]
pub struct OccupancyView<'a> {
    holders: &'a BTreeMap<PointIndex, AgentId>,
}

impl<'a> OccupancyView<'a> {
    /// Captures a new occupancy view backed by the provided holder map.
    #[must_use]
    pub const fn new(holders: &'a BTreeMap<PointIndex, AgentId>) -> Self {
        Self { holders }
    }

    /// Reports whether some agent currently holds the point.
    #[must_use]
    pub fn is_occupied(&self, point: PointIndex) -> bool {
        self.holders.contains_key(&point)
    }

    /// Returns the agent holding the point, if any.
    #[must_use]
    pub fn holder(&self, point: PointIndex) -> Option<AgentId> {
        self.holders.get(&point).copied()
    }

    /// Iterator over occupied points and their holders in index order.
    pub fn iter(&self) -> impl Iterator<Item = (PointIndex, AgentId)> + 'a {
        self.holders.iter().map(|(point, agent)| (*point, *agent))
    }

    /// Number of occupied points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.holders.len()
    }

    /// Reports whether no point is occupied.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.holders.is_empty()
    }
}

/// Square arena the candidate grid was generated over.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ArenaBounds {
    /// Centre of the arena.
    pub origin: Vec3,
    /// Half the side length of the arena.
    pub half_size: f32,
}

impl ArenaBounds {
    /// Creates arena bounds from a centre and half size.
    #[must_use]
    pub const fn new(origin: Vec3, half_size: f32) -> Self {
        Self { origin, half_size }
    }
}

/// Lifecycle phase of an encounter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EncounterPhase {
    /// Configured but not yet engaged by the player.
    Dormant,
    /// Waves are spawning and fighting.
    Engaged,
    /// Every main wave has been cleared; teardown not yet armed.
    AllWavesCleared,
    /// Teardown timer armed.
    Destroying,
    /// All state released. Further commands are ignored.
    Destroyed,
}

impl EncounterPhase {
    /// Reports whether the encounter no longer accepts commands.
    #[must_use]
    pub const fn is_destroyed(self) -> bool {
        matches!(self, Self::Destroyed)
    }

    /// Reports whether the teardown sequence has started.
    #[must_use]
    pub const fn is_tearing_down(self) -> bool {
        matches!(self, Self::Destroying | Self::Destroyed)
    }
}

/// Player combat state published to the combat-state collaborator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CombatState {
    /// The player is fighting this encounter.
    InCombat,
    /// No encounter is holding the player in combat.
    OutOfCombat,
}

/// Distinguishes waves that count toward encounter completion.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WaveKind {
    /// Regular wave; clearing it counts toward completion.
    Main,
    /// Respawning filler wave, ignored for completion purposes.
    Fodder,
}

/// Lifecycle state of a single wave.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WaveState {
    /// No agent spawned yet.
    Pending,
    /// At least one agent alive.
    Active,
    /// Emptied after having been active.
    Cleared,
}

/// Immutable representation of a wave used for queries.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WaveSnapshot {
    /// Identifier of the wave.
    pub id: WaveId,
    /// Whether the wave counts toward completion.
    pub kind: WaveKind,
    /// Current lifecycle state.
    pub state: WaveState,
    /// Agents currently alive in the wave.
    pub alive: usize,
    /// Alive count at or below which the next wave is triggered.
    pub threshold_to_advance: usize,
    /// Whether the next wave has already been triggered by this wave.
    pub has_advanced: bool,
    /// Whether the wave's completion flag is latched.
    pub completed: bool,
}

/// Read-only snapshot describing all waves of an encounter.
#[derive(Clone, Debug, Default)]
pub struct WaveView {
    snapshots: Vec<WaveSnapshot>,
}

impl WaveView {
    /// Creates a new wave view from the provided snapshots.
    #[must_use]
    pub fn from_snapshots(mut snapshots: Vec<WaveSnapshot>) -> Self {
        snapshots.sort_by_key(|snapshot| snapshot.id);
        Self { snapshots }
    }

    /// Iterator over the captured wave snapshots in identifier order.
    pub fn iter(&self) -> impl Iterator<Item = &WaveSnapshot> {
        self.snapshots.iter()
    }

    /// Looks up the snapshot of a single wave.
    #[must_use]
    pub fn get(&self, wave: WaveId) -> Option<&WaveSnapshot> {
        self.snapshots
            .binary_search_by_key(&wave, |snapshot| snapshot.id)
            .ok()
            .map(|index| &self.snapshots[index])
    }

    /// Consumes the view, yielding the underlying snapshots.
    #[must_use]
    pub fn into_vec(self) -> Vec<WaveSnapshot> {
        self.snapshots
    }
}

/// Counters of the token gate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TokenGateSnapshot {
    /// Maximum number of tokens.
    pub capacity: u32,
    /// Tokens that can be acquired right now.
    pub available: u32,
    /// Returned tokens still waiting for their release delay.
    pub pending_restores: usize,
}

/// Reasons a point reservation may be rejected by the world.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ReservationError {
    /// The candidate store has not been populated yet.
    NotReady,
    /// The index lies outside the populated range.
    UnknownPoint,
    /// Another agent already holds the point.
    Occupied,
}

/// Failures surfaced by position lookups.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum PositionError {
    /// The spatial query has not completed yet.
    #[error("candidate points are not ready yet")]
    NotReady,
    /// The index lies outside the populated range.
    #[error("candidate point {0:?} does not exist")]
    NotFound(PointIndex),
    /// No free candidate satisfies any threshold.
    #[error("every scored candidate point is occupied")]
    Exhausted,
}

/// Failures surfaced by the spatial query result cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum QueryError {
    /// The cell already holds a result.
    #[error("spatial query result was already delivered")]
    AlreadyFulfilled,
}

/// Write-once result cell shared between a spatial query and its consumer.
///
/// Cloning the handle shares the cell. The query service calls
/// [`PendingQuery::fulfill`] exactly once; consumers observe either
/// `None` (not ready) or the delivered points.
#[derive(Clone, Debug, Default)]
pub struct PendingQuery {
    cell: Arc<OnceLock<Vec<Vec3>>>,
}

impl PendingQuery {
    /// Creates an empty, not-yet-ready result cell.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Delivers the query result. Fails if a result was already delivered.
    pub fn fulfill(&self, points: Vec<Vec3>) -> Result<(), QueryError> {
        self.cell
            .set(points)
            .map_err(|_| QueryError::AlreadyFulfilled)
    }

    /// Delivered points, or `None` while the query is still running.
    #[must_use]
    pub fn points(&self) -> Option<&[Vec3]> {
        self.cell.get().map(Vec::as_slice)
    }

    /// Reports whether the result has been delivered.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.cell.get().is_some()
    }
}

impl PartialEq for PendingQuery {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.cell, &other.cell)
    }
}

/// Actor reference understood by the ray cast service.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ActorRef {
    /// The tracked target (the player).
    Target,
    /// A managed agent.
    Agent(AgentId),
}

/// Engine line-of-trace service. Treated as synchronous and exact.
pub trait RayCast {
    /// Casts a ray from `from` to `to` and reports whether anything outside
    /// `ignore` blocks it.
    fn cast_ray(&self, from: Vec3, to: Vec3, ignore: &[ActorRef]) -> bool;

    /// Returns the agents overlapping a sphere.
    fn cast_sphere(&self, center: Vec3, radius: f32) -> Vec<AgentId>;
}

/// Engine spatial query service that generates candidate points.
pub trait SpatialQuery {
    /// Starts a query over a square area and returns its result cell.
    ///
    /// The cell may be fulfilled later, or never.
    fn run_query(&mut self, origin: Vec3, half_extent: f32, spacing: f32) -> PendingQuery;
}

/// Engine-side collaborators that realise encounter decisions.
///
/// Bundles the spawner contract (`spawn_at`, `spawn_batch`,
/// `destroy_spawner`), the agent contract (`assign_owner`, `notify_death`)
/// and the combat-state sink. Agents ask for tokens and positions through
/// the director instead of through this trait.
pub trait Battlefield {
    /// Spawns one agent at `position` using the given spawner.
    fn spawn_at(&mut self, spawner: SpawnerId, position: Vec3) -> Option<AgentId>;

    /// Spawns one agent per position using the given spawner.
    fn spawn_batch(&mut self, spawner: SpawnerId, positions: &[Vec3]) -> Vec<AgentId> {
        positions
            .iter()
            .filter_map(|position| self.spawn_at(spawner, *position))
            .collect()
    }

    /// Tells an agent which wave owns it.
    fn assign_owner(&mut self, agent: AgentId, wave: WaveId);

    /// Kills an agent without it calling back into the encounter.
    fn notify_death(&mut self, agent: AgentId);

    /// Destroys a spawner.
    fn destroy_spawner(&mut self, spawner: SpawnerId);

    /// Receives combat-state transitions.
    fn set_combat_state(&mut self, state: CombatState) {
        let _ = state;
    }
}
