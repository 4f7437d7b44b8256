#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Encounter director: the surface agents and engine glue talk to.
//!
//! The director owns one authoritative [`World`] and the pure systems that
//! react to it. Every public operation is translated into commands that are
//! pumped through `world::apply` and the wave progression system until the
//! encounter settles. Effects the engine has to realise (spawning agents,
//! killing them at teardown, destroying spawners, publishing the combat
//! state) are queued and handed to a [`Battlefield`] by [`Director::dispatch`].

use std::{
    collections::{BTreeSet, VecDeque},
    mem,
    time::Duration,
};

use skirmish_core::{
    AgentId, Battlefield, Command, EncounterConfig, EncounterPhase, Event, PendingQuery,
    PointIndex, RayCast, ReservationError, SpatialQuery, SpawnerId, Vec3, WaveId,
};
use skirmish_system_position_allocation::PositionAllocation;
use skirmish_system_position_scoring::PositionScoring;
use skirmish_system_wave_progression::WaveProgression;
use skirmish_world::{self as world, query, World};
use tracing::{debug, info, warn};

/// Position request issued by an agent looking for a tactical spot.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PositionRequest {
    /// Agent asking for a position.
    pub agent: AgentId,
    /// Where the agent stands now.
    pub position: Vec3,
    /// Candidate point the agent believes it holds, if any.
    pub index: Option<PointIndex>,
    /// Reference point of the target the agent fights.
    pub target: Vec3,
}

/// Answer to a [`PositionRequest`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Placement {
    /// Position the agent should move to.
    pub position: Vec3,
    /// Candidate point the agent now holds.
    pub index: Option<PointIndex>,
}

impl Placement {
    fn unchanged(request: &PositionRequest) -> Self {
        Self {
            position: request.position,
            index: request.index,
        }
    }
}

/// Drives a single encounter.
#[derive(Debug)]
pub struct Director {
    world: World,
    scoring: PositionScoring,
    allocation: PositionAllocation,
    progression: WaveProgression,
    token_holders: BTreeSet<AgentId>,
    journal: Vec<Event>,
    outbox: VecDeque<Event>,
}

impl Director {
    /// Creates a director for a new encounter. Engages immediately when the
    /// configuration asks for it.
    #[must_use]
    pub fn new(config: EncounterConfig) -> Self {
        let engage_on_start = config.engage_on_start;
        let mut director = Self {
            scoring: PositionScoring::new(config.scoring),
            allocation: PositionAllocation::new(config.allocation),
            progression: WaveProgression::new(),
            world: World::new(config),
            token_holders: BTreeSet::new(),
            journal: Vec::new(),
            outbox: VecDeque::new(),
        };
        if engage_on_start {
            director.engage();
        }
        director
    }

    /// Read access to the authoritative world for `skirmish_world::query`.
    #[must_use]
    pub fn world(&self) -> &World {
        &self.world
    }

    /// Current lifecycle phase.
    #[must_use]
    pub fn phase(&self) -> EncounterPhase {
        query::phase(&self.world)
    }

    /// The player entered the encounter's trigger volume.
    pub fn engage(&mut self) {
        let _ = self.submit(Command::Engage);
    }

    /// Hands over the result cell of a running spatial query.
    pub fn attach_query(&mut self, query: PendingQuery) {
        let _ = self.submit(Command::AttachQuery { query });
    }

    /// Starts the candidate grid query over the configured arena.
    pub fn start_query(&mut self, service: &mut impl SpatialQuery) {
        let config = query::config(&self.world);
        let pending = service.run_query(config.origin, config.grid_half_size, config.point_spacing);
        self.attach_query(pending);
    }

    /// Advances the encounter clock, firing every timer that became due.
    pub fn tick(&mut self, dt: Duration) {
        let _ = self.submit(Command::Tick { dt });
    }

    /// Finds, reserves and returns a tactical position for an agent.
    ///
    /// Rescores every candidate against the target, then picks the best
    /// free point near the agent. The agent's previous point is released in
    /// the same step. While the candidate store is not ready, or when every
    /// scored point is taken, the request comes back unchanged.
    pub fn allocate_position(
        &mut self,
        request: PositionRequest,
        sight: &impl RayCast,
    ) -> Placement {
        if !query::is_ready(&self.world) {
            debug!(agent = request.agent.get(), "candidate points not ready");
            return Placement::unchanged(&request);
        }

        let mut ranking = Vec::new();
        self.scoring.handle(
            query::candidates(&self.world),
            request.target,
            query::arena(&self.world),
            sight,
            &mut ranking,
        );
        let _ = self.submit(Command::ApplyScores { ranking });

        let Some(selection) = self.allocation.select(
            query::candidates(&self.world),
            query::occupancy(&self.world),
            request.position,
        ) else {
            debug!(agent = request.agent.get(), "no free candidate point");
            return Placement::unchanged(&request);
        };

        let events = self.submit(Command::ReservePoint {
            agent: request.agent,
            point: selection.point,
        });
        debug_assert!(
            !events.iter().any(|event| matches!(
                event,
                Event::PointReservationRejected {
                    reason: ReservationError::UnknownPoint,
                    ..
                }
            )),
            "allocator selected point {} outside the candidate store",
            selection.point.get()
        );
        let reserved = events.iter().any(|event| {
            matches!(event, Event::PointReserved { point, .. } if *point == selection.point)
        });
        if !reserved {
            return Placement::unchanged(&request);
        }

        Placement {
            position: selection.position,
            index: Some(selection.point),
        }
    }

    /// Frees a candidate point. Safe to call for points nobody holds.
    pub fn release_position(&mut self, index: PointIndex) {
        let _ = self.submit(Command::ReleasePoint { point: index });
    }

    /// Asks for an attack token. An agent already holding one keeps it and
    /// gets `true` without consuming another.
    pub fn try_acquire_token(&mut self, agent: AgentId) -> bool {
        if self.token_holders.contains(&agent) {
            return true;
        }
        let events = self.submit(Command::AcquireToken { agent });
        let granted = events
            .iter()
            .any(|event| matches!(event, Event::TokenGranted { agent: holder } if *holder == agent));
        if granted {
            let _ = self.token_holders.insert(agent);
        }
        granted
    }

    /// Returns the agent's token, if it holds one.
    pub fn release_token(&mut self, agent: AgentId) {
        if self.token_holders.remove(&agent) {
            let _ = self.submit(Command::ReleaseToken { agent });
        }
    }

    /// Reports whether the agent currently holds a token.
    #[must_use]
    pub fn holds_token(&self, agent: AgentId) -> bool {
        self.token_holders.contains(&agent)
    }

    /// Adds an agent to a wave, e.g. one placed in the level by hand.
    pub fn register_agent(&mut self, wave: WaveId, spawner: Option<SpawnerId>, agent: AgentId) {
        let _ = self.submit(Command::RegisterAgent {
            wave,
            spawner,
            agent,
        });
    }

    /// An agent died. Returns its token and point, then updates its wave.
    pub fn notify_agent_removed(&mut self, wave: WaveId, agent: AgentId) {
        self.release_token(agent);
        let _ = self.submit(Command::RemoveAgent { wave, agent });
    }

    /// External request to spawn the wave after `wave`.
    pub fn notify_wave_threshold_reached(&mut self, wave: WaveId) {
        let _ = self.submit(Command::AdvanceWave { wave });
    }

    /// Reports whether another managed agent stands within `radius` of `center`.
    #[must_use]
    pub fn spot_is_contested(
        &self,
        agent: AgentId,
        center: Vec3,
        radius: f32,
        caster: &impl RayCast,
    ) -> bool {
        caster
            .cast_sphere(center, radius)
            .into_iter()
            .any(|other| other != agent && query::wave_of(&self.world, other).is_some())
    }

    /// Hands queued effects to the battlefield until none remain. Agents
    /// spawned along the way are registered with their waves.
    pub fn dispatch(&mut self, battlefield: &mut impl Battlefield) {
        while let Some(event) = self.outbox.pop_front() {
            match event {
                Event::WaveSpawnRequested {
                    wave,
                    spawner,
                    positions,
                } => {
                    for agent in battlefield.spawn_batch(spawner, &positions) {
                        self.adopt(battlefield, wave, spawner, agent);
                    }
                }
                Event::FodderRespawnRequested {
                    wave,
                    spawner,
                    position,
                } => {
                    if let Some(agent) = battlefield.spawn_at(spawner, position) {
                        self.adopt(battlefield, wave, spawner, agent);
                    }
                }
                Event::AgentDismissed { agent } => {
                    let _ = self.token_holders.remove(&agent);
                    battlefield.notify_death(agent);
                }
                Event::SpawnerDestroyed { spawner } => battlefield.destroy_spawner(spawner),
                Event::CombatStateChanged { state } => battlefield.set_combat_state(state),
                Event::EncounterDestroyed => {
                    self.token_holders.clear();
                    info!("encounter released");
                }
                _ => {}
            }
        }
    }

    /// Takes every event produced since the previous call.
    pub fn drain_events(&mut self) -> Vec<Event> {
        mem::take(&mut self.journal)
    }

    fn adopt(
        &mut self,
        battlefield: &mut impl Battlefield,
        wave: WaveId,
        spawner: SpawnerId,
        agent: AgentId,
    ) {
        if query::phase(&self.world).is_destroyed() {
            warn!(agent = agent.get(), "agent spawned after teardown, dismissing");
            battlefield.notify_death(agent);
            return;
        }
        battlefield.assign_owner(agent, wave);
        self.register_agent(wave, Some(spawner), agent);
    }

    /// Applies a command and every follow-up the systems derive from it.
    fn submit(&mut self, command: Command) -> Vec<Event> {
        let mut produced = Vec::new();
        let mut pending = vec![command];

        while !pending.is_empty() {
            let mut events = Vec::new();
            for command in pending.drain(..) {
                world::apply(&mut self.world, command, &mut events);
            }
            self.progression
                .handle(&events, query::combat_state(&self.world), &mut pending);
            produced.extend(events);
        }

        self.outbox
            .extend(produced.iter().filter(|event| is_effect(event)).cloned());
        if produced.contains(&Event::EncounterDestroyed) {
            let before = self.outbox.len();
            self.outbox.retain(|event| !is_spawn_request(event));
            let dropped = before - self.outbox.len();
            if dropped > 0 {
                debug!(dropped, "discarded spawn requests outlived by teardown");
            }
        }
        self.journal.extend(produced.iter().cloned());
        produced
    }
}

fn is_spawn_request(event: &Event) -> bool {
    matches!(
        event,
        Event::WaveSpawnRequested { .. } | Event::FodderRespawnRequested { .. }
    )
}

fn is_effect(event: &Event) -> bool {
    matches!(
        event,
        Event::WaveSpawnRequested { .. }
            | Event::FodderRespawnRequested { .. }
            | Event::AgentDismissed { .. }
            | Event::SpawnerDestroyed { .. }
            | Event::CombatStateChanged { .. }
            | Event::EncounterDestroyed
    )
}
