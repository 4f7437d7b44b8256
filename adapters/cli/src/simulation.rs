//! Headless encounter run against in-memory stand-ins for the engine.

use std::{collections::BTreeMap, fmt, time::Duration};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use skirmish_core::{
    ActorRef, AgentId, Battlefield, CombatState, EncounterConfig, EncounterPhase, Event,
    PendingQuery, PointIndex, RayCast, SpatialQuery, SpawnerId, Vec3, WaveId,
};
use skirmish_director::{Director, PositionRequest};
use skirmish_world::query;
use tracing::{debug, info, warn};

const PILLAR_COUNT: usize = 6;
const PILLAR_RADIUS: f32 = 150.0;
const CROWDING_RADIUS: f32 = 120.0;
const MAX_GRID_STEPS: i32 = 100;
const DEATH_CHANCE_ARMED: f64 = 0.08;
const DEATH_CHANCE_IDLE: f64 = 0.02;

/// Parameters of a single run.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Options {
    pub(crate) ticks: u32,
    pub(crate) dt: Duration,
    pub(crate) seed: u64,
}

/// Spatial query that lays a square grid over the arena and answers at once.
#[derive(Debug, Default)]
pub(crate) struct GridQuery;

impl SpatialQuery for GridQuery {
    fn run_query(&mut self, origin: Vec3, half_extent: f32, spacing: f32) -> PendingQuery {
        let pending = PendingQuery::new();
        if let Err(error) = pending.fulfill(grid_points(origin, half_extent, spacing)) {
            warn!(%error, "grid query delivered twice");
        }
        pending
    }
}

pub(crate) fn grid_points(origin: Vec3, half_extent: f32, spacing: f32) -> Vec<Vec3> {
    if !(spacing.is_finite() && spacing > 0.0 && half_extent.is_finite() && half_extent >= 0.0) {
        return vec![origin];
    }
    let wanted = (half_extent / spacing).floor();
    let steps = if wanted > MAX_GRID_STEPS as f32 {
        warn!(
            half_extent,
            spacing,
            cap = MAX_GRID_STEPS,
            "grid too dense, capping steps per side"
        );
        MAX_GRID_STEPS
    } else {
        wanted as i32
    };
    let mut points = Vec::new();
    for row in -steps..=steps {
        for column in -steps..=steps {
            points.push(origin + Vec3::new(column as f32 * spacing, row as f32 * spacing, 0.0));
        }
    }
    points
}

#[derive(Clone, Copy, Debug)]
struct Combatant {
    wave: WaveId,
    position: Vec3,
    point: Option<PointIndex>,
}

/// In-memory battlefield: pillars that block sight plus the live agents.
#[derive(Debug)]
pub(crate) struct Field {
    pillars: Vec<(Vec3, f32)>,
    agents: BTreeMap<AgentId, Combatant>,
    next_agent: u32,
    combat: CombatState,
    spawned: u32,
    dismissed: u32,
    spawners_destroyed: u32,
}

impl Field {
    pub(crate) fn new(pillars: Vec<(Vec3, f32)>) -> Self {
        Self {
            pillars,
            agents: BTreeMap::new(),
            next_agent: 0,
            combat: CombatState::OutOfCombat,
            spawned: 0,
            dismissed: 0,
            spawners_destroyed: 0,
        }
    }

    /// Scatters pillars over the arena.
    pub(crate) fn with_random_pillars(config: &EncounterConfig, rng: &mut ChaCha8Rng) -> Self {
        let half = config.grid_half_size.max(1.0);
        let pillars = (0..PILLAR_COUNT)
            .map(|_| {
                let offset = Vec3::new(rng.gen_range(-half..half), rng.gen_range(-half..half), 0.0);
                (config.origin + offset, PILLAR_RADIUS)
            })
            .collect();
        Self::new(pillars)
    }
}

impl RayCast for Field {
    fn cast_ray(&self, from: Vec3, to: Vec3, _ignore: &[ActorRef]) -> bool {
        self.pillars
            .iter()
            .any(|(center, radius)| segment_distance(from, to, *center) <= *radius)
    }

    fn cast_sphere(&self, center: Vec3, radius: f32) -> Vec<AgentId> {
        self.agents
            .iter()
            .filter(|(_, agent)| agent.position.distance(center) <= radius)
            .map(|(id, _)| *id)
            .collect()
    }
}

impl Battlefield for Field {
    fn spawn_at(&mut self, _spawner: SpawnerId, position: Vec3) -> Option<AgentId> {
        let id = AgentId::new(self.next_agent);
        self.next_agent = self.next_agent.checked_add(1)?;
        let _ = self.agents.insert(
            id,
            Combatant {
                wave: WaveId::new(0),
                position,
                point: None,
            },
        );
        self.spawned += 1;
        Some(id)
    }

    fn assign_owner(&mut self, agent: AgentId, wave: WaveId) {
        if let Some(combatant) = self.agents.get_mut(&agent) {
            combatant.wave = wave;
        }
    }

    fn notify_death(&mut self, agent: AgentId) {
        if self.agents.remove(&agent).is_some() {
            self.dismissed += 1;
        }
    }

    fn destroy_spawner(&mut self, spawner: SpawnerId) {
        debug!(spawner = spawner.get(), "spawner destroyed");
        self.spawners_destroyed += 1;
    }

    fn set_combat_state(&mut self, state: CombatState) {
        info!(?state, "combat state changed");
        self.combat = state;
    }
}

fn segment_distance(from: Vec3, to: Vec3, point: Vec3) -> f32 {
    let segment = to - from;
    let length_squared = segment.length_squared();
    if length_squared <= f32::EPSILON {
        return from.distance(point);
    }
    let t = ((point - from).dot(segment) / length_squared).clamp(0.0, 1.0);
    (from + segment * t).distance(point)
}

/// Outcome of a run.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Summary {
    pub(crate) ticks: u32,
    pub(crate) elapsed: Duration,
    pub(crate) phase: EncounterPhase,
    pub(crate) spawned: u32,
    pub(crate) killed: u32,
    pub(crate) dismissed: u32,
    pub(crate) spawners_destroyed: u32,
    pub(crate) relocations: u32,
    pub(crate) attacks: u32,
    pub(crate) waves_cleared: usize,
    pub(crate) completed: Vec<bool>,
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "phase:              {:?}", self.phase)?;
        writeln!(
            f,
            "ticks:              {} ({:.1}s)",
            self.ticks,
            self.elapsed.as_secs_f32()
        )?;
        writeln!(f, "agents spawned:     {}", self.spawned)?;
        writeln!(f, "agents killed:      {}", self.killed)?;
        writeln!(f, "agents dismissed:   {}", self.dismissed)?;
        writeln!(f, "spawners destroyed: {}", self.spawners_destroyed)?;
        writeln!(f, "relocations:        {}", self.relocations)?;
        writeln!(f, "ranged attacks:     {}", self.attacks)?;
        writeln!(f, "waves cleared:      {}", self.waves_cleared)?;
        write!(f, "completion flags:   {:?}", self.completed)
    }
}

/// Runs an encounter until it is destroyed or the tick budget runs out.
pub(crate) fn run(config: EncounterConfig, options: &Options) -> Summary {
    let mut rng = ChaCha8Rng::seed_from_u64(options.seed);
    let mut field = Field::with_random_pillars(&config, &mut rng);
    let engage_on_start = config.engage_on_start;
    let mut director = Director::new(config);
    director.start_query(&mut GridQuery);
    if !engage_on_start {
        director.engage();
    }
    director.dispatch(&mut field);

    let player = Vec3::ZERO;
    let mut summary = Summary {
        ticks: 0,
        elapsed: Duration::ZERO,
        phase: director.phase(),
        spawned: 0,
        killed: 0,
        dismissed: 0,
        spawners_destroyed: 0,
        relocations: 0,
        attacks: 0,
        waves_cleared: 0,
        completed: Vec::new(),
    };

    for _ in 0..options.ticks {
        director.tick(options.dt);
        director.dispatch(&mut field);
        summary.ticks += 1;
        if director.phase().is_destroyed() {
            break;
        }

        let roster: Vec<(AgentId, Combatant)> =
            field.agents.iter().map(|(id, agent)| (*id, *agent)).collect();
        for (id, agent) in roster {
            let crowded =
                director.spot_is_contested(id, agent.position, CROWDING_RADIUS, &field);
            if agent.point.is_none() || crowded || rng.gen_bool(0.1) {
                let placement = director.allocate_position(
                    PositionRequest {
                        agent: id,
                        position: agent.position,
                        index: agent.point,
                        target: player,
                    },
                    &field,
                );
                if placement.index != agent.point {
                    summary.relocations += 1;
                }
                if let Some(combatant) = field.agents.get_mut(&id) {
                    combatant.position = placement.position;
                    combatant.point = placement.index;
                }
            }

            let armed =
                field.combat == CombatState::InCombat && director.try_acquire_token(id);
            if armed {
                summary.attacks += 1;
            }
            let death_chance = if armed {
                DEATH_CHANCE_ARMED
            } else {
                DEATH_CHANCE_IDLE
            };

            if rng.gen_bool(death_chance) {
                let _ = field.agents.remove(&id);
                summary.killed += 1;
                director.notify_agent_removed(agent.wave, id);
            } else if armed && rng.gen_bool(0.5) {
                director.release_token(id);
            }
        }
        director.dispatch(&mut field);
    }

    let events = director.drain_events();
    summary.waves_cleared = events
        .iter()
        .filter(|event| matches!(event, Event::WaveCleared { .. }))
        .count();
    summary.elapsed = query::elapsed(director.world());
    summary.completed = query::completed_waves(director.world());
    summary.phase = director.phase();
    summary.spawned = field.spawned;
    summary.dismissed = field.dismissed;
    summary.spawners_destroyed = field.spawners_destroyed;
    info!(phase = ?summary.phase, ticks = summary.ticks, "simulation finished");
    summary
}
