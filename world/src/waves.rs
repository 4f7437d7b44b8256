//! Wave rosters, spawner bookkeeping and the latched completion flags.

use std::collections::BTreeMap;

use skirmish_core::{
    AgentId, EncounterConfig, SpawnerId, Vec3, WaveConfig, WaveId, WaveKind, WaveSnapshot,
    WaveState,
};

use crate::timers::TimerId;

#[derive(Debug)]
pub(crate) struct SpawnerRecord {
    pub(crate) id: SpawnerId,
    pub(crate) positions: Vec<Vec3>,
    /// Agents produced by this spawner that are still alive.
    pub(crate) live: usize,
    /// Respawns requested but not yet registered.
    pub(crate) outstanding: usize,
    pub(crate) respawn_timer: Option<TimerId>,
}

impl SpawnerRecord {
    /// Whether the spawner still owes agents to fill its position list.
    pub(crate) fn below_count(&self) -> bool {
        self.live.saturating_add(self.outstanding) < self.positions.len()
    }
}

#[derive(Debug)]
pub(crate) struct WaveRecord {
    id: WaveId,
    kind: WaveKind,
    threshold_to_advance: usize,
    spawners: Vec<SpawnerRecord>,
    agents: BTreeMap<AgentId, Option<SpawnerId>>,
    state: WaveState,
    has_advanced: bool,
    completed: bool,
}

impl WaveRecord {
    fn from_config(id: WaveId, kind: WaveKind, config: &WaveConfig, next: &mut u32) -> Self {
        let spawners = config
            .spawners
            .iter()
            .map(|spawner| {
                let id = SpawnerId::new(*next);
                *next = next.saturating_add(1);
                SpawnerRecord {
                    id,
                    positions: spawner.positions.clone(),
                    live: 0,
                    outstanding: 0,
                    respawn_timer: None,
                }
            })
            .collect();

        Self {
            id,
            kind,
            threshold_to_advance: config.threshold_to_advance,
            spawners,
            agents: BTreeMap::new(),
            state: WaveState::Pending,
            has_advanced: false,
            completed: false,
        }
    }

    pub(crate) fn kind(&self) -> WaveKind {
        self.kind
    }

    pub(crate) fn spawner_mut(&mut self, spawner: SpawnerId) -> Option<&mut SpawnerRecord> {
        self.spawners.iter_mut().find(|record| record.id == spawner)
    }

    fn snapshot(&self) -> WaveSnapshot {
        WaveSnapshot {
            id: self.id,
            kind: self.kind,
            state: self.state,
            alive: self.agents.len(),
            threshold_to_advance: self.threshold_to_advance,
            has_advanced: self.has_advanced,
            completed: self.completed,
        }
    }
}

/// Outcome of removing a live agent from its wave.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Removal {
    pub(crate) kind: WaveKind,
    pub(crate) spawner: Option<SpawnerId>,
    pub(crate) remaining: usize,
    /// The wave's completion flag flipped from false to true.
    pub(crate) newly_completed: bool,
    /// The wave dropped to its advance threshold for the first time.
    pub(crate) threshold_reached: bool,
}

/// Outcome of an advance request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Advance {
    /// The request names a wave older than the current one.
    Stale,
    /// The counter moved onto an existing wave.
    Next(WaveId),
    /// The counter moved past the last main wave.
    Exhausted,
}

/// Every wave of an encounter: main waves in spawn order, then the fodder wave.
#[derive(Debug)]
pub(crate) struct WaveRoster {
    waves: Vec<WaveRecord>,
    main_count: usize,
    current: u32,
}

impl WaveRoster {
    pub(crate) fn from_config(config: &EncounterConfig) -> Self {
        let mut next_spawner = 0;
        let mut waves: Vec<WaveRecord> = config
            .waves
            .iter()
            .enumerate()
            .map(|(index, wave)| {
                WaveRecord::from_config(
                    wave_id(index),
                    WaveKind::Main,
                    wave,
                    &mut next_spawner,
                )
            })
            .collect();
        let main_count = waves.len();

        if let Some(fodder) = &config.fodder {
            waves.push(WaveRecord::from_config(
                wave_id(main_count),
                WaveKind::Fodder,
                fodder,
                &mut next_spawner,
            ));
        }

        Self {
            waves,
            main_count,
            current: 0,
        }
    }

    pub(crate) fn wave(&self, wave: WaveId) -> Option<&WaveRecord> {
        self.waves.get(wave.get() as usize)
    }

    pub(crate) fn wave_mut(&mut self, wave: WaveId) -> Option<&mut WaveRecord> {
        self.waves.get_mut(wave.get() as usize)
    }

    pub(crate) fn current(&self) -> WaveId {
        WaveId::new(self.current)
    }

    /// Current main wave, if the counter still points at one.
    pub(crate) fn current_main(&self) -> Option<WaveId> {
        ((self.current as usize) < self.main_count).then_some(WaveId::new(self.current))
    }

    pub(crate) fn fodder(&self) -> Option<WaveId> {
        (self.waves.len() > self.main_count).then(|| wave_id(self.main_count))
    }

    /// Spawner batches needed to bring a wave onto the field.
    pub(crate) fn spawn_plan(&self, wave: WaveId) -> Vec<(SpawnerId, Vec<Vec3>)> {
        self.wave(wave)
            .map(|record| {
                record
                    .spawners
                    .iter()
                    .filter(|spawner| !spawner.positions.is_empty())
                    .map(|spawner| (spawner.id, spawner.positions.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Adds an agent to a wave. Returns `false` for unknown waves and
    /// agents that are already registered.
    pub(crate) fn register(
        &mut self,
        wave: WaveId,
        spawner: Option<SpawnerId>,
        agent: AgentId,
    ) -> bool {
        let Some(record) = self.wave_mut(wave) else {
            return false;
        };
        if record.agents.contains_key(&agent) {
            return false;
        }
        let spawner = spawner.filter(|id| record.spawners.iter().any(|s| s.id == *id));
        if let Some(spawner) = spawner.and_then(|id| record.spawner_mut(id)) {
            spawner.live = spawner.live.saturating_add(1);
            spawner.outstanding = spawner.outstanding.saturating_sub(1);
        }
        let _ = record.agents.insert(agent, spawner);
        record.state = WaveState::Active;
        true
    }

    /// Removes an agent. Returns `None` when the agent is not in the wave.
    pub(crate) fn remove(&mut self, wave: WaveId, agent: AgentId) -> Option<Removal> {
        let record = self.wave_mut(wave)?;
        let spawner = record.agents.remove(&agent)?;
        if let Some(spawner) = spawner.and_then(|id| record.spawner_mut(id)) {
            spawner.live = spawner.live.saturating_sub(1);
        }

        let remaining = record.agents.len();
        let mut newly_completed = false;
        if remaining == 0 {
            record.state = WaveState::Cleared;
            if record.kind == WaveKind::Main && !record.completed {
                record.completed = true;
                newly_completed = true;
            }
        }

        let mut threshold_reached = false;
        if record.kind == WaveKind::Main
            && !record.has_advanced
            && remaining <= record.threshold_to_advance
        {
            record.has_advanced = true;
            threshold_reached = true;
        }

        Some(Removal {
            kind: record.kind,
            spawner,
            remaining,
            newly_completed,
            threshold_reached,
        })
    }

    /// Moves the wave counter forward unless the request is stale.
    pub(crate) fn advance(&mut self, wave: WaveId) -> Advance {
        if wave.get() < self.current {
            return Advance::Stale;
        }
        self.current = self.current.saturating_add(1);
        match self.current_main() {
            Some(next) => Advance::Next(next),
            None => Advance::Exhausted,
        }
    }

    /// True once every main wave latched its completion flag. Never true
    /// for an encounter without main waves.
    pub(crate) fn all_main_completed(&self) -> bool {
        self.main_count > 0 && self.completed_flags().into_iter().all(|done| done)
    }

    pub(crate) fn completed_flags(&self) -> Vec<bool> {
        self.waves[..self.main_count]
            .iter()
            .map(|wave| wave.completed)
            .collect()
    }

    pub(crate) fn snapshots(&self) -> Vec<WaveSnapshot> {
        self.waves.iter().map(WaveRecord::snapshot).collect()
    }

    pub(crate) fn wave_of(&self, agent: AgentId) -> Option<WaveId> {
        self.waves
            .iter()
            .find(|wave| wave.agents.contains_key(&agent))
            .map(|wave| wave.id)
    }

    /// Empties every wave and spawner, returning what the engine must kill.
    pub(crate) fn dismantle(&mut self) -> (Vec<AgentId>, Vec<SpawnerId>) {
        let mut agents = Vec::new();
        let mut spawners = Vec::new();
        for wave in &mut self.waves {
            agents.extend(std::mem::take(&mut wave.agents).into_keys());
            spawners.extend(wave.spawners.drain(..).map(|spawner| spawner.id));
        }
        (agents, spawners)
    }
}

fn wave_id(index: usize) -> WaveId {
    WaveId::new(u32::try_from(index).unwrap_or(u32::MAX))
}
