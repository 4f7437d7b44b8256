#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Pure system that turns wave lifecycle events into follow-up commands.

use skirmish_core::{CombatState, Command, Event, WaveKind};

/// Reacts to wave events by advancing waves, arming teardown and
/// replacing fallen fodder.
#[derive(Debug, Default)]
pub struct WaveProgression;

impl WaveProgression {
    /// Creates a new wave progression system.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Consumes world events and emits the commands they imply.
    ///
    /// Fodder respawns are only requested while `combat` is
    /// [`CombatState::InCombat`]; the world re-checks the latches guarding
    /// wave advance and teardown.
    pub fn handle(&mut self, events: &[Event], combat: CombatState, out: &mut Vec<Command>) {
        for event in events {
            match event {
                Event::WaveThresholdReached { wave } => {
                    out.push(Command::AdvanceWave { wave: *wave });
                }
                Event::AllWavesCleared => out.push(Command::ArmTeardown),
                Event::AgentRemoved {
                    wave,
                    kind: WaveKind::Fodder,
                    spawner: Some(spawner),
                    ..
                } if combat == CombatState::InCombat => {
                    out.push(Command::ScheduleRespawn {
                        wave: *wave,
                        spawner: *spawner,
                    });
                }
                _ => {}
            }
        }
    }
}
