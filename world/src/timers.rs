//! Cancellable delayed callbacks owned by a single encounter.

use std::{collections::BTreeMap, time::Duration};

use skirmish_core::{SpawnerId, WaveId};

/// Handle returned when a timer is scheduled; cancelling it is always safe.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct TimerId(u64);

/// Work performed when a timer fires.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum TimerAction {
    /// Return one token to the gate.
    RestoreToken,
    /// Spawn a wave whose advance was delayed.
    SpawnWave { wave: WaveId },
    /// Replace a fallen fodder agent.
    RespawnFodder { wave: WaveId, spawner: SpawnerId },
    /// Tear the encounter down.
    Teardown,
}

#[derive(Clone, Copy, Debug)]
struct PendingTimer {
    due: Duration,
    action: TimerAction,
}

/// Simulation-clock scheduler. Timers fire from [`Scheduler::advance`] only.
#[derive(Debug, Default)]
pub(crate) struct Scheduler {
    now: Duration,
    next_id: u64,
    timers: BTreeMap<TimerId, PendingTimer>,
}

impl Scheduler {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn schedule_after(&mut self, delay: Duration, action: TimerAction) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id = self.next_id.wrapping_add(1);
        let due = self.now.saturating_add(delay);
        let _ = self.timers.insert(id, PendingTimer { due, action });
        id
    }

    /// Cancels a pending timer. Returns `false` if it already fired or was cancelled.
    pub(crate) fn cancel(&mut self, id: TimerId) -> bool {
        self.timers.remove(&id).is_some()
    }

    /// Advances the clock and removes every timer that became due, ordered
    /// by due time and then by scheduling order.
    pub(crate) fn advance(&mut self, dt: Duration) -> Vec<(TimerId, TimerAction)> {
        self.now = self.now.saturating_add(dt);
        let now = self.now;

        let mut due: Vec<(Duration, TimerId)> = self
            .timers
            .iter()
            .filter(|(_, timer)| timer.due <= now)
            .map(|(id, timer)| (timer.due, *id))
            .collect();
        due.sort();

        due.into_iter()
            .filter_map(|(_, id)| self.timers.remove(&id).map(|timer| (id, timer.action)))
            .collect()
    }

    pub(crate) fn clear(&mut self) {
        self.timers.clear();
    }

    pub(crate) fn pending(&self) -> usize {
        self.timers.len()
    }

    pub(crate) fn now(&self) -> Duration {
        self.now
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_in_due_order_once() {
        let mut scheduler = Scheduler::new();
        let late = scheduler.schedule_after(Duration::from_secs(3), TimerAction::Teardown);
        let early = scheduler.schedule_after(Duration::from_secs(1), TimerAction::RestoreToken);

        assert!(scheduler.advance(Duration::from_millis(500)).is_empty());

        let fired = scheduler.advance(Duration::from_secs(3));
        assert_eq!(
            fired,
            vec![
                (early, TimerAction::RestoreToken),
                (late, TimerAction::Teardown)
            ]
        );
        assert!(scheduler.advance(Duration::from_secs(10)).is_empty());
        assert_eq!(scheduler.now(), Duration::from_millis(13_500));
    }

    #[test]
    fn equal_due_times_fire_in_scheduling_order() {
        let mut scheduler = Scheduler::new();
        let first = scheduler.schedule_after(Duration::from_secs(1), TimerAction::RestoreToken);
        let second = scheduler.schedule_after(Duration::from_secs(1), TimerAction::Teardown);

        let fired: Vec<TimerId> = scheduler
            .advance(Duration::from_secs(1))
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        assert_eq!(fired, vec![first, second]);
    }

    #[test]
    fn cancel_is_safe_after_fire_or_repeat() {
        let mut scheduler = Scheduler::new();
        let id = scheduler.schedule_after(Duration::from_secs(1), TimerAction::Teardown);
        assert!(scheduler.cancel(id));
        assert!(!scheduler.cancel(id));
        assert!(scheduler.advance(Duration::from_secs(2)).is_empty());

        let fired = scheduler.schedule_after(Duration::ZERO, TimerAction::RestoreToken);
        assert_eq!(scheduler.advance(Duration::ZERO).len(), 1);
        assert!(!scheduler.cancel(fired));
        assert_eq!(scheduler.pending(), 0);
    }
}
