//! Presence debouncer — typing/stop-typing signal smoothing.
//!
//! Pure state table; the orchestrator owns the actual timers and emissions.
//! Human-paired sessions only — the automated side's composing signal comes
//! from the reply scheduler.

use std::collections::HashMap;

use uuid::Uuid;

/// Key: (session id, typist connection id).
pub type DebounceKey = (Uuid, Uuid);

#[derive(Debug, Default, Clone, Copy)]
struct DebounceState {
    /// A debounce timer is running.
    pending: bool,
    /// "partner is composing" has been emitted and not yet retracted.
    emitted: bool,
}

#[derive(Debug, Default)]
pub struct PresenceDebouncer {
    states: HashMap<DebounceKey, DebounceState>,
}

impl PresenceDebouncer {
    pub fn new() -> Self {
        Self::default()
    }

    /// A typing event arrived. Returns true when a debounce timer should be
    /// started; repeated calls while pending or already emitted are no-ops.
    pub fn on_typing(&mut self, key: DebounceKey) -> bool {
        let state = self.states.entry(key).or_default();
        if state.pending || state.emitted {
            return false;
        }
        state.pending = true;
        true
    }

    /// The debounce timer fired. Returns true when "composing" should be
    /// emitted now; a stale fire (state already cleared) returns false.
    pub fn on_timer_fired(&mut self, key: DebounceKey) -> bool {
        match self.states.get_mut(&key) {
            Some(state) if state.pending => {
                state.pending = false;
                state.emitted = true;
                true
            }
            _ => false,
        }
    }

    /// Stop-typing arrived.
    /// Returns (cancel the timer?, emit "stopped composing"?).
    pub fn on_stop_typing(&mut self, key: DebounceKey) -> (bool, bool) {
        match self.states.remove(&key) {
            Some(state) => (state.pending, state.emitted),
            None => (false, false),
        }
    }

    /// Tear down all state for a session. Returns the keys whose timers must
    /// be cancelled.
    pub fn clear_session(&mut self, session_id: Uuid) -> Vec<DebounceKey> {
        let keys: Vec<DebounceKey> = self
            .states
            .keys()
            .filter(|(sid, _)| *sid == session_id)
            .copied()
            .collect();
        let mut pending = Vec::new();
        for key in keys {
            if let Some(state) = self.states.remove(&key) {
                if state.pending {
                    pending.push(key);
                }
            }
        }
        pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> DebounceKey {
        (Uuid::new_v4(), Uuid::new_v4())
    }

    #[test]
    fn test_first_typing_starts_timer_repeats_do_not() {
        let mut d = PresenceDebouncer::new();
        let k = key();
        assert!(d.on_typing(k));
        assert!(!d.on_typing(k));
    }

    #[test]
    fn test_no_reemission_while_signal_visible() {
        let mut d = PresenceDebouncer::new();
        let k = key();
        assert!(d.on_typing(k));
        assert!(d.on_timer_fired(k));
        // Signal is up — further typing must not restart the timer.
        assert!(!d.on_typing(k));
        assert!(!d.on_timer_fired(k));
    }

    #[test]
    fn test_stop_before_fire_cancels_silently() {
        let mut d = PresenceDebouncer::new();
        let k = key();
        d.on_typing(k);
        assert_eq!(d.on_stop_typing(k), (true, false));
        // Stale fire after cancellation is a no-op.
        assert!(!d.on_timer_fired(k));
    }

    #[test]
    fn test_stop_after_fire_retracts_signal() {
        let mut d = PresenceDebouncer::new();
        let k = key();
        d.on_typing(k);
        d.on_timer_fired(k);
        assert_eq!(d.on_stop_typing(k), (false, true));
        // Cycle restarts cleanly.
        assert!(d.on_typing(k));
    }

    #[test]
    fn test_clear_session_reports_pending_timers() {
        let mut d = PresenceDebouncer::new();
        let sid = Uuid::new_v4();
        let typing = (sid, Uuid::new_v4());
        let emitted = (sid, Uuid::new_v4());
        let other = key();
        d.on_typing(typing);
        d.on_typing(emitted);
        d.on_timer_fired(emitted);
        d.on_typing(other);

        let pending = d.clear_session(sid);
        assert_eq!(pending, vec![typing]);
        // Unrelated session untouched.
        assert!(!d.on_typing(other));
    }
}
