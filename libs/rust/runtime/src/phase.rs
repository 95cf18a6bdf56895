//! Round phase machine. A driver cycles Idle -> Collecting -> Evaluating ->
//! Publishing -> Idle; stop requests are honored only at the Idle boundary.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RoundPhase { Idle, Collecting, Evaluating, Publishing, Stopped }

#[derive(Debug)]
pub struct PhaseTracker {
    phase: RoundPhase,
    phase_started_at: Instant,
    last_durations: Vec<(RoundPhase, Duration)>,
}

impl Default for PhaseTracker {
    fn default() -> Self { Self::new() }
}

impl PhaseTracker {
    pub fn new() -> Self { Self { phase: RoundPhase::Idle, phase_started_at: Instant::now(), last_durations: Vec::new() } }
    pub fn phase(&self) -> RoundPhase { self.phase }

    /// Moves to the next phase of the cycle. A stopped tracker stays stopped.
    pub fn advance(&mut self) {
        let next = match self.phase {
            RoundPhase::Idle => RoundPhase::Collecting,
            RoundPhase::Collecting => RoundPhase::Evaluating,
            RoundPhase::Evaluating => RoundPhase::Publishing,
            RoundPhase::Publishing => RoundPhase::Idle,
            RoundPhase::Stopped => RoundPhase::Stopped,
        };
        self.enter(next);
    }

    /// Abandons the current round and returns to Idle.
    pub fn abort(&mut self) {
        if self.phase != RoundPhase::Stopped { self.enter(RoundPhase::Idle); }
    }

    /// Returns false when called mid-round; the caller retries at the next Idle.
    pub fn stop(&mut self) -> bool {
        match self.phase {
            RoundPhase::Idle => { self.enter(RoundPhase::Stopped); true }
            RoundPhase::Stopped => true,
            _ => false,
        }
    }

    /// Per-phase durations of the most recent round.
    pub fn durations(&self) -> &[(RoundPhase, Duration)] { &self.last_durations }

    fn enter(&mut self, next: RoundPhase) {
        let now = Instant::now();
        if self.phase == RoundPhase::Idle { self.last_durations.clear(); }
        else { self.last_durations.push((self.phase, now - self.phase_started_at)); }
        self.phase = next;
        self.phase_started_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_returns_to_idle() {
        let mut t = PhaseTracker::new();
        for _ in 0..4 { t.advance(); }
        assert_eq!(t.phase(), RoundPhase::Idle);
        let phases: Vec<_> = t.durations().iter().map(|(p, _)| *p).collect();
        assert_eq!(phases, vec![RoundPhase::Collecting, RoundPhase::Evaluating, RoundPhase::Publishing]);
    }

    #[test]
    fn stop_waits_for_idle() {
        let mut t = PhaseTracker::new();
        t.advance();
        assert!(!t.stop());
        t.abort();
        assert!(t.stop());
        t.advance();
        assert_eq!(t.phase(), RoundPhase::Stopped);
    }
}
