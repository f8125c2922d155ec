//! Consumption counting for the ignited item.
//!
//! One consumption event is a near-face dwell long enough to satisfy the
//! face gate, completed by moving the hand away from the face.

use crate::zones::GateStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InhaleStep {
    None,
    /// Dwell satisfied: show the ember glow.
    GlowOn,
    /// Hand left the face after a full dwell. Carries the 1-based count.
    Consumed(u32),
}

#[derive(Debug, Clone, Default)]
pub struct InhaleTracker {
    armed: bool,
    count: u32,
}

impl InhaleTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the ignited hand's face dwell and membership for this tick.
    pub fn update(&mut self, dwell: GateStatus, near_face: bool) -> InhaleStep {
        if near_face {
            if dwell.satisfied && !self.armed {
                self.armed = true;
                return InhaleStep::GlowOn;
            }
            return InhaleStep::None;
        }
        if self.armed {
            self.armed = false;
            self.count += 1;
            return InhaleStep::Consumed(self.count);
        }
        InhaleStep::None
    }

    /// Whether a dwell is complete and waiting for the exit.
    pub fn armed(&self) -> bool {
        self.armed
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    /// Drop a pending dwell but keep the count (pause, hand swap).
    pub fn disarm(&mut self) {
        self.armed = false;
    }

    /// Forget progress (new ignition, depletion, empty-out).
    pub fn reset(&mut self) {
        self.armed = false;
        self.count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dwell(satisfied: bool) -> GateStatus {
        GateStatus {
            active: true,
            elapsed_ms: if satisfied { 1500.0 } else { 100.0 },
            satisfied,
            crossed: false,
        }
    }

    #[test]
    fn test_full_cycle_counts_once() {
        let mut t = InhaleTracker::new();
        assert_eq!(t.update(dwell(false), true), InhaleStep::None);
        assert_eq!(t.update(dwell(true), true), InhaleStep::GlowOn);
        assert_eq!(t.update(dwell(true), true), InhaleStep::None);
        assert_eq!(t.update(GateStatus::default(), false), InhaleStep::Consumed(1));
        assert_eq!(t.update(GateStatus::default(), false), InhaleStep::None);
        assert_eq!(t.count(), 1);
    }

    #[test]
    fn test_short_dwell_not_counted() {
        let mut t = InhaleTracker::new();
        t.update(dwell(false), true);
        assert_eq!(t.update(GateStatus::default(), false), InhaleStep::None);
        assert_eq!(t.count(), 0);
    }

    #[test]
    fn test_reset() {
        let mut t = InhaleTracker::new();
        t.update(dwell(true), true);
        t.reset();
        assert!(!t.armed());
        assert_eq!(t.update(GateStatus::default(), false), InhaleStep::None);
    }
}
