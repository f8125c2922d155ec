//! Hand-swap tracker.
//!
//! Sustained hand-to-hand contact while exactly one hand holds an item
//! moves the item to the other hand. Intermediate pulses mark progress.
//! Any break in the predicate, or a change of origin hand or item, cancels.
//!
//! Contact only counts when it starts after the swap conditions already
//! hold: hands that were touching when the item arrived (a fill, a wrap)
//! have to part and touch again.

use tracing::debug;

use crate::hand::Hand;
use crate::state::Identity;
use crate::zones::{DurationGate, GateStatus};

/// What the caller should do after an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapStep {
    Idle,
    /// Still counting; nothing to do.
    Holding,
    /// Emit a progress pulse on both hands.
    Pulse,
    /// A gesture in progress was abandoned.
    Cancelled,
    /// Move the item out of `origin`.
    Complete { origin: Hand },
}

#[derive(Debug, Clone)]
pub struct SwapTracker {
    gate: DurationGate<(Hand, Identity)>,
    pulse_interval_ms: f64,
    pulses_sent: u32,
    /// Subject seen with the hands apart while the conditions held.
    armed: Option<(Hand, Identity)>,
}

impl SwapTracker {
    pub fn new(duration_ms: f64, pulse_interval_ms: f64) -> Self {
        Self {
            gate: DurationGate::new(duration_ms),
            pulse_interval_ms,
            pulses_sent: 0,
            armed: None,
        }
    }

    pub fn set_timing(&mut self, duration_ms: f64, pulse_interval_ms: f64) {
        self.gate.duration_ms = duration_ms;
        self.pulse_interval_ms = pulse_interval_ms;
    }

    /// Advance with the current origin candidate. `ready` covers every
    /// condition except contact itself.
    pub fn update(
        &mut self,
        candidate: Option<(Hand, Identity)>,
        ready: bool,
        touching: bool,
        dt_ms: f64,
    ) -> SwapStep {
        if !ready || candidate.is_none() {
            self.armed = None;
        } else if !touching {
            self.armed = candidate;
        }
        let predicate = ready && touching && candidate.is_some() && self.armed == candidate;

        let was_active = self.gate.status().active;
        let previous = self.gate.binding().copied();
        let status = self.gate.update(candidate, predicate, dt_ms);

        if !status.active {
            self.pulses_sent = 0;
            return if was_active {
                debug!("Hand swap cancelled ({:?})", previous);
                SwapStep::Cancelled
            } else {
                SwapStep::Idle
            };
        }
        if was_active && previous != candidate {
            // Binding changed mid-gesture; the gate restarted for the new subject.
            debug!("Hand swap restarted for {:?}", candidate);
            self.pulses_sent = 0;
        }

        if status.crossed {
            let origin = candidate.map(|(h, _)| h);
            self.gate.reset();
            self.pulses_sent = 0;
            self.armed = None;
            return match origin {
                Some(origin) => SwapStep::Complete { origin },
                None => SwapStep::Idle,
            };
        }

        if self.pulse_due(&status) {
            self.pulses_sent += 1;
            return SwapStep::Pulse;
        }
        SwapStep::Holding
    }

    fn pulse_due(&self, status: &GateStatus) -> bool {
        if status.satisfied {
            return false;
        }
        let interval = self.pulse_interval_ms.max(1.0);
        let due = (status.elapsed_ms / interval).floor() as u32 + 1;
        due > self.pulses_sent
    }

    /// Abandon any gesture in progress (external change to the origin).
    pub fn cancel(&mut self) {
        if self.gate.status().active {
            debug!("Hand swap cancelled externally");
        }
        self.gate.reset();
        self.pulses_sent = 0;
        self.armed = None;
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.gate.status().elapsed_ms
    }

    pub fn origin(&self) -> Option<Hand> {
        if self.gate.status().active {
            self.gate.binding().map(|(h, _)| *h)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Material;

    const WOOD: Identity = Identity::Container(Material::Wood);

    /// Tracker that has seen `c` with the hands apart.
    fn armed(c: Option<(Hand, Identity)>) -> SwapTracker {
        let mut s = SwapTracker::new(2000.0, 1000.0);
        assert_eq!(s.update(c, true, false, 100.0), SwapStep::Idle);
        s
    }

    #[test]
    fn test_pulses_then_complete() {
        let c = Some((Hand::Left, WOOD));
        let mut s = armed(c);
        assert_eq!(s.update(c, true, true, 100.0), SwapStep::Pulse);
        assert_eq!(s.update(c, true, true, 500.0), SwapStep::Holding);
        assert_eq!(s.update(c, true, true, 500.0), SwapStep::Pulse);
        assert_eq!(s.update(c, true, true, 999.0), SwapStep::Holding);
        assert_eq!(
            s.update(c, true, true, 2.0),
            SwapStep::Complete { origin: Hand::Left }
        );
        // Still touching: no new gesture until the hands part.
        assert_eq!(s.update(c, true, true, 100.0), SwapStep::Idle);
        assert_eq!(s.update(c, true, false, 100.0), SwapStep::Idle);
        assert_eq!(s.update(c, true, true, 100.0), SwapStep::Pulse);
    }

    #[test]
    fn test_contact_before_ready_does_not_count() {
        let mut s = SwapTracker::new(2000.0, 1000.0);
        let c = Some((Hand::Right, WOOD));
        // Hands already together when the item becomes swappable.
        s.update(c, false, true, 100.0);
        for _ in 0..30 {
            assert_eq!(s.update(c, true, true, 100.0), SwapStep::Idle);
        }
        assert_eq!(s.origin(), None);
    }

    #[test]
    fn test_losing_ready_disarms() {
        let c = Some((Hand::Right, WOOD));
        let mut s = armed(c);
        s.update(c, false, false, 100.0);
        assert_eq!(s.update(c, true, true, 100.0), SwapStep::Idle);
    }

    #[test]
    fn test_break_cancels() {
        let c = Some((Hand::Right, WOOD));
        let mut s = armed(c);
        s.update(c, true, true, 0.0);
        s.update(c, true, true, 1999.0);
        assert_eq!(s.update(c, true, false, 1.0), SwapStep::Cancelled);
        assert_eq!(s.update(c, true, false, 1.0), SwapStep::Idle);
        assert_eq!(s.elapsed_ms(), 0.0);
        // Parting re-arms.
        assert_eq!(s.update(c, true, true, 100.0), SwapStep::Pulse);
    }

    #[test]
    fn test_origin_change_cancels() {
        let mut s = armed(Some((Hand::Left, WOOD)));
        s.update(Some((Hand::Left, WOOD)), true, true, 1500.0);
        assert_eq!(s.origin(), Some(Hand::Left));
        assert_eq!(
            s.update(Some((Hand::Right, WOOD)), true, true, 600.0),
            SwapStep::Cancelled
        );
        assert_eq!(s.elapsed_ms(), 0.0);
        assert_eq!(s.origin(), None);
    }

    #[test]
    fn test_external_cancel() {
        let c = Some((Hand::Left, Identity::Tool));
        let mut s = armed(c);
        s.update(c, true, true, 0.0);
        s.update(c, true, true, 1900.0);
        s.cancel();
        assert_eq!(s.origin(), None);
        assert_eq!(s.update(c, true, true, 200.0), SwapStep::Idle);
        assert_eq!(s.update(c, true, false, 100.0), SwapStep::Idle);
        assert_eq!(s.update(c, true, true, 200.0), SwapStep::Pulse);
        assert!(matches!(s.update(c, true, true, 200.0), SwapStep::Holding));
    }
}
