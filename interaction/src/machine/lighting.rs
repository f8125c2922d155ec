//! Lighting tracker.
//!
//! A lightable item (filled container or unlit wrap) held in one hand and
//! the igniter held in the other, kept within the lighting radius for the
//! configured duration, ignites the item. While the contact holds the
//! caller pulses weakly every tick; after a short delay the burning cue
//! starts, and it stops when contact breaks or ignition fires.

use tracing::debug;

use crate::hand::Hand;
use crate::state::Identity;
use crate::zones::DurationGate;

/// Per-tick instructions for the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LightingStep {
    /// Weak feedback on the lightable hand this tick.
    pub pulse: Option<Hand>,
    /// Start the burning cue for this hand.
    pub start_cue: Option<Hand>,
    /// Stop the burning cue.
    pub stop_cue: bool,
    /// Ignite the item in this hand.
    pub ignite: Option<Hand>,
}

#[derive(Debug, Clone)]
pub struct LightingTracker {
    gate: DurationGate<(Hand, Identity)>,
    cue_delay_ms: f64,
    cue_playing: bool,
}

impl LightingTracker {
    pub fn new(duration_ms: f64, cue_delay_ms: f64) -> Self {
        Self {
            gate: DurationGate::new(duration_ms),
            cue_delay_ms,
            cue_playing: false,
        }
    }

    pub fn set_timing(&mut self, duration_ms: f64, cue_delay_ms: f64) {
        self.gate.duration_ms = duration_ms;
        self.cue_delay_ms = cue_delay_ms;
    }

    pub fn update(
        &mut self,
        candidate: Option<(Hand, Identity)>,
        predicate: bool,
        dt_ms: f64,
    ) -> LightingStep {
        let status = self.gate.update(candidate, predicate, dt_ms);
        let mut step = LightingStep::default();

        if !status.active {
            if self.cue_playing {
                debug!("Lighting contact broken");
                self.cue_playing = false;
                step.stop_cue = true;
            }
            return step;
        }

        let Some((hand, _)) = candidate else {
            return step;
        };

        if status.crossed {
            self.gate.reset();
            if self.cue_playing {
                self.cue_playing = false;
                step.stop_cue = true;
            }
            step.ignite = Some(hand);
            return step;
        }

        step.pulse = Some(hand);
        if !self.cue_playing && status.elapsed_ms >= self.cue_delay_ms {
            self.cue_playing = true;
            step.start_cue = Some(hand);
        }
        step
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.gate.status().elapsed_ms
    }

    /// Abandon progress. Returns true if the cue needs stopping.
    pub fn reset(&mut self) -> bool {
        self.gate.reset();
        std::mem::replace(&mut self.cue_playing, false)
    }
}
