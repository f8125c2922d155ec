//! Tick pipeline.
//!
//! One `tick` drains the input queue, samples poses, evaluates zones,
//! dispatches every queued notification, runs the gate-driven transitions,
//! and finally issues the delayed commands that have come due. The tick
//! never blocks and nothing in it returns an error.

use tracing::{debug, info, trace, warn};

use crate::catalog::Classifier;
use crate::config::{ConfigSource, InteractionConfig};
use crate::events::{EventQueue, EventSender, InputEvent};
use crate::hand::Handedness;
use crate::machine::{Collaborators, InteractionMachine};
use crate::schedule::CommandQueue;
use crate::state::InteractionState;
use crate::tracking::{PoseSource, SpatialSampler};
use crate::world::{EffectApplier, FeedbackSink, World};
use crate::zones::{ZoneEvaluator, ZoneReport};

/// External collaborators handed to the engine at construction.
pub struct EngineParts {
    pub config_source: Box<dyn ConfigSource>,
    pub poses: Box<dyn PoseSource>,
    pub world: Box<dyn World>,
    pub feedback: Box<dyn FeedbackSink>,
    pub effects: Box<dyn EffectApplier>,
    pub catalog: Box<dyn Classifier>,
}

pub struct Engine {
    config: InteractionConfig,
    config_source: Box<dyn ConfigSource>,
    sampler: SpatialSampler,
    zones: ZoneEvaluator,
    machine: InteractionMachine,
    state: InteractionState,
    commands: CommandQueue,
    events: EventQueue,
    poses: Box<dyn PoseSource>,
    world: Box<dyn World>,
    feedback: Box<dyn FeedbackSink>,
    effects: Box<dyn EffectApplier>,
    catalog: Box<dyn Classifier>,
    paused: bool,
    now_ms: f64,
    ticks: u64,
    last_report: ZoneReport,
}

impl Engine {
    /// Build an engine. A config that fails to load falls back to defaults.
    pub fn new(parts: EngineParts) -> Self {
        let config = match parts.config_source.load() {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %e, "config load failed, using defaults");
                InteractionConfig::default()
            }
        };
        info!(
            left_handed = config.left_handed,
            max_consumptions = config.max_consumptions,
            "interaction engine ready"
        );
        Self {
            sampler: SpatialSampler::new(),
            zones: ZoneEvaluator::new(&config),
            machine: InteractionMachine::new(&config),
            state: InteractionState::new(Handedness::new(config.left_handed)),
            commands: CommandQueue::new(),
            events: EventQueue::new(config.event_queue_capacity),
            config_source: parts.config_source,
            poses: parts.poses,
            world: parts.world,
            feedback: parts.feedback,
            effects: parts.effects,
            catalog: parts.catalog,
            paused: false,
            now_ms: 0.0,
            ticks: 0,
            last_report: ZoneReport::default(),
            config,
        }
    }

    /// Handle for the input layer to push notifications with.
    pub fn sender(&self) -> EventSender {
        self.events.sender()
    }

    /// Advance by `dt_ms`.
    pub fn tick(&mut self, dt_ms: f64) {
        let dt_ms = dt_ms.max(0.0);
        self.now_ms += dt_ms;
        self.ticks += 1;

        let events = self.events.drain();
        if !self.paused {
            let sample = self.sampler.sample(self.poses.as_ref());
            self.last_report = self.zones.evaluate(&sample, dt_ms);
            for event in &self.last_report.events {
                debug!("Zone edge: {:?}", event);
            }
        }

        for event in &events {
            match event {
                InputEvent::MenuOpened => self.pause(),
                InputEvent::MenuClosed => self.resume(),
                InputEvent::Reset => self.reset(),
                _ => {
                    let mut cx = Collaborators {
                        world: self.world.as_mut(),
                        feedback: self.feedback.as_mut(),
                        effects: self.effects.as_mut(),
                        catalog: self.catalog.as_ref(),
                        commands: &mut self.commands,
                        now_ms: self.now_ms,
                    };
                    self.machine
                        .handle_event(&mut self.state, &mut cx, event, &self.last_report);
                }
            }
        }

        if !self.paused {
            let mut cx = Collaborators {
                world: self.world.as_mut(),
                feedback: self.feedback.as_mut(),
                effects: self.effects.as_mut(),
                catalog: self.catalog.as_ref(),
                commands: &mut self.commands,
                now_ms: self.now_ms,
            };
            self.machine
                .update(&mut self.state, &mut cx, &self.last_report, dt_ms);
        }

        let ran = self.commands.run_due(self.now_ms, self.world.as_mut());
        if ran > 0 {
            trace!(ran, pending = self.commands.len(), "delayed commands");
        }

        for problem in self.state.invariant_violations() {
            warn!("Interaction state inconsistent: {}", problem);
        }
    }

    fn pause(&mut self) {
        if self.paused {
            return;
        }
        self.paused = true;
        self.machine.reset_transient(self.world.as_mut());
        self.last_report = ZoneReport::default();
        info!("Interaction paused");
    }

    /// Reload checkpoint.
    fn resume(&mut self) {
        if !self.paused {
            return;
        }
        self.paused = false;
        match self.config_source.load() {
            Ok(config) => self.apply_config(config),
            Err(e) => warn!(error = %e, "config reload failed, keeping previous config"),
        }
        self.zones.reset();
        self.machine.reset_transient(self.world.as_mut());
        self.last_report = ZoneReport::default();
        info!("Interaction resumed");
    }

    /// Forget all interaction state (player death, save load).
    pub fn reset(&mut self) {
        let mut cx = Collaborators {
            world: self.world.as_mut(),
            feedback: self.feedback.as_mut(),
            effects: self.effects.as_mut(),
            catalog: self.catalog.as_ref(),
            commands: &mut self.commands,
            now_ms: self.now_ms,
        };
        self.machine.reset(&mut self.state, &mut cx);
        self.zones.reset();
        self.last_report = ZoneReport::default();
    }

    /// Install a new configuration without waiting for a checkpoint.
    pub fn apply_config(&mut self, config: InteractionConfig) {
        if config.left_handed != self.config.left_handed {
            info!(left_handed = config.left_handed, "handedness changed");
        }
        self.state.handedness = Handedness::new(config.left_handed);
        self.zones.apply_config(&config);
        self.machine.apply_config(&config);
        self.config = config;
    }

    pub fn config(&self) -> &InteractionConfig {
        &self.config
    }

    pub fn state(&self) -> &InteractionState {
        &self.state
    }

    pub fn machine(&self) -> &InteractionMachine {
        &self.machine
    }

    pub fn last_report(&self) -> &ZoneReport {
        &self.last_report
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn now_ms(&self) -> f64 {
        self.now_ms
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Delayed commands not yet issued.
    pub fn pending_commands(&self) -> usize {
        self.commands.len()
    }

    /// Input events lost to a full queue.
    pub fn dropped_events(&self) -> u64 {
        self.events.dropped()
    }

    /// Generate IPC status s-expression.
    pub fn status_sexp(&self) -> String {
        format!(
            "(:type :status :tick {} :time-ms {:.0} :paused {} :state {} :zones {} :machine {} :pending-commands {} :dropped-events {})",
            self.ticks,
            self.now_ms,
            if self.paused { "t" } else { "nil" },
            self.state.status_sexp(),
            self.zones.status_sexp(),
            self.machine.status_sexp(),
            self.commands.len(),
            self.events.dropped(),
        )
    }
}

#[cfg(test)]
mod tests {
    use crate::config::InteractionConfig;
    use crate::hand::{Hand, ModelHand};
    use crate::sim::Rig;
    use crate::world::ItemKey;

    #[test]
    fn test_equip_notification_tracked() {
        let mut rig = Rig::new(InteractionConfig::default());
        rig.world.equip(ModelHand::Right, "pipe-wood-empty");
        rig.tick(100.0);
        let token = rig.engine.state().token(Hand::Right).unwrap();
        assert_eq!(token.key, ItemKey::new("pipe-wood-empty"));
    }

    #[test]
    fn test_paused_engine_freezes_zones() {
        let mut rig = Rig::new(InteractionConfig::default());
        rig.world.open_menu();
        rig.tick(100.0);
        assert!(rig.engine.is_paused());
        rig.poses.hands_apart(2.0);
        rig.tick(100.0);
        assert!(!rig.engine.last_report().touching);
        rig.world.close_menu();
        rig.tick(100.0);
        assert!(!rig.engine.is_paused());
        rig.tick(100.0);
        assert!(rig.engine.last_report().touching);
    }

    #[test]
    fn test_status_sexp_parses() {
        let mut rig = Rig::new(InteractionConfig::default());
        rig.world.equip(ModelHand::Left, "flame-spell");
        rig.tick(100.0);
        let sexp = rig.engine.status_sexp();
        assert!(sexp.starts_with("(:type :status"));
        assert!(lexpr::from_str(&sexp).is_ok());
    }
}
