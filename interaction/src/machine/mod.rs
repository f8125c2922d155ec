//! Interaction state machine.
//!
//! Reacts to two inputs: external notifications (grab, drop, impulse,
//! equip, unequip) and the per-tick `ZoneReport`. It is the only writer of
//! `InteractionState`. Every transition validates all lookups first and
//! then commits; a failed lookup aborts that transition alone.
//!
//! Equip changes the machine issues itself are remembered as expectations
//! so the matching notifications are not mistaken for player actions.

mod inhale;
mod lighting;
mod swap;

pub use inhale::{InhaleStep, InhaleTracker};
pub use lighting::{LightingStep, LightingTracker};
pub use swap::{SwapStep, SwapTracker};

use tracing::{debug, info, trace, warn};

use crate::catalog::{Classifier, ContainerStage, ItemKind, Material, WrapStage};
use crate::config::InteractionConfig;
use crate::crafting::{CraftingMachine, CraftingOutcome, WorkPiece};
use crate::error::TransitionError;
use crate::events::InputEvent;
use crate::hand::{Hand, ModelHand};
use crate::schedule::{CommandQueue, DelayedCommand};
use crate::state::{
    ActiveEffectContext, HeldObject, Identity, InteractionState, InteractionToken, Lifecycle,
    Payload,
};
use crate::world::{Cue, EffectApplier, FeedbackSink, ItemClass, ItemKey, ObjectRef, World};
use crate::zones::{DurationGate, ZoneReport};

// ── Feedback levels (intensity, seconds) ───────────────────

const FILL_PULSE: (f32, f32) = (0.5, 0.3);
const IGNITE_PULSE: (f32, f32) = (0.5, 0.3);
const EMPTY_PULSE: (f32, f32) = (0.3, 0.2);
const SWAP_PULSE: (f32, f32) = (0.8, 0.15);
const LIGHTING_PULSE: (f32, f32) = (0.08, 0.022);
const READY_PULSE: (f32, f32) = (0.2, 0.1);
const CRAFT_HIT_PULSE: (f32, f32) = (0.4, 0.1);
const CRAFTED_PULSE: (f32, f32) = (0.6, 0.3);

/// Unmatched expectations are dropped after this long.
const EXPECTATION_TTL_MS: f64 = 5000.0;

// ── Collaborators ──────────────────────────────────────────

/// Borrowed view of everything the machine talks to during one tick.
pub struct Collaborators<'a> {
    pub world: &'a mut dyn World,
    pub feedback: &'a mut dyn FeedbackSink,
    pub effects: &'a mut dyn EffectApplier,
    pub catalog: &'a dyn Classifier,
    pub commands: &'a mut CommandQueue,
    /// Engine clock.
    pub now_ms: f64,
}

impl Collaborators<'_> {
    fn pulse(&mut self, hand: Hand, (intensity, seconds): (f32, f32)) {
        self.feedback.emit_pulse(hand, intensity, seconds);
    }

    /// Representation key and live class for a kind.
    fn resolve_kind(&self, kind: &ItemKind) -> Result<(ItemKey, ItemClass), TransitionError> {
        let key = self
            .catalog
            .representation(kind)
            .ok_or_else(|| TransitionError::Unresolved(ItemKey::new(kind.as_str())))?;
        let class = self.resolve_key(&key)?;
        Ok((key, class))
    }

    fn resolve_key(&self, key: &ItemKey) -> Result<ItemClass, TransitionError> {
        self.world
            .resolve(key)
            .ok_or_else(|| TransitionError::Unresolved(key.clone()))
    }

    fn check_valid(&self, object: ObjectRef) -> Result<(), TransitionError> {
        if self.world.is_valid(object) {
            Ok(())
        } else {
            Err(TransitionError::StaleReference(object))
        }
    }
}

// ── Expectations ───────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExpectKind {
    Equip,
    Unequip,
}

#[derive(Debug, Clone)]
struct Expectation {
    kind: ExpectKind,
    hand: ModelHand,
    key: ItemKey,
    issued_ms: f64,
}

/// A validated stage change waiting to be committed.
struct Restage {
    hand: Hand,
    next: InteractionToken,
    old_class: ItemClass,
    new_class: ItemClass,
}

// ── InteractionMachine ─────────────────────────────────────

pub struct InteractionMachine {
    config: InteractionConfig,
    /// Ready-to-fill cue, bound to the container hand.
    ready: DurationGate<Hand>,
    /// Empty-out gesture per hand, bound to the flipped container.
    flip: [DurationGate<Identity>; 2],
    /// Set after an empty-out until the hand un-flips.
    await_unflip: [bool; 2],
    lighting: LightingTracker,
    swap: SwapTracker,
    inhale: InhaleTracker,
    crafting: CraftingMachine,
    expected: Vec<Expectation>,
    glowing: Option<ModelHand>,
    near_clip_reduced: bool,
    near_clip_restore_ms: Option<f64>,
}

impl InteractionMachine {
    pub fn new(config: &InteractionConfig) -> Self {
        Self {
            config: config.clone(),
            ready: DurationGate::new(config.touch_duration_ms),
            flip: [
                DurationGate::new(config.flip_duration_ms),
                DurationGate::new(config.flip_duration_ms),
            ],
            await_unflip: [false; 2],
            lighting: LightingTracker::new(config.light_duration_ms, config.light_cue_delay_ms),
            swap: SwapTracker::new(config.swap_duration_ms, config.swap_pulse_interval_ms),
            inhale: InhaleTracker::new(),
            crafting: CraftingMachine::new(),
            expected: Vec::new(),
            glowing: None,
            near_clip_reduced: false,
            near_clip_restore_ms: None,
        }
    }

    pub fn apply_config(&mut self, config: &InteractionConfig) {
        self.ready.duration_ms = config.touch_duration_ms;
        for gate in &mut self.flip {
            gate.duration_ms = config.flip_duration_ms;
        }
        self.lighting
            .set_timing(config.light_duration_ms, config.light_cue_delay_ms);
        self.swap
            .set_timing(config.swap_duration_ms, config.swap_pulse_interval_ms);
        self.config = config.clone();
    }

    /// Abandon every gesture in progress (pause, resume).
    pub fn reset_transient(&mut self, world: &mut dyn World) {
        self.ready.reset();
        for gate in &mut self.flip {
            gate.reset();
        }
        self.await_unflip = [false; 2];
        if self.lighting.reset() {
            world.stop_cue(Cue::Burning);
        }
        self.swap.cancel();
        self.inhale.disarm();
        if let Some(model) = self.glowing.take() {
            world.set_glow(model, false);
        }
    }

    /// Drop everything tracked: equipped items are put away, held objects
    /// forgotten, payloads and crafting progress discarded, pending delayed
    /// commands cancelled.
    pub fn reset(&mut self, state: &mut InteractionState, cx: &mut Collaborators<'_>) {
        self.reset_transient(&mut *cx.world);
        // Cancelled equips will never be confirmed. Notifications already in
        // flight keep their expectations.
        for command in cx.commands.cancel_all() {
            let DelayedCommand::Equip { class, hand, .. } = command;
            self.take_expected(ExpectKind::Equip, hand, &class.key);
        }

        for hand in Hand::BOTH {
            if let Some(token) = state.slot_mut(hand).take() {
                let model = state.model(hand);
                // A restaged item whose equip was just cancelled is not in the world.
                if cx.world.equipped_in(model).as_ref() == Some(&token.key) {
                    match cx.resolve_key(&token.key) {
                        Ok(class) => self.unequip_now(cx, class, model),
                        Err(e) => warn!(hand = hand.as_str(), error = %e, "reset unequip skipped"),
                    }
                }
            }
            if let Some(held) = state.take_held(hand) {
                if held.scaled && cx.world.is_valid(held.object) {
                    cx.world.set_scale(held.object, 1.0);
                }
            }
        }

        self.clear_effect(state, cx);
        state.clear_payloads();
        self.crafting.reset();
        if self.near_clip_reduced {
            cx.world.set_near_clip(false);
        }
        self.near_clip_reduced = false;
        self.near_clip_restore_ms = None;
        info!("Interaction state reset");
    }

    pub fn consumption_count(&self) -> u32 {
        self.inhale.count()
    }

    pub fn crafting(&self) -> &CraftingMachine {
        &self.crafting
    }

    pub fn pending_expectations(&self) -> usize {
        self.expected.len()
    }

    // ── Notifications ──────────────────────────────────────

    /// Dispatch one external notification against this tick's report.
    pub fn handle_event(
        &mut self,
        state: &mut InteractionState,
        cx: &mut Collaborators<'_>,
        event: &InputEvent,
        report: &ZoneReport,
    ) {
        trace!(event = event.as_str(), "dispatch");
        match event {
            InputEvent::Grabbed { hand, object, key } => {
                self.on_grabbed(state, cx, *hand, *object, key)
            }
            InputEvent::Dropped { hand, object, key } => {
                self.on_dropped(state, cx, *hand, *object, key, report)
            }
            InputEvent::ContactImpulse {
                hand,
                relative_velocity,
                ..
            } => self.on_impulse(state, cx, *hand, *relative_velocity),
            InputEvent::Equipped { hand, key } => self.on_equipped(state, cx, *hand, key),
            InputEvent::Unequipped { hand, key } => self.on_unequipped(state, cx, *hand, key),
            // Pause, resume and reset are routed by the engine.
            InputEvent::MenuOpened | InputEvent::MenuClosed | InputEvent::Reset => {}
        }
    }

    fn on_grabbed(
        &mut self,
        state: &mut InteractionState,
        cx: &mut Collaborators<'_>,
        hand: Hand,
        object: ObjectRef,
        key: &ItemKey,
    ) {
        let Some(kind) = cx.catalog.classify(key) else {
            return;
        };
        match &kind {
            ItemKind::Consumable { .. } => {
                let scaled = state
                    .token(hand.other())
                    .and_then(|t| t.container_stage())
                    == Some(ContainerStage::Unfilled);
                if scaled {
                    cx.world.set_scale(object, self.config.consumable_grab_scale);
                }
                state.set_held(
                    hand,
                    HeldObject {
                        object,
                        key: key.clone(),
                        kind: kind.clone(),
                        scaled,
                    },
                );
            }
            ItemKind::WrappingMaterial => {
                state.set_held(
                    hand,
                    HeldObject {
                        object,
                        key: key.clone(),
                        kind: kind.clone(),
                        scaled: false,
                    },
                );
            }
            ItemKind::PlacedContainer { material } => {
                if let Err(e) = self.equip_placed(state, cx, hand, object, *material) {
                    warn!(hand = hand.as_str(), error = %e, "container pickup aborted");
                }
            }
            ItemKind::CraftingTool | ItemKind::CraftingMaterial { .. } => {
                let outcome = self.crafting.on_grabbed(hand, object, &kind, &self.config);
                let scaled = matches!(outcome, CraftingOutcome::Registered { .. });
                if let CraftingOutcome::Registered { object, scale } = outcome {
                    cx.world.set_scale(object, scale);
                }
                state.set_held(
                    hand,
                    HeldObject {
                        object,
                        key: key.clone(),
                        kind: kind.clone(),
                        scaled,
                    },
                );
            }
            ItemKind::Container { .. } | ItemKind::Wrapped { .. } | ItemKind::Igniter => {}
        }
    }

    fn on_dropped(
        &mut self,
        state: &mut InteractionState,
        cx: &mut Collaborators<'_>,
        hand: Hand,
        object: ObjectRef,
        key: &ItemKey,
        report: &ZoneReport,
    ) {
        let ours = state.held(hand).map(|h| h.object) == Some(object);
        let held = if ours { state.take_held(hand) } else { None };
        let kind = match &held {
            Some(h) => Some(h.kind.clone()),
            None => cx.catalog.classify(key),
        };
        let Some(kind) = kind else {
            return;
        };

        match kind {
            ItemKind::Consumable { effect } => {
                let payload = Payload {
                    effect,
                    source: key.clone(),
                };
                let used = match self.fill_or_wrap(state, cx, hand, object, payload, report) {
                    Ok(used) => used,
                    Err(e) => {
                        warn!(hand = hand.as_str(), error = %e, "fill aborted");
                        false
                    }
                };
                let scaled = held.map(|h| h.scaled).unwrap_or(false);
                if !used && scaled && cx.world.is_valid(object) {
                    cx.world.set_scale(object, 1.0);
                }
            }
            ItemKind::CraftingTool | ItemKind::CraftingMaterial { .. } => {
                let outcome = self.crafting.on_dropped(hand, object);
                if outcome == CraftingOutcome::Reset && cx.world.is_valid(object) {
                    cx.world.set_scale(object, 1.0);
                }
            }
            _ => {}
        }
    }

    fn on_impulse(
        &mut self,
        state: &mut InteractionState,
        cx: &mut Collaborators<'_>,
        hand: Hand,
        relative_velocity: f32,
    ) {
        match self
            .crafting
            .on_impulse(hand, relative_velocity, cx.now_ms, &self.config)
        {
            CraftingOutcome::Hit { object, scale, .. } => {
                cx.world.set_scale(object, scale);
                cx.pulse(hand, CRAFT_HIT_PULSE);
            }
            CraftingOutcome::Finished(piece) => match self.finish_crafting(state, cx, piece) {
                Ok(()) => self.crafting.finish(),
                Err(e) => warn!(hand = piece.hand.as_str(), error = %e, "crafting completion aborted"),
            },
            _ => {}
        }
    }

    fn on_equipped(
        &mut self,
        state: &mut InteractionState,
        cx: &mut Collaborators<'_>,
        model: ModelHand,
        key: &ItemKey,
    ) {
        if self.take_expected(ExpectKind::Equip, model, key) {
            trace!(key = %key, "own equip confirmed");
            return;
        }
        let hand = state.controller(model);
        let Some(kind) = cx.catalog.classify(key) else {
            return;
        };
        let Some(token) = InteractionToken::for_kind(&kind, key.clone(), cx.catalog.grip_for(&kind))
        else {
            return;
        };
        let identity = token.identity();
        self.swap.cancel();

        // One physical item lives in one hand.
        if let Some(prev) = state.find(identity) {
            if prev != hand {
                state.slot_mut(prev).take();
                debug!("{} moved from {} hand", identity.as_str(), prev.as_str());
            }
        }

        let ignited = token.is_ignited();
        if let Some(old) = state.slot_mut(hand).replace(token) {
            let orphaned = state
                .active_effect()
                .map(|c| c.holder == old.identity() && c.holder != identity)
                .unwrap_or(false);
            if orphaned {
                self.clear_effect(state, cx);
            }
        }

        let holds_effect = state.active_effect().map(|c| c.holder) == Some(identity);
        if ignited && holds_effect {
            state.move_active_effect(hand);
        } else if ignited {
            let context = ActiveEffectContext {
                holder: identity,
                hand,
                payload: state.payload(identity).cloned(),
            };
            cx.effects.on_ignited(&context);
            state.set_active_effect(context);
            self.inhale.reset();
        } else if holds_effect {
            self.clear_effect(state, cx);
        }
        debug!(hand = hand.as_str(), key = %key, "external equip tracked");
    }

    fn on_unequipped(
        &mut self,
        state: &mut InteractionState,
        cx: &mut Collaborators<'_>,
        model: ModelHand,
        key: &ItemKey,
    ) {
        if self.take_expected(ExpectKind::Unequip, model, key) {
            trace!(key = %key, "own unequip confirmed");
            return;
        }
        let hand = state.controller(model);
        if state.token(hand).map(|t| &t.key) != Some(key) {
            debug!(hand = hand.as_str(), key = %key, "unequip of untracked item ignored");
            return;
        }
        let Some(token) = state.slot_mut(hand).take() else {
            return;
        };
        self.swap.cancel();
        if state.active_effect().map(|c| c.holder) == Some(token.identity()) {
            self.clear_effect(state, cx);
        }
        debug!(hand = hand.as_str(), key = %key, "external unequip tracked");
    }

    // ── Per-tick gates ─────────────────────────────────────

    /// Run every gate-driven transition for this tick. Each hand's slot is
    /// changed by at most one gate crossing per tick.
    pub fn update(
        &mut self,
        state: &mut InteractionState,
        cx: &mut Collaborators<'_>,
        report: &ZoneReport,
        dt_ms: f64,
    ) {
        let now = cx.now_ms;
        self.expected
            .retain(|e| now - e.issued_ms < EXPECTATION_TTL_MS);

        let mut touched = [false; 2];
        self.update_ready(state, cx, report, dt_ms);
        self.update_lighting(state, cx, report, dt_ms, &mut touched);
        self.update_flip(state, cx, report, dt_ms, &mut touched);
        self.update_inhale(state, cx, report, &mut touched);
        self.update_swap(state, cx, report, dt_ms, &touched);
        self.update_near_clip(state, cx, report, dt_ms);
        self.reapply_grips(state, cx, report);
    }

    fn update_ready(
        &mut self,
        state: &InteractionState,
        cx: &mut Collaborators<'_>,
        report: &ZoneReport,
        dt_ms: f64,
    ) {
        let binding = Hand::BOTH.into_iter().find(|&c| {
            state.token(c).and_then(|t| t.container_stage()) == Some(ContainerStage::Unfilled)
                && matches!(
                    state.held(c.other()).map(|h| &h.kind),
                    Some(ItemKind::Consumable { .. })
                )
        });
        let status = self.ready.update(binding, report.fill, dt_ms);
        if status.crossed {
            if let Some(c) = binding {
                debug!(hand = c.as_str(), "ready to fill");
                cx.pulse(c, READY_PULSE);
            }
        }
    }

    fn update_lighting(
        &mut self,
        state: &mut InteractionState,
        cx: &mut Collaborators<'_>,
        report: &ZoneReport,
        dt_ms: f64,
        touched: &mut [bool; 2],
    ) {
        let candidate = Hand::BOTH.into_iter().find_map(|h| {
            let token = state.token(h)?;
            let tool_opposite = state.token(h.other()).map(|t| t.is_tool()).unwrap_or(false);
            (token.is_lightable() && tool_opposite).then(|| (h, token.identity()))
        });
        let predicate = match candidate {
            Some((_, Identity::Wrap)) => report.wrap_light,
            Some(_) => report.container_light,
            None => false,
        };

        let step = self.lighting.update(candidate, predicate, dt_ms);
        if step.stop_cue {
            cx.world.stop_cue(Cue::Burning);
        }
        if let Some(h) = step.start_cue {
            cx.world.play_cue(Cue::Burning, state.model(h));
        }
        if let Some(h) = step.pulse {
            cx.pulse(h, LIGHTING_PULSE);
        }
        if let Some(h) = step.ignite {
            match self.ignite(state, cx, h) {
                Ok(()) => touched[h.index()] = true,
                Err(e) => warn!(hand = h.as_str(), error = %e, "ignition aborted"),
            }
        }
    }

    fn update_flip(
        &mut self,
        state: &mut InteractionState,
        cx: &mut Collaborators<'_>,
        report: &ZoneReport,
        dt_ms: f64,
        touched: &mut [bool; 2],
    ) {
        for hand in Hand::BOTH {
            let i = hand.index();
            let flipped = report.flipped(hand);
            if !flipped {
                self.await_unflip[i] = false;
            }
            let binding = state
                .token(hand)
                .filter(|t| {
                    matches!(
                        t.container_stage(),
                        Some(ContainerStage::Filled | ContainerStage::Ignited)
                    )
                })
                .map(|t| t.identity());
            let predicate = flipped && !self.await_unflip[i] && !touched[i];
            let status = self.flip[i].update(binding, predicate, dt_ms);
            if status.crossed {
                self.await_unflip[i] = true;
                match self.empty_out(state, cx, hand) {
                    Ok(()) => touched[i] = true,
                    Err(e) => warn!(hand = hand.as_str(), error = %e, "empty-out aborted"),
                }
            }
        }
    }

    fn update_inhale(
        &mut self,
        state: &mut InteractionState,
        cx: &mut Collaborators<'_>,
        report: &ZoneReport,
        touched: &mut [bool; 2],
    ) {
        let Some(hand) = state.active_effect().map(|c| c.hand) else {
            return;
        };
        match self
            .inhale
            .update(report.face_dwell(hand), report.near_face(hand))
        {
            InhaleStep::GlowOn => {
                let model = state.model(hand);
                cx.world.set_glow(model, true);
                self.glowing = Some(model);
            }
            InhaleStep::Consumed(count) => {
                self.glow_off(cx);
                cx.world.play_cue(Cue::Exhale, state.model(hand));
                if let Some(context) = state.active_effect() {
                    cx.effects.on_consumed(context, count);
                }
                debug!(
                    "Consumption {}/{} from {} hand",
                    count,
                    self.config.max_consumptions,
                    hand.as_str()
                );
                if count >= self.config.max_consumptions && !touched[hand.index()] {
                    match self.deplete(state, cx, hand) {
                        Ok(()) => touched[hand.index()] = true,
                        Err(e) => warn!(hand = hand.as_str(), error = %e, "depletion aborted"),
                    }
                }
            }
            InhaleStep::None => {}
        }
    }

    fn update_swap(
        &mut self,
        state: &mut InteractionState,
        cx: &mut Collaborators<'_>,
        report: &ZoneReport,
        dt_ms: f64,
        touched: &[bool; 2],
    ) {
        let candidate = state
            .sole_occupied()
            .and_then(|h| state.token(h).map(|t| (h, t.identity())));
        let ready = match candidate {
            Some((origin, _)) => {
                let other = origin.other();
                !report.any_near_face()
                    && !touched[0]
                    && !touched[1]
                    && state.held(other).is_none()
                    && cx.world.grabbed_in(other).is_none()
                    && cx.world.equipped_in(state.model(other)).is_none()
            }
            None => false,
        };

        match self.swap.update(candidate, ready, report.touching, dt_ms) {
            SwapStep::Pulse => {
                for h in Hand::BOTH {
                    cx.pulse(h, SWAP_PULSE);
                }
            }
            SwapStep::Complete { origin } => {
                if let Err(e) = self.complete_swap(state, cx, origin) {
                    warn!(hand = origin.as_str(), error = %e, "hand swap aborted");
                }
            }
            SwapStep::Idle | SwapStep::Holding | SwapStep::Cancelled => {}
        }
    }

    fn update_near_clip(
        &mut self,
        state: &InteractionState,
        cx: &mut Collaborators<'_>,
        report: &ZoneReport,
        dt_ms: f64,
    ) {
        if let Some(remaining) = self.near_clip_restore_ms.as_mut() {
            *remaining -= dt_ms;
        }
        for hand in Hand::BOTH {
            if state.token(hand).is_none() {
                continue;
            }
            if report.entered_face(hand) {
                if !self.near_clip_reduced {
                    cx.world.set_near_clip(true);
                    self.near_clip_reduced = true;
                    debug!("Near clip reduced");
                }
                self.near_clip_restore_ms = None;
            } else if report.exited_face(hand) && self.near_clip_reduced && !report.any_near_face()
            {
                self.near_clip_restore_ms = Some(self.config.near_clip_restore_ms);
            }
        }
        let expired = self.near_clip_restore_ms.map(|r| r <= 0.0).unwrap_or(false);
        if self.near_clip_reduced && (expired || !state.any_equipped()) {
            cx.world.set_near_clip(false);
            self.near_clip_reduced = false;
            self.near_clip_restore_ms = None;
            debug!("Near clip restored");
        }
    }

    fn reapply_grips(
        &mut self,
        state: &InteractionState,
        cx: &mut Collaborators<'_>,
        report: &ZoneReport,
    ) {
        if !report.touching {
            return;
        }
        for hand in Hand::BOTH {
            let Some(grip) = state.token(hand).and_then(|t| t.grip) else {
                continue;
            };
            let other = hand.other();
            if state.held(other).is_some() || cx.world.grabbed_in(other).is_some() {
                cx.world.apply_grip(state.model(hand), &grip);
            }
        }
    }

    // ── Transitions ────────────────────────────────────────

    fn fill_or_wrap(
        &mut self,
        state: &mut InteractionState,
        cx: &mut Collaborators<'_>,
        hand: Hand,
        consumable: ObjectRef,
        payload: Payload,
        report: &ZoneReport,
    ) -> Result<bool, TransitionError> {
        let other = hand.other();
        match state.token(other).and_then(|t| t.container_stage()) {
            Some(ContainerStage::Unfilled) if report.fill => {
                self.fill(state, cx, other, consumable, payload)?;
                return Ok(true);
            }
            Some(ContainerStage::Filled | ContainerStage::Ignited) => {
                debug!(hand = other.as_str(), "container already filled, drop ignored");
                return Ok(false);
            }
            _ => {}
        }
        let wrap_held = matches!(
            state.held(other).map(|h| &h.kind),
            Some(ItemKind::WrappingMaterial)
        );
        if wrap_held && report.wrap {
            self.combine_wrap(state, cx, other, consumable, payload)?;
            return Ok(true);
        }
        Ok(false)
    }

    /// `Unfilled --drop--> Filled` for the container in `hand`.
    fn fill(
        &mut self,
        state: &mut InteractionState,
        cx: &mut Collaborators<'_>,
        hand: Hand,
        consumable: ObjectRef,
        payload: Payload,
    ) -> Result<(), TransitionError> {
        let restage = self.prepare_restage(
            state,
            cx,
            hand,
            Lifecycle::Container(ContainerStage::Filled),
        )?;
        cx.check_valid(consumable)?;

        let identity = restage.next.identity();
        cx.world.despawn(consumable);
        self.commit_restage(state, cx, restage);
        info!(
            hand = hand.as_str(),
            container = identity.as_str(),
            effect = payload.effect.as_str(),
            "container filled"
        );
        state.set_payload(identity, payload);
        cx.pulse(hand, FILL_PULSE);
        Ok(())
    }

    /// Wrap held in `hand` plus a consumable becomes one unlit wrapped item.
    fn combine_wrap(
        &mut self,
        state: &mut InteractionState,
        cx: &mut Collaborators<'_>,
        hand: Hand,
        consumable: ObjectRef,
        payload: Payload,
    ) -> Result<(), TransitionError> {
        let paper = state
            .held(hand)
            .map(|h| h.object)
            .ok_or(TransitionError::SlotMismatch { hand })?;
        if !state.slot(hand).is_empty() {
            return Err(TransitionError::SlotMismatch { hand });
        }
        if state.find(Identity::Wrap).is_some() {
            return Err(TransitionError::SlotMismatch { hand: hand.other() });
        }
        let kind = ItemKind::Wrapped {
            stage: WrapStage::Unlit,
        };
        let (key, class) = cx.resolve_kind(&kind)?;
        cx.check_valid(paper)?;
        cx.check_valid(consumable)?;

        cx.world.despawn(paper);
        cx.world.despawn(consumable);
        state.take_held(hand);
        self.schedule_equip(cx, class, state.model(hand));
        state
            .slot_mut(hand)
            .replace(InteractionToken::wrap(WrapStage::Unlit, key, cx.catalog.grip_for(&kind)));
        info!(
            hand = hand.as_str(),
            effect = payload.effect.as_str(),
            "wrapped item made"
        );
        state.set_payload(Identity::Wrap, payload);
        cx.pulse(hand, FILL_PULSE);
        Ok(())
    }

    /// `Filled|Unlit --tool held--> Ignited`.
    fn ignite(
        &mut self,
        state: &mut InteractionState,
        cx: &mut Collaborators<'_>,
        hand: Hand,
    ) -> Result<(), TransitionError> {
        let lifecycle = match state.token(hand).map(|t| t.lifecycle) {
            Some(Lifecycle::Container(ContainerStage::Filled)) => {
                Lifecycle::Container(ContainerStage::Ignited)
            }
            Some(Lifecycle::Wrap(WrapStage::Unlit)) => Lifecycle::Wrap(WrapStage::Ignited),
            Some(_) => return Err(TransitionError::SlotMismatch { hand }),
            None => return Err(TransitionError::NothingEquipped { hand }),
        };
        let restage = self.prepare_restage(state, cx, hand, lifecycle)?;
        let identity = restage.next.identity();
        self.commit_restage(state, cx, restage);

        if let Some(previous) = state.clear_active_effect() {
            debug!("active effect moves from {}", previous.holder.as_str());
            cx.effects.on_cleared();
        }
        let context = ActiveEffectContext {
            holder: identity,
            hand,
            payload: state.payload(identity).cloned(),
        };
        if context.payload.is_none() {
            debug!("{} ignited without a known payload", identity.as_str());
        }
        cx.effects.on_ignited(&context);
        state.set_active_effect(context);
        self.inhale.reset();
        cx.pulse(hand, IGNITE_PULSE);
        info!(hand = hand.as_str(), item = identity.as_str(), "ignited");
        Ok(())
    }

    /// Ignited item reached its consumption limit.
    fn deplete(
        &mut self,
        state: &mut InteractionState,
        cx: &mut Collaborators<'_>,
        hand: Hand,
    ) -> Result<(), TransitionError> {
        let token = state
            .token(hand)
            .cloned()
            .ok_or(TransitionError::NothingEquipped { hand })?;
        let identity = token.identity();
        match token.lifecycle {
            Lifecycle::Container(ContainerStage::Ignited) => {
                let restage = self.prepare_restage(
                    state,
                    cx,
                    hand,
                    Lifecycle::Container(ContainerStage::Unfilled),
                )?;
                self.commit_restage(state, cx, restage);
            }
            Lifecycle::Wrap(WrapStage::Ignited) => {
                // A wrapped item is used up entirely.
                let class = cx.resolve_key(&token.key)?;
                self.unequip_now(cx, class, state.model(hand));
                state.slot_mut(hand).take();
            }
            _ => return Err(TransitionError::SlotMismatch { hand }),
        }
        state.clear_payload(identity);
        self.clear_effect(state, cx);
        info!(hand = hand.as_str(), item = identity.as_str(), "depleted");
        Ok(())
    }

    /// `Filled|Ignited --sustained flip--> Unfilled`.
    fn empty_out(
        &mut self,
        state: &mut InteractionState,
        cx: &mut Collaborators<'_>,
        hand: Hand,
    ) -> Result<(), TransitionError> {
        let restage = self.prepare_restage(
            state,
            cx,
            hand,
            Lifecycle::Container(ContainerStage::Unfilled),
        )?;
        let identity = restage.next.identity();
        self.commit_restage(state, cx, restage);
        state.clear_payload(identity);
        if state.active_effect().map(|c| c.holder) == Some(identity) {
            self.clear_effect(state, cx);
        }
        cx.pulse(hand, EMPTY_PULSE);
        info!(hand = hand.as_str(), container = identity.as_str(), "emptied");
        Ok(())
    }

    /// Move the item in `origin` to the other hand, stage and payload intact.
    fn complete_swap(
        &mut self,
        state: &mut InteractionState,
        cx: &mut Collaborators<'_>,
        origin: Hand,
    ) -> Result<(), TransitionError> {
        let dest = origin.other();
        let token = state
            .token(origin)
            .cloned()
            .ok_or(TransitionError::NothingEquipped { hand: origin })?;
        if !state.slot(dest).is_empty() {
            return Err(TransitionError::SlotMismatch { hand: dest });
        }
        let class = cx.resolve_key(&token.key)?;

        self.glow_off(cx);
        self.unequip_now(cx, class.clone(), state.model(origin));
        self.schedule_equip(cx, class, state.model(dest));
        let identity = token.identity();
        state.slot_mut(origin).take();
        state.slot_mut(dest).replace(token);
        if state.active_effect().map(|c| c.holder) == Some(identity) {
            state.move_active_effect(dest);
            self.inhale.disarm();
        }
        info!(
            from = origin.as_str(),
            to = dest.as_str(),
            item = identity.as_str(),
            "hand swap"
        );
        Ok(())
    }

    /// Grabbing a placed container equips its unfilled form in that hand.
    fn equip_placed(
        &mut self,
        state: &mut InteractionState,
        cx: &mut Collaborators<'_>,
        hand: Hand,
        object: ObjectRef,
        material: Material,
    ) -> Result<(), TransitionError> {
        if !state.slot(hand).is_empty() {
            return Err(TransitionError::SlotMismatch { hand });
        }
        let identity = Identity::Container(material);
        if let Some(other) = state.find(identity) {
            return Err(TransitionError::SlotMismatch { hand: other });
        }
        let kind = ItemKind::Container {
            material,
            stage: ContainerStage::Unfilled,
        };
        let (key, class) = cx.resolve_kind(&kind)?;
        cx.check_valid(object)?;

        cx.world.despawn(object);
        self.schedule_equip(cx, class, state.model(hand));
        state.slot_mut(hand).replace(InteractionToken::container(
            material,
            ContainerStage::Unfilled,
            key,
            cx.catalog.grip_for(&kind),
        ));
        info!(hand = hand.as_str(), container = identity.as_str(), "container picked up");
        Ok(())
    }

    fn finish_crafting(
        &mut self,
        state: &mut InteractionState,
        cx: &mut Collaborators<'_>,
        piece: WorkPiece,
    ) -> Result<(), TransitionError> {
        let hand = piece.hand;
        if !state.slot(hand).is_empty() {
            return Err(TransitionError::SlotMismatch { hand });
        }
        let identity = Identity::Container(piece.material);
        if let Some(other) = state.find(identity) {
            return Err(TransitionError::SlotMismatch { hand: other });
        }
        let kind = ItemKind::Container {
            material: piece.material,
            stage: ContainerStage::Unfilled,
        };
        let (key, class) = cx.resolve_kind(&kind)?;
        cx.check_valid(piece.object)?;

        cx.world.despawn(piece.object);
        state.take_held(hand);
        let model = state.model(hand);
        self.schedule_equip(cx, class, model);
        state.slot_mut(hand).replace(InteractionToken::container(
            piece.material,
            ContainerStage::Unfilled,
            key,
            cx.catalog.grip_for(&kind),
        ));
        cx.world.play_cue(Cue::Crafted, model);
        cx.pulse(hand, CRAFTED_PULSE);
        Ok(())
    }

    // ── Helpers ────────────────────────────────────────────

    /// Validate a stage change of the token in `hand` without touching anything.
    fn prepare_restage(
        &self,
        state: &InteractionState,
        cx: &Collaborators<'_>,
        hand: Hand,
        lifecycle: Lifecycle,
    ) -> Result<Restage, TransitionError> {
        let token = state
            .token(hand)
            .ok_or(TransitionError::NothingEquipped { hand })?;
        let kind = match (lifecycle, token.material) {
            (Lifecycle::Container(stage), Some(material)) => ItemKind::Container { material, stage },
            (Lifecycle::Wrap(stage), None) => ItemKind::Wrapped { stage },
            _ => return Err(TransitionError::SlotMismatch { hand }),
        };
        let (key, new_class) = cx.resolve_kind(&kind)?;
        let old_class = cx.resolve_key(&token.key)?;
        Ok(Restage {
            hand,
            next: token.with_lifecycle(lifecycle, key),
            old_class,
            new_class,
        })
    }

    /// Swap the equipped representation in place.
    fn commit_restage(
        &mut self,
        state: &mut InteractionState,
        cx: &mut Collaborators<'_>,
        restage: Restage,
    ) {
        let model = state.model(restage.hand);
        self.unequip_now(cx, restage.old_class, model);
        self.schedule_equip(cx, restage.new_class, model);
        state.slot_mut(restage.hand).replace(restage.next);
    }

    fn unequip_now(&mut self, cx: &mut Collaborators<'_>, class: ItemClass, hand: ModelHand) {
        cx.world.request_unequip(&class, hand);
        self.expect(ExpectKind::Unequip, hand, class.key, cx.now_ms);
    }

    /// Equip after the settle delay so the preceding unequip/despawn lands first.
    fn schedule_equip(&mut self, cx: &mut Collaborators<'_>, class: ItemClass, hand: ModelHand) {
        self.expect(ExpectKind::Equip, hand, class.key.clone(), cx.now_ms);
        cx.commands.schedule(
            cx.now_ms + self.config.equip_settle_ms,
            DelayedCommand::Equip {
                class,
                hand,
                silent: true,
            },
        );
    }

    fn expect(&mut self, kind: ExpectKind, hand: ModelHand, key: ItemKey, now_ms: f64) {
        self.expected.push(Expectation {
            kind,
            hand,
            key,
            issued_ms: now_ms,
        });
    }

    fn take_expected(&mut self, kind: ExpectKind, hand: ModelHand, key: &ItemKey) -> bool {
        match self
            .expected
            .iter()
            .position(|e| e.kind == kind && e.hand == hand && &e.key == key)
        {
            Some(pos) => {
                self.expected.remove(pos);
                true
            }
            None => false,
        }
    }

    fn clear_effect(&mut self, state: &mut InteractionState, cx: &mut Collaborators<'_>) {
        if state.clear_active_effect().is_some() {
            cx.effects.on_cleared();
        }
        self.inhale.reset();
        self.glow_off(cx);
    }

    fn glow_off(&mut self, cx: &mut Collaborators<'_>) {
        if let Some(model) = self.glowing.take() {
            cx.world.set_glow(model, false);
        }
    }

    /// Generate IPC status s-expression.
    pub fn status_sexp(&self) -> String {
        format!(
            "(:lighting-ms {:.0} :swap-ms {:.0} :swap-origin {} :consumptions {} :glowing {} :near-clip-reduced {} :pending {} :crafting {})",
            self.lighting.elapsed_ms(),
            self.swap.elapsed_ms(),
            self.swap
                .origin()
                .map(|h| format!(":{}", h.as_str()))
                .unwrap_or_else(|| "nil".to_string()),
            self.inhale.count(),
            if self.glowing.is_some() { "t" } else { "nil" },
            if self.near_clip_reduced { "t" } else { "nil" },
            self.expected.len(),
            self.crafting.status_sexp(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::StaticCatalog;
    use crate::events::EventQueue;
    use crate::hand::Handedness;
    use crate::sim::{EffectRecord, RecordingEffects, RecordingFeedback, SimWorld, WorldCall};
    use crate::zones::GateStatus;

    /// Machine plus simulated collaborators, stepped with hand-built reports.
    struct Harness {
        machine: InteractionMachine,
        state: InteractionState,
        world: SimWorld,
        feedback: RecordingFeedback,
        effects: RecordingEffects,
        catalog: StaticCatalog,
        commands: CommandQueue,
        queue: EventQueue,
        now_ms: f64,
    }

    impl Harness {
        fn new() -> Self {
            Self::with_config(InteractionConfig::default())
        }

        fn with_config(config: InteractionConfig) -> Self {
            let queue = EventQueue::new(64);
            let world = SimWorld::new();
            world.connect(queue.sender());
            Self {
                machine: InteractionMachine::new(&config),
                state: InteractionState::new(Handedness::new(config.left_handed)),
                world,
                feedback: RecordingFeedback::default(),
                effects: RecordingEffects::default(),
                catalog: StaticCatalog::with_defaults(),
                commands: CommandQueue::new(),
                queue,
                now_ms: 0.0,
            }
        }

        fn step(&mut self, report: &ZoneReport, dt_ms: f64) {
            self.now_ms += dt_ms;
            let events = self.queue.drain();
            let mut world = self.world.clone();
            let mut feedback = self.feedback.clone();
            let mut effects = self.effects.clone();
            {
                let mut cx = Collaborators {
                    world: &mut world,
                    feedback: &mut feedback,
                    effects: &mut effects,
                    catalog: &self.catalog,
                    commands: &mut self.commands,
                    now_ms: self.now_ms,
                };
                for event in &events {
                    self.machine
                        .handle_event(&mut self.state, &mut cx, event, report);
                }
                self.machine.update(&mut self.state, &mut cx, report, dt_ms);
            }
            self.commands.run_due(self.now_ms, &mut world);
        }

        fn reset(&mut self) {
            let mut world = self.world.clone();
            let mut feedback = self.feedback.clone();
            let mut effects = self.effects.clone();
            let mut cx = Collaborators {
                world: &mut world,
                feedback: &mut feedback,
                effects: &mut effects,
                catalog: &self.catalog,
                commands: &mut self.commands,
                now_ms: self.now_ms,
            };
            self.machine.reset(&mut self.state, &mut cx);
        }

        fn steps(&mut self, n: usize, report: &ZoneReport) {
            for _ in 0..n {
                self.step(report, 100.0);
            }
        }

        /// Let queued notifications and delayed equips settle.
        fn settle(&mut self) {
            self.steps(3, &ZoneReport::default());
        }

        fn stage(&self, hand: Hand) -> Option<Lifecycle> {
            self.state.token(hand).map(|t| t.lifecycle)
        }

        fn unequips(&self) -> usize {
            self.world
                .count_calls(|c| matches!(c, WorldCall::Unequip { .. }))
        }
    }

    fn zones() -> ZoneReport {
        ZoneReport::default()
    }

    fn dwell_done() -> GateStatus {
        GateStatus {
            active: true,
            elapsed_ms: 1500.0,
            satisfied: true,
            crossed: false,
        }
    }

    const WOOD: Identity = Identity::Container(Material::Wood);
    const FILLED: Lifecycle = Lifecycle::Container(ContainerStage::Filled);
    const UNFILLED: Lifecycle = Lifecycle::Container(ContainerStage::Unfilled);
    const IGNITED: Lifecycle = Lifecycle::Container(ContainerStage::Ignited);

    /// Empty wood container in the right hand, herb grabbed in the left.
    fn ready_to_fill() -> (Harness, ObjectRef) {
        let mut h = Harness::new();
        h.world.equip(ModelHand::Right, "pipe-wood-empty");
        let herb = h.world.place("herb-lavender");
        h.world.grab(Hand::Left, herb);
        h.settle();
        (h, herb)
    }

    #[test]
    fn test_fill_restages_and_caches_payload() {
        let (mut h, herb) = ready_to_fill();
        assert_eq!(h.world.object(herb).map(|o| o.scale), Some(0.5));
        let fill = ZoneReport {
            fill: true,
            ..zones()
        };
        h.world.release(Hand::Left);
        h.step(&fill, 100.0);

        assert_eq!(h.stage(Hand::Right), Some(FILLED));
        assert!(!h.world.is_valid(herb));
        assert_eq!(
            h.state.payload(WOOD).map(|p| p.effect.as_str()),
            Some("calm")
        );
        assert_eq!(h.feedback.count(Hand::Right, 0.5), 1);

        h.settle();
        assert_eq!(
            h.world.equipped(ModelHand::Right),
            Some(ItemKey::new("pipe-wood-filled"))
        );
        assert_eq!(h.machine.pending_expectations(), 0);
        // Own equip notifications must not disturb the slot.
        assert_eq!(h.stage(Hand::Right), Some(FILLED));
    }

    #[test]
    fn test_drop_outside_fill_zone_restores_scale() {
        let (mut h, herb) = ready_to_fill();
        h.world.release(Hand::Left);
        h.step(&zones(), 100.0);
        assert_eq!(h.stage(Hand::Right), Some(UNFILLED));
        assert_eq!(h.world.object(herb).map(|o| o.scale), Some(1.0));
    }

    #[test]
    fn test_drop_into_filled_container_is_ignored() {
        let (mut h, _) = ready_to_fill();
        let fill = ZoneReport {
            fill: true,
            ..zones()
        };
        h.world.release(Hand::Left);
        h.step(&fill, 100.0);
        h.settle();
        let unequips = h.unequips();

        let second = h.world.place("mushroom-glow");
        h.world.grab(Hand::Left, second);
        h.step(&fill, 100.0);
        h.world.release(Hand::Left);
        h.step(&fill, 100.0);

        assert!(h.world.is_valid(second));
        assert_eq!(h.unequips(), unequips);
        assert_eq!(
            h.state.payload(WOOD).map(|p| p.effect.as_str()),
            Some("calm")
        );
    }

    #[test]
    fn test_unresolved_identity_aborts_fill() {
        let (mut h, herb) = ready_to_fill();
        h.world.make_unresolvable("pipe-wood-filled");
        let fill = ZoneReport {
            fill: true,
            ..zones()
        };
        h.world.release(Hand::Left);
        h.step(&fill, 100.0);

        assert_eq!(h.stage(Hand::Right), Some(UNFILLED));
        assert!(h.world.is_valid(herb));
        assert!(h.state.payload(WOOD).is_none());
        assert_eq!(h.unequips(), 0);
    }

    #[test]
    fn test_ready_cue_once_per_contact() {
        let (mut h, _) = ready_to_fill();
        let fill = ZoneReport {
            fill: true,
            ..zones()
        };
        h.steps(30, &fill);
        assert_eq!(h.feedback.count(Hand::Right, 0.2), 1);
        h.step(&zones(), 100.0);
        h.steps(11, &fill);
        assert_eq!(h.feedback.count(Hand::Right, 0.2), 2);
    }

    /// Filled wood container in the right hand, igniter in the left.
    fn ready_to_light() -> Harness {
        let mut h = Harness::new();
        h.world.equip(ModelHand::Right, "pipe-wood-filled");
        h.world.equip(ModelHand::Left, "flame-spell");
        h.settle();
        h
    }

    #[test]
    fn test_ignite_after_light_duration() {
        let mut h = ready_to_light();
        let light = ZoneReport {
            container_light: true,
            ..zones()
        };
        h.steps(30, &light);
        assert_eq!(h.stage(Hand::Right), Some(FILLED));
        assert!(h.world.cue_playing(Cue::Burning));
        assert_eq!(h.feedback.count(Hand::Right, 0.08), 30);

        h.step(&light, 100.0);
        assert_eq!(h.stage(Hand::Right), Some(IGNITED));
        assert!(!h.world.cue_playing(Cue::Burning));
        let ctx = h.state.active_effect().unwrap();
        assert_eq!(ctx.holder, WOOD);
        assert_eq!(ctx.hand, Hand::Right);
        // Equipped already filled: nothing known about the payload.
        assert!(ctx.payload.is_none());
        assert!(matches!(
            h.effects.records().last(),
            Some(EffectRecord::Ignited(_))
        ));
    }

    #[test]
    fn test_lighting_break_restarts_timer() {
        let mut h = ready_to_light();
        let light = ZoneReport {
            container_light: true,
            ..zones()
        };
        h.steps(25, &light);
        h.step(&zones(), 100.0);
        assert!(!h.world.cue_playing(Cue::Burning));
        h.steps(25, &light);
        assert_eq!(h.stage(Hand::Right), Some(FILLED));
        h.steps(6, &light);
        assert_eq!(h.stage(Hand::Right), Some(IGNITED));
    }

    #[test]
    fn test_lighting_needs_tool_in_other_hand() {
        let mut h = Harness::new();
        h.world.equip(ModelHand::Right, "pipe-wood-filled");
        h.settle();
        let light = ZoneReport {
            container_light: true,
            ..zones()
        };
        h.steps(40, &light);
        assert_eq!(h.stage(Hand::Right), Some(FILLED));
    }

    /// Lit wood container equipped in the right hand.
    fn lit() -> Harness {
        let mut h = Harness::with_config(InteractionConfig {
            max_consumptions: 2,
            ..Default::default()
        });
        h.world.equip(ModelHand::Right, "pipe-wood-lit");
        h.settle();
        assert!(h.state.active_effect().is_some());
        h
    }

    #[test]
    fn test_flip_empties_after_duration() {
        let mut h = lit();
        let flipped = ZoneReport {
            flipped: [false, true],
            ..zones()
        };
        h.steps(20, &flipped);
        assert_eq!(h.stage(Hand::Right), Some(IGNITED));
        h.step(&flipped, 100.0);
        assert_eq!(h.stage(Hand::Right), Some(UNFILLED));
        assert!(h.state.active_effect().is_none());
        assert_eq!(h.feedback.count(Hand::Right, 0.3), 1);

        // Holding the flip does not re-trigger.
        let unequips = h.unequips();
        h.steps(30, &flipped);
        assert_eq!(h.unequips(), unequips);
        assert!(h.state.invariant_violations().is_empty());
    }

    #[test]
    fn test_inhale_cycles_deplete() {
        let mut h = lit();
        let inhaling = ZoneReport {
            near_face: [false, true],
            face_dwell: [GateStatus::default(), dwell_done()],
            ..zones()
        };
        h.step(&inhaling, 100.0);
        assert!(h.world.glow(ModelHand::Right));
        h.step(&zones(), 100.0);
        assert!(!h.world.glow(ModelHand::Right));
        assert_eq!(h.machine.consumption_count(), 1);
        assert_eq!(h.stage(Hand::Right), Some(IGNITED));

        h.step(&inhaling, 100.0);
        h.step(&zones(), 100.0);
        assert_eq!(h.stage(Hand::Right), Some(UNFILLED));
        assert!(h.state.active_effect().is_none());
        let records = h.effects.records();
        assert!(records.contains(&EffectRecord::Consumed(1)));
        assert!(records.contains(&EffectRecord::Consumed(2)));
        assert_eq!(records.last(), Some(&EffectRecord::Cleared));
    }

    #[test]
    fn test_short_dwell_does_not_count() {
        let mut h = lit();
        let near = ZoneReport {
            near_face: [false, true],
            ..zones()
        };
        h.step(&near, 100.0);
        h.step(&zones(), 100.0);
        assert_eq!(h.machine.consumption_count(), 0);
    }

    #[test]
    fn test_swap_completes_after_duration() {
        let mut h = Harness::new();
        h.world.equip(ModelHand::Left, "pipe-wood-empty");
        h.settle();
        let touching = ZoneReport {
            touching: true,
            ..zones()
        };
        h.steps(20, &touching);
        assert!(h.state.token(Hand::Left).is_some());
        assert_eq!(h.feedback.count(Hand::Left, 0.8), 2);
        assert_eq!(h.feedback.count(Hand::Right, 0.8), 2);

        h.step(&touching, 100.0);
        assert!(h.state.token(Hand::Left).is_none());
        assert_eq!(h.stage(Hand::Right), Some(UNFILLED));
        h.settle();
        assert_eq!(h.world.equipped(ModelHand::Left), None);
        assert_eq!(
            h.world.equipped(ModelHand::Right),
            Some(ItemKey::new("pipe-wood-empty"))
        );
        assert_eq!(h.stage(Hand::Right), Some(UNFILLED));
        assert_eq!(h.unequips(), 1);
    }

    #[test]
    fn test_swap_cancelled_by_break() {
        let mut h = Harness::new();
        h.world.equip(ModelHand::Left, "pipe-wood-empty");
        h.settle();
        let touching = ZoneReport {
            touching: true,
            ..zones()
        };
        h.steps(20, &touching);
        h.step(&zones(), 100.0);
        h.steps(5, &touching);
        assert_eq!(h.stage(Hand::Left), Some(UNFILLED));
        assert_eq!(h.unequips(), 0);
    }

    #[test]
    fn test_swap_blocked_near_face() {
        let mut h = Harness::new();
        h.world.equip(ModelHand::Left, "pipe-wood-empty");
        h.settle();
        let report = ZoneReport {
            touching: true,
            near_face: [true, false],
            ..zones()
        };
        h.steps(40, &report);
        assert_eq!(h.stage(Hand::Left), Some(UNFILLED));
    }

    #[test]
    fn test_same_identity_moves_between_hands() {
        let mut h = Harness::new();
        h.world.equip(ModelHand::Left, "pipe-wood-empty");
        h.settle();
        h.world.equip(ModelHand::Right, "pipe-wood-filled");
        h.settle();
        assert!(h.state.token(Hand::Left).is_none());
        assert_eq!(h.stage(Hand::Right), Some(FILLED));
        assert!(h.state.invariant_violations().is_empty());
    }

    #[test]
    fn test_external_unequip_clears_effect() {
        let mut h = lit();
        h.world.unequip(ModelHand::Right);
        h.settle();
        assert!(h.state.token(Hand::Right).is_none());
        assert!(h.state.active_effect().is_none());
    }

    #[test]
    fn test_wrap_combines_and_lights() {
        let mut h = Harness::new();
        h.world.equip(ModelHand::Right, "flame-spell");
        let paper = h.world.place("rolling-paper");
        let herb = h.world.place("herb-nightshade");
        h.world.grab(Hand::Left, paper);
        h.settle();
        h.world.unequip(ModelHand::Right);
        h.world.grab(Hand::Right, herb);
        h.settle();

        let wrap = ZoneReport {
            wrap: true,
            ..zones()
        };
        h.world.release(Hand::Right);
        h.step(&wrap, 100.0);
        assert!(!h.world.is_valid(paper));
        assert!(!h.world.is_valid(herb));
        assert_eq!(h.stage(Hand::Left), Some(Lifecycle::Wrap(WrapStage::Unlit)));
        assert!(h.state.held(Hand::Left).is_none());
        h.settle();
        assert_eq!(
            h.world.equipped(ModelHand::Left),
            Some(ItemKey::new("rolled-smoke-unlit"))
        );

        h.world.equip(ModelHand::Right, "flame-spell");
        h.settle();
        let light = ZoneReport {
            wrap_light: true,
            ..zones()
        };
        h.steps(31, &light);
        assert_eq!(h.stage(Hand::Left), Some(Lifecycle::Wrap(WrapStage::Ignited)));
        let ctx = h.state.active_effect().unwrap();
        assert_eq!(ctx.holder, Identity::Wrap);
        assert_eq!(
            ctx.payload.as_ref().map(|p| p.effect.as_str()),
            Some("numb")
        );
    }

    #[test]
    fn test_grabbing_placed_container_equips_it() {
        let mut h = Harness::new();
        let placed = h.world.place("pipe-bone-placed");
        h.world.grab(Hand::Right, placed);
        h.step(&zones(), 100.0);
        assert!(!h.world.is_valid(placed));
        assert_eq!(
            h.state.token(Hand::Right).map(|t| t.identity()),
            Some(Identity::Container(Material::Bone))
        );
        h.settle();
        assert_eq!(
            h.world.equipped(ModelHand::Right),
            Some(ItemKey::new("pipe-bone-empty"))
        );
    }

    #[test]
    fn test_grip_reapplied_while_touching() {
        let mut h = Harness::new();
        h.catalog.set_grip(
            ItemKind::Container {
                material: Material::Wood,
                stage: ContainerStage::Unfilled,
            },
            crate::world::GripPose::default(),
        );
        h.world.equip(ModelHand::Right, "pipe-wood-empty");
        let herb = h.world.place("herb-lavender");
        h.world.grab(Hand::Left, herb);
        h.settle();
        let grips = |h: &Harness| {
            h.world
                .count_calls(|c| matches!(c, WorldCall::Grip(ModelHand::Right)))
        };
        assert_eq!(grips(&h), 0);

        let touching = ZoneReport {
            touching: true,
            ..zones()
        };
        h.steps(2, &touching);
        assert_eq!(grips(&h), 2);
    }

    #[test]
    fn test_dropped_block_scale_restored() {
        let mut h = Harness::new();
        let knife = h.world.place("knife");
        let block = h.world.place("block-wood");
        h.world.grab(Hand::Right, knife);
        h.world.grab(Hand::Left, block);
        h.step(&zones(), 100.0);
        h.world.impulse(Hand::Right, 1.2);
        h.step(&zones(), 100.0);
        assert_eq!(h.machine.crafting().hits(), 1);
        assert!(h.world.object(block).map(|o| o.scale).unwrap_or(1.0) < 0.65);

        h.world.release(Hand::Left);
        h.step(&zones(), 100.0);
        assert_eq!(h.world.object(block).map(|o| o.scale), Some(1.0));
        assert_eq!(h.machine.crafting().hits(), 0);
    }

    #[test]
    fn test_reset_mid_fill() {
        let (mut h, _herb) = ready_to_fill();
        let fill = ZoneReport {
            fill: true,
            ..zones()
        };
        h.world.release(Hand::Left);
        h.step(&fill, 100.0);
        assert_eq!(h.stage(Hand::Right), Some(FILLED));
        assert_eq!(h.commands.len(), 1);

        h.reset();
        assert!(h.state.token(Hand::Right).is_none());
        assert!(h.state.payload(WOOD).is_none());
        assert!(h.commands.is_empty());
        // Only the unequip already in flight is still expected.
        assert_eq!(h.machine.pending_expectations(), 1);

        h.settle();
        assert_eq!(h.machine.pending_expectations(), 0);
        assert_eq!(h.world.equipped(ModelHand::Right), None);
        assert!(h.state.token(Hand::Right).is_none());
        assert!(h.state.invariant_violations().is_empty());
    }

    #[test]
    fn test_reset_discards_crafting() {
        let mut h = Harness::new();
        let knife = h.world.place("knife");
        let block = h.world.place("block-wood");
        h.world.grab(Hand::Right, knife);
        h.world.grab(Hand::Left, block);
        h.step(&zones(), 100.0);
        h.world.impulse(Hand::Right, 1.2);
        h.step(&zones(), 100.0);
        assert_eq!(h.machine.crafting().hits(), 1);

        h.reset();
        assert_eq!(h.machine.crafting().hits(), 0);
        assert!(h.machine.crafting().piece().is_none());
        assert!(h.state.held(Hand::Left).is_none());
        assert_eq!(h.world.object(block).map(|o| o.scale), Some(1.0));
    }

    #[test]
    fn test_crafting_produces_container() {
        let mut h = Harness::new();
        let knife = h.world.place("knife");
        let block = h.world.place("block-wood");
        h.world.grab(Hand::Right, knife);
        h.world.grab(Hand::Left, block);
        h.step(&zones(), 100.0);
        assert_eq!(h.world.object(block).map(|o| o.scale), Some(0.65));

        for _ in 0..3 {
            h.world.impulse(Hand::Right, 1.2);
            h.step(&zones(), 1000.0);
        }
        assert!(!h.world.is_valid(block));
        assert_eq!(h.stage(Hand::Left), Some(UNFILLED));
        assert!(h
            .world
            .calls()
            .contains(&WorldCall::PlayCue(Cue::Crafted, ModelHand::Left)));
        assert_eq!(h.machine.crafting().hits(), 0);
    }

    #[test]
    fn test_left_handed_routes_to_mirrored_model_hand() {
        let mut h = Harness::with_config(InteractionConfig {
            left_handed: true,
            ..Default::default()
        });
        // Right controller carries the left model hand.
        h.world.equip(ModelHand::Left, "pipe-wood-empty");
        let herb = h.world.place("herb-lavender");
        h.world.grab(Hand::Left, herb);
        h.settle();
        assert_eq!(h.stage(Hand::Right), Some(UNFILLED));

        let fill = ZoneReport {
            fill: true,
            ..zones()
        };
        h.world.release(Hand::Left);
        h.step(&fill, 100.0);
        h.settle();
        assert_eq!(h.stage(Hand::Right), Some(FILLED));
        assert_eq!(
            h.world.equipped(ModelHand::Left),
            Some(ItemKey::new("pipe-wood-filled"))
        );
    }

    #[test]
    fn test_reset_transient_stops_cue() {
        let mut h = ready_to_light();
        let light = ZoneReport {
            container_light: true,
            ..zones()
        };
        h.steps(10, &light);
        assert!(h.world.cue_playing(Cue::Burning));
        let mut world = h.world.clone();
        h.machine.reset_transient(&mut world);
        assert!(!h.world.cue_playing(Cue::Burning));
        h.steps(29, &light);
        assert_eq!(h.stage(Hand::Right), Some(FILLED));
    }

    #[test]
    fn test_status_sexp_parses() {
        let h = ready_to_light();
        assert!(lexpr::from_str(&h.machine.status_sexp()).is_ok());
    }
}
