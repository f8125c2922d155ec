//! In-process simulated world, tracking, and recorders.
//!
//! Stands in for the game engine and the motion-tracking layer so the
//! engine can be driven end to end without a headset: `SimWorld` keeps
//! equip slots and placed objects and answers equip requests with the
//! same notifications the real world would send, `SimPoses` is a
//! scriptable pose source, and the recorders capture feedback and effect
//! calls for inspection.
//!
//! Every handle is a cheap clone over shared state, so a test can keep
//! one copy while the engine owns another.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::catalog::StaticCatalog;
use crate::config::{ConfigSource, InteractionConfig, StaticConfig};
use crate::engine::{Engine, EngineParts};
use crate::events::{EventSender, InputEvent};
use crate::hand::{Hand, ModelHand};
use crate::math::{Quat, Vec3};
use crate::state::ActiveEffectContext;
use crate::tracking::{PoseSource, RawPose};
use crate::world::{
    Cue, EffectApplier, FeedbackSink, GripPose, ItemClass, ItemKey, ObjectRef, World,
};

// ── SimWorld ───────────────────────────────────────────────

/// A call the core made into the world.
#[derive(Debug, Clone, PartialEq)]
pub enum WorldCall {
    Equip {
        key: ItemKey,
        hand: ModelHand,
        silent: bool,
    },
    Unequip {
        key: ItemKey,
        hand: ModelHand,
    },
    Spawn {
        key: ItemKey,
        object: ObjectRef,
    },
    Despawn(ObjectRef),
    SetScale(ObjectRef, f32),
    Glow(ModelHand, bool),
    NearClip(bool),
    PlayCue(Cue, ModelHand),
    StopCue(Cue),
    Grip(ModelHand),
}

/// A placed object.
#[derive(Debug, Clone, PartialEq)]
pub struct SimObject {
    pub key: ItemKey,
    pub scale: f32,
}

#[derive(Debug, Default)]
struct SimWorldInner {
    equipped: [Option<ItemKey>; 2],
    grabbed: [Option<ObjectRef>; 2],
    objects: BTreeMap<ObjectRef, SimObject>,
    next_object: u64,
    unresolvable: HashSet<ItemKey>,
    calls: Vec<WorldCall>,
    glow: [bool; 2],
    near_clip_reduced: bool,
    cues: HashSet<Cue>,
    events: Option<EventSender>,
}

impl SimWorldInner {
    fn notify(&self, event: InputEvent) {
        if let Some(tx) = &self.events {
            tx.push(event);
        }
    }

    fn equip(&mut self, key: ItemKey, hand: ModelHand) {
        let i = hand.index();
        if self.equipped[i].as_ref() == Some(&key) {
            return;
        }
        if let Some(old) = self.equipped[i].take() {
            self.notify(InputEvent::Unequipped { hand, key: old });
        }
        self.equipped[i] = Some(key.clone());
        self.notify(InputEvent::Equipped { hand, key });
    }

    fn unequip(&mut self, key: &ItemKey, hand: ModelHand) -> bool {
        let i = hand.index();
        if self.equipped[i].as_ref() != Some(key) {
            return false;
        }
        self.equipped[i] = None;
        self.notify(InputEvent::Unequipped {
            hand,
            key: key.clone(),
        });
        true
    }

    fn place(&mut self, key: ItemKey) -> ObjectRef {
        self.next_object += 1;
        let object = ObjectRef(self.next_object);
        self.objects.insert(object, SimObject { key, scale: 1.0 });
        object
    }
}

/// Simulated game world.
#[derive(Debug, Clone, Default)]
pub struct SimWorld {
    inner: Arc<Mutex<SimWorldInner>>,
}

impl SimWorld {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route world notifications into an engine's input queue.
    pub fn connect(&self, events: EventSender) {
        self.inner.lock().events = Some(events);
    }

    /// Make `key` fail to resolve, as if its content were not loaded.
    pub fn make_unresolvable(&self, key: impl Into<ItemKey>) {
        self.inner.lock().unresolvable.insert(key.into());
    }

    // Player actions

    /// Put a loose object into the world.
    pub fn place(&self, key: impl Into<ItemKey>) -> ObjectRef {
        self.inner.lock().place(key.into())
    }

    /// The player grasps `object` with `hand`.
    pub fn grab(&self, hand: Hand, object: ObjectRef) -> bool {
        let mut inner = self.inner.lock();
        let Some(key) = inner.objects.get(&object).map(|o| o.key.clone()) else {
            return false;
        };
        inner.grabbed[hand.index()] = Some(object);
        inner.notify(InputEvent::Grabbed { hand, object, key });
        true
    }

    /// The player opens `hand`.
    pub fn release(&self, hand: Hand) -> Option<ObjectRef> {
        let mut inner = self.inner.lock();
        let object = inner.grabbed[hand.index()].take()?;
        if let Some(key) = inner.objects.get(&object).map(|o| o.key.clone()) {
            inner.notify(InputEvent::Dropped { hand, object, key });
        }
        Some(object)
    }

    /// The player equips an item from the inventory.
    pub fn equip(&self, hand: ModelHand, key: impl Into<ItemKey>) {
        self.inner.lock().equip(key.into(), hand);
    }

    /// The player puts away whatever `hand` holds.
    pub fn unequip(&self, hand: ModelHand) {
        let mut inner = self.inner.lock();
        if let Some(key) = inner.equipped[hand.index()].clone() {
            inner.unequip(&key, hand);
        }
    }

    /// Physics reports a contact for whatever `hand` holds.
    pub fn impulse(&self, hand: Hand, relative_velocity: f32) {
        self.inner.lock().notify(InputEvent::ContactImpulse {
            hand,
            mass: 1.0,
            relative_velocity,
        });
    }

    pub fn open_menu(&self) {
        self.inner.lock().notify(InputEvent::MenuOpened);
    }

    pub fn close_menu(&self) {
        self.inner.lock().notify(InputEvent::MenuClosed);
    }

    /// Death or save load: the host tells the core to start over.
    pub fn player_died(&self) {
        self.inner.lock().notify(InputEvent::Reset);
    }

    // Inspection

    pub fn calls(&self) -> Vec<WorldCall> {
        self.inner.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.inner.lock().calls.clear();
    }

    pub fn count_calls(&self, pred: impl Fn(&WorldCall) -> bool) -> usize {
        self.inner.lock().calls.iter().filter(|c| pred(*c)).count()
    }

    pub fn equipped(&self, hand: ModelHand) -> Option<ItemKey> {
        self.inner.lock().equipped[hand.index()].clone()
    }

    pub fn object(&self, object: ObjectRef) -> Option<SimObject> {
        self.inner.lock().objects.get(&object).cloned()
    }

    pub fn glow(&self, hand: ModelHand) -> bool {
        self.inner.lock().glow[hand.index()]
    }

    pub fn near_clip_reduced(&self) -> bool {
        self.inner.lock().near_clip_reduced
    }

    pub fn cue_playing(&self, cue: Cue) -> bool {
        self.inner.lock().cues.contains(&cue)
    }

    fn record(&self, call: WorldCall) {
        trace!(?call, "world call");
        self.inner.lock().calls.push(call);
    }
}

/// Stable fake engine handle for a key.
fn class_handle(key: &ItemKey) -> u32 {
    key.as_str()
        .bytes()
        .fold(0x811c_9dc5u32, |h, b| (h ^ u32::from(b)).wrapping_mul(0x0100_0193))
}

impl World for SimWorld {
    fn resolve(&self, key: &ItemKey) -> Option<ItemClass> {
        if self.inner.lock().unresolvable.contains(key) {
            return None;
        }
        Some(ItemClass {
            key: key.clone(),
            handle: class_handle(key),
        })
    }

    fn request_equip(&mut self, class: &ItemClass, hand: ModelHand, silent: bool) {
        self.record(WorldCall::Equip {
            key: class.key.clone(),
            hand,
            silent,
        });
        self.inner.lock().equip(class.key.clone(), hand);
    }

    fn request_unequip(&mut self, class: &ItemClass, hand: ModelHand) {
        self.record(WorldCall::Unequip {
            key: class.key.clone(),
            hand,
        });
        if !self.inner.lock().unequip(&class.key, hand) {
            debug!(key = %class.key, hand = hand.as_str(), "unequip of item not equipped");
        }
    }

    fn spawn(&mut self, class: &ItemClass, _silent: bool) -> Option<ObjectRef> {
        let object = self.inner.lock().place(class.key.clone());
        self.record(WorldCall::Spawn {
            key: class.key.clone(),
            object,
        });
        Some(object)
    }

    fn despawn(&mut self, object: ObjectRef) {
        self.record(WorldCall::Despawn(object));
        let mut inner = self.inner.lock();
        inner.objects.remove(&object);
        for slot in &mut inner.grabbed {
            if *slot == Some(object) {
                *slot = None;
            }
        }
    }

    fn is_valid(&self, object: ObjectRef) -> bool {
        self.inner.lock().objects.contains_key(&object)
    }

    fn set_scale(&mut self, object: ObjectRef, scale: f32) {
        self.record(WorldCall::SetScale(object, scale));
        if let Some(o) = self.inner.lock().objects.get_mut(&object) {
            o.scale = scale;
        }
    }

    fn equipped_in(&self, hand: ModelHand) -> Option<ItemKey> {
        self.equipped(hand)
    }

    fn grabbed_in(&self, hand: Hand) -> Option<ObjectRef> {
        self.inner.lock().grabbed[hand.index()]
    }

    fn set_glow(&mut self, hand: ModelHand, on: bool) {
        self.record(WorldCall::Glow(hand, on));
        self.inner.lock().glow[hand.index()] = on;
    }

    fn set_near_clip(&mut self, reduced: bool) {
        self.record(WorldCall::NearClip(reduced));
        self.inner.lock().near_clip_reduced = reduced;
    }

    fn play_cue(&mut self, cue: Cue, hand: ModelHand) {
        self.record(WorldCall::PlayCue(cue, hand));
        // Only the burning cue loops.
        if cue == Cue::Burning {
            self.inner.lock().cues.insert(cue);
        }
    }

    fn stop_cue(&mut self, cue: Cue) {
        self.record(WorldCall::StopCue(cue));
        self.inner.lock().cues.remove(&cue);
    }

    fn apply_grip(&mut self, hand: ModelHand, _grip: &GripPose) {
        self.record(WorldCall::Grip(hand));
    }
}

// ── SimPoses ───────────────────────────────────────────────

/// Where the simulated head sits.
pub const HEAD_POSITION: Vec3 = Vec3::new(0.0, 0.0, 120.0);

#[derive(Debug)]
struct PoseState {
    head: Option<RawPose>,
    hands: [Option<RawPose>; 2],
}

/// Scriptable pose source. Starts with both hands at rest, well apart and
/// away from the face.
#[derive(Debug, Clone)]
pub struct SimPoses {
    inner: Arc<Mutex<PoseState>>,
}

impl Default for SimPoses {
    fn default() -> Self {
        let poses = Self {
            inner: Arc::new(Mutex::new(PoseState {
                head: Some(RawPose::new(HEAD_POSITION, Quat::IDENTITY)),
                hands: [None, None],
            })),
        };
        poses.rest(Hand::Left);
        poses.rest(Hand::Right);
        poses
    }
}

impl SimPoses {
    pub fn new() -> Self {
        Self::default()
    }

    fn hand_pose(&self, hand: Hand) -> RawPose {
        self.inner.lock().hands[hand.index()].unwrap_or_default()
    }

    pub fn set_hand(&self, hand: Hand, position: Vec3) {
        let orientation = self.hand_pose(hand).orientation;
        self.inner.lock().hands[hand.index()] = Some(RawPose::new(position, orientation));
    }

    pub fn set_head(&self, position: Vec3, orientation: Quat) {
        self.inner.lock().head = Some(RawPose::new(position, orientation));
    }

    /// Stop reporting a hand, as when tracking is lost.
    pub fn lose(&self, hand: Hand) {
        self.inner.lock().hands[hand.index()] = None;
    }

    /// Hand down at the side.
    pub fn rest(&self, hand: Hand) {
        let x = match hand {
            Hand::Left => -30.0,
            Hand::Right => 30.0,
        };
        self.set_hand(hand, Vec3::new(x, 20.0, 80.0));
    }

    /// Hand at the face target for the current head pose.
    pub fn to_face(&self, hand: Hand, config: &InteractionConfig) {
        let target = {
            let inner = self.inner.lock();
            inner
                .head
                .map(|h| h.position + h.orientation.rotate(config.face_offset))
                .unwrap_or(HEAD_POSITION)
        };
        self.set_hand(hand, target);
    }

    /// Both hands in front of the chest, `distance` apart.
    pub fn hands_apart(&self, distance: f32) {
        self.set_hand(Hand::Left, Vec3::new(-distance / 2.0, 30.0, 90.0));
        self.set_hand(Hand::Right, Vec3::new(distance / 2.0, 30.0, 90.0));
    }

    /// Turn a controller upside down, or back upright.
    pub fn flip(&self, hand: Hand, flipped: bool) {
        let orientation = if flipped {
            Quat::from_axis_angle(Vec3::new(1.0, 0.0, 0.0), std::f32::consts::PI)
        } else {
            Quat::IDENTITY
        };
        let position = self.hand_pose(hand).position;
        self.inner.lock().hands[hand.index()] = Some(RawPose::new(position, orientation));
    }
}

impl PoseSource for SimPoses {
    fn head(&self) -> Option<RawPose> {
        self.inner.lock().head
    }

    fn hand(&self, hand: Hand) -> Option<RawPose> {
        self.inner.lock().hands[hand.index()]
    }
}

// ── Recorders ──────────────────────────────────────────────

/// One haptic request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pulse {
    pub hand: Hand,
    pub intensity: f32,
    pub duration_s: f32,
}

/// Feedback sink that remembers every request.
#[derive(Debug, Clone, Default)]
pub struct RecordingFeedback {
    pulses: Arc<Mutex<Vec<Pulse>>>,
}

impl RecordingFeedback {
    pub fn pulses(&self) -> Vec<Pulse> {
        self.pulses.lock().clone()
    }

    /// Requests on `hand` at exactly `intensity`.
    pub fn count(&self, hand: Hand, intensity: f32) -> usize {
        self.pulses
            .lock()
            .iter()
            .filter(|p| p.hand == hand && (p.intensity - intensity).abs() < 1e-6)
            .count()
    }

    pub fn clear(&self) {
        self.pulses.lock().clear();
    }
}

impl FeedbackSink for RecordingFeedback {
    fn emit_pulse(&mut self, hand: Hand, intensity: f32, duration_s: f32) {
        self.pulses.lock().push(Pulse {
            hand,
            intensity,
            duration_s,
        });
    }
}

/// Effect applier call.
#[derive(Debug, Clone, PartialEq)]
pub enum EffectRecord {
    Ignited(ActiveEffectContext),
    Consumed(u32),
    Cleared,
}

/// Effect applier that remembers every call.
#[derive(Debug, Clone, Default)]
pub struct RecordingEffects {
    records: Arc<Mutex<Vec<EffectRecord>>>,
}

impl RecordingEffects {
    pub fn records(&self) -> Vec<EffectRecord> {
        self.records.lock().clone()
    }

    pub fn consumed(&self) -> usize {
        self.records
            .lock()
            .iter()
            .filter(|r| matches!(r, EffectRecord::Consumed(_)))
            .count()
    }
}

impl EffectApplier for RecordingEffects {
    fn on_ignited(&mut self, context: &ActiveEffectContext) {
        self.records.lock().push(EffectRecord::Ignited(context.clone()));
    }

    fn on_consumed(&mut self, _context: &ActiveEffectContext, count: u32) {
        self.records.lock().push(EffectRecord::Consumed(count));
    }

    fn on_cleared(&mut self) {
        self.records.lock().push(EffectRecord::Cleared);
    }
}

// ── Rig ────────────────────────────────────────────────────

/// An engine wired to simulated collaborators, with handles kept for
/// driving and inspecting it.
pub struct Rig {
    pub engine: Engine,
    pub world: SimWorld,
    pub poses: SimPoses,
    pub feedback: RecordingFeedback,
    pub effects: RecordingEffects,
}

impl Rig {
    pub fn new(config: InteractionConfig) -> Self {
        Self::with_source(Box::new(StaticConfig(config)))
    }

    pub fn with_source(source: Box<dyn ConfigSource>) -> Self {
        Self::with_feedback(source, None)
    }

    /// Rig whose feedback goes to `sink` instead of the recorder.
    pub fn with_feedback(
        source: Box<dyn ConfigSource>,
        sink: Option<Box<dyn FeedbackSink>>,
    ) -> Self {
        let world = SimWorld::new();
        let poses = SimPoses::new();
        let feedback = RecordingFeedback::default();
        let effects = RecordingEffects::default();
        let sink: Box<dyn FeedbackSink> = match sink {
            Some(sink) => sink,
            None => Box::new(feedback.clone()),
        };
        let engine = Engine::new(EngineParts {
            config_source: source,
            poses: Box::new(poses.clone()),
            world: Box::new(world.clone()),
            feedback: sink,
            effects: Box::new(effects.clone()),
            catalog: Box::new(StaticCatalog::with_defaults()),
        });
        world.connect(engine.sender());
        Self {
            engine,
            world,
            poses,
            feedback,
            effects,
        }
    }

    pub fn config(&self) -> &InteractionConfig {
        self.engine.config()
    }

    pub fn tick(&mut self, dt_ms: f64) {
        self.engine.tick(dt_ms);
    }

    /// Tick at `dt_ms` until at least `duration_ms` has passed.
    pub fn run(&mut self, duration_ms: f64, dt_ms: f64) {
        let mut elapsed = 0.0;
        while elapsed < duration_ms {
            self.engine.tick(dt_ms);
            elapsed += dt_ms;
        }
    }

    /// The model hand a controller's equips land in.
    pub fn model(&self, hand: Hand) -> ModelHand {
        self.engine.state().model(hand)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventQueue;

    #[test]
    fn test_equip_over_existing_notifies_unequip_first() {
        let q = EventQueue::new(8);
        let world = SimWorld::new();
        world.connect(q.sender());
        world.equip(ModelHand::Left, "pipe-wood-empty");
        world.equip(ModelHand::Left, "flame-spell");
        let events = q.drain();
        assert_eq!(
            events,
            vec![
                InputEvent::Equipped {
                    hand: ModelHand::Left,
                    key: ItemKey::new("pipe-wood-empty")
                },
                InputEvent::Unequipped {
                    hand: ModelHand::Left,
                    key: ItemKey::new("pipe-wood-empty")
                },
                InputEvent::Equipped {
                    hand: ModelHand::Left,
                    key: ItemKey::new("flame-spell")
                },
            ]
        );
    }

    #[test]
    fn test_despawn_invalidates_and_releases() {
        let mut world = SimWorld::new();
        let herb = world.place("herb-lavender");
        assert!(world.grab(Hand::Right, herb));
        assert_eq!(world.grabbed_in(Hand::Right), Some(herb));
        world.despawn(herb);
        assert!(!world.is_valid(herb));
        assert_eq!(world.grabbed_in(Hand::Right), None);
        assert!(!world.grab(Hand::Right, herb));
    }

    #[test]
    fn test_unresolvable_key() {
        let world = SimWorld::new();
        world.make_unresolvable("pipe-bone-lit");
        assert!(world.resolve(&ItemKey::new("pipe-bone-lit")).is_none());
        let a = world.resolve(&ItemKey::new("pipe-bone-filled")).unwrap();
        let b = world.resolve(&ItemKey::new("pipe-bone-filled")).unwrap();
        assert_eq!(a.handle, b.handle);
    }

    #[test]
    fn test_poses_flip_and_face() {
        let config = InteractionConfig::default();
        let poses = SimPoses::new();
        poses.to_face(Hand::Left, &config);
        poses.flip(Hand::Left, true);
        let raw = poses.hand(Hand::Left).unwrap();
        assert!(raw.orientation.up().z < -0.9);
        assert!((raw.position.y - 10.0).abs() < 1e-4);
        poses.lose(Hand::Right);
        assert!(poses.hand(Hand::Right).is_none());
    }
}
