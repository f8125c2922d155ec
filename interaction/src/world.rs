//! Collaborator interfaces the interaction core drives.
//!
//! The core never touches engine objects directly. It names item classes by
//! `ItemKey`, resolves them to live `ItemClass` handles, and refers to
//! placed objects through `ObjectRef`. Every call here is allowed to fail
//! or return nothing; callers check before mutating their own state.

use std::fmt;

use crate::hand::{Hand, ModelHand};
use crate::math::{Quat, Vec3};
use crate::state::ActiveEffectContext;

// ── Identifiers ────────────────────────────────────────────

/// Stable identifier of an item class (e.g. `"pipe-wood-filled"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemKey(pub String);

impl ItemKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ItemKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ItemKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A resolved, currently loaded item class.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ItemClass {
    pub key: ItemKey,
    /// Engine-side handle.
    pub handle: u32,
}

impl fmt::Display for ItemClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{:08x}", self.key, self.handle)
    }
}

/// Reference to a placed world object. May go stale at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectRef(pub u64);

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Hand-local placement override applied to an equipped item.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GripPose {
    pub offset: Vec3,
    pub rotation: Quat,
}

// ── Cues ───────────────────────────────────────────────────

/// Audio/visual cues the core asks the world to play.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cue {
    /// Looping burn sound while a lighting gesture is held.
    Burning,
    /// One-shot exhale after a consumption event.
    Exhale,
    /// One-shot when crafting completes.
    Crafted,
}

impl Cue {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Burning => "burning",
            Self::Exhale => "exhale",
            Self::Crafted => "crafted",
        }
    }
}

// ── World ──────────────────────────────────────────────────

/// The game world: identity resolution, equip commands, object lifecycle,
/// and presentation hooks.
///
/// Equip and unequip requests are fire-and-forget. Their effect shows up
/// later as `Equipped`/`Unequipped` input events.
pub trait World: Send {
    /// Resolve a class identifier to a live class, or `None` if unloaded.
    fn resolve(&self, key: &ItemKey) -> Option<ItemClass>;

    fn request_equip(&mut self, class: &ItemClass, hand: ModelHand, silent: bool);
    fn request_unequip(&mut self, class: &ItemClass, hand: ModelHand);

    fn spawn(&mut self, class: &ItemClass, silent: bool) -> Option<ObjectRef>;
    fn despawn(&mut self, object: ObjectRef);
    fn is_valid(&self, object: ObjectRef) -> bool;
    fn set_scale(&mut self, object: ObjectRef, scale: f32);

    /// Class currently equipped in a model hand, as the world sees it.
    fn equipped_in(&self, hand: ModelHand) -> Option<ItemKey>;
    /// Object currently grasped by a controller, as the world sees it.
    fn grabbed_in(&self, hand: Hand) -> Option<ObjectRef>;

    fn set_glow(&mut self, hand: ModelHand, on: bool);
    fn set_near_clip(&mut self, reduced: bool);
    fn play_cue(&mut self, cue: Cue, hand: ModelHand);
    fn stop_cue(&mut self, cue: Cue);
    fn apply_grip(&mut self, hand: ModelHand, grip: &GripPose);
}

// ── Feedback ───────────────────────────────────────────────

/// Best-effort haptic output. Requests may be dropped.
pub trait FeedbackSink: Send {
    /// Constant-intensity pulse lasting `duration_s` seconds.
    fn emit_pulse(&mut self, hand: Hand, intensity: f32, duration_s: f32);

    /// Linear ramp from `start` to `end` over `duration_s` seconds.
    fn emit_ramp(&mut self, hand: Hand, start: f32, end: f32, duration_s: f32) {
        self.emit_pulse(hand, start.max(end), duration_s);
    }
}

// ── Effects ────────────────────────────────────────────────

/// Receives the active effect payload as it is ignited and consumed.
pub trait EffectApplier: Send {
    fn on_ignited(&mut self, context: &ActiveEffectContext);
    /// One consumption event; `count` is 1-based.
    fn on_consumed(&mut self, context: &ActiveEffectContext, count: u32);
    fn on_cleared(&mut self);
}

/// Applier that ignores everything.
#[derive(Debug, Default)]
pub struct NoEffects;

impl EffectApplier for NoEffects {
    fn on_ignited(&mut self, _context: &ActiveEffectContext) {}
    fn on_consumed(&mut self, _context: &ActiveEffectContext, _count: u32) {}
    fn on_cleared(&mut self) {}
}
