//! Spatial sampling of the head and both controllers.
//!
//! The sampler reads one pose per tracked point per tick and keeps the
//! last good value when a point drops out, so downstream geometry never
//! sees a gap. Hand orientation is reduced to its up vector.

use tracing::{debug, trace};

use crate::hand::Hand;
use crate::math::{Quat, Vec3};

// ── Raw input ──────────────────────────────────────────────

/// Pose as delivered by the tracking layer.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RawPose {
    pub position: Vec3,
    pub orientation: Quat,
}

impl RawPose {
    pub fn new(position: Vec3, orientation: Quat) -> Self {
        Self {
            position,
            orientation,
        }
    }

    fn is_finite(&self) -> bool {
        let q = self.orientation;
        self.position.is_finite()
            && q.x.is_finite()
            && q.y.is_finite()
            && q.z.is_finite()
            && q.w.is_finite()
    }
}

/// Source of head and controller poses. Any point may be unavailable.
pub trait PoseSource: Send {
    fn head(&self) -> Option<RawPose>;
    fn hand(&self, hand: Hand) -> Option<RawPose>;
}

// ── Sampled poses ──────────────────────────────────────────

/// Reduced pose of one controller.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackedPose {
    /// World position.
    pub position: Vec3,
    /// World direction of the controller's local up axis.
    pub up: Vec3,
    /// False when this value was carried over from an earlier tick.
    pub fresh: bool,
}

impl Default for TrackedPose {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            up: Vec3::UP,
            fresh: false,
        }
    }
}

/// Head pose. The full orientation is kept for the face offset.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct HeadPose {
    pub position: Vec3,
    pub orientation: Quat,
    pub fresh: bool,
}

/// One tick's worth of poses.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PoseSample {
    pub head: HeadPose,
    pub left: TrackedPose,
    pub right: TrackedPose,
}

impl PoseSample {
    pub fn hand(&self, hand: Hand) -> &TrackedPose {
        match hand {
            Hand::Left => &self.left,
            Hand::Right => &self.right,
        }
    }

    fn hand_mut(&mut self, hand: Hand) -> &mut TrackedPose {
        match hand {
            Hand::Left => &mut self.left,
            Hand::Right => &mut self.right,
        }
    }
}

// ── SpatialSampler ─────────────────────────────────────────

/// Reads poses and holds last-known values.
#[derive(Debug, Default)]
pub struct SpatialSampler {
    last: PoseSample,
    /// Consecutive ticks each point has been unavailable (head, left, right).
    missing_ticks: [u32; 3],
}

impl SpatialSampler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sample all three points. Never fails and never blocks.
    pub fn sample(&mut self, source: &dyn PoseSource) -> PoseSample {
        match source.head().filter(RawPose::is_finite) {
            Some(raw) => {
                self.last.head = HeadPose {
                    position: raw.position,
                    orientation: raw.orientation.normalize(),
                    fresh: true,
                };
                self.missing_ticks[0] = 0;
            }
            None => {
                self.last.head.fresh = false;
                self.note_missing(0, "head");
            }
        }

        for hand in Hand::BOTH {
            let slot = 1 + hand.index();
            match source.hand(hand).filter(RawPose::is_finite) {
                Some(raw) => {
                    *self.last.hand_mut(hand) = TrackedPose {
                        position: raw.position,
                        up: raw.orientation.normalize().up(),
                        fresh: true,
                    };
                    self.missing_ticks[slot] = 0;
                }
                None => {
                    self.last.hand_mut(hand).fresh = false;
                    self.note_missing(slot, hand.as_str());
                }
            }
        }

        trace!(
            head = ?self.last.head.position,
            left = ?self.last.left.position,
            right = ?self.last.right.position,
            "sampled poses"
        );
        self.last
    }

    /// Most recent sample without reading the source.
    pub fn last(&self) -> &PoseSample {
        &self.last
    }

    fn note_missing(&mut self, slot: usize, name: &str) {
        self.missing_ticks[slot] += 1;
        if self.missing_ticks[slot] == 1 {
            debug!("Tracking lost for {}, holding last pose", name);
        }
    }
}
