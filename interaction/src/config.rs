//! Interaction thresholds and their s-expression loader.
//!
//! Configuration is a flat plist, e.g.
//! `(:face-radius 15.0 :fill-radius 8.0 :left-handed t)`. Keys that are
//! absent keep their defaults; unknown keys are ignored. The engine
//! re-reads its `ConfigSource` at startup and whenever a menu closes.

use std::path::{Path, PathBuf};

use lexpr::Value;
use tracing::{debug, info};

use crate::error::ConfigError;
use crate::math::Vec3;

// ── InteractionConfig ──────────────────────────────────────

/// Every tunable radius, duration and count used by the core.
#[derive(Debug, Clone, PartialEq)]
pub struct InteractionConfig {
    /// Ambidexterity inversion (left controller drives the right model hand).
    pub left_handed: bool,
    /// Head-local offset of the face target (x right, y forward, z up).
    pub face_offset: Vec3,
    /// Face zone radius (world units).
    pub face_radius: f32,
    /// Generic hands-touching radius (hand swap, grip re-apply).
    pub touch_radius: f32,
    /// Hand distance that counts as "over the container" when filling.
    pub fill_radius: f32,
    /// Hand distance for combining a consumable with wrapping material.
    pub wrap_radius: f32,
    /// Hand distance for lighting a container.
    pub container_light_radius: f32,
    /// Hand distance for lighting a wrapped item (larger geometry).
    pub wrap_light_radius: f32,
    /// Extra distance beyond a radius before a zone reports exit.
    pub zone_hysteresis: f32,
    /// Sustained touch before the ready-to-fill cue (ms).
    pub touch_duration_ms: f64,
    /// `up.z` below this counts as flipped.
    pub flip_threshold: f32,
    /// Sustained flip before an empty-out (ms).
    pub flip_duration_ms: f64,
    /// Sustained tool-effect contact before ignition (ms).
    pub light_duration_ms: f64,
    /// Delay before the burning cue starts while lighting (ms).
    pub light_cue_delay_ms: f64,
    /// Sustained contact before a hand swap (ms).
    pub swap_duration_ms: f64,
    /// Interval between intermediate swap pulses (ms).
    pub swap_pulse_interval_ms: f64,
    /// Near-face dwell that makes one consumption event (ms).
    pub inhale_duration_ms: f64,
    /// Consumption events before an ignited item is depleted.
    pub max_consumptions: u32,
    /// Delay before the camera near clip is restored after leaving the face (ms).
    pub near_clip_restore_ms: f64,
    /// Scale applied to a grabbed consumable while a container is equipped.
    pub consumable_grab_scale: f32,
    /// Counted impulses needed to finish crafting.
    pub crafting_hits: u32,
    /// Minimum relative velocity for an impulse to count.
    pub crafting_min_velocity: f32,
    /// Cooldown between counted impulses (ms).
    pub crafting_cooldown_ms: f64,
    /// Scale applied to crafting material when grabbed.
    pub crafting_item_scale: f32,
    /// Per-impulse scale multiplier for crafting material.
    pub crafting_shrink: f32,
    /// Delay between an unequip and the equip that follows it (ms).
    pub equip_settle_ms: f64,
    /// Feedback worker period (ms).
    pub haptic_period_ms: u64,
    /// Maximum queued feedback events per hand.
    pub haptic_queue_capacity: usize,
    /// Bounded input event queue size.
    pub event_queue_capacity: usize,
}

impl Default for InteractionConfig {
    fn default() -> Self {
        Self {
            left_handed: false,
            face_offset: Vec3::new(0.0, 10.0, -5.0),
            face_radius: 15.0,
            touch_radius: 10.0,
            fill_radius: 10.0,
            wrap_radius: 10.0,
            container_light_radius: 10.0,
            wrap_light_radius: 15.0,
            zone_hysteresis: 0.5,
            touch_duration_ms: 1000.0,
            flip_threshold: -0.5,
            flip_duration_ms: 2000.0,
            light_duration_ms: 3000.0,
            light_cue_delay_ms: 600.0,
            swap_duration_ms: 2000.0,
            swap_pulse_interval_ms: 1000.0,
            inhale_duration_ms: 1500.0,
            max_consumptions: 25,
            near_clip_restore_ms: 2000.0,
            consumable_grab_scale: 0.5,
            crafting_hits: 3,
            crafting_min_velocity: 0.5,
            crafting_cooldown_ms: 1000.0,
            crafting_item_scale: 0.65,
            crafting_shrink: 0.8,
            equip_settle_ms: 20.0,
            haptic_period_ms: 5,
            haptic_queue_capacity: 16,
            event_queue_capacity: 64,
        }
    }
}

/// Plist keys understood by `InteractionConfig::apply_plist`.
const KNOWN_KEYS: &[&str] = &[
    "left-handed",
    "face-offset-x",
    "face-offset-y",
    "face-offset-z",
    "face-radius",
    "touch-radius",
    "fill-radius",
    "wrap-radius",
    "container-light-radius",
    "wrap-light-radius",
    "zone-hysteresis",
    "touch-duration-ms",
    "flip-threshold",
    "flip-duration-ms",
    "light-duration-ms",
    "light-cue-delay-ms",
    "swap-duration-ms",
    "swap-pulse-interval-ms",
    "inhale-duration-ms",
    "max-consumptions",
    "near-clip-restore-ms",
    "consumable-grab-scale",
    "crafting-hits",
    "crafting-min-velocity",
    "crafting-cooldown-ms",
    "crafting-item-scale",
    "crafting-shrink",
    "equip-settle-ms",
    "haptic-period-ms",
    "haptic-queue-capacity",
    "event-queue-capacity",
];

impl InteractionConfig {
    /// Parse a plist on top of the defaults.
    pub fn from_sexp(raw: &str) -> Result<Self, ConfigError> {
        let value = lexpr::from_str(raw).map_err(|e| ConfigError::Parse(e.to_string()))?;
        let mut config = Self::default();
        config.apply_plist(&value)?;
        Ok(config)
    }

    /// Overwrite every field present in `value`. On error `self` is unchanged.
    pub fn apply_plist(&mut self, value: &Value) -> Result<(), ConfigError> {
        for key in plist_keys(value) {
            if !KNOWN_KEYS.contains(&key.as_str()) {
                debug!(key = %key, "ignoring unknown config key");
            }
        }

        let mut next = self.clone();

        if let Some(v) = get_bool(value, "left-handed") {
            next.left_handed = v;
        }
        if let Some(v) = get_float(value, "face-offset-x")? {
            next.face_offset.x = v as f32;
        }
        if let Some(v) = get_float(value, "face-offset-y")? {
            next.face_offset.y = v as f32;
        }
        if let Some(v) = get_float(value, "face-offset-z")? {
            next.face_offset.z = v as f32;
        }

        let radii: [(&str, &mut f32); 7] = [
            ("face-radius", &mut next.face_radius),
            ("touch-radius", &mut next.touch_radius),
            ("fill-radius", &mut next.fill_radius),
            ("wrap-radius", &mut next.wrap_radius),
            ("container-light-radius", &mut next.container_light_radius),
            ("wrap-light-radius", &mut next.wrap_light_radius),
            ("zone-hysteresis", &mut next.zone_hysteresis),
        ];
        for (key, slot) in radii {
            if let Some(v) = get_non_negative(value, key)? {
                *slot = v as f32;
            }
        }

        let durations: [(&str, &mut f64); 9] = [
            ("touch-duration-ms", &mut next.touch_duration_ms),
            ("flip-duration-ms", &mut next.flip_duration_ms),
            ("light-duration-ms", &mut next.light_duration_ms),
            ("light-cue-delay-ms", &mut next.light_cue_delay_ms),
            ("swap-duration-ms", &mut next.swap_duration_ms),
            ("swap-pulse-interval-ms", &mut next.swap_pulse_interval_ms),
            ("inhale-duration-ms", &mut next.inhale_duration_ms),
            ("near-clip-restore-ms", &mut next.near_clip_restore_ms),
            ("crafting-cooldown-ms", &mut next.crafting_cooldown_ms),
        ];
        for (key, slot) in durations {
            if let Some(v) = get_non_negative(value, key)? {
                *slot = v;
            }
        }
        if let Some(v) = get_non_negative(value, "equip-settle-ms")? {
            next.equip_settle_ms = v;
        }

        if let Some(v) = get_float(value, "flip-threshold")? {
            if !(-1.0..=1.0).contains(&v) {
                return Err(invalid("flip-threshold", v));
            }
            next.flip_threshold = v as f32;
        }

        let scales: [(&str, &mut f32); 4] = [
            ("consumable-grab-scale", &mut next.consumable_grab_scale),
            ("crafting-min-velocity", &mut next.crafting_min_velocity),
            ("crafting-item-scale", &mut next.crafting_item_scale),
            ("crafting-shrink", &mut next.crafting_shrink),
        ];
        for (key, slot) in scales {
            if let Some(v) = get_non_negative(value, key)? {
                *slot = v as f32;
            }
        }

        if let Some(v) = get_count(value, "max-consumptions")? {
            next.max_consumptions = v;
        }
        if let Some(v) = get_count(value, "crafting-hits")? {
            next.crafting_hits = v;
        }
        if let Some(v) = get_count(value, "haptic-period-ms")? {
            next.haptic_period_ms = v;
        }
        if let Some(v) = get_count(value, "haptic-queue-capacity")? {
            next.haptic_queue_capacity = v;
        }
        if let Some(v) = get_count(value, "event-queue-capacity")? {
            next.event_queue_capacity = v;
        }

        *self = next;
        Ok(())
    }

    /// Generate s-expression for status output.
    pub fn config_sexp(&self) -> String {
        format!(
            "(:left-handed {} :face-offset ({:.1} {:.1} {:.1}) :face-radius {:.1} :touch-radius {:.1} :fill-radius {:.1} :wrap-radius {:.1} :container-light-radius {:.1} :wrap-light-radius {:.1} :flip-threshold {:.2} :flip-duration-ms {:.0} :light-duration-ms {:.0} :swap-duration-ms {:.0} :inhale-duration-ms {:.0} :max-consumptions {} :crafting-hits {})",
            if self.left_handed { "t" } else { "nil" },
            self.face_offset.x,
            self.face_offset.y,
            self.face_offset.z,
            self.face_radius,
            self.touch_radius,
            self.fill_radius,
            self.wrap_radius,
            self.container_light_radius,
            self.wrap_light_radius,
            self.flip_threshold,
            self.flip_duration_ms,
            self.light_duration_ms,
            self.swap_duration_ms,
            self.inhale_duration_ms,
            self.max_consumptions,
            self.crafting_hits,
        )
    }
}

// ── ConfigSource ───────────────────────────────────────────

/// Where configuration comes from. Read at startup and at reload checkpoints.
pub trait ConfigSource {
    fn load(&self) -> Result<InteractionConfig, ConfigError>;
}

/// Fixed in-memory configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticConfig(pub InteractionConfig);

impl ConfigSource for StaticConfig {
    fn load(&self) -> Result<InteractionConfig, ConfigError> {
        Ok(self.0.clone())
    }
}

/// Plist configuration file on disk.
#[derive(Debug, Clone)]
pub struct SexpFileConfig {
    pub path: PathBuf,
}

impl SexpFileConfig {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl ConfigSource for SexpFileConfig {
    fn load(&self) -> Result<InteractionConfig, ConfigError> {
        let raw = std::fs::read_to_string(&self.path).map_err(|source| ConfigError::Io {
            path: self.path.clone(),
            source,
        })?;
        let config = InteractionConfig::from_sexp(&raw)?;
        info!(path = %self.path.display(), "config loaded");
        Ok(config)
    }
}

// ── Plist helpers ──────────────────────────────────────────

/// Extract the value following `:key` in a plist as a string.
/// Handles both `Value::Keyword("key")` and `Value::Symbol(":key")` forms.
fn get_keyword(value: &Value, key: &str) -> Option<String> {
    let prefixed = format!(":{}", key);
    let mut current = value;
    while let Value::Cons(pair) = current {
        let is_key = match pair.car() {
            Value::Keyword(k) => k.as_ref() == key,
            Value::Symbol(s) => s.as_ref() == prefixed,
            _ => false,
        };
        if is_key {
            let Value::Cons(next) = pair.cdr() else {
                return None;
            };
            let val = next.car();
            return match val {
                Value::Keyword(v) => Some(v.to_string()),
                Value::Symbol(v) => {
                    let s = v.to_string();
                    Some(s.strip_prefix(':').unwrap_or(&s).to_string())
                }
                Value::String(v) => Some(v.to_string()),
                Value::Number(n) => Some(n.to_string()),
                Value::Bool(b) => Some(if *b { "t" } else { "nil" }.to_string()),
                Value::Null | Value::Nil => Some("nil".to_string()),
                _ => Some(val.to_string()),
            };
        }
        current = pair.cdr();
    }
    None
}

/// All `:key` names appearing in key position of a plist.
fn plist_keys(value: &Value) -> Vec<String> {
    let mut keys = Vec::new();
    let mut current = value;
    while let Value::Cons(pair) = current {
        match pair.car() {
            Value::Keyword(k) => keys.push(k.to_string()),
            Value::Symbol(s) if s.starts_with(':') => keys.push(s[1..].to_string()),
            _ => {}
        }
        // Skip the value cell.
        match pair.cdr() {
            Value::Cons(next) => current = next.cdr(),
            _ => break,
        }
    }
    keys
}

/// Treats "nil" as false, anything else as true.
fn get_bool(value: &Value, key: &str) -> Option<bool> {
    get_keyword(value, key).map(|s| s != "nil")
}

fn get_float(value: &Value, key: &str) -> Result<Option<f64>, ConfigError> {
    match get_keyword(value, key) {
        None => Ok(None),
        Some(s) => match s.parse::<f64>() {
            Ok(v) if v.is_finite() => Ok(Some(v)),
            _ => Err(ConfigError::InvalidValue {
                key: key.to_string(),
                value: s,
            }),
        },
    }
}

fn get_non_negative(value: &Value, key: &str) -> Result<Option<f64>, ConfigError> {
    match get_float(value, key)? {
        Some(v) if v < 0.0 => Err(invalid(key, v)),
        other => Ok(other),
    }
}

/// A positive integer that fits the target type.
fn get_count<T: TryFrom<u64>>(value: &Value, key: &str) -> Result<Option<T>, ConfigError> {
    match get_keyword(value, key) {
        None => Ok(None),
        Some(s) => match s.parse::<u64>().ok().filter(|v| *v > 0).map(T::try_from) {
            Some(Ok(v)) => Ok(Some(v)),
            _ => Err(ConfigError::InvalidValue {
                key: key.to_string(),
                value: s,
            }),
        },
    }
}

fn invalid(key: &str, v: f64) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: v.to_string(),
    }
}
