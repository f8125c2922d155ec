//! Proximity zones, orientation flip, and duration gating.
//!
//! Every predicate the state machine reacts to is derived here from one
//! `PoseSample`: per-hand face distance, the single hand-to-hand distance
//! checked against several independently configured radii, and the
//! per-hand flip test. `DurationGate` debounces any of them.

use tracing::debug;

use crate::config::InteractionConfig;
use crate::hand::Hand;
use crate::math::Vec3;
use crate::tracking::PoseSample;

// ── ZoneKind ───────────────────────────────────────────────

/// Named proximity zones. Each is an independent instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ZoneKind {
    Face,
    Fill,
    Wrap,
    ContainerLight,
    WrapLight,
    Touch,
}

impl ZoneKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Face => "face",
            Self::Fill => "fill",
            Self::Wrap => "wrap",
            Self::ContainerLight => "container-light",
            Self::WrapLight => "wrap-light",
            Self::Touch => "touch",
        }
    }
}

/// Membership edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    Entered,
    Exited,
}

// ── ProximityZone ──────────────────────────────────────────

/// Distance threshold with edge detection and exit hysteresis.
#[derive(Debug, Clone)]
pub struct ProximityZone {
    pub kind: ZoneKind,
    /// Entry radius.
    pub radius: f32,
    /// Extra distance allowed before exit once inside.
    pub hysteresis: f32,
    /// Current membership.
    pub inside: bool,
    /// Membership on the previous update.
    pub was_inside: bool,
    /// Clock time of the last entry.
    pub entered_at_ms: Option<f64>,
}

impl ProximityZone {
    pub fn new(kind: ZoneKind, radius: f32, hysteresis: f32) -> Self {
        Self {
            kind,
            radius,
            hysteresis,
            inside: false,
            was_inside: false,
            entered_at_ms: None,
        }
    }

    /// Update membership for `distance`. Returns the edge crossed, if any.
    pub fn update(&mut self, distance: f32, now_ms: f64) -> Option<Edge> {
        self.was_inside = self.inside;
        let limit = if self.inside {
            self.radius + self.hysteresis
        } else {
            self.radius
        };
        // NaN compares false, so a bad distance reads as outside.
        self.inside = distance <= limit;

        match (self.was_inside, self.inside) {
            (false, true) => {
                self.entered_at_ms = Some(now_ms);
                Some(Edge::Entered)
            }
            (true, false) => {
                self.entered_at_ms = None;
                Some(Edge::Exited)
            }
            _ => None,
        }
    }

    /// Time spent inside since the last entry.
    pub fn dwell_ms(&self, now_ms: f64) -> f64 {
        self.entered_at_ms.map(|t| (now_ms - t).max(0.0)).unwrap_or(0.0)
    }

    pub fn reset(&mut self) {
        self.inside = false;
        self.was_inside = false;
        self.entered_at_ms = None;
    }
}

// ── DurationGate ───────────────────────────────────────────

/// Snapshot of a gate after one update.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GateStatus {
    /// Predicate held on this update.
    pub active: bool,
    /// Continuous time the predicate has held, measured from the first tick it was seen.
    pub elapsed_ms: f64,
    /// `elapsed_ms` has reached the configured duration.
    pub satisfied: bool,
    /// First update of this activation on which `satisfied` became true.
    pub crossed: bool,
}

/// Debounces a boolean predicate that must hold for `duration_ms`.
///
/// The gate is bound to an identity `K` (which hand, which item). A change
/// of binding resets it exactly like the predicate going false, so a timer
/// never carries over to a different subject. `crossed` fires once per
/// continuous activation and re-arms only after the predicate breaks.
#[derive(Debug, Clone)]
pub struct DurationGate<K = ()> {
    pub duration_ms: f64,
    binding: Option<K>,
    active: bool,
    elapsed_ms: f64,
    fired: bool,
}

impl<K: PartialEq + Clone> DurationGate<K> {
    pub fn new(duration_ms: f64) -> Self {
        Self {
            duration_ms,
            binding: None,
            active: false,
            elapsed_ms: 0.0,
            fired: false,
        }
    }

    /// Advance by `dt_ms`. A `None` binding counts as predicate false.
    pub fn update(&mut self, binding: Option<K>, predicate: bool, dt_ms: f64) -> GateStatus {
        if binding != self.binding {
            self.clear();
            self.binding = binding;
        }

        if self.binding.is_none() || !predicate {
            self.clear();
            return self.status();
        }

        if self.active {
            self.elapsed_ms += dt_ms.max(0.0);
        } else {
            self.active = true;
            self.elapsed_ms = 0.0;
        }

        let mut status = self.status();
        if status.satisfied && !self.fired {
            self.fired = true;
            status.crossed = true;
        }
        status
    }

    /// Current state without advancing. `crossed` is always false.
    pub fn status(&self) -> GateStatus {
        GateStatus {
            active: self.active,
            elapsed_ms: self.elapsed_ms,
            satisfied: self.active && self.elapsed_ms >= self.duration_ms,
            crossed: false,
        }
    }

    pub fn binding(&self) -> Option<&K> {
        self.binding.as_ref()
    }

    /// Drop the binding and all timing.
    pub fn reset(&mut self) {
        self.clear();
        self.binding = None;
    }

    fn clear(&mut self) {
        self.active = false;
        self.elapsed_ms = 0.0;
        self.fired = false;
    }
}

impl DurationGate<()> {
    /// Update a gate with no identity binding.
    pub fn update_unbound(&mut self, predicate: bool, dt_ms: f64) -> GateStatus {
        self.update(Some(()), predicate, dt_ms)
    }
}

// ── ZoneEvent ──────────────────────────────────────────────

/// Raw edge transitions, for logging and immediate feedback.
#[derive(Debug, Clone, PartialEq)]
pub enum ZoneEvent {
    Entered { zone: ZoneKind, hand: Option<Hand> },
    Exited { zone: ZoneKind, hand: Option<Hand> },
    Flipped { hand: Hand },
    Unflipped { hand: Hand },
}

impl ZoneEvent {
    pub fn to_sexp(&self) -> String {
        let hand_sexp = |hand: &Option<Hand>| {
            hand.map(|h| format!(":{}", h.as_str()))
                .unwrap_or_else(|| "nil".to_string())
        };
        match self {
            Self::Entered { zone, hand } => format!(
                "(:type :event :event :zone-entered :zone :{} :hand {})",
                zone.as_str(),
                hand_sexp(hand),
            ),
            Self::Exited { zone, hand } => format!(
                "(:type :event :event :zone-exited :zone :{} :hand {})",
                zone.as_str(),
                hand_sexp(hand),
            ),
            Self::Flipped { hand } => {
                format!("(:type :event :event :flipped :hand :{})", hand.as_str())
            }
            Self::Unflipped { hand } => {
                format!("(:type :event :event :unflipped :hand :{})", hand.as_str())
            }
        }
    }
}

// ── ZoneReport ─────────────────────────────────────────────

/// Everything derived from one sample.
#[derive(Debug, Clone, Default)]
pub struct ZoneReport {
    /// Head position plus the rotated face offset.
    pub face_target: Vec3,
    /// Per hand, indexed by `Hand::index`.
    pub distance_to_face: [f32; 2],
    pub near_face: [bool; 2],
    pub flipped: [bool; 2],
    /// Near-face dwell gates (inhale duration).
    pub face_dwell: [GateStatus; 2],
    pub hand_distance: f32,
    pub fill: bool,
    pub wrap: bool,
    pub container_light: bool,
    pub wrap_light: bool,
    pub touching: bool,
    pub events: Vec<ZoneEvent>,
}

impl ZoneReport {
    pub fn near_face(&self, hand: Hand) -> bool {
        self.near_face[hand.index()]
    }

    pub fn any_near_face(&self) -> bool {
        self.near_face[0] || self.near_face[1]
    }

    pub fn flipped(&self, hand: Hand) -> bool {
        self.flipped[hand.index()]
    }

    pub fn face_dwell(&self, hand: Hand) -> GateStatus {
        self.face_dwell[hand.index()]
    }

    pub fn entered_face(&self, hand: Hand) -> bool {
        self.events.contains(&ZoneEvent::Entered {
            zone: ZoneKind::Face,
            hand: Some(hand),
        })
    }

    pub fn exited_face(&self, hand: Hand) -> bool {
        self.events.contains(&ZoneEvent::Exited {
            zone: ZoneKind::Face,
            hand: Some(hand),
        })
    }
}

// ── ZoneEvaluator ──────────────────────────────────────────

/// Owns zone memberships and the face dwell gates across ticks.
#[derive(Debug, Clone)]
pub struct ZoneEvaluator {
    face_offset: Vec3,
    flip_threshold: f32,
    face: [ProximityZone; 2],
    fill: ProximityZone,
    wrap: ProximityZone,
    container_light: ProximityZone,
    wrap_light: ProximityZone,
    touch: ProximityZone,
    flipped: [bool; 2],
    face_dwell: [DurationGate; 2],
    now_ms: f64,
}

impl ZoneEvaluator {
    pub fn new(config: &InteractionConfig) -> Self {
        let h = config.zone_hysteresis;
        let face = ProximityZone::new(ZoneKind::Face, config.face_radius, h);
        Self {
            face_offset: config.face_offset,
            flip_threshold: config.flip_threshold,
            face: [face.clone(), face],
            fill: ProximityZone::new(ZoneKind::Fill, config.fill_radius, h),
            wrap: ProximityZone::new(ZoneKind::Wrap, config.wrap_radius, h),
            container_light: ProximityZone::new(
                ZoneKind::ContainerLight,
                config.container_light_radius,
                h,
            ),
            wrap_light: ProximityZone::new(ZoneKind::WrapLight, config.wrap_light_radius, h),
            touch: ProximityZone::new(ZoneKind::Touch, config.touch_radius, h),
            flipped: [false; 2],
            face_dwell: [
                DurationGate::new(config.inhale_duration_ms),
                DurationGate::new(config.inhale_duration_ms),
            ],
            now_ms: 0.0,
        }
    }

    /// Take new radii and thresholds; memberships are kept.
    pub fn apply_config(&mut self, config: &InteractionConfig) {
        let h = config.zone_hysteresis;
        self.face_offset = config.face_offset;
        self.flip_threshold = config.flip_threshold;
        for zone in &mut self.face {
            zone.radius = config.face_radius;
            zone.hysteresis = h;
        }
        for (zone, radius) in [
            (&mut self.fill, config.fill_radius),
            (&mut self.wrap, config.wrap_radius),
            (&mut self.container_light, config.container_light_radius),
            (&mut self.wrap_light, config.wrap_light_radius),
            (&mut self.touch, config.touch_radius),
        ] {
            zone.radius = radius;
            zone.hysteresis = h;
        }
        for gate in &mut self.face_dwell {
            gate.duration_ms = config.inhale_duration_ms;
        }
    }

    /// Derive all predicates for one tick.
    pub fn evaluate(&mut self, sample: &PoseSample, dt_ms: f64) -> ZoneReport {
        self.now_ms += dt_ms.max(0.0);
        let now = self.now_ms;
        let mut report = ZoneReport {
            face_target: sample.head.position + sample.head.orientation.rotate(self.face_offset),
            ..Default::default()
        };

        for hand in Hand::BOTH {
            let i = hand.index();
            let pose = sample.hand(hand);

            let d = pose.position.distance(report.face_target);
            report.distance_to_face[i] = d;
            if let Some(edge) = self.face[i].update(d, now) {
                push_edge(&mut report.events, edge, ZoneKind::Face, Some(hand));
            }
            report.near_face[i] = self.face[i].inside;
            report.face_dwell[i] = self.face_dwell[i].update_unbound(report.near_face[i], dt_ms);

            let flipped = pose.up.z < self.flip_threshold;
            if flipped != self.flipped[i] {
                self.flipped[i] = flipped;
                let event = if flipped {
                    ZoneEvent::Flipped { hand }
                } else {
                    ZoneEvent::Unflipped { hand }
                };
                debug!("Orientation edge: {:?}", event);
                report.events.push(event);
            }
            report.flipped[i] = flipped;
        }

        let hd = sample.left.position.distance(sample.right.position);
        report.hand_distance = hd;
        for zone in [
            &mut self.fill,
            &mut self.wrap,
            &mut self.container_light,
            &mut self.wrap_light,
            &mut self.touch,
        ] {
            if let Some(edge) = zone.update(hd, now) {
                push_edge(&mut report.events, edge, zone.kind, None);
            }
        }
        report.fill = self.fill.inside;
        report.wrap = self.wrap.inside;
        report.container_light = self.container_light.inside;
        report.wrap_light = self.wrap_light.inside;
        report.touching = self.touch.inside;

        report
    }

    /// Forget memberships and dwell timers (after a pause).
    pub fn reset(&mut self) {
        for zone in &mut self.face {
            zone.reset();
        }
        self.fill.reset();
        self.wrap.reset();
        self.container_light.reset();
        self.wrap_light.reset();
        self.touch.reset();
        self.flipped = [false; 2];
        for gate in &mut self.face_dwell {
            gate.reset();
        }
    }

    /// Generate status s-expression.
    pub fn status_sexp(&self) -> String {
        let b = |v: bool| if v { "t" } else { "nil" };
        format!(
            "(:near-face ({} {}) :flipped ({} {}) :fill {} :wrap {} :container-light {} :wrap-light {} :touch {})",
            b(self.face[0].inside),
            b(self.face[1].inside),
            b(self.flipped[0]),
            b(self.flipped[1]),
            b(self.fill.inside),
            b(self.wrap.inside),
            b(self.container_light.inside),
            b(self.wrap_light.inside),
            b(self.touch.inside),
        )
    }
}

fn push_edge(events: &mut Vec<ZoneEvent>, edge: Edge, zone: ZoneKind, hand: Option<Hand>) {
    let event = match edge {
        Edge::Entered => ZoneEvent::Entered { zone, hand },
        Edge::Exited => ZoneEvent::Exited { zone, hand },
    };
    debug!("Zone edge: {}", event.to_sexp());
    events.push(event);
}

// ── Tests ───────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Quat;
    use crate::tracking::{HeadPose, TrackedPose};
    use std::f32::consts::{FRAC_PI_2, PI};

    fn hand_at(p: Vec3) -> TrackedPose {
        TrackedPose {
            position: p,
            up: Vec3::UP,
            fresh: true,
        }
    }

    fn sample(head: Vec3, left: Vec3, right: Vec3) -> PoseSample {
        PoseSample {
            head: HeadPose {
                position: head,
                orientation: Quat::IDENTITY,
                fresh: true,
            },
            left: hand_at(left),
            right: hand_at(right),
        }
    }

    #[test]
    fn test_proximity_zone_edges() {
        let mut z = ProximityZone::new(ZoneKind::Fill, 10.0, 0.0);
        assert_eq!(z.update(20.0, 0.0), None);
        assert_eq!(z.update(10.0, 100.0), Some(Edge::Entered));
        assert_eq!(z.update(5.0, 200.0), None);
        assert!((z.dwell_ms(250.0) - 150.0).abs() < 1e-9);
        assert_eq!(z.update(10.5, 300.0), Some(Edge::Exited));
        assert_eq!(z.dwell_ms(300.0), 0.0);
    }

    #[test]
    fn test_proximity_zone_hysteresis() {
        let mut z = ProximityZone::new(ZoneKind::Touch, 10.0, 1.0);
        assert_eq!(z.update(10.5, 0.0), None);
        assert_eq!(z.update(9.0, 0.0), Some(Edge::Entered));
        // Inside the exit band: still a member.
        assert_eq!(z.update(10.8, 0.0), None);
        assert!(z.inside);
        assert_eq!(z.update(11.2, 0.0), Some(Edge::Exited));
    }

    #[test]
    fn test_nan_distance_is_outside() {
        let mut z = ProximityZone::new(ZoneKind::Face, 10.0, 0.0);
        z.update(1.0, 0.0);
        assert_eq!(z.update(f32::NAN, 0.0), Some(Edge::Exited));
    }

    #[test]
    fn test_gate_debounce_exact() {
        let mut g: DurationGate = DurationGate::new(2000.0);
        // First tick starts the activation.
        assert!(!g.update_unbound(true, 100.0).satisfied);
        let s = g.update_unbound(true, 1999.0);
        assert!(s.active && !s.satisfied && !s.crossed);
        let s = g.update_unbound(true, 2.0);
        assert!(s.satisfied && s.crossed);
        // Stays satisfied without re-crossing.
        let s = g.update_unbound(true, 500.0);
        assert!(s.satisfied && !s.crossed);
    }

    #[test]
    fn test_gate_resets_on_break() {
        let mut g: DurationGate = DurationGate::new(1000.0);
        g.update_unbound(true, 0.0);
        g.update_unbound(true, 900.0);
        let s = g.update_unbound(false, 50.0);
        assert!(!s.active && s.elapsed_ms == 0.0);
        g.update_unbound(true, 0.0);
        assert!(!g.update_unbound(true, 900.0).satisfied);
    }

    #[test]
    fn test_gate_rearms_after_break() {
        let mut g: DurationGate = DurationGate::new(100.0);
        g.update_unbound(true, 0.0);
        assert!(g.update_unbound(true, 150.0).crossed);
        g.update_unbound(false, 10.0);
        g.update_unbound(true, 0.0);
        assert!(g.update_unbound(true, 150.0).crossed);
    }

    #[test]
    fn test_gate_binding_change_resets() {
        let mut g: DurationGate<Hand> = DurationGate::new(1000.0);
        g.update(Some(Hand::Left), true, 0.0);
        g.update(Some(Hand::Left), true, 900.0);
        // Switching subject restarts the timer.
        let s = g.update(Some(Hand::Right), true, 900.0);
        assert_eq!(s.elapsed_ms, 0.0);
        assert!(!g.update(Some(Hand::Right), true, 900.0).satisfied);
        assert!(g.update(Some(Hand::Right), true, 200.0).crossed);
        assert!(!g.update(None, true, 10.0).active);
    }

    #[test]
    fn test_face_target_uses_head_orientation() {
        let config = InteractionConfig::default();
        let mut ev = ZoneEvaluator::new(&config);
        let mut s = sample(Vec3::new(0.0, 0.0, 100.0), Vec3::ZERO, Vec3::ZERO);
        let r = ev.evaluate(&s, 0.0);
        assert!(r.face_target.distance(Vec3::new(0.0, 10.0, 95.0)) < 1e-4);

        s.head.orientation = Quat::from_axis_angle(Vec3::UP, FRAC_PI_2);
        let r = ev.evaluate(&s, 0.0);
        assert!(r.face_target.distance(Vec3::new(-10.0, 0.0, 95.0)) < 1e-4);
    }

    #[test]
    fn test_near_face_and_dwell() {
        let config = InteractionConfig::default();
        let mut ev = ZoneEvaluator::new(&config);
        let face = Vec3::new(0.0, 10.0, 95.0);
        let s = sample(Vec3::new(0.0, 0.0, 100.0), face, Vec3::new(50.0, 0.0, 0.0));
        let r = ev.evaluate(&s, 100.0);
        assert!(r.near_face(Hand::Left));
        assert!(!r.near_face(Hand::Right));
        assert!(r.entered_face(Hand::Left));
        assert!(!r.face_dwell(Hand::Left).satisfied);
        let r = ev.evaluate(&s, config.inhale_duration_ms);
        assert!(r.face_dwell(Hand::Left).crossed);
        assert!(r.events.is_empty());
    }

    #[test]
    fn test_hand_distance_zones_independent() {
        let mut config = InteractionConfig::default();
        config.fill_radius = 5.0;
        config.wrap_light_radius = 15.0;
        config.touch_radius = 8.0;
        let mut ev = ZoneEvaluator::new(&config);
        let s = sample(
            Vec3::new(0.0, 0.0, 1000.0),
            Vec3::ZERO,
            Vec3::new(12.0, 0.0, 0.0),
        );
        let r = ev.evaluate(&s, 100.0);
        assert!((r.hand_distance - 12.0).abs() < 1e-5);
        assert!(!r.fill);
        assert!(!r.touching);
        assert!(!r.container_light);
        assert!(r.wrap_light);
    }

    #[test]
    fn test_flip_detection() {
        let config = InteractionConfig::default();
        let mut ev = ZoneEvaluator::new(&config);
        let mut s = sample(Vec3::new(0.0, 0.0, 1000.0), Vec3::ZERO, Vec3::new(50.0, 0.0, 0.0));
        s.right.up = Quat::from_axis_angle(Vec3::new(1.0, 0.0, 0.0), PI).rotate(Vec3::UP);
        let r = ev.evaluate(&s, 100.0);
        assert!(r.flipped(Hand::Right));
        assert!(!r.flipped(Hand::Left));
        assert!(r.events.contains(&ZoneEvent::Flipped { hand: Hand::Right }));
        // Horizontal (up.z == 0) is not flipped.
        s.right.up = Vec3::new(1.0, 0.0, 0.0);
        let r = ev.evaluate(&s, 100.0);
        assert!(!r.flipped(Hand::Right));
        assert!(r.events.contains(&ZoneEvent::Unflipped { hand: Hand::Right }));
    }

    #[test]
    fn test_zone_event_sexp() {
        let e = ZoneEvent::Entered {
            zone: ZoneKind::Face,
            hand: Some(Hand::Left),
        };
        assert_eq!(
            e.to_sexp(),
            "(:type :event :event :zone-entered :zone :face :hand :left)"
        );
        assert!(lexpr::from_str(&e.to_sexp()).is_ok());
    }

    #[test]
    fn test_status_sexp_parses() {
        let ev = ZoneEvaluator::new(&InteractionConfig::default());
        assert!(lexpr::from_str(&ev.status_sexp()).is_ok());
    }
}
