//! Hand identities and the ambidexterity mapping.
//!
//! `Hand` names a physical motion controller. `ModelHand` names the
//! in-model equip slot that equip/unequip commands and equip
//! notifications refer to. With the left-handed flag set the two are
//! mirrored; every boundary crossing goes through `Handedness`.

// ── Hand ───────────────────────────────────────────────────

/// A physical controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Hand {
    Left,
    Right,
}

impl Hand {
    pub const BOTH: [Hand; 2] = [Hand::Left, Hand::Right];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Right => "right",
        }
    }

    /// The other controller.
    pub fn other(self) -> Self {
        match self {
            Self::Left => Self::Right,
            Self::Right => Self::Left,
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }
}

// ── ModelHand ──────────────────────────────────────────────

/// An in-model hand slot (where equipped items are attached).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelHand {
    Left,
    Right,
}

impl ModelHand {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Right => "right",
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }
}

// ── Handedness ─────────────────────────────────────────────

/// Controller ↔ model hand mapping driven by the ambidexterity flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Handedness {
    /// Left-handed mode: the left controller drives the right model hand.
    pub left_handed: bool,
}

impl Handedness {
    pub fn new(left_handed: bool) -> Self {
        Self { left_handed }
    }

    /// Model hand that receives items for a gesture made with `controller`.
    pub fn to_model(self, controller: Hand) -> ModelHand {
        match (controller, self.left_handed) {
            (Hand::Left, false) | (Hand::Right, true) => ModelHand::Left,
            (Hand::Right, false) | (Hand::Left, true) => ModelHand::Right,
        }
    }

    /// Controller that physically carries whatever sits in `model`.
    pub fn to_controller(self, model: ModelHand) -> Hand {
        match (model, self.left_handed) {
            (ModelHand::Left, false) | (ModelHand::Right, true) => Hand::Left,
            (ModelHand::Right, false) | (ModelHand::Left, true) => Hand::Right,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolved_hand_table() {
        let table = [
            (Hand::Left, false, ModelHand::Left),
            (Hand::Right, false, ModelHand::Right),
            (Hand::Left, true, ModelHand::Right),
            (Hand::Right, true, ModelHand::Left),
        ];
        for (controller, flag, expected) in table {
            let h = Handedness::new(flag);
            assert_eq!(h.to_model(controller), expected, "{:?} flag={}", controller, flag);
            assert_eq!(h.to_controller(expected), controller, "inverse {:?} flag={}", expected, flag);
        }
    }

    #[test]
    fn test_other_hand() {
        assert_eq!(Hand::Left.other(), Hand::Right);
        assert_eq!(Hand::Right.other(), Hand::Left);
    }
}
