//! Interaction state: the single aggregate the state machine owns.
//!
//! One `InteractionState` holds both hand slots, what each controller is
//! grasping, the per-container payload caches, and the active effect.
//! Only the state machine writes it; everything else gets `&` access.

use std::collections::BTreeMap;

use crate::catalog::{ContainerStage, EffectTag, ItemKind, Material, WrapStage};
use crate::hand::{Hand, Handedness, ModelHand};
use crate::world::{GripPose, ItemKey, ObjectRef};

// ── Token ──────────────────────────────────────────────────

/// Broad category of an interactable item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemCategory {
    Container,
    WrappingMaterial,
    Tool,
    Consumable,
    CraftingMaterial,
}

impl ItemCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Container => "container",
            Self::WrappingMaterial => "wrapping-material",
            Self::Tool => "tool",
            Self::Consumable => "consumable",
            Self::CraftingMaterial => "crafting-material",
        }
    }
}

/// Lifecycle stage of an equipped token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Container(ContainerStage),
    Wrap(WrapStage),
    /// Items without a lifecycle (tools).
    Held,
}

impl Lifecycle {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Container(stage) => stage.as_str(),
            Self::Wrap(stage) => stage.as_str(),
            Self::Held => "held",
        }
    }
}

/// Physical identity of an equipped item. Two slots may never share one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Identity {
    Container(Material),
    Wrap,
    Tool,
}

impl Identity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Container(Material::Wood) => "container-wood",
            Self::Container(Material::Bone) => "container-bone",
            Self::Wrap => "wrap",
            Self::Tool => "tool",
        }
    }
}

/// An equipped item. Replaced wholesale on every transition.
#[derive(Debug, Clone, PartialEq)]
pub struct InteractionToken {
    pub category: ItemCategory,
    pub lifecycle: Lifecycle,
    /// Structural material (containers only).
    pub material: Option<Material>,
    /// Equipped representation.
    pub key: ItemKey,
    /// Cached grip-pose override.
    pub grip: Option<GripPose>,
}

impl InteractionToken {
    pub fn container(
        material: Material,
        stage: ContainerStage,
        key: ItemKey,
        grip: Option<GripPose>,
    ) -> Self {
        Self {
            category: ItemCategory::Container,
            lifecycle: Lifecycle::Container(stage),
            material: Some(material),
            key,
            grip,
        }
    }

    pub fn wrap(stage: WrapStage, key: ItemKey, grip: Option<GripPose>) -> Self {
        Self {
            category: ItemCategory::WrappingMaterial,
            lifecycle: Lifecycle::Wrap(stage),
            material: None,
            key,
            grip,
        }
    }

    pub fn tool(key: ItemKey, grip: Option<GripPose>) -> Self {
        Self {
            category: ItemCategory::Tool,
            lifecycle: Lifecycle::Held,
            material: None,
            key,
            grip,
        }
    }

    /// Token for an equippable kind, or `None` for kinds that are only grabbed.
    pub fn for_kind(kind: &ItemKind, key: ItemKey, grip: Option<GripPose>) -> Option<Self> {
        match kind {
            ItemKind::Container { material, stage } => {
                Some(Self::container(*material, *stage, key, grip))
            }
            ItemKind::Wrapped { stage } => Some(Self::wrap(*stage, key, grip)),
            ItemKind::Igniter => Some(Self::tool(key, grip)),
            _ => None,
        }
    }

    /// The catalog kind this token is represented by.
    pub fn kind(&self) -> ItemKind {
        match (self.lifecycle, self.material) {
            (Lifecycle::Container(stage), Some(material)) => ItemKind::Container { material, stage },
            (Lifecycle::Wrap(stage), _) => ItemKind::Wrapped { stage },
            _ => ItemKind::Igniter,
        }
    }

    pub fn identity(&self) -> Identity {
        match (self.category, self.material) {
            (ItemCategory::Container, Some(m)) => Identity::Container(m),
            (ItemCategory::WrappingMaterial, _) => Identity::Wrap,
            _ => Identity::Tool,
        }
    }

    pub fn container_stage(&self) -> Option<ContainerStage> {
        match self.lifecycle {
            Lifecycle::Container(stage) => Some(stage),
            _ => None,
        }
    }

    pub fn wrap_stage(&self) -> Option<WrapStage> {
        match self.lifecycle {
            Lifecycle::Wrap(stage) => Some(stage),
            _ => None,
        }
    }

    pub fn is_tool(&self) -> bool {
        self.category == ItemCategory::Tool
    }

    pub fn is_ignited(&self) -> bool {
        matches!(
            self.lifecycle,
            Lifecycle::Container(ContainerStage::Ignited) | Lifecycle::Wrap(WrapStage::Ignited)
        )
    }

    /// Filled container or unlit wrap.
    pub fn is_lightable(&self) -> bool {
        matches!(
            self.lifecycle,
            Lifecycle::Container(ContainerStage::Filled) | Lifecycle::Wrap(WrapStage::Unlit)
        )
    }

    /// A new token with a different stage and representation.
    pub fn with_lifecycle(&self, lifecycle: Lifecycle, key: ItemKey) -> Self {
        Self {
            lifecycle,
            key,
            ..self.clone()
        }
    }

    fn to_sexp(&self) -> String {
        format!(
            "(:category :{} :stage :{} :key \"{}\")",
            self.category.as_str(),
            self.lifecycle.as_str(),
            self.key,
        )
    }
}

// ── Payload / effect ───────────────────────────────────────

/// What a container or wrap was filled with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    pub effect: EffectTag,
    /// Consumable the payload came from.
    pub source: ItemKey,
}

/// The payload of the one currently ignited item.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveEffectContext {
    /// Item the effect is burning in.
    pub holder: Identity,
    /// Controller carrying the holder.
    pub hand: Hand,
    /// `None` when the item was equipped already filled with an unknown payload.
    pub payload: Option<Payload>,
}

// ── Held objects ───────────────────────────────────────────

/// A world object grasped (not equipped) by a controller.
#[derive(Debug, Clone, PartialEq)]
pub struct HeldObject {
    pub object: ObjectRef,
    pub key: ItemKey,
    pub kind: ItemKind,
    /// Scale was changed on grab and must be restored on release.
    pub scaled: bool,
}

// ── HandSlot ───────────────────────────────────────────────

/// Zero or one equipped token.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HandSlot {
    token: Option<InteractionToken>,
}

impl HandSlot {
    pub fn token(&self) -> Option<&InteractionToken> {
        self.token.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.token.is_none()
    }

    /// Put `token` in the slot, returning what was there.
    pub fn replace(&mut self, token: InteractionToken) -> Option<InteractionToken> {
        self.token.replace(token)
    }

    pub fn take(&mut self) -> Option<InteractionToken> {
        self.token.take()
    }
}

// ── InteractionState ───────────────────────────────────────

/// Aggregate interaction state.
#[derive(Debug, Clone, Default)]
pub struct InteractionState {
    /// Controller ↔ model hand mapping.
    pub handedness: Handedness,
    slots: [HandSlot; 2],
    held: [Option<HeldObject>; 2],
    /// Fill payload per physical container; survives equip cycles.
    container_payloads: BTreeMap<Material, Payload>,
    wrap_payload: Option<Payload>,
    active_effect: Option<ActiveEffectContext>,
}

impl InteractionState {
    pub fn new(handedness: Handedness) -> Self {
        Self {
            handedness,
            ..Default::default()
        }
    }

    pub fn model(&self, hand: Hand) -> ModelHand {
        self.handedness.to_model(hand)
    }

    pub fn controller(&self, model: ModelHand) -> Hand {
        self.handedness.to_controller(model)
    }

    // Slots

    pub fn slot(&self, hand: Hand) -> &HandSlot {
        &self.slots[hand.index()]
    }

    pub fn slot_mut(&mut self, hand: Hand) -> &mut HandSlot {
        &mut self.slots[hand.index()]
    }

    pub fn token(&self, hand: Hand) -> Option<&InteractionToken> {
        self.slot(hand).token()
    }

    /// Hand whose slot holds `identity`.
    pub fn find(&self, identity: Identity) -> Option<Hand> {
        Hand::BOTH
            .into_iter()
            .find(|h| self.token(*h).map(|t| t.identity()) == Some(identity))
    }

    /// The only occupied slot, if exactly one is occupied.
    pub fn sole_occupied(&self) -> Option<Hand> {
        match (self.slot(Hand::Left).is_empty(), self.slot(Hand::Right).is_empty()) {
            (false, true) => Some(Hand::Left),
            (true, false) => Some(Hand::Right),
            _ => None,
        }
    }

    pub fn any_equipped(&self) -> bool {
        !self.slots[0].is_empty() || !self.slots[1].is_empty()
    }

    // Held objects

    pub fn held(&self, hand: Hand) -> Option<&HeldObject> {
        self.held[hand.index()].as_ref()
    }

    pub fn set_held(&mut self, hand: Hand, held: HeldObject) {
        self.held[hand.index()] = Some(held);
    }

    pub fn take_held(&mut self, hand: Hand) -> Option<HeldObject> {
        self.held[hand.index()].take()
    }

    // Payload caches

    pub fn payload(&self, identity: Identity) -> Option<&Payload> {
        match identity {
            Identity::Container(m) => self.container_payloads.get(&m),
            Identity::Wrap => self.wrap_payload.as_ref(),
            Identity::Tool => None,
        }
    }

    /// Cache a payload. A container holds at most one; the previous is replaced.
    pub fn set_payload(&mut self, identity: Identity, payload: Payload) {
        match identity {
            Identity::Container(m) => {
                self.container_payloads.insert(m, payload);
            }
            Identity::Wrap => self.wrap_payload = Some(payload),
            Identity::Tool => {}
        }
    }

    pub fn clear_payloads(&mut self) {
        self.container_payloads.clear();
        self.wrap_payload = None;
    }

    pub fn clear_payload(&mut self, identity: Identity) -> Option<Payload> {
        match identity {
            Identity::Container(m) => self.container_payloads.remove(&m),
            Identity::Wrap => self.wrap_payload.take(),
            Identity::Tool => None,
        }
    }

    // Active effect

    pub fn active_effect(&self) -> Option<&ActiveEffectContext> {
        self.active_effect.as_ref()
    }

    pub fn set_active_effect(&mut self, context: ActiveEffectContext) {
        self.active_effect = Some(context);
    }

    pub fn clear_active_effect(&mut self) -> Option<ActiveEffectContext> {
        self.active_effect.take()
    }

    /// Point the active effect at the hand now carrying its holder.
    pub fn move_active_effect(&mut self, hand: Hand) {
        if let Some(ctx) = self.active_effect.as_mut() {
            ctx.hand = hand;
        }
    }

    /// Consistency problems, empty when the state is sound.
    pub fn invariant_violations(&self) -> Vec<String> {
        let mut out = Vec::new();
        if let (Some(l), Some(r)) = (self.token(Hand::Left), self.token(Hand::Right)) {
            if l.identity() == r.identity() {
                out.push(format!("both hands hold {}", l.identity().as_str()));
            }
        }
        if let Some(ctx) = &self.active_effect {
            match self.token(ctx.hand) {
                Some(t) if t.is_ignited() && t.identity() == ctx.holder => {}
                _ => out.push(format!(
                    "active effect on {} but {} hand holds no ignited {}",
                    ctx.holder.as_str(),
                    ctx.hand.as_str(),
                    ctx.holder.as_str()
                )),
            }
        }
        out
    }

    /// Generate IPC status s-expression.
    pub fn status_sexp(&self) -> String {
        let slot = |hand: Hand| {
            self.token(hand)
                .map(|t| t.to_sexp())
                .unwrap_or_else(|| "nil".to_string())
        };
        let held = |hand: Hand| {
            self.held(hand)
                .map(|h| format!("(:object {} :kind :{})", h.object.0, h.kind.as_str()))
                .unwrap_or_else(|| "nil".to_string())
        };
        let effect = self
            .active_effect
            .as_ref()
            .map(|ctx| {
                format!(
                    "(:holder :{} :hand :{} :effect {})",
                    ctx.holder.as_str(),
                    ctx.hand.as_str(),
                    ctx.payload
                        .as_ref()
                        .map(|p| format!("\"{}\"", p.effect.as_str()))
                        .unwrap_or_else(|| "nil".to_string()),
                )
            })
            .unwrap_or_else(|| "nil".to_string());
        format!(
            "(:left-handed {} :left {} :right {} :held-left {} :held-right {} :payloads {} :active-effect {})",
            if self.handedness.left_handed { "t" } else { "nil" },
            slot(Hand::Left),
            slot(Hand::Right),
            held(Hand::Left),
            held(Hand::Right),
            self.container_payloads.len() + usize::from(self.wrap_payload.is_some()),
            effect,
        )
    }
}

#[cfg(test)]
pub(crate) fn test_container(material: Material, stage: ContainerStage) -> InteractionToken {
    let suffix = match stage {
        ContainerStage::Unfilled => "empty",
        ContainerStage::Filled => "filled",
        ContainerStage::Ignited => "lit",
    };
    InteractionToken::container(
        material,
        stage,
        ItemKey::new(format!("pipe-{}-{}", material.as_str(), suffix)),
        None,
    )
}
