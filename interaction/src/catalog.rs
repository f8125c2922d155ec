//! Item classification.
//!
//! A raw `ItemKey` is classified once into an `ItemKind` and the state
//! machine switches on that exhaustively. Keys that match nothing are not
//! of interest and are ignored.

use std::collections::HashMap;

use crate::world::{GripPose, ItemKey};

// ── Attributes ─────────────────────────────────────────────

/// Structural material of a container or crafting block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Material {
    Wood,
    Bone,
}

impl Material {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Wood => "wood",
            Self::Bone => "bone",
        }
    }
}

/// Effect category of a consumable, enumerated by the catalog owner.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EffectTag(pub String);

impl EffectTag {
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Container lifecycle stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerStage {
    Unfilled,
    Filled,
    Ignited,
}

impl ContainerStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unfilled => "unfilled",
            Self::Filled => "filled",
            Self::Ignited => "ignited",
        }
    }
}

/// Wrapped item lifecycle stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WrapStage {
    Unlit,
    Ignited,
}

impl WrapStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unlit => "unlit",
            Self::Ignited => "ignited",
        }
    }
}

// ── ItemKind ───────────────────────────────────────────────

/// Classification result.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ItemKind {
    /// Equippable container representation at a given stage.
    Container {
        material: Material,
        stage: ContainerStage,
    },
    /// A container lying in the world; grabbing it equips the Unfilled form.
    PlacedContainer { material: Material },
    /// Loose wrapping material, held by grabbing.
    WrappingMaterial,
    /// Equippable wrapped item.
    Wrapped { stage: WrapStage },
    /// Equippable tool effect used for lighting.
    Igniter,
    /// Grabbed tool used for crafting.
    CraftingTool,
    /// Grabbed block shaped into a container.
    CraftingMaterial { material: Material },
    /// Fill/wrap payload.
    Consumable { effect: EffectTag },
}

impl ItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Container { .. } => "container",
            Self::PlacedContainer { .. } => "placed-container",
            Self::WrappingMaterial => "wrapping-material",
            Self::Wrapped { .. } => "wrapped",
            Self::Igniter => "igniter",
            Self::CraftingTool => "crafting-tool",
            Self::CraftingMaterial { .. } => "crafting-material",
            Self::Consumable { .. } => "consumable",
        }
    }
}

// ── Classifier ─────────────────────────────────────────────

/// Pure lookup between item keys and kinds.
pub trait Classifier: Send {
    /// Classify a key; `None` means "not of interest".
    fn classify(&self, key: &ItemKey) -> Option<ItemKind>;

    /// The key that represents `kind` when equipped or spawned.
    fn representation(&self, kind: &ItemKind) -> Option<ItemKey>;

    /// Grip override for an equipped kind, if it has one.
    fn grip_for(&self, _kind: &ItemKind) -> Option<GripPose> {
        None
    }
}

/// Table-backed classifier.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    kinds: HashMap<ItemKey, ItemKind>,
    keys: HashMap<ItemKind, ItemKey>,
    grips: HashMap<ItemKind, GripPose>,
}

impl StaticCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a key. The first key registered for a kind is its representation.
    pub fn insert(&mut self, key: impl Into<ItemKey>, kind: ItemKind) -> &mut Self {
        let key = key.into();
        self.keys.entry(kind.clone()).or_insert_with(|| key.clone());
        self.kinds.insert(key, kind);
        self
    }

    pub fn set_grip(&mut self, kind: ItemKind, grip: GripPose) -> &mut Self {
        self.grips.insert(kind, grip);
        self
    }

    /// Catalog with the stock containers, wrap, tools, and a few consumables.
    pub fn with_defaults() -> Self {
        let mut c = Self::new();
        for material in [Material::Wood, Material::Bone] {
            let m = material.as_str();
            for stage in [
                ContainerStage::Unfilled,
                ContainerStage::Filled,
                ContainerStage::Ignited,
            ] {
                let suffix = match stage {
                    ContainerStage::Unfilled => "empty",
                    ContainerStage::Filled => "filled",
                    ContainerStage::Ignited => "lit",
                };
                c.insert(
                    format!("pipe-{}-{}", m, suffix),
                    ItemKind::Container { material, stage },
                );
            }
            c.insert(format!("pipe-{}-placed", m), ItemKind::PlacedContainer { material });
        }
        c.insert("block-wood", ItemKind::CraftingMaterial { material: Material::Wood })
            .insert("bone-chunk", ItemKind::CraftingMaterial { material: Material::Bone })
            .insert("rolling-paper", ItemKind::WrappingMaterial)
            .insert("rolled-smoke-unlit", ItemKind::Wrapped { stage: WrapStage::Unlit })
            .insert("rolled-smoke-lit", ItemKind::Wrapped { stage: WrapStage::Ignited })
            .insert("flame-spell", ItemKind::Igniter)
            .insert("knife", ItemKind::CraftingTool)
            .insert("herb-lavender", ItemKind::Consumable { effect: EffectTag::new("calm") })
            .insert("herb-mountain-flower", ItemKind::Consumable { effect: EffectTag::new("calm") })
            .insert("mushroom-glow", ItemKind::Consumable { effect: EffectTag::new("vision") })
            .insert("herb-nightshade", ItemKind::Consumable { effect: EffectTag::new("numb") });
        c
    }
}

impl Classifier for StaticCatalog {
    fn classify(&self, key: &ItemKey) -> Option<ItemKind> {
        self.kinds.get(key).cloned()
    }

    fn representation(&self, kind: &ItemKind) -> Option<ItemKey> {
        self.keys.get(kind).cloned()
    }

    fn grip_for(&self, kind: &ItemKind) -> Option<GripPose> {
        self.grips.get(kind).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_defaults() {
        let c = StaticCatalog::with_defaults();
        assert_eq!(
            c.classify(&ItemKey::new("pipe-bone-filled")),
            Some(ItemKind::Container {
                material: Material::Bone,
                stage: ContainerStage::Filled
            })
        );
        assert_eq!(c.classify(&ItemKey::new("knife")), Some(ItemKind::CraftingTool));
        assert_eq!(c.classify(&ItemKey::new("iron-sword")), None);
    }

    #[test]
    fn test_representation_inverse() {
        let c = StaticCatalog::with_defaults();
        let kind = ItemKind::Container {
            material: Material::Wood,
            stage: ContainerStage::Ignited,
        };
        let key = c.representation(&kind).unwrap();
        assert_eq!(key.as_str(), "pipe-wood-lit");
        assert_eq!(c.classify(&key), Some(kind));
    }

    #[test]
    fn test_first_key_is_representation() {
        let mut c = StaticCatalog::new();
        c.insert("a", ItemKind::Igniter).insert("b", ItemKind::Igniter);
        assert_eq!(c.representation(&ItemKind::Igniter), Some(ItemKey::new("a")));
        assert_eq!(c.classify(&ItemKey::new("b")), Some(ItemKind::Igniter));
    }

    #[test]
    fn test_grip_lookup() {
        let mut c = StaticCatalog::with_defaults();
        let kind = ItemKind::Wrapped { stage: WrapStage::Unlit };
        assert!(c.grip_for(&kind).is_none());
        c.set_grip(kind.clone(), GripPose::default());
        assert!(c.grip_for(&kind).is_some());
    }
}
