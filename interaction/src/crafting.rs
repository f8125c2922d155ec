//! Crafting sub-machine.
//!
//! A crafting tool grasped in one hand and a block of material grasped in
//! the other. Contact impulses above a velocity threshold, spaced by a
//! cooldown, count as hits; each hit shrinks the block. Enough hits turn
//! the block into an unfilled container for the hand that held it.
//!
//! This machine only tracks progress. Despawning the block and equipping
//! the container is done by the interaction machine, which owns the slots.

use tracing::{debug, info};

use crate::catalog::{ItemKind, Material};
use crate::config::InteractionConfig;
use crate::hand::Hand;
use crate::world::ObjectRef;

/// Material block being worked.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorkPiece {
    pub hand: Hand,
    pub object: ObjectRef,
    pub material: Material,
    /// Current world scale of the block.
    pub scale: f32,
}

/// Result of feeding an event to the machine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CraftingOutcome {
    Ignored,
    /// Block accepted; apply `scale` to it.
    Registered { object: ObjectRef, scale: f32 },
    /// Counted hit; apply `scale` to the block.
    Hit {
        object: ObjectRef,
        scale: f32,
        hits: u32,
    },
    /// Enough hits. The caller converts the block and then calls `finish`.
    Finished(WorkPiece),
    /// Progress discarded.
    Reset,
}

#[derive(Debug, Clone, Default)]
pub struct CraftingMachine {
    tool: Option<(Hand, ObjectRef)>,
    piece: Option<WorkPiece>,
    hits: u32,
    last_hit_ms: Option<f64>,
}

impl CraftingMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_grabbed(
        &mut self,
        hand: Hand,
        object: ObjectRef,
        kind: &ItemKind,
        config: &InteractionConfig,
    ) -> CraftingOutcome {
        match kind {
            ItemKind::CraftingTool => {
                self.tool = Some((hand, object));
                debug!("Crafting tool grabbed in {} hand", hand.as_str());
                CraftingOutcome::Ignored
            }
            ItemKind::CraftingMaterial { material } => {
                // Only counts when the tool is already in the other hand.
                if self.tool.map(|(h, _)| h) != Some(hand.other()) {
                    return CraftingOutcome::Ignored;
                }
                if self.piece.map(|p| p.object) != Some(object) {
                    self.hits = 0;
                    self.last_hit_ms = None;
                }
                let scale = config.crafting_item_scale;
                self.piece = Some(WorkPiece {
                    hand,
                    object,
                    material: *material,
                    scale,
                });
                debug!(
                    "Crafting material {} registered in {} hand",
                    material.as_str(),
                    hand.as_str()
                );
                CraftingOutcome::Registered { object, scale }
            }
            _ => CraftingOutcome::Ignored,
        }
    }

    pub fn on_dropped(&mut self, hand: Hand, object: ObjectRef) -> CraftingOutcome {
        if self.tool == Some((hand, object)) {
            self.tool = None;
            debug!("Crafting tool dropped");
        }
        if self.piece.map(|p| (p.hand, p.object)) == Some((hand, object)) {
            self.piece = None;
            self.hits = 0;
            self.last_hit_ms = None;
            debug!("Crafting material dropped, progress reset");
            return CraftingOutcome::Reset;
        }
        CraftingOutcome::Ignored
    }

    /// Contact impulse reported for whatever `hand` holds. Only the tool
    /// hand strikes; impulses on the material hand are ignored.
    pub fn on_impulse(
        &mut self,
        hand: Hand,
        relative_velocity: f32,
        now_ms: f64,
        config: &InteractionConfig,
    ) -> CraftingOutcome {
        let (Some((tool_hand, _)), Some(piece)) = (self.tool, self.piece.as_mut()) else {
            return CraftingOutcome::Ignored;
        };
        if tool_hand == piece.hand || hand != tool_hand {
            return CraftingOutcome::Ignored;
        }
        if relative_velocity.abs() < config.crafting_min_velocity {
            return CraftingOutcome::Ignored;
        }
        if let Some(last) = self.last_hit_ms {
            if now_ms - last < config.crafting_cooldown_ms {
                return CraftingOutcome::Ignored;
            }
        }

        self.last_hit_ms = Some(now_ms);
        self.hits += 1;
        if self.hits >= config.crafting_hits {
            return CraftingOutcome::Finished(*piece);
        }
        piece.scale *= config.crafting_shrink;
        debug!("Crafting hit {}/{}", self.hits, config.crafting_hits);
        CraftingOutcome::Hit {
            object: piece.object,
            scale: piece.scale,
            hits: self.hits,
        }
    }

    /// The block was converted; clear it and the counter. The tool stays.
    pub fn finish(&mut self) {
        if let Some(piece) = self.piece.take() {
            info!(
                "Crafted {} container in {} hand",
                piece.material.as_str(),
                piece.hand.as_str()
            );
        }
        self.hits = 0;
        self.last_hit_ms = None;
    }

    pub fn hits(&self) -> u32 {
        self.hits
    }

    pub fn piece(&self) -> Option<&WorkPiece> {
        self.piece.as_ref()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Generate status s-expression.
    pub fn status_sexp(&self) -> String {
        format!(
            "(:tool {} :material {} :hits {})",
            self.tool
                .map(|(h, _)| format!(":{}", h.as_str()))
                .unwrap_or_else(|| "nil".to_string()),
            self.piece
                .map(|p| format!(":{}", p.material.as_str()))
                .unwrap_or_else(|| "nil".to_string()),
            self.hits,
        )
    }
}
