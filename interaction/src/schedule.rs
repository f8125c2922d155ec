//! Delayed world commands.
//!
//! Some equips must land a few milliseconds after the unequip or despawn
//! that precedes them. Instead of sleeping on a helper thread, the state
//! machine schedules them here and the engine runs whatever is due at the
//! end of each tick, in (due time, insertion) order.

use tracing::trace;

use crate::hand::ModelHand;
use crate::world::{ItemClass, World};

/// A world command deferred to a later tick.
#[derive(Debug, Clone, PartialEq)]
pub enum DelayedCommand {
    Equip {
        class: ItemClass,
        hand: ModelHand,
        silent: bool,
    },
}

impl DelayedCommand {
    pub fn execute(&self, world: &mut dyn World) {
        match self {
            Self::Equip {
                class,
                hand,
                silent,
            } => world.request_equip(class, *hand, *silent),
        }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    due_ms: f64,
    seq: u64,
    command: DelayedCommand,
}

/// Time-ordered queue of delayed commands.
#[derive(Debug, Default)]
pub struct CommandQueue {
    entries: Vec<Entry>,
    next_seq: u64,
}

impl CommandQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `command` once the clock reaches `due_ms`.
    pub fn schedule(&mut self, due_ms: f64, command: DelayedCommand) {
        let seq = self.next_seq;
        self.next_seq += 1;
        trace!(due_ms, ?command, "scheduled");
        let pos = self
            .entries
            .partition_point(|e| (e.due_ms, e.seq) <= (due_ms, seq));
        self.entries.insert(
            pos,
            Entry {
                due_ms,
                seq,
                command,
            },
        );
    }

    /// Remove and return every command due at `now_ms`.
    pub fn take_due(&mut self, now_ms: f64) -> Vec<DelayedCommand> {
        let n = self.entries.partition_point(|e| e.due_ms <= now_ms);
        self.entries.drain(..n).map(|e| e.command).collect()
    }

    /// Run every due command against `world`. Returns how many ran.
    pub fn run_due(&mut self, now_ms: f64, world: &mut dyn World) -> usize {
        let due = self.take_due(now_ms);
        for command in &due {
            command.execute(world);
        }
        due.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every pending command, returning them in due order.
    pub fn cancel_all(&mut self) -> Vec<DelayedCommand> {
        self.entries.drain(..).map(|e| e.command).collect()
    }
}
