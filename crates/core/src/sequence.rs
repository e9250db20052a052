#![forbid(unsafe_code)]

use crate::ids::{EntityId, EntityKind};
use serde::{Deserialize, Serialize};

fn first() -> u64 {
    1
}

/// Next available counter per kind, as persisted in `sequence.json`.
///
/// Unknown or missing counters default to 1. The value is only ever moved
/// forward by [`SequenceState::next`]; callers that want to simulate an
/// allocation work on a clone and drop it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceState {
    #[serde(default = "first")]
    pub epics: u64,
    #[serde(default = "first")]
    pub stories: u64,
    #[serde(default = "first")]
    pub tasks: u64,
    #[serde(default = "first")]
    pub plans: u64,
}

impl Default for SequenceState {
    fn default() -> Self {
        Self {
            epics: 1,
            stories: 1,
            tasks: 1,
            plans: 1,
        }
    }
}

impl SequenceState {
    pub fn peek(&self, kind: EntityKind) -> u64 {
        match kind {
            EntityKind::Epic => self.epics,
            EntityKind::Story => self.stories,
            EntityKind::Task => self.tasks,
            EntityKind::Plan => self.plans,
        }
    }

    fn counter_mut(&mut self, kind: EntityKind) -> &mut u64 {
        match kind {
            EntityKind::Epic => &mut self.epics,
            EntityKind::Story => &mut self.stories,
            EntityKind::Task => &mut self.tasks,
            EntityKind::Plan => &mut self.plans,
        }
    }

    /// Issues the current counter as an id and advances it.
    pub fn next(&mut self, kind: EntityKind) -> EntityId {
        let counter = self.counter_mut(kind);
        // Counters start at 1; a zero on disk is treated as a fresh counter.
        let number = (*counter).max(1);
        *counter = number.saturating_add(1);
        EntityId::format(kind, number)
    }
}
