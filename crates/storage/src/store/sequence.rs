#![forbid(unsafe_code)]

use super::files::{read_text, write_atomic};
use super::{ProjectStore, StoreError};
use dp_core::SequenceState;
use dp_core::canonical::to_canonical_json;

impl ProjectStore {
    /// Reads the persisted counters; a missing file means every counter is at 1.
    pub fn load_sequence(&self) -> Result<SequenceState, StoreError> {
        let path = self.sequence_path();
        if !path.exists() {
            return Ok(SequenceState::default());
        }
        let raw = read_text(&path)?;
        serde_json::from_str(&raw).map_err(|err| StoreError::parse(self.relative(&path), err))
    }

    /// Persists the counters. Only a committed import may call this.
    pub fn persist_sequence(&self, state: &SequenceState) -> Result<(), StoreError> {
        let path = self.sequence_path();
        let value = serde_json::to_value(state)
            .map_err(|err| StoreError::parse(self.relative(&path), err))?;
        let text = to_canonical_json(&value)
            .map_err(|err| StoreError::parse(self.relative(&path), err))?;
        write_atomic(&path, &text)?;
        tracing::debug!(
            epics = state.epics,
            stories = state.stories,
            tasks = state.tasks,
            plans = state.plans,
            "sequence persisted"
        );
        Ok(())
    }
}
