use serde::{Deserialize, Serialize};

/// Result of processing one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessOutcome {
    /// False when an event with the same id was already committed.
    pub inserted: bool,
}

impl ProcessOutcome {
    pub fn inserted() -> Self {
        Self { inserted: true }
    }

    pub fn duplicate() -> Self {
        Self { inserted: false }
    }

    pub fn is_duplicate(&self) -> bool {
        !self.inserted
    }
}
