//! Quest requirement progress, derived from folded state.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::state::LocalState;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequirementKind {
    User,
    Location,
}

/// Collect `num_sigs_required` signatures from the listed public keys.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestRequirement {
    pub kind: RequirementKind,
    pub public_keys: Vec<String>,
    pub num_sigs_required: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequirementProgress {
    pub collected: BTreeSet<String>,
    pub num_sigs_required: u32,
}

impl RequirementProgress {
    pub fn num_sigs_collected(&self) -> u32 {
        u32::try_from(self.collected.len()).unwrap_or(u32::MAX)
    }

    pub fn is_completed(&self) -> bool {
        self.num_sigs_collected() >= self.num_sigs_required
    }
}

impl QuestRequirement {
    /// Which of the required keys the user has a signature from.
    pub fn progress(&self, state: &LocalState) -> RequirementProgress {
        let wanted: BTreeSet<String> = self.public_keys.iter().map(|k| k.to_ascii_lowercase()).collect();
        let have: BTreeSet<String> = match self.kind {
            RequirementKind::User => state
                .connections
                .values()
                .map(|c| c.signature_public_key.to_hex())
                .collect(),
            RequirementKind::Location => state
                .location_signatures
                .values()
                .map(|s| s.signature_public_key.to_ascii_lowercase())
                .collect(),
        };
        RequirementProgress {
            collected: wanted.intersection(&have).cloned().collect(),
            num_sigs_required: self.num_sigs_required,
        }
    }
}
