//! Convergence checks between devices.
//!
//! Two devices that folded the same messages hold the same set of event ids.
//! The log digest hashes those ids in fold order so the sets can be compared
//! without exchanging them.

use tapquest_core::{Blake3Hash, LocalState};

const DIGEST_DOMAIN: &[u8] = b"tapquest-log-v0:";

/// Blake3 over every event id in `(timestamp, id)` order.
pub fn compute_log_digest(state: &LocalState) -> Blake3Hash {
    let mut hasher = blake3::Hasher::new();
    hasher.update(DIGEST_DOMAIN);
    for event in state.ordered_activities() {
        hasher.update(&event.timestamp.to_be_bytes());
        hasher.update(event.id.as_bytes());
    }
    Blake3Hash::from_bytes(*hasher.finalize().as_bytes())
}

/// Result of convergence verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConvergenceResult {
    /// Both devices hold identical logs.
    Converged,
    /// The logs differ; another sync round may close the gap.
    NotConverged { local_events: usize, reason: String },
}

impl ConvergenceResult {
    pub fn is_converged(&self) -> bool {
        matches!(self, ConvergenceResult::Converged)
    }
}

/// Compare the local log against a digest reported by another device.
pub fn verify_convergence(local: &LocalState, remote_digest: &Blake3Hash) -> ConvergenceResult {
    if &compute_log_digest(local) == remote_digest {
        ConvergenceResult::Converged
    } else {
        ConvergenceResult::NotConverged {
            local_events: local.activities.len(),
            reason: "log digest mismatch".into(),
        }
    }
}
