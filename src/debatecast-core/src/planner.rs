//! Round planning.
//!
//! Expands a round count into the ordered list of speaking turns.

use serde::{Deserialize, Serialize};

use crate::role::SpeakerRole;

/// Speaking order inside every round.
const ROUND_ORDER: [SpeakerRole; 2] = [SpeakerRole::Pro, SpeakerRole::Con];

/// One speaking slot in the debate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    /// Zero-based round this turn belongs to.
    pub round_index: usize,
    /// Side speaking.
    pub role: SpeakerRole,
    /// Namespace for this turn's artifacts, e.g. `pro_0`.
    pub turn_id: String,
    /// Position in the overall speaking order.
    pub sequence: usize,
}

impl Turn {
    pub fn new(round_index: usize, role: SpeakerRole, sequence: usize) -> Self {
        Self {
            round_index,
            role,
            turn_id: turn_id(role, round_index),
            sequence,
        }
    }
}

/// Artifact namespace for a role in a given round.
pub fn turn_id(role: SpeakerRole, round_index: usize) -> String {
    format!("{}_{}", role.as_str(), round_index)
}

/// Plan `rounds` rounds of pro/con turns.
///
/// Returns `2 * rounds` turns; zero rounds yields an empty plan.
pub fn plan(rounds: u32) -> Vec<Turn> {
    (0..rounds as usize)
        .flat_map(|round| ROUND_ORDER.iter().map(move |&role| (round, role)))
        .enumerate()
        .map(|(sequence, (round, role))| Turn::new(round, role, sequence))
        .collect()
}
