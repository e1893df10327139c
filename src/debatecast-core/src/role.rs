//! Speaker roles.
//!
//! A debate has exactly two sides. The role decides which reference image,
//! voice and fallback pool a turn uses.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Side a speaker argues.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SpeakerRole {
    /// Arguing in favor of the topic.
    Pro,
    /// Arguing against the topic.
    Con,
}

impl SpeakerRole {
    pub const ALL: [SpeakerRole; 2] = [SpeakerRole::Pro, SpeakerRole::Con];

    /// Wire name used by the text service (`"pro"` / `"con"`).
    pub fn as_str(&self) -> &'static str {
        match self {
            SpeakerRole::Pro => "pro",
            SpeakerRole::Con => "con",
        }
    }

    /// Capitalized label used in transcript lines.
    pub fn display_name(&self) -> &'static str {
        match self {
            SpeakerRole::Pro => "Pro",
            SpeakerRole::Con => "Con",
        }
    }

    pub fn stance(&self) -> &'static str {
        match self {
            SpeakerRole::Pro => "FOR",
            SpeakerRole::Con => "AGAINST",
        }
    }
}

impl fmt::Display for SpeakerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
