//! Static fallback arguments used when the text service fails.

use crate::config::FallbackConfig;
use crate::error::DebateError;
use crate::role::SpeakerRole;

/// Per-role template pools with a `{topic}` placeholder.
#[derive(Debug, Clone)]
pub struct FallbackTemplates {
    pro: Vec<String>,
    con: Vec<String>,
}

impl FallbackTemplates {
    pub fn new(pro: Vec<String>, con: Vec<String>) -> Result<Self, DebateError> {
        if pro.is_empty() || con.is_empty() {
            return Err(DebateError::ConfigError(
                "Fallback template pools must not be empty".to_string(),
            ));
        }
        Ok(Self { pro, con })
    }

    pub fn from_config(config: &FallbackConfig) -> Result<Self, DebateError> {
        Self::new(config.pro.clone(), config.con.clone())
    }

    pub fn pool(&self, role: SpeakerRole) -> &[String] {
        match role {
            SpeakerRole::Pro => &self.pro,
            SpeakerRole::Con => &self.con,
        }
    }

    /// Pick `pool[rotation % len]` for `role` and fill in the topic.
    pub fn select(&self, role: SpeakerRole, topic: &str, rotation: usize) -> String {
        let pool = self.pool(role);
        pool[rotation % pool.len()].replace("{topic}", &topic.to_lowercase())
    }
}
