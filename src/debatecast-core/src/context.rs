//! Transcript context threaded between turns.

use crate::role::SpeakerRole;

/// Append-only log of accepted turn text.
///
/// Rendered as `Pro: ...` / `Con: ...` lines and handed verbatim to the
/// text service for the next turn.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TranscriptContext {
    entries: Vec<(SpeakerRole, String)>,
}

impl TranscriptContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the context with one more accepted entry.
    pub fn with_entry(mut self, role: SpeakerRole, text: impl Into<String>) -> Self {
        self.entries.push((role, text.into()));
        self
    }

    pub fn entries(&self) -> &[(SpeakerRole, String)] {
        &self.entries
    }

    /// Number of entries already spoken by `role`.
    pub fn count(&self, role: SpeakerRole) -> usize {
        self.entries.iter().filter(|(r, _)| *r == role).count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Newline-terminated transcript lines.
    pub fn render(&self) -> String {
        self.entries
            .iter()
            .map(|(role, text)| format!("{}: {}\n", role.display_name(), text))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_context_renders_empty() {
        assert_eq!(TranscriptContext::new().render(), "");
    }

    #[test]
    fn test_render_in_order() {
        let ctx = TranscriptContext::new()
            .with_entry(SpeakerRole::Pro, "first")
            .with_entry(SpeakerRole::Con, "second")
            .with_entry(SpeakerRole::Pro, "third");
        assert_eq!(ctx.render(), "Pro: first\nCon: second\nPro: third\n");
        assert_eq!(ctx.count(SpeakerRole::Pro), 2);
        assert_eq!(ctx.count(SpeakerRole::Con), 1);
        assert_eq!(ctx.len(), 3);
    }
}
