//! The room's code document as last known to this client.

/// A single last-writer-wins string. No history is kept.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CodeDocument {
    content: String,
    revision: u64,
}

impl CodeDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies a local edit. Local edits always win immediately.
    ///
    /// Returns `true` if the content changed.
    pub fn apply_local(&mut self, code: &str) -> bool {
        self.replace(code)
    }

    /// Applies a remote update, but only if it differs from the current
    /// content.
    ///
    /// Returns `true` if the content changed (and the view must refresh).
    pub fn apply_remote(&mut self, code: &str) -> bool {
        self.replace(code)
    }

    fn replace(&mut self, code: &str) -> bool {
        if self.content == code {
            return false;
        }
        self.content.clear();
        self.content.push_str(code);
        self.revision += 1;
        true
    }

    pub fn as_str(&self) -> &str {
        &self.content
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    /// Number of updates that actually changed the content.
    pub fn revision(&self) -> u64 {
        self.revision
    }
}
