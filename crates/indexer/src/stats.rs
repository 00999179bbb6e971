use serde::{Deserialize, Serialize};

/// Statistics about an indexing run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexStats {
    /// Number of documents indexed
    pub documents: usize,

    /// Scope contexts in the store
    pub contexts: usize,

    /// Declarations in the store
    pub declarations: usize,

    /// Recorded uses in the store
    pub uses: usize,

    /// Problems attached to top contexts
    pub problems: usize,

    /// Documents that failed to index, with the failure
    pub errors: Vec<String>,
}

impl IndexStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_document(&mut self, contexts: usize, declarations: usize, uses: usize, problems: usize) {
        self.documents += 1;
        self.contexts += contexts;
        self.declarations += declarations;
        self.uses += uses;
        self.problems += problems;
    }

    pub fn add_error(&mut self, error: String) {
        self.errors.push(error);
    }
}
