//! Open-document registry: current text, revision counter, and edit history
//! per document. The registry is the single writer of revisions; parse jobs
//! only read snapshots.

use crate::error::{IndexerError, Result};
use duchain::{Cursor, EditLog, Range, Revision, TextEdit};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone)]
struct DocumentState {
    content: String,
    revision: Revision,
    edits: EditLog,
}

/// A consistent view of one document for a parse job.
#[derive(Debug, Clone)]
pub struct DocumentSnapshot {
    pub content: String,
    pub revision: Revision,
    pub edits: EditLog,
}

#[derive(Debug, Default)]
pub struct DocumentRegistry {
    documents: Mutex<HashMap<String, DocumentState>>,
}

impl DocumentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, DocumentState>> {
        self.documents
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Open a document (or replace it wholesale). Replacing discards the
    /// edit history: without a chain of edits the old coordinates cannot be
    /// translated. Returns the revision of the opened content.
    pub fn open(&self, document: &str, content: impl Into<String>) -> Revision {
        let mut documents = self.lock();
        let revision = Revision(1);
        documents.insert(
            document.to_string(),
            DocumentState {
                content: content.into(),
                revision,
                edits: EditLog::new(),
            },
        );
        revision
    }

    pub fn close(&self, document: &str) -> bool {
        self.lock().remove(document).is_some()
    }

    pub fn is_open(&self, document: &str) -> bool {
        self.lock().contains_key(document)
    }

    pub fn documents(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    pub fn snapshot(&self, document: &str) -> Result<DocumentSnapshot> {
        let documents = self.lock();
        let state = documents
            .get(document)
            .ok_or_else(|| IndexerError::DocumentNotOpen(document.to_string()))?;
        Ok(DocumentSnapshot {
            content: state.content.clone(),
            revision: state.revision,
            edits: state.edits.clone(),
        })
    }

    /// Replace `range` of the document's text with `new_text`, bump the
    /// revision, and record the edit for later range translation. Returns
    /// the revision the edit produced.
    pub fn apply_edit(&self, document: &str, range: Range, new_text: &str) -> Result<Revision> {
        let mut documents = self.lock();
        let state = documents
            .get_mut(document)
            .ok_or_else(|| IndexerError::DocumentNotOpen(document.to_string()))?;
        let start = offset_of(&state.content, range.start).ok_or_else(|| {
            IndexerError::EditOutOfBounds(format!("{document}: {}", range.start))
        })?;
        let end = offset_of(&state.content, range.end)
            .filter(|end| *end >= start)
            .ok_or_else(|| IndexerError::EditOutOfBounds(format!("{document}: {}", range.end)))?;
        let new_end = end_cursor(range.start, new_text);
        state.content.replace_range(start..end, new_text);
        state.revision = state.revision.next();
        state.edits.record(state.revision, TextEdit { range, new_end });
        Ok(state.revision)
    }

    /// Drop edit history the index can no longer need: everything at or
    /// below the revision the last successful build reached.
    pub fn prune_edits(&self, document: &str, upto: Revision) {
        if let Some(state) = self.lock().get_mut(document) {
            state.edits.prune(upto);
        }
    }
}

/// Byte offset of a line/column cursor, or `None` when it points outside
/// the text. Column counts bytes, matching the parser's coordinates.
fn offset_of(content: &str, cursor: Cursor) -> Option<usize> {
    let mut offset = 0usize;
    let mut line = 0u32;
    while line < cursor.line {
        let rest = &content[offset..];
        let newline = rest.find('\n')?;
        offset += newline + 1;
        line += 1;
    }
    let line_len = content[offset..]
        .find('\n')
        .unwrap_or(content.len() - offset);
    let column = cursor.column as usize;
    if column > line_len || !content.is_char_boundary(offset + column) {
        return None;
    }
    Some(offset + column)
}

/// Where replacement text ends when it starts at `start`.
fn end_cursor(start: Cursor, new_text: &str) -> Cursor {
    let lines = new_text.matches('\n').count() as u32;
    if lines == 0 {
        Cursor::new(start.line, start.column + new_text.len() as u32)
    } else {
        let last = new_text.rsplit('\n').next().unwrap_or("");
        Cursor::new(start.line + lines, last.len() as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn offsets_follow_lines_and_columns() {
        let text = "int x;\nint y;\n";
        assert_eq!(offset_of(text, Cursor::new(0, 0)), Some(0));
        assert_eq!(offset_of(text, Cursor::new(1, 4)), Some(11));
        assert_eq!(offset_of(text, Cursor::new(0, 6)), Some(6));
        assert_eq!(offset_of(text, Cursor::new(0, 7)), None);
        assert_eq!(offset_of(text, Cursor::new(5, 0)), None);
    }

    #[test]
    fn edits_splice_text_and_advance_revisions() {
        let registry = DocumentRegistry::new();
        assert_eq!(registry.open("a.c", "int x;\n"), Revision(1));
        let revision = registry
            .apply_edit("a.c", Range::point(Cursor::new(1, 0)), "int y;\n")
            .unwrap();
        assert_eq!(revision, Revision(2));
        let snapshot = registry.snapshot("a.c").unwrap();
        assert_eq!(snapshot.content, "int x;\nint y;\n");
        assert_eq!(snapshot.revision, Revision(2));
        assert!(!snapshot.edits.is_empty());
    }

    #[test]
    fn multi_line_insertions_compute_their_end() {
        assert_eq!(end_cursor(Cursor::new(2, 3), "abc"), Cursor::new(2, 6));
        assert_eq!(end_cursor(Cursor::new(2, 3), "ab\ncd"), Cursor::new(3, 2));
        assert_eq!(end_cursor(Cursor::new(2, 3), "\n"), Cursor::new(3, 0));
    }

    #[test]
    fn reopening_discards_history() {
        let registry = DocumentRegistry::new();
        registry.open("a.c", "int x;\n");
        registry
            .apply_edit("a.c", Range::point(Cursor::new(0, 0)), "\n")
            .unwrap();
        assert_eq!(registry.open("a.c", "int z;\n"), Revision(1));
        let snapshot = registry.snapshot("a.c").unwrap();
        assert!(snapshot.edits.is_empty());
        assert_eq!(snapshot.revision, Revision(1));
    }

    #[test]
    fn edits_against_closed_documents_fail() {
        let registry = DocumentRegistry::new();
        let err = registry
            .apply_edit("a.c", Range::point(Cursor::ZERO), "x")
            .unwrap_err();
        assert!(matches!(err, IndexerError::DocumentNotOpen(_)));
    }
}
