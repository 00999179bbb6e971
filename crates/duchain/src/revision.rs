use crate::cursor::{Cursor, Range};
use serde::{Deserialize, Serialize};

/// Monotonic per-document revision counter. Every edit bumps it by one.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct Revision(pub u64);

impl Revision {
    pub fn next(self) -> Revision {
        Revision(self.0 + 1)
    }
}

/// One text replacement: `range` (in the pre-edit coordinate space) was
/// replaced by text whose last character ends at `new_end`.
///
/// A pure insertion has an empty `range`; a pure deletion has
/// `new_end == range.start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextEdit {
    pub range: Range,
    pub new_end: Cursor,
}

impl TextEdit {
    /// Map a position across this edit. Positions before the replaced span are
    /// unchanged, positions after it shift, and positions inside it are
    /// invalidated (`None`); the caller treats the anchored node as unmatched.
    pub fn translate(&self, c: Cursor) -> Option<Cursor> {
        if c < self.range.start {
            return Some(c);
        }
        if c >= self.range.end {
            if c.line == self.range.end.line {
                // Same line as the edit's old end: the column shifts too.
                let column = c.column - self.range.end.column + self.new_end.column;
                return Some(Cursor::new(self.new_end.line, column));
            }
            let delta = i64::from(self.new_end.line) - i64::from(self.range.end.line);
            return Some(Cursor::new((i64::from(c.line) + delta) as u32, c.column));
        }
        None
    }
}

/// Ordered edit history for one document, keyed by the revision each edit
/// produced. Translating a range from revision A to revision B replays the
/// edits in between; any edit that swallowed the anchor aborts the
/// translation.
#[derive(Debug, Clone, Default)]
pub struct EditLog {
    edits: Vec<(Revision, TextEdit)>,
}

impl EditLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an edit that produced revision `produced`.
    pub fn record(&mut self, produced: Revision, edit: TextEdit) {
        debug_assert!(self.edits.last().map_or(true, |(r, _)| *r < produced));
        self.edits.push((produced, edit));
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    /// Drop edits at or below `upto`. Once the index has caught up to a
    /// revision, older history can never be replayed again.
    pub fn prune(&mut self, upto: Revision) {
        self.edits.retain(|(rev, _)| *rev > upto);
    }

    /// Translate a cursor from the coordinate space of `from` into `to`.
    /// Only forward translation is supported; `from > to` yields `None`.
    pub fn translate_cursor(&self, c: Cursor, from: Revision, to: Revision) -> Option<Cursor> {
        if from == to {
            return Some(c);
        }
        if from > to {
            return None;
        }
        let mut cur = c;
        for (rev, edit) in &self.edits {
            if *rev <= from {
                continue;
            }
            if *rev > to {
                break;
            }
            cur = edit.translate(cur)?;
        }
        Some(cur)
    }

    pub fn translate_range(&self, r: Range, from: Revision, to: Revision) -> Option<Range> {
        let start = self.translate_cursor(r.start, from, to)?;
        let end = self.translate_cursor(r.end, from, to)?;
        Some(Range::new(start, end))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn insert_line(at: u32) -> TextEdit {
        // Insert "\n" at column 0 of `at`: everything from that point shifts
        // down one line.
        TextEdit {
            range: Range::point(Cursor::new(at, 0)),
            new_end: Cursor::new(at + 1, 0),
        }
    }

    #[test]
    fn insertion_shifts_following_lines() {
        let edit = insert_line(3);
        assert_eq!(edit.translate(Cursor::new(2, 5)), Some(Cursor::new(2, 5)));
        assert_eq!(edit.translate(Cursor::new(3, 0)), Some(Cursor::new(4, 0)));
        assert_eq!(edit.translate(Cursor::new(7, 2)), Some(Cursor::new(8, 2)));
    }

    #[test]
    fn same_line_edit_shifts_columns() {
        // Replace columns 4..6 on line 1 with three characters.
        let edit = TextEdit {
            range: Range::new(Cursor::new(1, 4), Cursor::new(1, 6)),
            new_end: Cursor::new(1, 7),
        };
        assert_eq!(edit.translate(Cursor::new(1, 2)), Some(Cursor::new(1, 2)));
        assert_eq!(edit.translate(Cursor::new(1, 6)), Some(Cursor::new(1, 7)));
        assert_eq!(edit.translate(Cursor::new(1, 10)), Some(Cursor::new(1, 11)));
        // Inside the replaced span: anchor destroyed.
        assert_eq!(edit.translate(Cursor::new(1, 5)), None);
    }

    #[test]
    fn log_replays_edits_in_revision_order() {
        let mut log = EditLog::new();
        log.record(Revision(1), insert_line(0));
        log.record(Revision(2), insert_line(0));

        let r = Range::new(Cursor::new(4, 0), Cursor::new(4, 8));
        assert_eq!(
            log.translate_range(r, Revision(0), Revision(2)),
            Some(Range::new(Cursor::new(6, 0), Cursor::new(6, 8)))
        );
        // Partial replay stops at the target revision.
        assert_eq!(
            log.translate_range(r, Revision(0), Revision(1)),
            Some(Range::new(Cursor::new(5, 0), Cursor::new(5, 8)))
        );
        // Identity and backwards translation.
        assert_eq!(log.translate_range(r, Revision(2), Revision(2)), Some(r));
        assert_eq!(log.translate_cursor(Cursor::ZERO, Revision(2), Revision(1)), None);
    }

    #[test]
    fn deleted_region_invalidates_anchors() {
        let mut log = EditLog::new();
        // Delete lines 2..4 entirely.
        log.record(
            Revision(1),
            TextEdit {
                range: Range::new(Cursor::new(2, 0), Cursor::new(4, 0)),
                new_end: Cursor::new(2, 0),
            },
        );
        assert_eq!(
            log.translate_cursor(Cursor::new(3, 1), Revision(0), Revision(1)),
            None
        );
        assert_eq!(
            log.translate_cursor(Cursor::new(5, 0), Revision(0), Revision(1)),
            Some(Cursor::new(3, 0))
        );
    }
}
