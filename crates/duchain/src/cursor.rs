use serde::{Deserialize, Serialize};
use std::fmt;

/// Zero-based (line, column) position in a document.
///
/// Columns count bytes, matching what the parse layer reports. Parsers that
/// report one-based coordinates go through [`Cursor::from_one_based`] so the
/// subtraction happens in exactly one place.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct Cursor {
    pub line: u32,
    pub column: u32,
}

impl Cursor {
    pub const ZERO: Cursor = Cursor { line: 0, column: 0 };

    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }

    /// Convert a one-based (line, column) pair as reported by some parsers.
    pub fn from_one_based(line: u32, column: u32) -> Self {
        Self {
            line: line.saturating_sub(1),
            column: column.saturating_sub(1),
        }
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Ordered pair of cursors. `start <= end` is expected but not enforced.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct Range {
    pub start: Cursor,
    pub end: Cursor,
}

impl Range {
    pub fn new(start: Cursor, end: Cursor) -> Self {
        Self { start, end }
    }

    /// Empty range anchored at a single position.
    pub fn point(at: Cursor) -> Self {
        Self { start: at, end: at }
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn collapse_to_start(self) -> Self {
        Range::point(self.start)
    }

    pub fn collapse_to_end(self) -> Self {
        Range::point(self.end)
    }

    /// Whether a position falls inside the range (start inclusive, end exclusive).
    pub fn contains(&self, c: Cursor) -> bool {
        self.start <= c && c < self.end
    }

    /// Whether `other` lies entirely within this range. Boundary-equal ranges
    /// count as contained, which is what the containment invariant needs.
    pub fn contains_range(&self, other: &Range) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.start, self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn one_based_conversion_subtracts_uniformly() {
        assert_eq!(Cursor::from_one_based(1, 1), Cursor::ZERO);
        assert_eq!(Cursor::from_one_based(4, 7), Cursor::new(3, 6));
        // Saturates rather than wrapping on malformed input.
        assert_eq!(Cursor::from_one_based(0, 0), Cursor::ZERO);
    }

    #[test]
    fn cursor_ordering_is_line_major() {
        assert!(Cursor::new(1, 0) > Cursor::new(0, 99));
        assert!(Cursor::new(2, 3) < Cursor::new(2, 4));
    }

    #[test]
    fn range_containment() {
        let outer = Range::new(Cursor::new(1, 0), Cursor::new(10, 0));
        let inner = Range::new(Cursor::new(2, 4), Cursor::new(3, 0));
        assert!(outer.contains_range(&inner));
        assert!(outer.contains_range(&outer));
        assert!(!inner.contains_range(&outer));

        assert!(outer.contains(Cursor::new(1, 0)));
        assert!(!outer.contains(Cursor::new(10, 0)));
    }

    #[test]
    fn collapsed_ranges_are_empty() {
        let r = Range::new(Cursor::new(5, 2), Cursor::new(5, 9));
        assert!(r.collapse_to_start().is_empty());
        assert_eq!(r.collapse_to_end().start, Cursor::new(5, 9));
    }
}
