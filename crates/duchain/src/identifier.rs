use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static UNIQUE_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A single unqualified name.
///
/// Anonymous constructs (unnamed structs, enums) get a process-unique
/// synthetic identifier so symbol-table uniqueness still holds; synthetic
/// identifiers compare equal to each other for reuse-matching purposes via
/// [`Identifier::is_unique`].
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Identifier(String);

impl Identifier {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Process-unique synthetic identifier, e.g. `@struct#17`.
    pub fn unique(prefix: &str) -> Self {
        let n = UNIQUE_COUNTER.fetch_add(1, Ordering::Relaxed);
        Self(format!("@{prefix}#{n}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether this is a synthetic identifier for an anonymous construct.
    pub fn is_unique(&self) -> bool {
        self.0.starts_with('@')
    }

    pub fn eq_ignore_case(&self, other: &Identifier) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identifier({})", self.0)
    }
}

impl From<&str> for Identifier {
    fn from(s: &str) -> Self {
        Identifier::new(s)
    }
}

/// Scoped identifier path, e.g. `foo::bar` for a member `bar` of `foo`.
#[derive(Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct QualifiedIdentifier(Vec<Identifier>);

impl QualifiedIdentifier {
    pub fn new(parts: Vec<Identifier>) -> Self {
        Self(parts)
    }

    pub fn from_identifier(id: Identifier) -> Self {
        Self(vec![id])
    }

    pub fn push(&mut self, id: Identifier) {
        self.0.push(id);
    }

    pub fn pop(&mut self) -> Option<Identifier> {
        self.0.pop()
    }

    /// A copy with `id` appended; used to derive child scope identifiers.
    pub fn appended(&self, id: Identifier) -> Self {
        let mut parts = self.0.clone();
        parts.push(id);
        Self(parts)
    }

    pub fn last(&self) -> Option<&Identifier> {
        self.0.last()
    }

    pub fn first(&self) -> Option<&Identifier> {
        self.0.first()
    }

    pub fn count(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn parts(&self) -> &[Identifier] {
        &self.0
    }

    pub fn eq_ignore_case(&self, other: &QualifiedIdentifier) -> bool {
        self.0.len() == other.0.len()
            && self
                .0
                .iter()
                .zip(other.0.iter())
                .all(|(a, b)| a.eq_ignore_case(b))
    }
}

impl fmt::Display for QualifiedIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, part) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("::")?;
            }
            f.write_str(part.as_str())?;
        }
        Ok(())
    }
}

impl fmt::Debug for QualifiedIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "QualifiedIdentifier({self})")
    }
}

impl From<&str> for QualifiedIdentifier {
    fn from(s: &str) -> Self {
        Self(s.split("::").map(Identifier::new).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn synthetic_identifiers_are_distinct_and_flagged() {
        let a = Identifier::unique("struct");
        let b = Identifier::unique("struct");
        assert_ne!(a, b);
        assert!(a.is_unique());
        assert!(!Identifier::new("struct").is_unique());
    }

    #[test]
    fn qualified_display_and_parse() {
        let qid = QualifiedIdentifier::from("foo::bar");
        assert_eq!(qid.count(), 2);
        assert_eq!(qid.to_string(), "foo::bar");
        assert_eq!(qid.last().unwrap().as_str(), "bar");
    }

    #[test]
    fn case_insensitive_comparison() {
        let a = QualifiedIdentifier::from("Foo::Bar");
        let b = QualifiedIdentifier::from("foo::bar");
        assert!(a.eq_ignore_case(&b));
        assert_ne!(a, b);
        assert!(!a.eq_ignore_case(&QualifiedIdentifier::from("foo")));
    }

    #[test]
    fn appended_derives_child_scopes() {
        let base = QualifiedIdentifier::from("outer");
        let child = base.appended(Identifier::new("inner"));
        assert_eq!(child.to_string(), "outer::inner");
        assert_eq!(base.count(), 1);
    }
}
