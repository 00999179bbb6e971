use crate::top_context::TopContext;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Lock a top context for reading, tolerating poisoning (a panicking build
/// job must not wedge every later reader).
pub fn read_lock(top: &RwLock<TopContext>) -> RwLockReadGuard<'_, TopContext> {
    top.read().unwrap_or_else(PoisonError::into_inner)
}

/// Lock a top context for writing. Never acquire while holding a read guard
/// on the same chain; release first, then take the write lock.
pub fn write_lock(top: &RwLock<TopContext>) -> RwLockWriteGuard<'_, TopContext> {
    top.write().unwrap_or_else(PoisonError::into_inner)
}

/// Process-scoped registry mapping document identifiers to their top
/// contexts.
///
/// Created once at startup and injected into builders and schedulers; entries
/// are added as documents open and removed as they close. The registry map is
/// guarded by one reader/writer lock; each top context carries its own
/// reader/writer lock for content access. A separate per-document parse lock
/// serializes traversals of the same document so two jobs never race on one
/// file (and never double-register).
#[derive(Debug, Default)]
pub struct DuChain {
    registry: RwLock<HashMap<String, Arc<RwLock<TopContext>>>>,
    parse_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl DuChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read-locked lookup of an existing top context.
    pub fn lookup(&self, document: &str) -> Option<Arc<RwLock<TopContext>>> {
        let registry = self
            .registry
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        registry.get(document).cloned()
    }

    /// Write-locked insertion of a new top context. Registering a document
    /// that already has one is a no-op: the existing entry is returned and a
    /// warning logged; callers are expected to look up first and reuse.
    pub fn register(&self, top: TopContext) -> Arc<RwLock<TopContext>> {
        let mut registry = self
            .registry
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let document = top.document().to_string();
        if let Some(existing) = registry.get(&document) {
            log::warn!("top context already registered for {document}, keeping existing");
            return Arc::clone(existing);
        }
        let entry = Arc::new(RwLock::new(top));
        registry.insert(document, Arc::clone(&entry));
        entry
    }

    /// Drop a document's top context (document closed). Returns whether an
    /// entry existed.
    pub fn remove(&self, document: &str) -> bool {
        let removed = {
            let mut registry = self
                .registry
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            registry.remove(document).is_some()
        };
        let mut locks = self
            .parse_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        locks.remove(document);
        removed
    }

    /// Recursively delete all content under a top context (child contexts,
    /// local declarations, uses) while keeping the registered top context
    /// itself. Consumers may observe the empty-but-present state.
    pub fn delete_tree(&self, top: &Arc<RwLock<TopContext>>) {
        let mut guard = write_lock(top);
        let root = guard.root();
        guard.clear_subtree(root);
        guard.problems.clear();
    }

    /// Per-document parse lock: hold it for the duration of a parse/build of
    /// that document.
    pub fn parse_lock(&self, document: &str) -> Arc<Mutex<()>> {
        let mut locks = self
            .parse_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            locks
                .entry(document.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        )
    }

    /// Currently registered document identifiers.
    pub fn documents(&self) -> Vec<String> {
        let registry = self
            .registry
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        registry.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn register_is_unique_per_document() {
        let chain = DuChain::new();
        let first = chain.register(TopContext::new("a.c"));
        let second = chain.register(TopContext::new("a.c"));
        // Duplicate registration returns the original entry.
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(chain.documents().len(), 1);
    }

    #[test]
    fn lookup_after_remove_returns_none() {
        let chain = DuChain::new();
        chain.register(TopContext::new("a.c"));
        assert!(chain.lookup("a.c").is_some());
        assert!(chain.remove("a.c"));
        assert!(chain.lookup("a.c").is_none());
        assert!(!chain.remove("a.c"));
    }

    #[test]
    fn delete_tree_leaves_empty_top_registered() {
        let chain = DuChain::new();
        let top = chain.register(TopContext::new("a.c"));
        chain.delete_tree(&top);
        assert!(chain.lookup("a.c").is_some());
        assert!(read_lock(&top).is_empty());
    }

    #[test]
    fn parse_lock_is_shared_per_document() {
        let chain = DuChain::new();
        let a1 = chain.parse_lock("a.c");
        let a2 = chain.parse_lock("a.c");
        let b = chain.parse_lock("b.c");
        assert!(Arc::ptr_eq(&a1, &a2));
        assert!(!Arc::ptr_eq(&a1, &b));
    }
}
