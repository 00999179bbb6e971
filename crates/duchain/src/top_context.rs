use crate::context::{ContextKind, DuContext};
use crate::cursor::{Cursor, Range};
use crate::declaration::Declaration;
use crate::handle::{ContextId, DeclarationId};
use crate::identifier::{Identifier, QualifiedIdentifier};
use crate::problem::Problem;
use crate::revision::Revision;
use std::collections::HashSet;

/// The per-document root of the index graph.
///
/// Owns the context and declaration arenas. Handles are stable across
/// incremental rebuilds for matched-and-reused objects; removed objects leave
/// holes (their handles resolve to `None` through the `get_*` accessors)
/// until a later allocation recycles the slot, so a handle is only
/// meaningful while its object is live. The top context itself persists as
/// long as the document is tracked, even though its contents are replaced
/// per re-parse.
#[derive(Debug)]
pub struct TopContext {
    document: String,
    /// Revision whose coordinate space all stored ranges are valid in.
    revision: Revision,
    contexts: Vec<Option<DuContext>>,
    declarations: Vec<Option<Declaration>>,
    /// Holes left by removals, recycled before the arenas grow.
    free_contexts: Vec<usize>,
    free_declarations: Vec<usize>,
    root: ContextId,
    pub problems: Vec<Problem>,
}

impl TopContext {
    pub fn new(document: impl Into<String>) -> Self {
        let root_ctx = DuContext::new(ContextKind::Global, Range::default(), None);
        Self {
            document: document.into(),
            revision: Revision::default(),
            contexts: vec![Some(root_ctx)],
            declarations: Vec::new(),
            free_contexts: Vec::new(),
            free_declarations: Vec::new(),
            root: ContextId::from_index(0),
            problems: Vec::new(),
        }
    }

    pub fn document(&self) -> &str {
        &self.document
    }

    pub fn revision(&self) -> Revision {
        self.revision
    }

    pub fn set_revision(&mut self, revision: Revision) {
        self.revision = revision;
    }

    pub fn root(&self) -> ContextId {
        self.root
    }

    /// Whether this top context carries no semantic content yet. Consumers
    /// may observe this state between registration and the first build, or
    /// mid-rebuild.
    pub fn is_empty(&self) -> bool {
        let root_empty = self
            .get_context(self.root)
            .map_or(true, |r| r.children.is_empty() && r.local_declarations.is_empty());
        root_empty && self.declarations.iter().all(Option::is_none)
    }

    // --- arena access ---

    pub fn get_context(&self, id: ContextId) -> Option<&DuContext> {
        self.contexts.get(id.index()).and_then(Option::as_ref)
    }

    pub fn get_context_mut(&mut self, id: ContextId) -> Option<&mut DuContext> {
        self.contexts.get_mut(id.index()).and_then(Option::as_mut)
    }

    /// Arena indexing for handles known to be live.
    ///
    /// Panics if the context was removed; use [`get_context`](Self::get_context)
    /// for possibly-stale handles.
    #[track_caller]
    pub fn context(&self, id: ContextId) -> &DuContext {
        self.get_context(id).expect("live context handle")
    }

    #[track_caller]
    pub fn context_mut(&mut self, id: ContextId) -> &mut DuContext {
        self.get_context_mut(id).expect("live context handle")
    }

    pub fn get_declaration(&self, id: DeclarationId) -> Option<&Declaration> {
        self.declarations.get(id.index()).and_then(Option::as_ref)
    }

    pub fn get_declaration_mut(&mut self, id: DeclarationId) -> Option<&mut Declaration> {
        self.declarations.get_mut(id.index()).and_then(Option::as_mut)
    }

    #[track_caller]
    pub fn declaration(&self, id: DeclarationId) -> &Declaration {
        self.get_declaration(id).expect("live declaration handle")
    }

    #[track_caller]
    pub fn declaration_mut(&mut self, id: DeclarationId) -> &mut Declaration {
        self.get_declaration_mut(id).expect("live declaration handle")
    }

    pub fn contexts(&self) -> impl Iterator<Item = (ContextId, &DuContext)> {
        self.contexts
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|c| (ContextId::from_index(i), c)))
    }

    pub fn declarations(&self) -> impl Iterator<Item = (DeclarationId, &Declaration)> {
        self.declarations
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|d| (DeclarationId::from_index(i), d)))
    }

    pub fn context_count(&self) -> usize {
        self.contexts.iter().filter(|s| s.is_some()).count()
    }

    pub fn declaration_count(&self) -> usize {
        self.declarations.iter().filter(|s| s.is_some()).count()
    }

    pub fn use_count(&self) -> usize {
        self.contexts().map(|(_, c)| c.uses.len()).sum()
    }

    // --- construction ---

    /// Allocate a context and append it to its parent's child list (children
    /// are appended, never inserted out of order). Slots freed by removals
    /// are recycled first, so the arena stays bounded by the live object
    /// count across rebuilds.
    pub fn alloc_context(&mut self, ctx: DuContext) -> ContextId {
        let parent = ctx.parent;
        let id = match self.free_contexts.pop() {
            Some(slot) => {
                self.contexts[slot] = Some(ctx);
                ContextId::from_index(slot)
            }
            None => {
                let id = ContextId::from_index(self.contexts.len());
                self.contexts.push(Some(ctx));
                id
            }
        };
        if let Some(p) = parent {
            if let Some(parent_ctx) = self.get_context_mut(p) {
                parent_ctx.children.push(id);
            }
        }
        id
    }

    /// Allocate a declaration and append it to its context's local list.
    pub fn alloc_declaration(&mut self, decl: Declaration) -> DeclarationId {
        let ctx = decl.context;
        let id = match self.free_declarations.pop() {
            Some(slot) => {
                self.declarations[slot] = Some(decl);
                DeclarationId::from_index(slot)
            }
            None => {
                let id = DeclarationId::from_index(self.declarations.len());
                self.declarations.push(Some(decl));
                id
            }
        };
        if let Some(c) = self.get_context_mut(ctx) {
            c.local_declarations.push(id);
        }
        id
    }

    // --- removal ---

    /// Remove a declaration, purging every use that references it first so no
    /// dangling use survives the removal.
    pub fn remove_declaration(&mut self, id: DeclarationId) {
        let Some(decl) = self.declarations.get_mut(id.index()).and_then(Option::take) else {
            return;
        };
        self.free_declarations.push(id.index());
        if let Some(ctx) = self.get_context_mut(decl.context) {
            ctx.local_declarations.retain(|d| *d != id);
        }
        if let Some(internal) = decl.internal_context {
            if let Some(ctx) = self.get_context_mut(internal) {
                if ctx.owner == Some(id) {
                    ctx.owner = None;
                }
            }
        }
        for slot in &mut self.contexts {
            if let Some(ctx) = slot {
                ctx.uses.retain(|u| u.declaration != id);
            }
        }
        for slot in &mut self.declarations {
            if let Some(other) = slot {
                if other.paired_declaration == Some(id) {
                    other.paired_declaration = None;
                }
            }
        }
    }

    /// Remove a context tree: its local declarations, child contexts, and
    /// every import edge pointing at any removed context.
    pub fn remove_context(&mut self, id: ContextId) {
        if id == self.root {
            self.clear_subtree(self.root);
            return;
        }
        let Some(ctx) = self.contexts.get_mut(id.index()).and_then(Option::take) else {
            return;
        };
        self.free_contexts.push(id.index());
        for decl in ctx.local_declarations.clone() {
            self.remove_declaration(decl);
        }
        for child in ctx.children.clone() {
            self.remove_context(child);
        }
        if let Some(p) = ctx.parent {
            if let Some(parent_ctx) = self.get_context_mut(p) {
                parent_ctx.children.retain(|c| *c != id);
            }
        }
        if let Some(owner) = ctx.owner {
            if let Some(decl) = self.get_declaration_mut(owner) {
                if decl.internal_context == Some(id) {
                    decl.internal_context = None;
                }
            }
        }
        for slot in &mut self.contexts {
            if let Some(other) = slot {
                other.imports.retain(|c| *c != id);
            }
        }
    }

    /// Delete all content under `ctx` (declarations, child contexts, uses)
    /// while keeping the context node itself. Used to wipe a document before
    /// a full rebuild.
    pub fn clear_subtree(&mut self, id: ContextId) {
        let Some(ctx) = self.get_context(id) else {
            return;
        };
        let decls = ctx.local_declarations.clone();
        let children = ctx.children.clone();
        for d in decls {
            self.remove_declaration(d);
        }
        for c in children {
            self.remove_context(c);
        }
        if let Some(ctx) = self.get_context_mut(id) {
            ctx.uses.clear();
        }
    }

    // --- lookup ---

    /// Scope path of a context (the identifiers of owning declarations from
    /// the root down).
    pub fn scope_identifier(&self, ctx: ContextId) -> QualifiedIdentifier {
        self.get_context(ctx)
            .map(|c| c.local_scope_identifier.clone())
            .unwrap_or_default()
    }

    /// Fully qualified identifier of a declaration.
    pub fn qualified_identifier(&self, decl: DeclarationId) -> QualifiedIdentifier {
        let Some(d) = self.get_declaration(decl) else {
            return QualifiedIdentifier::default();
        };
        self.scope_identifier(d.context).appended(d.identifier.clone())
    }

    /// Innermost context containing `pos`.
    pub fn find_context_at(&self, pos: Cursor) -> ContextId {
        let mut cur = self.root;
        'descend: loop {
            let Some(ctx) = self.get_context(cur) else {
                return cur;
            };
            for &child in &ctx.children {
                if let Some(c) = self.get_context(child) {
                    if c.range.contains(pos) {
                        cur = child;
                        continue 'descend;
                    }
                }
            }
            return cur;
        }
    }

    /// Local declarations of `ctx` matching `ident`, including declarations
    /// propagated up from child contexts (enum bodies). When the context's
    /// kind is position-filtered, only declarations starting before
    /// `position` are visible.
    pub fn find_local_declarations(
        &self,
        ctx: ContextId,
        ident: &Identifier,
        position: Option<Cursor>,
    ) -> Vec<DeclarationId> {
        let mut out = Vec::new();
        let Some(context) = self.get_context(ctx) else {
            return out;
        };
        let filtered = context.kind.position_filtered();
        let visible = |decl: &Declaration| -> bool {
            if !filtered {
                return true;
            }
            match position {
                Some(pos) => decl.range.start < pos,
                None => true,
            }
        };
        for &d in &context.local_declarations {
            if let Some(decl) = self.get_declaration(d) {
                if &decl.identifier == ident && visible(decl) {
                    out.push(d);
                }
            }
        }
        for &child in &context.children {
            let Some(child_ctx) = self.get_context(child) else {
                continue;
            };
            if !child_ctx.propagates_declarations {
                continue;
            }
            for &d in &child_ctx.local_declarations {
                if let Some(decl) = self.get_declaration(d) {
                    if &decl.identifier == ident && visible(decl) {
                        out.push(d);
                    }
                }
            }
        }
        out
    }

    /// Search one context and its import closure (not its structural
    /// parents). Import edges are followed in order; cycles are cut.
    fn search_context(
        &self,
        ctx: ContextId,
        ident: &Identifier,
        position: Option<Cursor>,
        visited: &mut HashSet<ContextId>,
    ) -> Vec<DeclarationId> {
        if !visited.insert(ctx) {
            return Vec::new();
        }
        let found = self.find_local_declarations(ctx, ident, position);
        if !found.is_empty() {
            return found;
        }
        let Some(context) = self.get_context(ctx) else {
            return Vec::new();
        };
        for &import in &context.imports {
            let found = self.search_context(import, ident, position, visited);
            if !found.is_empty() {
                return found;
            }
        }
        Vec::new()
    }

    /// Resolve an identifier path starting from `ctx`, walking outwards
    /// through structural parents. The innermost scope with a match wins.
    /// Multi-part paths resolve the head first and then descend through
    /// internal contexts (position rules no longer apply inside).
    pub fn find_declarations(
        &self,
        ctx: ContextId,
        qid: &QualifiedIdentifier,
        position: Option<Cursor>,
    ) -> Vec<DeclarationId> {
        let Some(head) = qid.first() else {
            return Vec::new();
        };
        let mut heads = Vec::new();
        let mut cur = Some(ctx);
        while let Some(c) = cur {
            let mut visited = HashSet::new();
            heads = self.search_context(c, head, position, &mut visited);
            if !heads.is_empty() {
                break;
            }
            cur = self.get_context(c).and_then(|x| x.parent);
        }
        if qid.count() == 1 {
            return heads;
        }
        let mut out = Vec::new();
        for h in heads {
            self.find_members(h, &qid.parts()[1..], &mut out);
        }
        out
    }

    fn find_members(&self, scope_decl: DeclarationId, parts: &[Identifier], out: &mut Vec<DeclarationId>) {
        let Some(decl) = self.get_declaration(scope_decl) else {
            return;
        };
        let Some(internal) = decl.internal_context else {
            return;
        };
        let Some((head, rest)) = parts.split_first() else {
            return;
        };
        let mut visited = HashSet::new();
        let found = self.search_context(internal, head, None, &mut visited);
        if rest.is_empty() {
            out.extend(found);
        } else {
            for f in found {
                self.find_members(f, rest, out);
            }
        }
    }

    /// Verify the containment invariant: a context's range contains the
    /// ranges of all its child contexts and local declarations. Returns a
    /// human-readable violation list; empty means the invariant holds.
    pub fn check_containment(&self) -> Vec<String> {
        let mut violations = Vec::new();
        for (id, ctx) in self.contexts() {
            for &child in &ctx.children {
                if let Some(c) = self.get_context(child) {
                    if !ctx.range.contains_range(&c.range) {
                        violations.push(format!(
                            "{:?} range {} does not contain child {:?} range {}",
                            id, ctx.range, child, c.range
                        ));
                    }
                }
            }
            for &d in &ctx.local_declarations {
                if let Some(decl) = self.get_declaration(d) {
                    if !ctx.range.contains_range(&decl.range) {
                        violations.push(format!(
                            "{:?} range {} does not contain declaration {:?} `{}` range {}",
                            id, ctx.range, d, decl.identifier, decl.range
                        ));
                    }
                }
            }
        }
        violations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::declaration::DeclarationKind;
    use pretty_assertions::assert_eq;

    fn instance(identifier: &str, range: Range, ctx: ContextId) -> Declaration {
        Declaration::new(
            Identifier::new(identifier),
            range,
            DeclarationKind::Instance { function: None },
            ctx,
        )
    }

    fn range(l0: u32, c0: u32, l1: u32, c1: u32) -> Range {
        Range::new(Cursor::new(l0, c0), Cursor::new(l1, c1))
    }

    #[test]
    fn fresh_top_context_is_empty() {
        let top = TopContext::new("test.c");
        assert!(top.is_empty());
        assert_eq!(top.context_count(), 1);
        assert_eq!(top.declaration_count(), 0);
    }

    #[test]
    fn removing_a_declaration_purges_its_uses() {
        let mut top = TopContext::new("test.c");
        let root = top.root();
        top.context_mut(root).range = range(0, 0, 100, 0);
        let decl = top.alloc_declaration(instance("x", range(1, 0, 1, 1), root));

        let block = top.alloc_context(DuContext::new(
            ContextKind::Other,
            range(2, 0, 5, 0),
            Some(root),
        ));
        top.context_mut(block).record_use(range(3, 4, 3, 5), decl);
        assert_eq!(top.use_count(), 1);

        top.remove_declaration(decl);
        assert_eq!(top.use_count(), 0);
        assert!(top.get_declaration(decl).is_none());
        assert!(top.context(root).local_declarations.is_empty());
    }

    #[test]
    fn removing_a_context_detaches_imports_and_owner() {
        let mut top = TopContext::new("test.c");
        let root = top.root();
        top.context_mut(root).range = range(0, 0, 100, 0);

        let owner = top.alloc_declaration(instance("f", range(1, 0, 1, 1), root));
        let params = top.alloc_context(DuContext::new(
            ContextKind::Function,
            range(1, 2, 1, 10),
            Some(root),
        ));
        top.context_mut(params).owner = Some(owner);
        top.declaration_mut(owner).internal_context = Some(params);

        let body = top.alloc_context(DuContext::new(
            ContextKind::Other,
            range(1, 11, 4, 0),
            Some(root),
        ));
        top.context_mut(body).add_import(params);

        top.remove_context(params);
        assert!(top.get_context(params).is_none());
        assert_eq!(top.declaration(owner).internal_context, None);
        assert!(top.context(body).imports.is_empty());
        assert_eq!(top.context(root).children, vec![body]);
    }

    #[test]
    fn removed_slots_are_recycled_by_later_allocations() {
        let mut top = TopContext::new("test.c");
        let root = top.root();
        top.context_mut(root).range = range(0, 0, 100, 0);

        let old = top.alloc_declaration(instance("a", range(1, 0, 1, 1), root));
        top.remove_declaration(old);
        let new = top.alloc_declaration(instance("b", range(1, 0, 1, 1), root));
        assert_eq!(new, old);
        assert_eq!(top.declaration_count(), 1);

        let block = top.alloc_context(DuContext::new(
            ContextKind::Other,
            range(2, 0, 3, 0),
            Some(root),
        ));
        top.remove_context(block);
        let again = top.alloc_context(DuContext::new(
            ContextKind::Other,
            range(4, 0, 5, 0),
            Some(root),
        ));
        assert_eq!(again, block);
        assert_eq!(top.context_count(), 2);
    }

    #[test]
    fn position_filtering_applies_in_block_scopes_only() {
        let mut top = TopContext::new("test.c");
        let root = top.root();
        top.context_mut(root).range = range(0, 0, 100, 0);

        let class = top.alloc_context(DuContext::new(
            ContextKind::Class,
            range(1, 0, 10, 0),
            Some(root),
        ));
        let member = top.alloc_declaration(instance("m", range(5, 2, 5, 3), class));
        // Member lookup before its declaration position still succeeds.
        assert_eq!(
            top.find_local_declarations(class, &Identifier::new("m"), Some(Cursor::new(2, 0))),
            vec![member]
        );

        let block = top.alloc_context(DuContext::new(
            ContextKind::Other,
            range(20, 0, 30, 0),
            Some(root),
        ));
        let local = top.alloc_declaration(instance("v", range(22, 4, 22, 5), block));
        assert_eq!(
            top.find_local_declarations(block, &Identifier::new("v"), Some(Cursor::new(21, 0))),
            Vec::<DeclarationId>::new()
        );
        assert_eq!(
            top.find_local_declarations(block, &Identifier::new("v"), Some(Cursor::new(25, 0))),
            vec![local]
        );
    }

    #[test]
    fn lookup_walks_imports_then_parents() {
        let mut top = TopContext::new("test.c");
        let root = top.root();
        top.context_mut(root).range = range(0, 0, 100, 0);

        let global = top.alloc_declaration(instance("g", range(0, 0, 0, 1), root));
        let params = top.alloc_context(DuContext::new(
            ContextKind::Function,
            range(2, 10, 2, 20),
            Some(root),
        ));
        let param = top.alloc_declaration(instance("p", range(2, 12, 2, 13), params));

        let body = top.alloc_context(DuContext::new(
            ContextKind::Other,
            range(3, 0, 9, 0),
            Some(root),
        ));
        top.context_mut(body).add_import(params);

        let pos = Some(Cursor::new(5, 0));
        assert_eq!(
            top.find_declarations(body, &QualifiedIdentifier::from("p"), pos),
            vec![param]
        );
        assert_eq!(
            top.find_declarations(body, &QualifiedIdentifier::from("g"), pos),
            vec![global]
        );
        assert!(top
            .find_declarations(body, &QualifiedIdentifier::from("missing"), pos)
            .is_empty());
    }

    #[test]
    fn multi_part_lookup_descends_internal_contexts() {
        let mut top = TopContext::new("test.c");
        let root = top.root();
        top.context_mut(root).range = range(0, 0, 100, 0);

        let strukt = top.alloc_declaration(Declaration::new(
            Identifier::new("foo"),
            range(1, 7, 1, 10),
            DeclarationKind::Type {
                is_forward: false,
                base_classes: Vec::new(),
            },
            root,
        ));
        let members = top.alloc_context(DuContext::new(
            ContextKind::Class,
            range(1, 11, 4, 1),
            Some(root),
        ));
        top.context_mut(members).owner = Some(strukt);
        top.declaration_mut(strukt).internal_context = Some(members);
        let field = top.alloc_declaration(instance("bb", range(2, 4, 2, 6), members));

        assert_eq!(
            top.find_declarations(root, &QualifiedIdentifier::from("foo::bb"), None),
            vec![field]
        );
    }

    #[test]
    fn containment_checker_reports_violations() {
        let mut top = TopContext::new("test.c");
        let root = top.root();
        top.context_mut(root).range = range(0, 0, 10, 0);
        assert!(top.check_containment().is_empty());

        top.alloc_declaration(instance("far", range(50, 0, 50, 3), root));
        assert_eq!(top.check_containment().len(), 1);
    }
}
