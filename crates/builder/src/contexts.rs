//! Context-stack half of the builder: open/close, reuse matching, and the
//! tentative (probe-and-rollback) machinery for ambiguous declarators.

use crate::builder::DuBuilder;
use duchain::{write_lock, ContextId, ContextKind, DeclarationId, DuContext, Identifier, Range};
use std::sync::Arc;

/// Snapshot of builder state taken by [`DuBuilder::begin_tentative`]. On
/// rollback, objects created since the snapshot are removed from the arena
/// and the stacks are restored; on commit the snapshot is simply dropped.
#[derive(Debug, Default)]
pub(crate) struct Tentative {
    pub(crate) context_depth: usize,
    pub(crate) declaration_depth: usize,
    pub(crate) pending_imports_len: usize,
    pub(crate) created_contexts: Vec<ContextId>,
    pub(crate) created_declarations: Vec<DeclarationId>,
    pub(crate) encountered_contexts: Vec<ContextId>,
    pub(crate) encountered_declarations: Vec<DeclarationId>,
}

impl<'a> DuBuilder<'a> {
    pub(crate) fn current_context(&self) -> ContextId {
        *self
            .context_stack
            .last()
            .expect("context stack holds at least the root during traversal")
    }

    /// Open a context: either reuse a prior-revision child of the current
    /// context whose translated range and kind match, or allocate a new one
    /// parented to the top of the stack. Pending import edges accumulated
    /// since the last open attach to the context made current here.
    pub(crate) fn open_context(
        &mut self,
        range: Range,
        kind: ContextKind,
        identifier: Option<Identifier>,
    ) -> ContextId {
        let top_arc = Arc::clone(&self.top);
        let parent = self.current_context();
        let mut created = false;
        let id = {
            let mut top = write_lock(&top_arc);
            let mut found = None;
            if self.recompiling {
                let children = top.context(parent).children.clone();
                for child in children {
                    if self.encountered_contexts.contains(&child) {
                        continue;
                    }
                    let Some(ctx) = top.get_context(child) else {
                        continue;
                    };
                    if ctx.kind != kind {
                        continue;
                    }
                    // Ranges of prior-revision contexts translate forward
                    // before comparison; translation failure means the edit
                    // destroyed the anchor, so the subtree rebuilds.
                    let Some(translated) = self.translate_old_range(ctx.range) else {
                        continue;
                    };
                    if translated == range {
                        found = Some(child);
                        break;
                    }
                }
            }
            // The scope path is recomputed even on reuse: the owning
            // declaration may have been renamed in place.
            let scope = match &identifier {
                Some(name) => top.scope_identifier(parent).appended(name.clone()),
                None => top.scope_identifier(parent),
            };
            match found {
                Some(child) => {
                    let ctx = top.context_mut(child);
                    ctx.range = range;
                    ctx.local_scope_identifier = scope;
                    // Uses are re-resolved every pass.
                    ctx.uses.clear();
                    child
                }
                None => {
                    created = true;
                    let mut ctx = DuContext::new(kind, range, Some(parent));
                    ctx.local_scope_identifier = scope;
                    top.alloc_context(ctx)
                }
            }
        };
        self.note_context(id, created);
        if !self.pending_imports.is_empty() {
            let imports: Vec<ContextId> = self.pending_imports.drain(..).collect();
            let mut top = write_lock(&top_arc);
            for import in imports {
                if import != id {
                    top.context_mut(id).add_import(import);
                }
            }
        }
        self.context_stack.push(id);
        self.notify_enter_scope(id);
        id
    }

    /// Pop the current context. Import edges still pending (collected since
    /// the open and not consumed by a nested context) attach to the popped
    /// context.
    pub(crate) fn close_context(&mut self) {
        let Some(id) = self.context_stack.pop() else {
            return;
        };
        if !self.pending_imports.is_empty() {
            let imports: Vec<ContextId> = self.pending_imports.drain(..).collect();
            let top_arc = Arc::clone(&self.top);
            let mut top = write_lock(&top_arc);
            for import in imports {
                if import != id {
                    top.context_mut(id).add_import(import);
                }
            }
        }
        self.notify_leave_scope(id);
    }

    /// Queue an import edge for the next context made current.
    pub(crate) fn add_pending_import(&mut self, ctx: ContextId) {
        self.pending_imports.push(ctx);
    }

    pub(crate) fn note_context(&mut self, id: ContextId, created: bool) {
        let fresh = self.encountered_contexts.insert(id);
        if let Some(t) = self.tentative.as_mut() {
            if fresh {
                t.encountered_contexts.push(id);
            }
            if created {
                t.created_contexts.push(id);
            }
        }
    }

    pub(crate) fn note_declaration(&mut self, id: DeclarationId, created: bool) {
        let fresh = self.encountered_declarations.insert(id);
        if let Some(t) = self.tentative.as_mut() {
            if fresh {
                t.encountered_declarations.push(id);
            }
            if created {
                t.created_declarations.push(id);
            }
        }
    }

    /// Begin a speculative build section. Nesting is not supported; the
    /// single caller is the function-vs-variable declarator probe.
    pub(crate) fn begin_tentative(&mut self) {
        debug_assert!(self.tentative.is_none(), "tentative sections do not nest");
        self.tentative = Some(Tentative {
            context_depth: self.context_stack.len(),
            declaration_depth: self.declaration_stack.len(),
            pending_imports_len: self.pending_imports.len(),
            ..Tentative::default()
        });
    }

    /// Keep everything built since [`begin_tentative`](Self::begin_tentative).
    pub(crate) fn commit_tentative(&mut self) {
        self.tentative = None;
    }

    /// Discard everything built since [`begin_tentative`](Self::begin_tentative):
    /// created arena objects are removed, reused objects are un-encountered
    /// (the end-of-pass cleanup collects them unless matched again), and the
    /// stacks are restored.
    pub(crate) fn rollback_tentative(&mut self) {
        let Some(t) = self.tentative.take() else {
            return;
        };
        self.context_stack.truncate(t.context_depth);
        self.declaration_stack.truncate(t.declaration_depth);
        self.pending_imports.truncate(t.pending_imports_len);
        {
            let top_arc = Arc::clone(&self.top);
            let mut top = write_lock(&top_arc);
            for decl in t.created_declarations.iter().rev() {
                top.remove_declaration(*decl);
            }
            for ctx in t.created_contexts.iter().rev() {
                top.remove_context(*ctx);
            }
        }
        for ctx in &t.encountered_contexts {
            self.encountered_contexts.remove(ctx);
        }
        for decl in &t.encountered_declarations {
            self.encountered_declarations.remove(decl);
        }
    }
}
