use crate::cursor::Range;
use crate::handle::{ContextId, DeclarationId};
use crate::identifier::QualifiedIdentifier;

/// Lexical/semantic scope tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextKind {
    Global,
    Namespace,
    Class,
    /// Function parameter scope; the body context imports it.
    Function,
    Template,
    /// Block scope and everything else.
    Other,
}

impl ContextKind {
    /// Whether declarations in this scope feed the globally searchable symbol
    /// table. Adding a new symbol to such a scope makes a rebuild
    /// structurally significant for importers.
    pub fn in_symbol_table(self) -> bool {
        matches!(
            self,
            ContextKind::Global | ContextKind::Namespace | ContextKind::Class
        )
    }

    /// Whether lookup in this scope applies declared-before-use filtering.
    /// Class and namespace members are order-independent.
    pub fn position_filtered(self) -> bool {
        !matches!(self, ContextKind::Class | ContextKind::Namespace)
    }
}

/// A recorded reference: source range pointing at a declaration of the same
/// top context, by handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Use {
    pub range: Range,
    pub declaration: DeclarationId,
}

/// One scope node in the index graph.
///
/// Structural parentage is single; import edges add lookup-only parents
/// (base classes, namespaces, parameter contexts) without ownership.
#[derive(Debug, Clone)]
pub struct DuContext {
    pub kind: ContextKind,
    pub range: Range,
    pub parent: Option<ContextId>,
    /// Back-reference to the declaration that opens this scope, if any.
    pub owner: Option<DeclarationId>,
    /// Structural children, in traversal order.
    pub children: Vec<ContextId>,
    /// Imported parent contexts, in import order.
    pub imports: Vec<ContextId>,
    /// Local declarations, insertion order preserved.
    pub local_declarations: Vec<DeclarationId>,
    pub uses: Vec<Use>,
    /// Scope path of this context (owners' identifiers joined).
    pub local_scope_identifier: QualifiedIdentifier,
    /// Whether local declarations are visible from the surrounding scope
    /// (enum bodies).
    pub propagates_declarations: bool,
}

impl DuContext {
    pub fn new(kind: ContextKind, range: Range, parent: Option<ContextId>) -> Self {
        Self {
            kind,
            range,
            parent,
            owner: None,
            children: Vec::new(),
            imports: Vec::new(),
            local_declarations: Vec::new(),
            uses: Vec::new(),
            local_scope_identifier: QualifiedIdentifier::default(),
            propagates_declarations: false,
        }
    }

    /// Append an import edge, keeping the list duplicate-free and ordered.
    pub fn add_import(&mut self, ctx: ContextId) {
        if !self.imports.contains(&ctx) {
            self.imports.push(ctx);
        }
    }

    pub fn record_use(&mut self, range: Range, declaration: DeclarationId) -> usize {
        self.uses.push(Use { range, declaration });
        self.uses.len() - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn symbol_table_scopes() {
        assert!(ContextKind::Global.in_symbol_table());
        assert!(ContextKind::Class.in_symbol_table());
        assert!(!ContextKind::Function.in_symbol_table());
        assert!(!ContextKind::Other.in_symbol_table());
    }

    #[test]
    fn position_filtering_skips_member_scopes() {
        assert!(ContextKind::Global.position_filtered());
        assert!(ContextKind::Other.position_filtered());
        assert!(!ContextKind::Class.position_filtered());
        assert!(!ContextKind::Namespace.position_filtered());
    }

    #[test]
    fn imports_stay_ordered_and_unique() {
        let mut ctx = DuContext::new(ContextKind::Other, Range::default(), None);
        let a = ContextId::from_index(1);
        let b = ContextId::from_index(2);
        ctx.add_import(a);
        ctx.add_import(b);
        ctx.add_import(a);
        assert_eq!(ctx.imports, vec![a, b]);
    }
}
