//! Declaration half of the builder: reuse matching against the prior
//! revision, type-vs-instance classification on close, definition pairing,
//! and forward-declaration resolution.

use crate::builder::DuBuilder;
use duchain::{
    read_lock, write_lock, Declaration, DeclarationId, DeclarationKind, DeclarationKindTag,
    DuType, FunctionData, Identifier, QualifiedIdentifier, Range,
};
use std::sync::Arc;

/// What the syntax says the declaration is, before close-time classification
/// refines it against the built type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DeclarationShape {
    Variable,
    Parameter,
    Enumerator,
    Function,
    Class { forward: bool },
    Enum,
    Alias,
}

impl DeclarationShape {
    fn initial_kind(self) -> DeclarationKind {
        match self {
            DeclarationShape::Variable
            | DeclarationShape::Parameter
            | DeclarationShape::Enumerator => DeclarationKind::Instance { function: None },
            DeclarationShape::Function => DeclarationKind::Instance {
                function: Some(FunctionData::default()),
            },
            DeclarationShape::Class { forward } => DeclarationKind::Type {
                is_forward: forward,
                base_classes: Vec::new(),
            },
            DeclarationShape::Enum => DeclarationKind::Type {
                is_forward: false,
                base_classes: Vec::new(),
            },
            DeclarationShape::Alias => DeclarationKind::Alias { target: None },
        }
    }

    fn match_tag(self) -> DeclarationKindTag {
        match self {
            DeclarationShape::Variable
            | DeclarationShape::Parameter
            | DeclarationShape::Enumerator => DeclarationKindTag::Instance,
            DeclarationShape::Function => DeclarationKindTag::Function,
            DeclarationShape::Class { forward: true } => DeclarationKindTag::ForwardType,
            DeclarationShape::Class { forward: false } | DeclarationShape::Enum => {
                DeclarationKindTag::Type
            }
            DeclarationShape::Alias => DeclarationKindTag::Alias,
        }
    }

    fn unique_prefix(self) -> &'static str {
        match self {
            DeclarationShape::Enum => "enum",
            DeclarationShape::Class { .. } => "struct",
            _ => "decl",
        }
    }
}

/// Matching identity of identifiers across revisions: equal names match, and
/// two generated (anonymous) names match each other regardless of counter.
fn identifier_compatible(new: &Identifier, old: &Identifier) -> bool {
    new == old || (new.is_unique() && old.is_unique())
}

impl<'a> DuBuilder<'a> {
    pub(crate) fn current_declaration(&self) -> Option<DeclarationId> {
        self.declaration_stack.last().copied()
    }

    /// Open a declaration in the current context. When recompiling, a
    /// prior-revision declaration of the same context is reused if its
    /// translated range, identifier, and kind tag all match; failing that, a
    /// second pass matches on identifier and kind tag alone so that an edit
    /// which only moves a declaration keeps its identity.
    pub(crate) fn open_declaration(
        &mut self,
        identifier: Option<Identifier>,
        name_range: Option<Range>,
        node_range: Range,
        shape: DeclarationShape,
    ) -> DeclarationId {
        let range = name_range.unwrap_or_else(|| node_range.collapse_to_start());
        let local = identifier.unwrap_or_else(|| Identifier::unique(shape.unique_prefix()));
        let top_arc = Arc::clone(&self.top);
        let parent = self.current_context();
        let mut created = false;
        let id = {
            let mut top = write_lock(&top_arc);
            let mut found = None;
            if self.recompiling {
                let candidates = top.context(parent).local_declarations.clone();
                for &cand in &candidates {
                    if self.encountered_declarations.contains(&cand) {
                        continue;
                    }
                    let Some(dec) = top.get_declaration(cand) else {
                        continue;
                    };
                    if dec.kind_tag() != shape.match_tag()
                        || !identifier_compatible(&local, &dec.identifier)
                    {
                        continue;
                    }
                    let Some(translated) = self.translate_old_range(dec.range) else {
                        continue;
                    };
                    if translated == range {
                        found = Some(cand);
                        break;
                    }
                }
                if found.is_none() {
                    for &cand in &candidates {
                        if self.encountered_declarations.contains(&cand) {
                            continue;
                        }
                        let Some(dec) = top.get_declaration(cand) else {
                            continue;
                        };
                        if dec.kind_tag() == shape.match_tag()
                            && identifier_compatible(&local, &dec.identifier)
                        {
                            found = Some(cand);
                            break;
                        }
                    }
                }
                if let Some(cand) = found {
                    let dec = top.declaration_mut(cand);
                    dec.range = range;
                    dec.identifier = local.clone();
                    dec.reset_for_rebuild(shape.initial_kind());
                }
            }
            match found {
                Some(cand) => cand,
                None => {
                    created = true;
                    if top.context(parent).kind.in_symbol_table() {
                        self.structurally_significant = true;
                    }
                    top.alloc_declaration(Declaration::new(local, range, shape.initial_kind(), parent))
                }
            }
        };
        self.note_declaration(id, created);
        self.declaration_stack.push(id);
        id
    }

    /// Close the current declaration, assigning `last_type` and classifying
    /// the kind from it: a type that identifies the declaration itself (and
    /// is not a function) makes it a type declaration, everything else an
    /// instance. `force_instance` pins enumerators, whose type identifies
    /// the surrounding enum rather than themselves.
    pub(crate) fn close_declaration(&mut self, force_instance: bool) {
        let Some(id) = self.declaration_stack.pop() else {
            return;
        };
        let ty = self.last_type.clone();
        {
            let top_arc = Arc::clone(&self.top);
            let mut top = write_lock(&top_arc);
            let dec = top.declaration_mut(id);
            match ty {
                Some(ty) => {
                    let identifies_self = ty.identified_declaration() == Some(id);
                    let is_function = ty.is_function();
                    match &mut dec.kind {
                        DeclarationKind::Alias { .. } | DeclarationKind::NamespaceAlias { .. } => {}
                        kind => {
                            if !force_instance
                                && !is_function
                                && (identifies_self
                                    || matches!(kind, DeclarationKind::Type { is_forward: true, .. }))
                            {
                                if !matches!(kind, DeclarationKind::Type { .. }) {
                                    *kind = DeclarationKind::Type {
                                        is_forward: false,
                                        base_classes: Vec::new(),
                                    };
                                }
                            } else {
                                match kind {
                                    DeclarationKind::Instance { function } => {
                                        if is_function && function.is_none() {
                                            *function = Some(FunctionData::default());
                                        }
                                    }
                                    _ => {
                                        *kind = DeclarationKind::Instance {
                                            function: if is_function {
                                                Some(FunctionData::default())
                                            } else {
                                                None
                                            },
                                        };
                                    }
                                }
                            }
                        }
                    }
                    dec.du_type = Some(ty);
                }
                None => dec.du_type = None,
            }
        }
        self.notify_declaration(id);
    }

    /// Pair a function definition with an earlier prototype of the same
    /// name. Candidates are tried in three cycles of loosening strictness:
    /// exact signature, then same argument count, then any unclaimed
    /// prototype. A prototype whose existing pairing was re-encountered this
    /// pass is never stolen.
    pub(crate) fn pair_function_definition(&mut self, definition: DeclarationId, fn_type: &DuType) {
        let top_arc = Arc::clone(&self.top);
        let chosen = {
            let top = read_lock(&top_arc);
            let dec = top.declaration(definition);
            let qid = QualifiedIdentifier::from_identifier(dec.identifier.clone());
            let position = dec.range.start;
            let candidates = top.find_declarations(dec.context, &qid, Some(position));
            let mut chosen = None;
            'cycles: for cycle in 0..3 {
                for &cand in &candidates {
                    if cand == definition {
                        continue;
                    }
                    let Some(other) = top.get_declaration(cand) else {
                        continue;
                    };
                    if other.is_definition || other.is_forward_declaration() || !other.is_function()
                    {
                        continue;
                    }
                    let matches = match cycle {
                        0 => other.du_type.as_ref() == Some(fn_type),
                        1 => {
                            other.du_type.as_ref().and_then(DuType::argument_count)
                                == fn_type.argument_count()
                        }
                        _ => true,
                    };
                    if !matches {
                        continue;
                    }
                    if let Some(existing) = other.paired_declaration {
                        if existing != definition
                            && self.encountered_declarations.contains(&existing)
                        {
                            continue;
                        }
                    }
                    chosen = Some(cand);
                    break 'cycles;
                }
            }
            chosen
        };
        if let Some(prototype) = chosen {
            let mut top = write_lock(&top_arc);
            top.declaration_mut(definition).paired_declaration = Some(prototype);
            top.declaration_mut(prototype).paired_declaration = Some(definition);
        }
    }

    /// Point forward declarations visible from the current context at the
    /// real type declaration they announce. Qualified identifiers compare
    /// case-insensitively.
    pub(crate) fn resolve_forward_declarations(&mut self, real: DeclarationId) {
        let top_arc = Arc::clone(&self.top);
        let forwards = {
            let top = read_lock(&top_arc);
            let real_qid = top.qualified_identifier(real);
            let mut forwards = Vec::new();
            let mut ctx = Some(self.current_context());
            while let Some(current) = ctx {
                let Some(context) = top.get_context(current) else {
                    break;
                };
                for &local in &context.local_declarations {
                    if local == real {
                        continue;
                    }
                    let Some(dec) = top.get_declaration(local) else {
                        continue;
                    };
                    if dec.is_forward_declaration()
                        && top.qualified_identifier(local).eq_ignore_case(&real_qid)
                    {
                        forwards.push(local);
                    }
                }
                ctx = context.parent;
            }
            forwards
        };
        if !forwards.is_empty() {
            let mut top = write_lock(&top_arc);
            for forward in forwards {
                top.declaration_mut(forward).paired_declaration = Some(real);
            }
        }
    }
}
