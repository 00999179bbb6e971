use crate::cursor::Range;
use crate::handle::{ContextId, DeclarationId};
use crate::identifier::{Identifier, QualifiedIdentifier};
use crate::types::DuType;

/// Payload for function-like declarations.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FunctionData {
    /// Default argument spellings, one slot per parameter.
    pub parameter_defaults: Vec<Option<String>>,
}

/// Closed, tagged declaration kind. Kind-specific payload lives on the
/// variant, so consumers dispatch by matching instead of downcasting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeclarationKind {
    /// Introduces a new named type (struct, union, enum).
    Type {
        is_forward: bool,
        base_classes: Vec<DeclarationId>,
    },
    /// A value-level entity: variable, field, parameter, enumerator, or
    /// function (functions carry a payload).
    Instance { function: Option<FunctionData> },
    /// A namespace alias; carried for dialects with namespaces.
    NamespaceAlias { target: QualifiedIdentifier },
    /// A typedef; `target` is the declaration of the aliased type, when the
    /// aliased type is itself a declared one.
    Alias { target: Option<DeclarationId> },
}

/// Kind tag without payload, used for reuse-matching across rebuilds.
/// Forward declarations and functions match only their own shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeclarationKindTag {
    Type,
    ForwardType,
    Instance,
    Function,
    NamespaceAlias,
    Alias,
}

impl DeclarationKind {
    pub fn tag(&self) -> DeclarationKindTag {
        match self {
            DeclarationKind::Type { is_forward: true, .. } => DeclarationKindTag::ForwardType,
            DeclarationKind::Type { .. } => DeclarationKindTag::Type,
            DeclarationKind::Instance { function: Some(_) } => DeclarationKindTag::Function,
            DeclarationKind::Instance { .. } => DeclarationKindTag::Instance,
            DeclarationKind::NamespaceAlias { .. } => DeclarationKindTag::NamespaceAlias,
            DeclarationKind::Alias { .. } => DeclarationKindTag::Alias,
        }
    }
}

/// A named semantic entity with a defining range.
///
/// All cross-references (parent context, internal context, pairing) are
/// arena handles resolved through the owning [`TopContext`](crate::TopContext).
#[derive(Debug, Clone)]
pub struct Declaration {
    pub identifier: Identifier,
    /// Range of the name token, in the top context's revision space.
    pub range: Range,
    pub kind: DeclarationKind,
    pub du_type: Option<DuType>,
    /// Whether this occurrence carries the body/storage (function definition,
    /// non-extern variable).
    pub is_definition: bool,
    /// The context this declaration is local to.
    pub context: ContextId,
    /// For scope-opening declarations: the context whose owner is this
    /// declaration.
    pub internal_context: Option<ContextId>,
    /// Definition↔prototype pairing and forward→real resolution.
    pub paired_declaration: Option<DeclarationId>,
}

impl Declaration {
    pub fn new(identifier: Identifier, range: Range, kind: DeclarationKind, context: ContextId) -> Self {
        Self {
            identifier,
            range,
            kind,
            du_type: None,
            is_definition: false,
            context,
            internal_context: None,
            paired_declaration: None,
        }
    }

    pub fn kind_tag(&self) -> DeclarationKindTag {
        self.kind.tag()
    }

    pub fn is_forward_declaration(&self) -> bool {
        matches!(self.kind, DeclarationKind::Type { is_forward: true, .. })
    }

    pub fn is_function(&self) -> bool {
        matches!(self.kind, DeclarationKind::Instance { function: Some(_) })
    }

    pub fn is_type(&self) -> bool {
        matches!(self.kind, DeclarationKind::Type { .. })
    }

    /// Clear the fields a rebuild refills, keeping identity-bearing state
    /// (identifier, context, internal context) intact.
    pub fn reset_for_rebuild(&mut self, kind: DeclarationKind) {
        self.kind = kind;
        self.du_type = None;
        self.is_definition = false;
        self.paired_declaration = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn kind_tags_separate_forward_and_function_shapes() {
        let forward = DeclarationKind::Type {
            is_forward: true,
            base_classes: Vec::new(),
        };
        let class = DeclarationKind::Type {
            is_forward: false,
            base_classes: Vec::new(),
        };
        let var = DeclarationKind::Instance { function: None };
        let func = DeclarationKind::Instance {
            function: Some(FunctionData::default()),
        };
        assert_eq!(forward.tag(), DeclarationKindTag::ForwardType);
        assert_eq!(class.tag(), DeclarationKindTag::Type);
        assert_eq!(var.tag(), DeclarationKindTag::Instance);
        assert_eq!(func.tag(), DeclarationKindTag::Function);
        assert_ne!(forward.tag(), class.tag());
    }

    #[test]
    fn reset_keeps_identity_clears_mutable_state() {
        let ctx = ContextId::from_index(0);
        let mut decl = Declaration::new(
            Identifier::new("f"),
            Range::default(),
            DeclarationKind::Instance {
                function: Some(FunctionData::default()),
            },
            ctx,
        );
        decl.is_definition = true;
        decl.du_type = Some(DuType::integral("int"));
        decl.paired_declaration = Some(DeclarationId::from_index(9));
        decl.internal_context = Some(ContextId::from_index(2));

        decl.reset_for_rebuild(DeclarationKind::Instance { function: None });
        assert_eq!(decl.du_type, None);
        assert!(!decl.is_definition);
        assert_eq!(decl.paired_declaration, None);
        // Identity-bearing links survive.
        assert_eq!(decl.internal_context, Some(ContextId::from_index(2)));
        assert_eq!(decl.identifier.as_str(), "f");
    }
}
