use crate::handle::DeclarationId;
use crate::identifier::QualifiedIdentifier;

/// Closed type representation attached to declarations.
///
/// Identified variants (`Structure`, `Enumeration`, `Alias`) reference the
/// declaration that introduced the type by handle, never by ownership, so the
/// declaration can be rebuilt without dangling the type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DuType {
    /// Builtin scalar spelling, e.g. `int`, `unsigned long`.
    Integral(String),
    Pointer(Box<DuType>),
    Array(Box<DuType>),
    Function {
        return_type: Box<DuType>,
        parameters: Vec<DuType>,
    },
    /// A struct or union type, identified by its declaration.
    Structure { declaration: DeclarationId },
    /// An enum type, identified by its declaration.
    Enumeration { declaration: DeclarationId },
    /// A typedef reference, identified by the alias declaration.
    Alias { declaration: DeclarationId },
    /// A named type that could not be resolved yet.
    Delayed(QualifiedIdentifier),
    Invalid,
}

impl DuType {
    pub fn integral(spelling: &str) -> Self {
        DuType::Integral(spelling.to_string())
    }

    /// The declaration this type is identified by, if any.
    pub fn identified_declaration(&self) -> Option<DeclarationId> {
        match self {
            DuType::Structure { declaration }
            | DuType::Enumeration { declaration }
            | DuType::Alias { declaration } => Some(*declaration),
            _ => None,
        }
    }

    pub fn is_function(&self) -> bool {
        matches!(self, DuType::Function { .. })
    }

    /// Argument count for function types; `None` otherwise.
    pub fn argument_count(&self) -> Option<usize> {
        match self {
            DuType::Function { parameters, .. } => Some(parameters.len()),
            _ => None,
        }
    }

    /// Strip pointer/array wrappers down to the element type.
    pub fn base_type(&self) -> &DuType {
        match self {
            DuType::Pointer(inner) | DuType::Array(inner) => inner.base_type(),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn identified_declaration_covers_named_types() {
        let d = DeclarationId::from_index(3);
        assert_eq!(
            DuType::Structure { declaration: d }.identified_declaration(),
            Some(d)
        );
        assert_eq!(
            DuType::Alias { declaration: d }.identified_declaration(),
            Some(d)
        );
        assert_eq!(DuType::integral("int").identified_declaration(), None);
    }

    #[test]
    fn base_type_strips_wrappers() {
        let ty = DuType::Pointer(Box::new(DuType::Array(Box::new(DuType::integral("char")))));
        assert_eq!(ty.base_type(), &DuType::integral("char"));
    }

    #[test]
    fn function_argument_count() {
        let ty = DuType::Function {
            return_type: Box::new(DuType::integral("int")),
            parameters: vec![DuType::integral("int"), DuType::integral("char")],
        };
        assert_eq!(ty.argument_count(), Some(2));
        assert_eq!(DuType::Invalid.argument_count(), None);
    }
}
