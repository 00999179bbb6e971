//! Use recording and the small expression typing needed for member access
//! through `.` and `->`.

use crate::builder::DuBuilder;
use crate::error::Result;
use crate::session::{node_text, range_of};
use duchain::{
    read_lock, write_lock, ContextId, DeclarationId, DeclarationKind, DuType, Identifier, Problem,
    QualifiedIdentifier, Range, TopContext,
};
use std::sync::Arc;
use tree_sitter::Node;

impl<'a> DuBuilder<'a> {
    /// Resolve an identifier against the current context at its own position
    /// and record a use on success. Unresolved names become hint-severity
    /// problems when requested; they are never errors.
    pub(crate) fn record_reference(
        &mut self,
        identifier: &Identifier,
        range: Range,
    ) -> Option<DeclarationId> {
        let top_arc = Arc::clone(&self.top);
        let ctx = self.current_context();
        let found = {
            let top = read_lock(&top_arc);
            let qid = QualifiedIdentifier::from_identifier(identifier.clone());
            top.find_declarations(ctx, &qid, Some(range.start))
                .first()
                .copied()
        };
        match found {
            Some(declaration) => {
                self.record_use(ctx, range, declaration);
                Some(declaration)
            }
            None => {
                log::debug!("unresolved reference `{identifier}` at {range}");
                if self.input.report_unresolved {
                    let mut top = write_lock(&top_arc);
                    top.problems
                        .push(Problem::hint(format!("unresolved reference: {identifier}"), range));
                }
                None
            }
        }
    }

    pub(crate) fn record_use(&mut self, ctx: ContextId, range: Range, declaration: DeclarationId) {
        let top_arc = Arc::clone(&self.top);
        let index = {
            let mut top = write_lock(&top_arc);
            top.context_mut(ctx).record_use(range, declaration)
        };
        self.notify_reference(ctx, index);
    }

    pub(crate) fn visit_identifier_reference(&mut self, node: Node<'_>) {
        // Declaration names were already consumed by their declarations.
        if self.node_declarations.contains_key(&node.id()) {
            return;
        }
        let identifier = Identifier::new(node_text(node, self.input.content));
        if identifier.as_str().is_empty() {
            return;
        }
        self.record_reference(&identifier, range_of(node));
    }

    /// `expr.field` and `expr->field`: the object expression is visited
    /// normally, then the field resolves inside the member context of the
    /// object's structure type.
    pub(crate) fn visit_field_expression(&mut self, node: Node<'_>) -> Result<()> {
        let argument = node.child_by_field_name("argument");
        let field = node.child_by_field_name("field");
        if let Some(argument) = argument {
            self.visit_node(argument)?;
        }
        let Some(field) = field else {
            return Ok(());
        };
        let identifier = Identifier::new(node_text(field, self.input.content));
        let top_arc = Arc::clone(&self.top);
        let member = {
            let top = read_lock(&top_arc);
            argument
                .and_then(|arg| self.expression_type(&top, arg))
                .and_then(|ty| self.member_declaration(&top, &ty, &identifier))
        };
        match member {
            Some(declaration) => {
                let ctx = self.current_context();
                self.record_use(ctx, range_of(field), declaration);
            }
            None => {
                log::debug!("unresolved member `{identifier}` at {}", range_of(field));
                if self.input.report_unresolved {
                    let mut top = write_lock(&top_arc);
                    top.problems.push(Problem::hint(
                        format!("unresolved member: {identifier}"),
                        range_of(field),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Best-effort type of an expression, for member resolution. Read-only
    /// against the store; anything unknown is `None`.
    pub(crate) fn expression_type(&self, top: &TopContext, node: Node<'_>) -> Option<DuType> {
        match node.kind() {
            "identifier" => {
                let identifier = Identifier::new(node_text(node, self.input.content));
                let qid = QualifiedIdentifier::from_identifier(identifier);
                let found = top
                    .find_declarations(self.current_context(), &qid, Some(range_of(node).start));
                let declaration = found.first()?;
                top.get_declaration(*declaration)?.du_type.clone()
            }
            "field_expression" => {
                let argument = node.child_by_field_name("argument")?;
                let field = node.child_by_field_name("field")?;
                let ty = self.expression_type(top, argument)?;
                let identifier = Identifier::new(node_text(field, self.input.content));
                let member = self.member_declaration(top, &ty, &identifier)?;
                top.get_declaration(member)?.du_type.clone()
            }
            "call_expression" => {
                let function = node.child_by_field_name("function")?;
                match self.expression_type(top, function)? {
                    DuType::Function { return_type, .. } => Some(*return_type),
                    DuType::Pointer(inner) => match *inner {
                        DuType::Function { return_type, .. } => Some(*return_type),
                        _ => None,
                    },
                    _ => None,
                }
            }
            "parenthesized_expression" => {
                let mut cursor = node.walk();
                let inner = node.named_children(&mut cursor).next()?;
                self.expression_type(top, inner)
            }
            "pointer_expression" => {
                let argument = node.child_by_field_name("argument")?;
                let ty = self.expression_type(top, argument)?;
                let operator = node.child_by_field_name("operator")?;
                match node_text(operator, self.input.content) {
                    "*" => match ty {
                        DuType::Pointer(inner) | DuType::Array(inner) => Some(*inner),
                        _ => None,
                    },
                    "&" => Some(DuType::Pointer(Box::new(ty))),
                    _ => None,
                }
            }
            "subscript_expression" => {
                let argument = node.child_by_field_name("argument")?;
                match self.expression_type(top, argument)? {
                    DuType::Pointer(inner) | DuType::Array(inner) => Some(*inner),
                    _ => None,
                }
            }
            "number_literal" => Some(DuType::integral("int")),
            "char_literal" => Some(DuType::integral("char")),
            "string_literal" => Some(DuType::Pointer(Box::new(DuType::integral("char")))),
            _ => None,
        }
    }

    fn member_declaration(
        &self,
        top: &TopContext,
        ty: &DuType,
        identifier: &Identifier,
    ) -> Option<DeclarationId> {
        let ctx = self.member_context(top, ty)?;
        top.find_local_declarations(ctx, identifier, None)
            .first()
            .copied()
    }

    /// Chase a type down to the internal context holding its members:
    /// pointers and arrays strip, forward declarations follow their resolved
    /// pairing, aliases follow their target. Bounded to cut alias cycles.
    fn member_context(&self, top: &TopContext, ty: &DuType) -> Option<ContextId> {
        let mut declaration = ty.base_type().identified_declaration()?;
        for _ in 0..16 {
            let dec = top.get_declaration(declaration)?;
            if dec.is_forward_declaration() {
                declaration = dec.paired_declaration?;
                continue;
            }
            if let DeclarationKind::Alias { target: Some(target) } = dec.kind {
                declaration = target;
                continue;
            }
            if let Some(internal) = dec.internal_context {
                return Some(internal);
            }
            declaration = dec.du_type.as_ref()?.base_type().identified_declaration()?;
        }
        None
    }
}
