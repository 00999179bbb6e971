//! The single-pass builder: one traversal of the syntax tree drives context
//! opening, declaration matching, type building, and use resolution, with
//! observers attached at the hook points for anything beyond those concerns.

use crate::contexts::Tentative;
use crate::declarations::DeclarationShape;
use crate::error::{BuilderError, Result};
use crate::hooks::BuildObserver;
use crate::session::{node_text, range_of, LanguageFlags, ParseDiagnostic, ParsedDocument};
use duchain::{
    read_lock, write_lock, ContextId, ContextKind, DeclarationId, DeclarationKind, DuChain,
    DuType, EditLog, Identifier, QualifiedIdentifier, Range, Revision, TopContext,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use tree_sitter::Node;

/// Everything a build pass needs about the document being indexed. `edits`
/// carries the edit history used to translate prior-revision ranges; without
/// it, a revision mismatch disables incremental reuse.
pub struct BuildInput<'a> {
    pub document: &'a str,
    pub content: &'a str,
    pub revision: Revision,
    pub edits: Option<&'a EditLog>,
    pub flags: LanguageFlags,
    /// Record hint problems for names that do not resolve.
    pub report_unresolved: bool,
    /// Cooperative cancellation flag, checked before the store is touched.
    pub abort: Option<&'a AtomicBool>,
}

/// Build (or rebuild) the top context for `input.document` from a parsed
/// tree. The top context is registered on the chain on first build and
/// updated in place afterwards.
pub fn build_document(
    chain: &DuChain,
    input: &BuildInput<'_>,
    parsed: &ParsedDocument,
) -> Result<Arc<RwLock<TopContext>>> {
    let top = match chain.lookup(input.document) {
        Some(existing) => existing,
        None => chain.register(TopContext::new(input.document)),
    };
    let mut builder = DuBuilder::new(input, Arc::clone(&top));
    builder.run(parsed)?;
    Ok(top)
}

pub struct DuBuilder<'a> {
    pub(crate) input: &'a BuildInput<'a>,
    pub(crate) top: Arc<RwLock<TopContext>>,
    pub(crate) old_revision: Revision,
    pub(crate) recompiling: bool,
    pub(crate) context_stack: Vec<ContextId>,
    pub(crate) declaration_stack: Vec<DeclarationId>,
    pub(crate) pending_imports: Vec<ContextId>,
    pub(crate) encountered_contexts: HashSet<ContextId>,
    pub(crate) encountered_declarations: HashSet<DeclarationId>,
    /// Syntax nodes consumed as declaration names; the reference visitor
    /// skips these.
    pub(crate) node_declarations: HashMap<usize, DeclarationId>,
    pub(crate) last_type: Option<DuType>,
    pub(crate) structurally_significant: bool,
    pub(crate) tentative: Option<Tentative>,
    observers: Vec<&'a mut dyn BuildObserver>,
}

impl<'a> DuBuilder<'a> {
    pub fn new(input: &'a BuildInput<'a>, top: Arc<RwLock<TopContext>>) -> Self {
        Self {
            input,
            top,
            old_revision: Revision::default(),
            recompiling: false,
            context_stack: Vec::new(),
            declaration_stack: Vec::new(),
            pending_imports: Vec::new(),
            encountered_contexts: HashSet::new(),
            encountered_declarations: HashSet::new(),
            node_declarations: HashMap::new(),
            last_type: None,
            structurally_significant: false,
            tentative: None,
            observers: Vec::new(),
        }
    }

    /// Attach an observer; observers fire in attachment order at every hook
    /// point of the traversal.
    pub fn add_observer(&mut self, observer: &'a mut dyn BuildObserver) {
        self.observers.push(observer);
    }

    /// Whether this pass added or removed a declaration in a symbol-table
    /// scope, i.e. whether documents importing this one need re-indexing.
    pub fn was_structurally_significant(&self) -> bool {
        self.structurally_significant
    }

    /// One full pass: clear and re-attach problems, walk the tree, then
    /// remove every prior-revision object the walk did not encounter.
    pub fn run(&mut self, parsed: &ParsedDocument) -> Result<()> {
        self.check_abort()?;
        let top_arc = Arc::clone(&self.top);
        let root = {
            let mut top = write_lock(&top_arc);
            self.old_revision = top.revision();
            self.recompiling = !top.is_empty();
            top.problems.clear();
            top.problems.extend(
                parsed
                    .diagnostics
                    .iter()
                    .cloned()
                    .map(ParseDiagnostic::into_problem),
            );
            let root = top.root();
            let ctx = top.context_mut(root);
            ctx.range = range_of(parsed.root());
            ctx.uses.clear();
            root
        };
        self.context_stack.push(root);
        self.notify_enter_scope(root);
        let walked = self.visit_children(parsed.root());
        self.notify_leave_scope(root);
        self.context_stack.pop();
        walked?;
        {
            let mut top = write_lock(&top_arc);
            let stale_declarations: Vec<DeclarationId> = top
                .declarations()
                .map(|(id, _)| id)
                .filter(|id| !self.encountered_declarations.contains(id))
                .collect();
            if !stale_declarations.is_empty() {
                self.structurally_significant = true;
            }
            for id in stale_declarations {
                top.remove_declaration(id);
            }
            let stale_contexts: Vec<ContextId> = top
                .contexts()
                .map(|(id, _)| id)
                .filter(|id| *id != root && !self.encountered_contexts.contains(id))
                .collect();
            for id in stale_contexts {
                top.remove_context(id);
            }
            top.set_revision(self.input.revision);
            log::debug!(
                "indexed {} at {:?} ({:?}): {} contexts, {} declarations, {} uses, {} problems",
                self.input.document,
                self.input.revision,
                self.input.flags,
                top.context_count(),
                top.declaration_count(),
                top.use_count(),
                top.problems.len(),
            );
        }
        Ok(())
    }

    fn check_abort(&self) -> Result<()> {
        if let Some(flag) = self.input.abort {
            if flag.load(Ordering::Relaxed) {
                return Err(BuilderError::Aborted);
            }
        }
        Ok(())
    }

    /// Translate a range recorded at the old revision into current
    /// coordinates. `None` means an edit destroyed the anchor.
    pub(crate) fn translate_old_range(&self, range: Range) -> Option<Range> {
        if self.old_revision == self.input.revision {
            return Some(range);
        }
        let log = self.input.edits?;
        log.translate_range(range, self.old_revision, self.input.revision)
    }

    pub(crate) fn notify_enter_scope(&mut self, ctx: ContextId) {
        if self.observers.is_empty() {
            return;
        }
        let top_arc = Arc::clone(&self.top);
        let top = read_lock(&top_arc);
        for observer in self.observers.iter_mut() {
            observer.on_enter_scope(&top, ctx);
        }
    }

    pub(crate) fn notify_leave_scope(&mut self, ctx: ContextId) {
        if self.observers.is_empty() {
            return;
        }
        let top_arc = Arc::clone(&self.top);
        let top = read_lock(&top_arc);
        for observer in self.observers.iter_mut() {
            observer.on_leave_scope(&top, ctx);
        }
    }

    pub(crate) fn notify_declaration(&mut self, declaration: DeclarationId) {
        if self.observers.is_empty() {
            return;
        }
        let top_arc = Arc::clone(&self.top);
        let top = read_lock(&top_arc);
        for observer in self.observers.iter_mut() {
            observer.on_declaration(&top, declaration);
        }
    }

    pub(crate) fn notify_reference(&mut self, ctx: ContextId, use_index: usize) {
        if self.observers.is_empty() {
            return;
        }
        let top_arc = Arc::clone(&self.top);
        let top = read_lock(&top_arc);
        for observer in self.observers.iter_mut() {
            observer.on_reference(&top, ctx, use_index);
        }
    }

    pub(crate) fn visit_children(&mut self, node: Node<'_>) -> Result<()> {
        let mut cursor = node.walk();
        let children: Vec<Node> = node.named_children(&mut cursor).collect();
        drop(cursor);
        for child in children {
            self.visit_node(child)?;
        }
        Ok(())
    }

    pub(crate) fn visit_node(&mut self, node: Node<'_>) -> Result<()> {
        match node.kind() {
            "function_definition" => self.visit_function_definition(node),
            "declaration" => self.visit_declaration(node),
            "type_definition" => self.visit_type_definition(node),
            "struct_specifier" | "union_specifier" => {
                let built = self.visit_struct_specifier(node);
                self.last_type = None;
                built
            }
            "enum_specifier" => {
                let built = self.visit_enum_specifier(node);
                self.last_type = None;
                built
            }
            "compound_statement" => self.visit_compound_statement(node),
            "for_statement" => self.visit_for_statement(node),
            "field_expression" => self.visit_field_expression(node),
            "identifier" | "type_identifier" => {
                self.visit_identifier_reference(node);
                Ok(())
            }
            // only meaningful inside a field expression, handled there
            "field_identifier" => Ok(()),
            "comment" | "string_literal" | "char_literal" | "number_literal" => Ok(()),
            // preprocessor text is not indexed; conditional blocks still
            // contain real declarations and fall through to the default
            "preproc_include" | "preproc_def" | "preproc_function_def" | "preproc_call" => Ok(()),
            _ => self.visit_children(node),
        }
    }

    fn visit_declaration(&mut self, node: Node<'_>) -> Result<()> {
        let type_node = node.child_by_field_name("type");
        let mut cursor = node.walk();
        let declarators: Vec<Node> = node.children_by_field_name("declarator", &mut cursor).collect();
        drop(cursor);
        if declarators.is_empty() {
            if let Some(spec) = type_node {
                if matches!(spec.kind(), "struct_specifier" | "union_specifier" | "enum_specifier")
                    && spec.child_by_field_name("body").is_none()
                {
                    if let Some(name) = spec.child_by_field_name("name") {
                        // `struct foo;` announces the type without defining it
                        let ident = Identifier::new(node_text(name, self.input.content));
                        let id = self.open_declaration(
                            Some(ident),
                            Some(range_of(name)),
                            range_of(spec),
                            DeclarationShape::Class { forward: true },
                        );
                        self.node_declarations.insert(name.id(), id);
                        self.last_type = Some(DuType::Structure { declaration: id });
                        self.close_declaration(false);
                        self.last_type = None;
                        return Ok(());
                    }
                }
            }
        }
        self.build_type_specifier(type_node)?;
        let base = self.last_type.take().unwrap_or(DuType::Invalid);
        for declarator in declarators {
            self.handle_declarator(declarator, base.clone())?;
        }
        Ok(())
    }

    fn handle_declarator(&mut self, node: Node<'_>, base: DuType) -> Result<()> {
        let (declarator, value) = if node.kind() == "init_declarator" {
            (
                node.child_by_field_name("declarator"),
                node.child_by_field_name("value"),
            )
        } else {
            (Some(node), None)
        };
        let Some(declarator) = declarator else {
            return Ok(());
        };
        let (core, ty) = self.peel_declarator(declarator, base)?;
        if let Some(core) = core {
            match core.kind() {
                "function_declarator" => self.handle_function_declarator(core, ty, None)?,
                "identifier" | "field_identifier" => {
                    self.declare_variable(core, ty, DeclarationShape::Variable)?;
                }
                _ => {}
            }
        }
        if let Some(value) = value {
            self.visit_node(value)?;
        }
        Ok(())
    }

    /// Strip wrapper declarators (pointer, array, parentheses) down to the
    /// core, wrapping the type accordingly. Array size expressions are
    /// visited for their references on the way down.
    fn peel_declarator<'t>(
        &mut self,
        mut node: Node<'t>,
        mut ty: DuType,
    ) -> Result<(Option<Node<'t>>, DuType)> {
        loop {
            match node.kind() {
                "pointer_declarator" => {
                    ty = DuType::Pointer(Box::new(ty));
                    match node.child_by_field_name("declarator") {
                        Some(inner) => node = inner,
                        None => return Ok((None, ty)),
                    }
                }
                "array_declarator" => {
                    if let Some(size) = node.child_by_field_name("size") {
                        self.visit_node(size)?;
                    }
                    ty = DuType::Array(Box::new(ty));
                    match node.child_by_field_name("declarator") {
                        Some(inner) => node = inner,
                        None => return Ok((None, ty)),
                    }
                }
                "parenthesized_declarator" => {
                    let mut cursor = node.walk();
                    let inner = node.named_children(&mut cursor).next();
                    drop(cursor);
                    match inner {
                        Some(inner) => node = inner,
                        None => return Ok((None, ty)),
                    }
                }
                _ => return Ok((Some(node), ty)),
            }
        }
    }

    pub(crate) fn declare_variable(
        &mut self,
        name: Node<'_>,
        ty: DuType,
        shape: DeclarationShape,
    ) -> Result<()> {
        let ident = Identifier::new(node_text(name, self.input.content));
        let id = self.open_declaration(Some(ident), Some(range_of(name)), range_of(name), shape);
        self.node_declarations.insert(name.id(), id);
        {
            let top_arc = Arc::clone(&self.top);
            let mut top = write_lock(&top_arc);
            top.declaration_mut(id).is_definition = true;
        }
        self.last_type = Some(ty);
        self.close_declaration(false);
        self.last_type = None;
        Ok(())
    }

    fn visit_function_definition(&mut self, node: Node<'_>) -> Result<()> {
        self.build_type_specifier(node.child_by_field_name("type"))?;
        let base = self.last_type.take().unwrap_or(DuType::Invalid);
        let Some(declarator) = node.child_by_field_name("declarator") else {
            return Ok(());
        };
        let (core, return_type) = self.peel_declarator(declarator, base)?;
        let Some(core) = core else {
            return Ok(());
        };
        if core.kind() != "function_declarator" {
            return Ok(());
        }
        self.handle_function_declarator(core, return_type, node.child_by_field_name("body"))
    }

    fn handle_function_declarator(
        &mut self,
        fn_decl: Node<'_>,
        return_type: DuType,
        body: Option<Node<'_>>,
    ) -> Result<()> {
        let Some(inner) = fn_decl.child_by_field_name("declarator") else {
            return Ok(());
        };
        // `int (*fp)(int)`: a wrapped inner declarator means a variable of
        // function (pointer) type, not a function
        if matches!(inner.kind(), "parenthesized_declarator" | "pointer_declarator") {
            let parameters = match fn_decl.child_by_field_name("parameters") {
                Some(params) => self.build_parameters(params, false)?,
                None => Vec::new(),
            };
            let fn_type = DuType::Function {
                return_type: Box::new(return_type),
                parameters,
            };
            let (core, ty) = self.peel_declarator(inner, fn_type)?;
            if let Some(core) = core {
                if matches!(core.kind(), "identifier" | "field_identifier") {
                    self.declare_variable(core, ty, DeclarationShape::Variable)?;
                }
            }
            return Ok(());
        }
        if !matches!(inner.kind(), "identifier" | "field_identifier") {
            return Ok(());
        }
        let name = inner;
        let ident = Identifier::new(node_text(name, self.input.content));
        let params_node = fn_decl.child_by_field_name("parameters");

        let Some(body) = body else {
            return self.handle_ambiguous_declarator(name, ident, return_type, params_node);
        };

        // definition: parameter context, then the declaration, then the
        // body context importing the parameters
        let params_range = params_node
            .map(range_of)
            .unwrap_or_else(|| range_of(name).collapse_to_end());
        let params_ctx = self.open_context(params_range, ContextKind::Function, Some(ident.clone()));
        let parameters = match params_node {
            Some(params) => self.build_parameters(params, true)?,
            None => Vec::new(),
        };
        self.close_context();
        self.add_pending_import(params_ctx);
        let fn_type = DuType::Function {
            return_type: Box::new(return_type),
            parameters,
        };

        let declaration = self.open_declaration(
            Some(ident),
            Some(range_of(name)),
            range_of(name),
            DeclarationShape::Function,
        );
        self.node_declarations.insert(name.id(), declaration);
        let in_symbol_table = {
            let top_arc = Arc::clone(&self.top);
            let mut top = write_lock(&top_arc);
            let dec = top.declaration_mut(declaration);
            dec.is_definition = true;
            dec.internal_context = Some(params_ctx);
            top.context_mut(params_ctx).owner = Some(declaration);
            top.context(self.current_context()).kind.in_symbol_table()
        };
        if in_symbol_table {
            self.pair_function_definition(declaration, &fn_type);
        }
        self.open_context(range_of(body), ContextKind::Other, None);
        self.visit_children(body)?;
        self.close_context();
        self.last_type = Some(fn_type);
        self.close_declaration(false);
        self.last_type = None;
        Ok(())
    }

    /// `T name(args);` without a body is a prototype, unless the probe reads
    /// `args` as initializer values. The parameter context is built
    /// speculatively and rolled back when the probe decides against a
    /// function.
    fn handle_ambiguous_declarator(
        &mut self,
        name: Node<'_>,
        ident: Identifier,
        return_type: DuType,
        params_node: Option<Node<'_>>,
    ) -> Result<()> {
        self.begin_tentative();
        let params_range = params_node
            .map(range_of)
            .unwrap_or_else(|| range_of(name).collapse_to_end());
        let params_ctx = self.open_context(params_range, ContextKind::Function, Some(ident.clone()));
        let parameters = match params_node {
            Some(params) => self.build_parameters(params, true)?,
            None => Vec::new(),
        };
        self.close_context();
        let is_function = match params_node {
            Some(params) => self.check_parameter_declaration_clause(params),
            None => true,
        };
        if is_function {
            self.commit_tentative();
            let fn_type = DuType::Function {
                return_type: Box::new(return_type),
                parameters,
            };
            let declaration = self.open_declaration(
                Some(ident),
                Some(range_of(name)),
                range_of(name),
                DeclarationShape::Function,
            );
            self.node_declarations.insert(name.id(), declaration);
            {
                let top_arc = Arc::clone(&self.top);
                let mut top = write_lock(&top_arc);
                top.declaration_mut(declaration).internal_context = Some(params_ctx);
                top.context_mut(params_ctx).owner = Some(declaration);
            }
            self.last_type = Some(fn_type);
            self.close_declaration(false);
            self.last_type = None;
        } else {
            self.rollback_tentative();
            self.declare_variable(name, return_type, DeclarationShape::Variable)?;
            // what looked like parameters are initializer expressions
            if let Some(params) = params_node {
                let mut cursor = params.walk();
                let children: Vec<Node> = params.named_children(&mut cursor).collect();
                drop(cursor);
                for child in children {
                    if child.kind() != "parameter_declaration" {
                        continue;
                    }
                    if let Some(type_node) = child.child_by_field_name("type") {
                        if type_node.kind() == "type_identifier" {
                            let arg = Identifier::new(node_text(type_node, self.input.content));
                            self.record_reference(&arg, range_of(type_node));
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Decide whether a parenthesized clause is a parameter list or an
    /// initializer. Named or built-in-typed entries are decisive for a
    /// function; an entry naming a known value decides for an initializer;
    /// when nothing is decisive the clause is not a parameter list.
    pub(crate) fn check_parameter_declaration_clause(&self, params: Node<'_>) -> bool {
        let top_arc = Arc::clone(&self.top);
        let top = read_lock(&top_arc);
        let ctx = self.current_context();
        // inside executable code `name(args)` reads as an initializer
        if top.context(ctx).kind == ContextKind::Other {
            return false;
        }
        let mut cursor = params.walk();
        let children: Vec<Node> = params.named_children(&mut cursor).collect();
        drop(cursor);
        if children.is_empty() {
            return true;
        }
        for child in children {
            match child.kind() {
                "variadic_parameter" => return true,
                "parameter_declaration" => {
                    if child.child_by_field_name("declarator").is_some() {
                        return true;
                    }
                    let Some(type_node) = child.child_by_field_name("type") else {
                        continue;
                    };
                    match type_node.kind() {
                        "primitive_type" | "sized_type_specifier" | "struct_specifier"
                        | "union_specifier" | "enum_specifier" => return true,
                        "type_identifier" => {
                            let ident = Identifier::new(node_text(type_node, self.input.content));
                            let qid = QualifiedIdentifier::from_identifier(ident);
                            let found = top
                                .find_declarations(ctx, &qid, Some(range_of(type_node).start))
                                .first()
                                .copied();
                            if let Some(dec) = found.and_then(|id| top.get_declaration(id)) {
                                return dec.is_type()
                                    || matches!(dec.kind, DeclarationKind::Alias { .. });
                            }
                        }
                        _ => {}
                    }
                }
                _ => {}
            }
        }
        false
    }

    /// Build the parameter list of a function declarator: each entry's type
    /// is built, named entries become parameter declarations when `declare`
    /// is set. A lone `void` is an empty list.
    fn build_parameters(&mut self, params: Node<'_>, declare: bool) -> Result<Vec<DuType>> {
        let mut types = Vec::new();
        let mut cursor = params.walk();
        let children: Vec<Node> = params.named_children(&mut cursor).collect();
        drop(cursor);
        for child in children {
            if child.kind() != "parameter_declaration" {
                continue;
            }
            self.build_type_specifier(child.child_by_field_name("type"))?;
            let base = self.last_type.take().unwrap_or(DuType::Invalid);
            let declarator = child.child_by_field_name("declarator");
            let ty = match declarator {
                Some(declarator) => {
                    let (core, ty) = self.peel_declarator(declarator, base)?;
                    if declare {
                        if let Some(core) = core {
                            if matches!(core.kind(), "identifier" | "field_identifier") {
                                self.declare_variable(core, ty.clone(), DeclarationShape::Parameter)?;
                            }
                        }
                    }
                    ty
                }
                None => base,
            };
            if declarator.is_none() && matches!(&ty, DuType::Integral(spelling) if spelling == "void")
            {
                continue;
            }
            types.push(ty);
        }
        Ok(types)
    }

    /// Resolve a type specifier into `last_type`, recording a use when it
    /// names a declaration. Unknown names become delayed types rather than
    /// problems; they commonly live behind unexpanded includes.
    pub(crate) fn build_type_specifier(&mut self, node: Option<Node<'_>>) -> Result<()> {
        let Some(node) = node else {
            self.last_type = Some(DuType::Invalid);
            return Ok(());
        };
        match node.kind() {
            "primitive_type" | "sized_type_specifier" => {
                self.last_type = Some(DuType::integral(node_text(node, self.input.content)));
            }
            "type_identifier" => {
                let ident = Identifier::new(node_text(node, self.input.content));
                let top_arc = Arc::clone(&self.top);
                let found = {
                    let top = read_lock(&top_arc);
                    let qid = QualifiedIdentifier::from_identifier(ident.clone());
                    top.find_declarations(self.current_context(), &qid, Some(range_of(node).start))
                        .first()
                        .copied()
                };
                match found {
                    Some(declaration) => {
                        let ctx = self.current_context();
                        self.record_use(ctx, range_of(node), declaration);
                        let ty = {
                            let top = read_lock(&top_arc);
                            let dec = top.declaration(declaration);
                            match dec.kind {
                                DeclarationKind::Alias { .. } => DuType::Alias { declaration },
                                DeclarationKind::Type { .. } => dec
                                    .du_type
                                    .clone()
                                    .unwrap_or(DuType::Structure { declaration }),
                                _ => dec.du_type.clone().unwrap_or(DuType::Invalid),
                            }
                        };
                        self.last_type = Some(ty);
                    }
                    None => {
                        self.last_type =
                            Some(DuType::Delayed(QualifiedIdentifier::from_identifier(ident)));
                    }
                }
            }
            "struct_specifier" | "union_specifier" => self.visit_struct_specifier(node)?,
            "enum_specifier" => self.visit_enum_specifier(node)?,
            _ => self.last_type = Some(DuType::Invalid),
        }
        Ok(())
    }

    fn visit_struct_specifier(&mut self, node: Node<'_>) -> Result<()> {
        let name = node.child_by_field_name("name");
        let Some(body) = node.child_by_field_name("body") else {
            // a bare `struct foo` names the type
            let Some(name) = name else {
                self.last_type = Some(DuType::Invalid);
                return Ok(());
            };
            let ident = Identifier::new(node_text(name, self.input.content));
            self.last_type = Some(match self.record_reference(&ident, range_of(name)) {
                Some(declaration) => DuType::Structure { declaration },
                None => DuType::Delayed(QualifiedIdentifier::from_identifier(ident)),
            });
            return Ok(());
        };
        let ident = name.map(|n| Identifier::new(node_text(n, self.input.content)));
        let scope_name = ident.clone().unwrap_or_else(|| Identifier::unique("struct"));
        let declaration = self.open_declaration(
            ident,
            name.map(range_of),
            range_of(node),
            DeclarationShape::Class { forward: false },
        );
        if let Some(name) = name {
            self.node_declarations.insert(name.id(), declaration);
        }
        let ctx = self.open_context(range_of(body), ContextKind::Class, Some(scope_name));
        {
            let top_arc = Arc::clone(&self.top);
            let mut top = write_lock(&top_arc);
            top.context_mut(ctx).owner = Some(declaration);
            let dec = top.declaration_mut(declaration);
            dec.internal_context = Some(ctx);
            dec.is_definition = true;
        }
        let mut cursor = body.walk();
        let members: Vec<Node> = body.named_children(&mut cursor).collect();
        drop(cursor);
        for member in members {
            match member.kind() {
                "field_declaration" => self.visit_field_declaration(member)?,
                "comment" => {}
                _ => self.visit_node(member)?,
            }
        }
        self.close_context();
        self.resolve_forward_declarations(declaration);
        self.last_type = Some(DuType::Structure { declaration });
        self.close_declaration(false);
        Ok(())
    }

    fn visit_field_declaration(&mut self, node: Node<'_>) -> Result<()> {
        self.build_type_specifier(node.child_by_field_name("type"))?;
        let base = self.last_type.take().unwrap_or(DuType::Invalid);
        let mut cursor = node.walk();
        let declarators: Vec<Node> = node.children_by_field_name("declarator", &mut cursor).collect();
        drop(cursor);
        for declarator in declarators {
            let (core, ty) = self.peel_declarator(declarator, base.clone())?;
            let Some(core) = core else {
                continue;
            };
            match core.kind() {
                "field_identifier" | "identifier" => {
                    self.declare_variable(core, ty, DeclarationShape::Variable)?;
                }
                "function_declarator" => {
                    // function-pointer member
                    let Some(inner) = core.child_by_field_name("declarator") else {
                        continue;
                    };
                    let parameters = match core.child_by_field_name("parameters") {
                        Some(params) => self.build_parameters(params, false)?,
                        None => Vec::new(),
                    };
                    let fn_type = DuType::Function {
                        return_type: Box::new(ty),
                        parameters,
                    };
                    let (fcore, fty) = self.peel_declarator(inner, fn_type)?;
                    if let Some(fcore) = fcore {
                        if matches!(fcore.kind(), "field_identifier" | "identifier") {
                            self.declare_variable(fcore, fty, DeclarationShape::Variable)?;
                        }
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn visit_enum_specifier(&mut self, node: Node<'_>) -> Result<()> {
        let name = node.child_by_field_name("name");
        let Some(body) = node.child_by_field_name("body") else {
            let Some(name) = name else {
                self.last_type = Some(DuType::Invalid);
                return Ok(());
            };
            let ident = Identifier::new(node_text(name, self.input.content));
            self.last_type = Some(match self.record_reference(&ident, range_of(name)) {
                Some(declaration) => DuType::Enumeration { declaration },
                None => DuType::Delayed(QualifiedIdentifier::from_identifier(ident)),
            });
            return Ok(());
        };
        let ident = name.map(|n| Identifier::new(node_text(n, self.input.content)));
        let scope_name = ident.clone().unwrap_or_else(|| Identifier::unique("enum"));
        let declaration = self.open_declaration(
            ident,
            name.map(range_of),
            range_of(node),
            DeclarationShape::Enum,
        );
        if let Some(name) = name {
            self.node_declarations.insert(name.id(), declaration);
        }
        let ctx = self.open_context(range_of(body), ContextKind::Other, Some(scope_name));
        {
            let top_arc = Arc::clone(&self.top);
            let mut top = write_lock(&top_arc);
            let context = top.context_mut(ctx);
            context.owner = Some(declaration);
            // enumerators are visible from the surrounding scope
            context.propagates_declarations = true;
            let dec = top.declaration_mut(declaration);
            dec.internal_context = Some(ctx);
            dec.is_definition = true;
        }
        let mut cursor = body.walk();
        let entries: Vec<Node> = body.named_children(&mut cursor).collect();
        drop(cursor);
        for entry in entries {
            if entry.kind() != "enumerator" {
                continue;
            }
            let Some(entry_name) = entry.child_by_field_name("name") else {
                continue;
            };
            let entry_ident = Identifier::new(node_text(entry_name, self.input.content));
            let entry_decl = self.open_declaration(
                Some(entry_ident),
                Some(range_of(entry_name)),
                range_of(entry),
                DeclarationShape::Enumerator,
            );
            self.node_declarations.insert(entry_name.id(), entry_decl);
            if let Some(value) = entry.child_by_field_name("value") {
                self.visit_node(value)?;
            }
            self.last_type = Some(DuType::Enumeration { declaration });
            // the enumerator's type names the enum, not itself
            self.close_declaration(true);
            self.last_type = None;
        }
        self.close_context();
        self.last_type = Some(DuType::Enumeration { declaration });
        self.close_declaration(false);
        Ok(())
    }

    fn visit_type_definition(&mut self, node: Node<'_>) -> Result<()> {
        self.build_type_specifier(node.child_by_field_name("type"))?;
        let base = self.last_type.take().unwrap_or(DuType::Invalid);
        let mut cursor = node.walk();
        let declarators: Vec<Node> = node.children_by_field_name("declarator", &mut cursor).collect();
        drop(cursor);
        for declarator in declarators {
            self.handle_typedef_declarator(declarator, base.clone())?;
        }
        Ok(())
    }

    fn handle_typedef_declarator(&mut self, node: Node<'_>, base: DuType) -> Result<()> {
        let (core, ty) = self.peel_declarator(node, base)?;
        let Some(core) = core else {
            return Ok(());
        };
        if !matches!(core.kind(), "type_identifier" | "identifier") {
            return Ok(());
        }
        let ident = Identifier::new(node_text(core, self.input.content));
        let id = self.open_declaration(
            Some(ident),
            Some(range_of(core)),
            range_of(core),
            DeclarationShape::Alias,
        );
        self.node_declarations.insert(core.id(), id);
        let target = ty.base_type().identified_declaration();
        {
            let top_arc = Arc::clone(&self.top);
            let mut top = write_lock(&top_arc);
            if let DeclarationKind::Alias { target: slot } = &mut top.declaration_mut(id).kind {
                *slot = target;
            }
        }
        self.last_type = Some(ty);
        // alias kind survives close-time classification
        self.close_declaration(false);
        self.last_type = None;
        Ok(())
    }

    fn visit_compound_statement(&mut self, node: Node<'_>) -> Result<()> {
        self.open_context(range_of(node), ContextKind::Other, None);
        self.visit_children(node)?;
        self.close_context();
        Ok(())
    }

    /// `for` gets its own context so the init declaration scopes to the
    /// statement.
    fn visit_for_statement(&mut self, node: Node<'_>) -> Result<()> {
        self.open_context(range_of(node), ContextKind::Other, None);
        self.visit_children(node)?;
        self.close_context();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::{BuildEvent, EventLog};
    use crate::session::ParseSession;
    use duchain::{Cursor, TextEdit};
    use pretty_assertions::assert_eq;

    fn build(chain: &DuChain, document: &str, content: &str, revision: Revision) {
        build_with_edits(chain, document, content, revision, None)
    }

    fn build_with_edits(
        chain: &DuChain,
        document: &str,
        content: &str,
        revision: Revision,
        edits: Option<&EditLog>,
    ) {
        let mut session = ParseSession::new(LanguageFlags::default()).unwrap();
        let parsed = session.parse(content).unwrap();
        let input = BuildInput {
            document,
            content,
            revision,
            edits,
            flags: LanguageFlags::default(),
            report_unresolved: true,
            abort: None,
        };
        build_document(chain, &input, &parsed).unwrap();
    }

    fn decl_named(top: &TopContext, name: &str) -> DeclarationId {
        top.declarations()
            .find(|(_, d)| d.identifier.as_str() == name)
            .map(|(id, _)| id)
            .unwrap()
    }

    #[test]
    fn declares_functions_and_resolves_parameters_in_body() {
        let chain = DuChain::new();
        build(&chain, "a.c", "int counter;\nint add(int a, int b) { return a + b; }\n", Revision(1));
        let top = chain.lookup("a.c").unwrap();
        let top = read_lock(&top);
        assert!(top.check_containment().is_empty());

        let counter = top.declaration(decl_named(&top, "counter"));
        assert!(matches!(counter.kind, DeclarationKind::Instance { function: None }));
        assert!(counter.is_definition);

        let add = top.declaration(decl_named(&top, "add"));
        assert!(add.is_function());
        assert!(add.is_definition);
        assert_eq!(add.du_type.as_ref().and_then(DuType::argument_count), Some(2));

        // `a` and `b` resolve in the body through the parameter import
        assert_eq!(top.use_count(), 2);
        let a = decl_named(&top, "a");
        let b = decl_named(&top, "b");
        let used: Vec<DeclarationId> = top
            .contexts()
            .flat_map(|(_, c)| c.uses.iter().map(|u| u.declaration))
            .collect();
        assert!(used.contains(&a) && used.contains(&b));
    }

    #[test]
    fn definition_pairs_with_earlier_prototype() {
        let chain = DuChain::new();
        build(
            &chain,
            "p.c",
            "int add(int a, int b);\nint add(int a, int b) { return a + b; }\n",
            Revision(1),
        );
        let top = chain.lookup("p.c").unwrap();
        let top = read_lock(&top);
        let (proto, def) = {
            let mut adds = top
                .declarations()
                .filter(|(_, d)| d.identifier.as_str() == "add");
            let first = adds.next().unwrap();
            let second = adds.next().unwrap();
            if first.1.is_definition {
                (second.0, first.0)
            } else {
                (first.0, second.0)
            }
        };
        assert!(!top.declaration(proto).is_definition);
        assert_eq!(top.declaration(proto).paired_declaration, Some(def));
        assert_eq!(top.declaration(def).paired_declaration, Some(proto));
    }

    #[test]
    fn forward_declaration_resolves_and_members_follow_it() {
        let chain = DuChain::new();
        build(
            &chain,
            "f.c",
            "struct node;\nstruct node { int value; };\nint get(struct node *n) { return n->value; }\n",
            Revision(1),
        );
        let top = chain.lookup("f.c").unwrap();
        let top = read_lock(&top);
        let (forward, real) = {
            let mut nodes = top
                .declarations()
                .filter(|(_, d)| d.identifier.as_str() == "node");
            let first = nodes.next().unwrap();
            let second = nodes.next().unwrap();
            if first.1.is_forward_declaration() {
                (first.0, second.0)
            } else {
                (second.0, first.0)
            }
        };
        assert_eq!(top.declaration(forward).paired_declaration, Some(real));

        // `n->value` resolves through the forward declaration
        let value = decl_named(&top, "value");
        let member_uses = top
            .contexts()
            .flat_map(|(_, c)| c.uses.iter())
            .filter(|u| u.declaration == value)
            .count();
        assert_eq!(member_uses, 1);
    }

    #[test]
    fn repeated_forward_declarations_all_resolve_to_the_definition() {
        let chain = DuChain::new();
        build(
            &chain,
            "f.c",
            "struct item;\nstruct item;\nstruct item { int id; };\n",
            Revision(1),
        );
        let top = chain.lookup("f.c").unwrap();
        let top = read_lock(&top);
        let items: Vec<_> = top
            .declarations()
            .filter(|(_, d)| d.identifier.as_str() == "item")
            .collect();
        assert_eq!(items.len(), 3);
        let real = items
            .iter()
            .find(|(_, d)| !d.is_forward_declaration())
            .map(|(id, _)| *id)
            .unwrap();
        for (id, decl) in &items {
            if *id != real {
                assert!(decl.is_forward_declaration());
                assert_eq!(decl.paired_declaration, Some(real));
            }
        }
    }

    #[test]
    fn parenthesized_initializer_rolls_back_to_a_variable() {
        let chain = DuChain::new();
        build(&chain, "v.c", "int x = 1;\nint y(x);\n", Revision(1));
        let top = chain.lookup("v.c").unwrap();
        let top = read_lock(&top);
        let y = top.declaration(decl_named(&top, "y"));
        assert!(matches!(y.kind, DeclarationKind::Instance { function: None }));
        assert_eq!(y.du_type, Some(DuType::integral("int")));
        // the speculative parameter context is gone
        assert!(top
            .contexts()
            .all(|(_, c)| c.kind != ContextKind::Function));
        // `x` inside the parentheses is a reference to the variable
        let x = decl_named(&top, "x");
        assert!(top
            .contexts()
            .flat_map(|(_, c)| c.uses.iter())
            .any(|u| u.declaration == x));
    }

    #[test]
    fn prototype_with_known_type_name_stays_a_function() {
        let chain = DuChain::new();
        build(&chain, "t.c", "typedef int myint;\nvoid f(myint);\n", Revision(1));
        let top = chain.lookup("t.c").unwrap();
        let top = read_lock(&top);
        let f = top.declaration(decl_named(&top, "f"));
        assert!(f.is_function());
        assert!(!f.is_definition);
        assert_eq!(f.du_type.as_ref().and_then(DuType::argument_count), Some(1));
    }

    #[test]
    fn enumerators_are_visible_from_the_surrounding_scope() {
        let chain = DuChain::new();
        build(
            &chain,
            "e.c",
            "enum color { RED, GREEN };\nint f(void) { return RED; }\n",
            Revision(1),
        );
        let top = chain.lookup("e.c").unwrap();
        let top = read_lock(&top);
        let red = decl_named(&top, "RED");
        assert!(top
            .contexts()
            .flat_map(|(_, c)| c.uses.iter())
            .any(|u| u.declaration == red));
        // `(void)` is an empty parameter list
        let f = top.declaration(decl_named(&top, "f"));
        assert_eq!(f.du_type.as_ref().and_then(DuType::argument_count), Some(0));
    }

    #[test]
    fn member_access_resolves_through_a_typedef() {
        let chain = DuChain::new();
        build(
            &chain,
            "m.c",
            "struct point { int x; };\ntypedef struct point point_t;\npoint_t p;\nint f(void) { return p.x; }\n",
            Revision(1),
        );
        let top = chain.lookup("m.c").unwrap();
        let top = read_lock(&top);
        let x = decl_named(&top, "x");
        assert!(top
            .contexts()
            .flat_map(|(_, c)| c.uses.iter())
            .any(|u| u.declaration == x));
        let alias = top.declaration(decl_named(&top, "point_t"));
        assert!(matches!(alias.kind, DeclarationKind::Alias { target: Some(_) }));
    }

    #[test]
    fn rebuilding_unchanged_content_keeps_identities() {
        let chain = DuChain::new();
        let content = "struct point { int x; };\nstruct point p;\n";
        build(&chain, "r.c", content, Revision(1));
        let (point, p, decls, ctxs) = {
            let top = chain.lookup("r.c").unwrap();
            let top = read_lock(&top);
            (
                decl_named(&top, "point"),
                decl_named(&top, "p"),
                top.declaration_count(),
                top.context_count(),
            )
        };
        build(&chain, "r.c", content, Revision(1));
        let top = chain.lookup("r.c").unwrap();
        let top = read_lock(&top);
        assert_eq!(decl_named(&top, "point"), point);
        assert_eq!(decl_named(&top, "p"), p);
        assert_eq!(top.declaration_count(), decls);
        assert_eq!(top.context_count(), ctxs);
        assert!(top.check_containment().is_empty());
    }

    #[test]
    fn renaming_a_struct_in_place_refreshes_member_scope_paths() {
        let chain = DuChain::new();
        build(&chain, "s.c", "struct alpha { int m; };\n", Revision(1));
        let (ctxs, m) = {
            let top = chain.lookup("s.c").unwrap();
            let top = read_lock(&top);
            let m = decl_named(&top, "m");
            assert_eq!(top.qualified_identifier(m).to_string(), "alpha::m");
            (top.context_count(), m)
        };
        // Same layout, so the class context is matched and reused.
        build(&chain, "s.c", "struct omega { int m; };\n", Revision(1));
        let top = chain.lookup("s.c").unwrap();
        let top = read_lock(&top);
        assert_eq!(top.context_count(), ctxs);
        assert_eq!(decl_named(&top, "m"), m);
        assert_eq!(top.qualified_identifier(m).to_string(), "omega::m");
    }

    #[test]
    fn edits_translate_identities_across_revisions() {
        let chain = DuChain::new();
        build(&chain, "i.c", "int x;\nint y;\n", Revision(1));
        let (x, y) = {
            let top = chain.lookup("i.c").unwrap();
            let top = read_lock(&top);
            (decl_named(&top, "x"), decl_named(&top, "y"))
        };
        // a new first line shifts everything down one row
        let mut edits = EditLog::new();
        edits.record(
            Revision(2),
            TextEdit {
                range: duchain::Range::point(Cursor::new(0, 0)),
                new_end: Cursor::new(1, 0),
            },
        );
        build_with_edits(
            &chain,
            "i.c",
            "int z;\nint x;\nint y;\n",
            Revision(2),
            Some(&edits),
        );
        let top = chain.lookup("i.c").unwrap();
        let top = read_lock(&top);
        assert_eq!(decl_named(&top, "x"), x);
        assert_eq!(decl_named(&top, "y"), y);
        assert_eq!(top.declaration(x).range.start, Cursor::new(1, 4));
        assert_eq!(top.declaration_count(), 3);
        assert_eq!(top.revision(), Revision(2));
    }

    #[test]
    fn observers_fire_in_traversal_order() {
        let chain = DuChain::new();
        let mut session = ParseSession::new(LanguageFlags::default()).unwrap();
        let parsed = session.parse("int x;\n").unwrap();
        let input = BuildInput {
            document: "o.c",
            content: "int x;\n",
            revision: Revision(1),
            edits: None,
            flags: LanguageFlags::default(),
            report_unresolved: false,
            abort: None,
        };
        let top = chain.register(TopContext::new("o.c"));
        let mut log = EventLog::default();
        let mut builder = DuBuilder::new(&input, Arc::clone(&top));
        builder.add_observer(&mut log);
        builder.run(&parsed).unwrap();
        let top = read_lock(&top);
        let root = top.root();
        let x = decl_named(&top, "x");
        assert_eq!(
            log.events,
            vec![
                BuildEvent::EnterScope(root),
                BuildEvent::Declaration(x),
                BuildEvent::LeaveScope(root),
            ]
        );
    }

    #[test]
    fn aborted_jobs_leave_the_store_untouched() {
        let chain = DuChain::new();
        build(&chain, "ab.c", "int x;\n", Revision(1));
        let mut session = ParseSession::new(LanguageFlags::default()).unwrap();
        let parsed = session.parse("int x;\nint y;\n").unwrap();
        let flag = AtomicBool::new(true);
        let input = BuildInput {
            document: "ab.c",
            content: "int x;\nint y;\n",
            revision: Revision(2),
            edits: None,
            flags: LanguageFlags::default(),
            report_unresolved: false,
            abort: Some(&flag),
        };
        let err = build_document(&chain, &input, &parsed).unwrap_err();
        assert!(matches!(err, BuilderError::Aborted));
        let top = chain.lookup("ab.c").unwrap();
        let top = read_lock(&top);
        assert_eq!(top.revision(), Revision(1));
        assert_eq!(top.declaration_count(), 1);
    }
}
