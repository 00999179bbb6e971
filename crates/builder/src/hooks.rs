use duchain::{ContextId, DeclarationId, TopContext};

/// Hook points fired by the builder during its single traversal.
///
/// The traversal is one pass; concerns beyond the built-in ones (contexts,
/// declarations, types, uses) attach here as an ordered observer list
/// instead of subclass layers. Observers run under the top context's read
/// lock and must not block.
pub trait BuildObserver {
    /// A context was opened (created or reused) and pushed on the stack.
    fn on_enter_scope(&mut self, _top: &TopContext, _context: ContextId) {}

    /// A declaration was closed: identifier, kind and type are final.
    fn on_declaration(&mut self, _top: &TopContext, _declaration: DeclarationId) {}

    /// A reference was resolved and recorded as a use of `context`.
    fn on_reference(&mut self, _top: &TopContext, _context: ContextId, _use_index: usize) {}

    /// A context was popped; its imports are attached.
    fn on_leave_scope(&mut self, _top: &TopContext, _context: ContextId) {}
}

/// Observer that records the event sequence; used by tests to assert
/// traversal order without reaching into builder internals.
#[derive(Debug, Default)]
pub struct EventLog {
    pub events: Vec<BuildEvent>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildEvent {
    EnterScope(ContextId),
    Declaration(DeclarationId),
    Reference(ContextId, usize),
    LeaveScope(ContextId),
}

impl BuildObserver for EventLog {
    fn on_enter_scope(&mut self, _top: &TopContext, context: ContextId) {
        self.events.push(BuildEvent::EnterScope(context));
    }

    fn on_declaration(&mut self, _top: &TopContext, declaration: DeclarationId) {
        self.events.push(BuildEvent::Declaration(declaration));
    }

    fn on_reference(&mut self, _top: &TopContext, context: ContextId, use_index: usize) {
        self.events.push(BuildEvent::Reference(context, use_index));
    }

    fn on_leave_scope(&mut self, _top: &TopContext, context: ContextId) {
        self.events.push(BuildEvent::LeaveScope(context));
    }
}
