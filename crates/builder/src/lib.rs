//! Semantic index builder for C translation units.
//!
//! One [`DuBuilder`] pass over a parsed tree produces or refreshes the
//! document's top context: contexts are opened against the stack,
//! declarations are matched against the prior revision so identities
//! survive edits, types are assembled bottom-up, and references are
//! resolved into uses. Everything the pass did not encounter is removed at
//! the end, so a build is always a full reconciliation.
//!
//! Hosts drive the builder through [`build_document`]; extra concerns hook
//! in through [`BuildObserver`].

mod builder;
mod contexts;
mod declarations;
mod error;
mod hooks;
mod session;
mod uses;

pub use builder::{build_document, BuildInput, DuBuilder};
pub use error::{BuilderError, Result};
pub use hooks::{BuildEvent, BuildObserver, EventLog};
pub use session::{
    cursor_of, node_text, range_of, LanguageFlags, ParseDiagnostic, ParsedDocument, ParseSession,
};
