//! # Duchain
//!
//! Persistent, queryable, incrementally-updatable semantic index for
//! C-family source: the definition-use-chain data model plus the
//! process-wide registry it lives in.
//!
//! ## Model
//!
//! ```text
//! DuChain (registry, one per process)
//!     │
//!     └──> TopContext (one per document)
//!            ├─> DuContext arena (scopes, import edges, uses)
//!            ├─> Declaration arena (named entities, types)
//!            └─> Problem list (parse + semantic diagnostics)
//! ```
//!
//! Contexts, declarations and uses reference each other through stable
//! arena handles, never owned pointers, so any object can be rebuilt and
//! swapped during an incremental update without dangling the others.
//! Ranges live in the coordinate space of the top context's revision and
//! translate forward through the document's edit log.

mod chain;
mod context;
mod cursor;
mod declaration;
mod error;
mod handle;
mod identifier;
mod problem;
mod revision;
mod top_context;
mod types;

pub use chain::{read_lock, write_lock, DuChain};
pub use context::{ContextKind, DuContext, Use};
pub use cursor::{Cursor, Range};
pub use declaration::{Declaration, DeclarationKind, DeclarationKindTag, FunctionData};
pub use error::{DuChainError, Result};
pub use handle::{ContextId, DeclarationId};
pub use identifier::{Identifier, QualifiedIdentifier};
pub use problem::{DiagnosticLevel, Problem, ProblemSource, Severity};
pub use revision::{EditLog, Revision, TextEdit};
pub use top_context::TopContext;
pub use types::DuType;
