//! Indexing pipeline: open documents, schedule parse jobs, keep the chain
//! current.
//!
//! ```text
//! open/edit ──> DocumentRegistry ──snapshot──> ParseSession ──tree──>
//!     DuBuilder ──reconcile──> TopContext (on the DuChain)
//! ```
//!
//! Edits are cheap bookkeeping; all heavy work happens in parse jobs on the
//! blocking pool, serialized per document and bounded across documents.

mod documents;
mod error;
mod indexer;
mod scanner;
mod stats;

pub use documents::{DocumentRegistry, DocumentSnapshot};
pub use error::{IndexerError, Result};
pub use indexer::{Indexer, IndexerConfig, JobOutcome, ParseJob};
pub use scanner::FileScanner;
pub use stats::IndexStats;
