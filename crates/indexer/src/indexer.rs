//! Parse-job scheduling over the chain: one registry of open documents, a
//! bounded pool of background build jobs, and cooperative abort.
//!
//! Per-document ordering is enforced by the chain's parse lock, taken for
//! the whole parse-and-build span of a job; cross-document jobs run in
//! parallel up to the configured bound.

use crate::documents::DocumentRegistry;
use crate::error::{IndexerError, Result};
use crate::scanner::FileScanner;
use crate::stats::IndexStats;
use duchain::{read_lock, DuChain, DuChainError, Problem, Range, Revision, TopContext};
use duchain_builder::{BuildInput, BuilderError, DuBuilder, LanguageFlags, ParseSession};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

#[derive(Debug, Clone, Copy)]
pub struct IndexerConfig {
    /// Upper bound on concurrently running parse jobs.
    pub parallelism: usize,
    pub flags: LanguageFlags,
    /// Record hint problems for unresolved names.
    pub report_unresolved: bool,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            parallelism: 4,
            flags: LanguageFlags::default(),
            report_unresolved: false,
        }
    }
}

/// Outcome of one parse job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Completed {
        /// Whether the pass changed a symbol-table scope; hosts use this to
        /// requeue documents that import this one.
        structurally_significant: bool,
    },
    Aborted,
}

/// Handle to one scheduled build of a document. Aborting is cooperative:
/// the job observes the flag at its checkpoints and gives up before
/// touching the store.
#[derive(Debug, Clone)]
pub struct ParseJob {
    document: String,
    abort: Arc<AtomicBool>,
}

impl ParseJob {
    pub fn new(document: impl Into<String>) -> Self {
        Self {
            document: document.into(),
            abort: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn document(&self) -> &str {
        &self.document
    }

    pub fn abort(&self) {
        self.abort.store(true, Ordering::Relaxed);
    }

    pub fn is_aborted(&self) -> bool {
        self.abort.load(Ordering::Relaxed)
    }
}

#[derive(Clone)]
pub struct Indexer {
    chain: Arc<DuChain>,
    documents: Arc<DocumentRegistry>,
    semaphore: Arc<Semaphore>,
    config: IndexerConfig,
}

impl Indexer {
    pub fn new(config: IndexerConfig) -> Self {
        Self {
            chain: Arc::new(DuChain::new()),
            documents: Arc::new(DocumentRegistry::new()),
            semaphore: Arc::new(Semaphore::new(config.parallelism.max(1))),
            config,
        }
    }

    pub fn chain(&self) -> &Arc<DuChain> {
        &self.chain
    }

    pub fn documents(&self) -> &Arc<DocumentRegistry> {
        &self.documents
    }

    /// Open a document for indexing. Re-opening replaces the text and
    /// discards the edit history, so the existing tree is cleared: without
    /// translatable coordinates, matching against it would pair unrelated
    /// objects.
    pub fn open_document(&self, document: &str, content: impl Into<String>) -> Revision {
        let reopened = self.documents.is_open(document);
        let revision = self.documents.open(document, content);
        if reopened {
            if let Some(top) = self.chain.lookup(document) {
                self.chain.delete_tree(&top);
            }
        }
        revision
    }

    /// Close a document and drop its tree from the chain.
    pub fn close_document(&self, document: &str) -> bool {
        let was_open = self.documents.close(document);
        self.chain.remove(document) || was_open
    }

    /// Apply a text edit to an open document. The index catches up on the
    /// next parse job; until then lookups see the previous revision.
    pub fn apply_edit(&self, document: &str, range: Range, new_text: &str) -> Result<Revision> {
        self.documents.apply_edit(document, range, new_text)
    }

    /// Parse and build one document on the calling thread. Takes the
    /// document's parse lock for the whole span, so concurrent jobs for the
    /// same document serialize while other documents proceed.
    pub fn index_document_sync(
        &self,
        document: &str,
        abort: Option<&AtomicBool>,
    ) -> Result<JobOutcome> {
        let parse_lock = self.chain.parse_lock(document);
        let _guard = parse_lock.lock().unwrap_or_else(PoisonError::into_inner);
        if aborted(abort) {
            log::debug!("job for {document} aborted before parse");
            return Ok(JobOutcome::Aborted);
        }
        let snapshot = self.documents.snapshot(document)?;
        let mut session = ParseSession::new(self.config.flags)?;
        let parsed = session.parse(&snapshot.content)?;
        if aborted(abort) {
            log::debug!("job for {document} aborted before build");
            return Ok(JobOutcome::Aborted);
        }
        let input = BuildInput {
            document,
            content: &snapshot.content,
            revision: snapshot.revision,
            edits: Some(&snapshot.edits),
            flags: self.config.flags,
            report_unresolved: self.config.report_unresolved,
            abort,
        };
        let top = match self.chain.lookup(document) {
            Some(existing) => existing,
            None => self.chain.register(TopContext::new(document)),
        };
        let mut builder = DuBuilder::new(&input, Arc::clone(&top));
        match builder.run(&parsed) {
            Ok(()) => {}
            Err(BuilderError::Aborted) => return Ok(JobOutcome::Aborted),
            Err(err) => return Err(err.into()),
        }
        self.documents.prune_edits(document, snapshot.revision);
        Ok(JobOutcome::Completed {
            structurally_significant: builder.was_structurally_significant(),
        })
    }

    /// Run a parse job on the blocking pool, bounded by the configured
    /// parallelism.
    pub async fn run_job(&self, job: &ParseJob) -> Result<JobOutcome> {
        // The semaphore is never closed; acquire failures are not expected.
        let _permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .unwrap_or_else(|_| unreachable!("parse concurrency semaphore closed"));
        let indexer = self.clone();
        let document = job.document.clone();
        let abort = Arc::clone(&job.abort);
        tokio::task::spawn_blocking(move || indexer.index_document_sync(&document, Some(&abort)))
            .await
            .map_err(|err| IndexerError::Join(err.to_string()))?
    }

    /// Scan a directory tree for C sources and index all of them.
    pub async fn index_all(&self, root: impl AsRef<Path>) -> Result<IndexStats> {
        let files = FileScanner::new(root.as_ref()).scan();
        log::info!(
            "Indexing {} C sources under {}",
            files.len(),
            root.as_ref().display()
        );
        let mut set = JoinSet::new();
        for path in files {
            let indexer = self.clone();
            set.spawn(async move {
                let document = path.to_string_lossy().into_owned();
                let content = match tokio::fs::read_to_string(&path).await {
                    Ok(content) => content,
                    Err(err) => return Err((document, IndexerError::from(err))),
                };
                indexer.open_document(&document, content);
                let job = ParseJob::new(document.clone());
                match indexer.run_job(&job).await {
                    Ok(_) => Ok(document),
                    Err(err) => Err((document, err)),
                }
            });
        }
        let mut stats = IndexStats::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(Ok(document)) => self.accumulate(&document, &mut stats),
                Ok(Err((document, err))) => stats.add_error(format!("{document}: {err}")),
                Err(err) => stats.add_error(format!("task failed: {err}")),
            }
        }
        Ok(stats)
    }

    /// Top context registered for a document. `MissingContext` means no
    /// build has completed for it yet; callers treat that as "no semantic
    /// info", not as corruption.
    pub fn top_context(&self, document: &str) -> Result<Arc<RwLock<TopContext>>> {
        self.chain.lookup(document).ok_or_else(|| {
            log::warn!("no semantic context registered for {document}");
            DuChainError::MissingContext(document.to_string()).into()
        })
    }

    /// Problems recorded for a document by its last completed build.
    pub fn problems_for(&self, document: &str) -> Vec<Problem> {
        match self.chain.lookup(document) {
            Some(top) => read_lock(&top).problems.clone(),
            None => Vec::new(),
        }
    }

    /// Aggregate statistics across every document on the chain.
    pub fn stats(&self) -> IndexStats {
        let mut stats = IndexStats::new();
        for document in self.chain.documents() {
            self.accumulate(&document, &mut stats);
        }
        stats
    }

    fn accumulate(&self, document: &str, stats: &mut IndexStats) {
        if let Some(top) = self.chain.lookup(document) {
            let top = read_lock(&top);
            stats.add_document(
                top.context_count(),
                top.declaration_count(),
                top.use_count(),
                top.problems.len(),
            );
        }
    }
}

fn aborted(flag: Option<&AtomicBool>) -> bool {
    flag.map_or(false, |flag| flag.load(Ordering::Relaxed))
}
