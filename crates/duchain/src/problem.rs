use crate::cursor::Range;
use serde::{Deserialize, Serialize};

/// Editor-facing severity of a recorded problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Hint,
    Warning,
    Error,
}

/// Diagnostic levels as reported by parse frontends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticLevel {
    Ignored,
    Note,
    Warning,
    Error,
    Fatal,
}

impl DiagnosticLevel {
    /// Map a parser diagnostic level onto an editor severity. Note-level
    /// diagnostics map to Hint and are never dropped.
    pub fn severity(self) -> Severity {
        match self {
            DiagnosticLevel::Ignored | DiagnosticLevel::Note => Severity::Hint,
            DiagnosticLevel::Warning => Severity::Warning,
            DiagnosticLevel::Error | DiagnosticLevel::Fatal => Severity::Error,
        }
    }
}

/// Origin of a problem on a top context's problem list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProblemSource {
    Parser,
    SemanticAnalysis,
}

/// One diagnostic attached to a document's top context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Problem {
    pub severity: Severity,
    pub message: String,
    pub range: Range,
    pub source: ProblemSource,
}

impl Problem {
    pub fn new(
        severity: Severity,
        message: impl Into<String>,
        range: Range,
        source: ProblemSource,
    ) -> Self {
        Self {
            severity,
            message: message.into(),
            range,
            source,
        }
    }

    pub fn hint(message: impl Into<String>, range: Range) -> Self {
        Self::new(Severity::Hint, message, range, ProblemSource::SemanticAnalysis)
    }
}
