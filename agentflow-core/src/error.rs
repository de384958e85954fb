//! Error taxonomy for the composition → validation → lowering pipeline.
//!
//! Resolution and lowering fail fast with a single typed error; validation is
//! the one stage that aggregates, returning every structural problem in one
//! [`ValidationReport`].

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Render a cycle chain as `a.yaml -> b.yaml -> a.yaml`.
fn render_chain(chain: &[PathBuf]) -> String {
    chain
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(" -> ")
}

// ── Resolution-time errors ──

/// Errors raised while composing a multi-file document. None are retried;
/// each aborts the whole load.
#[derive(Error, Debug)]
pub enum ComposeError {
    /// A `$ref` target resolves outside the jail root.
    #[error("reference escapes workflow root: {} (root: {})", .path.display(), .root.display())]
    SecurityViolation { path: PathBuf, root: PathBuf },

    /// A `$ref` chain re-entered a file already being expanded. The chain
    /// runs from the first occurrence of the repeated file back to itself.
    #[error("cyclic reference: {}", render_chain(.chain))]
    CyclicReference { chain: Vec<PathBuf> },

    /// A referenced file does not exist inside the jail.
    #[error("referenced file not found: {}", .path.display())]
    NotFound { path: PathBuf },

    /// A file exists but is not well-formed structured data, or a composed
    /// document does not have the workflow shape.
    #[error("failed to parse {}: {}", .path.display(), .message)]
    Parse { path: PathBuf, message: String },

    /// A document value cannot be serialized in the requested format.
    #[error("failed to serialize document: {message}")]
    Serialize { message: String },

    /// Host read failure distinct from a missing file.
    #[error("failed to read {}: {}", .path.display(), .source)]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

// ── Validation-time errors ──

/// Which end of an edge is dangling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EdgeEndpoint {
    From,
    To,
}

impl fmt::Display for EdgeEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EdgeEndpoint::From => write!(f, "from"),
            EdgeEndpoint::To => write!(f, "to"),
        }
    }
}

/// One structural rule violation. Rule codes are stable and ordered:
/// V1 duplicate ids, V2 entry point, V3 dangling edges, V4 fallback targets.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StructuralViolation {
    #[error("[V1] duplicate node id '{id}' ({count} occurrences)")]
    DuplicateId { id: String, count: usize },

    #[error("[V2] entry point '{entry}' does not match any node")]
    MissingEntryPoint { entry: String },

    #[error("[V3] edge '{from}' -> '{to}': {endpoint} endpoint does not match any node")]
    DanglingEdge {
        from: String,
        to: String,
        endpoint: EdgeEndpoint,
    },

    #[error("[V4] node '{node}': on_fail target '{target}' does not match any node")]
    DanglingFallback { node: String, target: String },
}

impl StructuralViolation {
    /// Stable rule code for this violation.
    pub fn rule(&self) -> &'static str {
        match self {
            StructuralViolation::DuplicateId { .. } => "V1",
            StructuralViolation::MissingEntryPoint { .. } => "V2",
            StructuralViolation::DanglingEdge { .. } => "V3",
            StructuralViolation::DanglingFallback { .. } => "V4",
        }
    }
}

/// Non-fatal validation findings. Never cause rejection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationWarning {
    /// Node cannot be reached from the entry point by any edge, `next`
    /// pointer, branch, or fallback route.
    Unreachable { node: String },
}

impl fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationWarning::Unreachable { node } => {
                write!(f, "node '{}' is unreachable from the entry point", node)
            }
        }
    }
}

/// Every structural violation found in one validation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub violations: Vec<StructuralViolation>,
}

impl ValidationReport {
    pub fn is_empty(&self) -> bool {
        self.violations.is_empty()
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lines: Vec<String> = self.violations.iter().map(|v| v.to_string()).collect();
        write!(f, "{}", lines.join("\n"))
    }
}

// ── Lowering-time errors ──

/// A mapping rule that cannot be satisfied during lowering.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoweringError {
    #[error("node '{id}': unknown kind '{kind}' cannot be lowered")]
    UnknownKind { id: String, kind: String },

    #[error("router '{id}' declares no branches")]
    EmptyRouter { id: String },

    /// Post-lowering referential integrity re-check failure.
    #[error("lowered edge '{from}' -> '{to}' references a missing node")]
    DanglingEdge { from: String, to: String },
}

// ── Pipeline umbrella ──

/// Umbrella error for the load → build → lower convenience chain. No stage
/// swallows or downgrades an error from a stage beneath it.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Compose(#[from] ComposeError),

    #[error("structural validation failed:\n{0}")]
    Validation(ValidationReport),

    #[error(transparent)]
    Lowering(#[from] LoweringError),
}
