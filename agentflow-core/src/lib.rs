//! # Agent Workflow Compiler
//!
//! Authoring-time compiler for declarative agent workflow manifests.
//!
//! A manifest may span multiple YAML/JSON files linked by `$ref` markers.
//! The pipeline loads and securely composes them into one document, builds a
//! graph of the execution topology, validates its structural invariants, and
//! lowers it into the simplified vocabulary the execution runtime consumes.
//!
//! ```yaml
//! version: "1"
//! kind: agent_workflow
//! metadata:
//!   name: underwriting
//! entry: triage
//! nodes:
//!   - id: triage
//!     kind: agent
//!     model: small
//!     next: route
//!   - id: route
//!     kind: router
//!     branches:
//!       - when: "score > 0.8"
//!         to: approve
//!       - to: escalate
//!   - id: approve
//!     kind: human
//!   - id: escalate
//!     kind: council
//!     members: [senior_a, senior_b]
//! ```
//!
//! Pipeline: `load` → [`Document`] → `build_and_validate` → [`Graph`] →
//! `lower` → [`IRGraph`]. The compiler never executes agent logic and never
//! makes network calls; it only produces a validated graph artifact or a
//! typed rejection.

use std::path::Path;

use tracing::{info, warn};

pub mod authoring;
pub mod compiler;
pub mod compose;
pub mod error;

pub use authoring::{build_and_validate, BuildOutput, Graph, WorkflowDto};
pub use compiler::{lower, IRGraph, PersistenceMode};
pub use compose::{dump, load, load_with, Document};
pub use error::{
    ComposeError, LoweringError, PipelineError, StructuralViolation, ValidationReport,
    ValidationWarning,
};

/// Full chain: load and compose the manifest at `entry`, build and validate
/// the graph, lower it. Warnings are logged, never fatal.
pub fn compile(entry: impl AsRef<Path>) -> Result<IRGraph, PipelineError> {
    let doc = compose::load(entry)?;
    let output = authoring::build_and_validate(&doc)?;
    for warning in &output.warnings {
        warn!("{}: {}", doc.path.display(), warning);
    }
    let ir = compiler::lower(&output.graph)?;
    info!(
        "compiled {} ({} node(s), version {})",
        doc.path.display(),
        ir.nodes.len(),
        &ir.version_hash()[..12]
    );
    Ok(ir)
}
