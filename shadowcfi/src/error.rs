//! Error taxonomy.
//!
//! Only [`ShadowCfiError::Structural`] and [`ShadowCfiError::Emission`] ever
//! terminate the pipeline; every other variant is handled at the call site
//! by degrading the affected function to `assume_unsafe` and continuing.

use crate::ids::FuncId;
use thiserror::Error;

/// Recoverable, per-function analysis failure. Never propagated as a hard
/// error out of a pass; the pass that triggers one folds it into
/// `assume_unsafe` on the relevant summary and moves on.
#[derive(Error, Debug)]
pub enum AnalysisFailure {
    #[error("could not decode instruction at {addr:#x}")]
    UnparseableInstruction { addr: u64 },
    #[error("missing stack height for block at {addr:#x}")]
    MissingStackHeight { addr: u64 },
    #[error("liveness query returned no answer at {addr:#x}")]
    IndeterminateLiveness { addr: u64 },
}

/// Fatal: a contract the analyzer requires to hold has been violated.
#[derive(Error, Debug)]
pub enum StructuralViolation {
    #[error("duplicate definition of function `{name}` not on the ignore list")]
    DuplicateDefinition { name: String },
    #[error("stack_push or header_instrumentation node reachable on an already-unsafe path in function {func:?}")]
    UnsafePushReachable { func: FuncId },
}

/// Fatal, scoped to a single emission site.
#[derive(Error, Debug)]
pub enum EmissionFailure {
    #[error("backend requires an unused register but none is available at {addr:#x}")]
    NoUnusedRegister { addr: u64 },
    #[error("jump-table slot alignment not achievable (slot {slot} would be {len} bytes, want {want})")]
    SlotAlignment { slot: usize, len: usize, want: usize },
}

/// Cache file open/lock failure. Logged, never fatal.
#[derive(Error, Debug)]
pub enum IoFailure {
    #[error("failed to open cache file {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to acquire advisory lock on cache file {path}")]
    Lock { path: String },
    #[error("malformed cache record: {line}")]
    Malformed { line: String },
}

#[derive(Error, Debug)]
pub enum ShadowCfiError {
    #[error(transparent)]
    Analysis(#[from] AnalysisFailure),
    #[error(transparent)]
    Structural(#[from] StructuralViolation),
    #[error(transparent)]
    Emission(#[from] EmissionFailure),
    #[error(transparent)]
    Io(#[from] IoFailure),
}
