//! Pass 7: Validate CFG (§4.5, "Validate").
//!
//! The only pass permitted to return a fatal [`StructuralViolation`] (§9,
//! "intrusive assertion aborts" requirement: recoverable errors propagate,
//! only this check is fatal, via the top-level reporter). Walks the lowered
//! DAG and fails if any node reached on an already-unsafe path still
//! carries `stack_push` or `header_instrumentation` — such a node would
//! double-instrument a path that is already fully guarded.

use crate::cfg_facade::ParsedProgram;
use crate::error::StructuralViolation;
use crate::ids::{FuncId, SccId};
use crate::pass::SummaryMap;
use std::collections::BTreeSet;

pub fn run(
    prog: &dyn ParsedProgram,
    fid: FuncId,
    summaries: &mut SummaryMap,
) -> Result<(), StructuralViolation> {
    let _ = prog;
    let summary = match summaries.get(&fid) {
        Some(s) => s,
        None => return Ok(()),
    };
    let Some(root) = summary.effective_root() else {
        return Ok(());
    };

    let mut visited: BTreeSet<SccId> = BTreeSet::new();
    // `already_unsafe` walks alongside: once a path has crossed a
    // `stack_push`, every subsequent node on that path is "already
    // guarded", so encountering a *second* push or absorbed header on the
    // same path is the violation this pass exists to catch.
    let mut stack = vec![(root, false)];
    while let Some((id, already_unsafe)) = stack.pop() {
        if !visited.insert(id) {
            continue;
        }
        let node = summary.cfg.get(id);
        if already_unsafe && (node.stack_push || node.header_instrumentation) {
            return Err(StructuralViolation::UnsafePushReachable { func: fid });
        }
        let next_unsafe = already_unsafe || node.stack_push || node.header_instrumentation;
        for &child in &node.children {
            stack.push((child, next_unsafe));
        }
    }

    Ok(())
}
