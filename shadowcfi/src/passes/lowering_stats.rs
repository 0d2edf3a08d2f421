//! Pass 8: Lowering Statistics (§4.5, "Statistics").

use crate::cfg_facade::ParsedProgram;
use crate::error::StructuralViolation;
use crate::ids::{FuncId, SccId};
use crate::pass::SummaryMap;
use std::collections::HashMap;

/// Walks every entry-to-terminal path once, counting it as unsafe the
/// moment it crosses a `stack_push`, safe otherwise. Memoized per node +
/// "already unsafe" flag to keep the walk linear in lowered-node count
/// rather than exponential in path count.
fn count_paths(
    summary: &crate::summary::FuncSummary,
    id: SccId,
    already_unsafe: bool,
    memo: &mut HashMap<(SccId, bool), (u64, u64)>,
) -> (u64, u64) {
    if let Some(&cached) = memo.get(&(id, already_unsafe)) {
        return cached;
    }
    let node = summary.cfg.get(id);
    let next_unsafe = already_unsafe || node.stack_push || node.header_instrumentation;

    let result = if node.children.is_empty() {
        if next_unsafe {
            (0, 1)
        } else {
            (1, 0)
        }
    } else {
        let mut safe = 0u64;
        let mut unsafe_ = 0u64;
        for &child in &node.children {
            let (s, u) = count_paths(summary, child, next_unsafe, memo);
            safe += s;
            unsafe_ += u;
        }
        (safe, unsafe_)
    };
    memo.insert((id, already_unsafe), result);
    result
}

pub fn run(
    prog: &dyn ParsedProgram,
    fid: FuncId,
    summaries: &mut SummaryMap,
) -> Result<(), StructuralViolation> {
    let _ = prog;
    let summary = match summaries.get_mut(&fid) {
        Some(s) => s,
        None => return Ok(()),
    };
    summary.stats.n_lowered_nodes = summary.cfg.len();
    let original = summary.stats.n_original_nodes.max(1) as f64;
    summary.stats.increase = (summary.stats.n_lowered_nodes as f64 - original) / original;

    if let Some(root) = summary.effective_root() {
        let mut memo = HashMap::new();
        let (safe, unsafe_) = count_paths(summary, root, false, &mut memo);
        summary.stats.safe_paths = safe;
        summary.stats.unsafe_paths = unsafe_;
        summary.safe_paths = safe;
        let total = safe + unsafe_;
        summary.stats.safe_ratio = if total == 0 {
            1.0
        } else {
            safe as f64 / total as f64
        };
    }

    Ok(())
}
