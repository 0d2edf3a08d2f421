//! Pass 12: Safe-Path Counting (§4.3 step 12).
//!
//! Enumerates acyclic paths through the function's original block CFG
//! (not the lowered SCC DAG — this is the final per-function verdict, and
//! the lowered DAG's own path counts are diagnostic statistics from
//! `lowering_stats`) that avoid every `unsafe_block`, and sets the final
//! `safe` verdict.
//!
//! A function is `safe` either by the leaf-safe closure (no writes, no
//! callees) or, in the stronger form, when every entry-to-exit path
//! consists entirely of safe blocks. Path enumeration is capped to bound
//! pathological blowup on deeply-branching functions; a capped function is
//! conservatively left `assume_unsafe` rather than silently declared safe.

use crate::cfg_facade::{EdgeKind, ParsedProgram};
use crate::error::StructuralViolation;
use crate::ids::{BlockId, FuncId};
use crate::pass::SummaryMap;
use std::collections::BTreeSet;

/// Upper bound on acyclic paths walked before giving up and treating the
/// function conservatively as unsafe for this pass.
const MAX_PATHS_EXPLORED: u64 = 100_000;

struct Walk<'a> {
    prog: &'a dyn ParsedProgram,
    unsafe_blocks: &'a BTreeSet<BlockId>,
    explored: u64,
    capped: bool,
}

impl<'a> Walk<'a> {
    fn visit(&mut self, block: BlockId, path: &mut Vec<BlockId>, safe_paths: &mut u64) {
        if self.capped || self.explored >= MAX_PATHS_EXPLORED {
            self.capped = true;
            return;
        }
        if path.contains(&block) {
            // Cycle: stop walking this branch (paths are acyclic by
            // definition here; loops were already collapsed into SCCs
            // upstream for the lowered-DAG statistics).
            return;
        }
        path.push(block);
        if self.unsafe_blocks.contains(&block) {
            self.explored += 1;
            path.pop();
            return;
        }

        let b = self.prog.block(block);
        let succs: Vec<_> = b
            .outgoing()
            .into_iter()
            .filter(|e| !matches!(e.kind, EdgeKind::Call | EdgeKind::CallFt))
            .collect();

        if succs.is_empty() || succs.iter().all(|e| e.sink || e.target.is_none()) {
            // Terminal (return or unresolved sink): this path is entirely
            // safe.
            self.explored += 1;
            *safe_paths += 1;
            path.pop();
            return;
        }

        for edge in succs {
            if edge.sink {
                continue;
            }
            if let Some(target) = edge.target {
                self.visit(target, path, safe_paths);
                if self.capped {
                    break;
                }
            }
        }
        path.pop();
    }
}

pub fn run(
    prog: &dyn ParsedProgram,
    fid: FuncId,
    summaries: &mut SummaryMap,
) -> Result<(), StructuralViolation> {
    let f = prog.function(fid);
    let summary = summaries.entry(fid).or_insert_with(|| crate::summary::FuncSummary::new(fid));

    if !summary.writes && summary.callees.is_empty() && !summary.assume_unsafe {
        summary.safe = true;
        summary.safe_paths = 1;
        return Ok(());
    }

    if summary.assume_unsafe {
        summary.safe = false;
        return Ok(());
    }

    let mut walk = Walk {
        prog,
        unsafe_blocks: &summary.unsafe_blocks,
        explored: 0,
        capped: false,
    };
    let mut safe_paths = 0u64;
    let mut path = Vec::new();
    walk.visit(f.entry(), &mut path, &mut safe_paths);

    if walk.capped {
        log::info!(
            "safe-path counting capped at {} explored paths for function {:?}; treating conservatively unsafe",
            MAX_PATHS_EXPLORED,
            fid
        );
        summary.safe = false;
        return Ok(());
    }

    summary.safe_paths = safe_paths;
    summary.safe = walk.explored == safe_paths && safe_paths > 0;
    Ok(())
}
