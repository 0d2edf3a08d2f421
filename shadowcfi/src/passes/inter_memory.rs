//! Pass 4: Inter-procedural Memory Analysis (§4.3 step 4).
//!
//! `child_writes := ⋁ callee.writes`, propagated to a fixed point over the
//! (possibly cyclic) call graph with an explicit worklist rather than
//! recursion, mirroring the conservative "assume unknown call targets
//! write" propagation rule.

use crate::cfg_facade::ParsedProgram;
use crate::error::StructuralViolation;
use crate::pass::SummaryMap;
use std::collections::VecDeque;

pub fn run(prog: &dyn ParsedProgram, summaries: &mut SummaryMap) -> Result<(), StructuralViolation> {
    let all: Vec<_> = summaries.keys().copied().collect();
    let mut worklist: VecDeque<_> = all.into_iter().collect();

    let mut iterations_remaining = summaries.len().saturating_mul(summaries.len()).max(64);

    while let Some(fid) = worklist.pop_front() {
        if iterations_remaining == 0 {
            break;
        }
        iterations_remaining -= 1;

        let callees: Vec<_> = match summaries.get(&fid) {
            Some(s) => s.callees.iter().copied().collect(),
            None => continue,
        };

        let child_writes = callees.iter().any(|c| {
            summaries
                .get(c)
                .map(|s| s.writes || !prog.function(*c).is_plt_stub() && s.assume_unsafe)
                .unwrap_or(true) // unknown callee: conservative "assume writes"
        });

        let summary = summaries.get_mut(&fid).unwrap();
        if summary.child_writes != child_writes {
            summary.child_writes = child_writes;
            let before = summary.writes;
            summary.recompute_writes();
            if summary.writes != before {
                for caller in summary.callers.clone() {
                    worklist.push_back(caller);
                }
            }
        } else {
            summary.recompute_writes();
        }
    }

    Ok(())
}
