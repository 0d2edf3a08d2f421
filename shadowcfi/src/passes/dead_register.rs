//! Pass 9: Dead-Register Analysis, whole-function granularity (§4.6).
//!
//! Standard backward liveness over the block graph, tracking a bit-set
//! indexed by the ABI caller-saved GPRs. `dead_at_entry` is the complement
//! of the entry block's live-in set; `dead_at_exit` is the complement of
//! each exit block's live-out set.

use crate::cfg_facade::{EdgeKind, ParsedProgram};
use crate::error::StructuralViolation;
use crate::ids::{BlockId, FuncId};
use crate::pass::SummaryMap;
use crate::regs::{normalize, CALLER_SAVED};
use fxhash::FxHashMap;
use std::collections::BTreeSet;

fn caller_saved_name(g: crate::regs::Gpr) -> &'static str {
    let s: &'static str = g.into();
    s
}

fn live_in_for_block(
    prog: &dyn ParsedProgram,
    block: BlockId,
    live_out: &BTreeSet<&'static str>,
) -> BTreeSet<&'static str> {
    let b = prog.block(block);
    let mut live = live_out.clone();
    for iid in b.instrs().into_iter().rev() {
        let instr = prog.instr(iid);
        for w in instr.writes() {
            let n = normalize(&w);
            if let Some(g) = CALLER_SAVED.iter().find(|g| caller_saved_name(**g) == n) {
                if instr.writes_full_register(&n) {
                    live.remove(caller_saved_name(*g));
                }
            }
        }
        for r in instr.reads() {
            let n = normalize(&r);
            if let Some(g) = CALLER_SAVED.iter().find(|g| caller_saved_name(**g) == n) {
                live.insert(caller_saved_name(*g));
            }
        }
    }
    live
}

pub fn run(
    prog: &dyn ParsedProgram,
    fid: FuncId,
    summaries: &mut SummaryMap,
) -> Result<(), StructuralViolation> {
    let f = prog.function(fid);
    let blocks = f.blocks();
    if blocks.is_empty() {
        return Ok(());
    }

    // Fixed-point backward dataflow: live-out[b] = union of live-in[succ]
    // over b's non-sink successors; live-in[b] computed by the reverse
    // instruction scan above.
    let mut live_in: FxHashMap<BlockId, BTreeSet<&'static str>> = FxHashMap::default();
    let mut live_out: FxHashMap<BlockId, BTreeSet<&'static str>> = FxHashMap::default();
    for &b in &blocks {
        live_in.insert(b, BTreeSet::new());
        live_out.insert(b, BTreeSet::new());
    }

    let mut changed = true;
    let mut iterations = 0usize;
    while changed && iterations < blocks.len() * 4 + 16 {
        changed = false;
        iterations += 1;
        for &b in &blocks {
            let bref = prog.block(b);
            let mut new_out = BTreeSet::new();
            for edge in bref.outgoing() {
                if edge.sink || matches!(edge.kind, EdgeKind::Call) {
                    continue;
                }
                if let Some(target) = edge.target {
                    new_out.extend(live_in.get(&target).cloned().unwrap_or_default());
                }
            }
            let new_in = live_in_for_block(prog, b, &new_out);
            if new_in != live_in[&b] || new_out != live_out[&b] {
                changed = true;
            }
            live_in.insert(b, new_in);
            live_out.insert(b, new_out);
        }
    }

    let summary = summaries.entry(fid).or_insert_with(|| crate::summary::FuncSummary::new(fid));

    let entry_live_in = live_in.get(&f.entry()).cloned().unwrap_or_default();
    summary.dead_at_entry = CALLER_SAVED
        .iter()
        .map(|g| caller_saved_name(*g))
        .filter(|n| !entry_live_in.contains(n))
        .collect();

    for exit_block in f.exit_blocks() {
        let bref = prog.block(exit_block);
        let out = live_out.get(&exit_block).cloned().unwrap_or_default();
        let dead: BTreeSet<&'static str> = CALLER_SAVED
            .iter()
            .map(|g| caller_saved_name(*g))
            .filter(|n| !out.contains(n))
            .collect();
        summary.dead_at_exit.insert(bref.end(), dead);
    }

    Ok(())
}
