//! Pass 1: Call-Graph Analysis.
//!
//! Populates `callees`/`callers`/`has_unknown_cf`/`has_indirect_cf`/
//! `has_plt_call`, and sets `assume_unsafe` when a function has unresolved
//! control flow or calls through the PLT.

use crate::call_graph::{resolve_indirect, CallGraph, IndirectResolution};
use crate::cfg_facade::{EdgeKind, ParsedProgram};
use crate::error::StructuralViolation;
use crate::pass::SummaryMap;
use crate::summary::FuncSummary;

pub fn run(prog: &dyn ParsedProgram, summaries: &mut SummaryMap) -> Result<(), StructuralViolation> {
    let mut cg = CallGraph::build(prog)?;
    cg.populate_direct_edges(prog);

    for fid in prog.functions() {
        let f = prog.function(fid);
        if f.is_plt_stub() {
            continue;
        }
        let summary = summaries
            .entry(fid)
            .or_insert_with(|| FuncSummary::new(fid));

        for callee in cg.callees.get(&fid).cloned().unwrap_or_default() {
            summary.callees.insert(callee);
        }

        for bid in f.blocks() {
            let b = prog.block(bid);
            for edge in b.outgoing() {
                match edge.kind {
                    EdgeKind::Call if edge.sink => {
                        // Backward-slice the sink block's terminating
                        // call-through-register instruction for a constant
                        // PC (§4.2). Always safe when it fails: the edge
                        // just falls through to `Unresolved` below.
                        match resolve_indirect(bid, prog) {
                            Ok(IndirectResolution::Resolved(target)) => {
                                summary.callees.insert(target);
                                summary.has_indirect_cf = true;
                            }
                            Ok(IndirectResolution::Unresolved) => {
                                summary.has_unknown_cf = true;
                            }
                            Err(_) => {
                                // UnparseableInstruction: non-fatal, leave
                                // the edge unresolved.
                                summary.has_unknown_cf = true;
                            }
                        }
                    }
                    EdgeKind::Indirect if edge.sink => {
                        summary.has_unknown_cf = true;
                    }
                    EdgeKind::Call => {
                        if let Some(target) = edge.target {
                            let callee_fid = prog.owning_function(target);
                            if let Some(name) = Some(prog.function(callee_fid).name()) {
                                if prog.function(callee_fid).is_plt_stub()
                                    || cg.resolve_name(name).is_none()
                                {
                                    summary.has_plt_call = true;
                                }
                            }
                        }
                    }
                    _ => {}
                }
            }
        }

        for callee in &summary.callees {
            if prog.function(*callee).is_plt_stub() {
                summary.has_plt_call = true;
            }
        }

        if summary.has_unknown_cf || summary.has_plt_call {
            summary.assume_unsafe = true;
        }
        summary.recompute_writes();
    }

    // Populate reverse (caller) edges now that every function's callees are
    // final.
    let edges: Vec<(_, _)> = summaries
        .iter()
        .flat_map(|(&fid, s)| s.callees.iter().map(move |&c| (fid, c)).collect::<Vec<_>>())
        .collect();
    for (caller, callee) in edges {
        if let Some(callee_summary) = summaries.get_mut(&callee) {
            callee_summary.callers.insert(caller);
        }
    }

    Ok(())
}
