//! Pass 3: Intra-procedural Memory Analysis (§4.4).
//!
//! Classifies every memory write in a function by the `Absloc` of its
//! left-hand side: a stack-relative write at or above the RA slot marks the
//! function `self_writes` and the block `unsafe_block`; an unresolvable
//! write is treated the same way; a write to a statically-known heap
//! address (a global variable store) is ignored; a register destination is
//! not a memory write at all.

use crate::addr_expr::AddrExpr;
use crate::cfg_facade::{InstrCategory, ParsedProgram, StackHeight};
use crate::error::StructuralViolation;
use crate::ids::FuncId;
use crate::pass::SummaryMap;
use crate::summary::{FuncSummary, WriteSite};

/// The classification of a memory write's left-hand side, after SSA
/// conversion and stack-analysis-assisted resolution of the absolute
/// location it targets.
enum Absloc {
    Stack(i64),
    Unknown,
    Heap,
}

fn classify(expr: &AddrExpr, sp_height: Option<i64>) -> Absloc {
    if let Some(off) = expr.as_rsp_plus_imm() {
        if let Some(height) = sp_height {
            return Absloc::Stack(height + off);
        }
        return Absloc::Unknown;
    }
    // A write through a register that is not RSP-relative and whose base is
    // not provably a stack slot is conservatively Unknown unless the
    // expression is a bare immediate (a statically known address: Heap).
    let mut saw_reg = false;
    expr.fold(
        (),
        &mut |_, _| saw_reg = true,
        &mut |_, _| (),
    );
    if saw_reg {
        Absloc::Unknown
    } else {
        Absloc::Heap
    }
}

pub fn run(
    prog: &dyn ParsedProgram,
    fid: FuncId,
    summaries: &mut SummaryMap,
) -> Result<(), StructuralViolation> {
    let summary = summaries.entry(fid).or_insert_with(|| FuncSummary::new(fid));
    if summary.assume_unsafe {
        return Ok(());
    }
    let f = prog.function(fid);

    for bid in f.blocks() {
        let b = prog.block(bid);
        let entry_height = match prog.find_sp(fid, bid, b.start()) {
            StackHeight::Height(h) => Some(h),
            _ => None,
        };
        let end_height = match prog.find_sp(fid, bid, b.end()) {
            StackHeight::Height(h) => Some(h),
            _ => None,
        };
        if let Some(h) = entry_height {
            summary.block_entry_sp_height.insert(bid, h);
        }
        if let Some(h) = end_height {
            summary.block_end_sp_height.insert(bid, h);
        }

        for iid in b.instrs() {
            let instr = prog.instr(iid);
            if !instr.writes_memory() {
                continue;
            }
            if matches!(instr.category(), InstrCategory::Call | InstrCategory::Return) {
                // Frame switch: ignore, as with any call/return the write is
                // attributed to the callee's own frame-management code, not
                // to this function's memory-write classification.
                continue;
            }

            let site = WriteSite {
                addr: instr.addr(),
                block: bid,
            };

            let mut classified_as_stack_write = false;
            for mem in instr.mem_writes() {
                let expr = AddrExpr::from_operand(&mem);
                match classify(&expr, entry_height) {
                    Absloc::Stack(off) => {
                        summary.stack_writes.insert(off, site);
                        classified_as_stack_write = true;
                        if FuncSummary::is_unsafe_stack_offset(off) {
                            summary.self_writes = true;
                            summary.mark_unsafe_block(bid);
                        }
                    }
                    Absloc::Unknown => {
                        summary.self_writes = true;
                        summary.mark_unsafe_block(bid);
                        classified_as_stack_write = true;
                    }
                    Absloc::Heap => {}
                }
            }
            if !classified_as_stack_write {
                summary.all_writes.insert(instr.addr(), site);
            }
        }
    }

    // Safe under this pass alone iff no self-write, not already
    // assume_unsafe, and no callees (the leaf-safe closure; non-leaf
    // functions await the inter-procedural pass).
    summary.recompute_writes();
    Ok(())
}
