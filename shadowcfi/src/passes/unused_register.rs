//! Pass 11: Unused-Register & Red-Zone Analysis (§4.7).
//!
//! Leaf functions only. Scans every instruction once to build the set of
//! general-purpose registers never touched (`unused_regs`), the AVX/AVX-512
//! and MMX lane masks ([`RegisterUsageInfo`]), the function's red-zone
//! accesses, and whether it ever runs at a stack height ≥ 128 bytes
//! (`moveDownSP`).
//!
//! The GPR half of this resolves what the upstream prototype left as an
//! incomplete stub (`PopulateUnusedGprMask`): the same "touched" bookkeeping
//! already required for the AVX/MMX masks is reused for the 14 GPRs.

use crate::addr_expr::AddrExpr;
use crate::cfg_facade::{ParsedProgram, StackHeight};
use crate::error::StructuralViolation;
use crate::ids::FuncId;
use crate::pass::SummaryMap;
use crate::regs::{extract_numeric_postfix, normalize, Gpr};
use std::collections::BTreeSet;
use strum::IntoEnumIterator;

pub fn run(
    prog: &dyn ParsedProgram,
    fid: FuncId,
    summaries: &mut SummaryMap,
) -> Result<(), StructuralViolation> {
    let summary = summaries.entry(fid).or_insert_with(|| crate::summary::FuncSummary::new(fid));
    if !summary.callees.is_empty() {
        return Ok(());
    }

    let f = prog.function(fid);
    let mut touched_gprs: BTreeSet<&'static str> = BTreeSet::new();
    let mut touched_avx_mask = [false; 32];
    let mut touched_mmx_mask = [false; 8];
    let mut saw_fpu = false;
    let mut red_zone: BTreeSet<i64> = BTreeSet::new();
    let mut move_down_sp = false;

    for bid in f.blocks() {
        let b = prog.block(bid);
        for iid in b.instrs() {
            let instr = prog.instr(iid);

            for reg in instr.reads().into_iter().chain(instr.writes()) {
                let n = normalize(&reg);
                if let Some(gpr) = Gpr::iter().find(|g| {
                    let name: &'static str = (*g).into();
                    name.eq_ignore_ascii_case(&n)
                }) {
                    let name: &'static str = gpr.into();
                    touched_gprs.insert(name);
                } else if let Some(stripped) = n.strip_prefix('Y') {
                    if let Some(idx) = extract_numeric_postfix(stripped) {
                        touched_avx_mask[idx as usize * 2] = true;
                        touched_avx_mask[idx as usize * 2 + 1] = true;
                    }
                } else if let Some(stripped) = n.strip_prefix('X') {
                    if let Some(idx) = extract_numeric_postfix(stripped) {
                        touched_avx_mask[idx as usize * 2] = true;
                    }
                } else if let Some(stripped) = n.strip_prefix('M') {
                    if let Some(idx) = extract_numeric_postfix(stripped) {
                        if (idx as usize) < 8 {
                            touched_mmx_mask[idx as usize] = true;
                        }
                    }
                } else if n.starts_with("FP") {
                    saw_fpu = true;
                }
            }

            for mem in instr.mem_reads().into_iter().chain(instr.mem_writes()) {
                let expr = AddrExpr::from_operand(&mem);
                if let Some(off) = expr.as_rsp_plus_imm() {
                    if off < 0 {
                        red_zone.insert(off);
                    }
                }
            }

            if let StackHeight::Height(h) = prog.find_sp(fid, bid, instr.addr()) {
                if h >= 128 {
                    move_down_sp = true;
                }
            }
        }
    }

    summary.unused_regs = Gpr::iter()
        .map(|g| {
            let name: &'static str = g.into();
            name
        })
        .filter(|n| !touched_gprs.contains(n))
        .collect();

    summary.reg_usage.unused_avx_mask = touched_avx_mask.iter().map(|t| !t).collect();
    // MMX and the FPU stack share a register file; if the FPU stack is used
    // anywhere, MMX mode is never available, matching the upstream
    // analyzer's conservative rule.
    summary.reg_usage.unused_mmx_mask = if saw_fpu {
        Vec::new()
    } else {
        touched_mmx_mask.iter().map(|t| !t).collect()
    };

    summary.red_zone_access = red_zone;
    summary.move_down_sp = move_down_sp;

    Ok(())
}
