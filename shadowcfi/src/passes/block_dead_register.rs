//! Pass 10: Block-Dead-Register Analysis (§4.6, instruction-granular).
//!
//! Per block, a reverse scan records the set of registers dead *after*
//! each instruction, then two forward/backward scans (`entry`/`exit`
//! placement) locate the earliest point at which up to two scratch
//! registers become free without requiring an extra `push`/`pop`.

use crate::cfg_facade::ParsedProgram;
use crate::error::StructuralViolation;
use crate::ids::FuncId;
use crate::pass::SummaryMap;
use crate::regs::{normalize, CALLER_SAVED, Gpr};
use crate::summary::MoveInstData;
use std::collections::BTreeSet;

fn gpr_name(g: Gpr) -> &'static str {
    let s: &'static str = g.into();
    s
}

/// Reverse-scan a block's instructions, recording per-address the set of
/// caller-saved GPRs dead after that instruction. A full 64-/32-bit write
/// kills the register (its prior value is provably dead from this point
/// backward); a partial 8/16-bit write does not kill, since it merges with
/// the high bits and may still expose a live value; any read re-generates
/// liveness (the register is live immediately before the read).
fn block_local_dead_sets(
    prog: &dyn ParsedProgram,
    block: crate::ids::BlockId,
    live_at_block_end: &BTreeSet<&'static str>,
) -> Vec<(u64, BTreeSet<&'static str>)> {
    let b = prog.block(block);
    let mut live = live_at_block_end.clone();
    let mut out = Vec::new();
    for iid in b.instrs().into_iter().rev() {
        let instr = prog.instr(iid);
        let dead_after: BTreeSet<&'static str> = CALLER_SAVED
            .iter()
            .map(|g| gpr_name(*g))
            .filter(|n| !live.contains(n))
            .collect();
        out.push((instr.addr(), dead_after));

        for w in instr.writes() {
            let n = normalize(&w);
            if let Some(g) = CALLER_SAVED.iter().find(|g| gpr_name(**g) == n) {
                if instr.writes_full_register(&n) {
                    live.remove(gpr_name(*g));
                }
            }
        }
        for r in instr.reads() {
            let n = normalize(&r);
            if let Some(g) = CALLER_SAVED.iter().find(|g| gpr_name(**g) == n) {
                live.insert(gpr_name(*g));
            }
        }
    }
    out.reverse();
    out
}

/// `CalculateEntryInstPoint`: scan forward from block entry accumulating
/// `cur_height` across pushes, taking up to 2 dead registers at each
/// instruction and remembering the running best. Stops at 2 dead regs, a
/// memory write, or a non-push RSP mutation.
fn entry_placement(
    prog: &dyn ParsedProgram,
    block: crate::ids::BlockId,
    dead_sets: &[(u64, BTreeSet<&'static str>)],
) -> (Option<MoveInstData>, Option<MoveInstData>) {
    let b = prog.block(block);
    let mut cur_height: i64 = 0;
    let mut best: Option<MoveInstData> = None;
    let mut fixed: Option<MoveInstData> = None;

    for (pos, iid) in b.instrs().into_iter().enumerate() {
        let instr = prog.instr(iid);
        let dead = &dead_sets[pos].1;
        let mut it = dead.iter();
        let reg1 = it.next().copied();
        let reg2 = it.next().copied();

        if reg1.is_some() {
            let data = MoveInstData {
                new_inst_address: instr.addr(),
                ra_offset: cur_height,
                save_count: if reg2.is_some() { 2 } else { 1 },
                reg1,
                reg2,
            };
            if pos == 0 {
                fixed = Some(data);
            }
            let better = match &best {
                None => true,
                Some(cur) => data.save_count > cur.save_count,
            };
            if better {
                best = Some(data);
            }
            if reg2.is_some() {
                break;
            }
        }

        if instr.is_push() {
            cur_height -= 8;
            continue;
        }
        if instr.writes_memory() || instr.adjusts_sp_other_than_push_pop() {
            break;
        }
    }

    (fixed, best)
}

/// `CalculateExitInstPoint`: scan backward from block end accumulating
/// `cur_height` across pops; stops on a memory write, a non-pop RSP
/// mutation, or any flag read.
fn exit_placement(
    prog: &dyn ParsedProgram,
    block: crate::ids::BlockId,
    dead_sets: &[(u64, BTreeSet<&'static str>)],
) -> Option<MoveInstData> {
    let b = prog.block(block);
    let mut cur_height: i64 = 0;
    let mut best: Option<MoveInstData> = None;

    for (pos, iid) in b.instrs().into_iter().enumerate().rev() {
        let instr = prog.instr(iid);
        let dead = &dead_sets[pos].1;
        let mut it = dead.iter();
        let reg1 = it.next().copied();
        let reg2 = it.next().copied();

        if reg1.is_some() {
            let data = MoveInstData {
                new_inst_address: instr.addr(),
                ra_offset: cur_height,
                save_count: if reg2.is_some() { 2 } else { 1 },
                reg1,
                reg2,
            };
            let better = match &best {
                None => true,
                Some(cur) => data.save_count > cur.save_count,
            };
            if better {
                best = Some(data);
            }
            if reg2.is_some() {
                break;
            }
        }

        if instr.is_pop() {
            cur_height += 8;
            continue;
        }
        if instr.writes_memory() || instr.reads_flags() || instr.adjusts_sp_other_than_push_pop() {
            break;
        }
    }

    best
}

pub fn run(
    prog: &dyn ParsedProgram,
    fid: FuncId,
    summaries: &mut SummaryMap,
) -> Result<(), StructuralViolation> {
    let f = prog.function(fid);
    let summary = summaries.entry(fid).or_insert_with(|| crate::summary::FuncSummary::new(fid));

    for block in f.blocks() {
        let live_at_end = summary
            .dead_at_exit
            .get(&prog.block(block).end())
            .cloned()
            .map(|dead| {
                CALLER_SAVED
                    .iter()
                    .map(|g| gpr_name(*g))
                    .filter(|n| !dead.contains(n))
                    .collect::<BTreeSet<_>>()
            })
            .unwrap_or_default();

        let dead_sets = block_local_dead_sets(prog, block, &live_at_end);
        for (addr, dead) in &dead_sets {
            summary.block_local_dead.insert(*addr, dead.clone());
        }

        let (fixed, best) = entry_placement(prog, block, &dead_sets);
        if let Some(fixed) = fixed {
            summary.entry_fixed_data.insert(prog.block(block).start(), fixed);
        }
        if let Some(best) = best {
            summary.entry_data.insert(prog.block(block).start(), best);
        }
        if let Some(exit) = exit_placement(prog, block, &dead_sets) {
            summary.exit_data.insert(prog.block(block).end(), exit);
        }
    }

    Ok(())
}
