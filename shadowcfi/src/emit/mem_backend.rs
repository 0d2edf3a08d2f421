//! §4.8.1: shadow stack on memory, segment-addressed via `gs:0`.
//!
//! `dynasmrt`'s x64 assembler has no built-in segment-override syntax, so
//! every `gs:`-relative access here is emitted as the raw `0x65` segment
//! override prefix byte followed by the otherwise-ordinary `dynasm!`
//! instruction, the same way the 64-bit codegen elsewhere in this tree
//! drops to raw bytes for encodings its assembler macro doesn't model
//! directly.

use crate::config::Config;
use crate::emit::{emit_error_byte, EmittedSequence, Point};
use crate::error::EmissionFailure;
use crate::summary::FuncSummary;
use dynasmrt::{dynasm, x64::Assembler, x64::Rq, DynasmApi};

const GS_PREFIX: u8 = 0x65;

/// Runtime ABI offsets (§6.3).
const GS_SHADOW_SP: i32 = 0;
const GS_SCRATCH: i32 = 8;

/// Picks the two scratch registers this push will use, and whether they
/// needed a `push`/`pop` spill: preferred order is (a) `entryData`/
/// `entryFixedData` dead regs at a later point in the block, used without
/// save; (b) `dead_at_entry`; (c) spill two chosen registers.
fn choose_scratch(summary: &FuncSummary, config: &Config) -> (Rq, Rq, i64, bool) {
    if config.optimize_regs {
        if let Some((_, data)) = summary.entry_fixed_data.iter().next() {
            if let (Some(r1), Some(r2)) = (data.reg1, data.reg2) {
                return (
                    name_to_reg(r1),
                    name_to_reg(r2),
                    data.ra_offset,
                    false,
                );
            }
        }
        if let Some((_, data)) = summary.entry_data.iter().next() {
            if let (Some(r1), Some(r2)) = (data.reg1, data.reg2) {
                return (
                    name_to_reg(r1),
                    name_to_reg(r2),
                    data.ra_offset,
                    false,
                );
            }
        }
        let mut dead = summary.dead_at_entry.iter();
        if let (Some(r1), Some(r2)) = (dead.next(), dead.next()) {
            return (name_to_reg(r1), name_to_reg(r2), 0, false);
        }
    }
    (Rq::R12, Rq::R13, 0, true)
}

fn name_to_reg(name: &str) -> Rq {
    match name {
        "RAX" => Rq::RAX,
        "RBX" => Rq::RBX,
        "RCX" => Rq::RCX,
        "RDX" => Rq::RDX,
        "RSI" => Rq::RSI,
        "RDI" => Rq::RDI,
        "R8" => Rq::R8,
        "R9" => Rq::R9,
        "R10" => Rq::R10,
        "R11" => Rq::R11,
        "R12" => Rq::R12,
        "R13" => Rq::R13,
        "R14" => Rq::R14,
        "R15" => Rq::R15,
        _ => Rq::R12,
    }
}

pub fn emit_push(
    config: &Config,
    summary: &FuncSummary,
    _point: Point,
) -> Result<EmittedSequence, EmissionFailure> {
    let mut asm = Assembler::new().map_err(|_| EmissionFailure::NoUnusedRegister { addr: 0 })?;
    let (ra_reg, sp_reg, extra_offset, spilled) = choose_scratch(summary, config);
    let slot_size: i32 = if config.validate_frame { 16 } else { 8 };
    let sp_offset = extra_offset as i32 + if spilled { 16 } else { 0 };

    if spilled {
        dynasm!(asm
            ; push Rq(ra_reg as u8)
            ; push Rq(sp_reg as u8)
        );
    }

    dynasm!(asm
        ; mov Rq(ra_reg as u8), QWORD [rsp + sp_offset]
    );
    asm.push(GS_PREFIX);
    dynasm!(asm
        ; mov Rq(sp_reg as u8), QWORD [0i32]
    );
    dynasm!(asm
        ; mov QWORD [Rq(sp_reg as u8)], Rq(ra_reg as u8)
    );
    if config.validate_frame {
        dynasm!(asm
            ; mov QWORD [Rq(sp_reg as u8) + 8], rbp
        );
    }
    dynasm!(asm
        ; add Rq(sp_reg as u8), slot_size
    );
    asm.push(GS_PREFIX);
    dynasm!(asm
        ; mov QWORD [0i32], Rq(sp_reg as u8)
    );

    if spilled {
        dynasm!(asm
            ; pop Rq(sp_reg as u8)
            ; pop Rq(ra_reg as u8)
        );
    }

    let buf = asm
        .finalize()
        .map_err(|_| EmissionFailure::NoUnusedRegister { addr: 0 })?;
    Ok(EmittedSequence {
        bytes: buf.to_vec(),
    })
}

pub fn emit_validate(
    config: &Config,
    _summary: &FuncSummary,
    _point: Point,
) -> Result<EmittedSequence, EmissionFailure> {
    let mut asm = Assembler::new().map_err(|_| EmissionFailure::NoUnusedRegister { addr: 0 })?;
    let slot_size: i32 = if config.validate_frame { 16 } else { 8 };

    asm.push(GS_PREFIX);
    dynasm!(asm
        ; mov Rq(Rq::R12 as u8), QWORD [0i32]
        ; ->loop_start:
        ; sub Rq(Rq::R12 as u8), slot_size
        ; mov Rq(Rq::R13 as u8), QWORD [Rq(Rq::R12 as u8)]
        ; cmp Rq(Rq::R13 as u8), QWORD [rsp]
        ; je ->done
    );
    if config.validate_frame {
        dynasm!(asm
            ; mov Rq(Rq::R14 as u8), QWORD [Rq(Rq::R12 as u8) + 8]
            ; cmp Rq(Rq::R14 as u8), rsp
            ; jne ->guard_fail
        );
    }
    dynasm!(asm
        ; cmp QWORD [Rq(Rq::R12 as u8) - 8], 0
        ; je ->guard_fail
        ; jmp ->loop_start
        ; ->guard_fail:
    );
    emit_error_byte(&mut asm);
    dynasm!(asm
        ; ->done:
    );

    let buf = asm
        .finalize()
        .map_err(|_| EmissionFailure::NoUnusedRegister { addr: 0 })?;
    Ok(EmittedSequence {
        bytes: buf.to_vec(),
    })
}
