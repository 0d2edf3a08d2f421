//! §4.8.3: single-register short-circuit.
//!
//! Used only when the function has at least one `unused_reg`: store RA
//! into a `gs:8` scratch slot at entry, compare against `[rsp]` at exit,
//! fast-path on match, else fall through to the full memory-stack unwind
//! validation (for exception cases).
//!
//! §9 Open Question 3: flags are always preserved around the `cmp` here
//! unless the block-local dead-register analysis proves flags dead at this
//! program point; eliding the `pushfq`/`popfq` pair is never a separately
//! exposed option.

use crate::config::Config;
use crate::emit::mem_backend;
use crate::emit::{EmittedSequence, Point};
use crate::error::EmissionFailure;
use crate::summary::FuncSummary;
use dynasmrt::{dynasm, x64::Assembler, x64::Rq, DynasmApi};

const GS_PREFIX: u8 = 0x65;
const GS_SCRATCH: i32 = 8;

pub fn emit_push(
    _config: &Config,
    summary: &FuncSummary,
    _point: Point,
) -> Result<EmittedSequence, EmissionFailure> {
    let scratch = summary
        .unused_regs
        .iter()
        .next()
        .copied()
        .ok_or(EmissionFailure::NoUnusedRegister { addr: 0 })?;
    let reg = mem_backend_name_to_reg(scratch);

    let mut asm = Assembler::new().map_err(|_| EmissionFailure::NoUnusedRegister { addr: 0 })?;
    dynasm!(asm
        ; mov Rq(reg as u8), QWORD [rsp]
    );
    asm.push(GS_PREFIX);
    dynasm!(asm
        ; mov QWORD [GS_SCRATCH], Rq(reg as u8)
    );

    let buf = asm
        .finalize()
        .map_err(|_| EmissionFailure::NoUnusedRegister { addr: 0 })?;
    Ok(EmittedSequence {
        bytes: buf.to_vec(),
    })
}

/// Returns whether flags must be saved/restored around the comparison: true
/// unless `flags_proven_dead` (supplied by the caller from the block-local
/// dead-register analysis at this exact program point) says otherwise.
pub fn emit_validate_at(
    config: &Config,
    summary: &FuncSummary,
    point: Point,
    flags_proven_dead: bool,
) -> Result<EmittedSequence, EmissionFailure> {
    let scratch = summary
        .unused_regs
        .iter()
        .next()
        .copied()
        .ok_or(EmissionFailure::NoUnusedRegister { addr: 0 })?;
    let reg = mem_backend_name_to_reg(scratch);

    let mut asm = Assembler::new().map_err(|_| EmissionFailure::NoUnusedRegister { addr: 0 })?;
    if !flags_proven_dead {
        dynasm!(asm ; pushfq);
    }
    dynasm!(asm
        ; cmp Rq(reg as u8), QWORD [rsp]
        ; je ->short_circuit_ok
    );
    if !flags_proven_dead {
        dynasm!(asm ; popfq);
    }
    let fallback = mem_backend::emit_validate(config, summary, point)?;
    for b in fallback.bytes {
        asm.push(b);
    }
    dynasm!(asm
        ; ->short_circuit_ok:
    );
    if !flags_proven_dead {
        dynasm!(asm ; popfq);
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
    summary: &FuncSummary,
    point: Point,
) -> Result<EmittedSequence, EmissionFailure> {
    emit_validate_at(config, summary, point, false)
}

fn mem_backend_name_to_reg(name: &str) -> Rq {
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
