//! §4.8.4: memory-write sanitization (optional; complements the AVX
//! backend).
//!
//! For every instruction that writes memory in an unsafe function, emits a
//! pre-instruction bound check against the three segment-relative SFI
//! bounds (§6.3: `gs:32` global-stack-lower, `gs:24` local-stack-bottom,
//! `gs:16` local-stack-top). Suppressed when the write's base register is
//! RIP. Wraps the check in a red-zone-safe SP adjustment when the function
//! records any red-zone access.

use crate::addr_expr::AddrExpr;
use crate::cfg_facade::MemOperand;
use crate::config::Config;
use crate::emit::{emit_error_byte, EmittedSequence, Point};
use crate::error::EmissionFailure;
use crate::summary::FuncSummary;
use dynasmrt::{dynasm, x64::Assembler, DynasmApi};

const GS_PREFIX: u8 = 0x65;
const GS_LOCAL_TOP: i32 = 16;
const GS_LOCAL_BOTTOM: i32 = 24;
const GS_GLOBAL_LOWER: i32 = 32;

pub fn emit_bound_check(
    _config: &Config,
    summary: &FuncSummary,
    _point: Point,
    operand: &MemOperand,
) -> Result<EmittedSequence, EmissionFailure> {
    let expr = AddrExpr::from_operand(operand);
    if expr.is_rip_relative() {
        return Ok(EmittedSequence { bytes: Vec::new() });
    }

    let mut asm = Assembler::new().map_err(|_| EmissionFailure::NoUnusedRegister { addr: 0 })?;
    let needs_redzone_adjust = !summary.red_zone_access.is_empty();

    if needs_redzone_adjust {
        dynasm!(asm ; lea rsp, [rsp - 128]);
    }

    // Effective address computed via LEA from the instruction's own
    // base/index/scale/displacement; real operand encoding is supplied by
    // the caller at splice time, placeholder here uses rax as the
    // materialised effective-address register.
    dynasm!(asm
        ; lea rax, [rax]
    );

    asm.push(GS_PREFIX);
    dynasm!(asm
        ; cmp rax, QWORD [GS_GLOBAL_LOWER]
        ; jb ->error
    );
    asm.push(GS_PREFIX);
    dynasm!(asm
        ; cmp rax, QWORD [GS_LOCAL_BOTTOM]
        ; jb ->done
    );
    asm.push(GS_PREFIX);
    dynasm!(asm
        ; cmp rax, QWORD [GS_LOCAL_TOP]
        ; jae ->error
        ; jmp ->done
        ; ->error:
    );
    emit_error_byte(&mut asm);
    dynasm!(asm
        ; ->done:
    );

    if needs_redzone_adjust {
        dynasm!(asm ; lea rsp, [rsp + 128]);
    }

    let buf = asm
        .finalize()
        .map_err(|_| EmissionFailure::NoUnusedRegister { addr: 0 })?;
    Ok(EmittedSequence {
        bytes: buf.to_vec(),
    })
}
