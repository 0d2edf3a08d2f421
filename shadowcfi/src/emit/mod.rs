//! Instrumentation Emitter (§4.8).
//!
//! Given `(Point, &FuncSummary, Backend)` synthesizes the byte sequence to
//! splice at `Point`. Follows the same `dynasmrt`-assembler-driving shape
//! used elsewhere in the tree for on-the-fly x86-64 codegen: build an
//! `Assembler`, emit with the `dynasm!` macro, `commit`/`finalize` into an
//! `ExecutableBuffer` the caller (the binary rewriter, out of scope here)
//! splices in.

pub mod avx_backend;
pub mod mem_backend;
pub mod sfi;
pub mod shortcircuit_backend;

use crate::config::{Config, ShadowStackKind};
use crate::error::EmissionFailure;
use crate::summary::FuncSummary;
use dynasmrt::{dynasm, x64::Assembler, DynasmApi};

/// A splice point the emitter targets.
#[derive(Clone, Copy, Debug)]
pub enum Point {
    FunctionEntry { func_addr: u64 },
    FunctionExit { block_end_addr: u64 },
    CallBlockEntry { block_start_addr: u64 },
    CallBlockExit { block_end_addr: u64 },
    MemoryWrite { instr_addr: u64 },
}

/// Illegal-instruction byte emitted at every `error:` label (§6.4): chosen
/// over `int3` so a debugger attached to the process sees `SIGILL` rather
/// than `SIGTRAP`.
pub const ERROR_BYTE: u8 = 0x62;

pub struct EmittedSequence {
    pub bytes: Vec<u8>,
}

/// Backend-independent helper: emits the single-byte illegal instruction
/// used at every `error:` label.
pub fn emit_error_byte(asm: &mut Assembler) {
    dynasm!(asm
        ; .byte ERROR_BYTE as _
    );
}

/// Dispatches to the configured backend's push (function/call-block entry)
/// sequence.
pub fn emit_push(
    config: &Config,
    summary: &FuncSummary,
    point: Point,
) -> Result<EmittedSequence, EmissionFailure> {
    match config.shadow_stack {
        ShadowStackKind::Mem => mem_backend::emit_push(config, summary, point),
        ShadowStackKind::Avx2 => avx_backend::emit_push(config, summary, point, false),
        ShadowStackKind::Avx512 => avx_backend::emit_push(config, summary, point, true),
    }
}

/// Dispatches to the configured backend's pop/validate (function/call-block
/// exit) sequence.
pub fn emit_validate(
    config: &Config,
    summary: &FuncSummary,
    point: Point,
) -> Result<EmittedSequence, EmissionFailure> {
    if summary.unused_regs.is_empty() || !summary.callees.is_empty() {
        // No short-circuit candidate register: use the full backend.
        return match config.shadow_stack {
            ShadowStackKind::Mem => mem_backend::emit_validate(config, summary, point),
            ShadowStackKind::Avx2 => avx_backend::emit_validate(config, summary, point, false),
            ShadowStackKind::Avx512 => avx_backend::emit_validate(config, summary, point, true),
        };
    }
    shortcircuit_backend::emit_validate(config, summary, point)
}
