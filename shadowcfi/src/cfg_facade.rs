//! The boundary between this analyzer and an external ELF/DWARF parser and
//! CFG-recovery library. Everything in this module is a trait or a plain
//! data type; nothing here reads bytes off disk. A real deployment plugs in
//! an adapter over whatever parser it uses (a Dyninst-style CFG recovery
//! library, or an `object`/custom disassembler pipeline); tests plug in a
//! hand-built in-memory program.

use crate::ids::{BlockId, FuncId, InstrId, ObjectId};
use std::collections::BTreeMap;

/// A decoded instruction's broad category, as consumed by every analysis
/// pass. Finer detail (which GPRs, which memory operands) is reached
/// through the accessor methods below, not by matching on this enum.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum InstrCategory {
    Call,
    Return,
    Conditional,
    Other,
}

/// A typed edge between two blocks, possibly crossing function boundaries.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum EdgeKind {
    Call,
    CallFt,
    CondTaken,
    CondNotTaken,
    Direct,
    Indirect,
    Ret,
    Catch,
}

#[derive(Clone, Copy, Debug)]
pub struct Edge {
    pub kind: EdgeKind,
    pub source: BlockId,
    /// `None` when `sink` is true: the target is unknown (an unresolved
    /// indirect branch or call).
    pub target: Option<BlockId>,
    /// True when the edge crosses a function boundary (a call or a return).
    pub interproc: bool,
    /// True when the target is unknown.
    pub sink: bool,
}

/// One leaf of a decomposed addressing expression, `base + index*scale + disp`.
#[derive(Clone, Copy, Debug, Default)]
pub struct MemOperand {
    pub base: Option<&'static str>,
    pub index: Option<&'static str>,
    pub scale: u8,
    pub disp: i64,
}

/// Opaque decoded instruction. The facade exposes exactly the queries the
/// analyzer needs; it never exposes raw bytes or a vendor-specific AST.
pub trait Instr {
    fn addr(&self) -> u64;
    fn category(&self) -> InstrCategory;
    /// Normalized (post-[`crate::regs::normalize`]) names of registers read.
    fn reads(&self) -> Vec<String>;
    /// Normalized names of registers written. A write of a 32-bit alias of a
    /// GPR is reported using the 64-bit name (it zero-extends and so kills
    /// the full register); a write to an 8/16-bit alias is reported with a
    /// trailing marker so liveness passes can distinguish a killing write
    /// from a partial one. See [`Instr::writes_full_register`].
    fn writes(&self) -> Vec<String>;
    /// True when `reg` (already normalized) is written as a full 64- or
    /// 32-bit write by this instruction (kills prior liveness); false for an
    /// 8/16-bit partial write (merges with the high bits, does not kill).
    fn writes_full_register(&self, reg: &str) -> bool;
    fn reads_memory(&self) -> bool;
    fn writes_memory(&self) -> bool;
    /// Memory operands read, decomposed into base+index*scale+displacement.
    fn mem_reads(&self) -> Vec<MemOperand>;
    /// Memory operands written, decomposed the same way.
    fn mem_writes(&self) -> Vec<MemOperand>;
    /// True if this instruction reads the flags register (used by exit
    /// placement to stop scanning, and by the short-circuit backend's
    /// flags-preservation decision).
    fn reads_flags(&self) -> bool;
    /// True if this instruction is a `push`/`pop` (affects `curHeight`
    /// tracking during entry/exit register placement).
    fn is_push(&self) -> bool;
    fn is_pop(&self) -> bool;
    /// True if this instruction mutates RSP other than via push/pop (e.g.
    /// `sub rsp, N`, `lea rsp, [rsp-N]`, `add rsp, N`).
    fn adjusts_sp_other_than_push_pop(&self) -> bool;
    /// Byte length of the instruction as decoded, needed by the emitter to
    /// compute splice points and padding.
    fn len(&self) -> usize;

    /// For an instruction whose only effect on `writes()` is to load a
    /// single register with a literal value (`mov reg, imm`, reading no
    /// other register), the value loaded. `None` for every other
    /// instruction, including one that copies from a register, loads from
    /// memory, or computes from more than one input. Consumed only by the
    /// indirect-call-target backward slice in [`crate::call_graph`]
    /// (§4.2's constant-fold terminal case); not a general immediate-operand
    /// accessor.
    fn immediate_write_value(&self) -> Option<i64> {
        None
    }
}

/// A maximal straight-line sequence of instructions.
pub trait Block {
    fn id(&self) -> BlockId;
    fn start(&self) -> u64;
    fn last(&self) -> u64;
    fn end(&self) -> u64;
    fn instrs(&self) -> Vec<InstrId>;
    fn outgoing(&self) -> Vec<Edge>;
    fn incoming(&self) -> Vec<Edge>;
}

/// A function as recovered by the external CFG-recovery library.
pub trait Function {
    fn id(&self) -> FuncId;
    fn name(&self) -> &str;
    fn addr(&self) -> u64;
    fn entry(&self) -> BlockId;
    fn blocks(&self) -> Vec<BlockId>;
    fn exit_blocks(&self) -> Vec<BlockId>;
    fn return_blocks(&self) -> Vec<BlockId>;
    fn owning_object(&self) -> ObjectId;
    /// Address span in bytes (highest block end minus entry address); used
    /// by the Large-Function Filter pass.
    fn address_span(&self) -> u64;
    /// True when defined via a PLT stub rather than a real body.
    fn is_plt_stub(&self) -> bool;
}

#[derive(Clone, Copy, Debug)]
pub enum StackHeight {
    Height(i64),
    Top,
    Bottom,
}

/// The whole-program facade. Enumerates objects, functions, blocks and
/// instructions, and answers stack-height and linkage queries.
pub trait ParsedProgram {
    fn objects(&self) -> Vec<ObjectId>;
    /// Non-PLT functions only, across every object.
    fn functions(&self) -> Vec<FuncId>;
    fn function(&self, id: FuncId) -> &dyn Function;
    fn block(&self, id: BlockId) -> &dyn Block;
    fn instr(&self, id: InstrId) -> &dyn Instr;

    /// Absolute stack height of RSP relative to the function's entry RSP
    /// (0 at entry) at the given address within `block`.
    fn find_sp(&self, func: FuncId, block: BlockId, addr: u64) -> StackHeight;

    /// Maps PLT-stub addresses to the symbol name they trampoline to.
    fn linkage_map(&self) -> &BTreeMap<u64, String>;

    /// True when `obj` is a canonical dynamic library matched by pathname
    /// substring (`libc.so`, `ld-linux`, `libpthread`, …).
    fn is_shared_library(&self, obj: ObjectId) -> bool;
    /// True when `obj` is considered part of the base system image, never a
    /// target for instrumentation (a superset of `is_shared_library`).
    fn is_system_code(&self, obj: ObjectId) -> bool;

    fn function_by_name(&self, name: &str) -> Option<FuncId>;

    /// The function that owns `block`. Used by the call-graph builder to
    /// resolve a call edge's target block to its enclosing function.
    fn owning_function(&self, block: BlockId) -> FuncId;
}
