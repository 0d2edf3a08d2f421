//! A hand-built `ParsedProgram` for exercising the full pipeline without a
//! real ELF/CFG-recovery collaborator, in the spirit of `aot_ir.rs`'s own
//! test module assembling a `Module` by hand out of plain structs.

#![allow(dead_code)]

use shadowcfi::cfg_facade::{
    Block, Edge, EdgeKind, Function, Instr, InstrCategory, MemOperand, ParsedProgram, StackHeight,
};
use shadowcfi::ids::{BlockId, FuncId, InstrId, ObjectId};
use std::collections::BTreeMap;

#[derive(Clone, Default)]
pub struct InstrSpec {
    pub category: Option<InstrCategory>,
    pub reads: Vec<&'static str>,
    pub writes: Vec<&'static str>,
    pub full_writes: Vec<&'static str>,
    pub reads_memory: bool,
    pub writes_memory: bool,
    pub mem_reads: Vec<MemOperand>,
    pub mem_writes: Vec<MemOperand>,
    pub reads_flags: bool,
    pub is_push: bool,
    pub is_pop: bool,
    pub adjusts_sp: bool,
    pub len: usize,
    pub immediate_write_value: Option<i64>,
}

impl InstrSpec {
    pub fn new() -> Self {
        Self {
            len: 4,
            ..Default::default()
        }
    }

    pub fn push() -> Self {
        Self {
            is_push: true,
            adjusts_sp: true,
            ..Self::new()
        }
    }

    pub fn pop() -> Self {
        Self {
            is_pop: true,
            adjusts_sp: true,
            ..Self::new()
        }
    }

    pub fn call() -> Self {
        Self {
            category: Some(InstrCategory::Call),
            ..Self::new()
        }
    }

    /// `call reg` / `jmp reg` through whatever single register `reg` is
    /// named, with nothing yet known about its value; pair with preceding
    /// `mov_reg`/`load_imm` instructions in the same block for the backward
    /// slice in `call_graph::resolve_indirect` to have something to chase.
    pub fn indirect_call(reg: &'static str) -> Self {
        Self {
            category: Some(InstrCategory::Call),
            reads: vec![reg],
            ..Self::new()
        }
    }

    /// `mov dst, imm`: no register inputs, a single output, an immediate
    /// value — the constant-fold terminal case of the slice.
    pub fn load_imm(dst: &'static str, value: i64) -> Self {
        Self {
            writes: vec![dst],
            full_writes: vec![dst],
            immediate_write_value: Some(value),
            ..Self::new()
        }
    }

    /// `mov dst, src`: a pure register-to-register copy, the slice's
    /// straight-line chaining case.
    pub fn mov_reg(dst: &'static str, src: &'static str) -> Self {
        Self {
            reads: vec![src],
            writes: vec![dst],
            full_writes: vec![dst],
            ..Self::new()
        }
    }

    pub fn ret() -> Self {
        Self {
            category: Some(InstrCategory::Return),
            ..Self::new()
        }
    }

    pub fn mem_store(off: i64) -> Self {
        Self {
            category: Some(InstrCategory::Other),
            writes_memory: true,
            mem_writes: vec![MemOperand {
                base: Some("RSP"),
                index: None,
                scale: 1,
                disp: off,
            }],
            ..Self::new()
        }
    }

    pub fn with_reads(mut self, regs: &[&'static str]) -> Self {
        self.reads = regs.to_vec();
        self
    }

    pub fn with_writes(mut self, regs: &[&'static str]) -> Self {
        self.writes = regs.to_vec();
        self.full_writes = regs.to_vec();
        self
    }
}

struct InstrImpl {
    addr: u64,
    spec: InstrSpec,
}

impl Instr for InstrImpl {
    fn addr(&self) -> u64 {
        self.addr
    }
    fn category(&self) -> InstrCategory {
        self.spec.category.unwrap_or(InstrCategory::Other)
    }
    fn reads(&self) -> Vec<String> {
        self.spec.reads.iter().map(|s| s.to_string()).collect()
    }
    fn writes(&self) -> Vec<String> {
        self.spec.writes.iter().map(|s| s.to_string()).collect()
    }
    fn writes_full_register(&self, reg: &str) -> bool {
        self.spec.full_writes.iter().any(|r| *r == reg)
    }
    fn reads_memory(&self) -> bool {
        self.spec.reads_memory
    }
    fn writes_memory(&self) -> bool {
        self.spec.writes_memory
    }
    fn mem_reads(&self) -> Vec<MemOperand> {
        self.spec.mem_reads.clone()
    }
    fn mem_writes(&self) -> Vec<MemOperand> {
        self.spec.mem_writes.clone()
    }
    fn reads_flags(&self) -> bool {
        self.spec.reads_flags
    }
    fn is_push(&self) -> bool {
        self.spec.is_push
    }
    fn is_pop(&self) -> bool {
        self.spec.is_pop
    }
    fn adjusts_sp_other_than_push_pop(&self) -> bool {
        self.spec.adjusts_sp && !self.spec.is_push && !self.spec.is_pop
    }
    fn len(&self) -> usize {
        self.spec.len
    }
    fn immediate_write_value(&self) -> Option<i64> {
        self.spec.immediate_write_value
    }
}

pub struct EdgeSpec {
    pub kind: EdgeKind,
    pub target: Option<(usize, usize)>,
}

pub fn edge(kind: EdgeKind, target_func: usize, target_block: usize) -> EdgeSpec {
    EdgeSpec {
        kind,
        target: Some((target_func, target_block)),
    }
}

pub fn sink_edge(kind: EdgeKind) -> EdgeSpec {
    EdgeSpec { kind, target: None }
}

pub struct BlockSpec {
    pub instrs: Vec<InstrSpec>,
    pub outgoing: Vec<EdgeSpec>,
}

impl BlockSpec {
    pub fn new() -> Self {
        Self {
            instrs: Vec::new(),
            outgoing: Vec::new(),
        }
    }

    pub fn with_instrs(mut self, instrs: Vec<InstrSpec>) -> Self {
        self.instrs = instrs;
        self
    }

    pub fn with_outgoing(mut self, edges: Vec<EdgeSpec>) -> Self {
        self.outgoing = edges;
        self
    }
}

pub struct FuncSpec {
    pub name: &'static str,
    pub addr: u64,
    pub blocks: Vec<BlockSpec>,
    pub exit_blocks: Vec<usize>,
    pub return_blocks: Vec<usize>,
    pub is_plt_stub: bool,
}

impl FuncSpec {
    pub fn new(name: &'static str, addr: u64) -> Self {
        Self {
            name,
            addr,
            blocks: Vec::new(),
            exit_blocks: Vec::new(),
            return_blocks: Vec::new(),
            is_plt_stub: false,
        }
    }

    pub fn with_blocks(mut self, blocks: Vec<BlockSpec>) -> Self {
        self.exit_blocks = vec![blocks.len() - 1];
        self.return_blocks = vec![blocks.len() - 1];
        self.blocks = blocks;
        self
    }

    pub fn plt_stub(mut self) -> Self {
        self.is_plt_stub = true;
        self.blocks = vec![BlockSpec::new()];
        self.exit_blocks = vec![0];
        self.return_blocks = vec![0];
        self
    }
}

struct BlockImpl {
    id: BlockId,
    start: u64,
    end: u64,
    instrs: Vec<InstrId>,
    outgoing: Vec<Edge>,
    incoming: Vec<Edge>,
}

impl Block for BlockImpl {
    fn id(&self) -> BlockId {
        self.id
    }
    fn start(&self) -> u64 {
        self.start
    }
    fn last(&self) -> u64 {
        self.end.saturating_sub(1)
    }
    fn end(&self) -> u64 {
        self.end
    }
    fn instrs(&self) -> Vec<InstrId> {
        self.instrs.clone()
    }
    fn outgoing(&self) -> Vec<Edge> {
        self.outgoing.clone()
    }
    fn incoming(&self) -> Vec<Edge> {
        self.incoming.clone()
    }
}

struct FunctionImpl {
    id: FuncId,
    name: String,
    addr: u64,
    entry: BlockId,
    blocks: Vec<BlockId>,
    exit_blocks: Vec<BlockId>,
    return_blocks: Vec<BlockId>,
    is_plt_stub: bool,
    address_span: u64,
}

impl Function for FunctionImpl {
    fn id(&self) -> FuncId {
        self.id
    }
    fn name(&self) -> &str {
        &self.name
    }
    fn addr(&self) -> u64 {
        self.addr
    }
    fn entry(&self) -> BlockId {
        self.entry
    }
    fn blocks(&self) -> Vec<BlockId> {
        self.blocks.clone()
    }
    fn exit_blocks(&self) -> Vec<BlockId> {
        self.exit_blocks.clone()
    }
    fn return_blocks(&self) -> Vec<BlockId> {
        self.return_blocks.clone()
    }
    fn owning_object(&self) -> ObjectId {
        ObjectId::new(0)
    }
    fn address_span(&self) -> u64 {
        self.address_span
    }
    fn is_plt_stub(&self) -> bool {
        self.is_plt_stub
    }
}

/// The assembled, queryable program. Built once via [`Builder::build`].
pub struct TestProgram {
    functions: Vec<FunctionImpl>,
    blocks: Vec<BlockImpl>,
    instrs: Vec<InstrImpl>,
    block_owner: BTreeMap<BlockId, FuncId>,
    by_name: BTreeMap<String, FuncId>,
    linkage: BTreeMap<u64, String>,
}

impl ParsedProgram for TestProgram {
    fn objects(&self) -> Vec<ObjectId> {
        vec![ObjectId::new(0)]
    }
    fn functions(&self) -> Vec<FuncId> {
        (0..self.functions.len()).map(FuncId::new).collect()
    }
    fn function(&self, id: FuncId) -> &dyn Function {
        &self.functions[id.index()]
    }
    fn block(&self, id: BlockId) -> &dyn Block {
        &self.blocks[id.index()]
    }
    fn instr(&self, id: InstrId) -> &dyn Instr {
        &self.instrs[id.index()]
    }
    fn find_sp(&self, _func: FuncId, _block: BlockId, _addr: u64) -> StackHeight {
        StackHeight::Height(0)
    }
    fn linkage_map(&self) -> &BTreeMap<u64, String> {
        &self.linkage
    }
    fn is_shared_library(&self, _obj: ObjectId) -> bool {
        false
    }
    fn is_system_code(&self, _obj: ObjectId) -> bool {
        false
    }
    fn function_by_name(&self, name: &str) -> Option<FuncId> {
        self.by_name.get(name).copied()
    }
    fn owning_function(&self, block: BlockId) -> FuncId {
        self.block_owner[&block]
    }
}

/// Assembles a [`TestProgram`] from a list of [`FuncSpec`]s. Intra-block
/// edge targets are `(function_index, block_index)` pairs into this same
/// list, resolved to concrete ids during `build`.
pub struct Builder {
    specs: Vec<FuncSpec>,
}

impl Builder {
    pub fn new() -> Self {
        Self { specs: Vec::new() }
    }

    pub fn func(mut self, spec: FuncSpec) -> Self {
        self.specs.push(spec);
        self
    }

    pub fn build(self) -> TestProgram {
        let mut func_block_base = Vec::with_capacity(self.specs.len());
        let mut next_block = 0usize;
        for spec in &self.specs {
            func_block_base.push(next_block);
            next_block += spec.blocks.len();
        }

        let mut functions = Vec::new();
        let mut blocks = Vec::new();
        let mut instrs = Vec::new();
        let mut block_owner = BTreeMap::new();
        let mut by_name = BTreeMap::new();
        let mut linkage = BTreeMap::new();
        let mut pending_incoming: BTreeMap<usize, Vec<Edge>> = BTreeMap::new();

        for (fi, spec) in self.specs.iter().enumerate() {
            let fid = FuncId::new(fi);
            let base = func_block_base[fi];
            let mut block_ids = Vec::new();
            let mut cursor = spec.addr;

            for (bi, bspec) in spec.blocks.iter().enumerate() {
                let global_idx = base + bi;
                let bid = BlockId::new(global_idx);
                block_ids.push(bid);
                block_owner.insert(bid, fid);

                let start = cursor;
                let mut instr_ids = Vec::new();
                for ispec in &bspec.instrs {
                    let iid = InstrId::new(instrs.len());
                    instr_ids.push(iid);
                    instrs.push(InstrImpl {
                        addr: cursor,
                        spec: ispec.clone(),
                    });
                    cursor += ispec.len.max(1) as u64;
                }
                if bspec.instrs.is_empty() {
                    cursor += 1;
                }
                let end = cursor;

                let mut outgoing = Vec::new();
                for e in &bspec.outgoing {
                    let target_global = e
                        .target
                        .map(|(tf, tb)| BlockId::new(func_block_base[tf] + tb));
                    let edge = Edge {
                        kind: e.kind,
                        source: bid,
                        target: target_global,
                        interproc: matches!(
                            e.kind,
                            EdgeKind::Call | EdgeKind::CallFt | EdgeKind::Ret
                        ),
                        sink: target_global.is_none(),
                    };
                    if let Some(t) = target_global {
                        pending_incoming.entry(t.index()).or_default().push(edge);
                    }
                    outgoing.push(edge);
                }

                blocks.push(BlockImpl {
                    id: bid,
                    start,
                    end,
                    instrs: instr_ids,
                    outgoing,
                    incoming: Vec::new(),
                });
            }

            let span = cursor - spec.addr;
            by_name.entry(spec.name.to_owned()).or_insert(fid);
            if spec.is_plt_stub {
                linkage.insert(spec.addr, spec.name.to_owned());
            }
            functions.push(FunctionImpl {
                id: fid,
                name: spec.name.to_owned(),
                addr: spec.addr,
                entry: block_ids[0],
                blocks: block_ids.clone(),
                exit_blocks: spec.exit_blocks.iter().map(|&i| block_ids[i]).collect(),
                return_blocks: spec.return_blocks.iter().map(|&i| block_ids[i]).collect(),
                is_plt_stub: spec.is_plt_stub,
                address_span: span,
            });
        }

        for block in &mut blocks {
            if let Some(incoming) = pending_incoming.remove(&block.id.index()) {
                block.incoming = incoming;
            }
        }

        TestProgram {
            functions,
            blocks,
            instrs,
            block_owner,
            by_name,
            linkage,
        }
    }
}
