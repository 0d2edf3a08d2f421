//! Default reference [`ParsedProgram`] adapter, backed by `object`'s ELF
//! symbol table.
//!
//! This is deliberately NOT a CFG-recovery engine: it enumerates defined
//! text symbols and gives each one exactly one opaque [`OneBlockFunction`]
//! spanning its whole address range, with no instructions and no intra-
//! procedural edges. Every function therefore falls through every pass as
//! conservatively unsafe (no writes are found, but `has_unknown_cf` is never
//! set either — `is_safe_by_default_predicate` still requires an empty
//! callee set, which holds here since no call edges are discovered). This
//! is the seam a real deployment replaces: swap this module for an adapter
//! over a real Dyninst-style CFG-recovery library or a disassembler-backed
//! one, and the rest of the crate is unaffected.
//!
//! Kept here rather than in the library crate because `cfg_facade` itself
//! promises that nothing behind the trait boundary reads bytes off disk.

use object::{Object, ObjectSection, ObjectSymbol, SymbolKind};
use shadowcfi::cfg_facade::{Block, Edge, Function, Instr, InstrCategory, MemOperand, ParsedProgram, StackHeight};
use shadowcfi::ids::{BlockId, FuncId, InstrId, ObjectId};
use std::collections::BTreeMap;

struct OneBlockFunction {
    id: FuncId,
    name: String,
    addr: u64,
    size: u64,
    block: BlockId,
    is_plt_stub: bool,
}

impl Function for OneBlockFunction {
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
        self.block
    }
    fn blocks(&self) -> Vec<BlockId> {
        vec![self.block]
    }
    fn exit_blocks(&self) -> Vec<BlockId> {
        vec![self.block]
    }
    fn return_blocks(&self) -> Vec<BlockId> {
        vec![self.block]
    }
    fn owning_object(&self) -> ObjectId {
        ObjectId::new(0)
    }
    fn address_span(&self) -> u64 {
        self.size
    }
    fn is_plt_stub(&self) -> bool {
        self.is_plt_stub
    }
}

struct OneBlock {
    id: BlockId,
    start: u64,
    end: u64,
}

impl Block for OneBlock {
    fn id(&self) -> BlockId {
        self.id
    }
    fn start(&self) -> u64 {
        self.start
    }
    fn last(&self) -> u64 {
        self.start
    }
    fn end(&self) -> u64 {
        self.end
    }
    fn instrs(&self) -> Vec<InstrId> {
        Vec::new()
    }
    fn outgoing(&self) -> Vec<Edge> {
        Vec::new()
    }
    fn incoming(&self) -> Vec<Edge> {
        Vec::new()
    }
}

/// Never actually constructed (no instructions are ever decoded by this
/// adapter); exists only so [`ParsedProgram::instr`] has something to
/// return a reference to in principle.
struct NoInstr;

impl Instr for NoInstr {
    fn addr(&self) -> u64 {
        0
    }
    fn category(&self) -> InstrCategory {
        InstrCategory::Other
    }
    fn reads(&self) -> Vec<String> {
        Vec::new()
    }
    fn writes(&self) -> Vec<String> {
        Vec::new()
    }
    fn writes_full_register(&self, _reg: &str) -> bool {
        false
    }
    fn reads_memory(&self) -> bool {
        false
    }
    fn writes_memory(&self) -> bool {
        false
    }
    fn mem_reads(&self) -> Vec<MemOperand> {
        Vec::new()
    }
    fn mem_writes(&self) -> Vec<MemOperand> {
        Vec::new()
    }
    fn reads_flags(&self) -> bool {
        false
    }
    fn is_push(&self) -> bool {
        false
    }
    fn is_pop(&self) -> bool {
        false
    }
    fn adjusts_sp_other_than_push_pop(&self) -> bool {
        false
    }
    fn len(&self) -> usize {
        0
    }
}

pub struct SymbolTableProgram {
    functions: Vec<OneBlockFunction>,
    blocks: Vec<OneBlock>,
    by_name: BTreeMap<String, FuncId>,
    block_owner: BTreeMap<BlockId, FuncId>,
    linkage: BTreeMap<u64, String>,
}

impl SymbolTableProgram {
    /// Parses the ELF file at `path` and builds one function per defined
    /// text symbol. Returns an error string (never a panic) when the file
    /// cannot be parsed as an object file at all.
    pub fn load(path: &std::path::Path) -> Result<Self, String> {
        let data = std::fs::read(path).map_err(|e| format!("reading {}: {e}", path.display()))?;
        let file = object::File::parse(&*data).map_err(|e| format!("parsing {}: {e}", path.display()))?;

        let plt_ranges: Vec<(u64, u64)> = file
            .sections()
            .filter(|s| s.name().map(|n| n.contains(".plt")).unwrap_or(false))
            .filter_map(|s| {
                let addr = s.address();
                let size = s.size();
                if size > 0 {
                    Some((addr, addr + size))
                } else {
                    None
                }
            })
            .collect();

        let mut functions = Vec::new();
        let mut blocks = Vec::new();
        let mut by_name = BTreeMap::new();
        let mut block_owner = BTreeMap::new();
        let mut linkage = BTreeMap::new();

        for sym in file.symbols() {
            if sym.kind() != SymbolKind::Text || sym.is_undefined() {
                continue;
            }
            let name = match sym.name() {
                Ok(n) if !n.is_empty() => n.to_owned(),
                _ => continue,
            };
            let addr = sym.address();
            let size = sym.size().max(1);
            let fid = FuncId::new(functions.len());
            let bid = BlockId::new(blocks.len());
            let is_plt_stub = plt_ranges.iter().any(|&(lo, hi)| addr >= lo && addr < hi);

            blocks.push(OneBlock {
                id: bid,
                start: addr,
                end: addr + size,
            });
            block_owner.insert(bid, fid);
            by_name.entry(name.clone()).or_insert(fid);
            if is_plt_stub {
                linkage.insert(addr, name.clone());
            }
            functions.push(OneBlockFunction {
                id: fid,
                name,
                addr,
                size,
                block: bid,
                is_plt_stub,
            });
        }

        Ok(Self {
            functions,
            blocks,
            by_name,
            block_owner,
            linkage,
        })
    }
}

impl ParsedProgram for SymbolTableProgram {
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

    fn instr(&self, _id: InstrId) -> &dyn Instr {
        // No instruction is ever enumerated by `OneBlock::instrs`, so no
        // pass ever calls this with a real id.
        &NoInstr
    }

    fn find_sp(&self, _func: FuncId, _block: BlockId, _addr: u64) -> StackHeight {
        StackHeight::Top
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
