//! [`FuncSummary`]: the central, mutate-in-place record every pass reads and
//! writes. One per [`crate::ids::FuncId`]; never destroyed during a run.

use crate::ids::{BlockId, FuncId, SccId};
use std::collections::{BTreeMap, BTreeSet};

/// A node in the per-function lowered DAG. Owned by an arena inside the
/// enclosing [`FuncSummary`]; `children`/`parents` hold ids, never pointers,
/// so the DAG can never form a reference cycle and lowering's copy-on-split
/// step never risks a double free.
#[derive(Clone, Debug, Default)]
pub struct SCComponent {
    pub blocks: BTreeSet<BlockId>,
    pub children: Vec<SccId>,
    pub parents: Vec<SccId>,
    pub unsafe_: bool,
    /// This node is a synthetic instrumentation insertion point; it wraps no
    /// real block.
    pub stack_push: bool,
    /// This node's sole block absorbed the push of all its predecessors.
    pub header_instrumentation: bool,
    /// Subset of `blocks` that end in a return edge.
    pub returns: BTreeSet<BlockId>,
    /// Target block -> child component, for blocks with out-edges that
    /// leave this component.
    pub targets: BTreeMap<BlockId, SccId>,
    pub outgoing: Vec<SccId>,
}

/// Arena of [`SCComponent`]s for one function. `SccId(0)` is always the
/// root (the component containing the function's entry block), once built.
#[derive(Clone, Debug, Default)]
pub struct SccArena {
    nodes: Vec<SCComponent>,
}

impl SccArena {
    pub fn push(&mut self, node: SCComponent) -> SccId {
        let id = SccId::new(self.nodes.len());
        self.nodes.push(node);
        id
    }

    pub fn get(&self, id: SccId) -> &SCComponent {
        &self.nodes[id.index()]
    }

    pub fn get_mut(&mut self, id: SccId) -> &mut SCComponent {
        &mut self.nodes[id.index()]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = SccId> {
        (0..self.nodes.len()).map(SccId::new)
    }

    pub fn root(&self) -> Option<SccId> {
        if self.nodes.is_empty() {
            None
        } else {
            Some(SccId::new(0))
        }
    }
}

/// Describes the displacement at which a 1- or 2-register scratch can be
/// acquired without an additional `push`/`pop`.
#[derive(Clone, Copy, Debug)]
pub struct MoveInstData {
    pub new_inst_address: u64,
    pub ra_offset: i64,
    pub save_count: u8, // 1 or 2
    pub reg1: Option<&'static str>,
    pub reg2: Option<&'static str>,
}

/// Per-lane unused-register bitmaps for the AVX/AVX-512/MMX register files.
#[derive(Clone, Debug, Default)]
pub struct RegisterUsageInfo {
    /// 32 booleans: 2 quadword lanes per YMM register (xmm lower half, ymm
    /// upper half), indices `2*i`/`2*i+1` for register `i`.
    pub unused_avx_mask: Vec<bool>,
    /// 8 booleans, one per MMX register; left empty when the FPU stack is
    /// used anywhere in the function (MMX/FPU register files overlap).
    pub unused_mmx_mask: Vec<bool>,
}

impl RegisterUsageInfo {
    pub fn avx_lane_unused(&self, reg_index: usize, half: usize) -> bool {
        self.unused_avx_mask
            .get(reg_index * 2 + half)
            .copied()
            .unwrap_or(false)
    }
}

/// Per-function lowering statistics (§4.5).
#[derive(Clone, Copy, Debug, Default)]
pub struct Stats {
    pub n_original_nodes: usize,
    pub n_lowered_nodes: usize,
    pub safe_paths: u64,
    pub unsafe_paths: u64,
    pub safe_ratio: f64,
    pub increase: f64,
}

/// Describes a stack write recorded at block- or function-level for
/// diagnostics and invariant checking.
#[derive(Clone, Copy, Debug)]
pub struct WriteSite {
    pub addr: u64,
    pub block: BlockId,
}

/// The central per-function record. See `spec.md` §3 for the field-by-field
/// contract; nothing here is recomputed from scratch by a later pass, every
/// pass mutates this record in place.
#[derive(Clone, Debug)]
pub struct FuncSummary {
    pub func: FuncId,

    // Classification flags.
    pub assume_unsafe: bool,
    pub self_writes: bool,
    pub child_writes: bool,
    pub writes: bool,
    pub has_unknown_cf: bool,
    pub has_indirect_cf: bool,
    pub has_plt_call: bool,
    pub func_exception_safe: bool,
    /// True when any instruction adjusts RSP other than via `call`/`ret`
    /// (the `adjustSP` predicate named by the default `isSafeFunction`
    /// check in §4.3's Pass Manager).
    pub adjusts_sp: bool,

    // Call-graph edges.
    pub callees: BTreeSet<FuncId>,
    pub callers: BTreeSet<FuncId>,

    // Stack writes.
    pub stack_writes: BTreeMap<i64, WriteSite>,
    pub all_writes: BTreeMap<u64, WriteSite>,
    pub unsafe_blocks: BTreeSet<BlockId>,

    // Per-block stack heights, absolute, RA slot = 0.
    pub block_entry_sp_height: BTreeMap<BlockId, i64>,
    pub block_end_sp_height: BTreeMap<BlockId, i64>,

    pub red_zone_access: BTreeSet<i64>,
    pub move_down_sp: bool,

    // Register facts.
    pub unused_regs: BTreeSet<&'static str>,
    pub dead_at_entry: BTreeSet<&'static str>,
    pub dead_at_exit: BTreeMap<u64, BTreeSet<&'static str>>,
    pub block_local_dead: BTreeMap<u64, BTreeSet<&'static str>>,

    // Placement facts.
    pub entry_data: BTreeMap<u64, MoveInstData>,
    pub entry_fixed_data: BTreeMap<u64, MoveInstData>,
    pub exit_data: BTreeMap<u64, MoveInstData>,

    pub reg_usage: RegisterUsageInfo,

    pub cfg: SccArena,
    /// Overrides `cfg.root()` when lowering inserted a fresh root-level
    /// `stack_push` ahead of the function's true entry component.
    pub logical_root: Option<SccId>,
    pub stats: Stats,

    pub safe: bool,
    pub safe_paths: u64,
}

impl FuncSummary {
    pub fn new(func: FuncId) -> Self {
        Self {
            func,
            assume_unsafe: false,
            self_writes: false,
            child_writes: false,
            writes: false,
            has_unknown_cf: false,
            has_indirect_cf: false,
            has_plt_call: false,
            func_exception_safe: true,
            adjusts_sp: false,
            callees: BTreeSet::new(),
            callers: BTreeSet::new(),
            stack_writes: BTreeMap::new(),
            all_writes: BTreeMap::new(),
            unsafe_blocks: BTreeSet::new(),
            block_entry_sp_height: BTreeMap::new(),
            block_end_sp_height: BTreeMap::new(),
            red_zone_access: BTreeSet::new(),
            move_down_sp: false,
            unused_regs: BTreeSet::new(),
            dead_at_entry: BTreeSet::new(),
            dead_at_exit: BTreeMap::new(),
            block_local_dead: BTreeMap::new(),
            entry_data: BTreeMap::new(),
            entry_fixed_data: BTreeMap::new(),
            exit_data: BTreeMap::new(),
            reg_usage: RegisterUsageInfo::default(),
            cfg: SccArena::default(),
            logical_root: None,
            stats: Stats::default(),
            safe: false,
            safe_paths: 0,
        }
    }

    /// Recomputes `writes` from its constituents. Invariant 1 (§8):
    /// `writes ⇔ self_writes ∨ child_writes ∨ assume_unsafe`.
    pub fn recompute_writes(&mut self) {
        self.writes = self.self_writes || self.child_writes || self.assume_unsafe;
    }

    /// A stack write at `off` (relative to the RA slot at 0) always
    /// overwrites the current frame's saved RA or the caller's frame.
    pub fn is_unsafe_stack_offset(off: i64) -> bool {
        off >= -8
    }

    pub fn mark_unsafe_block(&mut self, block: BlockId) {
        self.unsafe_blocks.insert(block);
    }

    /// The default `isSafeFunction` predicate used by the pass manager
    /// unless a specific pass overrides it (§4.3).
    /// The effective entry component for lowered-DAG walks: the
    /// root-level synthetic `stack_push` when lowering inserted one,
    /// otherwise the function's own entry component.
    pub fn effective_root(&self) -> Option<SccId> {
        self.logical_root.or_else(|| self.cfg.root())
    }

    pub fn is_safe_by_default_predicate(&self) -> bool {
        !self.writes
            && !self.adjusts_sp
            && !self.has_plt_call
            && !self.has_unknown_cf
            && self.callees.is_empty()
    }
}
