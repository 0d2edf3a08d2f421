//! Pass 5: CFG Analysis (§4.5, "Build SCC DAG").
//!
//! Collapses the function's natural loops into single [`SCComponent`]
//! nodes via Tarjan's strongly-connected-components algorithm restricted to
//! intraprocedural edges (call and return edges never participate in the
//! DAG itself); remaining blocks become singleton components. Calls
//! terminate their owning component directly into the virtual exit (marking
//! it `unsafe`); returns are recorded rather than wired as DAG edges.

use crate::cfg_facade::{EdgeKind, ParsedProgram};
use crate::error::StructuralViolation;
use crate::ids::{BlockId, FuncId, SccId};
use crate::pass::SummaryMap;
use crate::summary::SCComponent;
use fxhash::FxHashMap;
use std::collections::{BTreeSet, HashMap};

struct Tarjan<'a> {
    prog: &'a dyn ParsedProgram,
    index_counter: usize,
    indices: HashMap<BlockId, usize>,
    lowlink: HashMap<BlockId, usize>,
    on_stack: HashMap<BlockId, bool>,
    stack: Vec<BlockId>,
    sccs: Vec<Vec<BlockId>>,
}

impl<'a> Tarjan<'a> {
    fn new(prog: &'a dyn ParsedProgram) -> Self {
        Self {
            prog,
            index_counter: 0,
            indices: HashMap::new(),
            lowlink: HashMap::new(),
            on_stack: HashMap::new(),
            stack: Vec::new(),
            sccs: Vec::new(),
        }
    }

    fn successors(&self, b: BlockId) -> Vec<BlockId> {
        self.prog
            .block(b)
            .outgoing()
            .into_iter()
            .filter(|e| !matches!(e.kind, EdgeKind::Call | EdgeKind::CallFt | EdgeKind::Ret))
            .filter_map(|e| if e.sink { None } else { e.target })
            .collect()
    }

    fn strong_connect(&mut self, v: BlockId) {
        self.indices.insert(v, self.index_counter);
        self.lowlink.insert(v, self.index_counter);
        self.index_counter += 1;
        self.stack.push(v);
        self.on_stack.insert(v, true);

        for w in self.successors(v) {
            if !self.indices.contains_key(&w) {
                self.strong_connect(w);
                let wl = self.lowlink[&w];
                let vl = self.lowlink[&v];
                self.lowlink.insert(v, vl.min(wl));
            } else if *self.on_stack.get(&w).unwrap_or(&false) {
                let wi = self.indices[&w];
                let vl = self.lowlink[&v];
                self.lowlink.insert(v, vl.min(wi));
            }
        }

        if self.lowlink[&v] == self.indices[&v] {
            let mut component = Vec::new();
            loop {
                let w = self.stack.pop().unwrap();
                self.on_stack.insert(w, false);
                component.push(w);
                if w == v {
                    break;
                }
            }
            self.sccs.push(component);
        }
    }
}

pub fn run(
    prog: &dyn ParsedProgram,
    fid: FuncId,
    summaries: &mut SummaryMap,
) -> Result<(), StructuralViolation> {
    let summary = summaries.entry(fid).or_insert_with(|| crate::summary::FuncSummary::new(fid));
    if summary.assume_unsafe && summary.callees.is_empty() {
        // Still worth building a trivial CFG for diagnostics, but large
        // functions already filtered are skipped entirely to bound cost.
    }
    let f = prog.function(fid);
    let blocks = f.blocks();
    if blocks.is_empty() {
        return Ok(());
    }

    let mut tarjan = Tarjan::new(prog);
    for &b in &blocks {
        if !tarjan.indices.contains_key(&b) {
            tarjan.strong_connect(b);
        }
    }

    // Map each block to the arena id of its component, in reverse
    // topological order as Tarjan emits them (Tarjan emits SCCs in reverse
    // topological order, which we reverse back to DAG order).
    let mut sccs = tarjan.sccs;
    sccs.reverse();

    let mut block_to_scc: FxHashMap<BlockId, SccId> = FxHashMap::default();
    let mut arena = crate::summary::SccArena::default();
    for scc_blocks in &sccs {
        let node = SCComponent {
            blocks: scc_blocks.iter().copied().collect::<BTreeSet<_>>(),
            ..Default::default()
        };
        let id = arena.push(node);
        for &b in scc_blocks {
            block_to_scc.insert(b, id);
        }
    }

    // Wire children/parents/targets/outgoing, and classify call/return
    // edges.
    let mut unsafe_ids: BTreeSet<SccId> = BTreeSet::new();
    for &b in &blocks {
        let scc_id = block_to_scc[&b];
        let bref = prog.block(b);
        for edge in bref.outgoing() {
            match edge.kind {
                EdgeKind::Call => {
                    // A call edge terminates this component into the
                    // virtual exit: it is never a DAG edge.
                    unsafe_ids.insert(scc_id);
                }
                EdgeKind::Ret => {
                    arena.get_mut(scc_id).returns.insert(b);
                }
                _ => {
                    if edge.sink {
                        unsafe_ids.insert(scc_id);
                        continue;
                    }
                    if let Some(target) = edge.target {
                        let target_scc = block_to_scc[&target];
                        if target_scc != scc_id {
                            arena.get_mut(scc_id).targets.insert(target, target_scc);
                            if !arena.get(scc_id).children.contains(&target_scc) {
                                arena.get_mut(scc_id).children.push(target_scc);
                            }
                            if !arena.get(target_scc).parents.contains(&scc_id) {
                                arena.get_mut(target_scc).parents.push(scc_id);
                            }
                            if !arena.get(scc_id).outgoing.contains(&target_scc) {
                                arena.get_mut(scc_id).outgoing.push(target_scc);
                            }
                        }
                    }
                }
            }
        }
    }

    for id in arena.ids() {
        let blocks_unsafe = arena
            .get(id)
            .blocks
            .iter()
            .any(|b| summary.unsafe_blocks.contains(b));
        if blocks_unsafe || unsafe_ids.contains(&id) {
            arena.get_mut(id).unsafe_ = true;
        }
    }

    summary.cfg = arena;
    summary.stats.n_original_nodes = summary.cfg.len();
    Ok(())
}
