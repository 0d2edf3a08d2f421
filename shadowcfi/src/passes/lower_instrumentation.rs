//! Pass 6: Lower Instrumentation (§4.5, "Lower").
//!
//! Rewrites the SCC DAG built by `cfg_analysis` to insert synthetic
//! `stack_push` nodes on every safe-to-unsafe transition, so that every
//! program path passes through at most one `stack_push` before reaching an
//! unsafe component, and a path that never leaves safe components carries
//! none (Invariant 4, §8).

use crate::cfg_facade::ParsedProgram;
use crate::error::StructuralViolation;
use crate::ids::FuncId;
use crate::pass::SummaryMap;
use crate::summary::SCComponent;

pub fn run(
    prog: &dyn ParsedProgram,
    fid: FuncId,
    summaries: &mut SummaryMap,
) -> Result<(), StructuralViolation> {
    let _ = prog;
    let summary = match summaries.get_mut(&fid) {
        Some(s) => s,
        None => return Ok(()),
    };
    if summary.cfg.is_empty() {
        return Ok(());
    }

    let all_ids: Vec<_> = summary.cfg.ids().collect();

    // One stack_push node per safe->unsafe edge, inserted between parent and
    // child and redirecting only that specific edge.
    for parent_id in all_ids.clone() {
        if summary.cfg.get(parent_id).unsafe_ {
            continue;
        }
        let children = summary.cfg.get(parent_id).children.clone();
        for child_id in children {
            if !summary.cfg.get(child_id).unsafe_ {
                continue;
            }
            let push_node = SCComponent {
                stack_push: true,
                unsafe_: true,
                children: vec![child_id],
                parents: vec![parent_id],
                ..Default::default()
            };
            let push_id = summary.cfg.push(push_node);

            // Redirect the parent's child/outgoing/targets entries that
            // pointed at `child_id` to point at `push_id` instead.
            {
                let parent = summary.cfg.get_mut(parent_id);
                for c in parent.children.iter_mut() {
                    if *c == child_id {
                        *c = push_id;
                    }
                }
                for o in parent.outgoing.iter_mut() {
                    if *o == child_id {
                        *o = push_id;
                    }
                }
                for v in parent.targets.values_mut() {
                    if *v == child_id {
                        *v = push_id;
                    }
                }
            }
            // The original child no longer lists this parent directly; it
            // is now reached only through the push node.
            {
                let child = summary.cfg.get_mut(child_id);
                child.parents.retain(|&p| p != parent_id);
                child.parents.push(push_id);
            }
        }
    }

    // Entry into a globally-unsafe root: cover it with a fresh root-level
    // stack_push so even the function's very first component is guarded.
    if let Some(root) = summary.cfg.root() {
        if summary.cfg.get(root).unsafe_ && !summary.cfg.get(root).stack_push {
            let push_node = SCComponent {
                stack_push: true,
                unsafe_: true,
                children: vec![root],
                ..Default::default()
            };
            let push_id = summary.cfg.push(push_node);
            summary.cfg.get_mut(root).parents.push(push_id);
            // The new node becomes logical root; callers find it via
            // `cfg.root()` returning SccId(0) by convention, so record it
            // through a synthetic empty component at index 0 is avoided —
            // instead the emitter entry point consults `logical_root`.
            summary.logical_root = Some(push_id);
        }
    }

    coalesce_ingress(summary);
    coalesce_egress(summary);

    Ok(())
}

/// Coalesce ingress (§4.5): when every parent of a single-block node is a
/// `stack_push`, absorb the push into the block itself instead of keeping
/// it as a separate predecessor node.
fn coalesce_ingress(summary: &mut crate::summary::FuncSummary) {
    let candidates: Vec<_> = summary
        .cfg
        .ids()
        .filter(|&id| {
            let n = summary.cfg.get(id);
            !n.stack_push
                && n.blocks.len() == 1
                && !n.parents.is_empty()
                && n.parents
                    .iter()
                    .all(|&p| summary.cfg.get(p).stack_push)
        })
        .collect();

    for id in candidates {
        let parents = summary.cfg.get(id).parents.clone();
        summary.cfg.get_mut(id).header_instrumentation = true;
        for p in parents {
            // The push node's sole purpose was to guard this block; once
            // absorbed, redirect the push's own parents directly to this
            // block and drop the push node from the live graph (it remains
            // allocated in the arena but un-reachable; arena entries are
            // never physically removed, matching the "never destroyed
            // during a run" contract on FuncSummary-owned data).
            let grandparents = summary.cfg.get(p).parents.clone();
            for gp in grandparents {
                let gp_node = summary.cfg.get_mut(gp);
                for c in gp_node.children.iter_mut() {
                    if *c == p {
                        *c = id;
                    }
                }
                for o in gp_node.outgoing.iter_mut() {
                    if *o == p {
                        *o = id;
                    }
                }
                for v in gp_node.targets.values_mut() {
                    if *v == p {
                        *v = id;
                    }
                }
            }
            summary.cfg.get_mut(id).parents.retain(|&pp| pp != p);
            summary.cfg.get_mut(id).parents.extend(
                summary.cfg.get(p).parents.iter().copied(),
            );
        }
    }
}

/// Coalesce egress (§4.5): when every outgoing edge from a single-block
/// node targets a `stack_push`, hoist the push into the block's exit.
fn coalesce_egress(summary: &mut crate::summary::FuncSummary) {
    let candidates: Vec<_> = summary
        .cfg
        .ids()
        .filter(|&id| {
            let n = summary.cfg.get(id);
            !n.stack_push
                && n.blocks.len() == 1
                && !n.outgoing.is_empty()
                && n.outgoing.iter().all(|&o| summary.cfg.get(o).stack_push)
        })
        .collect();

    for id in candidates {
        summary.cfg.get_mut(id).header_instrumentation = true;
        let pushes = summary.cfg.get(id).outgoing.clone();
        let mut new_children = Vec::new();
        for push in pushes {
            new_children.extend(summary.cfg.get(push).children.iter().copied());
        }
        new_children.sort();
        new_children.dedup();
        let node = summary.cfg.get_mut(id);
        node.children = new_children.clone();
        node.outgoing = new_children;
    }
}
