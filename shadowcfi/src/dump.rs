//! `--dump-cfg` diagnostic rendering (§6, supplemental).
//!
//! Prints the per-function SCC-DAG and safe/unsafe classification as a
//! human-readable tree. Diagnostic only: nothing here is ever parsed back
//! in, so the format is free to change across versions.

use crate::cfg_facade::ParsedProgram;
use crate::ids::SccId;
use crate::pass::SummaryMap;
use crate::summary::FuncSummary;
use std::collections::BTreeSet;
use std::fmt;

pub struct SummaryDump<'a> {
    pub summary: &'a FuncSummary,
    pub name: &'a str,
}

impl<'a> fmt::Display for SummaryDump<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "function {} safe={} writes={} paths(safe={}, unsafe={})",
            self.name, self.summary.safe, self.summary.writes, self.summary.stats.safe_paths, self.summary.stats.unsafe_paths
        )?;
        if let Some(root) = self.summary.effective_root() {
            let mut seen = BTreeSet::new();
            write_node(f, self.summary, root, 1, &mut seen)?;
        }
        Ok(())
    }
}

fn write_node(
    f: &mut fmt::Formatter<'_>,
    summary: &FuncSummary,
    id: SccId,
    depth: usize,
    seen: &mut BTreeSet<SccId>,
) -> fmt::Result {
    let indent = "  ".repeat(depth);
    if !seen.insert(id) {
        writeln!(f, "{indent}(scc {id} — already shown)")?;
        return Ok(());
    }
    let node = summary.cfg.get(id);
    writeln!(
        f,
        "{indent}scc {id}{}{} blocks={} unsafe={}",
        if node.stack_push { " [stack_push]" } else { "" },
        if node.header_instrumentation {
            " [header_instrumentation]"
        } else {
            ""
        },
        node.blocks.len(),
        node.unsafe_
    )?;
    for &child in &node.children {
        write_node(f, summary, child, depth + 1, seen)?;
    }
    Ok(())
}

/// Dumps every function's SCC-DAG and classification to `out`.
pub fn dump_all(prog: &dyn ParsedProgram, summaries: &SummaryMap, out: &mut impl fmt::Write) -> fmt::Result {
    for fid in prog.functions() {
        if let Some(summary) = summaries.get(&fid) {
            let name = prog.function(fid).name();
            write!(out, "{}", SummaryDump { summary, name })?;
        }
    }
    Ok(())
}
