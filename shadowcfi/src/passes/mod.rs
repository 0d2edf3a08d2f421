//! The 12 canonical analysis passes (§4.3) and the default manager that
//! chains them in dependency order, leaves first.

pub mod block_dead_register;
pub mod call_graph_analysis;
pub mod cfg_analysis;
pub mod dead_register;
pub mod inter_memory;
pub mod intra_memory;
pub mod large_function_filter;
pub mod lower_instrumentation;
pub mod lowering_stats;
pub mod safe_path_counting;
pub mod unused_register;
pub mod validate_cfg;

use crate::pass::{Pass, PassManager};

/// Builds the canonical pass sequence in the order spec'd by §4.3: leaves
/// first in the dependency graph.
pub fn canonical() -> PassManager {
    PassManager::new(vec![
        Pass::global("call-graph-analysis", call_graph_analysis::run),
        Pass::local("large-function-filter", large_function_filter::run),
        Pass::local("intra-procedural-memory-analysis", intra_memory::run),
        Pass::global("inter-procedural-memory-analysis", inter_memory::run),
        Pass::local("cfg-analysis", cfg_analysis::run),
        Pass::local("lower-instrumentation", lower_instrumentation::run),
        Pass::local("validate-cfg", validate_cfg::run),
        Pass::local("lowering-statistics", lowering_stats::run),
        Pass::local("dead-register-analysis", dead_register::run),
        Pass::local("block-dead-register-analysis", block_dead_register::run),
        Pass::local("unused-register-analysis", unused_register::run),
        Pass::local("safe-path-counting", safe_path_counting::run),
    ])
}
