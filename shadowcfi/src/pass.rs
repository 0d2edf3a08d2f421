//! A pass is a value, not a subclass. Each [`Pass`] carries up to three
//! function-valued fields (local, global, is-safe); the manager stores an
//! ordered `Vec<Pass>` and has no inheritance hierarchy to walk.

use crate::cfg_facade::ParsedProgram;
use crate::error::StructuralViolation;
use crate::ids::FuncId;
use crate::summary::FuncSummary;
use std::collections::BTreeMap;

pub type SummaryMap = BTreeMap<FuncId, FuncSummary>;

/// Invoked once per function, in an order the manager does not guarantee
/// beyond "after every earlier pass has run on every function". Only
/// `ValidateCFG` ever returns `Err`; every other pass signals a problem by
/// mutating `assume_unsafe` on the relevant summary instead.
pub type LocalAnalysis =
    fn(&dyn ParsedProgram, FuncId, &mut SummaryMap) -> Result<(), StructuralViolation>;

/// Invoked once per program, after every function has had its local
/// analysis (if any) applied for this pass.
pub type GlobalAnalysis =
    fn(&dyn ParsedProgram, &mut SummaryMap) -> Result<(), StructuralViolation>;

/// Overrides the manager's default safe-function predicate for the
/// cumulative counter printed after this pass.
pub type IsSafeFunction = fn(&FuncSummary) -> bool;

fn default_is_safe(s: &FuncSummary) -> bool {
    s.is_safe_by_default_predicate()
}

pub struct Pass {
    pub name: &'static str,
    pub local: Option<LocalAnalysis>,
    pub global: Option<GlobalAnalysis>,
    pub is_safe: IsSafeFunction,
}

impl Pass {
    pub const fn local(name: &'static str, f: LocalAnalysis) -> Self {
        Self {
            name,
            local: Some(f),
            global: None,
            is_safe: default_is_safe,
        }
    }

    pub const fn global(name: &'static str, f: GlobalAnalysis) -> Self {
        Self {
            name,
            local: None,
            global: Some(f),
            is_safe: default_is_safe,
        }
    }

    pub const fn with_is_safe(mut self, f: IsSafeFunction) -> Self {
        self.is_safe = f;
        self
    }
}

/// Runs an ordered sequence of passes over the whole program. There is no
/// cross-pass isolation: every pass reads and writes the same shared
/// [`SummaryMap`]; ordering is the contract (§4.3).
pub struct PassManager {
    passes: Vec<Pass>,
}

impl PassManager {
    pub fn new(passes: Vec<Pass>) -> Self {
        Self { passes }
    }

    pub fn run(
        &self,
        prog: &dyn ParsedProgram,
        summaries: &mut SummaryMap,
    ) -> Result<(), StructuralViolation> {
        for pass in &self.passes {
            if let Some(local) = pass.local {
                for fid in prog.functions() {
                    if prog.function(fid).is_plt_stub() {
                        continue;
                    }
                    local(prog, fid, summaries)?;
                }
            }
            if let Some(global) = pass.global {
                global(prog, summaries)?;
            }
            let safe_count = summaries.values().filter(|s| (pass.is_safe)(s)).count();
            log::info!(
                "pass `{}` complete: {} of {} functions safe",
                pass.name,
                safe_count,
                summaries.len()
            );
        }
        Ok(())
    }
}
