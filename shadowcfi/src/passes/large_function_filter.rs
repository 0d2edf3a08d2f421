//! Pass 2: Large-Function Filter.
//!
//! Functions whose address span exceeds [`LARGE_FUNCTION_THRESHOLD`] bytes
//! are marked `assume_unsafe` and skipped by every subsequent analysis (a
//! function that is already `assume_unsafe` is a no-op for the remaining
//! local passes, since they all bail out early on that flag).

use crate::cfg_facade::ParsedProgram;
use crate::error::StructuralViolation;
use crate::ids::FuncId;
use crate::pass::SummaryMap;
use crate::summary::FuncSummary;

pub const LARGE_FUNCTION_THRESHOLD: u64 = 20_000;

pub fn run(
    prog: &dyn ParsedProgram,
    fid: FuncId,
    summaries: &mut SummaryMap,
) -> Result<(), StructuralViolation> {
    let f = prog.function(fid);
    let summary = summaries.entry(fid).or_insert_with(|| FuncSummary::new(fid));
    if f.address_span() > LARGE_FUNCTION_THRESHOLD {
        summary.assume_unsafe = true;
        summary.recompute_writes();
    }
    Ok(())
}
