//! `shadowcfi`: command-line front end for the shadow-return-stack CFI
//! hardening analyzer. Parses flags, drives the library's pass pipeline,
//! and writes the audit-cache file. Patched-binary splicing itself is the
//! job of a binary-rewriter collaborator this crate does not implement
//! (§6.2); what this binary writes today is the analysis cache plus,
//! with `--dump-cfg`, the diagnostic tree.

mod facade;

use clap::{Parser, ValueEnum};
use shadowcfi::{
    analyzer::AnalyzerBuilder,
    config::{ConfigBuilder, DryRun, ProtectionKind, ShadowStackKind},
    dump,
};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Clone, Copy, ValueEnum)]
enum ShadowStackArg {
    Avx2,
    Avx512,
    Mem,
}

impl std::fmt::Display for ShadowStackArg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ShadowStackArg::Avx2 => "avx2",
            ShadowStackArg::Avx512 => "avx512",
            ShadowStackArg::Mem => "mem",
        })
    }
}

impl From<ShadowStackArg> for ShadowStackKind {
    fn from(v: ShadowStackArg) -> Self {
        match v {
            ShadowStackArg::Avx2 => ShadowStackKind::Avx2,
            ShadowStackArg::Avx512 => ShadowStackKind::Avx512,
            ShadowStackArg::Mem => ShadowStackKind::Mem,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum ProtectionArg {
    Sanitize,
    Mpx,
    None,
}

impl std::fmt::Display for ProtectionArg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ProtectionArg::Sanitize => "sanitize",
            ProtectionArg::Mpx => "mpx",
            ProtectionArg::None => "none",
        })
    }
}

impl From<ProtectionArg> for ProtectionKind {
    fn from(v: ProtectionArg) -> Self {
        match v {
            ProtectionArg::Sanitize => ProtectionKind::Sanitize,
            ProtectionArg::Mpx => ProtectionKind::Mpx,
            ProtectionArg::None => ProtectionKind::None,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum DryRunArg {
    Off,
    Empty,
    OnlySave,
}

impl std::fmt::Display for DryRunArg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            DryRunArg::Off => "off",
            DryRunArg::Empty => "empty",
            DryRunArg::OnlySave => "only-save",
        })
    }
}

impl From<DryRunArg> for DryRun {
    fn from(v: DryRunArg) -> Self {
        match v {
            DryRunArg::Off => DryRun::Off,
            DryRunArg::Empty => DryRun::Empty,
            DryRunArg::OnlySave => DryRun::OnlySave,
        }
    }
}

/// Static shadow-stack CFI hardening analyzer and instrumentation emitter.
#[derive(Parser)]
#[command(name = "shadowcfi", version)]
struct Args {
    /// ELF-64 x86-64 executable or shared library to analyze.
    binary: PathBuf,

    /// Shadow-stack backend.
    #[arg(long, value_enum, default_value_t = ShadowStackArg::Mem)]
    shadow_stack: ShadowStackArg,

    /// Memory-write protection for the `mem` backend's shadow region.
    #[arg(long, value_enum, default_value_t = ProtectionArg::None)]
    shadow_stack_protection: ProtectionArg,

    /// Enable the frame-pointer cross-check variant.
    #[arg(long)]
    validate_frame: bool,

    /// Permit dead-register scratch elision.
    #[arg(long, default_value_t = true)]
    optimize_regs: bool,

    /// Elide the validation core, for instrumentation-cost measurement.
    #[arg(long, value_enum, default_value_t = DryRunArg::Off)]
    dry_run: DryRunArg,

    /// Depth-profile instrumentation parameter.
    #[arg(long)]
    stack_size: Option<u64>,

    /// Depth-profile instrumentation parameter.
    #[arg(long)]
    capture_at: Option<u64>,

    /// Output path for the patched binary (defaults to the input path with
    /// a `_cfi` suffix).
    #[arg(long)]
    output: Option<PathBuf>,

    /// Path to the line-oriented analysis cache file.
    #[arg(long, default_value = "shadowcfi.cache")]
    cache: PathBuf,

    /// Print the per-function SCC-DAG and safe/unsafe classification
    /// instead of (or alongside) producing output.
    #[arg(long)]
    dump_cfg: bool,
}

impl From<Args> for Result<shadowcfi::Config, String> {
    fn from(args: Args) -> Self {
        let output_path = Some(args.output.unwrap_or_else(|| default_output_path(&args.binary)));
        ConfigBuilder::new()
            .shadow_stack(args.shadow_stack.into())
            .shadow_stack_protection(args.shadow_stack_protection.into())
            .validate_frame(args.validate_frame)
            .optimize_regs(args.optimize_regs)
            .dry_run(args.dry_run.into())
            .stack_size(args.stack_size)
            .capture_at(args.capture_at)
            .cache_path(args.cache.clone())
            .output_path(output_path)
            .dump_cfg(args.dump_cfg)
            .build()
    }
}

fn default_output_path(binary: &std::path::Path) -> PathBuf {
    let mut name = binary
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "out".to_owned());
    name.push_str("_cfi");
    binary.with_file_name(name)
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let binary = args.binary.clone();
    let config = match Result::<shadowcfi::Config, String>::from(args) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("shadowcfi: invalid configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    let prog = match facade::SymbolTableProgram::load(&binary) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("shadowcfi: {e}");
            return ExitCode::FAILURE;
        }
    };

    let dump_cfg = config.dump_cfg;
    let analyzer = AnalyzerBuilder::new(&prog).config(config).build();
    let mut analyzer = match analyzer {
        Ok(a) => a,
        Err(e) => {
            eprintln!("shadowcfi: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = analyzer.run() {
        eprintln!("shadowcfi: {e}");
        return ExitCode::FAILURE;
    }

    if dump_cfg {
        let mut out = String::new();
        if dump::dump_all(&prog, analyzer.summaries(), &mut out).is_ok() {
            print!("{out}");
        }
    }

    let n_safe = analyzer.summaries().values().filter(|s| s.safe).count();
    let n_total = analyzer.summaries().len();
    let n_sites: usize = analyzer.emitted().values().map(Vec::len).sum();
    let n_bytes: usize = analyzer
        .emitted()
        .values()
        .flat_map(|seqs| seqs.iter())
        .map(|(_, seq)| seq.bytes.len())
        .sum();
    log::info!(
        "analyzed {n_total} functions, {n_safe} classified safe; emitted {n_sites} instrumentation sequences ({n_bytes} bytes) across {} functions",
        analyzer.emitted().len()
    );

    ExitCode::SUCCESS
}
