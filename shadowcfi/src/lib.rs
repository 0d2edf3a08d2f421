//! Static-analysis pipeline and instrumentation code generator for a
//! shadow-return-stack CFI hardening tool.
//!
//! This crate is the offline analyzer and machine-code emitter only: ELF
//! parsing, control-flow recovery, and the binary rewriter that splices
//! emitted bytes into a target executable live outside it, behind the
//! [`cfg_facade`] trait boundary.

pub mod addr_expr;
pub mod analyzer;
pub mod cache;
pub mod call_graph;
pub mod cfg_facade;
pub mod config;
pub mod dump;
pub mod emit;
pub mod error;
pub mod ids;
pub mod pass;
pub mod passes;
pub mod regs;
pub mod summary;

pub use analyzer::{Analyzer, AnalyzerBuilder};
pub use config::{Config, ConfigBuilder, DryRun, ProtectionKind, ShadowStackKind};
pub use error::ShadowCfiError;
