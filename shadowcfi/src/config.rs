//! Pipeline configuration (§6.1). Parsed and validated by the CLI front
//! end; library code only ever consumes a plain [`Config`] value, never
//! argv itself.

use std::path::PathBuf;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ShadowStackKind {
    Avx2,
    Avx512,
    Mem,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ProtectionKind {
    Sanitize,
    Mpx,
    None,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum DryRun {
    #[default]
    Off,
    Empty,
    OnlySave,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub shadow_stack: ShadowStackKind,
    pub shadow_stack_protection: ProtectionKind,
    pub validate_frame: bool,
    pub optimize_regs: bool,
    pub dry_run: DryRun,
    pub stack_size: Option<u64>,
    pub capture_at: Option<u64>,
    pub cache_path: PathBuf,
    pub output_path: Option<PathBuf>,
    pub dump_cfg: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            shadow_stack: ShadowStackKind::Mem,
            shadow_stack_protection: ProtectionKind::None,
            validate_frame: false,
            optimize_regs: true,
            dry_run: DryRun::Off,
            stack_size: None,
            capture_at: None,
            cache_path: PathBuf::from("shadowcfi.cache"),
            output_path: None,
            dump_cfg: false,
        }
    }
}

/// Builder mirroring the orchestrator's own builder pattern: validated
/// config in, `Config` out.
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn shadow_stack(mut self, kind: ShadowStackKind) -> Self {
        self.config.shadow_stack = kind;
        self
    }

    pub fn shadow_stack_protection(mut self, kind: ProtectionKind) -> Self {
        self.config.shadow_stack_protection = kind;
        self
    }

    pub fn validate_frame(mut self, on: bool) -> Self {
        self.config.validate_frame = on;
        self
    }

    pub fn optimize_regs(mut self, on: bool) -> Self {
        self.config.optimize_regs = on;
        self
    }

    pub fn dry_run(mut self, mode: DryRun) -> Self {
        self.config.dry_run = mode;
        self
    }

    pub fn stack_size(mut self, size: Option<u64>) -> Self {
        self.config.stack_size = size;
        self
    }

    pub fn capture_at(mut self, addr: Option<u64>) -> Self {
        self.config.capture_at = addr;
        self
    }

    pub fn cache_path(mut self, path: std::path::PathBuf) -> Self {
        self.config.cache_path = path;
        self
    }

    pub fn output_path(mut self, path: Option<std::path::PathBuf>) -> Self {
        self.config.output_path = path;
        self
    }

    pub fn dump_cfg(mut self, on: bool) -> Self {
        self.config.dump_cfg = on;
        self
    }

    /// Validates the accumulated options and produces a [`Config`].
    /// `shadow_stack_protection` only makes sense alongside the `mem`
    /// backend (§6.1); any other combination is a configuration error the
    /// CLI should reject before the analyzer ever runs.
    pub fn build(self) -> Result<Config, String> {
        if self.config.shadow_stack_protection != ProtectionKind::None
            && self.config.shadow_stack != ShadowStackKind::Mem
        {
            return Err(
                "shadow_stack_protection is only meaningful with the `mem` backend".to_owned(),
            );
        }
        Ok(self.config)
    }
}
