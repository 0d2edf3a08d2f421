//! x86-64 register catalogue and name canonicalization.
//!
//! `normalize` collapses sub-register aliases (`EAX`, `AX`, `AH`, `AL`, …) to
//! their containing 64-bit GPR name, the way a decoder's register-name
//! strings need folding before they can be compared against a canonical set.

use strum_macros::{EnumIter, IntoStaticStr};

/// The 14 general-purpose integer registers tracked by unused-register
/// analysis. RSP and RBP are excluded: RSP is never a candidate (it is the
/// stack pointer itself) and RBP is conventionally reserved for the frame
/// pointer even when not strictly required by the ABI.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, EnumIter, IntoStaticStr)]
pub enum Gpr {
    Rax,
    Rbx,
    Rcx,
    Rdx,
    Rsi,
    Rdi,
    R8,
    R9,
    R10,
    R11,
    R12,
    R13,
    R14,
    R15,
}

/// Caller-saved GPRs per the SysV x86-64 ABI; the only lanes whole-function
/// dead-register liveness tracks.
pub const CALLER_SAVED: [Gpr; 8] = [
    Gpr::Rsi,
    Gpr::Rdi,
    Gpr::Rdx,
    Gpr::Rcx,
    Gpr::R8,
    Gpr::R9,
    Gpr::R10,
    Gpr::R11,
];

/// Collapses a decoder's register-name string to its canonical 64-bit name.
/// Mirrors the source analyzer's register-name normalization: `EAX` -> `RAX`,
/// `AX`/`AH`/`AL` -> `RAX`, `R10D` -> `R10`, and so on.
pub fn normalize(reg: &str) -> String {
    if let Some(rest) = reg.strip_prefix('E') {
        return format!("R{rest}");
    }
    match reg {
        "AX" | "AH" | "AL" => return "RAX".to_owned(),
        "BX" | "BH" | "BL" => return "RBX".to_owned(),
        "CX" | "CH" | "CL" => return "RCX".to_owned(),
        "DX" | "DH" | "DL" => return "RDX".to_owned(),
        "SI" => return "RSI".to_owned(),
        "DI" => return "RDI".to_owned(),
        "BP" => return "RBP".to_owned(),
        "SP" => return "RSP".to_owned(),
        _ => {}
    }
    if let Some(rest) = reg.strip_prefix('R') {
        let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
        if !digits.is_empty() && rest.len() > digits.len() {
            return format!("R{digits}");
        }
    }
    reg.to_owned()
}

/// Extracts the numeric lane postfix from a register name such as `YMM12`
/// or `XMM3` (1 or 2 trailing digits).
pub fn extract_numeric_postfix(reg: &str) -> Option<u32> {
    let digits: String = reg
        .chars()
        .rev()
        .take_while(|c| c.is_ascii_digit())
        .collect::<String>()
        .chars()
        .rev()
        .collect();
    if digits.is_empty() {
        None
    } else {
        digits.parse().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_subregisters() {
        assert_eq!(normalize("EAX"), "RAX");
        assert_eq!(normalize("AL"), "RAX");
        assert_eq!(normalize("SI"), "RSI");
        assert_eq!(normalize("R10D"), "R10");
        assert_eq!(normalize("RBX"), "RBX");
    }

    #[test]
    fn extracts_lane_index() {
        assert_eq!(extract_numeric_postfix("YMM12"), Some(12));
        assert_eq!(extract_numeric_postfix("XMM3"), Some(3));
        assert_eq!(extract_numeric_postfix("ZMM31"), Some(31));
    }
}
