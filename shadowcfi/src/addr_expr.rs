//! Tagged-variant memory-operand expression with a single fold.
//!
//! Replaces a visitor hierarchy over `BinaryFunction`/`Immediate`/
//! `Dereference`/`RegisterAST`-shaped nodes with one enum and one generic
//! traversal. The addressing-mode analyzer (intra-procedural memory
//! analysis classifying a write's `Absloc`) and the red-zone detector both
//! fold over the same `AddrExpr` shape with the same signature; only the
//! accumulator and the leaf/branch functions differ.

use crate::cfg_facade::MemOperand;

/// A decomposed `base + index*scale + displacement` addressing expression.
/// `Reg` is compared by normalized name ([`crate::regs::normalize`]).
#[derive(Clone, Debug)]
pub enum AddrExpr {
    Reg(String),
    Imm(i64),
    Scale(Box<AddrExpr>, u8),
    Add(Box<AddrExpr>, Box<AddrExpr>),
}

impl AddrExpr {
    /// Builds the expression tree for a decoded [`MemOperand`].
    pub fn from_operand(op: &MemOperand) -> Self {
        let mut parts: Vec<AddrExpr> = Vec::new();
        if let Some(base) = op.base {
            parts.push(AddrExpr::Reg(crate::regs::normalize(base)));
        }
        if let Some(index) = op.index {
            parts.push(AddrExpr::Scale(
                Box::new(AddrExpr::Reg(crate::regs::normalize(index))),
                op.scale,
            ));
        }
        if op.disp != 0 || parts.is_empty() {
            parts.push(AddrExpr::Imm(op.disp));
        }
        parts
            .into_iter()
            .reduce(|acc, next| AddrExpr::Add(Box::new(acc), Box::new(next)))
            .unwrap_or(AddrExpr::Imm(0))
    }

    /// Single fold threading an accumulator `acc` through every node.
    /// `reg_fn` and `imm_fn` are the leaf visitors; internal `Scale`/`Add`
    /// nodes are threaded automatically.
    pub fn fold<A>(
        &self,
        acc: A,
        reg_fn: &mut impl FnMut(A, &str) -> A,
        imm_fn: &mut impl FnMut(A, i64) -> A,
    ) -> A {
        match self {
            AddrExpr::Reg(r) => reg_fn(acc, r),
            AddrExpr::Imm(i) => imm_fn(acc, *i),
            AddrExpr::Scale(inner, _) => inner.fold(acc, reg_fn, imm_fn),
            AddrExpr::Add(l, r) => {
                let acc = l.fold(acc, reg_fn, imm_fn);
                r.fold(acc, reg_fn, imm_fn)
            }
        }
    }

    /// True exactly when the expression is `RSP + imm` (no index, no other
    /// base) — the shape the red-zone detector and the SFI bound-check
    /// emitter both pattern-match on.
    pub fn as_rsp_plus_imm(&self) -> Option<i64> {
        if let AddrExpr::Add(base, disp) = self {
            if let (AddrExpr::Reg(r), AddrExpr::Imm(i)) = (base.as_ref(), disp.as_ref()) {
                if r == "RSP" {
                    return Some(*i);
                }
            }
        }
        if let AddrExpr::Reg(r) = self {
            if r == "RSP" {
                return Some(0);
            }
        }
        None
    }

    /// True when the sole base register is RIP (the SFI check is suppressed
    /// for RIP-relative addressing: §4.8.4).
    pub fn is_rip_relative(&self) -> bool {
        matches!(self, AddrExpr::Reg(r) if r == "RIP")
            || matches!(self, AddrExpr::Add(b, _) if matches!(b.as_ref(), AddrExpr::Reg(r) if r == "RIP"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_red_zone_shape() {
        let op = MemOperand {
            base: Some("RSP"),
            index: None,
            scale: 1,
            disp: -24,
        };
        let e = AddrExpr::from_operand(&op);
        assert_eq!(e.as_rsp_plus_imm(), Some(-24));
    }

    #[test]
    fn non_rsp_base_is_not_red_zone() {
        let op = MemOperand {
            base: Some("RBX"),
            index: None,
            scale: 1,
            disp: -8,
        };
        let e = AddrExpr::from_operand(&op);
        assert_eq!(e.as_rsp_plus_imm(), None);
    }

    #[test]
    fn fold_collects_registers() {
        let op = MemOperand {
            base: Some("RBX"),
            index: Some("RCX"),
            scale: 4,
            disp: 16,
        };
        let e = AddrExpr::from_operand(&op);
        let regs = e.fold(
            Vec::new(),
            &mut |mut acc: Vec<String>, r: &str| {
                acc.push(r.to_owned());
                acc
            },
            &mut |acc, _| acc,
        );
        assert_eq!(regs, vec!["RBX".to_owned(), "RCX".to_owned()]);
    }
}
