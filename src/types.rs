//! Core types for the system-register annotator.
//!
//! This module defines the fundamental types shared by the pipeline:
//! architecture mode, access direction, register signatures, and the
//! scan summary returned to callers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Execution state of the binary under analysis.
///
/// Selected once at scan start from the host's native pointer width and
/// threaded explicitly through classification, extraction, and the
/// PSR/PSTATE decoders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchMode {
    /// 32-bit ARM / Thumb execution state.
    AArch32,
    /// 64-bit execution state.
    AArch64,
}

impl ArchMode {
    /// True for the 64-bit execution state.
    pub fn is_aarch64(self) -> bool {
        matches!(self, ArchMode::AArch64)
    }
}

impl fmt::Display for ArchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArchMode::AArch32 => write!(f, "aarch32"),
            ArchMode::AArch64 => write!(f, "aarch64"),
        }
    }
}

/// Direction of a system-register access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Access {
    /// Value flows from the system register into a general-purpose register.
    Read,
    /// Value flows from a general-purpose register into the system register.
    Write,
}

impl Access {
    /// Annotation tag: `<` for reads, `>` for writes.
    pub fn symbol(self) -> char {
        match self {
            Access::Read => '<',
            Access::Write => '>',
        }
    }
}

/// Encoded operand tuple identifying a system or coprocessor register.
///
/// One variant per instruction class. Signatures are immutable lookup
/// keys with structural equality; they never carry the access direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegisterSignature {
    /// 32-bit coprocessor transfer (`MRC`/`MCR` family).
    Coproc32 {
        /// Coprocessor number (the `N` of `pN`).
        cp: u8,
        /// Primary coprocessor register.
        crn: u8,
        /// Opcode 1.
        op1: u8,
        /// Additional coprocessor register.
        crm: u8,
        /// Opcode 2.
        op2: u8,
    },
    /// 64-bit coprocessor transfer (`MRRC`/`MCRR` family); no CRn field.
    Coproc64 {
        /// Coprocessor number.
        cp: u8,
        /// Opcode 1.
        op1: u8,
        /// Additional coprocessor register.
        crm: u8,
    },
    /// AArch64 system-register access (`MRS`/`MSR`).
    Sysreg64 {
        /// Op0, derived from bit 19 of the raw encoding (2 or 3).
        op0: u8,
        /// Op1.
        op1: u8,
        /// CRn.
        crn: u8,
        /// CRm.
        crm: u8,
        /// Op2.
        op2: u8,
    },
}

impl RegisterSignature {
    /// Annotation wording for an unresolvable signature of this class.
    pub fn kind_name(&self) -> &'static str {
        match self {
            RegisterSignature::Coproc32 { .. } | RegisterSignature::Coproc64 { .. } => {
                "coprocessor"
            }
            RegisterSignature::Sysreg64 { .. } => "system",
        }
    }
}

/// Counters reported after a full scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanSummary {
    /// Instructions decoded and examined.
    pub scanned: usize,
    /// Instructions classified as system instructions.
    pub matched: usize,
    /// Matched instructions that received an annotation.
    pub annotated: usize,
    /// Matched instructions skipped due to malformed operand text.
    pub malformed: usize,
}

/// A comment attached to one instruction location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    /// Instruction address.
    pub address: u64,
    /// Comment text.
    pub comment: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_access_symbols() {
        assert_eq!(Access::Read.symbol(), '<');
        assert_eq!(Access::Write.symbol(), '>');
    }

    #[test]
    fn test_signature_equality_is_structural() {
        let a = RegisterSignature::Coproc32 {
            cp: 15,
            crn: 1,
            op1: 0,
            crm: 0,
            op2: 0,
        };
        let b = RegisterSignature::Coproc32 {
            cp: 15,
            crn: 1,
            op1: 0,
            crm: 0,
            op2: 0,
        };
        assert_eq!(a, b);
        let c = RegisterSignature::Coproc32 {
            cp: 15,
            crn: 1,
            op1: 0,
            crm: 0,
            op2: 1,
        };
        assert_ne!(a, c);
    }

    #[test]
    fn test_kind_names() {
        let cp = RegisterSignature::Coproc64 {
            cp: 15,
            op1: 0,
            crm: 2,
        };
        assert_eq!(cp.kind_name(), "coprocessor");
        let sr = RegisterSignature::Sysreg64 {
            op0: 3,
            op1: 0,
            crn: 1,
            crm: 0,
            op2: 0,
        };
        assert_eq!(sr.kind_name(), "system");
    }
}
