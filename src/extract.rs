//! Signature extraction from decoded operands.
//!
//! Each instruction class packs its register-selecting fields differently;
//! the extractors below rebuild the [`RegisterSignature`] tuple from
//! operand values, rendered text, and (for AArch64) the raw encoding
//! word. Unexpected operand shapes surface as
//! [`AnnotatorError::MalformedOperand`] so the driver can skip the
//! instruction instead of aborting the scan.

use crate::error::{AnnotatorError, Result};
use crate::host::Instruction;
use crate::types::{Access, RegisterSignature};

/// An extracted system-register access.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedAccess {
    /// Read or write, from the mnemonic direction letter.
    pub access: Access,
    /// The encoded register signature.
    pub signature: RegisterSignature,
    /// The general-purpose register moved to/from, where the class has a
    /// single one (used by the bitfield tracer).
    pub gp_register: Option<String>,
}

/// Access direction from the mnemonic: a second character `R` marks the
/// read form (MRC/MRRC/MRS), anything else is a write.
pub fn access_direction(mnemonic: &str) -> Access {
    if mnemonic.as_bytes().get(1) == Some(&b'R') {
        Access::Read
    } else {
        Access::Write
    }
}

fn malformed(insn: &Instruction, operand: &str) -> AnnotatorError {
    AnnotatorError::MalformedOperand {
        address: insn.address,
        mnemonic: insn.mnemonic.clone(),
        operand: operand.to_string(),
    }
}

/// Parse a coprocessor-register name of the form `cN`.
fn parse_cr(insn: &Instruction, text: &str) -> Result<u8> {
    let text = text.trim();
    text.strip_prefix('c')
        .and_then(|n| n.parse().ok())
        .ok_or_else(|| malformed(insn, text))
}

fn operand_value(insn: &Instruction, index: usize) -> Result<u64> {
    insn.operand_value(index)
        .ok_or_else(|| malformed(insn, insn.operand_text(index)))
}

fn coprocessor_number(insn: &Instruction) -> Result<u8> {
    insn.operand(0)
        .and_then(|op| op.specifier)
        .ok_or_else(|| malformed(insn, insn.operand_text(0)))
}

/// Extract a 32-bit coprocessor transfer (`MRC p15, 0, R0, c1, c0, 0`).
///
/// Operand 0 carries opcode 1 (and the coprocessor specifier), operand 1
/// renders as `<reg>,<CRn>,<CRm>`, operand 2 carries opcode 2.
pub fn coproc32(insn: &Instruction) -> Result<ExtractedAccess> {
    let cp = coprocessor_number(insn)?;
    let op1 = operand_value(insn, 0)? as u8;
    let op2 = operand_value(insn, 2)? as u8;

    let middle = insn.operand_text(1);
    let mut parts = middle.split(',');
    let (reg, crn, crm) = match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(reg), Some(crn), Some(crm), None) => (reg, crn, crm),
        _ => return Err(malformed(insn, middle)),
    };

    Ok(ExtractedAccess {
        access: access_direction(&insn.mnemonic),
        signature: RegisterSignature::Coproc32 {
            cp,
            crn: parse_cr(insn, crn)?,
            op1,
            crm: parse_cr(insn, crm)?,
            op2,
        },
        gp_register: Some(reg.trim().to_string()),
    })
}

/// Extract a 64-bit coprocessor transfer (`MCRR p15, 0, R0, R1, c2`).
///
/// Operand 1 renders as `<low-reg>,<high-reg>,<CRm>`; there is no CRn.
/// The transferred value spans two registers, so no single register is
/// reported for tracing.
pub fn coproc64(insn: &Instruction) -> Result<ExtractedAccess> {
    let cp = coprocessor_number(insn)?;
    let op1 = operand_value(insn, 0)? as u8;

    let middle = insn.operand_text(1);
    let mut parts = middle.split(',');
    let crm = match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(_low), Some(_high), Some(crm), None) => crm,
        _ => return Err(malformed(insn, middle)),
    };

    Ok(ExtractedAccess {
        access: access_direction(&insn.mnemonic),
        signature: RegisterSignature::Coproc64 {
            cp,
            op1,
            crm: parse_cr(insn, crm)?,
        },
        gp_register: None,
    })
}

/// Extract an AArch64 system-register access (`MRS X0, #0, c4, c2, #2`).
///
/// The read form puts the destination register first with the system
/// fields at operands 1..4; the write form puts the source register last
/// with the fields at 0..3. op0 is not an operand: it comes from bit 19
/// of the raw encoding (always 2 or 3).
pub fn sysreg64(insn: &Instruction) -> Result<ExtractedAccess> {
    let access = access_direction(&insn.mnemonic);
    let (reg_pos, base) = match access {
        Access::Read => (0, 1),
        Access::Write => (4, 0),
    };

    let op0 = 2 + ((insn.encoding >> 19) & 1) as u8;
    let op1 = operand_value(insn, base)? as u8;
    let op2 = operand_value(insn, base + 3)? as u8;
    let crn = parse_cr(insn, insn.operand_text(base + 1))?;
    let crm = parse_cr(insn, insn.operand_text(base + 2))?;

    let reg = insn.operand_text(reg_pos);
    if reg.is_empty() {
        return Err(malformed(insn, reg));
    }

    Ok(ExtractedAccess {
        access,
        signature: RegisterSignature::Sysreg64 {
            op0,
            op1,
            crn,
            crm,
            op2,
        },
        gp_register: Some(reg.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::Operand;
    use pretty_assertions::assert_eq;

    fn imm(value: u64) -> Operand {
        Operand {
            text: format!("#{value}"),
            value: Some(value),
            specifier: None,
        }
    }

    fn coproc_insn(mnemonic: &str, cp: u8, op1: u64, middle: &str, op2: Option<u64>) -> Instruction {
        let mut operands = vec![
            Operand {
                text: op1.to_string(),
                value: Some(op1),
                specifier: Some(cp),
            },
            Operand::text(middle),
        ];
        if let Some(op2) = op2 {
            operands.push(Operand {
                text: op2.to_string(),
                value: Some(op2),
                specifier: None,
            });
        }
        Instruction {
            address: 0x1000,
            mnemonic: mnemonic.into(),
            operands,
            encoding: 0,
        }
    }

    #[test]
    fn test_access_direction() {
        assert_eq!(access_direction("MRC"), Access::Read);
        assert_eq!(access_direction("MCR"), Access::Write);
        assert_eq!(access_direction("MRRC2"), Access::Read);
        assert_eq!(access_direction("MSR"), Access::Write);
        assert_eq!(access_direction("MRS"), Access::Read);
    }

    #[test]
    fn test_coproc32_extraction() {
        let insn = coproc_insn("MCR", 15, 0, "R0,c1,c0", Some(0));
        let acc = coproc32(&insn).unwrap();
        assert_eq!(acc.access, Access::Write);
        assert_eq!(
            acc.signature,
            RegisterSignature::Coproc32 {
                cp: 15,
                crn: 1,
                op1: 0,
                crm: 0,
                op2: 0,
            }
        );
        assert_eq!(acc.gp_register.as_deref(), Some("R0"));
    }

    #[test]
    fn test_coproc32_malformed_middle_operand() {
        let insn = coproc_insn("MRC", 15, 0, "R0,c1", Some(0));
        let err = coproc32(&insn).unwrap_err();
        assert!(matches!(
            err,
            AnnotatorError::MalformedOperand { address: 0x1000, .. }
        ));
    }

    #[test]
    fn test_coproc64_extraction() {
        let insn = coproc_insn("MRRC", 15, 1, "R0,R1,c2", None);
        let acc = coproc64(&insn).unwrap();
        assert_eq!(acc.access, Access::Read);
        assert_eq!(
            acc.signature,
            RegisterSignature::Coproc64 {
                cp: 15,
                op1: 1,
                crm: 2,
            }
        );
        assert_eq!(acc.gp_register, None);
    }

    #[test]
    fn test_sysreg64_read_and_write_forms() {
        // MRS X0, #0, c4, c2, #2 (CurrentEL; encoding bit 19 set -> op0 = 3)
        let read = Instruction {
            address: 0x2000,
            mnemonic: "MRS".into(),
            operands: vec![
                Operand::text("X0"),
                imm(0),
                Operand::text("c4"),
                Operand::text("c2"),
                imm(2),
            ],
            encoding: 1 << 19,
        };
        let acc = sysreg64(&read).unwrap();
        assert_eq!(acc.access, Access::Read);
        assert_eq!(
            acc.signature,
            RegisterSignature::Sysreg64 {
                op0: 3,
                op1: 0,
                crn: 4,
                crm: 2,
                op2: 2,
            }
        );
        assert_eq!(acc.gp_register.as_deref(), Some("X0"));

        // MSR #0, c1, c0, #0, X0 (write form: fields first, register last)
        let write = Instruction {
            address: 0x2004,
            mnemonic: "MSR".into(),
            operands: vec![
                imm(0),
                Operand::text("c1"),
                Operand::text("c0"),
                imm(0),
                Operand::text("X0"),
            ],
            encoding: 1 << 19,
        };
        let acc = sysreg64(&write).unwrap();
        assert_eq!(acc.access, Access::Write);
        assert_eq!(
            acc.signature,
            RegisterSignature::Sysreg64 {
                op0: 3,
                op1: 0,
                crn: 1,
                crm: 0,
                op2: 0,
            }
        );
        assert_eq!(acc.gp_register.as_deref(), Some("X0"));
    }

    #[test]
    fn test_sysreg64_op0_from_bit19() {
        let mut insn = Instruction {
            address: 0,
            mnemonic: "MRS".into(),
            operands: vec![
                Operand::text("X1"),
                imm(3),
                Operand::text("c4"),
                Operand::text("c2"),
                imm(1),
            ],
            encoding: 0,
        };
        let acc = sysreg64(&insn).unwrap();
        assert!(matches!(
            acc.signature,
            RegisterSignature::Sysreg64 { op0: 2, .. }
        ));
        insn.encoding = 1 << 19;
        let acc = sysreg64(&insn).unwrap();
        assert!(matches!(
            acc.signature,
            RegisterSignature::Sysreg64 { op0: 3, .. }
        ));
    }

    #[test]
    fn test_sysreg64_missing_value_is_malformed() {
        let insn = Instruction {
            address: 0x3000,
            mnemonic: "MRS".into(),
            operands: vec![
                Operand::text("X0"),
                Operand::text("#0"), // no decoded value
                Operand::text("c4"),
                Operand::text("c2"),
                Operand::text("#2"),
            ],
            encoding: 0,
        };
        assert!(sysreg64(&insn).is_err());
    }
}
