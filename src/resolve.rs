//! Catalog lookup and annotation rendering.

use crate::catalog::{self, Aliases};
use crate::types::{Access, RegisterSignature};

/// Look a signature up in the catalog. Exact structural match only; an
/// uncatalogued signature yields `None`, never a partial guess.
pub fn resolve(signature: &RegisterSignature) -> Option<Aliases> {
    catalog::lookup(signature)
}

/// Render the annotation for a resolved register:
/// `[<dir>] <description> (<short-name>)`, with multiple context-dependent
/// aliases joined by `" or "`.
pub fn render_resolved(access: Access, aliases: Aliases) -> String {
    let names: Vec<String> = aliases
        .iter()
        .map(|(name, desc)| format!("{desc} ({name})"))
        .collect();
    format!("[{}] {}", access.symbol(), names.join(" or "))
}

/// Render the annotation for an unresolvable signature.
pub fn render_unknown(access: Access, signature: &RegisterSignature) -> String {
    format!(
        "[{}] Unknown {} register.",
        access.symbol(),
        signature.kind_name()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_render_single_alias() {
        let aliases: Aliases = &[("SCTLR", "System Control Register")];
        assert_eq!(
            render_resolved(Access::Write, aliases),
            "[>] System Control Register (SCTLR)"
        );
        assert_eq!(
            render_resolved(Access::Read, aliases),
            "[<] System Control Register (SCTLR)"
        );
    }

    #[test]
    fn test_render_ambiguous_aliases() {
        let aliases: Aliases = &[
            ("MAIR0", "Memory Attribute Indirection Register 0"),
            ("PRRR", "Primary Region Remap Register"),
        ];
        assert_eq!(
            render_resolved(Access::Write, aliases),
            "[>] Memory Attribute Indirection Register 0 (MAIR0) \
             or Primary Region Remap Register (PRRR)"
        );
    }

    #[test]
    fn test_render_unknown_by_kind() {
        let cp = RegisterSignature::Coproc32 {
            cp: 7,
            crn: 0,
            op1: 0,
            crm: 0,
            op2: 0,
        };
        assert_eq!(
            render_unknown(Access::Read, &cp),
            "[<] Unknown coprocessor register."
        );
        let sr = RegisterSignature::Sysreg64 {
            op0: 2,
            op1: 7,
            crn: 15,
            crm: 15,
            op2: 7,
        };
        assert_eq!(
            render_unknown(Access::Write, &sr),
            "[>] Unknown system register."
        );
    }

    #[test]
    fn test_catalog_round_trip_through_pipeline() {
        use crate::host::{Instruction, Operand};
        use crate::{classify, extract};
        use std::collections::HashMap;

        fn imm(value: u8) -> Operand {
            Operand {
                text: format!("#{value}"),
                value: Some(u64::from(value)),
                specifier: None,
            }
        }

        fn opc(value: u8, cp: u8) -> Operand {
            Operand {
                text: value.to_string(),
                value: Some(u64::from(value)),
                specifier: Some(cp),
            }
        }

        fn synthesize(sig: &RegisterSignature) -> Instruction {
            match *sig {
                RegisterSignature::Coproc32 {
                    cp,
                    crn,
                    op1,
                    crm,
                    op2,
                } => Instruction {
                    address: 0x1000,
                    mnemonic: "MCR".into(),
                    operands: vec![
                        opc(op1, cp),
                        Operand::text(format!("R0,c{crn},c{crm}")),
                        imm(op2),
                    ],
                    encoding: 0,
                },
                RegisterSignature::Coproc64 { cp, op1, crm } => Instruction {
                    address: 0x1000,
                    mnemonic: "MCRR".into(),
                    operands: vec![opc(op1, cp), Operand::text(format!("R0,R1,c{crm}"))],
                    encoding: 0,
                },
                RegisterSignature::Sysreg64 {
                    op0,
                    op1,
                    crn,
                    crm,
                    op2,
                } => {
                    // op0 is carried by encoding bit 19, so it can only
                    // be 2 or 3.
                    assert!(matches!(op0, 2 | 3), "op0 out of range in {sig:?}");
                    Instruction {
                        address: 0x1000,
                        mnemonic: "MRS".into(),
                        operands: vec![
                            Operand::text("X0"),
                            imm(op1),
                            Operand::text(format!("c{crn}")),
                            Operand::text(format!("c{crm}")),
                            imm(op2),
                        ],
                        encoding: if op0 == 3 { 1 << 19 } else { 0 },
                    }
                }
            }
        }

        // Duplicated keys bind to their last entry; fold the same way
        // before comparing.
        let mut expected: HashMap<RegisterSignature, Aliases> = HashMap::new();
        for (sig, aliases) in catalog::all_entries() {
            expected.insert(sig, aliases);
        }
        assert!(expected.len() > 800, "catalog unexpectedly small");

        for (sig, aliases) in &expected {
            let insn = synthesize(sig);
            assert!(classify::is_system_instruction(&insn), "{sig:?}");
            let extracted = match sig {
                RegisterSignature::Coproc32 { .. } => extract::coproc32(&insn),
                RegisterSignature::Coproc64 { .. } => extract::coproc64(&insn),
                RegisterSignature::Sysreg64 { .. } => extract::sysreg64(&insn),
            }
            .expect("synthesized operands extract cleanly");
            assert_eq!(extracted.signature, *sig);
            let resolved = resolve(&extracted.signature).expect("catalogued signature resolves");
            assert_eq!(resolved, *aliases, "alias mismatch for {sig:?}");
        }
    }

    #[test]
    fn test_unknown_signature_never_partially_matches() {
        // Same CRn/op1/CRm/op2 as SCTLR but a different coprocessor.
        let near_miss = RegisterSignature::Coproc32 {
            cp: 14,
            crn: 1,
            op1: 0,
            crm: 0,
            op2: 0,
        };
        assert!(resolve(&near_miss).is_none());
    }
}
