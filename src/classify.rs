//! System-instruction classification.
//!
//! A pure predicate over decoded instructions. Matching is by mnemonic
//! membership first, then by two operand-shape idioms that legacy
//! exception returns use.

use crate::host::Instruction;

/// Mnemonics that always denote a system instruction.
const SYSTEM_MNEMONICS: &[&str] = &[
    // CPSR access
    "MSR", "MRS", "CPSIE", "CPSID",
    // CP access
    "MRC", "MRC2", "MRRC", "MRRC2", "MCR", "MCR2", "MCRR", "MCRR2", "LDC", "LDC2", "STC", "STC2",
    "CDP", "CDP2",
    // System (AArch64)
    "SYS", "SYSL", "IC", "DC", "AT", "TLBI",
    // Barriers
    "DSB", "DMB", "ISB", "CLREX",
    // Misc
    "SRS", "VMRS", "VMSR", "DBG", "DCPS1", "DCPS2", "DCPS3", "DRPS",
    // Hints
    "YIELD", "WFE", "WFI", "SEV", "SEVL", "HINT",
    // Exception generating
    "BKPT", "BRK", "SVC", "SWI", "SMC", "SMI", "HVC",
    // Special modes
    "ENTERX", "LEAVEX", "BXJ",
    // Return from exception
    "RFE", "ERET",
    // Pointer authentication
    "PACDA", "PACDZA", "PACDB", "PACDZB", "PACGA", "PACIA", "PACIA1716", "PACIASP", "PACIAZ",
    "PACIZA", "PACIB", "PACIB1716", "PACIBSP", "PACIBZ", "PACIZB", "AUTDA", "AUTDZA", "AUTDB",
    "AUTDZB", "AUTIA", "AUTIA1716", "AUTIASP", "AUTIAZ", "AUTIZA", "AUTIB", "AUTIB1716",
    "AUTIBSP", "AUTIBZ", "AUTIZB",
];

/// Decide whether `insn` is a system instruction.
///
/// Rules in order, first match wins:
/// 1. the mnemonic is in the fixed system set;
/// 2. an `LDM*` whose second operand ends with `^` (user-bank transfer /
///    exception-return form);
/// 3. `SUBS PC, LR, ...` or `MOVS PC, LR` (exception-return idiom).
pub fn is_system_instruction(insn: &Instruction) -> bool {
    let mnem = insn.mnemonic.as_str();
    if mnem.is_empty() {
        return false;
    }
    if SYSTEM_MNEMONICS.contains(&mnem) {
        return true;
    }
    if mnem.starts_with("LDM") && insn.operand_text(1).ends_with('^') {
        return true;
    }
    if (mnem == "SUBS" || mnem == "MOVS")
        && insn.operand_text(0) == "PC"
        && insn.operand_text(1) == "LR"
    {
        return true;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::Operand;

    fn insn(mnemonic: &str, operands: &[&str]) -> Instruction {
        Instruction {
            address: 0x1000,
            mnemonic: mnemonic.into(),
            operands: operands.iter().map(|t| Operand::text(*t)).collect(),
            encoding: 0,
        }
    }

    #[test]
    fn test_mnemonic_set_members() {
        for m in ["MRC", "MSR", "TLBI", "ERET", "PACIASP", "WFI", "BKPT"] {
            assert!(is_system_instruction(&insn(m, &[])), "{m} must match");
        }
    }

    #[test]
    fn test_ordinary_instructions_rejected() {
        for m in ["MOV", "ADD", "LDR", "B", "BL", "STR"] {
            assert!(!is_system_instruction(&insn(m, &["R0", "R1"])), "{m}");
        }
    }

    #[test]
    fn test_ldm_user_bank_form() {
        assert!(is_system_instruction(&insn(
            "LDMFD",
            &["SP!", "{R0-R12,LR,PC}^"]
        )));
        assert!(!is_system_instruction(&insn(
            "LDMFD",
            &["SP!", "{R0-R12,LR,PC}"]
        )));
    }

    #[test]
    fn test_exception_return_idioms() {
        assert!(is_system_instruction(&insn("MOVS", &["PC", "LR"])));
        assert!(is_system_instruction(&insn("SUBS", &["PC", "LR", "#4"])));
        assert!(!is_system_instruction(&insn("MOVS", &["R0", "LR"])));
        assert!(!is_system_instruction(&insn("SUBS", &["PC", "R1", "#4"])));
    }

    #[test]
    fn test_empty_mnemonic() {
        assert!(!is_system_instruction(&insn("", &[])));
    }
}
