//! Static register catalogs and bitfield tables.
//!
//! The catalogs map encoded operand tuples to register identities.
//! An identity holds one or more (short-name, description) aliases;
//! more than one alias means the encoding names different registers
//! depending on execution context (Secure vs Non-secure state) that the
//! encoding alone cannot disambiguate.
//!
//! Table entries live in datasheet-grouped source order; hash indexes
//! over them are built once on first lookup.

mod coproc32;
mod coproc64;
mod fields;
mod sysreg64;

use crate::types::RegisterSignature;
use std::collections::HashMap;
use std::sync::OnceLock;

/// Alias set bound to one encoding: 1..N (short-name, description) pairs.
pub type Aliases = &'static [(&'static str, &'static str)];

/// Named-bitfield table: (bit index, abbreviation, long name) rows.
pub type FieldTable = &'static [(u8, &'static str, &'static str)];

/// Key order: (coprocessor, CRn, opc1, CRm, opc2).
pub(crate) type Coproc32Key = (u8, u8, u8, u8, u8);

/// Key order: (coprocessor, opc1, CRm).
pub(crate) type Coproc64Key = (u8, u8, u8);

/// Key order: (op0, op1, CRn, CRm, op2).
pub(crate) type Sysreg64Key = (u8, u8, u8, u8, u8);

fn coproc32_index() -> &'static HashMap<Coproc32Key, Aliases> {
    static INDEX: OnceLock<HashMap<Coproc32Key, Aliases>> = OnceLock::new();
    INDEX.get_or_init(|| coproc32::COPROC32_REGISTERS.iter().copied().collect())
}

fn coproc64_index() -> &'static HashMap<Coproc64Key, Aliases> {
    static INDEX: OnceLock<HashMap<Coproc64Key, Aliases>> = OnceLock::new();
    INDEX.get_or_init(|| coproc64::COPROC64_REGISTERS.iter().copied().collect())
}

fn sysreg64_index() -> &'static HashMap<Sysreg64Key, Aliases> {
    static INDEX: OnceLock<HashMap<Sysreg64Key, Aliases>> = OnceLock::new();
    INDEX.get_or_init(|| sysreg64::SYSREG64_REGISTERS.iter().copied().collect())
}

/// Exact-match catalog lookup. Returns every alias bound to the
/// signature, or `None` when the encoding is not catalogued.
pub fn lookup(signature: &RegisterSignature) -> Option<Aliases> {
    match *signature {
        RegisterSignature::Coproc32 {
            cp,
            crn,
            op1,
            crm,
            op2,
        } => coproc32_index().get(&(cp, crn, op1, crm, op2)).copied(),
        RegisterSignature::Coproc64 { cp, op1, crm } => {
            coproc64_index().get(&(cp, op1, crm)).copied()
        }
        RegisterSignature::Sysreg64 {
            op0,
            op1,
            crn,
            crm,
            op2,
        } => sysreg64_index().get(&(op0, op1, crn, crm, op2)).copied(),
    }
}

/// Bitfield table for an AArch32 coprocessor register short-name.
pub fn coproc_fields(name: &str) -> Option<FieldTable> {
    fields::COPROC_FIELDS
        .iter()
        .find(|(reg, _)| *reg == name)
        .map(|(_, table)| *table)
}

/// Bitfield table for an AArch64 system register short-name.
pub fn sysreg_fields(name: &str) -> Option<FieldTable> {
    fields::SYSREG_FIELDS
        .iter()
        .find(|(reg, _)| *reg == name)
        .map(|(_, table)| *table)
}

/// Iterate every catalogued (signature, aliases) pair. Test support for
/// exhaustive round-trip checks.
#[cfg(test)]
pub(crate) fn all_entries() -> impl Iterator<Item = (RegisterSignature, Aliases)> {
    let c32 = coproc32::COPROC32_REGISTERS.iter().map(|&(k, v)| {
        (
            RegisterSignature::Coproc32 {
                cp: k.0,
                crn: k.1,
                op1: k.2,
                crm: k.3,
                op2: k.4,
            },
            v,
        )
    });
    let c64 = coproc64::COPROC64_REGISTERS.iter().map(|&(k, v)| {
        (
            RegisterSignature::Coproc64 {
                cp: k.0,
                op1: k.1,
                crm: k.2,
            },
            v,
        )
    });
    let s64 = sysreg64::SYSREG64_REGISTERS.iter().map(|&(k, v)| {
        (
            RegisterSignature::Sysreg64 {
                op0: k.0,
                op1: k.1,
                crn: k.2,
                crm: k.3,
                op2: k.4,
            },
            v,
        )
    });
    c32.chain(c64).chain(s64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_sctlr() {
        let sig = RegisterSignature::Coproc32 {
            cp: 15,
            crn: 1,
            op1: 0,
            crm: 0,
            op2: 0,
        };
        let aliases = lookup(&sig).expect("SCTLR is catalogued");
        assert_eq!(aliases, &[("SCTLR", "System Control Register")]);
    }

    #[test]
    fn test_lookup_ambiguous_alias() {
        // One encoding, two context-dependent identities.
        let sig = RegisterSignature::Coproc32 {
            cp: 15,
            crn: 10,
            op1: 0,
            crm: 2,
            op2: 0,
        };
        let aliases = lookup(&sig).expect("MAIR0/PRRR is catalogued");
        assert_eq!(aliases.len(), 2);
        assert_eq!(aliases[0].0, "MAIR0");
        assert_eq!(aliases[1].0, "PRRR");
    }

    #[test]
    fn test_lookup_coproc64() {
        let sig = RegisterSignature::Coproc64 {
            cp: 15,
            op1: 0,
            crm: 2,
        };
        let aliases = lookup(&sig).unwrap();
        assert_eq!(aliases[0].0, "TTBR0");
    }

    #[test]
    fn test_lookup_sysreg64() {
        // SCTLR_EL1: op0=3 op1=0 CRn=1 CRm=0 op2=0
        let sig = RegisterSignature::Sysreg64 {
            op0: 3,
            op1: 0,
            crn: 1,
            crm: 0,
            op2: 0,
        };
        let aliases = lookup(&sig).unwrap();
        assert_eq!(aliases[0].0, "SCTLR_EL1");
    }

    #[test]
    fn test_lookup_unknown_signature() {
        let sig = RegisterSignature::Coproc32 {
            cp: 9,
            crn: 13,
            op1: 7,
            crm: 13,
            op2: 7,
        };
        assert!(lookup(&sig).is_none());
    }

    #[test]
    fn test_every_entry_resolves_to_itself() {
        // Duplicated keys resolve to their last binding, so fold the
        // entries the same way before comparing.
        let mut expected: HashMap<RegisterSignature, Aliases> = HashMap::new();
        for (sig, aliases) in all_entries() {
            expected.insert(sig, aliases);
        }
        for (sig, aliases) in &expected {
            let resolved = lookup(sig).expect("catalogued signature must resolve");
            assert_eq!(&resolved, aliases, "alias mismatch for {sig:?}");
        }
    }

    #[test]
    fn test_field_tables_by_namespace() {
        assert!(coproc_fields("SCTLR").is_some());
        assert!(coproc_fields("SCTLR_EL1").is_none());
        assert!(sysreg_fields("SCTLR_EL1").is_some());
        assert!(sysreg_fields("SCTLR").is_none());
        assert!(coproc_fields("MIDR").is_none());
    }

    #[test]
    fn test_sctlr_field_bit0() {
        let table = coproc_fields("SCTLR").unwrap();
        let (bit, abbrev, name) = table[0];
        assert_eq!(bit, 0);
        assert_eq!(abbrev, "M");
        assert_eq!(name, "MMU Enable");
    }
}
