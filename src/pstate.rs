//! Immediate decoding for PSR and PSTATE writes.
//!
//! `MSR` with an immediate operand bypasses the register catalog: the
//! destination is the processor status itself and the comment is decoded
//! straight from the immediate encoding.

/// AArch32 processor modes, keyed by the low five mode bits of the CPSR.
static ARM_MODES: &[(u8, &str)] = &[
    (0b10000, "User"),
    (0b10001, "FIQ"),
    (0b10010, "IRQ"),
    (0b10011, "Supervisor"),
    (0b10110, "Monitor"),
    (0b10111, "Abort"),
    (0b11011, "Undefined"),
    (0b11111, "System"),
];

fn mode_name(bits: u8) -> &'static str {
    ARM_MODES
        .iter()
        .find(|(key, _)| *key == bits)
        .map_or("Unknown", |(_, name)| name)
}

/// Decode an AArch32 `MSR CPSR_x, #imm` immediate.
///
/// The flag string shows E, A, I, F and T positions, with `-` for each
/// clear bit, followed by the processor mode selected by the low five
/// bits.
pub(crate) fn describe_psr(value: u64) -> String {
    let flag = |bit: u32, ch: char| if value & (1 << bit) != 0 { ch } else { '-' };
    format!(
        "Set CPSR [{}{}{}{}{}], Mode: {}",
        flag(9, 'E'),
        flag(8, 'A'),
        flag(7, 'I'),
        flag(6, 'F'),
        flag(5, 'T'),
        mode_name((value & 0b11111) as u8),
    )
}

/// Decode an AArch64 `MSR <pstatefield>, #imm`.
///
/// `op0` selects the PSTATE field from the instruction encoding; only
/// SPSel, DAIFSet and DAIFClr are architected here. Returns `None` for
/// an unrecognized field.
pub(crate) fn describe_pstate(op0: u8, value: u64) -> Option<String> {
    match op0 {
        0b101 => {
            let sp = if value & 1 != 0 { "SP_ELx" } else { "SP_EL0" };
            Some(format!("Select PSTATE.SP = {sp}"))
        }
        0b110 | 0b111 => {
            let verb = if op0 == 0b110 { "Set" } else { "Clr" };
            let flag = |bit: u32, ch: char| if value & (1 << bit) != 0 { ch } else { '-' };
            Some(format!(
                "{verb} PSTATE.DAIF [{}{}{}{}]",
                flag(3, 'D'),
                flag(2, 'A'),
                flag(1, 'I'),
                flag(0, 'F'),
            ))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_psr_mode_only() {
        assert_eq!(describe_psr(0b10011), "Set CPSR [-----], Mode: Supervisor");
    }

    #[test]
    fn test_psr_flags_and_mode() {
        // I and F masked, Thumb, FIQ mode.
        assert_eq!(
            describe_psr(0b0_0_1_1_1_10001),
            "Set CPSR [--IFT], Mode: FIQ"
        );
    }

    #[test]
    fn test_psr_unknown_mode() {
        assert_eq!(describe_psr(0b00000), "Set CPSR [-----], Mode: Unknown");
        // Hyp mode (0b11010) is not in the table.
        assert_eq!(describe_psr(0b11010), "Set CPSR [-----], Mode: Unknown");
    }

    #[test]
    fn test_pstate_spsel() {
        assert_eq!(
            describe_pstate(0b101, 1).unwrap(),
            "Select PSTATE.SP = SP_ELx"
        );
        assert_eq!(
            describe_pstate(0b101, 0).unwrap(),
            "Select PSTATE.SP = SP_EL0"
        );
    }

    #[test]
    fn test_pstate_daif_set() {
        assert_eq!(
            describe_pstate(0b110, 0b1001).unwrap(),
            "Set PSTATE.DAIF [D--F]"
        );
    }

    #[test]
    fn test_pstate_daif_clear() {
        assert_eq!(
            describe_pstate(0b111, 0b0110).unwrap(),
            "Clr PSTATE.DAIF [-AI-]"
        );
    }

    #[test]
    fn test_pstate_unknown_op0() {
        assert!(describe_pstate(0b001, 0).is_none());
    }
}
