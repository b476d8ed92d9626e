//! Capability traits connecting the annotator to a host disassembler.
//!
//! The annotator never decodes machine code itself. It consumes decoded
//! instructions, rendered operand text, raw encoding words, and literal
//! pool values through [`InstructionSource`], and writes comments and
//! visual markers back through [`AnnotationSink`]. Any disassembler
//! front-end can participate by implementing these two traits; the
//! built-in [`crate::listing::Listing`] host covers plain-text listings.

/// One operand of a decoded instruction, as the host renders it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operand {
    /// Rendered operand text, e.g. `R0`, `#0x20`, `c7`, `R0,c7,c5` or
    /// `=0x12345678` for a literal-pool load.
    pub text: String,
    /// Numeric operand value where the host decoded one: the immediate for
    /// `#imm` operands, the pool address for `=value` operands.
    pub value: Option<u64>,
    /// Instruction-specific specifier field; carries the coprocessor
    /// number on the first operand of coprocessor transfers.
    pub specifier: Option<u8>,
}

impl Operand {
    /// Build an operand carrying only rendered text.
    pub fn text(text: impl Into<String>) -> Self {
        Operand {
            text: text.into(),
            value: None,
            specifier: None,
        }
    }

    /// True when the rendered text denotes an immediate (`#...`).
    pub fn is_immediate(&self) -> bool {
        self.text.starts_with('#')
    }

    /// True when the rendered text denotes a literal-pool load (`=...`).
    pub fn is_literal(&self) -> bool {
        self.text.starts_with('=')
    }

    /// The immediate value, when this operand is an immediate with a
    /// decoded value.
    pub fn immediate(&self) -> Option<u64> {
        if self.is_immediate() {
            self.value
        } else {
            None
        }
    }
}

/// A decoded instruction as exposed by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    /// Location of the instruction.
    pub address: u64,
    /// Upper-case mnemonic, e.g. `MRC`, `MSR`, `LDMFD`.
    pub mnemonic: String,
    /// Operand list in host rendering order.
    pub operands: Vec<Operand>,
    /// Raw little-endian encoding word. Needed for bit-level extraction
    /// (AArch64 op0); zero when the host did not provide it.
    pub encoding: u32,
}

impl Instruction {
    /// Operand at `index`, if present.
    pub fn operand(&self, index: usize) -> Option<&Operand> {
        self.operands.get(index)
    }

    /// Rendered text of operand `index`, or `""` when absent.
    pub fn operand_text(&self, index: usize) -> &str {
        self.operands.get(index).map_or("", |op| op.text.as_str())
    }

    /// Decoded value of operand `index`, if the host produced one.
    pub fn operand_value(&self, index: usize) -> Option<u64> {
        self.operands.get(index).and_then(|op| op.value)
    }

    /// First `n` characters of the mnemonic (the family prefix).
    pub fn mnemonic_prefix(&self, n: usize) -> &str {
        let end = self.mnemonic.len().min(n);
        &self.mnemonic[..end]
    }
}

/// Read-only view of the disassembled program provided by the host.
pub trait InstructionSource {
    /// Processor name as reported by the host (`"ARM"` or `"ARMB"` for
    /// ARM-family targets).
    fn processor(&self) -> &str;

    /// Native pointer width in bits; 64 selects AArch64 decoding rules.
    fn pointer_bits(&self) -> u8;

    /// Addressable instruction locations in program order.
    fn addresses(&self) -> Box<dyn Iterator<Item = u64> + '_>;

    /// Decode the instruction at `address`, if one exists there.
    fn decode(&self, address: u64) -> Option<Instruction>;

    /// Fetch a 32-bit word from a data location (literal-pool resolution).
    fn read_word(&self, address: u64) -> Option<u32>;
}

/// Write-through store for annotations produced during a scan.
pub trait AnnotationSink {
    /// Attach a free-text comment to an instruction location. This is an
    /// idempotent set, not an append.
    fn set_comment(&mut self, address: u64, comment: &str);

    /// Set a visual marker (typically a background color) on an
    /// instruction location.
    fn mark(&mut self, address: u64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operand_immediate() {
        let op = Operand {
            text: "#0x40".into(),
            value: Some(0x40),
            specifier: None,
        };
        assert!(op.is_immediate());
        assert_eq!(op.immediate(), Some(0x40));

        let reg = Operand::text("R0");
        assert!(!reg.is_immediate());
        assert_eq!(reg.immediate(), None);
    }

    #[test]
    fn test_operand_literal() {
        let op = Operand {
            text: "=0xC5187D".into(),
            value: Some(0x2000),
            specifier: None,
        };
        assert!(op.is_literal());
        assert!(!op.is_immediate());
    }

    #[test]
    fn test_instruction_accessors() {
        let insn = Instruction {
            address: 0x1000,
            mnemonic: "MRRC".into(),
            operands: vec![Operand::text("0"), Operand::text("R0,R1,c14")],
            encoding: 0,
        };
        assert_eq!(insn.mnemonic_prefix(4), "MRRC");
        assert_eq!(insn.mnemonic_prefix(3), "MRR");
        assert_eq!(insn.operand_text(1), "R0,R1,c14");
        assert_eq!(insn.operand_text(5), "");
    }
}
