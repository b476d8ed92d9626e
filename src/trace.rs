//! Local data-flow tracing for bitfield-structured registers.
//!
//! On a register write, the value moved into the system register was
//! assembled by nearby preceding instructions; on a register read, the
//! value is usually tested by nearby following instructions. Both traces
//! walk one decoded instruction at a time over the program-order address
//! list and stop at the first instruction that breaks the data-flow
//! assumption. There is no count limit: termination is structural.
//!
//! A full assignment (LDR from a literal pool, MOV immediate) makes the
//! register's prior value irrelevant and ends a backward trace; partial
//! modifications (ORR/BIC immediates) annotate and keep walking toward
//! an earlier full assignment.

use crate::catalog::FieldTable;
use crate::host::{AnnotationSink, Instruction, InstructionSource};

/// Outcome of inspecting one instruction during a trace.
#[derive(Debug, PartialEq, Eq)]
enum TraceStep {
    /// Comment this instruction; `terminal` ends the trace afterwards.
    Annotate { comment: String, terminal: bool },
    /// The data-flow chain is broken; stop without annotating.
    Stop,
}

/// Bits of `value` present in the field table, rendered as abbreviations.
fn field_abbrevs(fields: FieldTable, value: u64) -> String {
    let names: Vec<&str> = fields
        .iter()
        .filter(|(bit, _, _)| value & (1u64 << bit) != 0)
        .map(|(_, abbrev, _)| *abbrev)
        .collect();
    names.join(", ")
}

/// Bits of `value` present in the field table, rendered as full names.
fn field_names(fields: FieldTable, value: u64) -> String {
    let names: Vec<&str> = fields
        .iter()
        .filter(|(bit, _, _)| value & (1u64 << bit) != 0)
        .map(|(_, _, name)| *name)
        .collect();
    names.join(", ")
}

fn backward_step<S: InstructionSource>(
    source: &S,
    insn: &Instruction,
    reg: &str,
    fields: FieldTable,
) -> TraceStep {
    let family = insn.mnemonic_prefix(3);
    if !matches!(family, "LDR" | "MOV" | "ORR" | "BIC") || insn.operand_text(0) != reg {
        return TraceStep::Stop;
    }
    match family {
        "LDR" if insn.operand(1).is_some_and(|op| op.is_literal()) => {
            // Full assignment through the literal pool.
            let Some(pool) = insn.operand_value(1) else {
                return TraceStep::Stop;
            };
            let Some(word) = source.read_word(pool) else {
                return TraceStep::Stop;
            };
            TraceStep::Annotate {
                comment: format!("Set bits {}", field_abbrevs(fields, u64::from(word))),
                terminal: true,
            }
        }
        "MOV" if insn.operand(1).is_some_and(|op| op.immediate().is_some()) => {
            let value = insn.operand_value(1).unwrap_or(0);
            TraceStep::Annotate {
                comment: format!("Set bits {}", field_abbrevs(fields, value)),
                terminal: true,
            }
        }
        "ORR" if insn.operand(2).is_some_and(|op| op.immediate().is_some()) => {
            let value = insn.operand_value(2).unwrap_or(0);
            TraceStep::Annotate {
                comment: format!("Set bit {}", field_names(fields, value)),
                terminal: false,
            }
        }
        "BIC" if insn.operand(2).is_some_and(|op| op.immediate().is_some()) => {
            let value = insn.operand_value(2).unwrap_or(0);
            TraceStep::Annotate {
                comment: format!("Clear bit {}", field_names(fields, value)),
                terminal: false,
            }
        }
        // Tracked family but a register-register form: the mask is not
        // recoverable, and continuing past it would be wrong.
        _ => TraceStep::Stop,
    }
}

fn forward_step(insn: &Instruction, reg: &str, fields: FieldTable) -> TraceStep {
    let family = insn.mnemonic_prefix(3);
    let test = |value: u64| TraceStep::Annotate {
        comment: format!("Test bit {}", field_names(fields, value)),
        terminal: false,
    };
    match family {
        "TST" | "TEQ" if insn.operand_text(0) == reg => {
            match insn.operand(1).and_then(|op| op.immediate()) {
                Some(value) => test(value),
                None => TraceStep::Stop,
            }
        }
        "AND" if insn.operand_text(1) == reg => {
            match insn.operand(2).and_then(|op| op.immediate()) {
                Some(value) => test(value),
                None => TraceStep::Stop,
            }
        }
        // LSLS into the flags: bit (31 - shift) lands in the carry/sign.
        "LSL" if insn.mnemonic.as_bytes().get(3) == Some(&b'S') && insn.operand_text(1) == reg => {
            match insn.operand(2).and_then(|op| op.immediate()) {
                Some(shift) if shift <= 31 => test(1u64 << (31 - shift)),
                _ => TraceStep::Stop,
            }
        }
        _ => TraceStep::Stop,
    }
}

/// Walk backward from the instruction before `anchor`, annotating the
/// assignment chain that produced the value written to the system
/// register.
pub(crate) fn backtrack_fields<S, K>(
    source: &S,
    sink: &mut K,
    addresses: &[u64],
    anchor: usize,
    reg: &str,
    fields: FieldTable,
) where
    S: InstructionSource,
    K: AnnotationSink,
{
    let mut idx = anchor;
    while idx > 0 {
        idx -= 1;
        let Some(insn) = source.decode(addresses[idx]) else {
            break;
        };
        match backward_step(source, &insn, reg, fields) {
            TraceStep::Annotate { comment, terminal } => {
                tracing::debug!(address = insn.address, %comment, "backward trace hit");
                sink.set_comment(insn.address, &comment);
                if terminal {
                    break;
                }
            }
            TraceStep::Stop => break,
        }
    }
}

/// Walk forward from the instruction after `anchor`, annotating tests of
/// the value read from the system register.
pub(crate) fn track_fields<S, K>(
    source: &S,
    sink: &mut K,
    addresses: &[u64],
    anchor: usize,
    reg: &str,
    fields: FieldTable,
) where
    S: InstructionSource,
    K: AnnotationSink,
{
    let mut idx = anchor + 1;
    while idx < addresses.len() {
        let Some(insn) = source.decode(addresses[idx]) else {
            break;
        };
        match forward_step(&insn, reg, fields) {
            TraceStep::Annotate { comment, .. } => {
                tracing::debug!(address = insn.address, %comment, "forward trace hit");
                sink.set_comment(insn.address, &comment);
            }
            TraceStep::Stop => break,
        }
        idx += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog;
    use crate::host::Operand;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    struct FakeSource {
        insns: Vec<Instruction>,
        pool: HashMap<u64, u32>,
    }

    impl FakeSource {
        fn new(insns: Vec<Instruction>) -> Self {
            FakeSource {
                insns,
                pool: HashMap::new(),
            }
        }

        fn addresses(&self) -> Vec<u64> {
            self.insns.iter().map(|i| i.address).collect()
        }
    }

    impl InstructionSource for FakeSource {
        fn processor(&self) -> &str {
            "ARM"
        }
        fn pointer_bits(&self) -> u8 {
            32
        }
        fn addresses(&self) -> Box<dyn Iterator<Item = u64> + '_> {
            Box::new(self.insns.iter().map(|i| i.address))
        }
        fn decode(&self, address: u64) -> Option<Instruction> {
            self.insns.iter().find(|i| i.address == address).cloned()
        }
        fn read_word(&self, address: u64) -> Option<u32> {
            self.pool.get(&address).copied()
        }
    }

    #[derive(Default)]
    struct FakeSink {
        comments: HashMap<u64, String>,
    }

    impl AnnotationSink for FakeSink {
        fn set_comment(&mut self, address: u64, comment: &str) {
            self.comments.insert(address, comment.to_string());
        }
        fn mark(&mut self, _address: u64) {}
    }

    fn insn(address: u64, mnemonic: &str, operands: &[(&str, Option<u64>)]) -> Instruction {
        Instruction {
            address,
            mnemonic: mnemonic.into(),
            operands: operands
                .iter()
                .map(|(text, value)| Operand {
                    text: (*text).into(),
                    value: *value,
                    specifier: None,
                })
                .collect(),
            encoding: 0,
        }
    }

    fn sctlr() -> FieldTable {
        catalog::coproc_fields("SCTLR").unwrap()
    }

    #[test]
    fn test_backward_stops_at_full_assignment() {
        // An earlier MOV must not be reached once the closer MOV ends the
        // trace.
        let src = FakeSource::new(vec![
            insn(0x1000, "MOV", &[("R0", None), ("#0x1000", Some(0x1000))]),
            insn(0x1004, "NOP", &[]),
            insn(0x1008, "NOP", &[]),
            insn(0x100C, "MOV", &[("R0", None), ("#0x1005", Some(0x1005))]),
            insn(0x1010, "MCR", &[]),
        ]);
        let addrs = src.addresses();
        let mut sink = FakeSink::default();
        backtrack_fields(&src, &mut sink, &addrs, 4, "R0", sctlr());
        // M (bit 0), C (bit 2), I (bit 12) set; 0x1000 is bit 12 only.
        assert_eq!(sink.comments.get(&0x100C).unwrap(), "Set bits M, C, I");
        assert!(!sink.comments.contains_key(&0x1000));
        assert_eq!(sink.comments.len(), 1);
    }

    #[test]
    fn test_backward_accumulates_orr_and_bic() {
        let src = FakeSource::new(vec![
            insn(0x2000, "MOV", &[("R0", None), ("#0", Some(0))]),
            insn(
                0x2004,
                "ORR",
                &[("R0", None), ("R0", None), ("#0x4", Some(0x4))],
            ),
            insn(
                0x2008,
                "BIC",
                &[("R0", None), ("R0", None), ("#0x1", Some(0x1))],
            ),
            insn(0x200C, "MCR", &[]),
        ]);
        let addrs = src.addresses();
        let mut sink = FakeSink::default();
        backtrack_fields(&src, &mut sink, &addrs, 3, "R0", sctlr());
        assert_eq!(sink.comments.get(&0x2008).unwrap(), "Clear bit MMU Enable");
        assert_eq!(sink.comments.get(&0x2004).unwrap(), "Set bit Cache Enable");
        // The trace continued past both partial updates to the MOV.
        assert_eq!(sink.comments.get(&0x2000).unwrap(), "Set bits ");
    }

    #[test]
    fn test_backward_stops_at_unrelated_instruction() {
        let src = FakeSource::new(vec![
            insn(0x3000, "MOV", &[("R0", None), ("#0x1", Some(0x1))]),
            insn(0x3004, "ADD", &[("R1", None), ("R1", None), ("#1", Some(1))]),
            insn(0x3008, "MCR", &[]),
        ]);
        let addrs = src.addresses();
        let mut sink = FakeSink::default();
        backtrack_fields(&src, &mut sink, &addrs, 2, "R0", sctlr());
        assert!(sink.comments.is_empty());
    }

    #[test]
    fn test_backward_stops_at_wrong_destination() {
        let src = FakeSource::new(vec![
            insn(0x4000, "MOV", &[("R0", None), ("#0x1", Some(0x1))]),
            insn(0x4004, "MOV", &[("R1", None), ("#0x2", Some(0x2))]),
            insn(0x4008, "MCR", &[]),
        ]);
        let addrs = src.addresses();
        let mut sink = FakeSink::default();
        backtrack_fields(&src, &mut sink, &addrs, 2, "R0", sctlr());
        assert!(sink.comments.is_empty());
    }

    #[test]
    fn test_backward_register_form_stops_without_annotation() {
        let src = FakeSource::new(vec![
            insn(0x5000, "MOV", &[("R0", None), ("#0x1", Some(0x1))]),
            insn(0x5004, "ORR", &[("R0", None), ("R0", None), ("R2", None)]),
            insn(0x5008, "MCR", &[]),
        ]);
        let addrs = src.addresses();
        let mut sink = FakeSink::default();
        backtrack_fields(&src, &mut sink, &addrs, 2, "R0", sctlr());
        assert!(sink.comments.is_empty());
    }

    #[test]
    fn test_backward_literal_pool_load() {
        let mut src = FakeSource::new(vec![
            insn(0x6000, "LDR", &[("R0", None), ("=0x1004", Some(0x7000))]),
            insn(0x6004, "MCR", &[]),
        ]);
        src.pool.insert(0x7000, 0x1005);
        let addrs = src.addresses();
        let mut sink = FakeSink::default();
        backtrack_fields(&src, &mut sink, &addrs, 1, "R0", sctlr());
        assert_eq!(sink.comments.get(&0x6000).unwrap(), "Set bits M, C, I");
    }

    #[test]
    fn test_forward_tst_and_lsls() {
        let src = FakeSource::new(vec![
            insn(0x8000, "MRC", &[]),
            insn(0x8004, "TST", &[("R0", None), ("#0x1", Some(0x1))]),
            insn(0x8008, "LSLS", &[("R1", None), ("R0", None), ("#19", Some(19))]),
            insn(0x800C, "ADD", &[("R2", None), ("R2", None), ("#1", Some(1))]),
            insn(0x8010, "TST", &[("R0", None), ("#0x4", Some(0x4))]),
        ]);
        let addrs = src.addresses();
        let mut sink = FakeSink::default();
        track_fields(&src, &mut sink, &addrs, 0, "R0", sctlr());
        assert_eq!(sink.comments.get(&0x8004).unwrap(), "Test bit MMU Enable");
        // 31 - 19 = bit 12 (instruction cache enable).
        assert_eq!(
            sink.comments.get(&0x8008).unwrap(),
            "Test bit Instruction cache Enable"
        );
        // The ADD broke the chain; the later TST must not be reached.
        assert!(!sink.comments.contains_key(&0x8010));
    }

    #[test]
    fn test_forward_and_with_tracked_register() {
        let src = FakeSource::new(vec![
            insn(0x9000, "MRC", &[]),
            insn(
                0x9004,
                "AND",
                &[("R1", None), ("R0", None), ("#0x2000", Some(0x2000))],
            ),
        ]);
        let addrs = src.addresses();
        let mut sink = FakeSink::default();
        track_fields(&src, &mut sink, &addrs, 0, "R0", sctlr());
        assert_eq!(
            sink.comments.get(&0x9004).unwrap(),
            "Test bit High exception vectors"
        );
    }

    #[test]
    fn test_forward_stops_immediately_on_unrelated() {
        let src = FakeSource::new(vec![
            insn(0xA000, "MRC", &[]),
            insn(0xA004, "MOV", &[("R5", None), ("#0", Some(0))]),
            insn(0xA008, "TST", &[("R0", None), ("#0x1", Some(0x1))]),
        ]);
        let addrs = src.addresses();
        let mut sink = FakeSink::default();
        track_fields(&src, &mut sink, &addrs, 0, "R0", sctlr());
        assert!(sink.comments.is_empty());
    }
}
