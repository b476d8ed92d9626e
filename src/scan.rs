//! Whole-program scan driver.
//!
//! Walks every decodable instruction the source exposes, classifies it,
//! extracts and resolves the register signature for the access forms,
//! and writes comments and marks through the sink. Instructions whose
//! operands cannot be parsed are logged and counted, never fatal.

use crate::error::{AnnotatorError, Result};
use crate::host::{AnnotationSink, Instruction, InstructionSource, Operand};
use crate::types::{Access, ArchMode, RegisterSignature, ScanSummary};
use crate::{catalog, classify, extract, pstate, resolve, trace};

/// Scan `source` for system instructions, annotating through `sink`.
///
/// The source's processor must be ARM (either endianness); the scan mode
/// is chosen from its pointer width. Returns counters describing what
/// the scan saw.
pub fn scan<S, K>(source: &S, sink: &mut K) -> Result<ScanSummary>
where
    S: InstructionSource,
    K: AnnotationSink,
{
    let processor = source.processor();
    if !matches!(processor, "ARM" | "ARMB") {
        return Err(AnnotatorError::UnsupportedArchitecture {
            name: processor.to_string(),
        });
    }
    let mode = if source.pointer_bits() == 64 {
        ArchMode::AArch64
    } else {
        ArchMode::AArch32
    };
    tracing::info!(%mode, "scanning for system instructions");

    let addresses: Vec<u64> = source.addresses().collect();
    let mut summary = ScanSummary::default();
    for (idx, &address) in addresses.iter().enumerate() {
        let Some(insn) = source.decode(address) else {
            continue;
        };
        summary.scanned += 1;
        if !classify::is_system_instruction(&insn) {
            continue;
        }
        summary.matched += 1;
        tracing::debug!(address, mnemonic = %insn.mnemonic, "system instruction");
        if let Err(err) = annotate(source, sink, &addresses, idx, &insn, mode, &mut summary) {
            match err {
                AnnotatorError::MalformedOperand { .. } => {
                    tracing::warn!(%err, "skipping annotation");
                    summary.malformed += 1;
                }
                other => return Err(other),
            }
        }
        // Every system instruction is marked, annotated or not.
        sink.mark(address);
    }
    tracing::info!(?summary, "scan complete");
    Ok(summary)
}

/// Annotate one matched instruction, tracing bitfield data flow where
/// the register resolves unambiguously.
fn annotate<S, K>(
    source: &S,
    sink: &mut K,
    addresses: &[u64],
    idx: usize,
    insn: &Instruction,
    mode: ArchMode,
    summary: &mut ScanSummary,
) -> Result<()>
where
    S: InstructionSource,
    K: AnnotationSink,
{
    let head4 = insn.mnemonic_prefix(4);
    let head3 = insn.mnemonic_prefix(3);

    let access = if head4 == "MRRC" || head4 == "MCRR" {
        extract::coproc64(insn)?
    } else if head3 == "MRC" || head3 == "MCR" {
        extract::coproc32(insn)?
    } else if head3 == "MSR" && !mode.is_aarch64() {
        // MSR CPSR_x, #imm; the register form carries no decodable state.
        if let Some(value) = insn.operand(1).and_then(Operand::immediate) {
            sink.set_comment(insn.address, &pstate::describe_psr(value));
            summary.annotated += 1;
        }
        return Ok(());
    } else if head3 == "MSR" && insn.operands.len() < 3 {
        // MSR <pstatefield>, #imm; the field selector is operand 0's
        // decoded value. The encoding's op2 slot is a fallback for hosts
        // that render the field symbolically.
        let selector = match insn.operand(0).and_then(Operand::immediate) {
            Some(field) => field as u8,
            None => ((insn.encoding >> 5) & 0b111) as u8,
        };
        if let Some(value) = insn.operand(1).and_then(Operand::immediate) {
            if let Some(comment) = pstate::describe_pstate(selector, value) {
                sink.set_comment(insn.address, &comment);
                summary.annotated += 1;
            }
        }
        return Ok(());
    } else if (head3 == "MSR" || head3 == "MRS") && mode.is_aarch64() {
        extract::sysreg64(insn)?
    } else {
        return Ok(());
    };

    match resolve::resolve(&access.signature) {
        Some(aliases) => {
            sink.set_comment(
                insn.address,
                &resolve::render_resolved(access.access, aliases),
            );
            summary.annotated += 1;
            // Trace only when the signature names exactly one register
            // and that register has a known bitfield layout.
            if aliases.len() == 1 {
                let name = aliases[0].0;
                let fields = match &access.signature {
                    RegisterSignature::Sysreg64 { .. } => catalog::sysreg_fields(name),
                    _ => catalog::coproc_fields(name),
                };
                if let (Some(fields), Some(reg)) = (fields, access.gp_register.as_deref()) {
                    match access.access {
                        Access::Write => {
                            trace::backtrack_fields(source, sink, addresses, idx, reg, fields);
                        }
                        Access::Read if mode.is_aarch64() => {
                            trace::track_fields(source, sink, addresses, idx, reg, fields);
                        }
                        Access::Read => {}
                    }
                }
            }
        }
        None => {
            sink.set_comment(
                insn.address,
                &resolve::render_unknown(access.access, &access.signature),
            );
            summary.annotated += 1;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::{BTreeSet, HashMap};

    struct FakeSource {
        processor: &'static str,
        pointer_bits: u8,
        insns: Vec<Instruction>,
    }

    impl InstructionSource for FakeSource {
        fn processor(&self) -> &str {
            self.processor
        }
        fn pointer_bits(&self) -> u8 {
            self.pointer_bits
        }
        fn addresses(&self) -> Box<dyn Iterator<Item = u64> + '_> {
            Box::new(self.insns.iter().map(|i| i.address))
        }
        fn decode(&self, address: u64) -> Option<Instruction> {
            self.insns.iter().find(|i| i.address == address).cloned()
        }
        fn read_word(&self, _address: u64) -> Option<u32> {
            None
        }
    }

    #[derive(Default)]
    struct FakeSink {
        comments: HashMap<u64, String>,
        marked: BTreeSet<u64>,
    }

    impl AnnotationSink for FakeSink {
        fn set_comment(&mut self, address: u64, comment: &str) {
            self.comments.insert(address, comment.to_string());
        }
        fn mark(&mut self, address: u64) {
            self.marked.insert(address);
        }
    }

    fn insn(address: u64, mnemonic: &str, operands: Vec<Operand>) -> Instruction {
        Instruction {
            address,
            mnemonic: mnemonic.into(),
            operands,
            encoding: 0,
        }
    }

    fn imm(value: u64) -> Operand {
        Operand {
            text: format!("#{value:#x}"),
            value: Some(value),
            specifier: None,
        }
    }

    fn coproc_op1(cp: u8, op1: u64) -> Operand {
        Operand {
            text: op1.to_string(),
            value: Some(op1),
            specifier: Some(cp),
        }
    }

    fn aarch32(insns: Vec<Instruction>) -> FakeSource {
        FakeSource {
            processor: "ARM",
            pointer_bits: 32,
            insns,
        }
    }

    #[test]
    fn test_rejects_non_arm_processor() {
        let src = FakeSource {
            processor: "PPC",
            pointer_bits: 32,
            insns: vec![],
        };
        let mut sink = FakeSink::default();
        let err = scan(&src, &mut sink).unwrap_err();
        assert!(matches!(
            err,
            AnnotatorError::UnsupportedArchitecture { name } if name == "PPC"
        ));
    }

    #[test]
    fn test_mcr_write_with_backward_trace() {
        let src = aarch32(vec![
            insn(0x1000, "MOV", vec![Operand::text("R0"), imm(0x1)]),
            insn(
                0x1004,
                "MCR",
                vec![
                    coproc_op1(15, 0),
                    Operand::text("R0,c1,c0"),
                    imm(0),
                ],
            ),
        ]);
        let mut sink = FakeSink::default();
        let summary = scan(&src, &mut sink).unwrap();
        assert_eq!(summary.scanned, 2);
        assert_eq!(summary.matched, 1);
        assert_eq!(summary.annotated, 1);
        assert_eq!(
            sink.comments.get(&0x1004).unwrap(),
            "[>] System Control Register (SCTLR)"
        );
        assert_eq!(sink.comments.get(&0x1000).unwrap(), "Set bits M");
        assert_eq!(sink.marked.iter().copied().collect::<Vec<_>>(), vec![0x1004]);
    }

    #[test]
    fn test_mrc_read_is_not_traced_forward_on_aarch32() {
        let src = aarch32(vec![
            insn(
                0x2000,
                "MRC",
                vec![
                    coproc_op1(15, 0),
                    Operand::text("R0,c1,c0"),
                    imm(0),
                ],
            ),
            insn(0x2004, "TST", vec![Operand::text("R0"), imm(0x1)]),
        ]);
        let mut sink = FakeSink::default();
        scan(&src, &mut sink).unwrap();
        assert_eq!(
            sink.comments.get(&0x2000).unwrap(),
            "[<] System Control Register (SCTLR)"
        );
        assert!(!sink.comments.contains_key(&0x2004));
    }

    #[test]
    fn test_unknown_coprocessor_register() {
        let src = aarch32(vec![insn(
            0x3000,
            "MCR",
            vec![
                coproc_op1(15, 7),
                Operand::text("R3,c15,c13"),
                imm(5),
            ],
        )]);
        let mut sink = FakeSink::default();
        scan(&src, &mut sink).unwrap();
        assert_eq!(
            sink.comments.get(&0x3000).unwrap(),
            "[>] Unknown coprocessor register."
        );
    }

    #[test]
    fn test_psr_immediate_write() {
        let src = aarch32(vec![insn(
            0x4000,
            "MSR",
            vec![Operand::text("CPSR_c"), imm(0b11010011)],
        )]);
        let mut sink = FakeSink::default();
        let summary = scan(&src, &mut sink).unwrap();
        assert_eq!(summary.annotated, 1);
        assert_eq!(
            sink.comments.get(&0x4000).unwrap(),
            "Set CPSR [--IF-], Mode: Supervisor"
        );
    }

    #[test]
    fn test_psr_register_write_marks_without_comment() {
        let src = aarch32(vec![insn(
            0x4100,
            "MSR",
            vec![Operand::text("CPSR_c"), Operand::text("R0")],
        )]);
        let mut sink = FakeSink::default();
        let summary = scan(&src, &mut sink).unwrap();
        assert_eq!(summary.matched, 1);
        assert_eq!(summary.annotated, 0);
        assert!(sink.comments.is_empty());
        assert!(sink.marked.contains(&0x4100));
    }

    #[test]
    fn test_aarch64_mrs_with_forward_trace() {
        let mut mrs = insn(
            0x5000,
            "MRS",
            vec![
                Operand::text("X0"),
                imm(0),
                Operand::text("c1"),
                Operand::text("c0"),
                imm(0),
            ],
        );
        mrs.encoding = 1 << 19; // op0 = 3
        let src = FakeSource {
            processor: "ARM",
            pointer_bits: 64,
            insns: vec![
                mrs,
                insn(0x5004, "TST", vec![Operand::text("X0"), imm(0x1)]),
            ],
        };
        let mut sink = FakeSink::default();
        scan(&src, &mut sink).unwrap();
        assert_eq!(
            sink.comments.get(&0x5000).unwrap(),
            "[<] System Control Register (EL1) (SCTLR_EL1)"
        );
        assert_eq!(sink.comments.get(&0x5004).unwrap(), "Test bit MMU Enable");
    }

    #[test]
    fn test_pstate_selector_from_operand_value() {
        // Hosts that decode both operands as immediates need no raw
        // encoding word at all.
        let msr = insn(0x5800, "MSR", vec![imm(0b110), imm(0b1001)]);
        let src = FakeSource {
            processor: "ARM",
            pointer_bits: 64,
            insns: vec![msr],
        };
        let mut sink = FakeSink::default();
        scan(&src, &mut sink).unwrap();
        assert_eq!(
            sink.comments.get(&0x5800).unwrap(),
            "Set PSTATE.DAIF [D--F]"
        );
    }

    #[test]
    fn test_aarch64_pstate_immediate() {
        // Symbolic field rendering: the selector falls back to the
        // encoding's op2 slot.
        let mut msr = insn(
            0x6000,
            "MSR",
            vec![Operand::text("DAIFSet"), imm(0b1001)],
        );
        msr.encoding = 0b110 << 5;
        let src = FakeSource {
            processor: "ARM",
            pointer_bits: 64,
            insns: vec![msr],
        };
        let mut sink = FakeSink::default();
        scan(&src, &mut sink).unwrap();
        assert_eq!(
            sink.comments.get(&0x6000).unwrap(),
            "Set PSTATE.DAIF [D--F]"
        );
    }

    #[test]
    fn test_malformed_operand_is_counted_and_skipped() {
        let src = aarch32(vec![
            insn(
                0x7000,
                "MCR",
                vec![coproc_op1(15, 0), Operand::text("garbage"), imm(0)],
            ),
            insn(
                0x7004,
                "MCR",
                vec![
                    coproc_op1(15, 0),
                    Operand::text("R0,c1,c0"),
                    imm(0),
                ],
            ),
        ]);
        let mut sink = FakeSink::default();
        let summary = scan(&src, &mut sink).unwrap();
        assert_eq!(summary.matched, 2);
        assert_eq!(summary.malformed, 1);
        assert_eq!(summary.annotated, 1);
        // Both instructions are still marked.
        assert!(sink.marked.contains(&0x7000));
        assert!(sink.marked.contains(&0x7004));
    }

    #[test]
    fn test_scan_is_idempotent() {
        let src = aarch32(vec![insn(
            0x8000,
            "MCR",
            vec![
                coproc_op1(15, 0),
                Operand::text("R0,c1,c0"),
                imm(0),
            ],
        )]);
        let mut sink = FakeSink::default();
        scan(&src, &mut sink).unwrap();
        let first = sink.comments.clone();
        scan(&src, &mut sink).unwrap();
        assert_eq!(first, sink.comments);
    }
}
