//! Plain-text listing host.
//!
//! [`Listing`] implements [`InstructionSource`] over a disassembly
//! listing in a simple fixed format, one line per word:
//!
//! ```text
//! 00001000 E3A00001 MOV R0, #0x1
//! 00001004 EE010F10 MCR p15, 0, R0, c1, c0, 0
//! 00001008 00001005 DCD 0x1005          ; literal pool
//! ```
//!
//! Columns are address (hex), raw encoding word (hex), mnemonic, and a
//! comma-separated operand list. `;` starts a comment. `DCD` lines are
//! data words, not instructions; `LDR Rd, =value` operands resolve to
//! the data word holding that value. Coprocessor transfers written in
//! the usual `p15, 0, Rt, CRn, CRm, op2` style are regrouped into the
//! operand shape the extractors expect, with the coprocessor number on
//! the first operand's specifier.
//!
//! [`AnnotationStore`] is the matching [`AnnotationSink`]; `render`
//! merges its comments and marks back into the listing text.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use byteorder::{ByteOrder, LittleEndian};

use crate::error::{AnnotatorError, Result};
use crate::host::{AnnotationSink, Instruction, InstructionSource, Operand};
use crate::types::{Annotation, ArchMode};

/// One source line, kept verbatim for rendering.
#[derive(Debug)]
struct Line {
    raw: String,
    /// Address of the instruction on this line, if it holds one.
    address: Option<u64>,
}

/// A parsed disassembly listing.
#[derive(Debug)]
pub struct Listing {
    mode: ArchMode,
    lines: Vec<Line>,
    insns: HashMap<u64, Instruction>,
    order: Vec<u64>,
    /// Every word in the image, instructions and data alike, stored as
    /// little-endian bytes.
    image: HashMap<u64, [u8; 4]>,
}

/// Split an operand list on top-level commas only; commas inside
/// `[...]`, `{...}` or `(...)` belong to a single operand.
fn split_operands(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (pos, ch) in text.char_indices() {
        match ch {
            '[' | '{' | '(' => depth += 1,
            ']' | '}' | ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                out.push(text[start..pos].trim());
                start = pos + 1;
            }
            _ => {}
        }
    }
    let last = text[start..].trim();
    if !last.is_empty() {
        out.push(last);
    }
    out
}

fn parse_number(text: &str) -> Option<u64> {
    let text = text.trim();
    if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16).ok()
    } else {
        text.parse().ok()
    }
}

/// Build an operand from one rendered token, decoding the values the
/// extractors and tracers consume.
fn parse_operand(token: &str) -> Operand {
    let value = if let Some(imm) = token.strip_prefix('#') {
        parse_number(imm)
    } else {
        // Bare numerics (coprocessor opcodes) also decode.
        parse_number(token)
    };
    Operand {
        text: token.to_string(),
        value,
        specifier: None,
    }
}

/// Regroup `p<cp>, op1, Rt, CRn, CRm, op2` (or the two-register MCRR
/// form) into extractor operand order. Returns `None` when the token
/// shape doesn't match; the raw tokens then pass through untouched and
/// extraction reports them as malformed.
fn regroup_coproc(tokens: &[&str]) -> Option<Vec<Operand>> {
    let cp: u8 = tokens.first()?.strip_prefix('p')?.parse().ok()?;
    match tokens.len() {
        // p15, op1, Rt, CRn, CRm, op2
        6 => Some(vec![
            Operand {
                text: tokens[1].to_string(),
                value: parse_number(tokens[1]),
                specifier: Some(cp),
            },
            Operand::text(format!("{},{},{}", tokens[2], tokens[3], tokens[4])),
            parse_operand(tokens[5]),
        ]),
        // p15, op1, Rt, Rt2, CRm
        5 => Some(vec![
            Operand {
                text: tokens[1].to_string(),
                value: parse_number(tokens[1]),
                specifier: Some(cp),
            },
            Operand::text(format!("{},{},{}", tokens[2], tokens[3], tokens[4])),
        ]),
        _ => None,
    }
}

impl Listing {
    /// Parse listing text for the given architecture mode.
    pub fn parse(text: &str, mode: ArchMode) -> Result<Self> {
        let mut listing = Listing {
            mode,
            lines: Vec::new(),
            insns: HashMap::new(),
            order: Vec::new(),
            image: HashMap::new(),
        };
        let mut literals: Vec<(u64, usize)> = Vec::new();

        for (number, raw) in text.lines().enumerate() {
            let number = number + 1;
            let code = raw.split(';').next().unwrap_or("").trim();
            if code.is_empty() {
                listing.lines.push(Line {
                    raw: raw.to_string(),
                    address: None,
                });
                continue;
            }

            let mut fields = code.split_whitespace();
            let (addr_text, enc_text) = match (fields.next(), fields.next()) {
                (Some(a), Some(e)) => (a, e),
                _ => {
                    return Err(AnnotatorError::ListingParse {
                        line: number,
                        message: "expected ADDRESS ENCODING MNEMONIC".to_string(),
                    })
                }
            };
            let address = u64::from_str_radix(addr_text, 16).map_err(|_| {
                AnnotatorError::ListingParse {
                    line: number,
                    message: format!("bad address {addr_text:?}"),
                }
            })?;
            let encoding = u32::from_str_radix(enc_text, 16).map_err(|_| {
                AnnotatorError::ListingParse {
                    line: number,
                    message: format!("bad encoding word {enc_text:?}"),
                }
            })?;

            let mut word = [0u8; 4];
            LittleEndian::write_u32(&mut word, encoding);
            listing.image.insert(address, word);

            let Some(mnemonic) = fields.next().map(str::to_uppercase) else {
                return Err(AnnotatorError::ListingParse {
                    line: number,
                    message: "missing mnemonic".to_string(),
                });
            };
            // Column alignment may use runs of spaces; normalizing to
            // single spaces keeps bracketed operands intact.
            let operand_text = fields.collect::<Vec<_>>().join(" ");
            let operand_text = operand_text.as_str();

            if mnemonic == "DCD" {
                // Data word; addressable through read_word but never
                // decoded as an instruction.
                listing.lines.push(Line {
                    raw: raw.to_string(),
                    address: None,
                });
                continue;
            }

            let tokens = split_operands(operand_text);
            let coproc = {
                let p4 = &mnemonic[..mnemonic.len().min(4)];
                let p3 = &mnemonic[..mnemonic.len().min(3)];
                p4 == "MRRC" || p4 == "MCRR" || p3 == "MRC" || p3 == "MCR"
            };
            let operands: Vec<Operand> =
                if coproc && tokens.first().is_some_and(|t| t.starts_with('p')) {
                    regroup_coproc(&tokens)
                        .unwrap_or_else(|| tokens.iter().map(|t| parse_operand(t)).collect())
                } else {
                    tokens.iter().map(|t| parse_operand(t)).collect()
                };

            for op in &operands {
                if op.is_literal() {
                    if let Some(value) = parse_number(&op.text[1..]) {
                        literals.push((value, listing.order.len()));
                    }
                }
            }

            listing.insns.insert(
                address,
                Instruction {
                    address,
                    mnemonic,
                    operands,
                    encoding,
                },
            );
            listing.order.push(address);
            listing.lines.push(Line {
                raw: raw.to_string(),
                address: Some(address),
            });
        }

        listing.resolve_literals(&literals);
        Ok(listing)
    }

    /// Point each `=value` operand at the image word holding that value,
    /// the way an assembler allocates literal-pool slots. Unresolvable
    /// literals keep a `None` value and simply end any trace that
    /// reaches them.
    fn resolve_literals(&mut self, literals: &[(u64, usize)]) {
        for &(value, order_idx) in literals {
            let pool = self
                .image
                .iter()
                .filter(|&(addr, word)| {
                    u64::from(LittleEndian::read_u32(word)) == value
                        && !self.insns.contains_key(addr)
                })
                .map(|(addr, _)| *addr)
                .min();
            let Some(pool) = pool else { continue };
            let address = self.order[order_idx];
            if let Some(insn) = self.insns.get_mut(&address) {
                for op in &mut insn.operands {
                    if op.is_literal() && op.value.is_none() {
                        op.value = Some(pool);
                    }
                }
            }
        }
    }

    /// Number of instructions in the listing.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// True when the listing holds no instructions.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Re-emit the listing with the store's comments appended and marked
    /// lines flagged with a `*` gutter.
    pub fn render(&self, store: &AnnotationStore) -> String {
        let mut out = String::new();
        for line in &self.lines {
            let marked = line.address.is_some_and(|a| store.marked.contains(&a));
            out.push(if marked { '*' } else { ' ' });
            out.push_str(&line.raw);
            if let Some(comment) = line.address.and_then(|a| store.comments.get(&a)) {
                out.push_str("  ; ");
                out.push_str(comment);
            }
            out.push('\n');
        }
        out
    }
}

impl InstructionSource for Listing {
    fn processor(&self) -> &str {
        "ARM"
    }

    fn pointer_bits(&self) -> u8 {
        match self.mode {
            ArchMode::AArch32 => 32,
            ArchMode::AArch64 => 64,
        }
    }

    fn addresses(&self) -> Box<dyn Iterator<Item = u64> + '_> {
        Box::new(self.order.iter().copied())
    }

    fn decode(&self, address: u64) -> Option<Instruction> {
        self.insns.get(&address).cloned()
    }

    fn read_word(&self, address: u64) -> Option<u32> {
        self.image.get(&address).map(|w| LittleEndian::read_u32(w))
    }
}

/// Collects comments and marks during a scan.
#[derive(Debug, Default)]
pub struct AnnotationStore {
    comments: BTreeMap<u64, String>,
    marked: BTreeSet<u64>,
}

impl AnnotationStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// All comments in address order.
    pub fn annotations(&self) -> Vec<Annotation> {
        self.comments
            .iter()
            .map(|(&address, comment)| Annotation {
                address,
                comment: comment.clone(),
            })
            .collect()
    }

    /// Addresses of marked instructions, in order.
    pub fn marked(&self) -> impl Iterator<Item = u64> + '_ {
        self.marked.iter().copied()
    }
}

impl AnnotationSink for AnnotationStore {
    fn set_comment(&mut self, address: u64, comment: &str) {
        self.comments.insert(address, comment.to_string());
    }

    fn mark(&mut self, address: u64) {
        self.marked.insert(address);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_split_operands_respects_brackets_and_braces() {
        assert_eq!(
            split_operands("SP!, {R4-R7, PC}^"),
            vec!["SP!", "{R4-R7, PC}^"]
        );
        assert_eq!(split_operands("R0, [R1, #4]"), vec!["R0", "[R1, #4]"]);
        assert_eq!(split_operands(""), Vec::<&str>::new());
    }

    #[test]
    fn test_parse_basic_instruction() {
        let listing = Listing::parse(
            "00001000 E3A00001 MOV R0, #0x1\n",
            ArchMode::AArch32,
        )
        .unwrap();
        let insn = listing.decode(0x1000).unwrap();
        assert_eq!(insn.mnemonic, "MOV");
        assert_eq!(insn.encoding, 0xE3A0_0001);
        assert_eq!(insn.operand_text(0), "R0");
        assert_eq!(insn.operand_value(1), Some(0x1));
        assert_eq!(listing.len(), 1);
    }

    #[test]
    fn test_coproc_regrouping() {
        let listing = Listing::parse(
            "00001000 EE010F10 MCR p15, 0, R0, c1, c0, 0\n",
            ArchMode::AArch32,
        )
        .unwrap();
        let insn = listing.decode(0x1000).unwrap();
        assert_eq!(insn.operands.len(), 3);
        assert_eq!(insn.operand(0).unwrap().specifier, Some(15));
        assert_eq!(insn.operand_value(0), Some(0));
        assert_eq!(insn.operand_text(1), "R0,c1,c0");
        assert_eq!(insn.operand_value(2), Some(0));
    }

    #[test]
    fn test_mcrr_regrouping_keeps_two_operands() {
        let listing = Listing::parse(
            "00001000 EC510F2E MRRC p15, 1, R0, R1, c14\n",
            ArchMode::AArch32,
        )
        .unwrap();
        let insn = listing.decode(0x1000).unwrap();
        assert_eq!(insn.operands.len(), 2);
        assert_eq!(insn.operand(0).unwrap().specifier, Some(15));
        assert_eq!(insn.operand_text(1), "R0,R1,c14");
    }

    #[test]
    fn test_literal_resolves_to_pool_word() {
        let text = "\
00001000 E59F0000 LDR R0, =0x1005
00001004 EE010F10 MCR p15, 0, R0, c1, c0, 0
00001008 00001005 DCD 0x1005
";
        let listing = Listing::parse(text, ArchMode::AArch32).unwrap();
        let insn = listing.decode(0x1000).unwrap();
        let op = insn.operand(1).unwrap();
        assert!(op.is_literal());
        assert_eq!(op.value, Some(0x1008));
        assert_eq!(listing.read_word(0x1008), Some(0x1005));
        // DCD lines never decode as instructions.
        assert!(listing.decode(0x1008).is_none());
    }

    #[test]
    fn test_unresolvable_literal_keeps_no_value() {
        let listing = Listing::parse(
            "00001000 E59F0000 LDR R0, =0xDEAD\n",
            ArchMode::AArch32,
        )
        .unwrap();
        let insn = listing.decode(0x1000).unwrap();
        assert_eq!(insn.operand(1).unwrap().value, None);
    }

    #[test]
    fn test_comment_and_blank_lines_skipped() {
        let text = "\
; setup
00001000 E3A00001 MOV R0, #0x1   ; trailing note

00001004 E3A01000 MOV R1, #0x0
";
        let listing = Listing::parse(text, ArchMode::AArch32).unwrap();
        assert_eq!(listing.len(), 2);
        assert_eq!(listing.addresses().collect::<Vec<_>>(), vec![0x1000, 0x1004]);
    }

    #[test]
    fn test_aligned_columns_parse() {
        let listing = Listing::parse(
            "00001000  E3A00001   MOV     R0, #0x1\n",
            ArchMode::AArch32,
        )
        .unwrap();
        let insn = listing.decode(0x1000).unwrap();
        assert_eq!(insn.mnemonic, "MOV");
        assert_eq!(insn.operand_value(1), Some(0x1));
    }

    #[test]
    fn test_parse_error_reports_line() {
        let err = Listing::parse("not a listing\n", ArchMode::AArch32).unwrap_err();
        assert!(matches!(
            err,
            AnnotatorError::ListingParse { line: 1, .. }
        ));
    }

    #[test]
    fn test_render_appends_comments_and_marks() {
        let listing = Listing::parse(
            "00001000 E3A00001 MOV R0, #0x1\n00001004 EE010F10 MCR p15, 0, R0, c1, c0, 0\n",
            ArchMode::AArch32,
        )
        .unwrap();
        let mut store = AnnotationStore::new();
        store.set_comment(0x1004, "[>] System Control Register (SCTLR)");
        store.mark(0x1004);
        let rendered = listing.render(&store);
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines[0], " 00001000 E3A00001 MOV R0, #0x1");
        assert_eq!(
            lines[1],
            "*00001004 EE010F10 MCR p15, 0, R0, c1, c0, 0  ; [>] System Control Register (SCTLR)"
        );
    }

    #[test]
    fn test_annotation_store_ordering() {
        let mut store = AnnotationStore::new();
        store.set_comment(0x20, "b");
        store.set_comment(0x10, "a");
        let notes = store.annotations();
        assert_eq!(notes[0].address, 0x10);
        assert_eq!(notes[1].address, 0x20);
    }
}
