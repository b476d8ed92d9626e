//! ARM System Instruction Annotator
//!
//! This library locates and explains system-level instructions in ARM
//! disassembly: coprocessor transfers (`MRC`/`MCR`/`MRRC`/`MCRR`),
//! AArch64 system-register accesses (`MRS`/`MSR`), status-register and
//! PSTATE writes, and the wider set of privileged instructions
//! (`CPS`, `SMC`, `HVC`, exception returns, and friends).
//!
//! # Features
//!
//! - **Register identification**: resolves coprocessor and system
//!   register signatures against catalogs covering p15/p14 (AArch32) and
//!   the AArch64 system-register space, debug and PMU registers included
//! - **Bitfield tracing**: follows the value written to (or read from)
//!   a control register through neighboring instructions and comments
//!   the individual bits touched
//! - **PSR/PSTATE decoding**: decodes `MSR` immediates into mode and
//!   mask-flag descriptions
//! - **Host-agnostic**: any disassembler front-end can participate by
//!   implementing two small traits; a plain-text listing host is built in
//!
//! # Quick Start
//!
//! ```rust
//! use sysreg_annotator::{annotate_listing, ArchMode};
//!
//! fn main() -> Result<(), sysreg_annotator::AnnotatorError> {
//!     let listing = "\
//! 00001000 E3A00001 MOV R0, #0x1
//! 00001004 EE010F10 MCR p15, 0, R0, c1, c0, 0
//! ";
//!     let annotated = annotate_listing(listing, ArchMode::AArch32)?;
//!     print!("{}", annotated.render());
//!     Ok(())
//! }
//! ```
//!
//! The `MCR` line gains the comment `[>] System Control Register
//! (SCTLR)` and the `MOV` feeding it is traced to `Set bits M`.

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::similar_names)]
#![allow(clippy::too_many_lines)]

pub mod catalog;
pub mod classify;
pub mod error;
pub mod extract;
pub mod host;
pub mod listing;
pub mod pstate;
pub mod resolve;
pub mod scan;
pub mod trace;
pub mod types;

pub use error::{AnnotatorError, Result};
pub use host::{AnnotationSink, Instruction, InstructionSource, Operand};
pub use listing::{AnnotationStore, Listing};
pub use scan::scan;
pub use types::{Access, Annotation, ArchMode, RegisterSignature, ScanSummary};

/// A listing that has been scanned and annotated.
#[derive(Debug)]
pub struct AnnotatedListing {
    listing: Listing,
    store: AnnotationStore,
    /// Counters from the scan that produced the annotations.
    pub summary: ScanSummary,
}

impl AnnotatedListing {
    /// The comments produced by the scan, in address order.
    pub fn annotations(&self) -> Vec<Annotation> {
        self.store.annotations()
    }

    /// Addresses of the system instructions found.
    pub fn marked(&self) -> Vec<u64> {
        self.store.marked().collect()
    }

    /// The listing text with comments merged back in.
    pub fn render(&self) -> String {
        self.listing.render(&self.store)
    }
}

/// Parse a plain-text listing, scan it, and return the annotated result.
///
/// This is the primary entry point for listing-based annotation. Hosts
/// with their own program representation should implement
/// [`InstructionSource`] and [`AnnotationSink`] and call [`scan`]
/// directly.
///
/// # Errors
///
/// Returns [`AnnotatorError::ListingParse`] when the listing text does
/// not follow the expected column format.
pub fn annotate_listing(text: &str, mode: ArchMode) -> Result<AnnotatedListing> {
    let listing = Listing::parse(text, mode)?;
    let mut store = AnnotationStore::new();
    let summary = scan::scan(&listing, &mut store)?;
    Ok(AnnotatedListing {
        listing,
        store,
        summary,
    })
}

/// Get version information for this library.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_annotate_listing_end_to_end() {
        let text = "\
00001000 E3A00001 MOV R0, #0x1
00001004 EE010F10 MCR p15, 0, R0, c1, c0, 0
";
        let annotated = annotate_listing(text, ArchMode::AArch32).unwrap();
        assert_eq!(annotated.summary.matched, 1);
        let notes = annotated.annotations();
        assert_eq!(notes.len(), 2);
        assert_eq!(notes[0].address, 0x1000);
        assert_eq!(notes[0].comment, "Set bits M");
        assert_eq!(notes[1].address, 0x1004);
        assert_eq!(notes[1].comment, "[>] System Control Register (SCTLR)");
        assert_eq!(annotated.marked(), vec![0x1004]);
    }

    #[test]
    fn test_annotate_listing_aarch64() {
        // MRS X0, SCTLR_EL1 exploded into its encoding fields; bit 19 of
        // the raw word selects op0 = 3.
        let text = "00001000 D5381000 MRS X0, #0, c1, c0, #0\n";
        let annotated = annotate_listing(text, ArchMode::AArch64).unwrap();
        let notes = annotated.annotations();
        assert_eq!(notes.len(), 1);
        assert_eq!(
            notes[0].comment,
            "[<] System Control Register (EL1) (SCTLR_EL1)"
        );
    }
}
