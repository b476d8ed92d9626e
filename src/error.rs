//! Error types for the system-register annotator.
//!
//! Per-instruction failures are local by design: only architecture
//! detection can abort a scan. Everything else is caught by the driver,
//! logged, and skipped.

use thiserror::Error;

/// Primary error type for the annotator.
#[derive(Debug, Error)]
pub enum AnnotatorError {
    /// IO error during file operations.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The host reports a processor family this annotator cannot handle.
    /// Fatal: no partial scan is performed.
    #[error("unsupported architecture {name:?}: only ARM and AArch64 binaries can be scanned")]
    UnsupportedArchitecture {
        /// Processor name as reported by the host.
        name: String,
    },

    /// Operand text did not have the shape the instruction class requires.
    /// Local: the driver logs this and continues with the next instruction.
    #[error("malformed operand {operand:?} in {mnemonic} at {address:#010x}")]
    MalformedOperand {
        /// Address of the offending instruction.
        address: u64,
        /// Its mnemonic.
        mnemonic: String,
        /// The operand text that failed to parse.
        operand: String,
    },

    /// A listing line could not be parsed into an instruction.
    #[error("listing parse error at line {line}: {message}")]
    ListingParse {
        /// 1-based line number in the listing text.
        line: usize,
        /// What went wrong.
        message: String,
    },
}

/// Result type alias for annotator operations.
pub type Result<T> = std::result::Result<T, AnnotatorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_operand_display() {
        let err = AnnotatorError::MalformedOperand {
            address: 0x1000,
            mnemonic: "MRC".into(),
            operand: "R0,c1".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("0x00001000"));
        assert!(msg.contains("MRC"));
    }

    #[test]
    fn test_unsupported_architecture_display() {
        let err = AnnotatorError::UnsupportedArchitecture {
            name: "metapc".into(),
        };
        assert!(err.to_string().contains("metapc"));
    }
}
