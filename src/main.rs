//! System Instruction Annotator CLI
//!
//! Command-line tool for annotating system instructions in ARM
//! disassembly listings.

use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::process::ExitCode;
use sysreg_annotator::{annotate_listing, AnnotatedListing, ArchMode};

/// ARM system instruction annotator.
///
/// Finds coprocessor and system-register accesses in a disassembly
/// listing, names the registers involved, and traces the control bits
/// being set, cleared, or tested around them.
#[derive(Parser, Debug)]
#[command(name = "sysreg-annotate")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Listing file(s) to annotate
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Target architecture
    #[arg(short, long, default_value = "aarch32")]
    arch: Arch,

    /// Output format
    #[arg(short, long, default_value = "listing")]
    format: OutputFormat,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Quiet mode (suppress the scan summary)
    #[arg(short, long)]
    quiet: bool,
}

/// Architecture options.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum Arch {
    /// 32-bit ARM (A32/T32 listings)
    Aarch32,
    /// 64-bit ARM (A64 listings)
    Aarch64,
}

impl From<Arch> for ArchMode {
    fn from(arch: Arch) -> Self {
        match arch {
            Arch::Aarch32 => ArchMode::AArch32,
            Arch::Aarch64 => ArchMode::AArch64,
        }
    }
}

/// Output format options.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// The listing with comments merged in
    Listing,
    /// Address/comment pairs only
    Human,
    /// JSON output
    Json,
}

fn main() -> ExitCode {
    let args = Args::parse();

    // Initialize logging if verbose
    if args.verbose {
        tracing_subscriber::fmt()
            .with_env_filter("sysreg_annotator=debug")
            .init();
    }

    let mut success = true;

    for path in &args.files {
        match annotate_file(path, &args) {
            Ok(()) => {}
            Err(e) => {
                if !args.quiet {
                    eprintln!("Error annotating {}: {}", path.display(), e);
                }
                success = false;
            }
        }
    }

    if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn annotate_file(path: &PathBuf, args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let text = std::fs::read_to_string(path)?;
    let annotated = annotate_listing(&text, args.arch.into())?;

    match args.format {
        OutputFormat::Listing => print_listing(&annotated, args),
        OutputFormat::Human => print_human(&annotated, path, args),
        OutputFormat::Json => print_json(&annotated, path)?,
    }

    Ok(())
}

fn print_listing(annotated: &AnnotatedListing, args: &Args) {
    print!("{}", annotated.render());
    if !args.quiet {
        let s = &annotated.summary;
        eprintln!(
            "{} instructions scanned, {} system instructions, {} annotated, {} malformed",
            s.scanned, s.matched, s.annotated, s.malformed
        );
    }
}

fn print_human(annotated: &AnnotatedListing, path: &PathBuf, args: &Args) {
    if !args.quiet {
        println!("File: {}", path.display());
    }
    for note in annotated.annotations() {
        println!("  {:#010x}  {}", note.address, note.comment);
    }
    if !args.quiet {
        let s = &annotated.summary;
        println!(
            "  {} scanned, {} matched, {} annotated, {} malformed",
            s.scanned, s.matched, s.annotated, s.malformed
        );
        println!();
    }
}

fn print_json(
    annotated: &AnnotatedListing,
    path: &PathBuf,
) -> Result<(), Box<dyn std::error::Error>> {
    #[derive(serde::Serialize)]
    struct JsonOutput {
        file: String,
        annotations: Vec<JsonAnnotation>,
        marked: Vec<String>,
        summary: sysreg_annotator::ScanSummary,
    }

    #[derive(serde::Serialize)]
    struct JsonAnnotation {
        address: String,
        comment: String,
    }

    let output = JsonOutput {
        file: path.display().to_string(),
        annotations: annotated
            .annotations()
            .into_iter()
            .map(|note| JsonAnnotation {
                address: format!("{:#x}", note.address),
                comment: note.comment,
            })
            .collect(),
        marked: annotated
            .marked()
            .into_iter()
            .map(|a| format!("{a:#x}"))
            .collect(),
        summary: annotated.summary,
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_parsing() {
        let args = Args::try_parse_from(["sysreg-annotate", "boot.lst"]).unwrap();
        assert_eq!(args.files.len(), 1);
        assert!(matches!(args.arch, Arch::Aarch32));
        assert!(!args.verbose);
    }

    #[test]
    fn test_arch_option() {
        let args =
            Args::try_parse_from(["sysreg-annotate", "-a", "aarch64", "kernel.lst"]).unwrap();
        assert!(matches!(args.arch, Arch::Aarch64));
    }

    #[test]
    fn test_format_options() {
        let args = Args::try_parse_from(["sysreg-annotate", "-f", "json", "boot.lst"]).unwrap();
        assert!(matches!(args.format, OutputFormat::Json));
    }

    #[test]
    fn test_annotate_file_roundtrip() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "00001000 EE010F10 MCR p15, 0, R0, c1, c0, 0").unwrap();
        let path = file.path().to_path_buf();
        let args = Args::try_parse_from([
            "sysreg-annotate",
            "-q",
            path.to_str().unwrap(),
        ])
        .unwrap();
        annotate_file(&path, &args).unwrap();
    }

    #[test]
    fn test_annotate_file_rejects_bad_listing() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "this is not a listing").unwrap();
        let path = file.path().to_path_buf();
        let args = Args::try_parse_from(["sysreg-annotate", path.to_str().unwrap()]).unwrap();
        assert!(annotate_file(&path, &args).is_err());
    }
}
