use std::env;
use std::fs;

use anyhow::Context;
use sysreg_annotator::{annotate_listing, ArchMode};

fn main() -> anyhow::Result<()> {
    let mut args = env::args().skip(1);
    let path = args.next().context("usage: annotate_boot <listing> [aarch64]")?;
    let mode = match args.next().as_deref() {
        Some("aarch64") => ArchMode::AArch64,
        _ => ArchMode::AArch32,
    };

    let text = fs::read_to_string(&path).with_context(|| format!("reading {path}"))?;
    let annotated = annotate_listing(&text, mode)?;
    print!("{}", annotated.render());

    let s = annotated.summary;
    eprintln!(
        "{} scanned, {} system instructions, {} annotated",
        s.scanned, s.matched, s.annotated
    );
    Ok(())
}
