pub mod types;

pub use types::{RunSummary, SkipReason, Stage};

use colored::Colorize;
use std::io::Write;
use std::path::Path;

/// Print the summary of a stage run to stdout.
pub fn print_summary(summary: &RunSummary, store: &Path) -> std::io::Result<()> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    write_summary(&mut out, summary, store, true)?;
    out.flush()
}

/// Render the summary. With `color` false the output is plain text.
///
/// ═══ analyze geneontology/go-ontology ═══
/// Processed: 12 | Written: 9 | Skipped: 3
///   • #100 no change operations
/// Store: geneontology_go-ontology/data_with_changes.yaml
pub fn write_summary<W: Write>(
    out: &mut W,
    summary: &RunSummary,
    store: &Path,
    color: bool,
) -> std::io::Result<()> {
    let heading = format!("═══ {} {} ═══", summary.stage, summary.repo);
    let written = summary.written.len().to_string();
    let skipped = summary.skipped.len().to_string();

    writeln!(out)?;
    if color {
        writeln!(out, "{}", heading.bold())?;
        writeln!(
            out,
            "Processed: {} | Written: {} | Skipped: {}",
            summary.processed,
            written.green().bold(),
            if summary.skipped.is_empty() {
                skipped.normal()
            } else {
                skipped.yellow().bold()
            }
        )?;
    } else {
        writeln!(out, "{heading}")?;
        writeln!(
            out,
            "Processed: {} | Written: {} | Skipped: {}",
            summary.processed, written, skipped
        )?;
    }

    for (number, reason) in &summary.skipped {
        writeln!(out, "  • #{number} {reason}")?;
    }
    writeln!(out, "Store: {}", store.display())?;
    Ok(())
}
