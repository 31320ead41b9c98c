use std::io::{self, Write};

use crate::app::{
    DownloadAction, DownloadResult, IngestResult, InspectResult, ProgressEvent, ProgressSink,
};
use crate::optimize::OptimizeReport;
use crate::verify::VerifyReport;

/// Prints progress and summaries as plain lines on stdout.
pub struct ConsoleOutput;

impl ConsoleOutput {
    pub fn print_ingest(result: &IngestResult) -> io::Result<()> {
        let mut stdout = io::stdout().lock();
        if result.written {
            writeln!(
                stdout,
                "Saved {} characters ({} columns) to {}",
                result.records,
                result.columns.len(),
                result.store_path
            )?;
        } else {
            writeln!(stdout, "Store left unchanged at {}", result.store_path)?;
        }
        if !result.warnings.is_empty() {
            writeln!(stdout, "{} warnings, see log for details", result.warnings.len())?;
        }
        Ok(())
    }

    pub fn print_download(result: &DownloadResult) -> io::Result<()> {
        let mut stdout = io::stdout().lock();
        writeln!(stdout, "Download summary:")?;
        for action in [
            DownloadAction::Downloaded,
            DownloadAction::Present,
            DownloadAction::NoImage,
            DownloadAction::Failed,
            DownloadAction::SkippedInvalid,
        ] {
            writeln!(stdout, "  {action}: {}", result.count(action))?;
        }
        Ok(())
    }

    pub fn print_optimize(report: &OptimizeReport) -> io::Result<()> {
        let mut stdout = io::stdout().lock();
        writeln!(
            stdout,
            "Optimized {} images, {} failed",
            report.optimized.len(),
            report.failed.len()
        )
    }

    pub fn print_verify(report: &VerifyReport) -> io::Result<()> {
        let mut stdout = io::stdout().lock();
        if report.is_synced() {
            return writeln!(stdout, "All characters have corresponding images.");
        }
        writeln!(stdout, "Characters missing images:")?;
        for missing in &report.missing {
            let flag = if missing.anomaly {
                " [anomaly: missing id or name]"
            } else {
                ""
            };
            writeln!(stdout, "ID: {}, Name: {}{flag}", missing.id, missing.name)?;
        }
        writeln!(
            stdout,
            "{} of {} records missing images",
            report.missing.len(),
            report.checked
        )
    }

    pub fn print_inspect(result: &InspectResult) -> io::Result<()> {
        let mut stdout = io::stdout().lock();
        writeln!(stdout, "{} ({} records)", result.store_path, result.records)?;
        for column in &result.columns {
            writeln!(stdout, "  {column:<24} text")?;
        }
        for (category, count) in &result.categories {
            writeln!(stdout, "  {category}: {count}")?;
        }
        if result.unknown_categories > 0 {
            writeln!(stdout, "  unknown category: {}", result.unknown_categories)?;
        }
        if result.missing_ids > 0 {
            writeln!(stdout, "  records without id: {}", result.missing_ids)?;
        }
        if !result.duplicate_ids.is_empty() {
            writeln!(stdout, "  duplicate ids: {}", result.duplicate_ids.join(", "))?;
        }
        Ok(())
    }
}

impl ProgressSink for ConsoleOutput {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => println!("{} ({:.1}s)", event.message, elapsed.as_secs_f64()),
            None => println!("{}", event.message),
        }
    }
}
