use std::io::{self, Write};

use crossterm::style::Stylize;
use serde::Serialize;

use crate::app::{ListTodayResult, RenameResult, SyncResult, ValidateResult};
use crate::validate::{SubjectValidation, ValidationReport};

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Interactive,
    NonInteractive,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_validate(result: &ValidateResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_subject(result: &SubjectValidation) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_list_today(result: &ListTodayResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_rename(result: &RenameResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_sync(result: &SyncResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl crate::app::ProgressSink for JsonOutput {
    fn event(&self, _event: crate::app::ProgressEvent) {}
}

/// Human-readable summaries for interactive runs.
pub struct TextOutput;

impl TextOutput {
    pub fn print_validate(result: &ValidateResult) -> io::Result<()> {
        let mut out = io::stdout().lock();
        if result.reports.is_empty() {
            writeln!(out, "{}", "No sessions found.".yellow())?;
        }
        for report in &result.reports {
            write_report(&mut out, report)?;
        }
        Ok(())
    }

    pub fn print_subject(result: &SubjectValidation) -> io::Result<()> {
        let mut out = io::stdout().lock();
        for report in &result.reports {
            write_report(&mut out, report)?;
        }
        for name in &result.invalid_names {
            writeln!(
                out,
                "{} {name}: not a session folder of {}",
                "INVALID NAME".red().bold(),
                result.subject
            )?;
        }
        Ok(())
    }

    pub fn print_list_today(result: &ListTodayResult) -> io::Result<()> {
        let mut out = io::stdout().lock();
        if result.sessions.is_empty() {
            writeln!(out, "No sessions recorded on {}.", result.day)?;
            return Ok(());
        }
        for entry in &result.sessions {
            writeln!(
                out,
                "{:<12} {:<40} {:>10}",
                entry.subject,
                entry.session,
                entry.size
            )?;
        }
        Ok(())
    }

    pub fn print_rename(result: &RenameResult) -> io::Result<()> {
        let mut out = io::stdout().lock();
        if result.actions.is_empty() {
            writeln!(out, "{} looks good, no renaming needed.", result.session)?;
            return Ok(());
        }
        let verb = if result.dry_run { "would rename" } else { "renamed" };
        for action in &result.actions {
            writeln!(out, "{verb} {} -> {}", action.from, action.to)?;
        }
        Ok(())
    }

    pub fn print_sync(result: &SyncResult) -> io::Result<()> {
        let mut out = io::stdout().lock();
        let report = &result.report;
        writeln!(
            out,
            "{} -> {}",
            result.source.as_str().cyan(),
            result.destination.as_str().cyan()
        )?;
        for path in &report.copied {
            writeln!(out, "  {} {path}", "copied ".green())?;
        }
        for outcome in &report.skipped {
            writeln!(out, "  {} {} ({})", "skipped".yellow(), outcome.path, outcome.reason)?;
        }
        for outcome in &report.failed {
            writeln!(out, "  {} {} ({})", "failed ".red(), outcome.path, outcome.reason)?;
        }
        for warning in &report.warnings {
            writeln!(out, "  {} {warning}", "warning".yellow().bold())?;
        }
        writeln!(
            out,
            "{} copied, {} skipped, {} failed",
            report.copied.len(),
            report.skipped.len(),
            report.failed.len()
        )?;
        Ok(())
    }
}

impl crate::app::ProgressSink for TextOutput {
    fn event(&self, event: crate::app::ProgressEvent) {
        tracing::debug!("{}", event.message);
    }
}

fn write_report(out: &mut impl Write, report: &ValidationReport) -> io::Result<()> {
    let name = report.session.session_name();
    match report.first_violation() {
        None => writeln!(out, "{} {name}", "VALID  ".green().bold()),
        Some(_) => {
            writeln!(out, "{} {name}", "INVALID".red().bold())?;
            for violation in report.violations() {
                writeln!(out, "    {violation}")?;
            }
            Ok(())
        }
    }
}
