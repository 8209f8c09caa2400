use std::fmt::Write as _;
use std::fs;
use std::io::{self, Write};
use std::path::Path;

use serde::Serialize;

use crate::app::{ProgressEvent, ProgressSink};
use crate::error::ValidatorError;
use crate::pipeline::{Outcome, ValidationResult};
use crate::report::{GroupStats, Report};

pub struct JsonOutput;

impl JsonOutput {
    pub fn render(report: &Report) -> Result<String, ValidatorError> {
        serde_json::to_string_pretty(report).map_err(|err| ValidatorError::Report(err.to_string()))
    }

    pub fn print_report(report: &Report) -> io::Result<()> {
        Self::print_json(report)
    }

    pub fn write_report(report: &Report, path: &Path) -> Result<(), ValidatorError> {
        let json = Self::render(report)?;
        write_atomic(path, json.as_bytes())
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

/// Human-readable report. Lists of failures and successes are capped at
/// `limit` entries per group, with the remainder summarised.
pub struct MarkdownOutput;

impl MarkdownOutput {
    pub fn render(report: &Report, limit: usize) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "# Database validation report");
        let _ = writeln!(out);
        let _ = writeln!(out, "Generated: {}", report.generated_at);
        let _ = writeln!(out);
        if let Some(notice) = &report.notice {
            let _ = writeln!(out, "> {notice}");
            let _ = writeln!(out);
        }

        let _ = writeln!(out, "## Summary");
        let _ = writeln!(out);
        let _ = writeln!(out, "| Metric | Value |");
        let _ = writeln!(out, "| --- | --- |");
        let _ = writeln!(out, "| Databases | {} |", report.overall_total);
        let _ = writeln!(out, "| Passed | {} |", report.overall_passed);
        let _ = writeln!(out, "| Failed | {} |", report.overall_failed);
        let _ = writeln!(out, "| Ran cleanly, 0 hits | {} |", report.overall_no_hits);
        let _ = writeln!(out, "| Total hits | {} |", report.overall_total_hits);
        if !report.not_started.is_empty() {
            let _ = writeln!(out, "| Not started (deadline) | {} |", report.not_started.len());
        }
        let _ = writeln!(out, "| Success rate | {} |", success_rate(report));
        let _ = writeln!(out);

        if !report.groups.is_empty() {
            let _ = writeln!(out, "| Group | Release | Total | Passed | Failed | 0 hits | Hits |");
            let _ = writeln!(out, "| --- | --- | --- | --- | --- | --- | --- |");
            for stats in &report.groups {
                let _ = writeln!(
                    out,
                    "| {} | {} | {} | {} | {} | {} | {} |",
                    stats.group,
                    stats.release,
                    stats.total,
                    stats.passed,
                    stats.failed,
                    stats.no_hits,
                    stats.total_hits
                );
            }
            let _ = writeln!(out);
        }

        for stats in &report.groups {
            render_group(&mut out, stats, limit);
        }

        if !report.not_started.is_empty() {
            let _ = writeln!(out, "## Not started");
            let _ = writeln!(out);
            write_capped(
                &mut out,
                report.not_started.iter().map(|handle| {
                    format!("- `{}` ({}/{})", handle.name, handle.group, handle.release)
                }),
                report.not_started.len(),
                limit,
            );
            let _ = writeln!(out);
        }
        out
    }

    pub fn write_report(report: &Report, limit: usize, path: &Path) -> Result<(), ValidatorError> {
        write_atomic(path, Self::render(report, limit).as_bytes())
    }
}

fn render_group(out: &mut String, stats: &GroupStats, limit: usize) {
    let _ = writeln!(out, "## {} ({})", stats.group, stats.release);
    let _ = writeln!(out);
    if stats.total == 0 {
        let _ = writeln!(out, "No databases found for this group.");
        let _ = writeln!(out);
        return;
    }

    let failures = stats.failures().collect::<Vec<_>>();
    if !failures.is_empty() {
        let _ = writeln!(out, "### Failed ({})", failures.len());
        let _ = writeln!(out);
        write_capped(
            out,
            failures.iter().map(|result| failure_line(result)),
            failures.len(),
            limit,
        );
        let _ = writeln!(out);
    }

    let successes = stats.successes().collect::<Vec<_>>();
    if !successes.is_empty() {
        let _ = writeln!(out, "### Passed ({})", successes.len());
        let _ = writeln!(out);
        write_capped(
            out,
            successes.iter().map(|result| {
                format!(
                    "- `{}` [{}] {} hits",
                    result.handle.name, result.handle.molecule_type, result.total_hits
                )
            }),
            successes.len(),
            limit,
        );
        let _ = writeln!(out);
    }
}

fn failure_line(result: &ValidationResult) -> String {
    let stage = match result.outcome {
        Outcome::FileCheckFailed => "files",
        Outcome::IntegrityFailed => "integrity",
        Outcome::SearchFailed => "search",
        Outcome::NoHits => "search (0 hits)",
        Outcome::Passed => "none",
    };
    format!(
        "- `{}` [{}] **{}**: {}",
        result.handle.name,
        result.handle.molecule_type,
        stage,
        result.error_message.as_deref().unwrap_or("unknown failure")
    )
}

fn write_capped(
    out: &mut String,
    lines: impl Iterator<Item = String>,
    total: usize,
    limit: usize,
) {
    for line in lines.take(limit) {
        let _ = writeln!(out, "{line}");
    }
    if total > limit {
        let _ = writeln!(out, "- ... and {} more", total - limit);
    }
}

fn success_rate(report: &Report) -> String {
    if report.overall_total == 0 {
        return "n/a".to_string();
    }
    let rate = report.overall_passed as f64 * 100.0 / report.overall_total as f64;
    format!("{rate:.1}%")
}

fn write_atomic(path: &Path, content: &[u8]) -> Result<(), ValidatorError> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|err| ValidatorError::Filesystem(err.to_string()))?;
    }
    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, content).map_err(|err| ValidatorError::Filesystem(err.to_string()))?;
    fs::rename(&tmp_path, path).map_err(|err| ValidatorError::Filesystem(err.to_string()))?;
    Ok(())
}
