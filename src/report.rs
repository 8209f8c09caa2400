use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::domain::ArtifactHandle;
use crate::pipeline::{Outcome, ValidationResult};

pub const ALL_RELEASES: &str = "all releases";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupStats {
    pub group: String,
    pub release: String,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    /// Failures that ran every stage cleanly but found nothing.
    pub no_hits: usize,
    pub total_hits: usize,
    pub results: Vec<ValidationResult>,
    pub elapsed_seconds: f64,
}

impl GroupStats {
    pub fn failures(&self) -> impl Iterator<Item = &ValidationResult> {
        self.results.iter().filter(|result| !result.success)
    }

    pub fn successes(&self) -> impl Iterator<Item = &ValidationResult> {
        self.results.iter().filter(|result| result.success)
    }

    /// Hard failures, excluding clean zero-hit runs.
    pub fn hard_failures(&self) -> usize {
        self.failed - self.no_hits
    }
}

/// Fold the results of one group. Results are ordered by name so that the
/// output does not depend on worker completion order.
pub fn aggregate(group: &str, mut results: Vec<ValidationResult>) -> GroupStats {
    results.sort_by(|a, b| {
        a.handle
            .name
            .cmp(&b.handle.name)
            .then_with(|| a.handle.path.cmp(&b.handle.path))
    });
    let releases = results
        .iter()
        .map(|result| result.handle.release.as_str())
        .collect::<BTreeSet<_>>();
    let release = match releases.len() {
        1 => releases.into_iter().next().unwrap_or(ALL_RELEASES).to_string(),
        _ => ALL_RELEASES.to_string(),
    };
    let total = results.len();
    let passed = results.iter().filter(|result| result.success).count();
    let no_hits = results
        .iter()
        .filter(|result| result.outcome == Outcome::NoHits)
        .count();
    GroupStats {
        group: group.to_string(),
        release,
        total,
        passed,
        failed: total - passed,
        no_hits,
        total_hits: results.iter().map(|result| result.total_hits).sum(),
        elapsed_seconds: results.iter().map(|result| result.elapsed_seconds).sum(),
        results,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub groups: Vec<GroupStats>,
    pub overall_total: usize,
    pub overall_passed: usize,
    pub overall_failed: usize,
    pub overall_no_hits: usize,
    pub overall_total_hits: usize,
    /// Handles never started because the run deadline passed.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub not_started: Vec<ArtifactHandle>,
    /// Set when the report is empty or incomplete, explaining why.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notice: Option<String>,
    pub generated_at: String,
}

impl Report {
    pub fn all_passed(&self) -> bool {
        self.overall_total > 0 && self.overall_failed == 0 && self.not_started.is_empty()
    }

    pub fn with_notice(mut self, notice: impl Into<String>) -> Self {
        self.notice = Some(notice.into());
        self
    }

    pub fn with_not_started(mut self, handles: Vec<ArtifactHandle>) -> Self {
        self.not_started = handles;
        self
    }
}

pub fn report(mut groups: Vec<GroupStats>) -> Report {
    groups.sort_by(|a, b| a.group.cmp(&b.group));
    Report {
        overall_total: groups.iter().map(|stats| stats.total).sum(),
        overall_passed: groups.iter().map(|stats| stats.passed).sum(),
        overall_failed: groups.iter().map(|stats| stats.failed).sum(),
        overall_no_hits: groups.iter().map(|stats| stats.no_hits).sum(),
        overall_total_hits: groups.iter().map(|stats| stats.total_hits).sum(),
        groups,
        not_started: Vec::new(),
        notice: None,
        generated_at: chrono::Utc::now().to_rfc3339(),
    }
}
