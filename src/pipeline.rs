//! Three-stage validation of one database: file completeness, index
//! integrity, then functional search. A failing stage short-circuits the
//! rest, which are reported as skipped.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::blast::{SearchExecutor, SearchParams, ToolRunner};
use crate::domain::{ArtifactHandle, HitRecord, SearchProgram};
use crate::error::ValidatorError;
use crate::fs_util;
use crate::references::ReferenceLibrary;

pub const SKIPPED_MESSAGE: &str = "skipped due to earlier failure";
pub const DISABLED_MESSAGE: &str = "disabled";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageOutcome {
    pub passed: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub details: BTreeMap<String, serde_json::Value>,
}

impl StageOutcome {
    pub fn pass(message: impl Into<String>) -> Self {
        Self {
            passed: true,
            message: message.into(),
            details: BTreeMap::new(),
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            passed: false,
            message: message.into(),
            details: BTreeMap::new(),
        }
    }

    pub fn skipped() -> Self {
        Self::fail(SKIPPED_MESSAGE)
    }

    pub fn disabled() -> Self {
        Self::pass(DISABLED_MESSAGE)
    }

    pub fn is_skipped(&self) -> bool {
        !self.passed && self.message == SKIPPED_MESSAGE
    }

    pub fn with_details(mut self, details: BTreeMap<String, serde_json::Value>) -> Self {
        self.details = details;
        self
    }
}

impl Default for StageOutcome {
    fn default() -> Self {
        Self::skipped()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    FileCompleteness,
    IndexIntegrity,
    FunctionalSearch,
    Done,
}

/// How a validation ended. `NoHits` is a clean run that found nothing and is
/// kept apart from hard failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Passed,
    NoHits,
    FileCheckFailed,
    IntegrityFailed,
    SearchFailed,
}

impl Outcome {
    pub fn label(self) -> &'static str {
        match self {
            Outcome::Passed => "passed",
            Outcome::NoHits => "no hits",
            Outcome::FileCheckFailed => "file check failed",
            Outcome::IntegrityFailed => "integrity check failed",
            Outcome::SearchFailed => "search failed",
        }
    }
}

/// Per-query record of the functional stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRun {
    pub query_id: String,
    pub program: SearchProgram,
    pub hits: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub timed_out: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub handle: ArtifactHandle,
    pub file_check: StageOutcome,
    pub integrity_check: StageOutcome,
    pub functional_check: StageOutcome,
    pub hits: Vec<HitRecord>,
    pub total_hits: usize,
    pub query_runs: Vec<QueryRun>,
    pub success: bool,
    pub outcome: Outcome,
    pub error_message: Option<String>,
    pub elapsed_seconds: f64,
}

impl ValidationResult {
    /// Stage whose failure decided the result, if any.
    pub fn failed_stage(&self) -> Option<Stage> {
        match self.outcome {
            Outcome::FileCheckFailed => Some(Stage::FileCompleteness),
            Outcome::IntegrityFailed => Some(Stage::IndexIntegrity),
            Outcome::SearchFailed | Outcome::NoHits => Some(Stage::FunctionalSearch),
            Outcome::Passed => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOptions {
    pub enable_file_checks: bool,
    pub enable_integrity_checks: bool,
    pub integrity_timeout: Duration,
    pub search_timeout: Duration,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            enable_file_checks: true,
            enable_integrity_checks: true,
            integrity_timeout: Duration::from_secs(30),
            search_timeout: Duration::from_secs(60),
        }
    }
}

/// Working state while one handle moves through the stages.
struct Run<'a> {
    handle: &'a ArtifactHandle,
    stage: Stage,
    file_check: StageOutcome,
    integrity_check: StageOutcome,
    functional_check: StageOutcome,
    hits: Vec<HitRecord>,
    query_runs: Vec<QueryRun>,
}

pub struct ValidationPipeline<R: ToolRunner> {
    executor: SearchExecutor<R>,
    library: Arc<ReferenceLibrary>,
    options: PipelineOptions,
}

impl<R: ToolRunner> ValidationPipeline<R> {
    pub fn new(
        runner: R,
        library: Arc<ReferenceLibrary>,
        params: SearchParams,
        options: PipelineOptions,
    ) -> Self {
        Self {
            executor: SearchExecutor::new(runner, params),
            library,
            options,
        }
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    pub fn executor(&self) -> &SearchExecutor<R> {
        &self.executor
    }

    pub fn validate(&self, handle: &ArtifactHandle) -> ValidationResult {
        let start = Instant::now();
        let mut run = Run {
            handle,
            stage: Stage::FileCompleteness,
            file_check: StageOutcome::skipped(),
            integrity_check: StageOutcome::skipped(),
            functional_check: StageOutcome::skipped(),
            hits: Vec::new(),
            query_runs: Vec::new(),
        };

        while run.stage != Stage::Done {
            let stage = run.stage;
            let passed = match stage {
                Stage::FileCompleteness => {
                    run.file_check = self.check_files(handle);
                    run.file_check.passed
                }
                Stage::IndexIntegrity => {
                    run.integrity_check = self.check_integrity(handle);
                    run.integrity_check.passed
                }
                Stage::FunctionalSearch => {
                    run.functional_check =
                        self.check_search(&mut run.hits, &mut run.query_runs, handle);
                    run.functional_check.passed
                }
                Stage::Done => break,
            };
            debug!(group = %handle.group, name = %handle.name, ?stage, passed, "stage finished");
            run.stage = match (stage, passed) {
                (_, false) => Stage::Done,
                (Stage::FileCompleteness, true) => Stage::IndexIntegrity,
                (Stage::IndexIntegrity, true) => Stage::FunctionalSearch,
                (Stage::FunctionalSearch, true) | (Stage::Done, true) => Stage::Done,
            };
        }

        let result = run.finish(start.elapsed());
        if result.success {
            info!(
                group = %handle.group,
                name = %handle.name,
                hits = result.total_hits,
                elapsed_ms = (result.elapsed_seconds * 1000.0) as u64,
                "database validated"
            );
        } else {
            warn!(
                group = %handle.group,
                name = %handle.name,
                outcome = result.outcome.label(),
                error = result.error_message.as_deref().unwrap_or(""),
                "database failed validation"
            );
        }
        result
    }

    fn check_files(&self, handle: &ArtifactHandle) -> StageOutcome {
        if !self.options.enable_file_checks {
            return StageOutcome::disabled();
        }
        let mut missing = Vec::new();
        let mut unreadable = Vec::new();
        for path in handle.required_files() {
            match fs_util::check_readable_file(path.as_std_path()) {
                Ok(()) => {}
                Err(ValidatorError::MissingFiles(paths)) => missing.extend(paths),
                Err(ValidatorError::UnreadableFile { path, reason }) => {
                    unreadable.push(format!("{path} ({reason})"))
                }
                Err(err) => unreadable.push(format!("{path} ({err})")),
            }
        }
        if missing.is_empty() && unreadable.is_empty() {
            return StageOutcome::pass("all required files present");
        }

        let mut parts = Vec::new();
        if !missing.is_empty() {
            parts.push(ValidatorError::MissingFiles(missing.clone()).to_string());
        }
        if !unreadable.is_empty() {
            parts.push(format!("unreadable database files: {}", unreadable.join(", ")));
        }
        let mut details = BTreeMap::new();
        details.insert("missing".to_string(), serde_json::json!(missing));
        details.insert("unreadable".to_string(), serde_json::json!(unreadable));
        StageOutcome::fail(parts.join("; ")).with_details(details)
    }

    fn check_integrity(&self, handle: &ArtifactHandle) -> StageOutcome {
        if !self.options.enable_integrity_checks {
            return StageOutcome::disabled();
        }
        let info = match self
            .executor
            .inspect(handle, self.options.integrity_timeout)
        {
            Ok(info) => info,
            Err(err) => return StageOutcome::fail(err.to_string()),
        };
        let details = info.details();
        match info.sequences {
            None => StageOutcome::fail("could not read sequence count from blastdbcmd output")
                .with_details(details),
            Some(0) => StageOutcome::fail(ValidatorError::ZeroSequences.to_string())
                .with_details(details),
            Some(count) => {
                let message = match (info.total_residues, info.residue_unit.as_deref()) {
                    (Some(total), Some(unit)) => format!("{count} sequences; {total} total {unit}"),
                    _ => format!("{count} sequences"),
                };
                StageOutcome::pass(message).with_details(details)
            }
        }
    }

    fn check_search(
        &self,
        hits: &mut Vec<HitRecord>,
        query_runs: &mut Vec<QueryRun>,
        handle: &ArtifactHandle,
    ) -> StageOutcome {
        let queries = self
            .library
            .sequences_for(&handle.group, handle.molecule_type);
        let mut failures = 0usize;
        for query in &queries {
            let outcome = self
                .executor
                .run_search(query, handle, self.options.search_timeout);
            if !outcome.ok {
                failures += 1;
                debug!(
                    name = %handle.name,
                    query = %query.id,
                    error = outcome.raw_error.as_deref().unwrap_or(""),
                    "reference query failed"
                );
            }
            query_runs.push(QueryRun {
                query_id: query.id.clone(),
                program: outcome.program,
                hits: outcome.hits.len(),
                error: outcome.raw_error,
                timed_out: outcome.timed_out,
            });
            hits.extend(outcome.hits);
        }

        let mut details = BTreeMap::new();
        details.insert("queries".to_string(), serde_json::json!(queries.len()));
        details.insert("failedQueries".to_string(), serde_json::json!(failures));
        details.insert("hits".to_string(), serde_json::json!(hits.len()));
        let message = format!(
            "{} of {} reference queries ran; {} hits",
            queries.len() - failures,
            queries.len(),
            hits.len()
        );
        StageOutcome::pass(message).with_details(details)
    }
}

impl Run<'_> {
    fn finish(self, elapsed: Duration) -> ValidationResult {
        let total_hits = self.hits.len();
        let all_queries_failed = !self.query_runs.is_empty()
            && self.query_runs.iter().all(|run| run.error.is_some());

        let (outcome, error_message) = if !self.file_check.passed {
            (Outcome::FileCheckFailed, Some(self.file_check.message.clone()))
        } else if !self.integrity_check.passed {
            (Outcome::IntegrityFailed, Some(self.integrity_check.message.clone()))
        } else if !self.functional_check.passed {
            (Outcome::SearchFailed, Some(self.functional_check.message.clone()))
        } else if total_hits > 0 {
            (Outcome::Passed, None)
        } else if all_queries_failed {
            let first = self
                .query_runs
                .iter()
                .find_map(|run| run.error.clone())
                .unwrap_or_default();
            (
                Outcome::SearchFailed,
                Some(format!("all reference queries failed: {first}")),
            )
        } else {
            (
                Outcome::NoHits,
                Some("search ran cleanly but returned 0 hits".to_string()),
            )
        };

        ValidationResult {
            handle: self.handle.clone(),
            file_check: self.file_check,
            integrity_check: self.integrity_check,
            functional_check: self.functional_check,
            hits: self.hits,
            total_hits,
            query_runs: self.query_runs,
            success: outcome == Outcome::Passed,
            outcome,
            error_message,
            elapsed_seconds: elapsed.as_secs_f64(),
        }
    }
}
