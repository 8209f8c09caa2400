use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use camino::Utf8Path;
use rayon::prelude::*;
use tracing::{info, warn};

use crate::blast::ToolRunner;
use crate::discovery::{self, DiscoveredHandles, DiscoveryFilter};
use crate::domain::ArtifactHandle;
use crate::error::ValidatorError;
use crate::pipeline::{ValidationPipeline, ValidationResult};
use crate::report::{self, Report};

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink: Send + Sync {
    fn event(&self, event: ProgressEvent);
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub workers: usize,
    pub filter: DiscoveryFilter,
    /// No new database is started once this much time has passed.
    pub deadline: Option<Duration>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            workers: crate::config::DEFAULT_WORKERS,
            filter: DiscoveryFilter::default(),
            deadline: None,
        }
    }
}

#[derive(Debug)]
pub struct RunOutcome {
    pub report: Report,
    pub discovery_error: Option<ValidatorError>,
}

impl RunOutcome {
    pub fn no_databases(&self) -> bool {
        self.report.overall_total == 0 && self.report.not_started.is_empty()
    }
}

enum HandleRun {
    Finished(ValidationResult),
    NotStarted(ArtifactHandle),
}

pub struct Validator<R: ToolRunner> {
    pipeline: ValidationPipeline<R>,
}

impl<R: ToolRunner> Validator<R> {
    pub fn new(pipeline: ValidationPipeline<R>) -> Self {
        Self { pipeline }
    }

    pub fn pipeline(&self) -> &ValidationPipeline<R> {
        &self.pipeline
    }

    /// Discover, validate and aggregate everything under `root`. Partial
    /// failures never abort the run; a missing root yields an empty report
    /// together with the discovery error.
    pub fn run(&self, root: &Utf8Path, options: &RunOptions, sink: &dyn ProgressSink) -> RunOutcome {
        let start = Instant::now();
        sink.event(ProgressEvent {
            message: format!("phase=Discover; scanning {root}"),
            elapsed: None,
        });

        let discovered = match discovery::discover_with(root, &options.filter) {
            Ok(discovered) => discovered,
            Err(err) => {
                warn!(root = %root, error = %err, "discovery failed");
                let report = report::report(Vec::new())
                    .with_notice(format!("no databases found: {err}"));
                return RunOutcome {
                    report,
                    discovery_error: Some(err),
                };
            }
        };

        let handle_count = discovered.values().map(Vec::len).sum::<usize>();
        info!(root = %root, groups = discovered.len(), databases = handle_count, "discovery finished");
        sink.event(ProgressEvent {
            message: format!(
                "phase=Discover; {handle_count} databases in {} groups",
                discovered.len()
            ),
            elapsed: Some(start.elapsed()),
        });

        let deadline = options.deadline.map(|limit| start + limit);
        let report = self.validate_discovered(discovered, options.workers, deadline, sink);
        let report = if report.overall_total == 0 && report.not_started.is_empty() {
            let scope = if options.filter.groups.is_empty() {
                String::new()
            } else {
                format!(" for group(s) {}", options.filter.groups.join(", "))
            };
            report.with_notice(format!("no databases found under {root}{scope}"))
        } else if !report.not_started.is_empty() {
            let count = report.not_started.len();
            report.with_notice(format!(
                "run deadline reached; {count} databases were not started"
            ))
        } else {
            report
        };

        sink.event(ProgressEvent {
            message: format!(
                "phase=Report; {} passed, {} failed",
                report.overall_passed, report.overall_failed
            ),
            elapsed: Some(start.elapsed()),
        });
        RunOutcome {
            report,
            discovery_error: None,
        }
    }

    /// Validate already-discovered handles and build the report. Groups with
    /// no handles still appear with zero counts.
    pub fn validate_discovered(
        &self,
        discovered: DiscoveredHandles,
        workers: usize,
        deadline: Option<Instant>,
        sink: &dyn ProgressSink,
    ) -> Report {
        let groups = discovered.keys().cloned().collect::<Vec<_>>();
        let handles = discovered.into_values().flatten().collect::<Vec<_>>();
        let (results, not_started) = self.validate_all(handles, workers, deadline, sink);

        let mut by_group = groups
            .into_iter()
            .map(|group| (group, Vec::new()))
            .collect::<BTreeMap<_, _>>();
        for result in results {
            by_group
                .entry(result.handle.group.clone())
                .or_default()
                .push(result);
        }
        let stats = by_group
            .into_iter()
            .map(|(group, results)| report::aggregate(&group, results))
            .collect();
        report::report(stats).with_not_started(not_started)
    }

    /// Run the pipeline over `handles` on a pool of `workers` threads. Each
    /// worker takes one handle through all stages before picking the next.
    pub fn validate_all(
        &self,
        handles: Vec<ArtifactHandle>,
        workers: usize,
        deadline: Option<Instant>,
        sink: &dyn ProgressSink,
    ) -> (Vec<ValidationResult>, Vec<ArtifactHandle>) {
        let total = handles.len();
        let done = AtomicUsize::new(0);
        let process = |handle: &ArtifactHandle| -> HandleRun {
            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                return HandleRun::NotStarted(handle.clone());
            }
            let result = self.pipeline.validate(handle);
            let finished = done.fetch_add(1, Ordering::SeqCst) + 1;
            sink.event(ProgressEvent {
                message: format!(
                    "phase=Validate; [{finished}/{total}] {}/{} {}",
                    handle.group,
                    handle.name,
                    result.outcome.label()
                ),
                elapsed: Some(Duration::from_secs_f64(result.elapsed_seconds)),
            });
            HandleRun::Finished(result)
        };

        let runs = match rayon::ThreadPoolBuilder::new()
            .num_threads(workers.max(1))
            .thread_name(|index| format!("kira-dbv-worker-{index}"))
            .build()
        {
            Ok(pool) => pool.install(|| {
                handles
                    .par_iter()
                    .with_max_len(1)
                    .map(process)
                    .collect::<Vec<_>>()
            }),
            Err(err) => {
                warn!(error = %err, "worker pool unavailable; validating sequentially");
                handles.iter().map(process).collect()
            }
        };

        let mut results = Vec::with_capacity(total);
        let mut not_started = Vec::new();
        for run in runs {
            match run {
                HandleRun::Finished(result) => results.push(result),
                HandleRun::NotStarted(handle) => not_started.push(handle),
            }
        }
        if !not_started.is_empty() {
            warn!(count = not_started.len(), "run deadline reached before all databases started");
        }
        (results, not_started)
    }
}
