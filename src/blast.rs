use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::OnceLock;
use std::thread;
use std::time::{Duration, Instant};

use camino::Utf8Path;
use regex::Regex;
use serde::Serialize;
use tracing::debug;

use crate::domain::{ArtifactHandle, HitRecord, MoleculeType, SearchProgram, SequenceRecord};
use crate::error::ValidatorError;
use crate::fs_util::truncate_text;

pub const INSPECT_TOOL: &str = "blastdbcmd";

/// Tabular columns requested from every search program.
pub const OUTFMT: &str = "6 qseqid sseqid pident length evalue bitscore";

/// Upper bound on tool error text carried into reports.
pub const MAX_ERROR_CHARS: usize = 500;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Most useful error text: stderr, else stdout, else the exit code.
    pub fn error_text(&self) -> String {
        let text = if !self.stderr.trim().is_empty() {
            self.stderr.as_str()
        } else {
            self.stdout.as_str()
        };
        if text.trim().is_empty() {
            match self.exit_code {
                Some(code) => format!("exited with status {code}"),
                None => "terminated by signal".to_string(),
            }
        } else {
            truncate_text(text, MAX_ERROR_CHARS)
        }
    }
}

/// Process boundary for the external BLAST+ programs.
pub trait ToolRunner: Send + Sync {
    /// Run `program` to completion or until `timeout` elapses. A timeout must
    /// surface as [`ValidatorError::ToolTimeout`] after the child is killed.
    fn run(
        &self,
        program: &str,
        args: &[String],
        timeout: Duration,
    ) -> Result<ToolOutput, ValidatorError>;
}

#[derive(Debug, Clone, Default)]
pub struct SystemToolRunner {
    bin_dir: Option<PathBuf>,
}

impl SystemToolRunner {
    pub fn new(bin_dir: Option<PathBuf>) -> Self {
        Self { bin_dir }
    }

    pub fn resolve(&self, program: &str) -> Option<PathBuf> {
        match &self.bin_dir {
            Some(dir) => {
                let plain = dir.join(program);
                if plain.exists() {
                    return Some(plain);
                }
                let exe = dir.join(format!("{program}.exe"));
                exe.exists().then_some(exe)
            }
            None => find_in_path(program),
        }
    }

    /// Names of the required BLAST+ programs that cannot be located.
    pub fn missing_tools(&self, programs: &[&str]) -> Vec<String> {
        programs
            .iter()
            .filter(|program| self.resolve(program).is_none())
            .map(|program| program.to_string())
            .collect()
    }
}

impl ToolRunner for SystemToolRunner {
    fn run(
        &self,
        program: &str,
        args: &[String],
        timeout: Duration,
    ) -> Result<ToolOutput, ValidatorError> {
        let binary = self
            .resolve(program)
            .unwrap_or_else(|| PathBuf::from(program));
        let mut child = Command::new(&binary)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| ValidatorError::ToolSpawn {
                program: program.to_string(),
                reason: err.to_string(),
            })?;

        // Drain pipes on their own threads so a chatty child cannot block on a
        // full pipe while we poll for exit.
        let stdout = child.stdout.take().map(spawn_reader);
        let stderr = child.stderr.take().map(spawn_reader);

        let start = Instant::now();
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {}
                Err(err) => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(ValidatorError::ToolSpawn {
                        program: program.to_string(),
                        reason: err.to_string(),
                    });
                }
            }
            if start.elapsed() >= timeout {
                let _ = child.kill();
                let _ = child.wait();
                debug!(program, elapsed_ms = start.elapsed().as_millis() as u64, "tool timed out");
                return Err(ValidatorError::ToolTimeout {
                    program: program.to_string(),
                    secs: timeout.as_secs(),
                });
            }
            thread::sleep(POLL_INTERVAL);
        };

        Ok(ToolOutput {
            exit_code: status.code(),
            stdout: stdout.map(join_reader).unwrap_or_default(),
            stderr: stderr.map(join_reader).unwrap_or_default(),
        })
    }
}

fn spawn_reader<R: Read + Send + 'static>(mut pipe: R) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buffer = Vec::new();
        let _ = pipe.read_to_end(&mut buffer);
        String::from_utf8_lossy(&buffer).into_owned()
    })
}

fn join_reader(handle: thread::JoinHandle<String>) -> String {
    handle.join().unwrap_or_default()
}

fn find_in_path(name: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    for path in std::env::split_paths(&path_var) {
        let exe = path.join(format!("{name}.exe"));
        if exe.exists() {
            return Some(exe);
        }
        let plain = path.join(name);
        if plain.exists() {
            return Some(plain);
        }
    }
    None
}

/// Deliberately permissive settings: the functional check looks for any
/// signal at all, not for biologically meaningful alignments.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchParams {
    pub evalue: f64,
    pub nucleotide_word_size: u32,
    pub protein_word_size: u32,
    pub max_target_seqs: u32,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            evalue: 10.0,
            nucleotide_word_size: 7,
            protein_word_size: 2,
            max_target_seqs: 50,
        }
    }
}

impl SearchParams {
    pub fn args(
        &self,
        program: SearchProgram,
        query: &Path,
        database: &Utf8Path,
    ) -> Vec<String> {
        let word_size = if program.seeds_on_nucleotides() {
            self.nucleotide_word_size
        } else {
            self.protein_word_size
        };
        let mut args = vec![
            "-query".to_string(),
            query.to_string_lossy().to_string(),
            "-db".to_string(),
            database.to_string(),
            "-outfmt".to_string(),
            OUTFMT.to_string(),
            "-evalue".to_string(),
            self.evalue.to_string(),
            "-word_size".to_string(),
            word_size.to_string(),
            "-max_target_seqs".to_string(),
            self.max_target_seqs.to_string(),
        ];
        if program == SearchProgram::Blastn {
            // Megablast would ignore the small word size.
            args.push("-task".to_string());
            args.push("blastn".to_string());
        }
        args
    }
}

/// Metadata parsed from `blastdbcmd -info`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseInfo {
    pub title: Option<String>,
    pub sequences: Option<u64>,
    pub total_residues: Option<u64>,
    pub residue_unit: Option<String>,
    pub date: Option<String>,
    pub longest_sequence: Option<u64>,
    pub format_version: Option<String>,
}

impl DatabaseInfo {
    pub fn parse(text: &str) -> Self {
        static COUNTS: OnceLock<Regex> = OnceLock::new();
        static LONGEST: OnceLock<Regex> = OnceLock::new();
        let counts = COUNTS.get_or_init(|| {
            Regex::new(r"^([\d,]+)\s+sequences?(?:;\s*([\d,]+)\s+total\s+(bases|residues))?")
                .expect("valid regex")
        });
        let longest = LONGEST.get_or_init(|| {
            Regex::new(r"Longest sequence:\s*([\d,]+)").expect("valid regex")
        });

        let mut info = DatabaseInfo::default();
        for line in text.lines() {
            let line = line.trim();
            if let Some(value) = line.strip_prefix("Database:") {
                // Titles are free text and may mention counts of their own.
                info.title = Some(value.trim().to_string());
                continue;
            }
            if let Some(value) = line.strip_prefix("BLASTDB Version:") {
                info.format_version = Some(value.trim().to_string());
            }
            if let Some(rest) = line.strip_prefix("Date:") {
                let date = rest.split('\t').next().unwrap_or(rest).trim();
                let date = date.split("Longest").next().unwrap_or(date).trim();
                if !date.is_empty() {
                    info.date = Some(date.to_string());
                }
            }
            if info.sequences.is_none() {
                if let Some(caps) = counts.captures(line) {
                    info.sequences = caps.get(1).and_then(|m| parse_count(m.as_str()));
                    info.total_residues = caps.get(2).and_then(|m| parse_count(m.as_str()));
                    info.residue_unit = caps.get(3).map(|m| m.as_str().to_string());
                }
            }
            if let Some(caps) = longest.captures(line) {
                info.longest_sequence = caps.get(1).and_then(|m| parse_count(m.as_str()));
            }
        }
        info
    }

    pub fn details(&self) -> BTreeMap<String, serde_json::Value> {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(map)) => map
                .into_iter()
                .filter(|(_, value)| !value.is_null())
                .collect(),
            _ => BTreeMap::new(),
        }
    }
}

fn parse_count(text: &str) -> Option<u64> {
    text.replace(',', "").parse().ok()
}

/// Result of a single reference query against one database.
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub ok: bool,
    pub program: SearchProgram,
    pub hits: Vec<HitRecord>,
    pub raw_error: Option<String>,
    pub timed_out: bool,
    pub skipped_lines: usize,
}

/// Runs `blastdbcmd` and the search programs through a [`ToolRunner`].
#[derive(Debug, Clone)]
pub struct SearchExecutor<R: ToolRunner> {
    runner: R,
    params: SearchParams,
}

impl<R: ToolRunner> SearchExecutor<R> {
    pub fn new(runner: R, params: SearchParams) -> Self {
        Self { runner, params }
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    pub fn params(&self) -> &SearchParams {
        &self.params
    }

    /// `blastdbcmd -db <path> -info`, returning the parsed metadata. Non-zero
    /// exit becomes [`ValidatorError::IndexTool`]; timeouts pass through.
    pub fn inspect(
        &self,
        handle: &ArtifactHandle,
        timeout: Duration,
    ) -> Result<DatabaseInfo, ValidatorError> {
        let args = vec![
            "-db".to_string(),
            handle.path.to_string(),
            "-dbtype".to_string(),
            dbtype(handle.molecule_type).to_string(),
            "-info".to_string(),
        ];
        let output = self.runner.run(INSPECT_TOOL, &args, timeout)?;
        if !output.success() {
            return Err(ValidatorError::IndexTool(output.error_text()));
        }
        Ok(DatabaseInfo::parse(&output.stdout))
    }

    /// Search one reference query against one database. The query is written
    /// to a uniquely named temporary file that is removed when this returns.
    pub fn run_search(
        &self,
        query: &SequenceRecord,
        handle: &ArtifactHandle,
        timeout: Duration,
    ) -> SearchOutcome {
        let program = SearchProgram::select(handle.molecule_type, query.molecule_type);
        let failed = |message: String, timed_out: bool| SearchOutcome {
            ok: false,
            program,
            hits: Vec::new(),
            raw_error: Some(message),
            timed_out,
            skipped_lines: 0,
        };

        let mut query_file = match tempfile::Builder::new()
            .prefix("kira-dbv-query")
            .suffix(".fasta")
            .tempfile()
        {
            Ok(file) => file,
            Err(err) => return failed(format!("create query file: {err}"), false),
        };
        if let Err(err) = query_file
            .write_all(query.content.as_bytes())
            .and_then(|_| query_file.flush())
        {
            return failed(format!("write query file: {err}"), false);
        }

        let args = self.params.args(program, query_file.path(), &handle.path);
        let result = self.runner.run(program.binary(), &args, timeout);
        drop(query_file);

        match result {
            Ok(output) if output.success() => {
                let (hits, skipped_lines) = parse_hits(&output.stdout);
                SearchOutcome {
                    ok: true,
                    program,
                    hits,
                    raw_error: None,
                    timed_out: false,
                    skipped_lines,
                }
            }
            Ok(output) => failed(output.error_text(), false),
            Err(err @ ValidatorError::ToolTimeout { .. }) => failed(err.to_string(), true),
            Err(err) => failed(err.to_string(), false),
        }
    }
}

fn dbtype(molecule_type: MoleculeType) -> &'static str {
    match molecule_type {
        MoleculeType::Nucleotide => "nucl",
        MoleculeType::Protein => "prot",
    }
}

/// Parse tabular search output. Blank, comment and warning lines are ignored;
/// malformed lines are counted and skipped.
pub fn parse_hits(stdout: &str) -> (Vec<HitRecord>, usize) {
    let mut hits = Vec::new();
    let mut skipped = 0;
    for line in stdout.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') || is_warning(trimmed) {
            continue;
        }
        match line.parse::<HitRecord>() {
            Ok(hit) => hits.push(hit),
            Err(reason) => {
                debug!(reason = %reason, "skipping malformed hit line");
                skipped += 1;
            }
        }
    }
    (hits, skipped)
}

fn is_warning(line: &str) -> bool {
    let lower = line.to_ascii_lowercase();
    lower.starts_with("warning") || lower.starts_with("error")
}
