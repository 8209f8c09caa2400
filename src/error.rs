use std::path::PathBuf;

use camino::Utf8PathBuf;
use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum ValidatorError {
    #[error("database root not found: {0}")]
    #[diagnostic(help("check the --root path; no databases can be discovered without it"))]
    RootNotFound(Utf8PathBuf),

    #[error("invalid group filter: {0}")]
    #[diagnostic(help("a group is a single directory name directly under the root"))]
    InvalidGroup(String),

    #[error("missing database files: {}", .0.join(", "))]
    MissingFiles(Vec<String>),

    #[error("unreadable database file {path}: {reason}")]
    UnreadableFile { path: String, reason: String },

    #[error("blastdbcmd failed: {0}")]
    IndexTool(String),

    #[error("database contains 0 sequences")]
    ZeroSequences,

    #[error("search tool failed: {0}")]
    SearchTool(String),

    #[error("timeout after {secs}s running {program}")]
    ToolTimeout { program: String, secs: u64 },

    #[error("failed to start {program}: {reason}")]
    ToolSpawn { program: String, reason: String },

    #[error("required tool not found: {0}")]
    MissingTool(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("invalid molecule type: {0}")]
    InvalidMoleculeType(String),

    #[error("invalid reference sequence {id}: {reason}")]
    InvalidSequence { id: String, reason: String },

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("failed to render report: {0}")]
    Report(String),
}
