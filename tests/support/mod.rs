#![allow(dead_code)]

use std::collections::BTreeMap;
use std::fs;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};

use kira_db_validator::blast::{SearchParams, ToolOutput, ToolRunner};
use kira_db_validator::domain::{ArtifactHandle, MoleculeType, SequenceRecord};
use kira_db_validator::error::ValidatorError;
use kira_db_validator::pipeline::{PipelineOptions, ValidationPipeline};
use kira_db_validator::references::ReferenceLibrary;

pub type Responder = dyn Fn(&str, &[String]) -> Result<ToolOutput, ValidatorError> + Send + Sync;

/// Stands in for the BLAST+ binaries. Records every call, including the
/// query text read from the `-query` file while it still exists.
#[derive(Clone)]
pub struct MockRunner {
    respond: Arc<Responder>,
    pub calls: Arc<Mutex<Vec<Call>>>,
}

#[derive(Debug, Clone)]
pub struct Call {
    pub program: String,
    pub args: Vec<String>,
    pub query_path: Option<String>,
    pub query_text: Option<String>,
}

impl MockRunner {
    pub fn new(
        respond: impl Fn(&str, &[String]) -> Result<ToolOutput, ValidatorError>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        Self {
            respond: Arc::new(respond),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// `blastdbcmd` prints `info`; every search prints `hits`.
    pub fn simple(info: &str, hits: &str) -> Self {
        let info = info.to_string();
        let hits = hits.to_string();
        Self::new(move |program, _args| {
            if program == "blastdbcmd" {
                Ok(ok(&info))
            } else {
                Ok(ok(&hits))
            }
        })
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn programs(&self) -> Vec<String> {
        self.calls().into_iter().map(|call| call.program).collect()
    }
}

impl ToolRunner for MockRunner {
    fn run(
        &self,
        program: &str,
        args: &[String],
        _timeout: Duration,
    ) -> Result<ToolOutput, ValidatorError> {
        let query_path = args
            .iter()
            .position(|arg| arg == "-query")
            .and_then(|idx| args.get(idx + 1))
            .cloned();
        let query_text = query_path
            .as_ref()
            .and_then(|path| fs::read_to_string(path).ok());
        self.calls.lock().unwrap().push(Call {
            program: program.to_string(),
            args: args.to_vec(),
            query_path,
            query_text,
        });
        (self.respond)(program, args)
    }
}

pub fn ok(stdout: &str) -> ToolOutput {
    ToolOutput {
        exit_code: Some(0),
        stdout: stdout.to_string(),
        stderr: String::new(),
    }
}

pub fn failed(code: i32, stderr: &str) -> ToolOutput {
    ToolOutput {
        exit_code: Some(code),
        stdout: String::new(),
        stderr: stderr.to_string(),
    }
}

pub fn timeout(program: &str) -> ValidatorError {
    ValidatorError::ToolTimeout {
        program: program.to_string(),
        secs: 30,
    }
}

pub fn info_text(sequences: &str) -> String {
    format!(
        "Database: synthetic\n\t{sequences} sequences; 350,000 total bases\n\n\
         Date: Jan 1, 2024  9:00 AM\tLongest sequence: 9,000 bases\n\nBLASTDB Version: 5\n"
    )
}

pub fn hit_lines(query: &str, count: usize) -> String {
    (0..count)
        .map(|idx| format!("{query}\tsubject_{idx}\t97.5\t120\t1e-30\t210.0\n"))
        .collect()
}

/// Library with exactly one reference query per molecule type.
pub fn single_query_library() -> Arc<ReferenceLibrary> {
    let universal = vec![
        SequenceRecord::new("ref_nt", MoleculeType::Nucleotide, "ACGTACGTTAGCATCGATCGATCGGGCTA")
            .unwrap(),
        SequenceRecord::new("ref_aa", MoleculeType::Protein, "MQIFVKTLTGKTITLEVEPSD").unwrap(),
    ];
    Arc::new(ReferenceLibrary::from_parts(universal, BTreeMap::new()).unwrap())
}

/// Library with two nucleotide queries, for partial-failure scenarios.
pub fn two_query_library() -> Arc<ReferenceLibrary> {
    let universal = vec![
        SequenceRecord::new("first_nt", MoleculeType::Nucleotide, "ACGTACGTTAGCATCGATCG").unwrap(),
        SequenceRecord::new("second_nt", MoleculeType::Nucleotide, "TTGACCGATAGGCATCAGGA")
            .unwrap(),
        SequenceRecord::new("ref_aa", MoleculeType::Protein, "MQIFVKTLTGKTITLEVEPSD").unwrap(),
    ];
    Arc::new(ReferenceLibrary::from_parts(universal, BTreeMap::new()).unwrap())
}

pub fn pipeline(
    runner: MockRunner,
    library: Arc<ReferenceLibrary>,
) -> ValidationPipeline<MockRunner> {
    ValidationPipeline::new(
        runner,
        library,
        SearchParams::default(),
        PipelineOptions::default(),
    )
}

pub fn utf8_root(temp: &tempfile::TempDir) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap()
}

/// Write a complete database (all three required files) and return its handle.
pub fn write_database(
    root: &Utf8Path,
    group: &str,
    release: &str,
    dir: &str,
    base: &str,
    molecule_type: MoleculeType,
) -> ArtifactHandle {
    let directory = root.join(group).join(release).join(dir);
    fs::create_dir_all(&directory).unwrap();
    for ext in molecule_type.required_extensions() {
        fs::write(directory.join(format!("{base}.{ext}")), b"blastdb").unwrap();
    }
    ArtifactHandle {
        name: dir.to_string(),
        path: directory.join(base),
        molecule_type,
        group: group.to_string(),
        release: release.to_string(),
    }
}
