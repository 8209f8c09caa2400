use std::fmt;
use std::str::FromStr;

use camino::{Utf8Path, Utf8PathBuf};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::ValidatorError;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum MoleculeType {
    Nucleotide,
    Protein,
}

impl MoleculeType {
    /// Index-file marker that identifies a database of this type.
    pub fn marker_extension(self) -> &'static str {
        match self {
            MoleculeType::Nucleotide => "nin",
            MoleculeType::Protein => "pin",
        }
    }

    /// Header, index and sequence files every database of this type must carry.
    pub fn required_extensions(self) -> [&'static str; 3] {
        match self {
            MoleculeType::Nucleotide => ["nhr", "nin", "nsq"],
            MoleculeType::Protein => ["phr", "pin", "psq"],
        }
    }

    pub fn from_marker(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "nin" => Some(MoleculeType::Nucleotide),
            "pin" => Some(MoleculeType::Protein),
            _ => None,
        }
    }

    /// Guess the molecule type of a raw residue string. Anything outside the
    /// IUPAC nucleotide alphabet is treated as protein.
    pub fn infer(residues: &str) -> Self {
        let is_nucleotide = residues
            .chars()
            .filter(|ch| !ch.is_whitespace())
            .all(|ch| matches!(ch.to_ascii_uppercase(), 'A' | 'C' | 'G' | 'T' | 'U' | 'N' | '-'));
        if is_nucleotide {
            MoleculeType::Nucleotide
        } else {
            MoleculeType::Protein
        }
    }
}

impl fmt::Display for MoleculeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MoleculeType::Nucleotide => write!(f, "nucleotide"),
            MoleculeType::Protein => write!(f, "protein"),
        }
    }
}

impl FromStr for MoleculeType {
    type Err = ValidatorError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "nucleotide" | "nucl" | "dna" | "n" => Ok(MoleculeType::Nucleotide),
            "protein" | "prot" | "p" => Ok(MoleculeType::Protein),
            _ => Err(ValidatorError::InvalidMoleculeType(value.to_string())),
        }
    }
}

/// One discovered BLAST database, addressed by the extensionless base path
/// shared by all of its files.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactHandle {
    pub name: String,
    pub path: Utf8PathBuf,
    pub molecule_type: MoleculeType,
    pub group: String,
    pub release: String,
}

impl ArtifactHandle {
    pub fn file_with_extension(&self, ext: &str) -> Utf8PathBuf {
        Utf8PathBuf::from(format!("{}.{ext}", self.path))
    }

    pub fn required_files(&self) -> Vec<Utf8PathBuf> {
        self.molecule_type
            .required_extensions()
            .iter()
            .map(|ext| self.file_with_extension(ext))
            .collect()
    }

    pub fn base_path(&self) -> &Utf8Path {
        &self.path
    }
}

/// A single FASTA query. Construction through [`SequenceRecord::new`] guarantees
/// that `content` holds exactly one entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceRecord {
    pub id: String,
    pub molecule_type: MoleculeType,
    pub content: String,
}

impl SequenceRecord {
    pub fn new(
        id: impl Into<String>,
        molecule_type: MoleculeType,
        residues: &str,
    ) -> Result<Self, ValidatorError> {
        let id = id.into();
        let residues = residues
            .chars()
            .filter(|ch| !ch.is_whitespace())
            .collect::<String>();
        if id.trim().is_empty() || id.chars().any(char::is_whitespace) {
            return Err(ValidatorError::InvalidSequence {
                id,
                reason: "identifier must be a single non-empty token".to_string(),
            });
        }
        if residues.is_empty() {
            return Err(ValidatorError::InvalidSequence {
                id,
                reason: "sequence is empty".to_string(),
            });
        }
        if residues.contains('>') {
            return Err(ValidatorError::InvalidSequence {
                id,
                reason: "sequence must contain a single FASTA entry".to_string(),
            });
        }
        let content = format!(">{id}\n{}\n", wrap_residues(&residues, 60));
        Ok(Self {
            id,
            molecule_type,
            content,
        })
    }

    /// Build a record from residues that are known to be valid, skipping the
    /// checks done by [`SequenceRecord::new`].
    pub(crate) fn curated(id: &str, molecule_type: MoleculeType, residues: &str) -> Self {
        Self {
            id: id.to_string(),
            molecule_type,
            content: format!(">{id}\n{}\n", wrap_residues(residues, 60)),
        }
    }

    /// Parse FASTA text holding exactly one entry. A bare residue string is
    /// accepted and named with `fallback_id`.
    pub fn from_fasta(
        text: &str,
        fallback_id: &str,
        molecule_type: Option<MoleculeType>,
    ) -> Result<Self, ValidatorError> {
        let trimmed = text.trim();
        let (id, body) = match trimmed.strip_prefix('>') {
            Some(rest) => {
                let (header, body) = rest.split_once('\n').unwrap_or((rest, ""));
                let id = header
                    .split_whitespace()
                    .next()
                    .unwrap_or(fallback_id)
                    .to_string();
                (id, body)
            }
            None => (fallback_id.to_string(), trimmed),
        };
        if body.contains('>') {
            return Err(ValidatorError::InvalidSequence {
                id,
                reason: "expected exactly one FASTA entry".to_string(),
            });
        }
        let molecule_type = molecule_type.unwrap_or_else(|| MoleculeType::infer(body));
        Self::new(id, molecule_type, body)
    }

    pub fn residues(&self) -> String {
        self.content
            .lines()
            .filter(|line| !line.starts_with('>'))
            .collect::<String>()
    }

    pub fn entry_count(&self) -> usize {
        self.content
            .lines()
            .filter(|line| line.starts_with('>'))
            .count()
    }
}

fn wrap_residues(residues: &str, width: usize) -> String {
    residues
        .as_bytes()
        .chunks(width)
        .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
        .collect::<Vec<_>>()
        .join("\n")
}

/// One tabular hit line: `query subject %identity length evalue bitscore`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HitRecord {
    pub query_id: String,
    pub subject_id: String,
    pub percent_identity: f64,
    pub alignment_length: u32,
    pub e_value: f64,
    pub bit_score: f64,
}

impl FromStr for HitRecord {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let fields = line.trim_end().split('\t').collect::<Vec<_>>();
        if fields.len() < 6 {
            return Err(format!("expected 6 tab-separated fields, got {}", fields.len()));
        }
        let percent_identity = fields[2]
            .trim()
            .parse::<f64>()
            .map_err(|err| format!("identity: {err}"))?;
        let alignment_length = fields[3]
            .trim()
            .parse::<u32>()
            .map_err(|err| format!("length: {err}"))?;
        let e_value = fields[4]
            .trim()
            .parse::<f64>()
            .map_err(|err| format!("evalue: {err}"))?;
        let bit_score = fields[5]
            .trim()
            .parse::<f64>()
            .map_err(|err| format!("bitscore: {err}"))?;
        if !(0.0..=100.0).contains(&percent_identity) {
            return Err(format!("identity out of range: {percent_identity}"));
        }
        if alignment_length == 0 {
            return Err("alignment length must be positive".to_string());
        }
        if !(e_value >= 0.0) || !(bit_score >= 0.0) {
            return Err("evalue and bitscore must be non-negative".to_string());
        }
        Ok(Self {
            query_id: fields[0].trim().to_string(),
            subject_id: fields[1].trim().to_string(),
            percent_identity,
            alignment_length,
            e_value,
            bit_score,
        })
    }
}

/// BLAST program chosen from the (database, query) molecule types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchProgram {
    Blastn,
    Blastp,
    Tblastn,
    Blastx,
}

impl SearchProgram {
    pub fn select(database: MoleculeType, query: MoleculeType) -> Self {
        match (database, query) {
            (MoleculeType::Nucleotide, MoleculeType::Nucleotide) => SearchProgram::Blastn,
            (MoleculeType::Protein, MoleculeType::Protein) => SearchProgram::Blastp,
            (MoleculeType::Nucleotide, MoleculeType::Protein) => SearchProgram::Tblastn,
            (MoleculeType::Protein, MoleculeType::Nucleotide) => SearchProgram::Blastx,
        }
    }

    pub fn binary(self) -> &'static str {
        match self {
            SearchProgram::Blastn => "blastn",
            SearchProgram::Blastp => "blastp",
            SearchProgram::Tblastn => "tblastn",
            SearchProgram::Blastx => "blastx",
        }
    }

    /// Word size applies to the query alphabet the program seeds on.
    pub fn seeds_on_nucleotides(self) -> bool {
        matches!(self, SearchProgram::Blastn)
    }
}

impl fmt::Display for SearchProgram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.binary())
    }
}
