use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::blast::SearchParams;
use crate::domain::{MoleculeType, SequenceRecord};
use crate::error::ValidatorError;
use crate::pipeline::PipelineOptions;

pub const DEFAULT_CONFIG_FILE: &str = "kira-dbv.json";
pub const DEFAULT_WORKERS: usize = 3;
pub const DEFAULT_REPORT_LIMIT: usize = 20;

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub workers: Option<usize>,
    #[serde(default)]
    pub integrity_timeout_secs: Option<u64>,
    #[serde(default)]
    pub search_timeout_secs: Option<u64>,
    #[serde(default)]
    pub evalue: Option<f64>,
    #[serde(default)]
    pub nucleotide_word_size: Option<u32>,
    #[serde(default)]
    pub protein_word_size: Option<u32>,
    #[serde(default)]
    pub max_target_seqs: Option<u32>,
    #[serde(default)]
    pub blast_bin_dir: Option<PathBuf>,
    #[serde(default)]
    pub enable_file_checks: Option<bool>,
    #[serde(default)]
    pub enable_integrity_checks: Option<bool>,
    #[serde(default)]
    pub report_limit: Option<usize>,
    #[serde(default)]
    pub groups: Vec<String>,
    #[serde(default)]
    pub release: Option<String>,
    #[serde(default)]
    pub custom_sequences: BTreeMap<String, Vec<SequenceEntry>>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(untagged)]
pub enum SequenceEntry {
    /// Raw residues or a single FASTA entry; molecule type is inferred.
    Shorthand(String),
    Detailed(SequenceEntryObject),
}

#[derive(Debug, Deserialize, Serialize)]
pub struct SequenceEntryObject {
    pub id: String,
    #[serde(default)]
    pub molecule_type: Option<MoleculeType>,
    pub sequence: String,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub workers: usize,
    pub blast_bin_dir: Option<PathBuf>,
    pub search: SearchParams,
    pub pipeline: PipelineOptions,
    pub report_limit: usize,
    pub groups: Vec<String>,
    pub release: Option<String>,
    pub custom_sequences: BTreeMap<String, Vec<SequenceRecord>>,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self {
            schema_version: 1,
            workers: DEFAULT_WORKERS,
            blast_bin_dir: None,
            search: SearchParams::default(),
            pipeline: PipelineOptions::default(),
            report_limit: DEFAULT_REPORT_LIMIT,
            groups: Vec::new(),
            release: None,
            custom_sequences: BTreeMap::new(),
        }
    }
}

impl ResolvedConfig {
    /// Replace the custom sequences for `group`. Group names compare without
    /// regard to case or surrounding whitespace, matching reference lookups.
    pub fn replace_custom_sequences(&mut self, group: &str, records: Vec<SequenceRecord>) {
        let wanted = group.trim();
        self.custom_sequences
            .retain(|key, _| !key.trim().eq_ignore_ascii_case(wanted));
        self.custom_sequences.insert(wanted.to_string(), records);
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load an explicit config file, or `kira-dbv.json` in the working
    /// directory when present. Without either, defaults apply.
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, ValidatorError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Ok(ResolvedConfig::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| ValidatorError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| ValidatorError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, ValidatorError> {
        let defaults = ResolvedConfig::default();
        let workers = config.workers.unwrap_or(defaults.workers);
        if workers == 0 {
            return Err(ValidatorError::ConfigParse(
                "workers must be at least 1".to_string(),
            ));
        }

        let search = SearchParams {
            evalue: config.evalue.unwrap_or(defaults.search.evalue),
            nucleotide_word_size: config
                .nucleotide_word_size
                .unwrap_or(defaults.search.nucleotide_word_size),
            protein_word_size: config
                .protein_word_size
                .unwrap_or(defaults.search.protein_word_size),
            max_target_seqs: config
                .max_target_seqs
                .unwrap_or(defaults.search.max_target_seqs),
        };
        if search.evalue.is_nan() || search.evalue <= 0.0 {
            return Err(ValidatorError::ConfigParse(
                "evalue must be positive".to_string(),
            ));
        }

        let pipeline = PipelineOptions {
            enable_file_checks: config
                .enable_file_checks
                .unwrap_or(defaults.pipeline.enable_file_checks),
            enable_integrity_checks: config
                .enable_integrity_checks
                .unwrap_or(defaults.pipeline.enable_integrity_checks),
            integrity_timeout: config
                .integrity_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.pipeline.integrity_timeout),
            search_timeout: config
                .search_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.pipeline.search_timeout),
        };

        let custom_sequences = config
            .custom_sequences
            .into_iter()
            .map(|(group, entries)| {
                let records = entries
                    .into_iter()
                    .enumerate()
                    .map(|(index, entry)| resolve_sequence(&group, index, entry))
                    .collect::<Result<Vec<_>, ValidatorError>>()?;
                Ok((group, records))
            })
            .collect::<Result<BTreeMap<_, _>, ValidatorError>>()?;

        Ok(ResolvedConfig {
            schema_version: config.schema_version.unwrap_or(1),
            workers,
            blast_bin_dir: config.blast_bin_dir,
            search,
            pipeline,
            report_limit: config.report_limit.unwrap_or(defaults.report_limit),
            groups: config.groups,
            release: config.release,
            custom_sequences,
        })
    }
}

fn resolve_sequence(
    group: &str,
    index: usize,
    entry: SequenceEntry,
) -> Result<SequenceRecord, ValidatorError> {
    let fallback_id = format!("{}_custom_{}", group.to_ascii_lowercase(), index + 1);
    match entry {
        SequenceEntry::Shorthand(text) => SequenceRecord::from_fasta(&text, &fallback_id, None),
        SequenceEntry::Detailed(obj) => {
            let molecule_type = obj
                .molecule_type
                .unwrap_or_else(|| MoleculeType::infer(&obj.sequence));
            SequenceRecord::new(obj.id, molecule_type, &obj.sequence)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_config_shorthand() {
        let config: Config = serde_json::from_str(
            r#"{
                "workers": 2,
                "custom_sequences": {
                    "SGD": ["ACGTACGTACGTTTGA"],
                    "FB": [{ "id": "fb_probe", "molecule_type": "protein", "sequence": "MKTAYIAK" }]
                }
            }"#,
        )
        .unwrap();

        let resolved = ConfigLoader::resolve_config(config).unwrap();
        assert_eq!(resolved.schema_version, 1);
        assert_eq!(resolved.workers, 2);
        assert_eq!(resolved.search, SearchParams::default());
        let sgd = &resolved.custom_sequences["SGD"];
        assert_eq!(sgd[0].id, "sgd_custom_1");
        assert_eq!(sgd[0].molecule_type, MoleculeType::Nucleotide);
        assert_eq!(resolved.custom_sequences["FB"][0].id, "fb_probe");
    }
}
