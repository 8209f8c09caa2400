//! Curated reference queries used by the functional search check.
//!
//! Every group resolves to a non-empty list per molecule type: explicit
//! overrides first, then curated entries, then the universal set.

use std::collections::BTreeMap;

use crate::domain::{MoleculeType, SequenceRecord};
use crate::error::ValidatorError;

use MoleculeType::{Nucleotide, Protein};

type Entry = (&'static str, MoleculeType, &'static str);

const UBIQUITIN: &str =
    "MQIFVKTLTGKTITLEVEPSDTIENVKAKIQDKEGIPPDQQRLIFAGKQLEDGRTLSDYNIQKESTLHLVLRLRGG";

const HISTONE_H4: &str = "MSGRGKGGKGLGKGGAKRHRKVLRDNIQGITKPAIRRLARRGGVKRISGLIYEETRGVLKVFLENVIRDAVTYTEHAKRKTVTAMDVVYALKRQGRTLYGFGG";

const HISTONE_H3: &str = "MARTKQTARKSTGGKAPRKQLATKAARKSAPATGGVKKPHRYRPGTVALREIRRYQKSTELLIRKLPFQRLVREIAQDFKTDLRFQSSAVMALQEACEAYLVGLFEDTNLCAIHAKRVTIMPKDIQLARRIRGERA";

const CALMODULIN: &str = "MADQLTEEQIAEFKEAFSLFDKDGDGTITTKELGTVMRSLGQNPTEAELQDMINEVDADGNGTIDFPEFLTMMARKMKDTDSEEEIREAFRVFDKDGNGYISAAELRHVMTNLGEKLTDEEVDEMIREADIDGDGQVNYEEFVQMMTAK";

const ACTIN: &str = "MDSEVAALVIDNGSGMCKAGFAGDDAPRAVFPSIVGRPRHQGIMVGMGQKDSYVGDEAQSKRGILTLRYPIEHGIVTNWDDMEKIWHHTFYNELRVAPEEHPVLLTEAPMNPKSNREKMTQIMFETFNVPAFYVSIQAVLSLYSSGRTTGIVLDSGDGVTHVVPIYAGFSLPHAILRIDLAGRDLTDYLMKILSERGYSFSTTAEREIVRDIKEKLCYVALDFEQEMQTAAQSSSIEKSYELPDGQVITIGNERFRAPEALFHPSVLGLESAGIDQTTYNSIMKCDVDVRKELYGNIVMSGGTTMFPGIAERMQKEITALAPSSMKVKIIAPPERKYSVWIGGSILASLTTFQQMWISKQEYDESGPSIVHHKCF";

const RRNA_18S: &str = "TATCTGGTTGATCCTGCCAGTAGTCATATGCTTGTCTCAAAGATTAAGCCATGCATGTCTAAGTATAAGCAATTTATACAGTGAAACTGCGAATGGCTCATTAAATCAGTTATCGTTTATTTGATAGTTCCTTTACTACATGGTATAACTGTGGTAATTCTAGAGCTAATACATGCTTAAAATCTCGACCC";

const RRNA_5_8S: &str = "AAACTTTCAACAACGGATCTCTTGGTTCTCGCATCGATGAAGAACGCAGCGAAATGCGATACGTAATGTGAATTGCAGAATTCCGTGAATCATCGAATCTTTGAACGCACATTGCGCCCCTTGGTATTCCAGGGGGCATGCCTGTTTGAGCGTCATTT";

const HISTONE_H4_CDS: &str = "ATGTCTGGTCGCGGCAAAGGCGGAAAAGGCTTAGGCAAAGGGGGCGCCAAGCGCCACCGCAAGGTGCTGCGCGACAACATCCAGGGCATCACCAAGCCCGCCATCCGGCGCCTGGCCCGGCGCGGCGGCGTGAAGCGCATCTCCGGCCTCATCTACGAGGAGACCCGCGGGGTGCTGAAGGTGTTCCTGGAGAACGTGATCCGCGACGCCGTCACCTACACCGAGCACGCCAAGCGCAAGACCGTCACCGCCATGGACGTGGTCTACGCGCTCAAGCGCCAGGGCCGCACCCTCTACGGCTTCGGCGGCTGA";

const UBIQUITIN_CDS: &str = "ATGCAGATCTTCGTGAAGACCCTGACCGGCAAGACCATCACCCTGGAGGTGGAGCCCAGTGACACCATCGAGAATGTGAAGGCCAAGATCCAGGACAAGGAAGGCATCCCTCCCGACCAGCAGAGGCTGATCTTTGCTGGCAAGCAGCTGGAAGATGGCCGCACCCTGTCTGACTACAACATCCAGAAAGAGTCCACCCTGCACCTGGTGCTCCGTCTCAGAGGTGGG";

/// Cross-group fallback set. Both molecule types must stay non-empty.
const UNIVERSAL: &[Entry] = &[
    ("universal_18S_rRNA", Nucleotide, RRNA_18S),
    ("universal_histone_H4_cds", Nucleotide, HISTONE_H4_CDS),
    ("universal_ubiquitin_cds", Nucleotide, UBIQUITIN_CDS),
    ("universal_ubiquitin", Protein, UBIQUITIN),
    ("universal_histone_H4", Protein, HISTONE_H4),
    ("universal_calmodulin", Protein, CALMODULIN),
];

const CURATED: &[(&str, &[Entry])] = &[
    (
        "SGD",
        &[
            ("sgd_ACT1", Protein, ACTIN),
            ("sgd_HHF1", Protein, HISTONE_H4),
            ("sgd_RDN18", Nucleotide, RRNA_18S),
            ("sgd_RDN58", Nucleotide, RRNA_5_8S),
        ],
    ),
    (
        "FB",
        &[
            ("fb_His3", Protein, HISTONE_H3),
            ("fb_Cam", Protein, CALMODULIN),
            ("fb_His4_cds", Nucleotide, HISTONE_H4_CDS),
        ],
    ),
    (
        "WB",
        &[
            ("wb_ubq-1", Protein, UBIQUITIN),
            ("wb_his-1", Protein, HISTONE_H4),
        ],
    ),
    (
        "ZFIN",
        &[
            ("zfin_calm1a", Protein, CALMODULIN),
            ("zfin_h3f3a", Protein, HISTONE_H3),
            ("zfin_ubb_cds", Nucleotide, UBIQUITIN_CDS),
        ],
    ),
    (
        "MGI",
        &[
            ("mgi_Calm1", Protein, CALMODULIN),
            ("mgi_Ubb", Protein, UBIQUITIN),
            ("mgi_H4c1_cds", Nucleotide, HISTONE_H4_CDS),
            ("mgi_Ubb_cds", Nucleotide, UBIQUITIN_CDS),
        ],
    ),
    (
        "RGD",
        &[
            ("rgd_Calm1", Protein, CALMODULIN),
            ("rgd_H3c1", Protein, HISTONE_H3),
            ("rgd_Ubb_cds", Nucleotide, UBIQUITIN_CDS),
        ],
    ),
    (
        "XB",
        &[
            ("xb_calm1", Protein, CALMODULIN),
            ("xb_h4c4_cds", Nucleotide, HISTONE_H4_CDS),
        ],
    ),
];

#[derive(Debug, Clone)]
pub struct ReferenceLibrary {
    universal: Vec<SequenceRecord>,
    curated: BTreeMap<String, Vec<SequenceRecord>>,
    overrides: BTreeMap<String, Vec<SequenceRecord>>,
}

impl ReferenceLibrary {
    /// The library shipped with the crate.
    pub fn builtin() -> Self {
        let build = |entries: &[Entry]| {
            entries
                .iter()
                .map(|(id, molecule_type, residues)| {
                    SequenceRecord::curated(id, *molecule_type, residues)
                })
                .collect::<Vec<_>>()
        };
        Self {
            universal: build(UNIVERSAL),
            curated: CURATED
                .iter()
                .map(|(group, entries)| (normalize_group(group), build(entries)))
                .collect(),
            overrides: BTreeMap::new(),
        }
    }

    /// Build a library from caller-supplied data. The universal list must cover
    /// both molecule types so that every lookup resolves to something.
    pub fn from_parts(
        universal: Vec<SequenceRecord>,
        curated: BTreeMap<String, Vec<SequenceRecord>>,
    ) -> Result<Self, ValidatorError> {
        for molecule_type in [Nucleotide, Protein] {
            if !universal
                .iter()
                .any(|record| record.molecule_type == molecule_type)
            {
                return Err(ValidatorError::InvalidSequence {
                    id: "universal".to_string(),
                    reason: format!("no {molecule_type} reference sequence in the universal set"),
                });
            }
        }
        Ok(Self {
            universal,
            curated: curated
                .into_iter()
                .map(|(group, records)| (normalize_group(&group), records))
                .collect(),
            overrides: BTreeMap::new(),
        })
    }

    /// Replace the sequences used for the given groups. Overrides only apply to
    /// the molecule types they contain.
    pub fn with_overrides(mut self, overrides: BTreeMap<String, Vec<SequenceRecord>>) -> Self {
        for (group, records) in overrides {
            if records.is_empty() {
                continue;
            }
            self.overrides
                .entry(normalize_group(&group))
                .or_default()
                .extend(records);
        }
        self
    }

    pub fn sequences_for(&self, group: &str, molecule_type: MoleculeType) -> Vec<SequenceRecord> {
        let key = normalize_group(group);
        for source in [self.overrides.get(&key), self.curated.get(&key)]
            .into_iter()
            .flatten()
        {
            let matching = of_type(source, molecule_type);
            if !matching.is_empty() {
                return matching;
            }
        }
        of_type(&self.universal, molecule_type)
    }

    pub fn is_curated(&self, group: &str) -> bool {
        let key = normalize_group(group);
        self.overrides.contains_key(&key) || self.curated.contains_key(&key)
    }

    pub fn curated_groups(&self) -> Vec<&str> {
        self.curated.keys().map(String::as_str).collect()
    }

    pub fn universal(&self) -> &[SequenceRecord] {
        &self.universal
    }
}

impl Default for ReferenceLibrary {
    fn default() -> Self {
        Self::builtin()
    }
}

fn of_type(records: &[SequenceRecord], molecule_type: MoleculeType) -> Vec<SequenceRecord> {
    records
        .iter()
        .filter(|record| record.molecule_type == molecule_type)
        .cloned()
        .collect()
}

fn normalize_group(group: &str) -> String {
    group.trim().to_ascii_uppercase()
}
