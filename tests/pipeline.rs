mod support;

use std::fs;
use std::path::Path;

use kira_db_validator::blast::SearchParams;
use kira_db_validator::domain::{MoleculeType, SearchProgram};
use kira_db_validator::pipeline::{
    DISABLED_MESSAGE, Outcome, PipelineOptions, Stage, ValidationPipeline,
};

use support::{
    MockRunner, failed, hit_lines, info_text, ok, pipeline, single_query_library, timeout,
    two_query_library, utf8_root, write_database,
};

#[test]
fn clean_pass() {
    let temp = tempfile::tempdir().unwrap();
    let root = utf8_root(&temp);
    let handle = write_database(&root, "SGD", "2024-01", "S288C", "genome", MoleculeType::Nucleotide);
    let runner = MockRunner::simple(&info_text("1,200"), &hit_lines("ref_nt", 3));

    let result = pipeline(runner.clone(), single_query_library()).validate(&handle);

    assert!(result.file_check.passed);
    assert!(result.integrity_check.passed);
    assert!(result.functional_check.passed);
    assert_eq!(result.total_hits, 3);
    assert_eq!(result.hits.len(), 3);
    assert!(result.success);
    assert_eq!(result.outcome, Outcome::Passed);
    assert_eq!(result.error_message, None);
    assert_eq!(
        result.integrity_check.details["sequences"],
        serde_json::json!(1200)
    );
    assert_eq!(runner.programs(), vec!["blastdbcmd", "blastn"]);
}

#[test]
fn missing_file_short_circuits() {
    let temp = tempfile::tempdir().unwrap();
    let root = utf8_root(&temp);
    let handle = write_database(&root, "FB", "r6", "dmel", "genome", MoleculeType::Nucleotide);
    let missing = handle.file_with_extension("nsq");
    fs::remove_file(&missing).unwrap();
    let runner = MockRunner::simple(&info_text("10"), &hit_lines("ref_nt", 1));

    let result = pipeline(runner.clone(), single_query_library()).validate(&handle);

    assert!(!result.file_check.passed);
    assert!(result.file_check.message.contains(missing.as_str()));
    assert!(!result.file_check.message.contains(".nhr"));
    assert!(!result.file_check.message.contains(".nin"));
    assert!(result.integrity_check.is_skipped());
    assert!(result.functional_check.is_skipped());
    assert_eq!(result.total_hits, 0);
    assert!(result.hits.is_empty());
    assert!(!result.success);
    assert_eq!(result.outcome, Outcome::FileCheckFailed);
    assert_eq!(result.failed_stage(), Some(Stage::FileCompleteness));
    assert!(runner.calls().is_empty());
}

#[test]
fn every_missing_file_is_listed() {
    let temp = tempfile::tempdir().unwrap();
    let root = utf8_root(&temp);
    let handle = write_database(&root, "WB", "WS290", "worm", "prot", MoleculeType::Protein);
    fs::remove_file(handle.file_with_extension("phr")).unwrap();
    fs::remove_file(handle.file_with_extension("psq")).unwrap();

    let runner = MockRunner::simple(&info_text("10"), "");
    let result = pipeline(runner, single_query_library()).validate(&handle);

    assert!(result.file_check.message.contains("prot.phr"));
    assert!(result.file_check.message.contains("prot.psq"));
    assert_eq!(
        result.file_check.details["missing"].as_array().unwrap().len(),
        2
    );
}

#[test]
fn directory_in_place_of_file_is_unreadable() {
    let temp = tempfile::tempdir().unwrap();
    let root = utf8_root(&temp);
    let handle = write_database(&root, "WB", "WS290", "worm", "nt", MoleculeType::Nucleotide);
    let nsq = handle.file_with_extension("nsq");
    fs::remove_file(&nsq).unwrap();
    fs::create_dir(&nsq).unwrap();

    let runner = MockRunner::simple(&info_text("10"), "");
    let result = pipeline(runner, single_query_library()).validate(&handle);

    assert!(!result.file_check.passed);
    assert!(result.file_check.message.contains("unreadable"));
    assert!(result.file_check.message.contains("not a regular file"));
}

#[test]
fn integrity_timeout() {
    let temp = tempfile::tempdir().unwrap();
    let root = utf8_root(&temp);
    let handle = write_database(&root, "MGI", "stage", "mouse", "db", MoleculeType::Protein);
    let runner = MockRunner::new(|program, _args| {
        if program == "blastdbcmd" {
            Err(timeout(program))
        } else {
            Ok(ok(&hit_lines("ref_aa", 1)))
        }
    });

    let result = pipeline(runner.clone(), single_query_library()).validate(&handle);

    assert!(result.file_check.passed);
    assert!(!result.integrity_check.passed);
    assert!(result.integrity_check.message.contains("timeout"));
    assert!(result.functional_check.is_skipped());
    assert!(!result.success);
    assert_eq!(result.outcome, Outcome::IntegrityFailed);
    assert_eq!(runner.programs(), vec!["blastdbcmd"]);
}

#[test]
fn integrity_tool_error_text_is_truncated() {
    let temp = tempfile::tempdir().unwrap();
    let root = utf8_root(&temp);
    let handle = write_database(&root, "MGI", "stage", "mouse", "db", MoleculeType::Protein);
    let noisy = format!("BLAST Database error: {}", "x".repeat(5000));
    let runner = MockRunner::new(move |_program, _args| Ok(failed(2, &noisy)));

    let result = pipeline(runner, single_query_library()).validate(&handle);

    assert!(!result.integrity_check.passed);
    assert!(result.integrity_check.message.contains("BLAST Database error"));
    assert!(result.integrity_check.message.len() < 700);
}

#[test]
fn zero_sequences_fails_integrity() {
    let temp = tempfile::tempdir().unwrap();
    let root = utf8_root(&temp);
    let handle = write_database(&root, "RGD", "r7", "rat", "db", MoleculeType::Nucleotide);
    let runner = MockRunner::simple(&info_text("0"), &hit_lines("ref_nt", 2));

    let result = pipeline(runner.clone(), single_query_library()).validate(&handle);

    assert!(!result.integrity_check.passed);
    assert!(result.integrity_check.message.contains("0 sequences"));
    assert!(result.functional_check.is_skipped());
    assert_eq!(result.outcome, Outcome::IntegrityFailed);
    assert_eq!(runner.programs(), vec!["blastdbcmd"]);
}

#[test]
fn unparseable_info_fails_integrity() {
    let temp = tempfile::tempdir().unwrap();
    let root = utf8_root(&temp);
    let handle = write_database(&root, "RGD", "r7", "rat", "db", MoleculeType::Nucleotide);
    let runner = MockRunner::simple("something unexpected\n", "");

    let result = pipeline(runner, single_query_library()).validate(&handle);

    assert!(!result.integrity_check.passed);
    assert!(result.integrity_check.message.contains("sequence count"));
}

#[test]
fn clean_but_empty_search_is_distinct_from_failure() {
    let temp = tempfile::tempdir().unwrap();
    let root = utf8_root(&temp);
    let handle = write_database(&root, "ZFIN", "2024", "danio", "db", MoleculeType::Nucleotide);
    let runner = MockRunner::simple(&info_text("500"), "");

    let result = pipeline(runner, two_query_library()).validate(&handle);

    assert!(result.file_check.passed);
    assert!(result.integrity_check.passed);
    assert!(result.functional_check.passed);
    assert_eq!(result.total_hits, 0);
    assert!(!result.success);
    assert_eq!(result.outcome, Outcome::NoHits);
    assert_eq!(result.query_runs.len(), 2);
    assert!(result.query_runs.iter().all(|run| run.error.is_none()));
    assert!(result.error_message.unwrap().contains("0 hits"));
}

#[test]
fn query_failure_does_not_abort_remaining_queries() {
    let temp = tempfile::tempdir().unwrap();
    let root = utf8_root(&temp);
    let handle = write_database(&root, "XB", "v10", "laevis", "db", MoleculeType::Nucleotide);
    let runner = MockRunner::new(|program, args| {
        if program == "blastdbcmd" {
            return Ok(ok(&info_text("42")));
        }
        let query = args
            .iter()
            .position(|arg| arg == "-query")
            .map(|idx| fs::read_to_string(&args[idx + 1]).unwrap())
            .unwrap();
        if query.starts_with(">first_nt") {
            Err(timeout(program))
        } else {
            Ok(ok(&hit_lines("second_nt", 2)))
        }
    });

    let result = pipeline(runner.clone(), two_query_library()).validate(&handle);

    assert_eq!(runner.calls().len(), 3);
    assert!(result.functional_check.passed);
    assert_eq!(result.total_hits, 2);
    assert!(result.success);
    assert!(result.query_runs[0].timed_out);
    assert!(result.query_runs[0].error.is_some());
    assert_eq!(result.query_runs[1].hits, 2);
    assert_eq!(result.functional_check.details["failedQueries"], serde_json::json!(1));
}

#[test]
fn all_queries_failing_is_a_search_failure() {
    let temp = tempfile::tempdir().unwrap();
    let root = utf8_root(&temp);
    let handle = write_database(&root, "XB", "v10", "laevis", "db", MoleculeType::Nucleotide);
    let runner = MockRunner::new(|program, _args| {
        if program == "blastdbcmd" {
            Ok(ok(&info_text("42")))
        } else {
            Ok(failed(1, "BLAST engine error: out of memory"))
        }
    });

    let result = pipeline(runner, two_query_library()).validate(&handle);

    assert!(result.functional_check.passed);
    assert!(!result.success);
    assert_eq!(result.outcome, Outcome::SearchFailed);
    assert!(result.error_message.unwrap().contains("out of memory"));
}

#[test]
fn query_files_are_removed_after_each_search() {
    let temp = tempfile::tempdir().unwrap();
    let root = utf8_root(&temp);
    let handle = write_database(&root, "SGD", "2024-01", "S288C", "db", MoleculeType::Nucleotide);
    let runner = MockRunner::new(|program, _args| {
        if program == "blastdbcmd" {
            Ok(ok(&info_text("7")))
        } else {
            Err(timeout(program))
        }
    });

    pipeline(runner.clone(), two_query_library()).validate(&handle);

    let searches = runner
        .calls()
        .into_iter()
        .filter(|call| call.program == "blastn")
        .collect::<Vec<_>>();
    assert_eq!(searches.len(), 2);
    let paths = searches
        .iter()
        .map(|call| call.query_path.clone().unwrap())
        .collect::<Vec<_>>();
    assert_ne!(paths[0], paths[1]);
    for call in &searches {
        assert!(call.query_text.as_ref().unwrap().starts_with('>'));
        assert!(!Path::new(call.query_path.as_ref().unwrap()).exists());
    }
}

#[test]
fn protein_database_uses_blastp() {
    let temp = tempfile::tempdir().unwrap();
    let root = utf8_root(&temp);
    let handle = write_database(&root, "WB", "WS290", "worm", "prot", MoleculeType::Protein);
    let runner = MockRunner::simple(&info_text("20,000"), &hit_lines("ref_aa", 1));

    let result = pipeline(runner.clone(), single_query_library()).validate(&handle);

    assert!(result.success);
    assert_eq!(runner.programs(), vec!["blastdbcmd", "blastp"]);
    let inspect = &runner.calls()[0];
    assert!(inspect.args.contains(&"-info".to_string()));
    assert!(inspect.args.contains(&handle.path.to_string()));
}

#[test]
fn disabled_stages_are_not_run() {
    let temp = tempfile::tempdir().unwrap();
    let root = utf8_root(&temp);
    let handle = write_database(&root, "SGD", "2024-01", "S288C", "db", MoleculeType::Nucleotide);
    fs::remove_file(handle.file_with_extension("nhr")).unwrap();
    let runner = MockRunner::simple("not parsed", &hit_lines("ref_nt", 1));
    let options = PipelineOptions {
        enable_file_checks: false,
        enable_integrity_checks: false,
        ..PipelineOptions::default()
    };
    let pipeline = ValidationPipeline::new(
        runner.clone(),
        single_query_library(),
        SearchParams::default(),
        options,
    );

    let result = pipeline.validate(&handle);

    assert_eq!(result.file_check.message, DISABLED_MESSAGE);
    assert_eq!(result.integrity_check.message, DISABLED_MESSAGE);
    assert!(result.success);
    assert_eq!(runner.programs(), vec!["blastn"]);
}

#[test]
fn success_boundary_is_stable_across_runs() {
    let temp = tempfile::tempdir().unwrap();
    let root = utf8_root(&temp);
    let handle = write_database(&root, "FB", "r6", "dmel", "db", MoleculeType::Nucleotide);
    let with_hits = pipeline(
        MockRunner::simple(&info_text("9"), &hit_lines("ref_nt", 4)),
        single_query_library(),
    );
    let without_hits = pipeline(MockRunner::simple(&info_text("9"), ""), single_query_library());

    for _ in 0..5 {
        assert!(with_hits.validate(&handle).success);
        assert!(!without_hits.validate(&handle).success);
    }
}

#[test]
fn cross_type_queries_use_translated_search() {
    let temp = tempfile::tempdir().unwrap();
    let root = utf8_root(&temp);
    let nucleotide = write_database(&root, "SGD", "r1", "genome", "db", MoleculeType::Nucleotide);
    let protein = write_database(&root, "SGD", "r1", "proteome", "db", MoleculeType::Protein);
    let runner = MockRunner::simple(&info_text("3"), &hit_lines("probe", 1));
    let pipeline = pipeline(runner.clone(), single_query_library());
    let library = single_query_library();
    let protein_query = library.sequences_for("SGD", MoleculeType::Protein).remove(0);
    let nucleotide_query = library.sequences_for("SGD", MoleculeType::Nucleotide).remove(0);
    let timeout = PipelineOptions::default().search_timeout;

    let translated = pipeline.executor().run_search(&protein_query, &nucleotide, timeout);
    let reverse = pipeline.executor().run_search(&nucleotide_query, &protein, timeout);

    assert!(translated.ok);
    assert_eq!(translated.program, SearchProgram::Tblastn);
    assert_eq!(reverse.program, SearchProgram::Blastx);
    assert_eq!(runner.programs(), vec!["tblastn", "blastx"]);
}
