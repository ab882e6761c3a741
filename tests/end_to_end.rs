#[path = "common/mod.rs"]
mod common;

use std::fs;

use common::{reference, sample_table, write_file};
use pilecall::genomics::{AlleleClass, EncodedBinReader};
use pilecall::pipeline::{
    intermediate_path, run_discovery, run_genotyping, DiscoveryConfig, GenotypeConfig,
    StaticPileup, INDIVIDUAL_DIR,
};
use pilecall::PipelineError;
use tempfile::tempdir;

#[test]
fn heterozygous_site_is_called_and_other_positions_are_missing() {
    let dir = tempdir().unwrap();
    let samples = sample_table(dir.path(), &["s1"]);
    let rows: String = (100..110).map(|pos| format!("1\t{pos}\tT\n")).collect();
    let library = write_file(dir.path(), "library.txt", &rows);
    let out = dir.path().join("out");

    let pileup =
        StaticPileup::new().with_sample("s1", ["1\t102\tA\t10\t.......TTT\tIIIIIIIIII"]);

    let config = GenotypeConfig::new("ref.fa", samples, library, "1:100,109".parse().unwrap(), &out)
        .with_threads(1)
        .with_keep_intermediates(true);
    let report = run_genotyping(&config, &reference(), &pileup).unwrap();
    assert_eq!(report.sites, 10);

    let text = fs::read_to_string(intermediate_path(&out.join(INDIVIDUAL_DIR), "s1", 1)).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 10);
    for (idx, line) in lines.iter().enumerate() {
        if idx == 2 {
            assert!(line.starts_with("0/1:7,3:"), "unexpected call {line}");
        } else {
            assert_eq!(*line, "./.");
        }
    }
}

#[test]
fn strict_mode_fails_the_run_on_a_failed_sample() {
    let dir = tempdir().unwrap();
    let samples = sample_table(dir.path(), &["s1", "s2"]);
    let library = write_file(dir.path(), "library.txt", "1\t102\tT\n");
    let pileup = StaticPileup::new().with_unavailable("s2");

    let config = GenotypeConfig::new(
        "ref.fa",
        samples,
        library,
        "1:100,109".parse().unwrap(),
        dir.path().join("out"),
    )
    .with_threads(2)
    .with_strict(true);
    let result = run_genotyping(&config, &reference(), &pileup);
    assert!(matches!(
        result,
        Err(PipelineError::FailedTasks {
            failed: 1,
            total: 2
        })
    ));
}

#[test]
fn library_on_another_chromosome_is_a_configuration_error() {
    let dir = tempdir().unwrap();
    let samples = sample_table(dir.path(), &["s1"]);
    let library = write_file(dir.path(), "library.txt", "2\t102\tT\n");
    let config = GenotypeConfig::new(
        "ref.fa",
        samples,
        library,
        "1".parse().unwrap(),
        dir.path().join("out"),
    );
    let result = run_genotyping(&config, &reference(), &StaticPileup::new());
    assert!(matches!(result, Err(PipelineError::Configuration(_))));
}

#[test]
fn discovery_writes_decodable_bins_per_sample() {
    let dir = tempdir().unwrap();
    let samples = sample_table(dir.path(), &["s1", "s2"]);
    let out = dir.path().join("out");
    let pileup = StaticPileup::new()
        .with_sample(
            "s1",
            [
                "1\t101\tN\t10\t..........\tIIIIIIIIII",
                "1\t102\tA\t10\tTTTTTTTTTT\tIIIIIIIIII",
                "1\t115\tN\t10\tGGGGGGGGcc\tIIIIIIIIII",
            ],
        )
        .with_sample("s2", ["1\t105\tC\t10\tCCCCCCCCCC\tIIIIIIIIII"]);

    let config = DiscoveryConfig::new("ref.fa", samples, "1".parse().unwrap(), &out)
        .with_bin_width(10)
        .with_threads(2);
    let report = run_discovery(&config, &reference(), &pileup).unwrap();
    assert_eq!(report.region, 1..121);
    assert_eq!(report.tasks.failed(), 0);

    let s1 = report.tasks.outcomes[0].result.as_ref().unwrap();
    assert_eq!(s1.accepted, 2);
    assert_eq!(s1.bins, 2);

    let reader = EncodedBinReader::open(out.join("s1").join("1_101_111.ing.gz")).unwrap();
    assert_eq!(reader.header().start, 101);
    let records: Vec<_> = reader.collect::<Result<_, _>>().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].position(101), 102);
    assert_eq!(records[0].allele, AlleleClass::T);

    let records: Vec<_> = EncodedBinReader::open(out.join("s1").join("1_111_121.ing.gz"))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(records[0].position(111), 115);
    assert_eq!(records[0].allele, AlleleClass::G);

    // Discovery classifies letters even when they match the reference.
    let s2 = report.tasks.outcomes[1].result.as_ref().unwrap();
    assert_eq!(s2.accepted, 1);
}
