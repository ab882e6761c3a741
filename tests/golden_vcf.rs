#[path = "common/mod.rs"]
mod common;

use std::fs;

use common::{assert_snapshot, reference, sample_table, write_file};
use pilecall::pipeline::{run_genotyping, GenotypeConfig, StaticPileup, INDIVIDUAL_DIR};
use tempfile::tempdir;

#[test]
fn genotyped_vcf_matches_golden() {
    let dir = tempdir().unwrap();
    let samples = sample_table(dir.path(), &["s3", "s1", "s2"]);
    let library = write_file(
        dir.path(),
        "library.txt",
        "#chrom\tpos\talts\n1\t102\tT\n1\t105\tG,D2\n1\t108\tI1\n",
    );
    let out = dir.path().join("out");

    let pileup = StaticPileup::new()
        .with_sample(
            "s1",
            [
                "1\t102\tA\t10\t.......TTT\tIIIIIIIIII",
                "1\t105\tC\t6\t..GG.-2TT\tIIIIII",
            ],
        )
        .with_sample(
            "s2",
            [
                "garbage",
                "1\t102\tA\t5\tTTTTT\tIIIII",
                "1\t108\tG\t4\t.+1A.+1A.+1A.\tIIII",
            ],
        )
        .with_unavailable("s3");

    let config = GenotypeConfig::new("ref.fa", samples, library, "1:100,109".parse().unwrap(), &out)
        .with_threads(2)
        .with_file_date("2024-05-01");
    let report = run_genotyping(&config, &reference(), &pileup).expect("genotyping succeeds");

    assert_eq!(report.sites, 3);
    assert_eq!(report.tasks.failed_samples(), vec!["s3"]);
    assert_eq!(report.assembly.padded_samples, 1);
    assert!(!out.join(INDIVIDUAL_DIR).exists(), "intermediates are removed");
    assert!(out.join("1_100_110.pos.txt").exists());

    let actual = fs::read_to_string(&report.vcf).unwrap();
    assert_snapshot("genotype/chr001.vcf", &actual);
}
