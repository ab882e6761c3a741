#[path = "common/mod.rs"]
mod common;

use std::fs;
use std::path::Path;

use common::{reference, sample_table, write_file};
use pilecall::pipeline::{
    run_discovery, run_genotyping, DiscoveryConfig, GenotypeConfig, StaticPileup,
};
use tempfile::tempdir;

fn pileups() -> StaticPileup {
    StaticPileup::new()
        .with_sample(
            "s1",
            [
                "1\t102\tA\t10\t.......TTT\tIIIIIIIIII",
                "1\t105\tC\t6\t..GG.-2TT\tIIIIII",
                "1\t115\tN\t10\tGGGGGGGGcc\tIIIIIIIIII",
            ],
        )
        .with_sample(
            "s2",
            [
                "1\t102\tA\t5\tTTTTT\tIIIII",
                "1\t108\tG\t4\t.+1A.+1A.+1A.\tIIII",
            ],
        )
        .with_sample("s3", ["1\t105\tC\t10\tCCCCCCCCCC\tIIIIIIIIII"])
}

fn hash_file(path: &Path) -> blake3::Hash {
    blake3::hash(&fs::read(path).unwrap())
}

/// Hash of every file below `dir`, keyed by relative path in sorted order.
fn hash_tree(dir: &Path) -> Vec<(String, blake3::Hash)> {
    let mut entries = Vec::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        for entry in fs::read_dir(&current).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                pending.push(path);
            } else {
                let name = path.strip_prefix(dir).unwrap().display().to_string();
                entries.push((name, hash_file(&path)));
            }
        }
    }
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    entries
}

fn genotype_once(threads: usize) -> blake3::Hash {
    let dir = tempdir().unwrap();
    let samples = sample_table(dir.path(), &["s2", "s3", "s1"]);
    let library = write_file(
        dir.path(),
        "library.txt",
        "1\t102\tT\n1\t105\tG,D2\n1\t108\tI1\n",
    );
    let config = GenotypeConfig::new(
        "ref.fa",
        samples,
        library,
        "1:100,109".parse().unwrap(),
        dir.path().join("out"),
    )
    .with_threads(threads)
    .with_file_date("2024-05-01");
    let report = run_genotyping(&config, &reference(), &pileups()).unwrap();
    hash_file(&report.vcf)
}

fn discover_once(threads: usize) -> Vec<(String, blake3::Hash)> {
    let dir = tempdir().unwrap();
    let samples = sample_table(dir.path(), &["s1", "s2", "s3"]);
    let out = dir.path().join("out");
    let config = DiscoveryConfig::new("ref.fa", samples, "1".parse().unwrap(), &out)
        .with_bin_width(10)
        .with_threads(threads);
    run_discovery(&config, &reference(), &pileups()).unwrap();
    hash_tree(&out)
}

#[test]
fn genotyping_output_is_independent_of_thread_count() {
    let baseline = genotype_once(1);
    for threads in [1, 2, 4] {
        assert_eq!(genotype_once(threads), baseline, "threads = {threads}");
    }
}

#[test]
fn discovery_bins_are_byte_identical_across_runs() {
    let baseline = discover_once(1);
    assert!(!baseline.is_empty());
    for threads in [2, 3] {
        assert_eq!(discover_once(threads), baseline, "threads = {threads}");
    }
}
