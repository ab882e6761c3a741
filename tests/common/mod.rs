#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use pilecall::genomics::InMemoryReference;

fn snapshot_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("snapshots")
}

pub fn assert_snapshot(name: &str, actual: &str) {
    let path = snapshot_root().join(name);
    if std::env::var("PILECALL_UPDATE_SNAPSHOTS").is_ok() {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create snapshot directory");
        }
        fs::write(&path, actual).expect("write snapshot");
        return;
    }

    let expected =
        fs::read_to_string(&path).unwrap_or_else(|_| panic!("snapshot {:?} not found", path));
    if normalize(&expected) != normalize(actual) {
        panic!(
            "Snapshot mismatch for {:?}. Set PILECALL_UPDATE_SNAPSHOTS=1 to regenerate.\nExpected:\n{}\nActual:\n{}",
            path,
            expected,
            actual
        );
    }
}

fn normalize(input: &str) -> String {
    input.replace("\r\n", "\n")
}

/// Chromosome "1" of 120 bases: A at 102, C at 105, G at 108, N elsewhere.
pub fn reference() -> InMemoryReference {
    let mut sequence = vec![b'N'; 120];
    sequence[101] = b'A';
    sequence[104] = b'C';
    sequence[107] = b'G';
    let mut reference = InMemoryReference::new();
    reference.push("1", sequence);
    reference
}

pub fn write_file(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, contents).expect("write fixture");
    path
}

/// Sample table listing `names` with coverage 10 and one BAM each.
pub fn sample_table(dir: &Path, names: &[&str]) -> PathBuf {
    let mut table = String::from("Taxa\tCoverage\tBams\n");
    for name in names {
        table.push_str(&format!("{name}\t10\t{name}.bam\n"));
    }
    write_file(dir, "samples.txt", &table)
}
