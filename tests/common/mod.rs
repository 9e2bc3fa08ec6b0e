//! Shared fixtures and snapshot assertions for integration tests.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use measure_uncertainty::genomics::{
    AlignedRead, CigarOp, MeasureUncertainty, Position, ReadSet, ReferenceGenome, UncertaintyRun,
    UncertaintyTable,
};
use measure_uncertainty::TraversalConfig;
use rust_htslib::bam::record::CigarString;

fn snapshot_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("snapshots")
}

pub fn assert_snapshot(name: &str, actual: &str) {
    let path = snapshot_root().join(name);
    if std::env::var("UNCERTAINTY_UPDATE_SNAPSHOTS").is_ok() {
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
            "Snapshot mismatch for {:?}. Set UNCERTAINTY_UPDATE_SNAPSHOTS=1 to regenerate.\nExpected:\n{}\nActual:\n{}",
            path,
            expected,
            actual
        );
    }
}

fn normalize(input: &str) -> String {
    input.replace("\r\n", "\n")
}

/// Reference built from `(name, bases)` pairs.
pub fn reference(sequences: &[(&str, &[u8])]) -> ReferenceGenome {
    let mut reference = ReferenceGenome::new();
    for (name, bases) in sequences {
        reference.insert(*name, bases.to_vec());
    }
    reference
}

/// Read on `chrom` at 1-based `pos`.
pub fn read(name: &str, chrom: &str, pos: u32, cigar: &str, bases: &[u8]) -> AlignedRead {
    AlignedRead::new(
        name,
        chrom,
        pos,
        CigarString::try_from(cigar)
            .expect("valid CIGAR")
            .iter()
            .map(CigarOp::from)
            .collect(),
        bases.to_vec(),
    )
}

/// Measure a single read set with the given traversal configuration.
pub fn measure_with(
    reference: &ReferenceGenome,
    reads: Vec<AlignedRead>,
    config: TraversalConfig,
) -> UncertaintyRun {
    MeasureUncertainty::new(reference.clone(), config)
        .measure(&[ReadSet::new("test", reads)])
        .expect("measurement succeeds")
}

/// Measure a single read set with the default configuration.
pub fn measure(reference: &ReferenceGenome, reads: Vec<AlignedRead>) -> UncertaintyRun {
    measure_with(reference, reads, TraversalConfig::default())
}

/// Counts at a position in column order, all zero when the position is absent.
pub fn counts_at(table: &UncertaintyTable, chrom: &str, offset: u32) -> [u64; 7] {
    table
        .get(&Position::new(chrom, offset))
        .map(|counts| *counts.as_array())
        .unwrap_or([0; 7])
}
