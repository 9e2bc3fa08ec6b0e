//! Measuring straight from FASTA and BAM files on disk.

#[path = "common/mod.rs"]
mod common;

use std::fs;
use std::path::Path;

use common::counts_at;
use measure_uncertainty::genomics::io::{load_read_set, load_reference, resolve_intervals};
use measure_uncertainty::genomics::MeasureUncertainty;
use measure_uncertainty::TraversalConfig;
use rust_htslib::bam::{self, header::HeaderRecord, record::CigarString};

const UNMAPPED: u16 = 0x4;
const DUPLICATE: u16 = 0x400;

const SEQUENCES: [(&str, &str); 2] = [("chr1", "ACGTACGTAC"), ("HLA-A*01:01", "GGGG")];

fn write_fasta(path: &Path) {
    let text: String = SEQUENCES
        .iter()
        .map(|(name, bases)| format!(">{name} test\n{bases}\n"))
        .collect();
    fs::write(path, text).expect("write FASTA");
}

fn record(name: &str, tid: i32, pos: i64, cigar: Option<&str>, seq: &[u8], flags: u16) -> bam::Record {
    let cigar = cigar.map(|cigar| CigarString::try_from(cigar).expect("valid CIGAR"));
    let mut record = bam::Record::new();
    record.set(name.as_bytes(), cigar.as_ref(), seq, &vec![30; seq.len()]);
    record.set_tid(tid);
    record.set_pos(pos);
    record.set_mtid(-1);
    record.set_mpos(-1);
    record.set_mapq(40);
    record.set_flags(flags);
    record
}

fn write_bam(path: &Path) {
    let mut header = bam::header::Header::new();
    for (name, bases) in SEQUENCES {
        let mut sq = HeaderRecord::new(b"SQ");
        sq.push_tag(b"SN", &name);
        sq.push_tag(b"LN", &bases.len());
        header.push_record(&sq);
    }

    let mut writer =
        bam::Writer::from_path(path, &header, bam::Format::Bam).expect("open BAM for writing");
    for record in [
        record("r1", 0, 0, Some("4M"), b"ACGA", 0),
        record("r2", 0, 1, Some("1M2D1M"), b"CA", 0),
        record("dup", 0, 0, Some("4M"), b"ACGT", DUPLICATE),
        record("lost", -1, -1, None, b"ACGT", UNMAPPED),
        record("hla", 1, 0, Some("2M1I1M"), b"GGTG", 0),
    ] {
        writer.write(&record).expect("write record");
    }
    // Dropping the writer flushes the BGZF stream.
    drop(writer);
}

#[test]
fn counts_reads_loaded_from_bam() {
    let dir = tempfile::tempdir().unwrap();
    let fasta = dir.path().join("ref.fa");
    let bam_path = dir.path().join("reads.bam");
    write_fasta(&fasta);
    write_bam(&bam_path);

    let reference = load_reference(&fasta).unwrap();
    assert_eq!(reference.sequence_len("chr1"), Some(10));
    assert_eq!(reference.sequence_len("HLA-A*01:01"), Some(4));

    let read_set = load_read_set(&bam_path, &fasta).unwrap();
    assert_eq!(read_set.reads.len(), 3);

    let run = MeasureUncertainty::new(reference, TraversalConfig::default())
        .measure(&[read_set])
        .unwrap();

    assert_eq!(counts_at(&run.table, "chr1", 1), [1, 0, 0, 0, 0, 0, 0]);
    assert_eq!(counts_at(&run.table, "chr1", 2), [2, 0, 0, 0, 0, 0, 0]);
    assert_eq!(counts_at(&run.table, "chr1", 3), [1, 0, 0, 0, 0, 1, 0]);
    assert_eq!(counts_at(&run.table, "chr1", 4), [0, 1, 0, 0, 0, 1, 0]);
    assert_eq!(counts_at(&run.table, "chr1", 5), [1, 0, 0, 0, 0, 0, 0]);
    assert_eq!(counts_at(&run.table, "HLA-A*01:01", 2), [1, 0, 0, 0, 0, 0, 1]);
    assert_eq!(run.table.len(), 8);
}

#[test]
fn colon_bearing_contig_restricts_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let fasta = dir.path().join("ref.fa");
    let bam_path = dir.path().join("reads.bam");
    write_fasta(&fasta);
    write_bam(&bam_path);

    let reference = load_reference(&fasta).unwrap();
    let regions = resolve_intervals(&["HLA-A*01:01".to_string()], &reference).unwrap();
    let read_set = load_read_set(&bam_path, &fasta).unwrap();

    let run = MeasureUncertainty::new(reference, TraversalConfig::default())
        .with_regions(regions)
        .measure(&[read_set])
        .unwrap();

    assert_eq!(run.table.len(), 3);
    assert!(run
        .table
        .iter()
        .all(|(position, _)| position.sequence.as_ref() == "HLA-A*01:01"));
}

#[test]
fn missing_alignment_file_names_the_path() {
    let dir = tempfile::tempdir().unwrap();
    let fasta = dir.path().join("ref.fa");
    write_fasta(&fasta);

    let err = load_read_set(&dir.path().join("absent.bam"), &fasta).unwrap_err();
    assert!(err.to_string().contains("absent.bam"), "{err}");
}
