use anyhow::{bail, Context, Result};
use rust_htslib::bam::{self, Read};
use rust_htslib::faidx;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, trace};

use super::{AlignedRead, CigarOp, ReadSet, ReferenceGenome, Region};

/// Why a BAM/CRAM record does not enter the pileup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rejection {
    Unmapped,
    Secondary,
    Duplicate,
    QcFail,
    NoBases,
}

/// Load every sequence of a FASTA reference through its `.fai` index.
///
/// htslib builds the index next to the FASTA when it is missing.
pub fn load_reference(path: &Path) -> Result<ReferenceGenome> {
    let reader = faidx::Reader::from_path(path)
        .with_context(|| format!("failed to open reference {}", path.display()))?;
    let names = reader
        .seq_names()
        .with_context(|| format!("failed to list sequences of {}", path.display()))?;

    let mut reference = ReferenceGenome::new();
    for name in names {
        let len = reader.fetch_seq_len(&name);
        if len == 0 {
            debug!(sequence = %name, "skipping empty reference sequence");
            continue;
        }
        let end = usize::try_from(len - 1)
            .with_context(|| format!("reference sequence {name} is too long"))?;
        let bases = reader
            .fetch_seq_string(&name, 0, end)
            .with_context(|| format!("failed to fetch {name} from {}", path.display()))?;
        reference.insert(name, bases.into_bytes());
    }

    anyhow::ensure!(
        !reference.is_empty(),
        "no sequences found in reference {}",
        path.display()
    );
    Ok(reference)
}

/// Load one BAM/CRAM file as a read set labelled by its path.
///
/// Unmapped, secondary, duplicate and QC-failed records are dropped, as are
/// records without stored bases. `reference` decodes CRAM and is ignored for BAM.
pub fn load_read_set(path: &Path, reference: &Path) -> Result<ReadSet> {
    let mut reader = bam::Reader::from_path(path)
        .with_context(|| format!("failed to open alignments {}", path.display()))?;
    reader
        .set_reference(reference)
        .with_context(|| format!("failed to attach reference {}", reference.display()))?;

    let names = target_names(reader.header())
        .with_context(|| format!("invalid header in {}", path.display()))?;

    let mut reads = Vec::new();
    let mut rejected = 0usize;
    for (index, record) in reader.records().enumerate() {
        let record = record
            .with_context(|| format!("failed to read record {} of {}", index + 1, path.display()))?;
        match aligned_read(&record, &names)
            .with_context(|| format!("invalid record {} of {}", index + 1, path.display()))?
        {
            Ok(read) => reads.push(read),
            Err(reason) => {
                trace!(read = %String::from_utf8_lossy(record.qname()), ?reason, "record dropped");
                rejected += 1;
            }
        }
    }

    debug!(
        path = %path.display(),
        reads = reads.len(),
        rejected,
        "alignments loaded"
    );
    Ok(ReadSet::new(path.display().to_string(), reads))
}

/// Reference sequence names by target id.
fn target_names(header: &bam::HeaderView) -> Result<Vec<Arc<str>>> {
    header
        .target_names()
        .into_iter()
        .map(|name| {
            std::str::from_utf8(name)
                .map(Arc::from)
                .context("sequence name is not UTF-8")
        })
        .collect()
}

/// Convert one record; filtered records come back as the reason they were dropped.
fn aligned_read(
    record: &bam::Record,
    names: &[Arc<str>],
) -> Result<std::result::Result<AlignedRead, Rejection>> {
    if record.is_unmapped() {
        return Ok(Err(Rejection::Unmapped));
    }
    if record.is_secondary() {
        return Ok(Err(Rejection::Secondary));
    }
    if record.is_duplicate() {
        return Ok(Err(Rejection::Duplicate));
    }
    if record.is_quality_check_failed() {
        return Ok(Err(Rejection::QcFail));
    }

    let chrom = usize::try_from(record.tid())
        .ok()
        .and_then(|tid| names.get(tid))
        .with_context(|| format!("target id {} is not in the header", record.tid()))?;
    let pos = u32::try_from(record.pos() + 1)
        .with_context(|| format!("position {} is out of range", record.pos()))?;
    let cigar: Vec<CigarOp> = record.cigar().iter().map(CigarOp::from).collect();

    let read = AlignedRead::new(
        String::from_utf8_lossy(record.qname()).into_owned(),
        Arc::clone(chrom),
        pos,
        cigar,
        record.seq().as_bytes(),
    )
    .with_mapq(record.mapq());

    if read.is_empty() {
        return Ok(Err(Rejection::NoBases));
    }
    Ok(Ok(read))
}

/// Resolve `-L` style arguments: each is either an intervals file or a region string.
pub fn resolve_intervals(arguments: &[String], reference: &ReferenceGenome) -> Result<Vec<Region>> {
    let mut regions = Vec::new();
    for argument in arguments {
        let path = Path::new(argument);
        if path.is_file() {
            regions.extend(load_intervals(path, reference)?);
        } else {
            regions.push(
                Region::resolve(argument, reference)
                    .with_context(|| format!("invalid interval {argument}"))?,
            );
        }
    }
    Ok(regions)
}

/// Load an intervals file.
///
/// `.bed` files hold 0-based half-open `chrom start end` lines. Any other file holds
/// either Picard interval-list rows (`chrom start end ...`, 1-based, `@` header lines)
/// or one region string per line. Blank lines and `#` comments are skipped.
pub fn load_intervals(path: &Path, reference: &ReferenceGenome) -> Result<Vec<Region>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read intervals {}", path.display()))?;
    let bed = path
        .extension()
        .map_or(false, |ext| ext.eq_ignore_ascii_case("bed"));

    let mut regions = Vec::new();
    for (index, line) in text.lines().enumerate() {
        let line = line.trim_end();
        if line.trim().is_empty()
            || line.starts_with('#')
            || line.starts_with('@')
            || (bed && (line.starts_with("track") || line.starts_with("browser")))
        {
            continue;
        }
        let region = interval_line(line, bed, reference)
            .with_context(|| format!("line {} of {}", index + 1, path.display()))?;
        regions.push(region);
    }

    debug!(path = %path.display(), intervals = regions.len(), "intervals loaded");
    Ok(regions)
}

fn interval_line(line: &str, bed: bool, reference: &ReferenceGenome) -> Result<Region> {
    let fields: Vec<&str> = line.split('\t').collect();
    let bounds = match fields.as_slice() {
        [name, start, end, ..] => start
            .trim()
            .parse::<u32>()
            .ok()
            .zip(end.trim().parse::<u32>().ok())
            .map(|bounds| (*name, bounds)),
        _ => None,
    };

    let region = match (bounds, bed) {
        (Some((name, (start, end))), true) => {
            if end <= start {
                bail!("empty BED interval {line}");
            }
            Region::new(name, start + 1, Some(end))?
        }
        (Some((name, (start, end))), false) => Region::new(name, start, Some(end))?,
        (None, true) => bail!("expected `chrom start end` in BED line {line}"),
        (None, false) => return Ok(Region::resolve(line, reference)?),
    };

    if reference.sequence_len(&region.sequence).is_none() {
        bail!("sequence {} is not in the reference", region.sequence);
    }
    Ok(region)
}
