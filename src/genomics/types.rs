use std::fmt;
use std::sync::Arc;

use rust_htslib::bam::record::Cigar;

/// A single base-pair coordinate on a named reference sequence.
///
/// Offsets are 1-based. Positions order by sequence name first, then offset.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct Position {
    /// Reference sequence name.
    pub sequence: Arc<str>,
    /// 1-based offset on the sequence.
    pub offset: u32,
}

impl Position {
    /// Construct a position.
    pub fn new(sequence: impl Into<Arc<str>>, offset: u32) -> Self {
        Self {
            sequence: sequence.into(),
            offset,
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.sequence, self.offset)
    }
}

/// CIGAR operation kinds describing how a read aligns to the reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CigarOpKind {
    /// Aligned bases, match or mismatch (`M`, `=`, `X`).
    Match,
    /// Insertion relative to the reference (`I`).
    Insertion,
    /// Deletion relative to the reference (`D`).
    Deletion,
    /// Skipped reference region, e.g. an intron (`N`).
    Skip,
    /// Soft clipping (sequence present in read only).
    SoftClip,
    /// Hard clipping (trimmed sequence not present in read).
    HardClip,
    /// Silent padding (`P`).
    Padding,
}

impl CigarOpKind {
    /// Whether the operation advances along the reference.
    pub fn consumes_reference(&self) -> bool {
        matches!(self, Self::Match | Self::Deletion | Self::Skip)
    }

    /// Whether the operation advances along the read bases.
    pub fn consumes_read(&self) -> bool {
        matches!(self, Self::Match | Self::Insertion | Self::SoftClip)
    }
}

/// CIGAR operation with length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CigarOp {
    /// Operation kind.
    pub kind: CigarOpKind,
    /// Number of bases affected by the operation.
    pub len: u32,
}

impl CigarOp {
    /// Construct a new CIGAR operation.
    pub fn new(kind: CigarOpKind, len: u32) -> Self {
        Self { kind, len }
    }
}

impl From<&Cigar> for CigarOp {
    fn from(op: &Cigar) -> Self {
        let kind = match op {
            Cigar::Match(_) | Cigar::Equal(_) | Cigar::Diff(_) => CigarOpKind::Match,
            Cigar::Ins(_) => CigarOpKind::Insertion,
            Cigar::Del(_) => CigarOpKind::Deletion,
            Cigar::RefSkip(_) => CigarOpKind::Skip,
            Cigar::SoftClip(_) => CigarOpKind::SoftClip,
            Cigar::HardClip(_) => CigarOpKind::HardClip,
            Cigar::Pad(_) => CigarOpKind::Padding,
        };
        Self::new(kind, op.len())
    }
}

/// Aligned read with its bases.
#[derive(Debug, Clone)]
pub struct AlignedRead {
    /// Read identifier, used in diagnostics.
    pub name: Arc<str>,
    /// Reference contig/chromosome name.
    pub chrom: Arc<str>,
    /// 1-based leftmost reference offset.
    pub pos: u32,
    /// Mapping quality (Phred-scaled).
    pub mapq: u8,
    /// CIGAR describing the alignment.
    pub cigar: Vec<CigarOp>,
    /// Read bases as ASCII.
    pub sequence: Arc<[u8]>,
}

impl AlignedRead {
    /// Construct a new aligned read with mapping quality 60.
    pub fn new(
        name: impl Into<Arc<str>>,
        chrom: impl Into<Arc<str>>,
        pos: u32,
        cigar: Vec<CigarOp>,
        sequence: impl Into<Arc<[u8]>>,
    ) -> Self {
        Self {
            name: name.into(),
            chrom: chrom.into(),
            pos,
            mapq: 60,
            cigar,
            sequence: sequence.into(),
        }
    }

    /// Set the mapping quality.
    pub fn with_mapq(mut self, mapq: u8) -> Self {
        self.mapq = mapq;
        self
    }

    /// Read length inferred from the sequence.
    pub fn len(&self) -> usize {
        self.sequence.len()
    }

    /// Whether the read carries no bases.
    pub fn is_empty(&self) -> bool {
        self.sequence.is_empty()
    }

    /// Number of reference positions spanned by the alignment, skips included.
    ///
    /// Summed in 64 bits so that several long skips cannot wrap.
    pub fn reference_span(&self) -> u64 {
        self.cigar
            .iter()
            .filter(|op| op.kind.consumes_reference())
            .map(|op| u64::from(op.len))
            .sum()
    }

    /// Number of read bases the CIGAR expects.
    pub fn cigar_read_len(&self) -> usize {
        self.cigar
            .iter()
            .filter(|op| op.kind.consumes_read())
            .map(|op| op.len as usize)
            .sum()
    }

    /// Mapping quality associated with the alignment.
    pub fn mapq(&self) -> u8 {
        self.mapq
    }
}

/// One input set of reads (e.g. one alignment file).
#[derive(Debug, Clone)]
pub struct ReadSet {
    /// Label used in log messages.
    pub label: Arc<str>,
    /// Aligned reads in any order.
    pub reads: Vec<AlignedRead>,
}

impl ReadSet {
    /// Construct a labelled read set.
    pub fn new(label: impl Into<Arc<str>>, reads: Vec<AlignedRead>) -> Self {
        Self {
            label: label.into(),
            reads,
        }
    }
}

#[cfg(test)]
pub(crate) fn cigar(text: &str) -> Vec<CigarOp> {
    use rust_htslib::bam::record::CigarString;

    CigarString::try_from(text)
        .expect("valid CIGAR")
        .iter()
        .map(CigarOp::from)
        .collect()
}
