use std::collections::BTreeMap;
use std::iter::Peekable;
use std::sync::Arc;
use std::vec;

use tracing::{debug, trace, warn};

use super::{AlignedRead, CigarOpKind, Position, ReadObservation, ReadSet, ReferenceGenome, Region};
use crate::UncertaintyError;

/// Default number of reference positions piled up per window.
pub const DEFAULT_WINDOW_LEN: u32 = 1 << 20;

/// What a read has at a reference position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlignedBase {
    /// A base call from the read.
    Base(u8),
    /// The read deletes the position.
    Deleted,
}

/// One read's state at one reference position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadState {
    /// Read identifier.
    pub read: Arc<str>,
    /// Base call or deletion.
    pub call: AlignedBase,
    /// An insertion immediately follows this position in the read.
    pub insertion_after: bool,
}

impl ReadState {
    /// Observations carried by this state: the base call or deletion, then
    /// the trailing insertion if any.
    pub fn observations(&self) -> impl Iterator<Item = ReadObservation> {
        let primary = match self.call {
            AlignedBase::Base(base) => ReadObservation::Called(base),
            AlignedBase::Deleted => ReadObservation::Deleted,
        };
        std::iter::once(primary).chain(
            self.insertion_after
                .then_some(ReadObservation::InsertionAfter),
        )
    }
}

/// A reference position with the reference base and the overlapping reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locus {
    /// Position of the locus.
    pub position: Position,
    /// Reference base, `None` when the reference does not cover the position.
    pub reference_base: Option<u8>,
    /// States of the reads overlapping the position.
    pub reads: Vec<ReadState>,
}

/// Read filtering, interval restriction and window length used while building loci.
#[derive(Debug, Clone)]
pub struct PileupOptions {
    /// Reads with lower mapping quality are dropped.
    pub min_mapq: u8,
    /// When non-empty, only positions inside one of these regions are kept.
    pub regions: Vec<Region>,
    /// Reference positions covered by one window of loci.
    pub window_len: u32,
}

impl Default for PileupOptions {
    fn default() -> Self {
        Self {
            min_mapq: 0,
            regions: Vec::new(),
            window_len: DEFAULT_WINDOW_LEN,
        }
    }
}

impl PileupOptions {
    fn keeps(&self, position: &Position) -> bool {
        self.regions.is_empty() || self.regions.iter().any(|r| r.contains(position))
    }
}

#[derive(Debug)]
struct ActiveRead {
    states: Peekable<vec::IntoIter<(u32, ReadState)>>,
    used: bool,
}

/// Streams loci one window at a time over position-sorted reads.
///
/// A window is a stretch of at most `window_len` positions on one sequence.
/// Only reads overlapping the current window hold their per-position states,
/// so memory follows coverage depth and window length, not total input.
/// Windows come out in ascending position order and never share a position.
#[derive(Debug)]
pub struct PileupWindows<'a> {
    reference: &'a ReferenceGenome,
    options: &'a PileupOptions,
    pending: Vec<&'a AlignedRead>,
    next: usize,
    active: Vec<ActiveRead>,
    sequence: Option<Arc<str>>,
    reads_used: u64,
    filtered_reads: u64,
}

impl<'a> PileupWindows<'a> {
    /// Filter and sort the reads of every read set; all read sets pool into the same loci.
    pub fn new(
        read_sets: &'a [ReadSet],
        reference: &'a ReferenceGenome,
        options: &'a PileupOptions,
    ) -> Self {
        for region in &options.regions {
            if reference.sequence_len(&region.sequence).is_none() {
                warn!(%region, "region names a sequence absent from the reference");
            }
        }

        let mut pending = Vec::new();
        let mut filtered_reads = 0u64;
        for read_set in read_sets {
            debug!(label = %read_set.label, reads = read_set.reads.len(), "piling up read set");
            for read in &read_set.reads {
                if read.mapq() < options.min_mapq {
                    trace!(read = %read.name, mapq = read.mapq(), "filtered by mapping quality");
                    filtered_reads += 1;
                    continue;
                }
                pending.push(read);
            }
        }
        pending.sort_by(|a, b| a.chrom.cmp(&b.chrom).then(a.pos.cmp(&b.pos)));

        Self {
            reference,
            options,
            pending,
            next: 0,
            active: Vec::new(),
            sequence: None,
            reads_used: 0,
            filtered_reads,
        }
    }

    /// Reads that contributed at least one locus so far.
    pub fn reads_used(&self) -> u64 {
        self.reads_used
    }

    /// Reads dropped by the mapping quality filter.
    pub fn filtered_reads(&self) -> u64 {
        self.filtered_reads
    }

    fn window_start(&mut self) -> Option<u32> {
        let next_read = self.pending.get(self.next).copied();
        let active_start = self
            .active
            .iter_mut()
            .filter_map(|read| read.states.peek().map(|(offset, _)| *offset))
            .min();

        match (active_start, next_read) {
            (Some(offset), Some(read)) if self.sequence.as_deref() == Some(&*read.chrom) => {
                Some(offset.min(read.pos))
            }
            (Some(offset), _) => Some(offset),
            (None, Some(read)) => {
                self.sequence = Some(Arc::clone(&read.chrom));
                Some(read.pos)
            }
            (None, None) => None,
        }
    }
}

impl Iterator for PileupWindows<'_> {
    type Item = Result<Vec<Locus>, UncertaintyError>;

    fn next(&mut self) -> Option<Self::Item> {
        let window_len = self.options.window_len.max(1);

        loop {
            let start = self.window_start()?;
            let sequence = Arc::clone(self.sequence.as_ref()?);
            let end = start.saturating_add(window_len - 1);

            while let Some(read) = self.pending.get(self.next).copied() {
                if read.chrom != sequence || read.pos > end {
                    break;
                }
                self.next += 1;
                let states = match read_states(read) {
                    Ok(states) => states,
                    Err(err) => return Some(Err(err)),
                };
                if !states.is_empty() {
                    self.active.push(ActiveRead {
                        states: states.into_iter().peekable(),
                        used: false,
                    });
                }
            }

            let mut columns: BTreeMap<u32, Vec<ReadState>> = BTreeMap::new();
            for active in &mut self.active {
                while let Some((offset, state)) =
                    active.states.next_if(|(offset, _)| *offset <= end)
                {
                    let position = Position {
                        sequence: Arc::clone(&sequence),
                        offset,
                    };
                    if self.options.keeps(&position) {
                        columns.entry(offset).or_default().push(state);
                        active.used = true;
                    }
                }
            }

            let reads_used = &mut self.reads_used;
            self.active.retain_mut(|active| {
                let live = active.states.peek().is_some();
                if !live && active.used {
                    *reads_used += 1;
                }
                live
            });

            if columns.is_empty() {
                continue;
            }
            trace!(%sequence, start, end, loci = columns.len(), "window piled up");

            let loci = columns
                .into_iter()
                .map(|(offset, reads)| {
                    let position = Position {
                        sequence: Arc::clone(&sequence),
                        offset,
                    };
                    Locus {
                        reference_base: self.reference.base_at(&position),
                        position,
                        reads,
                    }
                })
                .collect();
            return Some(Ok(loci));
        }
    }
}

/// Ordered loci built from one or more read sets.
#[derive(Debug, Clone, Default)]
pub struct Pileup {
    /// Loci in ascending position order; each has at least one read.
    pub loci: Vec<Locus>,
    /// Reads that contributed at least one locus.
    pub reads_used: u64,
    /// Reads dropped by the mapping quality filter.
    pub filtered_reads: u64,
}

impl Pileup {
    /// Collect every window of [`PileupWindows`] into one list of loci.
    pub fn build(
        read_sets: &[ReadSet],
        reference: &ReferenceGenome,
        options: &PileupOptions,
    ) -> Result<Self, UncertaintyError> {
        let mut windows = PileupWindows::new(read_sets, reference, options);
        let mut loci = Vec::new();
        for window in windows.by_ref() {
            loci.extend(window?);
        }

        Ok(Self {
            loci,
            reads_used: windows.reads_used(),
            filtered_reads: windows.filtered_reads(),
        })
    }
}

/// Per-position states of one read, in reference order.
///
/// Insertions mark the last reference position the read consumed; an
/// insertion with no such position (leading, or right after a skip) has no
/// anchor and is dropped.
pub fn read_states(read: &AlignedRead) -> Result<Vec<(u32, ReadState)>, UncertaintyError> {
    let invalid = |reason: String| UncertaintyError::InvalidAlignment {
        read: read.name.to_string(),
        sequence: read.chrom.to_string(),
        offset: read.pos,
        reason,
    };

    if read.cigar.is_empty() {
        return Ok(Vec::new());
    }
    if read.pos == 0 {
        return Err(invalid("offsets are 1-based".to_string()));
    }
    if read.cigar_read_len() != read.len() {
        return Err(invalid(format!(
            "CIGAR expects {} bases, read has {}",
            read.cigar_read_len(),
            read.len()
        )));
    }
    let span = read.reference_span();
    if span > 0 && u64::from(read.pos) + span - 1 > u64::from(u32::MAX) {
        return Err(invalid(format!(
            "alignment spans {span} positions and runs past the largest offset"
        )));
    }

    // Only aligned bases are bounded by the read; skips add no states.
    let mut states: Vec<(u32, ReadState)> = Vec::with_capacity(read.len());
    // Stays within `u32` for every pushed state, by the span check above.
    let mut ref_offset = u64::from(read.pos);
    let mut read_offset = 0usize;

    for op in &read.cigar {
        match op.kind {
            CigarOpKind::Match => {
                for base in &read.sequence[read_offset..read_offset + op.len as usize] {
                    states.push((ref_offset as u32, state(read, AlignedBase::Base(*base))));
                    ref_offset += 1;
                }
                read_offset += op.len as usize;
            }
            CigarOpKind::Deletion => {
                for _ in 0..op.len {
                    states.push((ref_offset as u32, state(read, AlignedBase::Deleted)));
                    ref_offset += 1;
                }
            }
            CigarOpKind::Skip => ref_offset += u64::from(op.len),
            CigarOpKind::Insertion => {
                match states.last_mut() {
                    Some((anchor, last)) if u64::from(*anchor) + 1 == ref_offset => {
                        last.insertion_after = true;
                    }
                    _ => trace!(read = %read.name, offset = ref_offset, "unanchored insertion"),
                }
                read_offset += op.len as usize;
            }
            CigarOpKind::SoftClip => read_offset += op.len as usize,
            CigarOpKind::HardClip | CigarOpKind::Padding => {}
        }
    }

    Ok(states)
}

fn state(read: &AlignedRead, call: AlignedBase) -> ReadState {
    ReadState {
        read: Arc::clone(&read.name),
        call,
        insertion_after: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genomics::types::cigar;

    fn read(name: &str, pos: u32, cigar_text: &str, bases: &[u8]) -> AlignedRead {
        AlignedRead::new(name, "chr1", pos, cigar(cigar_text), bases.to_vec())
    }

    fn calls(states: &[(u32, ReadState)]) -> Vec<(u32, AlignedBase, bool)> {
        states
            .iter()
            .map(|(offset, s)| (*offset, s.call, s.insertion_after))
            .collect()
    }

    #[test]
    fn walks_matches_deletions_and_insertions() {
        let states = read_states(&read("r1", 5, "1S2M1I1M2D1M", b"TACGTA")).unwrap();
        assert_eq!(
            calls(&states),
            vec![
                (5, AlignedBase::Base(b'A'), false),
                (6, AlignedBase::Base(b'C'), true),
                (7, AlignedBase::Base(b'T'), false),
                (8, AlignedBase::Deleted, false),
                (9, AlignedBase::Deleted, false),
                (10, AlignedBase::Base(b'A'), false),
            ]
        );
    }

    #[test]
    fn insertion_after_deletion_anchors_on_deleted_position() {
        let states = read_states(&read("r1", 1, "1M1D1I1M", b"AGT")).unwrap();
        assert_eq!(
            calls(&states),
            vec![
                (1, AlignedBase::Base(b'A'), false),
                (2, AlignedBase::Deleted, true),
                (3, AlignedBase::Base(b'T'), false),
            ]
        );
    }

    #[test]
    fn unanchored_insertions_and_skips_produce_no_states() {
        let states = read_states(&read("r1", 3, "2I1M3N1I1M", b"GGACA")).unwrap();
        assert_eq!(
            calls(&states),
            vec![
                (3, AlignedBase::Base(b'A'), false),
                (7, AlignedBase::Base(b'A'), false),
            ]
        );
    }

    #[test]
    fn long_skip_only_yields_the_aligned_bases() {
        let states = read_states(&read("spliced", 1, "1M3500000000N1M", b"AC")).unwrap();
        assert_eq!(
            calls(&states),
            vec![
                (1, AlignedBase::Base(b'A'), false),
                (3_500_000_002, AlignedBase::Base(b'C'), false),
            ]
        );
    }

    #[test]
    fn alignment_past_the_largest_offset_is_rejected() {
        let result = read_states(&read("r1", 1, "1M4294967295N4294967295N1M", b"AC"));
        assert!(matches!(result, Err(UncertaintyError::InvalidAlignment { .. })));

        let result = read_states(&read("r1", u32::MAX, "2M", b"AC"));
        assert!(matches!(result, Err(UncertaintyError::InvalidAlignment { .. })));

        let last = read_states(&read("r1", u32::MAX, "1M", b"A")).unwrap();
        assert_eq!(calls(&last), vec![(u32::MAX, AlignedBase::Base(b'A'), false)]);
    }

    #[test]
    fn rejects_inconsistent_alignments() {
        assert!(matches!(
            read_states(&read("r1", 1, "4M", b"ACG")),
            Err(UncertaintyError::InvalidAlignment { .. })
        ));
        assert!(matches!(
            read_states(&read("r1", 0, "1M", b"A")),
            Err(UncertaintyError::InvalidAlignment { .. })
        ));
        let unaligned = AlignedRead::new("r1", "chr1", 1, Vec::new(), Vec::new());
        assert!(read_states(&unaligned).unwrap().is_empty());
    }

    #[test]
    fn observations_list_insertion_after_call() {
        let state = ReadState {
            read: Arc::from("r"),
            call: AlignedBase::Base(b'G'),
            insertion_after: true,
        };
        let observed: Vec<_> = state.observations().collect();
        assert_eq!(
            observed,
            vec![ReadObservation::Called(b'G'), ReadObservation::InsertionAfter]
        );
    }

    #[test]
    fn build_pools_read_sets_and_applies_options() {
        let mut reference = ReferenceGenome::new();
        reference.insert("chr1", b"ACGTACGT".to_vec());

        let sets = vec![
            ReadSet::new("a", vec![read("a1", 1, "4M", b"ACGT")]),
            ReadSet::new(
                "b",
                vec![
                    read("b1", 3, "4M", b"GTAC"),
                    read("b2", 1, "2M", b"AC").with_mapq(3),
                ],
            ),
        ];
        let options = PileupOptions {
            min_mapq: 10,
            regions: vec!["chr1:2-5".parse().unwrap()],
            ..PileupOptions::default()
        };

        let pileup = Pileup::build(&sets, &reference, &options).unwrap();
        let depth: Vec<(u32, usize)> = pileup
            .loci
            .iter()
            .map(|l| (l.position.offset, l.reads.len()))
            .collect();
        assert_eq!(depth, vec![(2, 1), (3, 2), (4, 2), (5, 1)]);
        assert_eq!(pileup.loci[0].reference_base, Some(b'C'));
        assert_eq!(pileup.reads_used, 2);
        assert_eq!(pileup.filtered_reads, 1);
    }

    #[test]
    fn loci_beyond_reference_have_no_base() {
        let mut reference = ReferenceGenome::new();
        reference.insert("chr1", b"AC".to_vec());
        let sets = vec![ReadSet::new("a", vec![read("a1", 2, "2M", b"CA")])];

        let pileup = Pileup::build(&sets, &reference, &PileupOptions::default()).unwrap();
        assert_eq!(pileup.loci.len(), 2);
        assert_eq!(pileup.loci[0].reference_base, Some(b'C'));
        assert_eq!(pileup.loci[1].reference_base, None);
    }

    #[test]
    fn window_length_does_not_change_the_loci() {
        let mut reference = ReferenceGenome::new();
        reference.insert("chr1", b"ACGTACGTACGT".to_vec());
        reference.insert("chr2", b"GGGG".to_vec());
        let sets = vec![ReadSet::new(
            "a",
            vec![
                read("r3", 6, "3M2D2M", b"CGTGT"),
                AlignedRead::new("r4", "chr2", 2, cigar("2M"), b"GG".to_vec()),
                read("r1", 1, "5M", b"ACGTA"),
                read("r2", 3, "2M1I2M", b"GTTAC"),
            ],
        )];

        let whole = Pileup::build(&sets, &reference, &PileupOptions::default()).unwrap();
        for window_len in [1, 2, 3, 5] {
            let options = PileupOptions {
                window_len,
                ..PileupOptions::default()
            };
            let windowed = Pileup::build(&sets, &reference, &options).unwrap();
            assert_eq!(windowed.loci, whole.loci, "window length {window_len}");
            assert_eq!(windowed.reads_used, 4);
        }
        let offsets: Vec<String> = whole.loci.iter().map(|l| l.position.to_string()).collect();
        assert_eq!(offsets.first().map(String::as_str), Some("chr1:1"));
        assert_eq!(offsets.last().map(String::as_str), Some("chr2:3"));
    }

    #[test]
    fn windows_jump_over_long_skips() {
        let reference = ReferenceGenome::new();
        let sets = vec![ReadSet::new(
            "a",
            vec![read("spliced", 1, "1M3500000000N1M", b"AC")],
        )];
        let options = PileupOptions {
            window_len: 10,
            ..PileupOptions::default()
        };

        let mut windows = PileupWindows::new(&sets, &reference, &options);
        let offsets: Vec<Vec<u32>> = windows
            .by_ref()
            .map(|window| {
                window
                    .unwrap()
                    .iter()
                    .map(|locus| locus.position.offset)
                    .collect()
            })
            .collect();
        assert_eq!(offsets, vec![vec![1], vec![3_500_000_002]]);
        assert_eq!(windows.reads_used(), 1);
    }
}
