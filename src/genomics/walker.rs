use std::ops::AddAssign;

use tracing::{debug, info, warn};

use super::{
    Classifier, Locus, PileupOptions, PileupWindows, PositionAggregator, ReadClassifier, ReadSet,
    ReferenceGenome, Region, UncertaintyTable,
};
use crate::framework::{CancellationToken, LocusProcessor, TraversalConfig, TraversalDriver};
use crate::UncertaintyError;

/// Counters describing what a traversal did besides filling the table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TraversalReport {
    /// Loci visited, including excluded ones.
    pub loci_visited: u64,
    /// Observations recorded in the table.
    pub observations: u64,
    /// Observations dropped for an unrecognized base call.
    pub skipped_observations: u64,
    /// Loci excluded because the reference had no base there.
    pub reference_gaps: u64,
    /// Reads dropped by the mapping quality filter.
    pub filtered_reads: u64,
}

impl AddAssign for TraversalReport {
    fn add_assign(&mut self, other: Self) {
        self.loci_visited += other.loci_visited;
        self.observations += other.observations;
        self.skipped_observations += other.skipped_observations;
        self.reference_gaps += other.reference_gaps;
        self.filtered_reads += other.filtered_reads;
    }
}

/// Partial result for a block of loci.
#[derive(Debug, Default)]
pub struct PartialTally {
    /// Counts for the loci folded so far.
    pub aggregator: PositionAggregator,
    /// Counters for the loci folded so far.
    pub report: TraversalReport,
}

/// Finished measurement.
#[derive(Debug)]
pub struct UncertaintyRun {
    /// Per-position counts.
    pub table: UncertaintyTable,
    /// Traversal counters.
    pub report: TraversalReport,
}

/// Folds loci into per-position category counts using a [`Classifier`].
#[derive(Debug, Clone)]
pub struct UncertaintyWalker<C: Classifier = ReadClassifier> {
    classifier: C,
}

impl<C: Classifier> UncertaintyWalker<C> {
    /// Create a walker around a classifier.
    pub fn new(classifier: C) -> Self {
        Self { classifier }
    }
}

impl<C: Classifier> LocusProcessor for UncertaintyWalker<C> {
    type Locus = Locus;
    type Summary = PartialTally;
    type Output = UncertaintyRun;
    type Error = UncertaintyError;

    fn empty(&self) -> PartialTally {
        PartialTally::default()
    }

    fn process_locus(&self, locus: &Locus, tally: &mut PartialTally) -> Result<(), UncertaintyError> {
        tally.report.loci_visited += 1;

        let Some(reference_base) = locus.reference_base else {
            let gap = UncertaintyError::ReferenceGap {
                position: locus.position.clone(),
            };
            warn!(reads = locus.reads.len(), "{gap}; locus excluded");
            tally.report.reference_gaps += 1;
            return Ok(());
        };

        for state in &locus.reads {
            for observation in state.observations() {
                match self.classifier.classify(
                    &locus.position,
                    reference_base,
                    &state.read,
                    observation,
                ) {
                    Ok(category) => {
                        tally.aggregator.observe(&locus.position, category)?;
                        tally.report.observations += 1;
                    }
                    Err(err @ UncertaintyError::UnrecognizedBase { .. }) => {
                        warn!("{err}; observation skipped");
                        tally.report.skipped_observations += 1;
                    }
                    Err(err) => return Err(err),
                }
            }
        }
        Ok(())
    }

    fn merge(&self, left: PartialTally, right: PartialTally) -> Result<PartialTally, UncertaintyError> {
        let mut report = left.report;
        report += right.report;
        Ok(PartialTally {
            aggregator: left.aggregator.merged(right.aggregator)?,
            report,
        })
    }

    fn finalize(&self, mut root: PartialTally) -> Result<UncertaintyRun, UncertaintyError> {
        Ok(UncertaintyRun {
            table: root.aggregator.finalize()?,
            report: root.report,
        })
    }
}

/// Entry point: pile up reads over a reference and measure per-position uncertainty.
#[derive(Debug)]
pub struct MeasureUncertainty<C: Classifier = ReadClassifier> {
    reference: ReferenceGenome,
    config: TraversalConfig,
    options: PileupOptions,
    cancellation: CancellationToken,
    walker: UncertaintyWalker<C>,
}

impl MeasureUncertainty<ReadClassifier> {
    /// Create a measurement with the stock classifier.
    pub fn new(reference: ReferenceGenome, config: TraversalConfig) -> Self {
        Self::with_classifier(reference, config, ReadClassifier::new())
    }
}

impl<C: Classifier + Clone> MeasureUncertainty<C> {
    /// Create a measurement with a custom classifier.
    pub fn with_classifier(reference: ReferenceGenome, config: TraversalConfig, classifier: C) -> Self {
        Self {
            reference,
            config,
            options: PileupOptions::default(),
            cancellation: CancellationToken::new(),
            walker: UncertaintyWalker::new(classifier),
        }
    }

    /// Drop reads below this mapping quality.
    pub fn with_min_mapq(mut self, min_mapq: u8) -> Self {
        self.options.min_mapq = min_mapq;
        self
    }

    /// Restrict traversal to these regions (empty = everything).
    pub fn with_regions(mut self, regions: Vec<Region>) -> Self {
        self.options.regions = regions;
        self
    }

    /// Pile up at most this many reference positions at a time.
    pub fn with_window_size(mut self, window_len: u32) -> Self {
        self.options.window_len = window_len.max(1);
        self
    }

    /// Abandon the traversal when this token is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Measure every read set into a single table.
    ///
    /// Loci are built one window at a time; each window is folded by the
    /// driver and its root summary merged into the running tally.
    pub fn measure(&self, read_sets: &[ReadSet]) -> Result<UncertaintyRun, UncertaintyError> {
        let driver = TraversalDriver::new(self.walker.clone(), self.config.clone())
            .with_cancellation(self.cancellation.clone());
        let mut windows = PileupWindows::new(read_sets, &self.reference, &self.options);

        let mut tally = self.walker.empty();
        let mut num_windows = 0usize;
        let mut num_blocks = 0usize;
        for window in windows.by_ref() {
            let loci = window?;
            let folded = driver.fold(&loci)?;
            debug!(
                window = num_windows,
                loci = folded.loci_visited,
                blocks = folded.num_blocks,
                "window folded"
            );
            num_windows += 1;
            num_blocks += folded.num_blocks;
            tally = self.walker.merge(tally, folded.output)?;
        }

        let mut run = self.walker.finalize(tally)?;
        run.report.filtered_reads = windows.filtered_reads();
        info!(
            reads = windows.reads_used(),
            filtered = run.report.filtered_reads,
            loci_visited = run.report.loci_visited,
            positions = run.table.len(),
            observations = run.report.observations,
            skipped = run.report.skipped_observations,
            reference_gaps = run.report.reference_gaps,
            windows = num_windows,
            blocks = num_blocks,
            "traversal done"
        );
        Ok(run)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genomics::types::cigar;
    use crate::genomics::{AlignedRead, Category, Position, ReadObservation};

    fn reference() -> ReferenceGenome {
        let mut reference = ReferenceGenome::new();
        reference.insert("chr1", b"ACGT".to_vec());
        reference
    }

    fn read(name: &str, pos: u32, cigar_text: &str, bases: &[u8]) -> AlignedRead {
        AlignedRead::new(name, "chr1", pos, cigar(cigar_text), bases.to_vec())
    }

    #[test]
    fn unrecognized_bases_are_skipped_and_counted() {
        let sets = vec![ReadSet::new("s", vec![read("r1", 1, "2M1I1M", b"ANGC")])];
        let run = MeasureUncertainty::new(reference(), TraversalConfig::default())
            .measure(&sets)
            .unwrap();

        assert_eq!(run.report.skipped_observations, 1);
        assert_eq!(run.report.observations, 3);
        let at2 = run.table.get(&Position::new("chr1", 2)).unwrap();
        assert_eq!(at2.as_array(), &[0, 0, 0, 0, 0, 0, 1]);
        assert!(run.table.get(&Position::new("chr1", 3)).is_some());
    }

    #[test]
    fn reference_gaps_exclude_the_locus() {
        let sets = vec![ReadSet::new("s", vec![read("r1", 3, "4M", b"GTAA")])];
        let run = MeasureUncertainty::new(reference(), TraversalConfig::default())
            .measure(&sets)
            .unwrap();

        assert_eq!(run.report.loci_visited, 4);
        assert_eq!(run.report.reference_gaps, 2);
        assert_eq!(run.table.len(), 2);
        assert!(run.table.get(&Position::new("chr1", 5)).is_none());
    }

    #[test]
    fn classifier_errors_other_than_bases_abort() {
        let failing = |position: &Position,
                       _: u8,
                       _: &str,
                       _: ReadObservation|
         -> Result<Category, UncertaintyError> {
            Err(UncertaintyError::ReferenceGap {
                position: position.clone(),
            })
        };
        let sets = vec![ReadSet::new("s", vec![read("r1", 1, "1M", b"A")])];
        let result = MeasureUncertainty::with_classifier(reference(), TraversalConfig::default(), failing)
            .measure(&sets);
        assert!(matches!(result, Err(UncertaintyError::ReferenceGap { .. })));
    }

    #[test]
    fn cancellation_aborts_measurement() {
        let token = CancellationToken::new();
        token.cancel();
        let sets = vec![ReadSet::new("s", vec![read("r1", 1, "4M", b"ACGT")])];
        let result = MeasureUncertainty::new(reference(), TraversalConfig::default())
            .with_cancellation(token)
            .measure(&sets);
        assert!(matches!(
            result,
            Err(UncertaintyError::Framework(crate::FrameworkError::Cancelled))
        ));
    }

    #[test]
    fn window_size_does_not_change_the_run() {
        let sets = vec![ReadSet::new(
            "s",
            vec![
                read("r1", 1, "2M1I2M", b"ACTGT"),
                read("r2", 2, "1M1D2M", b"CTA"),
                read("r3", 3, "3M", b"GTA"),
            ],
        )];
        let config = TraversalConfig::with_block_size(2).unwrap();
        let whole = MeasureUncertainty::new(reference(), config.clone())
            .measure(&sets)
            .unwrap();

        for window_len in [1, 2, 3] {
            let run = MeasureUncertainty::new(reference(), config.clone())
                .with_window_size(window_len)
                .measure(&sets)
                .unwrap();
            assert_eq!(run.table, whole.table);
            assert_eq!(run.report, whole.report);
        }
        assert_eq!(whole.report.loci_visited, 5);
        assert_eq!(whole.report.reference_gaps, 1);
    }

    #[test]
    fn reports_add_fieldwise() {
        let mut a = TraversalReport {
            loci_visited: 1,
            observations: 2,
            skipped_observations: 0,
            reference_gaps: 1,
            filtered_reads: 0,
        };
        a += TraversalReport {
            loci_visited: 3,
            observations: 4,
            skipped_observations: 1,
            reference_gaps: 0,
            filtered_reads: 2,
        };
        assert_eq!(a.loci_visited, 4);
        assert_eq!(a.observations, 6);
        assert_eq!(a.skipped_observations, 1);
        assert_eq!(a.reference_gaps, 1);
        assert_eq!(a.filtered_reads, 2);
    }
}
