//! The per-read decisions of demultiplexing, and the loop that applies them to an input file.
//!
//! For each read pair (or single read) the barcode/UMI prefix of mate 1 is checked for quality,
//! the barcode is looked up, the sample resolved for the file's [`RunContext`], and the output
//! read is trimmed, tagged with the UMI, and written.  Every read ends in exactly one
//! [`Classification`].

use std::path::Path;

use anyhow::{Context, Result};
use fgoxide::io::Io;
use log::{debug, info};
use seq_io::fastq::{self, OwnedRecord};

use crate::{
    barcode_table::BarcodeTable,
    errors::DemuxError,
    metrics::{Counters, UNDETERMINED_NAME, UNQUALIFIED_NAME},
    naming::{NamingConvention, RunContext},
    output_router::{Mate, OutputRouter, Route},
    read_name::{ids_match, read_id, umi_tagged_id},
    sample_index::{SampleIndex, SampleInfo},
    utils::s,
};

/// Progress is logged every time this many reads have been processed from a file.
pub const PROGRESS_INTERVAL: usize = 100_000;

/// The offset of Phred+33 encoded base qualities.
const PHRED_OFFSET: u8 = 33;

/// The minimum base quality allowed in the barcode/UMI prefix.
pub const DEFAULT_MIN_QUALITY: u8 = 10;
/// The default UMI length.
pub const DEFAULT_UMI_LENGTH: usize = 0;
/// The default cell barcode length.
pub const DEFAULT_BARCODE_LENGTH: usize = 8;
/// The default length reads are trimmed to before being written.
pub const DEFAULT_TRIM_LENGTH: usize = 35;

/// Helper struct to hold the parameters that are used by the demultiplexers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DemuxConfig {
    /// Pairs with any base quality below this in the UMI and barcode prefix of mate 1 are
    /// `unqualified`.
    pub min_quality: u8,
    /// The number of UMI bases at the start of mate 1.
    pub umi_length: usize,
    /// The number of cell barcode bases following the UMI.
    pub barcode_length: usize,
    /// Written reads are truncated to at most this many bases.
    pub trim_length: usize,
}

impl DemuxConfig {
    /// The length of the UMI plus the barcode.
    pub fn prefix_len(&self) -> usize {
        self.umi_length + self.barcode_length
    }

    /// True if `qual` covers the prefix and no base of the prefix is below the minimum quality.
    fn passes_quality_gate(&self, qual: &[u8]) -> bool {
        let prefix_len = self.prefix_len();
        qual.len() >= prefix_len
            && qual[..prefix_len].iter().all(|q| q.saturating_sub(PHRED_OFFSET) >= self.min_quality)
    }
}

impl Default for DemuxConfig {
    fn default() -> Self {
        Self {
            min_quality: DEFAULT_MIN_QUALITY,
            umi_length: DEFAULT_UMI_LENGTH,
            barcode_length: DEFAULT_BARCODE_LENGTH,
            trim_length: DEFAULT_TRIM_LENGTH,
        }
    }
}

/// The outcome of demultiplexing a single read pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification<'a> {
    /// The barcode/UMI prefix was too short or of too low quality.
    Unqualified,
    /// The barcode is unknown, or no sample uses it for this run.
    Undetermined,
    /// The pair belongs to this sample.
    Sample(&'a SampleInfo),
}

impl<'a> Classification<'a> {
    /// The name this outcome is counted under.
    pub fn label(&self) -> &'a str {
        match *self {
            Classification::Unqualified => UNQUALIFIED_NAME,
            Classification::Undetermined => UNDETERMINED_NAME,
            Classification::Sample(sample) => sample.id.as_str(),
        }
    }
}

/// Decides which [`Classification`] a read belongs to.
#[derive(Debug, Clone, Copy)]
pub struct Classifier<'a> {
    barcodes: &'a BarcodeTable,
    config: DemuxConfig,
}

impl<'a> Classifier<'a> {
    pub fn new(barcodes: &'a BarcodeTable, config: DemuxConfig) -> Self {
        Self { barcodes, config }
    }

    /// Classify a read by the UMI and barcode prefix of `mate1`.  `mate2_qual`, if given, must
    /// also cover the prefix for the pair to qualify.
    pub fn classify<'s>(
        &self,
        mate1: &OwnedRecord,
        mate2_qual: Option<&[u8]>,
        context: &RunContext,
        samples: &'s SampleIndex,
    ) -> Classification<'s> {
        let prefix_len = self.config.prefix_len();
        if !self.config.passes_quality_gate(&mate1.qual)
            || mate2_qual.map_or(false, |qual| qual.len() < prefix_len)
        {
            return Classification::Unqualified;
        }

        let barcode = &mate1.seq[self.config.umi_length..prefix_len];
        self.barcodes
            .lookup(barcode)
            .and_then(|barcode_id| {
                samples.resolve(
                    &context.flowcell,
                    &context.lane,
                    &context.illumina_index,
                    barcode_id,
                )
            })
            .map_or(Classification::Undetermined, Classification::Sample)
    }

    /// The UMI bases of a read that passed the quality gate.
    fn umi<'r>(&self, mate1: &'r OwnedRecord) -> &'r [u8] {
        &mate1.seq[..self.config.umi_length]
    }

    /// Truncate the read to the trim length and, when UMIs are in use, tag its name with `umi`.
    fn finish_read(&self, mut read: OwnedRecord, umi: &[u8]) -> OwnedRecord {
        trim_record(&mut read, self.config.trim_length);
        if self.config.umi_length > 0 {
            read.head = umi_tagged_id(&read.head, umi);
        }
        read
    }
}

/// Truncate the bases and qualities of a record to at most `length`.
pub fn trim_record(record: &mut OwnedRecord, length: usize) {
    record.seq.truncate(length);
    record.qual.truncate(length);
}

/// Open a FASTQ (plain or compressed) and iterate over its records.
fn fastq_records(
    path: &Path,
) -> Result<impl Iterator<Item = Result<OwnedRecord, fastq::Error>>> {
    let io = Io::default();
    let reader =
        io.new_reader(&path).with_context(|| format!("Failed to open {}", path.display()))?;
    Ok(fastq::Reader::new(reader).into_records())
}

/// Read the first record of an input, returning it with the remaining records, or `None` if the
/// input is empty.
fn first_record<I>(mut records: I, path: &Path) -> Result<Option<(OwnedRecord, I)>>
where
    I: Iterator<Item = Result<OwnedRecord, fastq::Error>>,
{
    match records.next() {
        None => Ok(None),
        Some(first) => {
            let first = first.with_context(|| format!("Failed to read {}", path.display()))?;
            Ok(Some((first, records)))
        }
    }
}

fn log_progress(processed: usize, path: &Path) {
    if processed % PROGRESS_INTERVAL == 0 {
        info!("Processed {} reads from {}", processed, path.display());
    }
}

/// A trait that defines what is necessary to demultiplex an input file.
pub trait Demultiplex {
    /// Demultiplex the reads of the given mate 1 file (and its mate 2, if used) into `router`,
    /// returning the counts for this file.  `samples` is the full sample index; only the entries
    /// for the file's run are used.
    fn demultiplex_file(
        &self,
        mate1: &Path,
        samples: &SampleIndex,
        router: &mut OutputRouter,
    ) -> Result<Counters>;
}

/// Resolves the run context of an input from its first record and narrows the sample index to
/// it.  Returns `None` if no sample uses this run.
fn samples_for_input<N: NamingConvention>(
    naming: &N,
    mate1: &Path,
    first: &OwnedRecord,
    samples: &SampleIndex,
) -> Result<Option<(RunContext, SampleIndex)>> {
    let context = naming.run_context(mate1, &first.head)?;
    let filtered = samples.filter_for(&context.flowcell, &context.lane, &context.illumina_index);
    if filtered.is_empty() {
        info!(
            "No samples for flowcell {}, lane {}, index {}; skipping {}",
            context.flowcell,
            context.lane,
            context.illumina_index,
            mate1.display()
        );
        return Ok(None);
    }
    debug!(
        "{} sample keys for flowcell {}, lane {}, index {}",
        filtered.len(),
        context.flowcell,
        context.lane,
        context.illumina_index
    );
    Ok(Some((context, filtered)))
}

/// Demultiplexes paired-end reads: the barcode is read from mate 1 and mate 2 is written out.
#[derive(Debug)]
pub struct PairedEndDemultiplexer<'a, N: NamingConvention> {
    classifier: Classifier<'a>,
    naming: N,
}

impl<'a, N: NamingConvention> PairedEndDemultiplexer<'a, N> {
    pub fn new(barcodes: &'a BarcodeTable, config: DemuxConfig, naming: N) -> Self {
        Self { classifier: Classifier::new(barcodes, config), naming }
    }

    /// Demultiplex a single read pair, writing it to `router`.
    ///
    /// Undetermined pairs are written to the undetermined outputs: mate 1 as is, mate 2 trimmed.
    /// Unqualified pairs are not written.
    ///
    /// # Errors
    ///
    /// - [`DemuxError::DataIntegrity`] if the read names of the mates differ
    /// - [`DemuxError::Io`] if a write fails
    pub fn demultiplex_pair<'s>(
        &self,
        mate1: OwnedRecord,
        mate2: OwnedRecord,
        context: &RunContext,
        samples: &'s SampleIndex,
        router: &mut OutputRouter,
    ) -> Result<Classification<'s>, DemuxError> {
        if !ids_match(&mate1.head, &mate2.head) {
            return Err(DemuxError::DataIntegrity {
                mate1: s(read_id(&mate1.head)),
                mate2: s(read_id(&mate2.head)),
            });
        }

        let classification = self.classifier.classify(&mate1, Some(&mate2.qual), context, samples);
        match classification {
            Classification::Unqualified => (),
            Classification::Undetermined => {
                let mut mate2 = mate2;
                trim_record(&mut mate2, self.classifier.config.trim_length);
                router.write(Route::Undetermined(Mate::One), &mate1)?;
                router.write(Route::Undetermined(Mate::Two), &mate2)?;
            }
            Classification::Sample(sample) => {
                let mate2 = self.classifier.finish_read(mate2, self.classifier.umi(&mate1));
                router.write(Route::Sample(sample), &mate2)?;
            }
        }
        Ok(classification)
    }

    /// Demultiplex mate 1 and mate 2 records in lockstep.
    ///
    /// # Errors
    ///
    /// - [`DemuxError::UnevenMates`] if one input runs out of records before the other
    /// - any error of [`Self::demultiplex_pair`] or of reading the records
    pub fn demultiplex_records<I1, I2>(
        &self,
        mate1s: I1,
        mate2s: I2,
        paths: (&Path, &Path),
        context: &RunContext,
        samples: &SampleIndex,
        router: &mut OutputRouter,
    ) -> Result<Counters>
    where
        I1: IntoIterator<Item = Result<OwnedRecord, fastq::Error>>,
        I2: IntoIterator<Item = Result<OwnedRecord, fastq::Error>>,
    {
        let (path1, path2) = paths;
        let mut counters = Counters::new();
        let mut mate2s = mate2s.into_iter();
        let mut processed = 0;
        for mate1 in mate1s {
            let mate1 = mate1.with_context(|| format!("Failed to read {}", path1.display()))?;
            let mate2 = match mate2s.next() {
                Some(mate2) => {
                    mate2.with_context(|| format!("Failed to read {}", path2.display()))?
                }
                None => return Err(DemuxError::UnevenMates { path: path2.to_path_buf() }.into()),
            };
            let classification =
                self.demultiplex_pair(mate1, mate2, context, samples, router)?;
            counters.increment(classification.label());
            processed += 1;
            log_progress(processed, path1);
        }
        if mate2s.next().is_some() {
            return Err(DemuxError::UnevenMates { path: path1.to_path_buf() }.into());
        }
        Ok(counters)
    }
}

impl<'a, N: NamingConvention> Demultiplex for PairedEndDemultiplexer<'a, N> {
    fn demultiplex_file(
        &self,
        mate1: &Path,
        samples: &SampleIndex,
        router: &mut OutputRouter,
    ) -> Result<Counters> {
        let pair = self.naming.input_pair(mate1)?;
        info!("Demultiplexing {} and {}", pair.mate1.display(), pair.mate2.display());

        let mut mate2s = fastq_records(&pair.mate2)?;
        let (first, mate1s) = match first_record(fastq_records(&pair.mate1)?, &pair.mate1)? {
            Some(records) => records,
            None => {
                if mate2s.next().is_some() {
                    return Err(DemuxError::UnevenMates { path: pair.mate1 }.into());
                }
                info!("{} is empty, skipping", pair.mate1.display());
                return Ok(Counters::new());
            }
        };
        let (context, samples) = match samples_for_input(&self.naming, mate1, &first, samples)? {
            Some(found) => found,
            None => return Ok(Counters::new()),
        };

        self.demultiplex_records(
            std::iter::once(Ok(first)).chain(mate1s),
            mate2s,
            (&pair.mate1, &pair.mate2),
            &context,
            &samples,
            router,
        )
    }
}

/// Demultiplexes single-end reads: the barcode is read from the read itself, and the read is
/// written out with the UMI and barcode removed.
#[derive(Debug)]
pub struct SingleEndDemultiplexer<'a, N: NamingConvention> {
    classifier: Classifier<'a>,
    naming: N,
}

impl<'a, N: NamingConvention> SingleEndDemultiplexer<'a, N> {
    pub fn new(barcodes: &'a BarcodeTable, config: DemuxConfig, naming: N) -> Self {
        Self { classifier: Classifier::new(barcodes, config), naming }
    }

    /// Demultiplex a single read, writing it to `router`.  Undetermined reads are written
    /// unmodified to the undetermined mate 1 output.
    pub fn demultiplex_read<'s>(
        &self,
        read: OwnedRecord,
        context: &RunContext,
        samples: &'s SampleIndex,
        router: &mut OutputRouter,
    ) -> Result<Classification<'s>, DemuxError> {
        let classification = self.classifier.classify(&read, None, context, samples);
        match classification {
            Classification::Unqualified => (),
            Classification::Undetermined => router.write(Route::Undetermined(Mate::One), &read)?,
            Classification::Sample(sample) => {
                let prefix_len = self.classifier.config.prefix_len();
                let umi = self.classifier.umi(&read).to_vec();
                let clipped = OwnedRecord {
                    head: read.head,
                    seq: read.seq[prefix_len..].to_vec(),
                    qual: read.qual[prefix_len..].to_vec(),
                };
                router.write(Route::Sample(sample), &self.classifier.finish_read(clipped, &umi))?;
            }
        }
        Ok(classification)
    }
}

impl<'a, N: NamingConvention> Demultiplex for SingleEndDemultiplexer<'a, N> {
    fn demultiplex_file(
        &self,
        mate1: &Path,
        samples: &SampleIndex,
        router: &mut OutputRouter,
    ) -> Result<Counters> {
        info!("Demultiplexing {}", mate1.display());
        let (first, reads) = match first_record(fastq_records(mate1)?, mate1)? {
            Some(records) => records,
            None => {
                info!("{} is empty, skipping", mate1.display());
                return Ok(Counters::new());
            }
        };
        let (context, samples) = match samples_for_input(&self.naming, mate1, &first, samples)? {
            Some(found) => found,
            None => return Ok(Counters::new()),
        };

        let mut counters = Counters::new();
        for (processed, read) in std::iter::once(Ok(first)).chain(reads).enumerate() {
            let read = read.with_context(|| format!("Failed to read {}", mate1.display()))?;
            let classification = self.demultiplex_read(read, &context, &samples, router)?;
            counters.increment(classification.label());
            log_progress(processed + 1, mate1);
        }
        Ok(counters)
    }
}
