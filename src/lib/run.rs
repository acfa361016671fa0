use std::path::{Path, PathBuf};

use anyhow::{ensure, Context, Result};
use log::{debug, info, warn};

use crate::{
    barcode_table::BarcodeTable,
    demux::{Demultiplex, PairedEndDemultiplexer, SingleEndDemultiplexer},
    metrics::{StatsAggregator, UNDETERMINED_NAME, UNQUALIFIED_NAME},
    naming::IlluminaNaming,
    opts::Opts,
    output_router::OutputRouter,
    sample_index::{SampleIndex, SampleInfo},
};

/// Run demultiplexing.
///
/// The barcode table and sample sheet are loaded once, every sample output is opened, then each
/// input is demultiplexed in the order given.  The outputs are closed whether or not
/// demultiplexing succeeded.  The statistics table is rewritten after every input, so it reflects
/// the inputs processed so far.
pub fn run(opts: Opts) -> Result<(), anyhow::Error> {
    opts.validate()?;
    let config = opts.as_demux_config();

    info!("Reading barcode table from {}", opts.barcode_table.display());
    let barcodes = BarcodeTable::from_path(&opts.barcode_table)
        .with_context(|| format!("Failed to read {}", opts.barcode_table.display()))?;
    ensure!(!barcodes.is_empty(), "No barcodes found in {}", opts.barcode_table.display());
    match barcodes.barcode_length() {
        Some(length) if length != config.barcode_length => warn!(
            "Barcodes in {} are {}bp but the barcode length is {}bp; no barcodes will match",
            opts.barcode_table.display(),
            length,
            config.barcode_length
        ),
        None => warn!(
            "Barcodes in {} are of unequal lengths; only those of {}bp can match",
            opts.barcode_table.display(),
            config.barcode_length
        ),
        Some(_) => (),
    }

    info!("Reading sample sheet from {}", opts.sample_sheet.display());
    let samples = SampleIndex::from_path(&opts.sample_sheet)
        .with_context(|| format!("Failed to read {}", opts.sample_sheet.display()))?;
    let distinct_samples = samples.distinct_samples();
    info!("Read {} sample keys for {} samples", samples.len(), distinct_samples.len());

    info!("Opening outputs in {}", opts.output_dir.display());
    let mut router = OutputRouter::open(&distinct_samples, &opts.output_dir)?;

    let demultiplexer: Box<dyn Demultiplex + '_> = if opts.single_end {
        info!("Demultiplexing single-end reads");
        Box::new(SingleEndDemultiplexer::new(&barcodes, config, IlluminaNaming))
    } else {
        Box::new(PairedEndDemultiplexer::new(&barcodes, config, IlluminaNaming))
    };

    let mut stats = StatsAggregator::new();
    let stats_path = opts.stats_path();
    let result = demultiplex_inputs(
        demultiplexer.as_ref(),
        &opts.fastqs,
        &samples,
        &distinct_samples,
        &mut router,
        &mut stats,
        &stats_path,
    );
    let closed = router.close();
    result?;
    let summaries = closed.context("Failed to flush and finish writing.")?;
    for summary in summaries {
        debug!("Wrote {} reads to {}", summary.records_written, summary.path.display());
    }

    info!("Writing stats to {}", stats_path.display());
    stats.write(&stats_path, &distinct_samples)?;
    let counters = stats.counters();
    info!(
        "Demultiplexed {} reads: {} unqualified, {} undetermined",
        counters.total(),
        counters.get(UNQUALIFIED_NAME),
        counters.get(UNDETERMINED_NAME)
    );
    Ok(())
}

/// Demultiplex each input in turn, merging its counts and refreshing the statistics table.
fn demultiplex_inputs(
    demultiplexer: &dyn Demultiplex,
    fastqs: &[PathBuf],
    samples: &SampleIndex,
    distinct_samples: &[SampleInfo],
    router: &mut OutputRouter,
    stats: &mut StatsAggregator,
    stats_path: &Path,
) -> Result<()> {
    for fastq in fastqs {
        let counters = demultiplexer
            .demultiplex_file(fastq, samples, router)
            .with_context(|| format!("Failed to demultiplex {}", fastq.display()))?;
        info!("Demultiplexed {} reads from {}", counters.total(), fastq.display());
        stats.merge(&counters);
        stats.write(&stats_path, distinct_samples)?;
    }
    Ok(())
}
