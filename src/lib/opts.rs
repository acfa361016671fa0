#![forbid(unsafe_code)]

use std::path::PathBuf;

use anyhow::{ensure, Result};
use clap::Parser;
use env_logger::Env;

use crate::{
    demux::{
        DemuxConfig, DEFAULT_BARCODE_LENGTH, DEFAULT_MIN_QUALITY, DEFAULT_TRIM_LENGTH,
        DEFAULT_UMI_LENGTH,
    },
    utils::built_info,
};

pub static TOOL_NAME: &str = "celdemux";

/// The default file name of the statistics table, written in the output directory.
pub static DEFAULT_STATS_FILE: &str = "stats.tab";

static SHORT_USAGE: &str =
    "Demultiplexes paired-end FASTQs by the in-line cell barcode and UMI at the start of read 1.";

static LONG_USAGE: &str = "
Demultiplexes paired-end FASTQs by the in-line cell barcode and UMI at the start of read 1.

Each read 1 starts with an optional UMI followed by a cell barcode.  The barcode is looked up
in the barcode table, and together with the flowcell, lane, and Illumina index of the input
file, resolved to a sample in the sample sheet.  Read 2 is trimmed, its name tagged with the
UMI (`<read-name>:UMI:<umi>:`), and written to the sample's FASTQ.

Read pairs with any base below --min-bc-quality in the UMI or barcode are counted as
`unqualified` and dropped.  Read pairs whose barcode does not resolve to a sample are counted
as `undetermined` and written to undetermined_R1.fastq and undetermined_R2.fastq.

Input FASTQs must follow the Illumina naming convention, e.g. ACAGTG_S1_L001_R1_001.fastq.gz:
the first `_` separated field is the Illumina index and the third the lane.  Only the read 1
files are given; the read 2 file is found by replacing `_R1_` with `_R2_`.  The flowcell is
read from the name of the first read.  Inputs may be plain or gzip compressed.

The barcode table is a tab-delimited file of `id<TAB>sequence` rows.

The sample sheet is a tab-delimited file with the header columns id, flocell, lane,
il_barcode, cel_barcode, series, and project.  The reads of each sample are written to
<output-dir>/<project>/<series>_sample_<id>.fastq.

Example invocation:

celdemux \\
  --barcode-table barcodes.tsv \\
  --sample-sheet samples.tsv \\
  --fastqs ACAGTG_S1_L001_R1_001.fastq.gz GCCAAT_S2_L001_R1_001.fastq.gz \\
  --umi-length 4 \\
  --output-dir demuxed-fastqs/
";

#[derive(Parser, Debug, Clone)]
#[clap(name = TOOL_NAME, version = built_info::VERSION.as_str(), about=SHORT_USAGE, long_about=LONG_USAGE, term_width=0)]
pub struct Opts {
    /// Path to the cell barcode table.
    #[clap(long, short = 'b', display_order = 1)]
    pub barcode_table: PathBuf,

    /// Path to the sample sheet.
    #[clap(long, short = 's', display_order = 2)]
    pub sample_sheet: PathBuf,

    /// Paths to the read 1 FASTQs.  They are processed in the order given.
    #[clap(long, short = 'f', display_order = 3, required = true, multiple_values = true)]
    pub fastqs: Vec<PathBuf>,

    /// The directory to write outputs.
    ///
    /// This tool will overwrite existing files.
    #[clap(long, short, display_order = 4)]
    pub output_dir: PathBuf,

    /// The name of the statistics file, relative to the output directory.
    #[clap(long, default_value = DEFAULT_STATS_FILE, display_order = 5)]
    pub stats_file: PathBuf,

    /// Minimum base quality in the UMI and cell barcode.
    #[clap(long, short = 'q', default_value_t = DEFAULT_MIN_QUALITY, display_order = 11)]
    pub min_bc_quality: u8,

    /// The number of UMI bases at the start of read 1.
    #[clap(long, short = 'u', default_value_t = DEFAULT_UMI_LENGTH, display_order = 11)]
    pub umi_length: usize,

    /// The number of cell barcode bases following the UMI.
    #[clap(long, short = 'l', default_value_t = DEFAULT_BARCODE_LENGTH, display_order = 11)]
    pub barcode_length: usize,

    /// The length output reads are trimmed to.
    #[clap(long, short = 't', default_value_t = DEFAULT_TRIM_LENGTH, display_order = 11)]
    pub trim_length: usize,

    /// Demultiplex read 1 only.
    ///
    /// Read 2 files are not read.  Matched reads are written with the UMI and barcode removed.
    #[clap(long, display_order = 21)]
    pub single_end: bool,
}

impl Opts {
    /// Extract a [`DemuxConfig`] from the CLI opts.
    pub fn as_demux_config(&self) -> DemuxConfig {
        DemuxConfig {
            min_quality: self.min_bc_quality,
            umi_length: self.umi_length,
            barcode_length: self.barcode_length,
            trim_length: self.trim_length,
        }
    }

    /// The path the statistics table is written to.
    pub fn stats_path(&self) -> PathBuf {
        self.output_dir.join(&self.stats_file)
    }

    /// Check that the inputs exist and the options are consistent.
    pub fn validate(&self) -> Result<()> {
        ensure!(!self.fastqs.is_empty(), "At least one input FASTQ must be given");
        ensure!(
            self.barcode_table.is_file(),
            "Barcode table {:?} does not exist",
            self.barcode_table
        );
        ensure!(self.sample_sheet.is_file(), "Sample sheet {:?} does not exist", self.sample_sheet);
        for fastq in &self.fastqs {
            ensure!(fastq.is_file(), "Input FASTQ {:?} does not exist", fastq);
        }
        Ok(())
    }
}

/// Implement defaults that match the CLI options to allow for easier testing.
///
/// Note that these defaults exist only within test code.
#[cfg(test)]
impl Default for Opts {
    fn default() -> Self {
        Self {
            barcode_table: PathBuf::default(),
            sample_sheet: PathBuf::default(),
            fastqs: vec![],
            output_dir: PathBuf::default(),
            stats_file: PathBuf::from(DEFAULT_STATS_FILE),
            min_bc_quality: DEFAULT_MIN_QUALITY,
            umi_length: DEFAULT_UMI_LENGTH,
            barcode_length: DEFAULT_BARCODE_LENGTH,
            trim_length: DEFAULT_TRIM_LENGTH,
            single_end: false,
        }
    }
}

/// Parse args and set up logging / tracing
pub fn setup() -> Opts {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info");
    }
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    Opts::parse()
}

#[cfg(test)]
mod test {
    use std::path::PathBuf;

    use clap::Parser;
    use tempfile::tempdir;

    use super::Opts;
    use crate::demux::DemuxConfig;

    #[test]
    fn test_parse_defaults_match_default() {
        let opts = Opts::parse_from([
            "celdemux",
            "-b",
            "barcodes.tsv",
            "-s",
            "samples.tsv",
            "-f",
            "a_S1_L001_R1_001.fastq.gz",
            "b_S1_L001_R1_001.fastq.gz",
            "-o",
            "out",
        ]);
        assert_eq!(opts.fastqs.len(), 2);
        assert_eq!(opts.as_demux_config(), DemuxConfig::default());
        assert_eq!(opts.as_demux_config(), Opts::default().as_demux_config());
        assert_eq!(opts.stats_path(), PathBuf::from("out/stats.tab"));
        assert!(!opts.single_end);
    }

    #[test]
    fn test_parse_overrides() {
        let opts = Opts::parse_from([
            "celdemux",
            "--barcode-table",
            "barcodes.tsv",
            "--sample-sheet",
            "samples.tsv",
            "--fastqs",
            "a_S1_L001_R1_001.fastq.gz",
            "--output-dir",
            "out",
            "--stats-file",
            "run.stats",
            "-q",
            "20",
            "-u",
            "6",
            "-l",
            "10",
            "-t",
            "50",
            "--single-end",
        ]);
        let config = opts.as_demux_config();
        assert_eq!(
            config,
            DemuxConfig { min_quality: 20, umi_length: 6, barcode_length: 10, trim_length: 50 }
        );
        assert_eq!(config.prefix_len(), 16);
        assert!(opts.single_end);
        assert_eq!(opts.stats_path(), PathBuf::from("out/run.stats"));
    }

    #[test]
    fn test_validate() {
        let dir = tempdir().unwrap();
        let barcodes = dir.path().join("barcodes.tsv");
        let samples = dir.path().join("samples.tsv");
        let fastq = dir.path().join("ACAGTG_S1_L001_R1_001.fastq");
        for path in [&barcodes, &samples] {
            std::fs::write(path, "").unwrap();
        }

        let opts = Opts {
            barcode_table: barcodes,
            sample_sheet: samples,
            fastqs: vec![fastq.clone()],
            ..Opts::default()
        };
        assert!(opts.validate().is_err());
        std::fs::write(&fastq, "").unwrap();
        assert!(opts.validate().is_ok());
        assert!(Opts { fastqs: vec![], ..opts }.validate().is_err());
    }
}
