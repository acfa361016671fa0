//! Infers the sequencing-run context of an input FASTQ from its file name and first record.
//!
//! The matching core never looks at file names itself: it is handed a [`RunContext`] and the
//! path of the mate 2 file by a [`NamingConvention`].

use std::path::{Path, PathBuf};

use lazy_static::lazy_static;
use regex::Regex;

use crate::{errors::DemuxError, read_name::ReadName, sample_index::normalize_lane, utils::s};

/// The marker identifying a mate 1 file.
pub const MATE1_MARKER: &str = "_R1_";
/// The marker identifying a mate 2 file.
pub const MATE2_MARKER: &str = "_R2_";

lazy_static! {
    /// <illumina-index>_<sample-number>_<lane>_[<other>_]R1_<rest>
    static ref ILLUMINA_FASTQ_REGEX: Regex =
        Regex::new(r"^([^_]+)_([^_]+)_([^_]+)_(?:.*_)?R1_.+$").unwrap();
}

/// The flowcell, lane, and Illumina index an input file was sequenced with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunContext {
    pub flowcell: String,
    /// The normalized lane, see [`normalize_lane`].
    pub lane: String,
    pub illumina_index: String,
}

/// The inputs derived for a single mate 1 FASTQ.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputPair {
    pub mate1: PathBuf,
    pub mate2: PathBuf,
}

/// A file naming convention for input FASTQs.
pub trait NamingConvention {
    /// Returns the path of the mate 2 file that accompanies `mate1`.  The file is not required
    /// to exist.
    fn mate2_path(&self, mate1: &Path) -> Result<PathBuf, DemuxError>;

    /// Derives the [`RunContext`] of `mate1` given the header of its first record.
    fn run_context(&self, mate1: &Path, first_head: &[u8]) -> Result<RunContext, DemuxError>;

    /// Resolves the mate 2 path and checks that it exists.
    fn input_pair(&self, mate1: &Path) -> Result<InputPair, DemuxError> {
        let mate2 = self.mate2_path(mate1)?;
        if !mate2.is_file() {
            return Err(DemuxError::Configuration(format!(
                "Mate 2 file {:?} for {:?} does not exist",
                mate2, mate1
            )));
        }
        Ok(InputPair { mate1: mate1.to_path_buf(), mate2 })
    }
}

/// The Illumina `bcl2fastq` convention, e.g. `ACAGTG_S1_L001_R1_001.fastq.gz`: the first `_`
/// separated token is the Illumina index and the third the lane.  The flowcell comes from the
/// read name of the first record.
#[derive(Debug, Clone, Copy, Default)]
pub struct IlluminaNaming;

impl IlluminaNaming {
    fn file_name(path: &Path) -> Result<String, DemuxError> {
        path.file_name().map(|n| n.to_string_lossy().to_string()).ok_or_else(|| {
            DemuxError::Configuration(format!("Input path {:?} has no file name", path))
        })
    }
}

impl NamingConvention for IlluminaNaming {
    fn mate2_path(&self, mate1: &Path) -> Result<PathBuf, DemuxError> {
        let file_name = Self::file_name(mate1)?;
        if !file_name.contains(MATE1_MARKER) {
            return Err(DemuxError::Configuration(format!(
                "Input file {:?} does not contain the mate 1 marker `{}`",
                mate1, MATE1_MARKER
            )));
        }
        Ok(mate1.with_file_name(file_name.replacen(MATE1_MARKER, MATE2_MARKER, 1)))
    }

    fn run_context(&self, mate1: &Path, first_head: &[u8]) -> Result<RunContext, DemuxError> {
        let file_name = Self::file_name(mate1)?;
        let captures = ILLUMINA_FASTQ_REGEX.captures(&file_name).ok_or_else(|| {
            DemuxError::Configuration(format!(
                "Input file name {:?} does not match <index>_<sample>_<lane>_..._R1_<rest>",
                file_name
            ))
        })?;
        let illumina_index = captures[1].to_string();
        let lane = normalize_lane(&captures[3]);

        let read_name = ReadName::try_from(first_head).map_err(|e| {
            DemuxError::Configuration(format!(
                "Unable to read the flowcell from the first read name `{}` in {:?}: {}",
                String::from_utf8_lossy(first_head),
                mate1,
                e
            ))
        })?;
        let flowcell = s(&read_name.flowcell_id);

        Ok(RunContext { flowcell, lane, illumina_index })
    }
}
