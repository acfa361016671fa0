//! The errors that end a demultiplexing run.
//!
//! Reads that are too short, of low quality, or carry an unknown barcode are not errors; they
//! are counted as `unqualified` or `undetermined` instead.  Everything here is fatal.

use std::{fmt::Display, path::PathBuf};

use thiserror::Error;

/// The optional line number from an input table where an error occurred.
#[derive(Debug)]
pub struct ErrorLine(pub Option<usize>);

impl Display for ErrorLine {
    /// Writes the line number if present, nothing if it is not None.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0 {
            Some(number) => write!(f, " (line {})", number),
            None => Ok(()),
        }
    }
}

/// The error that may occur while loading the inputs or demultiplexing reads.
#[derive(Error, Debug)]
pub enum DemuxError {
    /// A barcode table or sample sheet row is missing required fields.
    #[error("Malformed input in {source_name}{line}: {reason}")]
    MalformedInput { source_name: String, line: ErrorLine, reason: String },

    /// An input file does not follow the expected naming convention, or the options are
    /// inconsistent.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The two mates of a pair do not belong together.
    #[error("Read names did not match: {mate1:?} != {mate2:?}")]
    DataIntegrity { mate1: String, mate2: String },

    /// One mate file ended before the other.
    #[error("Mate files have an unequal number of reads: {path} ended early")]
    UnevenMates { path: PathBuf },

    /// An output sink could not be opened, written, or closed.
    #[error("Io error occurred on {path}")]
    Io { path: PathBuf, source: std::io::Error },

    #[error("Io error occurred")]
    FgError(#[from] fgoxide::FgError),

    #[error(transparent)]
    Csv(#[from] csv::Error),
}

impl DemuxError {
    /// Build a [`DemuxError::MalformedInput`] for the given source and optional line.
    pub fn malformed<S: Into<String>>(source_name: S, line: Option<usize>, reason: String) -> Self {
        Self::MalformedInput { source_name: source_name.into(), line: ErrorLine(line), reason }
    }
}
