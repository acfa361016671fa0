//! Owns the output FASTQ files: one per sample, plus one per mate for undetermined reads.

use std::{
    fs::File,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use ahash::AHashMap;
use log::{info, warn};
use seq_io::{fastq::OwnedRecord, BaseRecord};

use crate::{errors::DemuxError, sample_index::SampleInfo};

/// The file name of the undetermined mate 1 output.
pub const UNDETERMINED_R1_FILE_NAME: &str = "undetermined_R1.fastq";
/// The file name of the undetermined mate 2 output.
pub const UNDETERMINED_R2_FILE_NAME: &str = "undetermined_R2.fastq";

/// Which mate of a pair a read is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mate {
    One,
    Two,
}

/// Where a read is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route<'a> {
    /// The output of a sample.
    Sample(&'a SampleInfo),
    /// The undetermined output for the given mate.
    Undetermined(Mate),
}

/// The path a sample's reads are written to: `<output_dir>/<project>/<series>_sample_<id>.fastq`.
pub fn sample_path<P: AsRef<Path>>(output_dir: P, sample: &SampleInfo) -> PathBuf {
    output_dir
        .as_ref()
        .join(&sample.project)
        .join(format!("{}_sample_{}.fastq", sample.series, sample.id))
}

/// A buffered FASTQ output file that counts the records written to it.
///
/// The writer is flushed when the sink is closed, or on drop if it never was.
#[derive(Debug)]
pub struct FastqSink {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
    records_written: usize,
}

impl FastqSink {
    /// Create (or truncate) the file at `path`.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self, DemuxError> {
        let path = path.as_ref().to_path_buf();
        let file =
            File::create(&path).map_err(|source| DemuxError::Io { path: path.clone(), source })?;
        Ok(Self { path, writer: Some(BufWriter::new(file)), records_written: 0 })
    }

    /// Write a single record.
    pub fn write(&mut self, record: &OwnedRecord) -> Result<(), DemuxError> {
        let writer = match self.writer.as_mut() {
            Some(writer) => writer,
            None => {
                return Err(DemuxError::Io {
                    path: self.path.clone(),
                    source: std::io::Error::new(
                        std::io::ErrorKind::BrokenPipe,
                        "write to a closed sink",
                    ),
                })
            }
        };
        record
            .write(writer)
            .map_err(|source| DemuxError::Io { path: self.path.clone(), source })?;
        self.records_written += 1;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn records_written(&self) -> usize {
        self.records_written
    }

    /// Flush and release the underlying file.  Closing an already closed sink does nothing.
    pub fn close(&mut self) -> Result<usize, DemuxError> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush().map_err(|source| DemuxError::Io { path: self.path.clone(), source })?;
        }
        Ok(self.records_written)
    }
}

impl Drop for FastqSink {
    fn drop(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            if let Err(e) = writer.flush() {
                warn!("Failed to flush {:?} on drop: {}", self.path, e);
            }
        }
    }
}

/// The number of records a sink received, reported when the router is closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkSummary {
    pub path: PathBuf,
    pub records_written: usize,
}

/// Routes reads to the output of their sample, or to the undetermined outputs.
///
/// All sinks are created up front from the full set of samples, before any input is read.
#[derive(Debug)]
pub struct OutputRouter {
    sample_sinks: Vec<FastqSink>,
    sample_to_sink: AHashMap<SampleInfo, usize>,
    undetermined_r1: FastqSink,
    undetermined_r2: FastqSink,
}

impl OutputRouter {
    /// Open one sink per sample and the two undetermined sinks under `output_dir`, creating any
    /// missing directories.
    ///
    /// If a sink cannot be created, the sinks opened so far are released before the error is
    /// returned.
    pub fn open<P: AsRef<Path>>(samples: &[SampleInfo], output_dir: P) -> Result<Self, DemuxError> {
        let output_dir = output_dir.as_ref();
        create_dir_all(output_dir)?;

        let undetermined_r1 = FastqSink::create(output_dir.join(UNDETERMINED_R1_FILE_NAME))?;
        let undetermined_r2 = FastqSink::create(output_dir.join(UNDETERMINED_R2_FILE_NAME))?;

        let mut sample_sinks = Vec::with_capacity(samples.len());
        let mut sample_to_sink = AHashMap::with_capacity(samples.len());
        for sample in samples {
            if sample_to_sink.contains_key(sample) {
                continue;
            }
            let path = sample_path(output_dir, sample);
            if let Some(parent) = path.parent() {
                create_dir_all(parent)?;
            }
            sample_to_sink.insert(sample.clone(), sample_sinks.len());
            sample_sinks.push(FastqSink::create(path)?);
        }
        info!("Opened {} sample outputs in {:?}", sample_sinks.len(), output_dir);

        Ok(Self { sample_sinks, sample_to_sink, undetermined_r1, undetermined_r2 })
    }

    /// The sink for the given route, if there is one.
    pub fn sink_for(&mut self, route: Route<'_>) -> Option<&mut FastqSink> {
        match route {
            Route::Sample(sample) => {
                let index = *self.sample_to_sink.get(sample)?;
                self.sample_sinks.get_mut(index)
            }
            Route::Undetermined(Mate::One) => Some(&mut self.undetermined_r1),
            Route::Undetermined(Mate::Two) => Some(&mut self.undetermined_r2),
        }
    }

    /// Write a record to the sink for the given route.
    pub fn write(&mut self, route: Route<'_>, record: &OwnedRecord) -> Result<(), DemuxError> {
        match self.sink_for(route) {
            Some(sink) => sink.write(record),
            None => Err(DemuxError::Configuration(format!(
                "No output was opened for route {:?}",
                route
            ))),
        }
    }

    /// Flush and release every sink, returning how many records each received: undetermined
    /// mate 1, undetermined mate 2, then samples in the order they were opened.
    ///
    /// Every sink is closed even if an earlier one fails; the first failure is returned.
    pub fn close(mut self) -> Result<Vec<SinkSummary>, DemuxError> {
        let mut summaries = Vec::with_capacity(self.sample_sinks.len() + 2);
        let mut first_error = None;
        let sinks = std::iter::once(&mut self.undetermined_r1)
            .chain(std::iter::once(&mut self.undetermined_r2))
            .chain(self.sample_sinks.iter_mut());
        for sink in sinks {
            match sink.close() {
                Ok(records_written) => {
                    summaries
                        .push(SinkSummary { path: sink.path().to_path_buf(), records_written });
                }
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(summaries),
        }
    }
}

fn create_dir_all(dir: &Path) -> Result<(), DemuxError> {
    std::fs::create_dir_all(dir)
        .map_err(|source| DemuxError::Io { path: dir.to_path_buf(), source })
}
