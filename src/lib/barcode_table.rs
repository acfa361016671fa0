//! The table of cell barcodes: barcode sequence to barcode identifier.

use std::path::Path;

use ahash::AHashMap;
use bstr::ByteSlice;
use csv::{ReaderBuilder, StringRecord};
use fgoxide::io::Io;
use log::warn;

use crate::errors::DemuxError;

/// An exact-match lookup from barcode sequence to barcode id.
///
/// Sequences are stored as given: no case folding and no reverse complementing.
#[derive(Debug, Clone, Default)]
pub struct BarcodeTable {
    lookup: AHashMap<Vec<u8>, String>,
}

impl BarcodeTable {
    /// Reads a barcode table from a tab-delimited file with rows of `id, sequence, ...`.
    ///
    /// # Errors
    ///
    /// - [`DemuxError::FgError`] if the file cannot be opened
    /// - [`DemuxError::MalformedInput`] if a row has fewer than two fields
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, DemuxError> {
        let io = Io::default();
        let reader = io.new_reader(&path)?;
        Self::from_reader(reader, &path.as_ref().to_string_lossy())
    }

    /// Reads a barcode table from any reader.  `source_name` is only used in error messages.
    ///
    /// Lines starting with `#` and blank lines are skipped.
    pub fn from_reader<R: std::io::Read>(reader: R, source_name: &str) -> Result<Self, DemuxError> {
        let mut reader = ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(false)
            .flexible(true)
            .comment(Some(b'#'))
            .from_reader(reader);

        let mut lookup = AHashMap::new();
        let mut record = StringRecord::new();
        while reader.read_record(&mut record)? {
            let line = record.position().map(csv::Position::line);
            if record.iter().all(|field| field.trim().is_empty()) {
                continue;
            }
            if record.len() < 2 {
                return Err(DemuxError::malformed(
                    source_name,
                    line.map(|l| l as usize),
                    format!("expected at least 2 fields (id, sequence), found {}", record.len()),
                ));
            }
            let id = record[0].trim().to_string();
            let sequence = record[1].trim().as_bytes().to_vec();
            if let Some(previous) = lookup.insert(sequence.clone(), id.clone()) {
                warn!(
                    "Barcode sequence {} listed more than once in {}; using {} instead of {}",
                    sequence.as_bstr(),
                    source_name,
                    id,
                    previous
                );
            }
        }
        Ok(Self { lookup })
    }

    /// Returns the id of the barcode with exactly this sequence.
    pub fn lookup(&self, sequence: &[u8]) -> Option<&str> {
        self.lookup.get(sequence).map(String::as_str)
    }

    /// The number of barcodes in the table.
    pub fn len(&self) -> usize {
        self.lookup.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lookup.is_empty()
    }

    /// The length shared by every barcode sequence, or `None` if the table is empty or the
    /// lengths differ.
    pub fn barcode_length(&self) -> Option<usize> {
        let mut lengths = self.lookup.keys().map(|s| s.len());
        let first = lengths.next()?;
        lengths.all(|l| l == first).then(|| first)
    }
}
