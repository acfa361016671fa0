#![forbid(unsafe_code)]
#![allow(clippy::must_use_candidate)]
//! The sample sheet: which sample a read pair belongs to, given the flowcell, lane, Illumina
//! index, and cell barcode it was sequenced with.

use std::path::Path;

use ahash::AHashMap;
use csv::{ReaderBuilder, StringRecord, Trim};
use fgoxide::io::Io;
use itertools::Itertools;
use log::warn;
use serde::{Deserialize, Serialize};

use crate::errors::DemuxError;

/// The columns every sample sheet must have.  `flocell` may also be spelled `flowcell`.
const REQUIRED_COLUMNS: &[&str] =
    &["id", "flocell", "lane", "il_barcode", "cel_barcode", "series", "project"];

/// The width sample ids are zero-padded to.
const SAMPLE_ID_WIDTH: usize = 4;

/// The composite key a sample is looked up by.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SampleKey {
    pub flowcell: String,
    /// The normalized lane, see [`normalize_lane`].
    pub lane: String,
    pub illumina_index: String,
    pub cell_barcode_id: String,
}

impl SampleKey {
    /// Create a new [`SampleKey`], normalizing the lane.
    pub fn new(flowcell: &str, lane: &str, illumina_index: &str, cell_barcode_id: &str) -> Self {
        Self {
            flowcell: flowcell.to_string(),
            lane: normalize_lane(lane),
            illumina_index: illumina_index.to_string(),
            cell_barcode_id: cell_barcode_id.to_string(),
        }
    }

    /// True if the flowcell, lane and Illumina index of this key match the given (already
    /// normalized) values.
    fn matches_run(&self, flowcell: &str, lane: &str, illumina_index: &str) -> bool {
        self.flowcell == flowcell && self.lane == lane && self.illumina_index == illumina_index
    }
}

/// A sample that reads are written out for.  Each distinct value gets its own output file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SampleInfo {
    /// The zero-padded sample id, e.g. `0001`.
    pub id: String,
    pub series: String,
    pub project: String,
}

/// One row of the sample sheet as it appears in the file.
#[derive(Debug, Deserialize)]
struct SampleRow {
    id: String,
    #[serde(alias = "flowcell")]
    flocell: String,
    lane: String,
    il_barcode: String,
    cel_barcode: String,
    series: String,
    project: String,
}

/// Normalizes a lane so that `L001`, `001`, and `1` compare equal: an optional leading `L` and
/// any leading zeros are removed.
pub fn normalize_lane(lane: &str) -> String {
    let lane = lane.trim();
    let lane = lane.strip_prefix(&['L', 'l'][..]).unwrap_or(lane);
    let trimmed = lane.trim_start_matches('0');
    if trimmed.is_empty() && !lane.is_empty() {
        String::from("0")
    } else {
        trimmed.to_string()
    }
}

/// Normalizes a sample id to a fixed-width, zero-padded numeral.
fn normalize_sample_id(id: &str) -> Option<String> {
    id.trim().parse::<u64>().ok().map(|n| format!("{:0width$}", n, width = SAMPLE_ID_WIDTH))
}

/// The indexed sample sheet.
///
/// Keys are kept in the order they were first seen so that output files and the statistics
/// table follow the order of the sample sheet.
#[derive(Debug, Clone, Default)]
pub struct SampleIndex {
    entries: AHashMap<SampleKey, SampleInfo>,
    key_order: Vec<SampleKey>,
}

impl SampleIndex {
    /// Builds a [`SampleIndex`] from the tab-delimited sample sheet at the given path.
    ///
    /// # Errors
    ///
    /// - [`DemuxError::FgError`] if the file cannot be read
    /// - [`DemuxError::MalformedInput`] if a required column is missing, a row is short, or a
    ///   sample id is not a number
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, DemuxError> {
        let io = Io::default();
        let reader = io.new_reader(&path)?;
        Self::from_reader(reader, &path.as_ref().to_string_lossy())
    }

    /// Builds a [`SampleIndex`] from a reader over a tab-delimited sample sheet.
    ///
    /// The first non-empty line is the header.  A leading `#` on the header is removed (sample
    /// sheets historically start with `#id`).  Subsequent lines starting with `#` are comments.
    pub fn from_reader<R: std::io::Read>(reader: R, source_name: &str) -> Result<Self, DemuxError> {
        let mut reader = ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(false)
            .flexible(true)
            .trim(Trim::All)
            .from_reader(reader);

        let mut header: Option<StringRecord> = None;
        let mut index = Self::default();
        let mut record = StringRecord::new();
        while reader.read_record(&mut record)? {
            let line = record.position().map(|p| p.line() as usize);
            if record.iter().all(str::is_empty) {
                continue;
            }

            if header.is_none() {
                header = Some(Self::parse_header(&record, source_name, line)?);
                continue;
            }
            if record[0].starts_with('#') {
                continue;
            }

            let row: SampleRow = record.deserialize(header.as_ref()).map_err(|e| {
                DemuxError::malformed(source_name, line, format!("unable to parse sample: {}", e))
            })?;
            let id = normalize_sample_id(&row.id).ok_or_else(|| {
                DemuxError::malformed(
                    source_name,
                    line,
                    format!("sample id `{}` is not a number", row.id),
                )
            })?;

            let key = SampleKey::new(&row.flocell, &row.lane, &row.il_barcode, &row.cel_barcode);
            let info = SampleInfo { id, series: row.series, project: row.project };
            if index.insert(key.clone(), info) {
                warn!(
                    "Sample key {:?} is repeated in {}; the row on line {} replaces it",
                    key,
                    source_name,
                    line.unwrap_or_default()
                );
            }
        }

        if header.is_none() {
            let reason = String::from("the sample sheet is empty");
            return Err(DemuxError::malformed(source_name, None, reason));
        }
        Ok(index)
    }

    /// Strips the marker from the first column and checks that every required column is present.
    fn parse_header(
        record: &StringRecord,
        source_name: &str,
        line: Option<usize>,
    ) -> Result<StringRecord, DemuxError> {
        let header: StringRecord = record
            .iter()
            .enumerate()
            .map(|(i, name)| if i == 0 { name.trim_start_matches('#').trim() } else { name })
            .collect();

        let missing: Vec<&str> = REQUIRED_COLUMNS
            .iter()
            .filter(|&&column| {
                !header.iter().any(|name| {
                    name == column || (column == "flocell" && name == "flowcell")
                })
            })
            .copied()
            .collect();

        if missing.is_empty() {
            Ok(header)
        } else {
            Err(DemuxError::malformed(
                source_name,
                line,
                format!("missing required column(s): {}", missing.join(", ")),
            ))
        }
    }

    /// Inserts an entry, returning true if an existing entry for the key was replaced.
    pub fn insert(&mut self, key: SampleKey, info: SampleInfo) -> bool {
        match self.entries.insert(key.clone(), info) {
            Some(_) => true,
            None => {
                self.key_order.push(key);
                false
            }
        }
    }

    /// Returns a new [`SampleIndex`] holding only the entries for the given flowcell, lane, and
    /// Illumina index.  `self` is left untouched.
    pub fn filter_for(&self, flowcell: &str, lane: &str, illumina_index: &str) -> SampleIndex {
        let lane = normalize_lane(lane);
        let mut filtered = SampleIndex::default();
        for key in self.key_order.iter().filter(|k| k.matches_run(flowcell, &lane, illumina_index))
        {
            filtered.insert(key.clone(), self.entries[key].clone());
        }
        filtered
    }

    /// Looks up the sample for the full key.
    pub fn resolve(
        &self,
        flowcell: &str,
        lane: &str,
        illumina_index: &str,
        cell_barcode_id: &str,
    ) -> Option<&SampleInfo> {
        self.get(&SampleKey::new(flowcell, lane, illumina_index, cell_barcode_id))
    }

    /// Looks up the sample for a key built ahead of time.
    pub fn get(&self, key: &SampleKey) -> Option<&SampleInfo> {
        self.entries.get(key)
    }

    /// The distinct samples, in the order they first appear in the sample sheet.
    pub fn distinct_samples(&self) -> Vec<SampleInfo> {
        self.key_order.iter().map(|key| &self.entries[key]).unique().cloned().collect()
    }

    /// The number of keys in the index.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod test {
    use matches::assert_matches;
    use rstest::rstest;

    use super::*;

    const SHEET: &str = "\
#id\tflocell\tlane\til_barcode\tcel_barcode\tseries\tproject
1\tFC1\t1\tACAGTG\t1\tS1\tP1
2\tFC1\t1\tACAGTG\t2\tS1\tP1
# a commented out sample
3\tFC1\t2\tACAGTG\t1\tS2\tP1
1\tFC1\t2\tGCCAAT\t1\tS1\tP1
4\tFC2\tL001\tACAGTG\t1\tS3\tP2
";

    fn info(id: &str, series: &str, project: &str) -> SampleInfo {
        SampleInfo { id: id.to_string(), series: series.to_string(), project: project.to_string() }
    }

    #[test]
    fn test_load_and_resolve() {
        let index = SampleIndex::from_reader(SHEET.as_bytes(), "samples.tsv").unwrap();
        assert_eq!(index.len(), 5);
        assert_eq!(index.resolve("FC1", "1", "ACAGTG", "1"), Some(&info("0001", "S1", "P1")));
        assert_eq!(index.resolve("FC1", "L001", "ACAGTG", "2"), Some(&info("0002", "S1", "P1")));
        assert_eq!(index.resolve("FC1", "L002", "ACAGTG", "1"), Some(&info("0003", "S2", "P1")));
        assert_eq!(index.resolve("FC2", "1", "ACAGTG", "1"), Some(&info("0004", "S3", "P2")));
        assert_eq!(index.resolve("FC1", "1", "ACAGTG", "3"), None);
        assert_eq!(index.resolve("FC3", "1", "ACAGTG", "1"), None);
    }

    #[test]
    fn test_distinct_samples_first_seen_order() {
        let index = SampleIndex::from_reader(SHEET.as_bytes(), "samples.tsv").unwrap();
        let ids: Vec<String> = index.distinct_samples().into_iter().map(|s| s.id).collect();
        // sample 0001 appears under two keys but only once here
        assert_eq!(ids, vec!["0001", "0002", "0003", "0004"]);
    }

    #[test]
    fn test_filter_for_does_not_mutate() {
        let index = SampleIndex::from_reader(SHEET.as_bytes(), "samples.tsv").unwrap();
        let filtered = index.filter_for("FC1", "L001", "ACAGTG");
        assert_eq!(filtered.len(), 2);
        assert!(filtered.resolve("FC1", "1", "ACAGTG", "1").is_some());
        assert!(filtered.resolve("FC1", "2", "ACAGTG", "1").is_none());
        assert_eq!(index.len(), 5);

        let other = index.filter_for("FC1", "2", "GCCAAT");
        assert_eq!(other.distinct_samples(), vec![info("0001", "S1", "P1")]);
        assert!(index.filter_for("FC9", "1", "ACAGTG").is_empty());
        assert_eq!(index.len(), 5);
    }

    #[test]
    fn test_duplicate_key_last_wins() {
        let sheet = "\
id\tflocell\tlane\til_barcode\tcel_barcode\tseries\tproject
1\tFC1\t1\tACAGTG\t1\tS1\tP1
2\tFC1\t1\tACAGTG\t1\tS1\tP1
";
        let index = SampleIndex::from_reader(sheet.as_bytes(), "samples.tsv").unwrap();
        assert_eq!(index.len(), 1);
        assert_eq!(index.resolve("FC1", "1", "ACAGTG", "1"), Some(&info("0002", "S1", "P1")));
        assert_eq!(index.distinct_samples(), vec![info("0002", "S1", "P1")]);
    }

    #[test]
    fn test_flowcell_alias_and_extra_columns() {
        let sheet = "\
project\tseries\tid\tflowcell\tlane\til_barcode\tcel_barcode\tnotes
P1\tS1\t12\tFC1\t3\tACAGTG\t7\tsome note
";
        let index = SampleIndex::from_reader(sheet.as_bytes(), "samples.tsv").unwrap();
        assert_eq!(index.resolve("FC1", "3", "ACAGTG", "7"), Some(&info("0012", "S1", "P1")));
    }

    #[rstest]
    #[case("id\tflocell\tlane\til_barcode\tcel_barcode\tseries\n1\tFC1\t1\tACAGTG\t1\tS1\n")]
    #[case("#id\tlane\til_barcode\tcel_barcode\tseries\tproject\n")]
    #[case("id\tflocell\tlane\til_barcode\tcel_barcode\tseries\tproject\n1\tFC1\t1\tACAGTG\n")]
    #[case(concat!(
        "id\tflocell\tlane\til_barcode\tcel_barcode\tseries\tproject\n",
        "A1\tFC1\t1\tACAGTG\t1\tS1\tP1\n"
    ))]
    #[case("")]
    fn test_malformed_sheets(#[case] sheet: &str) {
        let result = SampleIndex::from_reader(sheet.as_bytes(), "samples.tsv");
        assert_matches!(result, Err(DemuxError::MalformedInput { .. }));
    }

    #[rstest]
    #[case("L001", "1")]
    #[case("001", "1")]
    #[case("1", "1")]
    #[case("l12", "12")]
    #[case("L000", "0")]
    #[case("", "")]
    fn test_normalize_lane(#[case] lane: &str, #[case] expected: &str) {
        assert_eq!(normalize_lane(lane), expected);
    }
}
