//! Counting what happened to each read pair, and the statistics table written at the end of a run.
//!
//! Every read pair ends in exactly one outcome: a sample id, [`UNQUALIFIED_NAME`], or
//! [`UNDETERMINED_NAME`].  A [`Counters`] is produced per input file and folded into the run-wide
//! [`StatsAggregator`], which renders one row per sample (in sample sheet order), then the
//! unqualified, undetermined, and total rows.

use std::path::Path;

use ahash::AHashMap;
use anyhow::Result;
use fgoxide::io::DelimFile;
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::sample_index::SampleInfo;

/// The outcome of pairs failing the barcode quality gate.
pub const UNQUALIFIED_NAME: &str = "unqualified";
/// The outcome of pairs whose barcode does not resolve to a sample.
pub const UNDETERMINED_NAME: &str = "undetermined";
/// The label of the final row of the statistics table.
pub const TOTAL_NAME: &str = "total";

/// The number of read pairs per outcome.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Counters {
    counts: AHashMap<String, usize>,
}

impl Counters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one more read pair for the given outcome.
    pub fn increment(&mut self, outcome: &str) {
        match self.counts.get_mut(outcome) {
            Some(count) => *count += 1,
            None => {
                self.counts.insert(outcome.to_string(), 1);
            }
        }
    }

    /// The count for an outcome, zero if never seen.
    pub fn get(&self, outcome: &str) -> usize {
        self.counts.get(outcome).copied().unwrap_or(0)
    }

    /// The total number of read pairs counted.
    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    /// Add the counts of `other` to `self`.
    pub fn merge(&mut self, other: &Counters) {
        for (outcome, count) in &other.counts {
            *self.counts.entry(outcome.clone()).or_insert(0) += count;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

/// A row in the statistics table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsRow {
    /// The sample id, or one of `unqualified`, `undetermined`, or `total`.
    #[serde(rename = "# Sample_id")]
    pub label: String,
    /// The number of read pairs with this outcome.
    pub reads: usize,
    /// The percentage of all read pairs with this outcome.
    pub percentage: f64,
}

impl StatsRow {
    fn new(label: &str, reads: usize, total: usize) -> Self {
        let percentage = if total == 0 { 0.0 } else { 100.0 * reads as f64 / total as f64 };
        Self { label: label.to_string(), reads, percentage }
    }
}

/// Accumulates [`Counters`] across all input files of a run.
#[derive(Debug, Default)]
pub struct StatsAggregator {
    counters: Counters,
}

impl StatsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold the counts of one input file into the run totals.
    pub fn merge(&mut self, counters: &Counters) {
        self.counters.merge(counters);
    }

    /// The run totals so far.
    pub fn counters(&self) -> &Counters {
        &self.counters
    }

    /// Build the statistics table.  Sample rows follow the order of `samples`, one row per
    /// distinct id, including samples that received no reads.
    pub fn render(&self, samples: &[SampleInfo]) -> Vec<StatsRow> {
        let total = self.counters.total();
        let mut rows: Vec<StatsRow> = samples
            .iter()
            .unique_by(|sample| sample.id.clone())
            .map(|sample| StatsRow::new(&sample.id, self.counters.get(&sample.id), total))
            .collect();
        for outcome in [UNQUALIFIED_NAME, UNDETERMINED_NAME] {
            rows.push(StatsRow::new(outcome, self.counters.get(outcome), total));
        }
        rows.push(StatsRow::new(TOTAL_NAME, total, total));
        rows
    }

    /// Write the statistics table as a TSV to `path`.
    pub fn write<P: AsRef<Path>>(&self, path: &P, samples: &[SampleInfo]) -> Result<()> {
        let delim = DelimFile::default();
        delim.write_tsv(path, self.render(samples))?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use fgoxide::io::Io;
    use tempfile::tempdir;

    use super::{Counters, StatsAggregator, StatsRow, UNDETERMINED_NAME, UNQUALIFIED_NAME};
    use crate::sample_index::SampleInfo;

    fn sample(id: &str) -> SampleInfo {
        SampleInfo { id: id.to_string(), series: String::from("S1"), project: String::from("P1") }
    }

    fn row(label: &str, reads: usize, percentage: f64) -> StatsRow {
        StatsRow { label: label.to_string(), reads, percentage }
    }

    #[test]
    fn test_counters_merge() {
        let mut first = Counters::new();
        first.increment("0001");
        first.increment("0001");
        first.increment(UNQUALIFIED_NAME);
        let mut second = Counters::new();
        second.increment("0001");
        second.increment("0002");
        second.increment(UNDETERMINED_NAME);

        first.merge(&second);
        assert_eq!(first.get("0001"), 3);
        assert_eq!(first.get("0002"), 1);
        assert_eq!(first.get(UNQUALIFIED_NAME), 1);
        assert_eq!(first.get(UNDETERMINED_NAME), 1);
        assert_eq!(first.get("0003"), 0);
        assert_eq!(first.total(), 6);
        assert_eq!(second.total(), 3);
    }

    #[test]
    fn test_render_order_and_percentages() {
        let mut counters = Counters::new();
        for _ in 0..3 {
            counters.increment("0002");
        }
        counters.increment(UNDETERMINED_NAME);
        let mut aggregator = StatsAggregator::new();
        aggregator.merge(&counters);
        aggregator.merge(&counters);

        let samples = vec![sample("0002"), sample("0001"), sample("0002")];
        assert_eq!(
            aggregator.render(&samples),
            vec![
                row("0002", 6, 75.0),
                row("0001", 0, 0.0),
                row("unqualified", 0, 0.0),
                row("undetermined", 2, 25.0),
                row("total", 8, 100.0),
            ]
        );
    }

    #[test]
    fn test_render_zero_total() {
        let aggregator = StatsAggregator::new();
        let rows = aggregator.render(&[sample("0001")]);
        assert_eq!(rows.len(), 4);
        assert!(rows.iter().all(|r| r.reads == 0 && r.percentage == 0.0));
        assert!(rows.iter().all(|r| r.percentage.is_finite()));
    }

    #[test]
    fn test_write() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("stats.tab");
        let mut counters = Counters::new();
        counters.increment("0001");
        counters.increment(UNQUALIFIED_NAME);
        let mut aggregator = StatsAggregator::new();
        aggregator.merge(&counters);
        aggregator.write(&path, &[sample("0001")]).unwrap();

        let lines = Io::default().read_lines(&path).unwrap();
        assert_eq!(
            lines,
            vec![
                "# Sample_id\treads\tpercentage",
                "0001\t1\t50.0",
                "unqualified\t1\t50.0",
                "undetermined\t0\t0.0",
                "total\t2\t100.0",
            ]
        );
    }
}
