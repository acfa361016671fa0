//! Utility functions.

pub mod built_info {
    use lazy_static::lazy_static;
    include!(concat!(env!("OUT_DIR"), "/built.rs"));

    /// Get a software version string including
    ///   - Git commit hash
    ///   - Git dirty info (whether the repo had uncommitted changes)
    ///   - Cargo package version if no git info found
    fn get_software_version() -> String {
        let prefix = if let Some(s) = GIT_COMMIT_HASH {
            format!("{}-{}", PKG_VERSION, s[0..8].to_owned())
        } else {
            // This shouldn't happen
            PKG_VERSION.to_string()
        };
        let suffix = match GIT_DIRTY {
            Some(true) => "-dirty",
            _ => "",
        };
        format!("{}{}", prefix, suffix)
    }

    lazy_static! {
        /// Version of the software with git hash
        pub static ref VERSION: String = get_software_version();
    }
}

/// Lossily convert bytes to a `String`.
pub fn s(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).to_string()
}

#[cfg(not(tarpaulin_include))]
#[cfg(test)]
pub mod test_commons {
    //! Common utility methods for testing demultiplexing.

    use std::{
        io::Write,
        path::{Path, PathBuf},
    };

    use fgoxide::io::Io;
    use seq_io::{
        fastq::{OwnedRecord, Reader},
        BaseRecord,
    };

    /// The flowcell of reads built with [`Fq`].
    pub const FLOWCELL: &str = "AAAFGW3HV";
    /// The Illumina index every preset sample uses.
    pub const ILLUMINA_INDEX: &str = "ACAGTG";

    /// Barcode id `1`.
    pub const BARCODE_1: &[u8] = b"AAAACCCC";
    /// Barcode id `2`.
    pub const BARCODE_2: &[u8] = b"CCCCAAAA";
    /// Barcode id `3`, present in the barcode table but used by no preset sample on lane 1.
    pub const BARCODE_UNUSED: &[u8] = b"ACGTACGT";

    /// Helper method to write the preset barcode table to a file.
    pub fn create_preset_barcode_table_file(dir: impl AsRef<Path>) -> PathBuf {
        let file_contents = format!(
            "#id\tsequence\n1\t{}\n2\t{}\n3\t{}\n",
            String::from_utf8_lossy(BARCODE_1),
            String::from_utf8_lossy(BARCODE_2),
            String::from_utf8_lossy(BARCODE_UNUSED),
        );
        let output = dir.as_ref().join("barcodes.tsv");
        std::fs::write(&output, file_contents).expect("Failed to write barcode table to file.");
        output
    }

    /// Helper method to write the preset sample sheet to a file.
    ///
    /// | id | flowcell  | lane | index  | barcode | series | project |
    /// |----|-----------|------|--------|---------|--------|---------|
    /// | 1  | AAAFGW3HV | 1    | ACAGTG | 1       | S1     | P1      |
    /// | 2  | AAAFGW3HV | 1    | ACAGTG | 2       | S1     | P1      |
    /// | 3  | AAAFGW3HV | 2    | ACAGTG | 1       | S2     | P2      |
    /// | 4  | OTHERFC   | 1    | ACAGTG | 3       | S3     | P2      |
    pub fn create_preset_sample_sheet_file(dir: impl AsRef<Path>) -> PathBuf {
        let file_contents = format!(
            "#id\tflocell\tlane\til_barcode\tcel_barcode\tseries\tproject\n\
            1\t{fc}\tL001\t{ix}\t1\tS1\tP1\n\
            2\t{fc}\tL001\t{ix}\t2\tS1\tP1\n\
            3\t{fc}\tL002\t{ix}\t1\tS2\tP2\n\
            4\tOTHERFC\tL001\t{ix}\t3\tS3\tP2\n",
            fc = FLOWCELL,
            ix = ILLUMINA_INDEX
        );
        let output = dir.as_ref().join("samples.tsv");
        std::fs::write(&output, file_contents).expect("Failed to write sample sheet to file.");
        output
    }

    /// Configuration struct for creating a FASTQ read
    #[derive(Debug, Default, Clone, Copy)]
    pub struct Fq<'a> {
        pub name: &'a str,
        pub bases: &'a [u8],
        pub quals: Option<&'a [u8]>,
        pub comment: Option<&'a str>,
        pub flowcell: Option<&'a str>,
    }

    impl<'a> Fq<'a> {
        /// Convert the configuration into an [`OwnedRecord`].
        ///
        /// The read name is `H00233:4:<flowcell>:1:1101:59586:<name>` and qualities default to
        /// `I` (Q40).
        pub fn to_owned_record(&self) -> OwnedRecord {
            let readname = format!(
                "H00233:4:{}:1:1101:59586:{} {}",
                self.flowcell.unwrap_or(FLOWCELL),
                self.name,
                self.comment.unwrap_or("1:N:0:ACAGTG")
            );

            let qual = if let Some(qual) = self.quals {
                assert_eq!(qual.len(), self.bases.len());
                qual.to_vec()
            } else {
                vec![b'I'; self.bases.len()]
            };

            OwnedRecord { head: readname.as_bytes().to_vec(), seq: self.bases.to_vec(), qual }
        }
    }

    /// Write a set of fastq reads to a file, returning the number of reads written.
    ///
    /// If the file extension is `gz` the reads will be compressed
    pub fn write_reads_to_file(
        reads: impl Iterator<Item = OwnedRecord>,
        file: impl AsRef<Path>,
    ) -> usize {
        let mut num_written = 0;
        let mut writer = Io::default().new_writer(&file).unwrap();
        for read in reads {
            read.write(&mut writer).unwrap();
            num_written += 1;
        }
        writer.flush().unwrap();
        num_written
    }

    /// Slurp all records out of a (possibly compressed) FASTQ file
    pub fn slurp_fastq(file: impl AsRef<Path>) -> Vec<OwnedRecord> {
        let reader = Io::default()
            .new_reader(&file)
            .unwrap_or_else(|_| panic!("Unable to open {:?}", &file.as_ref()));
        let mut reader = Reader::new(reader);
        let mut records = vec![];
        for r in reader.records() {
            let r = r.unwrap();
            records.push(r);
        }
        records
    }
}
