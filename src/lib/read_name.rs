#![forbid(unsafe_code)]
#![allow(clippy::must_use_candidate)]
//! Helpers for working with FASTQ read headers.
//!
//! The read identifier is everything up to the first whitespace in the header; mates of a pair
//! are compared on it, and the UMI tag is appended to it.
//!
//! When the identifier follows the Illumina convention it can be parsed into a [`ReadName`],
//! which is how the flowcell of an input file is discovered.
//!
//! # Grammar
//!
//! ```text
//! <header>      ::= <read-name> | "<read-name> <comment>"
//! <read-name>   ::= <instrument>:<run-number>:<flowcell-id>:<lane>:<tile>:<x-pos>:<y-pos>
//! <comment>     ::= .*
//! ```
//!
//! # Usage
//!
//! ```rust
//! use celdemux_lib::read_name::{umi_tagged_id, ReadName};
//! let header = "H00233:4:AAAFGW3HV:1:1101:59586:1000 1:N:0:GCATAAGCTT";
//! let name = ReadName::try_from(header.as_bytes()).unwrap();
//! assert_eq!(name.flowcell_id.as_ref(), b"AAAFGW3HV");
//! assert_eq!(
//!     umi_tagged_id(header.as_bytes(), b"ACGT"),
//!     b"H00233:4:AAAFGW3HV:1:1101:59586:1000:UMI:ACGT:".to_vec()
//! );
//! ```

use std::{borrow::Cow, error::Error, fmt::Display};

use bstr::ByteSlice;

/// The separator placed between the read identifier and the UMI sequence.
pub const UMI_TAG: &[u8] = b":UMI:";

/// A Set of errors that are returned when parsing a read name.
#[derive(Debug)]
pub enum ReadNameError {
    MissingInstrument,
    MissingRunNumber,
    MissingFlowCellId,
    MissingLane,
    MissingTile,
    MissingXPos,
    MissingYPos,
}

impl Error for ReadNameError {}
impl Display for ReadNameError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Returns the read identifier: the header up to (not including) the first whitespace.
pub fn read_id(head: &[u8]) -> &[u8] {
    let head = head.trim_start();
    let end = head.iter().position(u8::is_ascii_whitespace).unwrap_or(head.len());
    &head[..end]
}

/// True if the two headers have the same read identifier.
pub fn ids_match(head1: &[u8], head2: &[u8]) -> bool {
    read_id(head1) == read_id(head2)
}

/// Builds the header `<read-id>:UMI:<umi>:`.
///
/// Anything after the first whitespace of `head` is dropped.
pub fn umi_tagged_id(head: &[u8], umi: &[u8]) -> Vec<u8> {
    let id = read_id(head);
    let mut dest = Vec::with_capacity(id.len() + UMI_TAG.len() + umi.len() + 1);
    dest.extend_from_slice(id);
    dest.extend_from_slice(UMI_TAG);
    dest.extend_from_slice(umi);
    dest.push(b':');
    dest
}

/// The Illumina-style read name, the identifier portion of a FASTQ header.
#[derive(Default, Debug)]
pub struct ReadName<'a>
where
    [u8]: ToOwned<Owned = Vec<u8>>,
{
    /// The instrument ID.
    pub instrument: Cow<'a, [u8]>,
    /// The run number on the instrument.
    pub run_number: Cow<'a, [u8]>,
    /// The flow cell ID.
    pub flowcell_id: Cow<'a, [u8]>,
    /// The flow cell lane number.
    pub lane: Cow<'a, [u8]>,
    /// The flow cell tile number.
    pub tile: Cow<'a, [u8]>,
    /// The X coordinate of the cluster.
    pub x_pos: Cow<'a, [u8]>,
    /// The Y coordinate of the cluster.
    pub y_pos: Cow<'a, [u8]>,
}

impl<'a> TryFrom<&'a [u8]> for ReadName<'a> {
    type Error = ReadNameError;

    /// Parse the identifier of a FASTQ header into a [`ReadName`].  The comment, if any, is
    /// ignored.
    fn try_from(bytes: &'a [u8]) -> Result<Self, Self::Error> {
        let bytes = bytes.strip_prefix(b"@").unwrap_or(bytes);
        let mut parts = read_id(bytes).splitn(8, |c| *c == b':');

        let instrument = Cow::from(parts.next().ok_or(ReadNameError::MissingInstrument)?);
        let run_number = Cow::from(parts.next().ok_or(ReadNameError::MissingRunNumber)?);
        let flowcell_id = Cow::from(parts.next().ok_or(ReadNameError::MissingFlowCellId)?);
        let lane = Cow::from(parts.next().ok_or(ReadNameError::MissingLane)?);
        let tile = Cow::from(parts.next().ok_or(ReadNameError::MissingTile)?);
        let x_pos = Cow::from(parts.next().ok_or(ReadNameError::MissingXPos)?);
        let y_pos = Cow::from(parts.next().ok_or(ReadNameError::MissingYPos)?);

        if flowcell_id.is_empty() {
            return Err(ReadNameError::MissingFlowCellId);
        }
        Ok(Self { instrument, run_number, flowcell_id, lane, tile, x_pos, y_pos })
    }
}

#[cfg(test)]
mod test {
    use super::{ids_match, read_id, umi_tagged_id, ReadName};

    #[test]
    fn test_all_fields() {
        let header = "aass235_9:1:aa30ZZ:2:3:4:5 1:N:0:ACTG+GCTA other";
        let name: ReadName = header.as_bytes().try_into().unwrap();
        assert_eq!(b"aass235_9", name.instrument.as_ref());
        assert_eq!(b"1", name.run_number.as_ref());
        assert_eq!(b"aa30ZZ", name.flowcell_id.as_ref());
        assert_eq!(b"2", name.lane.as_ref());
        assert_eq!(b"3", name.tile.as_ref());
        assert_eq!(b"4", name.x_pos.as_ref());
        assert_eq!(b"5", name.y_pos.as_ref());
    }

    #[test]
    fn test_bad_read_name() {
        assert!(ReadName::try_from("Hello World".as_bytes()).is_err());
        assert!(ReadName::try_from("H00233:4:AAAFGW3HV:1:1101:1000".as_bytes()).is_err());
        assert!(ReadName::try_from("H00233:4::1:1101:1:1000".as_bytes()).is_err());
    }

    #[test]
    fn test_read_id() {
        assert_eq!(read_id(b"frag1 1:N:0:ACGT"), b"frag1");
        assert_eq!(read_id(b"frag1\tcomment"), b"frag1");
        assert_eq!(read_id(b"frag1"), b"frag1");
        assert_eq!(read_id(b""), b"");
    }

    #[test]
    fn test_ids_match() {
        assert!(ids_match(b"q1 1:N:0:ACGT", b"q1 2:N:0:ACGT"));
        assert!(ids_match(b"q1", b"q1 2:N:0:ACGT"));
        assert!(!ids_match(b"q1 1:N:0:ACGT", b"q2 1:N:0:ACGT"));
        assert!(!ids_match(b"q1", b"q10"));
    }

    #[test]
    fn test_umi_tagged_id_drops_comment() {
        let tagged = umi_tagged_id(b"q1 2:N:0:ACGT", b"GATTACA");
        assert_eq!(tagged, b"q1:UMI:GATTACA:".to_vec());
        assert!(!tagged.contains(&b' '));
    }
}
