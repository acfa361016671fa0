//! A library for demultiplexing paired-end FASTQs by an in-line cell barcode and UMI.
//!
//! # Overview
//!
//! The flow of data is as follows:
//!
//! - The [`barcode_table::BarcodeTable`] maps barcode sequences to barcode ids, and the
//!   [`sample_index::SampleIndex`] maps (flowcell, lane, Illumina index, barcode id) to a sample.
//! - The [`output_router::OutputRouter`] opens one FASTQ per sample plus the undetermined FASTQs.
//! - For each input, a [`naming::NamingConvention`] finds the mate 2 file and the run the input
//!   came from, and a [`demux::Demultiplex`] implementation classifies each read pair as
//!   unqualified, undetermined, or belonging to a sample, writing it through the router.
//! - The per-input [`metrics::Counters`] are merged by the [`metrics::StatsAggregator`] and
//!   written as the statistics table.
#![deny(unsafe_code)]
#![allow(
    clippy::must_use_candidate,
    clippy::missing_panics_doc,
    clippy::missing_errors_doc,
    clippy::module_name_repetitions
)]
pub mod barcode_table;
pub mod demux;
pub mod errors;
pub mod metrics;
pub mod naming;
pub mod opts;
pub mod output_router;
pub mod read_name;
pub mod run;
pub mod sample_index;
pub mod utils;
