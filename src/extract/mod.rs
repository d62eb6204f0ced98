//! Driving the external bundle extractor.
//!
//! The extractor is an out-of-process tool whose output layout is tolerated,
//! not controlled: its exit code is advisory, and only the presence of a
//! usable output file determines an extraction's outcome.

mod escalation;
mod extractor;

pub use escalation::{
    clear_dir, escalation_levels, expected_extension, locate_output, Escalator, ExtractionJob,
    ExtractionOutcome,
};
pub use extractor::{BundleExtractor, CliExtractor, ExtractFilters, ExtractorExit};
