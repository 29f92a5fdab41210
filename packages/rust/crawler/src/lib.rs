//! Rendering validation for published lessons.
//!
//! [`ValidationHarness`] samples a navigation index, loads each sample through
//! a [`PageProbe`] with bounded concurrency, and rolls the checks into a
//! [`QualityReport`].

pub mod harness;
pub mod probe;
pub mod report;

pub use harness::{
    CANCELLED, MarkdownQuality, SampledLesson, TestResult, ValidationHarness, sample_positions,
    select_samples,
};
pub use probe::{ElementCounts, HttpProbe, PageProbe, PageSnapshot, has_raw_markup};
pub use report::{ModuleBreakdown, QualityReport};
