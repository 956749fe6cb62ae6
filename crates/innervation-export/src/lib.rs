//! innervation-export: Pure serializers for batch results (sans-IO)
//!
//! Writes accumulated measurements as a tab-separated results file,
//! reads such files back, summarizes a batch, and compares groups of
//! batches.

pub mod groups;
pub mod summary;
pub mod tsv;

pub use groups::{GroupSummary, OneWayAnova};
pub use summary::BatchSummary;
pub use tsv::{ParsedResults, ParsedRow, ResultRow, TsvOptions, parse_results, to_tsv};

/// Errors from reading or summarizing results.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    /// A value column holds NaN or infinity.
    #[error("line {line}: value {text:?} is not finite")]
    NonFiniteValue {
        /// 1-based line number.
        line: usize,
        /// The offending field.
        text: String,
    },

    /// No numeric values to summarize.
    #[error("no index values found")]
    NoValues,

    /// A group comparison needs at least two groups.
    #[error("need at least two groups to compare, got {found}")]
    TooFewGroups {
        /// Number of groups supplied.
        found: usize,
    },

    /// A group in a comparison has no values.
    #[error("group {index} has no values")]
    EmptyGroup {
        /// 0-based position of the group.
        index: usize,
    },

    /// The data cannot support an analysis of variance.
    #[error("ANOVA is undefined: {0}")]
    DegenerateAnova(String),
}
