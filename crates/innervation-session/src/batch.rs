//! Inputs and side records of a batch.

use std::path::Path;

use innervation_pipeline::FormatHint;
use serde::{Deserialize, Serialize};

/// One encoded image in a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchFile {
    /// Name recorded in the results file.
    pub identifier: String,
    /// Encoded image bytes.
    pub bytes: Vec<u8>,
    /// Container format, if known.
    pub hint: FormatHint,
}

impl BatchFile {
    /// Build a file, deriving the format hint from the identifier's
    /// extension.
    #[must_use]
    pub fn new(identifier: impl Into<String>, bytes: Vec<u8>) -> Self {
        let identifier = identifier.into();
        let hint = FormatHint::from_path(Path::new(&identifier));
        Self {
            identifier,
            bytes,
            hint,
        }
    }

    /// Override the format hint.
    #[must_use]
    pub const fn with_hint(mut self, hint: FormatHint) -> Self {
        self.hint = hint;
        self
    }
}

/// A file skipped because it could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodeFailure {
    /// The file's identifier.
    pub identifier: String,
    /// Decoder error message.
    pub message: String,
}
