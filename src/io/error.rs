use std::fmt::{self, Display};
use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Content that violates the grammar of a spectrum file.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FormatError {
    #[error("End of {file_name} reached before the end of the record{}", describe_title(.title))]
    TruncatedRecord {
        file_name: String,
        title: Option<String>,
    },
    #[error("'{token}' could not be processed as a valid precursor charge")]
    InvalidCharge { token: String },
    #[error("Cannot parse retention time: {raw}{}", describe_title(.title))]
    InvalidRetentionTime { raw: String, title: Option<String> },
    #[error("Cannot parse precursor mass: {raw}{}", describe_title(.title))]
    InvalidPrecursorMass { raw: String, title: Option<String> },
    #[error("Peak line not recognized: {line}")]
    InvalidPeakIntensity { line: String },
    #[error("Failed to decode spectrum title: {raw}")]
    InvalidTitleEncoding { raw: String },
}

fn describe_title(title: &Option<String>) -> String {
    match title {
        Some(title) => format!(" (title: {title})"),
        None => String::new(),
    }
}

impl FormatError {
    /// Attach the title of the record being read, if the error can carry one
    pub fn with_title(mut self, title: Option<&str>) -> Self {
        match &mut self {
            Self::TruncatedRecord { title: slot, .. }
            | Self::InvalidRetentionTime { title: slot, .. }
            | Self::InvalidPrecursorMass { title: slot, .. } => {
                if slot.is_none() {
                    *slot = title.map(|s| s.to_string());
                }
            }
            _ => {}
        }
        self
    }
}

/// Which half of the delete-then-rename file replacement failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplaceStage {
    Delete,
    Rename,
}

impl Display for ReplaceStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Delete => f.write_str("delete the original spectrum file"),
            Self::Rename => f.write_str("replace the original spectrum file"),
        }
    }
}

#[derive(Debug, Error)]
pub enum SpectrumFileError {
    #[error("Encountered an IO error: {0}")]
    IOError(
        #[from]
        #[source]
        io::Error,
    ),
    #[error(transparent)]
    Format(#[from] FormatError),
    #[error("Failed to {stage} {}: {source}", .path.display())]
    ReplaceFailed {
        stage: ReplaceStage,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{operation} is not supported for {dialect} files")]
    UnsupportedOperation {
        operation: &'static str,
        dialect: &'static str,
    },
}

impl SpectrumFileError {
    /// The [`FormatError`] behind this error, if the failure was caused by file content
    pub fn as_format_error(&self) -> Option<&FormatError> {
        match self {
            Self::Format(e) => Some(e),
            _ => None,
        }
    }
}

pub type SpectrumFileResult<T> = Result<T, SpectrumFileError>;
