//! Per-post content errors

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that reject a single post without aborting the build
#[derive(Error, Debug)]
pub enum ContentError {
    #[error("{}:{line}: malformed metadata: {message}", path.display())]
    MalformedMetadata {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error(
        "ambiguous variant '{lang}' for post '{slug}': {} and {}",
        first.display(),
        second.display()
    )]
    AmbiguousVariant {
        slug: String,
        lang: String,
        first: PathBuf,
        second: PathBuf,
    },

    #[error("{}:{line}: unterminated {construct}", path.display())]
    UnterminatedBlock {
        path: PathBuf,
        line: usize,
        construct: String,
    },

    #[error("duplicate slug '{slug}': {} already defined by {}", path.display(), existing.display())]
    DuplicateSlug {
        slug: String,
        path: PathBuf,
        existing: PathBuf,
    },

    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ContentError {
    pub(crate) fn malformed(path: &Path, line: usize, message: impl Into<String>) -> Self {
        Self::MalformedMetadata {
            path: path.to_path_buf(),
            line,
            message: message.into(),
        }
    }

    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    /// File the error is attributed to
    pub fn path(&self) -> &Path {
        match self {
            Self::MalformedMetadata { path, .. }
            | Self::UnterminatedBlock { path, .. }
            | Self::DuplicateSlug { path, .. }
            | Self::Io { path, .. } => path,
            Self::AmbiguousVariant { second, .. } => second,
        }
    }

    /// Line in `path` the error points at, when known
    pub fn line(&self) -> Option<usize> {
        match self {
            Self::MalformedMetadata { line, .. } | Self::UnterminatedBlock { line, .. } => {
                Some(*line)
            }
            _ => None,
        }
    }
}
