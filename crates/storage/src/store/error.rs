#![forbid(unsafe_code)]

use dp_core::UnresolvedRef;
use std::path::{Path, PathBuf};

/// Failure classes surfaced to callers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing project root, input file or schema. Nothing was touched.
    Precondition,
    /// Malformed batch input or on-disk record. Nothing was touched.
    Parse,
    /// Targets already exist and upsert was not requested. Nothing was written.
    Conflict,
    /// Records violate their schema. Files already written stay on disk.
    Validation,
    Io,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("not in a project: no .project or .git found above {}", .start.display())]
    NoProjectRoot { start: PathBuf },
    #[error("file not found: {}", .0.display())]
    MissingInput(PathBuf),
    #[error("schema not found: {}", .0.display())]
    MissingSchema(PathBuf),
    #[error("invalid schema {}: {message}", .path.display())]
    InvalidSchema { path: PathBuf, message: String },
    #[error("failed to parse {origin}: {message}")]
    Parse { origin: String, message: String },
    #[error("conflict: {} target(s) already exist: {}", .paths.len(), join_paths(.paths))]
    Conflict { paths: Vec<PathBuf> },
    #[error("unresolved references: {}", join_refs(.0))]
    UnresolvedReferences(Vec<UnresolvedRef>),
    #[error("{invalid} invalid record(s): {}", .summary.join(", "))]
    Validation { invalid: usize, summary: Vec<String> },
    #[error("io error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NoProjectRoot { .. }
            | Self::MissingInput(_)
            | Self::MissingSchema(_)
            | Self::InvalidSchema { .. } => ErrorKind::Precondition,
            Self::Parse { .. } | Self::UnresolvedReferences(_) => ErrorKind::Parse,
            Self::Conflict { .. } => ErrorKind::Conflict,
            Self::Validation { .. } => ErrorKind::Validation,
            Self::Io { .. } => ErrorKind::Io,
        }
    }

    pub(crate) fn io(path: &Path) -> impl FnOnce(std::io::Error) -> Self + '_ {
        move |source| Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn parse(origin: impl Into<String>, message: impl ToString) -> Self {
        Self::Parse {
            origin: origin.into(),
            message: message.to_string(),
        }
    }
}

fn join_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|path| path.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn join_refs(refs: &[UnresolvedRef]) -> String {
    refs.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
