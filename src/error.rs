use std::path::PathBuf;

use thiserror::Error;

/// Everything that can abort a matchup run. None of these are retried.
#[derive(Debug, Error)]
pub enum MatchupError {
    #[error("the file {} does not exist", .0.display())]
    InputNotFound(PathBuf),

    #[error("{}: {}", .path.display(), .reason)]
    Schema { path: PathBuf, reason: String },

    #[error("{}: row {}: cannot find a d#### day offset in identifier '{}'", .path.display(), .row, .id)]
    IdentifierParse { path: PathBuf, row: usize, id: String },

    #[error("csv error in {}", .path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("i/o error on {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not move finished output into place at {}", .path.display())]
    Persist {
        path: PathBuf,
        #[source]
        source: tempfile::PersistError,
    },
}

impl MatchupError {
    pub(crate) fn schema(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Schema {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T, E = MatchupError> = std::result::Result<T, E>;
