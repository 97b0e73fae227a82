use std::path::PathBuf;

/// Errors that abort a run or a single file operation.
///
/// Only [`Error::CorpusRootMissing`] and [`Error::Config`] are fatal for a
/// whole run; everything else is contained per file by the callers.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("corpus root not found: {}", .0.display())]
    CorpusRootMissing(PathBuf),

    #[error("invalid config {}: {source}", path.display())]
    Config {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid exclude pattern: {0}")]
    Glob(#[from] globset::Error),

    #[error("json encoding failed: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
