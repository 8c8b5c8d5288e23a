use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by the search core.
///
/// Per-document anomalies (missing fields, odd attribute shapes, unknown
/// tokens) never reach this type: they are absorbed while indexing or scoring.
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A persisted artifact is absent, unreadable or inconsistent. Fatal at startup.
    #[error("failed to load index artifact {}: {reason}", path.display())]
    ArtifactLoad { path: PathBuf, reason: String },

    #[error("Invalid match mode: {0} (expected any|all)")]
    InvalidMode(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn artifact(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Error::ArtifactLoad { path: path.into(), reason: reason.to_string() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifact_error_names_the_file() {
        let err = Error::artifact("/tmp/idx/reviews.json", "No such file or directory");
        assert_eq!(
            err.to_string(),
            "failed to load index artifact /tmp/idx/reviews.json: No such file or directory"
        );
    }
}
