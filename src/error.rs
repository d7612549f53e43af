use std::path::PathBuf;

/// Errors surfaced at the library boundary.
///
/// Codec internals report failures as [`anyhow::Error`] with context chains; those are wrapped
/// into [`MetadataError::Rewrite`] once they reach a file rewrite.
#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    /// The file is not a JPEG container. Reads and writes treat this as "not applicable".
    #[error("{} is not a JPEG file (detected {detected})", path.display())]
    NotJpeg { path: PathBuf, detected: String },

    #[error("I/O error on {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A rewrite pass failed. The source file was left as it was before the pass.
    #[error("failed to rewrite {}", path.display())]
    Rewrite {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    /// A background write task panicked or was cancelled before reporting a result.
    #[error("background write of {} did not complete", path.display())]
    WriteTask {
        path: PathBuf,
        #[source]
        source: tokio::task::JoinError,
    },
}

impl MetadataError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn is_not_jpeg(&self) -> bool {
        matches!(self, Self::NotJpeg { .. })
    }
}

pub type Result<T, E = MetadataError> = std::result::Result<T, E>;
