use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("state file is corrupt: {0}")]
    Corrupt(String),

    #[error("state dir is locked: {0}")]
    Locked(String),

    #[error("unsupported state version {0}")]
    UnsupportedVersion(u64),

    #[error("io error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub(crate) fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            source,
        }
    }
}
