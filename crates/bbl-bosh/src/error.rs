use thiserror::Error;

#[derive(Debug, Error)]
pub enum BoshError {
    #[error("bosh create-env of {deployment} failed: {message}")]
    CreateEnv {
        deployment: &'static str,
        message: String,
    },

    #[error("bosh delete-env of {deployment} failed: {message}")]
    DeleteEnv {
        deployment: &'static str,
        message: String,
    },

    #[error("failed to read credentials from {deployment} vars store: {message}")]
    VarsStore {
        deployment: &'static str,
        message: String,
    },

    #[error("failed to parse bosh version from {0:?}")]
    VersionParse(String),

    #[error("io error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Exec(#[from] bbl_exec::ExecError),
}

impl BoshError {
    pub(crate) fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        BoshError::Io {
            path: path.into(),
            source,
        }
    }
}
