use thiserror::Error;

#[derive(Debug, Error)]
pub enum CloudConfigError {
    #[error("failed to generate cloud-config: {0}")]
    Generate(String),

    #[error("failed to upload cloud-config: {0}")]
    Upload(String),

    #[error("io error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Exec(#[from] bbl_exec::ExecError),
}
