use bbl_domain::State;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("terraform version {found} is outside the supported range [{min}, {max})")]
    UnsupportedVersion {
        found: String,
        min: &'static str,
        max: &'static str,
    },

    #[error("failed to parse terraform version from {0:?}")]
    VersionParse(String),

    #[error("terraform init failed: {0}")]
    Init(String),

    /// Apply or destroy failed after possibly mutating remote resources.
    /// Carries the state with the tfstate read back from disk so the caller
    /// can persist partial progress before surfacing the failure.
    #[error("terraform {operation} failed: {message}")]
    Terraform {
        operation: &'static str,
        message: String,
        state: Box<State>,
    },

    #[error("required output '{key}' missing for iaas {iaas}, lb type {lb}")]
    MissingOutput {
        key: &'static str,
        iaas: String,
        lb: String,
    },

    #[error("failed to parse terraform outputs: {0}")]
    OutputParse(String),

    #[error("engine misconfigured: {0}")]
    Misconfigured(String),

    #[error("io error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Exec(#[from] bbl_exec::ExecError),
}

impl EngineError {
    pub(crate) fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        EngineError::Io {
            path: path.into(),
            source,
        }
    }
}
