use bbl_domain::DomainError;
use bbl_store::StoreError;
use thiserror::Error;

/// The operator-facing error taxonomy. Every manager failure is wrapped with
/// the stage it happened in; the variants the dispatcher matches on get their
/// own shape.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{0}")]
    UserInput(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("invalid env id: {0}")]
    InvalidEnvId(String),

    #[error("env id {0} collides with an existing environment on this iaas")]
    EnvIdUnavailable(String),

    #[error("iaas unreachable: {0}")]
    IaasUnreachable(String),

    #[error("keypair fingerprint mismatch after import: local {local}, remote {remote}")]
    KeyPairFingerprintMismatch { local: String, remote: String },

    #[error("director unreachable: {0}")]
    DirectorUnreachable(String),

    #[error("{label} {network} is not safe to delete; vms still exist: [{vms}]")]
    NetworkNotSafeToDelete {
        label: String,
        network: String,
        /// Offending VM names, comma-joined.
        vms: String,
    },

    #[error("not implemented for {0}")]
    NotImplemented(String),

    #[error("{stage} failed: {message}")]
    Stage { stage: &'static str, message: String },

    #[error("internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    pub fn stage(stage: &'static str, err: impl std::fmt::Display) -> Self {
        PipelineError::Stage {
            stage,
            message: err.to_string(),
        }
    }

    /// 0 is success; 1 is an operator-recoverable failure; 2 is a bug.
    pub fn exit_code(&self) -> i32 {
        match self {
            PipelineError::Internal(_) => 2,
            _ => 1,
        }
    }
}

impl From<DomainError> for PipelineError {
    fn from(e: DomainError) -> Self {
        match e {
            DomainError::InvalidEnvId(id) => PipelineError::InvalidEnvId(id),
            DomainError::InvariantViolation(msg) => PipelineError::Internal(msg),
            other => PipelineError::UserInput(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_errors_exit_2_everything_else_1() {
        assert_eq!(PipelineError::Internal("bug".into()).exit_code(), 2);
        assert_eq!(PipelineError::UserInput("bad flag".into()).exit_code(), 1);
        assert_eq!(
            PipelineError::NotImplemented("aws".into()).exit_code(),
            1
        );
    }

    #[test]
    fn not_safe_to_delete_message_shape() {
        let err = PipelineError::NetworkNotSafeToDelete {
            label: "vpc".into(),
            network: "vpc-12345".into(),
            vms: "user-workload".into(),
        };
        assert_eq!(
            err.to_string(),
            "vpc vpc-12345 is not safe to delete; vms still exist: [user-workload]"
        );
    }
}
