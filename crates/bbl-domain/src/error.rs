use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("invalid env id: {0}")]
    InvalidEnvId(String),

    #[error("invalid iaas: {0}")]
    InvalidIaas(String),

    #[error("invalid load balancer type: {0}")]
    InvalidLbKind(String),

    #[error("state invariant violated: {0}")]
    InvariantViolation(String),
}
