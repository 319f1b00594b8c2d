use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("iaas unreachable: {0}")]
    Unreachable(String),

    #[error("iaas api error ({code}): {message}")]
    Api { code: String, message: String },

    #[error("internal client error: {0}")]
    Internal(String),
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        ClientError::Unreachable(e.to_string())
    }
}
