pub mod error;
pub mod naming;
pub mod types;

#[cfg(test)]
mod tests;

pub use error::DomainError;
pub use types::{
    AwsCredentials, AzureCredentials, Director, GcpCredentials, Iaas, Jumpbox, KeyPair, Lb,
    LbKind, State, STATE_VERSION,
};
