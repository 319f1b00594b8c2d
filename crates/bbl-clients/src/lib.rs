mod aws;
mod azure;
mod client;
mod error;
pub mod fingerprint;
mod gcp;

pub use aws::AwsClient;
pub use azure::AzureClient;
pub use client::{IaasClients, InstanceLister, KeyPairClient, NetworkClient, RemoteKeyPair};
pub use error::ClientError;
pub use gcp::GcpClient;
