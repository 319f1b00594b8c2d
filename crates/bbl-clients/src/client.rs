use std::sync::Arc;

use async_trait::async_trait;
use bbl_domain::{AwsCredentials, AzureCredentials, GcpCredentials};

use crate::aws::AwsClient;
use crate::azure::AzureClient;
use crate::error::ClientError;
use crate::gcp::GcpClient;

/// Remote view of a registered keypair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteKeyPair {
    pub name: String,
    /// MD5 of the PKIX-encoded public key, colon-separated hex pairs.
    pub fingerprint: String,
}

#[async_trait]
pub trait NetworkClient: Send + Sync + 'static {
    /// True when the IaaS already holds a network whose name derives from
    /// `env_id`. Used for env-id collision checks.
    async fn check_exists(&self, env_id: &str) -> Result<bool, ClientError>;
}

#[async_trait]
pub trait KeyPairClient: Send + Sync + 'static {
    async fn describe(&self, name: &str) -> Result<Option<RemoteKeyPair>, ClientError>;
    async fn import(&self, name: &str, public_key: &str) -> Result<(), ClientError>;
    /// Idempotent; deleting an absent keypair is a success.
    async fn delete(&self, name: &str) -> Result<(), ClientError>;
}

#[async_trait]
pub trait InstanceLister: Send + Sync + 'static {
    /// Names of the VMs currently inside the given network. The identifier is
    /// IaaS-shaped: a VPC id on AWS, a network name on GCP, a resource group
    /// on Azure.
    async fn list_instances(&self, network_id: &str) -> Result<Vec<String>, ClientError>;
}

/// The per-IaaS capability record consumed by the pipeline. One constructor
/// per provider; the dispatcher is generic over the record and never matches
/// on the provider itself.
#[derive(Clone)]
pub struct IaasClients {
    pub network: Arc<dyn NetworkClient>,
    pub keypairs: Arc<dyn KeyPairClient>,
    pub instances: Arc<dyn InstanceLister>,
}

impl IaasClients {
    pub fn aws(creds: AwsCredentials) -> Self {
        let client = Arc::new(AwsClient::new(creds));
        Self {
            network: client.clone(),
            keypairs: client.clone(),
            instances: client,
        }
    }

    pub fn gcp(creds: GcpCredentials) -> Result<Self, ClientError> {
        let client = Arc::new(GcpClient::new(creds)?);
        Ok(Self {
            network: client.clone(),
            keypairs: client.clone(),
            instances: client,
        })
    }

    pub fn azure(creds: AzureCredentials) -> Self {
        let client = Arc::new(AzureClient::new(creds));
        Self {
            network: client.clone(),
            keypairs: client.clone(),
            instances: client,
        }
    }
}
