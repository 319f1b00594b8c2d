use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::debug;

use bbl_domain::AzureCredentials;

use crate::client::{InstanceLister, KeyPairClient, NetworkClient, RemoteKeyPair};
use crate::error::ClientError;
use crate::fingerprint;

const MGMT_API_VERSION: &str = "2021-04-01";
const COMPUTE_API_VERSION: &str = "2023-07-01";

/// Azure Resource Manager capability client, authenticated as a service
/// principal. The SSH keypair is registered as a `Microsoft.Compute/
/// sshPublicKeys` resource inside a resource group named after the keypair,
/// so it exists independently of the environment's own resource group.
pub struct AzureClient {
    creds: AzureCredentials,
    client: reqwest::Client,
    management: String,
    login: String,
    token_cache: Mutex<Option<(String, Instant)>>,
}

impl AzureClient {
    pub fn new(creds: AzureCredentials) -> Self {
        Self {
            creds,
            client: reqwest::Client::new(),
            management: "https://management.azure.com".into(),
            login: "https://login.microsoftonline.com".into(),
            token_cache: Mutex::new(None),
        }
    }

    async fn token(&self) -> Result<String, ClientError> {
        {
            let guard = self.token_cache.lock().await;
            if let Some((token, expiry)) = guard.as_ref() {
                if Instant::now() < *expiry {
                    return Ok(token.clone());
                }
            }
        }

        let url = format!("{}/{}/oauth2/token", self.login, self.creds.tenant_id);
        let resp = self
            .client
            .post(&url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.creds.client_id.as_str()),
                ("client_secret", self.creds.client_secret.as_str()),
                ("resource", "https://management.azure.com/"),
            ])
            .send()
            .await?;
        let status = resp.status();
        let body: Value = resp.json().await?;
        if !status.is_success() {
            return Err(ClientError::Api {
                code: status.to_string(),
                message: body["error_description"]
                    .as_str()
                    .unwrap_or("azure token request failed")
                    .to_string(),
            });
        }
        let token = body["access_token"]
            .as_str()
            .ok_or_else(|| ClientError::Internal("azure token response had no access_token".into()))?
            .to_string();

        let mut guard = self.token_cache.lock().await;
        *guard = Some((token.clone(), Instant::now() + Duration::from_secs(45 * 60)));
        Ok(token)
    }

    async fn request(
        &self,
        method: reqwest::Method,
        url: &str,
        payload: Option<Value>,
    ) -> Result<(u16, Value), ClientError> {
        let token = self.token().await?;
        let mut req = self.client.request(method, url).bearer_auth(token);
        if let Some(payload) = payload {
            req = req.json(&payload);
        }
        let resp = req.send().await?;
        let status = resp.status().as_u16();
        let body: Value = resp.json().await.unwrap_or(Value::Null);
        debug!(url, status, "azure response");
        Ok((status, body))
    }

    fn subscription_url(&self, suffix: &str) -> String {
        format!(
            "{}/subscriptions/{}{}",
            self.management, self.creds.subscription_id, suffix
        )
    }

    fn keypair_group_url(&self, name: &str) -> String {
        self.subscription_url(&format!(
            "/resourcegroups/{}?api-version={}",
            name, MGMT_API_VERSION
        ))
    }

    fn keypair_resource_url(&self, name: &str) -> String {
        self.subscription_url(&format!(
            "/resourceGroups/{}/providers/Microsoft.Compute/sshPublicKeys/{}?api-version={}",
            name, name, COMPUTE_API_VERSION
        ))
    }
}

fn api_error(status: u16, body: &Value) -> ClientError {
    ClientError::Api {
        code: body["error"]["code"]
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(|| status.to_string()),
        message: body["error"]["message"]
            .as_str()
            .unwrap_or("unknown error")
            .to_string(),
    }
}

#[async_trait]
impl NetworkClient for AzureClient {
    async fn check_exists(&self, env_id: &str) -> Result<bool, ClientError> {
        let url = self.subscription_url(&format!(
            "/resourcegroups/{}-bosh?api-version={}",
            env_id, MGMT_API_VERSION
        ));
        let (status, body) = self.request(reqwest::Method::GET, &url, None).await?;
        match status {
            200 => Ok(true),
            404 => Ok(false),
            _ => Err(api_error(status, &body)),
        }
    }
}

#[async_trait]
impl KeyPairClient for AzureClient {
    async fn describe(&self, name: &str) -> Result<Option<RemoteKeyPair>, ClientError> {
        let (status, body) = self
            .request(reqwest::Method::GET, &self.keypair_resource_url(name), None)
            .await?;
        match status {
            200 => {
                let Some(public_key) = body["properties"]["publicKey"].as_str() else {
                    return Ok(None);
                };
                Ok(Some(RemoteKeyPair {
                    name: name.to_string(),
                    fingerprint: fingerprint::openssh_md5(public_key)?,
                }))
            }
            404 => Ok(None),
            _ => Err(api_error(status, &body)),
        }
    }

    async fn import(&self, name: &str, public_key: &str) -> Result<(), ClientError> {
        // Resource group PUT is create-or-update, so a re-import is cheap.
        let (status, body) = self
            .request(
                reqwest::Method::PUT,
                &self.keypair_group_url(name),
                Some(json!({ "location": self.creds.region })),
            )
            .await?;
        if !(200..300).contains(&status) {
            return Err(api_error(status, &body));
        }

        let (status, body) = self
            .request(
                reqwest::Method::PUT,
                &self.keypair_resource_url(name),
                Some(json!({
                    "location": self.creds.region,
                    "properties": { "publicKey": public_key.trim() },
                })),
            )
            .await?;
        if !(200..300).contains(&status) {
            return Err(api_error(status, &body));
        }
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<(), ClientError> {
        let (status, body) = self
            .request(reqwest::Method::DELETE, &self.keypair_group_url(name), None)
            .await?;
        match status {
            200..=299 | 404 => Ok(()),
            _ => Err(api_error(status, &body)),
        }
    }
}

#[async_trait]
impl InstanceLister for AzureClient {
    async fn list_instances(&self, network_id: &str) -> Result<Vec<String>, ClientError> {
        let url = self.subscription_url(&format!(
            "/resourceGroups/{}/providers/Microsoft.Compute/virtualMachines?api-version={}",
            network_id, COMPUTE_API_VERSION
        ));
        let (status, body) = self.request(reqwest::Method::GET, &url, None).await?;
        match status {
            200 => Ok(body["value"]
                .as_array()
                .into_iter()
                .flatten()
                .filter_map(|vm| vm["name"].as_str().map(str::to_string))
                .collect()),
            404 => Ok(Vec::new()),
            _ => Err(api_error(status, &body)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> AzureClient {
        AzureClient::new(AzureCredentials {
            client_id: "id".into(),
            client_secret: "secret".into(),
            tenant_id: "tenant".into(),
            subscription_id: "sub-123".into(),
            region: "eastus2".into(),
        })
    }

    #[test]
    fn urls_embed_subscription_and_api_version() {
        let c = client();
        assert_eq!(
            c.keypair_group_url("keypair-x"),
            "https://management.azure.com/subscriptions/sub-123/resourcegroups/keypair-x?api-version=2021-04-01"
        );
        assert!(c
            .keypair_resource_url("keypair-x")
            .contains("/sshPublicKeys/keypair-x?api-version="));
    }
}
