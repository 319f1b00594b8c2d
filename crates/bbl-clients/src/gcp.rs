use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use bbl_domain::GcpCredentials;

use crate::client::{InstanceLister, KeyPairClient, NetworkClient, RemoteKeyPair};
use crate::error::ClientError;
use crate::fingerprint;

// ── Token provider ────────────────────────────────────────────────────────────

/// Abstraction over GCP token acquisition — enables test injection.
#[async_trait]
trait TokenProvider: Send + Sync {
    async fn token(&self) -> Result<String, ClientError>;
}

/// Production token provider backed by the configured service account key.
struct ServiceAccountTokenProvider {
    inner: gcp_auth::CustomServiceAccount,
}

#[async_trait]
impl TokenProvider for ServiceAccountTokenProvider {
    async fn token(&self) -> Result<String, ClientError> {
        use gcp_auth::TokenProvider as _;
        let token = self
            .inner
            .token(&["https://www.googleapis.com/auth/cloud-platform"])
            .await
            .map_err(|e| ClientError::Unreachable(format!("GCP auth failed: {}", e)))?;
        Ok(token.as_str().to_string())
    }
}

// ── GcpClient ─────────────────────────────────────────────────────────────────

/// Compute Engine capability client. The SSH keypair lives in the project's
/// common instance metadata under the `sshKeys` key, one line per key, with
/// the keypair name as the trailing comment.
pub struct GcpClient {
    project: String,
    client: reqwest::Client,
    token: Box<dyn TokenProvider>,
    base: String,
}

impl GcpClient {
    pub fn new(creds: GcpCredentials) -> Result<Self, ClientError> {
        if creds.service_account_key.is_empty() {
            return Err(ClientError::Internal(
                "a GCP service account key is required".into(),
            ));
        }
        let account = gcp_auth::CustomServiceAccount::from_json(&creds.service_account_key)
            .map_err(|e| ClientError::Internal(format!("parse service account key: {}", e)))?;

        let project = if creds.project_id.is_empty() {
            serde_json::from_str::<Value>(&creds.service_account_key)
                .ok()
                .and_then(|v| v["project_id"].as_str().map(str::to_string))
                .ok_or_else(|| {
                    ClientError::Internal("service account key has no project_id".into())
                })?
        } else {
            creds.project_id.clone()
        };

        Ok(Self {
            project,
            client: reqwest::Client::new(),
            token: Box::new(ServiceAccountTokenProvider { inner: account }),
            base: "https://compute.googleapis.com".into(),
        })
    }

    async fn get(&self, url: &str) -> Result<Option<Value>, ClientError> {
        let token = self.token.token().await?;
        let resp = self.client.get(url).bearer_auth(token).send().await?;
        let status = resp.status();
        if status.as_u16() == 404 {
            return Ok(None);
        }
        let body: Value = resp.json().await?;
        debug!(url, %status, "gcp response");
        if !status.is_success() {
            return Err(api_error(&body, status.as_u16()));
        }
        Ok(Some(body))
    }

    async fn post(&self, url: &str, payload: Value) -> Result<Value, ClientError> {
        let token = self.token.token().await?;
        let resp = self
            .client
            .post(url)
            .bearer_auth(token)
            .json(&payload)
            .send()
            .await?;
        let status = resp.status();
        let body: Value = resp.json().await?;
        if !status.is_success() {
            return Err(api_error(&body, status.as_u16()));
        }
        Ok(body)
    }

    async fn project_metadata(&self) -> Result<(String, Vec<String>), ClientError> {
        let url = format!("{}/compute/v1/projects/{}", self.base, self.project);
        let body = self
            .get(&url)
            .await?
            .ok_or_else(|| ClientError::Internal(format!("project {} not found", self.project)))?;
        let metadata = &body["commonInstanceMetadata"];
        let fingerprint = metadata["fingerprint"].as_str().unwrap_or_default().to_string();
        let ssh_keys = metadata["items"]
            .as_array()
            .into_iter()
            .flatten()
            .find(|item| item["key"] == "sshKeys")
            .and_then(|item| item["value"].as_str())
            .map(|v| v.lines().map(str::to_string).collect())
            .unwrap_or_default();
        Ok((fingerprint, ssh_keys))
    }

    async fn set_ssh_keys(
        &self,
        metadata_fingerprint: &str,
        lines: Vec<String>,
    ) -> Result<(), ClientError> {
        let url = format!(
            "{}/compute/v1/projects/{}/setCommonInstanceMetadata",
            self.base, self.project
        );
        self.post(
            &url,
            json!({
                "fingerprint": metadata_fingerprint,
                "items": [{ "key": "sshKeys", "value": lines.join("\n") }],
            }),
        )
        .await?;
        Ok(())
    }
}

fn api_error(body: &Value, status: u16) -> ClientError {
    ClientError::Api {
        code: body["error"]["code"]
            .as_u64()
            .map(|c| c.to_string())
            .unwrap_or_else(|| status.to_string()),
        message: body["error"]["message"]
            .as_str()
            .unwrap_or("unknown error")
            .to_string(),
    }
}

/// One project-metadata sshKeys line: `vcap:<openssh key> <name>`.
fn metadata_line(name: &str, public_key: &str) -> String {
    format!("vcap:{} {}", public_key.trim(), name)
}

fn line_matches(line: &str, name: &str) -> bool {
    line.trim_end().ends_with(&format!(" {}", name))
}

/// The OpenSSH part of a metadata line (strips the `vcap:` login prefix).
fn line_public_key(line: &str) -> &str {
    line.strip_prefix("vcap:").unwrap_or(line).trim()
}

#[async_trait]
impl NetworkClient for GcpClient {
    async fn check_exists(&self, env_id: &str) -> Result<bool, ClientError> {
        let url = format!(
            "{}/compute/v1/projects/{}/global/networks/{}-network",
            self.base, self.project, env_id
        );
        Ok(self.get(&url).await?.is_some())
    }
}

#[async_trait]
impl KeyPairClient for GcpClient {
    async fn describe(&self, name: &str) -> Result<Option<RemoteKeyPair>, ClientError> {
        let (_, lines) = self.project_metadata().await?;
        let Some(line) = lines.iter().find(|l| line_matches(l, name)) else {
            return Ok(None);
        };
        let fingerprint = fingerprint::openssh_md5(line_public_key(line))?;
        Ok(Some(RemoteKeyPair {
            name: name.to_string(),
            fingerprint,
        }))
    }

    async fn import(&self, name: &str, public_key: &str) -> Result<(), ClientError> {
        let (metadata_fingerprint, mut lines) = self.project_metadata().await?;
        lines.retain(|l| !line_matches(l, name));
        lines.push(metadata_line(name, public_key));
        self.set_ssh_keys(&metadata_fingerprint, lines).await
    }

    async fn delete(&self, name: &str) -> Result<(), ClientError> {
        let (metadata_fingerprint, mut lines) = self.project_metadata().await?;
        let before = lines.len();
        lines.retain(|l| !line_matches(l, name));
        if lines.len() == before {
            return Ok(());
        }
        self.set_ssh_keys(&metadata_fingerprint, lines).await
    }
}

#[async_trait]
impl InstanceLister for GcpClient {
    async fn list_instances(&self, network_id: &str) -> Result<Vec<String>, ClientError> {
        let url = format!(
            "{}/compute/v1/projects/{}/aggregated/instances",
            self.base, self.project
        );
        let Some(body) = self.get(&url).await? else {
            return Ok(Vec::new());
        };

        let suffix = format!("/{}", network_id);
        let mut names = Vec::new();
        if let Some(scopes) = body["items"].as_object() {
            for scope in scopes.values() {
                for instance in scope["instances"].as_array().into_iter().flatten() {
                    let in_network = instance["networkInterfaces"]
                        .as_array()
                        .into_iter()
                        .flatten()
                        .any(|nic| {
                            nic["network"]
                                .as_str()
                                .map_or(false, |n| n.ends_with(&suffix))
                        });
                    if in_network {
                        if let Some(name) = instance["name"].as_str() {
                            names.push(name.to_string());
                        }
                    }
                }
            }
        }
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_line_round_trips() {
        let line = metadata_line("keypair-bbl-demo", "ssh-rsa AAAAB3Nza");
        assert_eq!(line, "vcap:ssh-rsa AAAAB3Nza keypair-bbl-demo");
        assert!(line_matches(&line, "keypair-bbl-demo"));
        assert!(!line_matches(&line, "keypair-other"));
        assert_eq!(line_public_key(&line), "ssh-rsa AAAAB3Nza keypair-bbl-demo");
    }

    #[test]
    fn line_matches_requires_exact_comment() {
        let line = "vcap:ssh-rsa AAAA keypair-bbl-demo-2";
        assert!(!line_matches(line, "keypair-bbl-demo"));
    }
}
