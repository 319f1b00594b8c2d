use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bbl_clients::{ClientError, InstanceLister};
use bbl_domain::{naming, State};
use tracing::{debug, info};

use crate::error::PipelineError;

/// Fast pre-flight reachability check of the director recorded in state,
/// run before any destructive work.
#[async_trait]
pub trait EnvironmentValidator: Send + Sync + 'static {
    async fn validate(&self, state: &State) -> Result<(), PipelineError>;
}

/// [`EnvironmentValidator`] that probes the director's `/info` endpoint over
/// HTTPS, trusting the CA stored in state.
pub struct DirectorProbe {
    timeout: Duration,
}

impl DirectorProbe {
    pub fn new() -> Self {
        Self {
            timeout: Duration::from_secs(10),
        }
    }
}

impl Default for DirectorProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EnvironmentValidator for DirectorProbe {
    async fn validate(&self, state: &State) -> Result<(), PipelineError> {
        if !state.has_director() {
            debug!("no director recorded; skipping reachability probe");
            return Ok(());
        }

        let mut builder = reqwest::Client::builder().timeout(self.timeout);
        if !state.bosh.director_ssl_ca.is_empty() {
            let ca = reqwest::Certificate::from_pem(state.bosh.director_ssl_ca.as_bytes())
                .map_err(|e| {
                    PipelineError::DirectorUnreachable(format!("bad CA certificate: {}", e))
                })?;
            builder = builder.add_root_certificate(ca);
        }
        let client = builder
            .build()
            .map_err(|e| PipelineError::Internal(e.to_string()))?;

        let url = format!(
            "{}/info",
            state.bosh.director_address.trim_end_matches('/')
        );
        let resp = client
            .get(&url)
            .send()
            .await
            .map_err(|e| PipelineError::DirectorUnreachable(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(PipelineError::DirectorUnreachable(format!(
                "{} returned {}",
                url,
                resp.status()
            )));
        }
        info!(%url, "director reachable");
        Ok(())
    }
}

/// Refuses to destroy infrastructure that still contains VMs bbl did not
/// create itself.
pub struct NetworkDeletionValidator {
    instances: Arc<dyn InstanceLister>,
}

impl NetworkDeletionValidator {
    pub fn new(instances: Arc<dyn InstanceLister>) -> Self {
        Self { instances }
    }

    /// `label` is the IaaS-shaped word for the network resource ("vpc",
    /// "network", "virtual network"), used only in the error message.
    pub async fn validate_safe_to_delete(
        &self,
        label: &str,
        network_id: &str,
        env_id: &str,
    ) -> Result<(), PipelineError> {
        let vms = self
            .instances
            .list_instances(network_id)
            .await
            .map_err(|e| match e {
                ClientError::Unreachable(msg) => PipelineError::IaasUnreachable(msg),
                other => PipelineError::stage("instance listing", other),
            })?;

        let owned = naming::owned_vm_names(env_id);
        let mut leftover: Vec<String> = vms
            .into_iter()
            .filter(|vm| !owned.contains(vm))
            .collect();
        if leftover.is_empty() {
            return Ok(());
        }
        leftover.sort();
        leftover.dedup();
        Err(PipelineError::NetworkNotSafeToDelete {
            label: label.to_string(),
            network: network_id.to_string(),
            vms: leftover.join(", "),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeInstances(Vec<&'static str>);

    #[async_trait]
    impl InstanceLister for FakeInstances {
        async fn list_instances(&self, _network_id: &str) -> Result<Vec<String>, ClientError> {
            Ok(self.0.iter().map(|s| s.to_string()).collect())
        }
    }

    fn validator(vms: Vec<&'static str>) -> NetworkDeletionValidator {
        NetworkDeletionValidator::new(Arc::new(FakeInstances(vms)))
    }

    #[tokio::test]
    async fn owned_vms_are_safe_in_any_combination() {
        for vms in [
            vec![],
            vec!["NAT"],
            vec!["bosh/0"],
            vec!["bbl-demo-nat"],
            vec!["NAT", "NAT", "bosh/0", "bbl-demo-nat", "bbl-demo-nat"],
        ] {
            validator(vms)
                .validate_safe_to_delete("vpc", "vpc-12345", "bbl-demo")
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn foreign_vms_block_deletion_and_are_listed() {
        let err = validator(vec!["NAT", "user-workload", "bosh/0", "another"])
            .validate_safe_to_delete("vpc", "vpc-12345", "bbl-demo")
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "vpc vpc-12345 is not safe to delete; vms still exist: [another, user-workload]"
        );
    }

    #[tokio::test]
    async fn other_envs_nat_is_not_ours() {
        let err = validator(vec!["other-env-nat"])
            .validate_safe_to_delete("network", "bbl-demo-network", "bbl-demo")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::NetworkNotSafeToDelete { .. }
        ));
    }
}
