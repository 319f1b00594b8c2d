use std::io::Write;
use std::sync::Arc;

use async_trait::async_trait;
use bbl_domain::State;
use bbl_engine::Outputs;
use bbl_exec::{CommandRunner, RunRequest};
use tracing::{debug, info};

use crate::error::CloudConfigError;
use crate::generator;

#[async_trait]
pub trait CloudConfigManager: Send + Sync + 'static {
    /// Generate and upload the cloud-config. Skipped entirely for
    /// director-less environments. Idempotent: the director treats an
    /// unchanged document as a no-op.
    async fn update(&self, state: &State, outputs: &Outputs) -> Result<(), CloudConfigError>;

    /// The document `update` would upload, for the reader command.
    fn generate(&self, state: &State, outputs: &Outputs) -> Result<String, CloudConfigError>;
}

/// [`CloudConfigManager`] that uploads via `bosh update-cloud-config`,
/// authenticated against the director recorded in state.
pub struct BoshCloudConfig {
    binary: String,
    runner: Arc<dyn CommandRunner>,
}

impl BoshCloudConfig {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            binary: "bosh".into(),
            runner,
        }
    }

    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }
}

#[async_trait]
impl CloudConfigManager for BoshCloudConfig {
    async fn update(&self, state: &State, outputs: &Outputs) -> Result<(), CloudConfigError> {
        if state.no_director {
            debug!("no director requested; skipping cloud-config");
            return Ok(());
        }

        info!(env_id = %state.env_id, "updating cloud-config");
        let document = generator::generate(state, outputs)?;

        let mut file = tempfile::NamedTempFile::new().map_err(|e| CloudConfigError::Io {
            path: "cloud-config".into(),
            source: e,
        })?;
        file.write_all(document.as_bytes())
            .map_err(|e| CloudConfigError::Io {
                path: file.path().display().to_string(),
                source: e,
            })?;

        let document_path = file.path().display().to_string();
        let req = RunRequest::new(
            self.binary.as_str(),
            &["-n", "update-cloud-config", document_path.as_str()],
        )
        .env("BOSH_ENVIRONMENT", &state.bosh.director_address)
        .env("BOSH_CLIENT", &state.bosh.director_username)
        .env("BOSH_CLIENT_SECRET", &state.bosh.director_password)
        .env("BOSH_CA_CERT", &state.bosh.director_ssl_ca);

        let out = self.runner.run(req).await?;
        if !out.success() {
            let lines: Vec<&str> = out.log.lines().filter(|l| !l.trim().is_empty()).collect();
            let start = lines.len().saturating_sub(8);
            return Err(CloudConfigError::Upload(lines[start..].join("\n")));
        }
        Ok(())
    }

    fn generate(&self, state: &State, outputs: &Outputs) -> Result<String, CloudConfigError> {
        generator::generate(state, outputs)
    }
}
