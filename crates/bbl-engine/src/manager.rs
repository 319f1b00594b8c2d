use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use bbl_domain::{Iaas, State};
use bbl_exec::{CommandRunner, RunRequest};
use tracing::{debug, info};

use crate::error::EngineError;
use crate::outputs::Outputs;
use crate::templates;

const MIN_VERSION: &str = "0.12.0";
const MAX_VERSION: &str = "2.0.0";

const TF_FILE: &str = "bbl.tf";
const TFVARS_FILE: &str = "bbl.auto.tfvars";
const TFSTATE_FILE: &str = "terraform.tfstate";

/// Idempotent plan/apply of the provider network topology. The topology is
/// determined entirely by envID, iaas, lb and credentials; `apply` converges
/// toward it and returns the outputs downstream phases consume.
#[async_trait]
pub trait InfrastructureManager: Send + Sync + 'static {
    async fn validate_version(&self) -> Result<(), EngineError>;
    async fn version(&self) -> Result<String, EngineError>;
    async fn apply(&self, state: State) -> Result<(State, Outputs), EngineError>;
    async fn destroy(&self, state: State) -> Result<State, EngineError>;
    /// Read-only; never mutates remote resources.
    async fn get_outputs(&self, state: &State) -> Result<Outputs, EngineError>;
}

/// [`InfrastructureManager`] backed by the `terraform` binary, working in
/// `<stateDir>/terraform/`.
pub struct TerraformManager {
    binary: String,
    dir: PathBuf,
    runner: Arc<dyn CommandRunner>,
}

impl TerraformManager {
    pub fn new(dir: impl Into<PathBuf>, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            binary: "terraform".into(),
            dir: dir.into(),
            runner,
        }
    }

    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    fn iaas(state: &State) -> Result<Iaas, EngineError> {
        state
            .iaas
            .ok_or_else(|| EngineError::Misconfigured("state has no iaas".into()))
    }

    fn region(state: &State) -> String {
        match state.iaas {
            Some(Iaas::Aws) => state.aws.as_ref().map(|c| c.region.clone()),
            Some(Iaas::Gcp) => state.gcp.as_ref().map(|c| c.region.clone()),
            Some(Iaas::Azure) => state.azure.as_ref().map(|c| c.region.clone()),
            None => None,
        }
        .unwrap_or_default()
    }

    /// Environment variables the provider plugins read for authentication.
    /// Never written to disk or tfvars files.
    fn auth_env(state: &State) -> HashMap<String, String> {
        let mut env = HashMap::new();
        match (state.iaas, &state.aws, &state.gcp, &state.azure) {
            (Some(Iaas::Aws), Some(creds), _, _) => {
                env.insert("AWS_ACCESS_KEY_ID".into(), creds.access_key_id.clone());
                env.insert(
                    "AWS_SECRET_ACCESS_KEY".into(),
                    creds.secret_access_key.clone(),
                );
                env.insert("AWS_DEFAULT_REGION".into(), creds.region.clone());
            }
            (Some(Iaas::Gcp), _, Some(creds), _) => {
                env.insert("GOOGLE_CREDENTIALS".into(), creds.service_account_key.clone());
                env.insert("GOOGLE_PROJECT".into(), creds.project_id.clone());
                env.insert("GOOGLE_REGION".into(), creds.region.clone());
                env.insert("GOOGLE_ZONE".into(), creds.zone.clone());
            }
            (Some(Iaas::Azure), _, _, Some(creds)) => {
                env.insert("ARM_CLIENT_ID".into(), creds.client_id.clone());
                env.insert("ARM_CLIENT_SECRET".into(), creds.client_secret.clone());
                env.insert("ARM_TENANT_ID".into(), creds.tenant_id.clone());
                env.insert("ARM_SUBSCRIPTION_ID".into(), creds.subscription_id.clone());
            }
            _ => {}
        }
        env
    }

    fn write(&self, name: &str, content: &str) -> Result<(), EngineError> {
        let path = self.dir.join(name);
        std::fs::write(&path, content)
            .map_err(|e| EngineError::io(path.display().to_string(), e))
    }

    /// Lay the working dir out for the current state: template, tfvars, and
    /// the tfstate snapshot carried in the state document.
    fn prepare_workspace(&self, state: &State) -> Result<(), EngineError> {
        std::fs::create_dir_all(&self.dir)
            .map_err(|e| EngineError::io(self.dir.display().to_string(), e))?;

        let iaas = Self::iaas(state)?;
        self.write(TF_FILE, &templates::render(iaas, state.lb.kind))?;

        let mut tfvars = String::from("# Generated by bbl — do not edit\n");
        tfvars.push_str(&tfvar("env_id", &state.env_id));
        tfvars.push_str(&tfvar("region", &Self::region(state)));
        if state.lb.is_active() {
            tfvars.push_str(&tfvar("lb_cert", &state.lb.cert));
            tfvars.push_str(&tfvar("lb_key", &state.lb.key));
            tfvars.push_str(&tfvar("lb_chain", &state.lb.chain));
            tfvars.push_str(&tfvar("lb_domain", &state.lb.domain));
        }
        self.write(TFVARS_FILE, &tfvars)?;

        if !state.tf_state.is_empty() {
            self.write(TFSTATE_FILE, &state.tf_state)?;
        }
        Ok(())
    }

    fn read_back_tfstate(&self) -> String {
        std::fs::read_to_string(self.dir.join(TFSTATE_FILE)).unwrap_or_default()
    }

    async fn run_tf(&self, args: &[&str], state: &State) -> Result<(i32, String), EngineError> {
        let req = RunRequest::new(&self.binary, args)
            .cwd(&self.dir)
            .env("TF_IN_AUTOMATION", "1")
            .env("TF_INPUT", "0")
            .envs(&Self::auth_env(state));
        let out = self.runner.run(req).await?;
        Ok((out.exit_code, out.log))
    }

    async fn init(&self, state: &State) -> Result<(), EngineError> {
        let (exit, log) = self.run_tf(&["init", "-no-color"], state).await?;
        if exit != 0 {
            return Err(EngineError::Init(tail(&log)));
        }
        Ok(())
    }

    async fn read_outputs(&self, state: &State) -> Result<Outputs, EngineError> {
        let (exit, log) = self.run_tf(&["output", "-json", "-no-color"], state).await?;
        if exit != 0 {
            return Err(EngineError::OutputParse(tail(&log)));
        }
        let map: serde_json::Value = serde_json::from_str(log.trim())
            .map_err(|e| EngineError::OutputParse(e.to_string()))?;

        let mut outputs = Outputs::default();
        if let Some(obj) = map.as_object() {
            for (key, entry) in obj {
                if let Some(value) = entry.get("value").and_then(|v| v.as_str()) {
                    outputs.insert(key.clone(), value.to_string());
                }
            }
        }
        Ok(outputs)
    }
}

#[async_trait]
impl InfrastructureManager for TerraformManager {
    async fn validate_version(&self) -> Result<(), EngineError> {
        let found = self.version().await?;
        let version = parse_version(&found)?;
        if version < parse_version(MIN_VERSION)? || version >= parse_version(MAX_VERSION)? {
            return Err(EngineError::UnsupportedVersion {
                found,
                min: MIN_VERSION,
                max: MAX_VERSION,
            });
        }
        Ok(())
    }

    async fn version(&self) -> Result<String, EngineError> {
        let out = self
            .runner
            .run(RunRequest::new(&self.binary, &["version"]))
            .await?;
        extract_version(&out.log).ok_or_else(|| EngineError::VersionParse(tail(&out.log)))
    }

    async fn apply(&self, mut state: State) -> Result<(State, Outputs), EngineError> {
        let iaas = Self::iaas(&state)?;
        info!(env_id = %state.env_id, %iaas, lb = %state.lb.kind, "applying infrastructure");
        self.prepare_workspace(&state)?;
        self.init(&state).await?;

        let (exit, log) = self
            .run_tf(&["apply", "-auto-approve", "-no-color"], &state)
            .await?;

        // Whatever happened, the tfstate on disk is newer than the one in
        // the state document.
        state.tf_state = self.read_back_tfstate();

        if exit != 0 {
            return Err(EngineError::Terraform {
                operation: "apply",
                message: tail(&log),
                state: Box::new(state),
            });
        }

        let outputs = self.read_outputs(&state).await?;
        outputs.validate(iaas, state.lb.kind)?;
        Ok((state, outputs))
    }

    async fn destroy(&self, mut state: State) -> Result<State, EngineError> {
        if state.tf_state.is_empty() {
            debug!("no tfstate recorded; nothing to destroy");
            return Ok(state);
        }
        info!(env_id = %state.env_id, "destroying infrastructure");
        self.prepare_workspace(&state)?;
        self.init(&state).await?;

        let (exit, log) = self
            .run_tf(&["destroy", "-auto-approve", "-no-color"], &state)
            .await?;

        state.tf_state = self.read_back_tfstate();

        if exit != 0 {
            return Err(EngineError::Terraform {
                operation: "destroy",
                message: tail(&log),
                state: Box::new(state),
            });
        }
        Ok(state)
    }

    async fn get_outputs(&self, state: &State) -> Result<Outputs, EngineError> {
        if state.tf_state.is_empty() {
            return Ok(Outputs::default());
        }
        self.prepare_workspace(state)?;
        self.read_outputs(state).await
    }
}

/// Format a single HCL string variable assignment.
fn tfvar(key: &str, value: &str) -> String {
    let escaped = value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n");
    format!("{} = \"{}\"\n", key, escaped)
}

/// Last few lines of a subprocess log, for one-line error summaries.
fn tail(log: &str) -> String {
    let lines: Vec<&str> = log.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(8);
    lines[start..].join("\n")
}

fn extract_version(log: &str) -> Option<String> {
    log.lines()
        .find_map(|line| line.trim().strip_prefix("Terraform v"))
        .map(|v| v.trim().to_string())
}

fn parse_version(v: &str) -> Result<(u64, u64, u64), EngineError> {
    let mut parts = v.trim().splitn(3, '.');
    let mut next = || -> Result<u64, EngineError> {
        parts
            .next()
            .and_then(|p| {
                // tolerate suffixes like "7-rc1"
                let digits: String = p.chars().take_while(|c| c.is_ascii_digit()).collect();
                digits.parse().ok()
            })
            .ok_or_else(|| EngineError::VersionParse(v.to_string()))
    };
    Ok((next()?, next()?, next()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bbl_domain::{AwsCredentials, GcpCredentials};
    use bbl_exec::{ExecError, RunOutput};

    struct FakeRunner {
        fail_apply: bool,
    }

    #[async_trait]
    impl CommandRunner for FakeRunner {
        async fn run(&self, req: RunRequest) -> Result<RunOutput, ExecError> {
            let subcommand = req.args.first().map(String::as_str).unwrap_or_default();
            match subcommand {
                "version" => Ok(RunOutput {
                    exit_code: 0,
                    log: "Terraform v1.5.7\non linux_amd64\n".into(),
                }),
                "init" => Ok(RunOutput {
                    exit_code: 0,
                    log: "Terraform has been successfully initialized!\n".into(),
                }),
                "apply" => {
                    let cwd = req.cwd.expect("apply runs in the workspace");
                    if self.fail_apply {
                        std::fs::write(cwd.join("terraform.tfstate"), "{\"partial\":true}")
                            .unwrap();
                        Ok(RunOutput {
                            exit_code: 1,
                            log: "Error: quota exceeded\n".into(),
                        })
                    } else {
                        std::fs::write(cwd.join("terraform.tfstate"), "{\"resources\":[1]}")
                            .unwrap();
                        Ok(RunOutput {
                            exit_code: 0,
                            log: "Apply complete!\n".into(),
                        })
                    }
                }
                "destroy" => {
                    let cwd = req.cwd.expect("destroy runs in the workspace");
                    std::fs::write(cwd.join("terraform.tfstate"), "{\"resources\":[]}").unwrap();
                    Ok(RunOutput {
                        exit_code: 0,
                        log: "Destroy complete!\n".into(),
                    })
                }
                "output" => Ok(RunOutput {
                    exit_code: 0,
                    log: serde_json::json!({
                        "network_name": { "value": "bbl-demo-network" },
                        "subnetwork_name": { "value": "bbl-demo-subnet" },
                        "internal_tag_name": { "value": "bbl-demo-internal" },
                    })
                    .to_string(),
                }),
                other => panic!("unexpected terraform subcommand {}", other),
            }
        }
    }

    fn gcp_state() -> State {
        let mut state = State::new(Iaas::Gcp);
        state.env_id = "bbl-demo".into();
        state.gcp = Some(GcpCredentials {
            service_account_key: "{}".into(),
            project_id: "proj".into(),
            region: "us-west1".into(),
            zone: "us-west1-a".into(),
        });
        state
    }

    #[tokio::test]
    async fn apply_persists_tfstate_and_returns_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let manager = TerraformManager::new(
            dir.path().join("terraform"),
            Arc::new(FakeRunner { fail_apply: false }),
        );

        let (state, outputs) = manager.apply(gcp_state()).await.unwrap();
        assert_eq!(state.tf_state, "{\"resources\":[1]}");
        assert_eq!(outputs.get("network_name"), Some("bbl-demo-network"));

        // The workspace was laid out from the state.
        let tf = std::fs::read_to_string(dir.path().join("terraform").join("bbl.tf")).unwrap();
        assert!(tf.contains("google_compute_network"));
        let tfvars =
            std::fs::read_to_string(dir.path().join("terraform").join("bbl.auto.tfvars")).unwrap();
        assert!(tfvars.contains("env_id = \"bbl-demo\""));
    }

    #[tokio::test]
    async fn failed_apply_carries_partial_tfstate() {
        let dir = tempfile::tempdir().unwrap();
        let manager = TerraformManager::new(
            dir.path().join("terraform"),
            Arc::new(FakeRunner { fail_apply: true }),
        );

        let err = manager.apply(gcp_state()).await.unwrap_err();
        match err {
            EngineError::Terraform {
                operation, state, ..
            } => {
                assert_eq!(operation, "apply");
                assert_eq!(state.tf_state, "{\"partial\":true}");
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn destroy_without_tfstate_is_a_noop() {
        let dir = tempfile::tempdir().unwrap();
        let manager = TerraformManager::new(
            dir.path().join("terraform"),
            Arc::new(FakeRunner { fail_apply: false }),
        );
        let state = manager.destroy(gcp_state()).await.unwrap();
        assert!(state.tf_state.is_empty());
    }

    #[tokio::test]
    async fn version_is_parsed_and_validated() {
        let dir = tempfile::tempdir().unwrap();
        let manager = TerraformManager::new(
            dir.path().join("terraform"),
            Arc::new(FakeRunner { fail_apply: false }),
        );
        assert_eq!(manager.version().await.unwrap(), "1.5.7");
        manager.validate_version().await.unwrap();
    }

    #[test]
    fn version_range_boundaries() {
        assert!(parse_version("0.11.14").unwrap() < parse_version(MIN_VERSION).unwrap());
        assert!(parse_version("1.5.7").unwrap() >= parse_version(MIN_VERSION).unwrap());
        assert!(parse_version("2.0.0").unwrap() >= parse_version(MAX_VERSION).unwrap());
        assert!(parse_version("garbage").is_err());
    }

    #[test]
    fn tfvar_escapes_quotes_and_newlines() {
        assert_eq!(
            tfvar("lb_cert", "-----BEGIN-----\nabc\"def"),
            "lb_cert = \"-----BEGIN-----\\nabc\\\"def\"\n"
        );
    }

    #[test]
    fn auth_env_for_aws() {
        let mut state = State::new(Iaas::Aws);
        state.aws = Some(AwsCredentials {
            access_key_id: "AKID".into(),
            secret_access_key: "SECRET".into(),
            region: "us-east-1".into(),
        });
        let env = TerraformManager::auth_env(&state);
        assert_eq!(env["AWS_ACCESS_KEY_ID"], "AKID");
        assert_eq!(env["AWS_DEFAULT_REGION"], "us-east-1");
    }
}
