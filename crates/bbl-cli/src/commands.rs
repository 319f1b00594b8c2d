use std::path::{Path, PathBuf};
use std::sync::Arc;

use bbl_bosh::BoshCli;
use bbl_clients::IaasClients;
use bbl_cloudconfig::BoshCloudConfig;
use bbl_domain::{AwsCredentials, AzureCredentials, GcpCredentials, Iaas, State};
use bbl_engine::TerraformManager;
use bbl_exec::SystemRunner;
use bbl_pipeline::{DirectorProbe, LbConfig, Pipeline, PipelineError, UpConfig};
use bbl_store::{DiskStore, StateStore};

use crate::cli::{CredentialFlags, LbTypeArg, UpFlags};
use crate::output;

// ── Wiring ────────────────────────────────────────────────────────────────────

/// Everything a command needs: the store plus the pipeline with the real
/// managers behind it.
struct Runtime {
    store: Arc<DiskStore>,
    pipeline: Pipeline,
}

/// Resolve the effective iaas + credentials (flag > env > state) and build
/// the pipeline against the real collaborators.
async fn runtime(state_dir: &Path, flags: &CredentialFlags) -> Result<Runtime, PipelineError> {
    let store = Arc::new(DiskStore::new(state_dir));
    let existing = store.load().await?.unwrap_or_default();
    build_runtime(store, merged_credentials(existing, flags)?)
}

/// As [`runtime`], but lets `plan`/`up` introduce the iaas on first run.
async fn runtime_for_up(
    state_dir: &Path,
    up: &UpFlags,
) -> Result<(Runtime, UpConfig), PipelineError> {
    let store = Arc::new(DiskStore::new(state_dir));
    let mut effective = store.load().await?.unwrap_or_default();
    if effective.iaas.is_none() {
        effective.iaas = up.iaas.map(Into::into);
    }
    let effective = merged_credentials(effective, &up.credentials)?;

    let config = UpConfig {
        iaas: up.iaas.map(Into::into),
        name: up.name.clone(),
        no_director: up.no_director,
        aws: effective.aws.clone(),
        gcp: effective.gcp.clone(),
        azure: effective.azure.clone(),
    };

    let runtime = build_runtime(store, effective)?;
    Ok((runtime, config))
}

fn build_runtime(store: Arc<DiskStore>, effective: State) -> Result<Runtime, PipelineError> {
    let clients = match effective.iaas {
        Some(Iaas::Aws) => IaasClients::aws(effective.aws.clone().unwrap_or_default()),
        Some(Iaas::Gcp) => IaasClients::gcp(effective.gcp.clone().unwrap_or_default())
            .map_err(|e| PipelineError::UserInput(e.to_string()))?,
        Some(Iaas::Azure) => IaasClients::azure(effective.azure.clone().unwrap_or_default()),
        None => {
            return Err(PipelineError::UserInput(
                "--iaas is required (or run from a directory with existing state)".into(),
            ))
        }
    };

    let runner = Arc::new(SystemRunner::new());
    let engine = Arc::new(TerraformManager::new(store.terraform_dir(), runner.clone()));
    let bosh = Arc::new(BoshCli::new(store.vars_dir(), runner.clone()));
    let cloud_config = Arc::new(BoshCloudConfig::new(runner));
    let probe = Arc::new(DirectorProbe::new());

    let pipeline = Pipeline::new(
        store.clone(),
        clients,
        engine,
        bosh,
        cloud_config,
        probe,
    );
    Ok(Runtime { store, pipeline })
}

/// Overlay flag/env credentials onto the stored ones.
fn merged_credentials(
    mut state: State,
    flags: &CredentialFlags,
) -> Result<State, PipelineError> {
    if flags.aws_access_key_id.is_some()
        || flags.aws_secret_access_key.is_some()
        || flags.aws_region.is_some()
    {
        let base = state.aws.take().unwrap_or_default();
        state.aws = Some(AwsCredentials {
            access_key_id: flags.aws_access_key_id.clone().unwrap_or(base.access_key_id),
            secret_access_key: flags
                .aws_secret_access_key
                .clone()
                .unwrap_or(base.secret_access_key),
            region: flags.aws_region.clone().unwrap_or(base.region),
        });
    }

    if flags.gcp_service_account_key.is_some()
        || flags.gcp_project_id.is_some()
        || flags.gcp_region.is_some()
        || flags.gcp_zone.is_some()
    {
        let base = state.gcp.take().unwrap_or_default();
        let key = match &flags.gcp_service_account_key {
            Some(value) => read_key_material(value)?,
            None => base.service_account_key,
        };
        state.gcp = Some(GcpCredentials {
            service_account_key: key,
            project_id: flags.gcp_project_id.clone().unwrap_or(base.project_id),
            region: flags.gcp_region.clone().unwrap_or(base.region),
            zone: flags.gcp_zone.clone().unwrap_or(base.zone),
        });
    }

    if flags.azure_client_id.is_some()
        || flags.azure_client_secret.is_some()
        || flags.azure_tenant_id.is_some()
        || flags.azure_subscription_id.is_some()
        || flags.azure_region.is_some()
    {
        let base = state.azure.take().unwrap_or_default();
        state.azure = Some(AzureCredentials {
            client_id: flags.azure_client_id.clone().unwrap_or(base.client_id),
            client_secret: flags
                .azure_client_secret
                .clone()
                .unwrap_or(base.client_secret),
            tenant_id: flags.azure_tenant_id.clone().unwrap_or(base.tenant_id),
            subscription_id: flags
                .azure_subscription_id
                .clone()
                .unwrap_or(base.subscription_id),
            region: flags.azure_region.clone().unwrap_or(base.region),
        });
    }

    Ok(state)
}

/// A GCP key flag may carry inline JSON or a path to a key file.
fn read_key_material(value: &str) -> Result<String, PipelineError> {
    let trimmed = value.trim();
    if trimmed.starts_with('{') {
        return Ok(trimmed.to_string());
    }
    std::fs::read_to_string(trimmed).map_err(|e| {
        PipelineError::UserInput(format!("cannot read service account key {}: {}", trimmed, e))
    })
}

fn read_pem(path: &Path) -> Result<String, PipelineError> {
    std::fs::read_to_string(path)
        .map_err(|e| PipelineError::UserInput(format!("cannot read {}: {}", path.display(), e)))
}

/// Await `work` with the state-dir lock held; concurrent invocations fail
/// fast. The future is lazy, so nothing runs before the lock is taken.
async fn with_lock<Fut>(runtime: &Runtime, work: Fut) -> Result<(), PipelineError>
where
    Fut: std::future::Future<Output = Result<(), PipelineError>>,
{
    runtime.store.lock().await?;
    let result = work.await;
    let _ = runtime.store.unlock().await;
    result
}

// ── Mutating commands ─────────────────────────────────────────────────────────

pub async fn plan(state_dir: &Path, flags: UpFlags) -> Result<(), PipelineError> {
    let (runtime, config) = runtime_for_up(state_dir, &flags).await?;
    with_lock(&runtime, async {
        let state = runtime.pipeline.plan(config).await?;
        println!("environment planned: {}", state.env_id);
        Ok(())
    })
    .await
}

pub async fn up(state_dir: &Path, flags: UpFlags) -> Result<(), PipelineError> {
    let (runtime, config) = runtime_for_up(state_dir, &flags).await?;
    with_lock(&runtime, async {
        let state = runtime.pipeline.up(config).await?;
        if state.no_director {
            println!("environment ready (no director): {}", state.env_id);
        } else {
            println!("environment ready: {}", state.env_id);
        }
        Ok(())
    })
    .await
}

pub async fn create_lbs(
    state_dir: &Path,
    lb_type: LbTypeArg,
    cert: Option<PathBuf>,
    key: Option<PathBuf>,
    chain: Option<PathBuf>,
    domain: Option<String>,
) -> Result<(), PipelineError> {
    let runtime = runtime(state_dir, &CredentialFlags::default()).await?;
    let config = LbConfig {
        kind: lb_type.into(),
        cert: cert.as_deref().map(read_pem).transpose()?.unwrap_or_default(),
        key: key.as_deref().map(read_pem).transpose()?.unwrap_or_default(),
        chain: chain.as_deref().map(read_pem).transpose()?.unwrap_or_default(),
        domain: domain.unwrap_or_default(),
    };
    with_lock(&runtime, async {
        let state = runtime.pipeline.create_lbs(config).await?;
        println!("{} load balancers ready", state.lb.kind);
        Ok(())
    })
    .await
}

pub async fn update_lbs(
    state_dir: &Path,
    cert: PathBuf,
    key: PathBuf,
    chain: Option<PathBuf>,
) -> Result<(), PipelineError> {
    let runtime = runtime(state_dir, &CredentialFlags::default()).await?;
    let cert = read_pem(&cert)?;
    let key = read_pem(&key)?;
    let chain = chain.as_deref().map(read_pem).transpose()?.unwrap_or_default();
    with_lock(&runtime, async {
        runtime.pipeline.update_lbs(cert, key, chain).await?;
        println!("load balancer certificate updated");
        Ok(())
    })
    .await
}

pub async fn delete_lbs(state_dir: &Path) -> Result<(), PipelineError> {
    let runtime = runtime(state_dir, &CredentialFlags::default()).await?;
    with_lock(&runtime, async {
        runtime.pipeline.delete_lbs().await?;
        println!("load balancers deleted");
        Ok(())
    })
    .await
}

pub async fn rotate(state_dir: &Path) -> Result<(), PipelineError> {
    let runtime = runtime(state_dir, &CredentialFlags::default()).await?;
    with_lock(&runtime, async {
        runtime.pipeline.rotate().await?;
        println!("keypair rotated");
        Ok(())
    })
    .await
}

pub async fn destroy(state_dir: &Path, skip_if_missing: bool) -> Result<(), PipelineError> {
    let store = DiskStore::new(state_dir);
    if store.load().await?.is_none() {
        // No state: nothing to wire a pipeline against.
        if skip_if_missing {
            println!("nothing to destroy");
            return Ok(());
        }
        return Err(PipelineError::UserInput(
            "no state found in this directory".into(),
        ));
    }

    let runtime = runtime(state_dir, &CredentialFlags::default()).await?;
    with_lock(&runtime, async {
        runtime.pipeline.destroy(skip_if_missing).await?;
        println!("environment destroyed");
        Ok(())
    })
    .await
}

// ── Readers ───────────────────────────────────────────────────────────────────

async fn require_state(state_dir: &Path) -> Result<State, PipelineError> {
    DiskStore::new(state_dir)
        .load()
        .await?
        .ok_or_else(|| PipelineError::UserInput("no state found in this directory".into()))
}

pub async fn print_env(state_dir: &Path) -> Result<(), PipelineError> {
    let state = require_state(state_dir).await?;
    print!("{}", output::print_env(&state)?);
    Ok(())
}

pub async fn lbs(state_dir: &Path) -> Result<(), PipelineError> {
    let runtime = runtime(state_dir, &CredentialFlags::default()).await?;
    let state = runtime.pipeline.state().await?;
    let outputs = runtime.pipeline.outputs().await?;
    print!("{}", output::lbs(&state, &outputs));
    Ok(())
}

pub async fn env_id(state_dir: &Path) -> Result<(), PipelineError> {
    let state = require_state(state_dir).await?;
    println!("{}", require_field(&state.env_id, "env id")?);
    Ok(())
}

pub async fn jumpbox_address(state_dir: &Path) -> Result<(), PipelineError> {
    let state = require_state(state_dir).await?;
    println!("{}", require_field(&state.jumpbox.url, "jumpbox address")?);
    Ok(())
}

pub async fn ssh_key(state_dir: &Path) -> Result<(), PipelineError> {
    let state = require_state(state_dir).await?;
    println!("{}", require_field(&state.key_pair.private_key, "ssh key")?);
    Ok(())
}

pub async fn director_ssh_key(state_dir: &Path) -> Result<(), PipelineError> {
    let store = DiskStore::new(state_dir);
    let vars_store = store
        .get_var("jumpbox", "vars-store.yml")
        .await?
        .ok_or_else(|| PipelineError::UserInput("no jumpbox vars store found".into()))?;
    let doc: serde_yaml::Value = serde_yaml::from_slice(&vars_store)
        .map_err(|e| PipelineError::UserInput(format!("bad jumpbox vars store: {}", e)))?;
    let key = doc["jumpbox_ssh"]["private_key"]
        .as_str()
        .ok_or_else(|| PipelineError::UserInput("jumpbox_ssh key not present".into()))?;
    println!("{}", key);
    Ok(())
}

pub async fn director_field(
    state_dir: &Path,
    field: fn(&State) -> &str,
    label: &str,
) -> Result<(), PipelineError> {
    let state = require_state(state_dir).await?;
    println!("{}", require_field(field(&state), label)?);
    Ok(())
}

pub async fn cloud_config(state_dir: &Path) -> Result<(), PipelineError> {
    let runtime = runtime(state_dir, &CredentialFlags::default()).await?;
    let state = runtime.pipeline.state().await?;
    let outputs = runtime.pipeline.outputs().await?;
    print!("{}", runtime.pipeline.cloud_config_document(&state, &outputs)?);
    Ok(())
}

pub async fn outputs(state_dir: &Path) -> Result<(), PipelineError> {
    let runtime = runtime(state_dir, &CredentialFlags::default()).await?;
    let outputs = runtime.pipeline.outputs().await?;
    print!("{}", output::outputs(&outputs));
    Ok(())
}

fn require_field<'a>(value: &'a str, label: &str) -> Result<&'a str, PipelineError> {
    if value.is_empty() {
        return Err(PipelineError::UserInput(format!("{} not present", label)));
    }
    Ok(value)
}

// ── ssh ───────────────────────────────────────────────────────────────────────

/// Drop into an interactive shell on the jumpbox. Interactive stdio cannot
/// stream through the command runner, so this is the one place the CLI
/// spawns a child directly.
pub async fn ssh(state_dir: &Path) -> Result<(), PipelineError> {
    let state = require_state(state_dir).await?;
    let address = require_field(&state.jumpbox.url, "jumpbox address")?;
    let host = address.split(':').next().unwrap_or(address);
    let key = require_field(&state.key_pair.private_key, "ssh key")?;

    let mut key_file = tempfile::NamedTempFile::new()
        .map_err(|e| PipelineError::Internal(format!("create key file: {}", e)))?;
    use std::io::Write;
    key_file
        .write_all(key.as_bytes())
        .map_err(|e| PipelineError::Internal(format!("write key file: {}", e)))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(key_file.path(), std::fs::Permissions::from_mode(0o600))
            .map_err(|e| PipelineError::Internal(format!("chmod key file: {}", e)))?;
    }

    let status = std::process::Command::new("ssh")
        .arg("-o")
        .arg("StrictHostKeyChecking=no")
        .arg("-o")
        .arg("ServerAliveInterval=300")
        .arg("-i")
        .arg(key_file.path())
        .arg(format!("jumpbox@{}", host))
        .status()
        .map_err(|e| PipelineError::UserInput(format!("cannot run ssh: {}", e)))?;

    if !status.success() {
        return Err(PipelineError::UserInput(format!(
            "ssh exited with {}",
            status.code().unwrap_or(-1)
        )));
    }
    Ok(())
}
