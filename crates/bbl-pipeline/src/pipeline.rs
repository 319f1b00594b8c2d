use std::sync::Arc;

use bbl_bosh::BoshManager;
use bbl_clients::IaasClients;
use bbl_cloudconfig::CloudConfigManager;
use bbl_domain::{AwsCredentials, AzureCredentials, GcpCredentials, Iaas, Lb, LbKind, State};
use bbl_engine::{EngineError, InfrastructureManager, Outputs};
use bbl_store::StateStore;
use tracing::{info, warn};

use crate::env_id::EnvIdManager;
use crate::error::PipelineError;
use crate::keypair::KeyPairManager;
use crate::validators::{EnvironmentValidator, NetworkDeletionValidator};

/// Flags merged into state at the top of `plan`/`up`. Precedence against the
/// state file is handled here; flag-vs-env precedence is the CLI's problem.
#[derive(Debug, Clone, Default)]
pub struct UpConfig {
    pub iaas: Option<Iaas>,
    pub name: Option<String>,
    pub no_director: bool,
    pub aws: Option<AwsCredentials>,
    pub gcp: Option<GcpCredentials>,
    pub azure: Option<AzureCredentials>,
}

/// Load balancer parameters for `create-lbs` / `update-lbs`.
#[derive(Debug, Clone)]
pub struct LbConfig {
    pub kind: LbKind,
    pub cert: String,
    pub key: String,
    pub chain: String,
    pub domain: String,
}

/// The command dispatcher: sequences the managers into the observable verbs
/// with explicit persistence boundaries. Every mutation of state is written
/// back before the next remote side effect, which is what makes a retry
/// converge instead of orphaning resources.
pub struct Pipeline {
    store: Arc<dyn StateStore>,
    clients: IaasClients,
    engine: Arc<dyn InfrastructureManager>,
    bosh: Arc<dyn BoshManager>,
    cloud_config: Arc<dyn CloudConfigManager>,
    env_validator: Arc<dyn EnvironmentValidator>,
}

impl Pipeline {
    pub fn new(
        store: Arc<dyn StateStore>,
        clients: IaasClients,
        engine: Arc<dyn InfrastructureManager>,
        bosh: Arc<dyn BoshManager>,
        cloud_config: Arc<dyn CloudConfigManager>,
        env_validator: Arc<dyn EnvironmentValidator>,
    ) -> Self {
        Self {
            store,
            clients,
            engine,
            bosh,
            cloud_config,
            env_validator,
        }
    }

    fn env_ids(&self) -> EnvIdManager {
        EnvIdManager::new(self.clients.network.clone())
    }

    fn keypairs(&self) -> KeyPairManager {
        KeyPairManager::new(self.clients.keypairs.clone())
    }

    // ── plan / up ─────────────────────────────────────────────────────────────

    /// Steps 1–2 of `up`: merge flags, establish the envID, persist.
    pub async fn plan(&self, config: UpConfig) -> Result<State, PipelineError> {
        let state = self.merge_config(config.clone()).await?;
        let state = self.env_ids().sync(state, config.name.as_deref()).await?;
        self.store.set(&state).await?; // ▸ envID
        Ok(state)
    }

    /// The full reconciliation pass. Re-entrant: every step that observes
    /// "already done" short-circuits to a no-op.
    pub async fn up(&self, config: UpConfig) -> Result<State, PipelineError> {
        let state = self.plan(config).await?;

        // Step 3: keypair. Locally generated keys are persisted before the
        // import so a failed upload never loses them.
        let state = self.keypairs().ensure_local(state)?;
        self.store.set(&state).await?; // ▸ keypair
        self.keypairs().reconcile(&state).await?;

        // Step 4: infrastructure.
        let (state, outputs) = self.apply_infrastructure(state).await?;

        // Step 5: director-less environments stop here.
        if state.no_director {
            state.check_invariants()?;
            return Ok(state);
        }

        // Steps 6–7: jumpbox, then director, a persistence boundary after each.
        self.bosh
            .initialize_jumpbox(&state, &outputs)
            .await
            .map_err(|e| PipelineError::stage("jumpbox initialize", e))?;
        let state = self
            .bosh
            .create_jumpbox(state, &outputs)
            .await
            .map_err(|e| PipelineError::stage("jumpbox create-env", e))?;
        self.store.set(&state).await?; // ▸ jumpbox

        self.bosh
            .initialize_director(&state, &outputs)
            .await
            .map_err(|e| PipelineError::stage("director initialize", e))?;
        let state = self
            .bosh
            .create_director(state, &outputs)
            .await
            .map_err(|e| PipelineError::stage("director create-env", e))?;
        self.store.set(&state).await?; // ▸ director

        // Step 8: cloud-config. Not a persistence boundary; a failure here
        // is retried by the next run.
        self.cloud_config
            .update(&state, &outputs)
            .await
            .map_err(|e| PipelineError::stage("cloud-config update", e))?;

        state.check_invariants()?;
        Ok(state)
    }

    // ── load balancers ────────────────────────────────────────────────────────

    pub async fn create_lbs(&self, lb: LbConfig) -> Result<State, PipelineError> {
        let mut state = self.require_state().await?;
        if !state.has_infrastructure() {
            return Err(PipelineError::UserInput(
                "bbl up must run before load balancers can be created".into(),
            ));
        }
        if lb.kind == LbKind::None {
            return Err(PipelineError::UserInput(
                "create-lbs requires a load balancer type".into(),
            ));
        }
        state.lb = Lb {
            kind: lb.kind,
            cert: lb.cert,
            key: lb.key,
            chain: lb.chain,
            domain: lb.domain,
        };
        self.reapply(state).await
    }

    pub async fn update_lbs(&self, cert: String, key: String, chain: String) -> Result<State, PipelineError> {
        let mut state = self.require_state().await?;
        if !state.lb.is_active() {
            return Err(PipelineError::UserInput(
                "no load balancer to update; run create-lbs first".into(),
            ));
        }
        state.lb.cert = cert;
        state.lb.key = key;
        state.lb.chain = chain;
        self.reapply(state).await
    }

    pub async fn delete_lbs(&self) -> Result<State, PipelineError> {
        let mut state = self.require_state().await?;
        if !state.lb.is_active() {
            // Nothing to delete; the verb is idempotent.
            return Ok(state);
        }
        state.lb = Lb::default();
        self.reapply(state).await
    }

    /// Shared tail of the lbs verbs: re-converge the infrastructure for the
    /// new lb shape, then refresh the cloud-config.
    async fn reapply(&self, state: State) -> Result<State, PipelineError> {
        let (state, outputs) = self.apply_infrastructure(state).await?;
        self.cloud_config
            .update(&state, &outputs)
            .await
            .map_err(|e| PipelineError::stage("cloud-config update", e))?;
        Ok(state)
    }

    // ── rotate ────────────────────────────────────────────────────────────────

    pub async fn rotate(&self) -> Result<State, PipelineError> {
        let state = self.require_state().await?;
        let iaas = state
            .iaas
            .ok_or_else(|| PipelineError::UserInput("state has no iaas".into()))?;
        let state = self.keypairs().rotate(state, iaas).await?;
        self.store.set(&state).await?; // ▸ rotated keypair
        Ok(state)
    }

    // ── destroy ───────────────────────────────────────────────────────────────

    pub async fn destroy(&self, skip_if_missing: bool) -> Result<(), PipelineError> {
        let Some(state) = self.store.load().await? else {
            if skip_if_missing {
                info!("no state to destroy");
                return Ok(());
            }
            return Err(PipelineError::UserInput(
                "no state found in this directory".into(),
            ));
        };

        // Pre-flight 1: the director must be reachable (or explicitly waived).
        if state.has_director() {
            if let Err(e) = self.env_validator.validate(&state).await {
                if skip_if_missing {
                    warn!(error = %e, "director unreachable; proceeding per --skip-if-missing");
                } else {
                    return Err(e);
                }
            }
        }

        // Pre-flight 2: refuse to tear down a network that still hosts
        // someone else's VMs.
        let outputs = self.current_outputs(&state).await?;
        if let (Some(iaas), Some(network)) = (state.iaas, outputs.get("network_name")) {
            NetworkDeletionValidator::new(self.clients.instances.clone())
                .validate_safe_to_delete(iaas.network_label(), network, &state.env_id)
                .await?;
        }

        // Reverse order: director, jumpbox, infrastructure.
        let state = self
            .bosh
            .delete_director(state, &outputs)
            .await
            .map_err(|e| PipelineError::stage("director delete-env", e))?;
        self.store.set(&state).await?; // ▸ director gone

        let state = self
            .bosh
            .delete_jumpbox(state, &outputs)
            .await
            .map_err(|e| PipelineError::stage("jumpbox delete-env", e))?;
        self.store.set(&state).await?; // ▸ jumpbox gone

        let state = match self.engine.destroy(state).await {
            Ok(state) => state,
            Err(EngineError::Terraform {
                operation,
                message,
                state,
            }) => {
                // Partial teardown: persist the tfstate we got before failing.
                self.store.set(&state).await?;
                return Err(PipelineError::Stage {
                    stage: "terraform destroy",
                    message: format!("{}: {}", operation, message),
                });
            }
            Err(e) => return Err(PipelineError::stage("terraform destroy", e)),
        };
        self.store.set(&state).await?; // ▸ infrastructure gone

        self.store.remove().await?;
        info!("environment destroyed");
        Ok(())
    }

    // ── readers ───────────────────────────────────────────────────────────────

    pub async fn state(&self) -> Result<State, PipelineError> {
        self.require_state().await
    }

    pub async fn outputs(&self) -> Result<Outputs, PipelineError> {
        let state = self.require_state().await?;
        self.current_outputs(&state).await
    }

    pub fn cloud_config_document(
        &self,
        state: &State,
        outputs: &Outputs,
    ) -> Result<String, PipelineError> {
        self.cloud_config
            .generate(state, outputs)
            .map_err(|e| PipelineError::stage("cloud-config generate", e))
    }

    // ── internals ─────────────────────────────────────────────────────────────

    async fn require_state(&self) -> Result<State, PipelineError> {
        self.store
            .load()
            .await?
            .ok_or_else(|| PipelineError::UserInput("no state found in this directory".into()))
    }

    /// Merge flags into state, rejecting mutation of immutable fields.
    async fn merge_config(&self, config: UpConfig) -> Result<State, PipelineError> {
        let mut state = match self.store.load().await? {
            Some(mut state) => {
                match (state.iaas, config.iaas) {
                    (Some(existing), Some(requested)) if existing != requested => {
                        return Err(PipelineError::UserInput(format!(
                            "the iaas is already set to {} and cannot change",
                            existing
                        )));
                    }
                    (None, Some(requested)) => state.iaas = Some(requested),
                    _ => {}
                }
                if let Some(name) = &config.name {
                    if !state.env_id.is_empty() && state.env_id != *name {
                        return Err(PipelineError::UserInput(format!(
                            "the env id is already set to {} and cannot change",
                            state.env_id
                        )));
                    }
                }
                if config.no_director && state.has_director() {
                    return Err(PipelineError::UserInput(
                        "--no-director cannot be set after a director exists".into(),
                    ));
                }
                state.no_director = state.no_director || config.no_director;
                state
            }
            None => {
                let iaas = config
                    .iaas
                    .ok_or_else(|| PipelineError::UserInput("--iaas is required".into()))?;
                let mut state = State::new(iaas);
                state.no_director = config.no_director;
                state
            }
        };

        // Credentials: a provided bundle replaces the stored one.
        if config.aws.is_some() {
            state.aws = config.aws;
        }
        if config.gcp.is_some() {
            state.gcp = config.gcp;
        }
        if config.azure.is_some() {
            state.azure = config.azure;
        }
        Ok(state)
    }

    /// Step 4 of `up` plus its persistence boundary, shared with the lbs
    /// verbs. A partial apply persists the tfstate carried by the error.
    async fn apply_infrastructure(
        &self,
        state: State,
    ) -> Result<(State, Outputs), PipelineError> {
        self.engine
            .validate_version()
            .await
            .map_err(|e| PipelineError::stage("terraform version check", e))?;

        let (state, outputs) = match self.engine.apply(state).await {
            Ok(ok) => ok,
            Err(EngineError::Terraform {
                operation,
                message,
                state,
            }) => {
                self.store.set(&state).await?;
                return Err(PipelineError::Stage {
                    stage: "terraform apply",
                    message: format!("{}: {}", operation, message),
                });
            }
            Err(e) => return Err(PipelineError::stage("terraform apply", e)),
        };
        self.store.set(&state).await?; // ▸ tfstate
        Ok((state, outputs))
    }

    async fn current_outputs(&self, state: &State) -> Result<Outputs, PipelineError> {
        self.engine
            .get_outputs(state)
            .await
            .map_err(|e| PipelineError::stage("terraform outputs", e))
    }
}
