use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use bbl_domain::{Iaas, LbKind};

#[derive(Debug, Parser)]
#[command(
    name = "bbl",
    about = "Stands up, updates, and tears down a BOSH director with its surrounding IaaS infrastructure",
    version
)]
pub struct Cli {
    /// Directory holding the environment's persistent state.
    #[arg(long, env = "BBL_STATE_DIR", default_value = ".", global = true)]
    pub state_dir: PathBuf,

    /// Enable debug-level logging.
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Per-IaaS credential overrides. Precedence: flag > environment variable >
/// state file.
#[derive(Debug, Args, Clone, Default)]
pub struct CredentialFlags {
    #[arg(long, env = "BBL_AWS_ACCESS_KEY_ID", hide_env_values = true)]
    pub aws_access_key_id: Option<String>,
    #[arg(long, env = "BBL_AWS_SECRET_ACCESS_KEY", hide_env_values = true)]
    pub aws_secret_access_key: Option<String>,
    #[arg(long, env = "BBL_AWS_REGION")]
    pub aws_region: Option<String>,

    /// Service account key: inline JSON or a path to a JSON file.
    #[arg(long, env = "BBL_GCP_SERVICE_ACCOUNT_KEY", hide_env_values = true)]
    pub gcp_service_account_key: Option<String>,
    #[arg(long, env = "BBL_GCP_PROJECT_ID")]
    pub gcp_project_id: Option<String>,
    #[arg(long, env = "BBL_GCP_REGION")]
    pub gcp_region: Option<String>,
    #[arg(long, env = "BBL_GCP_ZONE")]
    pub gcp_zone: Option<String>,

    #[arg(long, env = "BBL_AZURE_CLIENT_ID", hide_env_values = true)]
    pub azure_client_id: Option<String>,
    #[arg(long, env = "BBL_AZURE_CLIENT_SECRET", hide_env_values = true)]
    pub azure_client_secret: Option<String>,
    #[arg(long, env = "BBL_AZURE_TENANT_ID")]
    pub azure_tenant_id: Option<String>,
    #[arg(long, env = "BBL_AZURE_SUBSCRIPTION_ID")]
    pub azure_subscription_id: Option<String>,
    #[arg(long, env = "BBL_AZURE_REGION")]
    pub azure_region: Option<String>,
}

#[derive(Debug, Args, Clone)]
pub struct UpFlags {
    /// Target IaaS. Immutable once the environment exists.
    #[arg(long, value_enum)]
    pub iaas: Option<IaasArg>,

    /// Environment name. Generated when omitted; immutable once set.
    #[arg(long)]
    pub name: Option<String>,

    /// Provision infrastructure only; skip the jumpbox and director.
    #[arg(long)]
    pub no_director: bool,

    #[command(flatten)]
    pub credentials: CredentialFlags,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Choose and persist the environment id without touching the IaaS.
    Plan(UpFlags),

    /// Converge the environment all the way to a running director.
    Up(UpFlags),

    /// Provision load balancers and wire them into the cloud-config.
    CreateLbs {
        #[arg(long = "type", value_enum)]
        lb_type: LbTypeArg,
        /// Path to the LB certificate (PEM).
        #[arg(long)]
        cert: Option<PathBuf>,
        /// Path to the LB private key (PEM).
        #[arg(long)]
        key: Option<PathBuf>,
        /// Path to the certificate chain (PEM).
        #[arg(long)]
        chain: Option<PathBuf>,
        /// Domain to associate with the load balancers.
        #[arg(long)]
        domain: Option<String>,
    },

    /// Replace the certificate and key of the existing load balancers.
    UpdateLbs {
        #[arg(long)]
        cert: PathBuf,
        #[arg(long)]
        key: PathBuf,
        #[arg(long)]
        chain: Option<PathBuf>,
    },

    /// Remove the load balancers.
    DeleteLbs,

    /// Rotate the environment's SSH keypair.
    Rotate,

    /// Tear the environment down in reverse order and delete its state.
    Destroy {
        /// Succeed even when the state or director is already gone.
        #[arg(long)]
        skip_if_missing: bool,
    },

    /// Print the BOSH environment variables for this environment.
    PrintEnv,

    /// Open an SSH shell on the jumpbox.
    Ssh,

    /// Print the load balancer resources currently provisioned.
    Lbs,

    /// Print the environment id.
    EnvId,

    /// Print the jumpbox address.
    JumpboxAddress,

    /// Print the environment's SSH private key.
    SshKey,

    /// Print the jumpbox user's SSH private key from the vars store.
    DirectorSshKey,

    /// Print the director address.
    DirectorAddress,

    /// Print the director username.
    DirectorUsername,

    /// Print the director password.
    DirectorPassword,

    /// Print the director CA certificate.
    DirectorCaCert,

    /// Print the cloud-config that would be uploaded.
    CloudConfig,

    /// Print the infrastructure outputs.
    Outputs,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum IaasArg {
    Aws,
    Gcp,
    Azure,
}

impl From<IaasArg> for Iaas {
    fn from(arg: IaasArg) -> Self {
        match arg {
            IaasArg::Aws => Iaas::Aws,
            IaasArg::Gcp => Iaas::Gcp,
            IaasArg::Azure => Iaas::Azure,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LbTypeArg {
    Concourse,
    Cf,
}

impl From<LbTypeArg> for LbKind {
    fn from(arg: LbTypeArg) -> Self {
        match arg {
            LbTypeArg::Concourse => LbKind::Concourse,
            LbTypeArg::Cf => LbKind::Cf,
        }
    }
}
