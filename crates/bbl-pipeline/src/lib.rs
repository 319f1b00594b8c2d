pub mod env_id;
pub mod error;
pub mod keypair;
pub mod pipeline;
pub mod validators;

pub use env_id::EnvIdManager;
pub use error::PipelineError;
pub use keypair::KeyPairManager;
pub use pipeline::{LbConfig, Pipeline, UpConfig};
pub use validators::{DirectorProbe, EnvironmentValidator, NetworkDeletionValidator};
