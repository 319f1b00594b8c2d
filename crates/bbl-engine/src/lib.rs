mod error;
mod manager;
mod outputs;
mod templates;

pub use error::EngineError;
pub use manager::{InfrastructureManager, TerraformManager};
pub use outputs::{required_outputs, Outputs};
