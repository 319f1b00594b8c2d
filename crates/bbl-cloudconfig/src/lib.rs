mod error;
mod generator;
mod manager;

pub use error::CloudConfigError;
pub use generator::generate;
pub use manager::{BoshCloudConfig, CloudConfigManager};
