mod error;
mod manager;
mod vars;

pub use error::BoshError;
pub use manager::{BoshCli, BoshManager};
pub use vars::{director_deployment_vars, jumpbox_deployment_vars};
