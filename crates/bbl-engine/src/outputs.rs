use std::collections::HashMap;

use bbl_domain::{Iaas, LbKind};

use crate::error::EngineError;

/// Named strings produced by the infrastructure engine after an apply.
/// Downstream phases (BOSH, cloud-config, validators) key into this map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Outputs(HashMap<String, String>);

impl Outputs {
    pub fn new(map: HashMap<String, String>) -> Self {
        Self(map)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }

    /// Check that every output required for the given (iaas, lb) pair is
    /// present. Runs at the engine boundary so a broken template surfaces
    /// here, not later inside the cloud-config generator.
    pub fn validate(&self, iaas: Iaas, lb: LbKind) -> Result<(), EngineError> {
        for key in required_outputs(iaas, lb) {
            if self.get(key).map_or(true, str::is_empty) {
                return Err(EngineError::MissingOutput {
                    key,
                    iaas: iaas.to_string(),
                    lb: lb.to_string(),
                });
            }
        }
        Ok(())
    }
}

const BASE_OUTPUTS: &[&str] = &["network_name", "subnetwork_name", "internal_tag_name"];
const CONCOURSE_OUTPUTS: &[&str] = &[
    "network_name",
    "subnetwork_name",
    "internal_tag_name",
    "concourse_target_pool",
];
const CF_OUTPUTS: &[&str] = &[
    "network_name",
    "subnetwork_name",
    "internal_tag_name",
    "router_backend_service",
    "ws_target_pool",
    "ssh_proxy_target_pool",
    "tcp_router_target_pool",
    "credhub_target_pool",
];

/// The documented required-output set per (iaas, lb) pair. The key names are
/// uniform across providers; the templates alias provider-specific resources
/// onto them.
pub fn required_outputs(iaas: Iaas, lb: LbKind) -> &'static [&'static str] {
    match (iaas, lb) {
        (_, LbKind::None) => BASE_OUTPUTS,
        (_, LbKind::Concourse) => CONCOURSE_OUTPUTS,
        (_, LbKind::Cf) => CF_OUTPUTS,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_base() -> Outputs {
        let mut out = Outputs::default();
        out.insert("network_name", "bbl-demo-network");
        out.insert("subnetwork_name", "bbl-demo-subnet");
        out.insert("internal_tag_name", "bbl-demo-internal");
        out
    }

    #[test]
    fn base_outputs_satisfy_no_lb() {
        assert!(full_base().validate(Iaas::Gcp, LbKind::None).is_ok());
    }

    #[test]
    fn concourse_requires_target_pool() {
        let err = full_base()
            .validate(Iaas::Gcp, LbKind::Concourse)
            .unwrap_err();
        match err {
            EngineError::MissingOutput { key, .. } => assert_eq!(key, "concourse_target_pool"),
            other => panic!("unexpected error: {}", other),
        }

        let mut out = full_base();
        out.insert("concourse_target_pool", "bbl-demo-concourse");
        assert!(out.validate(Iaas::Gcp, LbKind::Concourse).is_ok());
    }

    #[test]
    fn cf_requires_every_lb_output() {
        let mut out = full_base();
        for key in [
            "router_backend_service",
            "ws_target_pool",
            "ssh_proxy_target_pool",
            "tcp_router_target_pool",
            "credhub_target_pool",
        ] {
            assert!(out.validate(Iaas::Aws, LbKind::Cf).is_err());
            out.insert(key, "x");
        }
        assert!(out.validate(Iaas::Aws, LbKind::Cf).is_ok());
    }

    #[test]
    fn empty_values_count_as_missing() {
        let mut out = full_base();
        out.insert("network_name", "");
        assert!(out.validate(Iaas::Azure, LbKind::None).is_err());
    }
}
