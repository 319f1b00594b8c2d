//! Resource naming conventions. These strings are load-bearing: existing
//! environments were created with them, so they must not change shape.

/// SSH keypair registered with the IaaS for jumpbox/director access.
pub fn keypair_name(env_id: &str) -> String {
    format!("keypair-{}", env_id)
}

/// Tag applied to the NAT instance.
pub fn nat_tag(env_id: &str) -> String {
    format!("{}-nat", env_id)
}

/// BOSH director deployment name.
pub fn director_name(env_id: &str) -> String {
    format!("bosh-{}", env_id)
}

/// AWS load balancer names, one per LB resource.
pub fn concourse_lb_name(env_id: &str) -> String {
    format!("{}-concourse-lb", env_id)
}

pub fn cf_router_lb_name(env_id: &str) -> String {
    format!("{}-cf-router-lb", env_id)
}

pub fn cf_ssh_lb_name(env_id: &str) -> String {
    format!("{}-cf-ssh-lb", env_id)
}

pub fn cf_tcp_lb_name(env_id: &str) -> String {
    format!("{}-cf-tcp-lb", env_id)
}

/// VM names that belong to the environment itself and are expected to still
/// exist when its network is deleted.
pub fn owned_vm_names(env_id: &str) -> [String; 3] {
    [
        "NAT".to_string(),
        "bosh/0".to_string(),
        nat_tag(env_id),
    ]
}
