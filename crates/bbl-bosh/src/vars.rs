//! Deterministic renderers for the deployment vars files handed to the BOSH
//! installer. The address plan is fixed: the jumpbox always takes .5 of the
//! director subnet and the director .6, so re-renders never move a VM.

use bbl_domain::{naming, Iaas, State};
use bbl_engine::Outputs;
use serde_json::json;

pub const JUMPBOX_INTERNAL_IP: &str = "10.0.0.5";
pub const DIRECTOR_INTERNAL_IP: &str = "10.0.0.6";
const INTERNAL_CIDR: &str = "10.0.0.0/24";
const INTERNAL_GW: &str = "10.0.0.1";

/// Vars consumed by the jumpbox deployment manifest.
pub fn jumpbox_deployment_vars(state: &State, outputs: &Outputs) -> String {
    let mut vars = json!({
        "internal_cidr": INTERNAL_CIDR,
        "internal_gw": INTERNAL_GW,
        "internal_ip": JUMPBOX_INTERNAL_IP,
        "director_name": naming::director_name(&state.env_id),
        "env_id": state.env_id,
        "network": outputs.get("network_name").unwrap_or_default(),
        "subnetwork": outputs.get("subnetwork_name").unwrap_or_default(),
        "tags": [outputs.get("internal_tag_name").unwrap_or_default()],
    });
    merge_iaas_vars(&mut vars, state);
    to_yaml(&vars)
}

/// Vars consumed by the director deployment manifest.
pub fn director_deployment_vars(state: &State, outputs: &Outputs) -> String {
    let mut vars = json!({
        "internal_cidr": INTERNAL_CIDR,
        "internal_gw": INTERNAL_GW,
        "internal_ip": DIRECTOR_INTERNAL_IP,
        "director_name": naming::director_name(&state.env_id),
        "env_id": state.env_id,
        "network": outputs.get("network_name").unwrap_or_default(),
        "subnetwork": outputs.get("subnetwork_name").unwrap_or_default(),
        "tags": [outputs.get("internal_tag_name").unwrap_or_default()],
    });
    merge_iaas_vars(&mut vars, state);
    to_yaml(&vars)
}

fn merge_iaas_vars(vars: &mut serde_json::Value, state: &State) {
    let map = vars.as_object_mut().expect("vars document is an object");
    match state.iaas {
        Some(Iaas::Aws) => {
            if let Some(creds) = &state.aws {
                map.insert("region".into(), json!(creds.region));
                map.insert("az".into(), json!(format!("{}a", creds.region)));
                map.insert(
                    "default_key_name".into(),
                    json!(naming::keypair_name(&state.env_id)),
                );
                map.insert("private_key".into(), json!(state.key_pair.private_key));
            }
        }
        Some(Iaas::Gcp) => {
            if let Some(creds) = &state.gcp {
                map.insert("project_id".into(), json!(creds.project_id));
                map.insert("region".into(), json!(creds.region));
                map.insert("zone".into(), json!(creds.zone));
                map.insert("private_key".into(), json!(state.key_pair.private_key));
            }
        }
        Some(Iaas::Azure) => {
            if let Some(creds) = &state.azure {
                map.insert("subscription_id".into(), json!(creds.subscription_id));
                map.insert("tenant_id".into(), json!(creds.tenant_id));
                map.insert("client_id".into(), json!(creds.client_id));
                map.insert("client_secret".into(), json!(creds.client_secret));
                map.insert("region".into(), json!(creds.region));
                map.insert(
                    "resource_group_name".into(),
                    json!(format!("{}-bosh", state.env_id)),
                );
                map.insert("private_key".into(), json!(state.key_pair.private_key));
            }
        }
        None => {}
    }
}

/// Minimal jumpbox deployment manifest, parameterised entirely via vars.
pub fn jumpbox_manifest() -> String {
    MANIFEST_JUMPBOX.to_string()
}

/// Minimal director deployment manifest, parameterised entirely via vars.
pub fn director_manifest() -> String {
    MANIFEST_DIRECTOR.to_string()
}

// serde_json maps are sorted, so the rendered YAML is stable across runs.
fn to_yaml(value: &serde_json::Value) -> String {
    serde_yaml::to_string(value).expect("vars document serializes")
}

const MANIFEST_JUMPBOX: &str = r#"---
name: jumpbox

releases:
- name: os-conf
  url: https://bosh.io/d/github.com/cloudfoundry/os-conf-release?v=22.1.2
  sha1: 386293038ae3d00813eaa475b4acf63f8da226ef

instance_groups:
- name: jumpbox
  instances: 1
  networks:
  - name: private
    static_ips: [((internal_ip))]
  properties:
    users:
    - name: jumpbox
      public_key: ((jumpbox_ssh.public_key))

variables:
- name: jumpbox_ssh
  type: ssh

networks:
- name: private
  type: manual
  subnets:
  - range: ((internal_cidr))
    gateway: ((internal_gw))
"#;

const MANIFEST_DIRECTOR: &str = r#"---
name: bosh

releases:
- name: bosh
  url: https://bosh.io/d/github.com/cloudfoundry/bosh?v=270.12.0
  sha1: f72eb786a2b164da04b196b77fa80da43b36f3dd

instance_groups:
- name: bosh
  instances: 1
  networks:
  - name: private
    static_ips: [((internal_ip))]
  properties:
    director:
      name: ((director_name))
      address: ((internal_ip))
    nats:
      user: nats
      password: ((nats_password))

variables:
- name: nats_password
  type: password
- name: admin_password
  type: password
- name: director_ssl
  type: certificate
  options:
    is_ca: false
    common_name: ((internal_ip))
    alternative_names: [((internal_ip))]

networks:
- name: private
  type: manual
  subnets:
  - range: ((internal_cidr))
    gateway: ((internal_gw))
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use bbl_domain::GcpCredentials;

    fn state_and_outputs() -> (State, Outputs) {
        let mut state = State::new(Iaas::Gcp);
        state.env_id = "bbl-demo".into();
        state.gcp = Some(GcpCredentials {
            service_account_key: "{}".into(),
            project_id: "proj".into(),
            region: "us-west1".into(),
            zone: "us-west1-a".into(),
        });
        state.key_pair.private_key = "PRIVATE".into();

        let mut outputs = Outputs::default();
        outputs.insert("network_name", "bbl-demo-network");
        outputs.insert("subnetwork_name", "bbl-demo-subnet");
        outputs.insert("internal_tag_name", "bbl-demo-internal");
        (state, outputs)
    }

    #[test]
    fn deployment_vars_are_deterministic() {
        let (state, outputs) = state_and_outputs();
        let a = jumpbox_deployment_vars(&state, &outputs);
        let b = jumpbox_deployment_vars(&state, &outputs);
        assert_eq!(a, b);
    }

    #[test]
    fn jumpbox_vars_carry_the_network_plan() {
        let (state, outputs) = state_and_outputs();
        let vars = jumpbox_deployment_vars(&state, &outputs);
        assert!(vars.contains("internal_ip: 10.0.0.5"));
        assert!(vars.contains("network: bbl-demo-network"));
        assert!(vars.contains("project_id: proj"));
        assert!(vars.contains("director_name: bosh-bbl-demo"));
    }

    #[test]
    fn director_vars_use_the_director_address() {
        let (state, outputs) = state_and_outputs();
        let vars = director_deployment_vars(&state, &outputs);
        assert!(vars.contains("internal_ip: 10.0.0.6"));
    }

    #[test]
    fn manifests_declare_their_credential_variables() {
        assert!(jumpbox_manifest().contains("name: jumpbox_ssh"));
        assert!(director_manifest().contains("name: admin_password"));
        assert!(director_manifest().contains("name: director_ssl"));
    }
}
