//! Cloud-config generation. The document is rebuilt from state + outputs on
//! every update, so there is no drift between the IaaS topology and what the
//! director believes exists.

use bbl_domain::{Iaas, LbKind, State};
use bbl_engine::Outputs;
use serde_json::{json, Value};

use crate::error::CloudConfigError;

pub fn generate(state: &State, outputs: &Outputs) -> Result<String, CloudConfigError> {
    let iaas = state
        .iaas
        .ok_or_else(|| CloudConfigError::Generate("state has no iaas".into()))?;

    let doc = json!({
        "azs": azs(iaas, state),
        "networks": [network(iaas, outputs)],
        "vm_types": vm_types(iaas),
        "disk_types": disk_types(),
        "compilation": {
            "workers": 5,
            "network": "default",
            "az": "z1",
            "reuse_compilation_vms": true,
            "vm_type": "default",
        },
        "vm_extensions": vm_extensions(iaas, state.lb.kind, outputs),
    });

    serde_yaml::to_string(&doc).map_err(|e| CloudConfigError::Generate(e.to_string()))
}

fn azs(iaas: Iaas, state: &State) -> Value {
    let region = match (iaas, &state.aws, &state.gcp, &state.azure) {
        (Iaas::Aws, Some(c), _, _) => c.region.clone(),
        (Iaas::Gcp, _, Some(c), _) => c.region.clone(),
        (Iaas::Azure, _, _, Some(c)) => c.region.clone(),
        _ => String::new(),
    };

    let zones = ["a", "b", "c"];
    Value::Array(
        zones
            .iter()
            .enumerate()
            .map(|(i, suffix)| {
                let cloud_properties = match iaas {
                    Iaas::Aws => json!({ "availability_zone": format!("{}{}", region, suffix) }),
                    Iaas::Gcp => json!({ "zone": format!("{}-{}", region, suffix) }),
                    Iaas::Azure => json!({ "availability_zone": format!("{}", i + 1) }),
                };
                json!({ "name": format!("z{}", i + 1), "cloud_properties": cloud_properties })
            })
            .collect(),
    )
}

fn network(iaas: Iaas, outputs: &Outputs) -> Value {
    let network_name = outputs.get("network_name").unwrap_or_default();
    let subnetwork_name = outputs.get("subnetwork_name").unwrap_or_default();
    let tag = outputs.get("internal_tag_name").unwrap_or_default();

    let cloud_properties = match iaas {
        Iaas::Aws => json!({
            "subnet": subnetwork_name,
            "security_groups": [tag],
        }),
        Iaas::Gcp => json!({
            "network_name": network_name,
            "subnetwork_name": subnetwork_name,
            "tags": [tag],
        }),
        Iaas::Azure => json!({
            "virtual_network_name": network_name,
            "subnet_name": subnetwork_name,
            "security_group": tag,
        }),
    };

    json!({
        "name": "default",
        "type": "manual",
        "subnets": [{
            "range": "10.0.16.0/20",
            "gateway": "10.0.16.1",
            "azs": ["z1", "z2", "z3"],
            "reserved": ["10.0.16.2-10.0.16.3"],
            "cloud_properties": cloud_properties,
        }],
    })
}

fn vm_types(iaas: Iaas) -> Value {
    let sizes: &[(&str, &str, &str, &str)] = &[
        ("default", "m4.large", "n1-standard-2", "Standard_D2_v3"),
        ("small", "t2.small", "n1-standard-1", "Standard_D1_v2"),
        ("large", "m4.2xlarge", "n1-standard-8", "Standard_D8_v3"),
    ];
    Value::Array(
        sizes
            .iter()
            .map(|(name, aws, gcp, azure)| {
                let cloud_properties = match iaas {
                    Iaas::Aws => json!({ "instance_type": aws, "ephemeral_disk": { "size": 10240 } }),
                    Iaas::Gcp => json!({ "machine_type": gcp, "root_disk_size_gb": 10 }),
                    Iaas::Azure => json!({ "instance_type": azure }),
                };
                json!({ "name": name, "cloud_properties": cloud_properties })
            })
            .collect(),
    )
}

fn disk_types() -> Value {
    json!([
        { "name": "default", "disk_size": 3000 },
        { "name": "large", "disk_size": 50000 },
    ])
}

/// One vm_extension per LB resource, so deployments opt into a load
/// balancer by listing the extension on an instance group.
fn vm_extensions(iaas: Iaas, lb: LbKind, outputs: &Outputs) -> Value {
    let attach = |key: &str| -> Value {
        let name = outputs.get(key).unwrap_or_default();
        match iaas {
            Iaas::Aws => json!({ "elbs": [name] }),
            Iaas::Gcp => json!({ "target_pool": name }),
            Iaas::Azure => json!({ "load_balancer": name }),
        }
    };
    let backend = |key: &str| -> Value {
        let name = outputs.get(key).unwrap_or_default();
        match iaas {
            Iaas::Aws => json!({ "elbs": [name] }),
            Iaas::Gcp => json!({ "backend_service": name }),
            Iaas::Azure => json!({ "load_balancer": name }),
        }
    };

    match lb {
        LbKind::None => json!([]),
        LbKind::Concourse => json!([
            { "name": "lb", "cloud_properties": attach("concourse_target_pool") },
        ]),
        LbKind::Cf => json!([
            {
                "name": "cf-router-network-properties",
                "cloud_properties": {
                    "router": backend("router_backend_service"),
                    "ws": attach("ws_target_pool"),
                },
            },
            { "name": "diego-ssh-proxy-network-properties", "cloud_properties": attach("ssh_proxy_target_pool") },
            { "name": "cf-tcp-router-network-properties", "cloud_properties": attach("tcp_router_target_pool") },
            { "name": "credhub-network-properties", "cloud_properties": attach("credhub_target_pool") },
        ]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bbl_domain::{GcpCredentials, Lb};

    fn gcp_state(lb: LbKind) -> State {
        let mut state = State::new(Iaas::Gcp);
        state.env_id = "bbl-demo".into();
        state.gcp = Some(GcpCredentials {
            service_account_key: "{}".into(),
            project_id: "proj".into(),
            region: "us-west1".into(),
            zone: "us-west1-a".into(),
        });
        state.lb = Lb {
            kind: lb,
            ..Lb::default()
        };
        state
    }

    fn outputs_with_lbs() -> Outputs {
        let mut outputs = Outputs::default();
        outputs.insert("network_name", "bbl-demo-network");
        outputs.insert("subnetwork_name", "bbl-demo-subnet");
        outputs.insert("internal_tag_name", "bbl-demo-internal");
        outputs.insert("concourse_target_pool", "bbl-demo-concourse");
        outputs.insert("router_backend_service", "bbl-demo-router-lb");
        outputs.insert("ws_target_pool", "bbl-demo-cf-ws");
        outputs.insert("ssh_proxy_target_pool", "bbl-demo-cf-ssh-proxy");
        outputs.insert("tcp_router_target_pool", "bbl-demo-cf-tcp-router");
        outputs.insert("credhub_target_pool", "bbl-demo-credhub");
        outputs
    }

    #[test]
    fn base_document_references_the_network_outputs() {
        let yaml = generate(&gcp_state(LbKind::None), &outputs_with_lbs()).unwrap();
        assert!(yaml.contains("network_name: bbl-demo-network"));
        assert!(yaml.contains("subnetwork_name: bbl-demo-subnet"));
        assert!(yaml.contains("vm_extensions: []"));
    }

    #[test]
    fn concourse_lb_produces_the_lb_extension() {
        let yaml = generate(&gcp_state(LbKind::Concourse), &outputs_with_lbs()).unwrap();
        let doc: serde_yaml::Value = serde_yaml::from_str(&yaml).unwrap();
        let ext = &doc["vm_extensions"][0];
        assert_eq!(ext["name"], "lb");
        assert_eq!(ext["cloud_properties"]["target_pool"], "bbl-demo-concourse");
    }

    #[test]
    fn cf_lbs_produce_one_extension_per_pool() {
        let yaml = generate(&gcp_state(LbKind::Cf), &outputs_with_lbs()).unwrap();
        let doc: serde_yaml::Value = serde_yaml::from_str(&yaml).unwrap();
        let exts = doc["vm_extensions"].as_sequence().unwrap();
        assert_eq!(exts.len(), 4);
        let names: Vec<&str> = exts.iter().filter_map(|e| e["name"].as_str()).collect();
        assert!(names.contains(&"cf-router-network-properties"));
        assert!(names.contains(&"diego-ssh-proxy-network-properties"));
        assert!(names.contains(&"cf-tcp-router-network-properties"));
        assert!(names.contains(&"credhub-network-properties"));
    }

    #[test]
    fn aws_extensions_use_elb_lists() {
        let mut state = gcp_state(LbKind::Concourse);
        state.iaas = Some(Iaas::Aws);
        state.aws = Some(bbl_domain::AwsCredentials {
            access_key_id: "k".into(),
            secret_access_key: "s".into(),
            region: "us-east-1".into(),
        });
        let yaml = generate(&state, &outputs_with_lbs()).unwrap();
        let doc: serde_yaml::Value = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(
            doc["vm_extensions"][0]["cloud_properties"]["elbs"][0],
            "bbl-demo-concourse"
        );
    }

    #[test]
    fn generation_is_deterministic() {
        let state = gcp_state(LbKind::Cf);
        let outputs = outputs_with_lbs();
        assert_eq!(
            generate(&state, &outputs).unwrap(),
            generate(&state, &outputs).unwrap()
        );
    }
}
