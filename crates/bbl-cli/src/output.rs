//! Plain-text rendering for the reader commands.

use bbl_domain::{LbKind, State};
use bbl_engine::Outputs;
use bbl_pipeline::PipelineError;

/// Shell-exportable environment for talking to the director through the
/// jumpbox.
pub fn print_env(state: &State) -> Result<String, PipelineError> {
    if !state.has_director() {
        return Err(PipelineError::UserInput(
            "no director in this environment".into(),
        ));
    }
    let mut out = String::new();
    out.push_str(&format!(
        "export BOSH_CLIENT={}\n",
        state.bosh.director_username
    ));
    out.push_str(&format!(
        "export BOSH_CLIENT_SECRET={}\n",
        state.bosh.director_password
    ));
    out.push_str(&format!(
        "export BOSH_ENVIRONMENT={}\n",
        state.bosh.director_address
    ));
    out.push_str(&format!(
        "export BOSH_CA_CERT='{}'\n",
        state.bosh.director_ssl_ca.trim_end()
    ));
    if !state.jumpbox.url.is_empty() {
        out.push_str(&format!(
            "export BOSH_ALL_PROXY=ssh+socks5://jumpbox@{}?private-key=$JUMPBOX_PRIVATE_KEY\n",
            state.jumpbox.url
        ));
        out.push_str(&format!("export JUMPBOX_URL={}\n", state.jumpbox.url));
    }
    Ok(out)
}

/// The provisioned LB resources, one per line.
pub fn lbs(state: &State, outputs: &Outputs) -> String {
    let mut out = String::new();
    match state.lb.kind {
        LbKind::None => out.push_str("no load balancers\n"),
        LbKind::Concourse => {
            line(&mut out, "Concourse LB", outputs.get("concourse_target_pool"));
        }
        LbKind::Cf => {
            line(&mut out, "CF Router LB", outputs.get("router_backend_service"));
            line(&mut out, "CF WS LB", outputs.get("ws_target_pool"));
            line(&mut out, "CF SSH Proxy LB", outputs.get("ssh_proxy_target_pool"));
            line(&mut out, "CF TCP Router LB", outputs.get("tcp_router_target_pool"));
            line(&mut out, "CF Credhub LB", outputs.get("credhub_target_pool"));
            if !state.lb.domain.is_empty() {
                out.push_str(&format!("CF System Domain DNS: {}\n", state.lb.domain));
            }
        }
    }
    out
}

/// Sorted key: value rendering of the engine outputs.
pub fn outputs(outputs: &Outputs) -> String {
    let mut pairs: Vec<(&String, &String)> = outputs.iter().collect();
    pairs.sort();
    pairs
        .iter()
        .map(|(k, v)| format!("{}: {}\n", k, v))
        .collect()
}

fn line(out: &mut String, label: &str, value: Option<&str>) {
    if let Some(value) = value {
        out.push_str(&format!("{}: {}\n", label, value));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bbl_domain::Iaas;

    fn ready_state() -> State {
        let mut state = State::new(Iaas::Gcp);
        state.env_id = "bbl-demo".into();
        state.jumpbox.url = "10.0.0.5:22".into();
        state.jumpbox.state = "{}".into();
        state.bosh.director_address = "https://10.0.0.6:25555".into();
        state.bosh.director_username = "admin".into();
        state.bosh.director_password = "pw".into();
        state.bosh.director_ssl_ca = "CA\n".into();
        state.bosh.state = "{}".into();
        state
    }

    #[test]
    fn print_env_exports_the_director_credentials() {
        let rendered = print_env(&ready_state()).unwrap();
        assert!(rendered.contains("export BOSH_CLIENT=admin\n"));
        assert!(rendered.contains("export BOSH_ENVIRONMENT=https://10.0.0.6:25555\n"));
        assert!(rendered.contains("export BOSH_CA_CERT='CA'\n"));
        assert!(rendered.contains("jumpbox@10.0.0.5:22"));
    }

    #[test]
    fn print_env_without_director_is_an_error() {
        let state = State::new(Iaas::Gcp);
        assert!(print_env(&state).is_err());
    }

    #[test]
    fn lbs_lists_the_concourse_pool() {
        let mut state = ready_state();
        state.lb.kind = LbKind::Concourse;
        let mut outs = Outputs::default();
        outs.insert("concourse_target_pool", "bbl-demo-concourse");
        assert_eq!(lbs(&state, &outs), "Concourse LB: bbl-demo-concourse\n");
    }

    #[test]
    fn lbs_without_lbs_says_so() {
        let state = ready_state();
        assert_eq!(lbs(&state, &Outputs::default()), "no load balancers\n");
    }
}
