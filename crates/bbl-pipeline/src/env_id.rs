use std::sync::Arc;

use bbl_clients::{ClientError, NetworkClient};
use bbl_domain::{types::validate_env_id, State};
use rand::Rng;
use tracing::info;

use crate::error::PipelineError;

/// Source of truth for the envID attribute of state: derives or validates a
/// stable, globally-unique environment identifier.
pub struct EnvIdManager {
    network: Arc<dyn NetworkClient>,
}

impl EnvIdManager {
    pub fn new(network: Arc<dyn NetworkClient>) -> Self {
        Self { network }
    }

    /// Establish `state.env_id`. An id that is already set is validated and
    /// returned unchanged; a fresh one is taken from `suggested` or generated,
    /// then checked for collisions. Collisions are rejected outright; no
    /// suffixes are appended.
    pub async fn sync(
        &self,
        mut state: State,
        suggested: Option<&str>,
    ) -> Result<State, PipelineError> {
        if !state.env_id.is_empty() {
            validate_env_id(&state.env_id)?;
            return Ok(state);
        }

        let candidate = match suggested {
            Some(name) => name.to_string(),
            None => random_token(),
        };
        validate_env_id(&candidate)?;

        let taken = self
            .network
            .check_exists(&candidate)
            .await
            .map_err(|e| match e {
                ClientError::Unreachable(msg) => PipelineError::IaasUnreachable(msg),
                other => PipelineError::stage("env-id availability check", other),
            })?;
        if taken {
            return Err(PipelineError::EnvIdUnavailable(candidate));
        }

        info!(env_id = %candidate, "environment id established");
        state.env_id = candidate;
        Ok(state)
    }
}

/// Random lowercase token of 5–10 characters, starting with a letter.
fn random_token() -> String {
    const LETTERS: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
    const ALPHANUM: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

    let mut rng = rand::thread_rng();
    let len = rng.gen_range(5..=10);
    let mut token = String::with_capacity(len);
    token.push(LETTERS[rng.gen_range(0..LETTERS.len())] as char);
    for _ in 1..len {
        token.push(ALPHANUM[rng.gen_range(0..ALPHANUM.len())] as char);
    }
    token
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bbl_domain::Iaas;

    struct FakeNetwork {
        taken: Vec<String>,
        unreachable: bool,
    }

    #[async_trait]
    impl NetworkClient for FakeNetwork {
        async fn check_exists(&self, env_id: &str) -> Result<bool, ClientError> {
            if self.unreachable {
                return Err(ClientError::Unreachable("connection refused".into()));
            }
            Ok(self.taken.iter().any(|t| t == env_id))
        }
    }

    fn manager(taken: Vec<String>) -> EnvIdManager {
        EnvIdManager::new(Arc::new(FakeNetwork {
            taken,
            unreachable: false,
        }))
    }

    #[tokio::test]
    async fn suggested_name_is_adopted() {
        let state = manager(vec![])
            .sync(State::new(Iaas::Gcp), Some("bbl-demo"))
            .await
            .unwrap();
        assert_eq!(state.env_id, "bbl-demo");
    }

    #[tokio::test]
    async fn existing_env_id_is_kept() {
        let mut state = State::new(Iaas::Gcp);
        state.env_id = "existing".into();
        let state = manager(vec![]).sync(state, Some("other")).await.unwrap();
        assert_eq!(state.env_id, "existing");
    }

    #[tokio::test]
    async fn generated_token_is_well_formed() {
        let state = manager(vec![]).sync(State::new(Iaas::Aws), None).await.unwrap();
        assert!(validate_env_id(&state.env_id).is_ok());
        assert!(state.env_id.len() >= 5 && state.env_id.len() <= 10);
    }

    #[tokio::test]
    async fn bad_names_are_rejected() {
        let too_long = "a".repeat(51);
        for bad in ["", "-foo", "FOO", too_long.as_str()] {
            let err = manager(vec![])
                .sync(State::new(Iaas::Gcp), Some(bad))
                .await
                .unwrap_err();
            assert!(
                matches!(err, PipelineError::InvalidEnvId(_)),
                "{:?} for {:?}",
                err,
                bad
            );
        }
    }

    #[tokio::test]
    async fn collisions_are_rejected_not_suffixed() {
        let err = manager(vec!["bbl-demo".into()])
            .sync(State::new(Iaas::Gcp), Some("bbl-demo"))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::EnvIdUnavailable(_)));
    }

    #[tokio::test]
    async fn unreachable_iaas_is_surfaced() {
        let manager = EnvIdManager::new(Arc::new(FakeNetwork {
            taken: vec![],
            unreachable: true,
        }));
        let err = manager
            .sync(State::new(Iaas::Gcp), Some("bbl-demo"))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::IaasUnreachable(_)));
    }
}
