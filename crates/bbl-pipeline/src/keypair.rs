use std::sync::Arc;

use bbl_clients::{fingerprint, ClientError, KeyPairClient};
use bbl_domain::{naming, Iaas, KeyPair, State};
use rsa::pkcs1::{EncodeRsaPrivateKey, LineEnding};
use rsa::RsaPrivateKey;
use ssh_key::public::KeyData;
use tracing::{debug, info};

use crate::error::PipelineError;

const KEY_BITS: usize = 2048;

/// Guarantees the state holds a usable SSH keypair matching what the IaaS
/// actually holds, reconciled by fingerprint.
pub struct KeyPairManager {
    client: Arc<dyn KeyPairClient>,
}

impl KeyPairManager {
    pub fn new(client: Arc<dyn KeyPairClient>) -> Self {
        Self { client }
    }

    /// Make sure the state carries a named keypair, generating one locally
    /// when absent. No remote calls; callers persist the result before
    /// [`reconcile`](Self::reconcile) touches the IaaS.
    pub fn ensure_local(&self, mut state: State) -> Result<State, PipelineError> {
        if state.env_id.is_empty() {
            return Err(PipelineError::Internal(
                "keypair sync requires an envID".into(),
            ));
        }
        if state.key_pair.name.is_empty() {
            state.key_pair.name = naming::keypair_name(&state.env_id);
        }
        if state.key_pair.is_empty() {
            info!(name = %state.key_pair.name, "generating keypair");
            let (private_key, public_key) = generate(&state.key_pair.name)?;
            state.key_pair = KeyPair {
                name: state.key_pair.name.clone(),
                public_key,
                private_key,
            };
        }
        Ok(state)
    }

    /// Reconcile the state's keypair against the IaaS. Four cases:
    /// remote matches → no-op; remote differs, remote absent, or keys were
    /// just generated → import, re-read and compare fingerprints.
    pub async fn reconcile(&self, state: &State) -> Result<(), PipelineError> {
        let name = &state.key_pair.name;
        let local = fingerprint::openssh_md5(&state.key_pair.public_key)
            .map_err(|e| PipelineError::Internal(e.to_string()))?;

        let remote = self.describe(name).await?;
        if let Some(remote_fp) = &remote {
            if *remote_fp == local {
                debug!(name = %name, "remote keypair matches");
                return Ok(());
            }
        }

        // Upload-and-verify loop: import the state's public key, re-query,
        // and insist the fingerprints agree.
        self.client
            .import(name, &state.key_pair.public_key)
            .await
            .map_err(|e| client_err("keypair import", e))?;

        match self.describe(name).await? {
            Some(remote_fp) if remote_fp == local => Ok(()),
            Some(remote_fp) => Err(PipelineError::KeyPairFingerprintMismatch {
                local,
                remote: remote_fp,
            }),
            None => Err(PipelineError::KeyPairFingerprintMismatch {
                local,
                remote: "absent".into(),
            }),
        }
    }

    /// Convenience: `ensure_local` followed by `reconcile`.
    pub async fn sync(&self, state: State) -> Result<State, PipelineError> {
        let state = self.ensure_local(state)?;
        self.reconcile(&state).await?;
        Ok(state)
    }

    /// Replace the keypair. AWS does not support replacing the key under a
    /// live instance, so rotation there is refused outright.
    pub async fn rotate(&self, mut state: State, iaas: Iaas) -> Result<State, PipelineError> {
        if iaas == Iaas::Aws {
            return Err(PipelineError::NotImplemented("aws keypair rotation".into()));
        }
        info!(name = %state.key_pair.name, "rotating keypair");
        self.client
            .delete(&state.key_pair.name)
            .await
            .map_err(|e| client_err("keypair delete", e))?;
        state.key_pair.public_key.clear();
        state.key_pair.private_key.clear();
        self.sync(state).await
    }

    async fn describe(&self, name: &str) -> Result<Option<String>, PipelineError> {
        Ok(self
            .client
            .describe(name)
            .await
            .map_err(|e| client_err("keypair lookup", e))?
            .map(|remote| remote.fingerprint))
    }
}

fn client_err(stage: &'static str, e: ClientError) -> PipelineError {
    match e {
        ClientError::Unreachable(msg) => PipelineError::IaasUnreachable(msg),
        other => PipelineError::stage(stage, other),
    }
}

/// 2048-bit RSA keypair: private as PEM-encoded PKCS#1, public in OpenSSH
/// authorized-keys form with the keypair name as comment.
fn generate(name: &str) -> Result<(String, String), PipelineError> {
    let mut rng = rand::thread_rng();
    let private = RsaPrivateKey::new(&mut rng, KEY_BITS)
        .map_err(|e| PipelineError::Internal(format!("generate rsa key: {}", e)))?;

    let private_pem = private
        .to_pkcs1_pem(LineEnding::LF)
        .map_err(|e| PipelineError::Internal(format!("encode private key: {}", e)))?
        .to_string();

    let ssh_public = ssh_key::public::RsaPublicKey::try_from(&private.to_public_key())
        .map_err(|e| PipelineError::Internal(format!("convert public key: {}", e)))?;
    let public_openssh = ssh_key::PublicKey::new(KeyData::Rsa(ssh_public), name)
        .to_openssh()
        .map_err(|e| PipelineError::Internal(format!("encode public key: {}", e)))?;

    Ok((private_pem, public_openssh))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bbl_clients::RemoteKeyPair;
    use std::sync::Mutex;

    /// Remote keypair registry; optionally lies about the fingerprint after
    /// an import to exercise the verify loop.
    struct FakeKeyPairs {
        remote: Mutex<Option<(String, String)>>, // (name, public_key)
        corrupt_after_import: bool,
    }

    impl FakeKeyPairs {
        fn empty() -> Self {
            Self {
                remote: Mutex::new(None),
                corrupt_after_import: false,
            }
        }
    }

    #[async_trait]
    impl KeyPairClient for FakeKeyPairs {
        async fn describe(&self, name: &str) -> Result<Option<RemoteKeyPair>, ClientError> {
            let guard = self.remote.lock().unwrap();
            match guard.as_ref() {
                Some((stored, public_key)) if stored == name => {
                    let fingerprint = if self.corrupt_after_import {
                        "00:00:00:00:00:00:00:00:00:00:00:00:00:00:00:00".to_string()
                    } else {
                        fingerprint::openssh_md5(public_key)?
                    };
                    Ok(Some(RemoteKeyPair {
                        name: name.to_string(),
                        fingerprint,
                    }))
                }
                _ => Ok(None),
            }
        }

        async fn import(&self, name: &str, public_key: &str) -> Result<(), ClientError> {
            *self.remote.lock().unwrap() = Some((name.to_string(), public_key.to_string()));
            Ok(())
        }

        async fn delete(&self, _name: &str) -> Result<(), ClientError> {
            *self.remote.lock().unwrap() = None;
            Ok(())
        }
    }

    fn state() -> State {
        let mut state = State::new(Iaas::Gcp);
        state.env_id = "bbl-demo".into();
        state
    }

    #[tokio::test]
    async fn sync_generates_names_and_imports() {
        let manager = KeyPairManager::new(Arc::new(FakeKeyPairs::empty()));
        let state = manager.sync(state()).await.unwrap();
        assert_eq!(state.key_pair.name, "keypair-bbl-demo");
        assert!(state.key_pair.private_key.contains("BEGIN RSA PRIVATE KEY"));
        assert!(state.key_pair.public_key.starts_with("ssh-rsa "));
        assert!(state.key_pair.public_key.ends_with("keypair-bbl-demo"));
    }

    #[tokio::test]
    async fn sync_is_a_noop_when_remote_matches() {
        let fake = Arc::new(FakeKeyPairs::empty());
        let manager = KeyPairManager::new(fake.clone());
        let synced = manager.sync(state()).await.unwrap();

        // Second sync keeps the exact same keys.
        let again = manager.sync(synced.clone()).await.unwrap();
        assert_eq!(synced.key_pair, again.key_pair);
    }

    #[tokio::test]
    async fn sync_reimports_on_remote_mismatch() {
        let fake = Arc::new(FakeKeyPairs::empty());
        let manager = KeyPairManager::new(fake.clone());

        // Someone else's key is registered under our name.
        manager.sync(state()).await.unwrap();

        // A state with no local keys generates fresh ones; the remote now
        // mismatches and must be replaced.
        let synced = manager.sync(state()).await.unwrap();
        let guard = fake.remote.lock().unwrap();
        assert_eq!(guard.as_ref().unwrap().1, synced.key_pair.public_key);
    }

    #[tokio::test]
    async fn fingerprint_mismatch_after_import_is_fatal() {
        let fake = Arc::new(FakeKeyPairs {
            remote: Mutex::new(None),
            corrupt_after_import: true,
        });
        let manager = KeyPairManager::new(fake);
        let err = manager.sync(state()).await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::KeyPairFingerprintMismatch { .. }
        ));
    }

    #[tokio::test]
    async fn rotate_is_not_implemented_on_aws() {
        let manager = KeyPairManager::new(Arc::new(FakeKeyPairs::empty()));
        let err = manager.rotate(state(), Iaas::Aws).await.unwrap_err();
        assert!(matches!(err, PipelineError::NotImplemented(_)));
    }

    #[tokio::test]
    async fn rotate_replaces_the_keys_on_gcp() {
        let fake = Arc::new(FakeKeyPairs::empty());
        let manager = KeyPairManager::new(fake.clone());
        let before = manager.sync(state()).await.unwrap();
        let after = manager
            .rotate(before.clone(), Iaas::Gcp)
            .await
            .unwrap();
        assert_ne!(before.key_pair.public_key, after.key_pair.public_key);
        assert_eq!(after.key_pair.name, "keypair-bbl-demo");
    }

    #[tokio::test]
    async fn sync_without_env_id_is_an_internal_error() {
        let manager = KeyPairManager::new(Arc::new(FakeKeyPairs::empty()));
        let err = manager.sync(State::new(Iaas::Gcp)).await.unwrap_err();
        assert!(matches!(err, PipelineError::Internal(_)));
    }
}
