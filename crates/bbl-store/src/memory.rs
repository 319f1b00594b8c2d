use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bbl_domain::State;
use tokio::sync::RwLock;

use crate::error::StoreError;
use crate::store::StateStore;

#[derive(Debug, Default)]
struct Inner {
    state: Option<State>,
    vars: HashMap<(String, String), Vec<u8>>,
    locked: bool,
}

/// In-memory implementation of [`StateStore`].
///
/// All data is lost on process exit. Suitable for tests.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with an existing state, bypassing `set`.
    pub async fn seed(&self, state: State) {
        self.inner.write().await.state = Some(state);
    }
}

#[async_trait]
impl StateStore for InMemoryStore {
    async fn load(&self) -> Result<Option<State>, StoreError> {
        Ok(self.inner.read().await.state.clone())
    }

    async fn set(&self, state: &State) -> Result<(), StoreError> {
        self.inner.write().await.state = Some(state.clone());
        Ok(())
    }

    async fn get_var(&self, deployment: &str, name: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let guard = self.inner.read().await;
        Ok(guard
            .vars
            .get(&(deployment.to_string(), name.to_string()))
            .cloned())
    }

    async fn set_var(&self, deployment: &str, name: &str, bytes: &[u8]) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        guard
            .vars
            .insert((deployment.to_string(), name.to_string()), bytes.to_vec());
        Ok(())
    }

    async fn remove(&self) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        guard.state = None;
        guard.vars.clear();
        Ok(())
    }

    async fn lock(&self) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        if guard.locked {
            return Err(StoreError::Locked("in-memory store".into()));
        }
        guard.locked = true;
        Ok(())
    }

    async fn unlock(&self) -> Result<(), StoreError> {
        self.inner.write().await.locked = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bbl_domain::Iaas;

    #[tokio::test]
    async fn set_then_load() {
        let store = InMemoryStore::new();
        let state = State::new(Iaas::Azure);
        store.set(&state).await.unwrap();
        assert_eq!(store.load().await.unwrap(), Some(state));
    }

    #[tokio::test]
    async fn remove_clears_state_and_vars() {
        let store = InMemoryStore::new();
        store.set(&State::default()).await.unwrap();
        store.set_var("director", "vars-store.yml", b"x").await.unwrap();
        store.remove().await.unwrap();
        assert!(store.load().await.unwrap().is_none());
        assert!(store
            .get_var("director", "vars-store.yml")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn lock_is_exclusive() {
        let store = InMemoryStore::new();
        store.lock().await.unwrap();
        assert!(store.lock().await.is_err());
        store.unlock().await.unwrap();
        store.lock().await.unwrap();
    }
}
