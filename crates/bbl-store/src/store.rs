use async_trait::async_trait;
use bbl_domain::State;

use crate::error::StoreError;

/// Durable state I/O for one environment.
///
/// `set` is atomic: a call that returns `Ok` has been fsynced, and a reader
/// observes either the previous document or the new one, never a torn write.
/// Concurrent writers against the same dir are rejected via `lock`.
#[async_trait]
pub trait StateStore: Send + Sync + 'static {
    /// Read and migrate the state document. `Ok(None)` means no state exists.
    async fn load(&self) -> Result<Option<State>, StoreError>;

    /// Atomically replace the state document.
    async fn set(&self, state: &State) -> Result<(), StoreError>;

    /// Read an opaque vars file for a deployment ("jumpbox" or "director").
    async fn get_var(&self, deployment: &str, name: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Atomically write an opaque vars file.
    async fn set_var(&self, deployment: &str, name: &str, bytes: &[u8]) -> Result<(), StoreError>;

    /// Delete the state document and vars tree. Idempotent.
    async fn remove(&self) -> Result<(), StoreError>;

    /// Take the best-effort single-writer lock. Fails fast with
    /// [`StoreError::Locked`] when another process holds it.
    async fn lock(&self) -> Result<(), StoreError>;

    /// Release the lock taken by `lock`. Idempotent.
    async fn unlock(&self) -> Result<(), StoreError>;
}
