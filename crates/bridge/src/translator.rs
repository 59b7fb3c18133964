//! Bidirectional message ID mapping.
//!
//! A local post and the remote message created for it (or the other way
//! around) are stored under two keys, one per direction. Mappings are write
//! once: recording either ID a second time leaves the first pairing intact.
//!
//! The remote-to-local key is written first. Until the second write lands a
//! remote message already counts as bridged while its local post does not
//! resolve to it yet. If the second write fails the first one is blanked, and
//! a blank entry counts as unmapped.

use std::sync::Arc;

use {
    teamsync_store::KvStore,
    tracing::{debug, warn},
};

use crate::error::Result;

const LOCAL_TO_REMOTE: &str = "local_remote_";
const REMOTE_TO_LOCAL: &str = "remote_local_";

pub struct Translator {
    store: Arc<dyn KvStore>,
    write_gate: tokio::sync::Mutex<()>,
}

impl Translator {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self {
            store,
            write_gate: tokio::sync::Mutex::new(()),
        }
    }

    /// Record `local_id <-> remote_id`. Returns `false` without writing when
    /// either ID is empty or already mapped.
    pub async fn record_mapping(&self, local_id: &str, remote_id: &str) -> Result<bool> {
        if local_id.is_empty() || remote_id.is_empty() {
            return Ok(false);
        }
        let local_key = format!("{LOCAL_TO_REMOTE}{local_id}");
        let remote_key = format!("{REMOTE_TO_LOCAL}{remote_id}");

        let _gate = self.write_gate.lock().await;
        if self.is_set(&local_key).await? || self.is_set(&remote_key).await? {
            debug!(local_id, remote_id, "message already mapped, keeping first pairing");
            return Ok(false);
        }
        self.store
            .set(&remote_key, local_id.as_bytes().to_vec())
            .await?;
        if let Err(e) = self
            .store
            .set(&local_key, remote_id.as_bytes().to_vec())
            .await
        {
            if let Err(undo) = self.store.set(&remote_key, Vec::new()).await {
                warn!(local_id, remote_id, error = %undo, "unable to blank half-written mapping");
            }
            return Err(e.into());
        }
        debug!(local_id, remote_id, "recorded message mapping");
        Ok(true)
    }

    async fn is_set(&self, key: &str) -> Result<bool> {
        Ok(self
            .store
            .get(key)
            .await?
            .is_some_and(|raw| !raw.is_empty()))
    }

    /// Remote message ID for a local post.
    pub async fn resolve_remote_parent(&self, local_id: &str) -> Result<Option<String>> {
        self.lookup(LOCAL_TO_REMOTE, local_id).await
    }

    /// Local post ID for a remote message.
    pub async fn resolve_local_from_remote(&self, remote_id: &str) -> Result<Option<String>> {
        self.lookup(REMOTE_TO_LOCAL, remote_id).await
    }

    async fn lookup(&self, prefix: &str, id: &str) -> Result<Option<String>> {
        if id.is_empty() {
            return Ok(None);
        }
        let value = self.store.get(&format!("{prefix}{id}")).await?;
        Ok(value
            .map(|raw| String::from_utf8_lossy(&raw).into_owned())
            .filter(|mapped| !mapped.is_empty()))
    }
}
