//! Durable registry of linked channels.
//!
//! The whole set is persisted as one JSON document under [`LINKS_KEY`], keyed
//! by `"<local team>:<local channel>"`. Writers are serialized by an async
//! gate held across the store write; the in-memory map lock is only ever held
//! for the mutation itself, so readers never wait on storage.

use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, RwLock},
};

use {
    teamsync_common::{ChannelLink, link_key},
    teamsync_store::KvStore,
    tracing::{info, warn},
};

use crate::error::{Error, Result};

/// Store key holding the serialized link set.
pub const LINKS_KEY: &str = "channels_linked";

pub struct LinkRegistry {
    store: Arc<dyn KvStore>,
    links: RwLock<HashMap<String, ChannelLink>>,
    write_gate: tokio::sync::Mutex<()>,
}

impl LinkRegistry {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self {
            store,
            links: RwLock::new(HashMap::new()),
            write_gate: tokio::sync::Mutex::new(()),
        }
    }

    /// Replace the in-memory set with the persisted one.
    ///
    /// A missing record is an empty set. An undecodable one is
    /// [`Error::CorruptState`] and leaves the in-memory set untouched.
    pub async fn load_all(&self) -> Result<Vec<ChannelLink>> {
        let _gate = self.write_gate.lock().await;
        let loaded = match self.store.get(LINKS_KEY).await? {
            Some(raw) if !raw.is_empty() => decode_snapshot(&raw)?,
            _ => HashMap::new(),
        };
        let mut links: Vec<ChannelLink> = loaded.values().cloned().collect();
        links.sort_by_key(ChannelLink::key);
        *self.links.write().unwrap_or_else(|e| e.into_inner()) = loaded;
        info!(count = links.len(), "loaded channel links");
        Ok(links)
    }

    /// Persist a new link. Fails with [`Error::AlreadyLinked`] when the local
    /// channel is taken; nothing changes if the store write fails.
    pub async fn add_link(&self, link: ChannelLink) -> Result<()> {
        let _gate = self.write_gate.lock().await;
        let key = link.key();
        let snapshot = {
            let mut links = self.links.write().unwrap_or_else(|e| e.into_inner());
            if links.contains_key(&key) {
                return Err(Error::already_linked(
                    &link.local_team_id,
                    &link.local_channel_id,
                ));
            }
            links.insert(key.clone(), link.clone());
            encode_snapshot(&links)
        };

        if let Err(e) = self.persist(snapshot).await {
            self.links
                .write()
                .unwrap_or_else(|e| e.into_inner())
                .remove(&key);
            warn!(link = %key, error = %e, "failed to persist new link, rolled back");
            return Err(e);
        }

        info!(
            link = %key,
            remote_team = %link.remote_team_id,
            remote_channel = %link.remote_channel_id,
            "channel linked"
        );
        Ok(())
    }

    /// Remove and return the link of a local channel. Fails with
    /// [`Error::NotLinked`] when there is none.
    pub async fn remove_link(&self, team_id: &str, channel_id: &str) -> Result<ChannelLink> {
        let _gate = self.write_gate.lock().await;
        let key = link_key(team_id, channel_id);
        let (removed, snapshot) = {
            let mut links = self.links.write().unwrap_or_else(|e| e.into_inner());
            let Some(removed) = links.remove(&key) else {
                return Err(Error::not_linked(team_id, channel_id));
            };
            (removed, encode_snapshot(&links))
        };

        if let Err(e) = self.persist(snapshot).await {
            self.links
                .write()
                .unwrap_or_else(|e| e.into_inner())
                .insert(key.clone(), removed);
            warn!(link = %key, error = %e, "failed to persist link removal, rolled back");
            return Err(e);
        }

        info!(link = %key, "channel unlinked");
        Ok(removed)
    }

    pub fn lookup(&self, team_id: &str, channel_id: &str) -> Option<ChannelLink> {
        self.links
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&link_key(team_id, channel_id))
            .cloned()
    }

    /// Every link, ordered by key.
    pub fn all(&self) -> Vec<ChannelLink> {
        let mut links: Vec<ChannelLink> = self
            .links
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect();
        links.sort_by_key(ChannelLink::key);
        links
    }

    pub fn len(&self) -> usize {
        self.links.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    async fn persist(&self, snapshot: serde_json::Result<Vec<u8>>) -> Result<()> {
        self.store.set(LINKS_KEY, snapshot?).await?;
        Ok(())
    }
}

fn encode_snapshot(links: &HashMap<String, ChannelLink>) -> serde_json::Result<Vec<u8>> {
    let ordered: BTreeMap<&String, &ChannelLink> = links.iter().collect();
    serde_json::to_vec(&ordered)
}

/// Entries are re-keyed from their own fields.
fn decode_snapshot(raw: &[u8]) -> Result<HashMap<String, ChannelLink>> {
    let stored: HashMap<String, ChannelLink> =
        serde_json::from_slice(raw).map_err(|source| Error::CorruptState { source })?;
    Ok(stored
        .into_values()
        .map(|link| (link.key(), link))
        .collect())
}
