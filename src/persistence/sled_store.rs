use std::path::Path;

use sled::{Db, Tree};

use crate::broker::{Message, SubscriptionKey};
use crate::utils::error::Result;

const TREE_PREFIX: &str = "subscription";
const REGISTRY: &str = "subscriptions";

/// Durable storage for subscription contents.
///
/// Each durable subscription maps to its own tree, keyed by the big-endian
/// sequence number so iteration follows publish order.
#[derive(Clone)]
pub struct Persistence {
    db: Db,
}

impl Persistence {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = sled::open(path)?;
        Ok(Self { db })
    }

    /// Opens a store that is deleted when the last handle is dropped.
    pub fn temporary() -> Result<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self { db })
    }

    fn tree(&self, key: &SubscriptionKey) -> Result<Tree> {
        let name = format!("{TREE_PREFIX}/{}/{}", key.topic, key.subscription);
        Ok(self.db.open_tree(name)?)
    }

    /// Records that a durable subscription exists. Idempotent.
    pub fn register(&self, key: &SubscriptionKey) -> Result<()> {
        let encoded = serde_json::to_vec(key)?;
        self.db.open_tree(REGISTRY)?.insert(encoded, b"" as &[u8])?;
        Ok(())
    }

    /// Every durable subscription ever registered.
    pub fn subscriptions(&self) -> Result<Vec<SubscriptionKey>> {
        let mut keys = Vec::new();
        for entry in self.db.open_tree(REGISTRY)?.iter() {
            let (encoded, _) = entry?;
            keys.push(serde_json::from_slice(&encoded)?);
        }
        Ok(keys)
    }

    pub fn next_seq(&self) -> Result<u64> {
        Ok(self.db.generate_id()?)
    }

    /// Inserts or overwrites the stored copy of a message.
    pub fn store(&self, key: &SubscriptionKey, seq: u64, message: &Message) -> Result<()> {
        let serialized = serde_json::to_vec(message)?;
        self.tree(key)?.insert(seq.to_be_bytes(), serialized)?;
        Ok(())
    }

    pub fn remove(&self, key: &SubscriptionKey, seq: u64) -> Result<()> {
        self.tree(key)?.remove(seq.to_be_bytes())?;
        Ok(())
    }

    /// Loads every stored message of a subscription in sequence order.
    pub fn load(&self, key: &SubscriptionKey) -> Result<Vec<(u64, Message)>> {
        let mut messages = Vec::new();
        for entry in self.tree(key)?.iter() {
            let (raw_seq, value) = entry?;
            let Ok(seq_bytes) = <[u8; 8]>::try_from(raw_seq.as_ref()) else {
                tracing::warn!(subscription = %key, "skipping stored entry with malformed key");
                continue;
            };
            let message: Message = serde_json::from_slice(&value)?;
            messages.push((u64::from_be_bytes(seq_bytes), message));
        }
        Ok(messages)
    }

    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }
}

impl std::fmt::Debug for Persistence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Persistence")
            .field("db", &"sled::Db")
            .finish()
    }
}
