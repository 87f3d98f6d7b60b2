//! Fast instance-state index: the by-id hash, the per-user set and the
//! expiry-ordered view used by the reaper. The authoritative store keeps the
//! durable rows; this index answers the hot-path lookups.

use std::collections::{BTreeSet, HashMap, HashSet};

use async_trait::async_trait;
use tokio::sync::RwLock;

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("expiry time is in the past")]
    ExpiryInPast,
    #[error("index unavailable: {0}")]
    Unavailable(String),
}

/// Live-instance view held by the index. Mirrors the authoritative row
/// fields needed by stop/verify without touching the database.
#[derive(Debug, Clone, PartialEq)]
pub struct InstanceRecord {
    pub user_id: String,
    pub challenge_id: String,
    pub container_id: String,
    pub flag: String,
    pub port: i32,
    /// Epoch seconds.
    pub expires_at: i64,
}

/// The three views of live-instance state. Implementations apply each
/// write's mutations atomically (the pipeline primitive): an instance is
/// never visible in one view and absent from another mid-write.
#[async_trait]
pub trait InstanceIndex: Send + Sync {
    /// Store the hash, add the id to the user's set and to the expiry index.
    async fn store_instance(&self, id: &str, record: InstanceRecord) -> Result<(), IndexError>;

    async fn get_instance(&self, id: &str) -> Result<Option<InstanceRecord>, IndexError>;

    /// Ids of the user's live instances.
    async fn user_instances(&self, user_id: &str) -> Result<Vec<String>, IndexError>;

    /// Remove the hash, the user-set membership and the expiry entry.
    async fn delete_instance(&self, id: &str, user_id: &str) -> Result<(), IndexError>;

    /// Remove a dangling member from the expiry index only.
    async fn remove_from_expiry(&self, id: &str) -> Result<(), IndexError>;

    /// Ids whose expiry score is <= `now` (epoch seconds).
    async fn expired_before(&self, now: i64) -> Result<Vec<String>, IndexError>;
}

/// Walk the user's set looking for a live instance of the given challenge.
/// Ids whose hash is gone are skipped; those are resolvable through the
/// authoritative store.
pub async fn find_by_user_and_challenge(
    index: &dyn InstanceIndex,
    user_id: &str,
    challenge_id: &str,
) -> Result<Option<(String, InstanceRecord)>, IndexError> {
    for id in index.user_instances(user_id).await? {
        if let Some(record) = index.get_instance(&id).await? {
            if record.challenge_id == challenge_id {
                return Ok(Some((id, record)));
            }
        }
    }
    Ok(None)
}

#[derive(Default)]
struct IndexInner {
    instances: HashMap<String, InstanceRecord>,
    user_instances: HashMap<String, HashSet<String>>,
    /// Sorted by (expiry epoch seconds, id) for cheap range scans.
    expiry: BTreeSet<(i64, String)>,
}

/// In-process index. A single write lock covers all three views, so each
/// write lands as one atomic group.
#[derive(Default)]
pub struct MemoryIndex {
    inner: RwLock<IndexInner>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl InstanceIndex for MemoryIndex {
    async fn store_instance(&self, id: &str, record: InstanceRecord) -> Result<(), IndexError> {
        if record.expires_at <= chrono::Utc::now().timestamp() {
            return Err(IndexError::ExpiryInPast);
        }

        let mut inner = self.inner.write().await;
        inner
            .user_instances
            .entry(record.user_id.clone())
            .or_default()
            .insert(id.to_string());
        inner.expiry.insert((record.expires_at, id.to_string()));
        inner.instances.insert(id.to_string(), record);
        Ok(())
    }

    async fn get_instance(&self, id: &str) -> Result<Option<InstanceRecord>, IndexError> {
        Ok(self.inner.read().await.instances.get(id).cloned())
    }

    async fn user_instances(&self, user_id: &str) -> Result<Vec<String>, IndexError> {
        Ok(self
            .inner
            .read()
            .await
            .user_instances
            .get(user_id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn delete_instance(&self, id: &str, user_id: &str) -> Result<(), IndexError> {
        let mut inner = self.inner.write().await;
        let expires_at = inner.instances.remove(id).map(|r| r.expires_at);
        if let Some(set) = inner.user_instances.get_mut(user_id) {
            set.remove(id);
            if set.is_empty() {
                inner.user_instances.remove(user_id);
            }
        }
        match expires_at {
            Some(score) => {
                inner.expiry.remove(&(score, id.to_string()));
            }
            // Hash already gone; scrub any leftover expiry entry for the id.
            None => {
                inner.expiry.retain(|(_, member)| member != id);
            }
        }
        Ok(())
    }

    async fn remove_from_expiry(&self, id: &str) -> Result<(), IndexError> {
        self.inner
            .write()
            .await
            .expiry
            .retain(|(_, member)| member != id);
        Ok(())
    }

    async fn expired_before(&self, now: i64) -> Result<Vec<String>, IndexError> {
        Ok(self
            .inner
            .read()
            .await
            .expiry
            .iter()
            .take_while(|(score, _)| *score <= now)
            .map(|(_, id)| id.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(user: &str, challenge: &str, expires_at: i64) -> InstanceRecord {
        InstanceRecord {
            user_id: user.to_string(),
            challenge_id: challenge.to_string(),
            container_id: "cid-1".to_string(),
            flag: "flag{u_1_deadbeef}".to_string(),
            port: 23456,
            expires_at,
        }
    }

    fn soon() -> i64 {
        chrono::Utc::now().timestamp() + 3600
    }

    #[tokio::test]
    async fn store_and_lookup() {
        let index = MemoryIndex::new();
        index.store_instance("i1", record("u1", "c1", soon())).await.unwrap();

        let rec = index.get_instance("i1").await.unwrap().unwrap();
        assert_eq!(rec.challenge_id, "c1");
        assert_eq!(index.user_instances("u1").await.unwrap(), vec!["i1"]);

        let found = find_by_user_and_challenge(&index, "u1", "c1").await.unwrap();
        assert_eq!(found.unwrap().0, "i1");
        let missing = find_by_user_and_challenge(&index, "u1", "c2").await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn rejects_past_expiry() {
        let index = MemoryIndex::new();
        let result = index
            .store_instance("i1", record("u1", "c1", chrono::Utc::now().timestamp() - 1))
            .await;
        assert!(matches!(result, Err(IndexError::ExpiryInPast)));
        assert!(index.get_instance("i1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_clears_all_views() {
        let index = MemoryIndex::new();
        index.store_instance("i1", record("u1", "c1", soon())).await.unwrap();
        index.delete_instance("i1", "u1").await.unwrap();

        assert!(index.get_instance("i1").await.unwrap().is_none());
        assert!(index.user_instances("u1").await.unwrap().is_empty());
        assert!(index.expired_before(i64::MAX).await.unwrap().is_empty());

        // Idempotent: a second delete is a no-op.
        index.delete_instance("i1", "u1").await.unwrap();
    }

    #[tokio::test]
    async fn expiry_scan_returns_only_due_ids() {
        let index = MemoryIndex::new();
        let now = chrono::Utc::now().timestamp();
        index.store_instance("due", record("u1", "c1", now + 5)).await.unwrap();
        index.store_instance("later", record("u1", "c2", now + 9000)).await.unwrap();

        assert!(index.expired_before(now).await.unwrap().is_empty());
        assert_eq!(index.expired_before(now + 5).await.unwrap(), vec!["due"]);

        index.remove_from_expiry("due").await.unwrap();
        assert!(index.expired_before(now + 5).await.unwrap().is_empty());
        // The hash survives an expiry-only removal.
        assert!(index.get_instance("due").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn multiple_challenges_per_user() {
        let index = MemoryIndex::new();
        index.store_instance("i1", record("u1", "c1", soon())).await.unwrap();
        index.store_instance("i2", record("u1", "c2", soon())).await.unwrap();

        let mut ids = index.user_instances("u1").await.unwrap();
        ids.sort();
        assert_eq!(ids, vec!["i1", "i2"]);

        index.delete_instance("i1", "u1").await.unwrap();
        assert_eq!(index.user_instances("u1").await.unwrap(), vec!["i2"]);
    }
}
