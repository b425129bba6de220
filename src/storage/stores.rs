//! Typed stores layered on [`BlobStore`], one blob per user (or per
//! user-item pair), all keyed under `users/{username}/...`.
//!
//! Read-modify-write sequences within a store are serialized by a coarse
//! per-store lock. Different users syncing concurrently contend only
//! briefly on that lock; same-user concurrent syncs are not expected at
//! meaningful scale.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use chrono::{Months, NaiveDate};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::categorize::{normalize_merchant, OverrideTable};
use crate::clock::{Clock, SystemClock};
use crate::models::{CategoryBucket, LinkState, SelectedAccounts};

use super::{blob_key, get_json, put_json, BlobStore};

/// How long a processed transaction id is remembered for deduplication.
///
/// Thirteen months covers a full year of statement history plus the
/// pagination-retry overlap window the dedup set exists for.
const SEEN_RETENTION_MONTHS: u32 = 13;

/// Per (user, item) sync progress: the feed cursor and the set of
/// transaction ids already folded into aggregates.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct SyncState {
    #[serde(default)]
    cursor: Option<String>,
    /// txn id -> transaction date, kept so stale entries can be pruned.
    #[serde(default)]
    seen: BTreeMap<String, NaiveDate>,
}

fn prune_seen(seen: &mut BTreeMap<String, NaiveDate>, today: NaiveDate) {
    let Some(cutoff) = today.checked_sub_months(Months::new(SEEN_RETENTION_MONTHS)) else {
        return;
    };
    seen.retain(|_, date| *date >= cutoff);
}

/// Pagination cursors and seen-transaction sets, per (username, itemId).
#[derive(Clone)]
pub struct SyncStateStore {
    blobs: Arc<dyn BlobStore>,
    write_lock: Arc<Mutex<()>>,
    clock: Arc<dyn Clock>,
}

impl SyncStateStore {
    pub fn new(blobs: Arc<dyn BlobStore>) -> Self {
        Self::with_clock(blobs, Arc::new(SystemClock))
    }

    pub fn with_clock(blobs: Arc<dyn BlobStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            blobs,
            write_lock: Arc::new(Mutex::new(())),
            clock,
        }
    }

    fn key(username: &str, item_id: &str) -> Result<String> {
        Ok(blob_key(&["users", username, "sync", item_id])?)
    }

    async fn load(&self, username: &str, item_id: &str) -> Result<SyncState> {
        let key = Self::key(username, item_id)?;
        Ok(get_json(self.blobs.as_ref(), &key).await?.unwrap_or_default())
    }

    async fn save(&self, username: &str, item_id: &str, state: &SyncState) -> Result<()> {
        let key = Self::key(username, item_id)?;
        put_json(self.blobs.as_ref(), &key, state).await
    }

    pub async fn get_cursor(&self, username: &str, item_id: &str) -> Result<Option<String>> {
        Ok(self.load(username, item_id).await?.cursor)
    }

    /// Overwrite the stored cursor, last write wins.
    pub async fn save_cursor(&self, username: &str, item_id: &str, cursor: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut state = self.load(username, item_id).await?;
        state.cursor = Some(cursor.to_string());
        self.save(username, item_id, &state).await
    }

    pub async fn has_seen_txn(&self, username: &str, item_id: &str, txn_id: &str) -> Result<bool> {
        Ok(self.load(username, item_id).await?.seen.contains_key(txn_id))
    }

    /// Idempotent add. Entries older than the retention window are pruned
    /// on each write.
    pub async fn mark_seen_txn(
        &self,
        username: &str,
        item_id: &str,
        txn_id: &str,
        date: NaiveDate,
    ) -> Result<()> {
        self.mark_seen_txns(username, item_id, &[(txn_id.to_string(), date)])
            .await
    }

    /// Batch form of [`mark_seen_txn`]: one read-modify-write per sync
    /// sweep instead of one per transaction.
    ///
    /// [`mark_seen_txn`]: Self::mark_seen_txn
    pub async fn mark_seen_txns(
        &self,
        username: &str,
        item_id: &str,
        entries: &[(String, NaiveDate)],
    ) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let _guard = self.write_lock.lock().await;
        let mut state = self.load(username, item_id).await?;
        for (txn_id, date) in entries {
            state.seen.insert(txn_id.clone(), *date);
        }
        prune_seen(&mut state.seen, self.clock.today());
        self.save(username, item_id, &state).await
    }
}

/// Linked-item access tokens and selected-account subsets, per user.
#[derive(Clone)]
pub struct LinkStore {
    blobs: Arc<dyn BlobStore>,
    write_lock: Arc<Mutex<()>>,
}

impl LinkStore {
    pub fn new(blobs: Arc<dyn BlobStore>) -> Self {
        Self {
            blobs,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    fn key(username: &str) -> Result<String> {
        Ok(blob_key(&["users", username, "links"])?)
    }

    async fn load(&self, username: &str) -> Result<LinkState> {
        let key = Self::key(username)?;
        Ok(get_json(self.blobs.as_ref(), &key).await?.unwrap_or_default())
    }

    async fn save(&self, username: &str, state: &LinkState) -> Result<()> {
        let key = Self::key(username)?;
        put_json(self.blobs.as_ref(), &key, state).await
    }

    pub async fn list_access_tokens(&self, username: &str) -> Result<BTreeMap<String, String>> {
        Ok(self.load(username).await?.tokens)
    }

    pub async fn save_access_token(
        &self,
        username: &str,
        item_id: &str,
        access_token: &str,
    ) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut state = self.load(username).await?;
        state
            .tokens
            .insert(item_id.to_string(), access_token.to_string());
        self.save(username, &state).await
    }

    /// Empty result means "all accounts under this item".
    pub async fn get_selected_accounts(
        &self,
        username: &str,
        item_id: &str,
    ) -> Result<SelectedAccounts> {
        Ok(self
            .load(username)
            .await?
            .selected_accounts
            .get(item_id)
            .cloned()
            .unwrap_or_default())
    }

    pub async fn save_selected_accounts(
        &self,
        username: &str,
        item_id: &str,
        account_ids: &[String],
    ) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut state = self.load(username).await?;
        state
            .selected_accounts
            .insert(item_id.to_string(), account_ids.to_vec());
        self.save(username, &state).await
    }
}

/// Per-user merchant overrides consulted first by the rule engine.
#[derive(Clone)]
pub struct OverrideStore {
    blobs: Arc<dyn BlobStore>,
    write_lock: Arc<Mutex<()>>,
}

impl OverrideStore {
    pub fn new(blobs: Arc<dyn BlobStore>) -> Self {
        Self {
            blobs,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    fn key(username: &str) -> Result<String> {
        Ok(blob_key(&["users", username, "category_overrides"])?)
    }

    /// Snapshot of the user's override table, keyed by normalized merchant.
    pub async fn get_overrides(&self, username: &str) -> Result<OverrideTable> {
        let key = Self::key(username)?;
        Ok(get_json(self.blobs.as_ref(), &key).await?.unwrap_or_default())
    }

    pub async fn save_override(
        &self,
        username: &str,
        merchant: &str,
        bucket: CategoryBucket,
    ) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let key = Self::key(username)?;
        let mut overrides: OverrideTable = get_json(self.blobs.as_ref(), &key)
            .await?
            .unwrap_or_default();
        overrides.insert(normalize_merchant(merchant), bucket);
        put_json(self.blobs.as_ref(), &key, &overrides).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryBlobStore;

    fn blobs() -> Arc<dyn BlobStore> {
        Arc::new(MemoryBlobStore::new())
    }

    #[tokio::test]
    async fn cursor_defaults_to_none_and_overwrites() -> Result<()> {
        let store = SyncStateStore::new(blobs());
        assert_eq!(store.get_cursor("alice", "item_1").await?, None);

        store.save_cursor("alice", "item_1", "cursor-1").await?;
        store.save_cursor("alice", "item_1", "cursor-2").await?;
        assert_eq!(
            store.get_cursor("alice", "item_1").await?,
            Some("cursor-2".to_string())
        );

        // Cursor state is scoped per (user, item).
        assert_eq!(store.get_cursor("alice", "item_2").await?, None);
        assert_eq!(store.get_cursor("bob", "item_1").await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn seen_set_is_idempotent() -> Result<()> {
        let date = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let clock = crate::clock::FixedClock::from_date(
            NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
        );
        let store = SyncStateStore::with_clock(blobs(), Arc::new(clock));

        assert!(!store.has_seen_txn("alice", "item_1", "tx_1").await?);
        store.mark_seen_txn("alice", "item_1", "tx_1", date).await?;
        store.mark_seen_txn("alice", "item_1", "tx_1", date).await?;
        assert!(store.has_seen_txn("alice", "item_1", "tx_1").await?);
        assert!(!store.has_seen_txn("alice", "item_2", "tx_1").await?);
        Ok(())
    }

    #[test]
    fn prune_drops_entries_past_retention() {
        let mut seen = BTreeMap::new();
        let today = NaiveDate::from_ymd_opt(2026, 8, 25).unwrap();
        seen.insert(
            "old".to_string(),
            NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
        );
        seen.insert(
            "recent".to_string(),
            NaiveDate::from_ymd_opt(2026, 8, 1).unwrap(),
        );

        prune_seen(&mut seen, today);
        assert!(!seen.contains_key("old"));
        assert!(seen.contains_key("recent"));
    }

    #[tokio::test]
    async fn link_store_round_trips_tokens_and_selection() -> Result<()> {
        let store = LinkStore::new(blobs());

        assert!(store.list_access_tokens("alice").await?.is_empty());
        store
            .save_access_token("alice", "item_1", "access-token-1")
            .await?;
        store
            .save_access_token("alice", "item_2", "access-token-2")
            .await?;

        let tokens = store.list_access_tokens("alice").await?;
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens.get("item_1").map(String::as_str), Some("access-token-1"));

        // Default selection is empty, meaning all accounts.
        assert!(store.get_selected_accounts("alice", "item_1").await?.is_empty());
        store
            .save_selected_accounts("alice", "item_1", &["acc_2".to_string(), "acc_1".to_string()])
            .await?;
        assert_eq!(
            store.get_selected_accounts("alice", "item_1").await?,
            vec!["acc_2".to_string(), "acc_1".to_string()]
        );
        Ok(())
    }

    #[tokio::test]
    async fn override_store_normalizes_merchant_keys() -> Result<()> {
        let store = OverrideStore::new(blobs());

        store
            .save_override("alice", "  Starbucks #1234 ", CategoryBucket::Groceries)
            .await?;
        let overrides = store.get_overrides("alice").await?;
        assert_eq!(
            overrides.get("STARBUCKS #1234"),
            Some(&CategoryBucket::Groceries)
        );
        Ok(())
    }

    #[tokio::test]
    async fn unsafe_username_is_rejected() {
        let store = LinkStore::new(blobs());
        let err = store
            .list_access_tokens("../alice")
            .await
            .expect_err("unsafe username should be rejected");
        assert!(err.to_string().contains("Invalid key segment"));
    }
}
