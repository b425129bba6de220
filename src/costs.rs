//! Weekly/monthly cost rollups.
//!
//! Rollups live in one blob per (username, period type) mapping
//! date -> bucket -> accumulated amount. The store holds the running merge
//! across all days reported so far; callers re-key or roll over periods.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::Result;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use tokio::sync::Mutex;

use crate::models::CategoryBucket;
use crate::storage::{blob_key, get_json, put_json, BlobStore};

/// Category sums for one day.
pub type DayCosts = BTreeMap<CategoryBucket, Decimal>;

/// The full stored rollup document: date -> bucket -> amount.
pub type CostDocument = BTreeMap<NaiveDate, DayCosts>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PeriodType {
    Weekly,
    Monthly,
}

impl PeriodType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
        }
    }

    pub const ALL: [PeriodType; 2] = [PeriodType::Weekly, PeriodType::Monthly];
}

impl fmt::Display for PeriodType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("Invalid period type: {0:?}. Use: weekly, monthly")]
pub struct ParsePeriodError(String);

impl FromStr for PeriodType {
    type Err = ParsePeriodError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "weekly" => Ok(Self::Weekly),
            "monthly" => Ok(Self::Monthly),
            other => Err(ParsePeriodError(other.to_string())),
        }
    }
}

/// Merges daily category sums into the stored rollups.
///
/// The underlying write is a whole-document read-modify-write, so merges
/// for the same (username, period) are serialized by a per-key mutex.
/// Merging is additive: re-merging the same delta double-counts. The
/// orchestrator's seen-transaction tracking is what prevents that, not
/// this type.
#[derive(Clone)]
pub struct CostsAggregator {
    blobs: Arc<dyn BlobStore>,
    locks: Arc<Mutex<HashMap<(String, PeriodType), Arc<Mutex<()>>>>>,
}

impl CostsAggregator {
    pub fn new(blobs: Arc<dyn BlobStore>) -> Self {
        Self {
            blobs,
            locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn key(username: &str, period: PeriodType) -> Result<String> {
        Ok(blob_key(&["users", username, "costs", period.as_str()])?)
    }

    async fn merge_lock(&self, username: &str, period: PeriodType) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry((username.to_string(), period))
            .or_default()
            .clone()
    }

    /// Add each supplied bucket amount into the stored cell for `date`,
    /// rounding to 2 decimal places after each addition, and write the
    /// merged document back in full.
    pub async fn merge_dated(
        &self,
        username: &str,
        period: PeriodType,
        date: NaiveDate,
        costs: &DayCosts,
    ) -> Result<()> {
        if costs.is_empty() {
            return Ok(());
        }

        let lock = self.merge_lock(username, period).await;
        let _guard = lock.lock().await;

        let key = Self::key(username, period)?;
        let mut document: CostDocument = get_json(self.blobs.as_ref(), &key)
            .await?
            .unwrap_or_default();

        let day = document.entry(date).or_default();
        for (bucket, amount) in costs {
            let cell = day.entry(*bucket).or_insert(Decimal::ZERO);
            *cell = (*cell + amount).round_dp(2);
        }

        put_json(self.blobs.as_ref(), &key, &document).await
    }

    /// Read back the stored rollup; missing blob is an empty document.
    pub async fn get_costs(&self, username: &str, period: PeriodType) -> Result<CostDocument> {
        let key = Self::key(username, period)?;
        Ok(get_json(self.blobs.as_ref(), &key).await?.unwrap_or_default())
    }
}
