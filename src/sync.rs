//! Sync orchestration: drives paginated retrieval from the external feed,
//! filters/dedups/classifies transactions, aggregates them into daily
//! category sums, and merges those into the weekly and monthly rollups.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;

use anyhow::Result;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::categorize::{classify, classify_detailed, OverrideTable};
use crate::costs::{CostsAggregator, DayCosts, PeriodType};
use crate::feed::TransactionFeed;
use crate::models::{CategoryBucket, FeedTransaction};
use crate::storage::stores::{LinkStore, OverrideStore, SyncStateStore};

/// Guard against a runaway feed that never reports `has_more = false`.
const MAX_SYNC_PAGES: usize = 200;

/// A transaction the rule engine could not place, returned to the client
/// so the user can categorize it manually via the assignment endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UncategorizedTransaction {
    pub txn_id: String,
    pub date: NaiveDate,
    pub name: String,
    pub amount: Decimal,
    pub account_id: String,
}

/// Outcome of one sync call across all of a user's linked items.
///
/// `added`/`modified` count transactions folded into aggregates on the
/// respective path; transactions needing review are in `uncategorized`
/// instead.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncReport {
    pub added: usize,
    pub modified: usize,
    pub removed: usize,
    pub days_updated: usize,
    pub uncategorized: Vec<UncategorizedTransaction>,
}

/// A client-chosen categorization for a transaction the automatic rules
/// left uncategorized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assignment {
    pub txn_id: String,
    pub date: NaiveDate,
    pub category: CategoryBucket,
    pub amount: Decimal,
    /// When present, the transaction is marked seen for this item so a
    /// later automatic sync does not count it again.
    #[serde(default)]
    pub item_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssignReport {
    pub days_updated: usize,
}

/// Drives the sync pipeline. One instance per process; safe to share.
#[derive(Clone)]
pub struct SyncService {
    feed: Arc<dyn TransactionFeed>,
    links: LinkStore,
    sync_state: SyncStateStore,
    overrides: OverrideStore,
    costs: CostsAggregator,
}

fn accumulate(
    day_totals: &mut BTreeMap<NaiveDate, DayCosts>,
    date: NaiveDate,
    bucket: CategoryBucket,
    amount: Decimal,
) {
    let cell = day_totals
        .entry(date)
        .or_default()
        .entry(bucket)
        .or_insert(Decimal::ZERO);
    *cell = (*cell + amount).round_dp(2);
}

fn skip_for_aggregation(txn: &FeedTransaction) -> bool {
    // Pending charges can still change or disappear; zero amounts carry
    // no spend signal.
    txn.pending || txn.amount.is_zero()
}

fn uncategorized_entry(txn: &FeedTransaction) -> UncategorizedTransaction {
    UncategorizedTransaction {
        txn_id: txn.transaction_id.clone(),
        date: txn.date,
        name: txn.name.clone(),
        amount: txn.amount,
        account_id: txn.account_id.clone(),
    }
}

impl SyncService {
    pub fn new(
        feed: Arc<dyn TransactionFeed>,
        links: LinkStore,
        sync_state: SyncStateStore,
        overrides: OverrideStore,
        costs: CostsAggregator,
    ) -> Self {
        Self {
            feed,
            links,
            sync_state,
            overrides,
            costs,
        }
    }

    /// Sync every linked item for `username`.
    ///
    /// Any failure aborts the whole multi-item sync; cursors and seen-sets
    /// already committed for earlier items in the same call stay persisted.
    pub async fn sync(
        &self,
        username: &str,
        account_filter: Option<&[String]>,
    ) -> Result<SyncReport> {
        let tokens = self.links.list_access_tokens(username).await?;
        let overrides = self.overrides.get_overrides(username).await?;
        let mut report = SyncReport::default();
        let mut touched_days = BTreeSet::new();

        for (item_id, access_token) in &tokens {
            self.sync_item(
                username,
                item_id,
                access_token,
                account_filter,
                &overrides,
                &mut report,
                &mut touched_days,
            )
            .await?;
        }
        report.days_updated = touched_days.len();

        tracing::info!(
            username,
            added = report.added,
            modified = report.modified,
            removed = report.removed,
            days_updated = report.days_updated,
            uncategorized = report.uncategorized.len(),
            "Sync complete",
        );

        Ok(report)
    }

    async fn sync_item(
        &self,
        username: &str,
        item_id: &str,
        access_token: &str,
        account_filter: Option<&[String]>,
        overrides: &OverrideTable,
        report: &mut SyncReport,
        touched_days: &mut BTreeSet<NaiveDate>,
    ) -> Result<()> {
        let targets = self
            .resolve_target_accounts(username, item_id, account_filter)
            .await?;

        // Accumulate the full sweep before touching any persisted state.
        // A failed page fetch aborts here and leaves the stored cursor
        // where it was, so the next sync retries the same pages.
        let mut cursor = self.sync_state.get_cursor(username, item_id).await?;
        let mut added = Vec::new();
        let mut modified = Vec::new();
        let mut removed = Vec::new();

        for page_count in 0.. {
            if page_count >= MAX_SYNC_PAGES {
                anyhow::bail!(
                    "Feed returned too many pages (>{MAX_SYNC_PAGES}) for item {item_id}; aborting."
                );
            }

            let page = self.feed.fetch_page(access_token, cursor.as_deref()).await?;
            added.extend(page.added);
            modified.extend(page.modified);
            removed.extend(page.removed);
            cursor = Some(page.next_cursor);

            if !page.has_more {
                break;
            }
        }

        if let Some(targets) = &targets {
            added.retain(|txn| targets.contains(&txn.account_id));
            modified.retain(|txn| targets.contains(&txn.account_id));
            removed.retain(|txn| {
                txn.account_id
                    .as_ref()
                    .map(|id| targets.contains(id))
                    .unwrap_or(true)
            });
        }

        let mut day_totals: BTreeMap<NaiveDate, DayCosts> = BTreeMap::new();
        let mut newly_seen: Vec<(String, NaiveDate)> = Vec::new();
        let mut seen_this_sweep: HashSet<String> = HashSet::new();

        for txn in &added {
            if skip_for_aggregation(txn) {
                continue;
            }
            if seen_this_sweep.contains(&txn.transaction_id)
                || self
                    .sync_state
                    .has_seen_txn(username, item_id, &txn.transaction_id)
                    .await?
            {
                continue;
            }

            let bucket = classify(overrides, txn);
            if bucket.is_uncategorized() {
                report.uncategorized.push(uncategorized_entry(txn));
                continue;
            }

            accumulate(&mut day_totals, txn.date, bucket, txn.amount);
            seen_this_sweep.insert(txn.transaction_id.clone());
            newly_seen.push((txn.transaction_id.clone(), txn.date));
            report.added += 1;
        }

        // Seen is committed once categorization succeeds, before any rollup
        // write. A merge that fails partway loses the unmerged remainder;
        // the retry must not fold these amounts in a second time.
        self.sync_state
            .mark_seen_txns(username, item_id, &newly_seen)
            .await?;

        // Modifications legitimately revise already-seen transactions, so
        // this path does not consult the seen set. Repeated syncs can
        // therefore double-count revised amounts.
        for txn in &modified {
            if skip_for_aggregation(txn) {
                continue;
            }

            let bucket = classify_detailed(overrides, txn);
            if bucket.is_uncategorized() {
                report.uncategorized.push(uncategorized_entry(txn));
                continue;
            }

            accumulate(&mut day_totals, txn.date, bucket, txn.amount);
            report.modified += 1;
        }

        for (date, sums) in &day_totals {
            for period in PeriodType::ALL {
                self.costs.merge_dated(username, period, *date, sums).await?;
            }
            touched_days.insert(*date);
        }

        // Removed transactions are counted, never reversed out of prior
        // aggregates.
        report.removed += removed.len();

        if let Some(cursor) = &cursor {
            self.sync_state.save_cursor(username, item_id, cursor).await?;
        }

        tracing::debug!(
            username,
            item_id,
            added = added.len(),
            modified = modified.len(),
            removed = removed.len(),
            "Item sweep processed",
        );

        Ok(())
    }

    async fn resolve_target_accounts(
        &self,
        username: &str,
        item_id: &str,
        account_filter: Option<&[String]>,
    ) -> Result<Option<HashSet<String>>> {
        if let Some(filter) = account_filter {
            if !filter.is_empty() {
                return Ok(Some(filter.iter().cloned().collect()));
            }
        }

        let selected = self.links.get_selected_accounts(username, item_id).await?;
        if selected.is_empty() {
            Ok(None)
        } else {
            Ok(Some(selected.into_iter().collect()))
        }
    }

    /// Fold client-chosen categorizations into the rollups, the same
    /// date-grouped merge the automatic sync performs.
    pub async fn assign(&self, username: &str, assignments: &[Assignment]) -> Result<AssignReport> {
        let mut day_totals: BTreeMap<NaiveDate, DayCosts> = BTreeMap::new();
        let mut seen_by_item: BTreeMap<String, Vec<(String, NaiveDate)>> = BTreeMap::new();

        for assignment in assignments {
            if assignment.amount.is_zero() {
                continue;
            }
            if assignment.category.is_uncategorized() {
                tracing::warn!(
                    username,
                    txn_id = %assignment.txn_id,
                    "Ignoring assignment back to Uncategorized",
                );
                continue;
            }

            accumulate(
                &mut day_totals,
                assignment.date,
                assignment.category,
                assignment.amount,
            );

            if let Some(item_id) = &assignment.item_id {
                seen_by_item
                    .entry(item_id.clone())
                    .or_default()
                    .push((assignment.txn_id.clone(), assignment.date));
            }
        }

        let mut report = AssignReport::default();
        for (date, sums) in &day_totals {
            for period in PeriodType::ALL {
                self.costs.merge_dated(username, period, *date, sums).await?;
            }
            report.days_updated += 1;
        }

        for (item_id, entries) in &seen_by_item {
            self.sync_state
                .mark_seen_txns(username, item_id, entries)
                .await?;
        }

        Ok(report)
    }
}
