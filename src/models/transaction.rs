use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Provider-assigned category enrichment attached to a feed transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedCategory {
    /// Coarse label, e.g. `FOOD_AND_DRINK`.
    #[serde(default)]
    pub primary: Option<String>,
    /// Fine-grained label, e.g. `FOOD_AND_DRINK_COFFEE`.
    #[serde(default)]
    pub detailed: Option<String>,
}

/// A transaction as delivered by the external sync feed.
///
/// Amounts are signed: positive for outflows, negative for credits,
/// matching the feed's convention. The date is day-granularity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedTransaction {
    pub transaction_id: String,
    pub account_id: String,
    pub amount: Decimal,
    pub date: NaiveDate,
    /// Raw description from the source.
    pub name: String,
    #[serde(default)]
    pub merchant_name: Option<String>,
    #[serde(default)]
    pub pending: bool,
    #[serde(default)]
    pub personal_finance_category: Option<FeedCategory>,
}

impl FeedTransaction {
    /// The string categorization rules match against: the merchant name
    /// when present and non-blank, otherwise the raw description.
    pub fn merchant_or_name(&self) -> &str {
        match &self.merchant_name {
            Some(merchant) if !merchant.trim().is_empty() => merchant,
            _ => &self.name,
        }
    }
}

/// A transaction the feed reports as removed (e.g. a reversed pending charge).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemovedFeedTransaction {
    pub transaction_id: String,
    #[serde(default)]
    pub account_id: Option<String>,
}
