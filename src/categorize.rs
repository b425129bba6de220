//! Deterministic categorization of feed transactions into spending buckets.
//!
//! Precedence, first match wins:
//! 1. per-user merchant override
//! 2. provider-supplied category (the modification variant checks the
//!    detailed label before the primary one)
//! 3. merchant keyword table, in declaration order
//! 4. `Uncategorized`

use std::collections::BTreeMap;

use crate::models::{CategoryBucket, FeedTransaction};

/// Snapshot of a user's merchant overrides, keyed by normalized merchant.
pub type OverrideTable = BTreeMap<String, CategoryBucket>;

/// Uppercase + trim, the canonical form for override keys and keyword
/// matching.
pub fn normalize_merchant(raw: &str) -> String {
    raw.trim().to_uppercase()
}

/// Provider primary category -> bucket.
const PRIMARY_CATEGORY_TABLE: &[(&str, CategoryBucket)] = &[
    ("FOOD_AND_DRINK", CategoryBucket::EatingOut),
    ("GROCERIES", CategoryBucket::Groceries),
    ("TRANSPORTATION", CategoryBucket::Transportation),
    ("RENT_AND_UTILITIES", CategoryBucket::Utilities),
    ("SUBSCRIPTIONS", CategoryBucket::Subscriptions),
    ("ENTERTAINMENT", CategoryBucket::Entertainment),
    ("GENERAL_MERCHANDISE", CategoryBucket::Shopping),
    ("TRAVEL", CategoryBucket::Travel),
    ("MEDICAL", CategoryBucket::Health),
    ("INCOME", CategoryBucket::Income),
];

/// Provider detailed category -> bucket. Consulted only on the
/// modification path, where the feed's fine-grained label is more
/// trustworthy than the coarse one (groceries bought at a restaurant
/// chain, coffee at a grocery store, and so on).
const DETAILED_CATEGORY_TABLE: &[(&str, CategoryBucket)] = &[
    ("FOOD_AND_DRINK_GROCERIES", CategoryBucket::Groceries),
    ("FOOD_AND_DRINK_RESTAURANT", CategoryBucket::EatingOut),
    ("FOOD_AND_DRINK_FAST_FOOD", CategoryBucket::EatingOut),
    ("FOOD_AND_DRINK_COFFEE", CategoryBucket::EatingOut),
    ("TRANSPORTATION_TAXIS_AND_RIDE_SHARES", CategoryBucket::Transportation),
    ("TRANSPORTATION_PUBLIC_TRANSIT", CategoryBucket::Transportation),
    ("TRANSPORTATION_GAS", CategoryBucket::Transportation),
    ("RENT_AND_UTILITIES_RENT", CategoryBucket::Utilities),
    ("RENT_AND_UTILITIES_INTERNET_AND_CABLE", CategoryBucket::Utilities),
    ("ENTERTAINMENT_TV_AND_MOVIES", CategoryBucket::Subscriptions),
    ("ENTERTAINMENT_MUSIC_AND_AUDIO", CategoryBucket::Subscriptions),
    ("GENERAL_MERCHANDISE_ONLINE_MARKETPLACES", CategoryBucket::Shopping),
    ("TRAVEL_FLIGHTS", CategoryBucket::Travel),
    ("TRAVEL_LODGING", CategoryBucket::Travel),
    ("MEDICAL_PHARMACIES_AND_SUPPLEMENTS", CategoryBucket::Health),
    ("INCOME_WAGES", CategoryBucket::Income),
];

/// Merchant keyword -> bucket, matched as a substring of the normalized
/// merchant string. Earlier entries win, so more specific keywords
/// ("UBER EATS", "AMAZON PRIME") must precede their prefixes.
const MERCHANT_KEYWORD_TABLE: &[(&str, CategoryBucket)] = &[
    ("UBER EATS", CategoryBucket::EatingOut),
    ("STARBUCKS", CategoryBucket::EatingOut),
    ("DUNKIN", CategoryBucket::EatingOut),
    ("MCDONALD", CategoryBucket::EatingOut),
    ("CHIPOTLE", CategoryBucket::EatingOut),
    ("DOORDASH", CategoryBucket::EatingOut),
    ("GRUBHUB", CategoryBucket::EatingOut),
    ("WHOLE FOODS", CategoryBucket::Groceries),
    ("TRADER JOE", CategoryBucket::Groceries),
    ("SAFEWAY", CategoryBucket::Groceries),
    ("KROGER", CategoryBucket::Groceries),
    ("ALDI", CategoryBucket::Groceries),
    ("COSTCO", CategoryBucket::Groceries),
    ("UBER", CategoryBucket::Transportation),
    ("LYFT", CategoryBucket::Transportation),
    ("SHELL", CategoryBucket::Transportation),
    ("CHEVRON", CategoryBucket::Transportation),
    ("EXXON", CategoryBucket::Transportation),
    ("COMCAST", CategoryBucket::Utilities),
    ("XFINITY", CategoryBucket::Utilities),
    ("VERIZON", CategoryBucket::Utilities),
    ("PG&E", CategoryBucket::Utilities),
    ("CON EDISON", CategoryBucket::Utilities),
    ("AMAZON PRIME", CategoryBucket::Subscriptions),
    ("NETFLIX", CategoryBucket::Subscriptions),
    ("SPOTIFY", CategoryBucket::Subscriptions),
    ("HULU", CategoryBucket::Subscriptions),
    ("DISNEY PLUS", CategoryBucket::Subscriptions),
    ("APPLE.COM/BILL", CategoryBucket::Subscriptions),
    ("AMC", CategoryBucket::Entertainment),
    ("STEAM", CategoryBucket::Entertainment),
    ("TICKETMASTER", CategoryBucket::Entertainment),
    ("AMAZON", CategoryBucket::Shopping),
    ("TARGET", CategoryBucket::Shopping),
    ("WALMART", CategoryBucket::Shopping),
    ("AIRBNB", CategoryBucket::Travel),
    ("DELTA AIR", CategoryBucket::Travel),
    ("UNITED AIR", CategoryBucket::Travel),
    ("MARRIOTT", CategoryBucket::Travel),
    ("CVS", CategoryBucket::Health),
    ("WALGREENS", CategoryBucket::Health),
    ("RITE AID", CategoryBucket::Health),
    ("PAYROLL", CategoryBucket::Income),
    ("DIRECT DEP", CategoryBucket::Income),
];

fn lookup(table: &[(&str, CategoryBucket)], label: &str) -> Option<CategoryBucket> {
    table
        .iter()
        .find(|(key, _)| *key == label)
        .map(|(_, bucket)| *bucket)
}

fn keyword_match(normalized: &str) -> Option<CategoryBucket> {
    MERCHANT_KEYWORD_TABLE
        .iter()
        .find(|(keyword, _)| normalized.contains(keyword))
        .map(|(_, bucket)| *bucket)
}

fn override_match(overrides: &OverrideTable, normalized: &str) -> Option<CategoryBucket> {
    overrides.get(normalized).copied()
}

fn primary_match(txn: &FeedTransaction) -> Option<CategoryBucket> {
    let primary = txn.personal_finance_category.as_ref()?.primary.as_deref()?;
    lookup(PRIMARY_CATEGORY_TABLE, primary)
}

fn detailed_match(txn: &FeedTransaction) -> Option<CategoryBucket> {
    let detailed = txn.personal_finance_category.as_ref()?.detailed.as_deref()?;
    lookup(DETAILED_CATEGORY_TABLE, detailed)
}

/// Classify an added transaction. Never fails; unmatched transactions are
/// `Uncategorized` and surfaced to the user for manual review.
pub fn classify(overrides: &OverrideTable, txn: &FeedTransaction) -> CategoryBucket {
    let normalized = normalize_merchant(txn.merchant_or_name());

    override_match(overrides, &normalized)
        .or_else(|| primary_match(txn))
        .or_else(|| keyword_match(&normalized))
        .unwrap_or(CategoryBucket::Uncategorized)
}

/// Classify a modified transaction, preferring the provider's detailed
/// category over the primary one.
pub fn classify_detailed(overrides: &OverrideTable, txn: &FeedTransaction) -> CategoryBucket {
    let normalized = normalize_merchant(txn.merchant_or_name());

    override_match(overrides, &normalized)
        .or_else(|| detailed_match(txn))
        .or_else(|| primary_match(txn))
        .or_else(|| keyword_match(&normalized))
        .unwrap_or(CategoryBucket::Uncategorized)
}
