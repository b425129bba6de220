use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A spending bucket that classified transactions are assigned to.
///
/// Serialized using the display labels clients see (e.g. "Eating Out"),
/// which also serve as map keys in the stored cost rollups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CategoryBucket {
    Groceries,
    #[serde(rename = "Eating Out")]
    EatingOut,
    Transportation,
    Utilities,
    Subscriptions,
    Entertainment,
    Shopping,
    Travel,
    Health,
    Income,
    Uncategorized,
}

impl CategoryBucket {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Groceries => "Groceries",
            Self::EatingOut => "Eating Out",
            Self::Transportation => "Transportation",
            Self::Utilities => "Utilities",
            Self::Subscriptions => "Subscriptions",
            Self::Entertainment => "Entertainment",
            Self::Shopping => "Shopping",
            Self::Travel => "Travel",
            Self::Health => "Health",
            Self::Income => "Income",
            Self::Uncategorized => "Uncategorized",
        }
    }

    pub fn is_uncategorized(self) -> bool {
        matches!(self, Self::Uncategorized)
    }
}

impl fmt::Display for CategoryBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("Unknown category: {0:?}")]
pub struct ParseCategoryError(String);

impl FromStr for CategoryBucket {
    type Err = ParseCategoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "Groceries" => Ok(Self::Groceries),
            "Eating Out" => Ok(Self::EatingOut),
            "Transportation" => Ok(Self::Transportation),
            "Utilities" => Ok(Self::Utilities),
            "Subscriptions" => Ok(Self::Subscriptions),
            "Entertainment" => Ok(Self::Entertainment),
            "Shopping" => Ok(Self::Shopping),
            "Travel" => Ok(Self::Travel),
            "Health" => Ok(Self::Health),
            "Income" => Ok(Self::Income),
            "Uncategorized" => Ok(Self::Uncategorized),
            other => Err(ParseCategoryError(other.to_string())),
        }
    }
}
