use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// The accounts a user opted into tracking for one linked item.
///
/// An empty list means "all accounts under this item".
pub type SelectedAccounts = Vec<String>;

/// Per-user state for linked bank items: access tokens and the account
/// subsets the user wants included in sync.
///
/// Stored as a single JSON blob per user. Token lifetime is until the
/// provider revokes it; nothing here validates freshness.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LinkState {
    /// item id -> access token for the external feed.
    #[serde(default)]
    pub tokens: BTreeMap<String, String>,
    /// item id -> selected account ids (order as chosen by the user).
    #[serde(default)]
    pub selected_accounts: BTreeMap<String, SelectedAccounts>,
}

impl LinkState {
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty() && self.selected_accounts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_state_round_trips() {
        let state = LinkState::default();
        assert!(state.is_empty());

        let json = serde_json::to_string(&state).unwrap();
        let back: LinkState = serde_json::from_str(&json).unwrap();
        assert!(back.is_empty());
    }

    #[test]
    fn missing_fields_deserialize_as_empty() {
        let back: LinkState = serde_json::from_str("{}").unwrap();
        assert!(back.is_empty());
    }
}
