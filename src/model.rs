use serde::{Deserialize, Serialize};

/// What the next free-text message from a user means.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum ConversationState {
    #[default]
    Idle,
    AwaitingAddItemName,
    AwaitingRemoveItemName,
    AwaitingWatchlistSearchText,
}

impl ConversationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationState::Idle => "IDLE",
            ConversationState::AwaitingAddItemName => "AWAITING_ADD_ITEM_NAME",
            ConversationState::AwaitingRemoveItemName => "AWAITING_REMOVE_ITEM_NAME",
            ConversationState::AwaitingWatchlistSearchText => "AWAITING_WATCHLIST_SEARCH_TEXT",
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, ConversationState::Idle)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, sqlx::FromRow)]
pub struct Item {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, sqlx::FromRow)]
pub struct User {
    pub id: String,
    pub username: Option<String>,
    pub is_notified: bool,
}
