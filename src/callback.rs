//! Inline-button actions and their callback-data encoding.
//!
//! Static actions use fixed identifiers. Watchlist picks carry the item name
//! after a prefix. No static identifier starts with a dynamic prefix, so an
//! item name can never be mistaken for a menu action.

/// Telegram rejects callback data longer than this many bytes.
pub const MAX_CALLBACK_DATA_LEN: usize = 64;

pub const ADD_WATCHLIST_PREFIX: &str = "add_watchlist_";
pub const REMOVE_WATCHLIST_PREFIX: &str = "remove_watchlist_";

/// Longest item name (in bytes) that still fits every dynamic callback.
pub const MAX_ITEM_NAME_LEN: usize = MAX_CALLBACK_DATA_LEN - REMOVE_WATCHLIST_PREFIX.len();

const OPEN_WATCHLIST_SEARCH: &str = "watchlist_search";
const OPEN_WATCHLIST_REMOVAL: &str = "watchlist_remove";
const VIEW_WATCHLIST: &str = "watchlist_view";
const ENABLE_NOTIFICATIONS: &str = "notifications_on";
const DISABLE_NOTIFICATIONS: &str = "notifications_off";
const CANCEL: &str = "cancel";
const OPEN_ADD_ITEM: &str = "item_add";
const OPEN_REMOVE_ITEM: &str = "item_remove";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Callback {
    OpenWatchlistSearch,
    OpenWatchlistRemoval,
    ViewWatchlist,
    EnableNotifications,
    DisableNotifications,
    Cancel,
    OpenAddItem,
    OpenRemoveItem,
    AddToWatchlist(String),
    RemoveFromWatchlist(String),
}

impl Callback {
    pub fn data(&self) -> String {
        match self {
            Callback::OpenWatchlistSearch => OPEN_WATCHLIST_SEARCH.to_string(),
            Callback::OpenWatchlistRemoval => OPEN_WATCHLIST_REMOVAL.to_string(),
            Callback::ViewWatchlist => VIEW_WATCHLIST.to_string(),
            Callback::EnableNotifications => ENABLE_NOTIFICATIONS.to_string(),
            Callback::DisableNotifications => DISABLE_NOTIFICATIONS.to_string(),
            Callback::Cancel => CANCEL.to_string(),
            Callback::OpenAddItem => OPEN_ADD_ITEM.to_string(),
            Callback::OpenRemoveItem => OPEN_REMOVE_ITEM.to_string(),
            Callback::AddToWatchlist(item) => format!("{ADD_WATCHLIST_PREFIX}{item}"),
            Callback::RemoveFromWatchlist(item) => format!("{REMOVE_WATCHLIST_PREFIX}{item}"),
        }
    }

    /// Button text for static actions; item picks are labelled with the item.
    pub fn label(&self) -> &str {
        match self {
            Callback::OpenWatchlistSearch => "Add Item to Watchlist",
            Callback::OpenWatchlistRemoval => "Remove Item from Watchlist",
            Callback::ViewWatchlist => "View Watchlist",
            Callback::EnableNotifications => "Enable Notifications",
            Callback::DisableNotifications => "Disable Notifications",
            Callback::Cancel => "Cancel",
            Callback::OpenAddItem => "Add an Item",
            Callback::OpenRemoveItem => "Remove an Item",
            Callback::AddToWatchlist(item) | Callback::RemoveFromWatchlist(item) => item.as_str(),
        }
    }

    /// Whether the encoded data fits Telegram's callback payload limit.
    pub fn fits(&self) -> bool {
        self.data().len() <= MAX_CALLBACK_DATA_LEN
    }

    pub fn parse(data: &str) -> Option<Self> {
        let parsed = match data {
            OPEN_WATCHLIST_SEARCH => Callback::OpenWatchlistSearch,
            OPEN_WATCHLIST_REMOVAL => Callback::OpenWatchlistRemoval,
            VIEW_WATCHLIST => Callback::ViewWatchlist,
            ENABLE_NOTIFICATIONS => Callback::EnableNotifications,
            DISABLE_NOTIFICATIONS => Callback::DisableNotifications,
            CANCEL => Callback::Cancel,
            OPEN_ADD_ITEM => Callback::OpenAddItem,
            OPEN_REMOVE_ITEM => Callback::OpenRemoveItem,
            other => {
                if let Some(item) = other.strip_prefix(ADD_WATCHLIST_PREFIX) {
                    Callback::AddToWatchlist(non_empty(item)?)
                } else if let Some(item) = other.strip_prefix(REMOVE_WATCHLIST_PREFIX) {
                    Callback::RemoveFromWatchlist(non_empty(item)?)
                } else {
                    return None;
                }
            }
        };
        Some(parsed)
    }
}

fn non_empty(item: &str) -> Option<String> {
    (!item.is_empty()).then(|| item.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_actions_parse_back() {
        for cb in [
            Callback::OpenWatchlistSearch,
            Callback::OpenWatchlistRemoval,
            Callback::ViewWatchlist,
            Callback::EnableNotifications,
            Callback::DisableNotifications,
            Callback::Cancel,
            Callback::OpenAddItem,
            Callback::OpenRemoveItem,
        ] {
            assert!(!cb.data().starts_with(ADD_WATCHLIST_PREFIX));
            assert!(!cb.data().starts_with(REMOVE_WATCHLIST_PREFIX));
            assert_eq!(Callback::parse(&cb.data()), Some(cb));
        }
    }

    #[test]
    fn dynamic_prefixes() {
        assert_eq!(
            Callback::parse("add_watchlist_Magic Wand"),
            Some(Callback::AddToWatchlist("Magic Wand".into()))
        );
        assert_eq!(
            Callback::parse("remove_watchlist_btn"),
            Some(Callback::RemoveFromWatchlist("btn".into()))
        );
        assert_eq!(Callback::parse("add_watchlist_"), None);
        assert_eq!(Callback::parse("something_else"), None);
        assert_eq!(Callback::parse(""), None);
    }

    #[test]
    fn item_name_limit_fits_both_prefixes() {
        let name = "x".repeat(MAX_ITEM_NAME_LEN);
        assert!(Callback::AddToWatchlist(name.clone()).fits());
        assert!(Callback::RemoveFromWatchlist(name.clone()).fits());
        assert!(!Callback::RemoveFromWatchlist(format!("{name}x")).fits());
    }
}
