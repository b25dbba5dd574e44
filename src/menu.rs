//! Inline keyboard layouts. Every function here is pure; a fresh `Menu` is
//! built for each reply.

use crate::callback::Callback;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub label: String,
    pub action: Callback,
}

impl Button {
    fn from_action(action: Callback) -> Self {
        Self {
            label: action.label().to_string(),
            action,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Menu {
    rows: Vec<Vec<Button>>,
}

impl Menu {
    fn single_column(actions: impl IntoIterator<Item = Callback>) -> Self {
        Self {
            rows: actions
                .into_iter()
                .map(|a| vec![Button::from_action(a)])
                .collect(),
        }
    }

    pub fn rows(&self) -> &[Vec<Button>] {
        &self.rows
    }

    pub fn actions(&self) -> impl Iterator<Item = &Callback> {
        self.rows.iter().flatten().map(|b| &b.action)
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.rows.iter().flatten().map(|b| b.label.as_str())
    }

    pub fn contains(&self, action: &Callback) -> bool {
        self.actions().any(|a| a == action)
    }
}

impl From<Menu> for InlineKeyboardMarkup {
    fn from(menu: Menu) -> Self {
        InlineKeyboardMarkup::new(menu.rows.into_iter().map(|row| {
            row.into_iter()
                .map(|b| InlineKeyboardButton::callback(b.label, b.action.data()))
                .collect::<Vec<_>>()
        }))
    }
}

/// The main menu: watchlist actions, the notification toggle matching the
/// current flag, then item management for the admin.
pub fn main_menu(is_admin: bool, is_notified: bool) -> Menu {
    let mut actions = vec![
        Callback::OpenWatchlistSearch,
        Callback::OpenWatchlistRemoval,
        Callback::ViewWatchlist,
    ];
    actions.push(if is_notified {
        Callback::DisableNotifications
    } else {
        Callback::EnableNotifications
    });
    if is_admin {
        actions.push(Callback::OpenAddItem);
        actions.push(Callback::OpenRemoveItem);
    }
    Menu::single_column(actions)
}

pub fn cancel_only() -> Menu {
    Menu::single_column([Callback::Cancel])
}

/// One button per item followed by Cancel. Items whose callback data would
/// exceed Telegram's limit are left out.
pub fn item_picker<I, F>(items: I, action: F) -> Menu
where
    I: IntoIterator<Item = String>,
    F: Fn(String) -> Callback,
{
    let picks = items.into_iter().map(action).filter(|cb| {
        let fits = cb.fits();
        if !fits {
            warn!(data = %cb.data(), "item name too long for a button; skipped");
        }
        fits
    });
    Menu::single_column(picks.chain([Callback::Cancel]))
}
