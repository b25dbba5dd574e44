//! Transport-independent routing. Each entry point takes the caller and the
//! input, talks to the database and returns the reply together with the
//! conversation state that should be stored for the next message.

use crate::callback::{Callback, MAX_ITEM_NAME_LEN};
use crate::db;
use crate::menu::{self, Menu};
use crate::model::ConversationState;
use sqlx::SqlitePool;
use std::fmt::Write as _;
use tracing::{info, instrument, warn};

/// The Telegram user behind an update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub id: i64,
    pub username: Option<String>,
    pub first_name: String,
}

impl Caller {
    /// Key used for the `users.id` and `watchlist.user_id` columns.
    pub fn key(&self) -> String {
        self.id.to_string()
    }

    fn display_name(&self) -> &str {
        self.username.as_deref().unwrap_or(&self.first_name)
    }
}

impl From<&teloxide::types::User> for Caller {
    fn from(user: &teloxide::types::User) -> Self {
        Self {
            id: user.id.0 as i64,
            username: user.username.clone(),
            first_name: user.first_name.clone(),
        }
    }
}

/// Shared state handed to every handler.
#[derive(Debug, Clone)]
pub struct AppContext {
    pub pool: SqlitePool,
    pub admin_id: i64,
}

impl AppContext {
    pub fn new(pool: SqlitePool, admin_id: i64) -> Self {
        Self { pool, admin_id }
    }

    pub fn is_admin(&self, caller: &Caller) -> bool {
        caller.id == self.admin_id
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub menu: Option<Menu>,
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            menu: None,
        }
    }

    pub fn with_menu(text: impl Into<String>, menu: Menu) -> Self {
        Self {
            text: text.into(),
            menu: Some(menu),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub reply: Reply,
    pub next: ConversationState,
}

impl Outcome {
    fn idle(reply: Reply) -> Self {
        Self {
            reply,
            next: ConversationState::Idle,
        }
    }

    fn awaiting(next: ConversationState, prompt: impl Into<String>) -> Self {
        Self {
            reply: Reply::with_menu(prompt, menu::cancel_only()),
            next,
        }
    }
}

/// Main menu for the caller, reflecting the stored notification flag. A user
/// without a row gets the column default. `None` when the lookup fails.
async fn main_menu_for(ctx: &AppContext, caller: &Caller) -> Option<Menu> {
    match db::find_user(&ctx.pool, &caller.key()).await {
        Ok(user) => {
            let is_notified = user.map_or(true, |u| u.is_notified);
            Some(menu::main_menu(ctx.is_admin(caller), is_notified))
        }
        Err(err) => {
            warn!(?err, user = caller.id, "failed to load notification flag for menu");
            None
        }
    }
}

/// Reply that returns the user to the main menu.
async fn back_to_menu(ctx: &AppContext, caller: &Caller, text: impl Into<String>) -> Outcome {
    Outcome::idle(Reply {
        text: text.into(),
        menu: main_menu_for(ctx, caller).await,
    })
}

/// `/start`: register the caller and show the main menu.
#[instrument(skip_all, fields(user = caller.id))]
pub async fn start(ctx: &AppContext, caller: &Caller) -> Outcome {
    let key = caller.key();
    if let Err(err) = db::register_user(&ctx.pool, &key, caller.username.as_deref()).await {
        warn!(?err, "failed to register user");
        return Outcome::idle(Reply::text("Failed to register user."));
    }

    let is_notified = match db::find_user(&ctx.pool, &key).await {
        Ok(Some(user)) => user.is_notified,
        Ok(None) => {
            warn!("user row missing right after registration");
            return Outcome::idle(Reply::text("Failed to retrieve user notification settings."));
        }
        Err(err) => {
            warn!(?err, "failed to read notification flag");
            return Outcome::idle(Reply::text("Failed to retrieve user notification settings."));
        }
    };

    Outcome::idle(Reply::with_menu(
        format!("Hello @{}, you can now use the bot!", caller.display_name()),
        menu::main_menu(ctx.is_admin(caller), is_notified),
    ))
}

/// Route an inline-button press by its callback data.
#[instrument(skip_all, fields(user = caller.id, data = %data))]
pub async fn handle_callback(ctx: &AppContext, caller: &Caller, data: &str) -> Outcome {
    let Some(action) = Callback::parse(data) else {
        return back_to_menu(ctx, caller, "Unknown action.").await;
    };

    let outcome = match action {
        Callback::OpenWatchlistSearch => Outcome::awaiting(
            ConversationState::AwaitingWatchlistSearchText,
            "Please send the item name to search the item:",
        ),
        Callback::OpenWatchlistRemoval => open_watchlist_removal(ctx, caller).await,
        Callback::ViewWatchlist => view_watchlist(ctx, caller).await,
        Callback::EnableNotifications => set_notifications(ctx, caller, true).await,
        Callback::DisableNotifications => set_notifications(ctx, caller, false).await,
        Callback::Cancel => back_to_menu(ctx, caller, "Cancelled.").await,
        Callback::OpenAddItem | Callback::OpenRemoveItem if !ctx.is_admin(caller) => {
            warn!("non-admin tried to manage items");
            back_to_menu(ctx, caller, "Only the admin can manage items.").await
        }
        Callback::OpenAddItem => Outcome::awaiting(
            ConversationState::AwaitingAddItemName,
            "Please send the item name to add it to the catalog:",
        ),
        Callback::OpenRemoveItem => open_item_removal(ctx).await,
        Callback::AddToWatchlist(item) => add_to_watchlist(ctx, caller, &item).await,
        Callback::RemoveFromWatchlist(item) => remove_from_watchlist(ctx, caller, &item).await,
    };
    info!(next = outcome.next.as_str(), "callback handled");
    outcome
}

/// Route a free-text message according to the pending conversation state.
#[instrument(skip_all, fields(user = caller.id, state = state.as_str()))]
pub async fn handle_text(
    ctx: &AppContext,
    caller: &Caller,
    state: ConversationState,
    text: &str,
) -> Outcome {
    let text = text.trim();
    match state {
        ConversationState::Idle => {
            back_to_menu(ctx, caller, "Please use the buttons to interact with the bot.").await
        }
        ConversationState::AwaitingAddItemName | ConversationState::AwaitingRemoveItemName
            if !ctx.is_admin(caller) =>
        {
            warn!("non-admin sent an item name");
            back_to_menu(ctx, caller, "Only the admin can manage items.").await
        }
        _ if text.is_empty() => Outcome::awaiting(state, "Please send a non-empty item name."),
        // Commands are never taken as item names.
        _ if text.starts_with('/') => Outcome::awaiting(state, "Unknown command."),
        ConversationState::AwaitingAddItemName => add_item(ctx, caller, text).await,
        ConversationState::AwaitingRemoveItemName => remove_item(ctx, caller, text).await,
        ConversationState::AwaitingWatchlistSearchText => search_items(ctx, caller, text).await,
    }
}

async fn add_item(ctx: &AppContext, caller: &Caller, name: &str) -> Outcome {
    if name.len() > MAX_ITEM_NAME_LEN {
        return back_to_menu(
            ctx,
            caller,
            format!("Item names are limited to {MAX_ITEM_NAME_LEN} bytes."),
        )
        .await;
    }
    match db::insert_item(&ctx.pool, name).await {
        Ok(id) => {
            info!(id, name, "item added");
            back_to_menu(ctx, caller, "Item added successfully.").await
        }
        Err(err) => {
            warn!(?err, name, "failed to add item");
            back_to_menu(ctx, caller, "Failed to add item.").await
        }
    }
}

async fn remove_item(ctx: &AppContext, caller: &Caller, name: &str) -> Outcome {
    match db::delete_item(&ctx.pool, name).await {
        Ok(removed) => {
            info!(removed, name, "item removal processed");
            back_to_menu(ctx, caller, "Item removed successfully.").await
        }
        Err(err) => {
            warn!(?err, name, "failed to remove item");
            back_to_menu(ctx, caller, "Failed to remove item.").await
        }
    }
}

async fn search_items(ctx: &AppContext, caller: &Caller, query: &str) -> Outcome {
    let items = match db::search_items(&ctx.pool, query).await {
        Ok(items) => items,
        Err(err) => {
            warn!(?err, query, "item search failed");
            return back_to_menu(ctx, caller, "Failed to search items.").await;
        }
    };
    let picker = menu::item_picker(items.into_iter().map(|i| i.name), Callback::AddToWatchlist);
    if !picker
        .actions()
        .any(|a| matches!(a, Callback::AddToWatchlist(_)))
    {
        return back_to_menu(ctx, caller, "No matching items found.").await;
    }
    Outcome::idle(Reply::with_menu(
        "Select an item to add to your watchlist:",
        picker,
    ))
}

async fn open_item_removal(ctx: &AppContext) -> Outcome {
    let items = match db::list_items(&ctx.pool).await {
        Ok(items) => items,
        Err(err) => {
            warn!(?err, "failed to list items");
            return Outcome::idle(Reply::text("Failed to retrieve items."));
        }
    };
    let mut prompt = String::from("Please send the item name to remove it from the catalog:\n");
    for (i, item) in items.iter().enumerate() {
        let _ = write!(prompt, "\n{}. {}", i + 1, item.name);
    }
    Outcome::awaiting(ConversationState::AwaitingRemoveItemName, prompt.trim_end())
}

async fn open_watchlist_removal(ctx: &AppContext, caller: &Caller) -> Outcome {
    let names = match db::watchlist(&ctx.pool, &caller.key()).await {
        Ok(names) => names,
        Err(err) => {
            warn!(?err, "failed to load watchlist");
            return Outcome::idle(Reply::text("Failed to retrieve watchlist."));
        }
    };
    if names.is_empty() {
        return back_to_menu(ctx, caller, "Your watchlist is empty.").await;
    }
    Outcome::idle(Reply::with_menu(
        "Please select an item to remove from your watchlist:",
        menu::item_picker(names, Callback::RemoveFromWatchlist),
    ))
}

async fn view_watchlist(ctx: &AppContext, caller: &Caller) -> Outcome {
    let names = match db::watchlist(&ctx.pool, &caller.key()).await {
        Ok(names) => names,
        Err(err) => {
            warn!(?err, "failed to load watchlist");
            return back_to_menu(ctx, caller, "Failed to retrieve watchlist.").await;
        }
    };
    if names.is_empty() {
        return back_to_menu(ctx, caller, "Your watchlist is empty.").await;
    }
    let mut text = String::from("Your watchlist:");
    for (i, name) in names.iter().enumerate() {
        let _ = write!(text, "\n{}. {}", i + 1, name);
    }
    back_to_menu(ctx, caller, text).await
}

async fn set_notifications(ctx: &AppContext, caller: &Caller, enabled: bool) -> Outcome {
    let key = caller.key();
    let updated = match db::register_user(&ctx.pool, &key, caller.username.as_deref()).await {
        Ok(()) => db::set_notified(&ctx.pool, &key, enabled).await,
        Err(err) => Err(err),
    };
    match updated {
        Ok(_) => {
            info!(enabled, "notification flag updated");
            let text = if enabled {
                "Notifications enabled."
            } else {
                "Notifications disabled."
            };
            Outcome::idle(Reply::with_menu(
                text,
                menu::main_menu(ctx.is_admin(caller), enabled),
            ))
        }
        Err(err) => {
            warn!(?err, enabled, "failed to update notification flag");
            back_to_menu(ctx, caller, "Failed to update notification settings.").await
        }
    }
}

async fn add_to_watchlist(ctx: &AppContext, caller: &Caller, item: &str) -> Outcome {
    match db::add_to_watchlist(&ctx.pool, &caller.key(), item).await {
        Ok(()) => {
            info!(item, "watchlist entry added");
            back_to_menu(ctx, caller, "Item added to watchlist.").await
        }
        Err(err) => {
            warn!(?err, item, "failed to add watchlist entry");
            back_to_menu(ctx, caller, "Failed to add item to watchlist.").await
        }
    }
}

async fn remove_from_watchlist(ctx: &AppContext, caller: &Caller, item: &str) -> Outcome {
    match db::remove_from_watchlist(&ctx.pool, &caller.key(), item).await {
        Ok(removed) => {
            info!(item, removed, "watchlist entry removed");
            back_to_menu(ctx, caller, "Item removed from watchlist.").await
        }
        Err(err) => {
            warn!(?err, item, "failed to remove watchlist entry");
            back_to_menu(ctx, caller, "Failed to remove item from watchlist.").await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caller(username: Option<&str>) -> Caller {
        Caller {
            id: 9,
            username: username.map(str::to_string),
            first_name: "Nine".into(),
        }
    }

    #[test]
    fn display_name_prefers_username() {
        assert_eq!(caller(Some("nine")).display_name(), "nine");
        assert_eq!(caller(None).display_name(), "Nine");
        assert_eq!(caller(None).key(), "9");
    }

    #[test]
    fn awaiting_outcome_offers_cancel() {
        let out = Outcome::awaiting(ConversationState::AwaitingAddItemName, "go");
        assert_eq!(out.next, ConversationState::AwaitingAddItemName);
        assert_eq!(out.reply.menu, Some(menu::cancel_only()));
    }
}
