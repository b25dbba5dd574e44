use crate::callback::MAX_ITEM_NAME_LEN;
use crate::db;
use crate::stock::{StockSnapshot, StockSource};
use anyhow::Result;
use async_trait::async_trait;
use sqlx::SqlitePool;
use std::fmt::Write as _;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub chat_id: String,
    pub text: String,
}

/// Where alerts go. The bot implements this over `send_message`.
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn deliver(&self, alert: &Alert) -> Result<()>;
}

/// One alert per notified user whose watchlist has at least one item in
/// stock. Items are listed once, in the order they were watched.
#[instrument(skip_all)]
pub async fn compose_alerts(
    pool: &SqlitePool,
    snapshot: &StockSnapshot,
    checked_at: &str,
) -> Result<Vec<Alert>> {
    let mut alerts = Vec::new();
    if snapshot.is_empty() {
        return Ok(alerts);
    }
    for user_id in db::notified_user_ids(pool).await? {
        let mut watched = db::watchlist(pool, &user_id).await?;
        let mut seen = std::collections::HashSet::new();
        watched.retain(|name| seen.insert(name.clone()));

        let mut text = format!("Stock check at {checked_at}:\n");
        let mut any = false;
        for name in &watched {
            if let Some(qty) = snapshot.in_stock(name) {
                let _ = writeln!(text, "{name}: {qty}");
                any = true;
            }
        }
        if any {
            alerts.push(Alert {
                chat_id: user_id,
                text: text.trim_end().to_string(),
            });
        }
    }
    Ok(alerts)
}

/// Mirror the feed's presence list into the item catalog. Names too long
/// for a button are not added.
#[instrument(skip_all)]
pub async fn sync_catalog(pool: &SqlitePool, snapshot: &StockSnapshot) -> Result<(u64, u64)> {
    let (mut present, absent) = snapshot.catalog_changes();
    present.retain(|name| {
        let fits = name.len() <= MAX_ITEM_NAME_LEN;
        if !fits {
            debug!(name, "feed item name too long for the catalog");
        }
        fits
    });
    let (inserted, deleted) = db::sync_items(pool, &present, &absent).await?;
    info!(inserted, deleted, "catalog synced from stock feed");
    Ok((inserted, deleted))
}

/// Fetch the feed once, optionally sync the catalog, and deliver alerts. A
/// failed catalog sync or delivery is logged and does not stop the rest.
/// Returns how many alerts went out.
#[instrument(skip_all)]
pub async fn run_stock_check(
    pool: &SqlitePool,
    source: &dyn StockSource,
    sink: &dyn AlertSink,
    checked_at: &str,
    sync: bool,
) -> Result<usize> {
    let snapshot = source.fetch().await?;
    if sync {
        if let Err(err) = sync_catalog(pool, &snapshot).await {
            warn!(?err, "failed to sync catalog from stock feed");
        }
    }
    let alerts = compose_alerts(pool, &snapshot, checked_at).await?;
    let mut delivered = 0;
    for alert in &alerts {
        match sink.deliver(alert).await {
            Ok(()) => delivered += 1,
            Err(err) => warn!(?err, chat_id = %alert.chat_id, "failed to deliver stock alert"),
        }
    }
    info!(delivered, total = alerts.len(), checked_at, "stock check finished");
    Ok(delivered)
}

/// Tell the configured error chat that the feed could not be read.
pub async fn report_failure(sink: &dyn AlertSink, error_chat_id: Option<i64>, err: &anyhow::Error) {
    let Some(chat) = error_chat_id else {
        return;
    };
    let alert = Alert {
        chat_id: chat.to_string(),
        text: format!("Error fetching stock data: {err}"),
    };
    if let Err(send_err) = sink.deliver(&alert).await {
        warn!(?send_err, "failed to report stock feed error");
    }
}
