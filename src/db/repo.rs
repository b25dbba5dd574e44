use crate::model::{Item, User};
use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::str::FromStr;
use tracing::instrument;

pub type Pool = SqlitePool;

pub async fn init_pool(database_url: &str) -> Result<Pool> {
    let normalized = prepare_sqlite_url(database_url);
    let options = SqliteConnectOptions::from_str(&normalized)
        .with_context(|| format!("invalid database url {normalized}"))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Full);
    let pool = SqlitePoolOptions::new().connect_with(options).await?;
    Ok(pool)
}

/// Expand a leading `~/` in a file-backed SQLite URL and make sure the parent
/// directory exists. In-memory and non-sqlite URLs pass through untouched.
fn prepare_sqlite_url(url: &str) -> String {
    let Some(rest) = url.strip_prefix("sqlite:") else {
        return url.to_string();
    };
    if rest.starts_with(":memory") {
        return url.to_string();
    }

    let path_with_query = rest.strip_prefix("//").unwrap_or(rest);
    let (path_part, query_part) = match path_with_query.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (path_with_query, None),
    };
    if path_part.is_empty() {
        return url.to_string();
    }

    let expanded_path = match (path_part.strip_prefix("~/"), std::env::var("HOME")) {
        (Some(tail), Ok(home)) => format!("{}/{}", home.trim_end_matches('/'), tail),
        _ => path_part.to_string(),
    };

    if let Some(parent) = std::path::Path::new(&expanded_path).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    match query_part {
        Some(q) => format!("sqlite://{expanded_path}?{q}"),
        None => format!("sqlite://{expanded_path}"),
    }
}

pub async fn run_migrations(pool: &Pool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Insert the user unless a row with the same id already exists. An existing
/// row keeps its username and notification flag.
#[instrument(skip_all)]
pub async fn register_user(pool: &Pool, user_id: &str, username: Option<&str>) -> Result<()> {
    sqlx::query("INSERT OR IGNORE INTO users (id, username) VALUES (?, ?)")
        .bind(user_id)
        .bind(username)
        .execute(pool)
        .await?;
    Ok(())
}

#[instrument(skip_all)]
pub async fn find_user(pool: &Pool, user_id: &str) -> Result<Option<User>> {
    let user = sqlx::query_as::<_, User>("SELECT id, username, is_notified FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_optional(pool)
        .await?;
    Ok(user)
}

/// Returns `false` when no user row matched.
#[instrument(skip_all)]
pub async fn set_notified(pool: &Pool, user_id: &str, enabled: bool) -> Result<bool> {
    let res = sqlx::query("UPDATE users SET is_notified = ? WHERE id = ?")
        .bind(enabled)
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(res.rows_affected() > 0)
}

#[instrument(skip_all)]
pub async fn notified_user_ids(pool: &Pool) -> Result<Vec<String>> {
    let ids = sqlx::query_scalar("SELECT id FROM users WHERE is_notified = 1 ORDER BY rowid")
        .fetch_all(pool)
        .await?;
    Ok(ids)
}

/// Fails on a duplicate name (UNIQUE constraint).
#[instrument(skip_all)]
pub async fn insert_item(pool: &Pool, name: &str) -> Result<i64> {
    let id = sqlx::query_scalar("INSERT INTO items (name) VALUES (?) RETURNING id")
        .bind(name)
        .fetch_one(pool)
        .await?;
    Ok(id)
}

/// Bring the catalog in line with the feed: insert names reported as present
/// (ignoring ones already known) and delete names reported as absent.
/// Returns `(inserted, deleted)`.
#[instrument(skip_all)]
pub async fn sync_items(pool: &Pool, present: &[String], absent: &[String]) -> Result<(u64, u64)> {
    let mut tx = pool.begin().await?;
    let mut inserted = 0;
    for name in present {
        inserted += sqlx::query("INSERT OR IGNORE INTO items (name) VALUES (?)")
            .bind(name)
            .execute(&mut *tx)
            .await?
            .rows_affected();
    }
    let mut deleted = 0;
    for name in absent {
        deleted += sqlx::query("DELETE FROM items WHERE name = ?")
            .bind(name)
            .execute(&mut *tx)
            .await?
            .rows_affected();
    }
    tx.commit().await?;
    Ok((inserted, deleted))
}

/// Returns the number of rows deleted; deleting an unknown name is not an error.
#[instrument(skip_all)]
pub async fn delete_item(pool: &Pool, name: &str) -> Result<u64> {
    let res = sqlx::query("DELETE FROM items WHERE name = ?")
        .bind(name)
        .execute(pool)
        .await?;
    Ok(res.rows_affected())
}

#[instrument(skip_all)]
pub async fn list_items(pool: &Pool) -> Result<Vec<Item>> {
    let items = sqlx::query_as::<_, Item>("SELECT id, name FROM items ORDER BY id")
        .fetch_all(pool)
        .await?;
    Ok(items)
}

/// Substring search with SQLite's default `LIKE` semantics (ASCII
/// case-insensitive). Wildcards in `query` are not escaped.
#[instrument(skip_all)]
pub async fn search_items(pool: &Pool, query: &str) -> Result<Vec<Item>> {
    let items = sqlx::query_as::<_, Item>(
        "SELECT id, name FROM items WHERE name LIKE '%' || ? || '%' ORDER BY id",
    )
    .bind(query)
    .fetch_all(pool)
    .await?;
    Ok(items)
}

/// Item names on the user's watchlist in the order they were added.
#[instrument(skip_all)]
pub async fn watchlist(pool: &Pool, user_id: &str) -> Result<Vec<String>> {
    let names = sqlx::query_scalar("SELECT item_name FROM watchlist WHERE user_id = ? ORDER BY rowid")
        .bind(user_id)
        .fetch_all(pool)
        .await?;
    Ok(names)
}

#[instrument(skip_all)]
pub async fn add_to_watchlist(pool: &Pool, user_id: &str, item_name: &str) -> Result<()> {
    sqlx::query("INSERT INTO watchlist (user_id, item_name) VALUES (?, ?)")
        .bind(user_id)
        .bind(item_name)
        .execute(pool)
        .await?;
    Ok(())
}

/// Removes every matching entry and returns how many went away.
#[instrument(skip_all)]
pub async fn remove_from_watchlist(pool: &Pool, user_id: &str, item_name: &str) -> Result<u64> {
    let res = sqlx::query("DELETE FROM watchlist WHERE user_id = ? AND item_name = ?")
        .bind(user_id)
        .bind(item_name)
        .execute(pool)
        .await?;
    Ok(res.rows_affected())
}
