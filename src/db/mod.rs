//! Database module: pool setup and SQL repositories.
//!
//! `repo` holds SQL-only functions that map rows into the entities declared in
//! `crate::model`. Callers import from `watchlist_bot::db`; the repository API
//! is re-exported here.

pub mod repo;

pub use repo::*;
