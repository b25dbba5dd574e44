use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{NaiveTime, Timelike};
use reqwest::{Client, Url};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config;

/// Feed key listing every item the feed knows about, with `seen` unset for
/// items that are no longer offered.
pub const LAST_SEEN_KEY: &str = "lastSeen";

/// Quantities per item name, summed across all configured categories, plus
/// the feed's presence list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StockSnapshot {
    quantities: BTreeMap<String, i64>,
    last_seen: BTreeMap<String, bool>,
}

#[derive(Debug, Deserialize)]
struct LastSeenEntry {
    name: Option<String>,
    #[serde(default)]
    seen: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct StockEntry {
    name: Option<String>,
    #[serde(default)]
    value: Option<i64>,
}

impl StockSnapshot {
    /// Build a snapshot from the feed's JSON body. Unknown categories and
    /// malformed entries are ignored.
    pub fn from_json(body: &Value, categories: &[String]) -> Self {
        let mut quantities = BTreeMap::new();
        for category in categories {
            let Some(entries) = body.get(category).and_then(Value::as_array) else {
                debug!(%category, "category missing from stock feed");
                continue;
            };
            for raw in entries {
                match StockEntry::deserialize(raw) {
                    Ok(StockEntry {
                        name: Some(name),
                        value,
                    }) => {
                        *quantities.entry(name).or_insert(0) += value.unwrap_or(0);
                    }
                    Ok(_) => {}
                    Err(err) => warn!(?err, %category, "skipping malformed stock entry"),
                }
            }
        }

        let mut last_seen = BTreeMap::new();
        for raw in body
            .get(LAST_SEEN_KEY)
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
        {
            match LastSeenEntry::deserialize(raw) {
                Ok(LastSeenEntry {
                    name: Some(name),
                    seen,
                }) => {
                    let present = last_seen.entry(name).or_insert(false);
                    *present |= seen.is_some();
                }
                Ok(_) => {}
                Err(err) => warn!(?err, "skipping malformed lastSeen entry"),
            }
        }
        Self {
            quantities,
            last_seen,
        }
    }

    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, i64)>,
        S: Into<String>,
    {
        let mut quantities = BTreeMap::new();
        for (name, qty) in pairs {
            *quantities.entry(name.into()).or_insert(0) += qty;
        }
        Self {
            quantities,
            last_seen: BTreeMap::new(),
        }
    }

    /// Replace the presence list; `true` marks an item the feed still offers.
    pub fn with_last_seen<I, S>(mut self, entries: I) -> Self
    where
        I: IntoIterator<Item = (S, bool)>,
        S: Into<String>,
    {
        self.last_seen = entries
            .into_iter()
            .map(|(name, seen)| (name.into(), seen))
            .collect();
        self
    }

    /// Names the feed reports as present and as gone, in name order.
    pub fn catalog_changes(&self) -> (Vec<String>, Vec<String>) {
        let mut present = Vec::new();
        let mut absent = Vec::new();
        for (name, seen) in &self.last_seen {
            if *seen {
                present.push(name.clone());
            } else {
                absent.push(name.clone());
            }
        }
        (present, absent)
    }

    /// Quantity on hand, `None` when the item is absent or sold out.
    pub fn in_stock(&self, name: &str) -> Option<i64> {
        self.quantities.get(name).copied().filter(|q| *q > 0)
    }

    pub fn is_empty(&self) -> bool {
        !self.quantities.values().any(|q| *q > 0)
    }
}

#[async_trait]
pub trait StockSource: Send + Sync {
    async fn fetch(&self) -> Result<StockSnapshot>;
}

#[derive(Clone, Debug)]
pub struct HttpStockSource {
    http: Client,
    url: Url,
    categories: Vec<String>,
}

impl HttpStockSource {
    pub fn from_config(cfg: &config::Stock) -> Result<Self> {
        let url = Url::parse(&cfg.url).with_context(|| format!("invalid stock url {}", cfg.url))?;
        let http = Client::builder()
            .user_agent("watchlist-bot/0.1")
            .timeout(Duration::from_secs(10))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            http,
            url,
            categories: cfg.categories.clone(),
        })
    }
}

#[async_trait]
impl StockSource for HttpStockSource {
    async fn fetch(&self) -> Result<StockSnapshot> {
        let body: Value = self
            .http
            .get(self.url.clone())
            .send()
            .await
            .context("stock feed request failed")?
            .error_for_status()?
            .json()
            .await
            .context("stock feed returned invalid JSON")?;
        Ok(StockSnapshot::from_json(&body, &self.categories))
    }
}

/// Time until the next wall-clock slot. Slots start at midnight plus
/// `offset_seconds` and repeat every `interval_minutes`; with the defaults
/// that is every five minutes at one minute past (00:01, 00:06, ...).
pub fn next_check_delay(now: NaiveTime, interval_minutes: u32, offset_seconds: u32) -> Duration {
    let period = u64::from(interval_minutes.max(1)) * 60;
    let offset = u64::from(offset_seconds) % period;
    let secs = u64::from(now.num_seconds_from_midnight());
    let phase = (secs + period - offset) % period;
    let wait = Duration::from_secs(period - phase);
    wait.saturating_sub(Duration::from_nanos(u64::from(now.nanosecond() % 1_000_000_000)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn categories() -> Vec<String> {
        vec!["gearStock".into(), "seedsStock".into()]
    }

    #[test]
    fn snapshot_sums_across_categories() {
        let body = json!({
            "gearStock": [
                {"name": "Trowel", "value": 2},
                {"name": "Trowel", "value": 1},
                {"name": "Sprinkler", "value": 0}
            ],
            "seedsStock": [
                {"name": "Carrot", "value": 5},
                {"value": 9},
                "garbage"
            ],
            "eggStock": [{"name": "Bug Egg", "value": 1}]
        });
        let snap = StockSnapshot::from_json(&body, &categories());
        assert_eq!(snap.in_stock("Trowel"), Some(3));
        assert_eq!(snap.in_stock("Carrot"), Some(5));
        assert_eq!(snap.in_stock("Sprinkler"), None);
        // eggStock is not a configured category
        assert_eq!(snap.in_stock("Bug Egg"), None);
        assert!(!snap.is_empty());
    }

    #[test]
    fn last_seen_splits_present_and_gone() {
        let body = json!({
            "lastSeen": [
                {"name": "Carrot", "seen": "2025-06-01T10:00:00Z"},
                {"name": "Old Hoe", "seen": null},
                {"name": "Trowel", "seen": 1717236000},
                {"name": "Ghost"},
                {"seen": "2025-06-01T10:00:00Z"}
            ]
        });
        let snap = StockSnapshot::from_json(&body, &categories());
        let (present, absent) = snap.catalog_changes();
        assert_eq!(present, vec!["Carrot", "Trowel"]);
        assert_eq!(absent, vec!["Ghost", "Old Hoe"]);
        // Presence alone is not stock.
        assert!(snap.is_empty());
    }

    #[test]
    fn empty_feed() {
        let snap = StockSnapshot::from_json(&json!({"lastSeen": []}), &categories());
        assert!(snap.is_empty());
        assert!(StockSnapshot::from_pairs([("Sprinkler", 0)]).is_empty());
    }

    #[test]
    fn delay_aligns_to_offset_slots() {
        let t = |h, m, s| NaiveTime::from_hms_opt(h, m, s).unwrap();
        assert_eq!(next_check_delay(t(10, 0, 0), 5, 60), Duration::from_secs(60));
        assert_eq!(next_check_delay(t(10, 1, 0), 5, 60), Duration::from_secs(300));
        assert_eq!(next_check_delay(t(10, 3, 30), 5, 60), Duration::from_secs(150));
        assert_eq!(next_check_delay(t(23, 59, 0), 5, 60), Duration::from_secs(120));
        assert_eq!(next_check_delay(t(10, 2, 15), 5, 0), Duration::from_secs(165));
    }

    #[test]
    fn delay_subtracts_subsecond_part() {
        let now = NaiveTime::from_hms_milli_opt(10, 0, 59, 250).unwrap();
        assert_eq!(next_check_delay(now, 5, 60), Duration::from_millis(750));
    }
}
