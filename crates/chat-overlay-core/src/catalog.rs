//! Gift catalog.
//!
//! The catalog is populated out-of-band (an HTTP fetch or a local JSON file)
//! and may still be empty when the first gift message arrives. Lookups never
//! wait for population; a miss simply yields `None`.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::models::Gift;

/// Read-only gift lookup consumed by the normalizer.
pub trait GiftLookup: Send + Sync {
    fn lookup(&self, gift_id: &str) -> Option<Gift>;
}

impl GiftLookup for HashMap<String, Gift> {
    fn lookup(&self, gift_id: &str) -> Option<Gift> {
        self.get(gift_id).cloned()
    }
}

/// Response shape of the gift list endpoint (`{ "gifts": [...] }`).
///
/// Entries without a usable `giftID` are skipped so one bad entry never
/// empties the catalog.
#[derive(Debug, Deserialize)]
pub struct GiftList {
    #[serde(default, deserialize_with = "usable_gifts")]
    pub gifts: Vec<Gift>,
}

fn usable_gifts<'de, D>(deserializer: D) -> Result<Vec<Gift>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Vec<Value>>::deserialize(deserializer)?.unwrap_or_default();
    Ok(raw
        .into_iter()
        .filter_map(|entry| match serde_json::from_value::<Gift>(entry) {
            Ok(gift) => Some(gift),
            Err(e) => {
                tracing::warn!(error = %e, "skipping unusable gift catalog entry");
                None
            }
        })
        .collect())
}

/// Thread-safe gift catalog shared between the loader and the normalizer.
#[derive(Default)]
pub struct GiftCatalog {
    gifts: RwLock<HashMap<String, Gift>>,
}

impl GiftCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge gifts into the catalog, replacing entries with the same `giftID`.
    ///
    /// Returns the catalog size after the merge.
    pub fn load(&self, gifts: impl IntoIterator<Item = Gift>) -> usize {
        let mut map = self.gifts.write().unwrap_or_else(PoisonError::into_inner);
        for gift in gifts {
            map.insert(gift.gift_id.clone(), gift);
        }
        map.len()
    }

    /// Parse a `{ "gifts": [...] }` document and merge it into the catalog.
    pub fn load_from_json(&self, json: &str) -> Result<usize> {
        let list: GiftList =
            serde_json::from_str(json).context("Invalid gift list: expected { \"gifts\": [...] }")?;
        Ok(self.load(list.gifts))
    }

    pub fn len(&self) -> usize {
        self.gifts.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl GiftLookup for GiftCatalog {
    fn lookup(&self, gift_id: &str) -> Option<Gift> {
        self.gifts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(gift_id)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_catalog_misses() {
        let catalog = GiftCatalog::new();
        assert!(catalog.is_empty());
        assert!(catalog.lookup("g1").is_none());
    }

    #[test]
    fn test_load_from_json() {
        let catalog = GiftCatalog::new();
        let n = catalog
            .load_from_json(
                r#"{"gifts":[
                    {"giftID":"g1","name":"Rose","point":10,"icon":"rose.png","regionMode":1},
                    {"giftID":"g2","name":"Bag","point":100}
                ]}"#,
            )
            .unwrap();
        assert_eq!(n, 2);
        let rose = catalog.lookup("g1").unwrap();
        assert_eq!(rose.name.as_deref(), Some("Rose"));
        assert_eq!(rose.point, Some(10));
        assert_eq!(rose.extra.get("regionMode"), Some(&serde_json::json!(1)));
    }

    #[test]
    fn test_reload_replaces_by_id() {
        let catalog = GiftCatalog::new();
        catalog
            .load_from_json(r#"{"gifts":[{"giftID":"g1","point":1}]}"#)
            .unwrap();
        catalog
            .load_from_json(r#"{"gifts":[{"giftID":"g1","point":2}]}"#)
            .unwrap();
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.lookup("g1").unwrap().point, Some(2));
    }

    #[test]
    fn test_numeric_gift_id_is_keyed_as_string() {
        let gift: Gift = serde_json::from_value(serde_json::json!({ "giftID": 7 })).unwrap();
        assert_eq!(gift.gift_id, "7");

        let catalog = GiftCatalog::new();
        catalog
            .load_from_json(r#"{"gifts":[{"giftID":7,"name":"Star","point":"30"}]}"#)
            .unwrap();
        let star = catalog.lookup("7").unwrap();
        assert_eq!(star.name.as_deref(), Some("Star"));
        assert_eq!(star.point, Some(30));
    }

    #[test]
    fn test_bad_entries_do_not_reject_the_list() {
        let catalog = GiftCatalog::new();
        let n = catalog
            .load_from_json(
                r#"{"gifts":[
                    {"giftID":"g1","name":"Rose"},
                    {"name":"no id"},
                    {"giftID":{"nested":true}},
                    "not an object",
                    {"giftID":"g2","name":"Bag"}
                ]}"#,
            )
            .unwrap();
        assert_eq!(n, 2);
        assert!(catalog.lookup("g1").is_some());
        assert!(catalog.lookup("g2").is_some());
    }

    #[test]
    fn test_invalid_json_is_an_error() {
        let catalog = GiftCatalog::new();
        assert!(catalog.load_from_json("[]").is_err());
        assert!(catalog.is_empty());
    }
}
