use crate::error::StoreError;
use crate::stake::StakeRecord;
use sled::Db;
use std::path::Path;

const TREE_NAME: &str = "stakes";
const SLOT_KEY: &str = "records";

/// The persisted stake list: one key holding the whole JSON array.
pub struct RecordStore {
    tree: sled::Tree,
}

impl RecordStore {
    pub fn new(db: &Db) -> Result<Self, StoreError> {
        let tree = db.open_tree(TREE_NAME)?;
        Ok(Self { tree })
    }

    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let db = sled::open(path)?;
        Self::new(&db)
    }

    /// Reads the stored list. A missing slot is an empty list; an unreadable
    /// or malformed one is logged and also treated as empty.
    pub fn load(&self) -> Vec<StakeRecord> {
        let bytes = match self.tree.get(SLOT_KEY) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return Vec::new(),
            Err(e) => {
                log::error!("Failed to read stored stakes, showing none: {e}");
                return Vec::new();
            }
        };

        match serde_json::from_slice::<Vec<StakeRecord>>(&bytes) {
            Ok(records) => records,
            Err(e) => {
                log::error!(
                    "Stored stakes are malformed ({} bytes), showing none: {e}",
                    bytes.len()
                );
                Vec::new()
            }
        }
    }

    /// Replaces the stored list in a single insert.
    pub fn save(&self, records: &[StakeRecord]) -> Result<(), StoreError> {
        let encoded = serde_json::to_vec(records)?;
        self.tree.insert(SLOT_KEY, encoded)?;
        // block until the new list is stable on disk
        self.tree.flush()?;
        log::debug!("Saved {} stakes", records.len());
        Ok(())
    }

    pub fn clear(&self) -> Result<(), StoreError> {
        self.tree.remove(SLOT_KEY)?;
        self.tree.flush()?;
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn write_raw(&self, bytes: &[u8]) {
        self.tree.insert(SLOT_KEY, bytes).unwrap();
    }

    #[cfg(test)]
    pub(crate) fn has_slot(&self) -> bool {
        self.tree.contains_key(SLOT_KEY).unwrap()
    }
}

#[cfg(test)]
pub(crate) fn temporary_store() -> RecordStore {
    let db = sled::Config::new().temporary(true).open().unwrap();
    RecordStore::new(&db).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stake::StakeForm;
    use chrono::Utc;

    fn stake(platform: &str, token: &str, quantity: &str) -> StakeRecord {
        StakeForm {
            platform: platform.to_string(),
            staked_token: token.to_string(),
            price_asset_id: token.to_lowercase(),
            staked_quantity: quantity.to_string(),
            yield_rate: "2.15".to_string(),
            fee_paid: "0.10".to_string(),
            ..Default::default()
        }
        .admit("eur", Utc::now())
        .unwrap()
    }

    #[test]
    fn test_load_empty_store() {
        let store = temporary_store();
        assert!(store.load().is_empty());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let store = temporary_store();
        let records = vec![stake("Lido", "ETH", "1.5"), stake("Aave V3", "USDC", "1000")];
        store.save(&records).unwrap();
        assert_eq!(store.load(), records);
    }

    #[test]
    fn test_save_overwrites_previous_list() {
        let store = temporary_store();
        store
            .save(&[stake("Lido", "ETH", "1.5"), stake("Aave V3", "USDC", "1000")])
            .unwrap();
        let second = vec![stake("Kraken", "DOT", "20")];
        store.save(&second).unwrap();
        assert_eq!(store.load(), second);
    }

    #[test]
    fn test_malformed_slot_loads_as_empty() {
        let store = temporary_store();
        store.write_raw(b"{not json");
        assert!(store.load().is_empty());

        store.write_raw(br#"{"platform": "Lido"}"#);
        assert!(store.load().is_empty());
    }

    #[test]
    fn test_clear_erases_slot() {
        let store = temporary_store();
        store.save(&[stake("Lido", "ETH", "1.5")]).unwrap();
        store.clear().unwrap();
        assert!(store.load().is_empty());
    }
}
