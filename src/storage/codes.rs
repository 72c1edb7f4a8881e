use async_trait::async_trait;
use redb::ReadableTable;

use super::db::{Database, DatabaseError};
use super::models::{ttl_as_secs, AccessCode, StoredCode};
use super::tables::*;
use super::{CodeStore, StoreError};

const NEXT_SEQ: &str = "next_seq";

impl Database {
    // ========================================================================
    // Access code operations
    // ========================================================================

    /// Store an access code, replacing any record with the same code
    pub fn put_code(&self, code: &AccessCode) -> Result<StoredCode, DatabaseError> {
        debug_assert!(!code.code.is_empty(), "access code must not be empty");

        let write_txn = self.begin_write()?;
        let stored = {
            let mut meta = write_txn.open_table(STORE_META)?;
            let seq = meta.get(NEXT_SEQ)?.map(|v| v.value()).unwrap_or(0) + 1;
            meta.insert(NEXT_SEQ, seq)?;

            let mut table = write_txn.open_table(ACCESS_CODES)?;
            let previous: Option<StoredCode> = table
                .get(code.code.as_str())?
                .map(|v| rmp_serde::from_slice(v.value()))
                .transpose()?;

            let stored = StoredCode {
                code: code.clone(),
                seq,
            };
            let data = rmp_serde::to_vec_named(&stored)?;
            table.insert(code.code.as_str(), data.as_slice())?;

            let mut created_index = write_txn.open_table(CODES_BY_CREATED)?;
            let mut expiry_index = write_txn.open_table(CODES_BY_EXPIRY)?;
            if let Some(previous) = previous {
                created_index.remove(previous.created_key())?;
                expiry_index.remove(previous.expiry_key())?;
            }
            created_index.insert(stored.created_key(), code.code.as_str())?;
            expiry_index.insert(stored.expiry_key(), code.code.as_str())?;

            stored
        };
        write_txn.commit()?;
        Ok(stored)
    }

    /// Get an access code by its token value
    pub fn get_code(&self, code: &str) -> Result<Option<StoredCode>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(ACCESS_CODES)?;

        match table.get(code)? {
            Some(data) => Ok(Some(rmp_serde::from_slice(data.value())?)),
            None => Ok(None),
        }
    }

    /// Set `last_update` on a single record. Returns false if the code is unknown.
    pub fn set_last_update(&self, code: &str, ts: i64) -> Result<bool, DatabaseError> {
        let write_txn = self.begin_write()?;
        let found = {
            let mut table = write_txn.open_table(ACCESS_CODES)?;
            let existing: Option<StoredCode> = table
                .get(code)?
                .map(|v| rmp_serde::from_slice(v.value()))
                .transpose()?;

            match existing {
                Some(mut stored) => {
                    stored.code.last_update = ts;
                    let data = rmp_serde::to_vec_named(&stored)?;
                    table.insert(code, data.as_slice())?;
                    true
                }
                None => false,
            }
        };
        write_txn.commit()?;
        Ok(found)
    }

    /// Most recently created code with `created > after`
    pub fn latest_created_after(&self, after: i64) -> Result<Option<AccessCode>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let index = read_txn.open_table(CODES_BY_CREATED)?;
        let table = read_txn.open_table(ACCESS_CODES)?;

        let mut range = index.range((after.saturating_add(1), 0u64)..)?;
        while let Some(entry) = range.next_back() {
            let (_, code) = entry?;
            if let Some(data) = table.get(code.value())? {
                let stored: StoredCode = rmp_serde::from_slice(data.value())?;
                return Ok(Some(stored.code));
            }
        }
        Ok(None)
    }

    /// Earliest created code with `created > after`, skipping `exclude`
    pub fn earliest_created_after(
        &self,
        after: i64,
        exclude: &str,
    ) -> Result<Option<AccessCode>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let index = read_txn.open_table(CODES_BY_CREATED)?;
        let table = read_txn.open_table(ACCESS_CODES)?;

        for entry in index.range((after.saturating_add(1), 0u64)..)? {
            let (_, code) = entry?;
            if code.value() == exclude {
                continue;
            }
            if let Some(data) = table.get(code.value())? {
                let stored: StoredCode = rmp_serde::from_slice(data.value())?;
                return Ok(Some(stored.code));
            }
        }
        Ok(None)
    }

    /// Delete every code with `expires < cutoff` using the expiration index.
    pub fn delete_codes_expiring_before(&self, cutoff: i64) -> Result<usize, DatabaseError> {
        let write_txn = self.begin_write()?;
        let mut deleted = 0;
        {
            let mut expiry_index = write_txn.open_table(CODES_BY_EXPIRY)?;
            let expired: Vec<((i64, u64), String)> = expiry_index
                .range(..(cutoff, 0u64))?
                .map(|r| r.map(|(k, v)| (k.value(), v.value().to_string())))
                .collect::<Result<Vec<_>, _>>()?;

            let mut table = write_txn.open_table(ACCESS_CODES)?;
            let mut created_index = write_txn.open_table(CODES_BY_CREATED)?;
            for (expiry_key, code) in expired {
                expiry_index.remove(expiry_key)?;

                let stored: Option<StoredCode> = table
                    .remove(code.as_str())?
                    .map(|v| rmp_serde::from_slice(v.value()))
                    .transpose()?;
                if let Some(stored) = stored {
                    created_index.remove(stored.created_key())?;
                    deleted += 1;
                }
            }
        }
        write_txn.commit()?;
        Ok(deleted)
    }

    /// Get all codes in creation order
    #[cfg(test)]
    pub fn get_all_codes(&self) -> Result<Vec<AccessCode>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let index = read_txn.open_table(CODES_BY_CREATED)?;
        let table = read_txn.open_table(ACCESS_CODES)?;

        let mut codes = Vec::new();
        for entry in index.iter()? {
            let (_, code) = entry?;
            if let Some(data) = table.get(code.value())? {
                let stored: StoredCode = rmp_serde::from_slice(data.value())?;
                codes.push(stored.code);
            }
        }
        Ok(codes)
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Database) -> Result<T, DatabaseError> + Send + 'static,
    {
        let db = self.clone();
        Ok(tokio::task::spawn_blocking(move || f(&db)).await??)
    }
}

#[async_trait]
impl CodeStore for Database {
    async fn create(&self, code: &AccessCode) -> Result<(), StoreError> {
        let code = code.clone();
        self.blocking(move |db| db.put_code(&code)).await?;
        Ok(())
    }

    async fn current_active(
        &self,
        ttl_seconds: u64,
        now: i64,
    ) -> Result<Option<AccessCode>, StoreError> {
        let after = now.saturating_sub(ttl_as_secs(ttl_seconds));
        self.blocking(move |db| db.latest_created_after(after)).await
    }

    async fn get(&self, code: &str) -> Result<AccessCode, StoreError> {
        let key = code.to_string();
        self.blocking(move |db| db.get_code(&key))
            .await?
            .map(|stored| stored.code)
            .ok_or_else(|| StoreError::NotFound(code.to_string()))
    }

    async fn mark_used(&self, code: &str, ts: i64) -> Result<(), StoreError> {
        let key = code.to_string();
        if self.blocking(move |db| db.set_last_update(&key, ts)).await? {
            Ok(())
        } else {
            Err(StoreError::NotFound(code.to_string()))
        }
    }

    async fn next_after(&self, code: &str, ts: i64) -> Result<Option<AccessCode>, StoreError> {
        let exclude = code.to_string();
        self.blocking(move |db| db.earliest_created_after(ts, &exclude))
            .await
    }

    async fn delete_expired(&self, cutoff: i64) -> Result<usize, StoreError> {
        self.blocking(move |db| db.delete_codes_expiring_before(cutoff))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{make_code, setup_db};

    #[test]
    fn test_put_and_get_code() {
        let (db, _temp) = setup_db();

        let code = make_code("ALPHA", 100, 300);
        let stored = db.put_code(&code).unwrap();
        assert_eq!(stored.seq, 1);

        let fetched = db.get_code("ALPHA").unwrap().unwrap();
        assert_eq!(fetched.code, code);
        assert!(db.get_code("MISSING").unwrap().is_none());
    }

    #[test]
    fn test_put_replaces_index_entries() {
        let (db, _temp) = setup_db();

        db.put_code(&make_code("ALPHA", 100, 300)).unwrap();
        db.put_code(&make_code("ALPHA", 200, 300)).unwrap();

        let all = db.get_all_codes().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].created, 200);
        assert_eq!(db.delete_codes_expiring_before(450).unwrap(), 0);
        assert_eq!(db.delete_codes_expiring_before(501).unwrap(), 1);
    }

    #[test]
    fn test_set_last_update() {
        let (db, _temp) = setup_db();
        db.put_code(&make_code("ALPHA", 100, 300)).unwrap();

        assert!(db.set_last_update("ALPHA", 150).unwrap());
        assert!(db.set_last_update("ALPHA", 150).unwrap());
        assert_eq!(db.get_code("ALPHA").unwrap().unwrap().code.last_update, 150);
        assert!(!db.set_last_update("MISSING", 150).unwrap());
    }

    #[test]
    fn test_created_ordering_breaks_ties_by_insertion() {
        let (db, _temp) = setup_db();
        db.put_code(&make_code("FIRST", 100, 300)).unwrap();
        db.put_code(&make_code("SECOND", 100, 300)).unwrap();
        db.put_code(&make_code("OLD", 10, 300)).unwrap();

        let latest = db.latest_created_after(50).unwrap().unwrap();
        assert_eq!(latest.code, "SECOND");

        let earliest = db.earliest_created_after(50, "").unwrap().unwrap();
        assert_eq!(earliest.code, "FIRST");

        let skipped = db.earliest_created_after(50, "FIRST").unwrap().unwrap();
        assert_eq!(skipped.code, "SECOND");

        assert!(db.latest_created_after(100).unwrap().is_none());
    }

    #[test]
    fn test_delete_expiring_before_is_exact() {
        let (db, _temp) = setup_db();
        db.put_code(&make_code("A", 0, 300)).unwrap(); // expires 300
        db.put_code(&make_code("B", 100, 300)).unwrap(); // expires 400
        db.put_code(&make_code("C", 200, 300)).unwrap(); // expires 500
        db.set_last_update("C", 250).unwrap();

        let before = db.get_code("C").unwrap().unwrap();
        assert_eq!(db.delete_codes_expiring_before(400).unwrap(), 1);

        let remaining: Vec<String> = db
            .get_all_codes()
            .unwrap()
            .into_iter()
            .map(|c| c.code)
            .collect();
        assert_eq!(remaining, vec!["B", "C"]);
        assert_eq!(db.get_code("C").unwrap().unwrap(), before);
    }

    #[test]
    fn test_codes_survive_reopen() {
        let temp = tempfile::TempDir::new().unwrap();
        {
            let db = Database::open(temp.path()).unwrap();
            db.put_code(&make_code("DURABLE", 100, 300)).unwrap();
        }
        let db = Database::open(temp.path()).unwrap();
        assert!(db.get_code("DURABLE").unwrap().is_some());
        let stored = db.put_code(&make_code("NEXT", 200, 300)).unwrap();
        assert_eq!(stored.seq, 2);
    }

    #[tokio::test]
    async fn test_code_store_contract() {
        let (db, _temp) = setup_db();
        let store: &dyn CodeStore = &db;

        store.create(&make_code("A", 1000, 300)).await.unwrap();
        assert_eq!(store.get("A").await.unwrap().created, 1000);
        assert!(matches!(
            store.get("Z").await,
            Err(StoreError::NotFound(code)) if code == "Z"
        ));

        let active = store.current_active(300, 1200).await.unwrap();
        assert_eq!(active.map(|c| c.code), Some("A".to_string()));
        assert!(store.current_active(300, 1300).await.unwrap().is_none());

        store.mark_used("A", 1100).await.unwrap();
        assert_eq!(store.get("A").await.unwrap().last_update, 1100);
        assert!(store.mark_used("Z", 1100).await.is_err());

        store.create(&make_code("B", 1400, 300)).await.unwrap();
        let next = store.next_after("A", 1000).await.unwrap();
        assert_eq!(next.map(|c| c.code), Some("B".to_string()));
        assert!(store.next_after("B", 1400).await.unwrap().is_none());

        assert_eq!(store.delete_expired(1301).await.unwrap(), 1);
        assert!(store.get("A").await.is_err());
    }
}
