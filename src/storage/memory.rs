use async_trait::async_trait;
use tokio::sync::RwLock;

use super::models::{ttl_as_secs, AccessCode, StoredCode};
use super::{CodeStore, StoreError};

/// In-process access-code store, selected by `mem://` descriptors.
///
/// Records live for the lifetime of the process only.
#[derive(Default)]
pub struct MemoryCodeStore {
    inner: RwLock<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    next_seq: u64,
    records: Vec<StoredCode>,
}

impl MemoryCodeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every record in creation order
    pub async fn all(&self) -> Vec<AccessCode> {
        let inner = self.inner.read().await;
        let mut records = inner.records.clone();
        records.sort_by_key(StoredCode::created_key);
        records.into_iter().map(|r| r.code).collect()
    }
}

#[async_trait]
impl CodeStore for MemoryCodeStore {
    async fn create(&self, code: &AccessCode) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        inner.next_seq += 1;
        let seq = inner.next_seq;
        inner.records.retain(|r| r.code.code != code.code);
        inner.records.push(StoredCode {
            code: code.clone(),
            seq,
        });
        Ok(())
    }

    async fn current_active(
        &self,
        ttl_seconds: u64,
        now: i64,
    ) -> Result<Option<AccessCode>, StoreError> {
        let after = now.saturating_sub(ttl_as_secs(ttl_seconds));
        let inner = self.inner.read().await;
        Ok(inner
            .records
            .iter()
            .filter(|r| r.code.created > after)
            .max_by_key(|r| r.created_key())
            .map(|r| r.code.clone()))
    }

    async fn get(&self, code: &str) -> Result<AccessCode, StoreError> {
        let inner = self.inner.read().await;
        inner
            .records
            .iter()
            .find(|r| r.code.code == code)
            .map(|r| r.code.clone())
            .ok_or_else(|| StoreError::NotFound(code.to_string()))
    }

    async fn mark_used(&self, code: &str, ts: i64) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        match inner.records.iter_mut().find(|r| r.code.code == code) {
            Some(record) => {
                record.code.last_update = ts;
                Ok(())
            }
            None => Err(StoreError::NotFound(code.to_string())),
        }
    }

    async fn next_after(&self, code: &str, ts: i64) -> Result<Option<AccessCode>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .records
            .iter()
            .filter(|r| r.code.created > ts && r.code.code != code)
            .min_by_key(|r| r.created_key())
            .map(|r| r.code.clone()))
    }

    async fn delete_expired(&self, cutoff: i64) -> Result<usize, StoreError> {
        let mut inner = self.inner.write().await;
        let before = inner.records.len();
        inner.records.retain(|r| !r.code.is_expired_at(cutoff));
        Ok(before - inner.records.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::make_code;

    #[tokio::test]
    async fn test_get_unknown_code() {
        let store = MemoryCodeStore::new();
        assert!(matches!(
            store.get("NOPE").await,
            Err(StoreError::NotFound(code)) if code == "NOPE"
        ));
    }

    #[tokio::test]
    async fn test_current_active_prefers_latest_then_insertion_order() {
        let store = MemoryCodeStore::new();
        store.create(&make_code("OLD", 0, 300)).await.unwrap();
        store.create(&make_code("TIE_1", 100, 300)).await.unwrap();
        store.create(&make_code("TIE_2", 100, 300)).await.unwrap();

        let active = store.current_active(300, 200).await.unwrap().unwrap();
        assert_eq!(active.code, "TIE_2");

        // created must be strictly greater than now - ttl
        assert!(store.current_active(300, 400).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_next_after_is_ascending() {
        let store = MemoryCodeStore::new();
        store.create(&make_code("A", 0, 300)).await.unwrap();
        store.create(&make_code("C", 620, 300)).await.unwrap();
        store.create(&make_code("B", 310, 300)).await.unwrap();

        let next = store.next_after("A", 0).await.unwrap().unwrap();
        assert_eq!(next.code, "B");
        let next = store.next_after("B", 310).await.unwrap().unwrap();
        assert_eq!(next.code, "C");
        assert!(store.next_after("C", 620).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_mark_used_is_idempotent() {
        let store = MemoryCodeStore::new();
        store.create(&make_code("A", 0, 300)).await.unwrap();

        store.mark_used("A", 50).await.unwrap();
        store.mark_used("A", 50).await.unwrap();
        assert_eq!(store.get("A").await.unwrap().last_update, 50);
        assert!(store.mark_used("B", 50).await.is_err());
    }

    #[tokio::test]
    async fn test_delete_expired_leaves_others_untouched() {
        let store = MemoryCodeStore::new();
        store.create(&make_code("A", 0, 300)).await.unwrap(); // expires 300
        store.create(&make_code("B", 100, 300)).await.unwrap(); // expires 400
        store.create(&make_code("C", 200, 300)).await.unwrap(); // expires 500
        store.mark_used("B", 150).await.unwrap();
        let b_before = store.get("B").await.unwrap();

        assert_eq!(store.delete_expired(400).await.unwrap(), 1);
        assert_eq!(store.delete_expired(400).await.unwrap(), 0);

        let codes: Vec<String> = store.all().await.into_iter().map(|c| c.code).collect();
        assert_eq!(codes, vec!["B", "C"]);
        assert_eq!(store.get("B").await.unwrap(), b_before);
    }
}
