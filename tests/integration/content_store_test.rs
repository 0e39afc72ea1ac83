// Content Store Integration Tests
//
// Exercises ContentStore on the real filesystem: durability across reopen,
// recovery from damaged state, capacity enforcement

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use docpress::clock::{Clock, ManualClock};
    use docpress::config::StoreConfig;
    use docpress::store::{ContentStore, OversizedPolicy, StoreError, TokioFsBackend};
    use serde_json::{json, Value};
    use sha2::{Digest, Sha256};
    use std::path::Path;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    const START: u64 = 1_700_000_000_000;

    async fn open(dir: &Path, capacity: u64, clock: &Arc<ManualClock>) -> ContentStore {
        ContentStore::open(
            &StoreConfig::with_capacity(dir, capacity),
            Arc::new(TokioFsBackend::new()),
            Arc::clone(clock) as Arc<dyn Clock>,
        )
        .await
        .expect("store should open")
    }

    fn payload(size: usize) -> Bytes {
        Bytes::from(vec![b'x'; size])
    }

    fn entry_files(dir: &Path) -> Vec<std::path::PathBuf> {
        let mut files: Vec<_> = std::fs::read_dir(dir.join("entries"))
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        files.sort();
        files
    }

    #[tokio::test]
    async fn test_entries_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::new(START));

        {
            let store = open(dir.path(), 1024, &clock).await;
            store
                .set("invoice-a", Bytes::from_static(b"%PDF-a"), None, json!({ "page_count": 1 }))
                .await
                .unwrap();
            clock.advance(Duration::from_millis(1));
            store
                .set("invoice-b", Bytes::from_static(b"%PDF-b"), None, Value::Null)
                .await
                .unwrap();
        }

        let store = open(dir.path(), 1024, &clock).await;
        assert_eq!(store.len(), 2);

        let entry = store.get("invoice-a").await.unwrap().unwrap();
        assert_eq!(entry.payload, Bytes::from_static(b"%PDF-a"));
        assert_eq!(entry.metadata, json!({ "page_count": 1 }));
        assert!(dir.path().join("index.json").exists());
    }

    #[tokio::test]
    async fn test_capacity_plus_one_byte_evicts_oldest() {
        let dir = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::new(START));
        let store = open(dir.path(), 100, &clock).await;

        store.set("a", payload(50), None, Value::Null).await.unwrap();
        clock.advance(Duration::from_millis(1));
        store.set("b", payload(50), None, Value::Null).await.unwrap();
        clock.advance(Duration::from_millis(1));
        store.set("c", payload(1), None, Value::Null).await.unwrap();

        assert!(!store.contains("a"));
        assert!(store.contains("b"));
        assert!(store.contains("c"));
        let stats = store.stats();
        assert_eq!(stats.total_size_bytes, 51);
        assert_eq!(stats.evictions, 1);
        assert_eq!(entry_files(dir.path()).len(), 2);
    }

    #[tokio::test]
    async fn test_reject_policy_leaves_store_untouched() {
        let dir = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::new(START));
        let mut config = StoreConfig::with_capacity(dir.path(), 10);
        config.oversized_entries = OversizedPolicy::Reject;
        let store = ContentStore::open(
            &config,
            Arc::new(TokioFsBackend::new()),
            Arc::clone(&clock) as Arc<dyn Clock>,
        )
        .await
        .unwrap();

        store.set("small", payload(5), None, Value::Null).await.unwrap();
        let err = store
            .set("huge", payload(11), None, Value::Null)
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::Capacity { size: 11, capacity: 10 }));
        assert!(store.contains("small"));
        assert_eq!(store.stats().total_size_bytes, 5);
    }

    #[tokio::test]
    async fn test_corrupted_payload_is_a_miss() {
        let dir = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::new(START));
        let store = open(dir.path(), 1024, &clock).await;
        store
            .set("invoice-a", Bytes::from_static(b"%PDF-good"), None, Value::Null)
            .await
            .unwrap();

        let file = entry_files(dir.path()).remove(0);
        std::fs::write(&file, b"%PDF-evil").unwrap();

        assert!(store.get("invoice-a").await.unwrap().is_none());
        assert!(!store.contains("invoice-a"));
        assert!(!file.exists());
    }

    #[tokio::test]
    async fn test_reopen_repairs_damaged_state() {
        let dir = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::new(START));

        {
            let store = open(dir.path(), 1024, &clock).await;
            store.set("kept", payload(10), None, Value::Null).await.unwrap();
            store.set("truncated", payload(10), None, Value::Null).await.unwrap();
            store.set("deleted", payload(10), None, Value::Null).await.unwrap();
        }

        // Damage: a truncated payload, a missing payload, an orphan and a leftover temp file
        let entries = dir.path().join("entries");
        let path_of = |key: &str| entries.join(format!("{:x}.data", Sha256::digest(key.as_bytes())));
        assert_eq!(entry_files(dir.path()).len(), 3);
        std::fs::write(path_of("truncated"), b"short").unwrap();
        std::fs::remove_file(path_of("deleted")).unwrap();
        std::fs::write(entries.join("orphan.data"), b"nobody").unwrap();
        std::fs::write(entries.join("partial.data.tmp"), b"half").unwrap();

        let store = open(dir.path(), 1024, &clock).await;

        assert_eq!(store.len(), 1);
        assert!(store.get("kept").await.unwrap().is_some());
        assert!(!entries.join("orphan.data").exists());
        assert!(!entries.join("partial.data.tmp").exists());
        assert_eq!(entry_files(dir.path()).len(), 1);
    }

    #[tokio::test]
    async fn test_reopen_with_smaller_capacity_evicts_oldest() {
        let dir = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::new(START));

        {
            let store = open(dir.path(), 100, &clock).await;
            for key in ["a", "b", "c"] {
                store.set(key, payload(30), None, Value::Null).await.unwrap();
                clock.advance(Duration::from_millis(1));
            }
        }

        let store = open(dir.path(), 60, &clock).await;
        assert!(!store.contains("a"));
        assert!(store.contains("b"));
        assert!(store.contains("c"));
        assert!(store.stats().total_size_bytes <= 60);
    }

    #[tokio::test]
    async fn test_expired_entries_dropped_on_reopen() {
        let dir = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::new(START));

        {
            let store = open(dir.path(), 1024, &clock).await;
            store
                .set("short", payload(5), Some(Duration::from_secs(10)), Value::Null)
                .await
                .unwrap();
            store.set("long", payload(5), None, Value::Null).await.unwrap();
        }

        clock.advance(Duration::from_secs(10));
        let store = open(dir.path(), 1024, &clock).await;

        assert!(!store.contains("short"));
        assert!(store.contains("long"));
        assert_eq!(entry_files(dir.path()).len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_writers_respect_capacity() {
        let dir = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::new(START));
        let store = Arc::new(open(dir.path(), 100, &clock).await);

        let writes = (0..16).map(|i| {
            let store = Arc::clone(&store);
            async move {
                store
                    .set(&format!("key-{}", i), payload(25), None, Value::Null)
                    .await
            }
        });
        for result in futures::future::join_all(writes).await {
            result.unwrap();
        }

        let stats = store.stats();
        assert_eq!(stats.count, 4);
        assert_eq!(stats.total_size_bytes, 100);
        assert_eq!(stats.evictions, 12);
    }
}
