//! 分段进度的持久化
//!
//! 每个任务 key 对应存储目录下的一个子目录，每个分段一行记录
//! （`segment_0000.json`），先写临时文件并 fsync，再原子重命名。
//! `finished` 只在对应字节写入并同步到目标文件之后才更新，
//! 因此即使系统崩溃，持久化的值也始终是实际写入量的下界。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::io::AsyncWriteExt;

use super::error::{DownloadError, DownloadResult};
use super::task::chunk_manager::Segment;

#[async_trait]
pub trait SegmentStore: Send + Sync {
    /// 已有记录时原样返回，否则写入给定切分
    async fn create_or_get_segments(&self, key: &str, partition: &[Segment]) -> DownloadResult<Vec<Segment>>;

    async fn update_finished(&self, key: &str, index: usize, finished: u64) -> DownloadResult<()>;

    /// 按 index 升序返回
    async fn get_segments(&self, key: &str) -> DownloadResult<Vec<Segment>>;

    async fn delete_segment(&self, key: &str, index: usize) -> DownloadResult<()>;

    async fn delete_segments(&self, key: &str) -> DownloadResult<()>;
}

#[derive(Debug, Serialize, Deserialize)]
struct SegmentRow {
    key: String,
    #[serde(flatten)]
    segment: Segment,
    updated_at: DateTime<Utc>,
}

type LockMap<K> = Mutex<HashMap<K, Arc<tokio::sync::Mutex<()>>>>;

/// 基于 JSON 文件的分段存储
#[derive(Debug)]
pub struct JsonSegmentStore {
    root: PathBuf,
    key_locks: LockMap<String>,
    row_locks: LockMap<(String, usize)>,
}

impl JsonSegmentStore {
    pub fn open(root: impl Into<PathBuf>) -> DownloadResult<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)
            .map_err(|e| DownloadError::storage(format!("无法创建存储目录 {}: {}", root.display(), e)))?;
        Ok(Self {
            root,
            key_locks: Mutex::new(HashMap::new()),
            row_locks: Mutex::new(HashMap::new()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn key_dir(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    fn row_path(&self, key: &str, index: usize) -> PathBuf {
        self.key_dir(key).join(format!("segment_{:04}.json", index))
    }

    fn lock_for<K: std::hash::Hash + Eq + Clone>(map: &LockMap<K>, k: &K) -> Arc<tokio::sync::Mutex<()>> {
        let mut map = map.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        map.entry(k.clone()).or_default().clone()
    }

    async fn write_row(&self, key: &str, segment: Segment) -> DownloadResult<()> {
        let row = SegmentRow { key: key.to_string(), segment, updated_at: Utc::now() };
        let json = serde_json::to_vec(&row)
            .map_err(|e| DownloadError::storage(format!("序列化失败: {}", e)))?;
        let path = self.row_path(key, segment.index);
        let tmp = path.with_extension("json.tmp");
        let write = async {
            let mut file = tokio::fs::File::create(&tmp).await?;
            file.write_all(&json).await?;
            file.sync_all().await
        };
        write
            .await
            .map_err(|e| DownloadError::storage(format!("写入 {} 失败: {}", tmp.display(), e)))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| DownloadError::storage(format!("重命名 {} 失败: {}", path.display(), e)))
    }

    async fn read_row(&self, path: &Path) -> DownloadResult<Segment> {
        let data = tokio::fs::read(path)
            .await
            .map_err(|e| DownloadError::storage(format!("读取 {} 失败: {}", path.display(), e)))?;
        let row: SegmentRow = serde_json::from_slice(&data)
            .map_err(|e| DownloadError::storage(format!("反序列化 {} 失败: {}", path.display(), e)))?;
        Ok(row.segment)
    }

    async fn read_segments(&self, key: &str) -> DownloadResult<Vec<Segment>> {
        let dir = self.key_dir(key);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(DownloadError::storage(format!("读取 {} 失败: {}", dir.display(), e))),
        };

        let mut segments = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| DownloadError::storage(e.to_string()))?
        {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with("segment_") && name.ends_with(".json") {
                segments.push(self.read_row(&entry.path()).await?);
            }
        }
        segments.sort_by_key(|s| s.index);
        Ok(segments)
    }
}

#[async_trait]
impl SegmentStore for JsonSegmentStore {
    async fn create_or_get_segments(&self, key: &str, partition: &[Segment]) -> DownloadResult<Vec<Segment>> {
        let lock = Self::lock_for(&self.key_locks, &key.to_string());
        let _guard = lock.lock().await;

        let existing = self.read_segments(key).await?;
        if !existing.is_empty() {
            return Ok(existing);
        }

        let dir = self.key_dir(key);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| DownloadError::storage(format!("创建 {} 失败: {}", dir.display(), e)))?;
        for segment in partition {
            self.write_row(key, *segment).await?;
        }
        log::debug!("[store] 写入 {} 的 {} 个分段", key, partition.len());
        Ok(partition.to_vec())
    }

    async fn update_finished(&self, key: &str, index: usize, finished: u64) -> DownloadResult<()> {
        let lock = Self::lock_for(&self.row_locks, &(key.to_string(), index));
        let _guard = lock.lock().await;

        let path = self.row_path(key, index);
        let mut segment = self.read_row(&path).await?;
        if finished > segment.len() {
            return Err(DownloadError::storage(format!(
                "分段 {}#{} 完成量 {} 超过分段长度 {}",
                key,
                index,
                finished,
                segment.len()
            )));
        }
        segment.finished = finished;
        self.write_row(key, segment).await
    }

    async fn get_segments(&self, key: &str) -> DownloadResult<Vec<Segment>> {
        self.read_segments(key).await
    }

    async fn delete_segment(&self, key: &str, index: usize) -> DownloadResult<()> {
        let lock = Self::lock_for(&self.row_locks, &(key.to_string(), index));
        let _guard = lock.lock().await;

        match tokio::fs::remove_file(self.row_path(key, index)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(DownloadError::storage(format!("删除分段 {}#{} 失败: {}", key, index, e))),
        }
    }

    async fn delete_segments(&self, key: &str) -> DownloadResult<()> {
        let lock = Self::lock_for(&self.key_locks, &key.to_string());
        let _guard = lock.lock().await;

        let result = match tokio::fs::remove_dir_all(self.key_dir(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(DownloadError::storage(format!("删除 {} 的分段失败: {}", key, e))),
        };
        if let Ok(mut rows) = self.row_locks.lock() {
            rows.retain(|(k, _), _| k != key);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::task::chunk_manager::partition;

    fn store() -> (tempfile::TempDir, JsonSegmentStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonSegmentStore::open(dir.path().join("segments")).unwrap();
        (dir, store)
    }

    #[actix_rt::test]
    async fn test_create_then_get() {
        let (_dir, store) = store();
        let plan = partition(10_000, 4, true);

        let created = store.create_or_get_segments("k1", &plan).await.unwrap();
        assert_eq!(created, plan);
        assert_eq!(store.get_segments("k1").await.unwrap(), plan);
        assert!(store.get_segments("other").await.unwrap().is_empty());
    }

    #[actix_rt::test]
    async fn test_existing_rows_win() {
        let (_dir, store) = store();
        let plan = partition(10_000, 4, true);
        store.create_or_get_segments("k1", &plan).await.unwrap();
        store.update_finished("k1", 1, 1000).await.unwrap();

        let again = store
            .create_or_get_segments("k1", &partition(10_000, 2, true))
            .await
            .unwrap();
        assert_eq!(again.len(), 4);
        assert_eq!(again[1].finished, 1000);
    }

    #[actix_rt::test]
    async fn test_update_rejects_over_report() {
        let (_dir, store) = store();
        store.create_or_get_segments("k1", &partition(100, 2, true)).await.unwrap();

        assert!(store.update_finished("k1", 0, 50).await.is_ok());
        let err = store.update_finished("k1", 0, 51).await.unwrap_err();
        assert!(err.is_storage());
        assert!(store.update_finished("k1", 7, 1).await.is_err());
        assert_eq!(store.get_segments("k1").await.unwrap()[0].finished, 50);
    }

    #[actix_rt::test]
    async fn test_rows_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("segments");
        {
            let store = JsonSegmentStore::open(&root).unwrap();
            store.create_or_get_segments("k1", &partition(9, 3, true)).await.unwrap();
            store.update_finished("k1", 2, 3).await.unwrap();
        }
        let reopened = JsonSegmentStore::open(&root).unwrap();
        let segments = reopened.get_segments("k1").await.unwrap();
        assert_eq!(segments.iter().map(|s| s.finished).collect::<Vec<_>>(), vec![0, 0, 3]);
    }

    #[actix_rt::test]
    async fn test_update_leaves_no_temp_files() {
        let (_dir, store) = store();
        store.create_or_get_segments("k1", &partition(100, 2, true)).await.unwrap();
        store.update_finished("k1", 1, 20).await.unwrap();

        let names: Vec<String> = std::fs::read_dir(store.root().join("k1"))
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names.len(), 2);
        assert!(names.iter().all(|name| name.ends_with(".json")));
        assert_eq!(store.get_segments("k1").await.unwrap()[1].finished, 20);
    }

    #[actix_rt::test]
    async fn test_concurrent_rows() {
        let (_dir, store) = store();
        let store = Arc::new(store);
        store.create_or_get_segments("k1", &partition(4000, 4, true)).await.unwrap();

        let handles: Vec<_> = (0..4)
            .map(|index| {
                let store = store.clone();
                tokio::spawn(async move {
                    for finished in (0..=1000).step_by(100) {
                        store.update_finished("k1", index, finished).await.unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }
        let segments = store.get_segments("k1").await.unwrap();
        assert!(segments.iter().all(|s| s.finished == 1000));
    }

    #[actix_rt::test]
    async fn test_delete() {
        let (_dir, store) = store();
        store.create_or_get_segments("k1", &partition(100, 4, true)).await.unwrap();

        store.delete_segment("k1", 2).await.unwrap();
        store.delete_segment("k1", 2).await.unwrap();
        let indices: Vec<usize> = store.get_segments("k1").await.unwrap().iter().map(|s| s.index).collect();
        assert_eq!(indices, vec![0, 1, 3]);

        store.delete_segments("k1").await.unwrap();
        store.delete_segments("k1").await.unwrap();
        assert!(store.get_segments("k1").await.unwrap().is_empty());
    }

    #[test]
    fn test_blocking_read_of_missing_key() {
        let (_dir, store) = store();
        let segments = tokio_test::block_on(store.get_segments("missing")).unwrap();
        assert!(segments.is_empty());
    }
}
