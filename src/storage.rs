use std::collections::BTreeMap;
use std::future::Future;
use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;

use futures::StreamExt;
use indicatif::ProgressBar;
use log::{info, warn};
use regex::Regex;
use tokio::task::spawn_blocking;
use walkdir::WalkDir;

use crate::error::StorageError;
use crate::record::{PayloadRef, SourceLocator};

static RE_IMAGE_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\.(jpg|jpeg|png)$").expect("failed to build regex"));

/// 同时下载的对象数量
const STAGE_CONCURRENCY: usize = 32;

/// 对象存储
pub trait ObjectStore: Send + Sync {
    /// 列出 bucket 中以 `prefix` 开头的 key，最多 `max_keys` 个
    fn list(
        &self,
        bucket: &str,
        prefix: &str,
        max_keys: usize,
    ) -> impl Future<Output = Result<Vec<String>, StorageError>> + Send;

    /// 读取对象内容
    fn get(&self, bucket: &str, key: &str) -> impl Future<Output = Result<Vec<u8>, StorageError>> + Send;
}

/// 以本地目录模拟的对象存储，每个子目录是一个 bucket
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn bucket_path(&self, bucket: &str) -> Result<PathBuf, StorageError> {
        if !is_safe_relative(bucket) || bucket.contains('/') {
            return Err(StorageError::BucketNotFound(bucket.to_string()));
        }
        let path = self.root.join(bucket);
        if !path.is_dir() {
            return Err(StorageError::BucketNotFound(bucket.to_string()));
        }
        Ok(path)
    }
}

impl ObjectStore for LocalObjectStore {
    async fn list(&self, bucket: &str, prefix: &str, max_keys: usize) -> Result<Vec<String>, StorageError> {
        let bucket_path = self.bucket_path(bucket)?;
        let prefix = prefix.to_string();
        let keys = spawn_blocking(move || {
            let mut keys = WalkDir::new(&bucket_path)
                .into_iter()
                .filter_map(|entry| entry.ok())
                .filter(|entry| entry.file_type().is_file())
                .filter_map(|entry| {
                    let relative = entry.path().strip_prefix(&bucket_path).ok()?;
                    let key = relative
                        .components()
                        .map(|c| c.as_os_str().to_string_lossy())
                        .collect::<Vec<_>>()
                        .join("/");
                    key.starts_with(&prefix).then_some(key)
                })
                .collect::<Vec<_>>();
            keys.sort();
            keys.truncate(max_keys);
            keys
        })
        .await?;
        Ok(keys)
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StorageError> {
        if !is_safe_relative(key) {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        let path = self.bucket_path(bucket)?.join(key);
        tokio::fs::read(&path).await.map_err(|source| StorageError::Io { path, source })
    }
}

/// 只允许普通的相对路径，防止 key 逃出 bucket 目录
fn is_safe_relative(key: &str) -> bool {
    !key.is_empty() && Path::new(key).components().all(|c| matches!(c, Component::Normal(_)))
}

/// 只保留 jpg、jpeg、png 图片
pub fn filter_image_keys(keys: Vec<String>) -> Vec<String> {
    keys.into_iter().filter(|key| RE_IMAGE_SUFFIX.is_match(key)).collect()
}

/// 暂存结果，`sources` 和 `payloads` 按位置一一对应
#[derive(Debug, Default)]
pub struct StagedObjects {
    pub sources: Vec<String>,
    pub payloads: Vec<PayloadRef>,
    /// 下载失败的来源及原因
    pub failed: BTreeMap<String, String>,
}

/// 下载对象到暂存目录，文件名为记录标识符
///
/// 单个对象下载失败只会记录在 `failed` 中
pub async fn stage_objects<S: ObjectStore>(
    store: &S,
    bucket: &str,
    keys: &[String],
    staging_dir: &Path,
    pb: &ProgressBar,
) -> Result<StagedObjects, StorageError> {
    tokio::fs::create_dir_all(staging_dir)
        .await
        .map_err(|source| StorageError::Io { path: staging_dir.to_path_buf(), source })?;
    info!("暂存 {} 个对象到 {}", keys.len(), staging_dir.display());

    let outcomes = futures::stream::iter(keys)
        .map(|key| async move {
            let locator = SourceLocator::new(bucket, key.as_str());
            let path = staging_dir.join(locator.identifier());
            let result = match store.get(bucket, key).await {
                Ok(data) => tokio::fs::write(&path, data)
                    .await
                    .map_err(|source| StorageError::Io { path: path.clone(), source }),
                Err(e) => Err(e),
            };
            pb.inc(1);
            (locator.to_string(), path, result)
        })
        .buffered(STAGE_CONCURRENCY)
        .collect::<Vec<_>>()
        .await;

    let mut staged = StagedObjects::default();
    for (source, path, result) in outcomes {
        match result {
            Ok(()) => {
                staged.sources.push(source);
                staged.payloads.push(PayloadRef::new(path));
            }
            Err(e) => {
                warn!("下载失败: {}: {}", source, e);
                staged.failed.insert(source, e.to_string());
            }
        }
    }
    Ok(staged)
}
