use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::num::NonZeroUsize;
use std::sync::Arc;

use futures::StreamExt;
use indicatif::ProgressBar;
use log::{debug, info, warn};
use serde::Serialize;
use tokio::task::spawn_blocking;

use crate::embed::Embedder;
use crate::metrics;
use crate::normalize::ImageNormalizer;
use crate::record::ImageRecord;
use crate::store::{Collection, Metadata};

/// 导入失败的阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestStage {
    /// 读取暂存数据
    Read,
    /// 图片归一化
    Normalize,
    /// 计算嵌入向量
    Embed,
    /// 写入向量库
    Upsert,
}

impl IngestStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Normalize => "normalize",
            Self::Embed => "embed",
            Self::Upsert => "upsert",
        }
    }
}

impl fmt::Display for IngestStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 单条记录的失败原因
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestFailure {
    pub stage: IngestStage,
    pub reason: String,
}

impl IngestFailure {
    pub fn new(stage: IngestStage, reason: impl fmt::Display) -> Self {
        Self { stage, reason: reason.to_string() }
    }
}

impl fmt::Display for IngestFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.stage, self.reason)
    }
}

/// 一次导入的结果，按标识符记录成功和失败
///
/// 同一次调用中重复的标识符各自独立处理，结果不同时会同时出现在两边
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IngestResult {
    pub succeeded: BTreeSet<String>,
    pub failed: BTreeMap<String, IngestFailure>,
}

impl IngestResult {
    pub fn record_success(&mut self, identifier: impl Into<String>) {
        self.succeeded.insert(identifier.into());
    }

    pub fn record_failure(&mut self, identifier: impl Into<String>, failure: IngestFailure) {
        self.failed.insert(identifier.into(), failure);
    }

    pub fn is_empty(&self) -> bool {
        self.succeeded.is_empty() && self.failed.is_empty()
    }

    /// 从原始记录中挑出失败的部分，用于重试
    pub fn failed_subset(&self, records: &[ImageRecord]) -> Vec<ImageRecord> {
        records.iter().filter(|r| self.failed.contains_key(&r.identifier)).cloned().collect()
    }
}

/// 导入流水线：读取暂存数据 -> 归一化 -> 嵌入 -> 写入向量库
///
/// 任一阶段失败只影响当前记录
pub struct IngestPipeline<E, C> {
    embedder: Arc<E>,
    collection: Arc<C>,
    normalizer: ImageNormalizer,
    concurrency: NonZeroUsize,
    progress: Option<ProgressBar>,
}

impl<E: Embedder, C: Collection> IngestPipeline<E, C> {
    pub fn new(embedder: Arc<E>, collection: Arc<C>) -> Self {
        Self {
            embedder,
            collection,
            normalizer: ImageNormalizer::default(),
            concurrency: NonZeroUsize::MIN,
            progress: None,
        }
    }

    pub fn normalizer(mut self, normalizer: ImageNormalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    /// 批次内同时处理的记录数量，默认为 1，即顺序处理
    pub fn concurrency(mut self, concurrency: NonZeroUsize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn progress(mut self, pb: ProgressBar) -> Self {
        self.progress = Some(pb);
        self
    }

    /// 按 `batch_size` 分批导入记录
    pub async fn ingest(&self, records: &[ImageRecord], batch_size: NonZeroUsize) -> IngestResult {
        let mut result = IngestResult::default();
        if records.is_empty() {
            return result;
        }

        let nbatch = records.len().div_ceil(batch_size.get());
        for (i, batch) in records.chunks(batch_size.get()).enumerate() {
            info!("导入批次 {}/{}: {} 张图片", i + 1, nbatch, batch.len());

            let outcomes = futures::stream::iter(batch)
                .map(|record| async move { (record, self.process(record).await) })
                .buffer_unordered(self.concurrency.get())
                .collect::<Vec<_>>()
                .await;

            for (record, outcome) in outcomes {
                match outcome {
                    Ok(()) => {
                        debug!("导入成功: {} ({})", record.source_locator, record.identifier);
                        metrics::inc_ingest_success();
                        result.record_success(&record.identifier);
                    }
                    Err(failure) => {
                        warn!("导入失败: {} {}", record.source_locator, failure);
                        metrics::inc_ingest_failure(failure.stage.as_str());
                        result.record_failure(&record.identifier, failure);
                    }
                }
                if let Some(pb) = &self.progress {
                    pb.set_message(record.source_locator.clone());
                    pb.inc(1);
                }
            }
        }

        info!("导入完成: 成功 {}，失败 {}", result.succeeded.len(), result.failed.len());
        result
    }

    async fn process(&self, record: &ImageRecord) -> Result<(), IngestFailure> {
        let raw = tokio::fs::read(record.payload.path())
            .await
            .map_err(|e| IngestFailure::new(IngestStage::Read, e))?;

        let normalizer = self.normalizer;
        let normalized = spawn_blocking(move || normalizer.normalize(&raw))
            .await
            .map_err(|e| IngestFailure::new(IngestStage::Normalize, e))?
            .map_err(|e| IngestFailure::new(IngestStage::Normalize, e))?;

        let vector = self
            .embedder
            .embed_image(&normalized)
            .await
            .map_err(|e| IngestFailure::new(IngestStage::Embed, e))?;

        let metadata = Metadata::new(&record.source_locator)
            .with_content_hash(blake3::hash(&normalized).to_hex().as_str());
        self.collection
            .upsert(&record.identifier, &vector, &metadata)
            .await
            .map_err(|e| IngestFailure::new(IngestStage::Upsert, e))?;

        Ok(())
    }
}
