use std::sync::Arc;
use std::time::Instant;

use log::debug;

use crate::embed::Embedder;
use crate::error::{InvalidArgument, QueryError, StoreError};
use crate::metrics;
use crate::store::{Collection, Hit, sort_hits};

/// 检索服务：文本 -> 嵌入向量 -> 最近邻查询
pub struct Retriever<E, C> {
    embedder: Arc<E>,
    collection: Arc<C>,
}

impl<E: Embedder, C: Collection> Retriever<E, C> {
    pub fn new(embedder: Arc<E>, collection: Arc<C>) -> Self {
        Self { embedder, collection }
    }

    /// 返回与 `text` 最接近的 `k` 张图片，按距离升序排列，距离相同时按标识符排序
    pub async fn query(&self, text: &str, k: usize) -> Result<Vec<Hit>, QueryError> {
        if k == 0 {
            return Err(InvalidArgument::ZeroK.into());
        }
        if text.trim().is_empty() {
            return Err(InvalidArgument::EmptyQuery.into());
        }

        let start = Instant::now();
        let vector = self.embedder.embed_text(text).await?;
        let dimensions = self.collection.dimensions();
        if vector.len() != dimensions {
            return Err(StoreError::DimensionMismatch { expected: dimensions, actual: vector.len() }.into());
        }
        let mut hits = self.collection.query(&vector, k).await?;
        sort_hits(&mut hits);
        hits.truncate(k);

        let elapsed = start.elapsed().as_secs_f32();
        debug!("查询 {} {:?} 耗时 {:.3}s，命中 {} 条", self.collection.name(), text, elapsed, hits.len());
        metrics::observe_query(elapsed, hits.len());

        Ok(hits)
    }
}
