mod http;

use std::future::Future;

pub use self::http::*;
use crate::error::EmbeddingError;
use crate::store::EmbeddingVector;

/// 多模态嵌入服务
///
/// 图片和文本必须投影到同一个向量空间，否则检索结果没有意义
pub trait Embedder: Send + Sync {
    /// 计算归一化图片的嵌入向量
    fn embed_image(
        &self,
        image: &[u8],
    ) -> impl Future<Output = Result<EmbeddingVector, EmbeddingError>> + Send;

    /// 计算文本的嵌入向量
    fn embed_text(
        &self,
        text: &str,
    ) -> impl Future<Output = Result<EmbeddingVector, EmbeddingError>> + Send;
}
