mod local;

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

pub use self::local::*;
use crate::error::StoreError;

/// 嵌入向量，同一集合内的向量长度必须一致
pub type EmbeddingVector = Vec<f32>;

/// 集合使用的距离度量
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Distance {
    /// 余弦距离，1 - cos
    #[value(name = "cos")]
    Cosine,
    /// 欧氏距离的平方
    #[value(name = "l2")]
    L2,
    /// 内积距离，1 - dot
    #[value(name = "ip")]
    InnerProduct,
}

impl Distance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cosine => "cos",
            Self::L2 => "l2",
            Self::InnerProduct => "ip",
        }
    }
}

impl fmt::Display for Distance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Distance {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cos" => Ok(Self::Cosine),
            "l2" => Ok(Self::L2),
            "ip" => Ok(Self::InnerProduct),
            _ => Err(format!("无效的距离度量: {}", s)),
        }
    }
}

/// 向量附带的元数据
///
/// `source_locator` 和 `content_hash` 是固定字段，其余字段放在 `extra` 中
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    /// 图片来源，如 `bucket/key`
    pub source_locator: String,
    /// 归一化后图片内容的 BLAKE3 哈希
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Metadata {
    pub fn new(source_locator: impl Into<String>) -> Self {
        Self { source_locator: source_locator.into(), ..Default::default() }
    }

    pub fn with_content_hash(mut self, hash: impl Into<String>) -> Self {
        self.content_hash = Some(hash.into());
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

/// 检索结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Hit {
    pub identifier: String,
    pub distance: f32,
    pub metadata: Metadata,
}

/// 按距离升序排序，距离相同时按标识符排序
pub fn sort_hits(hits: &mut [Hit]) {
    hits.sort_by(|a, b| {
        a.distance.total_cmp(&b.distance).then_with(|| a.identifier.cmp(&b.identifier))
    });
}

/// 以标识符为键的持久化向量集合
pub trait Collection: Send + Sync {
    /// 集合名称
    fn name(&self) -> &str;

    /// 向量维度
    fn dimensions(&self) -> usize;

    /// 插入或覆盖一条记录，同一标识符的写入是原子的
    fn upsert(
        &self,
        identifier: &str,
        vector: &[f32],
        metadata: &Metadata,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// 查询最接近的 k 条记录，按距离升序排列，距离相同时按标识符排序
    ///
    /// 集合为空时返回空列表
    fn query(
        &self,
        vector: &[f32],
        k: usize,
    ) -> impl Future<Output = Result<Vec<Hit>, StoreError>> + Send;

    /// 记录数量
    fn count(&self) -> impl Future<Output = Result<usize, StoreError>> + Send;
}
