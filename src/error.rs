use std::path::PathBuf;

use thiserror::Error;

/// 图片无法解码或重新编码，该图片应被跳过
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("图片数据为空")]
    Empty,
    #[error("无法识别的图片格式")]
    Unrecognized,
    #[error("图片处理失败: {0}")]
    Backend(String),
}

impl From<opencv::Error> for DecodeError {
    fn from(err: opencv::Error) -> Self {
        Self::Backend(err.to_string())
    }
}

/// 构建记录时标识符和载荷数量不一致
#[derive(Debug, Error, PartialEq, Eq)]
#[error("标识符与载荷数量不一致: {identifiers} != {payloads}")]
pub struct ArityMismatch {
    pub identifiers: usize,
    pub payloads: usize,
}

/// 嵌入服务调用失败
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("嵌入服务请求失败: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("嵌入服务限流")]
    RateLimited,
    #[error("嵌入服务返回错误 ({status}): {body}")]
    Status { status: u16, body: String },
    #[error("无法解析嵌入服务响应: {0}")]
    MalformedResponse(String),
    #[error("嵌入向量维度错误: 期望 {expected}，实际 {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("嵌入服务错误: {0}")]
    Service(String),
}

/// 向量库读写失败
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),
    #[error("数据库迁移失败: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("向量索引错误: {0}")]
    Index(String),
    #[error("元数据序列化失败: {0}")]
    Metadata(#[from] serde_json::Error),
    #[error("向量维度不匹配: 集合为 {expected}，输入为 {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("集合 {name} 已存在且配置不同: {reason}")]
    CollectionMismatch { name: String, reason: String },
    #[error("向量维度必须大于 0")]
    ZeroDimensions,
    #[error("无法创建目录 {path}: {source}")]
    Io { path: PathBuf, source: std::io::Error },
}

/// 调用参数错误，属于使用错误而非临时故障
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InvalidArgument {
    #[error("无效参数: k 必须为正整数")]
    ZeroK,
    #[error("无效参数: 查询文本为空")]
    EmptyQuery,
}

/// 检索失败
#[derive(Debug, Error)]
pub enum QueryError {
    #[error(transparent)]
    InvalidArgument(#[from] InvalidArgument),
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// 视觉模型总结失败，不影响检索结果
#[derive(Debug, Error)]
pub enum SummarizationError {
    #[error("总结服务请求失败: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("总结服务限流")]
    RateLimited,
    #[error("总结服务返回错误 ({status}): {body}")]
    Status { status: u16, body: String },
    #[error("无法解析总结服务响应: {0}")]
    MalformedResponse(String),
    #[error("没有可供总结的图片")]
    NoImages,
}

/// 对象存储访问失败
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("bucket 不存在: {0}")]
    BucketNotFound(String),
    #[error("非法的对象 key: {0}")]
    InvalidKey(String),
    #[error("读取 {path} 失败: {source}")]
    Io { path: PathBuf, source: std::io::Error },
    #[error("后台任务失败: {0}")]
    Join(#[from] tokio::task::JoinError),
}
