use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::ArityMismatch;

/// 对象存储中的图片位置
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceLocator {
    pub bucket: String,
    pub key: String,
}

impl SourceLocator {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self { bucket: bucket.into(), key: key.into() }
    }

    /// 由来源位置派生的稳定标识符
    pub fn identifier(&self) -> String {
        derive_identifier(&self.to_string())
    }
}

impl fmt::Display for SourceLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.bucket, self.key)
    }
}

/// 取 BLAKE3 哈希的前 16 字节作为标识符，同一来源总是得到同一个标识符
pub fn derive_identifier(source_locator: &str) -> String {
    let hash = blake3::hash(source_locator.as_bytes());
    hash.as_bytes()[..16].iter().map(|b| format!("{:02x}", b)).collect()
}

/// 暂存在本地的图片数据
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct PayloadRef(PathBuf);

impl PayloadRef {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    pub fn path(&self) -> &Path {
        &self.0
    }
}

/// 图片记录，导入的基本单位
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRecord {
    /// 稳定标识符
    pub identifier: String,
    /// 来源位置，如 `bucket/key`
    pub source_locator: String,
    /// 本地暂存数据
    pub payload: PayloadRef,
}

/// 按位置配对来源和本地载荷，生成图片记录
///
/// 不做去重，重复的标识符在写入向量库时会覆盖旧记录
pub fn build_records(
    sources: Vec<String>,
    payloads: Vec<PayloadRef>,
) -> Result<Vec<ImageRecord>, ArityMismatch> {
    if sources.len() != payloads.len() {
        return Err(ArityMismatch { identifiers: sources.len(), payloads: payloads.len() });
    }
    Ok(sources
        .into_iter()
        .zip(payloads)
        .map(|(source_locator, payload)| ImageRecord {
            identifier: derive_identifier(&source_locator),
            source_locator,
            payload,
        })
        .collect())
}
