use sqlx::FromRow;

/// 集合记录
#[derive(Debug, Clone, FromRow)]
pub struct CollectionRecord {
    /// 集合 ID
    pub id: i64,
    /// 集合名称
    pub name: String,
    /// 距离度量
    pub metric: String,
    /// 向量维度
    pub dimensions: i64,
}

/// 向量记录，`id` 同时作为向量索引中的 key
#[derive(Debug, Clone, FromRow)]
pub struct VectorRecord {
    pub id: i64,
    /// 按本机字节序存储的 f32 数组
    pub vector: Vec<u8>,
}

/// 条目记录
#[derive(Debug, Clone, FromRow)]
pub struct EntryRecord {
    pub id: i64,
    /// 图片标识符
    pub identifier: String,
    /// JSON 格式的元数据
    pub metadata: String,
}
