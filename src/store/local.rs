use std::path::Path;
use std::sync::RwLock;

use bytemuck::{cast_slice, pod_collect_to_vec};
use log::{debug, info};
use tokio::sync::Mutex;
use usearch::{Index, IndexOptions, MetricKind, ScalarKind};

use super::{Collection, Distance, Hit, Metadata, sort_hits};
use crate::db::{self, CollectionRecord, Database, crud};
use crate::error::StoreError;

/// 索引初始容量，用尽后按两倍扩容
const INITIAL_CAPACITY: usize = 64;

/// 本地向量库
///
/// 条目持久化在 SQLite 中，每个集合在内存中维护一个 usearch HNSW 索引，
/// 打开集合时从数据库重建。
pub struct LocalStore {
    db: Database,
}

/// 集合概况
#[derive(Debug, Clone)]
pub struct CollectionInfo {
    pub name: String,
    pub metric: String,
    pub dimensions: usize,
    pub entries: usize,
}

impl LocalStore {
    /// 打开数据库，不存在时自动创建
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db = db::init_db(path).await?;
        Ok(Self { db })
    }

    /// 获取或创建集合
    ///
    /// 已存在的集合必须使用相同的距离度量和维度
    pub async fn get_or_create_collection(
        &self,
        name: &str,
        metric: Distance,
        dimensions: usize,
    ) -> Result<LocalCollection, StoreError> {
        if dimensions == 0 {
            return Err(StoreError::ZeroDimensions);
        }

        crud::add_collection(&self.db, name, metric.as_str(), dimensions as i64).await?;
        let record = crud::find_collection(&self.db, name)
            .await?
            .ok_or_else(|| StoreError::Database(sqlx::Error::RowNotFound))?;

        if record.metric != metric.as_str() {
            return Err(StoreError::CollectionMismatch {
                name: name.to_string(),
                reason: format!("距离度量为 {}，请求为 {}", record.metric, metric),
            });
        }
        if record.dimensions != dimensions as i64 {
            return Err(StoreError::CollectionMismatch {
                name: name.to_string(),
                reason: format!("维度为 {}，请求为 {}", record.dimensions, dimensions),
            });
        }

        LocalCollection::load(self.db.clone(), record, metric).await
    }

    /// 列出所有集合及其条目数量
    pub async fn collections(&self) -> Result<Vec<CollectionInfo>, StoreError> {
        let mut infos = vec![];
        for record in crud::get_collections(&self.db).await? {
            let entries = crud::count_entries(&self.db, record.id).await?;
            infos.push(CollectionInfo {
                name: record.name,
                metric: record.metric,
                dimensions: record.dimensions as usize,
                entries: entries as usize,
            });
        }
        Ok(infos)
    }
}

pub struct LocalCollection {
    db: Database,
    id: i64,
    name: String,
    dimensions: usize,
    index: RwLock<Index>,
    /// 串行化写入，保证数据库和索引中同一标识符的最后一次写入一致
    write_lock: Mutex<()>,
}

impl LocalCollection {
    async fn load(db: Database, record: CollectionRecord, metric: Distance) -> Result<Self, StoreError> {
        let dimensions = record.dimensions as usize;
        let index = create_index(metric, dimensions)?;

        let vectors = crud::get_vectors(&db, record.id).await?;
        index.reserve(vectors.len().max(INITIAL_CAPACITY)).map_err(index_error)?;
        for row in &vectors {
            let vector: Vec<f32> = pod_collect_to_vec(&row.vector);
            if vector.len() != dimensions {
                return Err(StoreError::DimensionMismatch { expected: dimensions, actual: vector.len() });
            }
            index.add(row.id as u64, vector.as_slice()).map_err(index_error)?;
        }
        info!("加载集合 {}: {} 条记录", record.name, vectors.len());

        Ok(Self {
            db,
            id: record.id,
            name: record.name,
            dimensions,
            index: RwLock::new(index),
            write_lock: Mutex::new(()),
        })
    }

    fn check_dimensions(&self, actual: usize) -> Result<(), StoreError> {
        if actual != self.dimensions {
            return Err(StoreError::DimensionMismatch { expected: self.dimensions, actual });
        }
        Ok(())
    }

    fn index_upsert(&self, key: u64, vector: &[f32]) -> Result<(), StoreError> {
        let index = self.index.write().map_err(|_| StoreError::Index("索引锁已损坏".to_string()))?;
        if index.contains(key) {
            index.remove(key).map_err(index_error)?;
        }
        if index.size() + 1 > index.capacity() {
            index.reserve((index.capacity() * 2).max(INITIAL_CAPACITY)).map_err(index_error)?;
        }
        index.add(key, vector).map_err(index_error)?;
        Ok(())
    }

    /// 搜索至少 `k` 条结果，第 k 条的距离有并列时继续扩大范围，直到并列的记录全部取出
    fn index_search(&self, vector: &[f32], k: usize) -> Result<Vec<(u64, f32)>, StoreError> {
        let index = self.index.read().map_err(|_| StoreError::Index("索引锁已损坏".to_string()))?;
        let size = index.size();
        if size == 0 {
            return Ok(vec![]);
        }

        let mut count = k.min(size);
        loop {
            let matches = index.search(vector, count).map_err(index_error)?;
            let exhausted = count == size || matches.keys.len() < count;
            let kth = k.checked_sub(1).and_then(|i| matches.distances.get(i));
            let tied = match (kth, matches.distances.last()) {
                (Some(kth), Some(last)) => last <= kth,
                _ => false,
            };
            if exhausted || !tied {
                return Ok(matches.keys.into_iter().zip(matches.distances).collect());
            }
            count = count.saturating_mul(2).min(size);
        }
    }
}

impl Collection for LocalCollection {
    fn name(&self) -> &str {
        &self.name
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn upsert(&self, identifier: &str, vector: &[f32], metadata: &Metadata) -> Result<(), StoreError> {
        self.check_dimensions(vector.len())?;
        let metadata = serde_json::to_string(metadata)?;

        let _guard = self.write_lock.lock().await;
        let mut tx = self.db.begin().await?;
        let key =
            crud::upsert_entry(&mut *tx, self.id, identifier, cast_slice(vector), &metadata).await?;
        // 索引更新失败时事务随 tx 一起回滚
        self.index_upsert(key as u64, vector)?;
        tx.commit().await?;
        debug!("写入 {} -> {}", identifier, key);
        Ok(())
    }

    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<Hit>, StoreError> {
        self.check_dimensions(vector.len())?;
        if k == 0 {
            return Ok(vec![]);
        }

        let matches = self.index_search(vector, k)?;
        let mut hits: Vec<Hit> = Vec::with_capacity(matches.len());
        for (key, distance) in matches {
            let Some(entry) = crud::get_entry(&self.db, key as i64).await? else {
                continue;
            };
            hits.push(Hit {
                identifier: entry.identifier,
                distance,
                metadata: serde_json::from_str(&entry.metadata)?,
            });
        }
        sort_hits(&mut hits);
        hits.truncate(k);
        Ok(hits)
    }

    async fn count(&self) -> Result<usize, StoreError> {
        Ok(crud::count_entries(&self.db, self.id).await? as usize)
    }
}

fn create_index(metric: Distance, dimensions: usize) -> Result<Index, StoreError> {
    let options = IndexOptions {
        dimensions,
        metric: match metric {
            Distance::Cosine => MetricKind::Cos,
            Distance::L2 => MetricKind::L2sq,
            Distance::InnerProduct => MetricKind::IP,
        },
        quantization: ScalarKind::F32,
        // usearch 默认参数
        connectivity: 16,
        expansion_add: 128,
        expansion_search: 64,
        ..Default::default()
    };
    Index::new(&options).map_err(index_error)
}

fn index_error(err: impl std::fmt::Display) -> StoreError {
    StoreError::Index(err.to_string())
}
