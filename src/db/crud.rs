use sqlx::{Executor, Result, Sqlite, SqlitePool};

use super::{CollectionRecord, EntryRecord, VectorRecord};

/// 按名称查找集合
pub async fn find_collection(executor: &SqlitePool, name: &str) -> Result<Option<CollectionRecord>> {
    sqlx::query_as::<_, CollectionRecord>(
        r#"
        SELECT id, name, metric, dimensions FROM collection WHERE name = ?
        "#,
    )
    .bind(name)
    .fetch_optional(executor)
    .await
}

/// 创建集合，已存在时不做修改
pub async fn add_collection<'c, E>(executor: E, name: &str, metric: &str, dimensions: i64) -> Result<()>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO collection (name, metric, dimensions)
        VALUES (?, ?, ?)
        ON CONFLICT (name) DO NOTHING
        "#,
    )
    .bind(name)
    .bind(metric)
    .bind(dimensions)
    .execute(executor)
    .await?;

    Ok(())
}

/// 列出所有集合
pub async fn get_collections(executor: &SqlitePool) -> Result<Vec<CollectionRecord>> {
    sqlx::query_as::<_, CollectionRecord>(
        r#"
        SELECT id, name, metric, dimensions FROM collection ORDER BY name ASC
        "#,
    )
    .fetch_all(executor)
    .await
}

/// 插入或覆盖条目，返回条目 ID
///
/// 标识符已存在时保留原 ID，只更新向量和元数据
pub async fn upsert_entry<'c, E>(
    executor: E,
    collection_id: i64,
    identifier: &str,
    vector: &[u8],
    metadata: &str,
) -> Result<i64>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO entry (collection_id, identifier, vector, metadata)
        VALUES (?, ?, ?, ?)
        ON CONFLICT (collection_id, identifier)
        DO UPDATE SET vector = excluded.vector, metadata = excluded.metadata
        RETURNING id
        "#,
    )
    .bind(collection_id)
    .bind(identifier)
    .bind(vector)
    .bind(metadata)
    .fetch_one(executor)
    .await
}

/// 根据条目 ID 获取标识符和元数据
pub async fn get_entry(executor: &SqlitePool, id: i64) -> Result<Option<EntryRecord>> {
    sqlx::query_as::<_, EntryRecord>(
        r#"
        SELECT id, identifier, metadata FROM entry WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(executor)
    .await
}

/// 获取集合中的所有向量
pub async fn get_vectors(executor: &SqlitePool, collection_id: i64) -> Result<Vec<VectorRecord>> {
    sqlx::query_as::<_, VectorRecord>(
        r#"
        SELECT id, vector FROM entry WHERE collection_id = ? ORDER BY id ASC
        "#,
    )
    .bind(collection_id)
    .fetch_all(executor)
    .await
}

/// 统计集合中的条目数量
pub async fn count_entries(executor: &SqlitePool, collection_id: i64) -> Result<i64> {
    sqlx::query_scalar::<_, i64>(
        r#"
        SELECT COUNT(*) FROM entry WHERE collection_id = ?
        "#,
    )
    .bind(collection_id)
    .fetch_one(executor)
    .await
}
