mod common;

use std::num::NonZeroUsize;
use std::sync::Arc;

use anyhow::Result;
use imembed::ingest::{IngestPipeline, IngestStage};
use imembed::record::{PayloadRef, build_records, derive_identifier};
use imembed::store::Collection;

use common::*;

fn batch(n: usize) -> NonZeroUsize {
    NonZeroUsize::new(n).unwrap()
}

#[tokio::test]
async fn ingest_empty_input() -> Result<()> {
    let collection = Arc::new(MemoryCollection::new(3));
    let pipeline = IngestPipeline::new(Arc::new(StubEmbedder::default()), collection.clone());

    let result = pipeline.ingest(&[], batch(8)).await;
    assert!(result.is_empty());
    assert_eq!(collection.count().await?, 0);
    Ok(())
}

#[tokio::test]
async fn ingest_isolates_failures_per_stage() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let sources = ["b/red.png", "b/broken.jpg", "b/missing.png", "b/wide.png", "b/green.png"]
        .map(String::from)
        .to_vec();
    let payloads = vec![
        write_payload(dir.path(), "red", &solid_png(16, 16, RED)?)?,
        write_payload(dir.path(), "broken", b"not an image")?,
        missing_payload(dir.path()),
        write_payload(dir.path(), "wide", &solid_png(77, 16, BLUE)?)?,
        write_payload(dir.path(), "green", &solid_png(16, 16, GREEN)?)?,
    ];
    let records = build_records(sources, payloads)?;

    let collection = Arc::new(MemoryCollection::new(3));
    let pipeline = IngestPipeline::new(Arc::new(StubEmbedder::failing_on_width(77)), collection.clone())
        .concurrency(batch(3));
    let result = pipeline.ingest(&records, batch(2)).await;

    assert_eq!(result.succeeded.len(), 2);
    assert!(result.succeeded.contains(&derive_identifier("b/red.png")));
    assert!(result.succeeded.contains(&derive_identifier("b/green.png")));

    let stage = |source: &str| result.failed[&derive_identifier(source)].stage;
    assert_eq!(result.failed.len(), 3);
    assert_eq!(stage("b/broken.jpg"), IngestStage::Normalize);
    assert_eq!(stage("b/missing.png"), IngestStage::Read);
    assert_eq!(stage("b/wide.png"), IngestStage::Embed);

    assert_eq!(collection.count().await?, 2);
    Ok(())
}

#[tokio::test]
async fn ingest_records_metadata() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let records = build_records(
        vec!["photos/red.png".to_string()],
        vec![write_payload(dir.path(), "red", &solid_png(8, 8, RED)?)?],
    )?;

    let collection = Arc::new(MemoryCollection::new(3));
    let pipeline = IngestPipeline::new(Arc::new(StubEmbedder::default()), collection.clone());
    let result = pipeline.ingest(&records, batch(1)).await;
    assert!(result.failed.is_empty());

    let (vector, metadata) = collection.get(&records[0].identifier).unwrap();
    assert_eq!(metadata.source_locator, "photos/red.png");
    assert_eq!(metadata.content_hash.as_ref().map(String::len), Some(64));
    // BGR 平均值，红色通道在最后
    assert!(vector[2] > 0.9 && vector[0] < 0.1 && vector[1] < 0.1);
    Ok(())
}

#[tokio::test]
async fn ingest_dimension_mismatch_fails_at_upsert() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let records = build_records(
        vec!["b/red.png".to_string()],
        vec![write_payload(dir.path(), "red", &solid_png(8, 8, RED)?)?],
    )?;

    let collection = Arc::new(MemoryCollection::new(4));
    let pipeline = IngestPipeline::new(Arc::new(StubEmbedder::default()), collection.clone());
    let result = pipeline.ingest(&records, batch(4)).await;

    assert!(result.succeeded.is_empty());
    assert_eq!(result.failed[&records[0].identifier].stage, IngestStage::Upsert);
    assert_eq!(collection.count().await?, 0);
    Ok(())
}

#[tokio::test]
async fn ingest_duplicates_last_write_wins() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let records = build_records(
        vec!["b/same.png".to_string(), "b/same.png".to_string()],
        vec![
            write_payload(dir.path(), "first", &solid_png(8, 8, RED)?)?,
            write_payload(dir.path(), "second", &solid_png(8, 8, GREEN)?)?,
        ],
    )?;

    let collection = Arc::new(MemoryCollection::new(3));
    let pipeline = IngestPipeline::new(Arc::new(StubEmbedder::default()), collection.clone());
    let result = pipeline.ingest(&records, batch(1)).await;

    assert_eq!(result.succeeded.len(), 1);
    assert_eq!(collection.count().await?, 1);
    let (vector, _) = collection.get(&records[0].identifier).unwrap();
    assert!(vector[1] > 0.9);
    Ok(())
}

#[tokio::test]
async fn ingest_failed_subset_for_retry() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let records = build_records(
        vec!["b/ok.png".to_string(), "b/gone.png".to_string()],
        vec![
            write_payload(dir.path(), "ok", &solid_png(8, 8, BLUE)?)?,
            PayloadRef::new(dir.path().join("gone")),
        ],
    )?;

    let collection = Arc::new(MemoryCollection::new(3));
    let pipeline = IngestPipeline::new(Arc::new(StubEmbedder::default()), collection.clone());
    let result = pipeline.ingest(&records, batch(2)).await;

    let retry = result.failed_subset(&records);
    assert_eq!(retry.len(), 1);
    assert_eq!(retry[0].source_locator, "b/gone.png");

    std::fs::write(retry[0].payload.path(), solid_png(8, 8, RED)?)?;
    let result = pipeline.ingest(&retry, batch(2)).await;
    assert!(result.failed.is_empty());
    assert_eq!(collection.count().await?, 2);
    Ok(())
}
