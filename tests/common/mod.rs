#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;

use anyhow::Result;
use imembed::embed::Embedder;
use imembed::error::{EmbeddingError, StoreError};
use imembed::record::PayloadRef;
use imembed::store::{Collection, EmbeddingVector, Hit, Metadata};
use opencv::core::{CV_8UC3, CV_8UC4, Mat, Scalar, Vector};
use opencv::imgcodecs;
use opencv::prelude::*;

pub const RED: (f64, f64, f64) = (0., 0., 255.);
pub const GREEN: (f64, f64, f64) = (0., 255., 0.);
pub const BLUE: (f64, f64, f64) = (255., 0., 0.);

fn encode(image: &Mat, ext: &str) -> Result<Vec<u8>> {
    let mut buf = Vector::<u8>::new();
    imgcodecs::imencode(ext, image, &mut buf, &Vector::new())?;
    Ok(buf.to_vec())
}

/// 纯色 PNG，颜色为 BGR
pub fn solid_png(width: i32, height: i32, (b, g, r): (f64, f64, f64)) -> Result<Vec<u8>> {
    let image = Mat::new_rows_cols_with_default(height, width, CV_8UC3, Scalar::new(b, g, r, 0.))?;
    encode(&image, ".png")
}

/// 带 alpha 通道的半透明 PNG
pub fn alpha_png(width: i32, height: i32) -> Result<Vec<u8>> {
    let image =
        Mat::new_rows_cols_with_default(height, width, CV_8UC4, Scalar::new(0., 0., 255., 128.))?;
    encode(&image, ".png")
}

pub fn decode(raw: &[u8]) -> Result<Mat> {
    Ok(imgcodecs::imdecode(&Vector::<u8>::from_slice(raw), imgcodecs::IMREAD_UNCHANGED)?)
}

/// 写入文件并返回对应的载荷
pub fn write_payload(dir: &Path, name: &str, data: &[u8]) -> Result<PayloadRef> {
    let path = dir.join(name);
    std::fs::write(&path, data)?;
    Ok(PayloadRef::new(path))
}

pub fn missing_payload(dir: &Path) -> PayloadRef {
    PayloadRef::new(dir.join("does-not-exist"))
}

/// 以图片平均颜色作为向量的嵌入服务，文本只认识三种颜色
#[derive(Default)]
pub struct StubEmbedder {
    /// 宽度等于此值的图片会嵌入失败
    pub fail_width: Option<i32>,
}

impl StubEmbedder {
    pub fn failing_on_width(width: i32) -> Self {
        Self { fail_width: Some(width) }
    }
}

impl Embedder for StubEmbedder {
    async fn embed_image(&self, image: &[u8]) -> Result<EmbeddingVector, EmbeddingError> {
        let image = imgcodecs::imdecode(&Vector::<u8>::from_slice(image), imgcodecs::IMREAD_COLOR)
            .map_err(|e| EmbeddingError::Service(e.to_string()))?;
        if Some(image.cols()) == self.fail_width {
            return Err(EmbeddingError::Service("stub failure".to_string()));
        }
        let data = image.data_bytes().map_err(|e| EmbeddingError::Service(e.to_string()))?;
        let pixels = (data.len() / 3).max(1) as f32;
        let mut sum = [0f32; 3];
        for pixel in data.chunks_exact(3) {
            for (acc, &v) in sum.iter_mut().zip(pixel) {
                *acc += v as f32;
            }
        }
        Ok(sum.iter().map(|v| v / pixels / 255.).collect())
    }

    async fn embed_text(&self, text: &str) -> Result<EmbeddingVector, EmbeddingError> {
        match text {
            "red" => Ok(vec![0., 0., 1.]),
            "green" => Ok(vec![0., 1., 0.]),
            "blue" => Ok(vec![1., 0., 0.]),
            _ => Err(EmbeddingError::Service(format!("unknown text: {text}"))),
        }
    }
}

fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0. || nb == 0. {
        return 1.;
    }
    1. - dot / (na * nb)
}

/// 暴力检索的内存集合
pub struct MemoryCollection {
    dimensions: usize,
    entries: Mutex<BTreeMap<String, (Vec<f32>, Metadata)>>,
}

impl MemoryCollection {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions, entries: Mutex::new(BTreeMap::new()) }
    }

    pub fn get(&self, identifier: &str) -> Option<(Vec<f32>, Metadata)> {
        self.entries.lock().unwrap().get(identifier).cloned()
    }
}

impl Collection for MemoryCollection {
    fn name(&self) -> &str {
        "memory"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn upsert(&self, identifier: &str, vector: &[f32], metadata: &Metadata) -> Result<(), StoreError> {
        if vector.len() != self.dimensions {
            return Err(StoreError::DimensionMismatch { expected: self.dimensions, actual: vector.len() });
        }
        self.entries
            .lock()
            .unwrap()
            .insert(identifier.to_string(), (vector.to_vec(), metadata.clone()));
        Ok(())
    }

    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<Hit>, StoreError> {
        if vector.len() != self.dimensions {
            return Err(StoreError::DimensionMismatch { expected: self.dimensions, actual: vector.len() });
        }
        let mut hits = self
            .entries
            .lock()
            .unwrap()
            .iter()
            .map(|(identifier, (v, metadata))| Hit {
                identifier: identifier.clone(),
                distance: cosine_distance(vector, v),
                metadata: metadata.clone(),
            })
            .collect::<Vec<_>>();
        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        hits.truncate(k);
        Ok(hits)
    }

    async fn count(&self) -> Result<usize, StoreError> {
        Ok(self.entries.lock().unwrap().len())
    }
}

/// 无视参数，总是返回固定结果的集合
pub struct FixedHits {
    hits: Vec<Hit>,
    dimensions: usize,
}

impl FixedHits {
    pub fn new(hits: &[(&str, f32)]) -> Self {
        let hits = hits
            .iter()
            .map(|&(identifier, distance)| Hit {
                identifier: identifier.to_string(),
                distance,
                metadata: Metadata::new(format!("bucket/{identifier}.jpg")),
            })
            .collect();
        Self { hits, dimensions: 3 }
    }

    pub fn with_dimensions(mut self, dimensions: usize) -> Self {
        self.dimensions = dimensions;
        self
    }
}

impl Collection for FixedHits {
    fn name(&self) -> &str {
        "fixed"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn upsert(&self, _: &str, _: &[f32], _: &Metadata) -> Result<(), StoreError> {
        Ok(())
    }

    async fn query(&self, _: &[f32], _: usize) -> Result<Vec<Hit>, StoreError> {
        Ok(self.hits.clone())
    }

    async fn count(&self) -> Result<usize, StoreError> {
        Ok(self.hits.len())
    }
}
