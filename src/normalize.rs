use log::debug;
use opencv::core::{Mat, Size, Vector};
use opencv::imgproc::InterpolationFlags;
use opencv::prelude::*;
use opencv::{imgcodecs, imgproc};

use crate::error::DecodeError;

/// 图片最长边的默认上限
pub const DEFAULT_MAX_EDGE: u32 = 1024;
/// 默认 JPEG 编码质量
pub const DEFAULT_JPEG_QUALITY: u8 = 85;

/// 图片归一化器
///
/// 任意格式的图片都会被解码为三通道 BGR（丢弃 alpha），最长边超过 `max_edge` 时等比缩小，
/// 然后以固定质量重新编码为 JPEG。输出格式与输入格式无关。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageNormalizer {
    max_edge: u32,
    jpeg_quality: u8,
}

impl Default for ImageNormalizer {
    fn default() -> Self {
        Self { max_edge: DEFAULT_MAX_EDGE, jpeg_quality: DEFAULT_JPEG_QUALITY }
    }
}

impl ImageNormalizer {
    /// `max_edge` 最小为 1，`jpeg_quality` 会被限制在 1 ~ 100
    pub fn new(max_edge: u32, jpeg_quality: u8) -> Self {
        Self { max_edge: max_edge.max(1), jpeg_quality: jpeg_quality.clamp(1, 100) }
    }

    pub fn max_edge(&self) -> u32 {
        self.max_edge
    }

    pub fn jpeg_quality(&self) -> u8 {
        self.jpeg_quality
    }

    /// 将原始图片字节归一化为 JPEG 字节
    pub fn normalize(&self, raw: &[u8]) -> Result<Vec<u8>, DecodeError> {
        let image = decode(raw)?;
        let image = self.shrink(image)?;
        let params = Vector::<i32>::from_slice(&[
            imgcodecs::IMWRITE_JPEG_QUALITY,
            self.jpeg_quality as i32,
        ]);
        let mut buf = Vector::<u8>::new();
        if !imgcodecs::imencode(".jpg", &image, &mut buf, &params)? {
            return Err(DecodeError::Backend("JPEG 编码失败".to_string()));
        }
        Ok(buf.to_vec())
    }

    /// 只缩小，不放大
    fn shrink(&self, image: Mat) -> Result<Mat, DecodeError> {
        let (width, height) = (image.cols(), image.rows());
        let Some((new_width, new_height)) = target_size(width, height, self.max_edge) else {
            return Ok(image);
        };
        debug!("缩放图片: {}x{} -> {}x{}", width, height, new_width, new_height);
        let mut output = Mat::default();
        imgproc::resize(
            &image,
            &mut output,
            Size::new(new_width, new_height),
            0.,
            0.,
            InterpolationFlags::INTER_AREA as i32,
        )?;
        Ok(output)
    }
}

/// 解码为三通道 8 位图片，灰度图和带 alpha 的图片都会被转换
fn decode(raw: &[u8]) -> Result<Mat, DecodeError> {
    if raw.is_empty() {
        return Err(DecodeError::Empty);
    }
    let buf = Vector::<u8>::from_slice(raw);
    let image = imgcodecs::imdecode(&buf, imgcodecs::IMREAD_COLOR)?;
    if image.empty() || image.cols() <= 0 || image.rows() <= 0 {
        return Err(DecodeError::Unrecognized);
    }
    Ok(image)
}

/// 计算缩放后的尺寸，不需要缩放时返回 None
fn target_size(width: i32, height: i32, max_edge: u32) -> Option<(i32, i32)> {
    let max_edge = max_edge.min(i32::MAX as u32) as i32;
    let longest = width.max(height);
    if longest <= max_edge {
        return None;
    }
    let scale = max_edge as f64 / longest as f64;
    let scaled = |n: i32| -> i32 {
        if n == longest { max_edge } else { ((n as f64 * scale).round() as i32).max(1) }
    };
    Some((scaled(width), scaled(height)))
}
