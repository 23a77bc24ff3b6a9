mod common;

use anyhow::Result;
use imembed::error::DecodeError;
use imembed::normalize::ImageNormalizer;
use opencv::prelude::*;
use rstest::*;

use common::*;

const JPEG_MAGIC: [u8; 3] = [0xff, 0xd8, 0xff];

#[rstest]
#[case::landscape(2048, 1024, 1024, 1024, 512)]
#[case::portrait(300, 1200, 600, 150, 600)]
#[case::small(640, 480, 1024, 640, 480)]
#[case::exact(1024, 1024, 1024, 1024, 1024)]
fn normalize_bounds_longest_edge(
    #[case] width: i32,
    #[case] height: i32,
    #[case] max_edge: u32,
    #[case] expected_width: i32,
    #[case] expected_height: i32,
) -> Result<()> {
    let normalizer = ImageNormalizer::new(max_edge, 85);

    let jpeg = normalizer.normalize(&solid_png(width, height, RED)?)?;
    assert_eq!(jpeg[..3], JPEG_MAGIC);

    let image = decode(&jpeg)?;
    assert_eq!((image.cols(), image.rows()), (expected_width, expected_height));
    Ok(())
}

#[test]
fn normalize_drops_alpha() -> Result<()> {
    let jpeg = ImageNormalizer::default().normalize(&alpha_png(32, 16)?)?;
    let image = decode(&jpeg)?;
    assert_eq!(image.channels(), 3);
    assert_eq!((image.cols(), image.rows()), (32, 16));
    Ok(())
}

#[test]
fn normalize_is_deterministic() -> Result<()> {
    let raw = solid_png(100, 50, GREEN)?;
    let normalizer = ImageNormalizer::default();
    assert_eq!(normalizer.normalize(&raw)?, normalizer.normalize(&raw)?);
    Ok(())
}

#[test]
fn normalize_reencodes_jpeg_input() -> Result<()> {
    let normalizer = ImageNormalizer::new(64, 90);
    let first = normalizer.normalize(&solid_png(256, 128, BLUE)?)?;
    let second = normalizer.normalize(&first)?;

    let image = decode(&second)?;
    assert_eq!((image.cols(), image.rows()), (64, 32));
    Ok(())
}

#[test]
fn normalize_rejects_garbage() {
    let result = ImageNormalizer::default().normalize(b"definitely not an image");
    assert!(matches!(result, Err(DecodeError::Unrecognized | DecodeError::Backend(_))));
}
