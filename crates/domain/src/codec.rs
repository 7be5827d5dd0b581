use std::io::Cursor;

use image::{DynamicImage, ImageFormat};
use slicer_core::{config::OutputFormat, Result, SlicerError};

/// 解码上传的原始图像，失败视为无效输入
pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage> {
    let image = image::load_from_memory(bytes)
        .map_err(|e| SlicerError::InvalidImage(format!("无法解码图像: {e}")))?;

    if image.width() == 0 || image.height() == 0 {
        return Err(SlicerError::InvalidImage("图像尺寸为0".to_string()));
    }

    Ok(image)
}

/// 解码分片字节
pub fn decode_strip(bytes: &[u8]) -> Result<DynamicImage> {
    image::load_from_memory(bytes)
        .map_err(|e| SlicerError::DecodeFailure(format!("无法解码分片: {e}")))
}

/// 编码为 PNG（无损，分片在传输和存储中统一使用）
pub fn encode_png(image: &DynamicImage) -> Result<Vec<u8>> {
    encode_as(image, ImageFormat::Png)
}

/// 按输出格式编码合并结果
pub fn encode(image: &DynamicImage, format: OutputFormat) -> Result<Vec<u8>> {
    match format {
        OutputFormat::Png => encode_as(image, ImageFormat::Png),
        // JPEG 不支持透明通道
        OutputFormat::Jpeg => encode_as(&DynamicImage::ImageRgb8(image.to_rgb8()), ImageFormat::Jpeg),
    }
}

fn encode_as(image: &DynamicImage, format: ImageFormat) -> Result<Vec<u8>> {
    let mut buffer = Cursor::new(Vec::new());
    image
        .write_to(&mut buffer, format)
        .map_err(|e| SlicerError::Internal(format!("图像编码失败: {e}")))?;
    Ok(buffer.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn test_garbage_is_invalid_image() {
        let err = decode_image(b"definitely not an image").unwrap_err();
        assert!(matches!(err, SlicerError::InvalidImage(_)));
    }

    #[test]
    fn test_garbage_strip_is_decode_failure() {
        let err = decode_strip(&[0u8; 16]).unwrap_err();
        assert!(matches!(err, SlicerError::DecodeFailure(_)));
    }

    #[test]
    fn test_png_is_lossless() {
        let img = RgbImage::from_fn(7, 5, |x, y| Rgb([x as u8 * 30, y as u8 * 40, 99]));
        let bytes = encode_png(&DynamicImage::ImageRgb8(img.clone())).unwrap();
        assert_eq!(decode_strip(&bytes).unwrap().to_rgb8(), img);
    }

    #[test]
    fn test_jpeg_output_decodes() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(16, 16, Rgb([200, 10, 10])));
        let bytes = encode(&img, OutputFormat::Jpeg).unwrap();
        let decoded = decode_image(&bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (16, 16));
    }
}
