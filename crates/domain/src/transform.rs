//! 分片变换
//!
//! 每种 [`Operation`] 都是确定性的纯函数：同一分片字节经同一操作两次，
//! 输出字节完全相同。输入统一先转换为 8 位 RGB。

use image::{DynamicImage, GrayImage, Luma, Rgb, RgbImage};
use slicer_core::{Operation, Result};

use crate::codec::{decode_strip, encode_png};

const EDGE_LOW_THRESHOLD: i32 = 100;
const EDGE_HIGH_THRESHOLD: i32 = 200;

/// 与 15x15 高斯核等效的标准差
const BLUR_SIGMA: f32 = 2.6;

const SHARPEN_KERNEL: [f32; 9] = [0.0, -1.0, 0.0, -1.0, 5.0, -1.0, 0.0, -1.0, 0.0];

const BRIGHTNESS_ALPHA: f32 = 1.1;
const BRIGHTNESS_BETA: f32 = 30.0;

/// 解码分片、执行变换并重新编码为 PNG
pub fn process_strip(bytes: &[u8], operation: Operation) -> Result<Vec<u8>> {
    let strip = decode_strip(bytes)?.to_rgb8();
    encode_png(&apply(operation, strip))
}

/// 对 RGB 图像执行变换
pub fn apply(operation: Operation, image: RgbImage) -> DynamicImage {
    match operation {
        Operation::EdgeDetection => DynamicImage::ImageLuma8(edge_detection(&image)),
        Operation::ColorInversion => {
            let mut image = DynamicImage::ImageRgb8(image);
            image.invert();
            image
        }
        Operation::Grayscale => DynamicImage::ImageLuma8(DynamicImage::ImageRgb8(image).to_luma8()),
        Operation::Blur => DynamicImage::ImageRgb8(image).blur(BLUR_SIGMA),
        Operation::Sharpen => DynamicImage::ImageRgb8(image).filter3x3(&SHARPEN_KERNEL),
        Operation::BrightnessIncrease => DynamicImage::ImageRgb8(brightness_increase(image)),
        Operation::ContrastIncrease => DynamicImage::ImageRgb8(equalize_luma(image)),
    }
}

/// Sobel 梯度 + 双阈值
///
/// 梯度幅值取 `|gx| + |gy|`。幅值不低于高阈值的像素为强边缘；
/// 介于两阈值之间的弱边缘仅当 8 邻域内存在强边缘时保留。
fn edge_detection(image: &RgbImage) -> GrayImage {
    let gray = DynamicImage::ImageRgb8(image.clone()).to_luma8();
    let (width, height) = gray.dimensions();

    let at = |x: i64, y: i64| -> i32 {
        let x = x.clamp(0, i64::from(width) - 1) as u32;
        let y = y.clamp(0, i64::from(height) - 1) as u32;
        i32::from(gray.get_pixel(x, y)[0])
    };

    let magnitude: Vec<i32> = (0..height)
        .flat_map(|y| (0..width).map(move |x| (i64::from(x), i64::from(y))))
        .map(|(x, y)| {
            let gx = at(x + 1, y - 1) + 2 * at(x + 1, y) + at(x + 1, y + 1)
                - at(x - 1, y - 1)
                - 2 * at(x - 1, y)
                - at(x - 1, y + 1);
            let gy = at(x - 1, y + 1) + 2 * at(x, y + 1) + at(x + 1, y + 1)
                - at(x - 1, y - 1)
                - 2 * at(x, y - 1)
                - at(x + 1, y - 1);
            gx.abs() + gy.abs()
        })
        .collect();

    let strong = |x: i64, y: i64| -> bool {
        x >= 0
            && y >= 0
            && x < i64::from(width)
            && y < i64::from(height)
            && magnitude[(y * i64::from(width) + x) as usize] >= EDGE_HIGH_THRESHOLD
    };

    GrayImage::from_fn(width, height, |x, y| {
        let (x, y) = (i64::from(x), i64::from(y));
        let value = magnitude[(y * i64::from(width) + x) as usize];

        let is_edge = if value >= EDGE_HIGH_THRESHOLD {
            true
        } else if value >= EDGE_LOW_THRESHOLD {
            (-1..=1).any(|dy| (-1..=1).any(|dx| (dx, dy) != (0, 0) && strong(x + dx, y + dy)))
        } else {
            false
        };

        Luma([if is_edge { 255 } else { 0 }])
    })
}

fn brightness_increase(mut image: RgbImage) -> RgbImage {
    for pixel in image.pixels_mut() {
        for channel in pixel.0.iter_mut() {
            *channel = saturate(f32::from(*channel) * BRIGHTNESS_ALPHA + BRIGHTNESS_BETA);
        }
    }
    image
}

/// 在 YCbCr 空间对亮度通道做直方图均衡，色度保持不变
fn equalize_luma(image: RgbImage) -> RgbImage {
    let ycbcr: Vec<[f32; 3]> = image.pixels().map(|p| rgb_to_ycbcr(p.0)).collect();

    let mut histogram = [0u64; 256];
    for [y, _, _] in &ycbcr {
        histogram[saturate(*y) as usize] += 1;
    }

    let lut = equalization_lut(&histogram);

    let (width, _) = image.dimensions();
    RgbImage::from_fn(image.width(), image.height(), |x, y| {
        let [luma, cb, cr] = ycbcr[(y * width + x) as usize];
        let equalized = f32::from(lut[saturate(luma) as usize]);
        Rgb(ycbcr_to_rgb([equalized, cb, cr]))
    })
}

fn equalization_lut(histogram: &[u64; 256]) -> [u8; 256] {
    let total: u64 = histogram.iter().sum();
    let cdf_min = histogram.iter().copied().find(|&count| count > 0).unwrap_or(0);

    let mut lut = [0u8; 256];
    if total == cdf_min {
        // 单一亮度值，均衡无意义
        for (value, entry) in lut.iter_mut().enumerate() {
            *entry = value as u8;
        }
        return lut;
    }

    let mut cdf = 0u64;
    for (value, count) in histogram.iter().enumerate() {
        cdf += count;
        let scaled = (cdf.saturating_sub(cdf_min)) as f64 * 255.0 / (total - cdf_min) as f64;
        lut[value] = scaled.round().clamp(0.0, 255.0) as u8;
    }
    lut
}

fn rgb_to_ycbcr([r, g, b]: [u8; 3]) -> [f32; 3] {
    let (r, g, b) = (f32::from(r), f32::from(g), f32::from(b));
    let y = 0.299 * r + 0.587 * g + 0.114 * b;
    let cb = 128.0 - 0.168_736 * r - 0.331_264 * g + 0.5 * b;
    let cr = 128.0 + 0.5 * r - 0.418_688 * g - 0.081_312 * b;
    [y, cb, cr]
}

fn ycbcr_to_rgb([y, cb, cr]: [f32; 3]) -> [u8; 3] {
    let r = y + 1.402 * (cr - 128.0);
    let g = y - 0.344_136 * (cb - 128.0) - 0.714_136 * (cr - 128.0);
    let b = y + 1.772 * (cb - 128.0);
    [saturate(r), saturate(g), saturate(b)]
}

fn saturate(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x * 17 % 256) as u8, (y * 29 % 256) as u8, ((x + y) * 7 % 256) as u8])
        })
    }

    fn strip_bytes(image: RgbImage) -> Vec<u8> {
        encode_png(&DynamicImage::ImageRgb8(image)).unwrap()
    }

    #[test]
    fn test_color_inversion() {
        let image = RgbImage::from_pixel(3, 2, Rgb([10, 20, 30]));
        let out = apply(Operation::ColorInversion, image).to_rgb8();
        assert!(out.pixels().all(|p| p.0 == [245, 235, 225]));
    }

    #[test]
    fn test_brightness_saturates() {
        let image = RgbImage::from_pixel(1, 1, Rgb([0, 100, 250]));
        let out = apply(Operation::BrightnessIncrease, image).to_rgb8();
        assert_eq!(out.get_pixel(0, 0).0, [30, 140, 255]);
    }

    #[test]
    fn test_grayscale_is_single_channel() {
        let out = apply(Operation::Grayscale, gradient(8, 4));
        assert!(matches!(out, DynamicImage::ImageLuma8(_)));
        assert_eq!((out.width(), out.height()), (8, 4));
    }

    #[test]
    fn test_edge_detection_finds_step() {
        // 左黑右白，边界在第4列与第5列之间
        let image = RgbImage::from_fn(10, 6, |x, _| {
            if x < 5 {
                Rgb([0, 0, 0])
            } else {
                Rgb([255, 255, 255])
            }
        });
        let edges = edge_detection(&image);
        assert_eq!(edges.get_pixel(4, 3)[0], 255);
        assert_eq!(edges.get_pixel(5, 3)[0], 255);
        assert_eq!(edges.get_pixel(0, 3)[0], 0);
        assert_eq!(edges.get_pixel(9, 3)[0], 0);
    }

    #[test]
    fn test_edge_detection_flat_image_is_empty() {
        let edges = edge_detection(&RgbImage::from_pixel(5, 5, Rgb([128, 128, 128])));
        assert!(edges.pixels().all(|p| p[0] == 0));
    }

    #[test]
    fn test_contrast_flat_image_unchanged() {
        let image = RgbImage::from_pixel(4, 4, Rgb([90, 90, 90]));
        let out = apply(Operation::ContrastIncrease, image.clone()).to_rgb8();
        assert_eq!(out, image);
    }

    #[test]
    fn test_contrast_stretches_luma() {
        let image = RgbImage::from_fn(4, 1, |x, _| {
            let v = 100 + x as u8 * 10;
            Rgb([v, v, v])
        });
        let out = apply(Operation::ContrastIncrease, image).to_rgb8();
        assert_eq!(out.get_pixel(0, 0).0, [0, 0, 0]);
        assert_eq!(out.get_pixel(3, 0).0, [255, 255, 255]);
    }

    #[test]
    fn test_every_operation_preserves_dimensions() {
        for op in Operation::ALL {
            let out = apply(op, gradient(9, 7));
            assert_eq!((out.width(), out.height()), (9, 7), "{op}");
        }
    }

    #[test]
    fn test_process_strip_is_deterministic() {
        let bytes = strip_bytes(gradient(32, 12));
        for op in Operation::ALL {
            let first = process_strip(&bytes, op).unwrap();
            let second = process_strip(&bytes, op).unwrap();
            assert_eq!(first, second, "{op}");
        }
    }

    #[test]
    fn test_process_strip_rejects_garbage() {
        assert!(process_strip(b"nope", Operation::Blur).is_err());
    }
}
