use image::{imageops, DynamicImage};
use slicer_core::{Result, StripLayout};
use tracing::debug;

use crate::codec::{decode_image, encode_png};

/// 分片结果，`strips[i]` 为第 `i` 个分片的 PNG 字节
#[derive(Debug, Clone)]
pub struct Partition {
    pub layout: StripLayout,
    pub strips: Vec<Vec<u8>>,
}

/// 沿高度方向把图像切分为水平条带
#[derive(Debug, Default, Clone, Copy)]
pub struct Partitioner;

impl Partitioner {
    pub fn new() -> Self {
        Self
    }

    /// 解码原始字节并切分
    ///
    /// 前 `num_parts - 1` 个条带高度为 `floor(height / num_parts)`，
    /// 最后一个条带吸收余数。`num_parts` 不在 `[1, height]` 内时返回
    /// `InvalidPartCount`。
    pub fn split(&self, bytes: &[u8], num_parts: i64) -> Result<Partition> {
        let image = decode_image(bytes)?;
        self.split_image(&image, num_parts)
    }

    pub fn split_image(&self, image: &DynamicImage, num_parts: i64) -> Result<Partition> {
        let rgb = image.to_rgb8();
        let layout = StripLayout::new(rgb.width(), rgb.height(), num_parts)?;

        let strips = layout
            .indices()
            .map(|index| {
                let strip = imageops::crop_imm(
                    &rgb,
                    0,
                    layout.row_offset(index),
                    layout.width,
                    layout.strip_height(index),
                )
                .to_image();
                encode_png(&DynamicImage::ImageRgb8(strip))
            })
            .collect::<Result<Vec<_>>>()?;

        debug!(
            "图像 {}x{} 已切分为 {} 个分片",
            layout.width, layout.height, layout.num_parts
        );

        Ok(Partition { layout, strips })
    }
}
