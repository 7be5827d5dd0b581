use image::{imageops, DynamicImage, RgbImage};
use slicer_core::{config::OutputFormat, Result, SlicerError, StripLayout};

use crate::codec::{decode_strip, encode};

/// 合并画布
///
/// 画布尺寸与原图一致，各条带按索引放置在 `row_offset(index)` 处。
/// 单通道条带在放置时转换为 RGB。
#[derive(Debug)]
pub struct Canvas {
    layout: StripLayout,
    image: RgbImage,
    placed: Vec<bool>,
}

impl Canvas {
    pub fn new(layout: StripLayout) -> Self {
        Self {
            layout,
            image: RgbImage::new(layout.width, layout.height),
            placed: vec![false; layout.num_parts as usize],
        }
    }

    /// 放置一个已编码的条带
    ///
    /// 条带无法解码或尺寸与布局不符时返回 `PartMissing`。
    pub fn place(&mut self, index: u32, strip: &[u8]) -> Result<()> {
        if !self.layout.contains_index(index) {
            return Err(SlicerError::PartMissing {
                index,
                reason: format!("索引超出范围 (共 {} 个分片)", self.layout.num_parts),
            });
        }

        let decoded = decode_strip(strip).map_err(|e| SlicerError::PartMissing {
            index,
            reason: e.to_string(),
        })?;

        let expected = (self.layout.width, self.layout.strip_height(index));
        if (decoded.width(), decoded.height()) != expected {
            return Err(SlicerError::PartMissing {
                index,
                reason: format!(
                    "分片尺寸 {}x{} 与预期 {}x{} 不符",
                    decoded.width(),
                    decoded.height(),
                    expected.0,
                    expected.1
                ),
            });
        }

        imageops::replace(
            &mut self.image,
            &decoded.to_rgb8(),
            0,
            i64::from(self.layout.row_offset(index)),
        );
        self.placed[index as usize] = true;
        Ok(())
    }

    pub fn is_complete(&self) -> bool {
        self.placed.iter().all(|placed| *placed)
    }

    pub fn into_image(self) -> RgbImage {
        self.image
    }

    /// 编码为最终产物；存在未放置的条带时返回 `PartMissing`
    pub fn encode(self, format: OutputFormat) -> Result<Vec<u8>> {
        if let Some(index) = self.placed.iter().position(|placed| !placed) {
            return Err(SlicerError::PartMissing {
                index: index as u32,
                reason: "分片未放置".to_string(),
            });
        }
        encode(&DynamicImage::ImageRgb8(self.image), format)
    }
}
