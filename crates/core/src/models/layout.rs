use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::{Result, SlicerError};

/// 分片布局：描述一张图像如何按行切分为水平条带
///
/// `part_height = height / num_parts`，最后一个条带吸收余数，
/// 因此所有条带高度之和恰好等于图像高度。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StripLayout {
    pub width: u32,
    pub height: u32,
    pub num_parts: u32,
    pub part_height: u32,
}

impl StripLayout {
    /// 根据图像尺寸和分片数量计算布局
    ///
    /// `num_parts <= 0` 或 `num_parts > height` 时返回 `InvalidPartCount`。
    pub fn new(width: u32, height: u32, num_parts: i64) -> Result<Self> {
        if num_parts <= 0 || num_parts > i64::from(height) {
            return Err(SlicerError::InvalidPartCount { num_parts, height });
        }
        let num_parts = num_parts as u32;

        Ok(Self {
            width,
            height,
            num_parts,
            part_height: height / num_parts,
        })
    }

    /// 第 `index` 个条带覆盖的行范围
    pub fn rows(&self, index: u32) -> Range<u32> {
        let start = index * self.part_height;
        let end = if index + 1 == self.num_parts {
            self.height
        } else {
            (index + 1) * self.part_height
        };
        start..end
    }

    /// 第 `index` 个条带的高度
    pub fn strip_height(&self, index: u32) -> u32 {
        let rows = self.rows(index);
        rows.end - rows.start
    }

    /// 条带在画布中的起始行
    pub fn row_offset(&self, index: u32) -> u32 {
        index * self.part_height
    }

    /// 全部分片索引 `0..num_parts`
    pub fn indices(&self) -> Range<u32> {
        0..self.num_parts
    }

    pub fn contains_index(&self, index: u32) -> bool {
        index < self.num_parts
    }
}
