use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::SlicerError;

/// 图像变换操作（封闭集合）
///
/// 消息中的操作名是字符串，Worker 通过 [`FromStr`] 解析，
/// 未知名称得到 `UnknownOperation` 错误而不是被静默忽略。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    EdgeDetection,
    ColorInversion,
    Grayscale,
    Blur,
    Sharpen,
    BrightnessIncrease,
    ContrastIncrease,
}

impl Operation {
    pub const ALL: [Operation; 7] = [
        Operation::EdgeDetection,
        Operation::ColorInversion,
        Operation::Grayscale,
        Operation::Blur,
        Operation::Sharpen,
        Operation::BrightnessIncrease,
        Operation::ContrastIncrease,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::EdgeDetection => "edge_detection",
            Operation::ColorInversion => "color_inversion",
            Operation::Grayscale => "grayscale",
            Operation::Blur => "blur",
            Operation::Sharpen => "sharpen",
            Operation::BrightnessIncrease => "brightness_increase",
            Operation::ContrastIncrease => "contrast_increase",
        }
    }
}

impl FromStr for Operation {
    type Err = SlicerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Operation::ALL
            .into_iter()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| SlicerError::UnknownOperation(s.to_string()))
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_operations() {
        for op in Operation::ALL {
            assert_eq!(op.as_str().parse::<Operation>().unwrap(), op);
        }
    }

    #[test]
    fn test_parse_unknown_operation() {
        let err = "sharpening".parse::<Operation>().unwrap_err();
        assert!(matches!(err, SlicerError::UnknownOperation(name) if name == "sharpening"));
    }

    #[test]
    fn test_serde_names_match_wire_names() {
        let json = serde_json::to_string(&Operation::BrightnessIncrease).unwrap();
        assert_eq!(json, "\"brightness_increase\"");
    }
}
