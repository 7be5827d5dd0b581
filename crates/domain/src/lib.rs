//! 图像领域逻辑
//!
//! 纯函数实现的分片、变换与拼接，不涉及任何 I/O。

pub mod canvas;
pub mod codec;
pub mod partitioner;
pub mod transform;

pub use canvas::Canvas;
pub use partitioner::{Partition, Partitioner};
pub use transform::{apply, process_strip};
