use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, instrument};

use slicer_core::{
    config::OutputFormat,
    traits::{BlobObject, BlobStore},
    Job, Result, SlicerError,
};
use slicer_domain::Canvas;

/// 合并器：按索引顺序取回全部分片并拼接为最终产物
///
/// 任一分片取回、解码失败或由其他任务写入都会返回 `PartMissing`，
/// 不会产出部分拼接的结果。
pub struct Merger {
    blob_store: Arc<dyn BlobStore>,
    bucket: String,
    output_format: OutputFormat,
}

impl Merger {
    pub fn new(
        blob_store: Arc<dyn BlobStore>,
        bucket: impl Into<String>,
        output_format: OutputFormat,
    ) -> Self {
        Self {
            blob_store,
            bucket: bucket.into(),
            output_format,
        }
    }

    /// 合并并上传，返回产物引用
    #[instrument(skip_all, fields(job_id = %job.id))]
    pub async fn merge(&self, job: &Job) -> Result<String> {
        let started = Instant::now();

        let owner = job.id.to_string();
        let mut strips = Vec::with_capacity(job.num_parts() as usize);
        for index in job.layout.indices() {
            let object = self
                .blob_store
                .get_object(&self.bucket, &job.part_key(index))
                .await
                .map_err(|e| SlicerError::PartMissing {
                    index,
                    reason: e.to_string(),
                })?;
            // 同名文件的旧任务可能仍有 Worker 在写同一个键
            if !object.is_owned_by(&owner) {
                return Err(SlicerError::PartMissing {
                    index,
                    reason: format!(
                        "分片由任务 {} 写入",
                        object.owner.as_deref().unwrap_or("<未知>")
                    ),
                });
            }
            strips.push(object.bytes);
        }
        debug!("已取回 {} 个分片", strips.len());

        let layout = job.layout;
        let format = self.output_format;
        let encoded = tokio::task::spawn_blocking(move || -> Result<Vec<u8>> {
            let mut canvas = Canvas::new(layout);
            for (index, strip) in strips.iter().enumerate() {
                canvas.place(index as u32, strip)?;
            }
            canvas.encode(format)
        })
        .await
        .map_err(|e| SlicerError::Internal(format!("合并任务异常退出: {e}")))??;

        let key = job.artifact_key();
        self.blob_store
            .put(
                &self.bucket,
                &key,
                BlobObject::new(encoded, format.content_type()).with_checksum(),
            )
            .await
            .map_err(|e| SlicerError::UploadFailure {
                key: key.clone(),
                message: e.to_string(),
            })?;

        metrics::histogram!("slicer_merge_duration_seconds").record(started.elapsed().as_secs_f64());
        Ok(self.blob_store.object_url(&self.bucket, &key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, Rgb, RgbImage};
    use slicer_core::StripLayout;
    use slicer_domain::{codec::encode_png, Partitioner};
    use slicer_infrastructure::InMemoryBlobStore;

    async fn store_strips(store: &InMemoryBlobStore, job: &Job, strips: &[Vec<u8>]) {
        for (index, strip) in strips.iter().enumerate() {
            store
                .put(
                    "processed",
                    &job.part_key(index as u32),
                    BlobObject::new(strip.clone(), "image/png").with_owner(job.id.to_string()),
                )
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_merge_reassembles_in_index_order() {
        let original = RgbImage::from_fn(12, 10, |x, y| Rgb([x as u8 * 20, y as u8 * 25, 7]));
        let bytes = encode_png(&DynamicImage::ImageRgb8(original.clone())).unwrap();
        let partition = Partitioner::new().split(&bytes, 3).unwrap();

        let store = InMemoryBlobStore::new();
        let job = Job::new("cat.png", "blur", partition.layout);
        // 逆序写入，合并结果不依赖到达顺序
        let mut reversed = partition.strips.clone();
        reversed.reverse();
        for (offset, strip) in reversed.iter().enumerate() {
            let index = partition.strips.len() - 1 - offset;
            store
                .put(
                    "processed",
                    &job.part_key(index as u32),
                    BlobObject::new(strip.clone(), "image/png").with_owner(job.id.to_string()),
                )
                .await
                .unwrap();
        }

        let merger = Merger::new(Arc::new(store.clone()), "processed", OutputFormat::Png);
        let url = merger.merge(&job).await.unwrap();
        assert_eq!(url, "memory://processed/processed_cat.png");

        let merged = store.get("processed", "processed_cat.png").await.unwrap();
        let merged = image::load_from_memory(&merged).unwrap().to_rgb8();
        assert_eq!(merged, original);
    }

    #[tokio::test]
    async fn test_missing_strip_fails_without_artifact() {
        let partition_layout = StripLayout::new(4, 8, 2).unwrap();
        let job = Job::new("dog.png", "blur", partition_layout);
        let strip = encode_png(&DynamicImage::ImageRgb8(RgbImage::new(4, 4))).unwrap();

        let store = InMemoryBlobStore::new();
        store_strips(&store, &job, &[strip]).await;

        let merger = Merger::new(Arc::new(store.clone()), "processed", OutputFormat::Jpeg);
        let err = merger.merge(&job).await.unwrap_err();
        assert!(matches!(err, SlicerError::PartMissing { index: 1, .. }));
        assert!(!store.contains("processed", "processed_dog.png").await);
    }

    #[tokio::test]
    async fn test_corrupt_strip_fails() {
        let job = Job::new("dog.png", "blur", StripLayout::new(4, 8, 2).unwrap());
        let good = encode_png(&DynamicImage::ImageRgb8(RgbImage::new(4, 4))).unwrap();

        let store = InMemoryBlobStore::new();
        store_strips(&store, &job, &[good, b"garbage".to_vec()]).await;

        let merger = Merger::new(Arc::new(store.clone()), "processed", OutputFormat::Jpeg);
        let err = merger.merge(&job).await.unwrap_err();
        assert!(matches!(err, SlicerError::PartMissing { index: 1, .. }));
        assert!(!store.contains("processed", "processed_dog.png").await);
    }

    #[tokio::test]
    async fn test_strip_from_earlier_job_is_rejected() {
        let layout = StripLayout::new(4, 8, 2).unwrap();
        let earlier = Job::new("cat.png", "color_inversion", layout);
        let current = Job::new("cat.png", "grayscale", layout);
        let strip = encode_png(&DynamicImage::ImageRgb8(RgbImage::new(4, 4))).unwrap();

        let store = InMemoryBlobStore::new();
        store_strips(&store, &current, &[strip.clone(), strip.clone()]).await;
        // 旧任务迟到的 Worker 覆盖了同名分片
        store
            .put(
                "processed",
                &earlier.part_key(1),
                BlobObject::new(strip, "image/png").with_owner(earlier.id.to_string()),
            )
            .await
            .unwrap();

        let merger = Merger::new(Arc::new(store.clone()), "processed", OutputFormat::Png);
        let err = merger.merge(&current).await.unwrap_err();
        match err {
            SlicerError::PartMissing { index, reason } => {
                assert_eq!(index, 1);
                assert!(reason.contains(&earlier.id.to_string()));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(!store.contains("processed", "processed_cat.png").await);
    }
}
