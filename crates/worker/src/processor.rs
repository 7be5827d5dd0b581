use std::sync::Arc;

use tracing::{debug, instrument};

use slicer_core::{
    part_key,
    traits::{BlobObject, BlobStore},
    Operation, Result, SlicerError, TaskMessage,
};
use slicer_domain::process_strip;

use crate::retry::RetryPolicy;

/// 分片处理器：解析操作、变换分片并上传结果
///
/// 上传在有限次重试耗尽后返回 `UploadFailure`。错误是否值得重新投递
/// 由 [`SlicerError::is_permanent`] 判断。
pub struct StripProcessor {
    blob_store: Arc<dyn BlobStore>,
    bucket: String,
    upload_retry: RetryPolicy,
}

impl StripProcessor {
    pub fn new(
        blob_store: Arc<dyn BlobStore>,
        bucket: impl Into<String>,
        upload_retry: RetryPolicy,
    ) -> Self {
        Self {
            blob_store,
            bucket: bucket.into(),
            upload_retry,
        }
    }

    /// 处理一个分片任务，返回结果在对象存储中的键
    #[instrument(skip_all, fields(job_id = %task.job_id, part_num = task.part_num))]
    pub async fn process(&self, task: &TaskMessage) -> Result<String> {
        let operation: Operation = task.operation.parse()?;
        let strip = task.decode_part_data()?;

        let processed = tokio::task::spawn_blocking(move || process_strip(&strip, operation))
            .await
            .map_err(|e| SlicerError::Internal(format!("分片处理任务异常退出: {e}")))??;
        debug!("分片 {} 已完成 {} 变换", task.part_num, operation);

        let key = part_key(&task.filename, task.part_num);
        let object = BlobObject::new(processed, "image/png")
            .with_checksum()
            .with_owner(task.job_id.to_string());
        self.upload_retry
            .run("上传分片", || {
                let blob_store = self.blob_store.clone();
                let object = object.clone();
                let bucket = &self.bucket;
                let key = &key;
                async move { blob_store.put(bucket, key, object).await }
            })
            .await
            .map_err(|e| SlicerError::UploadFailure {
                key: key.clone(),
                message: e.to_string(),
            })?;

        Ok(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, Rgb, RgbImage};
    use slicer_core::{Job, StripLayout};
    use slicer_domain::codec::encode_png;
    use slicer_infrastructure::InMemoryBlobStore;
    use std::time::Duration;

    fn task(operation: &str, strip: &[u8]) -> TaskMessage {
        let job = Job::new("cat.png", operation, StripLayout::new(2, 2, 1).unwrap());
        TaskMessage::for_part(&job, 0, strip)
    }

    fn processor(store: &InMemoryBlobStore) -> StripProcessor {
        StripProcessor::new(
            Arc::new(store.clone()),
            "processed",
            RetryPolicy::new(2, Duration::from_millis(1)),
        )
    }

    #[tokio::test]
    async fn test_processed_strip_is_uploaded() {
        let strip = encode_png(&DynamicImage::ImageRgb8(RgbImage::from_pixel(
            2,
            2,
            Rgb([10, 20, 30]),
        )))
        .unwrap();
        let store = InMemoryBlobStore::new();
        let task = task("color_inversion", &strip);

        let key = processor(&store).process(&task).await.unwrap();
        assert_eq!(key, "cat.png_part_0");

        let uploaded = store.get("processed", &key).await.unwrap();
        let pixel = *image::load_from_memory(&uploaded)
            .unwrap()
            .to_rgb8()
            .get_pixel(1, 1);
        assert_eq!(pixel, Rgb([245, 235, 225]));
        assert_eq!(
            store.content_type("processed", &key).await.as_deref(),
            Some("image/png")
        );

        let stored = store.get_object("processed", &key).await.unwrap();
        assert!(stored.is_owned_by(&task.job_id.to_string()));
    }

    #[tokio::test]
    async fn test_unknown_operation_is_permanent() {
        let store = InMemoryBlobStore::new();
        let err = processor(&store)
            .process(&task("sepia", b"irrelevant"))
            .await
            .unwrap_err();
        assert!(matches!(err, SlicerError::UnknownOperation(_)));
        assert!(err.is_permanent());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_undecodable_strip_is_decode_failure() {
        let store = InMemoryBlobStore::new();
        let err = processor(&store)
            .process(&task("blur", b"not a png"))
            .await
            .unwrap_err();
        assert!(matches!(err, SlicerError::DecodeFailure(_)));
        assert!(store.is_empty().await);
    }
}
