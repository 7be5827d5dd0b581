use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::{error::DisplayErrorContext, primitives::ByteStream, Client};
use slicer_core::{
    config::StorageConfig,
    traits::{BlobObject, BlobStore, OWNER_METADATA_KEY},
    Result, SlicerError,
};
use tracing::{debug, info};

/// S3 兼容对象存储
pub struct S3BlobStore {
    client: Client,
    endpoint_url: Option<String>,
}

impl S3BlobStore {
    /// 使用默认凭证链创建客户端
    pub async fn new(config: &StorageConfig) -> Result<Self> {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = &config.region {
            loader = loader.region(Region::new(region.clone()));
        }
        let shared = loader.load().await;

        let mut builder = aws_sdk_s3::config::Builder::from(&shared);
        if let Some(endpoint) = &config.endpoint_url {
            // 自定义端点（MinIO 等）使用路径风格寻址
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        info!(
            "初始化S3对象存储: region={:?}, endpoint={:?}",
            config.region, config.endpoint_url
        );

        Ok(Self {
            client: Client::from_conf(builder.build()),
            endpoint_url: config.endpoint_url.clone(),
        })
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn put(&self, bucket: &str, key: &str, object: BlobObject) -> Result<()> {
        let size = object.bytes.len();
        let mut request = self
            .client
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_type(object.content_type)
            .body(ByteStream::from(object.bytes));

        if let Some(checksum) = object.checksum {
            request = request.checksum_sha256(checksum);
        }
        if let Some(owner) = object.owner {
            request = request.metadata(OWNER_METADATA_KEY, owner);
        }

        request.send().await.map_err(|e| SlicerError::Storage(format!(
            "上传对象 {bucket}/{key} 失败: {}",
            DisplayErrorContext(&e)
        )))?;

        debug!("已上传对象 {}/{} ({} 字节)", bucket, key, size);
        Ok(())
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<BlobObject> {
        let output = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| SlicerError::Storage(format!(
                "下载对象 {bucket}/{key} 失败: {}",
                DisplayErrorContext(&e)
            )))?;

        let content_type = output
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let owner = output
            .metadata()
            .and_then(|metadata| metadata.get(OWNER_METADATA_KEY))
            .cloned();

        let bytes = output
            .body
            .collect()
            .await
            .map_err(|e| SlicerError::Storage(format!("读取对象 {bucket}/{key} 内容失败: {e}")))?
            .into_bytes();

        let mut object = BlobObject::new(bytes.to_vec(), content_type);
        object.owner = owner;
        Ok(object)
    }

    fn object_url(&self, bucket: &str, key: &str) -> String {
        match &self.endpoint_url {
            Some(endpoint) => format!("{}/{bucket}/{key}", endpoint.trim_end_matches('/')),
            None => format!("https://{bucket}.s3.amazonaws.com/{key}"),
        }
    }
}
