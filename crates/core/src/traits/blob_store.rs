use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use sha2::{Digest, Sha256};

use crate::Result;

/// 对象元数据中记录写入方任务ID的键
pub const OWNER_METADATA_KEY: &str = "job-id";

/// 对象存储中的对象
#[derive(Debug, Clone)]
pub struct BlobObject {
    pub bytes: Vec<u8>,
    pub content_type: String,
    /// base64 编码的 SHA-256 校验和
    pub checksum: Option<String>,
    /// 写入该对象的任务ID
    pub owner: Option<String>,
}

impl BlobObject {
    pub fn new(bytes: Vec<u8>, content_type: impl Into<String>) -> Self {
        Self {
            bytes,
            content_type: content_type.into(),
            checksum: None,
            owner: None,
        }
    }

    /// 记录写入方任务
    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    pub fn is_owned_by(&self, owner: &str) -> bool {
        self.owner.as_deref() == Some(owner)
    }

    /// 附带完整性校验和
    pub fn with_checksum(mut self) -> Self {
        self.checksum = Some(sha256_base64(&self.bytes));
        self
    }

    /// 校验内容与附带的校验和是否一致（未附带时视为通过）
    pub fn verify_checksum(&self) -> bool {
        match &self.checksum {
            Some(expected) => *expected == sha256_base64(&self.bytes),
            None => true,
        }
    }
}

pub fn sha256_base64(bytes: &[u8]) -> String {
    general_purpose::STANDARD.encode(Sha256::digest(bytes))
}

/// 对象存储抽象接口
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// 写入对象
    async fn put(&self, bucket: &str, key: &str, object: BlobObject) -> Result<()>;

    /// 读取对象及其元数据
    async fn get_object(&self, bucket: &str, key: &str) -> Result<BlobObject>;

    /// 读取对象内容
    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        Ok(self.get_object(bucket, key).await?.bytes)
    }

    /// 对象的外部引用（URL）
    fn object_url(&self, bucket: &str, key: &str) -> String;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_roundtrip() {
        let object = BlobObject::new(b"strip".to_vec(), "image/png").with_checksum();
        assert!(object.verify_checksum());

        let mut tampered = object.clone();
        tampered.bytes.push(0);
        assert!(!tampered.verify_checksum());
    }

    #[test]
    fn test_owner() {
        let object = BlobObject::new(vec![1], "image/png").with_owner("job-a");
        assert!(object.is_owned_by("job-a"));
        assert!(!object.is_owned_by("job-b"));
        assert!(!BlobObject::new(vec![1], "image/png").is_owned_by("job-a"));
    }

    #[test]
    fn test_no_checksum_passes() {
        assert!(BlobObject::new(vec![1, 2, 3], "image/png").verify_checksum());
    }
}
