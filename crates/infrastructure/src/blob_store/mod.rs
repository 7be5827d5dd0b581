pub mod in_memory;
pub mod s3;

pub use in_memory::InMemoryBlobStore;
pub use s3::S3BlobStore;
