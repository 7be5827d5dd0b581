pub mod blob_store;
pub mod message_queue;

pub use blob_store::*;
pub use message_queue::*;
