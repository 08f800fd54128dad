//! Persistence layer — job records over a fast key/value backend with a
//! mandatory file-based floor.

pub mod files;
pub mod jobs;
pub mod kv;
pub mod memory;
pub mod redis_backend;

pub use files::FileJobStore;
pub use jobs::JobStore;
pub use kv::KvBackend;
pub use memory::MemoryKv;
pub use redis_backend::RedisKv;
