pub mod cache_aside;
pub mod gateway;
pub mod memory_cache;
pub mod redis_cache;
