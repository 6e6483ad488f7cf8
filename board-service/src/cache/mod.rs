//! Cache-backed helpers for the read path.

pub mod view_dedup;

pub use view_dedup::{view_key, MemoryViewDedup, RedisViewDedup, ViewDedup};
