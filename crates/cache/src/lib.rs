//! Cache store implementations for askwise.

pub mod noop;
pub mod in_memory;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use noop::NoopCache;
pub use in_memory::InMemoryCache;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteCache;
