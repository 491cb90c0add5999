//! Durable storage of send attempts and the history/stats read paths.

pub mod backends;
pub mod config;
pub mod error;
pub mod query;
pub mod store;

pub use backends::{FileLogStore, MemoryLogStore, TestLogStore};
pub use config::{LedgerConfig, MemoryConfig};
pub use error::{LedgerError, Result, SerializationError};
pub use query::{EmailStats, LogQuery, Page};
pub use store::LogStore;
