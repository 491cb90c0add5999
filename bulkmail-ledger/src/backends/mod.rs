//! Log store implementations:
//! - `file`: one file per attempt, for production
//! - `memory`: in-process map, for development
//! - `test`: memory store with injectable write failures

pub mod file;
pub mod memory;

pub use file::FileLogStore;
pub use memory::MemoryLogStore;
pub use test::TestLogStore;
