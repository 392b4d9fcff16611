//! Long-term memory: storage, scoring, retrieval, and maintenance.

pub mod compaction;
pub mod engine;
pub mod maintenance;
pub mod retention;
pub mod retrieval;
pub mod scoring;
pub mod store;
pub mod types;

pub use engine::MemoryEngine;
pub use store::MemoryStore;
pub use types::{Memory, MemoryType, MemoryView, RetrievedMemory};
