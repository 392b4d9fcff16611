//! Mnemo: the long-term memory engine behind a personal AI companion.
//!
//! Conversational turns produce candidate facts; this crate turns them
//! into durable, semantically searchable memories, ranks them for
//! retrieval, merges near-duplicates, and forgets what stopped being
//! useful. The chat flow, speech services, and UI are external
//! collaborators; they consume this crate as a library.
//!
//! Entry point is [`memory::MemoryEngine`]; background upkeep runs via
//! [`memory::maintenance::MaintenanceScheduler`].

pub mod config;
pub mod error;
pub mod llm;
pub mod memory;

pub use error::{Error, Result};

use std::sync::Arc;

/// Owner identifier type. Every operation is scoped to exactly one
/// owner; queries never span owners.
pub type OwnerId = Arc<str>;

/// Memory identifier type (uuid v4, stored as its string form).
pub type MemoryId = String;
