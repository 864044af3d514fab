//! Gantry Platform - clients for the remote execution platform
//!
//! Queue and Index traits with HTTP implementations and in-memory doubles,
//! bounded retry with backoff for calls that can legitimately stall, and the
//! relevance-predictor client with its timeout fallback.
//!
//! Fetch policy, applied uniformly: a 404 maps to an empty result
//! (`Ok(None)`), every other transport or status error propagates.

pub mod error;
pub mod index;
pub mod memory;
pub mod predictor;
pub mod queue;
pub mod retry;

pub use error::{PlatformError, Result};
pub use index::{HttpIndex, Index, IndexedTask};
pub use memory::{MemoryIndex, MemoryQueue, StaticPredictor};
pub use predictor::{HttpPredictor, RelevancePredictor};
pub use queue::{HttpQueue, Queue, RunState, TaskStatus};
pub use retry::RetryPolicy;
