//! Runtime primitives
//!
//! - `deadline`: monotonic deadlines and cooperative cancellation tokens
//! - `pool`: the process-wide discovery worker pool

pub mod deadline;
pub mod pool;

pub use deadline::{CancelToken, Interruption, RunContext};
pub use pool::{Job, PoolError, WorkerPool, DEFAULT_QUEUE_CAPACITY};
