//! # Offline Mutation Handling
//!
//! Queuing and retry of local mutations made while the backend is
//! unreachable (or simply not yet confirmed).
//!
//! ## Key Components
//!
//! - `queue.rs`: the persistent pending-operation queue with coalescing
//! - `retry.rs`: the exponential backoff schedule for failed pushes
//!
//! The queue is owned by the auto-sync manager; application code never
//! touches it directly — mutations flow through the manager's data-layer
//! entry points, which pair the store write with the enqueue.

pub mod queue;
pub mod retry;

pub use queue::PendingQueue;
pub use retry::BackoffPolicy;
