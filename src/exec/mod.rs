//! Concurrency primitives
//!
//! ## Responsibilities
//!
//! - Bounded parallel execution with per-slot result collection
//! - Token-bucket rate limiter for probe pacing
//! - Named file-lock mutex serializing session metrics writes

mod parallel;
mod rate_limiter;
mod session_lock;

pub use parallel::{run_bounded, TaskOutcome};
pub use rate_limiter::RateLimiter;
pub use session_lock::{LockGuard, SessionLock};
