//! # Driver lifecycle
//!
//! Two ways to hand browsers to parallel workers:
//!
//! - [`DriverManager`]: one dedicated driver per worker, capped process-wide
//!   by a permit pool. Creation fails fast when no permit is left.
//! - [`BrowserPool`]: a bounded set of reusable browsers. Checkout waits
//!   when the pool is exhausted, and returned browsers are reset.
//!
//! [`RunContext`] ties both to a run and closes everything at the end.

pub mod context;
pub mod manager;
pub mod pool;
pub mod worker;

#[cfg(test)]
mod tests;

pub use context::{RunContext, ShutdownSummary};
pub use manager::{DriverManager, SessionSettings};
pub use pool::{BrowserPool, PoolStats};
pub use worker::WorkerId;
