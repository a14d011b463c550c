//! # Element wrappers
//!
//! Bounded-retry execution for element actions and reads. Each attempt runs
//! against a freshly resolved handle; failures discard the handle, sleep the
//! configured delay and try again, up to `max_retries` attempts in total.
//! Exhaustion surfaces as a single [`Error::ActionFailed`](crate::Error::ActionFailed)
//! carrying the last cause, the attempt count and the elapsed time.
//!
//! Mutating actions are reported to the step reporter whether or not they
//! succeed.

pub mod wrapper;
pub mod list;
pub mod scripts;


pub use wrapper::{Element, ElementScope};
pub use list::ElementList;
