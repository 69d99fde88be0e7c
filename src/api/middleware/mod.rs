//! API middleware stack.
//!
//! Execution order (outermost → innermost):
//! 1. Rate limiter on the unauthenticated auth routes
//! 2. Auth validator on everything else
//! 3. Audit logger, after auth so it knows the user

pub mod audit;
pub mod auth;
pub mod rate;
