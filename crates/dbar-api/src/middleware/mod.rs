//! # Middleware
//!
//! Request-scoped layers applied in the router.

pub mod metrics;
