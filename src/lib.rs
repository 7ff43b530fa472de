//! Agora - photo compression and action rate limiting for a community forum.
//!
//! This crate holds the two pieces of the forum backend that do more than
//! issue database calls: the photo pipeline that shrinks uploads into a
//! bounded main image plus a thumbnail, and the process-local sliding-window
//! rate limiter that guards posting, reporting and search.

pub mod config;
pub mod error;
pub mod photo;
pub mod quota;
pub mod ratelimit;
