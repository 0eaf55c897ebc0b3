//! Turnstile - Per-Key Request Admission Control
//!
//! This crate decides, for each client IP address or API token, whether a
//! request may proceed. Every key gets a fixed 1-second counting window and
//! is temporarily blocked once it exceeds its limit. State lives either in
//! process memory or in Redis.

pub mod config;
pub mod error;
pub mod http;
pub mod ratelimit;
pub mod storage;
