//! Integration test crate for the OEF negotiation core.
//!
//! This crate exists solely to run integration tests that span multiple OEF crates.
//! It has no public API - all functionality is in the test modules.

#![forbid(unsafe_code)]
