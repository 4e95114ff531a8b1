//! End-to-end tests driving the gate's router over HTTP requests.
//!
//! Payments are simulated with the in-memory gateway, so the full
//! challenge → pay → access cycle runs without a Lightning node.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod harness;
mod integration_tests;

pub use harness::TestHarness;
