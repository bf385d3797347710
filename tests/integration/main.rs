//! Integration test binary: every scenario links into one binary.
//!
//! See the matklad pattern: <https://matklad.github.io/2021/02/27/delete-cargo-integration-tests.html>

// Allow unwrap/expect in test code
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod helpers;

mod alert_lifecycle;
mod delivery;
mod persistence;
mod unknown_signals;
