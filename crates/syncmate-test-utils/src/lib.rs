#![deny(unsafe_code)]

//! Shared test utilities for the syncmate workspace.
//!
//! Provides reusable fixtures, config builders, a scripted request executor,
//! a loopback fake daemon, and tracing helpers so that individual crate
//! tests stay concise and consistent.
//!
//! Add this crate as a `[dev-dependency]` in any workspace member:
//!
//! ```toml
//! [dev-dependencies]
//! syncmate-test-utils = { workspace = true }
//! ```

pub mod config;
pub mod executor;
pub mod fake_daemon;
pub mod fixtures;
pub mod tracing_setup;
