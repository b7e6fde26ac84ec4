//! Prefixer Core Library
//!
//! The installation orchestration engine:
//! - Runtime candidate detection and selection
//! - Readiness polling for asynchronous prefix initialization
//! - Supervised child processes with filtered logs and group termination
//! - Retrying component installation with durable checkpoints
//! - Product version detection cascade
//! - Post-install configuration writes
//! - The orchestrating state machine and its run summary
//!
//! The binary entry point is in `main.rs`.

pub mod cancel;
pub mod checkpoint;
pub mod configure;
pub mod exit_codes;
pub mod install;
pub mod logging;
pub mod orchestrator;
pub mod process;
pub mod readiness;
pub mod runtime;
pub mod session;
pub mod version;

// Re-export test utilities for integration tests
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
