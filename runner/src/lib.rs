//! Unattended maintenance runner for `snapraid-btrfs`.
//!
//! One invocation performs a single run: `touch → diff → sync → pool →
//! cleanup → scrub`, each step optional, with a delete-threshold gate after
//! diff. The crate keeps a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (diff counting, step policy,
//!   argument construction). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (config files, process execution,
//!   reports, notifications). Isolated behind traits for tests.
//!
//! [`pipeline`] coordinates the two to produce a [`core::types::RunOutcome`].

pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod pipeline;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
