//! Self-healing pipeline that turns local-model replies into project changes.
//!
//! A turn sends the request and a snapshot of the working directory to a
//! backend, recovers an action list from whatever text comes back, checks it
//! against the mode's policy, applies it, and, when shell commands fail,
//! runs a bounded repair loop. The architecture enforces a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (extraction, normalization, the
//!   repair state machine). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting collaborators (backend, shell, filesystem,
//!   terminal) behind traits so tests can substitute fakes.
//!
//! Orchestration modules ([`execute`], [`pipeline`], [`repair`], [`cli`])
//! coordinate core logic with I/O.

pub mod cli;
pub mod core;
pub mod execute;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod pipeline;
pub mod repair;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
