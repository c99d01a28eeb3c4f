//! Side-effecting collaborators behind traits.
//!
//! Everything that touches the filesystem, spawns a process or talks to the
//! terminal lives here so orchestration can be driven by fakes in tests.

pub mod backend;
pub mod config;
pub mod confirm;
pub mod context;
pub mod diff;
pub mod files;
pub mod observer;
pub mod process;
pub mod prompt;
pub mod shell;
