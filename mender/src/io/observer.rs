//! Sinks for user-visible pipeline output.

use std::io::Write;

/// Receives everything the pipeline shows the user while it works.
///
/// `diagnostic` carries progress detail (todo lists, diffs, command output,
/// repair banners); `message` carries model messages addressed to the user.
pub trait Observer {
    fn diagnostic(&self, text: &str);
    fn message(&self, text: &str);
}

/// Diagnostics to stderr, messages to stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleObserver;

impl Observer for ConsoleObserver {
    fn diagnostic(&self, text: &str) {
        let mut err = std::io::stderr().lock();
        let _ = writeln!(err, "{text}");
    }

    fn message(&self, text: &str) {
        let mut out = std::io::stdout().lock();
        let _ = writeln!(out, "{text}");
    }
}
