//! Commands the shell collaborator refuses to run.

/// Destructive command prefixes, matched case-insensitively.
pub const BLOCKED_PREFIXES: &[&str] = &[
    "rm -rf",
    "rm -r",
    "rm -fr",
    "mkfs",
    "dd ",
    "format",
    "shutdown",
    "reboot",
    "halt",
    "poweroff",
    "del /",
];

const ELEVATION_PREFIXES: &[&str] = &["sudo ", "doas "];

/// Return the deny-list entry a command starts with, if any.
///
/// A leading `sudo` or `doas` is looked through before matching.
pub fn blocked_prefix(command: &str) -> Option<&'static str> {
    let lowered = command.trim().to_ascii_lowercase();
    let mut rest = lowered.as_str();
    while let Some(stripped) = ELEVATION_PREFIXES
        .iter()
        .find_map(|prefix| rest.strip_prefix(prefix))
    {
        rest = stripped.trim_start();
    }
    BLOCKED_PREFIXES
        .iter()
        .copied()
        .find(|prefix| rest.starts_with(prefix))
}
