//! Span naming for clone commands.

use regex::Regex;
use std::sync::LazyLock;
use tracing::info;

static GIT_SUBCOMMAND: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bgit\s+(\S+)").expect("git subcommand pattern"));

/// Label used when a command line has no `git <word>` in it.
pub const UNKNOWN_COMMAND: &str = "unknown";

/// Reduce a command line to `git <subcommand>`.
///
/// Anything else becomes [`UNKNOWN_COMMAND`] and is logged so the pattern
/// can be extended.
pub fn classify_git_command(command: &str) -> String {
    match GIT_SUBCOMMAND.captures(command) {
        Some(caps) => format!("git {}", &caps[1]),
        None => {
            info!(cmd = command, "unknown git command");
            UNKNOWN_COMMAND.to_string()
        }
    }
}
