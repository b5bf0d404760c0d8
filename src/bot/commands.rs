//! Command table and argument parsing

/// What a chat command asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    /// Fetch an image and post it
    Lookup,
    /// Add a user to the whitelist
    Whitelist,
    /// Remove a user from the whitelist
    Blacklist,
    /// Post the source repository link
    Source,
    /// Post the process uptime
    Uptime,
    /// Change the public cooldown
    RateLimit,
    /// Answer the liveness ping
    Ping,
}

/// One row of the command table
#[derive(Debug)]
pub struct CommandSpec {
    /// Prefixes that trigger the command (case-sensitive)
    pub prefixes: &'static [&'static str],
    /// Command triggered
    pub kind: CommandKind,
}

/// Every message that is a command starts with this
pub const COMMAND_SIGIL: char = '!';

/// Command table; first match wins.
pub const COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        prefixes: &["!polecat", "!ferret", "! FerretLOL"],
        kind: CommandKind::Lookup,
    },
    CommandSpec {
        prefixes: &["!fwhitelist"],
        kind: CommandKind::Whitelist,
    },
    CommandSpec {
        prefixes: &["!fblacklist"],
        kind: CommandKind::Blacklist,
    },
    CommandSpec {
        prefixes: &["!fsource"],
        kind: CommandKind::Source,
    },
    CommandSpec {
        prefixes: &["!fuptime"],
        kind: CommandKind::Uptime,
    },
    CommandSpec {
        prefixes: &["!fratelimit"],
        kind: CommandKind::RateLimit,
    },
    CommandSpec {
        prefixes: &["!ping"],
        kind: CommandKind::Ping,
    },
];

/// Match `text` against the command table
#[must_use]
pub fn match_command(text: &str) -> Option<CommandKind> {
    COMMANDS
        .iter()
        .find(|spec| spec.prefixes.iter().any(|p| text.starts_with(p)))
        .map(|spec| spec.kind)
}

/// The single argument of `text`, if it has exactly one.
///
/// Splits on single spaces like the chat clients do, so doubled spaces
/// produce an empty token and are rejected.
#[must_use]
pub fn single_argument(text: &str) -> Option<&str> {
    let mut parts = text.split(' ');
    let _command = parts.next()?;
    let arg = parts.next()?;
    if arg.is_empty() || parts.next().is_some() {
        return None;
    }
    Some(arg)
}
