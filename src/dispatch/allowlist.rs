//! Fixed allowlist of diagnostic commands a desktop agent may run

use std::collections::BTreeSet;

/// Commands the support agent may request by default
pub const DEFAULT_ALLOWED_COMMANDS: &[&str] = &[
    "ping 8.8.8.8",
    "ipconfig",
    "whoami",
    "systeminfo",
    "hostname",
    "Get-ComputerInfo",
];

/// Exact-match set of permitted command strings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandAllowlist {
    commands: BTreeSet<String>,
}

impl Default for CommandAllowlist {
    fn default() -> Self {
        Self::from_commands(DEFAULT_ALLOWED_COMMANDS.iter().copied())
    }
}

impl CommandAllowlist {
    /// Build an allowlist from explicit command strings
    #[must_use]
    pub fn from_commands<I, S>(commands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            commands: commands.into_iter().map(Into::into).collect(),
        }
    }

    /// Check whether a command is permitted
    ///
    /// Matching is exact: no trimming, case folding or argument parsing, so
    /// `"whoami /all"` is not covered by `"whoami"`
    #[must_use]
    pub fn is_allowed(&self, command: &str) -> bool {
        self.commands.contains(command)
    }

    /// Permitted commands in stable order (used for the tool schema enum)
    #[must_use]
    pub fn commands(&self) -> Vec<&str> {
        self.commands.iter().map(String::as_str).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}
