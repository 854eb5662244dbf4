//! Message records.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::severity::Severity;

/// Maximum number of characters kept from a submitted message text.
pub const MAX_MESSAGE_TEXT: usize = 8196;

/// Output channel of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    /// Results of commands, normally stdout.
    Result,
    /// Diagnostics and progress, normally stderr.
    Info,
    /// Mark lines that delimit command output for frontends.
    Mark,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Channel::Result => "result",
            Channel::Info => "info",
            Channel::Mark => "mark",
        })
    }
}

/// One message on its way to an output channel or a redirection.
///
/// The text is capped at [`MAX_MESSAGE_TEXT`] characters and always ends
/// with exactly the one line terminator appended at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    error_code: i32,
    text: String,
    os_errno: Option<i32>,
    severity: Severity,
    channel: Channel,
}

impl Message {
    pub fn new(channel: Channel, severity: Severity, text: impl AsRef<str>) -> Self {
        let raw = text.as_ref();
        let mut text: String = if raw.chars().count() > MAX_MESSAGE_TEXT {
            raw.chars().take(MAX_MESSAGE_TEXT).collect()
        } else {
            raw.to_string()
        };
        text.push('\n');
        Self {
            error_code: 0,
            text,
            os_errno: None,
            severity,
            channel,
        }
    }

    /// A result-channel line.
    pub fn result(text: impl AsRef<str>) -> Self {
        Self::new(Channel::Result, Severity::Note, text)
    }

    /// An info-channel line.
    pub fn info(severity: Severity, text: impl AsRef<str>) -> Self {
        Self::new(Channel::Info, severity, text)
    }

    /// A mark line.
    pub fn mark(text: impl AsRef<str>) -> Self {
        Self::new(Channel::Mark, Severity::Note, text)
    }

    /// Attach a reserved error code. 0 means unspecified.
    pub fn with_error_code(mut self, code: i32) -> Self {
        self.error_code = code;
        self
    }

    /// Attach an OS error number. 0 means none.
    pub fn with_os_errno(mut self, errno: i32) -> Self {
        self.os_errno = (errno != 0).then_some(errno);
        self
    }

    pub fn error_code(&self) -> i32 {
        self.error_code
    }

    /// The text including its trailing line terminator.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// The text without the trailing line terminator.
    pub fn line(&self) -> &str {
        self.text.strip_suffix('\n').unwrap_or(&self.text)
    }

    pub fn os_errno(&self) -> Option<i32> {
        self.os_errno
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn channel(&self) -> Channel {
        self.channel
    }
}
