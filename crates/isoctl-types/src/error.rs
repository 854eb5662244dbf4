//! Error types for isoctl.
//!
//! These are misuse and infrastructure errors. They are returned
//! synchronously and never raise the problem status; domain problems travel
//! as severity-tagged messages instead.

use std::io;

/// Errors produced by the isoctl crates.
#[derive(Debug, thiserror::Error)]
pub enum IsoctlError {
    #[error("unknown severity name: '{0}'")]
    UnknownSeverity(String),

    #[error("redirection stack full: {max} redirections are active")]
    OutlistStackFull { max: usize },

    #[error("no active redirection with handle {0}")]
    UnknownOutlist(usize),

    #[error("message list disposal through a null reference")]
    NullListReference,

    #[error("library startup has not been performed")]
    NotStarted,

    #[error("library startup was already performed for this context")]
    AlreadyStarted,

    #[error("interpreter has terminated")]
    Terminated,

    #[error("global shutdown requested while {0} other context(s) are alive")]
    ShutdownWithLiveContexts(usize),

    #[error("not enough parameters with command '{command}': {needed} needed, {available} given")]
    ArgumentUnderflow {
        command: String,
        needed: usize,
        available: usize,
    },

    #[error("argument cursor {idx} out of range for {argc} arguments")]
    CursorOutOfRange { idx: usize, argc: usize },

    #[error("command error: {0}")]
    Command(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, IsoctlError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_severity_display() {
        let e = IsoctlError::UnknownSeverity("BOGUS".into());
        assert_eq!(format!("{e}"), "unknown severity name: 'BOGUS'");
    }

    #[test]
    fn stack_full_display() {
        let e = IsoctlError::OutlistStackFull { max: 32 };
        assert_eq!(
            format!("{e}"),
            "redirection stack full: 32 redirections are active"
        );
    }

    #[test]
    fn underflow_display_names_command() {
        let e = IsoctlError::ArgumentUnderflow {
            command: "-abort_on".into(),
            needed: 1,
            available: 0,
        };
        let msg = format!("{e}");
        assert!(msg.contains("-abort_on"));
        assert!(msg.contains("1 needed"));
    }

    #[test]
    fn io_error_from_conversion() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "gone");
        let e: IsoctlError = io_err.into();
        let msg = format!("{e}");
        assert!(msg.contains("I/O error"));
        assert!(msg.contains("gone"));
    }

    #[test]
    fn toml_error_from_conversion() {
        let toml_err = toml::from_str::<toml::Value>("this is [[[not valid toml").unwrap_err();
        let e: IsoctlError = toml_err.into();
        assert!(format!("{e}").contains("TOML parse error"));
    }

    #[test]
    fn error_is_debug() {
        let e = IsoctlError::NotStarted;
        assert!(format!("{e:?}").contains("NotStarted"));
    }
}
