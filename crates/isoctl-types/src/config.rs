//! Policy settings for the command processor.
//!
//! Every knob here can also be changed at run time by a setter command.
//! Settings are in-memory only; a TOML file may seed them at program start.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{IsoctlError, Result};
use crate::severity::{Severity, Threshold};

/// How process signals are prepared at library startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SignalBehavior {
    /// No own signal handling; the embedding application does it.
    #[serde(rename = "off")]
    NoHandling,
    /// Install a handler that raises the context's abort request.
    #[default]
    #[serde(rename = "on")]
    Handler,
    /// Restore the operating system's default reaction.
    #[serde(rename = "sig_dfl")]
    OsDefault,
    /// Ignore nearly all signals.
    #[serde(rename = "sig_ign")]
    IgnoreMost,
}

impl SignalBehavior {
    pub fn mode_name(self) -> &'static str {
        match self {
            SignalBehavior::NoHandling => "off",
            SignalBehavior::Handler => "on",
            SignalBehavior::OsDefault => "sig_dfl",
            SignalBehavior::IgnoreMost => "sig_ign",
        }
    }
}

impl fmt::Display for SignalBehavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mode_name())
    }
}

impl FromStr for SignalBehavior {
    type Err = IsoctlError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "off" => Ok(SignalBehavior::NoHandling),
            "on" => Ok(SignalBehavior::Handler),
            "sig_dfl" => Ok(SignalBehavior::OsDefault),
            "sig_ign" => Ok(SignalBehavior::IgnoreMost),
            other => Err(IsoctlError::Config(format!(
                "unknown signal handling mode '{other}'"
            ))),
        }
    }
}

/// When a sub-threshold problem is answered with a pardon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PardonPolicy {
    /// Pardon only when the handler itself reported failure.
    #[default]
    OnFailure,
    /// Pardon every sub-threshold problem.
    Always,
    /// Never pardon; a failed handler yields a plain failure advice.
    Never,
}

/// All policy knobs of one context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Problem status at or above this aborts command processing.
    pub abort_on: Threshold,
    /// Messages below this may be suppressed from output.
    pub report_about: Threshold,
    /// Problem status at or above this yields `return_exit_value`.
    pub return_with: Threshold,
    pub return_exit_value: i32,
    /// Token that ends the parameter list of a variable-arity command.
    pub list_delimiter: String,
    /// Severity raised for unknown commands under the lenient policy.
    pub unknown_command_severity: Severity,
    /// Raise FAILURE for unknown commands regardless of the call flags.
    pub strict_unknown_commands: bool,
    pub pardon: PardonPolicy,
    pub signal_handling: SignalBehavior,
    /// Startup files read by `read_rc` unless `-no_rc` was given.
    pub rc_files: Vec<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        let mut rc_files = vec![
            PathBuf::from("/etc/default/isoctl"),
            PathBuf::from("/etc/opt/isoctl/rc"),
            PathBuf::from("/etc/isoctl/isoctl.conf"),
        ];
        if let Some(home) = std::env::var_os("HOME") {
            rc_files.push(Path::new(&home).join(".isoctlrc"));
        }
        Self {
            abort_on: Threshold::At(Severity::Failure),
            report_about: Threshold::At(Severity::Update),
            return_with: Threshold::At(Severity::Sorry),
            return_exit_value: 32,
            list_delimiter: "--".to_string(),
            unknown_command_severity: Severity::Sorry,
            strict_unknown_commands: false,
            pardon: PardonPolicy::default(),
            signal_handling: SignalBehavior::default(),
            rc_files,
        }
    }
}

impl Settings {
    /// Parse settings from TOML text. Missing keys keep their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let settings: Settings = toml::from_str(text)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Read settings from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let settings = Self::from_toml_str(&text)?;
        log::debug!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.list_delimiter.is_empty() {
            return Err(IsoctlError::Config(
                "list_delimiter must not be empty".to_string(),
            ));
        }
        if !(0..=255).contains(&self.return_exit_value) {
            return Err(IsoctlError::Config(format!(
                "return_exit_value {} outside 0..=255",
                self.return_exit_value
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults() {
        let s = Settings::default();
        assert_eq!(s.abort_on, Threshold::At(Severity::Failure));
        assert_eq!(s.report_about, Threshold::At(Severity::Update));
        assert_eq!(s.return_with, Threshold::At(Severity::Sorry));
        assert_eq!(s.return_exit_value, 32);
        assert_eq!(s.list_delimiter, "--");
        assert_eq!(s.pardon, PardonPolicy::OnFailure);
        assert_eq!(s.signal_handling, SignalBehavior::Handler);
        assert!(s.validate().is_ok());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let s = Settings::from_toml_str(
            "abort_on = \"NEVER\"\nlist_delimiter = \"::\"\npardon = \"always\"\n",
        )
        .unwrap();
        assert_eq!(s.abort_on, Threshold::Never);
        assert_eq!(s.list_delimiter, "::");
        assert_eq!(s.pardon, PardonPolicy::Always);
        assert_eq!(s.report_about, Threshold::At(Severity::Update));
    }

    #[test]
    fn signal_modes_parse_from_toml() {
        let s = Settings::from_toml_str("signal_handling = \"sig_ign\"").unwrap();
        assert_eq!(s.signal_handling, SignalBehavior::IgnoreMost);
        assert!(Settings::from_toml_str("signal_handling = \"loud\"").is_err());
    }

    #[test]
    fn bad_threshold_name_rejected() {
        let err = Settings::from_toml_str("abort_on = \"failure\"").unwrap_err();
        assert!(matches!(err, IsoctlError::TomlParse(_)));
    }

    #[test]
    fn empty_delimiter_rejected() {
        let err = Settings::from_toml_str("list_delimiter = \"\"").unwrap_err();
        assert!(matches!(err, IsoctlError::Config(_)));
    }

    #[test]
    fn exit_value_range_checked() {
        assert!(Settings::from_toml_str("return_exit_value = 256").is_err());
        assert!(Settings::from_toml_str("return_exit_value = 0").is_ok());
    }

    #[test]
    fn signal_mode_names_round_trip() {
        for mode in [
            SignalBehavior::NoHandling,
            SignalBehavior::Handler,
            SignalBehavior::OsDefault,
            SignalBehavior::IgnoreMost,
        ] {
            assert_eq!(mode.mode_name().parse::<SignalBehavior>().unwrap(), mode);
        }
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "report_about = \"SORRY\"").unwrap();
        let s = Settings::load(file.path()).unwrap();
        assert_eq!(s.report_about, Threshold::At(Severity::Sorry));
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let err = Settings::load(Path::new("/nonexistent/isoctl.toml")).unwrap_err();
        assert!(matches!(err, IsoctlError::Io(_)));
    }
}
