//! Mutable per-context state seen by every command.

use std::path::PathBuf;

use isoctl_msgs::{ChannelMask, OutlistHandle, Outlists, StatusEngine, StatusPolicy, SubmitFlags};
use isoctl_types::config::{Settings, SignalBehavior};
use isoctl_types::error::Result;
use isoctl_types::message::Message;
use isoctl_types::severity::Severity;

use crate::emulation::Emulation;

/// Interpreter phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Between creation and startup; only prescan commands run.
    Prescan,
    /// After startup; the full command table is available.
    Ready,
    /// A command ended the program; nothing more is dispatched.
    Terminated,
}

/// How the program was asked to end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndKind {
    /// Graceful end with nothing left to do (dispatch code 0).
    Program,
    /// Explicit end-of-run directive (dispatch code 3).
    Run,
}

/// Dialog mode set by `-dialog`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DialogMode {
    #[default]
    Off,
    /// Lines with an open quote continue on the next line.
    On,
    /// Every line is a complete command.
    SingleLine,
}

/// Default dialog prompt.
pub const DEFAULT_PROMPT: &str = "enter option and arguments :";

/// Everything a command may read or change.
pub struct Session {
    pub(crate) phase: Phase,
    pub(crate) end: Option<EndKind>,
    pub(crate) cursor: usize,
    pub(crate) nesting: usize,
    pub(crate) main_args_seen: bool,
    /// Problem status, thresholds, and message routing.
    pub status: StatusEngine,
    pub list_delimiter: String,
    pub unknown_command_severity: Severity,
    pub strict_unknown_commands: bool,
    pub signal_handling: SignalBehavior,
    pub rc_files: Vec<PathBuf>,
    pub(crate) no_rc: bool,
    pub(crate) emulation: Emulation,
    pub(crate) osirrox: bool,
    pub(crate) dialog: DialogMode,
    pub(crate) prompt: String,
    pub(crate) mark: String,
    pub(crate) change_pending: bool,
}

impl Session {
    pub(crate) fn new(status: StatusEngine, settings: &Settings, emulation: Emulation) -> Self {
        Self {
            phase: Phase::Prescan,
            end: None,
            cursor: 0,
            nesting: 0,
            main_args_seen: false,
            status,
            list_delimiter: settings.list_delimiter.clone(),
            unknown_command_severity: settings.unknown_command_severity,
            strict_unknown_commands: settings.strict_unknown_commands,
            signal_handling: settings.signal_handling,
            rc_files: settings.rc_files.clone(),
            no_rc: false,
            emulation,
            osirrox: emulation == Emulation::Osirrox,
            dialog: DialogMode::Off,
            prompt: DEFAULT_PROMPT.to_string(),
            mark: String::new(),
            change_pending: false,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Position of the command currently being executed.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn emulation(&self) -> Emulation {
        self.emulation
    }

    /// Whether image-to-disk copying was enabled.
    pub fn osirrox(&self) -> bool {
        self.osirrox
    }

    pub fn dialog_mode(&self) -> DialogMode {
        self.dialog
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn mark(&self) -> &str {
        &self.mark
    }

    pub fn end_requested(&self) -> Option<EndKind> {
        self.end
    }

    /// Stop dispatching after the current command.
    pub fn request_end(&mut self, kind: EndKind) {
        log::debug!("End requested: {kind:?}");
        self.end = Some(kind);
        self.phase = Phase::Terminated;
    }

    /// Record that the image has changes a commit would write.
    pub fn mark_change_pending(&mut self) {
        self.change_pending = true;
    }

    pub fn discard_pending_change(&mut self) {
        self.change_pending = false;
    }

    pub fn change_is_pending(&self) -> bool {
        self.change_pending
    }

    /// Put out a result line.
    pub fn result(&mut self, text: impl AsRef<str>) {
        self.status.emit(Message::result(text));
    }

    /// Submit an info-channel problem event.
    ///
    /// Events below `report_about` still count towards the problem status.
    pub fn event(&mut self, severity: Severity, text: impl AsRef<str>) {
        self.status
            .submit(Message::info(severity, text), SubmitFlags::suppressible());
    }

    /// Submit a SORRY event and return the handler failure code 0.
    pub fn sorry(&mut self, text: impl AsRef<str>) -> i32 {
        self.event(Severity::Sorry, text);
        0
    }

    pub fn push_outlists(&mut self, mask: ChannelMask) -> Result<OutlistHandle> {
        self.status.outlists_mut().push(mask)
    }

    pub fn pull_outlists(&mut self, handle: OutlistHandle) -> Result<Outlists> {
        self.status.outlists_mut().pull(handle)
    }

    /// Current policy knobs as a [`Settings`] value.
    pub fn settings(&self) -> Settings {
        let StatusPolicy {
            abort_on,
            report_about,
            return_with,
            return_exit_value,
            pardon,
        } = self.status.policy;
        Settings {
            abort_on,
            report_about,
            return_with,
            return_exit_value,
            list_delimiter: self.list_delimiter.clone(),
            unknown_command_severity: self.unknown_command_severity,
            strict_unknown_commands: self.strict_unknown_commands,
            pardon,
            signal_handling: self.signal_handling,
            rc_files: self.rc_files.clone(),
        }
    }
}

/// Split settings into the status engine's part.
pub(crate) fn status_policy(settings: &Settings) -> StatusPolicy {
    StatusPolicy {
        abort_on: settings.abort_on,
        report_about: settings.report_about,
        return_with: settings.return_with,
        return_exit_value: settings.return_exit_value,
        pardon: settings.pardon,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use isoctl_msgs::MemoryOutput;
    use isoctl_types::message::Channel;

    fn session() -> (Session, MemoryOutput) {
        let out = MemoryOutput::new();
        let settings = Settings::default();
        let engine = StatusEngine::new("isoctl", status_policy(&settings), Box::new(out.clone()));
        (Session::new(engine, &settings, Emulation::Native), out)
    }

    #[test]
    fn settings_round_trip_through_session() {
        let (s, _) = session();
        assert_eq!(s.settings(), Settings::default());
    }

    #[test]
    fn sorry_raises_status_and_returns_zero() {
        let (mut s, out) = session();
        assert_eq!(s.sorry("bad value"), 0);
        assert_eq!(s.status.get_status().1, "SORRY");
        assert_eq!(out.texts(Channel::Info), vec!["isoctl : SORRY : bad value"]);
    }

    #[test]
    fn request_end_terminates() {
        let (mut s, _) = session();
        s.request_end(EndKind::Run);
        assert_eq!(s.phase(), Phase::Terminated);
        assert_eq!(s.end_requested(), Some(EndKind::Run));
    }

    #[test]
    fn pending_change_flag() {
        let (mut s, _) = session();
        assert!(!s.change_is_pending());
        s.mark_change_pending();
        assert!(s.change_is_pending());
        s.discard_pending_change();
        assert!(!s.change_is_pending());
    }
}
