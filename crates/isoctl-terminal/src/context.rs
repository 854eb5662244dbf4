//! The context handle: creation, startup, and destruction.
//!
//! A [`Context`] owns the command table and the session state. Creation
//! resolves the program name to an emulation, startup moves the interpreter
//! from prescan to the full command table, and destruction releases any
//! still-active redirections before detaching from the process-wide
//! [`LibraryGuard`].

use std::io::BufRead;
use std::sync::Arc;

use isoctl_msgs::{
    AbortFlag, Advice, ChannelMask, EvalFlags, MessageQueue, OutlistHandle, Outlists, Output,
    StatusEngine, StdStreams, SubmitFlags,
};
use isoctl_types::config::{Settings, SignalBehavior};
use isoctl_types::error::{IsoctlError, Result};
use isoctl_types::message::Message;
use isoctl_types::severity::Severity;

use crate::commands::register_builtins;
use crate::emulation::{Emulation, Emulator, resolve_program};
use crate::interpreter::{Command, CommandRegistry, Dispatch, PrescanFlags, RunFlags};
use crate::library::LibraryGuard;
use crate::session::{DialogMode, Phase, Session, status_policy};

/// Construction options for [`Context::with_options`].
pub struct ContextOptions {
    pub settings: Settings,
    pub output: Box<dyn Output>,
    pub guard: Arc<LibraryGuard>,
    /// Collaborator diagnostics drained at every checkpoint.
    pub queue: Option<Box<dyn MessageQueue>>,
}

impl Default for ContextOptions {
    fn default() -> Self {
        Self {
            settings: Settings::default(),
            output: Box::new(StdStreams),
            guard: LibraryGuard::global(),
            queue: None,
        }
    }
}

/// One command-processing context.
pub struct Context {
    registry: CommandRegistry,
    session: Session,
    guard: Arc<LibraryGuard>,
    started: bool,
    attached: bool,
}

impl Context {
    /// Create a context with default settings writing to stdout/stderr.
    pub fn new(program: &str) -> Self {
        Self::with_options(program, ContextOptions::default())
    }

    pub fn with_options(program: &str, options: ContextOptions) -> Self {
        let ContextOptions {
            settings,
            output,
            guard,
            queue,
        } = options;
        let emulation = resolve_program(program);
        let leaf = program.rsplit('/').next().unwrap_or(program);
        let mut engine = StatusEngine::new(leaf, status_policy(&settings), output);
        if let Some(queue) = queue {
            engine.set_queue(queue);
        }
        let mut session = Session::new(engine, &settings, emulation);
        if let Some(mode) = guard.signal_preset() {
            session.signal_handling = mode;
        }
        let mut registry = CommandRegistry::new();
        register_builtins(&mut registry);
        guard.attach();
        log::info!("Created context for {leaf} ({emulation} emulation)");
        Self {
            registry,
            session,
            guard,
            started: false,
            attached: true,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    pub fn registry(&self) -> &CommandRegistry {
        &self.registry
    }

    pub fn emulation(&self) -> Emulation {
        self.session.emulation()
    }

    /// Add or replace a command.
    pub fn register(&mut self, cmd: Box<dyn Command>) {
        self.registry.register(cmd);
    }

    /// Add a translator for `-as` and program-name emulation.
    pub fn register_emulation(&mut self, emulator: Box<dyn Emulator>) {
        self.registry.register_emulation(emulator);
    }

    pub fn set_queue(&mut self, queue: Box<dyn MessageQueue>) {
        self.session.status.set_queue(queue);
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Choose the signal behavior applied at startup.
    pub fn preset_signal_behavior(&mut self, mode: SignalBehavior) -> Result<()> {
        if self.started {
            return Err(IsoctlError::AlreadyStarted);
        }
        self.session.signal_handling = mode;
        Ok(())
    }

    /// Perform library startup and enable the full command table.
    ///
    /// A second call on the same context fails with
    /// [`IsoctlError::AlreadyStarted`].
    pub fn startup(&mut self) -> Result<()> {
        if self.started {
            return Err(IsoctlError::AlreadyStarted);
        }
        if self.session.phase() == Phase::Terminated {
            return Err(IsoctlError::Terminated);
        }
        let flag = self.session.status.abort_request().as_atomic();
        self.guard.start(self.session.signal_handling, flag)?;
        self.started = true;
        self.session.phase = Phase::Ready;
        log::debug!("Context for {} ready", self.session.status.program());
        Ok(())
    }

    /// Release the context, optionally shutting the library down.
    ///
    /// Shutdown must only be requested for the last live context; otherwise
    /// the context is still released but
    /// [`IsoctlError::ShutdownWithLiveContexts`] is returned.
    pub fn destroy(mut self, shutdown: bool) -> Result<()> {
        let dropped = self.session.status.outlists_mut().clear();
        if dropped > 0 {
            log::debug!("Released {dropped} active redirection(s)");
        }
        self.attached = false;
        log::info!("Destroying context for {}", self.session.status.program());
        self.guard.detach(shutdown)
    }

    // -----------------------------------------------------------------------
    // Dispatch entry points
    // -----------------------------------------------------------------------

    /// Run the prescan commands of the program arguments.
    pub fn prescan_args(&mut self, argv: &[String], flags: PrescanFlags) -> Result<Dispatch> {
        self.registry.prescan(&mut self.session, argv, flags)
    }

    /// Dispatch `argv` from `*idx` through the full command table.
    pub fn interpreter(&mut self, argv: &[String], idx: &mut usize, flags: RunFlags) -> Result<Dispatch> {
        self.registry.interpret(&mut self.session, argv, idx, flags)
    }

    /// Dispatch the words of one command line.
    pub fn execute_line(&mut self, line: &str, flags: RunFlags) -> Result<Dispatch> {
        self.registry.execute_line(&mut self.session, line, flags)
    }

    /// Run the existing startup files unless `-no_rc` was given.
    pub fn read_rc(&mut self) -> Result<Dispatch> {
        if self.session.phase() == Phase::Prescan {
            return Err(IsoctlError::NotStarted);
        }
        if self.session.no_rc {
            log::debug!("Startup files skipped by -no_rc");
            return Ok(Dispatch::Continue);
        }
        let files = self.session.rc_files.clone();
        for path in files.iter().filter(|p| p.is_file()) {
            log::info!("Reading startup file {}", path.display());
            match self.registry.run_option_file(&mut self.session, path) {
                Ok(d) if d.stops() => return Ok(d),
                Ok(_) => {},
                Err(e) => {
                    self.session.event(
                        Severity::Failure,
                        format!("Cannot read startup file {}: {e}", path.display()),
                    );
                },
            }
        }
        Ok(Dispatch::Continue)
    }

    /// Read command lines from `input` until end of input or an end request.
    ///
    /// Does nothing unless `-dialog on` or `-dialog single_line` was given.
    /// The problem status and the abort request are reset before each line,
    /// so an interruption only cancels the line it arrived in. In `on` mode
    /// a line with an open quote continues on the next line.
    pub fn dialog<R: BufRead>(&mut self, mut input: R) -> Result<Dispatch> {
        if self.session.phase() == Phase::Prescan {
            return Err(IsoctlError::NotStarted);
        }
        let mut pending = String::new();
        loop {
            if self.session.dialog_mode() == DialogMode::Off {
                return Ok(Dispatch::Continue);
            }
            if pending.is_empty() {
                let prompt = self.session.prompt().to_string();
                self.session.result(prompt);
            }
            let mut raw = String::new();
            if input.read_line(&mut raw)? == 0 {
                if !pending.is_empty() {
                    self.session.sorry("Incomplete dialog line at end of input");
                }
                return Ok(Dispatch::Continue);
            }
            let raw = raw.trim_end_matches(['\n', '\r']);
            let line = if pending.is_empty() {
                raw.to_string()
            } else {
                format!("{}\n{raw}", std::mem::take(&mut pending))
            };
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            self.session.status.set_status("")?;
            self.session.status.abort_request().clear();
            match self.registry.execute_line(&mut self.session, &line, RunFlags::nested()) {
                Err(IsoctlError::Parse(_)) if self.session.dialog_mode() == DialogMode::On => {
                    pending = line;
                    continue;
                },
                Err(e @ IsoctlError::Parse(_)) => {
                    self.session.sorry(e.to_string());
                },
                Err(e) => return Err(e),
                Ok(d @ (Dispatch::EndRun | Dispatch::EndProgram)) => return Ok(d),
                Ok(d) => log::debug!("Dialog line finished: {d}"),
            }
            if !self.session.mark().is_empty() {
                let mark = self.session.mark().to_string();
                self.session.status.emit(Message::mark(mark));
            }
        }
    }

    // -----------------------------------------------------------------------
    // Problem status and messages
    // -----------------------------------------------------------------------

    /// Submit a message by severity name to the info channel.
    pub fn submit(
        &mut self,
        error_code: i32,
        text: &str,
        os_errno: i32,
        severity: &str,
        flags: SubmitFlags,
    ) -> Result<()> {
        self.session
            .status
            .submit_named(error_code, text, os_errno, severity, flags)
    }

    pub fn evaluate(&mut self, ret: i32, flags: EvalFlags) -> Advice {
        self.session.status.evaluate(ret, flags)
    }

    pub fn set_status(&mut self, severity: &str) -> Result<()> {
        self.session.status.set_status(severity)
    }

    pub fn get_status(&self) -> (u8, &'static str) {
        self.session.status.get_status()
    }

    pub fn abort_request(&self) -> &AbortFlag {
        self.session.status.abort_request()
    }

    pub fn push_outlists(&mut self, mask: ChannelMask) -> Result<OutlistHandle> {
        self.session.push_outlists(mask)
    }

    pub fn pull_outlists(&mut self, handle: OutlistHandle) -> Result<Outlists> {
        self.session.pull_outlists(handle)
    }

    /// Whether a commit would write a new session.
    pub fn change_is_pending(&self) -> bool {
        self.session.change_is_pending()
    }

    /// Program exit value derived from the worst problem seen.
    pub fn make_return_value(&self) -> i32 {
        self.session.status.make_return_value()
    }

    /// Current policy knobs.
    pub fn settings(&self) -> Settings {
        self.session.settings()
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        if self.attached {
            self.attached = false;
            let _ = self.guard.detach(false);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};

    use isoctl_msgs::{MemoryOutput, QueuedMessage, SharedQueue};
    use isoctl_types::message::Channel;

    use crate::interpreter::Environment;
    use crate::library::NoHooks;
    use crate::session::EndKind;

    /// Raises the abort request like an interrupt would.
    struct Interrupt;

    impl Command for Interrupt {
        fn name(&self) -> &str {
            "-interrupt"
        }

        fn description(&self) -> &str {
            "Raise the abort request"
        }

        fn usage(&self) -> &str {
            "-interrupt"
        }

        fn execute(&self, _args: &[&str], env: &mut Environment<'_>) -> Result<i32> {
            env.session.status.abort_request().raise();
            Ok(1)
        }
    }

    /// Ends the program gracefully.
    struct Quit;

    impl Command for Quit {
        fn name(&self) -> &str {
            "-quit"
        }

        fn description(&self) -> &str {
            "End the program"
        }

        fn usage(&self) -> &str {
            "-quit"
        }

        fn execute(&self, _args: &[&str], env: &mut Environment<'_>) -> Result<i32> {
            env.session.request_end(EndKind::Program);
            Ok(1)
        }
    }

    fn settings() -> Settings {
        Settings {
            signal_handling: SignalBehavior::NoHandling,
            rc_files: Vec::new(),
            ..Settings::default()
        }
    }

    fn context_with(program: &str, settings: Settings, guard: &Arc<LibraryGuard>) -> (Context, MemoryOutput) {
        let out = MemoryOutput::new();
        let ctx = Context::with_options(
            program,
            ContextOptions {
                settings,
                output: Box::new(out.clone()),
                guard: Arc::clone(guard),
                queue: None,
            },
        );
        (ctx, out)
    }

    fn context() -> (Context, MemoryOutput, Arc<LibraryGuard>) {
        let guard = LibraryGuard::new(Box::new(NoHooks));
        let (ctx, out) = context_with("/usr/bin/isoctl", settings(), &guard);
        (ctx, out, guard)
    }

    fn started() -> (Context, MemoryOutput, Arc<LibraryGuard>) {
        let (mut ctx, out, guard) = context();
        ctx.startup().unwrap();
        (ctx, out, guard)
    }

    fn args(words: &[&str]) -> Vec<String> {
        std::iter::once("isoctl")
            .chain(words.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn create_resolves_alias_and_defaults() {
        let guard = LibraryGuard::new(Box::new(NoHooks));
        let (ctx, _) = context_with("/usr/local/bin/osirrox", settings(), &guard);
        assert_eq!(ctx.emulation(), Emulation::Osirrox);
        assert!(ctx.session().osirrox());
        assert_eq!(ctx.get_status(), (0, "ALL"));
        assert_eq!(ctx.session().phase(), Phase::Prescan);
        assert_eq!(ctx.session().status.program(), "osirrox");
        assert_eq!(guard.live_contexts(), 1);
    }

    #[test]
    fn second_startup_is_rejected() {
        let (mut ctx, _, guard) = started();
        assert_eq!(ctx.session().phase(), Phase::Ready);
        assert!(matches!(ctx.startup(), Err(IsoctlError::AlreadyStarted)));
        assert_eq!(guard.generation(), 1);
    }

    #[test]
    fn contexts_share_one_generation() {
        let guard = LibraryGuard::new(Box::new(NoHooks));
        let (mut a, _) = context_with("isoctl", settings(), &guard);
        let (mut b, _) = context_with("isoctl", settings(), &guard);
        a.startup().unwrap();
        b.startup().unwrap();
        assert_eq!(guard.generation(), 1);
        assert!(matches!(
            a.destroy(true),
            Err(IsoctlError::ShutdownWithLiveContexts(1))
        ));
        assert!(guard.is_initialized());
        b.destroy(true).unwrap();
        assert!(!guard.is_initialized());

        let (mut c, _) = context_with("isoctl", settings(), &guard);
        c.startup().unwrap();
        assert_eq!(guard.generation(), 2);
    }

    #[test]
    fn drop_detaches() {
        let guard = LibraryGuard::new(Box::new(NoHooks));
        {
            let (_ctx, _) = context_with("isoctl", settings(), &guard);
            assert_eq!(guard.live_contexts(), 1);
        }
        assert_eq!(guard.live_contexts(), 0);
    }

    #[test]
    fn destroy_releases_active_redirections() {
        let (mut ctx, _, guard) = started();
        ctx.push_outlists(ChannelMask::BOTH).unwrap();
        ctx.push_outlists(ChannelMask::INFO).unwrap();
        assert_eq!(ctx.session().status.outlists().depth(), 2);
        ctx.destroy(true).unwrap();
        assert_eq!(guard.live_contexts(), 0);
    }

    #[test]
    fn preset_signal_behavior_before_startup_only() {
        let (mut ctx, _, _) = context();
        ctx.preset_signal_behavior(SignalBehavior::NoHandling).unwrap();
        ctx.startup().unwrap();
        assert!(matches!(
            ctx.preset_signal_behavior(SignalBehavior::OsDefault),
            Err(IsoctlError::AlreadyStarted)
        ));
    }

    #[test]
    fn guard_preset_seeds_new_contexts() {
        let guard = LibraryGuard::new(Box::new(NoHooks));
        guard
            .preset_signal_behavior(SignalBehavior::NoHandling)
            .unwrap();
        let (ctx, _) = context_with("isoctl", Settings::default(), &guard);
        assert_eq!(ctx.session().signal_handling, SignalBehavior::NoHandling);
    }

    #[test]
    fn full_program_flow() {
        let (mut ctx, out, _) = context();
        let argv = args(&["-abort_on", "NEVER", "-print", "hello", "-bogus"]);
        assert_eq!(
            ctx.prescan_args(&argv, PrescanFlags::default()).unwrap(),
            Dispatch::Continue
        );
        assert_eq!(ctx.settings().abort_on.name(), "NEVER");
        assert!(out.lines().is_empty());

        ctx.startup().unwrap();
        assert_eq!(ctx.read_rc().unwrap(), Dispatch::Continue);
        let mut idx = 1;
        let d = ctx.interpreter(&argv, &mut idx, RunFlags::main_args()).unwrap();
        assert_eq!(d, Dispatch::Pardoned);
        assert_eq!(idx, argv.len());
        assert_eq!(out.texts(Channel::Result), vec!["hello"]);
        assert_eq!(ctx.make_return_value(), 32);
    }

    #[test]
    fn interpreter_before_startup_fails_without_status_change() {
        let (mut ctx, _, _) = context();
        let mut idx = 1;
        assert!(matches!(
            ctx.interpreter(&args(&["-print", "x"]), &mut idx, RunFlags::default()),
            Err(IsoctlError::NotStarted)
        ));
        assert_eq!(ctx.get_status().0, 0);
    }

    #[test]
    fn submit_and_status_api() {
        let (mut ctx, out, _) = started();
        ctx.submit(0, "disc is closed", 0, "MISHAP", SubmitFlags::default())
            .unwrap();
        assert_eq!(ctx.get_status().1, "MISHAP");
        assert!(
            ctx.submit(0, "x", 0, "BOGUS", SubmitFlags::default())
                .is_err()
        );
        assert!(ctx.set_status("BOGUS").is_err());
        assert_eq!(ctx.get_status().1, "MISHAP");
        assert_eq!(ctx.evaluate(1, EvalFlags::default()), Advice::Success);
        ctx.submit(0, "write error", 5, "FAILURE", SubmitFlags::default())
            .unwrap();
        assert_eq!(ctx.evaluate(1, EvalFlags::default()), Advice::Abort);
        assert!(out.texts(Channel::Info)[0].starts_with("isoctl : MISHAP : disc is closed"));
    }

    #[test]
    fn queue_is_drained_at_checkpoint() {
        let (mut ctx, _, _) = started();
        let queue = SharedQueue::new();
        ctx.set_queue(Box::new(queue.clone()));
        queue.push(QueuedMessage::new(Severity::Fatal, "medium error"));
        let d = ctx.execute_line("-print x", RunFlags::default()).unwrap();
        assert_eq!(d, Dispatch::Abort);
        assert!(queue.is_empty());
    }

    #[test]
    fn redirection_captures_command_output() {
        let (mut ctx, out, _) = started();
        let h = ctx.push_outlists(ChannelMask::RESULT).unwrap();
        ctx.execute_line("-print captured -bogus", RunFlags::default())
            .unwrap();
        let lists = ctx.pull_outlists(h).unwrap();
        assert_eq!(lists.result.unwrap().texts(), vec!["captured\n"]);
        assert!(lists.info.is_none());
        assert!(out.texts(Channel::Result).is_empty());
        assert!(out.texts(Channel::Info)[0].contains("Not a known command: '-bogus'"));
    }

    #[test]
    fn read_rc_runs_existing_files() {
        let mut rc = tempfile::NamedTempFile::new().unwrap();
        writeln!(rc, "-print from_rc\n-end\n-print unreachable").unwrap();
        let guard = LibraryGuard::new(Box::new(NoHooks));
        let s = Settings {
            rc_files: vec!["/nonexistent/isoctlrc".into(), rc.path().to_path_buf()],
            ..settings()
        };
        let (mut ctx, out) = context_with("isoctl", s, &guard);
        ctx.startup().unwrap();
        assert_eq!(ctx.read_rc().unwrap(), Dispatch::EndRun);
        assert_eq!(out.texts(Channel::Result), vec!["from_rc"]);
    }

    #[test]
    fn no_rc_skips_startup_files() {
        let mut rc = tempfile::NamedTempFile::new().unwrap();
        writeln!(rc, "-print from_rc").unwrap();
        let guard = LibraryGuard::new(Box::new(NoHooks));
        let s = Settings {
            rc_files: vec![rc.path().to_path_buf()],
            ..settings()
        };
        let (mut ctx, out) = context_with("isoctl", s, &guard);
        ctx.prescan_args(&args(&["-no_rc"]), PrescanFlags::default())
            .unwrap();
        ctx.startup().unwrap();
        assert_eq!(ctx.read_rc().unwrap(), Dispatch::Continue);
        assert!(out.lines().is_empty());
    }

    #[test]
    fn dialog_off_returns_immediately() {
        let (mut ctx, out, _) = started();
        let d = ctx.dialog(Cursor::new("-print x\n")).unwrap();
        assert_eq!(d, Dispatch::Continue);
        assert!(out.lines().is_empty());
    }

    #[test]
    fn dialog_runs_lines_and_puts_out_mark() {
        let (mut ctx, out, _) = started();
        ctx.execute_line("-dialog on -prompt ready -mark ok", RunFlags::default())
            .unwrap();
        let input = "-print one\n\n# note\n-bogus\n-print two\n";
        assert_eq!(ctx.dialog(Cursor::new(input)).unwrap(), Dispatch::Continue);
        let results = out.texts(Channel::Result);
        assert_eq!(results.iter().filter(|l| *l == "ready").count(), 6);
        assert!(results.contains(&"one".to_string()));
        assert!(results.contains(&"two".to_string()));
        assert_eq!(out.texts(Channel::Mark), vec!["ok", "ok", "ok"]);
        // Status was reset before the last line.
        assert_eq!(ctx.get_status(), (0, "ALL"));
    }

    #[test]
    fn dialog_continues_open_quotes_in_on_mode() {
        let (mut ctx, out, _) = started();
        ctx.execute_line("-dialog on", RunFlags::default())
            .unwrap();
        let input = "-print 'first\nsecond'\n";
        ctx.dialog(Cursor::new(input)).unwrap();
        assert!(
            out.texts(Channel::Result)
                .contains(&"first\nsecond".to_string())
        );
    }

    #[test]
    fn dialog_single_line_reports_open_quote() {
        let (mut ctx, out, _) = started();
        ctx.execute_line("-dialog single_line", RunFlags::default())
            .unwrap();
        ctx.dialog(Cursor::new("-print 'open\n-print closed\n"))
            .unwrap();
        assert!(out.texts(Channel::Info)[0].contains("unterminated single quote"));
        assert!(out.texts(Channel::Result).contains(&"closed".to_string()));
    }

    #[test]
    fn dialog_end_stops_reading() {
        let (mut ctx, out, _) = started();
        ctx.execute_line("-dialog on", RunFlags::default())
            .unwrap();
        let d = ctx.dialog(Cursor::new("-end\n-print late\n")).unwrap();
        assert_eq!(d, Dispatch::EndRun);
        assert!(!out.texts(Channel::Result).contains(&"late".to_string()));
    }

    #[test]
    fn dialog_interrupt_cancels_only_its_line() {
        let (mut ctx, out, _) = started();
        ctx.register(Box::new(Interrupt));
        ctx.execute_line("-dialog on", RunFlags::default())
            .unwrap();
        let input = "-interrupt -print lost\n-print kept\n";
        assert_eq!(ctx.dialog(Cursor::new(input)).unwrap(), Dispatch::Continue);
        let results = out.texts(Channel::Result);
        assert!(!results.contains(&"lost".to_string()));
        assert!(results.contains(&"kept".to_string()));
        assert!(!ctx.abort_request().is_raised());
    }

    #[test]
    fn dialog_keeps_end_program_code() {
        let (mut ctx, out, _) = started();
        ctx.register(Box::new(Quit));
        ctx.execute_line("-dialog on", RunFlags::default())
            .unwrap();
        let d = ctx.dialog(Cursor::new("-quit\n-print late\n")).unwrap();
        assert_eq!(d, Dispatch::EndProgram);
        assert_eq!(d.code(), 0);
        assert!(!out.texts(Channel::Result).contains(&"late".to_string()));
    }

    #[test]
    fn change_pending_and_rollback() {
        let (mut ctx, _, _) = started();
        ctx.session_mut().mark_change_pending();
        assert!(ctx.change_is_pending());
        assert_eq!(
            ctx.execute_line("-rollback_end", RunFlags::default())
                .unwrap(),
            Dispatch::EndRun
        );
        assert!(!ctx.change_is_pending());
    }
}
