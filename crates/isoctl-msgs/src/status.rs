//! Problem-status escalation.
//!
//! Every submitted message may raise the problem status to its severity; the
//! status never drops except through [`StatusEngine::set_status`]. After each
//! command the caller runs [`StatusEngine::evaluate`] with the handler's
//! return code and follows the returned [`Advice`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use isoctl_types::config::PardonPolicy;
use isoctl_types::error::Result;
use isoctl_types::message::{Channel, Message};
use isoctl_types::severity::{NO_PROBLEM_NAME, NO_PROBLEM_RANK, Severity, Threshold};

use crate::outlist::OutlistStack;
use crate::output::Output;
use crate::queue::{EmptyQueue, MessageQueue};
use crate::sink::MessageSink;

/// Options for one message submission.
///
/// Paging is left to the [`Output`] implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SubmitFlags {
    /// Allow suppressing the message when it ranks below `report_about`.
    pub may_suppress: bool,
}

impl SubmitFlags {
    /// Flags for messages governed by `report_about`.
    pub fn suppressible() -> Self {
        Self { may_suppress: true }
    }
}

/// Options for one checkpoint evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EvalFlags {
    /// Do not emit the pardon / abort notices.
    pub quiet: bool,
    /// Treat a raised abort request as a reason to abort.
    pub check_abort_request: bool,
}

/// Checkpoint advice after one command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advice {
    /// Problem status reached `abort_on`, or the handler failed hard.
    Abort,
    /// The asynchronous abort request was raised.
    AbortRequested,
    /// A sub-threshold problem occurred and was tolerated.
    Pardoned,
    /// The handler failed, but nothing warrants aborting.
    Failed,
    Success,
}

impl Advice {
    /// Numeric form: -1, -2, 2, 0, 1.
    pub fn code(self) -> i32 {
        match self {
            Advice::Abort => -1,
            Advice::AbortRequested => -2,
            Advice::Pardoned => 2,
            Advice::Failed => 0,
            Advice::Success => 1,
        }
    }

    pub fn is_abort(self) -> bool {
        self.code() < 0
    }
}

/// Cooperative cancellation flag.
///
/// Raising it is a single atomic store, so it may be done from a signal
/// handler while the rest of the context is in use.
#[derive(Debug, Clone, Default)]
pub struct AbortFlag(Arc<AtomicBool>);

impl AbortFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// The shared atomic, for installation into a signal handler.
    pub fn as_atomic(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.0)
    }
}

/// Thresholds governing escalation and exit value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusPolicy {
    pub abort_on: Threshold,
    pub report_about: Threshold,
    pub return_with: Threshold,
    pub return_exit_value: i32,
    pub pardon: PardonPolicy,
}

impl Default for StatusPolicy {
    fn default() -> Self {
        Self {
            abort_on: Threshold::At(Severity::Failure),
            report_about: Threshold::At(Severity::Update),
            return_with: Threshold::At(Severity::Sorry),
            return_exit_value: 32,
            pardon: PardonPolicy::OnFailure,
        }
    }
}

/// Tracks the problem status of one context and advises after each command.
pub struct StatusEngine {
    program: String,
    problem: Option<Severity>,
    cycle_problem: Option<Severity>,
    worst: Option<Severity>,
    pub policy: StatusPolicy,
    abort_request: AbortFlag,
    sink: MessageSink,
    queue: Box<dyn MessageQueue>,
}

impl StatusEngine {
    /// An engine reporting as `program`, with messages going to `output`.
    pub fn new(program: &str, policy: StatusPolicy, output: Box<dyn Output>) -> Self {
        Self {
            program: program.to_string(),
            problem: None,
            cycle_problem: None,
            worst: None,
            policy,
            abort_request: AbortFlag::new(),
            sink: MessageSink::new(output),
            queue: Box::new(EmptyQueue),
        }
    }

    /// Attach the collaborator queue drained at each checkpoint.
    pub fn set_queue(&mut self, queue: Box<dyn MessageQueue>) {
        self.queue = queue;
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn set_program(&mut self, name: &str) {
        self.program = name.to_string();
    }

    pub fn abort_request(&self) -> &AbortFlag {
        &self.abort_request
    }

    pub fn sink_mut(&mut self) -> &mut MessageSink {
        &mut self.sink
    }

    pub fn outlists(&self) -> &OutlistStack {
        self.sink.outlists()
    }

    pub fn outlists_mut(&mut self) -> &mut OutlistStack {
        self.sink.outlists_mut()
    }

    /// Record `msg` and deliver it unless it may be suppressed.
    ///
    /// Info messages are rendered as `<program> : <SEVERITY> : <text>`.
    pub fn submit(&mut self, msg: Message, flags: SubmitFlags) {
        let sev = msg.severity();
        if self.problem.is_none_or(|p| sev > p) {
            self.problem = Some(sev);
        }
        if self.cycle_problem.is_none_or(|p| sev > p) {
            self.cycle_problem = Some(sev);
        }
        if self.worst.is_none_or(|p| sev > p) {
            self.worst = Some(sev);
        }

        if flags.may_suppress && !self.policy.report_about.is_reached_by(sev) {
            log::trace!("Suppressed {sev} message: {}", msg.line());
            return;
        }
        let msg = match msg.channel() {
            Channel::Info => self.render_info(&msg),
            _ => msg,
        };
        self.sink.deliver(msg);
    }

    /// Submit an info message by severity name.
    ///
    /// Fails without touching the status if the name is unknown.
    pub fn submit_named(
        &mut self,
        error_code: i32,
        text: &str,
        os_errno: i32,
        severity: &str,
        flags: SubmitFlags,
    ) -> Result<()> {
        let sev: Severity = severity.parse()?;
        let msg = Message::info(sev, text)
            .with_error_code(error_code)
            .with_os_errno(os_errno);
        self.submit(msg, flags);
        Ok(())
    }

    /// Deliver text without recording a problem event.
    pub fn emit(&mut self, msg: Message) {
        self.sink.deliver(msg);
    }

    /// Run every pending collaborator message through [`Self::submit`].
    ///
    /// Messages below `report_about` raise the status but are not shown.
    /// Returns the number of messages drained.
    pub fn drain_pending(&mut self) -> usize {
        let pending = self.queue.drain();
        let n = pending.len();
        for q in pending {
            let msg = Message::info(q.severity, &q.text)
                .with_error_code(q.error_code)
                .with_os_errno(q.os_errno);
            self.submit(msg, SubmitFlags::suppressible());
        }
        n
    }

    /// The checkpoint after one command returned `ret`.
    pub fn evaluate(&mut self, ret: i32, flags: EvalFlags) -> Advice {
        self.drain_pending();
        let cycle = self.cycle_problem.take();

        if let Some(problem) = self.problem
            && self.policy.abort_on.is_reached_by(problem)
        {
            if !flags.quiet {
                let text = format!(
                    "{} : aborting : -abort_on '{}' encountered '{}'",
                    self.program, self.policy.abort_on, problem
                );
                self.emit(Message::info(Severity::Note, text));
            }
            log::info!("Abort advised: problem status {problem}");
            return Advice::Abort;
        }
        if ret < 0 {
            log::info!("Abort advised: handler returned {ret}");
            return Advice::Abort;
        }
        if flags.check_abort_request && self.abort_request.is_raised() {
            log::info!("Abort advised: abort request raised");
            return Advice::AbortRequested;
        }
        if let Some(sev) = cycle.filter(|s| s.is_problem()) {
            let pardon = match self.policy.pardon {
                PardonPolicy::Always => true,
                PardonPolicy::OnFailure => ret == 0,
                PardonPolicy::Never => false,
            };
            if pardon {
                if !flags.quiet {
                    let text = format!(
                        "{} : NOTE : Tolerated problem event of severity '{sev}'",
                        self.program
                    );
                    self.emit(Message::info(Severity::Note, text));
                }
                return Advice::Pardoned;
            }
        }
        if ret == 0 {
            Advice::Failed
        } else {
            Advice::Success
        }
    }

    /// Set the problem status by name; an empty name resets it.
    pub fn set_status(&mut self, severity: &str) -> Result<()> {
        if severity.is_empty() {
            self.problem = None;
            self.cycle_problem = None;
            return Ok(());
        }
        let sev: Severity = severity.parse()?;
        self.problem = Some(sev);
        Ok(())
    }

    /// Current problem status as rank and name.
    pub fn get_status(&self) -> (u8, &'static str) {
        match self.problem {
            Some(sev) => (sev.rank(), sev.name()),
            None => (NO_PROBLEM_RANK, NO_PROBLEM_NAME),
        }
    }

    pub fn problem(&self) -> Option<Severity> {
        self.problem
    }

    /// Highest severity ever submitted, unaffected by resets.
    pub fn worst(&self) -> Option<Severity> {
        self.worst
    }

    /// Exit value derived from the worst severity seen.
    pub fn make_return_value(&self) -> i32 {
        match self.worst {
            Some(sev) if self.policy.return_with.is_reached_by(sev) => {
                self.policy.return_exit_value
            },
            _ => 0,
        }
    }

    fn render_info(&self, msg: &Message) -> Message {
        let mut text = format!("{} : {} : {}", self.program, msg.severity(), msg.line());
        if let Some(errno) = msg.os_errno() {
            text.push_str(&format!(
                " : {}",
                std::io::Error::from_raw_os_error(errno)
            ));
        }
        let mut rendered = Message::new(Channel::Info, msg.severity(), text)
            .with_error_code(msg.error_code());
        if let Some(errno) = msg.os_errno() {
            rendered = rendered.with_os_errno(errno);
        }
        rendered
    }
}
