//! Command trait, registry, and dispatch logic.
//!
//! An argument vector is walked with a cursor: each step resolves the command
//! at the cursor, hands it its parameter span, and feeds the handler's return
//! code into the problem-status checkpoint. Argument vectors follow the usual
//! layout with the program name at index 0, so a fresh cursor starts at 1.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use isoctl_msgs::{Advice, EvalFlags};
use isoctl_types::error::{IsoctlError, Result};
use isoctl_types::severity::Severity;

use crate::emulation::Emulator;
use crate::session::{EndKind, Phase, Session};

/// Maximum depth of nested dispatch (option files, emulation, dialog lines).
pub const MAX_NESTING: usize = 16;

/// How many parameters a command consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    /// Exactly this many following tokens.
    Fixed(usize),
    /// Everything up to the list delimiter or the end of the vector.
    Variable,
}

/// In which interpreter phase a command may run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Eligibility {
    /// After startup only.
    #[default]
    Full,
    /// Before startup only.
    Prescan,
    /// Both phases.
    Both,
    /// Both phases; during prescan only as the very first argument.
    BothFirstInPrescan,
    /// Both phases; during prescan only when it is the sole command.
    BothSoleInPrescan,
}

impl Eligibility {
    fn in_prescan(self, first: bool, sole: bool) -> bool {
        match self {
            Eligibility::Full => false,
            Eligibility::Prescan | Eligibility::Both => true,
            Eligibility::BothFirstInPrescan => first,
            Eligibility::BothSoleInPrescan => sole,
        }
    }

    fn in_full(self) -> bool {
        self != Eligibility::Prescan
    }
}

/// Where a dispatch originates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Invocation {
    /// The primary argument vector.
    #[default]
    TopLevel,
    /// An option file, an emulation expansion, or a dialog line.
    Nested,
}

/// Options for one [`CommandRegistry::interpret`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunFlags {
    pub invocation: Invocation,
    /// These are the program's start arguments.
    pub main_args: bool,
    /// Unknown commands are FAILURE events regardless of the session default.
    pub strict_unknown: bool,
}

impl RunFlags {
    /// Flags for the program's own argument vector.
    pub fn main_args() -> Self {
        Self {
            main_args: true,
            ..Self::default()
        }
    }

    pub fn nested() -> Self {
        Self {
            invocation: Invocation::Nested,
            ..Self::default()
        }
    }
}

/// Options for one [`CommandRegistry::prescan`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PrescanFlags {
    /// Leave `argv[1]` alone.
    pub skip_first: bool,
    /// Report unknown commands as FAILURE events instead of ignoring them.
    pub strict_unknown: bool,
}

/// Outcome of a dispatch run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Processing must stop (-1).
    Abort,
    /// Processing must stop because the abort request was raised (-2).
    AbortRequested,
    /// Graceful end of the program (0).
    EndProgram,
    /// Everything succeeded (1).
    Continue,
    /// A problem occurred but was tolerated (2).
    Pardoned,
    /// An end-of-run directive was encountered (3).
    EndRun,
}

impl Dispatch {
    pub fn code(self) -> i32 {
        match self {
            Dispatch::Abort => -1,
            Dispatch::AbortRequested => -2,
            Dispatch::EndProgram => 0,
            Dispatch::Continue => 1,
            Dispatch::Pardoned => 2,
            Dispatch::EndRun => 3,
        }
    }

    pub fn is_abort(self) -> bool {
        self.code() < 0
    }

    /// Whether the caller should stop feeding further commands.
    pub fn stops(self) -> bool {
        matches!(
            self,
            Dispatch::Abort | Dispatch::AbortRequested | Dispatch::EndProgram | Dispatch::EndRun
        )
    }
}

impl fmt::Display for Dispatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self, self.code())
    }
}

/// Shared mutable environment passed to every command.
pub struct Environment<'a> {
    pub session: &'a mut Session,
    /// The registry that dispatched the command, for nested dispatch.
    pub registry: &'a CommandRegistry,
    pub invocation: Invocation,
}

/// A single executable command.
pub trait Command {
    /// The command name as it appears in an argument vector, e.g. "-abort_on".
    fn name(&self) -> &str;

    /// One-line description for `-help`.
    fn description(&self) -> &str;

    /// Usage string (e.g. "-abort_on severity").
    fn usage(&self) -> &str;

    /// Command category for grouping in `-help` output.
    fn category(&self) -> &str {
        "general"
    }

    fn arity(&self) -> Arity {
        Arity::Fixed(0)
    }

    fn eligibility(&self) -> Eligibility {
        Eligibility::Full
    }

    /// Execute the command with its parameter span.
    ///
    /// Returns the handler code fed to the checkpoint: positive for success,
    /// 0 for a local failure, negative for a hard failure.
    fn execute(&self, args: &[&str], env: &mut Environment<'_>) -> Result<i32>;
}

/// Parameter span of one command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Span {
    start: usize,
    end: usize,
    /// Cursor position after the command, past a terminating delimiter.
    next: usize,
}

/// Result of one dispatch step.
enum Step {
    Checked(Advice),
    End(EndKind),
    Skipped,
}

/// Registry of available commands and emulations with dispatch.
pub struct CommandRegistry {
    commands: HashMap<String, Box<dyn Command>>,
    emulations: HashMap<String, Box<dyn Emulator>>,
}

impl CommandRegistry {
    /// Create an empty command registry.
    pub fn new() -> Self {
        Self {
            commands: HashMap::new(),
            emulations: HashMap::new(),
        }
    }

    /// Register a command. Replaces any existing command with the same name.
    pub fn register(&mut self, cmd: Box<dyn Command>) {
        self.commands.insert(cmd.name().to_string(), cmd);
    }

    /// Register an emulation under its personality name.
    pub fn register_emulation(&mut self, emulator: Box<dyn Emulator>) {
        self.emulations
            .insert(emulator.personality().to_string(), emulator);
    }

    pub fn emulation(&self, personality: &str) -> Option<&dyn Emulator> {
        self.emulations.get(personality).map(|e| e.as_ref())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.commands.contains_key(name)
    }

    /// List all registered commands as (name, description), sorted by name.
    pub fn list_commands(&self) -> Vec<(&str, &str)> {
        let mut cmds: Vec<(&str, &str)> = self
            .commands
            .values()
            .map(|c| (c.name(), c.description()))
            .collect();
        cmds.sort_by_key(|(name, _)| *name);
        cmds
    }

    /// Help text for one command, or for all of them grouped by category.
    pub fn help_text(&self, name: Option<&str>) -> Result<String> {
        if let Some(name) = name {
            let cmd = self
                .commands
                .get(name)
                .ok_or_else(|| IsoctlError::Command(format!("unknown command: {name}")))?;
            return Ok(format!(
                "{} ({})\n  {}\n  Usage: {}",
                cmd.name(),
                cmd.category(),
                cmd.description(),
                cmd.usage()
            ));
        }

        let mut categories: HashMap<&str, Vec<(&str, &str)>> = HashMap::new();
        for cmd in self.commands.values() {
            categories
                .entry(cmd.category())
                .or_default()
                .push((cmd.name(), cmd.description()));
        }
        let mut cats: Vec<&str> = categories.keys().copied().collect();
        cats.sort();

        let mut out = format!("Commands ({}):\n", self.commands.len());
        for cat in cats {
            let mut cmds = categories.remove(cat).unwrap_or_default();
            cmds.sort_by_key(|(name, _)| *name);
            out.push_str(&format!("\n  [{cat}]\n"));
            for (name, desc) in cmds {
                out.push_str(&format!("    {name:18} {desc}\n"));
            }
        }
        out.push_str("\nUse '-prog_help <command>' for details.");
        Ok(out)
    }

    // -----------------------------------------------------------------------
    // Full interpreter
    // -----------------------------------------------------------------------

    /// Dispatch every command of `argv` starting at `*idx`.
    ///
    /// Stops early on abort advice or an end request. On return `*idx`
    /// points past everything consumed.
    pub fn interpret(
        &self,
        session: &mut Session,
        argv: &[String],
        idx: &mut usize,
        flags: RunFlags,
    ) -> Result<Dispatch> {
        match session.phase {
            Phase::Prescan => return Err(IsoctlError::NotStarted),
            Phase::Terminated => return Err(IsoctlError::Terminated),
            Phase::Ready => {},
        }
        if *idx < 1 || *idx > argv.len() {
            return Err(IsoctlError::CursorOutOfRange {
                idx: *idx,
                argc: argv.len(),
            });
        }

        if flags.main_args && flags.invocation == Invocation::TopLevel && !session.main_args_seen {
            session.main_args_seen = true;
            if let Some(personality) = session.emulation.personality()
                && *idx < argv.len()
            {
                let args: Vec<&str> = argv[*idx..].iter().map(String::as_str).collect();
                *idx = argv.len();
                return self.emulate(session, personality, &args, flags);
            }
        }
        self.enter(session, argv, idx, flags)
    }

    /// Tokenize `line` and dispatch the words as a nested argument vector.
    pub fn execute_line(&self, session: &mut Session, line: &str, flags: RunFlags) -> Result<Dispatch> {
        let tokens = tokenize(line)?;
        if tokens.is_empty() {
            return Ok(Dispatch::Continue);
        }
        let mut argv = Vec::with_capacity(tokens.len() + 1);
        argv.push(session.status.program().to_string());
        argv.extend(tokens);
        let mut idx = 1;
        let flags = RunFlags {
            invocation: Invocation::Nested,
            main_args: false,
            ..flags
        };
        self.interpret(session, &argv, &mut idx, flags)
    }

    /// Execute every line of an option file.
    ///
    /// Blank lines and lines starting with `#` are skipped. A line that does
    /// not tokenize is a SORRY event; the file goes on.
    pub fn run_option_file(&self, session: &mut Session, path: &Path) -> Result<Dispatch> {
        let content = std::fs::read_to_string(path)?;
        log::debug!("Reading option file {}", path.display());
        let mut ignored = false;
        for (lineno, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            match self.execute_line(session, line, RunFlags::nested()) {
                Ok(d) if d.stops() => return Ok(d),
                Ok(Dispatch::Pardoned) => ignored = true,
                Ok(_) => {},
                Err(e @ IsoctlError::Parse(_)) => {
                    session.sorry(format!("{}:{}: {e}", path.display(), lineno + 1));
                    ignored = true;
                },
                Err(e) => return Err(e),
            }
        }
        Ok(if ignored {
            Dispatch::Pardoned
        } else {
            Dispatch::Continue
        })
    }

    /// Translate the whole program argument list through an emulation.
    ///
    /// The list delimiter has no meaning here; every word belongs to the
    /// emulated program.
    fn emulate(
        &self,
        session: &mut Session,
        personality: &str,
        args: &[&str],
        flags: RunFlags,
    ) -> Result<Dispatch> {
        log::info!("Routing program arguments through {personality} emulation");
        let check = EvalFlags {
            quiet: false,
            check_abort_request: true,
        };
        let translated = match self.emulation(personality) {
            Some(emulator) => emulator.translate(args),
            None => Err(IsoctlError::Command(format!(
                "unsupported personality '{personality}'"
            ))),
        };
        let translated = match translated {
            Ok(words) => words,
            Err(e) => {
                session.event(Severity::Failure, format!("{personality} emulation: {e}"));
                return Ok(match session.status.evaluate(0, check) {
                    Advice::Abort => Dispatch::Abort,
                    Advice::AbortRequested => Dispatch::AbortRequested,
                    _ => Dispatch::Pardoned,
                });
            },
        };
        let mut routed = Vec::with_capacity(translated.len() + 1);
        routed.push(session.status.program().to_string());
        routed.extend(translated);
        let mut sub = 1;
        let nested = RunFlags {
            invocation: Invocation::Nested,
            main_args: false,
            ..flags
        };
        self.enter(session, &routed, &mut sub, nested)
    }

    fn enter(
        &self,
        session: &mut Session,
        argv: &[String],
        idx: &mut usize,
        flags: RunFlags,
    ) -> Result<Dispatch> {
        if session.nesting >= MAX_NESTING {
            return Err(IsoctlError::Command(format!(
                "command nesting deeper than {MAX_NESTING} levels"
            )));
        }
        session.nesting += 1;
        let outcome = self.run(session, argv, idx, flags);
        session.nesting -= 1;
        Ok(outcome)
    }

    fn run(&self, session: &mut Session, argv: &[String], idx: &mut usize, flags: RunFlags) -> Dispatch {
        let mut ignored = false;
        while *idx < argv.len() {
            match self.step(session, argv, idx, flags) {
                Step::Skipped => {},
                Step::End(EndKind::Program) => return Dispatch::EndProgram,
                Step::End(EndKind::Run) => return Dispatch::EndRun,
                Step::Checked(Advice::Abort) => return Dispatch::Abort,
                Step::Checked(Advice::AbortRequested) => return Dispatch::AbortRequested,
                Step::Checked(Advice::Pardoned | Advice::Failed) => ignored = true,
                Step::Checked(Advice::Success) => {},
            }
        }
        if ignored {
            Dispatch::Pardoned
        } else {
            Dispatch::Continue
        }
    }

    /// Dispatch the single command at `*idx` and run the checkpoint.
    fn step(&self, session: &mut Session, argv: &[String], idx: &mut usize, flags: RunFlags) -> Step {
        let check = EvalFlags {
            quiet: false,
            check_abort_request: true,
        };
        let name = argv[*idx].as_str();
        let Some(cmd) = self.commands.get(name) else {
            *idx += 1;
            let sev = if flags.strict_unknown || session.strict_unknown_commands {
                Severity::Failure
            } else {
                session.unknown_command_severity
            };
            log::debug!("Unknown command {name:?} ({sev})");
            session.event(sev, format!("Not a known command: '{name}'"));
            return Step::Checked(session.status.evaluate(0, check));
        };

        let span = match span_of(cmd.as_ref(), argv, *idx, &session.list_delimiter) {
            Ok(span) => span,
            Err(e) => {
                *idx = argv.len();
                session.event(Severity::Failure, e.to_string());
                return Step::Checked(session.status.evaluate(0, check));
            },
        };
        if !cmd.eligibility().in_full() {
            *idx = span.next;
            return Step::Skipped;
        }

        let ret = self.invoke(cmd.as_ref(), session, argv, *idx, span, flags.invocation);
        *idx = span.next;
        if let Some(kind) = session.end {
            return Step::End(kind);
        }
        Step::Checked(session.status.evaluate(ret, check))
    }

    /// Run a handler; an `Err` becomes a FAILURE event and a local failure.
    fn invoke(
        &self,
        cmd: &dyn Command,
        session: &mut Session,
        argv: &[String],
        at: usize,
        span: Span,
        invocation: Invocation,
    ) -> i32 {
        let args: Vec<&str> = argv[span.start..span.end]
            .iter()
            .map(String::as_str)
            .collect();
        log::debug!("Dispatching {} with {} parameter(s)", cmd.name(), args.len());
        session.cursor = at;
        let outcome = {
            let mut env = Environment {
                session: &mut *session,
                registry: self,
                invocation,
            };
            cmd.execute(&args, &mut env)
        };
        match outcome {
            Ok(ret) => ret,
            Err(e) => {
                session.event(Severity::Failure, format!("{}: {e}", cmd.name()));
                0
            },
        }
    }

    // -----------------------------------------------------------------------
    // Prescan
    // -----------------------------------------------------------------------

    /// Run the commands that must take effect before startup.
    ///
    /// Other commands are stepped over. The list delimiter in effect at the
    /// start of the call is restored before returning.
    pub fn prescan(&self, session: &mut Session, argv: &[String], flags: PrescanFlags) -> Result<Dispatch> {
        if session.phase != Phase::Prescan {
            return Err(IsoctlError::AlreadyStarted);
        }
        let saved_delimiter = session.list_delimiter.clone();
        let outcome = self.prescan_loop(session, argv, flags);
        session.list_delimiter = saved_delimiter;
        Ok(outcome)
    }

    fn prescan_loop(&self, session: &mut Session, argv: &[String], flags: PrescanFlags) -> Dispatch {
        let check = EvalFlags::default();
        let mut idx = if flags.skip_first { 2 } else { 1 };
        let mut ignored = false;
        while idx < argv.len() {
            let name = argv[idx].as_str();
            let Some(cmd) = self.commands.get(name) else {
                idx += 1;
                if flags.strict_unknown {
                    session.event(Severity::Failure, format!("Not a known command: '{name}'"));
                    match session.status.evaluate(0, check) {
                        advice if advice.is_abort() => return Dispatch::Abort,
                        _ => ignored = true,
                    }
                }
                continue;
            };
            let Ok(span) = span_of(cmd.as_ref(), argv, idx, &session.list_delimiter) else {
                // Reported by the full interpreter.
                break;
            };
            let first = idx == 1;
            let sole = first && span.next == argv.len();
            if !cmd.eligibility().in_prescan(first, sole) {
                idx = span.next;
                continue;
            }

            let ret = self.invoke(cmd.as_ref(), session, argv, idx, span, Invocation::TopLevel);
            idx = span.next;
            match session.end {
                Some(EndKind::Program) => return Dispatch::EndProgram,
                Some(EndKind::Run) => return Dispatch::EndRun,
                None => {},
            }
            match session.status.evaluate(ret, check) {
                Advice::Abort => return Dispatch::Abort,
                Advice::AbortRequested => return Dispatch::AbortRequested,
                Advice::Pardoned | Advice::Failed => ignored = true,
                Advice::Success => {},
            }
        }
        if ignored {
            Dispatch::Pardoned
        } else {
            Dispatch::Continue
        }
    }
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Compute the parameter span of the command at `idx`.
fn span_of(cmd: &dyn Command, argv: &[String], idx: usize, delimiter: &str) -> Result<Span> {
    let start = idx + 1;
    match cmd.arity() {
        Arity::Fixed(n) => {
            if start + n > argv.len() {
                return Err(IsoctlError::ArgumentUnderflow {
                    command: cmd.name().to_string(),
                    needed: n,
                    available: argv.len().saturating_sub(start),
                });
            }
            Ok(Span {
                start,
                end: start + n,
                next: start + n,
            })
        },
        Arity::Variable => {
            let rest = argv.get(start..).unwrap_or_default();
            Ok(match rest.iter().position(|a| a == delimiter) {
                Some(off) => Span {
                    start,
                    end: start + off,
                    next: start + off + 1,
                },
                None => Span {
                    start,
                    end: argv.len(),
                    next: argv.len(),
                },
            })
        },
    }
}

// ---------------------------------------------------------------------------
// Tokenizer
// ---------------------------------------------------------------------------

/// Split a command line into words.
///
/// Whitespace separates words. A backslash makes the next character literal,
/// including whitespace. Single quotes take everything literally; inside
/// double quotes a backslash escapes only `"` and `\`.
pub fn tokenize(input: &str) -> Result<Vec<String>> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut chars = input.chars().peekable();
    let mut in_single = false;
    let mut in_double = false;

    while let Some(ch) = chars.next() {
        if in_single {
            if ch == '\'' {
                in_single = false;
            } else {
                current.push(ch);
            }
        } else if in_double {
            if ch == '"' {
                in_double = false;
            } else if ch == '\\'
                && let Some(next) = chars.next_if(|c| matches!(c, '"' | '\\'))
            {
                current.push(next);
            } else {
                current.push(ch);
            }
        } else {
            match ch {
                '\'' => {
                    in_single = true;
                    in_word = true;
                },
                '"' => {
                    in_double = true;
                    in_word = true;
                },
                '\\' => {
                    if let Some(next) = chars.next() {
                        current.push(next);
                    }
                    in_word = true;
                },
                c if c.is_whitespace() => {
                    if in_word {
                        tokens.push(std::mem::take(&mut current));
                        in_word = false;
                    }
                },
                _ => {
                    current.push(ch);
                    in_word = true;
                },
            }
        }
    }

    if in_single {
        return Err(IsoctlError::Parse("unterminated single quote".to_string()));
    }
    if in_double {
        return Err(IsoctlError::Parse("unterminated double quote".to_string()));
    }

    if in_word {
        tokens.push(current);
    }

    Ok(tokens)
}
