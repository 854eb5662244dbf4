//! Built-in commands: policy setters, messages, program control.
//!
//! Invalid parameters are SORRY events with a failure return, so the
//! checkpoint decides whether processing goes on.

use std::path::Path;

use isoctl_types::config::SignalBehavior;
use isoctl_types::error::Result;
use isoctl_types::severity::Threshold;

use crate::interpreter::{Arity, Command, CommandRegistry, Dispatch, Eligibility, Environment, RunFlags};
use crate::session::{DialogMode, EndKind, Phase};
use crate::signals;

/// Register all built-in commands into a registry.
pub fn register_builtins(reg: &mut CommandRegistry) {
    // Policy knobs, also honoured during prescan.
    reg.register(Box::new(AbortOnCmd));
    reg.register(Box::new(ReportAboutCmd));
    reg.register(Box::new(ReturnWithCmd));
    reg.register(Box::new(ListDelimiterCmd));
    reg.register(Box::new(SignalHandlingCmd));
    reg.register(Box::new(UnknownCommandCmd));
    reg.register(Box::new(NoRcCmd));
    // Help and messages.
    reg.register(Box::new(HelpCmd));
    reg.register(Box::new(ProgHelpCmd));
    reg.register(Box::new(VersionCmd));
    reg.register(Box::new(PrintCmd));
    reg.register(Box::new(MarkCmd));
    reg.register(Box::new(ProgCmd));
    // Program control.
    reg.register(Box::new(EndCmd));
    reg.register(Box::new(RollbackEndCmd));
    reg.register(Box::new(DialogCmd));
    reg.register(Box::new(PromptCmd));
    reg.register(Box::new(OptionsFromFileCmd));
    reg.register(Box::new(AsCmd));
}

/// Handler code for the outcome of a nested dispatch.
fn nested_code(dispatch: Dispatch) -> i32 {
    if dispatch.is_abort() { -1 } else { 1 }
}

fn threshold_param(env: &mut Environment<'_>, cmd: &str, name: &str) -> Option<Threshold> {
    match name.parse::<Threshold>() {
        Ok(t) => Some(t),
        Err(_) => {
            env.session
                .sorry(format!("{cmd}: Unknown severity name '{name}'"));
            None
        },
    }
}

// ---------------------------------------------------------------------------
// -abort_on / -report_about / -return_with
// ---------------------------------------------------------------------------

struct AbortOnCmd;
impl Command for AbortOnCmd {
    fn name(&self) -> &str {
        "-abort_on"
    }
    fn description(&self) -> &str {
        "Set the problem status that aborts processing"
    }
    fn usage(&self) -> &str {
        "-abort_on severity"
    }
    fn category(&self) -> &str {
        "policy"
    }
    fn arity(&self) -> Arity {
        Arity::Fixed(1)
    }
    fn eligibility(&self) -> Eligibility {
        Eligibility::Both
    }
    fn execute(&self, args: &[&str], env: &mut Environment<'_>) -> Result<i32> {
        let Some(t) = threshold_param(env, self.name(), args[0]) else {
            return Ok(0);
        };
        env.session.status.policy.abort_on = t;
        Ok(1)
    }
}

struct ReportAboutCmd;
impl Command for ReportAboutCmd {
    fn name(&self) -> &str {
        "-report_about"
    }
    fn description(&self) -> &str {
        "Set the minimum severity of reported messages"
    }
    fn usage(&self) -> &str {
        "-report_about severity"
    }
    fn category(&self) -> &str {
        "policy"
    }
    fn arity(&self) -> Arity {
        Arity::Fixed(1)
    }
    fn eligibility(&self) -> Eligibility {
        Eligibility::Both
    }
    fn execute(&self, args: &[&str], env: &mut Environment<'_>) -> Result<i32> {
        let Some(t) = threshold_param(env, self.name(), args[0]) else {
            return Ok(0);
        };
        env.session.status.policy.report_about = t;
        Ok(1)
    }
}

struct ReturnWithCmd;
impl Command for ReturnWithCmd {
    fn name(&self) -> &str {
        "-return_with"
    }
    fn description(&self) -> &str {
        "Set the severity and exit value for a non-zero program exit"
    }
    fn usage(&self) -> &str {
        "-return_with severity exit_value"
    }
    fn category(&self) -> &str {
        "policy"
    }
    fn arity(&self) -> Arity {
        Arity::Fixed(2)
    }
    fn eligibility(&self) -> Eligibility {
        Eligibility::Both
    }
    fn execute(&self, args: &[&str], env: &mut Environment<'_>) -> Result<i32> {
        let Some(t) = threshold_param(env, self.name(), args[0]) else {
            return Ok(0);
        };
        let value = match args[1].parse::<i32>() {
            Ok(v) if (0..=255).contains(&v) => v,
            _ => {
                return Ok(env.session.sorry(format!(
                    "-return_with: exit value '{}' is not in range 0 to 255",
                    args[1]
                )));
            },
        };
        env.session.status.policy.return_with = t;
        env.session.status.policy.return_exit_value = value;
        Ok(1)
    }
}

// ---------------------------------------------------------------------------
// -list_delimiter / -signal_handling / -unknown_command / -no_rc
// ---------------------------------------------------------------------------

struct ListDelimiterCmd;
impl Command for ListDelimiterCmd {
    fn name(&self) -> &str {
        "-list_delimiter"
    }
    fn description(&self) -> &str {
        "Set the word that ends variable-length parameter lists"
    }
    fn usage(&self) -> &str {
        "-list_delimiter word"
    }
    fn category(&self) -> &str {
        "policy"
    }
    fn arity(&self) -> Arity {
        Arity::Fixed(1)
    }
    fn eligibility(&self) -> Eligibility {
        Eligibility::Both
    }
    fn execute(&self, args: &[&str], env: &mut Environment<'_>) -> Result<i32> {
        if args[0].is_empty() {
            return Ok(env.session.sorry("-list_delimiter: empty text is not allowed"));
        }
        env.session.list_delimiter = args[0].to_string();
        Ok(1)
    }
}

struct SignalHandlingCmd;
impl Command for SignalHandlingCmd {
    fn name(&self) -> &str {
        "-signal_handling"
    }
    fn description(&self) -> &str {
        "Choose how process signals are handled (on, off, sig_dfl, sig_ign)"
    }
    fn usage(&self) -> &str {
        "-signal_handling mode"
    }
    fn category(&self) -> &str {
        "policy"
    }
    fn arity(&self) -> Arity {
        Arity::Fixed(1)
    }
    fn eligibility(&self) -> Eligibility {
        Eligibility::Both
    }
    fn execute(&self, args: &[&str], env: &mut Environment<'_>) -> Result<i32> {
        let mode = match args[0].parse::<SignalBehavior>() {
            Ok(mode) => mode,
            Err(e) => return Ok(env.session.sorry(format!("-signal_handling: {e}"))),
        };
        env.session.signal_handling = mode;
        if env.session.phase() == Phase::Ready {
            signals::apply(mode, env.session.status.abort_request().as_atomic());
        }
        Ok(1)
    }
}

struct UnknownCommandCmd;
impl Command for UnknownCommandCmd {
    fn name(&self) -> &str {
        "-unknown_command"
    }
    fn description(&self) -> &str {
        "Report unknown commands leniently or as FAILURE"
    }
    fn usage(&self) -> &str {
        "-unknown_command lenient|strict"
    }
    fn category(&self) -> &str {
        "policy"
    }
    fn arity(&self) -> Arity {
        Arity::Fixed(1)
    }
    fn eligibility(&self) -> Eligibility {
        Eligibility::Both
    }
    fn execute(&self, args: &[&str], env: &mut Environment<'_>) -> Result<i32> {
        env.session.strict_unknown_commands = match args[0] {
            "lenient" => false,
            "strict" => true,
            other => {
                return Ok(env
                    .session
                    .sorry(format!("-unknown_command: unknown mode '{other}'")));
            },
        };
        Ok(1)
    }
}

struct NoRcCmd;
impl Command for NoRcCmd {
    fn name(&self) -> &str {
        "-no_rc"
    }
    fn description(&self) -> &str {
        "Skip the startup files (only as first argument)"
    }
    fn usage(&self) -> &str {
        "-no_rc"
    }
    fn category(&self) -> &str {
        "policy"
    }
    fn eligibility(&self) -> Eligibility {
        Eligibility::BothFirstInPrescan
    }
    fn execute(&self, _args: &[&str], env: &mut Environment<'_>) -> Result<i32> {
        if env.session.phase() == Phase::Prescan {
            env.session.no_rc = true;
        }
        Ok(1)
    }
}

// ---------------------------------------------------------------------------
// -help / -prog_help / -version
// ---------------------------------------------------------------------------

fn emit_help(env: &mut Environment<'_>, text: &str) {
    for line in text.lines() {
        env.session.result(line);
    }
    if env.session.phase() == Phase::Prescan {
        env.session.request_end(EndKind::Program);
    }
}

struct HelpCmd;
impl Command for HelpCmd {
    fn name(&self) -> &str {
        "-help"
    }
    fn description(&self) -> &str {
        "List available commands"
    }
    fn usage(&self) -> &str {
        "-help"
    }
    fn eligibility(&self) -> Eligibility {
        Eligibility::BothSoleInPrescan
    }
    fn execute(&self, _args: &[&str], env: &mut Environment<'_>) -> Result<i32> {
        let text = env.registry.help_text(None)?;
        emit_help(env, &text);
        Ok(1)
    }
}

struct ProgHelpCmd;
impl Command for ProgHelpCmd {
    fn name(&self) -> &str {
        "-prog_help"
    }
    fn description(&self) -> &str {
        "Describe one command"
    }
    fn usage(&self) -> &str {
        "-prog_help command"
    }
    fn arity(&self) -> Arity {
        Arity::Fixed(1)
    }
    fn eligibility(&self) -> Eligibility {
        Eligibility::BothSoleInPrescan
    }
    fn execute(&self, args: &[&str], env: &mut Environment<'_>) -> Result<i32> {
        match env.registry.help_text(Some(args[0])) {
            Ok(text) => {
                emit_help(env, &text);
                Ok(1)
            },
            Err(e) => Ok(env.session.sorry(format!("-prog_help: {e}"))),
        }
    }
}

struct VersionCmd;
impl Command for VersionCmd {
    fn name(&self) -> &str {
        "-version"
    }
    fn description(&self) -> &str {
        "Print the program version"
    }
    fn usage(&self) -> &str {
        "-version"
    }
    fn execute(&self, _args: &[&str], env: &mut Environment<'_>) -> Result<i32> {
        let line = format!(
            "{} {}",
            env.session.status.program(),
            env!("CARGO_PKG_VERSION")
        );
        env.session.result(line);
        Ok(1)
    }
}

// ---------------------------------------------------------------------------
// -print / -mark / -prog
// ---------------------------------------------------------------------------

struct PrintCmd;
impl Command for PrintCmd {
    fn name(&self) -> &str {
        "-print"
    }
    fn description(&self) -> &str {
        "Put out a result line"
    }
    fn usage(&self) -> &str {
        "-print text"
    }
    fn category(&self) -> &str {
        "messages"
    }
    fn arity(&self) -> Arity {
        Arity::Fixed(1)
    }
    fn execute(&self, args: &[&str], env: &mut Environment<'_>) -> Result<i32> {
        env.session.result(args[0]);
        Ok(1)
    }
}

struct MarkCmd;
impl Command for MarkCmd {
    fn name(&self) -> &str {
        "-mark"
    }
    fn description(&self) -> &str {
        "Set the text put out after each dialog line"
    }
    fn usage(&self) -> &str {
        "-mark text"
    }
    fn category(&self) -> &str {
        "messages"
    }
    fn arity(&self) -> Arity {
        Arity::Fixed(1)
    }
    fn execute(&self, args: &[&str], env: &mut Environment<'_>) -> Result<i32> {
        env.session.mark = args[0].to_string();
        Ok(1)
    }
}

struct ProgCmd;
impl Command for ProgCmd {
    fn name(&self) -> &str {
        "-prog"
    }
    fn description(&self) -> &str {
        "Set the program name used in info messages"
    }
    fn usage(&self) -> &str {
        "-prog name"
    }
    fn category(&self) -> &str {
        "messages"
    }
    fn arity(&self) -> Arity {
        Arity::Fixed(1)
    }
    fn execute(&self, args: &[&str], env: &mut Environment<'_>) -> Result<i32> {
        env.session.status.set_program(args[0]);
        Ok(1)
    }
}

// ---------------------------------------------------------------------------
// -end / -rollback_end
// ---------------------------------------------------------------------------

struct EndCmd;
impl Command for EndCmd {
    fn name(&self) -> &str {
        "-end"
    }
    fn description(&self) -> &str {
        "End the program run"
    }
    fn usage(&self) -> &str {
        "-end"
    }
    fn category(&self) -> &str {
        "control"
    }
    fn execute(&self, _args: &[&str], env: &mut Environment<'_>) -> Result<i32> {
        env.session.request_end(EndKind::Run);
        Ok(1)
    }
}

struct RollbackEndCmd;
impl Command for RollbackEndCmd {
    fn name(&self) -> &str {
        "-rollback_end"
    }
    fn description(&self) -> &str {
        "Discard pending changes and end the program run"
    }
    fn usage(&self) -> &str {
        "-rollback_end"
    }
    fn category(&self) -> &str {
        "control"
    }
    fn execute(&self, _args: &[&str], env: &mut Environment<'_>) -> Result<i32> {
        env.session.discard_pending_change();
        env.session.request_end(EndKind::Run);
        Ok(1)
    }
}

// ---------------------------------------------------------------------------
// -dialog / -prompt
// ---------------------------------------------------------------------------

struct DialogCmd;
impl Command for DialogCmd {
    fn name(&self) -> &str {
        "-dialog"
    }
    fn description(&self) -> &str {
        "Enable or disable reading commands from standard input"
    }
    fn usage(&self) -> &str {
        "-dialog on|off|single_line"
    }
    fn category(&self) -> &str {
        "control"
    }
    fn arity(&self) -> Arity {
        Arity::Fixed(1)
    }
    fn execute(&self, args: &[&str], env: &mut Environment<'_>) -> Result<i32> {
        env.session.dialog = match args[0] {
            "on" => DialogMode::On,
            "off" => DialogMode::Off,
            "single_line" => DialogMode::SingleLine,
            other => return Ok(env.session.sorry(format!("-dialog: unknown mode '{other}'"))),
        };
        Ok(1)
    }
}

struct PromptCmd;
impl Command for PromptCmd {
    fn name(&self) -> &str {
        "-prompt"
    }
    fn description(&self) -> &str {
        "Set the dialog prompt"
    }
    fn usage(&self) -> &str {
        "-prompt text"
    }
    fn category(&self) -> &str {
        "control"
    }
    fn arity(&self) -> Arity {
        Arity::Fixed(1)
    }
    fn execute(&self, args: &[&str], env: &mut Environment<'_>) -> Result<i32> {
        env.session.prompt = args[0].to_string();
        Ok(1)
    }
}

// ---------------------------------------------------------------------------
// -options_from_file / -as
// ---------------------------------------------------------------------------

struct OptionsFromFileCmd;
impl Command for OptionsFromFileCmd {
    fn name(&self) -> &str {
        "-options_from_file"
    }
    fn description(&self) -> &str {
        "Execute the commands listed in a file, one per line"
    }
    fn usage(&self) -> &str {
        "-options_from_file path"
    }
    fn category(&self) -> &str {
        "control"
    }
    fn arity(&self) -> Arity {
        Arity::Fixed(1)
    }
    fn execute(&self, args: &[&str], env: &mut Environment<'_>) -> Result<i32> {
        let dispatch = env
            .registry
            .run_option_file(env.session, Path::new(args[0]))?;
        Ok(nested_code(dispatch))
    }
}

struct AsCmd;
impl Command for AsCmd {
    fn name(&self) -> &str {
        "-as"
    }
    fn description(&self) -> &str {
        "Interpret the following arguments in a foreign personality"
    }
    fn usage(&self) -> &str {
        "-as personality [arguments...]"
    }
    fn category(&self) -> &str {
        "control"
    }
    fn arity(&self) -> Arity {
        Arity::Variable
    }
    fn execute(&self, args: &[&str], env: &mut Environment<'_>) -> Result<i32> {
        let Some((personality, rest)) = args.split_first() else {
            return Ok(env.session.sorry("-as: no personality given"));
        };
        let Some(emulator) = env.registry.emulation(personality) else {
            return Ok(env
                .session
                .sorry(format!("-as: unsupported personality '{personality}'")));
        };
        let translated = emulator.translate(rest)?;
        let mut argv = Vec::with_capacity(translated.len() + 1);
        argv.push(env.session.status.program().to_string());
        argv.extend(translated);
        let mut idx = 1;
        let dispatch = env
            .registry
            .interpret(env.session, &argv, &mut idx, RunFlags::nested())?;
        Ok(nested_code(dispatch))
    }
}
