//! isoctl command-line entry point.
//!
//! Runs the program arguments through prescan, library startup, the startup
//! files, the full interpreter, and finally the dialog on standard input.
//! The exit value follows the worst problem severity seen.
//!
//! Set `ISOCTL_CONFIG` to a TOML file to seed the policy settings.

use std::io::BufRead;
use std::path::Path;

use anyhow::{Context as _, Result};

use isoctl_msgs::SubmitFlags;
use isoctl_terminal::{Context, ContextOptions, Dispatch, PrescanFlags, RunFlags};
use isoctl_types::config::Settings;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let argv: Vec<String> = std::env::args().collect();
    let program = argv.first().map_or("isoctl", String::as_str);
    let settings = load_settings()?;

    let mut ctx = Context::with_options(
        program,
        ContextOptions {
            settings,
            ..ContextOptions::default()
        },
    );
    let code = run(&mut ctx, &argv, std::io::stdin().lock())?;
    ctx.destroy(true)?;
    log::debug!("Exit value {code}");
    std::process::exit(code);
}

/// Settings from the file named by `ISOCTL_CONFIG`, or the defaults.
fn load_settings() -> Result<Settings> {
    match std::env::var_os("ISOCTL_CONFIG") {
        Some(path) => {
            let path = Path::new(&path);
            Settings::load(path)
                .with_context(|| format!("loading settings from {}", path.display()))
        },
        None => Ok(Settings::default()),
    }
}

/// Drive one context through a whole program run and compute the exit value.
fn run(ctx: &mut Context, argv: &[String], dialog_input: impl BufRead) -> Result<i32> {
    match ctx.prescan_args(argv, PrescanFlags::default())? {
        Dispatch::EndProgram => return Ok(0),
        d if d.is_abort() => return Ok(ctx.make_return_value()),
        _ => {},
    }
    ctx.startup()?;

    let mut outcome = ctx.read_rc()?;
    if !outcome.stops() {
        let mut idx = 1;
        outcome = ctx.interpreter(argv, &mut idx, RunFlags::main_args())?;
    }
    if !outcome.stops() {
        outcome = ctx.dialog(dialog_input)?;
    }
    log::debug!("Command processing ended with {outcome}");

    if outcome != Dispatch::EndRun && ctx.change_is_pending() {
        ctx.submit(
            0,
            "Image changes are pending. Use -commit or -rollback_end before ending the program.",
            0,
            "NOTE",
            SubmitFlags::default(),
        )?;
    }
    Ok(ctx.make_return_value())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};

    use isoctl_msgs::MemoryOutput;
    use isoctl_terminal::{LibraryGuard, NoHooks};
    use isoctl_types::config::SignalBehavior;
    use isoctl_types::message::Channel;

    fn context(rc_files: Vec<std::path::PathBuf>) -> (Context, MemoryOutput) {
        let out = MemoryOutput::new();
        let ctx = Context::with_options(
            "isoctl",
            ContextOptions {
                settings: Settings {
                    signal_handling: SignalBehavior::NoHandling,
                    rc_files,
                    ..Settings::default()
                },
                output: Box::new(out.clone()),
                guard: LibraryGuard::new(Box::new(NoHooks)),
                queue: None,
            },
        );
        (ctx, out)
    }

    fn argv(words: &[&str]) -> Vec<String> {
        std::iter::once("isoctl")
            .chain(words.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn clean_run_exits_zero() {
        let (mut ctx, out) = context(Vec::new());
        let code = run(&mut ctx, &argv(&["-print", "hi"]), Cursor::new("")).unwrap();
        assert_eq!(code, 0);
        assert_eq!(out.texts(Channel::Result), vec!["hi"]);
        ctx.destroy(true).unwrap();
    }

    #[test]
    fn sorry_sets_exit_value() {
        let (mut ctx, _) = context(Vec::new());
        let code = run(&mut ctx, &argv(&["-bogus"]), Cursor::new("")).unwrap();
        assert_eq!(code, 32);
    }

    #[test]
    fn return_with_is_honoured() {
        let (mut ctx, _) = context(Vec::new());
        let words = ["-return_with", "FAILURE", "5", "-bogus"];
        let code = run(&mut ctx, &argv(&words), Cursor::new("")).unwrap();
        assert_eq!(code, 0);
    }

    #[test]
    fn prescan_help_ends_before_startup() {
        let (mut ctx, out) = context(Vec::new());
        let code = run(&mut ctx, &argv(&["-help"]), Cursor::new("")).unwrap();
        assert_eq!(code, 0);
        assert!(!out.texts(Channel::Result).is_empty());
        assert!(ctx.startup().is_err());
    }

    #[test]
    fn dialog_follows_arguments() {
        let (mut ctx, out) = context(Vec::new());
        let code = run(
            &mut ctx,
            &argv(&["-dialog", "single_line", "-prompt", "?"]),
            Cursor::new("-print from_dialog\n"),
        )
        .unwrap();
        assert_eq!(code, 0);
        assert!(
            out.texts(Channel::Result)
                .contains(&"from_dialog".to_string())
        );
    }

    #[test]
    fn rc_end_skips_arguments() {
        let mut rc = tempfile::NamedTempFile::new().unwrap();
        writeln!(rc, "-end").unwrap();
        let (mut ctx, out) = context(vec![rc.path().to_path_buf()]);
        run(&mut ctx, &argv(&["-print", "skipped"]), Cursor::new("")).unwrap();
        assert!(out.texts(Channel::Result).is_empty());
    }

    #[test]
    fn pending_change_hint() {
        let (mut ctx, out) = context(Vec::new());
        ctx.session_mut().mark_change_pending();
        run(&mut ctx, &argv(&[]), Cursor::new("")).unwrap();
        assert!(
            out.texts(Channel::Info)
                .iter()
                .any(|l| l.contains("Image changes are pending"))
        );
    }
}
