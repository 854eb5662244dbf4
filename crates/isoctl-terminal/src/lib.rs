//! Command interpreter and context lifecycle.
//!
//! The interpreter is a registry-based dispatch system. Commands implement
//! the `Command` trait and are registered by name. Argument vectors and
//! dialog lines are walked with a cursor; after every command the problem
//! status decides whether processing goes on.

mod commands;
mod context;
mod emulation;
mod interpreter;
mod library;
mod session;
mod signals;

/// Register the built-in setter and control commands into a registry.
pub use commands::register_builtins;
/// Context handle and its construction options.
pub use context::{Context, ContextOptions};
/// Program-name emulations and the `-as` translator trait.
pub use emulation::{Emulation, Emulator, resolve_program};
/// A single executable command and its dispatch contract.
pub use interpreter::{Arity, Command, Eligibility, Environment};
/// Registry of available commands with dispatch.
pub use interpreter::{
    CommandRegistry, Dispatch, Invocation, MAX_NESTING, PrescanFlags, RunFlags, tokenize,
};
/// Process-wide init-once / teardown-once guard.
pub use library::{LibraryGuard, LibraryHooks, NoHooks};
/// Per-context state seen by commands.
pub use session::{DEFAULT_PROMPT, DialogMode, EndKind, Phase, Session};
