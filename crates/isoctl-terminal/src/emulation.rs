//! Program-name aliases and foreign command-line emulations.

use std::fmt;

use isoctl_types::error::Result;

/// Starting behavior selected from the invoking program's name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Emulation {
    #[default]
    Native,
    /// Native commands with image-to-disk copying enabled.
    Osirrox,
    /// Program arguments are mkisofs options.
    Mkisofs,
    /// Program arguments are cdrecord options.
    Cdrecord,
}

impl Emulation {
    /// The `-as` personality the program arguments are routed through.
    pub fn personality(self) -> Option<&'static str> {
        match self {
            Emulation::Mkisofs => Some("mkisofs"),
            Emulation::Cdrecord => Some("cdrecord"),
            Emulation::Native | Emulation::Osirrox => None,
        }
    }
}

impl fmt::Display for Emulation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Emulation::Native => "native",
            Emulation::Osirrox => "osirrox",
            Emulation::Mkisofs => "mkisofs",
            Emulation::Cdrecord => "cdrecord",
        })
    }
}

const PROGRAM_ALIASES: &[(&str, Emulation)] = &[
    ("osirrox", Emulation::Osirrox),
    ("xorrisofs", Emulation::Mkisofs),
    ("genisofs", Emulation::Mkisofs),
    ("mkisofs", Emulation::Mkisofs),
    ("genisoimage", Emulation::Mkisofs),
    ("xorrecord", Emulation::Cdrecord),
    ("cdrecord", Emulation::Cdrecord),
    ("wodim", Emulation::Cdrecord),
    ("cdrskin", Emulation::Cdrecord),
];

/// Resolve a program path to its starting emulation by leaf name.
pub fn resolve_program(program: &str) -> Emulation {
    let leaf = program.rsplit('/').next().unwrap_or(program);
    PROGRAM_ALIASES
        .iter()
        .find(|(name, _)| *name == leaf)
        .map(|(_, em)| *em)
        .unwrap_or_default()
}

/// Translates a foreign command line into native commands.
///
/// Registered per personality and invoked by `-as <personality> ...` and by
/// program-name emulation.
pub trait Emulator {
    /// Personality name, e.g. "mkisofs".
    fn personality(&self) -> &str;

    /// Produce the native argument list for `args`.
    fn translate(&self, args: &[&str]) -> Result<Vec<String>>;
}
