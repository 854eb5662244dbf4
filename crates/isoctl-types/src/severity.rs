//! The severity table.
//!
//! Every message carries one of ten severities. Their declaration order is
//! their rank, and rank is the only ordering used anywhere in isoctl. The
//! name of a severity is its upper-case spelling; lookups are case-sensitive
//! and an unknown name is an error rather than a fallback.
//!
//! Thresholds (`-abort_on`, `-report_about`, `-return_with`) additionally
//! accept the pseudo-names `ALL` and `NEVER`, which sit below the lowest and
//! above the highest severity. They are not severities themselves.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{IsoctlError, Result};

/// Rank reported when no problem has been recorded.
pub const NO_PROBLEM_RANK: u8 = 0;

/// Name reported when no problem has been recorded.
pub const NO_PROBLEM_NAME: &str = "ALL";

/// A message severity, in ascending rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Debug = 1,
    Note,
    Update,
    Hint,
    Sorry,
    Warning,
    Mishap,
    Failure,
    Fatal,
    Abort,
}

impl Severity {
    /// The whole table, lowest rank first.
    pub const TABLE: [Severity; 10] = [
        Severity::Debug,
        Severity::Note,
        Severity::Update,
        Severity::Hint,
        Severity::Sorry,
        Severity::Warning,
        Severity::Mishap,
        Severity::Failure,
        Severity::Fatal,
        Severity::Abort,
    ];

    /// Numeric rank, 1 for DEBUG up to 10 for ABORT.
    pub fn rank(self) -> u8 {
        self as u8
    }

    /// Canonical upper-case name.
    pub fn name(self) -> &'static str {
        match self {
            Severity::Debug => "DEBUG",
            Severity::Note => "NOTE",
            Severity::Update => "UPDATE",
            Severity::Hint => "HINT",
            Severity::Sorry => "SORRY",
            Severity::Warning => "WARNING",
            Severity::Mishap => "MISHAP",
            Severity::Failure => "FAILURE",
            Severity::Fatal => "FATAL",
            Severity::Abort => "ABORT",
        }
    }

    /// Look up a severity by its exact name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::TABLE.into_iter().find(|s| s.name() == name)
    }

    /// Look up a severity by rank.
    pub fn from_rank(rank: u8) -> Option<Self> {
        Self::TABLE.into_iter().find(|s| s.rank() == rank)
    }

    /// Whether this severity counts as a problem rather than information.
    ///
    /// DEBUG through HINT are informational; SORRY and above are problems.
    pub fn is_problem(self) -> bool {
        self >= Severity::Sorry
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Severity {
    type Err = IsoctlError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_name(s).ok_or_else(|| IsoctlError::UnknownSeverity(s.to_string()))
    }
}

/// A configured severity threshold.
///
/// `All` is reached by every severity, `Never` by none.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Threshold {
    All,
    At(Severity),
    Never,
}

impl Threshold {
    /// Rank of the threshold: 0 for `ALL`, 11 for `NEVER`.
    pub fn rank(self) -> u8 {
        match self {
            Threshold::All => NO_PROBLEM_RANK,
            Threshold::At(sev) => sev.rank(),
            Threshold::Never => Severity::Abort.rank() + 1,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Threshold::All => "ALL",
            Threshold::At(sev) => sev.name(),
            Threshold::Never => "NEVER",
        }
    }

    /// Parse a threshold name: a severity name, `ALL`, or `NEVER`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "ALL" => Some(Threshold::All),
            "NEVER" => Some(Threshold::Never),
            other => Severity::from_name(other).map(Threshold::At),
        }
    }

    /// Whether a severity at `rank` reaches this threshold.
    pub fn is_reached_by_rank(self, rank: u8) -> bool {
        match self {
            Threshold::Never => false,
            _ => rank >= self.rank(),
        }
    }

    /// Whether `severity` reaches this threshold.
    pub fn is_reached_by(self, severity: Severity) -> bool {
        self.is_reached_by_rank(severity.rank())
    }
}

impl From<Severity> for Threshold {
    fn from(sev: Severity) -> Self {
        Threshold::At(sev)
    }
}

impl fmt::Display for Threshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Threshold {
    type Err = IsoctlError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_name(s).ok_or_else(|| IsoctlError::UnknownSeverity(s.to_string()))
    }
}

impl TryFrom<String> for Threshold {
    type Error = IsoctlError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Threshold> for String {
    fn from(t: Threshold) -> Self {
        t.name().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranks_ascend_in_table_order() {
        for pair in Severity::TABLE.windows(2) {
            assert!(pair[0].rank() < pair[1].rank());
            assert!(pair[0] < pair[1]);
        }
        assert_eq!(Severity::Debug.rank(), 1);
        assert_eq!(Severity::Abort.rank(), 10);
    }

    #[test]
    fn sorry_ranks_below_warning() {
        assert!(Severity::Sorry < Severity::Warning);
        assert!(Severity::Warning < Severity::Mishap);
    }

    #[test]
    fn name_round_trip() {
        for sev in Severity::TABLE {
            let by_name = Severity::from_name(sev.name()).unwrap();
            assert_eq!(by_name, sev);
            assert_eq!(Severity::from_rank(by_name.rank()).unwrap().name(), sev.name());
        }
    }

    #[test]
    fn lookup_is_case_sensitive() {
        assert!(Severity::from_name("failure").is_none());
        assert!(Severity::from_name("Failure").is_none());
        assert_eq!(Severity::from_name("FAILURE"), Some(Severity::Failure));
    }

    #[test]
    fn unknown_name_is_an_error() {
        let err = "BOGUS".parse::<Severity>().unwrap_err();
        assert!(matches!(err, IsoctlError::UnknownSeverity(ref n) if n == "BOGUS"));
    }

    #[test]
    fn pseudo_names_are_not_severities() {
        assert!(Severity::from_name("ALL").is_none());
        assert!(Severity::from_name("NEVER").is_none());
        assert_eq!(Threshold::from_name("ALL"), Some(Threshold::All));
        assert_eq!(Threshold::from_name("NEVER"), Some(Threshold::Never));
    }

    #[test]
    fn rank_zero_and_out_of_table_have_no_severity() {
        assert!(Severity::from_rank(0).is_none());
        assert!(Severity::from_rank(11).is_none());
    }

    #[test]
    fn threshold_reach() {
        let t = Threshold::At(Severity::Failure);
        assert!(!t.is_reached_by(Severity::Mishap));
        assert!(t.is_reached_by(Severity::Failure));
        assert!(t.is_reached_by(Severity::Abort));
        assert!(Threshold::All.is_reached_by(Severity::Debug));
        assert!(!Threshold::Never.is_reached_by(Severity::Abort));
    }

    #[test]
    fn threshold_serde_uses_names() {
        #[derive(Serialize, Deserialize)]
        struct Wrap {
            t: Threshold,
            s: Severity,
        }
        let w: Wrap = toml::from_str("t = \"NEVER\"\ns = \"MISHAP\"").unwrap();
        assert_eq!(w.t, Threshold::Never);
        assert_eq!(w.s, Severity::Mishap);
        assert!(toml::from_str::<Wrap>("t = \"never\"\ns = \"MISHAP\"").is_err());
        let out = toml::to_string(&Wrap {
            t: Threshold::At(Severity::Sorry),
            s: Severity::Hint,
        })
        .unwrap();
        assert!(out.contains("\"SORRY\""));
        assert!(out.contains("\"HINT\""));
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn rank_name_bijection(rank in 1u8..=10) {
                let sev = Severity::from_rank(rank).unwrap();
                prop_assert_eq!(Severity::from_name(sev.name()), Some(sev));
                prop_assert_eq!(sev.rank(), rank);
            }

            #[test]
            fn arbitrary_lowercase_names_never_match(name in "[a-z]{1,10}") {
                prop_assert!(Severity::from_name(&name).is_none());
            }
        }
    }
}
