//! Domain types providing compile-time safety and self-documentation

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub use bbtrace_common::BlockId;

/// How a basic block's control flow ends
///
/// Classification is the instrumenter's job; the recorder only needs to know
/// whether the block leaves the function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Terminator {
    /// Returns to the caller
    Return,
    /// Resumes unwinding of an in-flight exception
    Resume,
    /// Control cannot reach past this point
    Unreachable,
    /// Branches, switches, invokes and everything else staying in the function
    Other,
}

impl Terminator {
    /// Whether a block ending this way is an exit block of its function
    #[must_use]
    pub fn is_exit(self) -> bool {
        matches!(self, Terminator::Return | Terminator::Resume | Terminator::Unreachable)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Terminator::Return => "return",
            Terminator::Resume => "resume",
            Terminator::Unreachable => "unreachable",
            Terminator::Other => "other",
        }
    }
}

impl fmt::Display for Terminator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Terminator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "return" => Ok(Terminator::Return),
            "resume" => Ok(Terminator::Resume),
            "unreachable" => Ok(Terminator::Unreachable),
            "other" => Ok(Terminator::Other),
            _ => Err(format!("unknown terminator kind {s:?}")),
        }
    }
}
