//! Regex dialect translation
//!
//! Filter patterns are authored for the `regex` crate but the notifier
//! filters with POSIX extended regular expressions. [`translate`] carries a
//! pattern between dialects through a neutral placeholder form
//! ([`Mediary`]). Constructs with no placeholder pass through unchanged.

mod construct;
mod mediary;

pub use mediary::Mediary;

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A regular expression grammar
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Flavor {
    /// JavaScript `RegExp` source
    Ecma,
    /// Perl-compatible
    Pcre,
    /// POSIX extended, as taken by `inotifywait --include/--exclude`
    Extended,
    /// The `regex` crate
    Rust,
}

impl Flavor {
    pub const ALL: [Flavor; 4] = [Flavor::Ecma, Flavor::Pcre, Flavor::Extended, Flavor::Rust];

    pub(crate) fn index(self) -> usize {
        match self {
            Flavor::Ecma => 0,
            Flavor::Pcre => 1,
            Flavor::Extended => 2,
            Flavor::Rust => 3,
        }
    }

    /// POSIX bracket expressions treat `\` as an ordinary character.
    pub(crate) fn escapes_in_classes(self) -> bool {
        !matches!(self, Flavor::Extended)
    }

    pub(crate) fn has_lazy_quantifiers(self) -> bool {
        !matches!(self, Flavor::Extended)
    }

    pub fn name(self) -> &'static str {
        match self {
            Flavor::Ecma => "ecma",
            Flavor::Pcre => "pcre",
            Flavor::Extended => "extended",
            Flavor::Rust => "rust",
        }
    }
}

impl fmt::Display for Flavor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Flavor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ecma" | "js" | "javascript" => Ok(Flavor::Ecma),
            "pcre" | "perl" => Ok(Flavor::Pcre),
            "extended" | "ere" | "posix" => Ok(Flavor::Extended),
            "rust" | "regex" => Ok(Flavor::Rust),
            other => Err(format!("unknown regex flavor: {}", other)),
        }
    }
}

/// Rewrite `pattern` from one dialect into another.
pub fn translate(pattern: &str, from: Flavor, to: Flavor) -> String {
    if from == to {
        return pattern.to_string();
    }
    Mediary::encode(pattern, from).decode(to)
}

/// The notifier's spelling of a compiled filter.
pub fn to_extended(regex: &Regex) -> String {
    translate(regex.as_str(), Flavor::Rust, Flavor::Extended)
}
