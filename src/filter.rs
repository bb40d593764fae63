use std::path::Path;
use regex::Regex;

use crate::flavor::{self, Flavor};

/// Allow/reject patterns applied to absolute paths.
///
/// A path is visible when `allow` is absent or matches, and `reject` is
/// absent or doesn't match.
#[derive(Debug, Clone, Default)]
pub struct FilterPair {
    pub allow: Option<Regex>,
    pub reject: Option<Regex>,
}

impl FilterPair {
    pub fn new(allow: Option<Regex>, reject: Option<Regex>) -> Self {
        Self { allow, reject }
    }

    /// Compile pattern sources written for the `regex` crate.
    pub fn compile(allow: Option<&str>, reject: Option<&str>) -> crate::Result<Self> {
        let allow = allow.map(Regex::new).transpose()?;
        let reject = reject.map(Regex::new).transpose()?;
        Ok(Self { allow, reject })
    }

    pub fn accepts<P: AsRef<Path>>(&self, path: P) -> bool {
        let path = path.as_ref().to_string_lossy();

        if let Some(allow) = &self.allow {
            if !allow.is_match(&path) {
                return false;
            }
        }
        match &self.reject {
            Some(reject) => !reject.is_match(&path),
            None => true,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.allow.is_none() && self.reject.is_none()
    }

    /// The `--include` argument for the notifier.
    pub fn include_extended(&self) -> Option<String> {
        self.allow.as_ref().map(flavor::to_extended)
    }

    /// The `--exclude` argument for the notifier.
    pub fn exclude_extended(&self) -> Option<String> {
        self.reject.as_ref().map(flavor::to_extended)
    }

    /// Both patterns rendered in `to`, for display.
    pub fn translated(&self, to: Flavor) -> (Option<String>, Option<String>) {
        let render = |re: &Regex| flavor::translate(re.as_str(), Flavor::Rust, to);
        (self.allow.as_ref().map(render), self.reject.as_ref().map(render))
    }
}
