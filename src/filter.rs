//! Include/exclude filtering of element names, e.g. structure names of a
//! structure set.

use crate::error::{ArchiveError, Result};
use regex::{Regex, RegexBuilder};

pub const DEFAULT_EXCLUDE: [&str; 5] = [r"^Z\d", "^Ext", "ISOC", "QME", "NP"];

/// Pattern engine options. Case-insensitive matching is the default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterFlags {
    pub case_insensitive: bool,
    pub multi_line: bool,
    pub dot_matches_new_line: bool,
    pub ignore_whitespace: bool,
}

impl Default for FilterFlags {
    fn default() -> Self {
        Self {
            case_insensitive: true,
            multi_line: false,
            dot_matches_new_line: false,
            ignore_whitespace: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NameFilter {
    exclude: Vec<Regex>,
    include: Vec<Regex>,
}

impl Default for NameFilter {
    fn default() -> Self {
        let mut filter = Self {
            exclude: Vec::new(),
            include: Vec::new(),
        };
        if let Err(err) = filter.configure(&DEFAULT_EXCLUDE, &[""], FilterFlags::default()) {
            log::error!("Default name filter rejected: {err}");
        }
        filter
    }
}

impl NameFilter {
    /// Filter that keeps every name.
    pub fn pass_through() -> Self {
        Self {
            exclude: Vec::new(),
            include: Vec::new(),
        }
    }

    /// Replaces the patterns. An empty exclude list, or one whose first
    /// pattern is empty, excludes nothing; an empty include list includes
    /// everything. On error the previous configuration stays in place.
    pub fn configure<E, I>(&mut self, exclude: &[E], include: &[I], flags: FilterFlags) -> Result<()>
    where
        E: AsRef<str>,
        I: AsRef<str>,
    {
        let exclude = match exclude.first() {
            None => Vec::new(),
            Some(first) if first.as_ref().is_empty() => Vec::new(),
            Some(_) => compile_all(exclude, flags)?,
        };
        let include = compile_all(include, flags)?;
        log::debug!(
            "Name filter: {} exclude, {} include patterns",
            exclude.len(),
            include.len()
        );
        self.exclude = exclude;
        self.include = include;
        Ok(())
    }

    /// Drops excluded names, then keeps names once per include pattern they
    /// match. A name matching several include patterns appears several times.
    pub fn filter<S: AsRef<str>>(&self, names: &[S]) -> Vec<String> {
        let kept: Vec<&str> = names
            .iter()
            .map(AsRef::as_ref)
            .filter(|name| !self.exclude.iter().any(|pattern| pattern.is_match(name)))
            .collect();
        if self.include.is_empty() {
            return kept.into_iter().map(str::to_string).collect();
        }
        self.include
            .iter()
            .flat_map(|pattern| {
                kept.iter()
                    .filter(move |name| pattern.is_match(name))
                    .map(|name| name.to_string())
            })
            .collect()
    }
}

fn compile_all<S: AsRef<str>>(patterns: &[S], flags: FilterFlags) -> Result<Vec<Regex>> {
    patterns
        .iter()
        .map(|pattern| compile(pattern.as_ref(), flags))
        .collect()
}

fn compile(pattern: &str, flags: FilterFlags) -> Result<Regex> {
    RegexBuilder::new(&format!(r"\A(?:{pattern})"))
        .case_insensitive(flags.case_insensitive)
        .multi_line(flags.multi_line)
        .dot_matches_new_line(flags.dot_matches_new_line)
        .ignore_whitespace(flags.ignore_whitespace)
        .build()
        .map_err(|source| ArchiveError::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })
}
