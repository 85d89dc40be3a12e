//! Version ordering for module packages.
//!
//! Module versions are dotted integer runs with an optional prerelease tag
//! (e.g. `2.19.0`, `3.0.0-preview3`). A release always orders after any
//! prerelease of the same numeric version, and prerelease tags are ordered
//! by the digit run that follows their label.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VersionParseError {
    #[error("empty version string")]
    Empty,
    #[error("invalid version '{input}': '{component}' is not a number")]
    InvalidComponent { input: String, component: String },
}

/// A parsed module version.
///
/// `prerelease` is `None` for releases, which sort above every prerelease
/// ordinal of the same numeric run.
#[derive(Debug, Clone)]
pub struct VersionToken {
    numeric: Vec<u64>,
    prerelease: Option<u64>,
}

impl VersionToken {
    pub fn parse(text: &str) -> Result<Self, VersionParseError> {
        let text = text.trim();
        let text = text.strip_prefix(['v', 'V']).unwrap_or(text);
        if text.is_empty() {
            return Err(VersionParseError::Empty);
        }

        let (release, tag) = match text.split_once('-') {
            Some((release, tag)) => (release, Some(tag)),
            None => (text, None),
        };

        let numeric = release
            .split('.')
            .map(|part| {
                part.parse::<u64>()
                    .map_err(|_| VersionParseError::InvalidComponent {
                        input: text.to_string(),
                        component: part.to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let prerelease = tag.map(prerelease_ordinal);

        Ok(Self {
            numeric,
            prerelease,
        })
    }

    pub fn numeric(&self) -> &[u64] {
        &self.numeric
    }

    pub fn prerelease(&self) -> Option<u64> {
        self.prerelease
    }

    pub fn is_prerelease(&self) -> bool {
        self.prerelease.is_some()
    }

    fn component(&self, index: usize) -> u64 {
        self.numeric.get(index).copied().unwrap_or(0)
    }
}

/// Label letters are dropped and the following digit run is the ordinal.
/// A tag without digits (`-beta`) orders as ordinal zero.
fn prerelease_ordinal(tag: &str) -> u64 {
    let rest = tag.trim_start_matches(|c: char| !c.is_ascii_digit());
    let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
    digits.parse().unwrap_or(0)
}

impl Ord for VersionToken {
    fn cmp(&self, other: &Self) -> Ordering {
        let width = self.numeric.len().max(other.numeric.len());
        for i in 0..width {
            match self.component(i).cmp(&other.component(i)) {
                Ordering::Equal => continue,
                ord => return ord,
            }
        }

        match (self.prerelease, other.prerelease) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Greater,
            (Some(_), None) => Ordering::Less,
            (Some(a), Some(b)) => a.cmp(&b),
        }
    }
}

impl PartialOrd for VersionToken {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for VersionToken {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for VersionToken {}

impl FromStr for VersionToken {
    type Err = VersionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for VersionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let numeric: Vec<String> = self.numeric.iter().map(u64::to_string).collect();
        write!(f, "{}", numeric.join("."))?;
        if let Some(ordinal) = self.prerelease {
            write!(f, "-pre{}", ordinal)?;
        }
        Ok(())
    }
}

/// Compare two version strings.
///
/// Returns `1` when `b` is newer, `-1` when `a` is newer and `0` when they
/// are equal.
pub fn compare(a: &str, b: &str) -> Result<i8, VersionParseError> {
    let a = VersionToken::parse(a)?;
    let b = VersionToken::parse(b)?;
    Ok(match a.cmp(&b) {
        Ordering::Less => 1,
        Ordering::Equal => 0,
        Ordering::Greater => -1,
    })
}

/// Whether `remote` is strictly newer than `local`; `None` if either side
/// does not parse.
pub fn is_newer(local: &str, remote: &str) -> Option<bool> {
    compare(local, remote).ok().map(|c| c == 1)
}

/// Join a raw version and an optional prerelease label the way the
/// package tools print them (`3.0.0-preview3`).
pub fn full_version(version: &str, prerelease: Option<&str>) -> String {
    match prerelease {
        Some(tag) if !tag.is_empty() => format!("{}-{}", version, tag),
        _ => version.to_string(),
    }
}
