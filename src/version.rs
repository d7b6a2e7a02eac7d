// src/version.rs

//! Debian-style package versions
//!
//! Format: `[epoch:]upstream[-revision]`. Comparison follows the packaging
//! ecosystem's rule: epoch numerically, then upstream, then revision, where
//! the string parts are compared as alternating non-digit / digit runs.
//! Inside a non-digit run `~` sorts before anything (even the end of the
//! string), letters sort before everything else.

use crate::error::{Error, Result};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// A parsed package version
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Version {
    pub epoch: u64,
    pub version: String,
    pub revision: String,
}

impl Version {
    pub fn new(epoch: u64, version: &str, revision: &str) -> Self {
        Self {
            epoch,
            version: version.to_string(),
            revision: revision.to_string(),
        }
    }

    /// Parse a version string
    ///
    /// Examples:
    /// - "1.2.3" → epoch=0, version="1.2.3", revision=""
    /// - "2:1.2.3" → epoch=2, version="1.2.3", revision=""
    /// - "1.2-3-4" → epoch=0, version="1.2-3", revision="4"
    pub fn parse(s: &str) -> Result<Self> {
        let invalid = |reason: &str| Error::InvalidVersion {
            version: s.to_string(),
            reason: reason.to_string(),
        };

        if s.is_empty() {
            return Err(invalid("version string is empty"));
        }

        let trimmed = s.trim_matches(|c| c == ' ' || c == '\t');
        if trimmed.is_empty() {
            return Err(invalid("version string is empty"));
        }
        if trimmed.contains([' ', '\t']) {
            return Err(invalid("version string has embedded spaces"));
        }

        let (epoch, rest) = match trimmed.split_once(':') {
            Some((epoch_str, rest)) => {
                let epoch = if epoch_str.is_empty() {
                    0
                } else {
                    epoch_str
                        .parse::<u64>()
                        .map_err(|_| invalid("epoch in version is not number"))?
                };
                if rest.is_empty() {
                    return Err(invalid("nothing after colon in version number"));
                }
                (epoch, rest)
            }
            None => (0, trimmed),
        };

        let (version, revision) = match rest.rsplit_once('-') {
            Some((v, r)) => (v, r),
            None => (rest, ""),
        };

        Ok(Self::new(epoch, version, revision))
    }

    /// Non-empty version, revision or a non-zero epoch
    pub fn is_informative(&self) -> bool {
        self.epoch != 0 || !self.version.is_empty() || !self.revision.is_empty()
    }

    /// Human description, `<none>` when there is nothing to show
    pub fn describe(&self) -> String {
        if self.is_informative() {
            self.to_string()
        } else {
            "<none>".to_string()
        }
    }

    /// Compare two versions
    pub fn compare(&self, other: &Version) -> Ordering {
        self.epoch
            .cmp(&other.epoch)
            .then_with(|| compare_part(&self.version, &other.version))
            .then_with(|| compare_part(&self.revision, &other.revision))
    }
}

/// Sort weight of one character inside a non-digit run
fn order(c: Option<u8>) -> i32 {
    match c {
        None => 0,
        Some(b'~') => -1,
        Some(c) if c.is_ascii_digit() => 0,
        Some(c) if c.is_ascii_alphabetic() => c as i32,
        Some(c) => c as i32 + 256,
    }
}

fn compare_part(a: &str, b: &str) -> Ordering {
    let a = a.as_bytes();
    let b = b.as_bytes();
    let (mut i, mut j) = (0, 0);

    while i < a.len() || j < b.len() {
        // Non-digit prefix
        while (i < a.len() && !a[i].is_ascii_digit()) || (j < b.len() && !b[j].is_ascii_digit()) {
            let ac = order(a.get(i).copied());
            let bc = order(b.get(j).copied());
            if ac != bc {
                return ac.cmp(&bc);
            }
            i += 1;
            j += 1;
        }

        while i < a.len() && a[i] == b'0' {
            i += 1;
        }
        while j < b.len() && b[j] == b'0' {
            j += 1;
        }

        // Numeric run: the first differing digit decides unless one run is longer
        let mut first_diff = Ordering::Equal;
        while i < a.len() && a[i].is_ascii_digit() && j < b.len() && b[j].is_ascii_digit() {
            if first_diff == Ordering::Equal {
                first_diff = a[i].cmp(&b[j]);
            }
            i += 1;
            j += 1;
        }
        if i < a.len() && a[i].is_ascii_digit() {
            return Ordering::Greater;
        }
        if j < b.len() && b[j].is_ascii_digit() {
            return Ordering::Less;
        }
        if first_diff != Ordering::Equal {
            return first_diff;
        }
    }

    Ordering::Equal
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.epoch > 0 || self.version.contains(':') || self.revision.contains(':') {
            write!(f, "{}:", self.epoch)?;
        }
        write!(f, "{}", self.version)?;
        if !self.revision.is_empty() {
            write!(f, "-{}", self.revision)?;
        }
        Ok(())
    }
}

impl FromStr for Version {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.compare(other)
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
