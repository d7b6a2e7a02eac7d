// src/pkg/relation.rs

//! Dependency relation fields
//!
//! `Depends: libfoo (>= 1.2) | libfoo-compat, bar`: a comma separated list of
//! alternative groups, each possibility optionally restricted by a version
//! relation.

use crate::error::{Error, Result};
use crate::version::Version;
use std::cmp::Ordering;
use std::fmt;

/// Version restriction operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionRelation {
    Earlier,
    EarlierEqual,
    Exact,
    LaterEqual,
    Later,
}

impl VersionRelation {
    pub fn as_str(&self) -> &'static str {
        match self {
            VersionRelation::Earlier => "<<",
            VersionRelation::EarlierEqual => "<=",
            VersionRelation::Exact => "=",
            VersionRelation::LaterEqual => ">=",
            VersionRelation::Later => ">>",
        }
    }

    /// Parse an operator; the obsolete `<` and `>` mean `<=` and `>=`
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "<<" => Some(VersionRelation::Earlier),
            "<=" | "<" => Some(VersionRelation::EarlierEqual),
            "=" => Some(VersionRelation::Exact),
            ">=" | ">" => Some(VersionRelation::LaterEqual),
            ">>" => Some(VersionRelation::Later),
            _ => None,
        }
    }

    /// Does `candidate` stand in this relation to `reference`
    pub fn satisfied_by(&self, candidate: &Version, reference: &Version) -> bool {
        let ord = candidate.compare(reference);
        match self {
            VersionRelation::Earlier => ord == Ordering::Less,
            VersionRelation::EarlierEqual => ord != Ordering::Greater,
            VersionRelation::Exact => ord == Ordering::Equal,
            VersionRelation::LaterEqual => ord != Ordering::Less,
            VersionRelation::Later => ord == Ordering::Greater,
        }
    }
}

/// One alternative inside a dependency group
#[derive(Debug, Clone, PartialEq)]
pub struct Possibility {
    pub name: String,
    pub relation: Option<(VersionRelation, Version)>,
}

impl Possibility {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            relation: None,
        }
    }

    pub fn versioned(name: &str, op: VersionRelation, version: Version) -> Self {
        Self {
            name: name.to_string(),
            relation: Some((op, version)),
        }
    }

    /// Whether `version` fulfils the restriction (always true when unversioned)
    pub fn version_ok(&self, version: &Version) -> bool {
        match &self.relation {
            Some((op, reference)) => op.satisfied_by(version, reference),
            None => true,
        }
    }

    fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        let bad = || Error::ParseError(format!("relation field: bad item '{}'", s));

        let (name, rest) = match s.find(|c: char| c == '(' || c.is_whitespace()) {
            Some(pos) => (&s[..pos], s[pos..].trim()),
            None => (s, ""),
        };
        // Architecture qualifiers are accepted and ignored
        let name = name.split(':').next().unwrap_or(name);
        let name = super::validate_name(name)?;

        if rest.is_empty() {
            return Ok(Self::new(&name));
        }

        let inner = rest
            .strip_prefix('(')
            .and_then(|r| r.strip_suffix(')'))
            .ok_or_else(bad)?
            .trim();
        let op_len = inner
            .find(|c: char| !matches!(c, '<' | '>' | '='))
            .ok_or_else(bad)?;
        let op = VersionRelation::parse(&inner[..op_len]).ok_or_else(bad)?;
        let version = Version::parse(inner[op_len..].trim())?;

        Ok(Self::versioned(&name, op, version))
    }
}

impl fmt::Display for Possibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if let Some((op, version)) = &self.relation {
            write!(f, " ({} {})", op.as_str(), version)?;
        }
        Ok(())
    }
}

/// A group of alternatives; any one of them satisfies it
#[derive(Debug, Clone, PartialEq)]
pub struct Dependency {
    pub alternatives: Vec<Possibility>,
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, alt) in self.alternatives.iter().enumerate() {
            if i > 0 {
                f.write_str(" | ")?;
            }
            write!(f, "{}", alt)?;
        }
        Ok(())
    }
}

/// Parse a whole relation field
pub fn parse_field(s: &str) -> Result<Vec<Dependency>> {
    let mut deps = Vec::new();
    for group in s.split(',') {
        if group.trim().is_empty() {
            continue;
        }
        let alternatives = group
            .split('|')
            .map(Possibility::parse)
            .collect::<Result<Vec<_>>>()?;
        deps.push(Dependency { alternatives });
    }
    Ok(deps)
}

/// Render a relation field in its canonical form
pub fn format_field(deps: &[Dependency]) -> String {
    deps.iter()
        .map(|d| d.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Parse a Provides field into names, ignoring any version restriction
pub fn parse_provides(s: &str) -> Result<Vec<String>> {
    Ok(parse_field(s)?
        .into_iter()
        .flat_map(|d| d.alternatives)
        .map(|p| p.name)
        .collect())
}
