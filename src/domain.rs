use crate::error::InvalidDomainError;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use tracing::debug;

/// A normalized domain name: lowercase, trimmed, no trailing dot.
///
/// Only [`normalize`] constructs one, so two `Domain`s compare equal exactly
/// when their raw sources normalize identically.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Domain(Box<str>);

pub type DomainSet = FxHashSet<Domain>;

impl Domain {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Domain {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// Deserialized values go through `normalize` so a hand-edited cache file
// cannot smuggle in a non-canonical domain.
impl<'de> Deserialize<'de> for Domain {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        normalize(&raw).map_err(serde::de::Error::custom)
    }
}

/// Canonicalizes a raw domain string.
pub fn normalize(raw: &str) -> Result<Domain, InvalidDomainError> {
    let trimmed = raw.trim();
    let trimmed = trimmed.strip_suffix('.').unwrap_or(trimmed);

    // A second trailing dot would make normalization non-idempotent.
    if trimmed.is_empty()
        || trimmed.ends_with('.')
        || trimmed
            .chars()
            .any(|c| c.is_whitespace() || c.is_control() || c == char::REPLACEMENT_CHARACTER)
    {
        return Err(InvalidDomainError {
            raw: raw.to_string(),
        });
    }

    Ok(Domain(trimmed.to_lowercase().into_boxed_str()))
}

/// Result of parsing a domain list.
#[derive(Debug, Default)]
pub struct ParsedList {
    pub domains: DomainSet,
    pub invalid: usize,
}

/// Parses a one-entry-per-line list.
///
/// Accepts plain domain lists and hosts-file lines (`0.0.0.0 ads.example.com`).
/// Anything after `#` is a comment.
pub fn parse_list<'a>(lines: impl IntoIterator<Item = &'a str>) -> ParsedList {
    let mut parsed = ParsedList::default();
    for line in lines {
        parse_line_into(line, &mut parsed);
    }
    parsed
}

pub(crate) fn parse_line_into(line: &str, parsed: &mut ParsedList) {
    let content = match line.find('#') {
        Some(idx) => &line[..idx],
        None => line,
    };

    for token in content.split_whitespace() {
        // hosts-file address column
        if token.parse::<IpAddr>().is_ok() {
            continue;
        }
        match normalize(token) {
            Ok(domain) => {
                parsed.domains.insert(domain);
            }
            Err(e) => {
                debug!("Skipping entry: {}", e);
                parsed.invalid += 1;
            }
        }
    }
}

/// Builds a set from literals that must all be valid.
#[cfg(test)]
pub(crate) fn domain_set<'a>(raw: impl IntoIterator<Item = &'a str>) -> DomainSet {
    raw.into_iter()
        .map(|d| normalize(d).unwrap_or_else(|e| panic!("{}", e)))
        .collect()
}
