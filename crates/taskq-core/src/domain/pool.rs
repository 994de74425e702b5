//! Pools: the logical queues a namespace is split into, and how their
//! transport-level names are derived.
//!
//! # Naming
//! - namespace は slug 化（小文字, `_` 区切り）
//! - queued pool: `{namespace}-QUEUED` / `{namespace}-QUEUED-{SUB}`
//! - outcome pools: `{namespace}-COMPLETED`, `{namespace}-FAILED`
//!
//! The names must stay bit-exact with already deployed queues; slugs are
//! transliterated to ASCII and keep alphanumerics only.

use std::fmt;
use std::str::FromStr;

use deunicode::deunicode;
use serde::{Deserialize, Serialize};

use super::errors::TaskQError;

/// Separator used between words of a slug.
pub const SLUG_SEPARATOR: char = '_';

/// Separator between the namespace, the pool kind and the sub-pool.
pub const NAME_SEPARATOR: char = '-';

/// The three kinds of pool a namespace owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PoolKind {
    /// Task descriptors waiting for a worker.
    Queued,
    /// Outcome records of successful attempts.
    Completed,
    /// Outcome records of failed attempts.
    Failed,
}

impl PoolKind {
    pub fn as_str(self) -> &'static str {
        match self {
            PoolKind::Queued => "QUEUED",
            PoolKind::Completed => "COMPLETED",
            PoolKind::Failed => "FAILED",
        }
    }

    /// Is this one of the outcome pools (completed / failed)?
    pub fn is_outcome(self) -> bool {
        matches!(self, PoolKind::Completed | PoolKind::Failed)
    }
}

impl fmt::Display for PoolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A resolved logical pool: a kind plus, for queued pools, an optional
/// sub-pool (e.g. `FAST`, `SLOW`, `2`).
///
/// Sub-pool names are normalized on construction, so two refs built from
/// `"fast lane"` and `"Fast-Lane"` are equal and share one cached handle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PoolRef {
    kind: PoolKind,
    sub_pool: Option<String>,
}

impl PoolRef {
    /// The default queued pool.
    pub fn queued() -> Self {
        Self {
            kind: PoolKind::Queued,
            sub_pool: None,
        }
    }

    /// A named queued sub-pool. A name that slugs to nothing falls back to the
    /// default queued pool.
    pub fn queued_sub(name: &str) -> Self {
        let slug = slugify(name).to_uppercase();
        Self {
            kind: PoolKind::Queued,
            sub_pool: (!slug.is_empty()).then_some(slug),
        }
    }

    /// `None` -> default queued pool, `Some(name)` -> sub-pool.
    pub fn queued_opt(name: Option<&str>) -> Self {
        name.map_or_else(Self::queued, Self::queued_sub)
    }

    pub fn completed() -> Self {
        Self {
            kind: PoolKind::Completed,
            sub_pool: None,
        }
    }

    pub fn failed() -> Self {
        Self {
            kind: PoolKind::Failed,
            sub_pool: None,
        }
    }

    pub fn kind(&self) -> PoolKind {
        self.kind
    }

    pub fn sub_pool(&self) -> Option<&str> {
        self.sub_pool.as_deref()
    }

    /// The namespace-relative key, e.g. `QUEUED`, `QUEUED-FAST`, `FAILED`.
    pub fn key(&self) -> String {
        match &self.sub_pool {
            Some(sub) => format!("{}{NAME_SEPARATOR}{sub}", self.kind.as_str()),
            None => self.kind.as_str().to_string(),
        }
    }

    /// Transport-level queue name for this pool under `namespace`.
    ///
    /// `namespace` is expected to be slugged already (see [`slugify`]).
    pub fn queue_name(&self, namespace: &str) -> String {
        format!("{namespace}{NAME_SEPARATOR}{}", self.key())
    }
}

impl From<PoolKind> for PoolRef {
    fn from(kind: PoolKind) -> Self {
        Self {
            kind,
            sub_pool: None,
        }
    }
}

/// Parses a pool key as printed by [`PoolRef::key`]; case-insensitive, so
/// `completed` and `queued-fast` are accepted too.
impl FromStr for PoolRef {
    type Err = TaskQError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let (head, sub) = match trimmed.split_once(NAME_SEPARATOR) {
            Some((head, sub)) => (head, Some(sub)),
            None => (trimmed, None),
        };
        match (head.to_ascii_uppercase().as_str(), sub) {
            ("QUEUED", None) => Ok(Self::queued()),
            ("QUEUED", Some(sub)) if !slugify(sub).is_empty() => Ok(Self::queued_sub(sub)),
            ("COMPLETED", None) => Ok(Self::completed()),
            ("FAILED", None) => Ok(Self::failed()),
            _ => Err(TaskQError::UnknownPool(s.to_string())),
        }
    }
}

impl fmt::Display for PoolRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

/// Normalize a free-form name into a slug: lowercase ASCII alphanumerics,
/// every run of other characters collapsed into a single [`SLUG_SEPARATOR`],
/// no leading or trailing separator.
///
/// Non-ASCII text is transliterated first (`Café` -> `cafe`). An ASCII
/// apostrophe separates words (`C'est` -> `c_est`), while apostrophes that
/// only appear through transliteration are dropped (`don’t` -> `dont`).
/// Commas between digits vanish (`1,000` -> `1000`).
pub fn slugify(input: &str) -> String {
    let spaced: String = input
        .chars()
        .map(|c| if c == '\'' { ' ' } else { c })
        .collect();
    let ascii: Vec<char> = deunicode(&spaced)
        .chars()
        .filter(|&c| c != '\'')
        .map(|c| c.to_ascii_lowercase())
        .collect();

    let mut slug = String::with_capacity(ascii.len());
    let mut pending_separator = false;
    for (i, &c) in ascii.iter().enumerate() {
        if c.is_ascii_alphanumeric() {
            if pending_separator && !slug.is_empty() {
                slug.push(SLUG_SEPARATOR);
            }
            pending_separator = false;
            slug.push(c);
        } else if c == ',' && is_digit_at(&ascii, i.wrapping_sub(1)) && is_digit_at(&ascii, i + 1) {
            continue;
        } else {
            pending_separator = true;
        }
    }
    slug
}

fn is_digit_at(chars: &[char], index: usize) -> bool {
    chars.get(index).is_some_and(char::is_ascii_digit)
}
