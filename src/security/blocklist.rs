//! Host blocklist.
//!
//! # Responsibilities
//! - Compile host patterns once at startup
//! - Answer "is this host blocked?" for every request
//!
//! # Design Decisions
//! - Patterns are regular expressions matched against the whole host
//! - The set is immutable after construction and shared without locking

use std::path::Path;

use regex::RegexSet;
use thiserror::Error;

/// Errors raised while building a blocklist.
#[derive(Debug, Error)]
pub enum BlocklistError {
    #[error("failed to read blocklist {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid blocklist pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// Compiled set of host patterns.
#[derive(Debug, Clone)]
pub struct Blocklist {
    patterns: RegexSet,
}

impl Blocklist {
    /// Compile `patterns`. Each must match the entire host to block it.
    pub fn new<I, S>(patterns: I) -> Result<Self, BlocklistError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let anchored = patterns
            .into_iter()
            .map(|pattern| format!("^(?:{})$", pattern.as_ref()));
        Ok(Self {
            patterns: RegexSet::new(anchored)?,
        })
    }

    /// A blocklist that blocks nothing.
    pub fn empty() -> Self {
        Self {
            patterns: RegexSet::empty(),
        }
    }

    /// Load one pattern per line; blank lines and `#` comments are skipped.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, BlocklistError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| BlocklistError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let blocklist = Self::new(
            contents
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty() && !line.starts_with('#')),
        )?;
        tracing::info!(
            path = %path.display(),
            patterns = blocklist.len(),
            "Blocklist loaded"
        );
        Ok(blocklist)
    }

    /// True iff some pattern matches all of `host`.
    pub fn contains(&self, host: &str) -> bool {
        self.patterns.is_match(host)
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

impl Default for Blocklist {
    fn default() -> Self {
        Self::empty()
    }
}
