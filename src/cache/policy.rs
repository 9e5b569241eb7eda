//! `Cache-Control` interpretation.

use crate::http::Header;

pub const CACHE_CONTROL: &str = "Cache-Control";

/// The directives that decide whether a response is stored, and for how long.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheControl {
    pub private: bool,
    pub no_cache: bool,
    pub no_store: bool,
    pub max_age: Option<u64>,
}

impl CacheControl {
    /// Parse a `Cache-Control` value. Unknown directives are ignored.
    pub fn parse(value: &str) -> Self {
        let mut directives = Self::default();
        for token in value.split(',').map(str::trim) {
            let (name, arg) = match token.split_once('=') {
                Some((name, arg)) => (name.trim(), Some(arg.trim().trim_matches('"'))),
                None => (token, None),
            };
            if name.eq_ignore_ascii_case("private") {
                directives.private = true;
            } else if name.eq_ignore_ascii_case("no-cache") {
                directives.no_cache = true;
            } else if name.eq_ignore_ascii_case("no-store") {
                directives.no_store = true;
            } else if name.eq_ignore_ascii_case("max-age") {
                directives.max_age = arg.and_then(|secs| secs.parse().ok());
            }
        }
        directives
    }

    /// Directives from `header`, or `None` when it has no `Cache-Control`.
    pub fn from_header(header: &Header) -> Option<Self> {
        header.get(CACHE_CONTROL).map(Self::parse)
    }

    /// Effective time-to-live in seconds, capped by `ceiling`.
    ///
    /// `None` when any of `private`, `no-cache`, `no-store` is present, when
    /// `max-age` is missing, or when the capped value is zero.
    pub fn ttl(&self, ceiling: Option<u64>) -> Option<u64> {
        if self.private || self.no_cache || self.no_store {
            return None;
        }
        let ttl = match ceiling {
            Some(ceiling) => self.max_age?.min(ceiling),
            None => self.max_age?,
        };
        (ttl > 0).then_some(ttl)
    }
}
