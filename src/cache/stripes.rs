//! Striped lock table.
//!
//! Callers serialize the lookup → fetch → insert sequence for one
//! fingerprint by holding the stripe selected by
//! `hash(fingerprint) % stripes`. Distinct fingerprints usually land on
//! distinct stripes and proceed in parallel.

use tokio::sync::{Mutex, MutexGuard};

use crate::http::Fingerprint;

/// Default number of stripes. Prime, so fingerprint hashes spread evenly.
pub const DEFAULT_STRIPES: usize = 997;

/// Fixed table of async mutexes keyed by fingerprint hash.
///
/// Async locks: a hit holds its stripe while the cached response is
/// written to the client.
#[derive(Debug)]
pub struct StripeLocks {
    stripes: Box<[Mutex<()>]>,
}

impl StripeLocks {
    /// Build a table of `count` stripes (at least one).
    pub fn new(count: usize) -> Self {
        let stripes = (0..count.max(1)).map(|_| Mutex::new(())).collect();
        Self { stripes }
    }

    /// Stripe index for `fingerprint`.
    pub fn index(&self, fingerprint: &Fingerprint) -> usize {
        (fingerprint.hash_value() % self.stripes.len() as u64) as usize
    }

    /// Wait for and hold the stripe guarding `fingerprint`.
    pub async fn lock(&self, fingerprint: &Fingerprint) -> MutexGuard<'_, ()> {
        self.stripes[self.index(fingerprint)].lock().await
    }

    pub fn len(&self) -> usize {
        self.stripes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stripes.is_empty()
    }
}

impl Default for StripeLocks {
    fn default() -> Self {
        Self::new(DEFAULT_STRIPES)
    }
}
