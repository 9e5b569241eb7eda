//! Response cache.
//!
//! # Data Flow
//! ```text
//! Handler
//!     → stripes.rs (lock the stripe for the request fingerprint)
//!     → store.rs lookup
//!         hit  → write cached copy to client, release stripe
//!         miss → release stripe, fetch from origin
//!     → policy.rs (Cache-Control → TTL, capped by the admin ceiling)
//!     → stripes.rs (re-lock) → store.rs insert → release
//! ```
//!
//! # Design Decisions
//! - Expiry is lazy: lookups treat stale entries as misses and drop them
//! - The fingerprint is method, host, port and path; no `Vary` handling
//! - Stripe locks are never held across origin I/O

pub mod policy;
pub mod store;
pub mod stripes;

pub use policy::CacheControl;
pub use store::HttpCache;
pub use stripes::{StripeLocks, DEFAULT_STRIPES};
