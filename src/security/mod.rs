//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Parsed request:
//!     → blocklist.rs (target host matches a pattern? → 403)
//!     → forwarding.rs (client already in X-Forwarded-For? → 400)
//!     → forwarding.rs (append client to X-Forwarded-For, set X-Forwarded-Proto)
//!     → Pass to dispatch
//! ```
//!
//! # Design Decisions
//! - Checks run before any origin connection is made
//! - Fail closed: a rejected request never reaches the network

pub mod blocklist;
pub mod forwarding;

pub use blocklist::{Blocklist, BlocklistError};
pub use forwarding::{add_forwarding_headers, contains_loop};
