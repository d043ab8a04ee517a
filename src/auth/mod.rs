//! Relay access control
//!
//! A pubkey may use the relay if any of these hold, checked in order:
//! - it is a relay admin
//! - it is whitelisted
//! - it holds at least one claim (static claim or redeemed invite)
//! - the remote access backend grants it
//!
//! Bans override all of the above and are checked by the policy gate first.

mod access;
mod backend;
mod bans;
mod claims;

pub use access::{AccessController, AccessSource};
pub use backend::{AccessBackend, AccessError, BackendAccessCache, HttpAccessBackend, BACKEND_ACCESS_TTL};
pub use bans::{BanEntry, BanKind, BanRegistry, BanSubject};
pub use claims::{ClaimError, ClaimRegistry, InviteCode, INVITE_CODE_LEN};
