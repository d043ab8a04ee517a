//! Frith - access control and NIP-29 group policy for a nostr relay
//!
//! Frith sits between a relay's transport and its event log. It decides
//! which filters and events are admitted, who may use the relay at all
//! (admins, whitelist, claims and invites, a remote backend), and derives
//! NIP-29 groups and memberships from the log itself.

pub mod auth;
pub mod broadcast;
pub mod config;
pub mod groups;
pub mod nostr;
pub mod policy;
pub mod storage;

pub use auth::{AccessController, BanRegistry, BanSubject, ClaimRegistry};
pub use config::RelayConfig;
pub use groups::{Group, GroupProjector};
pub use nostr::{Event, Filter, RelaySigner};
pub use policy::{PolicyGate, Rejection};
