//! # Tapquest Store
//!
//! The collaborators a session depends on, as async traits, plus in-memory
//! and SQLite implementations.
//!
//! ## Overview
//!
//! A session never touches ambient storage or a concrete server. Everything
//! it persists or asks for goes through one of the traits in [`traits`]:
//!
//! - [`StateStore`] - the device's [`tapquest_core::LocalState`] snapshot
//! - [`Directory`] - registered people and locations by tap identity
//! - [`AccountStore`] - server accounts, tokens and backups
//! - [`TokenResolver`] - bearer token to mailbox key, for message relays
//! - [`RedemptionStore`] - the at-most-once redemption contract
//!
//! [`SqliteStore`] is the on-device implementation; the `memory` module
//! carries the in-process versions used by tests and local wiring.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use tapquest_store::{SqliteStore, StateStore};
//!
//! async fn example() {
//!     let store = SqliteStore::open("device.db").unwrap();
//!     let state = store.load().await.unwrap().unwrap_or_default();
//!     store.save(&state).await.unwrap();
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Atomic redemption**: both implementations decide the winner inside a
//!   single critical section (a mutex or a guarded `UPDATE`)
//! - **Snapshot persistence**: local state is stored whole, CBOR encoded

pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::{
    MemoryAccountStore, MemoryDirectory, MemoryRedemptionStore, MemoryStateStore,
    DEFAULT_TOKEN_LIFETIME_MS,
};
pub use sqlite::SqliteStore;
pub use traits::{
    AccountRecord, AccountStore, Directory, NewAccount, RedemptionStore, StateStore,
    TokenResolver,
};
