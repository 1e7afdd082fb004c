//! # Tapquest
//!
//! Tap verification and a self-custodied encrypted activity log for a
//! physical-tap quest application.
//!
//! ## Overview
//!
//! A [`Session`] is one logged-in user on one device. It verifies NFC taps
//! (chip CMAC, signature cards, Ed25519 counter messages), classifies them
//! against the directory, records visits, connections and redemptions as
//! sealed messages in the user's jubSignal log, and keeps a password-encrypted
//! backup of the whole state with the account store.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use tapquest::{Collaborators, Registration, Session, SessionConfig};
//! use tapquest::core::{CmacParams, TapPayload};
//!
//! async fn example(collaborators: Collaborators) {
//!     let session = Session::new(collaborators, SessionConfig::default());
//!     session
//!         .register(Registration {
//!             display_name: "ada".into(),
//!             email: "ada@example.com".into(),
//!             password: "correct horse".into(),
//!             wants_server_custody: false,
//!             allows_analytics: false,
//!         })
//!         .await
//!         .unwrap();
//!
//!     let tap = TapPayload::Cmac(CmacParams { raw: "uid=..&ctr=..&cmac=..".into() });
//!     let outcome = session.process_tap(&tap).await.unwrap();
//!     println!("{}", outcome.state.code());
//! }
//! ```
//!
//! ## Crates
//!
//! - [`core`] - payloads, verification, classification, the local state fold
//! - [`crypto`] - sealing, Argon2id, backups
//! - [`store`] - collaborator traits and their memory/SQLite implementations
//! - [`sync`] - the message log

pub mod config;
pub mod error;
pub mod session;

pub use config::SessionConfig;
pub use error::{Result, SessionError};
pub use session::{
    Collaborators, ProfileUpdate, RedeemOutcome, Registration, Session, TapOutcome,
};

pub use tapquest_core as core;
pub use tapquest_crypto as crypto;
pub use tapquest_store as store;
pub use tapquest_sync as sync;

// Re-export the types most callers need
pub use tapquest_core::{
    ActivityEvent, ActivityPayload, LocalState, QrId, QuestRequirement, RequirementKind,
    RequirementProgress, TapPayload, TapState,
};
pub use tapquest_sync::SyncReport;
