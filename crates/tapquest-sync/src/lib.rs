//! # Tapquest Sync
//!
//! The jubSignal message log: activity events sealed to a public key, stored
//! on an untrusted relay and folded back into each device's local state.
//!
//! ## Overview
//!
//! Every activity (registration, location visit, person tap, redemption) is
//! an [`tapquest_core::ActivityEvent`]. [`MessageLog::append`] seals it to the
//! user's own key or to a peer's key; [`MessageLog::sync`] posts pending
//! messages, fetches from the last cursor and folds.
//!
//! ## Key Properties
//!
//! - **Idempotent**: an event id folds at most once
//! - **Order-independent**: folds run in `(timestamp, id)` order whatever the
//!   fetch order
//! - **Partial-failure tolerant**: a corrupt message is reported, not fatal
//! - **Untrusted relay**: the relay sees ciphertext and addressing only
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tapquest_core::LocalState;
//! use tapquest_sync::{MessageLog, MessageTransport, SyncConfig};
//!
//! async fn example(transport: Arc<dyn MessageTransport>, token: &str, state: &mut LocalState) {
//!     let log = MessageLog::new(transport, SyncConfig::default());
//!     let report = log.sync(token, state, false, vec![]).await.unwrap();
//!     println!("applied {} events", report.applied);
//! }
//! ```
//!
//! ## Message Flow
//!
//! ```text
//! Device                               Relay
//!   |-------- post_messages ---------->|   sealed events, any recipient
//!   |-------- get_messages(cursor) --->|
//!   |<------- [seq, body]... ----------|   own mailbox, ascending seq
//!   |  verify, open, sort, fold        |
//! ```

pub mod convergence;
pub mod error;
pub mod messages;
pub mod protocol;
pub mod transport;

pub use convergence::{compute_log_digest, verify_convergence, ConvergenceResult};
pub use error::{Result, SyncError};
pub use messages::{limits, EncryptedMessage, InboundMessage, PROTOCOL_VERSION};
pub use protocol::{MessageFailure, MessageLog, SyncConfig, SyncReport};
pub use transport::{memory::MemoryRelay, MessageTransport};
