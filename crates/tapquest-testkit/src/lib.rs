//! # Tapquest Testkit
//!
//! Testing utilities for tapquest.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Fixtures**: an in-memory [`TestWorld`] that devices share, a stand-in
//!   chip authenticator and a secp256k1 [`SignatureCard`]
//! - **Generators**: Proptest strategies for activity payloads and logs
//! - **Vectors**: Deterministic signature-card vectors with high-s raw
//!   signatures and their normalized forms
//!
//! ## Signature-Card Vectors
//!
//! ```rust
//! use tapquest_testkit::vectors::verify_all_vectors;
//!
//! for (name, passed, normalized) in verify_all_vectors() {
//!     assert!(passed, "{name}: {normalized}");
//! }
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use tapquest_testkit::generators::activity_log;
//!
//! proptest! {
//!     #[test]
//!     fn fold_never_panics(events in activity_log(32)) {
//!         let mut state = tapquest_core::LocalState::default();
//!         state.apply_all(events);
//!     }
//! }
//! ```
//!
//! ## Test Fixtures
//!
//! ```rust,ignore
//! use tapquest_testkit::fixtures::{HashAuthenticator, TestWorld};
//!
//! let world = TestWorld::new();
//! world.add_chip_location("04a1b2c3d4e5f6", "pier", "00000001").await;
//! let ada = world.register("ada").await?;
//! ada.process_tap(&HashAuthenticator::tap_params("04a1b2c3d4e5f6", 1)).await?;
//! ```

pub mod fixtures;
pub mod generators;
pub mod vectors;

pub use fixtures::{registration, HashAuthenticator, SignatureCard, TestWorld};
pub use generators::{activity_log, event_from_params, EventParams};
pub use vectors::{all_vectors, generate_from_vector, verify_all_vectors, SigCardVector};
