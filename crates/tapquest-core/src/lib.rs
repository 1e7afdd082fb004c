//! # Tapquest Core
//!
//! Pure primitives for tapquest: tap payloads and their verification, tap
//! classification, activity events and the local state they fold into.
//!
//! This crate contains no I/O, no storage, no networking. It is pure computation
//! over cryptographic data structures.
//!
//! ## Key Types
//!
//! - [`TapPayload`] - What a tap produced, before verification
//! - [`TapState`] - The terminal classification of a tap
//! - [`ActivityEvent`] - One entry in the self-encrypted activity log
//! - [`LocalState`] - A device's credentials plus its folded activity log
//!
//! ## Verification
//!
//! Verifiers never fail: malformed input is an `Invalid` outcome. See [`verify`].

pub mod classify;
pub mod counter;
pub mod crypto;
pub mod encoding;
pub mod error;
pub mod event;
pub mod normalize;
pub mod quest;
pub mod state;
pub mod tap;
pub mod types;
pub mod verify;

pub use classify::{classify, TapState};
pub use counter::extract_counter_from_message;
pub use crypto::{Blake3Hash, Ed25519PublicKey, Ed25519Signature, EncryptionPublicKey, Keypair};
pub use error::{CoreError, ProfileError};
pub use event::{ActivityEvent, ActivityPayload};
pub use normalize::{Secp256k1LowS, SigCardScheme};
pub use quest::{QuestRequirement, RequirementKind, RequirementProgress};
pub use state::{
    validate_display_name, Connection, FoldOutcome, FoldSummary, KeyBundle, LocalState,
    LocationSignature, PasswordVerifier, Profile,
};
pub use tap::{
    CmacParams, DirectoryEntry, LocationRecord, LocationTap, PersonRecord, PersonTap, SigCardTap,
    SignedMessage, TapIdentity, TapPayload,
};
pub use types::{now_millis, AuthToken, ChipId, EventId, LocationId, LogCursor, QrId, Timestamp};
pub use verify::{
    verify_cmac_tap, verify_location_tap, verify_person_tap, verify_sig_card_tap, verify_tap,
    ChipAuthenticator, CmacVerification, SigCardVerification, TapProof, TapVerification,
    VerifiedTap,
};
