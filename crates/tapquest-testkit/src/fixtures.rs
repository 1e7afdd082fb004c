//! Test fixtures and helpers.
//!
//! A [`TestWorld`] is the server side every device shares: directory, account
//! store, relay and redemption store, all in memory. Devices are
//! [`Session`]s wired to it with their own state store.

use std::sync::Arc;

use k256::ecdsa::signature::Signer;
use k256::ecdsa::{Signature, SigningKey};

use tapquest::{Collaborators, Registration, Session, SessionConfig};
use tapquest_core::{
    ChipAuthenticator, ChipId, CmacParams, DirectoryEntry, Keypair, LocationId, LocationRecord,
    PersonRecord, Profile, QrId, Secp256k1LowS, SigCardTap, SignedMessage, TapIdentity,
    TapPayload,
};
use tapquest_store::{
    MemoryAccountStore, MemoryDirectory, MemoryRedemptionStore, MemoryStateStore, StateStore,
};
use tapquest_sync::MemoryRelay;

// ─────────────────────────────────────────────────────────────────────────────
// Chips
// ─────────────────────────────────────────────────────────────────────────────

/// Stand-in chip authenticator: the CMAC is the first 8 bytes of
/// `blake3(uid_hex || counter_be)`.
#[derive(Clone, Copy, Debug, Default)]
pub struct HashAuthenticator;

impl HashAuthenticator {
    /// The CMAC a genuine chip would emit.
    pub fn cmac_for(uid_hex: &str, counter: u32) -> [u8; 8] {
        let mut hasher = blake3::Hasher::new();
        hasher.update(uid_hex.as_bytes());
        hasher.update(&counter.to_be_bytes());
        let mut out = [0u8; 8];
        out.copy_from_slice(&hasher.finalize().as_bytes()[..8]);
        out
    }

    /// A well-formed chip payload. `uid_hex` is 14 lowercase hex characters.
    pub fn tap_params(uid_hex: &str, counter: u32) -> TapPayload {
        let ctr = hex::encode(&counter.to_be_bytes()[1..]);
        let cmac = hex::encode(Self::cmac_for(uid_hex, counter));
        TapPayload::Cmac(CmacParams {
            raw: format!("uid={uid_hex}&ctr={ctr}&cmac={cmac}"),
        })
    }
}

impl ChipAuthenticator for HashAuthenticator {
    fn verify(&self, chip_id: &ChipId, counter: u32, cmac: &[u8; 8]) -> bool {
        Self::cmac_for(chip_id.as_str(), counter) == *cmac
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Signature cards
// ─────────────────────────────────────────────────────────────────────────────

/// A secp256k1 signature card.
pub struct SignatureCard {
    key: SigningKey,
}

impl SignatureCard {
    /// A card with a fresh random key.
    pub fn generate() -> Self {
        Self {
            key: SigningKey::random(&mut rand::thread_rng()),
        }
    }

    /// A deterministic card. The seed must be a valid secp256k1 scalar.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            key: SigningKey::from_slice(seed).expect("seed is not a valid secp256k1 scalar"),
        }
    }

    /// Compressed SEC1 public key, hex.
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.key.verifying_key().to_encoded_point(true).as_bytes())
    }

    /// Compact `r || s` signature with low s.
    pub fn sign_low_s(&self, message: &[u8]) -> Signature {
        let sig: Signature = self.key.sign(message);
        sig.normalize_s().unwrap_or(sig)
    }

    /// The same signature with `s` replaced by `n - s`, as some firmwares emit.
    pub fn sign_high_s(&self, message: &[u8]) -> Signature {
        let low = self.sign_low_s(message);
        Signature::from_scalars(low.r().to_bytes(), (-*low.s()).to_bytes())
            .expect("negated s is a valid scalar")
    }

    /// A card tap over `message` carrying a high-s signature.
    pub fn tap(&self, message: &[u8]) -> TapPayload {
        TapPayload::SigCard(SigCardTap {
            signature_public_key: self.public_key_hex(),
            signature_message: hex::encode(message),
            raw_signature: hex::encode(self.sign_high_s(message).to_bytes()),
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// World
// ─────────────────────────────────────────────────────────────────────────────

/// Shared in-memory server side.
pub struct TestWorld {
    pub directory: Arc<MemoryDirectory>,
    pub accounts: Arc<MemoryAccountStore>,
    pub relay: Arc<MemoryRelay>,
    pub redemptions: Arc<MemoryRedemptionStore>,
}

impl TestWorld {
    pub fn new() -> Self {
        let accounts = Arc::new(MemoryAccountStore::new());
        Self {
            directory: Arc::new(MemoryDirectory::new()),
            relay: Arc::new(MemoryRelay::new(accounts.clone())),
            accounts,
            redemptions: Arc::new(MemoryRedemptionStore::new()),
        }
    }

    /// Collaborators for one device backed by `state_store`.
    pub fn collaborators(&self, state_store: Arc<dyn StateStore>) -> Collaborators {
        Collaborators {
            state_store,
            directory: self.directory.clone(),
            accounts: self.accounts.clone(),
            transport: self.relay.clone(),
            redemptions: self.redemptions.clone(),
            chip_authenticator: Arc::new(HashAuthenticator),
            sig_card_scheme: Arc::new(Secp256k1LowS),
        }
    }

    /// A fresh logged-out device.
    pub fn device(&self) -> Session {
        self.device_with_store(Arc::new(MemoryStateStore::new()))
    }

    pub fn device_with_store(&self, state_store: Arc<dyn StateStore>) -> Session {
        Session::new(self.collaborators(state_store), SessionConfig::insecure_fast())
    }

    /// Register `name` on a fresh device.
    pub async fn register(&self, name: &str) -> tapquest::Result<Session> {
        let session = self.device();
        session.register(registration(name)).await?;
        Ok(session)
    }

    /// Bind a chip to a location with a server-issued signature over
    /// `message`. Returns the location's signing key.
    pub async fn add_chip_location(&self, uid_hex: &str, location_id: &str, message: &str) -> Keypair {
        let keypair = Keypair::generate();
        let signature = keypair.sign(message.as_bytes());
        self.directory
            .insert(
                TapIdentity::Chip(ChipId::from(uid_hex)),
                DirectoryEntry::Location(LocationRecord {
                    location_id: LocationId::from(location_id),
                    name: location_id.to_string(),
                    signature_public_key: keypair.public_key().to_hex(),
                    server_signature: Some(SignedMessage {
                        message: message.to_string(),
                        signature: signature.to_hex(),
                    }),
                }),
            )
            .await;
        keypair
    }

    /// Register a signature card as a location. Visits are proven by the
    /// card's own signature.
    pub async fn add_card_location(&self, card: &SignatureCard, location_id: &str) {
        let public_key = card.public_key_hex();
        self.directory
            .insert(
                TapIdentity::SigCard(public_key.clone()),
                DirectoryEntry::Location(LocationRecord {
                    location_id: LocationId::from(location_id),
                    name: location_id.to_string(),
                    signature_public_key: public_key,
                    server_signature: None,
                }),
            )
            .await;
    }

    /// Bind a chip to a registered person.
    pub async fn add_person_chip(&self, uid_hex: &str, person_id: &str, profile: &Profile) {
        self.directory
            .insert(
                TapIdentity::Chip(ChipId::from(uid_hex)),
                DirectoryEntry::Person(PersonRecord {
                    person_id: person_id.to_string(),
                    display_name: profile.display_name.clone(),
                    encryption_public_key: profile.encryption_public_key,
                    signature_public_key: profile.signature_public_key,
                    counter_tap: None,
                }),
            )
            .await;
    }

    pub async fn add_code(&self, qr_id: &str) -> QrId {
        let qr_id = QrId::from(qr_id);
        self.redemptions.add_code(qr_id.clone()).await;
        qr_id
    }
}

impl Default for TestWorld {
    fn default() -> Self {
        Self::new()
    }
}

/// Registration input for `name`, with `<name>@example.com` and
/// `<name>-password`.
pub fn registration(name: &str) -> Registration {
    Registration {
        display_name: name.to_string(),
        email: format!("{name}@example.com"),
        password: format!("{name}-password"),
        wants_server_custody: false,
        allows_analytics: false,
    }
}
