//! Collaborator traits: the abstract interfaces a session talks to.
//!
//! A session never reaches for ambient storage or a concrete server. It is
//! handed implementations of these traits: in-memory ones for tests, SQLite
//! ones for the device, HTTP clients in production.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tapquest_core::{AuthToken, DirectoryEntry, EncryptionPublicKey, LocalState, Profile, QrId, TapIdentity};
use tapquest_crypto::{PasswordVerifier, StoredBackup};

use crate::error::Result;

/// Load/save capability for a device's [`LocalState`].
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn load(&self) -> Result<Option<LocalState>>;

    async fn save(&self, state: &LocalState) -> Result<()>;

    /// Remove every persisted trace of the local account.
    async fn clear(&self) -> Result<()>;
}

/// Registered people and locations, keyed by the identity a tap proves.
#[async_trait]
pub trait Directory: Send + Sync {
    /// `None` when the identity has never been seen.
    async fn lookup(&self, identity: &TapIdentity) -> Result<Option<DirectoryEntry>>;
}

/// What registration sends to the account store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAccount {
    pub profile: Profile,
    pub password_verifier: PasswordVerifier,
}

/// What the account store returns for a login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRecord {
    pub auth_token: AuthToken,
    pub profile: Profile,
    pub password_verifier: PasswordVerifier,
    pub latest_backup: Option<StoredBackup>,
}

/// Server-side accounts and backups.
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Fails with [`crate::StoreError::Conflict`] if the identifier is taken.
    async fn create_account(&self, account: NewAccount) -> Result<AuthToken>;

    async fn find_account(&self, identifier: &str) -> Result<Option<AccountRecord>>;

    async fn upload_backup(&self, token: &str, backup: StoredBackup) -> Result<()>;

    async fn update_profile(&self, token: &str, profile: Profile) -> Result<()>;
}

/// Resolves a bearer token to the account's encryption key.
///
/// Message relays use this to find the caller's mailbox.
#[async_trait]
pub trait TokenResolver: Send + Sync {
    /// `None` for unknown or expired tokens.
    async fn resolve(&self, token: &str) -> Result<Option<EncryptionPublicKey>>;
}

/// The at-most-once redemption contract.
#[async_trait]
pub trait RedemptionStore: Send + Sync {
    /// Flip `qr_id` from unredeemed to redeemed in one atomic step.
    ///
    /// Returns `true` for exactly one caller per code. Unknown codes and
    /// already-redeemed codes return `false`.
    async fn atomic_redeem(&self, qr_id: &QrId) -> Result<bool>;
}
