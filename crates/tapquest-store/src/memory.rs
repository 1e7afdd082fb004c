//! In-memory implementations of the collaborator traits.
//!
//! These are primarily for tests. They have the same semantics as the
//! persistent backends but keep everything in memory.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use rand::RngCore;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use tapquest_core::{
    now_millis, AuthToken, DirectoryEntry, EncryptionPublicKey, LocalState, Profile, QrId,
    TapIdentity,
};
use tapquest_crypto::{PasswordVerifier, StoredBackup};

use crate::error::{Result, StoreError};
use crate::traits::{
    AccountRecord, AccountStore, Directory, NewAccount, RedemptionStore, StateStore, TokenResolver,
};

/// Default token lifetime: thirty days.
pub const DEFAULT_TOKEN_LIFETIME_MS: u64 = 30 * 24 * 60 * 60 * 1000;

// ─────────────────────────────────────────────────────────────────────────────
// State
// ─────────────────────────────────────────────────────────────────────────────

/// Keeps the local state in memory.
#[derive(Default)]
pub struct MemoryStateStore {
    state: RwLock<Option<LocalState>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn load(&self) -> Result<Option<LocalState>> {
        Ok(self.state.read().await.clone())
    }

    async fn save(&self, state: &LocalState) -> Result<()> {
        *self.state.write().await = Some(state.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        *self.state.write().await = None;
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Directory
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct MemoryDirectory {
    entries: RwLock<HashMap<TapIdentity, DirectoryEntry>>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, identity: TapIdentity, entry: DirectoryEntry) {
        self.entries.write().await.insert(identity, entry);
    }
}

#[async_trait]
impl Directory for MemoryDirectory {
    async fn lookup(&self, identity: &TapIdentity) -> Result<Option<DirectoryEntry>> {
        Ok(self.entries.read().await.get(identity).cloned())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Accounts
// ─────────────────────────────────────────────────────────────────────────────

struct StoredAccount {
    profile: Profile,
    password_verifier: PasswordVerifier,
    backups: Vec<StoredBackup>,
}

#[derive(Default)]
struct AccountsInner {
    /// Normalized identifier -> account.
    accounts: HashMap<String, StoredAccount>,
    /// Token value -> (identifier, token).
    tokens: HashMap<String, (String, AuthToken)>,
}

impl AccountsInner {
    fn account_for_token(&mut self, token: &str, now: u64) -> Result<&mut StoredAccount> {
        let identifier = match self.tokens.get(token) {
            Some((identifier, issued)) if !issued.is_expired(now) => identifier.clone(),
            _ => return Err(StoreError::Unauthorized),
        };
        self.accounts
            .get_mut(&identifier)
            .ok_or(StoreError::Unauthorized)
    }
}

/// Accounts, tokens and backups in memory.
pub struct MemoryAccountStore {
    inner: Mutex<AccountsInner>,
    token_lifetime_ms: u64,
}

fn normalize_identifier(identifier: &str) -> String {
    identifier.trim().to_lowercase()
}

impl MemoryAccountStore {
    pub fn new() -> Self {
        Self::with_token_lifetime(DEFAULT_TOKEN_LIFETIME_MS)
    }

    pub fn with_token_lifetime(token_lifetime_ms: u64) -> Self {
        Self {
            inner: Mutex::new(AccountsInner::default()),
            token_lifetime_ms,
        }
    }

    fn issue_token(&self, inner: &mut AccountsInner, identifier: &str) -> AuthToken {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        let token = AuthToken {
            value: hex::encode(bytes),
            expires_at: now_millis().saturating_add(self.token_lifetime_ms),
        };
        inner
            .tokens
            .insert(token.value.clone(), (identifier.to_string(), token.clone()));
        token
    }

    /// Number of backups uploaded for an identifier.
    pub async fn backup_count(&self, identifier: &str) -> usize {
        self.inner
            .lock()
            .await
            .accounts
            .get(&normalize_identifier(identifier))
            .map_or(0, |a| a.backups.len())
    }
}

impl Default for MemoryAccountStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    async fn create_account(&self, account: NewAccount) -> Result<AuthToken> {
        let identifier = normalize_identifier(&account.profile.email);
        let mut inner = self.inner.lock().await;
        if inner.accounts.contains_key(&identifier) {
            return Err(StoreError::Conflict(format!("account {identifier} exists")));
        }
        inner.accounts.insert(
            identifier.clone(),
            StoredAccount {
                profile: account.profile,
                password_verifier: account.password_verifier,
                backups: Vec::new(),
            },
        );
        debug!(%identifier, "created account");
        Ok(self.issue_token(&mut inner, &identifier))
    }

    async fn find_account(&self, identifier: &str) -> Result<Option<AccountRecord>> {
        let identifier = normalize_identifier(identifier);
        let mut inner = self.inner.lock().await;
        let Some(account) = inner.accounts.get(&identifier) else {
            return Ok(None);
        };
        let profile = account.profile.clone();
        let password_verifier = account.password_verifier.clone();
        let latest_backup = account.backups.last().cloned();
        let auth_token = self.issue_token(&mut inner, &identifier);
        Ok(Some(AccountRecord {
            auth_token,
            profile,
            password_verifier,
            latest_backup,
        }))
    }

    async fn upload_backup(&self, token: &str, backup: StoredBackup) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.account_for_token(token, now_millis())?.backups.push(backup);
        Ok(())
    }

    async fn update_profile(&self, token: &str, profile: Profile) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let account = inner.account_for_token(token, now_millis())?;
        if normalize_identifier(&profile.email) != normalize_identifier(&account.profile.email) {
            return Err(StoreError::Conflict("identifier cannot change".into()));
        }
        account.profile = profile;
        Ok(())
    }
}

#[async_trait]
impl TokenResolver for MemoryAccountStore {
    async fn resolve(&self, token: &str) -> Result<Option<EncryptionPublicKey>> {
        let mut inner = self.inner.lock().await;
        match inner.account_for_token(token, now_millis()) {
            Ok(account) => Ok(Some(account.profile.encryption_public_key)),
            Err(StoreError::Unauthorized) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Redemption
// ─────────────────────────────────────────────────────────────────────────────

/// Redemption codes behind a single mutex: check and set happen under one lock.
#[derive(Default)]
pub struct MemoryRedemptionStore {
    /// Code -> redeemed.
    codes: Mutex<HashMap<QrId, bool>>,
    offline: AtomicBool,
}

impl MemoryRedemptionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_codes(codes: impl IntoIterator<Item = QrId>) -> Self {
        Self {
            codes: Mutex::new(codes.into_iter().map(|c| (c, false)).collect()),
            offline: AtomicBool::new(false),
        }
    }

    pub async fn add_code(&self, qr_id: QrId) {
        self.codes.lock().await.entry(qr_id).or_insert(false);
    }

    pub async fn redeemed_codes(&self) -> HashSet<QrId> {
        self.codes
            .lock()
            .await
            .iter()
            .filter(|(_, redeemed)| **redeemed)
            .map(|(code, _)| code.clone())
            .collect()
    }

    /// Simulate an unreachable backend.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }
}

#[async_trait]
impl RedemptionStore for MemoryRedemptionStore {
    async fn atomic_redeem(&self, qr_id: &QrId) -> Result<bool> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("redemption store offline".into()));
        }
        let mut codes = self.codes.lock().await;
        match codes.get_mut(qr_id) {
            Some(redeemed) if !*redeemed => {
                *redeemed = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
