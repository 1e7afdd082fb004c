//! The session: one logged-in user on one device.
//!
//! A [`Session`] owns the device's [`LocalState`] behind a single async mutex
//! and talks to every collaborator through a trait object. The mutex is the
//! ordering lock: taps, appends, syncs and login steps hold it across their
//! fold, so two folds never interleave and the cursor only moves forward.
//!
//! Nothing here retries. Transport failures come back as
//! [`SessionError::Transport`] for the caller to retry.

use std::fmt;
use std::sync::Arc;

use tapquest_core::{
    classify, now_millis, validate_display_name, verify_tap, ActivityEvent, ActivityPayload,
    Blake3Hash, ChipAuthenticator, EncryptionPublicKey, KeyBundle, LocalState, Profile,
    QrId, QuestRequirement, RequirementProgress, SigCardScheme, TapPayload, TapState,
    TapVerification,
};
use tapquest_crypto::{
    generate_key_bundle, BackupCodec, PasswordVerifier, PasswordVerifierExt, StoredBackup,
};
use tapquest_store::{AccountStore, Directory, NewAccount, RedemptionStore, StateStore};
use tapquest_sync::{compute_log_digest, MessageLog, MessageTransport, SyncReport};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::error::{Result, SessionError};

/// The collaborators a session is wired to.
#[derive(Clone)]
pub struct Collaborators {
    pub state_store: Arc<dyn StateStore>,
    pub directory: Arc<dyn Directory>,
    pub accounts: Arc<dyn AccountStore>,
    pub transport: Arc<dyn MessageTransport>,
    pub redemptions: Arc<dyn RedemptionStore>,
    pub chip_authenticator: Arc<dyn ChipAuthenticator>,
    pub sig_card_scheme: Arc<dyn SigCardScheme>,
}

/// Input to [`Session::register`].
#[derive(Clone)]
pub struct Registration {
    pub display_name: String,
    pub email: String,
    pub password: String,
    pub wants_server_custody: bool,
    pub allows_analytics: bool,
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("display_name", &self.display_name)
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .field("wants_server_custody", &self.wants_server_custody)
            .field("allows_analytics", &self.allows_analytics)
            .finish()
    }
}

/// Fields [`Session::update_profile`] may change. `None` leaves a field as is.
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub display_name: Option<String>,
    pub wants_server_custody: Option<bool>,
    pub allows_analytics: Option<bool>,
}

/// Result of [`Session::process_tap`].
#[derive(Debug, Clone)]
pub struct TapOutcome {
    pub state: TapState,
    /// Whether the tap produced a new activity event.
    pub recorded: bool,
}

/// Result of [`Session::redeem`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RedeemOutcome {
    /// `true` for exactly one caller per code.
    pub success: bool,
    /// Whether the `ItemRedeemed` event reached the log.
    pub recorded: bool,
}

/// Credentials needed by every authenticated operation.
struct Credentials {
    token: String,
    keys: KeyBundle,
    profile: Profile,
}

fn credentials(state: &LocalState) -> Result<Credentials> {
    if !state.is_logged_in(now_millis()) {
        return Err(SessionError::NotLoggedIn);
    }
    match (&state.auth_token, &state.keys, &state.profile) {
        (Some(token), Some(keys), Some(profile)) => Ok(Credentials {
            token: token.value.clone(),
            keys: keys.clone(),
            profile: profile.clone(),
        }),
        _ => Err(SessionError::NotLoggedIn),
    }
}

/// Run Argon2id work off the async runtime.
async fn kdf_blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> tapquest_crypto::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| SessionError::Store(format!("spawn_blocking failed: {}", e)))?
        .map_err(SessionError::from)
}

/// A single user's session.
pub struct Session {
    config: SessionConfig,
    state: Mutex<LocalState>,
    state_store: Arc<dyn StateStore>,
    directory: Arc<dyn Directory>,
    accounts: Arc<dyn AccountStore>,
    redemptions: Arc<dyn RedemptionStore>,
    chip_authenticator: Arc<dyn ChipAuthenticator>,
    sig_card_scheme: Arc<dyn SigCardScheme>,
    log: MessageLog,
}

impl Session {
    /// A logged-out session.
    pub fn new(collaborators: Collaborators, config: SessionConfig) -> Self {
        Self::with_state(collaborators, config, LocalState::default())
    }

    /// Resume from whatever the state store holds.
    pub async fn restore(collaborators: Collaborators, config: SessionConfig) -> Result<Self> {
        let state = collaborators.state_store.load().await?.unwrap_or_default();
        Ok(Self::with_state(collaborators, config, state))
    }

    fn with_state(collaborators: Collaborators, config: SessionConfig, state: LocalState) -> Self {
        let log = MessageLog::new(collaborators.transport, config.sync.clone());
        Self {
            config,
            state: Mutex::new(state),
            state_store: collaborators.state_store,
            directory: collaborators.directory,
            accounts: collaborators.accounts,
            redemptions: collaborators.redemptions,
            chip_authenticator: collaborators.chip_authenticator,
            sig_card_scheme: collaborators.sig_card_scheme,
            log,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// A copy of the current local state.
    pub async fn snapshot(&self) -> LocalState {
        self.state.lock().await.clone()
    }

    pub async fn is_logged_in(&self) -> bool {
        self.state.lock().await.is_logged_in(now_millis())
    }

    /// Digest of the folded log, for comparing devices.
    pub async fn log_digest(&self) -> Blake3Hash {
        compute_log_digest(&*self.state.lock().await)
    }

    fn backup_codec(&self, verifier: &PasswordVerifier) -> BackupCodec {
        BackupCodec::new(self.config.kdf, verifier.salt)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Account
    // ─────────────────────────────────────────────────────────────────────────

    /// Create an account, persist fresh credentials and deliver the first
    /// self-message.
    ///
    /// Once the account exists, any failure to back up or to deliver the
    /// `Registered` message rolls the local credentials back and returns
    /// [`SessionError::FatalRegistration`].
    pub async fn register(&self, registration: Registration) -> Result<Profile> {
        validate_display_name(&registration.display_name)
            .map_err(|e| SessionError::InvalidInput(e.to_string()))?;
        if registration.email.trim().is_empty() {
            return Err(SessionError::InvalidInput("email is required".into()));
        }

        let mut state = self.state.lock().await;
        let keys = generate_key_bundle();
        let profile = Profile {
            display_name: registration.display_name,
            email: registration.email,
            wants_server_custody: registration.wants_server_custody,
            allows_analytics: registration.allows_analytics,
            encryption_public_key: keys.encryption_public_key,
            signature_public_key: keys.signature_public_key,
        };

        let kdf = self.config.kdf;
        let password = registration.password.clone();
        let password_verifier =
            kdf_blocking(move || PasswordVerifier::create(&kdf, &password)).await?;

        let auth_token = self
            .accounts
            .create_account(NewAccount {
                profile: profile.clone(),
                password_verifier: password_verifier.clone(),
            })
            .await?;
        info!(identifier = %profile.email, "account created");

        *state = LocalState {
            auth_token: Some(auth_token),
            keys: Some(keys),
            profile: Some(profile.clone()),
            password_verifier: Some(password_verifier),
            ..LocalState::default()
        };

        if let Err(e) = self.finish_registration(&mut state, &registration.password).await {
            warn!(error = %e, "registration handshake failed, rolling back");
            state.clear();
            if let Err(clear_err) = self.state_store.clear().await {
                warn!(error = %clear_err, "could not clear persisted state");
            }
            return Err(SessionError::FatalRegistration(e.to_string()));
        }

        info!(identifier = %profile.email, "registered");
        Ok(profile)
    }

    async fn finish_registration(&self, state: &mut LocalState, password: &str) -> Result<()> {
        self.state_store.save(state).await?;
        self.upload_backup(state, password).await?;
        self.record(state, vec![(ActivityPayload::Registered, None)]).await?;
        Ok(())
    }

    /// Log in on this device: check the password, restore the latest backup
    /// and refetch the log.
    ///
    /// If the post-login sync fails the restored state is cleared again.
    pub async fn login(&self, identifier: &str, password: &str) -> Result<Profile> {
        let record = self
            .accounts
            .find_account(identifier)
            .await?
            .ok_or_else(|| SessionError::Authentication("unknown account".into()))?;

        let kdf = self.config.kdf;
        let verifier = record.password_verifier.clone();
        let candidate = password.to_string();
        let accepted = kdf_blocking(move || verifier.verify(&kdf, &candidate)).await?;
        if !accepted {
            info!(%identifier, "login rejected");
            return Err(SessionError::Authentication("wrong password".into()));
        }

        let backup = record
            .latest_backup
            .clone()
            .ok_or_else(|| SessionError::Authentication("account has no backup".into()))?;
        let codec = self.backup_codec(&record.password_verifier);
        let (identifier_owned, password_owned) = (identifier.to_string(), password.to_string());
        let mut restored = kdf_blocking(move || {
            codec.restore_backup(&backup, &identifier_owned, &password_owned)
        })
        .await?;

        let keys = restored
            .keys
            .clone()
            .ok_or_else(|| SessionError::Verification("backup holds no keys".into()))?;
        if keys.encryption_public_key != record.profile.encryption_public_key
            || keys.signature_public_key != record.profile.signature_public_key
        {
            return Err(SessionError::Verification(
                "backup keys do not match the account".into(),
            ));
        }
        restored.auth_token = Some(record.auth_token);
        restored.profile = Some(record.profile.clone());
        restored.password_verifier = Some(record.password_verifier);

        let mut state = self.state.lock().await;
        *state = restored;
        let token = credentials(&state)?.token;
        let synced = match self
            .log
            .sync(&token, &mut state, self.config.full_sync_on_login, vec![])
            .await
        {
            Ok(report) => self
                .state_store
                .save(&state)
                .await
                .map(|_| report)
                .map_err(SessionError::from),
            Err(e) => Err(SessionError::from(e)),
        };
        match synced {
            Ok(report) => {
                info!(%identifier, applied = report.applied, "logged in");
                Ok(record.profile)
            }
            Err(e) => {
                warn!(%identifier, error = %e, "post-login sync failed, rolling back");
                state.clear();
                if let Err(clear_err) = self.state_store.clear().await {
                    warn!(error = %clear_err, "could not clear persisted state");
                }
                Err(e)
            }
        }
    }

    /// Forget this device's credentials and log.
    pub async fn logout(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        state.clear();
        self.state_store.clear().await?;
        info!("logged out");
        Ok(())
    }

    /// Change profile fields and push the new profile to the account store.
    pub async fn update_profile(&self, update: ProfileUpdate) -> Result<Profile> {
        let mut state = self.state.lock().await;
        let credentials = credentials(&state)?;
        let mut profile = credentials.profile;

        if let Some(display_name) = update.display_name {
            validate_display_name(&display_name)
                .map_err(|e| SessionError::InvalidInput(e.to_string()))?;
            profile.display_name = display_name;
        }
        if let Some(custody) = update.wants_server_custody {
            profile.wants_server_custody = custody;
        }
        if let Some(analytics) = update.allows_analytics {
            profile.allows_analytics = analytics;
        }

        self.accounts
            .update_profile(&credentials.token, profile.clone())
            .await?;
        state.profile = Some(profile.clone());
        self.state_store.save(&state).await?;
        debug!(display_name = %profile.display_name, "profile updated");
        Ok(profile)
    }

    /// Export the current state and upload it.
    ///
    /// The password must match the one the account was registered with.
    /// Encrypted unless the profile opted into server custody.
    pub async fn create_backup(&self, password: &str) -> Result<StoredBackup> {
        let state = self.state.lock().await;
        credentials(&state)?;
        self.upload_backup(&state, password).await
    }

    async fn upload_backup(&self, state: &LocalState, password: &str) -> Result<StoredBackup> {
        let credentials = credentials(state)?;
        let verifier = state
            .password_verifier
            .clone()
            .ok_or(SessionError::NotLoggedIn)?;

        let kdf = self.config.kdf;
        let check = verifier.clone();
        let candidate = password.to_string();
        if !kdf_blocking(move || check.verify(&kdf, &candidate)).await? {
            return Err(SessionError::Authentication("wrong password".into()));
        }

        let codec = self.backup_codec(&verifier);
        let snapshot = state.clone();
        let custodial = credentials.profile.wants_server_custody;
        let identifier = credentials.profile.email.clone();
        let password = password.to_string();
        let backup = kdf_blocking(move || {
            codec.create_backup(&snapshot, custodial, &identifier, &password)
        })
        .await?;

        self.accounts
            .upload_backup(&credentials.token, backup.clone())
            .await?;
        debug!(custodial, "backup uploaded");
        Ok(backup)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Activity log
    // ─────────────────────────────────────────────────────────────────────────

    /// Seal events, post them, fetch and fold, then persist.
    ///
    /// Each payload goes to its recipient, or to this user when `None`.
    /// Returns the events that were created.
    async fn record(
        &self,
        state: &mut LocalState,
        payloads: Vec<(ActivityPayload, Option<EncryptionPublicKey>)>,
    ) -> Result<Vec<ActivityEvent>> {
        let credentials = credentials(state)?;
        let own_key = credentials.keys.encryption_public_key;

        let mut events = Vec::with_capacity(payloads.len());
        let mut outgoing = Vec::with_capacity(payloads.len());
        for (payload, recipient) in payloads {
            let recipient = recipient.unwrap_or(own_key);
            let event = ActivityEvent::new(now_millis(), own_key, recipient, payload);
            outgoing.push(self.log.append(&event, &recipient, &credentials.keys)?);
            events.push(event);
        }

        let report = self
            .log
            .sync(&credentials.token, state, false, outgoing)
            .await?;
        self.state_store.save(state).await?;
        debug!(
            created = events.len(),
            applied = report.applied,
            failures = report.failures.len(),
            "recorded events"
        );
        Ok(events)
    }

    /// Append one event to this user's log, or send it to `recipient`.
    pub async fn append_event(
        &self,
        payload: ActivityPayload,
        recipient: Option<EncryptionPublicKey>,
    ) -> Result<ActivityEvent> {
        let mut state = self.state.lock().await;
        let mut events = self.record(&mut state, vec![(payload, recipient)]).await?;
        events
            .pop()
            .ok_or_else(|| SessionError::Store("no event recorded".into()))
    }

    /// Fetch and fold. `force_refresh` refetches the whole mailbox.
    pub async fn sync(&self, force_refresh: bool) -> Result<SyncReport> {
        let mut state = self.state.lock().await;
        let token = credentials(&state)?.token;
        let report = self
            .log
            .sync(&token, &mut state, force_refresh, vec![])
            .await?;
        self.state_store.save(&state).await?;
        if !report.is_clean() {
            warn!(failures = report.failures.len(), "sync skipped messages");
        }
        Ok(report)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Taps
    // ─────────────────────────────────────────────────────────────────────────

    /// Verify, classify and, where it is new, record a tap.
    ///
    /// A first visit to a location appends a `LocationTap` event. A repeat
    /// visit returns the existing signature and appends nothing. A person tap
    /// records the connection locally and sends this user's details to the
    /// other person.
    pub async fn process_tap(&self, payload: &TapPayload) -> Result<TapOutcome> {
        let mut state = self.state.lock().await;
        let credentials = credentials(&state)?;

        let verification = verify_tap(
            payload,
            self.chip_authenticator.as_ref(),
            self.sig_card_scheme.as_ref(),
        );
        let entry = match &verification {
            TapVerification::Valid(verified) => self.directory.lookup(&verified.identity).await?,
            TapVerification::Invalid => None,
        };
        let tap_state = classify(verification, entry, &state.location_signatures);

        let payloads = match &tap_state {
            TapState::ValidLocation {
                location,
                existing_signature: None,
            } => vec![(
                ActivityPayload::LocationTap {
                    location_id: location.location_id.clone(),
                    location_name: location.name.clone(),
                    signature_public_key: location.signature_public_key.clone(),
                    signature_message: location.signature_message.clone(),
                    signature: location.signature.clone(),
                },
                None,
            )],
            TapState::ValidPerson { person } => {
                let (counter_message, signature) = match (&person.counter_tap, payload) {
                    (Some(signed), _) => (Some(signed.message.clone()), Some(signed.signature.clone())),
                    (None, TapPayload::Person(tap)) => {
                        (Some(tap.counter_message.clone()), Some(tap.signature.clone()))
                    }
                    (None, _) => (None, None),
                };
                let own = &credentials.profile;
                vec![
                    (
                        ActivityPayload::PersonTap {
                            person_id: person.person_id.clone(),
                            display_name: person.display_name.clone(),
                            signature_public_key: person.signature_public_key,
                            counter_message,
                            signature,
                        },
                        None,
                    ),
                    (
                        ActivityPayload::PersonTap {
                            person_id: own.signature_public_key.to_hex(),
                            display_name: own.display_name.clone(),
                            signature_public_key: own.signature_public_key,
                            counter_message: None,
                            signature: None,
                        },
                        Some(person.encryption_public_key),
                    ),
                ]
            }
            _ => Vec::new(),
        };

        let recorded = !payloads.is_empty();
        if recorded {
            self.record(&mut state, payloads).await?;
        }
        info!(code = tap_state.code(), recorded, "processed tap");
        Ok(TapOutcome {
            state: tap_state,
            recorded,
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Redemption
    // ─────────────────────────────────────────────────────────────────────────

    /// Redeem a code once.
    ///
    /// The store decides; a `false` is final and never retried. The
    /// `ItemRedeemed` event is appended only on success, and a failure to
    /// deliver it is logged without changing the outcome.
    pub async fn redeem(&self, qr_id: &QrId, item_id: &str, item_name: &str) -> Result<RedeemOutcome> {
        let mut state = self.state.lock().await;
        credentials(&state)?;

        let success = self.redemptions.atomic_redeem(qr_id).await?;
        if !success {
            info!(%qr_id, "redemption refused");
            return Ok(RedeemOutcome {
                success: false,
                recorded: false,
            });
        }

        let payload = ActivityPayload::ItemRedeemed {
            item_id: item_id.to_string(),
            item_name: item_name.to_string(),
            qr_id: qr_id.clone(),
        };
        let recorded = match self.record(&mut state, vec![(payload, None)]).await {
            Ok(_) => true,
            Err(e) => {
                warn!(%qr_id, error = %e, "redeemed but could not record");
                false
            }
        };
        info!(%qr_id, recorded, "redeemed");
        Ok(RedeemOutcome {
            success: true,
            recorded,
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Quests
    // ─────────────────────────────────────────────────────────────────────────

    /// Progress towards a quest requirement from the folded log.
    pub async fn quest_progress(&self, requirement: &QuestRequirement) -> RequirementProgress {
        requirement.progress(&*self.state.lock().await)
    }
}
