//! End-to-end session behavior over in-memory collaborators.

use std::sync::Arc;

use tapquest::core::{
    CmacParams, DirectoryEntry, Keypair, LocationId, LocationRecord, LocationTap, TapIdentity,
};
use tapquest::store::{MemoryStateStore, SqliteStore, StateStore};
use tapquest::core::LogCursor;
use tapquest::{
    ActivityPayload, ProfileUpdate, QuestRequirement, RequirementKind, Session, SessionConfig,
    SessionError, TapPayload, TapState,
};
use tapquest_testkit::{registration, HashAuthenticator, TestWorld};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn chip_tap(uid_hex: &str, counter: u32) -> TapPayload {
    HashAuthenticator::tap_params(uid_hex, counter)
}

/// Server-issued message for every chip-bound location in these tests.
const LOCATION_MESSAGE: &str = "0000000c";

// ─────────────────────────────────────────────────────────────────────────────
// Registration and login
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn register_records_first_self_message() {
    init_tracing();
    let world = TestWorld::new();
    let session = world.register("ada").await.unwrap();

    assert!(session.is_logged_in().await);
    let state = session.snapshot().await;
    let events = state.ordered_activities();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].payload, ActivityPayload::Registered);
    assert!(state.cursor.is_some());
    assert_eq!(world.accounts.backup_count("ada@example.com").await, 1);
}

#[tokio::test]
async fn register_rejects_bad_display_name() {
    let world = TestWorld::new();
    let session = world.device();
    let mut bad = registration("ada");
    bad.display_name = "no spaces allowed".into();
    assert!(matches!(
        session.register(bad).await,
        Err(SessionError::InvalidInput(_))
    ));
}

#[tokio::test]
async fn duplicate_registration_is_conflict() {
    let world = TestWorld::new();
    world.register("ada").await.unwrap();

    let second = world.device();
    let err = second.register(registration("ada")).await.unwrap_err();
    assert!(matches!(err, SessionError::Conflict(_)));
    assert!(!err.is_retryable());
    assert!(!second.is_logged_in().await);
}

#[tokio::test]
async fn undeliverable_first_message_rolls_back() {
    init_tracing();
    let world = TestWorld::new();
    world.relay.set_reject_posts(true);

    let store = Arc::new(MemoryStateStore::new());
    let session = world.device_with_store(store.clone());
    let err = session.register(registration("ada")).await.unwrap_err();

    assert!(matches!(err, SessionError::FatalRegistration(_)));
    assert!(!session.is_logged_in().await);
    assert_eq!(session.snapshot().await, Default::default());
    assert!(store.load().await.unwrap().is_none());
}

#[tokio::test]
async fn login_on_second_device_restores_log() {
    init_tracing();
    let world = TestWorld::new();
    world.add_chip_location("04a1b2c3d4e5f6", "pier", LOCATION_MESSAGE).await;

    let phone = world.register("ada").await.unwrap();
    phone.process_tap(&chip_tap("04a1b2c3d4e5f6", 1)).await.unwrap();

    let laptop = world.device();
    laptop.login("ADA@example.com ", "ada-password").await.unwrap();

    assert!(laptop.is_logged_in().await);
    assert_eq!(laptop.log_digest().await, phone.log_digest().await);
    let restored = laptop.snapshot().await;
    assert_eq!(restored.activities.len(), 2);
    assert!(restored
        .location_signature(&LocationId::from("pier"))
        .is_some());
}

#[tokio::test]
async fn login_with_wrong_password_fails() {
    let world = TestWorld::new();
    world.register("ada").await.unwrap();

    let laptop = world.device();
    assert!(matches!(
        laptop.login("ada@example.com", "nope").await,
        Err(SessionError::Authentication(_))
    ));
    assert!(matches!(
        laptop.login("bob@example.com", "ada-password").await,
        Err(SessionError::Authentication(_))
    ));
    assert!(!laptop.is_logged_in().await);
}

#[tokio::test]
async fn failed_post_login_sync_rolls_back() {
    let world = TestWorld::new();
    world.register("ada").await.unwrap();
    world.relay.set_offline(true);

    let store = Arc::new(MemoryStateStore::new());
    let laptop = world.device_with_store(store.clone());
    let err = laptop.login("ada@example.com", "ada-password").await.unwrap_err();

    assert!(err.is_retryable());
    assert!(!laptop.is_logged_in().await);
    assert!(store.load().await.unwrap().is_none());
}

#[tokio::test]
async fn session_resumes_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("device.db");
    let world = TestWorld::new();

    let first = world.device_with_store(Arc::new(SqliteStore::open(&path).unwrap()));
    first.register(registration("ada")).await.unwrap();
    let digest = first.log_digest().await;
    drop(first);

    let resumed = Session::restore(
        world.collaborators(Arc::new(SqliteStore::open(&path).unwrap())),
        SessionConfig::insecure_fast(),
    )
    .await
    .unwrap();
    assert!(resumed.is_logged_in().await);
    assert_eq!(resumed.log_digest().await, digest);
    assert_eq!(resumed.sync(false).await.unwrap().applied, 0);
}

#[tokio::test]
async fn logout_clears_everything() {
    let world = TestWorld::new();
    let store = Arc::new(MemoryStateStore::new());
    let session = world.device_with_store(store.clone());
    session.register(registration("ada")).await.unwrap();

    session.logout().await.unwrap();
    assert!(!session.is_logged_in().await);
    assert!(store.load().await.unwrap().is_none());
    assert!(matches!(
        session.sync(false).await,
        Err(SessionError::NotLoggedIn)
    ));
}

// ─────────────────────────────────────────────────────────────────────────────
// Taps
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn first_visit_records_repeat_visit_does_not() {
    init_tracing();
    let world = TestWorld::new();
    world.add_chip_location("04a1b2c3d4e5f6", "pier", LOCATION_MESSAGE).await;
    let session = world.register("ada").await.unwrap();

    let first = session.process_tap(&chip_tap("04a1b2c3d4e5f6", 1)).await.unwrap();
    assert!(first.recorded);
    assert!(matches!(
        first.state,
        TapState::ValidLocation {
            existing_signature: None,
            ..
        }
    ));

    let second = session.process_tap(&chip_tap("04a1b2c3d4e5f6", 2)).await.unwrap();
    assert!(!second.recorded);
    match second.state {
        TapState::ValidLocation {
            existing_signature: Some(existing),
            ..
        } => assert_eq!(existing.msg, LOCATION_MESSAGE),
        other => panic!("expected existing signature, got {:?}", other),
    }
    assert_eq!(session.snapshot().await.activities.len(), 2);
}

#[tokio::test]
async fn forged_chip_is_invalid() {
    let world = TestWorld::new();
    world.add_chip_location("04a1b2c3d4e5f6", "pier", LOCATION_MESSAGE).await;
    let session = world.register("ada").await.unwrap();

    let forged = TapPayload::Cmac(CmacParams {
        raw: "uid=04a1b2c3d4e5f6&ctr=000001&cmac=0000000000000000".into(),
    });
    let outcome = session.process_tap(&forged).await.unwrap();
    assert_eq!(outcome.state, TapState::CmacInvalid);
    assert!(!outcome.recorded);
}

#[tokio::test]
async fn unknown_chip_is_unregistered_person() {
    let world = TestWorld::new();
    let session = world.register("ada").await.unwrap();
    let outcome = session.process_tap(&chip_tap("04000000000001", 1)).await.unwrap();
    assert_eq!(outcome.state.code(), "PERSON_NOT_REGISTERED");
}

#[tokio::test]
async fn signed_location_tap_is_accepted() {
    let world = TestWorld::new();
    let keypair = Keypair::generate();
    world
        .directory
        .insert(
            TapIdentity::Location(LocationId::from("gate")),
            DirectoryEntry::Location(LocationRecord {
                location_id: LocationId::from("gate"),
                name: "Gate".into(),
                signature_public_key: keypair.public_key().to_hex(),
                server_signature: None,
            }),
        )
        .await;
    let session = world.register("ada").await.unwrap();

    let message = "00000003";
    let tap = TapPayload::Location(LocationTap {
        location_id: LocationId::from("gate"),
        name: "Gate".into(),
        signature_public_key: keypair.public_key().to_hex(),
        signature_message: message.into(),
        signature: keypair.sign(message.as_bytes()).to_hex(),
    });
    let outcome = session.process_tap(&tap).await.unwrap();
    assert!(outcome.recorded);
    let state = session.snapshot().await;
    let signature = state.location_signature(&LocationId::from("gate")).unwrap();
    assert_eq!(signature.visitor_number(), Some(3));
}

#[tokio::test]
async fn person_tap_connects_both_sides() {
    init_tracing();
    let world = TestWorld::new();
    let ada = world.register("ada").await.unwrap();
    let bob = world.register("bob").await.unwrap();

    let bob_profile = bob.snapshot().await.profile.unwrap();
    world
        .add_person_chip("04b0b0b0b0b0b0", "bob", &bob_profile)
        .await;

    let outcome = ada.process_tap(&chip_tap("04b0b0b0b0b0b0", 5)).await.unwrap();
    assert!(outcome.recorded);
    assert!(matches!(outcome.state, TapState::ValidPerson { .. }));
    let ada_state = ada.snapshot().await;
    assert_eq!(ada_state.connections["bob"].tap_count, 1);

    let report = bob.sync(false).await.unwrap();
    assert_eq!(report.applied, 1);
    let ada_key = ada_state.profile.unwrap().signature_public_key;
    let bob_state = bob.snapshot().await;
    let connection = &bob_state.connections[&ada_key.to_hex()];
    assert_eq!(connection.display_name, "ada");

    let requirement = QuestRequirement {
        kind: RequirementKind::User,
        public_keys: vec![bob_profile.signature_public_key.to_hex()],
        num_sigs_required: 1,
    };
    assert!(ada.quest_progress(&requirement).await.is_completed());
}

#[tokio::test]
async fn taps_require_login() {
    let world = TestWorld::new();
    let session = world.device();
    assert!(matches!(
        session.process_tap(&chip_tap("04a1b2c3d4e5f6", 1)).await,
        Err(SessionError::NotLoggedIn)
    ));
}

#[tokio::test]
async fn peer_cannot_mark_a_location_visited() {
    init_tracing();
    let world = TestWorld::new();
    world.add_chip_location("04a1b2c3d4e5f6", "pier", LOCATION_MESSAGE).await;
    let ada = world.register("ada").await.unwrap();
    let bob = world.register("bob").await.unwrap();
    let ada_key = ada.snapshot().await.keys.unwrap().encryption_public_key;

    bob.append_event(
        ActivityPayload::LocationTap {
            location_id: LocationId::from("pier"),
            location_name: "pier".into(),
            signature_public_key: "bob".into(),
            signature_message: "00000001".into(),
            signature: "forged".into(),
        },
        Some(ada_key),
    )
    .await
    .unwrap();

    let report = ada.sync(false).await.unwrap();
    assert_eq!(report.applied, 0);
    assert_eq!(report.failures.len(), 1);
    assert!(ada.snapshot().await.location_signatures.is_empty());

    let outcome = ada.process_tap(&chip_tap("04a1b2c3d4e5f6", 1)).await.unwrap();
    assert!(outcome.recorded);
    let state = ada.snapshot().await;
    let signature = state.location_signature(&LocationId::from("pier")).unwrap();
    assert_eq!(signature.msg, LOCATION_MESSAGE);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_appends_and_syncs_fold_in_turn() {
    let world = TestWorld::new();
    let ada = Arc::new(world.register("ada").await.unwrap());
    let ada_key = ada.snapshot().await.keys.unwrap().encryption_public_key;

    let mut tasks = Vec::new();
    for i in 0..8 {
        let appender = ada.clone();
        tasks.push(tokio::spawn(async move {
            appender
                .append_event(
                    ActivityPayload::LocationTap {
                        location_id: LocationId::from(format!("stop-{i}").as_str()),
                        location_name: format!("Stop {i}"),
                        signature_public_key: "pk".into(),
                        signature_message: format!("{i:08x}"),
                        signature: format!("sig-{i}"),
                    },
                    None,
                )
                .await
                .map(|_| ())
        }));
        let syncer = ada.clone();
        tasks.push(tokio::spawn(async move {
            syncer.sync(false).await.map(|_| ())
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let state = ada.snapshot().await;
    assert_eq!(state.activities.len(), 9);
    assert_eq!(state.location_signatures.len(), 8);
    let delivered = world.relay.mailbox_len(&ada_key).await as u64;
    assert_eq!(delivered, 9);
    assert_eq!(state.cursor, Some(LogCursor(delivered)));
    assert_eq!(ada.sync(false).await.unwrap().fetched, 0);
}

// ─────────────────────────────────────────────────────────────────────────────
// Redemption
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_redeem_has_one_winner() {
    let world = TestWorld::new();
    let code = world.add_code("qr-hat").await;
    let ada = Arc::new(world.register("ada").await.unwrap());
    let bob = Arc::new(world.register("bob").await.unwrap());

    let (a, b) = tokio::join!(
        {
            let ada = ada.clone();
            let code = code.clone();
            async move { ada.redeem(&code, "hat", "Hat").await.unwrap() }
        },
        {
            let bob = bob.clone();
            let code = code.clone();
            async move { bob.redeem(&code, "hat", "Hat").await.unwrap() }
        }
    );
    assert_eq!(u8::from(a.success) + u8::from(b.success), 1);

    let (winner, loser) = if a.success { (&ada, &bob) } else { (&bob, &ada) };
    assert!(winner.snapshot().await.redeemed_items.contains(&code));
    assert!(!loser.snapshot().await.redeemed_items.contains(&code));
    assert!(!(if a.success { b } else { a }).recorded);
}

#[tokio::test]
async fn second_redeem_is_refused_and_not_recorded() {
    let world = TestWorld::new();
    let code = world.add_code("qr-mug").await;
    let ada = world.register("ada").await.unwrap();

    assert!(ada.redeem(&code, "mug", "Mug").await.unwrap().success);
    let before = ada.snapshot().await.activities.len();
    let again = ada.redeem(&code, "mug", "Mug").await.unwrap();
    assert!(!again.success);
    assert_eq!(ada.snapshot().await.activities.len(), before);
}

#[tokio::test]
async fn redeem_survives_undeliverable_record() {
    let world = TestWorld::new();
    let code = world.add_code("qr-pin").await;
    let ada = world.register("ada").await.unwrap();

    world.relay.set_offline(true);
    let outcome = ada.redeem(&code, "pin", "Pin").await.unwrap();
    assert!(outcome.success);
    assert!(!outcome.recorded);
}

#[tokio::test]
async fn redemption_store_outage_is_retryable() {
    let world = TestWorld::new();
    let ada = world.register("ada").await.unwrap();
    world.redemptions.set_offline(true);
    let err = ada.redeem(&"qr-x".into(), "x", "X").await.unwrap_err();
    assert!(err.is_retryable());
}

// ─────────────────────────────────────────────────────────────────────────────
// Profile and backup
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn update_profile_validates_display_name() {
    let world = TestWorld::new();
    let ada = world.register("ada").await.unwrap();

    let err = ada
        .update_profile(ProfileUpdate {
            display_name: Some("x".repeat(21)),
            ..ProfileUpdate::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::InvalidInput(_)));

    let profile = ada
        .update_profile(ProfileUpdate {
            display_name: Some("Ada2".into()),
            allows_analytics: Some(true),
            ..ProfileUpdate::default()
        })
        .await
        .unwrap();
    assert_eq!(profile.display_name, "Ada2");
    assert!(profile.allows_analytics);
}

#[tokio::test]
async fn backup_requires_the_account_password() {
    let world = TestWorld::new();
    let ada = world.register("ada").await.unwrap();

    assert!(matches!(
        ada.create_backup("wrong").await,
        Err(SessionError::Authentication(_))
    ));
    let backup = ada.create_backup("ada-password").await.unwrap();
    assert!(backup.is_encrypted());
    assert_eq!(world.accounts.backup_count("ada@example.com").await, 2);
}

#[tokio::test]
async fn custodial_backup_is_cleartext() {
    let world = TestWorld::new();
    let session = world.device();
    let mut custodial = registration("cy");
    custodial.wants_server_custody = true;
    session.register(custodial).await.unwrap();

    let backup = session.create_backup("cy-password").await.unwrap();
    assert!(!backup.is_encrypted());
}
