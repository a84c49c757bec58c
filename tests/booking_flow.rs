use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal_macros::dec;
use tokio_test::{assert_err, assert_ok};

use courtbook::auth::{CredentialVerifier, SessionManager, TokenService};
use courtbook::engine::{Engine, now_ms};
use courtbook::error::ErrorKind;
use courtbook::model::*;
use courtbook::service::BookingService;

const H: Ms = 3_600_000;
const RENTER: &str = "+420777000111";
const NEIGHBOUR: &str = "+420777000222";
const ADMIN: &str = "+420600000000";

// ── Test infrastructure ──────────────────────────────────────

/// Stored hashes are `plain:<password>`.
struct PrefixVerifier;

#[async_trait]
impl CredentialVerifier for PrefixVerifier {
    async fn verify(&self, password: &str, password_hash: &str) -> bool {
        password_hash.strip_prefix("plain:") == Some(password)
    }
}

fn wal_path(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join("courtbook_int_test");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    let _ = std::fs::remove_file(&path);
    path
}

fn user(phone: &str, password: &str, roles: &[Role]) -> User {
    User {
        id: UNSET_ID,
        phone_number: phone.into(),
        name: phone.into(),
        password_hash: format!("plain:{password}"),
        roles: roles.iter().copied().collect::<BTreeSet<_>>(),
        created_at: 0,
        deleted_at: None,
    }
}

struct Club {
    service: BookingService,
    court: Id,
}

async fn open_club(name: &str) -> Club {
    let engine = Arc::new(Engine::new(wal_path(name)).unwrap());
    let surface = engine
        .create_surface(SurfaceType {
            id: UNSET_ID,
            name: "hard".into(),
            cost_per_minute: dec!(3.50),
            created_at: 0,
            deleted_at: None,
        })
        .await
        .unwrap();
    let court = engine
        .create_court(Court {
            id: UNSET_ID,
            description: Some("Centre court".into()),
            surface_id: surface.id,
            created_at: 0,
            deleted_at: None,
        })
        .await
        .unwrap();
    engine.create_user(user(RENTER, "ace", &[Role::User])).await.unwrap();
    engine.create_user(user(NEIGHBOUR, "let", &[Role::User])).await.unwrap();
    engine.create_user(user(ADMIN, "umpire", &[Role::Admin])).await.unwrap();

    let tokens = TokenService::new(
        b"integration-test-secret-0123456789",
        Duration::from_secs(300),
        Duration::from_secs(3600),
    );
    let sessions = SessionManager::new(tokens, engine.clone(), Arc::new(PrefixVerifier));
    Club {
        service: BookingService::new(engine, sessions),
        court: court.id,
    }
}

async fn bearer(club: &Club, phone: &str, password: &str) -> String {
    let pair = assert_ok!(club.service.login(phone, password).await);
    format!("Bearer {}", pair.access_token)
}

// ── Flows ────────────────────────────────────────────────────

#[tokio::test]
async fn renter_books_and_lists_own_bookings() {
    let club = open_club("renter_flow.wal").await;
    let auth = bearer(&club, RENTER, "ace").await;
    let start = now_ms() + 24 * H;

    let cost = assert_ok!(
        club.service
            .create_booking(Some(&auth), BookingDraft::new(start, start + H, false), club.court, RENTER)
            .await
    );
    assert_eq!(cost, dec!(210.00));

    let mine = assert_ok!(club.service.bookings_by_phone(Some(&auth), RENTER, true).await);
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0].starts_at, start);

    let all = assert_ok!(club.service.list_bookings(Some(&auth)).await);
    assert_eq!(all, mine);
    let found = assert_ok!(club.service.find_booking(Some(&auth), mine[0].id).await);
    assert_eq!(found, mine[0]);
}

#[tokio::test]
async fn overlapping_booking_is_an_invalid_request() {
    let club = open_club("overlap_flow.wal").await;
    let renter = bearer(&club, RENTER, "ace").await;
    let neighbour = bearer(&club, NEIGHBOUR, "let").await;
    let start = now_ms() + 24 * H;

    assert_ok!(
        club.service
            .create_booking(Some(&renter), BookingDraft::new(start, start + H, false), club.court, RENTER)
            .await
    );
    let err = assert_err!(
        club.service
            .create_booking(
                Some(&neighbour),
                BookingDraft::new(start + H / 2, start + 2 * H, true),
                club.court,
                NEIGHBOUR,
            )
            .await
    );
    assert_eq!(err.kind(), ErrorKind::InvalidRequest);

    assert_ok!(
        club.service
            .create_booking(
                Some(&neighbour),
                BookingDraft::new(start + H, start + 2 * H, true),
                club.court,
                NEIGHBOUR,
            )
            .await
    );
}

#[tokio::test]
async fn renter_cannot_act_for_someone_else() {
    let club = open_club("impersonation_flow.wal").await;
    let auth = bearer(&club, RENTER, "ace").await;
    let start = now_ms() + 24 * H;

    let err = assert_err!(
        club.service
            .create_booking(Some(&auth), BookingDraft::new(start, start + H, false), club.court, NEIGHBOUR)
            .await
    );
    assert_eq!(err.kind(), ErrorKind::Forbidden);

    let err = assert_err!(club.service.bookings_by_phone(Some(&auth), NEIGHBOUR, false).await);
    assert_eq!(err.kind(), ErrorKind::Forbidden);
}

#[tokio::test]
async fn only_admin_modifies_bookings() {
    let club = open_club("admin_flow.wal").await;
    let renter = bearer(&club, RENTER, "ace").await;
    let admin = bearer(&club, ADMIN, "umpire").await;
    let start = now_ms() + 24 * H;

    assert_ok!(
        club.service
            .create_booking(Some(&renter), BookingDraft::new(start, start + H, false), club.court, RENTER)
            .await
    );
    let id = assert_ok!(club.service.list_bookings(Some(&admin)).await)[0].id;

    let discount = BookingPatch {
        cost: Some(dec!(150.00)),
        ..Default::default()
    };
    let err = assert_err!(club.service.update_booking(Some(&renter), id, discount.clone()).await);
    assert_eq!(err.kind(), ErrorKind::Forbidden);
    let err = assert_err!(club.service.delete_booking(Some(&renter), id).await);
    assert_eq!(err.kind(), ErrorKind::Forbidden);

    let updated = assert_ok!(club.service.update_booking(Some(&admin), id, discount).await);
    assert_eq!(updated.cost, dec!(150.00));

    let err = assert_err!(club.service.update_booking(Some(&admin), id, BookingPatch::default()).await);
    assert_eq!(err.kind(), ErrorKind::InvalidRequest);

    assert_ok!(club.service.delete_booking(Some(&admin), id).await);
    let err = assert_err!(club.service.delete_booking(Some(&admin), id).await);
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn admin_without_renter_role_cannot_reserve() {
    let club = open_club("admin_reserve_flow.wal").await;
    let admin = bearer(&club, ADMIN, "umpire").await;
    let start = now_ms() + 24 * H;

    let err = assert_err!(
        club.service
            .create_booking(Some(&admin), BookingDraft::new(start, start + H, false), club.court, ADMIN)
            .await
    );
    assert_eq!(err.kind(), ErrorKind::InvalidRequest);

    // booking on a renter's behalf is allowed
    assert_ok!(
        club.service
            .create_booking(Some(&admin), BookingDraft::new(start, start + H, false), club.court, RENTER)
            .await
    );
}

#[tokio::test]
async fn authentication_failures_are_distinct_from_denials() {
    let club = open_club("authn_flow.wal").await;

    let err = assert_err!(club.service.list_bookings(None).await);
    assert_eq!(err.kind(), ErrorKind::Unauthenticated);

    let err = assert_err!(club.service.list_bookings(Some("Bearer garbage")).await);
    assert_eq!(err.kind(), ErrorKind::Unauthenticated);

    let err = assert_err!(club.service.login(RENTER, "wrong").await);
    assert_eq!(err.kind(), ErrorKind::Unauthenticated);

    let pair = assert_ok!(club.service.login(RENTER, "ace").await);
    let err = assert_err!(
        club.service
            .list_bookings(Some(&format!("Bearer {}", pair.refresh_token)))
            .await
    );
    assert_eq!(err.kind(), ErrorKind::Unauthenticated);

    let access = assert_ok!(club.service.refresh(&pair.refresh_token));
    assert_ok!(club.service.list_bookings(Some(&format!("Bearer {access}"))).await);
}

#[tokio::test]
async fn deleting_a_court_cancels_its_bookings() {
    let club = open_club("court_cascade_flow.wal").await;
    let renter = bearer(&club, RENTER, "ace").await;
    let neighbour = bearer(&club, NEIGHBOUR, "let").await;
    let admin = bearer(&club, ADMIN, "umpire").await;
    let start = now_ms() + 24 * H;

    assert_ok!(
        club.service
            .create_booking(Some(&renter), BookingDraft::new(start, start + H, false), club.court, RENTER)
            .await
    );
    assert_ok!(
        club.service
            .create_booking(
                Some(&neighbour),
                BookingDraft::new(start + H, start + 2 * H, false),
                club.court,
                NEIGHBOUR,
            )
            .await
    );
    assert_eq!(assert_ok!(club.service.bookings_by_court(Some(&admin), club.court).await).len(), 2);

    let err = assert_err!(club.service.delete_court(Some(&renter), club.court).await);
    assert_eq!(err.kind(), ErrorKind::Forbidden);

    let court = assert_ok!(club.service.delete_court(Some(&admin), club.court).await);
    assert!(court.deleted_at.is_some());
    assert!(assert_ok!(club.service.bookings_by_court(Some(&admin), club.court).await).is_empty());
    assert!(assert_ok!(club.service.list_bookings(Some(&admin)).await).is_empty());
}

#[tokio::test]
async fn deleting_a_user_ends_their_session_and_bookings() {
    let club = open_club("user_cascade_flow.wal").await;
    let renter = bearer(&club, RENTER, "ace").await;
    let admin = bearer(&club, ADMIN, "umpire").await;
    let start = now_ms() + 24 * H;

    assert_ok!(
        club.service
            .create_booking(Some(&renter), BookingDraft::new(start, start + H, false), club.court, RENTER)
            .await
    );
    let user_id = club.service.engine().find_user_by_phone(RENTER).unwrap().id;
    assert_ok!(club.service.delete_user(Some(&admin), user_id).await);

    let err = assert_err!(club.service.list_bookings(Some(&renter)).await);
    assert_eq!(err.kind(), ErrorKind::Unauthenticated);
    assert!(assert_ok!(club.service.bookings_by_phone(Some(&admin), RENTER, false).await).is_empty());
    assert!(assert_ok!(club.service.list_bookings(Some(&admin)).await).is_empty());
}
