use chrono::{Duration, Utc};
use sakhi_portal::{
    guard::{AccessGuard, Decision, LoginReason},
    session::{Identity, MemorySessionStore, Role, SessionState, SessionStore},
};
use std::sync::Arc;
use uuid::Uuid;

fn identity(role: Role) -> Identity {
    Identity {
        user_id: Uuid::new_v4(),
        display_name: format!("{} tester", role.as_str()),
        role,
    }
}

fn setup() -> (Arc<MemorySessionStore>, AccessGuard) {
    let store = Arc::new(MemorySessionStore::new());
    let guard = AccessGuard::new(store.clone() as SessionState);
    (store, guard)
}

#[tokio::test]
async fn expired_admin_session_redirects_to_login_and_is_cleared() {
    let (store, guard) = setup();
    let context = Uuid::new_v4();
    store
        .issue_at(context, identity(Role::Admin), Utc::now() - Duration::hours(25))
        .await
        .unwrap();

    let decision = guard.authorize(Some(context), &Role::ALL).await;

    assert_eq!(decision, Decision::RedirectLogin(LoginReason::SessionExpired));
    assert!(store.current(context).await.is_none());
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn expired_super_admin_session_is_checked_before_role() {
    let (store, guard) = setup();
    let context = Uuid::new_v4();
    store
        .issue_at(context, identity(Role::SuperAdmin), Utc::now() - Duration::days(3))
        .await
        .unwrap();

    // A user-only page would redirect a live admin home; an expired one goes to login.
    let decision = guard.authorize(Some(context), &[Role::User]).await;
    assert_eq!(decision, Decision::RedirectLogin(LoginReason::SessionExpired));
}

#[tokio::test]
async fn admin_window_boundary_is_exclusive() {
    let (store, guard) = setup();
    let issued = Utc::now();
    let context = Uuid::new_v4();
    store
        .issue_at(context, identity(Role::Admin), issued)
        .await
        .unwrap();

    let at_limit = guard
        .authorize_at(Some(context), &Role::ADMIN_CLASS, issued + Duration::hours(24))
        .await;
    assert!(matches!(at_limit, Decision::Allow(_)));

    let past_limit = guard
        .authorize_at(
            Some(context),
            &Role::ADMIN_CLASS,
            issued + Duration::hours(24) + Duration::seconds(1),
        )
        .await;
    assert_eq!(past_limit, Decision::RedirectLogin(LoginReason::SessionExpired));
}

#[tokio::test]
async fn regular_sessions_never_expire() {
    let (store, guard) = setup();
    let context = Uuid::new_v4();
    store
        .issue_at(context, identity(Role::Editor), Utc::now() - Duration::days(90))
        .await
        .unwrap();

    let decision = guard.authorize(Some(context), &[Role::Editor]).await;
    assert!(matches!(decision, Decision::Allow(s) if s.role() == Role::Editor));
}

#[tokio::test]
async fn user_session_is_sent_home_from_admin_pages() {
    let (store, guard) = setup();
    let context = Uuid::new_v4();
    store.issue(context, identity(Role::User)).await.unwrap();

    let admin = guard.authorize(Some(context), &Role::ADMIN_CLASS).await;
    assert_eq!(admin, Decision::RedirectHome);

    let own = guard.authorize(Some(context), &[Role::User]).await;
    assert!(matches!(own, Decision::Allow(s) if s.role() == Role::User));
}

#[tokio::test]
async fn admin_is_sent_to_admin_home_from_user_only_pages() {
    let (store, guard) = setup();
    let context = Uuid::new_v4();
    store.issue(context, identity(Role::Admin)).await.unwrap();

    let decision = guard.authorize(Some(context), &[Role::User]).await;
    assert_eq!(decision, Decision::RedirectAdminHome);
}

#[tokio::test]
async fn super_admin_satisfies_admin_requirements() {
    let (store, guard) = setup();
    let context = Uuid::new_v4();
    store.issue(context, identity(Role::SuperAdmin)).await.unwrap();

    let decision = guard.authorize(Some(context), &[Role::Admin]).await;
    assert!(matches!(decision, Decision::Allow(s) if s.role() == Role::SuperAdmin));
}

#[tokio::test]
async fn missing_or_unknown_context_must_authenticate() {
    let (_store, guard) = setup();

    assert_eq!(
        guard.authorize(None, &Role::ALL).await,
        Decision::RedirectLogin(LoginReason::MustAuthenticate)
    );
    assert_eq!(
        guard.authorize(Some(Uuid::new_v4()), &Role::ALL).await,
        Decision::RedirectLogin(LoginReason::MustAuthenticate)
    );
}

#[tokio::test]
async fn issuing_one_class_clears_the_other_slot() {
    let store = MemorySessionStore::new();
    let context = Uuid::new_v4();

    let user = identity(Role::User);
    store.issue(context, user.clone()).await.unwrap();

    let admin = identity(Role::Admin);
    store.issue(context, admin.clone()).await.unwrap();
    assert_eq!(store.current(context).await.unwrap().identity, admin);

    // Logging back in as a regular user drops the admin identity entirely.
    store.issue(context, user.clone()).await.unwrap();
    assert_eq!(store.current(context).await.unwrap().identity, user);
    assert_eq!(store.len().await, 1);
}

#[tokio::test]
async fn clear_removes_every_identity_of_the_context() {
    let store = MemorySessionStore::new();
    let context = Uuid::new_v4();
    let other = Uuid::new_v4();
    store.issue(context, identity(Role::Admin)).await.unwrap();
    store.issue(other, identity(Role::User)).await.unwrap();

    store.clear(context).await;

    assert!(store.current(context).await.is_none());
    assert!(store.current(other).await.is_some());
}

#[tokio::test]
async fn require_maps_decisions_to_errors() {
    use sakhi_portal::error::{AppError, Redirect};

    let (store, guard) = setup();
    let context = Uuid::new_v4();
    store.issue(context, identity(Role::Editor)).await.unwrap();

    let denied = guard.require(Some(context), &Role::ADMIN_CLASS).await;
    assert!(matches!(
        denied,
        Err(AppError::AuthorizationDenied {
            redirect: Redirect::Home
        })
    ));

    let anonymous = guard.require(None, &Role::ALL).await;
    assert!(matches!(anonymous, Err(AppError::AuthenticationRequired)));
}
