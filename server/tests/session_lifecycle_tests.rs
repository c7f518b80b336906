use chrono::Utc;
use uuid::Uuid;

use clipdeck::password::{hash_password, verify_password};
use clipdeck::tokens::TokenConfig;
use clipdeck::user::User;

fn token_config() -> TokenConfig {
    TokenConfig::new("test-access-secret", "test-refresh-secret", 60, 10)
}

fn registered_user(password: &str) -> User {
    User {
        user_id: Uuid::new_v4(),
        username: "ada".to_string(),
        email: "ada@x.com".to_string(),
        full_name: "Ada L.".to_string(),
        password_hash: hash_password(password).expect("Failed to hash password"),
        avatar_url: "https://media.example/ada/avatar.png".to_string(),
        cover_image_url: None,
        refresh_token: None,
        created_at_utc: Utc::now(),
        updated_at_utc: Utc::now(),
    }
}

#[test]
fn test_login_issues_two_distinct_verifiable_tokens() {
    let config = token_config();
    let mut user = registered_user("secret123");

    // Credential check precedes any token work
    assert!(verify_password("secret123", &user.password_hash).expect("verify failed"));
    assert!(!verify_password("wrong-password", &user.password_hash).expect("verify failed"));

    let pair = config.mint_pair(&user).expect("Failed to mint token pair");
    assert_ne!(pair.access_token, pair.refresh_token);

    // The refresh token handed to the caller is the one persisted
    user.refresh_token = Some(pair.refresh_token.clone());
    assert!(user.refresh_token_matches(&pair.refresh_token));

    let access_claims = config
        .verify_access_token(&pair.access_token)
        .expect("Access token did not verify");
    assert_eq!(access_claims.sub, user.user_id.to_string());
    assert_eq!(access_claims.username, user.username);

    let refresh_claims = config
        .verify_refresh_token(&pair.refresh_token)
        .expect("Refresh token did not verify");
    assert_eq!(refresh_claims.sub, user.user_id.to_string());
}

#[test]
fn test_logout_revokes_the_outstanding_refresh_token() {
    let config = token_config();
    let mut user = registered_user("secret123");

    let pair = config.mint_pair(&user).expect("Failed to mint token pair");
    user.refresh_token = Some(pair.refresh_token.clone());

    // Logout clears the persisted value
    user.refresh_token = None;

    // The old token still verifies cryptographically but no longer matches
    // the record, so a refresh attempt with it must be rejected
    assert!(config.verify_refresh_token(&pair.refresh_token).is_ok());
    assert!(!user.refresh_token_matches(&pair.refresh_token));
}

#[test]
fn test_a_new_login_invalidates_the_previous_session() {
    let config = token_config();
    let mut user = registered_user("secret123");

    let first = config.mint_pair(&user).expect("Failed to mint first pair");
    user.refresh_token = Some(first.refresh_token.clone());

    // Single-session semantics: a later login overwrites the stored token
    std::thread::sleep(std::time::Duration::from_millis(1100));
    let second = config.mint_pair(&user).expect("Failed to mint second pair");
    user.refresh_token = Some(second.refresh_token.clone());

    assert_ne!(first.refresh_token, second.refresh_token);
    assert!(user.refresh_token_matches(&second.refresh_token));
    assert!(!user.refresh_token_matches(&first.refresh_token));
}

#[test]
fn test_sanitized_record_is_safe_for_the_wire() {
    let mut user = registered_user("secret123");
    user.refresh_token = Some("live-session-token".to_string());

    let view = serde_json::to_value(user.sanitized()).expect("Failed to serialize view");
    let text = view.to_string();

    assert!(!text.contains("secret123"));
    assert!(!text.contains(&user.password_hash));
    assert!(!text.contains("live-session-token"));
    assert_eq!(view["userName"], "ada");
    assert_eq!(view["email"], "ada@x.com");
}
