use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts},
    response::{IntoResponse, Response},
};
use cja::{server::cookies::Cookie, server::cookies::CookieJar};
use color_eyre::eyre::eyre;
use time::Duration;
use tracing::{error, info};
use uuid::Uuid;

use crate::errors::ApiError;
use crate::state::AppState;
use crate::tokens::{AccessClaims, TokenPair};
use crate::user::User;

/// Cookie name for the access token
pub const ACCESS_TOKEN_COOKIE: &str = "accessToken";

/// Cookie name for the refresh token
pub const REFRESH_TOKEN_COOKIE: &str = "refreshToken";

/// Extract the current user from the request's access token.
///
/// The token is read from the access-token cookie, falling back to an
/// `Authorization: Bearer` header for non-browser clients.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user: User,
    pub claims: AccessClaims,
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let cookies = match CookieJar::from_request_parts(parts, state).await {
            Ok(cookies) => cookies,
            Err(_) => {
                error!("Failed to extract cookies from request");
                return Err(
                    ApiError::Internal(eyre!("Failed to extract cookies from request"))
                        .into_response(),
                );
            }
        };

        let token = match access_token_from_request(&cookies, parts) {
            Some(token) => token,
            None => {
                info!("No access token on request");
                return Err(
                    ApiError::Unauthorized("Unauthorized request.".to_string()).into_response()
                );
            }
        };

        // Verify the signature and expiry before touching the database
        let claims = match state.tokens.verify_access_token(&token) {
            Ok(claims) => claims,
            Err(err) => {
                info!("Rejected access token: {:?}", err);
                return Err(
                    ApiError::Unauthorized("Invalid access token.".to_string()).into_response()
                );
            }
        };

        let user_id = match claims.sub.parse::<Uuid>() {
            Ok(id) => id,
            Err(_) => {
                error!("Access token carried a malformed subject: {}", claims.sub);
                return Err(
                    ApiError::Unauthorized("Invalid access token.".to_string()).into_response()
                );
            }
        };

        // Get the user behind the token
        let user = match User::get_by_id(&state.db, user_id).await {
            Ok(Some(user)) => user,
            Ok(None) => {
                info!("No user found for access token subject {}", user_id);
                return Err(
                    ApiError::Unauthorized("Invalid access token.".to_string()).into_response()
                );
            }
            Err(err) => {
                error!("Error loading user {}: {:?}", user_id, err);
                return Err(ApiError::Internal(err).into_response());
            }
        };

        Ok(AuthUser { user, claims })
    }
}

/// Pull the access token off the request: cookie first, then bearer header
fn access_token_from_request(cookies: &CookieJar<AppState>, parts: &Parts) -> Option<String> {
    if let Some(cookie) = cookies.get(ACCESS_TOKEN_COOKIE) {
        return Some(cookie.value().to_string());
    }

    parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token.to_string())
}

/// Creates a session cookie holding a token
fn session_cookie(
    name: &'static str,
    value: String,
    max_age: Duration,
    secure: bool,
) -> Cookie<'static> {
    let mut cookie = Cookie::new(name, value);
    cookie.set_path("/");
    cookie.set_http_only(true);
    cookie.set_secure(secure);
    cookie.set_max_age(max_age);
    cookie
}

/// Mint a token pair for the user, persist the refresh token on their
/// record, and hand both tokens to the client as cookies.
///
/// The refresh token is persisted before any cookie is set; if persistence
/// fails the freshly minted pair is discarded and nothing about the session
/// is observable externally.
pub async fn create_session_and_set_cookies(
    state: &AppState,
    cookies: &CookieJar<AppState>,
    user: &mut User,
) -> cja::Result<TokenPair> {
    let pair = state.tokens.mint_pair(user)?;

    user.update_refresh_token(&state.db, Some(&pair.refresh_token))
        .await?;

    cookies.add(session_cookie(
        ACCESS_TOKEN_COOKIE,
        pair.access_token.clone(),
        Duration::minutes(state.tokens.access_expiry_minutes),
        state.secure_cookies(),
    ));
    cookies.add(session_cookie(
        REFRESH_TOKEN_COOKIE,
        pair.refresh_token.clone(),
        Duration::days(state.tokens.refresh_expiry_days),
        state.secure_cookies(),
    ));

    info!("Created new session for user {}", user.user_id);
    Ok(pair)
}

/// Clear the persisted refresh token and both session cookies.
///
/// Once the stored token is cleared, any copy of the old refresh token is
/// useless; the state is indistinguishable from never having logged in.
pub async fn end_session(
    state: &AppState,
    cookies: &CookieJar<AppState>,
    user: &mut User,
) -> cja::Result<()> {
    user.update_refresh_token(&state.db, None).await?;

    clear_session_cookies(state, cookies);

    info!("Session ended for user {}", user.user_id);
    Ok(())
}

/// Remove both session cookies by expiring them immediately
pub fn clear_session_cookies(state: &AppState, cookies: &CookieJar<AppState>) {
    for name in [ACCESS_TOKEN_COOKIE, REFRESH_TOKEN_COOKIE] {
        let mut cookie = Cookie::new(name, "");
        cookie.set_path("/");
        cookie.set_max_age(Duration::seconds(-1));
        cookie.set_http_only(true);
        cookie.set_secure(state.secure_cookies());
        cookies.remove(cookie);
    }
}
