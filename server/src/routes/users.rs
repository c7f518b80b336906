use std::path::{Path, PathBuf};

use axum::extract::multipart::Field;
use axum::extract::{Multipart, State};
use axum::Json;
use cja::server::cookies::CookieJar;
use color_eyre::eyre::{eyre, WrapErr};
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::{self, AuthUser, REFRESH_TOKEN_COOKIE};
use crate::errors::{ApiError, ApiResult};
use crate::media;
use crate::password;
use crate::responses::ApiResponse;
use crate::state::AppState;
use crate::user::{CreateUserParams, User, UserView};

/// Registration fields collected from the multipart body. File parts are
/// staged to local temp files before being pushed to the media host.
#[derive(Debug, Default)]
struct RegistrationForm {
    user_name: String,
    full_name: String,
    email: String,
    password: String,
    avatar: Option<PathBuf>,
    cover_image: Option<PathBuf>,
}

/// Register a new user account.
///
/// Validates the identity fields, probes username/email uniqueness, uploads
/// the required avatar (and optional cover image) to the media host, then
/// creates the record. The uniqueness probe and the create are two separate
/// store calls; the unique constraints in the store settle concurrent
/// duplicate submissions.
pub async fn register(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResult<ApiResponse<UserView>> {
    let form = collect_registration_form(multipart)
        .await
        .wrap_err("Failed to parse registration form")?;

    if [
        &form.full_name,
        &form.user_name,
        &form.email,
        &form.password,
    ]
    .iter()
    .any(|field| field.trim().is_empty())
    {
        discard_staged(&form).await;
        return Err(ApiError::InvalidRequest(
            "All fields are required.".to_string(),
        ));
    }

    if User::identity_taken(&state.db, &form.user_name, &form.email).await? {
        discard_staged(&form).await;
        return Err(ApiError::Conflict(
            "User with email or username already exists.".to_string(),
        ));
    }

    let Some(avatar_path) = form.avatar.as_ref() else {
        discard_staged(&form).await;
        return Err(ApiError::InvalidRequest(
            "Avatar file is required.".to_string(),
        ));
    };

    // The avatar is mandatory; an upload failure fails the registration
    let avatar = state
        .media
        .upload(avatar_path)
        .await
        .wrap_err("Failed to upload avatar to media host")?;

    // The cover image is optional and best-effort
    let cover_image_url = match form.cover_image.as_ref() {
        Some(path) => match state.media.upload(path).await {
            Ok(uploaded) => Some(uploaded.url),
            Err(err) => {
                warn!("Failed to upload cover image: {:?}", err);
                None
            }
        },
        None => None,
    };

    let password_hash = password::hash_password(&form.password)?;

    let user = User::create(
        &state.db,
        CreateUserParams {
            username: form.user_name.clone(),
            email: form.email.clone(),
            full_name: form.full_name.clone(),
            password_hash,
            avatar_url: avatar.url,
            cover_image_url,
        },
    )
    .await
    .wrap_err("Failed to create user record")?;

    // Re-read the record so the response reflects exactly what is persisted
    let created = User::get_by_id(&state.db, user.user_id)
        .await?
        .ok_or_else(|| eyre!("Something went wrong while registering the user."))?;

    info!("Registered user {} ({})", created.username, created.user_id);

    Ok(ApiResponse::created(
        created.sanitized(),
        "User registered successfully.",
    ))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    #[serde(default)]
    pub user_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

/// Log a user in with a username or email plus password, issuing an
/// access/refresh token pair
pub async fn login(
    State(state): State<AppState>,
    cookies: CookieJar<AppState>,
    Json(body): Json<LoginRequest>,
) -> ApiResult<ApiResponse<serde_json::Value>> {
    let identifier = body
        .user_name
        .as_deref()
        .or(body.email.as_deref())
        .map(str::trim)
        .filter(|s| !s.is_empty());
    let Some(identifier) = identifier else {
        return Err(ApiError::InvalidRequest(
            "Username or email is required.".to_string(),
        ));
    };

    let password = body
        .password
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty());
    let Some(password) = password else {
        return Err(ApiError::InvalidRequest("Password is required.".to_string()));
    };

    let Some(mut user) = User::get_by_identifier(&state.db, identifier).await? else {
        return Err(ApiError::NotFound("User does not exist.".to_string()));
    };

    if !password::verify_password(password, &user.password_hash)? {
        return Err(ApiError::Unauthorized(
            "Invalid user credentials.".to_string(),
        ));
    }

    let pair = auth::create_session_and_set_cookies(&state, &cookies, &mut user)
        .await
        .wrap_err("Failed to establish session")?;

    let data = serde_json::json!({
        "user": user.sanitized(),
        "accessToken": pair.access_token,
        "refreshToken": pair.refresh_token,
    });

    Ok(ApiResponse::ok(data, "User logged in successfully."))
}

/// Log the authenticated user out, revoking their refresh token and
/// clearing both session cookies
pub async fn logout(
    State(state): State<AppState>,
    cookies: CookieJar<AppState>,
    auth_user: AuthUser,
) -> ApiResult<ApiResponse<serde_json::Value>> {
    let mut user = auth_user.user;

    auth::end_session(&state, &cookies, &mut user)
        .await
        .wrap_err("Failed to end user session")?;

    Ok(ApiResponse::ok(serde_json::json!({}), "User logged out."))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// Mint a fresh token pair from a refresh token.
///
/// The presented token must verify under the refresh secret AND match the
/// value currently persisted on the user record; a token invalidated by
/// logout or a later login is rejected even when its signature is valid.
pub async fn refresh_access_token(
    State(state): State<AppState>,
    cookies: CookieJar<AppState>,
    body: Option<Json<RefreshRequest>>,
) -> ApiResult<ApiResponse<serde_json::Value>> {
    let presented = cookies
        .get(REFRESH_TOKEN_COOKIE)
        .map(|cookie| cookie.value().to_string())
        .or_else(|| body.and_then(|Json(body)| body.refresh_token));
    let Some(presented) = presented else {
        return Err(ApiError::Unauthorized("Unauthorized request.".to_string()));
    };

    let claims = match state.tokens.verify_refresh_token(&presented) {
        Ok(claims) => claims,
        Err(err) => {
            info!("Rejected refresh token: {:?}", err);
            return Err(ApiError::Unauthorized(
                "Invalid refresh token.".to_string(),
            ));
        }
    };

    let user_id = claims
        .sub
        .parse::<Uuid>()
        .map_err(|_| ApiError::Unauthorized("Invalid refresh token.".to_string()))?;

    let Some(mut user) = User::get_by_id(&state.db, user_id).await? else {
        return Err(ApiError::Unauthorized(
            "Invalid refresh token.".to_string(),
        ));
    };

    if !user.refresh_token_matches(&presented) {
        return Err(ApiError::Unauthorized(
            "Refresh token is expired or has been revoked.".to_string(),
        ));
    }

    let pair = auth::create_session_and_set_cookies(&state, &cookies, &mut user)
        .await
        .wrap_err("Failed to rotate session")?;

    let data = serde_json::json!({
        "accessToken": pair.access_token,
        "refreshToken": pair.refresh_token,
    });

    Ok(ApiResponse::ok(data, "Access token refreshed."))
}

/// Return the authenticated user's profile
pub async fn current_user(auth_user: AuthUser) -> ApiResponse<UserView> {
    ApiResponse::ok(
        auth_user.user.sanitized(),
        "Current user fetched successfully.",
    )
}

/// Drain the multipart body into text fields and staged upload files
async fn collect_registration_form(mut multipart: Multipart) -> cja::Result<RegistrationForm> {
    let mut form = RegistrationForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .wrap_err("Failed to read multipart field")?
    {
        let Some(name) = field.name().map(|n| n.to_string()) else {
            continue;
        };

        match name.as_str() {
            "userName" => {
                form.user_name = field.text().await.wrap_err("Failed to read userName")?;
            }
            "fullName" => {
                form.full_name = field.text().await.wrap_err("Failed to read fullName")?;
            }
            "email" => {
                form.email = field.text().await.wrap_err("Failed to read email")?;
            }
            "password" => {
                form.password = field.text().await.wrap_err("Failed to read password")?;
            }
            "avatar" => {
                form.avatar = stage_upload(field).await?;
            }
            "coverImage" => {
                form.cover_image = stage_upload(field).await?;
            }
            _ => {}
        }
    }

    Ok(form)
}

/// Spool an uploaded file part to a local temp file. An empty part (no file
/// selected on the form) stages nothing.
async fn stage_upload(field: Field<'_>) -> cja::Result<Option<PathBuf>> {
    let original_name = field
        .file_name()
        .map(|n| n.to_string())
        .unwrap_or_else(|| "upload.bin".to_string());

    // Keep the extension so the media host can recognize the content
    let extension = Path::new(&original_name)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("bin")
        .to_string();

    let data = field.bytes().await.wrap_err("Failed to read uploaded file")?;
    if data.is_empty() {
        return Ok(None);
    }

    let path = std::env::temp_dir().join(format!("clipdeck-{}.{}", Uuid::new_v4(), extension));
    tokio::fs::write(&path, &data)
        .await
        .wrap_err_with(|| format!("Failed to stage upload at {}", path.display()))?;

    Ok(Some(path))
}

/// Remove any staged upload files after a registration that will not use
/// them
async fn discard_staged(form: &RegistrationForm) {
    for path in [form.avatar.as_ref(), form.cover_image.as_ref()]
        .into_iter()
        .flatten()
    {
        media::remove_staged_file(path).await;
    }
}
