use chrono::{DateTime, Utc};
use color_eyre::eyre::eyre;
use serde::Serialize;
use sqlx::postgres::PgPool;
use tracing::{error, info};
use uuid::Uuid;

/// Represents a user account in the system
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
    /// Unique user ID
    pub user_id: Uuid,
    /// Unique username, stored lowercased
    pub username: String,
    /// Unique email address
    pub email: String,
    /// Display name
    pub full_name: String,
    /// Salted one-way hash of the password
    pub password_hash: String,
    /// URL of the uploaded avatar (required for every account)
    pub avatar_url: String,
    /// URL of the uploaded cover image, if any
    pub cover_image_url: Option<String>,
    /// Currently active refresh token; None when logged out
    pub refresh_token: Option<String>,
    /// When the user was created
    pub created_at_utc: DateTime<Utc>,
    /// When the user was last updated
    pub updated_at_utc: DateTime<Utc>,
}

/// Wire-safe projection of a user. Never carries the password hash or the
/// refresh token.
#[derive(Debug, Clone, Serialize)]
pub struct UserView {
    #[serde(rename = "id")]
    pub user_id: Uuid,
    #[serde(rename = "userName")]
    pub username: String,
    pub email: String,
    #[serde(rename = "fullName")]
    pub full_name: String,
    pub avatar: String,
    #[serde(rename = "coverImage")]
    pub cover_image: Option<String>,
    #[serde(rename = "createdAt")]
    pub created_at_utc: DateTime<Utc>,
}

/// Fields required to create a new user record
#[derive(Debug, Clone)]
pub struct CreateUserParams {
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub password_hash: String,
    pub avatar_url: String,
    pub cover_image_url: Option<String>,
}

impl User {
    /// Get a user by their ID
    pub async fn get_by_id(pool: &PgPool, user_id: Uuid) -> cja::Result<Option<User>> {
        let row = sqlx::query_as::<_, User>(
            r#"
            SELECT * FROM users WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(pool)
        .await?;

        Ok(row)
    }

    /// Look up a user by username or email. Usernames are stored lowercased,
    /// so the username comparison folds case; emails match as given.
    pub async fn get_by_identifier(pool: &PgPool, identifier: &str) -> cja::Result<Option<User>> {
        let needle = identifier.trim();

        let row = sqlx::query_as::<_, User>(
            r#"
            SELECT * FROM users
            WHERE username = $1 OR email = $2
            LIMIT 1
            "#,
        )
        .bind(needle.to_lowercase())
        .bind(needle)
        .fetch_optional(pool)
        .await?;

        Ok(row)
    }

    /// Check whether a username or email is already claimed
    pub async fn identity_taken(pool: &PgPool, username: &str, email: &str) -> cja::Result<bool> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM users
            WHERE username = $1 OR email = $2
            "#,
        )
        .bind(username.trim().to_lowercase())
        .bind(email.trim())
        .fetch_one(pool)
        .await?;

        Ok(count > 0)
    }

    /// Create a new user record. The username is lowercased on the way in;
    /// the store's unique constraints are the last line of defense against a
    /// concurrent duplicate registration.
    pub async fn create(pool: &PgPool, params: CreateUserParams) -> cja::Result<User> {
        let row = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (username, email, full_name, password_hash, avatar_url, cover_image_url)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(params.username.trim().to_lowercase())
        .bind(params.email.trim())
        .bind(params.full_name.trim())
        .bind(params.password_hash)
        .bind(params.avatar_url)
        .bind(params.cover_image_url)
        .fetch_one(pool)
        .await?;

        info!("Created new user with ID: {}", row.user_id);

        Ok(row)
    }

    /// Set or clear the persisted refresh token. Only this one field
    /// changes; the rest of the record is left untouched.
    pub async fn update_refresh_token(
        &mut self,
        pool: &PgPool,
        token: Option<&str>,
    ) -> cja::Result<()> {
        let row = sqlx::query_as::<_, User>(
            r#"
            UPDATE users SET refresh_token = $1, updated_at_utc = NOW()
            WHERE user_id = $2
            RETURNING *
            "#,
        )
        .bind(token)
        .bind(self.user_id)
        .fetch_one(pool)
        .await
        .map_err(|e| {
            error!(
                "Failed to update refresh token for user {}: {:?}",
                self.user_id, e
            );
            eyre!("Database error updating refresh token: {}", e)
        })?;

        self.refresh_token = row.refresh_token;
        self.updated_at_utc = row.updated_at_utc;

        Ok(())
    }

    /// Whether a presented refresh token matches the one currently persisted
    /// on this record. A cleared field matches nothing, which is what makes
    /// logout a real revocation.
    pub fn refresh_token_matches(&self, presented: &str) -> bool {
        self.refresh_token.as_deref() == Some(presented)
    }

    /// Project this record into its wire-safe form
    pub fn sanitized(&self) -> UserView {
        UserView {
            user_id: self.user_id,
            username: self.username.clone(),
            email: self.email.clone(),
            full_name: self.full_name.clone(),
            avatar: self.avatar_url.clone(),
            cover_image: self.cover_image_url.clone(),
            created_at_utc: self.created_at_utc,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_user() -> User {
        User {
            user_id: Uuid::new_v4(),
            username: "ada".to_string(),
            email: "ada@x.com".to_string(),
            full_name: "Ada L.".to_string(),
            password_hash: "$argon2id$stub".to_string(),
            avatar_url: "https://media.example/avatar.png".to_string(),
            cover_image_url: Some("https://media.example/cover.png".to_string()),
            refresh_token: Some("active-token".to_string()),
            created_at_utc: Utc::now(),
            updated_at_utc: Utc::now(),
        }
    }

    #[test]
    fn test_sanitized_view_never_leaks_credentials() {
        let user = test_user();
        let value =
            serde_json::to_value(user.sanitized()).expect("Failed to serialize user view");

        let object = value.as_object().expect("User view is not a JSON object");
        assert!(!object.contains_key("password"));
        assert!(!object.contains_key("passwordHash"));
        assert!(!object.contains_key("refreshToken"));

        assert_eq!(value["userName"], "ada");
        assert_eq!(value["fullName"], "Ada L.");
        assert_eq!(value["avatar"], "https://media.example/avatar.png");
        assert_eq!(value["coverImage"], "https://media.example/cover.png");
    }

    #[test]
    fn test_refresh_token_matching() {
        let mut user = test_user();

        assert!(user.refresh_token_matches("active-token"));
        assert!(!user.refresh_token_matches("some-older-token"));

        // A logged-out record matches nothing
        user.refresh_token = None;
        assert!(!user.refresh_token_matches("active-token"));
        assert!(!user.refresh_token_matches(""));
    }
}
