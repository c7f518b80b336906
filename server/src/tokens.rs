use chrono::Utc;
use color_eyre::eyre::{eyre, WrapErr};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::user::User;

/// Default lifetime of an access token, in minutes
pub const DEFAULT_ACCESS_EXPIRY_MINUTES: i64 = 60;

/// Default lifetime of a refresh token, in days
pub const DEFAULT_REFRESH_EXPIRY_DAYS: i64 = 10;

/// Signing configuration for both token kinds.
///
/// Each kind has its own secret so that compromise of one does not
/// compromise the other, and its own expiry policy.
#[derive(Clone)]
pub struct TokenConfig {
    access_secret: String,
    refresh_secret: String,
    pub access_expiry_minutes: i64,
    pub refresh_expiry_days: i64,
}

/// Claims carried by an access token. Includes the profile fields needed
/// for authorization decisions without a database round trip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    pub sub: String,
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub iat: i64,
    pub exp: i64,
}

/// Claims carried by a refresh token. Identity only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshClaims {
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
}

/// A freshly minted access/refresh token pair
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

impl TokenConfig {
    pub fn from_env() -> cja::Result<Self> {
        let access_secret = std::env::var("ACCESS_TOKEN_SECRET")
            .map_err(|_| eyre!("ACCESS_TOKEN_SECRET environment variable not set"))?;
        let refresh_secret = std::env::var("REFRESH_TOKEN_SECRET")
            .map_err(|_| eyre!("REFRESH_TOKEN_SECRET environment variable not set"))?;

        let access_expiry_minutes = match std::env::var("ACCESS_TOKEN_EXPIRY_MINUTES") {
            Ok(raw) => raw
                .parse()
                .wrap_err("Failed to parse ACCESS_TOKEN_EXPIRY_MINUTES")?,
            Err(_) => DEFAULT_ACCESS_EXPIRY_MINUTES,
        };
        let refresh_expiry_days = match std::env::var("REFRESH_TOKEN_EXPIRY_DAYS") {
            Ok(raw) => raw
                .parse()
                .wrap_err("Failed to parse REFRESH_TOKEN_EXPIRY_DAYS")?,
            Err(_) => DEFAULT_REFRESH_EXPIRY_DAYS,
        };

        Ok(Self::new(
            access_secret,
            refresh_secret,
            access_expiry_minutes,
            refresh_expiry_days,
        ))
    }

    pub fn new(
        access_secret: impl Into<String>,
        refresh_secret: impl Into<String>,
        access_expiry_minutes: i64,
        refresh_expiry_days: i64,
    ) -> Self {
        Self {
            access_secret: access_secret.into(),
            refresh_secret: refresh_secret.into(),
            access_expiry_minutes,
            refresh_expiry_days,
        }
    }

    /// Mint a short-lived access token for the user
    pub fn mint_access_token(&self, user: &User) -> cja::Result<String> {
        let now = Utc::now();
        let expires_at = now + chrono::Duration::minutes(self.access_expiry_minutes);

        let claims = AccessClaims {
            sub: user.user_id.to_string(),
            username: user.username.clone(),
            email: user.email.clone(),
            full_name: user.full_name.clone(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };

        jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.access_secret.as_bytes()),
        )
        .wrap_err("Failed to sign access token")
    }

    /// Mint a long-lived refresh token bound to the user id
    pub fn mint_refresh_token(&self, user_id: Uuid) -> cja::Result<String> {
        let now = Utc::now();
        let expires_at = now + chrono::Duration::days(self.refresh_expiry_days);

        let claims = RefreshClaims {
            sub: user_id.to_string(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };

        jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.refresh_secret.as_bytes()),
        )
        .wrap_err("Failed to sign refresh token")
    }

    /// Mint both tokens for the user. Signing failure of either aborts the
    /// whole operation.
    pub fn mint_pair(&self, user: &User) -> cja::Result<TokenPair> {
        let access_token = self.mint_access_token(user)?;
        let refresh_token = self.mint_refresh_token(user.user_id)?;

        Ok(TokenPair {
            access_token,
            refresh_token,
        })
    }

    /// Verify an access token's signature and expiry, returning its claims
    pub fn verify_access_token(&self, token: &str) -> cja::Result<AccessClaims> {
        let data = jsonwebtoken::decode::<AccessClaims>(
            token,
            &DecodingKey::from_secret(self.access_secret.as_bytes()),
            &Validation::new(Algorithm::HS256),
        )
        .wrap_err("Failed to verify access token")?;

        Ok(data.claims)
    }

    /// Verify a refresh token's signature and expiry, returning its claims.
    /// A signature-valid token is still only usable if it matches the value
    /// persisted on the user record.
    pub fn verify_refresh_token(&self, token: &str) -> cja::Result<RefreshClaims> {
        let data = jsonwebtoken::decode::<RefreshClaims>(
            token,
            &DecodingKey::from_secret(self.refresh_secret.as_bytes()),
            &Validation::new(Algorithm::HS256),
        )
        .wrap_err("Failed to verify refresh token")?;

        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> TokenConfig {
        TokenConfig::new("access-secret", "refresh-secret", 60, 10)
    }

    fn test_user() -> User {
        User {
            user_id: Uuid::new_v4(),
            username: "ada".to_string(),
            email: "ada@x.com".to_string(),
            full_name: "Ada L.".to_string(),
            password_hash: "unused".to_string(),
            avatar_url: "https://media.example/avatar.png".to_string(),
            cover_image_url: None,
            refresh_token: None,
            created_at_utc: Utc::now(),
            updated_at_utc: Utc::now(),
        }
    }

    #[test]
    fn test_mint_pair_produces_two_distinct_tokens() -> cja::Result<()> {
        let config = test_config();
        let user = test_user();

        let pair = config.mint_pair(&user)?;

        assert_ne!(pair.access_token, pair.refresh_token);

        Ok(())
    }

    #[test]
    fn test_access_token_round_trip() -> cja::Result<()> {
        let config = test_config();
        let user = test_user();

        let token = config.mint_access_token(&user)?;
        let claims = config.verify_access_token(&token)?;

        assert_eq!(claims.sub, user.user_id.to_string());
        assert_eq!(claims.username, "ada");
        assert_eq!(claims.email, "ada@x.com");
        assert_eq!(claims.full_name, "Ada L.");
        assert!(claims.exp > claims.iat);

        Ok(())
    }

    #[test]
    fn test_refresh_token_round_trip() -> cja::Result<()> {
        let config = test_config();
        let user = test_user();

        let token = config.mint_refresh_token(user.user_id)?;
        let claims = config.verify_refresh_token(&token)?;

        assert_eq!(claims.sub, user.user_id.to_string());

        Ok(())
    }

    #[test]
    fn test_token_kinds_are_not_interchangeable() -> cja::Result<()> {
        // Distinct secrets per kind: a refresh token must never validate as
        // an access token, and vice versa
        let config = test_config();
        let user = test_user();
        let pair = config.mint_pair(&user)?;

        assert!(config.verify_access_token(&pair.refresh_token).is_err());
        assert!(config.verify_refresh_token(&pair.access_token).is_err());

        Ok(())
    }

    #[test]
    fn test_wrong_secret_is_rejected() -> cja::Result<()> {
        let config = test_config();
        let other = TokenConfig::new("different-access", "different-refresh", 60, 10);
        let user = test_user();

        let token = config.mint_access_token(&user)?;
        assert!(other.verify_access_token(&token).is_err());

        Ok(())
    }

    #[test]
    fn test_expired_access_token_is_rejected() -> cja::Result<()> {
        // Mint a token that expired well past the validation leeway
        let config = TokenConfig::new("access-secret", "refresh-secret", -5, 10);
        let user = test_user();

        let token = config.mint_access_token(&user)?;
        assert!(test_config().verify_access_token(&token).is_err());

        Ok(())
    }
}
