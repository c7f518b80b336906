use std::env;

use sqlx::{postgres::PgPoolOptions, PgPool};

use crate::media::{MediaClient, MediaConfig};
use crate::tokens::TokenConfig;

#[derive(Clone)]
pub struct AppState {
    pub db: sqlx::Pool<sqlx::Postgres>,
    pub cookie_key: cja::server::cookies::CookieKey,
    pub domain: String,
    pub protocol: String,
    pub media: MediaClient,
    pub tokens: TokenConfig,
}

impl AppState {
    pub async fn from_env() -> cja::Result<Self> {
        let pool = setup_db_pool().await?;

        let cookie_key = cja::server::cookies::CookieKey::from_env_or_generate()?;

        let tokens = TokenConfig::from_env()?;
        let media = MediaClient::new(MediaConfig::from_env()?)?;

        Ok(Self {
            db: pool,
            cookie_key,
            domain: env::var("DOMAIN")?,
            protocol: env::var("PROTO").unwrap_or_else(|_| "https".to_string()),
            media,
            tokens,
        })
    }

    /// Whether session cookies should carry the Secure attribute
    pub fn secure_cookies(&self) -> bool {
        self.protocol == "https"
    }

    /// Returns the public base URL this server is reachable at
    #[allow(dead_code)]
    pub fn base_url(&self) -> String {
        format!("{}://{}", self.protocol, self.domain)
    }
}

impl cja::app_state::AppState for AppState {
    fn version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    fn db(&self) -> &sqlx::PgPool {
        &self.db
    }

    fn cookie_key(&self) -> &cja::server::cookies::CookieKey {
        &self.cookie_key
    }
}

#[tracing::instrument(err)]
pub async fn setup_db_pool() -> cja::Result<PgPool> {
    const MIGRATION_LOCK_ID: i64 = 0xDB_DB_DB_DB_DB_DB_DB;

    let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await?;

    sqlx::query("SELECT pg_advisory_lock($1)")
        .bind(MIGRATION_LOCK_ID)
        .execute(&pool)
        .await?;

    sqlx::migrate!("../migrations").run(&pool).await?;

    let unlock_result: Option<bool> = sqlx::query_scalar("SELECT pg_advisory_unlock($1)")
        .bind(MIGRATION_LOCK_ID)
        .fetch_one(&pool)
        .await?;

    match unlock_result {
        Some(b) => {
            if b {
                tracing::info!("Migration lock unlocked");
            } else {
                tracing::info!("Failed to unlock migration lock");
            }
        }
        None => panic!("Failed to unlock migration lock"),
    }

    Ok(pool)
}
