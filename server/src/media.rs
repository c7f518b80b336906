use std::path::Path;

use color_eyre::eyre::{eyre, WrapErr};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

/// Credentials and endpoint for the media-hosting API. Constructed once in
/// `AppState::from_env` and passed around explicitly; there is no ambient
/// global configuration.
#[derive(Clone, Debug)]
pub struct MediaConfig {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
    pub upload_base_url: String,
}

impl MediaConfig {
    pub fn from_env() -> cja::Result<Self> {
        let cloud_name = std::env::var("MEDIA_CLOUD_NAME")
            .map_err(|_| eyre!("MEDIA_CLOUD_NAME environment variable not set"))?;
        let api_key = std::env::var("MEDIA_API_KEY")
            .map_err(|_| eyre!("MEDIA_API_KEY environment variable not set"))?;
        let api_secret = std::env::var("MEDIA_API_SECRET")
            .map_err(|_| eyre!("MEDIA_API_SECRET environment variable not set"))?;
        let upload_base_url = std::env::var("MEDIA_UPLOAD_BASE_URL")
            .unwrap_or_else(|_| "https://api.cloudinary.com/v1_1".to_string());

        Ok(Self {
            cloud_name,
            api_key,
            api_secret,
            upload_base_url,
        })
    }
}

/// Response payload returned by the media host for a completed upload
#[derive(Debug, Clone, Deserialize)]
pub struct UploadedMedia {
    pub url: String,
    #[serde(default)]
    pub secure_url: Option<String>,
    #[serde(default)]
    pub public_id: Option<String>,
}

/// Client for the media-hosting API
#[derive(Clone)]
pub struct MediaClient {
    config: MediaConfig,
    client: reqwest::Client,
}

impl MediaClient {
    pub fn new(config: MediaConfig) -> cja::Result<Self> {
        let client = reqwest::ClientBuilder::new()
            .timeout(std::time::Duration::from_secs(30))
            .use_rustls_tls()
            .build()
            .wrap_err("Failed to build media upload client")?;

        Ok(Self { config, client })
    }

    /// Upload a locally staged file to the media host, returning the hosted
    /// media's metadata. The staged file is removed whether or not the
    /// upload succeeds.
    pub async fn upload(&self, local_path: &Path) -> cja::Result<UploadedMedia> {
        let result = self.upload_inner(local_path).await;
        remove_staged_file(local_path).await;
        result
    }

    async fn upload_inner(&self, local_path: &Path) -> cja::Result<UploadedMedia> {
        let data = tokio::fs::read(local_path).await.wrap_err_with(|| {
            format!("Failed to read staged upload file: {}", local_path.display())
        })?;

        let file_name = local_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload.bin".to_string());
        let mime = mime_guess::from_path(local_path).first_or_octet_stream();

        let timestamp = chrono::Utc::now().timestamp();
        let signature = self.sign_params(timestamp);

        let part = reqwest::multipart::Part::bytes(data)
            .file_name(file_name.clone())
            .mime_str(mime.as_ref())
            .wrap_err("Failed to build multipart file part")?;
        let form = reqwest::multipart::Form::new()
            .text("api_key", self.config.api_key.clone())
            .text("timestamp", timestamp.to_string())
            .text("signature", signature)
            .text("signature_algorithm", "sha256")
            .part("file", part);

        let response = self
            .client
            .post(self.upload_url())
            .multipart(form)
            .send()
            .await
            .wrap_err("Failed to send upload request to media host")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error response".to_string());

            return Err(eyre!(
                "Media host rejected upload of {}: {} - {}",
                file_name,
                status,
                error_text
            ));
        }

        let uploaded: UploadedMedia = response
            .json()
            .await
            .wrap_err("Failed to decode media host response")?;

        info!("Uploaded {} to media host: {}", file_name, uploaded.url);

        Ok(uploaded)
    }

    fn upload_url(&self) -> String {
        format!(
            "{}/{}/auto/upload",
            self.config.upload_base_url.trim_end_matches('/'),
            self.config.cloud_name
        )
    }

    /// SHA-256 signature over the signed params and the API secret, hex
    /// encoded the way the host expects
    fn sign_params(&self, timestamp: i64) -> String {
        let to_sign = format!("timestamp={}{}", timestamp, self.config.api_secret);
        let digest = Sha256::digest(to_sign.as_bytes());

        digest.iter().map(|b| format!("{b:02x}")).collect()
    }
}

/// Remove a staged upload file, logging rather than failing when the file
/// is already gone
pub(crate) async fn remove_staged_file(path: &Path) {
    if let Err(err) = tokio::fs::remove_file(path).await {
        warn!(
            "Failed to remove staged upload file {}: {}",
            path.display(),
            err
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn test_config() -> MediaConfig {
        MediaConfig {
            cloud_name: "demo".to_string(),
            api_key: "key".to_string(),
            api_secret: "shhh".to_string(),
            upload_base_url: "https://api.cloudinary.com/v1_1".to_string(),
        }
    }

    #[test]
    fn test_upload_url_includes_cloud_name() -> cja::Result<()> {
        let client = MediaClient::new(test_config())?;
        assert_eq!(
            client.upload_url(),
            "https://api.cloudinary.com/v1_1/demo/auto/upload"
        );

        let mut config = test_config();
        config.upload_base_url = "http://localhost:9999/v1_1/".to_string();
        let client = MediaClient::new(config)?;
        assert_eq!(
            client.upload_url(),
            "http://localhost:9999/v1_1/demo/auto/upload"
        );

        Ok(())
    }

    #[test]
    fn test_signature_is_deterministic_hex() -> cja::Result<()> {
        let client = MediaClient::new(test_config())?;

        let first = client.sign_params(1_700_000_000);
        let second = client.sign_params(1_700_000_000);

        assert_eq!(first, second);
        assert_eq!(first.len(), 64);
        assert!(first.chars().all(|c| c.is_ascii_hexdigit()));

        // Different timestamp, different signature
        assert_ne!(first, client.sign_params(1_700_000_001));

        Ok(())
    }

    #[tokio::test]
    async fn test_staged_file_is_removed_even_when_upload_fails() -> cja::Result<()> {
        let mut config = test_config();
        // Nothing listens here; the send step fails fast
        config.upload_base_url = "http://127.0.0.1:9/v1_1".to_string();
        let client = MediaClient::new(config)?;

        let dir = tempfile::tempdir()?;
        let path = dir.path().join("avatar.png");
        let mut file = std::fs::File::create(&path)?;
        file.write_all(b"not really a png")?;

        let result = client.upload(&path).await;

        assert!(result.is_err());
        assert!(!path.exists());

        Ok(())
    }
}
