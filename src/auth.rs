//! OAuth2 installed-flow authentication for the Gmail API

use google_gmail1::{hyper_rustls, hyper_util, yup_oauth2, Gmail};
use std::env;
use std::path::Path;
use yup_oauth2::ApplicationSecret;

use crate::error::{LabelerError, Result};

/// Scopes needed to read messages, change their labels and create labels
pub const REQUIRED_SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/gmail.modify",
    "https://www.googleapis.com/auth/gmail.labels",
];

pub type GmailHub =
    Gmail<hyper_rustls::HttpsConnector<hyper_util::client::legacy::connect::HttpConnector>>;

/// Build an authenticated Gmail hub
///
/// Credentials come from `credentials_path` when that file exists, otherwise
/// from `GMAIL_CLIENT_ID` / `GMAIL_CLIENT_SECRET`. The first run opens a
/// browser for consent; tokens are cached at `token_cache_path` and refreshed
/// from there afterwards.
pub async fn initialize_gmail_hub(credentials_path: &Path, token_cache_path: &Path) -> Result<GmailHub> {
    let secret = if credentials_path.exists() {
        yup_oauth2::read_application_secret(credentials_path)
            .await
            .map_err(|e| LabelerError::AuthRequired(format!("Failed to read credentials: {}", e)))?
    } else {
        tracing::debug!(
            "No credentials file at {:?}, reading client secret from environment",
            credentials_path
        );
        load_credentials_from_env()?
    };

    let auth = yup_oauth2::InstalledFlowAuthenticator::builder(
        secret,
        yup_oauth2::InstalledFlowReturnMethod::HTTPRedirect,
    )
    .persist_tokens_to_disk(token_cache_path)
    .build()
    .await
    .map_err(|e| LabelerError::AuthRequired(format!("Failed to build authenticator: {}", e)))?;

    // Request every scope up front so the cached token covers all calls
    auth.token(REQUIRED_SCOPES)
        .await
        .map_err(|e| LabelerError::AuthRequired(format!("Failed to obtain token: {}", e)))?;

    if token_cache_path.exists() {
        secure_token_file(token_cache_path).await?;
    }

    let client = hyper_util::client::legacy::Client::builder(hyper_util::rt::TokioExecutor::new())
        .build(
            hyper_rustls::HttpsConnectorBuilder::new()
                .with_native_roots()
                .map_err(|e| LabelerError::NetworkError(format!("Failed to load TLS roots: {}", e)))?
                .https_or_http()
                .enable_http1()
                .build(),
        );

    Ok(Gmail::new(client, auth))
}

/// Client secret from `GMAIL_CLIENT_ID`, `GMAIL_CLIENT_SECRET` and the
/// optional `GMAIL_REDIRECT_URI` (default `http://localhost:8080`)
pub fn load_credentials_from_env() -> Result<ApplicationSecret> {
    let client_id = env::var("GMAIL_CLIENT_ID").map_err(|_| {
        LabelerError::ConfigError(
            "No credentials file found and GMAIL_CLIENT_ID is not set".to_string(),
        )
    })?;
    let client_secret = env::var("GMAIL_CLIENT_SECRET")
        .map_err(|_| LabelerError::ConfigError("GMAIL_CLIENT_SECRET not set".to_string()))?;
    let redirect_uri =
        env::var("GMAIL_REDIRECT_URI").unwrap_or_else(|_| "http://localhost:8080".to_string());

    Ok(ApplicationSecret {
        client_id,
        client_secret,
        auth_uri: "https://accounts.google.com/o/oauth2/auth".to_string(),
        token_uri: "https://oauth2.googleapis.com/token".to_string(),
        redirect_uris: vec![redirect_uri],
        ..Default::default()
    })
}

/// Restrict the token cache to its owner (0600)
#[cfg(unix)]
pub async fn secure_token_file(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut perms = tokio::fs::metadata(path).await?.permissions();
    perms.set_mode(0o600);
    tokio::fs::set_permissions(path, perms).await?;
    Ok(())
}

#[cfg(windows)]
pub async fn secure_token_file(_path: &Path) -> Result<()> {
    Ok(())
}
