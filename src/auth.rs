use std::fs;
use chrono::{DateTime, Utc};
use anyhow::Result;
use std::collections::HashSet;
use tracing;

use rspotify::Token;
use librespot::core::{authentication::Credentials, cache::Cache};

const SPOTIFY_CLIENT_ID: &str = "65b708073fc0480ea92a077233ca87bd";
const SPOTIFY_REDIRECT_URI: &str = "http://127.0.0.1:8989/login";
pub const SCOPES: &str =
    "streaming user-read-private user-read-email user-read-playback-state user-modify-playback-state playlist-read-private playlist-read-collaborative";

const RESPONSE: &str = r#"
<!doctype html>
<html>
<head><title>Success</title></head>
<body><h1>Authentication Successful!</h1><script>window.close();</script></body>
</html>
"#;
const CACHE: &str = ".cache";
const CACHE_FILES: &str = ".cache/files";
const REFRESH_TOKEN_FILE: &str = ".cache/refresh_token";

/// Tokens live for an hour; the OAuth endpoint does not always echo the
/// interval back, so assume the documented one.
const TOKEN_LIFETIME_SECS: i64 = 3600;

/// Everything the facade needs after a completed login: credentials for the
/// playback engine, a token for the Web API, and the on-disk session cache.
#[derive(Clone)]
pub struct AuthResult {
    pub librespot_credentials: Credentials,
    pub rspotify_token: Token,
    pub refresh_token: String,
    pub cache: Cache,
}

/// Builds an `rspotify` token from a bare access token and its remaining
/// lifetime, scoped to this crate's scope set.
pub fn rspotify_token(access_token: String, expires_in: chrono::Duration) -> Token {
    Token {
        access_token,
        expires_in,
        expires_at: Some(Utc::now() + expires_in),
        scopes: SCOPES
            .split_whitespace()
            .map(|s| s.to_string())
            .collect::<HashSet<String>>(),
        refresh_token: None,
    }
}

fn oauth_client() -> Result<librespot_oauth::OAuthClient> {
    Ok(librespot_oauth::OAuthClientBuilder::new(
        SPOTIFY_CLIENT_ID,
        SPOTIFY_REDIRECT_URI,
        SCOPES.split_whitespace().collect(),
    )
    .build()?)
}

async fn perform_browser_auth() -> Result<(Credentials, String, String)> {
    tracing::info!("Starting browser-based OAuth flow");
    let client = librespot_oauth::OAuthClientBuilder::new(
        SPOTIFY_CLIENT_ID,
        SPOTIFY_REDIRECT_URI,
        SCOPES.split_whitespace().collect(),
    )
    .open_in_browser()
    .with_custom_message(RESPONSE)
    .build()?;

    let token = client.get_access_token_async().await?;

    let _ = fs::write(REFRESH_TOKEN_FILE, &token.refresh_token);
    tracing::debug!("Saved refresh token to disk");

    let credentials = Credentials::with_access_token(token.access_token.clone());
    tracing::info!("Browser authentication completed successfully");
    Ok((credentials, token.access_token, token.refresh_token))
}

/// Exchanges a refresh token for a fresh access token.
///
/// Returns the new access token, the refresh token to use from now on, and
/// the new expiry time.
pub async fn refresh_access_token(refresh_token: &str) -> Result<(String, String, DateTime<Utc>)> {
    let client = oauth_client()?;
    let token = client.refresh_token_async(refresh_token).await?;

    let _ = fs::write(REFRESH_TOKEN_FILE, &token.refresh_token);

    let expires_at = Utc::now() + chrono::Duration::seconds(TOKEN_LIFETIME_SECS);
    Ok((token.access_token, token.refresh_token, expires_at))
}

/// Runs the full login flow: reuse cached credentials and a stored refresh
/// token when possible, otherwise fall back to the browser.
pub async fn perform_oauth_flow() -> Result<AuthResult> {
    let cache = Cache::new(Some(CACHE), Some(CACHE), Some(CACHE_FILES), None)?;

    let stored_refresh_token = fs::read_to_string(REFRESH_TOKEN_FILE).ok();

    let (credentials, access_token, refresh_token) =
        if let (Some(creds), Some(stored)) = (cache.credentials(), stored_refresh_token) {
            tracing::info!("Found cached credentials and refresh token");

            match refresh_access_token(&stored).await {
                Ok((access_token, refresh_token, _expires_at)) => {
                    tracing::debug!("Token refreshed successfully");
                    (creds, access_token, refresh_token)
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Cached refresh token failed, re-authenticating");
                    perform_browser_auth().await?
                }
            }
        } else {
            tracing::info!("No cached credentials found, starting browser authentication");
            perform_browser_auth().await?
        };

    Ok(AuthResult {
        librespot_credentials: credentials,
        rspotify_token: rspotify_token(
            access_token,
            chrono::Duration::seconds(TOKEN_LIFETIME_SECS),
        ),
        refresh_token,
        cache,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_carries_scopes_and_expiry() {
        let token = rspotify_token("abc".to_string(), chrono::Duration::seconds(60));
        assert_eq!(token.access_token, "abc");
        assert!(token.scopes.contains("streaming"));
        assert!(token.refresh_token.is_none());
        let expires_at = token.expires_at.unwrap();
        assert!(expires_at > Utc::now());
        assert!(expires_at <= Utc::now() + chrono::Duration::seconds(61));
    }
}
