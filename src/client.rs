//! Web API client wrapper with all pass-through API methods

use std::sync::Arc;
use anyhow::Result;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use rspotify::{
    http::Query,
    model::{
        FullArtist, FullTrack, Market, Page, PrivateUser, SearchResult, SearchType,
        SimplifiedAlbum, SimplifiedPlaylist, TrackId, UserId, PlayableId,
    },
    prelude::*,
    AuthCodeSpotify,
};

use crate::options::FetchOptions;
use crate::{log_api_request, log_api_result};

/// Refresh when less than this many seconds of token validity remain.
const REFRESH_MARGIN_SECS: i64 = 300;

/// A Connect playback target known to the account.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub id: String,
    pub name: String,
    pub is_active: bool,
}

/// Thin wrapper over the Web API SDK: holds the session token and relays
/// each request's result or error unmodified.
#[derive(Clone)]
pub struct WebApiClient {
    client: Arc<AuthCodeSpotify>,
    local_device_name: Option<String>,
    refresh_token: Arc<RwLock<Option<String>>>,
    token_expires_at: Arc<RwLock<Option<DateTime<Utc>>>>,
}

fn expiring_soon(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    (expires_at - now).num_seconds() < REFRESH_MARGIN_SECS
}

impl WebApiClient {
    pub fn new(client: AuthCodeSpotify, local_device_name: Option<String>) -> Self {
        Self {
            client: Arc::new(client),
            local_device_name,
            refresh_token: Arc::new(RwLock::new(None)),
            token_expires_at: Arc::new(RwLock::new(None)),
        }
    }

    // --- Session ---

    /// Install a token obtained elsewhere (e.g. by a host application that
    /// ran its own OAuth flow) into the session.
    pub async fn login_with_tokens(
        &self,
        access_token: &str,
        refresh_token: &str,
        expires_in: chrono::Duration,
    ) -> Result<()> {
        if access_token.is_empty() {
            return Err(anyhow::anyhow!("Access token is empty"));
        }

        let token = crate::auth::rspotify_token(access_token.to_string(), expires_in);
        let expires_at = token.expires_at;

        *self.client.token.lock().await.unwrap() = Some(token);
        *self.refresh_token.write().await = if refresh_token.is_empty() {
            None
        } else {
            Some(refresh_token.to_string())
        };
        *self.token_expires_at.write().await = expires_at;

        tracing::info!("Session token installed");
        Ok(())
    }

    /// Drop the session token; subsequent Web API calls will fail with the
    /// SDK's authorization error.
    pub async fn logout(&self) {
        *self.client.token.lock().await.unwrap() = None;
        *self.refresh_token.write().await = None;
        *self.token_expires_at.write().await = None;
        tracing::info!("Session token cleared");
    }

    pub async fn is_logged_in(&self) -> bool {
        let token = self.client.token.lock().await.unwrap();
        match token.as_ref() {
            Some(t) => !t.is_expired(),
            None => false,
        }
    }

    pub async fn token_needs_refresh(&self) -> bool {
        let expires_at = self.token_expires_at.read().await;
        if let Some(exp) = *expires_at {
            expiring_soon(exp, Utc::now())
        } else {
            false
        }
    }

    /// Refresh the access token when it is close to expiring. Returns
    /// whether a refresh happened.
    pub async fn refresh_token_if_needed(&self) -> Result<bool> {
        if !self.token_needs_refresh().await {
            return Ok(false);
        }

        let refresh_token = match self.refresh_token.read().await.clone() {
            Some(rt) => rt,
            None => return Err(anyhow::anyhow!("No refresh token available")),
        };

        tracing::info!("Token expiring soon, refreshing...");

        match crate::auth::refresh_access_token(&refresh_token).await {
            Ok((new_access_token, new_refresh_token, new_expires_at)) => {
                let new_token = crate::auth::rspotify_token(
                    new_access_token,
                    new_expires_at - Utc::now(),
                );

                *self.client.token.lock().await.unwrap() = Some(new_token);
                *self.refresh_token.write().await = Some(new_refresh_token);
                *self.token_expires_at.write().await = Some(new_expires_at);

                tracing::info!("Token refreshed successfully");
                Ok(true)
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to refresh token");
                Err(e)
            }
        }
    }

    // --- Web API pass-throughs ---

    /// The logged-in user's private profile.
    pub async fn user_profile(&self) -> Result<PrivateUser> {
        log_api_request!("user_profile");
        let result = self.client.me().await.map_err(anyhow::Error::from);
        log_api_result!("user_profile", result);
        result
    }

    /// A user's public playlists. Recognized options: `limit`, `offset`.
    pub async fn user_playlists(
        &self,
        username: &str,
        options: &FetchOptions,
    ) -> Result<Page<SimplifiedPlaylist>> {
        if username.is_empty() {
            return Err(anyhow::anyhow!("Username is empty"));
        }
        log_api_request!("user_playlists", username);
        let result = self
            .client
            .user_playlists_manual(UserId::from_id(username)?, options.limit, options.offset)
            .await
            .map_err(anyhow::Error::from);
        log_api_result!("user_playlists", result);
        result
    }

    /// The browse category list. Recognized options: `locale`, `country`,
    /// `limit`, `offset`. The paginated `categories` envelope is relayed as
    /// the provider returns it.
    pub async fn categories(&self, options: &FetchOptions) -> Result<serde_json::Value> {
        log_api_request!("categories");
        let result = self
            .browse_get(
                "browse/categories".to_string(),
                options,
                &["locale", "country", "limit", "offset"],
            )
            .await;
        log_api_result!("categories", result);
        result
    }

    /// A single browse category. Recognized options: `locale`, `country`.
    pub async fn category(
        &self,
        category_id: &str,
        options: &FetchOptions,
    ) -> Result<serde_json::Value> {
        if category_id.is_empty() {
            return Err(anyhow::anyhow!("Category ID is empty"));
        }
        log_api_request!("category", category_id);
        let result = self
            .browse_get(
                format!("browse/categories/{category_id}"),
                options,
                &["locale", "country"],
            )
            .await;
        log_api_result!("category", result);
        result
    }

    /// Playlists belonging to a browse category. Recognized options:
    /// `country`, `limit`, `offset`.
    pub async fn category_playlists(
        &self,
        category_id: &str,
        options: &FetchOptions,
    ) -> Result<serde_json::Value> {
        if category_id.is_empty() {
            return Err(anyhow::anyhow!("Category ID is empty"));
        }
        log_api_request!("category_playlists", category_id);
        let result = self
            .browse_get(
                format!("browse/categories/{category_id}/playlists"),
                options,
                &["country", "limit", "offset"],
            )
            .await;
        log_api_result!("category_playlists", result);
        result
    }

    /// Newly released albums. Recognized options: `country`, `limit`,
    /// `offset`.
    pub async fn new_releases(&self, options: &FetchOptions) -> Result<serde_json::Value> {
        log_api_request!("new_releases");
        let result = self
            .browse_get(
                "browse/new-releases".to_string(),
                options,
                &["country", "limit", "offset"],
            )
            .await;
        log_api_result!("new_releases", result);
        result
    }

    /// The featured-playlists shelf. Recognized options: `locale`,
    /// `country`, `timestamp`, `limit`, `offset`.
    pub async fn featured_playlists(&self, options: &FetchOptions) -> Result<serde_json::Value> {
        log_api_request!("featured_playlists");
        let result = self
            .browse_get(
                "browse/featured-playlists".to_string(),
                options,
                &["locale", "country", "timestamp", "limit", "offset"],
            )
            .await;
        log_api_result!("featured_playlists", result);
        result
    }

    /// A single track. `use_country` restricts the lookup to the token's
    /// market.
    pub async fn track(&self, track_id: &str, use_country: bool) -> Result<FullTrack> {
        if track_id.is_empty() {
            return Err(anyhow::anyhow!("Track ID is empty"));
        }
        log_api_request!("track", track_id, use_country);
        let market = use_country.then_some(Market::FromToken);
        let result = self
            .client
            .track(TrackId::from_id(track_id)?, market)
            .await
            .map_err(anyhow::Error::from);
        log_api_result!("track", result);
        result
    }

    // --- Search ---

    /// Search for tracks. Recognized options: `country`, `limit`, `offset`.
    pub async fn search_tracks(
        &self,
        query: &str,
        options: &FetchOptions,
    ) -> Result<Page<FullTrack>> {
        match self.search(query, SearchType::Track, options).await? {
            SearchResult::Tracks(page) => Ok(page),
            other => Err(anyhow::anyhow!("Unexpected search result: {other:?}")),
        }
    }

    /// Search for artists. Recognized options: `country`, `limit`, `offset`.
    pub async fn search_artists(
        &self,
        query: &str,
        options: &FetchOptions,
    ) -> Result<Page<FullArtist>> {
        match self.search(query, SearchType::Artist, options).await? {
            SearchResult::Artists(page) => Ok(page),
            other => Err(anyhow::anyhow!("Unexpected search result: {other:?}")),
        }
    }

    /// Search for albums. Recognized options: `country`, `limit`, `offset`.
    pub async fn search_albums(
        &self,
        query: &str,
        options: &FetchOptions,
    ) -> Result<Page<SimplifiedAlbum>> {
        match self.search(query, SearchType::Album, options).await? {
            SearchResult::Albums(page) => Ok(page),
            other => Err(anyhow::anyhow!("Unexpected search result: {other:?}")),
        }
    }

    async fn search(
        &self,
        query: &str,
        search_type: SearchType,
        options: &FetchOptions,
    ) -> Result<SearchResult> {
        if query.is_empty() {
            return Err(anyhow::anyhow!("Search query is empty"));
        }
        log_api_request!("search", query, search_type = ?search_type);
        let result = self
            .client
            .search(
                query,
                search_type,
                options.country.clone(),
                None,
                options.limit,
                options.offset,
            )
            .await
            .map_err(anyhow::Error::from);
        log_api_result!("search", result);
        result
    }

    // --- Playback commands ---

    /// Start playback of a track, or append it to the playback queue when
    /// `queue` is set. Accepts a bare track ID or a `spotify:track:` URI.
    pub async fn play_track(&self, spotify_id: &str, queue: bool) -> Result<()> {
        if spotify_id.is_empty() {
            return Err(anyhow::anyhow!("Track ID is empty"));
        }

        // Accept full URIs as well (format: spotify:track:ID)
        let track_id = spotify_id.split(':').next_back().unwrap_or(spotify_id);
        let id = TrackId::from_id(track_id)?;

        let device_id = self.device_id().await;
        tracing::debug!(track_id, queue, device_id = ?device_id, "API: play_track");

        let result = if queue {
            self.client
                .add_item_to_queue(PlayableId::Track(id), device_id.as_deref())
                .await
                .map_err(anyhow::Error::from)
        } else {
            self.client
                .start_uris_playback(
                    [PlayableId::Track(id)],
                    device_id.as_deref(),
                    None,
                    None,
                )
                .await
                .map_err(anyhow::Error::from)
        };
        log_api_result!("play_track", result);
        result
    }

    pub async fn devices(&self) -> Result<Vec<DeviceInfo>> {
        log_api_request!("devices");
        let devices = self.client.device().await?;
        let device_infos: Vec<DeviceInfo> = devices
            .into_iter()
            .map(|d| DeviceInfo {
                id: d.id.unwrap_or_default(),
                name: d.name,
                is_active: d.is_active,
            })
            .collect();
        tracing::debug!(count = device_infos.len(), "Found devices");
        Ok(device_infos)
    }

    pub async fn has_active_device(&self) -> bool {
        if let Ok(devices) = self.client.device().await {
            devices.iter().any(|d| d.is_active)
        } else {
            false
        }
    }

    async fn device_id(&self) -> Option<String> {
        if let Ok(devices) = self.client.device().await {
            // First, try to find the active device
            let active_device = devices.iter().find(|d| d.is_active);
            if let Some(device) = active_device {
                tracing::debug!(device_name = %device.name, device_id = ?device.id, "Found active device");
                return device.id.clone();
            }

            // No active device - try to find our local device as fallback
            if let Some(local_name) = &self.local_device_name {
                let local_device = devices.iter().find(|d| &d.name == local_name);
                if let Some(device) = local_device {
                    tracing::debug!(device_name = %device.name, device_id = ?device.id, "No active device, using local device as fallback");
                    return device.id.clone();
                }
            }

            tracing::debug!(available_devices = devices.len(), "No active device found and local device not in list");
            None
        } else {
            tracing::debug!("Failed to get devices list");
            None
        }
    }

    /// Authorized GET against a browse endpoint the SDK has no convenience
    /// method for; the response JSON is relayed undecoded.
    async fn browse_get(
        &self,
        endpoint: String,
        options: &FetchOptions,
        keys: &[&'static str],
    ) -> Result<serde_json::Value> {
        let values = options.query_values(keys);
        let params: Query<'_> = values.iter().map(|(k, v)| (*k, v.as_str())).collect();
        let raw = self.client.api_get(&endpoint, &params).await?;
        Ok(serde_json::from_str(&raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rspotify::{AuthCodeSpotify, Config};

    fn test_client() -> WebApiClient {
        let spotify = AuthCodeSpotify::with_config(
            Default::default(),
            Default::default(),
            Config {
                token_cached: false,
                token_refreshing: false,
                ..Default::default()
            },
        );
        WebApiClient::new(spotify, Some("Spotify-Helper".to_string()))
    }

    #[test]
    fn expiring_soon_respects_margin() {
        let now = Utc::now();
        assert!(expiring_soon(now + chrono::Duration::seconds(299), now));
        assert!(!expiring_soon(now + chrono::Duration::seconds(301), now));
        assert!(expiring_soon(now - chrono::Duration::seconds(10), now));
    }

    #[tokio::test]
    async fn starts_logged_out() {
        let client = test_client();
        assert!(!client.is_logged_in().await);
        assert!(!client.token_needs_refresh().await);
    }

    #[tokio::test]
    async fn login_with_tokens_transitions_state() {
        let client = test_client();
        client
            .login_with_tokens("token", "refresh", chrono::Duration::seconds(3600))
            .await
            .unwrap();
        assert!(client.is_logged_in().await);

        client.logout().await;
        assert!(!client.is_logged_in().await);
    }

    #[tokio::test]
    async fn expired_token_counts_as_logged_out() {
        let client = test_client();
        client
            .login_with_tokens("token", "refresh", chrono::Duration::seconds(-1))
            .await
            .unwrap();
        assert!(!client.is_logged_in().await);
        assert!(client.token_needs_refresh().await);
    }

    #[tokio::test]
    async fn empty_access_token_is_rejected() {
        let client = test_client();
        let err = client
            .login_with_tokens("", "refresh", chrono::Duration::seconds(3600))
            .await;
        assert!(err.is_err());
        assert!(!client.is_logged_in().await);
    }

    #[tokio::test]
    async fn refresh_without_refresh_token_errors() {
        let client = test_client();
        client
            .login_with_tokens("token", "", chrono::Duration::seconds(10))
            .await
            .unwrap();
        assert!(client.token_needs_refresh().await);
        assert!(client.refresh_token_if_needed().await.is_err());
    }

    #[tokio::test]
    async fn empty_identifiers_are_rejected_locally() {
        let client = test_client();
        let opts = FetchOptions::default();
        assert!(client.play_track("", false).await.is_err());
        assert!(client.track("", false).await.is_err());
        assert!(client.category("", &opts).await.is_err());
        assert!(client.category_playlists("", &opts).await.is_err());
        assert!(client.user_playlists("", &opts).await.is_err());
        assert!(client.search_tracks("", &opts).await.is_err());
    }
}
