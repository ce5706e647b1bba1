//! The singleton facade tying the auth, playback, and Web API adapters
//! together

use std::sync::{Arc, OnceLock};
use anyhow::Result;
use tokio::sync::Mutex;
use rspotify::{
    model::{FullArtist, FullTrack, Page, PrivateUser, SimplifiedAlbum, SimplifiedPlaylist},
    AuthCodeSpotify, Config,
};

use crate::auth::{self, AuthResult};
use crate::client::{DeviceInfo, WebApiClient};
use crate::device::LocalDevice;
use crate::options::FetchOptions;

static SHARED: OnceLock<SpotifyHelper> = OnceLock::new();

/// Facade over the playback engine and the Web API.
///
/// Cheap to clone; all clones share one session. Concurrent calls are
/// allowed, with no ordering guarantees between them.
#[derive(Clone)]
pub struct SpotifyHelper {
    client: WebApiClient,
    auth_result: Arc<Mutex<Option<AuthResult>>>,
    local_device: Arc<Mutex<Option<LocalDevice>>>,
}

impl Default for SpotifyHelper {
    fn default() -> Self {
        Self::new()
    }
}

impl SpotifyHelper {
    /// The process-wide instance, created logged-out on first access.
    pub fn shared() -> &'static SpotifyHelper {
        SHARED.get_or_init(SpotifyHelper::new)
    }

    pub fn new() -> Self {
        let spotify = AuthCodeSpotify::with_config(
            Default::default(),
            Default::default(),
            Config {
                // The SDK's own caching/refreshing is disabled; the session
                // owns the token lifecycle.
                token_cached: false,
                token_refreshing: false,
                ..Default::default()
            },
        );

        Self {
            client: WebApiClient::new(spotify, Some(LocalDevice::device_name().to_string())),
            auth_result: Arc::new(Mutex::new(None)),
            local_device: Arc::new(Mutex::new(None)),
        }
    }

    /// The underlying Web API client, for callers that want it directly.
    pub fn client(&self) -> &WebApiClient {
        &self.client
    }

    // --- Session ---

    /// Log in with the full OAuth flow (cached credentials when available,
    /// otherwise the browser). Also captures the playback-engine credentials
    /// needed by [`SpotifyHelper::start_local_device`].
    pub async fn login(&self) -> Result<()> {
        let auth = auth::perform_oauth_flow().await?;

        self.client
            .login_with_tokens(
                &auth.rspotify_token.access_token,
                &auth.refresh_token,
                auth.rspotify_token.expires_in,
            )
            .await?;

        *self.auth_result.lock().await = Some(auth);
        tracing::info!("Login completed");
        Ok(())
    }

    /// Log in with tokens obtained by the host application's own OAuth flow.
    pub async fn login_with_tokens(
        &self,
        access_token: &str,
        refresh_token: &str,
        expires_in: chrono::Duration,
    ) -> Result<()> {
        self.client
            .login_with_tokens(access_token, refresh_token, expires_in)
            .await
    }

    pub async fn logout(&self) {
        self.stop_local_device().await;
        *self.auth_result.lock().await = None;
        self.client.logout().await;
    }

    pub async fn is_logged_in(&self) -> bool {
        self.client.is_logged_in().await
    }

    /// Refresh the access token when it is close to expiring. Returns
    /// whether a refresh happened.
    pub async fn refresh_if_needed(&self) -> Result<bool> {
        self.client.refresh_token_if_needed().await
    }

    // --- Local playback device ---

    /// Boot the local playback engine so this machine shows up as a Connect
    /// device. Requires a prior [`SpotifyHelper::login`]; token-only logins
    /// carry no playback-engine credentials.
    pub async fn start_local_device(&self) -> Result<()> {
        let auth = self
            .auth_result
            .lock()
            .await
            .clone()
            .ok_or_else(|| anyhow::anyhow!("Local device requires a full login"))?;

        let mut guard = self.local_device.lock().await;
        if guard.is_some() {
            tracing::debug!("Local device already running");
            return Ok(());
        }

        let device = LocalDevice::connect(auth).await?;
        *guard = Some(device);
        Ok(())
    }

    pub async fn stop_local_device(&self) {
        let mut guard = self.local_device.lock().await;
        if let Some(device) = guard.take() {
            if let Err(e) = device.shutdown() {
                tracing::warn!(error = %e, "Local device shutdown failed");
            }
        }
    }

    pub fn local_device_name() -> &'static str {
        LocalDevice::device_name()
    }

    // --- Playback ---

    /// Play a track by ID, or append it to the playback queue when `queue`
    /// is set.
    pub async fn play_track(&self, track_id: &str, queue: bool) -> Result<()> {
        self.client.play_track(track_id, queue).await
    }

    pub async fn devices(&self) -> Result<Vec<DeviceInfo>> {
        self.client.devices().await
    }

    pub async fn has_active_device(&self) -> bool {
        self.client.has_active_device().await
    }

    // --- Web API ---

    pub async fn fetch_user_profile(&self) -> Result<PrivateUser> {
        self.client.user_profile().await
    }

    pub async fn fetch_user_playlists(
        &self,
        username: &str,
        options: &FetchOptions,
    ) -> Result<Page<SimplifiedPlaylist>> {
        self.client.user_playlists(username, options).await
    }

    pub async fn fetch_categories(&self, options: &FetchOptions) -> Result<serde_json::Value> {
        self.client.categories(options).await
    }

    pub async fn fetch_category(
        &self,
        category_id: &str,
        options: &FetchOptions,
    ) -> Result<serde_json::Value> {
        self.client.category(category_id, options).await
    }

    pub async fn fetch_category_playlists(
        &self,
        category_id: &str,
        options: &FetchOptions,
    ) -> Result<serde_json::Value> {
        self.client.category_playlists(category_id, options).await
    }

    pub async fn fetch_new_releases(&self, options: &FetchOptions) -> Result<serde_json::Value> {
        self.client.new_releases(options).await
    }

    pub async fn fetch_featured_playlists(
        &self,
        options: &FetchOptions,
    ) -> Result<serde_json::Value> {
        self.client.featured_playlists(options).await
    }

    pub async fn fetch_track(&self, track_id: &str, use_country: bool) -> Result<FullTrack> {
        self.client.track(track_id, use_country).await
    }

    pub async fn search_tracks(
        &self,
        query: &str,
        options: &FetchOptions,
    ) -> Result<Page<FullTrack>> {
        self.client.search_tracks(query, options).await
    }

    pub async fn search_artists(
        &self,
        query: &str,
        options: &FetchOptions,
    ) -> Result<Page<FullArtist>> {
        self.client.search_artists(query, options).await
    }

    pub async fn search_albums(
        &self,
        query: &str,
        options: &FetchOptions,
    ) -> Result<Page<SimplifiedAlbum>> {
        self.client.search_albums(query, options).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_returns_the_same_instance() {
        let a = SpotifyHelper::shared();
        let b = SpotifyHelper::shared();
        assert!(std::ptr::eq(a, b));
    }

    #[tokio::test]
    async fn fresh_helper_is_logged_out() {
        let helper = SpotifyHelper::new();
        assert!(!helper.is_logged_in().await);
    }

    #[tokio::test]
    async fn token_login_and_logout_round_trip() {
        let helper = SpotifyHelper::new();
        helper
            .login_with_tokens("token", "refresh", chrono::Duration::seconds(3600))
            .await
            .unwrap();
        assert!(helper.is_logged_in().await);

        helper.logout().await;
        assert!(!helper.is_logged_in().await);
    }

    #[tokio::test]
    async fn local_device_requires_full_login() {
        let helper = SpotifyHelper::new();
        helper
            .login_with_tokens("token", "refresh", chrono::Duration::seconds(3600))
            .await
            .unwrap();
        assert!(helper.start_local_device().await.is_err());
    }

    #[test]
    fn local_device_name_is_fixed() {
        assert_eq!(SpotifyHelper::local_device_name(), "Spotify-Helper");
    }
}
