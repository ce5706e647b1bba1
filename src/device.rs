//! Local playback device backed by librespot
//!
//! Boots a Connect device so the logged-in account has a playback target on
//! this machine. The engine itself (decoding, buffering, volume) is entirely
//! librespot's; this module only configures and starts it.

use crate::auth::AuthResult;
use anyhow::Result;
use librespot::connect::{ConnectConfig, Spirc};
use librespot::core::config::SessionConfig;
use librespot::core::session::Session;
use librespot::playback::config::{AudioFormat, Bitrate, PlayerConfig};
use librespot::playback::mixer::{MixerConfig, NoOpVolume};
use librespot::playback::player::Player;
use librespot::playback::{audio_backend, mixer};
use std::sync::Arc;

const DEVICE_NAME: &str = "Spotify-Helper";

pub struct LocalDevice {
    pub player: Arc<Player>,
    session: Session,
    spirc: Spirc,
}

impl LocalDevice {
    pub async fn connect(auth: AuthResult) -> Result<Self> {
        tracing::info!("Connecting local playback device");

        let session_config = SessionConfig {
            device_id: Self::device_id(),
            ..Default::default()
        };

        let player_config = PlayerConfig {
            bitrate: Bitrate::Bitrate320,
            ..Default::default()
        };
        let audio_format = AudioFormat::default();
        let connect_config = ConnectConfig::default();
        let mixer_config = MixerConfig::default();
        let sink_builder = audio_backend::find(None)
            .ok_or_else(|| anyhow::anyhow!("No audio backend available"))?;
        let mixer_builder =
            mixer::find(None).ok_or_else(|| anyhow::anyhow!("No mixer available"))?;

        let session = Session::new(session_config, Some(auth.cache));

        let mixer = mixer_builder(mixer_config)?;

        let player = Player::new(
            player_config,
            session.clone(),
            Box::new(NoOpVolume),
            move || sink_builder(None, audio_format),
        );

        let (spirc, spirc_task) = Spirc::new(
            connect_config,
            session.clone(),
            auth.librespot_credentials,
            player.clone(),
            mixer,
        )
        .await?;

        spirc.activate()?;

        tokio::spawn(async move {
            let _spirc_task_res = spirc_task.await;
        });

        tracing::info!(device_name = DEVICE_NAME, "Local playback device ready");

        Ok(Self {
            player,
            session,
            spirc,
        })
    }

    fn device_id() -> String {
        // Stable per machine so the provider sees one device, not many
        let hostname = hostname::get()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        format!("{}-{}", Self::device_name(), hostname)
    }

    pub fn device_name() -> &'static str {
        DEVICE_NAME
    }

    pub fn username(&self) -> String {
        self.session.username()
    }

    /// Detach this device from the account and stop the engine.
    pub fn shutdown(&self) -> Result<()> {
        self.spirc.shutdown()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_id_is_stable_and_prefixed() {
        let first = LocalDevice::device_id();
        let second = LocalDevice::device_id();
        assert_eq!(first, second);
        assert!(first.starts_with(DEVICE_NAME));
    }
}
