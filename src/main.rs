use anyhow::Result;
use rspotify::prelude::*;
use spotify_helper::{logging, FetchOptions, SpotifyHelper};

#[tokio::main]
async fn main() -> Result<()> {
    if let Err(e) = logging::init_logging() {
        eprintln!("Warning: Failed to initialize logging: {}", e);
    }

    tracing::info!("=== spotify-helper demo starting ===");

    let helper = SpotifyHelper::shared();

    // Tokens from the environment skip the browser flow
    let access_token = std::env::var("SPOTIFY_ACCESS_TOKEN").ok();
    let refresh_token = std::env::var("SPOTIFY_REFRESH_TOKEN").ok();

    match (access_token, refresh_token) {
        (Some(access), refresh) => {
            helper
                .login_with_tokens(
                    &access,
                    refresh.as_deref().unwrap_or(""),
                    chrono::Duration::seconds(3600),
                )
                .await?;
            println!("Logged in with environment tokens");
        }
        _ => {
            helper.login().await?;
            println!("Logged in via OAuth flow");
        }
    }

    let profile = helper.fetch_user_profile().await?;
    let username = profile.id.id().to_string();
    println!(
        "Hello, {}!",
        profile.display_name.as_deref().unwrap_or(&username)
    );

    // Independent fetches, issued concurrently
    let playlist_options = FetchOptions::new().limit(10);
    let release_options = FetchOptions::new().limit(5);
    let (playlists, releases) = futures::join!(
        helper.fetch_user_playlists(&username, &playlist_options),
        helper.fetch_new_releases(&release_options),
    );

    let playlists = playlists?;
    println!("Playlists ({} total):", playlists.total);
    for playlist in &playlists.items {
        println!("  {} ({} tracks)", playlist.name, playlist.tracks.total);
    }

    let releases = releases?;
    if let Some(albums) = releases["albums"]["items"].as_array() {
        println!("New releases:");
        for album in albums {
            println!(
                "  {} - {}",
                album["artists"][0]["name"].as_str().unwrap_or("?"),
                album["name"].as_str().unwrap_or("?"),
            );
        }
    }

    // A track ID argument starts the local device and plays it
    if let Some(track_id) = std::env::args().nth(1) {
        let track = helper.fetch_track(&track_id, true).await?;
        println!("Playing: {}", track.name);

        if !helper.has_active_device().await {
            helper.start_local_device().await?;
            // Give the device a moment to register with the account
            tokio::time::sleep(std::time::Duration::from_secs(2)).await;
        }
        helper.play_track(&track_id, false).await?;

        println!("Press Ctrl-C to stop");
        tokio::signal::ctrl_c().await?;
        helper.stop_local_device().await;
    }

    tracing::info!("spotify-helper demo shutting down");
    Ok(())
}
