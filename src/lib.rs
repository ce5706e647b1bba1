//! Thin facade over the Spotify playback engine and Web API
//!
//! Wraps `librespot` (playback engine + Connect device), `librespot-oauth`
//! (login flows), and `rspotify` (Web API) behind a single
//! [`SpotifyHelper`]: log in, play or enqueue a track, and fetch profile,
//! playlists, categories, new releases, featured playlists, single tracks,
//! and track/artist/album search results. Every call is a pass-through;
//! results and errors come back as the provider returns them.

pub mod auth;
pub mod client;
pub mod device;
pub mod helper;
pub mod logging;
pub mod options;

pub use client::{DeviceInfo, WebApiClient};
pub use helper::SpotifyHelper;
pub use options::FetchOptions;

// The market types callers need to fill in `FetchOptions::country`.
pub use rspotify::model::{Country, Market};
