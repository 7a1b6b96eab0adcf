//! # Audio Module
//!
//! Per-guild playback core for Jukebox Bot.
//!
//! ## Architecture
//!
//! ### [`queue`] - Queue Management
//! - One [`queue::MusicQueue`] per guild, created on first use
//! - Loop modes applied when a song finishes (off, track, queue)
//! - The current song and its stream handle are stored together
//!
//! ### [`connection`] - Voice Connections
//! - Connects (or reuses the connection) with a bounded wait
//! - Turns an unrequested drop into the same reset as an explicit leave
//!
//! ### [`player`] - Playback Engine
//! - A single drive loop per guild: pop, connect, stream, wait, repeat
//! - Steps suspended across a reset notice it and abandon
//!
//! ### [`transport`] / [`driver`] - Voice Transport
//! - `transport` is the seam the core is written against
//! - `driver` implements it on top of songbird and yt-dlp
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use jukebox_bot::audio::{
//!     connection::VoiceConnectionManager, driver::SongbirdTransport, player::PlaybackEngine,
//!     queue::GuildQueueStore,
//! };
//! use std::{sync::Arc, time::Duration};
//!
//! # fn example(songbird: Arc<songbird::Songbird>) {
//! let transport = Arc::new(SongbirdTransport::new(songbird, "yt-dlp".to_string()));
//! let store = Arc::new(GuildQueueStore::new(1000, 0.5));
//! let connections = Arc::new(VoiceConnectionManager::new(
//!     transport.clone(),
//!     store.clone(),
//!     Duration::from_secs(30),
//! ));
//! let engine = Arc::new(PlaybackEngine::new(
//!     store,
//!     connections,
//!     transport,
//!     Duration::from_secs(5),
//! ));
//! # }
//! ```

pub mod connection;
pub mod driver;
pub mod player;
pub mod queue;
pub mod transport;
