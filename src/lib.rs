//! # Jukebox Bot
//!
//! Discord music bot with an independent queue and playback session per guild.
//!
//! - [`audio`]: queue store, voice connections and the per-guild playback engine
//! - [`sources`]: turns a URL or search text into a playable [`audio::queue::Song`]
//! - [`session`]: the guild-level operations the commands call
//! - [`bot`] / [`ui`]: serenity event handler, slash commands and embeds

pub mod audio;
pub mod bot;
pub mod config;
pub mod error;
pub mod session;
pub mod sources;
pub mod ui;
