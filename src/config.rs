use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{str::FromStr, time::Duration};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub application_id: u64,
    pub guild_id: Option<u64>, // Para comandos de desarrollo

    // Voz
    pub connect_timeout: Duration,
    pub playback_start_timeout: Duration,

    // Audio
    pub default_volume: f32,
    pub max_queue_size: usize,

    // yt-dlp
    pub ytdlp_path: String,
    pub max_concurrent_lookups: usize,

    // UI
    pub queue_page_size: usize,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Construye la configuración a partir de cualquier fuente de claves.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        let value = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let config = Self {
            // Discord
            discord_token: value("DISCORD_TOKEN").context("DISCORD_TOKEN no está definido")?,
            application_id: parse(
                "APPLICATION_ID",
                value("APPLICATION_ID").context("APPLICATION_ID no está definido")?,
            )?,
            guild_id: value("GUILD_ID").map(|v| parse("GUILD_ID", v)).transpose()?,

            // Voz
            connect_timeout: value("CONNECT_TIMEOUT")
                .map(|v| parse_duration("CONNECT_TIMEOUT", &v))
                .transpose()?
                .unwrap_or(defaults.connect_timeout),
            playback_start_timeout: value("PLAYBACK_START_TIMEOUT")
                .map(|v| parse_duration("PLAYBACK_START_TIMEOUT", &v))
                .transpose()?
                .unwrap_or(defaults.playback_start_timeout),

            // Audio
            default_volume: value("DEFAULT_VOLUME")
                .map(|v| parse("DEFAULT_VOLUME", v))
                .transpose()?
                .unwrap_or(defaults.default_volume),
            max_queue_size: value("MAX_QUEUE_SIZE")
                .map(|v| parse("MAX_QUEUE_SIZE", v))
                .transpose()?
                .unwrap_or(defaults.max_queue_size),

            // yt-dlp
            ytdlp_path: value("YTDLP_PATH").unwrap_or(defaults.ytdlp_path),
            max_concurrent_lookups: value("MAX_CONCURRENT_LOOKUPS")
                .map(|v| parse("MAX_CONCURRENT_LOOKUPS", v))
                .transpose()?
                .unwrap_or(defaults.max_concurrent_lookups),

            // UI
            queue_page_size: value("QUEUE_PAGE_SIZE")
                .map(|v| parse("QUEUE_PAGE_SIZE", v))
                .transpose()?
                .unwrap_or(defaults.queue_page_size),
        };

        // Validate configuration before returning
        config.validate()?;

        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - Volume must be between 0.0 and 2.0
    /// - Queue size, concurrent lookups and page size must be > 0
    /// - Both voice timeouts must be > 0
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=2.0).contains(&self.default_volume) {
            anyhow::bail!("Default volume must be between 0.0 and 2.0, got: {}", self.default_volume);
        }

        if self.max_queue_size == 0 {
            anyhow::bail!("Max queue size must be greater than 0");
        }

        if self.max_concurrent_lookups == 0 {
            anyhow::bail!("Max concurrent lookups must be greater than 0");
        }

        if self.queue_page_size == 0 {
            anyhow::bail!("Queue page size must be greater than 0");
        }

        if self.connect_timeout.is_zero() || self.playback_start_timeout.is_zero() {
            anyhow::bail!("Voice timeouts must be greater than 0");
        }

        Ok(())
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// Excludes the bot token.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Discord: App ID {} (Guild: {})\n  \
            Voice: {} connect timeout, {} playback start timeout\n  \
            Audio: {}% vol, {} max queue\n  \
            yt-dlp: {} ({} concurrent lookups)",
            self.application_id,
            self.guild_id.map_or("global".to_string(), |id| id.to_string()),
            humantime::format_duration(self.connect_timeout),
            humantime::format_duration(self.playback_start_timeout),
            (self.default_volume * 100.0) as u32,
            self.max_queue_size,
            self.ytdlp_path,
            self.max_concurrent_lookups,
        )
    }
}

fn parse<T>(key: &str, value: String) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .trim()
        .parse()
        .with_context(|| format!("{key} inválido: {value:?}"))
}

fn parse_duration(key: &str, value: &str) -> Result<Duration> {
    humantime::parse_duration(value.trim()).with_context(|| format!("{key} inválido: {value:?}"))
}

/// Default configuration values.
///
/// Used as fallbacks when environment variables are not provided.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Discord (no defaults - must be provided)
            discord_token: String::new(),
            application_id: 0,
            guild_id: None,

            // Voice defaults
            connect_timeout: Duration::from_secs(30),
            playback_start_timeout: Duration::from_secs(5),

            // Audio defaults
            default_volume: 0.5,
            max_queue_size: 1000,

            // yt-dlp defaults
            ytdlp_path: "yt-dlp".to_string(),
            max_concurrent_lookups: 3,

            queue_page_size: 10,
        }
    }
}
