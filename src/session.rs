//! Entry point for the command layer.
//!
//! [`SessionManager`] owns one instance of every core component and exposes
//! the guild-level operations (`join`, `play`, `skip`, loop toggles, ...).
//! Each operation validates its preconditions before touching any state, so a
//! rejected command never changes a guild's queue.

use serenity::model::id::{ChannelId, GuildId, UserId};
use std::{sync::Arc, time::Duration};
use tracing::{debug, info};

use crate::{
    audio::{
        connection::VoiceConnectionManager,
        player::PlaybackEngine,
        queue::{GuildQueueStore, QueueInfo, Song},
        transport::VoiceTransport,
    },
    config::Config,
    error::{MusicError, MusicResult},
    sources::{MusicSource, SongResolver},
};

/// Tipo de canal en el que está el usuario.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    Voice,
    Stage,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoiceChannel {
    pub id: ChannelId,
    pub kind: ChannelKind,
}

/// Quién ejecuta el comando y dónde está.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
    pub guild_id: GuildId,
    pub user_id: UserId,
    pub voice_channel: Option<VoiceChannel>,
}

impl Caller {
    /// Canal de voz del usuario, si es uno que soportamos.
    pub fn voice_channel_id(&self) -> MusicResult<ChannelId> {
        match self.voice_channel {
            None => Err(MusicError::NotInVoiceChannel),
            Some(VoiceChannel {
                id,
                kind: ChannelKind::Voice,
            }) => Ok(id),
            Some(_) => Err(MusicError::UnsupportedChannel),
        }
    }
}

pub struct SessionManager {
    resolver: SongResolver,
    connections: Arc<VoiceConnectionManager>,
    engine: Arc<PlaybackEngine>,
}

impl SessionManager {
    pub fn new(
        config: &Config,
        source: Arc<dyn MusicSource>,
        transport: Arc<dyn VoiceTransport>,
    ) -> Self {
        Self::with_timeouts(
            config.max_queue_size,
            config.default_volume,
            config.connect_timeout,
            config.playback_start_timeout,
            source,
            transport,
        )
    }

    fn with_timeouts(
        max_queue_size: usize,
        default_volume: f32,
        connect_timeout: Duration,
        playback_start_timeout: Duration,
        source: Arc<dyn MusicSource>,
        transport: Arc<dyn VoiceTransport>,
    ) -> Self {
        let store = Arc::new(GuildQueueStore::new(max_queue_size, default_volume));
        let connections = Arc::new(VoiceConnectionManager::new(
            transport.clone(),
            store.clone(),
            connect_timeout,
        ));
        let engine = Arc::new(PlaybackEngine::new(
            store,
            connections.clone(),
            transport,
            playback_start_timeout,
        ));

        Self {
            resolver: SongResolver::new(source),
            connections,
            engine,
        }
    }

    /// Conecta al canal de voz del usuario.
    pub async fn join(&self, caller: &Caller) -> MusicResult<ChannelId> {
        let channel_id = caller.voice_channel_id()?;
        self.connections.connect(caller.guild_id, channel_id).await?;
        Ok(channel_id)
    }

    /// Sale del canal de voz y vacía la cola.
    pub async fn leave(&self, caller: &Caller) -> MusicResult<()> {
        if !self.connections.is_connected(caller.guild_id) {
            return Err(MusicError::NotConnected);
        }
        self.connections.disconnect(caller.guild_id).await;
        Ok(())
    }

    /// Resuelve `query`, la encola y, si el guild estaba inactivo, empieza a
    /// reproducir. Devuelve la canción y su posición en la cola.
    pub async fn play(&self, caller: &Caller, query: &str) -> MusicResult<(Song, usize)> {
        let channel_id = caller.voice_channel_id()?;
        let song = self.resolver.resolve(caller.user_id, query).await?;

        info!(
            "🎶 {} pidió {} en guild {}",
            caller.user_id, song.title, caller.guild_id
        );
        let position = self
            .engine
            .enqueue(caller.guild_id, channel_id, song.clone())
            .await?;
        Ok((song, position))
    }

    /// Como [`Self::play`], pero la canción entra al principio de la cola y
    /// corta la que está sonando.
    pub async fn play_skip(&self, caller: &Caller, query: &str) -> MusicResult<Song> {
        let channel_id = caller.voice_channel_id()?;
        let song = self.resolver.resolve(caller.user_id, query).await?;

        info!(
            "⏩ {} pidió {} de inmediato en guild {}",
            caller.user_id, song.title, caller.guild_id
        );
        self.engine
            .play_skip(caller.guild_id, channel_id, song.clone())
            .await?;
        Ok(song)
    }

    pub fn skip(&self, guild_id: GuildId) -> MusicResult<Song> {
        self.engine.skip(guild_id)
    }

    /// Devuelve si la repetición de canción quedó activa.
    pub fn toggle_loop(&self, guild_id: GuildId) -> bool {
        self.engine.toggle_loop(guild_id)
    }

    /// Devuelve si la repetición de cola quedó activa.
    pub fn toggle_queue_loop(&self, guild_id: GuildId) -> bool {
        self.engine.toggle_queue_loop(guild_id)
    }

    pub fn current_song(&self, guild_id: GuildId) -> MusicResult<Song> {
        self.engine.current_song(guild_id)
    }

    /// Canción actual para enviarla por mensaje directo a quien la pide.
    pub fn grab(&self, caller: &Caller) -> MusicResult<Song> {
        let song = self.engine.current_song(caller.guild_id)?;
        debug!("📩 {} guardó {} de guild {}", caller.user_id, song.title, caller.guild_id);
        Ok(song)
    }

    pub fn queue(&self, guild_id: GuildId) -> QueueInfo {
        self.engine.queue_info(guild_id)
    }

    pub fn remove(&self, guild_id: GuildId, position: usize) -> MusicResult<Song> {
        self.engine.remove(guild_id, position)
    }

    pub fn set_volume(&self, guild_id: GuildId, volume: f32) -> f32 {
        self.engine.set_volume(guild_id, volume)
    }

    pub fn volume(&self, guild_id: GuildId) -> f32 {
        self.engine.volume(guild_id)
    }

    /// Canal al que está conectado el guild.
    pub fn voice_channel(&self, guild_id: GuildId) -> Option<ChannelId> {
        self.connections.channel(guild_id)
    }

    /// El gateway informó que el bot ya no está en el canal de voz.
    pub async fn connection_lost(&self, guild_id: GuildId) {
        self.connections.connection_lost(guild_id).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        audio::{queue::LoopMode, transport::fake::FakeTransport},
        error::ErrorKind,
        sources::{MockMusicSource, TrackMetadata},
    };
    use pretty_assertions::assert_eq;

    const GUILD: GuildId = GuildId::new(1);
    const CHANNEL: ChannelId = ChannelId::new(10);
    const URL: &str = "https://www.youtube.com/watch?v=dQw4w9WgXcQ";

    fn caller(voice_channel: Option<VoiceChannel>) -> Caller {
        Caller {
            guild_id: GUILD,
            user_id: UserId::new(7),
            voice_channel,
        }
    }

    fn in_voice() -> Caller {
        caller(Some(VoiceChannel {
            id: CHANNEL,
            kind: ChannelKind::Voice,
        }))
    }

    fn source() -> MockMusicSource {
        let mut source = MockMusicSource::new();
        source
            .expect_is_valid_url()
            .returning(|url| url.starts_with("https://www.youtube.com/"));
        source.expect_source_name().return_const("YouTube");
        source
            .expect_search()
            .returning(|query, _| match query {
                "nonsense query" => Ok(vec![]),
                other => Ok(vec![format!("https://www.youtube.com/watch?v={other}")]),
            });
        source.expect_fetch_metadata().returning(|url| {
            Ok(TrackMetadata {
                title: url.rsplit('=').next().unwrap_or_default().to_string(),
                duration: Some(Duration::from_secs(200)),
                channel_name: Some("Channel".to_string()),
                thumbnail_url: None,
            })
        });
        source
    }

    fn manager(source: MockMusicSource) -> (Arc<FakeTransport>, SessionManager) {
        let transport = FakeTransport::new();
        let manager = SessionManager::with_timeouts(
            100,
            0.5,
            Duration::from_secs(30),
            Duration::from_secs(5),
            Arc::new(source),
            transport.clone(),
        );
        (transport, manager)
    }

    #[tokio::test]
    async fn test_play_without_voice_channel_leaves_queue_unchanged() {
        let mut source = MockMusicSource::new();
        source.expect_search().never();
        source.expect_fetch_metadata().never();
        let (transport, manager) = manager(source);

        let err = manager.play(&caller(None), URL).await.unwrap_err();

        assert!(matches!(err, MusicError::NotInVoiceChannel));
        assert_eq!(err.kind(), ErrorKind::UserPrecondition);
        assert_eq!(manager.queue(GUILD).total_items, 0);
        assert!(transport.joins().is_empty());
    }

    #[tokio::test]
    async fn test_play_from_stage_channel_is_unsupported() {
        let (_transport, manager) = manager(source());
        let stage = caller(Some(VoiceChannel {
            id: CHANNEL,
            kind: ChannelKind::Stage,
        }));

        let err = manager.play(&stage, URL).await.unwrap_err();

        assert!(matches!(err, MusicError::UnsupportedChannel));
        assert!(manager.current_song(GUILD).is_err());
    }

    #[tokio::test]
    async fn test_play_with_no_search_results() {
        let (transport, manager) = manager(source());

        let err = manager.play(&in_voice(), "nonsense query").await.unwrap_err();

        assert!(matches!(err, MusicError::NoMatch { .. }));
        assert_eq!(err.kind(), ErrorKind::ResolutionFailure);
        assert!(transport.joins().is_empty());
    }

    #[tokio::test]
    async fn test_play_two_songs_then_skip() {
        let (transport, manager) = manager(source());

        let (first, position) = manager.play(&in_voice(), "a").await.unwrap();
        assert_eq!((first.title.as_str(), position), ("a", 1));
        let (_, position) = manager.play(&in_voice(), "b").await.unwrap();
        assert_eq!(position, 1);

        assert_eq!(manager.current_song(GUILD).unwrap().title, "a");
        assert_eq!(manager.voice_channel(GUILD), Some(CHANNEL));

        assert_eq!(manager.skip(GUILD).unwrap().title, "a");
        for _ in 0..100 {
            if transport.urls().len() == 2 && manager.current_song(GUILD).is_ok() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(manager.current_song(GUILD).unwrap().title, "b");
        assert_eq!(manager.queue(GUILD).total_items, 0);
    }

    #[tokio::test]
    async fn test_toggle_loop_then_queue_loop_then_loop() {
        let (_transport, manager) = manager(source());

        assert!(manager.toggle_loop(GUILD));
        // Con repetición de canción activa, el toggle de cola sólo la apaga.
        assert!(!manager.toggle_queue_loop(GUILD));
        assert_eq!(manager.queue(GUILD).loop_mode, LoopMode::Off);
        assert!(manager.toggle_loop(GUILD));
        assert_eq!(manager.queue(GUILD).loop_mode, LoopMode::Track);
    }

    #[tokio::test]
    async fn test_play_skip_cuts_current_song() {
        let (transport, manager) = manager(source());
        manager.play(&in_voice(), "a").await.unwrap();
        manager.play(&in_voice(), "b").await.unwrap();

        let song = manager.play_skip(&in_voice(), "c").await.unwrap();
        assert_eq!(song.title, "c");
        for _ in 0..100 {
            if manager.current_song(GUILD).is_ok_and(|s| s.title == "c") {
                break;
            }
            tokio::task::yield_now().await;
        }

        assert_eq!(manager.current_song(GUILD).unwrap().title, "c");
        assert_eq!(manager.queue(GUILD).items.len(), 1);
        assert_eq!(transport.urls().len(), 2);
    }

    #[tokio::test]
    async fn test_play_skip_requires_voice_channel() {
        let mut source = MockMusicSource::new();
        source.expect_search().never();
        let (_transport, manager) = manager(source);

        assert!(matches!(
            manager.play_skip(&caller(None), "c").await,
            Err(MusicError::NotInVoiceChannel)
        ));
    }

    #[tokio::test]
    async fn test_grab() {
        let (_transport, manager) = manager(source());
        assert!(matches!(
            manager.grab(&in_voice()),
            Err(MusicError::NothingPlaying)
        ));

        manager.play(&in_voice(), "a").await.unwrap();
        assert_eq!(manager.grab(&in_voice()).unwrap().title, "a");
    }

    #[tokio::test]
    async fn test_join_and_leave() {
        let (transport, manager) = manager(source());

        assert!(matches!(
            manager.leave(&in_voice()).await,
            Err(MusicError::NotConnected)
        ));
        assert!(matches!(
            manager.join(&caller(None)).await,
            Err(MusicError::NotInVoiceChannel)
        ));

        assert_eq!(manager.join(&in_voice()).await.unwrap(), CHANNEL);
        manager.play(&in_voice(), "a").await.unwrap();
        manager.play(&in_voice(), "b").await.unwrap();

        manager.leave(&in_voice()).await.unwrap();

        assert!(manager.current_song(GUILD).is_err());
        assert_eq!(manager.queue(GUILD).total_items, 0);
        assert_eq!(transport.joins().len(), 1);
        assert_eq!(transport.leaves(), vec![GUILD]);
    }

    #[tokio::test]
    async fn test_queue_remove_and_volume() {
        let (_transport, manager) = manager(source());
        for title in ["a", "b", "c"] {
            manager.play(&in_voice(), title).await.unwrap();
        }

        let info = manager.queue(GUILD);
        assert_eq!(info.current.map(|s| s.title), Some("a".to_string()));
        assert_eq!(info.total_items, 2);
        assert_eq!(info.total_duration, Duration::from_secs(600));

        assert_eq!(manager.remove(GUILD, 1).unwrap().title, "b");
        assert!(matches!(
            manager.remove(GUILD, 5),
            Err(MusicError::InvalidPosition { position: 5, len: 1 })
        ));

        assert_eq!(manager.set_volume(GUILD, 0.8), 0.8);
        assert_eq!(manager.volume(GUILD), 0.8);
    }

    #[tokio::test]
    async fn test_connection_lost_resets_guild() {
        let (_transport, manager) = manager(source());
        manager.play(&in_voice(), "a").await.unwrap();
        manager.play(&in_voice(), "b").await.unwrap();

        manager.connection_lost(GUILD).await;

        assert!(manager.current_song(GUILD).is_err());
        assert_eq!(manager.queue(GUILD).total_items, 0);
        assert_eq!(manager.voice_channel(GUILD), None);
    }
}
