use async_trait::async_trait;
use dashmap::{mapref::entry::Entry, DashMap};
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId};
use songbird::{
    error::JoinError,
    events::{
        context_data::{DisconnectKind, DisconnectReason},
        CoreEvent,
    },
    input::YoutubeDl,
    tracks::{Track, TrackHandle},
    Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent,
};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::{
    audio::transport::{DropSignal, PlaybackHandle, StreamControl, StreamSession, VoiceTransport},
    error::{MusicError, MusicResult},
};

type Slot = Arc<Mutex<Option<oneshot::Sender<()>>>>;

/// Transporte real: llamadas de songbird y audio obtenido con yt-dlp.
pub struct SongbirdTransport {
    manager: Arc<Songbird>,
    http: reqwest::Client,
    /// Ejecutable de yt-dlp; el mismo que usa [`crate::sources::YouTubeClient`].
    ytdlp_path: &'static str,
    /// Emisor de la señal de caída de cada guild. El handler global del
    /// `Call` se registra una vez y usa el emisor que haya en ese momento.
    drop_signals: DashMap<GuildId, Slot>,
}

impl SongbirdTransport {
    pub fn new(manager: Arc<Songbird>, ytdlp_path: String) -> Self {
        Self {
            manager,
            http: reqwest::Client::new(),
            // songbird pide `&'static str`; se crea un solo transporte por proceso.
            ytdlp_path: Box::leak(ytdlp_path.into_boxed_str()),
            drop_signals: DashMap::new(),
        }
    }

    fn forget(&self, guild_id: GuildId) {
        if let Some((_, slot)) = self.drop_signals.remove(&guild_id) {
            // Soltar el emisor avisa al observador que la salida fue nuestra.
            slot.lock().take();
        }
    }
}

#[async_trait]
impl VoiceTransport for SongbirdTransport {
    async fn join(&self, guild_id: GuildId, channel_id: ChannelId) -> MusicResult<DropSignal> {
        let (tx, rx) = oneshot::channel();
        let (slot, fresh) = match self.drop_signals.entry(guild_id) {
            Entry::Occupied(entry) => (entry.get().clone(), false),
            Entry::Vacant(entry) => (entry.insert(Slot::default()).clone(), true),
        };
        *slot.lock() = Some(tx);

        let call = match self.manager.join(guild_id, channel_id).await {
            Ok(call) => call,
            Err(e) => {
                self.forget(guild_id);
                if let Err(e) = self.manager.remove(guild_id).await {
                    debug!("Nada que limpiar tras fallar la conexión en guild {}: {}", guild_id, e);
                }
                return Err(MusicError::Unexpected(
                    anyhow::Error::from(e).context(format!("no se pudo unir al canal {channel_id}")),
                ));
            }
        };

        if fresh {
            call.lock().await.add_global_event(
                Event::Core(CoreEvent::DriverDisconnect),
                DisconnectNotifier { guild_id, slot },
            );
        }

        Ok(rx)
    }

    async fn leave(&self, guild_id: GuildId) -> MusicResult<()> {
        self.forget(guild_id);

        match self.manager.remove(guild_id).await {
            Ok(()) | Err(JoinError::NoCall) => Ok(()),
            Err(e) => Err(MusicError::Unexpected(anyhow::Error::from(e))),
        }
    }

    async fn open_stream(&self, guild_id: GuildId, url: &str) -> MusicResult<StreamSession> {
        let call = self.manager.get(guild_id).ok_or(MusicError::NotConnected)?;

        let source = YoutubeDl::new_ytdl_like(self.ytdlp_path, self.http.clone(), url.to_string());
        // Pausado hasta tener los eventos registrados.
        let handle = call.lock().await.play_only(Track::from(source).pause());

        let (started_tx, started) = oneshot::channel();
        let (ended_tx, ended) = oneshot::channel();
        let ended_tx = OneShotNotifier::new(ended_tx);

        let registered = handle
            .add_event(Event::Track(TrackEvent::Playable), OneShotNotifier::new(started_tx))
            .and_then(|()| handle.add_event(Event::Track(TrackEvent::End), ended_tx.clone()))
            .and_then(|()| handle.add_event(Event::Track(TrackEvent::Error), ended_tx))
            .and_then(|()| handle.play());

        if let Err(e) = registered {
            let _ = handle.stop();
            return Err(MusicError::Unexpected(
                anyhow::Error::from(e).context(format!("no se pudo iniciar {url}")),
            ));
        }

        Ok(StreamSession {
            handle: PlaybackHandle::new(SongbirdStream(handle)),
            started,
            ended,
        })
    }
}

struct SongbirdStream(TrackHandle);

impl StreamControl for SongbirdStream {
    fn stop(&self) {
        if let Err(e) = self.0.stop() {
            debug!("El track {} ya había terminado: {}", self.0.uuid(), e);
        }
    }

    fn set_volume(&self, volume: f32) {
        if let Err(e) = self.0.set_volume(volume) {
            debug!("No se pudo ajustar el volumen de {}: {}", self.0.uuid(), e);
        }
    }
}

/// Dispara un canal de un solo uso y se da de baja.
#[derive(Clone)]
struct OneShotNotifier(Slot);

impl OneShotNotifier {
    fn new(tx: oneshot::Sender<()>) -> Self {
        Self(Arc::new(Mutex::new(Some(tx))))
    }
}

#[async_trait]
impl VoiceEventHandler for OneShotNotifier {
    async fn act(&self, _ctx: &EventContext<'_>) -> Option<Event> {
        if let Some(tx) = self.0.lock().take() {
            let _ = tx.send(());
        }
        Some(Event::Cancel)
    }
}

/// Avisa de una caída del driver de voz que nadie pidió.
struct DisconnectNotifier {
    guild_id: GuildId,
    slot: Slot,
}

#[async_trait]
impl VoiceEventHandler for DisconnectNotifier {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        if let EventContext::DriverDisconnect(data) = ctx {
            if !is_unexpected_drop(data.kind, data.reason) {
                debug!(
                    "Desconexión esperada en guild {}: {:?} {:?}",
                    self.guild_id, data.kind, data.reason
                );
                return None;
            }
            if let Some(tx) = self.slot.lock().take() {
                warn!(
                    "🔌 Driver de voz desconectado en guild {}: {:?}",
                    self.guild_id, data.reason
                );
                let _ = tx.send(());
            }
        }
        None
    }
}

/// Sólo cuenta como caída una conexión establecida que se perdió por un
/// fallo. Sin `reason` la salida o el cambio de canal fueron pedidos; los
/// fallos al conectar los reporta `join`.
fn is_unexpected_drop(kind: DisconnectKind, reason: Option<DisconnectReason>) -> bool {
    match (kind, reason) {
        (DisconnectKind::Connect, _) => false,
        (_, None | Some(DisconnectReason::Requested | DisconnectReason::AttemptDiscarded)) => false,
        (_, Some(_)) => true,
    }
}
