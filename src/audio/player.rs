use serenity::model::id::{ChannelId, GuildId};
use std::{sync::Arc, time::Duration};
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use crate::{
    audio::{
        connection::VoiceConnectionManager,
        queue::{GuildQueueStore, LoopMode, QueueInfo, Song},
        transport::{PlaybackHandle, StreamSession, VoiceTransport},
    },
    error::{MusicError, MusicResult},
};

/// Resultado de un paso de avance.
enum Advance {
    /// Hay una canción sonando; `ended` avisa cuando termina.
    Playing {
        handle: PlaybackHandle,
        ended: oneshot::Receiver<()>,
    },
    /// La cola se vació y el guild quedó desconectado.
    Drained,
    /// El guild se reinició mientras el paso estaba suspendido.
    Abandoned,
}

/// Máquina de estados de reproducción por guild.
///
/// Cada guild tiene como mucho un ciclo de reproducción en curso: una tarea
/// que saca la siguiente canción, la hace sonar, espera a que termine, aplica
/// el modo de repetición y vuelve a empezar hasta que la cola se vacía o el
/// guild se reinicia.
pub struct PlaybackEngine {
    store: Arc<GuildQueueStore>,
    connections: Arc<VoiceConnectionManager>,
    transport: Arc<dyn VoiceTransport>,
    start_timeout: Duration,
}

impl PlaybackEngine {
    pub fn new(
        store: Arc<GuildQueueStore>,
        connections: Arc<VoiceConnectionManager>,
        transport: Arc<dyn VoiceTransport>,
        start_timeout: Duration,
    ) -> Self {
        Self {
            store,
            connections,
            transport,
            start_timeout,
        }
    }

    /// Agrega la canción y, si el guild está inactivo, arranca la
    /// reproducción y espera el resultado de ese primer avance.
    pub async fn enqueue(
        self: &Arc<Self>,
        guild_id: GuildId,
        channel_id: ChannelId,
        song: Song,
    ) -> MusicResult<usize> {
        let (position, session) = self.store.write(guild_id, |q| {
            let position = q.add_song(song)?;
            let session = (!q.is_driving()).then(|| q.begin_drive());
            Ok::<_, MusicError>((position, session))
        })?;

        let Some(session) = session else {
            debug!("Guild {} ya está reproduciendo, canción en espera", guild_id);
            return Ok(position);
        };

        self.start_drive(guild_id, channel_id, session)
            .await
            .map(|()| position)
    }

    /// Pone la canción al principio de la cola y corta la actual. Con el
    /// guild inactivo se comporta como [`Self::enqueue`].
    pub async fn play_skip(
        self: &Arc<Self>,
        guild_id: GuildId,
        channel_id: ChannelId,
        song: Song,
    ) -> MusicResult<()> {
        let (interrupted, session) = self.store.write(guild_id, |q| {
            q.add_song_front(song)?;
            let interrupted = q.interrupt_current();
            let session = (!q.is_driving()).then(|| q.begin_drive());
            Ok::<_, MusicError>((interrupted, session))
        })?;

        if let Some(handle) = interrupted {
            info!("⏩ Cortando la canción actual en guild {}", guild_id);
            handle.stop();
        }

        match session {
            Some(session) => self.start_drive(guild_id, channel_id, session).await,
            None => Ok(()),
        }
    }

    /// Detiene el stream actual; el ciclo de reproducción aplica la
    /// repetición y avanza igual que en un final natural.
    pub fn skip(&self, guild_id: GuildId) -> MusicResult<Song> {
        let (song, handle) = self.store.read(guild_id, |q| {
            match (q.current_song(), q.playback_handle()) {
                (Some(song), Some(handle)) => Ok((song.clone(), handle.clone())),
                _ => Err(MusicError::NothingPlaying),
            }
        })?;

        info!("⏭️ Saltando {} en guild {}", song.title, guild_id);
        handle.stop();
        Ok(song)
    }

    /// Alterna la repetición de canción. Con la de cola activa, la apaga.
    pub fn toggle_loop(&self, guild_id: GuildId) -> bool {
        self.store
            .write(guild_id, |q| q.toggle_loop_mode(LoopMode::Track))
    }

    /// Alterna la repetición de cola. Con la de canción activa, la apaga.
    pub fn toggle_queue_loop(&self, guild_id: GuildId) -> bool {
        self.store
            .write(guild_id, |q| q.toggle_loop_mode(LoopMode::Queue))
    }

    pub fn current_song(&self, guild_id: GuildId) -> MusicResult<Song> {
        self.store
            .read(guild_id, |q| q.current_song().cloned())
            .ok_or(MusicError::NothingPlaying)
    }

    pub fn remove(&self, guild_id: GuildId, position: usize) -> MusicResult<Song> {
        self.store.write(guild_id, |q| q.remove_song(position))
    }

    pub fn set_volume(&self, guild_id: GuildId, volume: f32) -> f32 {
        let volume = self.store.write(guild_id, |q| q.set_volume(volume));
        info!("🔊 Volumen ajustado a {}% en guild {}", (volume * 100.0) as u32, guild_id);
        volume
    }

    pub fn volume(&self, guild_id: GuildId) -> f32 {
        self.store.read(guild_id, |q| q.volume())
    }

    pub fn queue_info(&self, guild_id: GuildId) -> QueueInfo {
        self.store.read(guild_id, |q| q.get_info())
    }

    /// Lanza el ciclo de reproducción y espera el resultado de su primer
    /// avance. Si el ciclo se abandona antes de reportar, devuelve `Ok`.
    async fn start_drive(
        self: &Arc<Self>,
        guild_id: GuildId,
        channel_id: ChannelId,
        session: u64,
    ) -> MusicResult<()> {
        let (first_tx, first_rx) = oneshot::channel();
        tokio::spawn(self.clone().drive(guild_id, channel_id, session, first_tx));

        first_rx.await.unwrap_or(Ok(()))
    }

    /// Ciclo de reproducción de un guild. Itera en vez de recursar, así que
    /// una sesión larga no acumula nada por canción.
    async fn drive(
        self: Arc<Self>,
        guild_id: GuildId,
        channel_id: ChannelId,
        session: u64,
        first: oneshot::Sender<MusicResult<()>>,
    ) {
        let mut first = Some(first);

        loop {
            let (handle, ended) = match self.advance(guild_id, channel_id, session).await {
                Ok(Advance::Playing { handle, ended }) => {
                    if let Some(tx) = first.take() {
                        let _ = tx.send(Ok(()));
                    }
                    (handle, ended)
                }
                Ok(Advance::Drained) | Ok(Advance::Abandoned) => break,
                Err(e) => {
                    self.store.write(guild_id, |q| q.end_drive(session));
                    match first.take() {
                        Some(tx) => {
                            let _ = tx.send(Err(e));
                        }
                        None if e.kind().is_expected() => {
                            warn!("⚠️ Reproducción detenida en guild {}: {}", guild_id, e)
                        }
                        None => error!("❌ Error al reproducir siguiente canción en guild {}: {:?}", guild_id, e),
                    }
                    break;
                }
            };

            // Fin natural, forzado o stream descartado: todo cuenta como fin.
            let _ = ended.await;

            let finished = self.store.write(guild_id, |q| {
                if q.session() != session {
                    return None;
                }
                let ours = q
                    .playback_handle()
                    .is_some_and(|current| current.same_stream(&handle));
                Some(if ours { q.finish_current() } else { None })
            });
            match finished {
                Some(song) => {
                    if let Some(song) = song {
                        debug!("🎵 Terminó {} en guild {}", song.title, guild_id);
                    }
                }
                None => {
                    debug!("Guild {} reiniciado, ciclo de reproducción terminado", guild_id);
                    break;
                }
            }
        }

        // Si el ciclo nunca llegó a reportar, quien encoló recibe `Ok`.
        drop(first);
    }

    /// Saca la siguiente canción, conecta y la hace sonar.
    async fn advance(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        session: u64,
    ) -> MusicResult<Advance> {
        let queue = self.store.get(guild_id);

        let next = {
            let mut q = queue.write();
            if q.session() != session {
                return Ok(Advance::Abandoned);
            }
            match q.next_song() {
                Some(song) => Ok(song),
                None => Err(self.connections.detach(guild_id, &mut q)),
            }
        };

        let song = match next {
            Ok(song) => song,
            Err(detached) => {
                info!("📭 Cola vacía en guild {}, desconectando", guild_id);
                self.connections.teardown(guild_id, detached).await;
                return Ok(Advance::Drained);
            }
        };

        if let Err(e) = self.connections.connect(guild_id, channel_id).await {
            return self.unless_reset(guild_id, session, e);
        }
        if self.is_reset(guild_id, session) {
            return Ok(Advance::Abandoned);
        }

        let StreamSession {
            handle,
            started,
            mut ended,
        } = match self.transport.open_stream(guild_id, &song.url).await {
            Ok(stream) => stream,
            Err(e) => return self.unless_reset(guild_id, session, e),
        };
        handle.set_volume(queue.read().volume());

        // Un stream detenido antes de sonar (p. ej. por una salida) se
        // detecta por su señal de fin, sin esperar al límite.
        let waited = tokio::time::timeout(self.start_timeout, async {
            tokio::select! {
                biased;
                started = started => started.is_ok(),
                _ = &mut ended => false,
            }
        })
        .await;

        let failure = match waited {
            Ok(true) => None,
            Ok(false) => Some(MusicError::Unexpected(anyhow::anyhow!(
                "el stream de {} se cerró antes de empezar",
                song.url
            ))),
            Err(_) => {
                warn!(
                    "⏰ {} no empezó a sonar en {:?} (guild {})",
                    song.title, self.start_timeout, guild_id
                );
                Some(MusicError::PlaybackTimeout {
                    url: song.url.clone(),
                    after: self.start_timeout,
                })
            }
        };
        if let Some(e) = failure {
            handle.stop();
            return self.unless_reset(guild_id, session, e);
        }

        {
            let mut q = queue.write();
            if q.session() != session {
                drop(q);
                handle.stop();
                return Ok(Advance::Abandoned);
            }
            // El volumen pudo cambiar mientras se esperaba el inicio.
            handle.set_volume(q.volume());
            q.start(song.clone(), handle.clone());
        }

        info!("🎵 Reproduciendo: {} en guild {}", song.title, guild_id);
        Ok(Advance::Playing { handle, ended })
    }

    fn is_reset(&self, guild_id: GuildId, session: u64) -> bool {
        self.store.read(guild_id, |q| q.session() != session)
    }

    /// Un fallo después de un reinicio no es del usuario: el paso se
    /// abandona en silencio.
    fn unless_reset(&self, guild_id: GuildId, session: u64, e: MusicError) -> MusicResult<Advance> {
        if self.is_reset(guild_id, session) {
            debug!("Guild {} reiniciado durante el avance: {}", guild_id, e);
            Ok(Advance::Abandoned)
        } else {
            Err(e)
        }
    }
}
