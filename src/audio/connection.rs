use dashmap::DashMap;
use serenity::model::id::{ChannelId, GuildId};
use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Weak,
    },
    time::Duration,
};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::{
    audio::{
        queue::{GuildQueueStore, MusicQueue},
        transport::{DropSignal, PlaybackHandle, VoiceTransport},
    },
    error::{MusicError, MusicResult},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Link {
    Connecting { epoch: u64 },
    Ready { channel_id: ChannelId, epoch: u64 },
}

impl Link {
    fn epoch(self) -> u64 {
        match self {
            Link::Connecting { epoch } | Link::Ready { epoch, .. } => epoch,
        }
    }
}

/// Lo que quedó suelto al reiniciar un guild y falta cerrar.
#[derive(Debug, Default)]
pub(crate) struct Detached {
    handle: Option<PlaybackHandle>,
    had_link: bool,
}

/// Conexiones de voz por guild.
///
/// Las llamadas al transporte (`join`/`leave`) de un mismo guild se
/// serializan; el estado de la cola se reinicia de forma síncrona, así que
/// una salida se respeta aunque haya una conexión a medio establecer.
pub struct VoiceConnectionManager {
    transport: Arc<dyn VoiceTransport>,
    store: Arc<GuildQueueStore>,
    links: DashMap<GuildId, Link>,
    locks: DashMap<GuildId, Arc<Mutex<()>>>,
    next_epoch: AtomicU64,
    connect_timeout: Duration,
}

impl VoiceConnectionManager {
    pub fn new(
        transport: Arc<dyn VoiceTransport>,
        store: Arc<GuildQueueStore>,
        connect_timeout: Duration,
    ) -> Self {
        Self {
            transport,
            store,
            links: DashMap::new(),
            locks: DashMap::new(),
            next_epoch: AtomicU64::new(1),
            connect_timeout,
        }
    }

    /// Conecta (o reutiliza la conexión) al canal y espera a que esté lista,
    /// como mucho `connect_timeout`.
    pub async fn connect(self: &Arc<Self>, guild_id: GuildId, channel_id: ChannelId) -> MusicResult<()> {
        let lock = self.guild_lock(guild_id);
        let _guard = lock.lock().await;

        if matches!(self.link(guild_id), Some(Link::Ready { channel_id: current, .. }) if current == channel_id) {
            debug!("🔊 Reutilizando conexión en guild {}", guild_id);
            return Ok(());
        }

        let epoch = self.next_epoch.fetch_add(1, Ordering::Relaxed);
        self.links.insert(guild_id, Link::Connecting { epoch });
        debug!("🔗 Conectando a {} en guild {}", channel_id, guild_id);

        let joined = tokio::time::timeout(
            self.connect_timeout,
            self.transport.join(guild_id, channel_id),
        )
        .await;

        match joined {
            Ok(Ok(dropped)) => {
                if self.link(guild_id) != Some(Link::Connecting { epoch }) {
                    // Alguien desconectó el guild mientras esperábamos; su
                    // cierre del transporte corre después de soltar el lock.
                    debug!("🚫 Conexión cancelada en guild {}", guild_id);
                    return Err(MusicError::NotConnected);
                }

                self.links
                    .insert(guild_id, Link::Ready { channel_id, epoch });
                self.watch(guild_id, epoch, dropped);
                info!("🔊 Conectado al canal {} en guild {}", channel_id, guild_id);
                Ok(())
            }
            Ok(Err(e)) => {
                self.forget(guild_id, epoch);
                Err(e)
            }
            Err(_) => {
                self.forget(guild_id, epoch);
                warn!(
                    "⏰ Timeout de {:?} conectando a {} en guild {}",
                    self.connect_timeout, channel_id, guild_id
                );
                if let Err(e) = self.transport.leave(guild_id).await {
                    debug!("No se pudo cerrar la conexión a medias: {}", e);
                }
                Err(MusicError::ConnectionTimeout {
                    channel: channel_id,
                    after: self.connect_timeout,
                })
            }
        }
    }

    /// Cierra la conexión (si hay) y deja la cola del guild vacía e inactiva.
    /// Se puede llamar las veces que haga falta.
    pub async fn disconnect(&self, guild_id: GuildId) {
        let detached = {
            let queue = self.store.get(guild_id);
            let mut q = queue.write();
            self.detach(guild_id, &mut q)
        };
        self.teardown(guild_id, detached).await;
    }

    /// Hay conexión lista o en curso.
    pub fn is_connected(&self, guild_id: GuildId) -> bool {
        self.links.contains_key(&guild_id)
    }

    /// Canal al que está conectado el guild, si la conexión está lista.
    pub fn channel(&self, guild_id: GuildId) -> Option<ChannelId> {
        match self.link(guild_id)? {
            Link::Ready { channel_id, .. } => Some(channel_id),
            Link::Connecting { .. } => None,
        }
    }

    /// Aviso externo (gateway) de que el bot salió del canal de voz.
    pub async fn connection_lost(&self, guild_id: GuildId) {
        if self.channel(guild_id).is_some() {
            warn!("🔌 Bot desconectado del canal de voz en guild {}", guild_id);
            self.disconnect(guild_id).await;
        }
    }

    /// Reinicia la cola y suelta el registro de conexión en el mismo paso,
    /// con la cola ya bloqueada por quien llama.
    pub(crate) fn detach(&self, guild_id: GuildId, queue: &mut MusicQueue) -> Detached {
        Detached {
            handle: queue.reset(),
            had_link: self.links.remove(&guild_id).is_some(),
        }
    }

    /// Detiene el stream suelto y cierra el transporte, salvo que una
    /// conexión nueva ya lo esté usando.
    pub(crate) async fn teardown(&self, guild_id: GuildId, detached: Detached) {
        if let Some(handle) = detached.handle {
            handle.stop();
        }
        if !detached.had_link {
            return;
        }

        let lock = self.guild_lock(guild_id);
        let _guard = lock.lock().await;

        if self.links.contains_key(&guild_id) {
            debug!("Conexión nueva en guild {}, no se cierra el transporte", guild_id);
            return;
        }

        match self.transport.leave(guild_id).await {
            Ok(()) => info!("👋 Desconectado del canal de voz en guild {}", guild_id),
            Err(e) => warn!("Error al salir del canal de voz en guild {}: {}", guild_id, e),
        }
    }

    fn watch(self: &Arc<Self>, guild_id: GuildId, epoch: u64, dropped: DropSignal) {
        let manager: Weak<Self> = Arc::downgrade(self);

        tokio::spawn(async move {
            // `Err`: el transporte soltó la señal porque salimos nosotros.
            if dropped.await.is_err() {
                return;
            }
            let Some(manager) = manager.upgrade() else {
                return;
            };

            if manager.link(guild_id).map(Link::epoch) == Some(epoch) {
                warn!("🔌 Conexión de voz perdida en guild {}", guild_id);
                manager.disconnect(guild_id).await;
            }
        });
    }

    fn forget(&self, guild_id: GuildId, epoch: u64) {
        self.links
            .remove_if(&guild_id, |_, link| *link == Link::Connecting { epoch });
    }

    fn link(&self, guild_id: GuildId) -> Option<Link> {
        self.links.get(&guild_id).map(|link| *link)
    }

    fn guild_lock(&self, guild_id: GuildId) -> Arc<Mutex<()>> {
        self.locks.entry(guild_id).or_default().clone()
    }
}
