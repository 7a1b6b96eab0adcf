//! Frontera con el transporte de voz.
//!
//! El motor de reproducción sólo conoce estos tipos: una conexión que avisa
//! cuando se cae, y streams que avisan cuando empiezan a sonar y cuando
//! terminan. [`super::driver::SongbirdTransport`] es la implementación real.

use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId};
use std::{fmt, sync::Arc};
use tokio::sync::oneshot;

use crate::error::MusicResult;

/// Se resuelve con `Ok(())` si la conexión se cae sin que nadie la haya
/// cerrado. Si el transporte la descarta (salida explícita) el emisor se
/// suelta y el receptor devuelve `Err`.
pub type DropSignal = oneshot::Receiver<()>;

/// Control sobre un stream activo.
pub trait StreamControl: Send + Sync {
    /// Detiene el stream. Dispara la señal de fin igual que un final natural.
    fn stop(&self);

    fn set_volume(&self, volume: f32);
}

/// Handle clonable del stream activo de un guild.
#[derive(Clone)]
pub struct PlaybackHandle {
    control: Arc<dyn StreamControl>,
}

impl PlaybackHandle {
    pub fn new(control: impl StreamControl + 'static) -> Self {
        Self {
            control: Arc::new(control),
        }
    }

    pub fn stop(&self) {
        self.control.stop();
    }

    pub fn set_volume(&self, volume: f32) {
        self.control.set_volume(volume);
    }

    /// Indica si ambos handles controlan el mismo stream.
    pub fn same_stream(&self, other: &PlaybackHandle) -> bool {
        Arc::ptr_eq(&self.control, &other.control)
    }
}

impl fmt::Debug for PlaybackHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlaybackHandle")
            .field("control", &Arc::as_ptr(&self.control).cast::<()>())
            .finish()
    }
}

/// Stream recién abierto: su handle y sus dos señales de un solo uso.
pub struct StreamSession {
    pub handle: PlaybackHandle,
    /// Se dispara cuando el transporte reporta que el stream está sonando.
    pub started: oneshot::Receiver<()>,
    /// Se dispara (o se suelta) cuando el stream termina, sea natural o forzado.
    pub ended: oneshot::Receiver<()>,
}

#[async_trait]
pub trait VoiceTransport: Send + Sync {
    /// Pide la conexión al canal y se resuelve cuando está lista.
    /// Los límites de tiempo los aplica quien llama.
    async fn join(&self, guild_id: GuildId, channel_id: ChannelId) -> MusicResult<DropSignal>;

    /// Cierra la conexión del guild. No falla si no hay ninguna.
    async fn leave(&self, guild_id: GuildId) -> MusicResult<()>;

    /// Abre un stream de sólo audio, con la mejor calidad disponible, y lo
    /// adjunta a la conexión del guild.
    async fn open_stream(&self, guild_id: GuildId, url: &str) -> MusicResult<StreamSession>;
}
