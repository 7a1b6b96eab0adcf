use serenity::model::id::ChannelId;
use std::time::Duration;
use thiserror::Error;

/// Categoría de un fallo, usada por la capa de comandos para decidir
/// cómo reportarlo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// El usuario o el estado del servidor no cumplen una precondición.
    UserPrecondition,
    /// La búsqueda o la metadata no produjeron una canción reproducible.
    ResolutionFailure,
    /// Se excedió el límite de conexión o de inicio de reproducción.
    Timeout,
    /// Cualquier otro fallo de un servicio externo.
    Unexpected,
}

impl ErrorKind {
    /// Los fallos esperados se reportan al usuario sin más diagnóstico.
    pub fn is_expected(self) -> bool {
        !matches!(self, ErrorKind::Unexpected)
    }
}

/// Errores de la sesión de música de un guild.
#[derive(Debug, Error)]
pub enum MusicError {
    #[error("Debes estar en un canal de voz para usar este comando")]
    NotInVoiceChannel,

    #[error("Sólo puedo reproducir en canales de voz")]
    UnsupportedChannel,

    #[error("No hay nada reproduciéndose en este servidor")]
    NothingPlaying,

    #[error("No estoy conectado a un canal de voz")]
    NotConnected,

    #[error("La cola está llena (máximo {max} canciones)")]
    QueueFull { max: usize },

    #[error("No hay canción en la posición {position} (la cola tiene {len})")]
    InvalidPosition { position: usize, len: usize },

    #[error("No se encontraron resultados para `{query}`")]
    NoMatch { query: String },

    #[error("Video no disponible: {url}")]
    Unavailable { url: String },

    #[error("Tiempo agotado ({after:?}) al conectar a <#{channel}>")]
    ConnectionTimeout { channel: ChannelId, after: Duration },

    #[error("Tiempo agotado ({after:?}) esperando que empiece {url}")]
    PlaybackTimeout { url: String, after: Duration },

    #[error("Error inesperado: {0}")]
    Unexpected(#[from] anyhow::Error),
}

impl MusicError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            MusicError::NotInVoiceChannel
            | MusicError::UnsupportedChannel
            | MusicError::NothingPlaying
            | MusicError::NotConnected
            | MusicError::QueueFull { .. }
            | MusicError::InvalidPosition { .. } => ErrorKind::UserPrecondition,
            MusicError::NoMatch { .. } | MusicError::Unavailable { .. } => {
                ErrorKind::ResolutionFailure
            }
            MusicError::ConnectionTimeout { .. } | MusicError::PlaybackTimeout { .. } => {
                ErrorKind::Timeout
            }
            MusicError::Unexpected(_) => ErrorKind::Unexpected,
        }
    }
}

/// Resultado especializado para las operaciones de música.
pub type MusicResult<T> = Result<T, MusicError>;
