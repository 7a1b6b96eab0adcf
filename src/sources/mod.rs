pub mod youtube;

use anyhow::Result;
use async_trait::async_trait;
use serenity::model::id::UserId;
use std::{sync::Arc, time::Duration};
use tracing::{debug, info};

use crate::{
    audio::queue::Song,
    error::{MusicError, MusicResult},
};

pub use youtube::YouTubeClient;

/// Servicio externo de búsqueda y metadata
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MusicSource: Send + Sync {
    /// Busca en la fuente y devuelve referencias, en el orden de la fuente
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<String>>;

    /// Obtiene la metadata de una referencia
    async fn fetch_metadata(&self, url: &str) -> Result<TrackMetadata>;

    /// Verifica si la URL es válida para esta fuente
    fn is_valid_url(&self, url: &str) -> bool;

    /// Nombre de la fuente
    fn source_name(&self) -> &'static str;
}

/// Metadata de un track
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackMetadata {
    pub title: String,
    /// `None` en transmisiones en vivo.
    pub duration: Option<Duration>,
    pub channel_name: Option<String>,
    pub thumbnail_url: Option<String>,
}

/// Convierte lo que escribió el usuario en una [`Song`] lista para encolar.
#[derive(Clone)]
pub struct SongResolver {
    source: Arc<dyn MusicSource>,
}

impl SongResolver {
    pub fn new(source: Arc<dyn MusicSource>) -> Self {
        Self { source }
    }

    /// Una URL válida se usa tal cual; cualquier otra cosa se busca y se toma
    /// el primer resultado. Un solo intento, sin reintentos.
    pub async fn resolve(&self, requested_by: UserId, query: &str) -> MusicResult<Song> {
        let query = query.trim();
        if query.is_empty() {
            return Err(MusicError::NoMatch {
                query: query.to_string(),
            });
        }

        let url = if self.source.is_valid_url(query) {
            query.to_string()
        } else {
            info!("🔍 Buscando en {}: {}", self.source.source_name(), query);
            let results = self.source.search(query, 1).await?;

            results
                .into_iter()
                .next()
                .filter(|url| self.source.is_valid_url(url))
                .ok_or_else(|| MusicError::NoMatch {
                    query: query.to_string(),
                })?
        };

        let metadata = match self.source.fetch_metadata(&url).await {
            Ok(metadata) => metadata,
            Err(e) => {
                debug!("Metadata no disponible para {}: {:?}", url, e);
                return Err(MusicError::Unavailable { url });
            }
        };

        Ok(Song {
            title: metadata.title,
            url,
            duration: metadata.duration.unwrap_or_default(),
            channel_name: metadata.channel_name.unwrap_or_default(),
            thumbnail_url: metadata.thumbnail_url,
            requested_by,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::eq;
    use pretty_assertions::assert_eq;

    const URL: &str = "https://www.youtube.com/watch?v=dQw4w9WgXcQ";

    fn metadata() -> TrackMetadata {
        TrackMetadata {
            title: "Never Gonna Give You Up".to_string(),
            duration: Some(Duration::from_secs(213)),
            channel_name: Some("Rick Astley".to_string()),
            thumbnail_url: None,
        }
    }

    fn source() -> MockMusicSource {
        let mut source = MockMusicSource::new();
        source
            .expect_is_valid_url()
            .returning(|url| url.starts_with("https://www.youtube.com/"));
        source.expect_source_name().return_const("YouTube");
        source
    }

    #[tokio::test]
    async fn test_direct_url_skips_search() {
        let mut source = source();
        source.expect_search().never();
        source
            .expect_fetch_metadata()
            .with(eq(URL))
            .times(1)
            .returning(|_| Ok(metadata()));

        let song = SongResolver::new(Arc::new(source))
            .resolve(UserId::new(7), URL)
            .await
            .unwrap();

        assert_eq!(song.url, URL);
        assert_eq!(song.title, "Never Gonna Give You Up");
        assert_eq!(song.channel_name, "Rick Astley");
        assert_eq!(song.requested_by, UserId::new(7));
    }

    #[tokio::test]
    async fn test_search_takes_first_result() {
        let mut source = source();
        source
            .expect_search()
            .with(eq("never gonna"), eq(1))
            .times(1)
            .returning(|_, _| Ok(vec![URL.to_string(), "https://www.youtube.com/watch?v=other".to_string()]));
        source
            .expect_fetch_metadata()
            .with(eq(URL))
            .times(1)
            .returning(|_| Ok(metadata()));

        let song = SongResolver::new(Arc::new(source))
            .resolve(UserId::new(7), "  never gonna ")
            .await
            .unwrap();

        assert_eq!(song.url, URL);
        assert_eq!(song.duration, Duration::from_secs(213));
    }

    #[tokio::test]
    async fn test_no_results_is_no_match() {
        let mut source = source();
        source.expect_search().returning(|_, _| Ok(vec![]));
        source.expect_fetch_metadata().never();

        let err = SongResolver::new(Arc::new(source))
            .resolve(UserId::new(7), "nonsense query")
            .await
            .unwrap_err();

        assert!(matches!(err, MusicError::NoMatch { ref query } if query == "nonsense query"));
    }

    #[tokio::test]
    async fn test_invalid_first_result_is_no_match() {
        let mut source = source();
        source
            .expect_search()
            .returning(|_, _| Ok(vec!["not a url".to_string()]));
        source.expect_fetch_metadata().never();

        let err = SongResolver::new(Arc::new(source))
            .resolve(UserId::new(7), "something")
            .await
            .unwrap_err();

        assert!(matches!(err, MusicError::NoMatch { .. }));
    }

    #[tokio::test]
    async fn test_empty_query_is_no_match() {
        let mut source = source();
        source.expect_search().never();

        let err = SongResolver::new(Arc::new(source))
            .resolve(UserId::new(7), "   ")
            .await
            .unwrap_err();

        assert!(matches!(err, MusicError::NoMatch { .. }));
    }

    #[tokio::test]
    async fn test_metadata_failure_is_unavailable() {
        let mut source = source();
        source
            .expect_fetch_metadata()
            .times(1)
            .returning(|_| Err(anyhow::anyhow!("Private video")));

        let err = SongResolver::new(Arc::new(source))
            .resolve(UserId::new(7), URL)
            .await
            .unwrap_err();

        assert!(matches!(err, MusicError::Unavailable { ref url } if url == URL));
    }

    #[tokio::test]
    async fn test_search_failure_is_unexpected() {
        let mut source = source();
        source
            .expect_search()
            .times(1)
            .returning(|_, _| Err(anyhow::anyhow!("yt-dlp not found")));

        let err = SongResolver::new(Arc::new(source))
            .resolve(UserId::new(7), "anything")
            .await
            .unwrap_err();

        assert_eq!(err.kind(), crate::error::ErrorKind::Unexpected);
    }

    #[tokio::test]
    async fn test_live_stream_has_zero_duration() {
        let mut source = source();
        source.expect_fetch_metadata().returning(|_| {
            Ok(TrackMetadata {
                duration: None,
                channel_name: None,
                ..metadata()
            })
        });

        let song = SongResolver::new(Arc::new(source))
            .resolve(UserId::new(7), URL)
            .await
            .unwrap();

        assert_eq!(song.duration, Duration::ZERO);
        assert_eq!(song.channel_name, "");
    }
}
