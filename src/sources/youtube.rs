use anyhow::{Context, Result};
use async_process::Command;
use regex::Regex;
use serde::Deserialize;
use std::{sync::LazyLock, time::Duration};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use super::{MusicSource, TrackMetadata};

static YOUTUBE_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(https?://)?(www\.|m\.)?(youtube\.com/(watch\?v=|embed/|v/|shorts/)|youtu\.be/|music\.youtube\.com/)",
    )
    .expect("regex de URL de YouTube inválida")
});

/// Cliente para interactuar con YouTube/yt-dlp
pub struct YouTubeClient {
    ytdlp_path: String,
    rate_limiter: Semaphore,
}

/// Información extraída de yt-dlp
#[derive(Debug, Deserialize)]
struct YtDlpInfo {
    id: String,
    title: Option<String>,
    duration: Option<f64>,
    uploader: Option<String>,
    channel: Option<String>,
    thumbnail: Option<String>,
    webpage_url: Option<String>,
    url: Option<String>,
    is_live: Option<bool>,
}

impl YtDlpInfo {
    /// URL de la página del video. Las búsquedas planas a veces sólo traen
    /// el id.
    fn page_url(&self) -> String {
        self.webpage_url
            .clone()
            .or_else(|| self.url.clone().filter(|url| url.starts_with("http")))
            .unwrap_or_else(|| format!("https://www.youtube.com/watch?v={}", self.id))
    }

    fn into_metadata(self) -> TrackMetadata {
        let duration = match self.is_live {
            Some(true) => None,
            _ => self.duration.filter(|d| d.is_finite() && *d >= 0.0).map(Duration::from_secs_f64),
        };

        TrackMetadata {
            title: self.title.unwrap_or_else(|| self.id.clone()),
            duration,
            channel_name: self.channel.or(self.uploader),
            thumbnail_url: self.thumbnail,
        }
    }
}

impl YouTubeClient {
    pub fn new(ytdlp_path: impl Into<String>, max_concurrent_lookups: usize) -> Self {
        Self {
            ytdlp_path: ytdlp_path.into(),
            // Limitar requests concurrentes para evitar rate limiting
            rate_limiter: Semaphore::new(max_concurrent_lookups.max(1)),
        }
    }

    /// Verifica si una URL es válida para YouTube
    pub fn is_youtube_url(url: &str) -> bool {
        YOUTUBE_URL.is_match(url)
    }

    /// Versión de yt-dlp instalada
    pub async fn version(&self) -> Result<String> {
        let output = Command::new(&self.ytdlp_path)
            .arg("--version")
            .output()
            .await
            .with_context(|| format!("No se pudo ejecutar {}", self.ytdlp_path))?;

        if !output.status.success() {
            anyhow::bail!(
                "yt-dlp error: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    async fn run(&self, args: &[&str]) -> Result<String> {
        let _permit = self.rate_limiter.acquire().await?;

        let output = Command::new(&self.ytdlp_path)
            .args(args)
            .output()
            .await
            .context("Error al ejecutar yt-dlp")?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("yt-dlp error: {}", error.trim());
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Una línea JSON por resultado; las que no se entienden se descartan.
fn parse_search_output(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .filter_map(|line| match serde_json::from_str::<YtDlpInfo>(line) {
            Ok(info) => Some(info.page_url()),
            Err(e) => {
                warn!("⚠️ Resultado de búsqueda ilegible: {}", e);
                None
            }
        })
        .collect()
}

#[async_trait::async_trait]
impl MusicSource for YouTubeClient {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<String>> {
        info!("🔍 Buscando en YouTube: {}", query);

        let search_query = format!("ytsearch{}:{}", limit, query);
        let stdout = self
            .run(&[
                "--no-playlist",
                "--dump-json",
                "--flat-playlist",
                "--skip-download",
                "--no-warnings",
                &search_query,
            ])
            .await?;

        let results = parse_search_output(&stdout);
        debug!("{} resultados para {}", results.len(), query);
        Ok(results)
    }

    async fn fetch_metadata(&self, url: &str) -> Result<TrackMetadata> {
        debug!("📊 Obteniendo info de: {}", url);

        let stdout = self
            .run(&["--no-playlist", "--dump-json", "--no-warnings", url])
            .await?;

        let info: YtDlpInfo =
            serde_json::from_str(&stdout).context("Error al parsear respuesta de yt-dlp")?;

        Ok(info.into_metadata())
    }

    fn is_valid_url(&self, url: &str) -> bool {
        Self::is_youtube_url(url)
    }

    fn source_name(&self) -> &'static str {
        "YouTube"
    }
}
