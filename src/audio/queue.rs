use dashmap::DashMap;
use parking_lot::RwLock;
use serenity::model::id::{GuildId, UserId};
use std::{collections::VecDeque, sync::Arc, time::Duration};
use tracing::{debug, info};

use crate::{
    audio::transport::PlaybackHandle,
    error::{MusicError, MusicResult},
};

/// Canción ya resuelta: metadata completa, todavía sin audio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Song {
    pub title: String,
    pub url: String,
    pub duration: Duration,
    pub channel_name: String,
    pub thumbnail_url: Option<String>,
    pub requested_by: UserId,
}

/// Qué hacer con una canción cuando termina.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoopMode {
    /// Se descarta.
    #[default]
    Off,
    /// Vuelve al principio de la cola.
    Track,
    /// Vuelve al final de la cola.
    Queue,
}

/// Canción sonando junto con el handle de su stream. Van siempre juntos:
/// hay canción actual si y sólo si hay handle.
#[derive(Debug, Clone)]
pub struct NowPlaying {
    pub song: Song,
    pub handle: PlaybackHandle,
    /// Otra canción pidió pasar adelante; ésta no se repite sola.
    interrupted: bool,
}

#[derive(Debug)]
pub struct MusicQueue {
    songs: VecDeque<Song>,
    now_playing: Option<NowPlaying>,
    loop_mode: LoopMode,
    volume: f32,
    max_size: usize,
    /// Cambia con cada reinicio; los pasos en vuelo que traen una sesión
    /// vieja se descartan.
    session: u64,
    /// Hay un ciclo de reproducción en curso para la sesión actual.
    driving: bool,
}

impl MusicQueue {
    pub fn new(max_size: usize, volume: f32) -> Self {
        Self {
            songs: VecDeque::new(),
            now_playing: None,
            loop_mode: LoopMode::Off,
            volume: volume.clamp(0.0, 2.0),
            max_size,
            session: 0,
            driving: false,
        }
    }

    /// Agrega una canción al final. Devuelve su posición (desde 1).
    pub fn add_song(&mut self, song: Song) -> MusicResult<usize> {
        if self.songs.len() >= self.max_size {
            return Err(MusicError::QueueFull { max: self.max_size });
        }

        info!("➕ Agregado a la cola: {}", song.title);
        self.songs.push_back(song);
        Ok(self.songs.len())
    }

    /// Agrega una canción al principio, por delante de todo lo pendiente.
    pub fn add_song_front(&mut self, song: Song) -> MusicResult<usize> {
        if self.songs.len() >= self.max_size {
            return Err(MusicError::QueueFull { max: self.max_size });
        }

        info!("⏫ Agregado al principio de la cola: {}", song.title);
        self.songs.push_front(song);
        Ok(1)
    }

    /// Saca la siguiente canción (FIFO).
    pub fn next_song(&mut self) -> Option<Song> {
        self.songs.pop_front()
    }

    /// Registra la canción que empezó a sonar.
    pub fn start(&mut self, song: Song, handle: PlaybackHandle) {
        self.now_playing = Some(NowPlaying {
            song,
            handle,
            interrupted: false,
        });
    }

    /// Marca la canción actual como interrumpida y devuelve su handle para
    /// detenerla. Al terminar no vuelve al principio de la cola aunque la
    /// repetición de canción esté activa.
    pub fn interrupt_current(&mut self) -> Option<PlaybackHandle> {
        let now_playing = self.now_playing.as_mut()?;
        now_playing.interrupted = true;
        Some(now_playing.handle.clone())
    }

    /// Cierra la canción actual y aplica el modo de repetición.
    pub fn finish_current(&mut self) -> Option<Song> {
        let NowPlaying {
            song: finished,
            interrupted,
            ..
        } = self.now_playing.take()?;

        match self.loop_mode {
            LoopMode::Track if interrupted => {
                debug!("⏭️ Interrumpida, no se repite: {}", finished.title);
            }
            LoopMode::Track => {
                debug!("🔂 Repitiendo: {}", finished.title);
                self.songs.push_front(finished.clone());
            }
            LoopMode::Queue => {
                debug!("🔁 Al final de la cola: {}", finished.title);
                self.songs.push_back(finished.clone());
            }
            LoopMode::Off => {}
        }

        Some(finished)
    }

    pub fn current_song(&self) -> Option<&Song> {
        self.now_playing.as_ref().map(|np| &np.song)
    }

    pub fn playback_handle(&self) -> Option<&PlaybackHandle> {
        self.now_playing.as_ref().map(|np| &np.handle)
    }

    pub fn songs(&self) -> impl Iterator<Item = &Song> {
        self.songs.iter()
    }

    pub fn len(&self) -> usize {
        self.songs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.songs.is_empty()
    }

    pub fn loop_mode(&self) -> LoopMode {
        self.loop_mode
    }

    pub fn set_loop_mode(&mut self, mode: LoopMode) {
        self.loop_mode = mode;
        match mode {
            LoopMode::Off => info!("➡️ Repetición desactivada"),
            LoopMode::Track => info!("🔂 Repetir canción activado"),
            LoopMode::Queue => info!("🔁 Repetir cola activado"),
        }
    }

    /// Activa `mode` si no hay repetición; con cualquier otro modo activo,
    /// la apaga. Devuelve si quedó activado.
    pub fn toggle_loop_mode(&mut self, mode: LoopMode) -> bool {
        if self.loop_mode == LoopMode::Off {
            self.set_loop_mode(mode);
            true
        } else {
            self.set_loop_mode(LoopMode::Off);
            false
        }
    }

    /// Elimina la canción pendiente en `position` (desde 1).
    pub fn remove_song(&mut self, position: usize) -> MusicResult<Song> {
        let len = self.songs.len();
        let song = position
            .checked_sub(1)
            .and_then(|index| self.songs.remove(index))
            .ok_or(MusicError::InvalidPosition { position, len })?;

        debug!("❌ Eliminada posición {}: {}", position, song.title);
        Ok(song)
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    /// Guarda el volumen (0.0 a 2.0) y lo aplica al stream actual.
    pub fn set_volume(&mut self, volume: f32) -> f32 {
        self.volume = volume.clamp(0.0, 2.0);
        if let Some(handle) = self.playback_handle() {
            handle.set_volume(self.volume);
        }
        self.volume
    }

    /// Vacía la cola y olvida la reproducción actual. Devuelve el handle
    /// que estaba activo para que quien llama lo detenga.
    pub fn reset(&mut self) -> Option<PlaybackHandle> {
        self.songs.clear();
        self.driving = false;
        self.session += 1;
        self.now_playing.take().map(|np| np.handle)
    }

    pub fn get_info(&self) -> QueueInfo {
        QueueInfo {
            current: self.current_song().cloned(),
            items: self.songs.iter().cloned().collect(),
            total_items: self.songs.len(),
            loop_mode: self.loop_mode,
            volume: self.volume,
            total_duration: self.calculate_total_duration(),
        }
    }

    pub(crate) fn session(&self) -> u64 {
        self.session
    }

    pub(crate) fn is_driving(&self) -> bool {
        self.driving
    }

    /// Marca el inicio de un ciclo de reproducción y devuelve su sesión.
    pub(crate) fn begin_drive(&mut self) -> u64 {
        self.driving = true;
        self.session
    }

    /// Libera el ciclo si sigue siendo el de la sesión actual.
    pub(crate) fn end_drive(&mut self, session: u64) {
        if self.session == session {
            self.driving = false;
        }
    }

    fn calculate_total_duration(&self) -> Duration {
        let queue_duration: Duration = self.songs.iter().map(|song| song.duration).sum();
        let current_duration = self
            .current_song()
            .map(|song| song.duration)
            .unwrap_or_default();

        queue_duration + current_duration
    }
}

#[derive(Debug, Clone)]
pub struct QueueInfo {
    pub current: Option<Song>,
    pub items: Vec<Song>,
    pub total_items: usize,
    pub loop_mode: LoopMode,
    pub volume: f32,
    pub total_duration: Duration,
}

impl QueueInfo {
    /// Obtiene una página específica de la cola
    pub fn get_page(&self, page: usize, items_per_page: usize) -> QueuePage {
        let items_per_page = items_per_page.max(1);
        let safe_page = page.max(1);
        let start = (safe_page - 1).saturating_mul(items_per_page);
        let end = start.saturating_add(items_per_page).min(self.items.len());
        let total_pages = self.total_items.div_ceil(items_per_page).max(1);

        QueuePage {
            items: if start < self.items.len() {
                self.items[start..end].to_vec()
            } else {
                Vec::new()
            },
            first_position: start + 1,
            current_page: safe_page,
            total_pages,
        }
    }
}

#[derive(Debug, Clone)]
pub struct QueuePage {
    pub items: Vec<Song>,
    /// Posición en la cola (desde 1) del primer elemento de la página.
    pub first_position: usize,
    pub current_page: usize,
    pub total_pages: usize,
}

/// Colas por guild, creadas la primera vez que se piden y nunca eliminadas.
#[derive(Debug)]
pub struct GuildQueueStore {
    queues: DashMap<GuildId, Arc<RwLock<MusicQueue>>>,
    max_size: usize,
    default_volume: f32,
}

impl GuildQueueStore {
    pub fn new(max_size: usize, default_volume: f32) -> Self {
        Self {
            queues: DashMap::new(),
            max_size,
            default_volume,
        }
    }

    /// Devuelve la cola del guild, creándola vacía si no existe.
    pub fn get(&self, guild_id: GuildId) -> Arc<RwLock<MusicQueue>> {
        self.queues
            .entry(guild_id)
            .or_insert_with(|| {
                debug!("📦 Nueva cola para guild {}", guild_id);
                Arc::new(RwLock::new(MusicQueue::new(
                    self.max_size,
                    self.default_volume,
                )))
            })
            .clone()
    }

    pub fn read<R>(&self, guild_id: GuildId, f: impl FnOnce(&MusicQueue) -> R) -> R {
        let queue = self.get(guild_id);
        let q = queue.read();
        f(&q)
    }

    pub fn write<R>(&self, guild_id: GuildId, f: impl FnOnce(&mut MusicQueue) -> R) -> R {
        let queue = self.get(guild_id);
        let mut q = queue.write();
        f(&mut q)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    pub(crate) fn song(title: &str) -> Song {
        Song {
            title: title.to_string(),
            url: format!("https://www.youtube.com/watch?v={title}"),
            duration: Duration::from_secs(180),
            channel_name: "Test Channel".to_string(),
            thumbnail_url: None,
            requested_by: UserId::new(7),
        }
    }

    fn titles(queue: &MusicQueue) -> Vec<String> {
        queue.songs().map(|s| s.title.clone()).collect()
    }

    struct NoopStream;

    impl crate::audio::transport::StreamControl for NoopStream {
        fn stop(&self) {}
        fn set_volume(&self, _volume: f32) {}
    }

    fn play_next(queue: &mut MusicQueue) -> Option<Song> {
        let next = queue.next_song()?;
        queue.start(next.clone(), PlaybackHandle::new(NoopStream));
        Some(next)
    }

    #[test]
    fn test_fifo_order() {
        let mut queue = MusicQueue::new(10, 0.5);
        assert_eq!(queue.add_song(song("a")).unwrap(), 1);
        assert_eq!(queue.add_song(song("b")).unwrap(), 2);

        assert_eq!(queue.next_song().unwrap().title, "a");
        assert_eq!(queue.next_song().unwrap().title, "b");
        assert!(queue.next_song().is_none());
    }

    #[test]
    fn test_current_song_and_handle_travel_together() {
        let mut queue = MusicQueue::new(10, 0.5);
        queue.add_song(song("a")).unwrap();
        assert_eq!(queue.current_song().is_some(), queue.playback_handle().is_some());

        play_next(&mut queue);
        assert!(queue.current_song().is_some() && queue.playback_handle().is_some());

        queue.finish_current();
        assert!(queue.current_song().is_none() && queue.playback_handle().is_none());
    }

    #[test]
    fn test_no_loop_discards_finished_song() {
        let mut queue = MusicQueue::new(10, 0.5);
        queue.add_song(song("a")).unwrap();
        queue.add_song(song("b")).unwrap();

        play_next(&mut queue);
        assert_eq!(queue.finish_current().unwrap().title, "a");
        assert_eq!(titles(&queue), vec!["b"]);
    }

    #[test]
    fn test_loop_track_reinserts_at_head() {
        let mut queue = MusicQueue::new(10, 0.5);
        queue.set_loop_mode(LoopMode::Track);
        queue.add_song(song("a")).unwrap();
        queue.add_song(song("b")).unwrap();

        for _ in 0..3 {
            assert_eq!(play_next(&mut queue).unwrap().title, "a");
            assert_eq!(titles(&queue), vec!["b"]);
            queue.finish_current();
        }
        assert_eq!(titles(&queue), vec!["a", "b"]);
    }

    #[test]
    fn test_loop_queue_rotates() {
        let mut queue = MusicQueue::new(10, 0.5);
        queue.set_loop_mode(LoopMode::Queue);
        queue.add_song(song("a")).unwrap();
        queue.add_song(song("b")).unwrap();

        play_next(&mut queue);
        queue.finish_current();
        assert_eq!(titles(&queue), vec!["b", "a"]);

        play_next(&mut queue);
        queue.finish_current();
        assert_eq!(titles(&queue), vec!["a", "b"]);
    }

    #[test]
    fn test_toggle_asymmetry() {
        let mut queue = MusicQueue::new(10, 0.5);

        assert!(queue.toggle_loop_mode(LoopMode::Track));
        assert_eq!(queue.loop_mode(), LoopMode::Track);

        // Con repetición de canción activa, el toggle de cola la apaga.
        assert!(!queue.toggle_loop_mode(LoopMode::Queue));
        assert_eq!(queue.loop_mode(), LoopMode::Off);

        assert!(queue.toggle_loop_mode(LoopMode::Queue));
        assert!(!queue.toggle_loop_mode(LoopMode::Track));
        assert_eq!(queue.loop_mode(), LoopMode::Off);
    }

    #[test]
    fn test_interrupted_song_skips_track_loop() {
        let mut queue = MusicQueue::new(10, 0.5);
        queue.set_loop_mode(LoopMode::Track);
        queue.add_song(song("a")).unwrap();
        play_next(&mut queue);

        assert_eq!(queue.add_song_front(song("b")).unwrap(), 1);
        assert!(queue.interrupt_current().is_some());
        queue.finish_current();
        assert_eq!(titles(&queue), vec!["b"]);

        // La que entra sí se repite.
        play_next(&mut queue);
        queue.finish_current();
        assert_eq!(titles(&queue), vec!["b"]);
    }

    #[test]
    fn test_interrupted_song_still_rotates_under_queue_loop() {
        let mut queue = MusicQueue::new(10, 0.5);
        queue.set_loop_mode(LoopMode::Queue);
        queue.add_song(song("a")).unwrap();
        queue.add_song(song("b")).unwrap();
        play_next(&mut queue);

        queue.add_song_front(song("c")).unwrap();
        queue.interrupt_current();
        queue.finish_current();
        assert_eq!(titles(&queue), vec!["c", "b", "a"]);
    }

    #[test]
    fn test_interrupt_when_idle() {
        let mut queue = MusicQueue::new(1, 0.5);
        assert!(queue.interrupt_current().is_none());

        queue.add_song_front(song("a")).unwrap();
        assert!(matches!(
            queue.add_song_front(song("b")),
            Err(MusicError::QueueFull { max: 1 })
        ));
    }

    #[test]
    fn test_queue_full() {
        let mut queue = MusicQueue::new(1, 0.5);
        queue.add_song(song("a")).unwrap();

        let err = queue.add_song(song("b")).unwrap_err();
        assert!(matches!(err, MusicError::QueueFull { max: 1 }));
        assert_eq!(titles(&queue), vec!["a"]);
    }

    #[test]
    fn test_remove_song_by_position() {
        let mut queue = MusicQueue::new(10, 0.5);
        for title in ["a", "b", "c"] {
            queue.add_song(song(title)).unwrap();
        }

        assert_eq!(queue.remove_song(2).unwrap().title, "b");
        assert_eq!(titles(&queue), vec!["a", "c"]);

        assert!(matches!(
            queue.remove_song(0),
            Err(MusicError::InvalidPosition { position: 0, len: 2 })
        ));
        assert!(matches!(
            queue.remove_song(3),
            Err(MusicError::InvalidPosition { position: 3, len: 2 })
        ));
    }

    #[test]
    fn test_reset_keeps_loop_mode_and_volume() {
        let mut queue = MusicQueue::new(10, 0.5);
        queue.set_loop_mode(LoopMode::Queue);
        queue.set_volume(1.5);
        queue.add_song(song("a")).unwrap();
        queue.add_song(song("b")).unwrap();
        play_next(&mut queue);
        let session = queue.begin_drive();

        assert!(queue.reset().is_some());
        assert!(queue.is_empty());
        assert!(queue.current_song().is_none());
        assert!(!queue.is_driving());
        assert_ne!(queue.session(), session);
        assert_eq!(queue.loop_mode(), LoopMode::Queue);
        assert_eq!(queue.volume(), 1.5);
    }

    #[test]
    fn test_end_drive_ignores_stale_session() {
        let mut queue = MusicQueue::new(10, 0.5);
        let stale = queue.begin_drive();
        queue.reset();
        let current = queue.begin_drive();

        queue.end_drive(stale);
        assert!(queue.is_driving());
        queue.end_drive(current);
        assert!(!queue.is_driving());
    }

    #[test]
    fn test_volume_is_clamped() {
        let mut queue = MusicQueue::new(10, 0.5);
        assert_eq!(queue.set_volume(3.0), 2.0);
        assert_eq!(queue.set_volume(-1.0), 0.0);
    }

    #[test]
    fn test_pagination() {
        let mut queue = MusicQueue::new(30, 0.5);
        for i in 0..25 {
            queue.add_song(song(&format!("s{i}"))).unwrap();
        }
        let info = queue.get_info();
        assert_eq!(info.total_duration, Duration::from_secs(25 * 180));

        let page = info.get_page(3, 10);
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.items.len(), 5);
        assert_eq!(page.first_position, 21);
        assert_eq!(page.items[0].title, "s20");

        let page = info.get_page(0, 10);
        assert_eq!(page.current_page, 1);
        assert_eq!(page.items.len(), 10);

        assert!(info.get_page(9, 10).items.is_empty());
        assert_eq!(MusicQueue::new(1, 0.5).get_info().get_page(1, 10).total_pages, 1);
    }

    #[test]
    fn test_store_creates_once_per_guild() {
        let store = GuildQueueStore::new(10, 0.5);
        let guild = GuildId::new(1);

        store.write(guild, |q| q.add_song(song("a"))).unwrap();
        assert_eq!(store.read(guild, |q| q.len()), 1);
        assert!(Arc::ptr_eq(&store.get(guild), &store.get(guild)));
        assert_eq!(store.read(GuildId::new(2), |q| q.len()), 0);
    }
}
