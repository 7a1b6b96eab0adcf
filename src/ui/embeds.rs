use serenity::{
    all::Timestamp,
    builder::{CreateEmbed, CreateEmbedFooter},
};
use std::time::Duration;

use crate::audio::queue::{LoopMode, QueueInfo, Song};

/// Paleta de colores estandarizada para el bot
pub mod colors {
    use serenity::all::Colour;

    pub const SUCCESS_GREEN: Colour = Colour::from_rgb(67, 181, 129);
    pub const ERROR_RED: Colour = Colour::from_rgb(220, 53, 69);
    pub const INFO_BLUE: Colour = Colour::from_rgb(52, 144, 220);
    pub const MUSIC_PURPLE: Colour = Colour::from_rgb(138, 43, 226);
    pub const NEUTRAL_GRAY: Colour = Colour::from_rgb(108, 117, 125);
}

/// Footer estandarizado para todos los embeds
const STANDARD_FOOTER: &str = "🎵 Jukebox Bot";

fn song_fields(mut embed: CreateEmbed, song: &Song) -> CreateEmbed {
    let channel = if song.channel_name.is_empty() {
        "Desconocido"
    } else {
        song.channel_name.as_str()
    };

    embed = embed
        .field("🎤 Canal", channel, true)
        .field("⏱️ Duración", format_song_duration(song.duration), true)
        .field("👤 Solicitado por", format!("<@{}>", song.requested_by), true);

    if let Some(thumbnail) = &song.thumbnail_url {
        embed = embed.thumbnail(thumbnail);
    }

    embed.url(&song.url)
}

/// Crea un embed para mostrar la canción actual
pub fn create_now_playing_embed(song: &Song, loop_mode: LoopMode) -> CreateEmbed {
    let embed = CreateEmbed::default()
        .title(format!("{} Reproduciendo Ahora", loop_emoji(loop_mode)))
        .description(format!("**{}**", song.title))
        .color(colors::SUCCESS_GREEN);

    song_fields(embed, song)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed para mostrar que se agregó una canción
pub fn create_track_added_embed(song: &Song, position: usize, started: bool) -> CreateEmbed {
    let (title, description) = if started {
        ("🎵 Reproduciendo", format!("**{}**", song.title))
    } else {
        (
            "✅ Canción Agregada",
            format!("**{}** se agregó en la posición **{}**", song.title, position),
        )
    };

    let embed = CreateEmbed::default()
        .title(title)
        .description(description)
        .color(colors::MUSIC_PURPLE);

    song_fields(embed, song)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea el embed que se envía por mensaje directo con `/grab`
pub fn create_grab_embed(song: &Song) -> CreateEmbed {
    let embed = CreateEmbed::default()
        .title("📩 Canción guardada")
        .description(format!("**{}**", song.title))
        .color(colors::MUSIC_PURPLE);

    song_fields(embed, song)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed para mostrar la cola de reproducción
pub fn create_queue_embed(queue_info: &QueueInfo, page: usize, items_per_page: usize) -> CreateEmbed {
    let queue_page = queue_info.get_page(page, items_per_page);

    let mut embed = CreateEmbed::default()
        .title("📋 Cola de Reproducción")
        .color(colors::INFO_BLUE);

    if queue_info.current.is_none() && queue_info.total_items == 0 {
        return embed
            .description("😴 **La cola está vacía**\n\n💡 Usa `/play <canción>` para agregar música")
            .color(colors::NEUTRAL_GRAY)
            .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
            .timestamp(Timestamp::now());
    }

    // Canción actual
    if let Some(current) = &queue_info.current {
        embed = embed.field(
            format!("{} Reproduciendo", loop_emoji(queue_info.loop_mode)),
            format!("**{}** `[{}]`", current.title, format_song_duration(current.duration)),
            false,
        );
    }

    // Próximas canciones
    if !queue_page.items.is_empty() {
        let description: String = queue_page
            .items
            .iter()
            .enumerate()
            .map(|(i, song)| {
                format!(
                    "**{}**. {} `[{}]`\n",
                    queue_page.first_position + i,
                    song.title,
                    format_song_duration(song.duration)
                )
            })
            .collect();

        embed = embed.field("Próximas canciones", description, false);
    }

    // Información adicional
    let mut info = format!("**Total:** {} en espera", queue_info.total_items);

    if queue_info.total_duration > Duration::ZERO {
        info.push_str(&format!(
            " • **Duración:** {}",
            format_duration(queue_info.total_duration)
        ));
    }
    info.push_str(&format!(" • 🔊 {}%", (queue_info.volume * 100.0).round() as u32));

    embed = embed.field("Información", info, false);

    // Paginación
    if queue_page.total_pages > 1 {
        embed = embed.footer(CreateEmbedFooter::new(format!(
            "Página {} de {} • Jukebox Bot",
            queue_page.current_page, queue_page.total_pages
        )));
    } else {
        embed = embed.footer(CreateEmbedFooter::new(STANDARD_FOOTER));
    }

    embed.timestamp(Timestamp::now())
}

/// Crea un embed de error
pub fn create_error_embed(description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .description(format!("❌ **{}**", description))
        .color(colors::ERROR_RED)
}

/// Crea un embed de volumen con indicador visual
pub fn create_volume_embed(volume: f32) -> CreateEmbed {
    let volume_percent = (volume * 100.0).round() as u32;
    let status_emoji = match volume_percent {
        0 => "🔈",
        1..=50 => "🔉",
        _ => "🔊",
    };

    CreateEmbed::default()
        .title(format!("{} Volumen: {}%", status_emoji, volume_percent))
        .description(create_volume_bar(volume))
        .color(colors::INFO_BLUE)
        .footer(CreateEmbedFooter::new("💡 Usa /volume <0-200> para ajustar"))
}

/// Crea una barra visual de volumen (0% a 200%)
fn create_volume_bar(volume: f32) -> String {
    let segments = 20;
    let filled = ((volume / 2.0) * segments as f32).round().clamp(0.0, segments as f32) as usize;

    let bar = "█".repeat(filled) + &"▒".repeat(segments - filled);
    format!("`[{}]`", bar)
}

fn loop_emoji(loop_mode: LoopMode) -> &'static str {
    match loop_mode {
        LoopMode::Track => "🔂",
        LoopMode::Queue => "🔁",
        LoopMode::Off => "▶️",
    }
}

/// Las transmisiones en vivo no tienen duración.
fn format_song_duration(duration: Duration) -> String {
    if duration.is_zero() {
        "🔴 En vivo".to_string()
    } else {
        format_duration(duration)
    }
}

/// Formatea una duración en formato legible
pub fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}
