use anyhow::Result;
use serenity::{
    builder::{
        CreateEmbed, CreateInteractionResponse, CreateInteractionResponseMessage, CreateMessage,
        EditInteractionResponse,
    },
    model::{
        application::CommandInteraction,
        channel::ChannelType,
        id::{GuildId, UserId},
    },
    prelude::Context,
};
use tracing::{error, info, warn};

use crate::{
    bot::JukeboxBot,
    error::{MusicError, MusicResult},
    session::{Caller, ChannelKind, SessionManager, VoiceChannel},
    ui::embeds,
};

/// Respuesta de un comando exitoso
enum Reply {
    Text(String),
    /// Sólo la ve quien usó el comando.
    Private(String),
    Embed(CreateEmbed),
}

impl Reply {
    fn text(content: impl Into<String>) -> Self {
        Reply::Text(content.into())
    }
}

/// Maneja comandos slash
pub async fn handle_command(ctx: &Context, command: CommandInteraction, bot: &JukeboxBot) -> Result<()> {
    let guild_id = command
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("Comando usado fuera de un servidor"))?;

    info!(
        "📝 Comando /{} usado por {} en guild {}",
        command.data.name, command.user.name, guild_id
    );

    let caller = build_caller(ctx, guild_id, command.user.id);
    let session = bot.session();

    let reply: MusicResult<Reply> = match command.data.name.as_str() {
        "play" | "playskip" => return handle_play(ctx, &command, session, &caller).await,
        "join" => session
            .join(&caller)
            .await
            .map(|channel_id| Reply::text(format!("🔊 Conectado a <#{}>", channel_id))),
        "leave" => session
            .leave(&caller)
            .await
            .map(|()| Reply::text("👋 Desconectado del canal de voz")),
        "skip" => session
            .skip(guild_id)
            .map(|song| Reply::text(format!("⏭️ Saltada: **{}**", song.title))),
        "loop" => Ok(Reply::text(if session.toggle_loop(guild_id) {
            "🔂 Repetir canción activado"
        } else {
            "➡️ Repetición desactivada"
        })),
        "loopqueue" => Ok(Reply::text(if session.toggle_queue_loop(guild_id) {
            "🔁 Repetir cola activado"
        } else {
            "➡️ Repetición desactivada"
        })),
        "nowplaying" => session.current_song(guild_id).map(|song| {
            Reply::Embed(embeds::create_now_playing_embed(
                &song,
                session.queue(guild_id).loop_mode,
            ))
        }),
        "grab" => match session.grab(&caller) {
            Ok(song) => {
                let dm = CreateMessage::new().embed(embeds::create_grab_embed(&song));
                match command.user.direct_message(ctx, dm).await {
                    Ok(_) => Ok(Reply::Private("📩 Te envié la canción por mensaje directo".into())),
                    Err(e) => {
                        warn!("⚠️ No se pudo enviar DM a {}: {:?}", command.user.name, e);
                        Ok(Reply::Private(
                            "❌ No pude enviarte un mensaje directo, revisa tu privacidad".into(),
                        ))
                    }
                }
            }
            Err(e) => Err(e),
        },
        "queue" => {
            let page = int_option(&command, "page").unwrap_or(1);
            Ok(Reply::Embed(embeds::create_queue_embed(
                &session.queue(guild_id),
                usize::try_from(page).unwrap_or(1),
                bot.config().queue_page_size,
            )))
        }
        "remove" => {
            let position = int_option(&command, "position")
                .and_then(|p| usize::try_from(p).ok())
                .unwrap_or(0);
            session
                .remove(guild_id, position)
                .map(|song| Reply::text(format!("🗑️ Eliminada de la cola: **{}**", song.title)))
        }
        "volume" => {
            let volume = match int_option(&command, "level") {
                Some(level) => session.set_volume(guild_id, level as f32 / 100.0),
                None => session.volume(guild_id),
            };
            Ok(Reply::Embed(embeds::create_volume_embed(volume)))
        }
        _ => {
            command
                .create_response(
                    &ctx.http,
                    CreateInteractionResponse::Message(
                        CreateInteractionResponseMessage::new()
                            .content("❌ Comando no reconocido")
                            .ephemeral(true),
                    ),
                )
                .await?;
            return Ok(());
        }
    };

    let message = match reply {
        Ok(Reply::Text(content)) => CreateInteractionResponseMessage::new().content(content),
        Ok(Reply::Private(content)) => CreateInteractionResponseMessage::new()
            .content(content)
            .ephemeral(true),
        Ok(Reply::Embed(embed)) => CreateInteractionResponseMessage::new().embed(embed),
        Err(e) => CreateInteractionResponseMessage::new()
            .embed(describe_failure(&command, &e))
            .ephemeral(true),
    };

    command
        .create_response(&ctx.http, CreateInteractionResponse::Message(message))
        .await?;

    Ok(())
}

async fn handle_play(
    ctx: &Context,
    command: &CommandInteraction,
    session: &SessionManager,
    caller: &Caller,
) -> Result<()> {
    let query = command
        .data
        .options
        .iter()
        .find(|opt| opt.name == "query")
        .and_then(|opt| opt.value.as_str())
        .unwrap_or_default();

    // Defer la respuesta ya que puede tomar tiempo
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
        )
        .await?;

    let was_playing = session.current_song(caller.guild_id).is_ok();

    let added = if command.data.name == "playskip" {
        // Entra al principio de la cola: siempre es la siguiente en sonar.
        session
            .play_skip(caller, query)
            .await
            .map(|song| (song, 1, true))
    } else {
        session.play(caller, query).await.map(|(song, position)| {
            let started = !was_playing
                && session
                    .current_song(caller.guild_id)
                    .is_ok_and(|current| current == song);
            (song, position, started)
        })
    };

    let response = match added {
        Ok((song, position, started)) => EditInteractionResponse::new().embed(
            embeds::create_track_added_embed(&song, position, started),
        ),
        Err(e) => EditInteractionResponse::new().embed(describe_failure(command, &e)),
    };

    command.edit_response(&ctx.http, response).await?;

    Ok(())
}

/// Embed para el usuario; los fallos inesperados además quedan en el log.
fn describe_failure(command: &CommandInteraction, e: &MusicError) -> CreateEmbed {
    if e.kind().is_expected() {
        warn!("⚠️ /{} falló: {}", command.data.name, e);
    } else {
        error!("❌ Error inesperado en /{}: {:?}", command.data.name, e);
    }
    embeds::create_error_embed(&e.to_string())
}

/// Arma el [`Caller`] con el estado de voz que hay en caché.
fn build_caller(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Caller {
    let voice_channel = guild_id.to_guild_cached(&ctx.cache).and_then(|guild| {
        let id = guild.voice_states.get(&user_id)?.channel_id?;
        let kind = channel_kind(guild.channels.get(&id).map(|channel| channel.kind));
        Some(VoiceChannel { id, kind })
    });

    Caller {
        guild_id,
        user_id,
        voice_channel,
    }
}

fn channel_kind(kind: Option<ChannelType>) -> ChannelKind {
    match kind {
        Some(ChannelType::Voice) => ChannelKind::Voice,
        Some(ChannelType::Stage) => ChannelKind::Stage,
        _ => ChannelKind::Other,
    }
}

fn int_option(command: &CommandInteraction, name: &str) -> Option<i64> {
    command
        .data
        .options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.value.as_i64())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_channel_kind() {
        assert_eq!(channel_kind(Some(ChannelType::Voice)), ChannelKind::Voice);
        assert_eq!(channel_kind(Some(ChannelType::Stage)), ChannelKind::Stage);
        assert_eq!(channel_kind(Some(ChannelType::Text)), ChannelKind::Other);
        assert_eq!(channel_kind(None), ChannelKind::Other);
    }
}
