//! # Bot Module
//!
//! Discord wiring for Jukebox Bot.
//!
//! This module contains the serenity side of the bot:
//! - Slash command registration ([`commands`])
//! - Command dispatch into the [`SessionManager`] ([`handlers`])
//! - Voice state tracking, so a bot kicked from its channel resets the guild
//!
//! ## Example
//!
//! ```rust,no_run
//! use jukebox_bot::{bot::JukeboxBot, config::Config, session::SessionManager};
//! use std::sync::Arc;
//!
//! # fn example(session: Arc<SessionManager>) -> anyhow::Result<()> {
//! let config = Config::load()?;
//! let bot = JukeboxBot::new(config, session);
//! # Ok(())
//! # }
//! ```

use anyhow::Result;
use serenity::{
    all::{ActivityData, Context, EventHandler, GuildId, Interaction, Ready, VoiceState},
    async_trait,
};
use std::sync::Arc;
use tracing::{error, info, warn};

pub mod commands;
pub mod handlers;

use crate::{config::Config, session::SessionManager};

/// Main Discord event handler.
///
/// Holds no playback state of its own: every command goes through the shared
/// [`SessionManager`].
pub struct JukeboxBot {
    /// Bot configuration loaded from environment variables
    config: Arc<Config>,
    session: Arc<SessionManager>,
}

impl JukeboxBot {
    pub fn new(config: Config, session: Arc<SessionManager>) -> Self {
        Self {
            config: Arc::new(config),
            session,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    /// Registers slash commands with Discord.
    ///
    /// Commands are registered for `GUILD_ID` when it is set (instant updates,
    /// useful for development) and globally otherwise.
    async fn register_commands(&self, ctx: &Context) -> Result<()> {
        info!("📝 Registrando comandos slash...");
        info!("🔧 Application ID: {}", self.config.application_id);

        match self.config.guild_id {
            Some(guild_id) => {
                info!("🏠 Registrando comandos para guild específica: {}", guild_id);
                let guild_id = GuildId::new(guild_id);

                // Verificar que el bot esté en la guild
                if !ctx.cache.guilds().contains(&guild_id) {
                    warn!("⚠️ El bot no está en la guild especificada: {}", guild_id);
                    return Ok(());
                }

                commands::register_guild_commands(ctx, guild_id)
                    .await
                    .map_err(|e| {
                        error!("❌ Error registrando comandos de guild: {:?}", e);
                        anyhow::anyhow!("No se pudieron registrar comandos de guild. Verifica que el bot tenga permisos de 'applications.commands' en la guild.")
                    })?;
                info!("✅ Comandos de guild registrados para: {}", guild_id);
            }
            None => {
                info!("🌐 Registrando comandos globalmente");
                commands::register_global_commands(ctx).await.map_err(|e| {
                    error!("❌ Error registrando comandos globales: {:?}", e);
                    anyhow::anyhow!("No se pudieron registrar comandos globales. Verifica que el bot tenga permisos de 'applications.commands'.")
                })?;
                info!("✅ Comandos globales registrados");
            }
        }

        Ok(())
    }
}

#[async_trait]
impl EventHandler for JukeboxBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());

        if let Err(e) = self.register_commands(&ctx).await {
            error!("Error al registrar comandos: {:?}", e);
        }

        ctx.set_activity(Some(ActivityData::listening("/play")));
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        if let Interaction::Command(command_interaction) = interaction {
            if let Err(e) = handlers::handle_command(&ctx, command_interaction, self).await {
                error!("Error manejando comando: {:?}", e);
            }
        }
    }

    /// Detects the bot being disconnected from voice by someone else.
    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let current_user_id = ctx.cache.current_user().id;
        if new.user_id != current_user_id || new.channel_id.is_some() {
            return;
        }

        if let Some(guild_id) = new.guild_id {
            info!(
                "🔌 Bot fuera del canal de voz en guild {} (antes: {:?})",
                guild_id,
                old.and_then(|state| state.channel_id)
            );
            self.session.connection_lost(guild_id).await;
        }
    }
}
