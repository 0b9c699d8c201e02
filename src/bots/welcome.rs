//! Welcome bot: greets joining members, says goodbye to leaving ones.

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, warn};

use super::{BotError, EventListener};
use crate::commands::{CommandSet, CommandSpec, OptionKind, OptionSpec};
use crate::platform::{
    ChannelId, Embed, GuildMember, InboundEvent, Permission, Platform, PlatformError, Reply,
    COLOR_ERROR, COLOR_OK,
};
use crate::router::{CommandHandler, CommandRouter, HandlerContext, ReplyStyle};
use crate::settings::{SettingsStore, WelcomeSettings};

pub const ADMIN_REQUIRED: &str = "❌ You need admin perms.";

pub const FORMAT_HELP: &str = "You can use these placeholders in your messages:\n• {user} → mentions the user\n• {server} → server name";

/// Setting keys as stored in the JSON document.
const WELCOME_CHANNEL: &str = "welcomeChannelId";
const GOODBYE_CHANNEL: &str = "goodbyeChannelId";
const WELCOME_MESSAGE: &str = "welcomeMessage";
const GOODBYE_MESSAGE: &str = "goodbyeMessage";

pub fn commands() -> Vec<CommandSpec> {
    vec![
        CommandSpec::new("settings", "Update welcome/goodbye settings")
            .permission(Permission::Administrator)
            .denied_message(ADMIN_REQUIRED)
            .option(
                OptionSpec::new("option", "Option to update", OptionKind::String)
                    .required()
                    .choice("welcome-channel", WELCOME_CHANNEL)
                    .choice("goodbye-channel", GOODBYE_CHANNEL)
                    .choice("welcome-message", WELCOME_MESSAGE)
                    .choice("goodbye-message", GOODBYE_MESSAGE),
            )
            .option(OptionSpec::new("value", "New value", OptionKind::String).required()),
        CommandSpec::new("format-help", "Shows how to format welcome/goodbye messages"),
    ]
}

pub fn build(
    platform: Arc<dyn Platform>,
    style: ReplyStyle,
    settings_path: PathBuf,
) -> Result<(CommandRouter, WelcomeListener), BotError> {
    let store = Arc::new(SettingsStore::open(settings_path)?);
    let footer = style.footer().map(str::to_string);

    let mut router = CommandRouter::new(CommandSet::new(commands())?, platform).with_style(style);
    router.register(
        "settings",
        Box::new(UpdateSettings {
            store: store.clone(),
        }),
    )?;
    router.register("format-help", Box::new(FormatHelp))?;

    Ok((router, WelcomeListener { store, footer }))
}

/// Accepts `<#123>` or a bare id.
pub fn parse_channel(value: &str) -> Option<ChannelId> {
    let raw = value.trim();
    let raw = raw
        .strip_prefix("<#")
        .and_then(|s| s.strip_suffix('>'))
        .unwrap_or(raw);
    raw.parse().ok().map(ChannelId)
}

pub fn render(template: &str, user: &str, server: &str) -> String {
    template.replace("{user}", user).replace("{server}", server)
}

pub struct UpdateSettings {
    store: Arc<SettingsStore<WelcomeSettings>>,
}

#[async_trait]
impl CommandHandler for UpdateSettings {
    async fn run(&self, ctx: &HandlerContext<'_>) -> Result<Reply, PlatformError> {
        let option = ctx
            .interaction
            .string_option("option")
            .ok_or_else(|| PlatformError::MissingOption("option".to_string()))?;
        let value = ctx
            .interaction
            .string_option("value")
            .ok_or_else(|| PlatformError::MissingOption("value".to_string()))?;

        let result = match option {
            WELCOME_CHANNEL | GOODBYE_CHANNEL => {
                let guild_id = ctx.guild_id()?;
                let Some(channel) = parse_channel(value) else {
                    return Ok(ctx.error("❌ Invalid channel.").ephemeral());
                };
                if !ctx.platform.channel_exists(guild_id, channel).await? {
                    return Ok(ctx.error("❌ Invalid channel.").ephemeral());
                }
                let welcome = option == WELCOME_CHANNEL;
                self.store
                    .update(|s| {
                        if welcome {
                            s.welcome_channel_id = Some(channel);
                        } else {
                            s.goodbye_channel_id = Some(channel);
                        }
                    })
                    .await
            }
            WELCOME_MESSAGE => {
                self.store
                    .update(|s| s.welcome_message = value.to_string())
                    .await
            }
            GOODBYE_MESSAGE => {
                self.store
                    .update(|s| s.goodbye_message = value.to_string())
                    .await
            }
            other => {
                debug!(option = %other, "unknown settings option");
                return Ok(ctx.error("❌ Unknown option.").ephemeral());
            }
        };

        match result {
            Ok(_) => Ok(ctx.ok(&format!("✅ Updated {}", option))),
            Err(e) => {
                error!(error = %e, "failed to save welcome settings");
                Ok(ctx.error("❌ Couldn’t save settings.").ephemeral())
            }
        }
    }
}

pub struct FormatHelp;

#[async_trait]
impl CommandHandler for FormatHelp {
    async fn run(&self, ctx: &HandlerContext<'_>) -> Result<Reply, PlatformError> {
        Ok(ctx.info(FORMAT_HELP))
    }
}

pub struct WelcomeListener {
    store: Arc<SettingsStore<WelcomeSettings>>,
    footer: Option<String>,
}

impl WelcomeListener {
    fn embed(&self, text: String, color: u32, member: &GuildMember) -> Embed {
        let embed = Embed::new()
            .description(text)
            .color(color)
            .footer(self.footer.as_deref());
        match &member.guild_icon {
            Some(icon) => embed.thumbnail(icon.clone()),
            None => embed,
        }
    }

    async fn send(&self, platform: &dyn Platform, channel: ChannelId, embed: Embed) {
        if let Err(e) = platform.send_embed(channel, embed).await {
            warn!(channel = %channel, error = %e, "failed to send welcome embed");
        }
    }
}

#[async_trait]
impl EventListener for WelcomeListener {
    async fn on_event(&self, platform: &dyn Platform, event: &InboundEvent) {
        let settings = self.store.get().await;
        match event {
            InboundEvent::MemberJoined(member) => {
                let Some(channel) = settings.welcome_channel_id else {
                    return;
                };
                let text = render(
                    &settings.welcome_message,
                    &format!("<@{}>", member.user_id),
                    &member.guild_name,
                );
                self.send(platform, channel, self.embed(text, COLOR_OK, member))
                    .await;
            }
            InboundEvent::MemberLeft(member) => {
                let Some(channel) = settings.goodbye_channel_id else {
                    return;
                };
                let text = render(&settings.goodbye_message, &member.tag, &member.guild_name);
                self.send(platform, channel, self.embed(text, COLOR_ERROR, member))
                    .await;
            }
            _ => {}
        }
    }
}
