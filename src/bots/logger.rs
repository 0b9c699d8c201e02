//! Message logger: posts deleted and edited messages to a log channel.

use async_trait::async_trait;
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error};

use super::{BotError, EventListener};
use crate::commands::{CommandSet, CommandSpec, OptionKind, OptionSpec};
use crate::platform::{
    Attachment, ChannelId, Embed, InboundEvent, MessageSnapshot, Permission, Platform,
    PlatformError, Reply, COLOR_OK,
};
use crate::router::{CommandHandler, CommandRouter, HandlerContext, ReplyStyle};
use crate::settings::{LogSettings, SettingsStore};

const NO_CONTENT: &str = "*No content*";
const FIELD_LIMIT: usize = 1024;

pub fn commands() -> Vec<CommandSpec> {
    vec![CommandSpec::new("setlog", "Set the channel where logs will be sent")
        .permission(Permission::ManageGuild)
        .option(OptionSpec::new("channel", "Log channel", OptionKind::Channel).required())]
}

pub fn build(
    platform: Arc<dyn Platform>,
    style: ReplyStyle,
    settings_path: PathBuf,
) -> Result<(CommandRouter, MessageLogger), BotError> {
    let store = Arc::new(SettingsStore::open(settings_path)?);
    let footer = style.footer().map(str::to_string);

    let mut router = CommandRouter::new(CommandSet::new(commands())?, platform).with_style(style);
    router.register(
        "setlog",
        Box::new(SetLog {
            store: store.clone(),
        }),
    )?;
    Ok((router, MessageLogger { store, footer }))
}

fn log_embed(title: &str, description: String, footer: Option<&str>) -> Embed {
    Embed::new()
        .title(title)
        .description(description)
        .color(COLOR_OK)
        .timestamp(Utc::now())
        .footer(footer)
}

/// Truncate to at most `limit` bytes on a char boundary.
fn truncate(s: &str, limit: usize) -> &str {
    if s.len() <= limit {
        return s;
    }
    let mut end = limit;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Images become the embed image, everything else is listed by url.
fn attach(mut embed: Embed, attachments: &[Attachment]) -> Embed {
    let mut files = Vec::new();
    for att in attachments {
        let is_image = att
            .content_type
            .as_deref()
            .is_some_and(|t| t.starts_with("image/"));
        if is_image && embed.image.is_none() {
            embed = embed.image(att.url.clone());
        } else if !is_image {
            files.push(att.url.as_str());
        }
    }
    if !files.is_empty() {
        let joined = files.join("\n");
        embed = embed.field("📎 Attachments", truncate(&joined, FIELD_LIMIT));
    }
    embed
}

fn content_or_placeholder(content: Option<&str>) -> &str {
    match content {
        Some(c) if !c.is_empty() => c,
        _ => NO_CONTENT,
    }
}

pub fn deleted_embed(message: &MessageSnapshot, footer: Option<&str>) -> Embed {
    let description = format!(
        "**Author:** {}\n**Channel:** <#{}>\n\n**Content:**\n{}",
        message.author_tag.as_deref().unwrap_or("Unknown"),
        message.channel_id,
        content_or_placeholder(message.content.as_deref()),
    );
    attach(
        log_embed("🗑️ Message Deleted", description, footer),
        &message.attachments,
    )
}

pub fn edited_embed(
    before: Option<&MessageSnapshot>,
    after: &MessageSnapshot,
    footer: Option<&str>,
) -> Embed {
    let description = format!(
        "**Author:** {}\n**Channel:** <#{}>\n\n**Before:**\n{}\n\n**After:**\n{}",
        after.author_tag.as_deref().unwrap_or("Unknown"),
        after.channel_id,
        content_or_placeholder(before.and_then(|b| b.content.as_deref())),
        content_or_placeholder(after.content.as_deref()),
    );
    attach(
        log_embed("✏️ Message Edited", description, footer),
        &after.attachments,
    )
}

pub struct SetLog {
    store: Arc<SettingsStore<LogSettings>>,
}

#[async_trait]
impl CommandHandler for SetLog {
    async fn run(&self, ctx: &HandlerContext<'_>) -> Result<Reply, PlatformError> {
        let Some(channel) = ctx.interaction.channel_option("channel") else {
            return Ok(ctx.error("❌ Invalid channel").ephemeral());
        };
        if let Err(e) = self
            .store
            .update(|s| s.log_channel_id = Some(channel))
            .await
        {
            error!(error = %e, "failed to save log channel");
            return Ok(ctx.error("❌ Couldn’t save the log channel.").ephemeral());
        }
        Ok(Reply::embed(log_embed(
            "✅ Log channel set!",
            format!("Logs will go to <#{}>", channel),
            ctx.style.footer(),
        )))
    }
}

pub struct MessageLogger {
    store: Arc<SettingsStore<LogSettings>>,
    footer: Option<String>,
}

impl MessageLogger {
    async fn post(&self, platform: &dyn Platform, channel: ChannelId, embed: Embed) {
        if let Err(e) = platform.send_embed(channel, embed).await {
            debug!(channel = %channel, error = %e, "failed to post log entry");
        }
    }
}

#[async_trait]
impl EventListener for MessageLogger {
    async fn on_event(&self, platform: &dyn Platform, event: &InboundEvent) {
        let Some(log_channel) = self.store.get().await.log_channel_id else {
            return;
        };
        match event {
            InboundEvent::MessageDeleted(message) if message.guild_id.is_some() => {
                let embed = deleted_embed(message, self.footer.as_deref());
                self.post(platform, log_channel, embed).await;
            }
            InboundEvent::MessageEdited { before, after } if after.guild_id.is_some() => {
                let old = before.as_ref().and_then(|b| b.content.as_deref());
                if old == after.content.as_deref() {
                    return;
                }
                let embed = edited_embed(before.as_ref(), after, self.footer.as_deref());
                self.post(platform, log_channel, embed).await;
            }
            _ => {}
        }
    }
}
