//! Moderation bot: member, role and channel moderation commands.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::sync::Arc;

use super::BotError;
use crate::commands::{CommandSet, CommandSpec, OptionKind, OptionSpec};
use crate::platform::{ModAction, Permission, Platform, PlatformError, Reply};
use crate::router::{CommandHandler, CommandRouter, HandlerContext};

pub const MAX_TIMEOUT_MINUTES: i64 = 40_320;
pub const MAX_SLOWMODE_SECONDS: i64 = 21_600;
pub const MAX_PURGE: i64 = 100;

pub fn commands() -> Vec<CommandSpec> {
    vec![
        CommandSpec::new("ping", "Replies with Pong!"),
        CommandSpec::new("kick", "Kick a member")
            .permission(Permission::KickMembers)
            .targets_member("User to kick"),
        CommandSpec::new("ban", "Ban a member")
            .permission(Permission::BanMembers)
            .targets_member("User to ban")
            .option(OptionSpec::new("reason", "Reason for the ban", OptionKind::String)),
        CommandSpec::new("unban", "Unban a user")
            .permission(Permission::BanMembers)
            .option(OptionSpec::new("user", "User to unban", OptionKind::User).required()),
        CommandSpec::new("timeout", "Timeout a member")
            .permission(Permission::ModerateMembers)
            .targets_member("User to timeout")
            .option(
                OptionSpec::new("minutes", "Duration in minutes", OptionKind::Integer)
                    .required()
                    .range(1, MAX_TIMEOUT_MINUTES),
            ),
        CommandSpec::new("untimeout", "Remove a member's timeout")
            .permission(Permission::ModerateMembers)
            .targets_member("User to release"),
        CommandSpec::new("role", "Give or take a role from a member")
            .permission(Permission::ManageRoles)
            .targets_member("Member")
            .option(OptionSpec::new("role", "Role to toggle", OptionKind::Role).required()),
        CommandSpec::new("slowmode", "Set channel slowmode")
            .permission(Permission::ManageChannels)
            .option(
                OptionSpec::new("seconds", "Seconds between messages, 0 to disable", OptionKind::Integer)
                    .required()
                    .range(0, MAX_SLOWMODE_SECONDS),
            )
            .option(OptionSpec::new("channel", "Channel (defaults to this one)", OptionKind::Channel)),
        CommandSpec::new("purge", "Bulk delete recent messages")
            .permission(Permission::ManageMessages)
            .option(
                OptionSpec::new("amount", "Number of messages", OptionKind::Integer)
                    .required()
                    .range(1, MAX_PURGE),
            ),
    ]
}

pub fn router(platform: Arc<dyn Platform>) -> Result<CommandRouter, BotError> {
    let mut router = CommandRouter::new(CommandSet::new(commands())?, platform);
    router.register("ping", Box::new(Ping))?;
    router.register("kick", Box::new(Kick))?;
    router.register("ban", Box::new(Ban))?;
    router.register("unban", Box::new(Unban))?;
    router.register("timeout", Box::new(Timeout))?;
    router.register("untimeout", Box::new(Untimeout))?;
    router.register("role", Box::new(RoleToggle))?;
    router.register("slowmode", Box::new(Slowmode))?;
    router.register("purge", Box::new(Purge))?;
    Ok(router)
}

fn required_integer(ctx: &HandlerContext<'_>, name: &str) -> Result<i64, PlatformError> {
    ctx.interaction
        .integer_option(name)
        .ok_or_else(|| PlatformError::MissingOption(name.to_string()))
}

pub struct Ping;

#[async_trait]
impl CommandHandler for Ping {
    async fn run(&self, ctx: &HandlerContext<'_>) -> Result<Reply, PlatformError> {
        Ok(ctx.ok("🏓 Pong!"))
    }
}

pub struct Kick;

#[async_trait]
impl CommandHandler for Kick {
    async fn run(&self, ctx: &HandlerContext<'_>) -> Result<Reply, PlatformError> {
        let target = ctx.target()?;
        ctx.platform
            .perform(
                ctx.guild_id()?,
                ModAction::Kick {
                    user_id: target.user_id,
                },
            )
            .await?;
        Ok(ctx.ok(&format!("👢 Kicked {}", target.tag)))
    }
}

/// Shared with the addcommands bot.
pub struct Ban;

#[async_trait]
impl CommandHandler for Ban {
    async fn run(&self, ctx: &HandlerContext<'_>) -> Result<Reply, PlatformError> {
        let target = ctx.target()?;
        let reason = ctx.interaction.string_option("reason").map(str::to_string);
        ctx.platform
            .perform(
                ctx.guild_id()?,
                ModAction::Ban {
                    user_id: target.user_id,
                    reason,
                },
            )
            .await?;
        Ok(ctx.ok(&format!("🔨 Banned {}", target.tag)))
    }
}

pub struct Unban;

#[async_trait]
impl CommandHandler for Unban {
    async fn run(&self, ctx: &HandlerContext<'_>) -> Result<Reply, PlatformError> {
        // Banned users are not members, so no member resolution here.
        let user_id = ctx
            .interaction
            .user_option("user")
            .ok_or_else(|| PlatformError::MissingOption("user".to_string()))?;
        ctx.platform
            .perform(ctx.guild_id()?, ModAction::Unban { user_id })
            .await?;
        Ok(ctx.ok(&format!("♻️ Unbanned <@{}>", user_id)))
    }
}

pub struct Timeout;

#[async_trait]
impl CommandHandler for Timeout {
    async fn run(&self, ctx: &HandlerContext<'_>) -> Result<Reply, PlatformError> {
        let target = ctx.target()?;
        let minutes = required_integer(ctx, "minutes")?;
        if !(1..=MAX_TIMEOUT_MINUTES).contains(&minutes) {
            return Ok(ctx
                .error(&format!(
                    "❌ Minutes must be between 1 and {}.",
                    MAX_TIMEOUT_MINUTES
                ))
                .ephemeral());
        }
        let until = Utc::now() + Duration::minutes(minutes);
        ctx.platform
            .perform(
                ctx.guild_id()?,
                ModAction::Timeout {
                    user_id: target.user_id,
                    until,
                },
            )
            .await?;
        Ok(ctx.ok(&format!(
            "⏳ Timed out {} for {} minutes",
            target.tag, minutes
        )))
    }
}

pub struct Untimeout;

#[async_trait]
impl CommandHandler for Untimeout {
    async fn run(&self, ctx: &HandlerContext<'_>) -> Result<Reply, PlatformError> {
        let target = ctx.target()?;
        ctx.platform
            .perform(
                ctx.guild_id()?,
                ModAction::ClearTimeout {
                    user_id: target.user_id,
                },
            )
            .await?;
        Ok(ctx.ok(&format!("✅ Removed timeout from {}", target.tag)))
    }
}

/// Adds the role when the member lacks it, removes it otherwise.
pub struct RoleToggle;

#[async_trait]
impl CommandHandler for RoleToggle {
    async fn run(&self, ctx: &HandlerContext<'_>) -> Result<Reply, PlatformError> {
        let target = ctx.target()?;
        let role_id = ctx
            .interaction
            .role_option("role")
            .ok_or_else(|| PlatformError::MissingOption("role".to_string()))?;
        let guild_id = ctx.guild_id()?;

        if target.roles.contains(&role_id) {
            ctx.platform
                .perform(
                    guild_id,
                    ModAction::RemoveRole {
                        user_id: target.user_id,
                        role_id,
                    },
                )
                .await?;
            Ok(ctx.ok(&format!("➖ Removed <@&{}> from {}", role_id, target.tag)))
        } else {
            ctx.platform
                .perform(
                    guild_id,
                    ModAction::AddRole {
                        user_id: target.user_id,
                        role_id,
                    },
                )
                .await?;
            Ok(ctx.ok(&format!("➕ Gave <@&{}> to {}", role_id, target.tag)))
        }
    }
}

pub struct Slowmode;

#[async_trait]
impl CommandHandler for Slowmode {
    async fn run(&self, ctx: &HandlerContext<'_>) -> Result<Reply, PlatformError> {
        let seconds = required_integer(ctx, "seconds")?;
        let seconds = match u16::try_from(seconds) {
            Ok(s) if i64::from(s) <= MAX_SLOWMODE_SECONDS => s,
            _ => {
                return Ok(ctx
                    .error(&format!(
                        "❌ Slowmode must be between 0 and {} seconds.",
                        MAX_SLOWMODE_SECONDS
                    ))
                    .ephemeral())
            }
        };
        let channel_id = ctx
            .interaction
            .channel_option("channel")
            .unwrap_or(ctx.interaction.channel_id);
        ctx.platform
            .perform(
                ctx.guild_id()?,
                ModAction::Slowmode {
                    channel_id,
                    seconds,
                },
            )
            .await?;
        if seconds == 0 {
            Ok(ctx.ok(&format!("🐇 Slowmode disabled in <#{}>", channel_id)))
        } else {
            Ok(ctx.ok(&format!(
                "🐢 Slowmode set to {}s in <#{}>",
                seconds, channel_id
            )))
        }
    }
}

pub struct Purge;

#[async_trait]
impl CommandHandler for Purge {
    async fn run(&self, ctx: &HandlerContext<'_>) -> Result<Reply, PlatformError> {
        let amount = required_integer(ctx, "amount")?;
        let count = match u8::try_from(amount) {
            Ok(n) if (1..=MAX_PURGE).contains(&i64::from(n)) => n,
            _ => {
                return Ok(ctx
                    .error(&format!("❌ Amount must be between 1 and {}.", MAX_PURGE))
                    .ephemeral())
            }
        };
        ctx.platform
            .perform(
                ctx.guild_id()?,
                ModAction::BulkDelete {
                    channel_id: ctx.interaction.channel_id,
                    count,
                },
            )
            .await?;
        Ok(ctx.ok(&format!("🧹 Deleted {} messages", count)).ephemeral())
    }
}
