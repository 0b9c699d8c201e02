//! Add-commands bot: users opt into prebuilt commands through a select menu.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

use super::moderation::{Ban, Ping};
use super::BotError;
use crate::commands::{CommandSet, CommandSpec};
use crate::platform::{MenuOption, Permission, Platform, PlatformError, Reply, SelectMenu};
use crate::router::{CommandHandler, CommandRouter, HandlerContext, MenuHandler, ReplyStyle};

pub const SELECT_MENU_ID: &str = "selectCommands";

/// `(label, command name)` pairs offered in the menu.
pub const PREBUILT: [(&str, &str); 3] = [("Ping", "ping"), ("Uptime", "uptime"), ("Ban", "ban")];

pub fn commands() -> Vec<CommandSpec> {
    vec![
        CommandSpec::new("addcommands", "Add prebuilt commands to your bot"),
        CommandSpec::new("ping", "Replies with Pong!").opt_in(),
        CommandSpec::new("uptime", "Shows bot uptime").opt_in(),
        CommandSpec::new("ban", "Ban a member")
            .opt_in()
            .permission(Permission::BanMembers)
            .targets_member("User to ban"),
    ]
}

pub fn router(platform: Arc<dyn Platform>, style: ReplyStyle) -> Result<CommandRouter, BotError> {
    let mut router = CommandRouter::new(CommandSet::new(commands())?, platform).with_style(style);
    router.register("addcommands", Box::new(ShowMenu))?;
    router.register("ping", Box::new(Ping))?;
    router.register(
        "uptime",
        Box::new(Uptime {
            started: Instant::now(),
        }),
    )?;
    router.register("ban", Box::new(Ban))?;
    router.register_menu(SELECT_MENU_ID, Box::new(SelectCommands));
    Ok(router)
}

pub fn menu() -> SelectMenu {
    SelectMenu {
        custom_id: SELECT_MENU_ID.to_string(),
        placeholder: "Select commands to add".to_string(),
        min_values: 1,
        max_values: PREBUILT.len() as u8,
        options: PREBUILT
            .iter()
            .map(|(label, value)| MenuOption {
                label: label.to_string(),
                value: value.to_string(),
            })
            .collect(),
    }
}

pub struct ShowMenu;

#[async_trait]
impl CommandHandler for ShowMenu {
    async fn run(&self, _ctx: &HandlerContext<'_>) -> Result<Reply, PlatformError> {
        Ok(Reply::text("Select the commands you want to add:")
            .ephemeral()
            .with_menu(menu()))
    }
}

pub struct Uptime {
    started: Instant,
}

#[async_trait]
impl CommandHandler for Uptime {
    async fn run(&self, ctx: &HandlerContext<'_>) -> Result<Reply, PlatformError> {
        let minutes = self.started.elapsed().as_secs() / 60;
        Ok(ctx.ok(&format!("⏱ Bot uptime: {} minutes", minutes)))
    }
}

pub struct SelectCommands;

#[async_trait]
impl MenuHandler for SelectCommands {
    async fn select(
        &self,
        ctx: &HandlerContext<'_>,
        values: &[String],
    ) -> Result<Reply, PlatformError> {
        let user = ctx.interaction.invoker.user_id;
        let all = ctx.selections.append(user, values).await;
        info!(user = %user, added = ?values, total = all.len(), "commands added");
        Ok(Reply::menu_update(format!("✅ You added: {}", values.join(", "))))
    }
}
