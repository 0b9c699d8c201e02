//! Interaction dispatch.
//!
//! The router owns a bot's declared [`CommandSet`], registers it with the
//! platform once per session and turns each inbound interaction into exactly
//! one reply. Gates run in a fixed order before any handler code:
//! opt-in, then permission, then target member resolution.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::commands::{CommandSet, TARGET_OPTION};
use crate::metrics::DispatchMetrics;
use crate::platform::{
    Embed, GuildId, Interaction, InteractionKind, MemberRef, Platform, PlatformError, Reply,
    COLOR_ERROR, COLOR_INFO, COLOR_OK,
};
use crate::selection::SelectionStore;

pub const PERMISSION_DENIED: &str = "❌ You don’t got perms for that.";
pub const NOT_OPTED_IN: &str = "❌ You haven’t added this command yet.";
pub const MEMBER_NOT_FOUND: &str = "❌ Couldn’t find that member.";
pub const COMMAND_FAILED: &str = "❌ Something went wrong running that command.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Not a command invocation or menu selection.
    NotCommand,
    UnknownCommand(String),
    UnknownMenu(String),
}

/// Terminal state of one `handle` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// No reply was sent.
    Ignored(IgnoreReason),
    /// Opt-in or permission gate refused the invoker.
    Rejected,
    /// The `target` member could not be resolved.
    NotFound,
    Executed,
    /// The handler returned an error and a generic failure reply was sent.
    Failed,
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum RouterError {
    #[error("handler registered for undeclared command: {0}")]
    Undeclared(String),
}

/// How notices are rendered: bare text, or a coloured embed with footer.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum ReplyStyle {
    #[default]
    Plain,
    Embed { footer: Option<String> },
}

impl ReplyStyle {
    pub fn notice(&self, text: &str, color: u32) -> Reply {
        match self {
            ReplyStyle::Plain => Reply::text(text),
            ReplyStyle::Embed { footer } => Reply::embed(
                Embed::new()
                    .description(text)
                    .color(color)
                    .footer(footer.as_deref()),
            ),
        }
    }

    pub fn footer(&self) -> Option<&str> {
        match self {
            ReplyStyle::Plain => None,
            ReplyStyle::Embed { footer } => footer.as_deref(),
        }
    }
}

/// What a handler gets to work with.
pub struct HandlerContext<'a> {
    pub interaction: &'a Interaction,
    /// Resolved `target` member, set for member-targeting commands.
    pub target: Option<MemberRef>,
    pub platform: &'a dyn Platform,
    pub selections: &'a SelectionStore,
    pub style: &'a ReplyStyle,
}

impl<'a> HandlerContext<'a> {
    pub fn new(
        interaction: &'a Interaction,
        platform: &'a dyn Platform,
        selections: &'a SelectionStore,
        style: &'a ReplyStyle,
    ) -> Self {
        Self {
            interaction,
            target: None,
            platform,
            selections,
            style,
        }
    }

    pub fn with_target(mut self, target: MemberRef) -> Self {
        self.target = Some(target);
        self
    }

    pub fn guild_id(&self) -> Result<GuildId, PlatformError> {
        self.interaction.guild_id.ok_or(PlatformError::NoGuild)
    }

    pub fn target(&self) -> Result<&MemberRef, PlatformError> {
        self.target
            .as_ref()
            .ok_or_else(|| PlatformError::MissingOption(TARGET_OPTION.to_string()))
    }

    pub fn ok(&self, text: &str) -> Reply {
        self.style.notice(text, COLOR_OK)
    }

    pub fn error(&self, text: &str) -> Reply {
        self.style.notice(text, COLOR_ERROR)
    }

    pub fn info(&self, text: &str) -> Reply {
        self.style.notice(text, COLOR_INFO)
    }
}

/// Body of a slash command.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn run(&self, ctx: &HandlerContext<'_>) -> Result<Reply, PlatformError>;
}

/// Callback for a select menu, keyed by its custom id.
#[async_trait]
pub trait MenuHandler: Send + Sync {
    async fn select(
        &self,
        ctx: &HandlerContext<'_>,
        values: &[String],
    ) -> Result<Reply, PlatformError>;
}

pub struct CommandRouter {
    commands: CommandSet,
    handlers: HashMap<String, Box<dyn CommandHandler>>,
    menus: HashMap<String, Box<dyn MenuHandler>>,
    platform: Arc<dyn Platform>,
    selections: Arc<SelectionStore>,
    metrics: Arc<DispatchMetrics>,
    style: ReplyStyle,
}

impl CommandRouter {
    pub fn new(commands: CommandSet, platform: Arc<dyn Platform>) -> Self {
        Self {
            commands,
            handlers: HashMap::new(),
            menus: HashMap::new(),
            platform,
            selections: Arc::new(SelectionStore::new()),
            metrics: Arc::new(DispatchMetrics::new()),
            style: ReplyStyle::default(),
        }
    }

    pub fn with_style(mut self, style: ReplyStyle) -> Self {
        self.style = style;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<DispatchMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Attach a handler to a declared command.
    pub fn register(
        &mut self,
        name: &str,
        handler: Box<dyn CommandHandler>,
    ) -> Result<(), RouterError> {
        if self.commands.get(name).is_none() {
            return Err(RouterError::Undeclared(name.to_string()));
        }
        debug!(command = %name, "registering handler");
        self.handlers.insert(name.to_string(), handler);
        Ok(())
    }

    pub fn register_menu(&mut self, custom_id: &str, handler: Box<dyn MenuHandler>) {
        debug!(menu = %custom_id, "registering menu handler");
        self.menus.insert(custom_id.to_string(), handler);
    }

    /// Declared commands that have no handler; these dispatch as unknown.
    pub fn unhandled(&self) -> Vec<&str> {
        self.commands
            .names()
            .into_iter()
            .filter(|n| !self.handlers.contains_key(*n))
            .collect()
    }

    pub fn commands(&self) -> &CommandSet {
        &self.commands
    }

    pub fn selections(&self) -> &SelectionStore {
        &self.selections
    }

    pub fn metrics(&self) -> Arc<DispatchMetrics> {
        self.metrics.clone()
    }

    pub fn style(&self) -> &ReplyStyle {
        &self.style
    }

    /// Replace the global command registration. Returns whether it succeeded;
    /// failure leaves the previous registration in place.
    pub async fn sync(&self) -> bool {
        match self.platform.register_commands(self.commands.specs()).await {
            Ok(()) => {
                info!(count = self.commands.len(), "slash commands registered (global)");
                true
            }
            Err(e) => {
                error!(error = %e, "error registering slash commands");
                false
            }
        }
    }

    pub async fn handle(&self, interaction: &Interaction) -> Dispatch {
        let outcome = match &interaction.kind {
            InteractionKind::Command { name, .. } => self.dispatch_command(interaction, name).await,
            InteractionKind::MenuSelect { custom_id, values } => {
                self.dispatch_menu(interaction, custom_id, values).await
            }
            InteractionKind::Other => Dispatch::Ignored(IgnoreReason::NotCommand),
        };
        self.metrics.record(&outcome);
        outcome
    }

    async fn dispatch_command(&self, interaction: &Interaction, name: &str) -> Dispatch {
        let user = interaction.invoker.user_id;
        let (spec, handler) = match (self.commands.get(name), self.handlers.get(name)) {
            (Some(spec), Some(handler)) => (spec, handler),
            _ => {
                warn!(command = %name, user = %user, "unknown command, ignoring");
                return Dispatch::Ignored(IgnoreReason::UnknownCommand(name.to_string()));
            }
        };

        if spec.requires_opt_in && !self.selections.has(user, name).await {
            info!(command = %name, user = %user, "command not added by user");
            self.respond(interaction, self.style.notice(NOT_OPTED_IN, COLOR_ERROR).ephemeral())
                .await;
            return Dispatch::Rejected;
        }

        if let Some(permission) = spec.permission {
            if !interaction.invoker.permissions.has(permission) {
                info!(
                    command = %name,
                    user = %user,
                    permission = permission.label(),
                    "permission denied"
                );
                self.respond(
                    interaction,
                    self.style
                        .notice(
                            spec.denied_message.as_deref().unwrap_or(PERMISSION_DENIED),
                            COLOR_ERROR,
                        )
                        .ephemeral(),
                )
                .await;
                return Dispatch::Rejected;
            }
        }

        let mut ctx = HandlerContext::new(
            interaction,
            self.platform.as_ref(),
            &self.selections,
            &self.style,
        );

        if spec.acts_on_member {
            match self.resolve_target(interaction).await {
                Some(member) => ctx = ctx.with_target(member),
                None => {
                    self.respond(interaction, self.style.notice(MEMBER_NOT_FOUND, COLOR_ERROR))
                        .await;
                    return Dispatch::NotFound;
                }
            }
        }

        match handler.run(&ctx).await {
            Ok(reply) => {
                self.respond(interaction, reply).await;
                Dispatch::Executed
            }
            Err(e) => {
                error!(command = %name, user = %user, error = %e, "command failed");
                self.respond(interaction, self.style.notice(COMMAND_FAILED, COLOR_ERROR).ephemeral())
                    .await;
                Dispatch::Failed
            }
        }
    }

    async fn dispatch_menu(
        &self,
        interaction: &Interaction,
        custom_id: &str,
        values: &[String],
    ) -> Dispatch {
        let Some(handler) = self.menus.get(custom_id) else {
            warn!(menu = %custom_id, user = %interaction.invoker.user_id, "unknown menu, ignoring");
            return Dispatch::Ignored(IgnoreReason::UnknownMenu(custom_id.to_string()));
        };

        let ctx = HandlerContext::new(
            interaction,
            self.platform.as_ref(),
            &self.selections,
            &self.style,
        );
        match handler.select(&ctx, values).await {
            Ok(reply) => {
                self.respond(interaction, reply).await;
                Dispatch::Executed
            }
            Err(e) => {
                error!(menu = %custom_id, error = %e, "menu handler failed");
                self.respond(interaction, self.style.notice(COMMAND_FAILED, COLOR_ERROR).ephemeral())
                    .await;
                Dispatch::Failed
            }
        }
    }

    async fn resolve_target(&self, interaction: &Interaction) -> Option<MemberRef> {
        let guild_id = interaction.guild_id?;
        let user_id = interaction.user_option(TARGET_OPTION)?;
        match self.platform.resolve_member(guild_id, user_id).await {
            Ok(member) => member,
            Err(e) => {
                warn!(guild = %guild_id, user = %user_id, error = %e, "member lookup failed");
                None
            }
        }
    }

    async fn respond(&self, interaction: &Interaction, reply: Reply) {
        if let Err(e) = self.platform.reply(interaction, reply).await {
            warn!(interaction = interaction.id, error = %e, "failed to send reply");
        }
    }
}
