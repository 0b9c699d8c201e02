//! Messaging-platform boundary.
//!
//! Everything the bots need from the chat platform goes through the
//! [`Platform`] trait: command registration, interaction replies, member and
//! channel lookups, moderation calls and channel posts. Inbound traffic is
//! normalised into [`InboundEvent`] so routing and handlers never see the
//! transport types. The production implementation lives in `discord.rs`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::commands::CommandSpec;

macro_rules! snowflake {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

snowflake!(UserId);
snowflake!(GuildId);
snowflake!(ChannelId);
snowflake!(RoleId);

/// Errors from platform calls.
#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    #[error("platform request failed: {0}")]
    Request(String),
    #[error("platform refused the action: {0}")]
    Forbidden(String),
    #[error("platform session not ready")]
    NotReady,
    #[error("command used outside a guild")]
    NoGuild,
    #[error("missing option: {0}")]
    MissingOption(String),
}

/// Capability flags a command may require from its invoker.
///
/// Bit values follow the Discord permission layout so the adapter can pass
/// the raw member permission bits straight through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    KickMembers,
    BanMembers,
    Administrator,
    ManageChannels,
    ManageGuild,
    ManageMessages,
    ManageRoles,
    ModerateMembers,
}

impl Permission {
    pub fn bit(self) -> u64 {
        match self {
            Permission::KickMembers => 1 << 1,
            Permission::BanMembers => 1 << 2,
            Permission::Administrator => 1 << 3,
            Permission::ManageChannels => 1 << 4,
            Permission::ManageGuild => 1 << 5,
            Permission::ManageMessages => 1 << 13,
            Permission::ManageRoles => 1 << 28,
            Permission::ModerateMembers => 1 << 40,
        }
    }

    /// Human readable name used in rejection replies and logs.
    pub fn label(self) -> &'static str {
        match self {
            Permission::KickMembers => "Kick Members",
            Permission::BanMembers => "Ban Members",
            Permission::Administrator => "Administrator",
            Permission::ManageChannels => "Manage Channels",
            Permission::ManageGuild => "Manage Server",
            Permission::ManageMessages => "Manage Messages",
            Permission::ManageRoles => "Manage Roles",
            Permission::ModerateMembers => "Timeout Members",
        }
    }
}

/// The permission bits held by an invoking member.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionSet(pub u64);

impl PermissionSet {
    pub fn empty() -> Self {
        Self(0)
    }

    pub fn of(perms: &[Permission]) -> Self {
        Self(perms.iter().fold(0, |acc, p| acc | p.bit()))
    }

    /// Administrator implies every other capability.
    pub fn has(&self, perm: Permission) -> bool {
        let admin = Permission::Administrator.bit();
        self.0 & admin == admin || self.0 & perm.bit() == perm.bit()
    }
}

/// A resolved option value as delivered with a command invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum OptionValue {
    String(String),
    Integer(i64),
    Number(f64),
    Boolean(bool),
    User(UserId),
    Channel(ChannelId),
    Role(RoleId),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommandOption {
    pub name: String,
    pub value: OptionValue,
}

/// The principal behind an interaction.
#[derive(Debug, Clone, PartialEq)]
pub struct Invoker {
    pub user_id: UserId,
    pub tag: String,
    /// Empty outside guilds.
    pub permissions: PermissionSet,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InteractionKind {
    Command {
        name: String,
        options: Vec<CommandOption>,
    },
    MenuSelect {
        custom_id: String,
        values: Vec<String>,
    },
    /// Buttons, autocomplete, modals and anything else the bots never declare.
    Other,
}

/// An inbound interaction event.
#[derive(Debug, Clone, PartialEq)]
pub struct Interaction {
    pub id: u64,
    pub token: String,
    pub guild_id: Option<GuildId>,
    pub channel_id: ChannelId,
    pub invoker: Invoker,
    pub kind: InteractionKind,
}

impl Interaction {
    pub fn option(&self, name: &str) -> Option<&OptionValue> {
        match &self.kind {
            InteractionKind::Command { options, .. } => options
                .iter()
                .find(|o| o.name == name)
                .map(|o| &o.value),
            _ => None,
        }
    }

    pub fn string_option(&self, name: &str) -> Option<&str> {
        match self.option(name) {
            Some(OptionValue::String(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn integer_option(&self, name: &str) -> Option<i64> {
        match self.option(name) {
            Some(OptionValue::Integer(i)) => Some(*i),
            _ => None,
        }
    }

    pub fn user_option(&self, name: &str) -> Option<UserId> {
        match self.option(name) {
            Some(OptionValue::User(u)) => Some(*u),
            _ => None,
        }
    }

    pub fn channel_option(&self, name: &str) -> Option<ChannelId> {
        match self.option(name) {
            Some(OptionValue::Channel(c)) => Some(*c),
            _ => None,
        }
    }

    pub fn role_option(&self, name: &str) -> Option<RoleId> {
        match self.option(name) {
            Some(OptionValue::Role(r)) => Some(*r),
            _ => None,
        }
    }
}

/// A live guild member returned by a lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct MemberRef {
    pub user_id: UserId,
    pub tag: String,
    pub roles: Vec<RoleId>,
}

/// Member join/leave payload.
#[derive(Debug, Clone, PartialEq)]
pub struct GuildMember {
    pub guild_id: GuildId,
    pub guild_name: String,
    pub guild_icon: Option<String>,
    pub user_id: UserId,
    pub tag: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Attachment {
    pub url: String,
    pub content_type: Option<String>,
}

/// What is known about a message at edit/delete time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageSnapshot {
    pub guild_id: Option<GuildId>,
    pub channel_id: ChannelId,
    pub author_tag: Option<String>,
    pub content: Option<String>,
    pub attachments: Vec<Attachment>,
}

impl Default for ChannelId {
    fn default() -> Self {
        ChannelId(0)
    }
}

/// Normalised inbound traffic from the platform session.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    Ready { bot_tag: String },
    Interaction(Interaction),
    MemberJoined(GuildMember),
    MemberLeft(GuildMember),
    MessageEdited {
        before: Option<MessageSnapshot>,
        after: MessageSnapshot,
    },
    MessageDeleted(MessageSnapshot),
}

pub const COLOR_OK: u32 = 0x00ff00;
pub const COLOR_ERROR: u32 = 0xff0000;
pub const COLOR_INFO: u32 = 0x0099ff;

#[derive(Debug, Clone, PartialEq)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Embed {
    pub title: Option<String>,
    pub description: Option<String>,
    pub color: Option<u32>,
    pub thumbnail: Option<String>,
    pub image: Option<String>,
    pub fields: Vec<EmbedField>,
    pub footer: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl Embed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn color(mut self, color: u32) -> Self {
        self.color = Some(color);
        self
    }

    pub fn thumbnail(mut self, url: impl Into<String>) -> Self {
        self.thumbnail = Some(url.into());
        self
    }

    pub fn image(mut self, url: impl Into<String>) -> Self {
        self.image = Some(url.into());
        self
    }

    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push(EmbedField {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    pub fn footer(mut self, text: Option<&str>) -> Self {
        self.footer = text.map(str::to_string);
        self
    }

    pub fn timestamp(mut self, at: DateTime<Utc>) -> Self {
        self.timestamp = Some(at);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MenuOption {
    pub label: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectMenu {
    pub custom_id: String,
    pub placeholder: String,
    pub min_values: u8,
    pub max_values: u8,
    pub options: Vec<MenuOption>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyKind {
    /// A fresh response message.
    Message,
    /// Acknowledge a menu selection by editing the message that carried it.
    UpdateMenu,
}

/// The single response produced for a handled interaction.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub kind: ReplyKind,
    pub content: Option<String>,
    pub embed: Option<Embed>,
    pub ephemeral: bool,
    pub menu: Option<SelectMenu>,
}

impl Reply {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            kind: ReplyKind::Message,
            content: Some(content.into()),
            embed: None,
            ephemeral: false,
            menu: None,
        }
    }

    pub fn embed(embed: Embed) -> Self {
        Self {
            kind: ReplyKind::Message,
            content: None,
            embed: Some(embed),
            ephemeral: false,
            menu: None,
        }
    }

    /// Replace the menu message with plain text and drop its components.
    pub fn menu_update(content: impl Into<String>) -> Self {
        Self {
            kind: ReplyKind::UpdateMenu,
            content: Some(content.into()),
            embed: None,
            ephemeral: false,
            menu: None,
        }
    }

    pub fn ephemeral(mut self) -> Self {
        self.ephemeral = true;
        self
    }

    pub fn with_menu(mut self, menu: SelectMenu) -> Self {
        self.menu = Some(menu);
        self
    }

    /// Text of the reply, whether carried as content or embed description.
    pub fn body(&self) -> &str {
        self.content
            .as_deref()
            .or_else(|| self.embed.as_ref().and_then(|e| e.description.as_deref()))
            .unwrap_or_default()
    }
}

/// A side-effecting moderation call. Each is a single platform request.
#[derive(Debug, Clone, PartialEq)]
pub enum ModAction {
    Kick {
        user_id: UserId,
    },
    Ban {
        user_id: UserId,
        reason: Option<String>,
    },
    Unban {
        user_id: UserId,
    },
    Timeout {
        user_id: UserId,
        until: DateTime<Utc>,
    },
    ClearTimeout {
        user_id: UserId,
    },
    AddRole {
        user_id: UserId,
        role_id: RoleId,
    },
    RemoveRole {
        user_id: UserId,
        role_id: RoleId,
    },
    Slowmode {
        channel_id: ChannelId,
        seconds: u16,
    },
    BulkDelete {
        channel_id: ChannelId,
        count: u8,
    },
}

impl ModAction {
    pub fn name(&self) -> &'static str {
        match self {
            ModAction::Kick { .. } => "kick",
            ModAction::Ban { .. } => "ban",
            ModAction::Unban { .. } => "unban",
            ModAction::Timeout { .. } => "timeout",
            ModAction::ClearTimeout { .. } => "clear_timeout",
            ModAction::AddRole { .. } => "add_role",
            ModAction::RemoveRole { .. } => "remove_role",
            ModAction::Slowmode { .. } => "slowmode",
            ModAction::BulkDelete { .. } => "bulk_delete",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    Playing,
    Listening,
    Watching,
    Competing,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatusLine {
    pub text: String,
    pub activity: ActivityKind,
}

/// Operations the bots perform against the messaging platform.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Platform: Send + Sync {
    /// Replace the bot's global command set.
    async fn register_commands(&self, commands: &[CommandSpec]) -> Result<(), PlatformError>;

    /// Respond to an interaction. Called exactly once per handled interaction.
    async fn reply(&self, interaction: &Interaction, reply: Reply) -> Result<(), PlatformError>;

    /// Look up a live guild member; `Ok(None)` when the user is not a member.
    async fn resolve_member(
        &self,
        guild_id: GuildId,
        user_id: UserId,
    ) -> Result<Option<MemberRef>, PlatformError>;

    async fn channel_exists(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<bool, PlatformError>;

    async fn perform(&self, guild_id: GuildId, action: ModAction) -> Result<(), PlatformError>;

    async fn send_embed(&self, channel_id: ChannelId, embed: Embed) -> Result<(), PlatformError>;

    async fn set_status(&self, status: StatusLine) -> Result<(), PlatformError>;
}
