//! Discord transport built on serenity.
//!
//! [`SerenityPlatform`] implements [`Platform`] over the REST client and the
//! gateway context; [`Forwarder`] turns gateway events into
//! [`InboundEvent`]s on an mpsc channel consumed by the bot runtime.

use async_trait::async_trait;
use serenity::all as sy;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::commands::{CommandSpec, OptionKind};
use crate::config::BotKind;
use crate::platform::{
    ActivityKind, Attachment, ChannelId, CommandOption, Embed, GuildId, GuildMember, InboundEvent,
    Interaction, InteractionKind, Invoker, MemberRef, MessageSnapshot, ModAction, OptionValue,
    PermissionSet, Platform, PlatformError, Reply, ReplyKind, RoleId, SelectMenu, StatusLine,
    UserId,
};

/// Messages remembered for edit/delete logging.
const RECENT_CAPACITY: usize = 1000;
const EVENT_BUFFER: usize = 256;

pub fn intents(kind: BotKind) -> sy::GatewayIntents {
    use sy::GatewayIntents as I;
    match kind {
        BotKind::Moderation => I::GUILDS | I::GUILD_MEMBERS | I::GUILD_MESSAGES,
        BotKind::Welcome => I::GUILDS | I::GUILD_MEMBERS,
        BotKind::Logger => I::GUILDS | I::GUILD_MESSAGES | I::MESSAGE_CONTENT,
        BotKind::Addcommands => I::GUILDS | I::GUILD_MEMBERS | I::GUILD_MESSAGES,
    }
}

fn map_err(e: sy::Error) -> PlatformError {
    match status_of(&e) {
        Some(403) => PlatformError::Forbidden(e.to_string()),
        _ => PlatformError::Request(e.to_string()),
    }
}

fn status_of(e: &sy::Error) -> Option<u16> {
    match e {
        sy::Error::Http(h) => h.status_code().map(|s| s.as_u16()),
        _ => None,
    }
}

pub struct SerenityPlatform {
    http: Arc<sy::Http>,
    ctx: RwLock<Option<sy::Context>>,
}

impl SerenityPlatform {
    pub fn new(http: Arc<sy::Http>) -> Self {
        Self {
            http,
            ctx: RwLock::new(None),
        }
    }

    /// Keep the gateway context for presence updates.
    pub async fn attach(&self, ctx: sy::Context) {
        *self.ctx.write().await = Some(ctx);
    }
}

fn option_type(kind: OptionKind) -> sy::CommandOptionType {
    match kind {
        OptionKind::String => sy::CommandOptionType::String,
        OptionKind::Integer => sy::CommandOptionType::Integer,
        OptionKind::Boolean => sy::CommandOptionType::Boolean,
        OptionKind::User => sy::CommandOptionType::User,
        OptionKind::Channel => sy::CommandOptionType::Channel,
        OptionKind::Role => sy::CommandOptionType::Role,
    }
}

fn create_command(spec: &CommandSpec) -> sy::CreateCommand {
    let mut command = sy::CreateCommand::new(&spec.name).description(&spec.description);
    for opt in &spec.options {
        let mut option =
            sy::CreateCommandOption::new(option_type(opt.kind), &opt.name, &opt.description)
                .required(opt.required);
        for (label, value) in &opt.choices {
            option = option.add_string_choice(label, value);
        }
        if let Some(min) = opt.min {
            option = option.min_number_value(min as f64);
        }
        if let Some(max) = opt.max {
            option = option.max_number_value(max as f64);
        }
        command = command.add_option(option);
    }
    command
}

fn to_embed(embed: &Embed) -> sy::CreateEmbed {
    let mut out = sy::CreateEmbed::new();
    if let Some(title) = &embed.title {
        out = out.title(title);
    }
    if let Some(description) = &embed.description {
        out = out.description(description);
    }
    if let Some(color) = embed.color {
        out = out.colour(color);
    }
    if let Some(url) = &embed.thumbnail {
        out = out.thumbnail(url);
    }
    if let Some(url) = &embed.image {
        out = out.image(url);
    }
    for field in &embed.fields {
        out = out.field(&field.name, &field.value, false);
    }
    if let Some(footer) = &embed.footer {
        out = out.footer(sy::CreateEmbedFooter::new(footer));
    }
    if let Some(ts) = embed
        .timestamp
        .and_then(|at| sy::Timestamp::from_unix_timestamp(at.timestamp()).ok())
    {
        out = out.timestamp(ts);
    }
    out
}

fn to_menu(menu: &SelectMenu) -> sy::CreateActionRow {
    let options = menu
        .options
        .iter()
        .map(|o| sy::CreateSelectMenuOption::new(&o.label, &o.value))
        .collect();
    sy::CreateActionRow::SelectMenu(
        sy::CreateSelectMenu::new(&menu.custom_id, sy::CreateSelectMenuKind::String { options })
            .placeholder(&menu.placeholder)
            .min_values(menu.min_values)
            .max_values(menu.max_values),
    )
}

fn to_response(reply: &Reply) -> sy::CreateInteractionResponse {
    let mut message = sy::CreateInteractionResponseMessage::new().ephemeral(reply.ephemeral);
    if let Some(content) = &reply.content {
        message = message.content(content);
    }
    if let Some(embed) = &reply.embed {
        message = message.embed(to_embed(embed));
    }
    match reply.kind {
        ReplyKind::Message => {
            if let Some(menu) = &reply.menu {
                message = message.components(vec![to_menu(menu)]);
            }
            sy::CreateInteractionResponse::Message(message)
        }
        ReplyKind::UpdateMenu => {
            let components = reply.menu.iter().map(to_menu).collect();
            sy::CreateInteractionResponse::UpdateMessage(message.components(components))
        }
    }
}

fn activity(line: StatusLine) -> sy::ActivityData {
    match line.activity {
        ActivityKind::Playing => sy::ActivityData::playing(line.text),
        ActivityKind::Listening => sy::ActivityData::listening(line.text),
        ActivityKind::Watching => sy::ActivityData::watching(line.text),
        ActivityKind::Competing => sy::ActivityData::competing(line.text),
    }
}

#[async_trait]
impl Platform for SerenityPlatform {
    async fn register_commands(&self, commands: &[CommandSpec]) -> Result<(), PlatformError> {
        let create = commands.iter().map(create_command).collect();
        sy::Command::set_global_commands(&self.http, create)
            .await
            .map_err(map_err)?;
        Ok(())
    }

    async fn reply(&self, interaction: &Interaction, reply: Reply) -> Result<(), PlatformError> {
        self.http
            .create_interaction_response(
                sy::InteractionId::new(interaction.id),
                &interaction.token,
                &to_response(&reply),
                Vec::new(),
            )
            .await
            .map_err(map_err)
    }

    async fn resolve_member(
        &self,
        guild_id: GuildId,
        user_id: UserId,
    ) -> Result<Option<MemberRef>, PlatformError> {
        match self
            .http
            .get_member(sy::GuildId::new(guild_id.0), sy::UserId::new(user_id.0))
            .await
        {
            Ok(member) => Ok(Some(MemberRef {
                user_id,
                tag: member.user.tag(),
                roles: member.roles.iter().map(|r| RoleId(r.get())).collect(),
            })),
            Err(e) => {
                debug!(guild = %guild_id, user = %user_id, error = %e, "member lookup failed");
                Ok(None)
            }
        }
    }

    async fn channel_exists(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<bool, PlatformError> {
        let channels = self
            .http
            .get_channels(sy::GuildId::new(guild_id.0))
            .await
            .map_err(map_err)?;
        Ok(channels.iter().any(|c| c.id.get() == channel_id.0))
    }

    async fn perform(&self, guild_id: GuildId, action: ModAction) -> Result<(), PlatformError> {
        let guild = sy::GuildId::new(guild_id.0);
        let user = |u: UserId| sy::UserId::new(u.0);
        debug!(guild = %guild_id, action = action.name(), "performing moderation action");

        match action {
            ModAction::Kick { user_id } => {
                self.http.kick_member(guild, user(user_id), None).await
            }
            ModAction::Ban { user_id, reason } => {
                self.http
                    .ban_user(guild, user(user_id), 0, reason.as_deref())
                    .await
            }
            ModAction::Unban { user_id } => self.http.remove_ban(guild, user(user_id), None).await,
            ModAction::Timeout { user_id, until } => self
                .http
                .edit_member(
                    guild,
                    user(user_id),
                    &sy::EditMember::new().disable_communication_until(until.to_rfc3339()),
                    None,
                )
                .await
                .map(|_| ()),
            ModAction::ClearTimeout { user_id } => self
                .http
                .edit_member(
                    guild,
                    user(user_id),
                    &sy::EditMember::new().enable_communication(),
                    None,
                )
                .await
                .map(|_| ()),
            ModAction::AddRole { user_id, role_id } => {
                self.http
                    .add_member_role(guild, user(user_id), sy::RoleId::new(role_id.0), None)
                    .await
            }
            ModAction::RemoveRole { user_id, role_id } => {
                self.http
                    .remove_member_role(guild, user(user_id), sy::RoleId::new(role_id.0), None)
                    .await
            }
            ModAction::Slowmode {
                channel_id,
                seconds,
            } => self
                .http
                .edit_channel(
                    sy::ChannelId::new(channel_id.0),
                    &sy::EditChannel::new().rate_limit_per_user(seconds),
                    None,
                )
                .await
                .map(|_| ()),
            ModAction::BulkDelete { channel_id, count } => {
                let channel = sy::ChannelId::new(channel_id.0);
                let messages = channel
                    .messages(&self.http, sy::GetMessages::new().limit(count))
                    .await
                    .map_err(map_err)?;
                let ids: Vec<sy::MessageId> = messages.iter().map(|m| m.id).collect();
                if ids.is_empty() {
                    return Ok(());
                }
                channel.delete_messages(&self.http, ids).await
            }
        }
        .map_err(map_err)
    }

    async fn send_embed(&self, channel_id: ChannelId, embed: Embed) -> Result<(), PlatformError> {
        sy::ChannelId::new(channel_id.0)
            .send_message(&self.http, sy::CreateMessage::new().embed(to_embed(&embed)))
            .await
            .map_err(map_err)?;
        Ok(())
    }

    async fn set_status(&self, status: StatusLine) -> Result<(), PlatformError> {
        let guard = self.ctx.read().await;
        let ctx = guard.as_ref().ok_or(PlatformError::NotReady)?;
        ctx.set_activity(Some(activity(status)));
        Ok(())
    }
}

/// Bounded snapshot cache of recently seen guild messages.
pub struct RecentMessages {
    capacity: usize,
    inner: Mutex<RecentInner>,
}

#[derive(Default)]
struct RecentInner {
    by_id: HashMap<u64, MessageSnapshot>,
    order: VecDeque<u64>,
}

impl RecentMessages {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(RecentInner::default()),
        }
    }

    /// Insert or refresh; evicts the oldest entry once full.
    pub async fn record(&self, id: u64, snapshot: MessageSnapshot) {
        let mut inner = self.inner.lock().await;
        if inner.by_id.insert(id, snapshot).is_none() {
            inner.order.push_back(id);
        }
        while inner.order.len() > self.capacity {
            if let Some(old) = inner.order.pop_front() {
                inner.by_id.remove(&old);
            }
        }
    }

    pub async fn get(&self, id: u64) -> Option<MessageSnapshot> {
        self.inner.lock().await.by_id.get(&id).cloned()
    }

    pub async fn take(&self, id: u64) -> Option<MessageSnapshot> {
        let mut inner = self.inner.lock().await;
        let snapshot = inner.by_id.remove(&id)?;
        inner.order.retain(|k| *k != id);
        Some(snapshot)
    }
}

fn to_attachments(attachments: &[sy::Attachment]) -> Vec<Attachment> {
    attachments
        .iter()
        .map(|a| Attachment {
            url: a.url.clone(),
            content_type: a.content_type.clone(),
        })
        .collect()
}

fn option_value(value: &sy::CommandDataOptionValue) -> Option<OptionValue> {
    match value {
        sy::CommandDataOptionValue::String(s) => Some(OptionValue::String(s.clone())),
        sy::CommandDataOptionValue::Integer(i) => Some(OptionValue::Integer(*i)),
        sy::CommandDataOptionValue::Number(n) => Some(OptionValue::Number(*n)),
        sy::CommandDataOptionValue::Boolean(b) => Some(OptionValue::Boolean(*b)),
        sy::CommandDataOptionValue::User(u) => Some(OptionValue::User(UserId(u.get()))),
        sy::CommandDataOptionValue::Channel(c) => Some(OptionValue::Channel(ChannelId(c.get()))),
        sy::CommandDataOptionValue::Role(r) => Some(OptionValue::Role(RoleId(r.get()))),
        _ => None,
    }
}

fn invoker(user: &sy::User, member: Option<&sy::Member>) -> Invoker {
    Invoker {
        user_id: UserId(user.id.get()),
        tag: user.tag(),
        permissions: PermissionSet(
            member
                .and_then(|m| m.permissions)
                .map(|p| p.bits())
                .unwrap_or_default(),
        ),
    }
}

/// Normalise a gateway interaction. Kinds the bots never declare map to `None`.
fn to_interaction(interaction: &sy::Interaction) -> Option<Interaction> {
    match interaction {
        sy::Interaction::Command(cmd) => Some(Interaction {
            id: cmd.id.get(),
            token: cmd.token.clone(),
            guild_id: cmd.guild_id.map(|g| GuildId(g.get())),
            channel_id: ChannelId(cmd.channel_id.get()),
            invoker: invoker(&cmd.user, cmd.member.as_deref()),
            kind: InteractionKind::Command {
                name: cmd.data.name.clone(),
                options: cmd
                    .data
                    .options
                    .iter()
                    .filter_map(|o| {
                        option_value(&o.value).map(|value| CommandOption {
                            name: o.name.clone(),
                            value,
                        })
                    })
                    .collect(),
            },
        }),
        sy::Interaction::Component(component) => {
            let kind = match &component.data.kind {
                sy::ComponentInteractionDataKind::StringSelect { values } => {
                    InteractionKind::MenuSelect {
                        custom_id: component.data.custom_id.clone(),
                        values: values.clone(),
                    }
                }
                _ => InteractionKind::Other,
            };
            Some(Interaction {
                id: component.id.get(),
                token: component.token.clone(),
                guild_id: component.guild_id.map(|g| GuildId(g.get())),
                channel_id: ChannelId(component.channel_id.get()),
                invoker: invoker(&component.user, component.member.as_ref()),
                kind,
            })
        }
        _ => None,
    }
}

fn guild_member(ctx: &sy::Context, guild_id: sy::GuildId, user: &sy::User) -> GuildMember {
    let (guild_name, guild_icon) = match ctx.cache.guild(guild_id) {
        Some(guild) => (guild.name.clone(), guild.icon_url()),
        None => (String::new(), None),
    };
    GuildMember {
        guild_id: GuildId(guild_id.get()),
        guild_name,
        guild_icon,
        user_id: UserId(user.id.get()),
        tag: user.tag(),
    }
}

/// Gateway event handler feeding the bot runtime.
pub struct Forwarder {
    events: mpsc::Sender<InboundEvent>,
    platform: Arc<SerenityPlatform>,
    recent: RecentMessages,
}

impl Forwarder {
    pub fn new(events: mpsc::Sender<InboundEvent>, platform: Arc<SerenityPlatform>) -> Self {
        Self {
            events,
            platform,
            recent: RecentMessages::new(RECENT_CAPACITY),
        }
    }

    async fn forward(&self, event: InboundEvent) {
        if self.events.send(event).await.is_err() {
            warn!("bot runtime has stopped, dropping event");
        }
    }
}

#[async_trait]
impl sy::EventHandler for Forwarder {
    async fn ready(&self, ctx: sy::Context, ready: sy::Ready) {
        info!(bot = %ready.user.tag(), guilds = ready.guilds.len(), "gateway session ready");
        self.platform.attach(ctx).await;
        self.forward(InboundEvent::Ready {
            bot_tag: ready.user.tag(),
        })
        .await;
    }

    async fn interaction_create(&self, _ctx: sy::Context, interaction: sy::Interaction) {
        match to_interaction(&interaction) {
            Some(i) => self.forward(InboundEvent::Interaction(i)).await,
            None => debug!(kind = ?interaction.kind(), "ignoring interaction"),
        }
    }

    async fn guild_member_addition(&self, ctx: sy::Context, member: sy::Member) {
        let joined = guild_member(&ctx, member.guild_id, &member.user);
        self.forward(InboundEvent::MemberJoined(joined)).await;
    }

    async fn guild_member_removal(
        &self,
        ctx: sy::Context,
        guild_id: sy::GuildId,
        user: sy::User,
        _member: Option<sy::Member>,
    ) {
        let left = guild_member(&ctx, guild_id, &user);
        self.forward(InboundEvent::MemberLeft(left)).await;
    }

    async fn message(&self, _ctx: sy::Context, msg: sy::Message) {
        if msg.guild_id.is_none() {
            return;
        }
        let snapshot = MessageSnapshot {
            guild_id: msg.guild_id.map(|g| GuildId(g.get())),
            channel_id: ChannelId(msg.channel_id.get()),
            author_tag: Some(msg.author.tag()),
            content: Some(msg.content.clone()),
            attachments: to_attachments(&msg.attachments),
        };
        self.recent.record(msg.id.get(), snapshot).await;
    }

    async fn message_update(
        &self,
        _ctx: sy::Context,
        _old: Option<sy::Message>,
        _new: Option<sy::Message>,
        event: sy::MessageUpdateEvent,
    ) {
        let id = event.id.get();
        let before = self.recent.get(id).await;
        let after = MessageSnapshot {
            guild_id: event
                .guild_id
                .map(|g| GuildId(g.get()))
                .or_else(|| before.as_ref().and_then(|b| b.guild_id)),
            channel_id: ChannelId(event.channel_id.get()),
            author_tag: event
                .author
                .as_ref()
                .map(|a| a.tag())
                .or_else(|| before.as_ref().and_then(|b| b.author_tag.clone())),
            content: event
                .content
                .clone()
                .or_else(|| before.as_ref().and_then(|b| b.content.clone())),
            attachments: match &event.attachments {
                Some(a) => to_attachments(a),
                None => before
                    .as_ref()
                    .map(|b| b.attachments.clone())
                    .unwrap_or_default(),
            },
        };
        if after.guild_id.is_some() {
            self.recent.record(id, after.clone()).await;
        }
        self.forward(InboundEvent::MessageEdited { before, after })
            .await;
    }

    async fn message_delete(
        &self,
        _ctx: sy::Context,
        channel_id: sy::ChannelId,
        message_id: sy::MessageId,
        guild_id: Option<sy::GuildId>,
    ) {
        let snapshot = match self.recent.take(message_id.get()).await {
            Some(s) => s,
            None => MessageSnapshot {
                guild_id: guild_id.map(|g| GuildId(g.get())),
                channel_id: ChannelId(channel_id.get()),
                ..MessageSnapshot::default()
            },
        };
        self.forward(InboundEvent::MessageDeleted(snapshot)).await;
    }
}

/// Build the gateway client and the platform handle that shares its REST client.
pub async fn connect(
    token: &str,
    kind: BotKind,
) -> Result<(Arc<SerenityPlatform>, mpsc::Receiver<InboundEvent>, sy::Client), PlatformError> {
    let http = Arc::new(sy::Http::new(token));
    let platform = Arc::new(SerenityPlatform::new(http));
    let (tx, rx) = mpsc::channel(EVENT_BUFFER);

    let client = sy::Client::builder(token, intents(kind))
        .event_handler(Forwarder::new(tx, platform.clone()))
        .await
        .map_err(map_err)?;

    Ok((platform, rx, client))
}
