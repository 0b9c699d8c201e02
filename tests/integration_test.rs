use async_trait::async_trait;
use premade_bots::bot::BotRuntime;
use premade_bots::bots;
use premade_bots::commands::{CommandSpec, TARGET_OPTION};
use premade_bots::config::{BotKind, Config};
use premade_bots::platform::*;
use premade_bots::router::{Dispatch, PERMISSION_DENIED};
use premade_bots::updater::{FetchResponse, Fetcher, UpdateError, UpdateOutcome, UpdateSupervisor};
use premade_bots::version_source::{InlineMarker, VersionSource};
use std::collections::HashMap;
use std::fs;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::tempdir;
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq)]
enum Call {
    Register(Vec<String>),
    Reply(String),
    Perform(ModAction),
    Embed(ChannelId, Embed),
}

/// Records every platform call; every member and channel exists.
#[derive(Default)]
struct FakePlatform {
    calls: Mutex<Vec<Call>>,
}

impl FakePlatform {
    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn replies(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Reply(body) => Some(body),
                _ => None,
            })
            .collect()
    }

    fn push(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl Platform for FakePlatform {
    async fn register_commands(&self, commands: &[CommandSpec]) -> Result<(), PlatformError> {
        self.push(Call::Register(
            commands.iter().map(|c| c.name.clone()).collect(),
        ));
        Ok(())
    }

    async fn reply(&self, _interaction: &Interaction, reply: Reply) -> Result<(), PlatformError> {
        self.push(Call::Reply(reply.body().to_string()));
        Ok(())
    }

    async fn resolve_member(
        &self,
        _guild_id: GuildId,
        user_id: UserId,
    ) -> Result<Option<MemberRef>, PlatformError> {
        Ok(Some(MemberRef {
            user_id,
            tag: format!("member{}", user_id),
            roles: vec![],
        }))
    }

    async fn channel_exists(
        &self,
        _guild_id: GuildId,
        _channel_id: ChannelId,
    ) -> Result<bool, PlatformError> {
        Ok(true)
    }

    async fn perform(&self, _guild_id: GuildId, action: ModAction) -> Result<(), PlatformError> {
        self.push(Call::Perform(action));
        Ok(())
    }

    async fn send_embed(&self, channel_id: ChannelId, embed: Embed) -> Result<(), PlatformError> {
        self.push(Call::Embed(channel_id, embed));
        Ok(())
    }

    async fn set_status(&self, _status: StatusLine) -> Result<(), PlatformError> {
        Ok(())
    }
}

fn command(id: u64, name: &str, perms: &[Permission], options: Vec<(&str, OptionValue)>) -> Interaction {
    Interaction {
        id,
        token: "tok".to_string(),
        guild_id: Some(GuildId(1)),
        channel_id: ChannelId(2),
        invoker: Invoker {
            user_id: UserId(3),
            tag: "mod#0001".to_string(),
            permissions: PermissionSet::of(perms),
        },
        kind: InteractionKind::Command {
            name: name.to_string(),
            options: options
                .into_iter()
                .map(|(n, value)| CommandOption {
                    name: n.to_string(),
                    value,
                })
                .collect(),
        },
    }
}

fn settings_config(kind: BotKind, dir: &std::path::Path) -> Config {
    let mut config = Config::default_for(kind);
    config.settings.path = Some(dir.join("settings.json"));
    config
}

/// Ready → sync, then a permitted kick and a denied one through the runtime.
#[tokio::test]
async fn test_moderation_session() {
    let fake = Arc::new(FakePlatform::default());
    let platform: Arc<dyn Platform> = fake.clone();
    let profile = bots::build(&Config::default_for(BotKind::Moderation), platform.clone()).unwrap();
    let runtime = BotRuntime::new(profile, platform, Duration::from_secs(40));
    let metrics = runtime.metrics();

    let (tx, rx) = mpsc::channel(8);
    tx.send(InboundEvent::Ready {
        bot_tag: "modbot".to_string(),
    })
    .await
    .unwrap();
    tx.send(InboundEvent::Interaction(command(
        1,
        "kick",
        &[Permission::KickMembers],
        vec![(TARGET_OPTION, OptionValue::User(UserId(42)))],
    )))
    .await
    .unwrap();
    tx.send(InboundEvent::Interaction(command(
        2,
        "kick",
        &[],
        vec![(TARGET_OPTION, OptionValue::User(UserId(43)))],
    )))
    .await
    .unwrap();
    drop(tx);
    runtime.run(rx).await;

    let calls = fake.calls();
    assert!(matches!(&calls[0], Call::Register(names) if names.contains(&"purge".to_string())));
    assert_eq!(
        calls
            .iter()
            .filter(|c| matches!(c, Call::Perform(_)))
            .collect::<Vec<_>>(),
        vec![&Call::Perform(ModAction::Kick {
            user_id: UserId(42)
        })]
    );
    let mut replies = fake.replies();
    replies.sort();
    assert_eq!(
        replies,
        vec![PERMISSION_DENIED.to_string(), "👢 Kicked member42".to_string()]
    );

    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.executed, 1);
    assert_eq!(snapshot.rejected, 1);
}

/// Configure the welcome channel, then a join posts the rendered greeting.
#[tokio::test]
async fn test_welcome_configure_then_greet() {
    let dir = tempdir().unwrap();
    let fake = Arc::new(FakePlatform::default());
    let platform: Arc<dyn Platform> = fake.clone();
    let profile = bots::build(&settings_config(BotKind::Welcome, dir.path()), platform.clone()).unwrap();

    let outcome = profile
        .router
        .handle(&command(
            1,
            "settings",
            &[Permission::Administrator],
            vec![
                ("option", OptionValue::String("welcomeChannelId".to_string())),
                ("value", OptionValue::String("<#55>".to_string())),
            ],
        ))
        .await;
    assert_eq!(outcome, Dispatch::Executed);

    let saved = fs::read_to_string(dir.path().join("settings.json")).unwrap();
    assert!(saved.contains("\"welcomeChannelId\": \"55\""));

    let joined = InboundEvent::MemberJoined(GuildMember {
        guild_id: GuildId(1),
        guild_name: "Rustaceans".to_string(),
        guild_icon: None,
        user_id: UserId(7),
        tag: "ferris".to_string(),
    });
    for listener in &profile.listeners {
        listener.on_event(platform.as_ref(), &joined).await;
    }

    let embeds: Vec<_> = fake
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            Call::Embed(channel, embed) => Some((channel, embed)),
            _ => None,
        })
        .collect();
    assert_eq!(embeds.len(), 1);
    assert_eq!(embeds[0].0, ChannelId(55));
    assert_eq!(
        embeds[0].1.description.as_deref(),
        Some("Yo <@7>, welcome to Rustaceans! 🔥")
    );
    assert_eq!(embeds[0].1.color, Some(COLOR_OK));
}

/// Set the log channel, then a deleted message is posted there.
#[tokio::test]
async fn test_logger_set_channel_then_log_delete() {
    let dir = tempdir().unwrap();
    let fake = Arc::new(FakePlatform::default());
    let platform: Arc<dyn Platform> = fake.clone();
    let profile = bots::build(&settings_config(BotKind::Logger, dir.path()), platform.clone()).unwrap();

    let outcome = profile
        .router
        .handle(&command(
            1,
            "setlog",
            &[Permission::ManageGuild],
            vec![("channel", OptionValue::Channel(ChannelId(99)))],
        ))
        .await;
    assert_eq!(outcome, Dispatch::Executed);

    let deleted = InboundEvent::MessageDeleted(MessageSnapshot {
        guild_id: Some(GuildId(1)),
        channel_id: ChannelId(2),
        author_tag: Some("alice".to_string()),
        content: Some("oops".to_string()),
        attachments: vec![],
    });
    for listener in &profile.listeners {
        listener.on_event(platform.as_ref(), &deleted).await;
    }

    let posted = fake.calls().into_iter().find_map(|c| match c {
        Call::Embed(channel, embed) => Some((channel, embed)),
        _ => None,
    });
    let (channel, embed) = posted.expect("log entry posted");
    assert_eq!(channel, ChannelId(99));
    assert_eq!(embed.title.as_deref(), Some("🗑️ Message Deleted"));
    assert!(embed.description.unwrap().contains("oops"));
}

/// Opt in through the menu, then the prebuilt command runs.
#[tokio::test]
async fn test_addcommands_opt_in_flow() {
    let fake = Arc::new(FakePlatform::default());
    let platform: Arc<dyn Platform> = fake.clone();
    let profile = bots::build(&Config::default_for(BotKind::Addcommands), platform).unwrap();
    let router = &profile.router;

    assert_eq!(router.handle(&command(1, "ping", &[], vec![])).await, Dispatch::Rejected);

    let mut select = command(2, "unused", &[], vec![]);
    select.kind = InteractionKind::MenuSelect {
        custom_id: "selectCommands".to_string(),
        values: vec!["ping".to_string()],
    };
    assert_eq!(router.handle(&select).await, Dispatch::Executed);
    assert_eq!(router.handle(&command(3, "ping", &[], vec![])).await, Dispatch::Executed);

    let replies = fake.replies();
    assert_eq!(replies.last().map(String::as_str), Some("🏓 Pong!"));
    assert!(replies.contains(&"✅ You added: ping".to_string()));
}

/// Serves canned responses by URL.
struct StaticFetcher {
    responses: HashMap<String, FetchResponse>,
}

#[async_trait]
impl Fetcher for StaticFetcher {
    async fn get(&self, url: &str) -> Result<FetchResponse, UpdateError> {
        self.responses
            .get(url)
            .cloned()
            .ok_or_else(|| UpdateError::Transport {
                url: url.to_string(),
                reason: "unreachable".to_string(),
            })
    }
}

fn response(status: u16, body: &str) -> FetchResponse {
    FetchResponse {
        status,
        body: body.as_bytes().to_vec(),
    }
}

const MANIFEST_URL: &str = "https://updates.test/versions.txt";
const UPDATE_URL: &str = "https://updates.test/welcome-bot.js";

fn supervisor(installed: &std::path::Path, payload: FetchResponse) -> UpdateSupervisor {
    let mut responses = HashMap::new();
    responses.insert(
        MANIFEST_URL.to_string(),
        response(200, "moderation-bot.js==1.0.2\nwelcome-bot.js==1.1.0\n"),
    );
    responses.insert(UPDATE_URL.to_string(), payload);
    UpdateSupervisor::new(
        "welcome-bot.js",
        MANIFEST_URL,
        UPDATE_URL,
        installed,
        Box::new(InlineMarker::new(installed)),
        Box::new(StaticFetcher { responses }),
    )
}

/// A newer published build replaces the installed file and records its version.
#[tokio::test]
async fn test_update_installs_new_build() {
    let dir = tempdir().unwrap();
    let installed = dir.path().join("welcome-bot.js");
    fs::write(&installed, "// @version 1.0.0\nold build\n").unwrap();

    let outcome = supervisor(&installed, response(200, "// @version 1.1.0\nnew build\n"))
        .check()
        .await;

    assert_eq!(
        outcome,
        UpdateOutcome::Installed {
            from: "1.0.0".to_string(),
            to: "1.1.0".to_string(),
        }
    );
    assert_eq!(outcome.exit_code(), Some(0));
    assert!(fs::read_to_string(&installed).unwrap().contains("new build"));
    assert_eq!(InlineMarker::new(&installed).read().unwrap(), "1.1.0");
}

/// A failed download leaves the installed build untouched and keeps running.
#[tokio::test]
async fn test_update_failure_keeps_current_build() {
    let dir = tempdir().unwrap();
    let installed = dir.path().join("welcome-bot.js");
    fs::write(&installed, "// @version 1.0.0\nold build\n").unwrap();

    let outcome = supervisor(&installed, response(500, "")).check().await;

    assert!(matches!(outcome, UpdateOutcome::Aborted(_)));
    assert_eq!(outcome.exit_code(), None);
    assert_eq!(
        fs::read_to_string(&installed).unwrap(),
        "// @version 1.0.0\nold build\n"
    );
}
