//! The premade bot variants.
//!
//! Each variant declares its command set, wires handlers into a
//! [`CommandRouter`] and may add listeners for non-interaction events.

pub mod addcommands;
pub mod logger;
pub mod moderation;
pub mod welcome;

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

use crate::commands::CommandSetError;
use crate::config::{BotKind, Config};
use crate::platform::{InboundEvent, Platform};
use crate::router::{CommandRouter, ReplyStyle, RouterError};
use crate::settings::SettingsError;
use crate::status::StatusRotator;

pub const MADE_BY: &str = "Made with ❤️ by NJGHosting";
pub const HOSTING_AD: &str = "Free Hosting at njghosting.xyz";

#[derive(Debug, thiserror::Error)]
pub enum BotError {
    #[error(transparent)]
    Commands(#[from] CommandSetError),
    #[error(transparent)]
    Router(#[from] RouterError),
    #[error(transparent)]
    Settings(#[from] SettingsError),
    #[error("{0:?} bot needs a settings file path")]
    NoSettingsPath(BotKind),
}

/// Reacts to member and message events.
#[async_trait]
pub trait EventListener: Send + Sync {
    async fn on_event(&self, platform: &dyn Platform, event: &InboundEvent);
}

/// Everything the runtime needs to drive one variant.
pub struct BotProfile {
    pub kind: BotKind,
    pub router: CommandRouter,
    pub listeners: Vec<Box<dyn EventListener>>,
    pub status: StatusRotator,
}

pub fn build(config: &Config, platform: Arc<dyn Platform>) -> Result<BotProfile, BotError> {
    let embed_style = ReplyStyle::Embed {
        footer: config.embed_footer.clone(),
    };
    let settings_path = || {
        config
            .settings_path()
            .ok_or(BotError::NoSettingsPath(config.bot))
    };

    let (router, listeners, status) = match config.bot {
        BotKind::Moderation => (
            moderation::router(platform)?,
            Vec::new(),
            StatusRotator::new(Vec::new(), false),
        ),
        BotKind::Welcome => {
            let (router, listener) = welcome::build(platform, embed_style, settings_path()?)?;
            let listeners: Vec<Box<dyn EventListener>> = vec![Box::new(listener)];
            let status =
                StatusRotator::new(vec![HOSTING_AD.to_string(), MADE_BY.to_string()], false);
            (router, listeners, status)
        }
        BotKind::Logger => {
            let (router, listener) = logger::build(platform, embed_style, settings_path()?)?;
            let listeners: Vec<Box<dyn EventListener>> = vec![Box::new(listener)];
            let status = StatusRotator::new(
                vec![
                    "Logging Messages 📜".to_string(),
                    MADE_BY.to_string(),
                    HOSTING_AD.to_string(),
                ],
                true,
            );
            (router, listeners, status)
        }
        BotKind::Addcommands => (
            addcommands::router(platform, embed_style)?,
            Vec::new(),
            StatusRotator::new(
                vec!["Using /addcommands".to_string(), MADE_BY.to_string()],
                true,
            ),
        ),
    };

    let status = if config.status.lines.is_empty() {
        status
    } else {
        StatusRotator::new(config.status.lines.clone(), true)
    };

    for name in router.unhandled() {
        warn!(command = %name, "declared command has no handler");
    }
    info!(
        bot = ?config.bot,
        commands = router.commands().len(),
        listeners = listeners.len(),
        "bot profile built"
    );

    Ok(BotProfile {
        kind: config.bot,
        router,
        listeners,
        status,
    })
}
