use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::bots::{BotProfile, EventListener};
use crate::config::BotKind;
use crate::metrics::DispatchMetrics;
use crate::platform::{InboundEvent, Platform};
use crate::router::CommandRouter;
use crate::status::StatusRotator;

const HEARTBEAT_SECS: u64 = 30;

/// Drives one bot: routes interactions, fans out other events to listeners
/// and rotates the presence line.
pub struct BotRuntime {
    kind: BotKind,
    router: Arc<CommandRouter>,
    listeners: Arc<Vec<Box<dyn EventListener>>>,
    status: StatusRotator,
    status_interval: Duration,
    platform: Arc<dyn Platform>,
    metrics: Arc<DispatchMetrics>,
    tasks: JoinSet<()>,
    ready: bool,
}

impl BotRuntime {
    pub fn new(profile: BotProfile, platform: Arc<dyn Platform>, status_interval: Duration) -> Self {
        let metrics = profile.router.metrics();
        Self {
            kind: profile.kind,
            router: Arc::new(profile.router),
            listeners: Arc::new(profile.listeners),
            status: profile.status,
            status_interval,
            platform,
            metrics,
            tasks: JoinSet::new(),
            ready: false,
        }
    }

    pub fn metrics(&self) -> Arc<DispatchMetrics> {
        self.metrics.clone()
    }

    /// Main event loop. Returns once the event stream closes and every
    /// in-flight handler has finished.
    pub async fn run(mut self, mut events: mpsc::Receiver<InboundEvent>) {
        info!(bot = ?self.kind, "bot ready, entering main loop");

        let mut status_interval =
            tokio::time::interval(self.status_interval.max(Duration::from_millis(1)));
        let mut heartbeat_interval =
            tokio::time::interval(Duration::from_secs(HEARTBEAT_SECS));
        // The first tick fires immediately; skip it so uptime starts at zero.
        heartbeat_interval.tick().await;

        loop {
            tokio::select! {
                event = events.recv() => {
                    match event {
                        Some(event) => self.dispatch(event).await,
                        None => {
                            info!("event stream closed, shutting down");
                            break;
                        }
                    }
                }
                Some(result) = self.tasks.join_next(), if !self.tasks.is_empty() => {
                    if let Err(e) = result {
                        error!(error = %e, "handler task panicked");
                    }
                }
                _ = status_interval.tick(), if self.ready && !self.status.is_empty() => {
                    self.rotate_status().await;
                }
                _ = heartbeat_interval.tick() => {
                    self.heartbeat();
                }
            }
        }

        while let Some(result) = self.tasks.join_next().await {
            if let Err(e) = result {
                error!(error = %e, "handler task panicked");
            }
        }
    }

    async fn dispatch(&mut self, event: InboundEvent) {
        match event {
            InboundEvent::Ready { bot_tag } => {
                info!(bot = %bot_tag, "logged in");
                self.router.sync().await;
                self.ready = true;
            }
            InboundEvent::Interaction(interaction) => {
                let router = self.router.clone();
                self.tasks.spawn(async move {
                    let outcome = router.handle(&interaction).await;
                    debug!(interaction = interaction.id, ?outcome, "interaction handled");
                });
            }
            event => {
                if self.listeners.is_empty() {
                    return;
                }
                let listeners = self.listeners.clone();
                let platform = self.platform.clone();
                self.tasks.spawn(async move {
                    for listener in listeners.iter() {
                        listener.on_event(platform.as_ref(), &event).await;
                    }
                });
            }
        }
    }

    async fn rotate_status(&mut self) {
        let line = {
            let mut rng = rand::thread_rng();
            self.status.next_line(&mut rng)
        };
        let Some(line) = line else {
            return;
        };
        if let Err(e) = self.platform.set_status(line).await {
            debug!(error = %e, "failed to update status");
        }
    }

    fn heartbeat(&self) {
        self.metrics.increment_uptime(HEARTBEAT_SECS);
        let snapshot = self.metrics.snapshot();
        match serde_json::to_string(&snapshot) {
            Ok(json) => info!(
                metrics = %json,
                success_rate = snapshot.success_rate(),
                "heartbeat"
            ),
            Err(e) => warn!(error = %e, "failed to encode metrics"),
        }
    }
}
