use std::{sync::Arc, time::Duration};

use anyhow::Context as _;
use async_trait::async_trait;
use serenity::all::{
    ChannelId, Client, Colour, Context, CreateEmbed, CreateMessage, EditMessage, EventHandler,
    GatewayIntents, Http, Message, MessageId, Ready,
};
use tokio::{sync::Mutex, time::Instant};
use warden_process::{Controller, LifecycleEvent, ProgressSink, ServerState};

use crate::{
    commands::{self, Action, Command, Parsed},
    config::AgentConfig,
    render::{self, Output},
    server_info, support,
};

/// Decides which progress edits go out. Stage changes and last steps always
/// pass; everything else waits for `interval` since the previous edit.
#[derive(Debug)]
struct EditThrottle {
    interval: Duration,
    last_edit: Option<Instant>,
    stage: Option<&'static str>,
}

impl EditThrottle {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_edit: None,
            stage: None,
        }
    }

    fn admit(&mut self, stage: &'static str, last: bool, now: Instant) -> bool {
        let forced = last || self.stage != Some(stage);
        let due = self
            .last_edit
            .is_none_or(|t| now.saturating_duration_since(t) >= self.interval);
        if !(forced || due) {
            return false;
        }
        self.stage = Some(stage);
        self.last_edit = Some(now);
        true
    }
}

struct ReplyState {
    message: Option<MessageId>,
    throttle: EditThrottle,
}

/// The chat side of one command: a single progress message that is edited in
/// place, plus separate notices for warnings.
struct ChatReply {
    http: Arc<Http>,
    channel: ChannelId,
    action: Action,
    name: String,
    state: Mutex<ReplyState>,
}

impl ChatReply {
    fn new(
        http: Arc<Http>,
        channel: ChannelId,
        action: Action,
        name: String,
        edit_interval: Duration,
    ) -> Self {
        Self {
            http,
            channel,
            action,
            name,
            state: Mutex::new(ReplyState {
                message: None,
                throttle: EditThrottle::new(edit_interval),
            }),
        }
    }

    async fn put(&self, state: &mut ReplyState, text: String) {
        match state.message {
            Some(id) => {
                let edit = EditMessage::new().content(text);
                if let Err(e) = self
                    .channel
                    .edit_message(self.http.as_ref(), id, edit)
                    .await
                {
                    tracing::warn!(channel = %self.channel, error = %e, "edit progress message failed");
                }
            }
            None => match self.channel.say(self.http.as_ref(), text).await {
                Ok(sent) => state.message = Some(sent.id),
                Err(e) => {
                    tracing::warn!(channel = %self.channel, error = %e, "send progress message failed")
                }
            },
        }
    }

    /// Final word on the command; replaces the progress message if there is one.
    async fn finish(&self, text: String) {
        let mut state = self.state.lock().await;
        self.put(&mut state, text).await;
    }
}

#[async_trait]
impl ProgressSink for ChatReply {
    async fn emit(&self, event: LifecycleEvent) {
        match render::progress(self.action, &self.name, &event) {
            Output::Progress { text, stage, last } => {
                let mut state = self.state.lock().await;
                if state.throttle.admit(stage, last, Instant::now()) {
                    self.put(&mut state, text).await;
                }
            }
            Output::Notice(text) => say(&self.http, self.channel, text).await,
            Output::Nothing => {}
        }
    }
}

async fn say(http: &Http, channel: ChannelId, text: String) {
    if let Err(e) = channel.say(http, text).await {
        tracing::warn!(%channel, error = %e, "send message failed");
    }
}

struct App {
    controller: Controller,
    prefix: String,
    channel_id: Option<u64>,
    password: String,
    edit_interval: Duration,
    http_client: reqwest::Client,
}

impl App {
    async fn dispatch(&self, http: Arc<Http>, channel: ChannelId, command: Command) {
        match command {
            Command::Help => {
                let keys: Vec<&str> = self
                    .controller
                    .registry()
                    .keys()
                    .map(|k| k.as_str())
                    .collect();
                say(&http, channel, render::help(&self.prefix, &keys)).await;
            }
            Command::Status => self.status(&http, channel).await,
            Command::Lifecycle { action, game } => {
                self.lifecycle(http, channel, action, &game).await
            }
        }
    }

    async fn lifecycle(&self, http: Arc<Http>, channel: ChannelId, action: Action, game: &str) {
        let name = match self.controller.server(game) {
            Ok(server) => server.descriptor().display_name.clone(),
            Err(e) => {
                say(&http, channel, render::lifecycle_error(action, game, &e)).await;
                return;
            }
        };

        let reply = ChatReply::new(http, channel, action, name.clone(), self.edit_interval);
        let c = &self.controller;
        let result = match action {
            Action::Start => c
                .start(game, &reply)
                .await
                .map(|o| render::start_result(&name, &o)),
            Action::Stop => c
                .stop(game, &reply)
                .await
                .map(|o| render::stop_result(&name, &o)),
            Action::Restart => c
                .restart(game, &reply)
                .await
                .map(|o| render::restart_result(&name, &o)),
            Action::Update => c
                .update(game, &reply)
                .await
                .map(|o| render::update_result(&name, &o)),
        };

        let text = result.unwrap_or_else(|e| {
            tracing::error!(game, action = action.verb(), error = %e, "command failed");
            render::lifecycle_error(action, &name, &e)
        });
        reply.finish(text).await;
    }

    async fn status(&self, http: &Http, channel: ChannelId) {
        let games: Vec<(String, bool)> = self
            .controller
            .status()
            .await
            .into_iter()
            .map(|s| (s.display_name, s.state == ServerState::Running))
            .collect();
        let host = server_info::collect(&self.http_client).await;

        let embed = CreateEmbed::new()
            .title("🖥️ Server Status")
            .colour(Colour::BLUE)
            .fields(render::status_fields(&games, &host, &self.password));
        if let Err(e) = channel
            .send_message(http, CreateMessage::new().embed(embed))
            .await
        {
            tracing::warn!(%channel, error = %e, "send status failed");
        }
    }
}

struct Handler {
    app: Arc<App>,
}

#[async_trait]
impl EventHandler for Handler {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        tracing::info!(user = %ready.user.name, guilds = ready.guilds.len(), "connected to discord");
    }

    async fn message(&self, ctx: Context, msg: Message) {
        if msg.author.bot {
            return;
        }
        if let Some(allowed) = self.app.channel_id
            && msg.channel_id.get() != allowed
        {
            return;
        }

        let command = match commands::parse(&self.app.prefix, &msg.content) {
            Parsed::Ignored => return,
            Parsed::MissingGame(action) => {
                say(&ctx.http, msg.channel_id, render::usage(&self.app.prefix, action)).await;
                return;
            }
            Parsed::Command(command) => command,
        };

        tracing::info!(author = %msg.author.name, channel = %msg.channel_id, ?command, "command received");
        let app = self.app.clone();
        let http = ctx.http.clone();
        let channel = msg.channel_id;
        tokio::spawn(async move { app.dispatch(http, channel, command).await });
    }
}

pub async fn run(config: AgentConfig, controller: Controller) -> anyhow::Result<()> {
    let app = Arc::new(App {
        controller,
        prefix: config.discord.command_prefix.clone(),
        channel_id: config.discord.channel_id,
        password: config.password.clone(),
        edit_interval: support::edit_interval(),
        http_client: server_info::http_client(),
    });

    let intents = GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::DIRECT_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT;
    let mut client = Client::builder(&config.discord.token, intents)
        .event_handler(Handler { app })
        .await
        .context("build discord client")?;
    let shards = client.shard_manager.clone();

    tokio::select! {
        res = client.start() => res.context("discord client stopped")?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("ctrl-c received, shutting down");
            shards.shutdown_all().await;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn throttle_lets_first_stage_and_last_edits_through() {
        let t0 = Instant::now();
        let mut throttle = EditThrottle::new(Duration::from_secs(1));

        assert!(throttle.admit("starting", false, t0));
        assert!(!throttle.admit("starting", false, t0 + Duration::from_millis(300)));
        assert!(throttle.admit("starting", false, t0 + Duration::from_millis(1000)));
        assert!(throttle.admit("starting", true, t0 + Duration::from_millis(1100)));
    }

    #[test]
    fn throttle_always_admits_stage_changes() {
        let t0 = Instant::now();
        let mut throttle = EditThrottle::new(Duration::from_secs(5));

        assert!(throttle.admit("Downloading", false, t0));
        assert!(!throttle.admit("Downloading", false, t0 + Duration::from_millis(10)));
        assert!(throttle.admit("Verifying Install", false, t0 + Duration::from_millis(20)));
        assert!(!throttle.admit("Verifying Install", false, t0 + Duration::from_millis(30)));
    }

    #[test]
    fn zero_interval_admits_everything() {
        let t0 = Instant::now();
        let mut throttle = EditThrottle::new(Duration::ZERO);
        assert!(throttle.admit("shutdown", false, t0));
        assert!(throttle.admit("shutdown", false, t0));
    }
}
