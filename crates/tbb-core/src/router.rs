//! Inbound update handling: subscriber tracking, built-ins, custom commands.

use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::{
    domain::UserId,
    formatting::escape_html,
    messaging::{
        port::ChatClient,
        types::{InboundMessage, PhotoSource, RequestContext},
    },
    model::{CommandAction, CommandDef},
    registry::CommandRegistry,
    store::ConfigStore,
    subscription::SubscriptionChecker,
    Result,
};

pub const NO_COMMANDS_REPLY: &str = "No commands yet";
pub const COMMAND_FAILED_REPLY: &str = "⚠️ An error occurred while running the command";

/// What the router did with an update.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Routed {
    /// Not a command; only subscriber tracking ran.
    NotCommand,
    Builtin(String),
    Custom(String),
    /// A `/name` nobody registered. Silently ignored.
    Unknown(String),
}

pub struct UpdateRouter {
    store: Arc<ConfigStore>,
    registry: CommandRegistry,
    checker: SubscriptionChecker,
    client: Arc<dyn ChatClient>,
    /// This bot's username; commands mentioning another bot are ignored.
    bot_username: Option<String>,
}

impl UpdateRouter {
    pub fn new(store: Arc<ConfigStore>, client: Arc<dyn ChatClient>) -> Self {
        Self {
            registry: CommandRegistry::new(store.clone()),
            checker: SubscriptionChecker::new(store.clone(), client.clone()),
            store,
            client,
            bot_username: None,
        }
    }

    pub fn with_bot_username(mut self, username: impl Into<String>) -> Self {
        let username = username.into();
        self.bot_username = Some(username.trim_start_matches('@').to_lowercase());
        self
    }

    pub async fn handle(&self, msg: InboundMessage) -> Routed {
        self.track_subscriber(msg.user_id).await;

        let Some(text) = msg.text.as_deref() else {
            return Routed::NotCommand;
        };
        let Some(parsed) = parse_command(text) else {
            return Routed::NotCommand;
        };
        if !self.addressed_to_me(parsed.mention.as_deref()) {
            debug!(command = %parsed.name, "command addressed to another bot");
            return Routed::NotCommand;
        }
        let cmd = parsed.name;
        let ctx = RequestContext::from(&msg);

        match cmd.as_str() {
            "start" => {
                self.reply_html(&ctx, &start_reply(&ctx)).await;
                Routed::Builtin(cmd)
            }
            "help" => {
                self.reply_text(&ctx, &help_reply(&self.registry.names()))
                    .await;
                Routed::Builtin(cmd)
            }
            "check" => {
                self.run_check(&ctx).await;
                Routed::Builtin(cmd)
            }
            _ => {
                if self.dispatch(&cmd, &ctx).await {
                    Routed::Custom(cmd)
                } else {
                    debug!(command = %cmd, "ignoring unregistered command");
                    Routed::Unknown(cmd)
                }
            }
        }
    }

    /// Run a custom command. Returns `false` if `name` is not registered.
    pub async fn dispatch(&self, name: &str, ctx: &RequestContext) -> bool {
        let Some(def) = self.registry.lookup(name) else {
            return false;
        };

        if let Err(e) = self.execute(&def, ctx).await {
            error!(
                command = %name,
                user_id = ctx.user_id.0,
                error = %e,
                "command failed"
            );
            if let Err(e) = self.client.send_text(ctx.chat_id, COMMAND_FAILED_REPLY).await {
                warn!(user_id = ctx.user_id.0, error = %e, "failed to report command error");
            }
        }
        true
    }

    async fn execute(&self, def: &CommandDef, ctx: &RequestContext) -> Result<()> {
        match def.action {
            CommandAction::Text => self.client.send_text(ctx.chat_id, &def.content).await,
            CommandAction::Photo => {
                let photo = PhotoSource::from_content(&def.content);
                self.client.send_photo(ctx.chat_id, &photo, None).await
            }
            CommandAction::Check => {
                let status = self.checker.check(ctx.user_id).await;
                self.client.send_html(ctx.chat_id, &status.to_html()).await
            }
        }
    }

    async fn run_check(&self, ctx: &RequestContext) {
        let status = self.checker.check(ctx.user_id).await;
        self.reply_html(ctx, &status.to_html()).await;
    }

    fn addressed_to_me(&self, mention: Option<&str>) -> bool {
        match (mention, self.bot_username.as_deref()) {
            (Some(m), Some(me)) => m.eq_ignore_ascii_case(me),
            _ => true,
        }
    }

    /// The store writes the file under a blocking lock, so known users skip
    /// it and new ones are recorded off the async workers.
    async fn track_subscriber(&self, user_id: UserId) {
        if self.store.get().subscribers.contains(&user_id) {
            return;
        }
        let store = self.store.clone();
        match tokio::task::spawn_blocking(move || store.add_subscriber(user_id)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => warn!(user_id = user_id.0, error = %e, "failed to record subscriber"),
            Err(e) => warn!(user_id = user_id.0, error = %e, "subscriber tracking task failed"),
        }
    }

    async fn reply_text(&self, ctx: &RequestContext, text: &str) {
        if let Err(e) = self.client.send_text(ctx.chat_id, text).await {
            warn!(user_id = ctx.user_id.0, error = %e, "reply failed");
        }
    }

    async fn reply_html(&self, ctx: &RequestContext, html: &str) {
        if let Err(e) = self.client.send_html(ctx.chat_id, html).await {
            warn!(user_id = ctx.user_id.0, error = %e, "reply failed");
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsedCommand {
    /// Lowercase command name.
    pub name: String,
    /// Bot named after `@`, if any.
    pub mention: Option<String>,
    pub args: String,
}

/// Split `/cmd@botname args` into its parts.
///
/// Returns `None` for text that is not a command.
pub fn parse_command(text: &str) -> Option<ParsedCommand> {
    let text = text.trim();
    if !text.starts_with('/') {
        return None;
    }

    let mut parts = text.splitn(2, char::is_whitespace);
    let first = parts.next().unwrap_or("");
    let args = parts.next().unwrap_or("").trim().to_string();

    let (name, mention) = match first.trim_start_matches('/').split_once('@') {
        Some((name, bot)) => (name, Some(bot.to_string()).filter(|b| !b.is_empty())),
        None => (first.trim_start_matches('/'), None),
    };
    let name = name.to_lowercase();

    if name.is_empty() {
        return None;
    }
    Some(ParsedCommand {
        name,
        mention,
        args,
    })
}

fn start_reply(ctx: &RequestContext) -> String {
    let greeting = match ctx.username.as_deref() {
        Some(u) => format!("👋 Hi, @{}!", escape_html(u)),
        None => "👋 Hi!".to_string(),
    };
    format!(
        "{greeting} Your ID: <code>{}</code>\nUse /help to see the available commands",
        escape_html(&ctx.user_id.to_string())
    )
}

fn help_reply(names: &[String]) -> String {
    let list = if names.is_empty() {
        NO_COMMANDS_REPLY.to_string()
    } else {
        names
            .iter()
            .map(|n| format!("/{n}"))
            .collect::<Vec<_>>()
            .join("\n")
    };
    format!("📚 Available commands:\n{list}\nℹ️ Use /check to verify your channel subscriptions")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::ChatId,
        messaging::types::MembershipStatus,
        store,
        subscription::SUBSCRIBED_REPLY,
        testing::{tmp_path, FakeChatClient, Sent},
    };

    fn msg(user: i64, text: &str) -> InboundMessage {
        InboundMessage {
            chat_id: ChatId(user),
            user_id: UserId(user),
            username: Some("tester".to_string()),
            text: Some(text.to_string()),
        }
    }

    fn router() -> (UpdateRouter, Arc<ConfigStore>, Arc<FakeChatClient>) {
        let store = Arc::new(ConfigStore::open(tmp_path("tbb-router")));
        let client = Arc::new(FakeChatClient::default());
        (
            UpdateRouter::new(store.clone(), client.clone()),
            store,
            client,
        )
    }

    #[test]
    fn parses_commands_with_bot_mentions() {
        assert_eq!(
            parse_command("/Promo@my_bot  now please"),
            Some(ParsedCommand {
                name: "promo".to_string(),
                mention: Some("my_bot".to_string()),
                args: "now please".to_string(),
            })
        );
        assert_eq!(
            parse_command("/help"),
            Some(ParsedCommand {
                name: "help".to_string(),
                mention: None,
                args: String::new(),
            })
        );
        assert_eq!(parse_command("hello /help"), None);
        assert_eq!(parse_command("/"), None);
        assert_eq!(parse_command("/@my_bot"), None);
    }

    #[tokio::test]
    async fn answers_own_mention_and_ignores_other_bots() {
        let (router, store, client) = router();
        let router = router.with_bot_username("My_Bot");
        CommandRegistry::new(store)
            .register("promo", CommandDef::text("deal"))
            .unwrap();

        let group = |text: &str| InboundMessage {
            chat_id: ChatId(-5),
            ..msg(1, text)
        };

        assert_eq!(router.handle(group("/help@some_other_bot")).await, Routed::NotCommand);
        assert_eq!(router.handle(group("/promo@some_other_bot")).await, Routed::NotCommand);
        assert!(client.sent().is_empty());

        assert_eq!(
            router.handle(group("/help@my_bot")).await,
            Routed::Builtin("help".to_string())
        );
        assert_eq!(
            router.handle(group("/promo@MY_BOT")).await,
            Routed::Custom("promo".to_string())
        );
        assert_eq!(router.handle(group("/promo")).await, Routed::Custom("promo".to_string()));
        assert_eq!(client.sent().len(), 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_first_messages_are_all_tracked() {
        const N: i64 = 16;
        let (router, store, _) = router();
        let router = Arc::new(router);
        let tasks: Vec<_> = (1..=N)
            .map(|i| {
                let router = router.clone();
                tokio::spawn(async move { router.handle(msg(i, "hello")).await })
            })
            .collect();
        for t in tasks {
            assert_eq!(t.await.unwrap(), Routed::NotCommand);
        }
        assert_eq!(store.get().subscribers.len(), N as usize);
        assert_eq!(store::load(store.path()).subscribers.len(), N as usize);
    }

    #[tokio::test]
    async fn help_on_empty_config_says_no_commands() {
        let (router, _, client) = router();
        assert_eq!(router.handle(msg(1, "/help")).await, Routed::Builtin("help".to_string()));
        assert!(client.last_text().unwrap().contains(NO_COMMANDS_REPLY));
    }

    #[tokio::test]
    async fn check_with_no_channels_is_satisfied() {
        let (router, _, client) = router();
        router.handle(msg(1, "/check")).await;
        assert!(client.last_text().unwrap().contains(SUBSCRIBED_REPLY));
    }

    #[tokio::test]
    async fn start_reports_caller_id() {
        let (router, _, client) = router();
        router.handle(msg(4242, "/start")).await;
        let reply = client.last_text().unwrap();
        assert!(reply.contains("@tester"));
        assert!(reply.contains("<code>4242</code>"));
        assert!(reply.contains("/help"));
    }

    #[tokio::test]
    async fn every_message_tracks_the_sender_once() {
        let (router, store, _) = router();
        router.handle(msg(5, "hi")).await;
        router.handle(msg(5, "/help")).await;
        router
            .handle(InboundMessage {
                text: None,
                ..msg(6, "")
            })
            .await;
        let subs = &store.get().subscribers;
        assert_eq!(subs.len(), 2);
        assert!(subs.contains(&UserId(5)) && subs.contains(&UserId(6)));
    }

    #[tokio::test]
    async fn registered_command_answers_before_and_after_reload() {
        let (router, store, client) = router();
        CommandRegistry::new(store.clone())
            .register("promo", CommandDef::text("Скидка 20%"))
            .unwrap();

        assert_eq!(router.handle(msg(1, "/promo")).await, Routed::Custom("promo".to_string()));
        assert_eq!(client.last_text().as_deref(), Some("Скидка 20%"));

        let reloaded = Arc::new(ConfigStore::open(store.path()));
        let client2 = Arc::new(FakeChatClient::default());
        let router2 = UpdateRouter::new(reloaded, client2.clone());
        router2.handle(msg(1, "/PROMO")).await;
        assert_eq!(client2.last_text().as_deref(), Some("Скидка 20%"));
    }

    #[tokio::test]
    async fn command_added_while_live_is_dispatched() {
        let (router, store, client) = router();
        assert_eq!(router.handle(msg(1, "/late")).await, Routed::Unknown("late".to_string()));
        assert!(client.sent().is_empty());

        CommandRegistry::new(store)
            .register("late", CommandDef::text("here now"))
            .unwrap();
        router.handle(msg(1, "/late")).await;
        assert_eq!(client.last_text().as_deref(), Some("here now"));
    }

    #[tokio::test]
    async fn photo_command_sends_photo() {
        let (router, store, client) = router();
        CommandRegistry::new(store)
            .register("pic", CommandDef::photo("https://example.com/cat.jpg"))
            .unwrap();
        router.handle(msg(3, "/pic")).await;
        assert_eq!(
            client.sent(),
            vec![Sent::Photo(
                ChatId(3),
                PhotoSource::Url("https://example.com/cat.jpg".parse().unwrap()),
                None
            )]
        );
    }

    #[tokio::test]
    async fn failing_photo_tells_the_user() {
        let (router, store, client) = router();
        CommandRegistry::new(store)
            .register("pic", CommandDef::photo("/nonexistent/promo.jpg"))
            .unwrap();
        client.fail_photos();
        assert_eq!(router.handle(msg(3, "/pic")).await, Routed::Custom("pic".to_string()));
        assert_eq!(client.last_text().as_deref(), Some(COMMAND_FAILED_REPLY));
    }

    #[tokio::test]
    async fn custom_check_lists_missing_channels() {
        let (router, store, client) = router();
        let reg = CommandRegistry::new(store);
        reg.add_channel("News", "-1001", Some("news")).unwrap();
        reg.add_channel("Chat", "-1002", None).unwrap();
        reg.register("gate", CommandDef::check()).unwrap();
        client.set_membership("-1002", UserId(8), MembershipStatus::Member);

        router.handle(msg(8, "/gate")).await;
        let reply = client.last_text().unwrap();
        assert!(reply.contains(r#"<a href="https://t.me/news">News</a>"#));
        assert!(!reply.contains("Chat"));
    }

    #[tokio::test]
    async fn help_lists_registered_commands() {
        let (router, store, client) = router();
        let reg = CommandRegistry::new(store);
        reg.register("b", CommandDef::text("x")).unwrap();
        reg.register("a", CommandDef::text("y")).unwrap();
        router.handle(msg(1, "/help")).await;
        let reply = client.last_text().unwrap();
        assert!(reply.contains("/a\n/b"));
        assert!(!reply.contains(NO_COMMANDS_REPLY));
    }
}
